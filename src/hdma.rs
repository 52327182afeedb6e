// H-Blank DMA
//
// Tables are walked one scanline at a time. `initialize_hdma_lines` runs at the top of the frame,
// `advance_hdma_lines` once per visible line at H-Blank.
//
// Line counter byte ($43xA):
//   $00      end of table
//   $80      128 lines, repeat
//   $01-$7F  that many lines, transfer on the first one only
//   $81-$FF  (n & $7F) lines, transfer on every line

use crate::bus::{Bus, BLOCK_MASK, BLOCK_SIZE};
use crate::config::SLOW_ONE_CYCLE;
use crate::dma::{a_bus, wram_region, Dma};
use crate::timing::Clock;
use log::{debug, trace};

impl Dma {
    /// Frame start: latch `$420C`, rewind the table of every enabled channel and fetch its first
    /// line counter.
    pub fn initialize_hdma_lines(&mut self, bus: &mut impl Bus, clock: &mut impl Clock) {
        self.hdma_active = self.hdma_enable;
        self.hdma_ended = 0;
        self.flags.set_in_hdma(true);
        self.flags.set_in_dma_or_hdma(true);
        let saved_channel = self.flags.current_channel();

        if self.hdma_active != 0 {
            clock.add_cycles(self.config.timings.dma_cpu_sync);
        }

        for ch in 0..8u8 {
            let mask = 1 << ch;
            let d = ch as usize;
            if self.hdma_active & mask != 0 {
                self.flags.set_current_channel(Some(ch));
                self.channels[d].address = self.channels[d].a_address;
                if !self.read_line_count(ch, bus, clock) {
                    self.hdma_active &= !mask;
                    self.hdma_ended |= mask;
                }
            } else {
                self.channels[d].do_transfer = false;
            }
        }

        let in_dma = self.flags.in_dma();
        self.flags.set_in_hdma(false);
        self.flags.set_in_dma_or_hdma(in_dma);
        self.flags.set_hdma_ran_in_dma(if in_dma { self.hdma_active } else { 0 });
        self.flags.set_current_channel(saved_channel);
        debug!("HDMA init: active={:#04X} ended={:#04X}", self.hdma_active, self.hdma_ended);
    }

    /// Fetches the next line counter (and, for indirect tables, the data address) of `channel`.
    ///
    /// Returns `false` on the terminating `$00`.
    pub fn read_line_count(&mut self, channel: u8, bus: &mut impl Bus, clock: &mut impl Clock) -> bool {
        let d = (channel & 0x07) as usize;
        let higher_active = self.hdma_active & (((0xFEu16 << d) & 0xFF) as u8) != 0;
        let c = &mut self.channels[d];
        let bank = c.a_bank;

        let line = bus.read(a_bus(bank, c.address));
        clock.add_cycles(SLOW_ONE_CYCLE);

        if line == 0 {
            c.repeat = false;
            c.line_count = 128;

            if c.params.indirect() {
                // The indirect address is still fetched. Unless a higher numbered channel is still
                // running, the fetch starts on the terminator itself.
                if higher_active {
                    c.address = c.address.wrapping_add(1);
                    clock.add_cycles(SLOW_ONE_CYCLE * 2);
                } else {
                    clock.add_cycles(SLOW_ONE_CYCLE);
                }
                c.count = bus.read_word(a_bus(bank, c.address));
                c.address = c.address.wrapping_add(1);
            }

            c.address = c.address.wrapping_add(1);
            c.hdma_ptr = None;
            trace!("HDMA ch{} end of table", d);
            return false;
        } else if line == 0x80 {
            c.repeat = true;
            c.line_count = 128;
        } else {
            c.repeat = (line & 0x80) != 0;
            c.line_count = line & 0x7F;
        }

        c.address = c.address.wrapping_add(1);
        c.do_transfer = true;

        if c.params.indirect() {
            clock.add_cycles(SLOW_ONE_CYCLE * 2);
            c.count = bus.read_word(a_bus(bank, c.address));
            c.address = c.address.wrapping_add(2);
            c.hdma_ptr = bus.mem_pointer(a_bus(c.indirect_bank, c.count));
        } else {
            c.hdma_ptr = bus.mem_pointer(a_bus(bank, c.address));
        }

        trace!(
            "HDMA ch{} lines={} repeat={} table=${:02X}:{:04X}",
            d,
            c.line_count,
            c.repeat,
            bank,
            c.address
        );
        true
    }

    /// One H-Blank worth of HDMA for the channels in `mask`. Returns the channels of `mask` still
    /// running. Channels outside `mask` keep their `hdma_active` bit.
    ///
    /// May be called from inside a DMA through `Clock::process_event`.
    pub fn advance_hdma_lines(&mut self, mask: u8, bus: &mut impl Bus, clock: &mut impl Clock) -> u8 {
        let mut active = mask;
        let in_dma = self.flags.in_dma();
        self.flags.set_in_hdma(true);
        self.flags.set_in_dma_or_hdma(true);
        self.flags.set_hdma_ran_in_dma(if in_dma { active } else { 0 });
        let saved_wram = self.flags.in_wram_dma_or_hdma();
        let saved_channel = self.flags.current_channel();

        clock.add_cycles(self.config.timings.dma_cpu_sync);

        for ch in 0..8u8 {
            if active & (1 << ch) == 0 {
                continue;
            }
            self.set_wram_conflict(bus, false);
            self.flags.set_current_channel(Some(ch));
            self.transfer_hdma_line(ch as usize, bus, clock);
        }

        for ch in 0..8u8 {
            let bit = 1 << ch;
            if active & bit == 0 {
                continue;
            }
            let d = ch as usize;
            let c = &mut self.channels[d];
            if c.do_transfer {
                let n = c.transfer_mode().byte_count();
                if c.params.indirect() {
                    c.count = c.count.wrapping_add(n);
                } else {
                    c.address = c.address.wrapping_add(n);
                }
            }
            c.do_transfer = c.repeat;
            c.line_count = c.line_count.wrapping_sub(1);

            if c.line_count == 0 {
                if !self.read_line_count(ch, bus, clock) {
                    active &= !bit;
                    self.hdma_ended |= bit;
                    self.channels[d].do_transfer = false;
                    continue;
                }
            } else {
                clock.add_cycles(SLOW_ONE_CYCLE);
            }
        }

        let in_dma = self.flags.in_dma();
        self.flags.set_in_hdma(false);
        self.flags.set_in_dma_or_hdma(in_dma);
        self.set_wram_conflict(bus, saved_wram);
        self.flags.set_current_channel(saved_channel);
        self.hdma_active &= !(mask & !active);
        active
    }

    fn transfer_hdma_line(&mut self, d: usize, bus: &mut impl Bus, clock: &mut impl Clock) {
        let c = self.channels[d];
        let (bank, addr) = if c.params.indirect() {
            (c.indirect_bank, c.count)
        } else {
            (c.a_bank, c.address)
        };

        if self.channels[d].hdma_ptr.is_none() {
            self.channels[d].hdma_ptr = bus.mem_pointer(a_bus(bank, addr));
        }

        if !c.do_transfer {
            return;
        }

        // Uniracers
        if c.b_address == 0x04 && self.config.oam_address_fix {
            bus.reset_oam_address(0x10C);
        }

        let mode = c.transfer_mode();
        let offsets = mode.offsets();

        if c.params.reverse() {
            self.channels[d].hdma_ptr = None;
            for (i, &off) in offsets.iter().enumerate() {
                let a = addr.wrapping_add(i as u16);
                self.set_wram_conflict(bus, wram_region(bank, a));
                let v = bus.read_b(c.b_bus(off));
                bus.write(a_bus(bank, a), v);
                clock.add_cycles(SLOW_ONE_CYCLE);
            }
            return;
        }

        if (addr as u32 & BLOCK_MASK) + mode.byte_count() as u32 >= BLOCK_SIZE {
            // Unit straddles a block, fetch every byte through the map.
            self.channels[d].hdma_ptr = None;
            for (i, &off) in offsets.iter().enumerate() {
                let a = addr.wrapping_add(i as u16);
                self.set_wram_conflict(bus, wram_region(bank, a));
                let v = bus.read(a_bus(bank, a));
                bus.write_b(c.b_bus(off), v);
                clock.add_cycles(SLOW_ONE_CYCLE);
            }
            return;
        }

        self.set_wram_conflict(bus, wram_region(bank, addr));
        match self.channels[d].hdma_ptr {
            None => {
                let base = a_bus(bank, addr);
                for (i, &off) in offsets.iter().enumerate() {
                    let v = bus.read(base + i as u32);
                    bus.write_b(c.b_bus(off), v);
                    clock.add_cycles(SLOW_ONE_CYCLE);
                }
            }
            Some(ptr) => {
                let last = offsets.len() - 1;
                for (i, &off) in offsets.iter().enumerate() {
                    let v = bus.peek(ptr.offset(i));
                    if i == last && mode.is_alternating() {
                        bus.set_open_bus(v);
                    }
                    bus.write_b(c.b_bus(off), v);
                    clock.add_cycles(SLOW_ONE_CYCLE);
                }
                self.channels[d].hdma_ptr = Some(ptr.offset(offsets.len()));
            }
        }
    }
}
