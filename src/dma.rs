// General-Purpose DMA
//
// https://wiki.superfamicom.org/dma-and-hdma
//
// A transfer runs to completion inside `execute_dma`, one byte per slow cycle. After every byte the
// host clock gets a chance to run its events; H-Blank HDMA may fire from there and, if it used the
// same channel, the DMA stops on the spot with $43x2 and $43x5 left where they were.

use crate::bus::{Bus, MemPtr, BLOCK_MASK, BLOCK_SIZE};
use crate::channel::{Channel, Pattern, TransferMode};
use crate::config::{Config, SLOW_ONE_CYCLE};
use crate::sdd1::Sdd1;
use crate::timing::Clock;
use log::{debug, trace};
use macros::Latches;

/// Engine-wide transfer state. Only meaningful while an engine call is running, except
/// `hdma_ran_in_dma` which HDMA leaves behind for the DMA it interrupted.
#[derive(Default, Debug, Clone, Latches)]
pub struct TransferFlags {
    in_dma: bool,
    in_hdma: bool,
    in_dma_or_hdma: bool,
    in_wram_dma_or_hdma: bool,
    current_channel: Option<u8>,
    hdma_ran_in_dma: u8,
}

pub struct Dma {
    pub channels: [Channel; 8],
    pub config: Config,
    pub sdd1: Sdd1,
    pub(crate) flags: TransferFlags,
    // $420C as written by the CPU
    pub(crate) hdma_enable: u8,
    // Channels still running HDMA this frame
    pub(crate) hdma_active: u8,
    pub(crate) hdma_ended: u8,
}

impl Default for Dma {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[derive(Clone, Copy)]
enum Source {
    Mapped,
    Base(MemPtr),
    Sdd1,
}

// B-Bus ports with a dedicated fast-path writer.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Port {
    Generic,
    Oam,
    Vram { high: bool, tiled: bool },
    VramPair { tiled: bool },
    Cgram,
    Wram,
}

impl Port {
    fn resolve(mode: TransferMode, b_address: u8, tiled: bool) -> Self {
        if mode.is_single_register() {
            match b_address {
                0x04 => Port::Oam,
                0x18 => Port::Vram { high: false, tiled },
                0x19 => Port::Vram { high: true, tiled },
                0x22 => Port::Cgram,
                0x80 => Port::Wram,
                _ => Port::Generic,
            }
        } else if mode.is_alternating() && b_address == 0x18 {
            Port::VramPair { tiled }
        } else {
            Port::Generic
        }
    }

    fn deliver(self, bus: &mut impl Bus, b_addr: u16, offset: u8, value: u8, wram_conflict: bool) {
        match self {
            Port::Generic => bus.write_b(b_addr, value),
            Port::Oam => bus.write_oam(value),
            Port::Vram { high, tiled } => bus.write_vram(value, high, tiled),
            Port::VramPair { tiled } => {
                let high = offset == 1;
                if high && !tiled {
                    bus.set_open_bus(value);
                }
                bus.write_vram(value, high, tiled)
            }
            Port::Cgram => bus.write_cgram(value),
            Port::Wram => {
                if !wram_conflict {
                    bus.write_wram_port(value)
                }
            }
        }
    }
}

pub(crate) fn a_bus(bank: u8, addr: u16) -> u32 {
    ((bank as u32) << 16) | (addr as u32)
}

// Whether an A-Bus access lands in WRAM (banks $7E/$7F or the low mirror).
pub(crate) fn wram_region(bank: u8, addr: u16) -> bool {
    bank == 0x7E || bank == 0x7F || ((bank & 0x40) == 0 && addr < 0x2000)
}

impl Dma {
    pub fn new(config: Config) -> Self {
        Self {
            channels: [Channel::default(); 8],
            config,
            sdd1: Sdd1::default(),
            flags: TransferFlags::default(),
            hdma_enable: 0,
            hdma_active: 0,
            hdma_ended: 0,
        }
    }

    pub fn flags(&self) -> &TransferFlags {
        &self.flags
    }

    pub fn hdma_enable(&self) -> u8 {
        self.hdma_enable
    }

    pub fn hdma_active(&self) -> u8 {
        self.hdma_active
    }

    pub fn hdma_ended(&self) -> u8 {
        self.hdma_ended
    }

    /// Power-on state of all channels.
    pub fn reset_all_channels(&mut self) {
        for ch in self.channels.iter_mut() {
            *ch = Channel::default();
        }
    }

    pub(crate) fn set_wram_conflict(&mut self, bus: &mut impl Bus, v: bool) {
        self.flags.set_in_wram_dma_or_hdma(v);
        bus.set_wram_conflict(v);
    }

    fn end_dma(&mut self, bus: &mut impl Bus) {
        self.flags.set_in_dma(false);
        self.flags.set_in_dma_or_hdma(false);
        self.set_wram_conflict(bus, false);
        self.flags.set_current_channel(None);
    }

    // 8 cycles per byte, then let the host catch up on its events.
    // Returns false when HDMA ran on this very channel in the meantime.
    fn add_cycles_in_dma(&mut self, ch: usize, bus: &mut impl Bus, clock: &mut impl Clock) -> bool {
        clock.add_cycles(SLOW_ONE_CYCLE);
        while clock.cycles() >= clock.next_event() {
            clock.process_event(self, bus);
        }

        let ran = self.flags.take_hdma_ran_in_dma();
        if ran & (1 << ch) != 0 {
            trace!("DMA ch{} killed by HDMA (count={:#06X})", ch, self.channels[ch].count);
            return false;
        }
        true
    }

    fn update_counters(&mut self, ch: usize, inc: i32) {
        let c = &mut self.channels[ch];
        c.count = c.count.wrapping_sub(1);
        c.a_address = c.a_address.wrapping_add(inc as u16);
    }

    /// Runs the whole transfer configured on `channel`.
    ///
    /// Returns `false` if an HDMA on the same channel interrupted it. Count and address registers are
    /// then left at their partially updated values.
    pub fn execute_dma(&mut self, channel: u8, bus: &mut impl Bus, clock: &mut impl Clock) -> bool {
        let ch = (channel & 0x07) as usize;
        self.flags.set_in_dma(true);
        self.flags.set_in_dma_or_hdma(true);
        self.flags.set_current_channel(Some(ch as u8));

        let c = self.channels[ch];
        debug!(
            "DMA ch{} {} ${:02X}:{:04X} $21{:02X} count={:#06X} mode={:?} step={}",
            ch,
            if c.params.reverse() { "B->A" } else { "A->B" },
            c.a_bank,
            c.a_address,
            c.b_address,
            c.count,
            c.transfer_mode(),
            c.params.step()
        );

        // WRAM cannot be read and written through $2180 at the same time.
        if (c.a_bank == 0x7E || c.a_bank == 0x7F) && c.b_address == 0x80 && !c.params.reverse() {
            return self.invalid_dma(ch, bus, clock);
        }

        let mut inc = c.params.step();
        // Writing $0000 to $43x5/6 transfers $10000 bytes.
        let count = if c.count == 0 { 0x10000 } else { c.count as u32 };

        let mut use_sdd1 = false;
        if self.config.sdd1 {
            let ready = self.sdd1.take_dma_ready();
            if c.params.fixed() && ready {
                inc = if c.params.decrement() { -1 } else { 1 };
                use_sdd1 = true;
            }
        }

        // 8 cycles per channel
        clock.add_cycles(SLOW_ONE_CYCLE);

        let done = if c.params.reverse() {
            self.reverse_dma(ch, count, inc, bus, clock)
        } else {
            self.forward_dma(ch, count, inc, use_sdd1, bus, clock)
        };
        if !done {
            self.end_dma(bus);
            return false;
        }

        if clock.nmi_pending() && clock.nmi_trigger_pos().is_some() {
            let pos = clock.cycles() + self.config.timings.nmi_dma_delay;
            clock.set_nmi_trigger_pos(pos);
        }

        self.end_dma(bus);
        debug!("DMA ch{} done", ch);
        true
    }

    // Nothing moves, but the channel still counts down and takes its time.
    fn invalid_dma(&mut self, ch: usize, bus: &mut impl Bus, clock: &mut impl Clock) -> bool {
        let c = self.channels[ch].count;
        let mut c = if c == 0 { 0x10000u32 } else { c as u32 };

        clock.add_cycles(SLOW_ONE_CYCLE);
        while c > 0 {
            self.update_counters(ch, 1);
            c -= 1;
            if !self.add_cycles_in_dma(ch, bus, clock) {
                self.end_dma(bus);
                return false;
            }
        }

        self.end_dma(bus);
        true
    }

    // A-Bus -> B-Bus
    fn forward_dma(
        &mut self,
        ch: usize,
        count: u32,
        inc: i32,
        use_sdd1: bool,
        bus: &mut impl Bus,
        clock: &mut impl Clock,
    ) -> bool {
        let c = self.channels[ch];
        let mode = c.transfer_mode();
        let bank = c.a_bank;
        let mut pattern = Pattern::new(mode);

        let mut p = c.a_address;
        let mut rem = count;
        let mut src;
        let mut block;
        if use_sdd1 {
            src = Source::Sdd1;
            p = 0;
            block = rem;
        } else {
            src = match bus.base_pointer(a_bus(bank, p)) {
                Some(base) => Source::Base(base),
                None => Source::Mapped,
            };
            let in_block = p as u32 & BLOCK_MASK;
            block = if c.params.fixed() {
                rem
            } else if c.params.decrement() {
                in_block + 1
            } else {
                BLOCK_SIZE - in_block
            };
        }
        let mut in_wram = !use_sdd1 && wram_region(bank, c.a_address);

        loop {
            block = block.min(rem);
            rem -= block;
            self.set_wram_conflict(bus, in_wram);

            let port = match src {
                Source::Mapped => Port::Generic,
                _ => Port::resolve(mode, c.b_address, bus.vram_tiled()),
            };

            for _ in 0..block {
                let offset = pattern.offset();
                let b_addr = c.b_bus(offset);
                match src {
                    Source::Mapped => {
                        let v = bus.read(a_bus(bank, p));
                        bus.write_b(b_addr, v);
                    }
                    Source::Base(base) => {
                        let v = bus.peek(base.offset(p as usize));
                        port.deliver(bus, b_addr, offset, v, in_wram);
                    }
                    Source::Sdd1 => {
                        let v = self.sdd1.byte(p);
                        port.deliver(bus, b_addr, offset, v, in_wram);
                    }
                }
                pattern.advance();

                self.update_counters(ch, inc);
                p = p.wrapping_add(inc as u16);
                if !self.add_cycles_in_dma(ch, bus, clock) {
                    return false;
                }
            }

            if rem == 0 {
                break;
            }

            // Next block: the pattern step carries over.
            let a = self.channels[ch].a_address;
            src = match bus.base_pointer(a_bus(bank, a)) {
                Some(base) => Source::Base(base),
                None => Source::Mapped,
            };
            block = BLOCK_SIZE;
            in_wram = wram_region(bank, a);
        }
        true
    }

    // B-Bus -> A-Bus. No pointer caching, every byte goes through the memory map.
    fn reverse_dma(&mut self, ch: usize, count: u32, inc: i32, bus: &mut impl Bus, clock: &mut impl Clock) -> bool {
        let c = self.channels[ch];
        let bank = c.a_bank;

        // $2180-$2183 are WRAM ports; reading them while writing low WRAM needs per-byte checks.
        let really_slow = c.b_address > 0x80 - 4 && c.b_address <= 0x83 && (bank & 0x40) == 0;
        if !really_slow {
            self.set_wram_conflict(bus, bank == 0x7E || bank == 0x7F);
        }

        let mut pattern = Pattern::new(c.transfer_mode());
        for _ in 0..count {
            let a = self.channels[ch].a_address;
            if really_slow {
                self.set_wram_conflict(bus, a < 0x2000);
            }
            let v = bus.read_b(c.b_bus(pattern.offset()));
            bus.write(a_bus(bank, a), v);
            pattern.advance();

            self.update_counters(ch, inc);
            if !self.add_cycles_in_dma(ch, bus, clock) {
                return false;
            }
        }
        true
    }

    /// `$420B` MDMAEN: runs the selected channels in ascending order.
    pub fn start_dma(&mut self, mask: u8, bus: &mut impl Bus, clock: &mut impl Clock) {
        if self.flags.in_dma_or_hdma() || mask == 0 {
            return;
        }
        clock.add_cycles(self.config.timings.dma_cpu_sync);
        for ch in 0..8u8 {
            if mask & (1 << ch) != 0 {
                self.execute_dma(ch, bus, clock);
            }
        }
    }

    /// CPU read of `$43xx`. `None` means open bus.
    pub fn read_register(&self, addr: u16) -> Option<u8> {
        match addr {
            0x4300..=0x437F => {
                let idx = ((addr >> 4) & 0x07) as usize;
                self.channels[idx].read((addr & 0x0F) as u8)
            }
            _ => None,
        }
    }

    /// CPU write to `$420B`, `$420C`, `$43xx` or the S-DD1 `$4801`.
    pub fn write_register(&mut self, addr: u16, value: u8, bus: &mut impl Bus, clock: &mut impl Clock) {
        match addr {
            0x420B => self.start_dma(value, bus, clock),
            0x420C => {
                if self.flags.in_dma_or_hdma() {
                    return;
                }
                self.hdma_enable = value;
                self.hdma_active = value & !self.hdma_ended;
            }
            0x4300..=0x437F => {
                let idx = ((addr >> 4) & 0x07) as usize;
                self.channels[idx].write((addr & 0x0F) as u8, value);
            }
            0x4801 => {
                if self.config.sdd1 {
                    self.sdd1.write_dma_ready(value);
                }
            }
            _ => (),
        }
    }
}
