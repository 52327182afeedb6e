// Test doubles for the bus and the host clock.

use crate::bus::{Bus, MemPtr};
use crate::dma::Dma;
use crate::timing::Clock;
use std::cell::RefCell;

/// Flat 16 MiB A-Bus. Banks `$C0-$FF` are ROM, banks in `slow_banks` refuse to hand out pointers.
pub struct MockBus {
    pub mem: Vec<u8>,
    pub b_regs: [u8; 0x100],
    pub slow_banks: Vec<u8>,
    pub tiled: bool,

    pub a_writes: Vec<(u32, u8)>,
    pub b_writes: Vec<(u16, u8)>,
    pub b_reads: Vec<u16>,
    pub oam_writes: Vec<u8>,
    pub vram_writes: Vec<(u8, bool, bool)>,
    pub cgram_writes: Vec<u8>,
    pub wram_port_writes: Vec<u8>,
    pub oam_resets: Vec<u16>,
    pub conflicts: Vec<bool>,
    pub open_bus: Option<u8>,
    pub base_lookups: RefCell<Vec<u32>>,
}

impl Default for MockBus {
    fn default() -> Self {
        Self {
            mem: vec![0; 0x1000000],
            b_regs: [0; 0x100],
            slow_banks: vec![],
            tiled: false,
            a_writes: vec![],
            b_writes: vec![],
            b_reads: vec![],
            oam_writes: vec![],
            vram_writes: vec![],
            cgram_writes: vec![],
            wram_port_writes: vec![],
            oam_resets: vec![],
            conflicts: vec![],
            open_bus: None,
            base_lookups: RefCell::new(vec![]),
        }
    }
}

impl MockBus {
    pub fn poke(&mut self, addr: u32, v: u8) {
        self.mem[(addr & 0xFFFFFF) as usize] = v;
    }

    pub fn peek_addr(&self, addr: u32) -> u8 {
        self.mem[(addr & 0xFFFFFF) as usize]
    }

    fn is_slow(&self, addr: u32) -> bool {
        self.slow_banks.contains(&((addr >> 16) as u8))
    }
}

impl Bus for MockBus {
    fn read(&mut self, addr: u32) -> u8 {
        self.peek_addr(addr)
    }

    fn write(&mut self, addr: u32, value: u8) {
        self.a_writes.push((addr, value));
        if (addr >> 16) < 0xC0 {
            self.poke(addr, value);
        }
    }

    fn read_b(&mut self, addr: u16) -> u8 {
        self.b_reads.push(addr);
        self.b_regs[(addr & 0xFF) as usize]
    }

    fn write_b(&mut self, addr: u16, value: u8) {
        self.b_writes.push((addr, value));
    }

    fn base_pointer(&self, addr: u32) -> Option<MemPtr> {
        self.base_lookups.borrow_mut().push(addr);
        if self.is_slow(addr) {
            None
        } else {
            Some(MemPtr((addr & 0xFF0000) as usize))
        }
    }

    fn mem_pointer(&self, addr: u32) -> Option<MemPtr> {
        if self.is_slow(addr) {
            None
        } else {
            Some(MemPtr((addr & 0xFFFFFF) as usize))
        }
    }

    fn peek(&self, ptr: MemPtr) -> u8 {
        self.mem[ptr.0 & 0xFFFFFF]
    }

    fn write_oam(&mut self, value: u8) {
        self.oam_writes.push(value);
    }

    fn vram_tiled(&self) -> bool {
        self.tiled
    }

    fn write_vram(&mut self, value: u8, high: bool, tiled: bool) {
        self.vram_writes.push((value, high, tiled));
    }

    fn write_cgram(&mut self, value: u8) {
        self.cgram_writes.push(value);
    }

    fn write_wram_port(&mut self, value: u8) {
        self.wram_port_writes.push(value);
    }

    fn set_open_bus(&mut self, value: u8) {
        self.open_bus = Some(value);
    }

    fn set_wram_conflict(&mut self, conflict: bool) {
        self.conflicts.push(conflict);
    }

    fn reset_oam_address(&mut self, addr: u16) {
        self.oam_resets.push(addr);
    }
}

/// Cycle counter with a queue of HDMA steps at fixed positions.
#[derive(Default)]
pub struct MockClock {
    pub cycles: i32,
    pub events: Vec<(i32, u8)>,
    pub nmi_pending: bool,
    pub nmi_pos: Option<i32>,
}

impl MockClock {
    pub fn schedule_hdma(&mut self, at: i32, mask: u8) {
        self.events.push((at, mask));
        self.events.sort_by_key(|e| e.0);
    }
}

impl Clock for MockClock {
    fn add_cycles(&mut self, v: i32) {
        self.cycles += v;
    }

    fn cycles(&self) -> i32 {
        self.cycles
    }

    fn next_event(&self) -> i32 {
        self.events.first().map(|e| e.0).unwrap_or(i32::MAX)
    }

    fn process_event<B: Bus>(&mut self, dma: &mut Dma, bus: &mut B) {
        if self.events.is_empty() {
            return;
        }
        let (_, mask) = self.events.remove(0);
        dma.advance_hdma_lines(mask, bus, self);
    }

    fn nmi_pending(&self) -> bool {
        self.nmi_pending
    }

    fn nmi_trigger_pos(&self) -> Option<i32> {
        self.nmi_pos
    }

    fn set_nmi_trigger_pos(&mut self, pos: i32) {
        self.nmi_pos = Some(pos);
    }
}
