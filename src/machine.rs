// Minimal host around the DMA unit: flat memory, a B-Bus register file with the WRAM port, and a
// scanline clock that fires HDMA at the usual H/V positions. There is no CPU; the script drives it.

use crate::bus::{Bus, MemPtr};
use crate::config::Config;
use crate::dma::Dma;
use crate::timing::Clock;
use log::debug;

pub const CYCLES_PER_LINE: i32 = 1364;
pub const LINES_PER_FRAME: u16 = 262;
pub const LAST_VISIBLE_LINE: u16 = 224;
pub const VBLANK_LINE: u16 = 225;

// Master cycle positions inside a line (4 cycles per dot).
pub const HDMA_INIT_POS: i32 = 6 * 4;
pub const HDMA_POS: i32 = 1104;
pub const NMI_POS: i32 = 2 * 4;

pub struct SystemBus {
    mem: Vec<u8>,
    b_regs: [u8; 0x100],
    wmadd: u32,
    open_bus: u8,
    wram_conflict: bool,
    oam_address: u16,

    trace_enabled: bool,
    trace: Vec<(u16, u8)>,
}

impl Default for SystemBus {
    fn default() -> Self {
        Self {
            mem: vec![0; 0x1000000],
            b_regs: [0; 0x100],
            wmadd: 0,
            open_bus: 0,
            wram_conflict: false,
            oam_address: 0,
            trace_enabled: false,
            trace: vec![],
        }
    }
}

enum Target {
    Memory(usize),
    Rom(usize),
    BBus(u16),
    Unmapped,
}

impl SystemBus {
    fn decode(addr: u32) -> Target {
        let bank = ((addr >> 16) & 0xFF) as u8;
        let offset = addr as u16;
        match bank {
            0x00..=0x3F | 0x80..=0xBF => match offset {
                // System Area -- Mirror of WRAM
                0x0000..=0x1FFF => Target::Memory(0x7E0000 | offset as usize),
                // System Area -- I/O Ports (B-Bus)
                0x2100..=0x21FF => Target::BBus(offset),
                0x2000..=0x7FFF => Target::Unmapped,
                _ => Target::Rom((addr & 0xFFFFFF) as usize),
            },
            0x7E..=0x7F => Target::Memory((addr & 0xFFFFFF) as usize),
            _ => Target::Rom((addr & 0xFFFFFF) as usize),
        }
    }

    fn incr_wmadd(&mut self) {
        self.wmadd = (self.wmadd + 1) & 0x1FFFF;
    }

    /// Stores straight into memory. Unlike `write`, ROM banks are accepted.
    pub fn load(&mut self, addr: u32, data: &[u8]) {
        for (i, &v) in data.iter().enumerate() {
            let a = addr.wrapping_add(i as u32) & 0xFFFFFF;
            self.mem[a as usize] = v;
        }
    }

    pub fn peek_addr(&self, addr: u32) -> u8 {
        match Self::decode(addr) {
            Target::Memory(idx) | Target::Rom(idx) => self.mem[idx],
            Target::BBus(b) => self.b_regs[(b & 0xFF) as usize],
            Target::Unmapped => self.open_bus,
        }
    }

    pub fn wmadd(&self) -> u32 {
        self.wmadd
    }

    pub fn oam_address(&self) -> u16 {
        self.oam_address
    }

    pub fn set_trace(&mut self, v: bool) {
        self.trace_enabled = v;
    }

    pub fn take_trace(&mut self) -> Vec<(u16, u8)> {
        std::mem::take(&mut self.trace)
    }
}

impl Bus for SystemBus {
    fn read(&mut self, addr: u32) -> u8 {
        let v = match Self::decode(addr) {
            Target::Memory(idx) | Target::Rom(idx) => self.mem[idx],
            Target::BBus(b) => return self.read_b(b),
            Target::Unmapped => self.open_bus,
        };
        self.open_bus = v;
        v
    }

    fn write(&mut self, addr: u32, value: u8) {
        match Self::decode(addr) {
            Target::Memory(idx) => self.mem[idx] = value,
            Target::BBus(b) => self.write_b(b, value),
            Target::Rom(_) | Target::Unmapped => (),
        }
        self.open_bus = value;
    }

    fn read_b(&mut self, addr: u16) -> u8 {
        let v = match addr {
            // WMDATA
            0x2180 => {
                if self.wram_conflict {
                    self.open_bus
                } else {
                    let v = self.mem[0x7E0000 + self.wmadd as usize];
                    self.incr_wmadd();
                    v
                }
            }
            0x2181..=0x21FF => self.open_bus,
            _ => self.b_regs[(addr & 0xFF) as usize],
        };
        self.open_bus = v;
        v
    }

    fn write_b(&mut self, addr: u16, value: u8) {
        if self.trace_enabled {
            self.trace.push((addr, value));
        }
        match addr {
            // WMDATA
            0x2180 => {
                if !self.wram_conflict {
                    self.mem[0x7E0000 + self.wmadd as usize] = value;
                    self.incr_wmadd();
                }
            }
            // WMADD
            0x2181 => self.wmadd = (self.wmadd & 0x1FF00) | (value as u32),
            0x2182 => self.wmadd = (self.wmadd & 0x100FF) | ((value as u32) << 8),
            0x2183 => self.wmadd = (self.wmadd & 0x0FFFF) | (((value & 0x01) as u32) << 16),
            _ => (),
        }
        self.b_regs[(addr & 0xFF) as usize] = value;
        self.open_bus = value;
    }

    fn base_pointer(&self, addr: u32) -> Option<MemPtr> {
        match Self::decode(addr) {
            Target::Memory(idx) | Target::Rom(idx) => Some(MemPtr(idx - (addr as usize & 0xFFFF))),
            _ => None,
        }
    }

    fn mem_pointer(&self, addr: u32) -> Option<MemPtr> {
        match Self::decode(addr) {
            Target::Memory(idx) | Target::Rom(idx) => Some(MemPtr(idx)),
            _ => None,
        }
    }

    fn peek(&self, ptr: MemPtr) -> u8 {
        self.mem[ptr.0 & 0xFFFFFF]
    }

    fn vram_tiled(&self) -> bool {
        // VMAIN address translation
        self.b_regs[0x15] & 0x0C != 0
    }

    fn set_open_bus(&mut self, value: u8) {
        self.open_bus = value;
    }

    fn set_wram_conflict(&mut self, conflict: bool) {
        self.wram_conflict = conflict;
    }

    fn reset_oam_address(&mut self, addr: u16) {
        self.oam_address = addr;
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Event {
    HdmaInit,
    Hdma,
    EndLine,
}

/// Scanline clock. `cycles` is the position inside the current line.
pub struct LineClock {
    cycles: i32,
    line: u16,
    lines_run: u64,
    frame: u64,
    event: Event,
    next_event: i32,
    nmi_pending: bool,
    nmi_pos: Option<i32>,
}

impl Default for LineClock {
    fn default() -> Self {
        Self {
            cycles: 0,
            line: 0,
            lines_run: 0,
            frame: 0,
            event: Event::HdmaInit,
            next_event: HDMA_INIT_POS,
            nmi_pending: false,
            nmi_pos: None,
        }
    }
}

impl LineClock {
    pub fn line(&self) -> u16 {
        self.line
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn lines_run(&self) -> u64 {
        self.lines_run
    }

    fn schedule_line_start(&mut self) {
        if self.line == 0 {
            self.event = Event::HdmaInit;
            self.next_event = HDMA_INIT_POS;
        } else if self.line <= LAST_VISIBLE_LINE {
            self.event = Event::Hdma;
            self.next_event = HDMA_POS;
        } else {
            self.event = Event::EndLine;
            self.next_event = CYCLES_PER_LINE;
        }
    }

    fn end_line(&mut self) {
        self.cycles -= CYCLES_PER_LINE;
        self.lines_run += 1;
        self.line += 1;
        if self.line == LINES_PER_FRAME {
            self.line = 0;
            self.frame += 1;
        }

        if self.line == VBLANK_LINE {
            self.nmi_pending = true;
            self.nmi_pos = Some(NMI_POS);
        } else {
            self.nmi_pending = false;
            self.nmi_pos = None;
        }
        self.schedule_line_start();
    }
}

impl Clock for LineClock {
    fn add_cycles(&mut self, v: i32) {
        self.cycles += v;
    }

    fn cycles(&self) -> i32 {
        self.cycles
    }

    fn next_event(&self) -> i32 {
        self.next_event
    }

    fn process_event<B: Bus>(&mut self, dma: &mut Dma, bus: &mut B) {
        match self.event {
            Event::HdmaInit => {
                dma.initialize_hdma_lines(bus, self);
                self.event = Event::Hdma;
                self.next_event = HDMA_POS;
            }
            Event::Hdma => {
                let active = dma.hdma_active();
                if active != 0 {
                    dma.advance_hdma_lines(active, bus, self);
                }
                self.event = Event::EndLine;
                self.next_event = CYCLES_PER_LINE;
            }
            Event::EndLine => self.end_line(),
        }
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

#[derive(Default)]
pub struct Machine {
    pub dma: Dma,
    pub bus: SystemBus,
    pub clock: LineClock,
}

impl Machine {
    pub fn new(config: Config) -> Self {
        Self {
            dma: Dma::new(config),
            bus: SystemBus::default(),
            clock: LineClock::default(),
        }
    }

    /// CPU write. DMA registers go to the DMA unit, everything else through the memory map.
    pub fn write(&mut self, addr: u32, value: u8) {
        let bank = ((addr >> 16) & 0xFF) as u8;
        let offset = addr as u16;
        let system = matches!(bank, 0x00..=0x3F | 0x80..=0xBF);
        match offset {
            0x420B | 0x420C | 0x4300..=0x437F | 0x4801 if system => {
                self.dma.write_register(offset, value, &mut self.bus, &mut self.clock)
            }
            _ => self.bus.write(addr, value),
        }
    }

    /// CPU read without side effects on the WRAM port.
    pub fn read(&self, addr: u32) -> u8 {
        let bank = ((addr >> 16) & 0xFF) as u8;
        let offset = addr as u16;
        if matches!(bank, 0x00..=0x3F | 0x80..=0xBF) && (0x4300..=0x437F).contains(&offset) {
            return self.dma.read_register(offset).unwrap_or(self.bus.open_bus);
        }
        self.bus.peek_addr(addr)
    }

    fn step_event(&mut self) {
        let gap = self.clock.next_event() - self.clock.cycles();
        if gap > 0 {
            self.clock.add_cycles(gap);
        }
        self.clock.process_event(&mut self.dma, &mut self.bus);
    }

    /// Idles until `n` more lines have ended.
    pub fn run_lines(&mut self, n: u32) {
        let target = self.clock.lines_run() + n as u64;
        while self.clock.lines_run() < target {
            self.step_event();
        }
        debug!("line={} frame={}", self.clock.line(), self.clock.frame());
    }

    /// Idles until the start of the next frame.
    pub fn run_frame(&mut self) {
        let frame = self.clock.frame();
        while self.clock.frame() == frame {
            self.step_event();
        }
    }

    pub fn power_on(&mut self) {
        self.dma.reset_all_channels();
    }
}

#[cfg(test)]
mod tests {
    use super::{Machine, CYCLES_PER_LINE, LINES_PER_FRAME};
    use crate::bus::Bus;
    use crate::timing::Clock;

    #[test]
    fn test_wram_port() {
        let mut m = Machine::default();
        m.bus.write_b(0x2181, 0x00);
        m.bus.write_b(0x2182, 0x20);
        m.bus.write_b(0x2183, 0x01);
        m.bus.write_b(0x2180, 0xAB);
        m.bus.write_b(0x2180, 0xCD);
        assert_eq!(m.bus.peek_addr(0x7F2000), 0xAB);
        assert_eq!(m.bus.peek_addr(0x7F2001), 0xCD);
        assert_eq!(m.bus.wmadd(), 0x12002);
    }

    #[test]
    fn test_low_wram_mirror() {
        let mut m = Machine::default();
        m.bus.write(0x801234, 0x5A);
        assert_eq!(m.bus.peek_addr(0x7E1234), 0x5A);
        let ptr = m.bus.base_pointer(0x001000).unwrap();
        assert_eq!(m.bus.peek(ptr.offset(0x1234)), 0x5A);
        assert_eq!(m.bus.base_pointer(0x002100), None);
    }

    #[test]
    fn test_dma_to_wram_port() {
        let mut m = Machine::default();
        m.bus.load(0xC08000, &[1, 2, 3, 4]);
        for (reg, v) in [(0x4300, 0x00), (0x4301, 0x80), (0x4302, 0x00), (0x4303, 0x80), (0x4304, 0xC0), (0x4305, 0x04), (0x4306, 0x00)] {
            m.write(reg, v);
        }
        m.write(0x2181, 0x00);
        m.write(0x2182, 0x10);
        m.write(0x420B, 0x01);
        assert_eq!(m.bus.peek_addr(0x7E1000), 1);
        assert_eq!(m.bus.peek_addr(0x7E1003), 4);
        assert_eq!(m.read(0x4305), 0x00);
    }

    #[test]
    fn test_rom_is_read_only() {
        let mut m = Machine::default();
        m.bus.load(0xFFFFFF, &[0x11]);
        m.bus.load(0xC08000, &[0x22]);
        m.bus.write(0xC08000, 0x99);
        m.bus.write(0x008000, 0x99);
        assert_eq!(m.bus.peek_addr(0xC08000), 0x22);
        assert_eq!(m.bus.peek_addr(0x008000), 0x00);

        // Power-on channel state is a reverse, fixed DMA into $FF:FFFF.
        m.bus.write_b(0x2100, 0x5A);
        m.power_on();
        m.write(0x4305, 0x04);
        m.write(0x4306, 0x00);
        m.write(0x420B, 0x01);
        assert_eq!(m.dma.channels[0].count, 0);
        assert_eq!(m.bus.peek_addr(0xFFFFFF), 0x11);
    }

    #[test]
    fn test_invalid_wram_dma_leaves_wmadd() {
        let mut m = Machine::default();
        m.bus.load(0x7E4000, &[1, 2, 3, 4]);
        m.write(0x2181, 0x34);
        m.write(0x2182, 0x12);
        for (reg, v) in [(0x4300, 0x00), (0x4301, 0x80), (0x4302, 0x00), (0x4303, 0x40), (0x4304, 0x7E), (0x4305, 0x04), (0x4306, 0x00)] {
            m.write(reg, v);
        }
        m.write(0x420B, 0x01);

        assert_eq!(m.bus.wmadd(), 0x01234);
        assert_eq!(m.bus.peek_addr(0x7E1234), 0x00);
        assert_eq!(m.read(0x4302), 0x04);
        assert_eq!(m.read(0x4303), 0x40);
        assert_eq!(m.read(0x4305), 0x00);
    }

    #[test]
    fn test_hdma_frame() {
        // Write $2132 on lines 0 and 1, then nothing.
        let mut m = Machine::default();
        m.bus.load(0x7E8000, &[0x82, 0x10, 0x20, 0x00]);
        for (reg, v) in [(0x4310, 0x00), (0x4311, 0x32), (0x4312, 0x00), (0x4313, 0x80), (0x4314, 0x7E)] {
            m.write(reg, v);
        }
        m.write(0x420C, 0x02);
        m.bus.set_trace(true);

        m.run_frame();

        assert_eq!(m.bus.take_trace(), vec![(0x2132, 0x10), (0x2132, 0x20)]);
        assert_eq!(m.dma.hdma_ended(), 0x02);
        assert_eq!(m.clock.line(), 0);
        assert_eq!(m.clock.lines_run(), LINES_PER_FRAME as u64);
    }

    #[test]
    fn test_long_dma_is_interrupted_by_hdma() {
        let mut m = Machine::default();
        m.bus.load(0x7E8000, &[0x05, 0xEE, 0x00]);
        for (reg, v) in [(0x4300, 0x00), (0x4301, 0x32), (0x4302, 0x00), (0x4303, 0x80), (0x4304, 0x7E)] {
            m.write(reg, v);
        }
        m.write(0x420C, 0x01);
        m.run_lines(1);

        // Channel 0 reused for a long DMA that runs into the H-Blank of line 1.
        for (reg, v) in [(0x4301, 0x10), (0x4302, 0x00), (0x4303, 0x00), (0x4304, 0x7F), (0x4305, 0x00), (0x4306, 0x10)] {
            m.write(reg, v);
        }
        m.write(0x420B, 0x01);

        // 18 + 8 + 8 * 135 reaches H-Blank.
        assert_eq!(m.dma.channels[0].count, 0x1000 - 135);
        assert_eq!(m.clock.line(), 1);
        assert!(m.clock.cycles() < CYCLES_PER_LINE);
    }
}
