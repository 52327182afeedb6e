use crate::bus::MemPtr;
use modular_bitfield::prelude::*;
use strum_macros::EnumIter;

// $43x0 DMAPx
//
//   7  6  5  4  3  2  1  0
//   d  i  -  s  s  m  m  m
//
// d: 0 = A-Bus -> B-Bus, 1 = B-Bus -> A-Bus
// i: HDMA indirect table
// s: bit3 fixed, bit4 decrement (only if not fixed)
// m: transfer mode
#[bitfield]
#[repr(u8)]
#[derive(Clone, Copy, Debug)]
pub struct Params {
    transfer_mode_bin: B3,
    pub fixed: bool,
    pub decrement: bool,
    pub unused: bool,
    pub indirect: bool,
    pub reverse: bool,
}

impl Default for Params {
    fn default() -> Self {
        0xFF.into()
    }
}

impl Params {
    pub fn transfer_mode(&self) -> TransferMode {
        TransferMode::from_bits(self.transfer_mode_bin())
    }

    /// A-Bus address step for DMA.
    pub fn step(&self) -> i32 {
        if self.fixed() {
            0
        } else if self.decrement() {
            -1
        } else {
            1
        }
    }
}

/// Which B-Bus registers successive bytes of a transfer unit go to, relative to `$21xx`.
///
/// ```text
/// Mode  Bytes   B-Bus
///  0    1       xx
///  1    2       xx, xx+1
///  2    2       xx, xx
///  3    4       xx, xx,   xx+1, xx+1
///  4    4       xx, xx+1, xx+2, xx+3
///  5    4       xx, xx+1, xx,   xx+1
///  6    2       xx, xx
///  7    4       xx, xx,   xx+1, xx+1
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter)]
pub enum TransferMode {
    Mode0 = 0,
    Mode1 = 1,
    Mode2 = 2,
    Mode3 = 3,
    Mode4 = 4,
    Mode5 = 5,
    Mode6 = 6,
    Mode7 = 7,
}

impl TransferMode {
    pub fn from_bits(v: u8) -> Self {
        match v & 0x07 {
            0 => TransferMode::Mode0,
            1 => TransferMode::Mode1,
            2 => TransferMode::Mode2,
            3 => TransferMode::Mode3,
            4 => TransferMode::Mode4,
            5 => TransferMode::Mode5,
            6 => TransferMode::Mode6,
            7 => TransferMode::Mode7,
            _ => unreachable!(),
        }
    }

    pub fn offsets(self) -> &'static [u8] {
        match self {
            TransferMode::Mode0 => &[0],
            TransferMode::Mode1 => &[0, 1],
            TransferMode::Mode2 | TransferMode::Mode6 => &[0, 0],
            TransferMode::Mode3 | TransferMode::Mode7 => &[0, 0, 1, 1],
            TransferMode::Mode4 => &[0, 1, 2, 3],
            TransferMode::Mode5 => &[0, 1, 0, 1],
        }
    }

    /// Bytes moved per scanline by HDMA.
    pub fn byte_count(self) -> u16 {
        self.offsets().len() as u16
    }

    /// Modes that write a single register over and over.
    pub fn is_single_register(self) -> bool {
        matches!(self, TransferMode::Mode0 | TransferMode::Mode2 | TransferMode::Mode6)
    }

    /// Modes that alternate between `xx` and `xx+1`.
    pub fn is_alternating(self) -> bool {
        matches!(self, TransferMode::Mode1 | TransferMode::Mode5)
    }
}

/// Position inside a transfer unit.
///
/// A DMA that crosses a memory block boundary in the middle of a unit continues with the next
/// register of the unit, so the step is carried over rather than derived from the byte count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pattern {
    mode: TransferMode,
    step: u8,
}

impl Pattern {
    pub fn new(mode: TransferMode) -> Self {
        Self { mode, step: 0 }
    }

    pub fn step(&self) -> u8 {
        self.step
    }

    pub fn offset(&self) -> u8 {
        self.mode.offsets()[self.step as usize]
    }

    pub fn advance(&mut self) {
        self.step += 1;
        if self.step as usize == self.mode.offsets().len() {
            self.step = 0;
        }
    }

    pub fn is_unit_start(&self) -> bool {
        self.step == 0
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Channel {
    // MMIO Registers
    pub params: Params,
    /// $43x1 BBADx
    pub b_address: u8,
    /// $43x2/3 A1TxL/H
    pub a_address: u16,
    /// $43x4 A1Bx
    pub a_bank: u8,
    /// $43x5/6 DASxL/H: DMA byte count, HDMA indirect address.
    pub count: u16,
    /// $43x7 DASBx
    pub indirect_bank: u8,
    /// $43x8/9 A2AxL/H: HDMA table address.
    pub address: u16,
    /// $43xA NLTRx, kept unpacked since the line count can be 128.
    pub repeat: bool,
    pub line_count: u8,
    /// $43xB / $43xF
    pub unknown_byte: u8,

    // Internal
    pub do_transfer: bool,
    pub(crate) hdma_ptr: Option<MemPtr>,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            params: Params::default(),
            b_address: 0xFF,
            a_address: 0xFFFF,
            a_bank: 0xFF,
            count: 0xFFFF,
            indirect_bank: 0xFF,
            address: 0xFFFF,
            repeat: false,
            line_count: 0x7F,
            unknown_byte: 0xFF,
            do_transfer: false,
            hdma_ptr: None,
        }
    }
}

fn set_lo(v: &mut u16, lo: u8) {
    *v = (*v & 0xFF00) | lo as u16;
}

fn set_hi(v: &mut u16, hi: u8) {
    *v = (*v & 0x00FF) | ((hi as u16) << 8);
}

impl Channel {
    pub fn transfer_mode(&self) -> TransferMode {
        self.params.transfer_mode()
    }

    pub fn hdma_ptr(&self) -> Option<MemPtr> {
        self.hdma_ptr
    }

    /// B-Bus address of the register at `offset` within the transfer unit.
    pub fn b_bus(&self, offset: u8) -> u16 {
        0x2100 + self.b_address as u16 + offset as u16
    }

    /// Read from `$43xN`. `None` for the holes at `$43xC-$43xE`, which read as open bus.
    pub fn read(&self, reg: u8) -> Option<u8> {
        let v = match reg & 0x0F {
            0x0 => self.params.into(),
            0x1 => self.b_address,
            0x2 => self.a_address as u8,
            0x3 => (self.a_address >> 8) as u8,
            0x4 => self.a_bank,
            0x5 => self.count as u8,
            0x6 => (self.count >> 8) as u8,
            0x7 => self.indirect_bank,
            0x8 => self.address as u8,
            0x9 => (self.address >> 8) as u8,
            0xA => (self.line_count & 0x7F) | if self.repeat { 0x80 } else { 0x00 },
            0xB | 0xF => self.unknown_byte,
            _ => return None,
        };
        Some(v)
    }

    /// Write to `$43xN`.
    pub fn write(&mut self, reg: u8, value: u8) {
        match reg & 0x0F {
            0x0 => self.params = value.into(),
            0x1 => self.b_address = value,
            0x2 => set_lo(&mut self.a_address, value),
            0x3 => set_hi(&mut self.a_address, value),
            0x4 => self.a_bank = value,
            0x5 => set_lo(&mut self.count, value),
            0x6 => set_hi(&mut self.count, value),
            0x7 => self.indirect_bank = value,
            0x8 => set_lo(&mut self.address, value),
            0x9 => set_hi(&mut self.address, value),
            0xA => {
                self.line_count = value & 0x7F;
                self.repeat = (value & 0x80) != 0;
            }
            0xB | 0xF => self.unknown_byte = value,
            _ => (),
        }
    }
}
