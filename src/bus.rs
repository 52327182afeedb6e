// A-Bus / B-Bus access as seen by the DMA unit.
//
// The memory map itself (bank decoding, ROM/SRAM mirrors, PPU register behaviour) lives outside of
// this crate. The engine only needs the primitives below.

/// Memory map granularity. A base pointer resolved for an address stays valid until the transfer
/// leaves the block containing that address.
pub const BLOCK_SIZE: u32 = 0x1000;
pub const BLOCK_MASK: u32 = BLOCK_SIZE - 1;

/// Handle to directly addressable memory owned by the bus.
///
/// It is an index into whatever backing store the bus uses. A *base* pointer is biased so that the
/// byte for address `bank:xxxx` is at `base.offset(xxxx)`; a *memory* pointer points at the byte
/// itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemPtr(pub usize);

impl MemPtr {
    pub fn offset(self, n: usize) -> Self {
        MemPtr(self.0.wrapping_add(n))
    }
}

pub trait Bus {
    /// A-Bus read through the full memory map.
    fn read(&mut self, addr: u32) -> u8;
    /// A-Bus write through the full memory map.
    fn write(&mut self, addr: u32, value: u8);
    /// B-Bus register read, `addr` in `$2100-$21FF`.
    fn read_b(&mut self, addr: u16) -> u8;
    /// B-Bus register write, `addr` in `$2100-$21FF`.
    fn write_b(&mut self, addr: u16, value: u8);

    /// Base pointer of the block containing `addr`, `None` if the block needs mapped access.
    fn base_pointer(&self, addr: u32) -> Option<MemPtr>;
    /// Pointer to the byte at `addr`, `None` if the block needs mapped access.
    fn mem_pointer(&self, addr: u32) -> Option<MemPtr>;
    /// Raw read through a pointer handed out by `base_pointer`/`mem_pointer`. No side effects.
    fn peek(&self, ptr: MemPtr) -> u8;

    fn read_word(&mut self, addr: u32) -> u16 {
        let lo = self.read(addr & 0xFFFFFF) as u16;
        let hi = self.read(addr.wrapping_add(1) & 0xFFFFFF) as u16;
        (hi << 8) | lo
    }

    // Fast-path register ports. DMA writes to these skip the generic B-Bus decoder.

    /// `$2104` OAMDATA
    fn write_oam(&mut self, value: u8) {
        self.write_b(0x2104, value)
    }

    /// Whether VMAIN currently remaps VRAM addresses (full graphic count != 0).
    fn vram_tiled(&self) -> bool {
        false
    }

    /// `$2118`/`$2119` VMDATAL/VMDATAH
    fn write_vram(&mut self, value: u8, high: bool, _tiled: bool) {
        self.write_b(if high { 0x2119 } else { 0x2118 }, value)
    }

    /// `$2122` CGDATA
    fn write_cgram(&mut self, value: u8) {
        self.write_b(0x2122, value)
    }

    /// `$2180` WMDATA
    fn write_wram_port(&mut self, value: u8) {
        self.write_b(0x2180, value)
    }

    fn set_open_bus(&mut self, _value: u8) {}

    /// Raised while a (H)DMA touches WRAM on the A-Bus. WRAM cannot serve `$2180` at the same time.
    fn set_wram_conflict(&mut self, _conflict: bool) {}

    /// OAM address invalidation after an HDMA write to `$2104`.
    fn reset_oam_address(&mut self, _addr: u16) {}
}
