// S-DD1 hook
//
// The decompressor is not emulated. Decoded data is handed over in advance with `load_decoded` and a
// DMA on a fixed-address channel streams it out while `$4801` is non-zero.

pub const DECODE_BUFFER_SIZE: usize = 0x10000;

pub struct Sdd1 {
    dma_ready: u8,
    decode_buffer: Box<[u8]>,
}

impl Default for Sdd1 {
    fn default() -> Self {
        Self {
            dma_ready: 0,
            decode_buffer: vec![0; DECODE_BUFFER_SIZE].into_boxed_slice(),
        }
    }
}

impl Sdd1 {
    /// `$4801`
    pub fn write_dma_ready(&mut self, value: u8) {
        self.dma_ready = value;
    }

    pub fn dma_ready(&self) -> u8 {
        self.dma_ready
    }

    /// Checks and clears `$4801`. The register is consumed by every DMA, whether it used it or not.
    pub(crate) fn take_dma_ready(&mut self) -> bool {
        let res = self.dma_ready != 0;
        self.dma_ready = 0;
        res
    }

    pub fn load_decoded(&mut self, data: &[u8]) {
        let n = data.len().min(DECODE_BUFFER_SIZE);
        self.decode_buffer[..n].copy_from_slice(&data[..n]);
    }

    pub(crate) fn byte(&self, idx: u16) -> u8 {
        self.decode_buffer[idx as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::Sdd1;

    #[test]
    fn test_dma_ready_is_one_shot() {
        let mut sdd1 = Sdd1::default();
        sdd1.write_dma_ready(0x01);
        assert!(sdd1.take_dma_ready());
        assert!(!sdd1.take_dma_ready());
        assert_eq!(sdd1.dma_ready(), 0);
    }

    #[test]
    fn test_load_decoded() {
        let mut sdd1 = Sdd1::default();
        sdd1.load_decoded(&[0xDE, 0xAD]);
        assert_eq!(sdd1.byte(0), 0xDE);
        assert_eq!(sdd1.byte(1), 0xAD);
        assert_eq!(sdd1.byte(2), 0x00);
    }
}
