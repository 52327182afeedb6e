// Number of master cycles in one slow memory access. Every byte moved by (H)DMA costs this much.
pub const SLOW_ONE_CYCLE: i32 = 8;

#[derive(Clone, Copy, Debug)]
pub struct Timings {
    /// CPU/DMA clock alignment paid when HDMA kicks in.
    pub dma_cpu_sync: i32,
    /// NMI is pushed back by this many cycles after a DMA finishes.
    pub nmi_dma_delay: i32,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            dma_cpu_sync: 18,
            nmi_dma_delay: 24,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub timings: Timings,
    /// Cartridge carries an S-DD1.
    pub sdd1: bool,
    /// Reset OAM address to $10C when HDMA targets $2104 (Uniracers).
    pub oam_address_fix: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timings: Timings::default(),
            sdd1: false,
            oam_address_fix: true,
        }
    }
}

impl Config {
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "sdd1" => self.sdd1 = parse_switch(value)?,
            "oam-fix" => self.oam_address_fix = parse_switch(value)?,
            "dma-cpu-sync" => self.timings.dma_cpu_sync = value.parse().map_err(|e: std::num::ParseIntError| e.to_string())?,
            "nmi-dma-delay" => self.timings.nmi_dma_delay = value.parse().map_err(|e: std::num::ParseIntError| e.to_string())?,
            _ => return Err(format!("unknown setting: {}", key)),
        }
        Ok(())
    }
}

fn parse_switch(s: &str) -> Result<bool, String> {
    match s {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(format!("expected on/off, got {}", s)),
    }
}
