use crate::bus::Bus;
use crate::dma::Dma;

/// Cycle accounting and event scheduling of the host.
///
/// `add_cycles` only advances the counter. The DMA engine calls `process_event` itself, once per
/// pending event, after every transferred byte. An event handler may run HDMA on the same `Dma`
/// (H-Blank during a long DMA); if that HDMA used the channel the DMA is running on, the DMA is killed.
pub trait Clock {
    fn add_cycles(&mut self, v: i32);
    fn cycles(&self) -> i32;
    /// Position of the next scheduled event. `process_event` must move it forward.
    fn next_event(&self) -> i32;
    fn process_event<B: Bus>(&mut self, dma: &mut Dma, bus: &mut B);

    fn nmi_pending(&self) -> bool {
        false
    }

    /// `None` when no NMI is scheduled.
    fn nmi_trigger_pos(&self) -> Option<i32> {
        None
    }

    fn set_nmi_trigger_pos(&mut self, _pos: i32) {}
}
