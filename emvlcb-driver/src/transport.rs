//! Frame transport consumed by the node engine

use crate::frame::Frame;

/// Frame could not be queued for transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SendError;

/// Polled frame transport
///
/// The engine polls the transport once per processing cycle and never blocks on it.
/// Implementations must not run engine code from interrupt context: a receive interrupt should
/// only make a frame available for the next `receive` call.
pub trait Transport {
    /// Whether a received frame is waiting
    fn available(&mut self) -> bool;

    /// Takes the oldest received frame
    fn receive(&mut self) -> Option<Frame>;

    /// Queues a frame for transmission without blocking
    fn send(&mut self, frame: &Frame) -> Result<(), SendError>;

    /// Drops pending frames in both directions
    fn reset(&mut self);
}
