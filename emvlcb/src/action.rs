//! Units of work exchanged between the coordinator and its services

use crate::core::Mode;
use crate::message::Message;

/// Queued side effect
///
/// Actions are produced by the transport glue (inbound messages), by services (outbound
/// messages, mode and enumeration requests) and by the application (user requests).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    /// Message received from the bus
    MessageIn(Message),
    /// Message to be transmitted
    MessageOut(Message),
    /// Start a bus address enumeration. No-op while one is running.
    StartEnumeration { from_peer_request: bool },
    /// User request to advance the mode state machine
    ChangeMode,
    /// User request to negotiate a node number while keeping the current one
    Renegotiate,
    /// Something noteworthy happened; the user interface may blink
    IndicateActivity,
    /// The operating mode changed
    IndicateMode(Mode),
}
