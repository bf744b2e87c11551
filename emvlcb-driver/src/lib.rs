//! emvlcb driver interface
//!
//! The crate provides an interface between a CAN device driver and the emvlcb stack.
//! Limited scope facilitates compatibility across versions.
//! Driver crates should depend on this crate. emvlcb stack users should depend on
//! the `emvlcb` crate instead.
//!
//! The node engine is a polled state machine. It consumes frames through the [`Transport`]
//! trait and never runs inside interrupt context. A driver may implement `Transport` directly
//! or use a [`link::Link`]: a pair of single-producer/single-consumer channels with a
//! [`link::DriverPort`] for the interrupt handler and a [`link::NodePort`] for the engine.
//!
//! Only classic CAN frames are exchanged. Extended frames are passed through so that the engine
//! can recognize and ignore bootloader traffic.

#![no_std]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod frame;
pub mod link;
pub mod transport;

pub use transport::{SendError, Transport};

pub mod time {
    pub use embassy_time::{Duration, Instant};
}
