//! # emvlcb
//!
//! This library implements a VLCB (CBUS) node for no_std devices: the protocol engine that lets
//! a model-railway accessory controller join a shared CAN bus, negotiate its identity and take
//! part in event exchange. It uses fixed-capacity containers and user-provided buffers, requiring
//! no dynamic memory allocation.
//!
//! ## Architecture
//!
//! ```text
//!                  ┌────────┐
//!                  │ Runner │
//!                  └────┬───┘
//!                       ▼
//! ┌───────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Transport ├──►│ Coordinator ├──►│ Action queue │
//! └───────────┘   └──┬───────┬──┘   └──────────────┘
//!                    │       │
//!       ┌────────────┘       └────────────┐
//!       ▼                                 ▼
//! ┌─────────────┐  ┌───────────┐  ┌───────────────┐
//! │ Node config ├─►│ ByteStore │  │ Service 1..N  │
//! └─────────────┘  └───────────┘  └───────────────┘
//! ```
//! Components:
//! * _Coordinator_ owns the node state and drives the services. Each processing cycle pops at
//!   most one action and offers it to every service.
//! * _Services_ implement the protocol capabilities: minimum node (identity, mode, parameters,
//!   discovery, heartbeat), CAN transport and bus address enumeration, node variables, event
//!   teaching, consumption, production and acknowledgement, and long messages. Every service
//!   answers diagnostic requests for its own counters.
//! * _Node config_ keeps the identity, node variables and learned events in a byte store,
//!   with a hash index for fast event lookup.
//! * _Transport_ moves classic CAN frames to and from the driver, typically through a
//!   [`link::Link`].
//! * _Runner_ is an async task calling the coordinator on a fixed period. Superloop firmware
//!   may call [`node::Coordinator::process`] directly instead.
//!
//! ## Concurrency model
//!
//! The engine is single-threaded and never blocks. The driver interrupt handler pushes received
//! frames into the link channel; the engine polls it once per cycle. Multi-frame replies are
//! paced over several cycles so that a large answer never floods the action queue.
//!
//! The action queue is bounded. When it overflows the oldest action is dropped and counted.
//!
//! ## Limitations
//!
//! * Only the CAN transport is supported.
//! * Firmware upgrade (bootloader) traffic is ignored.
//! * Long message CRC is neither generated nor checked.
#![no_std]

pub use emvlcb_core as core;
pub use emvlcb_driver::{frame, link, time, transport};

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod action;
pub mod config;
pub mod enumeration;
pub mod message;
pub mod node;
pub mod params;
pub mod service;
pub mod store;
#[allow(dead_code)]
mod utils;

pub use utils::{QueueError, QueueStats};
