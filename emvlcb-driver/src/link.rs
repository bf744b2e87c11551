//! Channels connecting driver and emvlcb stack

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, TrySendError};

use crate::frame::Frame;
use crate::transport::{SendError, Transport};

/// A pair of single-producer/single-consumer frame channels
///
/// The driver pushes received frames from its interrupt handler and pulls frames for
/// transmission; the engine sees the other ends through [`NodePort`], which implements
/// [`Transport`].
///
/// Use a `CriticalSectionRawMutex` when the driver pushes from an interrupt.
pub struct Link<M: RawMutex, const RX: usize, const TX: usize> {
    rx: Channel<M, Frame, RX>,
    tx: Channel<M, Frame, TX>,
}

impl<M: RawMutex, const RX: usize, const TX: usize> Link<M, RX, TX> {
    pub const fn new() -> Self {
        Self {
            rx: Channel::new(),
            tx: Channel::new(),
        }
    }

    pub fn split(&self) -> (DriverPort<'_, M, RX, TX>, NodePort<'_, M, RX, TX>) {
        let driver = DriverPort {
            rx: &self.rx,
            tx: &self.tx,
        };
        let node = NodePort {
            rx: &self.rx,
            tx: &self.tx,
        };
        (driver, node)
    }
}

impl<M: RawMutex, const RX: usize, const TX: usize> Default for Link<M, RX, TX> {
    fn default() -> Self {
        Self::new()
    }
}

/// Driver end of the link
pub struct DriverPort<'a, M: RawMutex, const RX: usize, const TX: usize> {
    rx: &'a Channel<M, Frame, RX>,
    tx: &'a Channel<M, Frame, TX>,
}

impl<'a, M: RawMutex, const RX: usize, const TX: usize> DriverPort<'a, M, RX, TX> {
    /// Pushes a received frame. Safe to call from an interrupt handler.
    ///
    /// Returns the frame back if the engine has fallen behind.
    pub fn push_received(&self, frame: Frame) -> Result<(), Frame> {
        self.rx.try_send(frame).map_err(|err| match err {
            TrySendError::Full(frame) => frame,
        })
    }

    /// Fetches the next frame for transmission, if any.
    pub fn pop_outgoing(&self) -> Option<Frame> {
        self.tx.try_receive().ok()
    }

    /// Asynchronously fetches the next frame for transmission. Safe to drop.
    pub async fn wait_outgoing(&self) -> Frame {
        self.tx.receive().await
    }
}

/// Engine end of the link
pub struct NodePort<'a, M: RawMutex, const RX: usize, const TX: usize> {
    rx: &'a Channel<M, Frame, RX>,
    tx: &'a Channel<M, Frame, TX>,
}

impl<'a, M: RawMutex, const RX: usize, const TX: usize> Transport for NodePort<'a, M, RX, TX> {
    fn available(&mut self) -> bool {
        !self.rx.is_empty()
    }

    fn receive(&mut self) -> Option<Frame> {
        self.rx.try_receive().ok()
    }

    fn send(&mut self, frame: &Frame) -> Result<(), SendError> {
        self.tx.try_send(*frame).map_err(|_| SendError)
    }

    fn reset(&mut self) {
        self.rx.clear();
        self.tx.clear();
    }
}
