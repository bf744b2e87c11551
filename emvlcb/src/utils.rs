mod burst;
mod ring_queue;

pub use burst::Burst;
pub use ring_queue::{QueueError, QueueStats, RingQueue};

use embassy_time::{Duration, Instant};

/// `now + delay`, clamped to the end of time
pub fn deadline(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay).unwrap_or(Instant::MAX)
}

/// 128-bit set of bus addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AddressSet([u8; 16]);

impl AddressSet {
    pub const fn new() -> Self {
        Self([0; 16])
    }

    pub fn insert(&mut self, address: u8) {
        let address = usize::from(address & 0x7f);
        self.0[address / 8] |= 1 << (address % 8);
    }

    pub fn contains(&self, address: u8) -> bool {
        let address = usize::from(address & 0x7f);
        self.0[address / 8] & (1 << (address % 8)) != 0
    }

    pub fn clear(&mut self) {
        self.0 = [0; 16];
    }
}
