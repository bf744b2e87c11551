//! Persistent byte storage contract
//!
//! Backends (internal EEPROM, external I2C EEPROM, flash page emulation) live outside the
//! stack. [`RamStore`] is a volatile backend for tests and hosted builds.

/// Value of an erased byte
pub const ERASED: u8 = 0xff;

/// Byte-addressable persistent store
///
/// Writes are expected to be durable once the call returns.
pub trait ByteStore {
    /// Number of addressable bytes
    fn capacity(&self) -> usize;

    fn read(&self, address: usize) -> u8;

    fn write(&mut self, address: usize, value: u8);

    fn read_bytes(&self, address: usize, buffer: &mut [u8]) {
        for (offset, byte) in buffer.iter_mut().enumerate() {
            *byte = self.read(address + offset);
        }
    }

    fn write_bytes(&mut self, address: usize, bytes: &[u8]) {
        for (offset, byte) in bytes.iter().enumerate() {
            self.write(address + offset, *byte);
        }
    }

    /// Erases the whole store to [`ERASED`]
    fn reset(&mut self);
}

/// Device restart hook
pub trait Restart {
    /// Restarts the device. Never returns.
    fn restart(&mut self) -> !;
}

/// Volatile store backed by an array
pub struct RamStore<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> RamStore<N> {
    /// Creates an erased store, as found on a factory-fresh device.
    pub const fn new() -> Self {
        Self { bytes: [ERASED; N] }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl<const N: usize> Default for RamStore<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ByteStore for RamStore<N> {
    fn capacity(&self) -> usize {
        N
    }

    fn read(&self, address: usize) -> u8 {
        self.bytes[address]
    }

    fn write(&mut self, address: usize, value: u8) {
        self.bytes[address] = value;
    }

    fn read_bytes(&self, address: usize, buffer: &mut [u8]) {
        buffer.copy_from_slice(&self.bytes[address..address + buffer.len()]);
    }

    fn write_bytes(&mut self, address: usize, bytes: &[u8]) {
        self.bytes[address..address + bytes.len()].copy_from_slice(bytes);
    }

    fn reset(&mut self) {
        self.bytes.fill(ERASED);
    }
}
