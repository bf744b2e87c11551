//! Persistent node configuration
//!
//! [`NodeConfig`] owns the byte store and keeps a RAM copy of the node identity. Store layout:
//!
//! | address                   | content                                   |
//! |---------------------------|-------------------------------------------|
//! | 0                         | mode byte                                 |
//! | 1                         | bus address                               |
//! | 2..=3                     | node number, big-endian                   |
//! | 4                         | flags                                     |
//! | 5                         | reset marker                              |
//! | `node_variable_address`.. | node variables, one byte each             |
//! | `event_address`..         | learned events, `4 + event_variable_count` bytes each |
//!
//! An event record starts with the big-endian event node number and event number. A record
//! whose first four bytes are all erased is a free slot.
//!
//! Learned events are located through a hash index holding one byte per slot: zero marks a
//! free slot, any other value is [`event_hash`] of the stored event. Hashes collide, so every
//! hit is verified against the record itself.

use heapless::Vec;

use crate::core::{BusAddress, Mode};
use crate::store::{ByteStore, ERASED, Restart};

const MODE_ADDRESS: usize = 0;
const BUS_ADDRESS_ADDRESS: usize = 1;
const NODE_NUMBER_ADDRESS: usize = 2;
const FLAGS_ADDRESS: usize = 4;
const RESET_MARKER_ADDRESS: usize = 5;
/// Size of the identity block at the start of the store
pub const IDENTITY_SIZE: usize = 10;

const RESET_PERFORMED: u8 = 0x99;
const EVENT_HEADER_SIZE: usize = 4;

/// Maximal number of learned event slots
pub const MAX_EVENT_COUNT: usize = 255;
/// Maximal number of variables per learned event
pub const MAX_EVENT_VARIABLE_COUNT: u8 = 20;

/// Node flag bits
pub mod flags {
    pub const HEARTBEAT: u8 = 0x01;
    pub const EVENT_ACK: u8 = 0x02;

    pub const DEFAULT: u8 = HEARTBEAT;
}

/// Store region sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub struct Layout {
    pub node_variable_count: u8,
    pub node_variable_address: usize,
    pub event_count: u8,
    pub event_variable_count: u8,
    pub event_address: usize,
}

impl Layout {
    /// Creates a layout with the node variables placed right after the identity block and
    /// the event table right after the node variables.
    pub const fn new(node_variable_count: u8, event_count: u8, event_variable_count: u8) -> Self {
        Self {
            node_variable_count,
            node_variable_address: IDENTITY_SIZE,
            event_count,
            event_variable_count,
            event_address: IDENTITY_SIZE + node_variable_count as usize,
        }
    }

    pub const fn event_size(&self) -> usize {
        EVENT_HEADER_SIZE + self.event_variable_count as usize
    }

    /// Address past the last used byte
    pub const fn end(&self) -> usize {
        self.event_address + self.event_count as usize * self.event_size()
    }

    pub fn validate(&self, capacity: usize) -> Result<(), LayoutError> {
        if self.node_variable_address < IDENTITY_SIZE
            || self.event_address < IDENTITY_SIZE
            || self.regions_overlap()
        {
            return Err(LayoutError::Overlap);
        }
        if self.event_variable_count > MAX_EVENT_VARIABLE_COUNT {
            return Err(LayoutError::TooManyEventVariables);
        }
        if self.end() > capacity
            || self.node_variable_address + usize::from(self.node_variable_count) > capacity
        {
            return Err(LayoutError::OutOfCapacity);
        }
        Ok(())
    }

    fn regions_overlap(&self) -> bool {
        let nv_start = self.node_variable_address;
        let nv_end = nv_start + usize::from(self.node_variable_count);
        let ev_start = self.event_address;
        let ev_end = self.end();
        nv_start < ev_end && ev_start < nv_end
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::new(16, 64, 4)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LayoutError {
    /// Regions overlap each other or the identity block
    Overlap,
    TooManyEventVariables,
    /// Layout does not fit the store
    OutOfCapacity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventError {
    NotFound,
    TableFull,
    InvalidSlot,
    InvalidVariableIndex,
}

/// Hash index value of a learned event
///
/// Never returns zero, which marks a free slot. The remapped value lies outside the regular
/// `0..128` range.
pub const fn event_hash(node_number: u16, event_number: u16) -> u8 {
    let hi = (node_number ^ (node_number >> 8)) as u8;
    let lo = (event_number ^ (event_number >> 8)) as u8;
    let hash = (7u16 * hi as u16 + lo as u16) % 128;
    if hash == 0 { 255 } else { hash as u8 }
}

/// Node identity, node variables and learned events
pub struct NodeConfig<'a> {
    store: &'a mut dyn ByteStore,
    layout: Layout,
    mode: Mode,
    node_number: u16,
    bus_address: BusAddress,
    flags: u8,
    learn: bool,
    hash_index: Vec<u8, MAX_EVENT_COUNT>,
}

impl<'a> NodeConfig<'a> {
    /// Creates a configuration over `store`.
    ///
    /// Nothing is read until [`NodeConfig::begin`] is called.
    pub fn new(store: &'a mut dyn ByteStore, layout: Layout) -> Result<Self, LayoutError> {
        layout.validate(store.capacity())?;
        let mut hash_index = Vec::new();
        unwrap!(hash_index.resize(usize::from(layout.event_count), 0));

        Ok(Self {
            store,
            layout,
            mode: Mode::Uninitialised,
            node_number: 0,
            bus_address: BusAddress::UNASSIGNED,
            flags: flags::DEFAULT,
            learn: false,
            hash_index,
        })
    }

    /// Loads the stored identity and rebuilds the hash index.
    ///
    /// A virgin store is factory reset and the device restarted.
    pub fn begin(&mut self, restart: &mut dyn Restart) {
        let mode = self.store.read(MODE_ADDRESS);
        let node_number = self.read_u16(NODE_NUMBER_ADDRESS);
        if mode == ERASED && node_number == 0xffff {
            warn!("Virgin store detected");
            self.reset_to_factory_defaults(restart);
        }

        self.node_number = node_number;
        self.mode = match Mode::try_from_u8(mode) {
            Some(Mode::Normal) => Mode::Normal,
            Some(Mode::Setup) if node_number != 0 => Mode::Normal,
            _ => Mode::Uninitialised,
        };
        self.bus_address = BusAddress::from_u8_truncating(self.store.read(BUS_ADDRESS_ADDRESS));
        self.flags = self.store.read(FLAGS_ADDRESS);
        self.learn = false;
        self.rebuild_hash_index();

        debug!(
            "Configuration loaded: mode {}, node number {}, bus address {}",
            self.mode.into_u8(),
            self.node_number,
            self.bus_address.into_u8()
        );
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        self.store.write(MODE_ADDRESS, mode.into_u8());
    }

    pub fn node_number(&self) -> u16 {
        self.node_number
    }

    pub fn set_node_number(&mut self, node_number: u16) {
        self.node_number = node_number;
        self.store
            .write_bytes(NODE_NUMBER_ADDRESS, &node_number.to_be_bytes());
    }

    pub fn bus_address(&self) -> BusAddress {
        self.bus_address
    }

    pub fn set_bus_address(&mut self, address: BusAddress) {
        self.bus_address = address;
        self.store.write(BUS_ADDRESS_ADDRESS, address.into_u8());
    }

    pub fn heartbeat_enabled(&self) -> bool {
        self.flags & flags::HEARTBEAT != 0
    }

    pub fn set_heartbeat(&mut self, enabled: bool) {
        self.set_flag(flags::HEARTBEAT, enabled);
    }

    pub fn event_ack_enabled(&self) -> bool {
        self.flags & flags::EVENT_ACK != 0
    }

    pub fn set_event_ack(&mut self, enabled: bool) {
        self.set_flag(flags::EVENT_ACK, enabled);
    }

    fn set_flag(&mut self, flag: u8, enabled: bool) {
        if enabled {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
        self.store.write(FLAGS_ADDRESS, self.flags);
    }

    /// Volatile learn mode flag, cleared on start-up
    pub fn learn(&self) -> bool {
        self.learn
    }

    pub fn set_learn(&mut self, learn: bool) {
        self.learn = learn;
    }

    /// Whether the last start-up followed a factory reset
    pub fn reset_performed(&self) -> bool {
        self.store.read(RESET_MARKER_ADDRESS) == RESET_PERFORMED
    }

    pub fn clear_reset_marker(&mut self) {
        self.store.write(RESET_MARKER_ADDRESS, 0);
    }

    /// Wipes the store and restores the factory identity.
    pub fn factory_reset(&mut self) {
        warn!("Factory reset");
        self.store.reset();
        self.set_mode(Mode::Uninitialised);
        self.set_node_number(0);
        self.set_bus_address(BusAddress::UNASSIGNED);
        self.flags = flags::DEFAULT;
        self.store.write(FLAGS_ADDRESS, self.flags);
        for index in 1..=self.layout.node_variable_count {
            self.write_node_variable(index, 0);
        }
        self.store.write(RESET_MARKER_ADDRESS, RESET_PERFORMED);
        self.learn = false;
        // Erasing left every event record free
        self.hash_index.fill(0);
    }

    pub fn reset_to_factory_defaults(&mut self, restart: &mut dyn Restart) -> ! {
        self.factory_reset();
        restart.restart()
    }

    pub fn node_variable_count(&self) -> u8 {
        self.layout.node_variable_count
    }

    /// Reads a node variable. The index is 1-based and must be in range.
    pub fn read_node_variable(&self, index: u8) -> u8 {
        self.store.read(self.node_variable_address(index))
    }

    pub fn write_node_variable(&mut self, index: u8, value: u8) {
        let address = self.node_variable_address(index);
        self.store.write(address, value);
    }

    fn node_variable_address(&self, index: u8) -> usize {
        debug_assert!(index >= 1 && index <= self.layout.node_variable_count);
        self.layout.node_variable_address + usize::from(index) - 1
    }

    pub fn event_count(&self) -> u8 {
        self.layout.event_count
    }

    pub fn event_variable_count(&self) -> u8 {
        self.layout.event_variable_count
    }

    pub fn hash_index(&self) -> &[u8] {
        &self.hash_index
    }

    pub fn is_slot_free(&self, slot: u8) -> bool {
        self.hash_index
            .get(usize::from(slot))
            .is_none_or(|hash| *hash == 0)
    }

    pub fn stored_event_count(&self) -> u8 {
        self.hash_index.iter().filter(|hash| **hash != 0).count() as u8
    }

    pub fn free_slot_count(&self) -> u8 {
        self.layout.event_count - self.stored_event_count()
    }

    /// Returns the slot holding the event.
    pub fn find_event(&self, node_number: u16, event_number: u16) -> Result<u8, EventError> {
        let hash = event_hash(node_number, event_number);
        self.hash_index
            .iter()
            .enumerate()
            .filter(|(_, entry)| **entry == hash)
            .map(|(slot, _)| slot as u8)
            .find(|slot| self.read_event(*slot) == Ok((node_number, event_number)))
            .ok_or(EventError::NotFound)
    }

    pub fn find_free_slot(&self) -> Result<u8, EventError> {
        self.hash_index
            .iter()
            .position(|entry| *entry == 0)
            .map(|slot| slot as u8)
            .ok_or(EventError::TableFull)
    }

    /// Reads the (node number, event number) pair of a slot.
    pub fn read_event(&self, slot: u8) -> Result<(u16, u16), EventError> {
        let address = self.event_address(slot)?;
        Ok((self.read_u16(address), self.read_u16(address + 2)))
    }

    /// Writes the event identity of a slot. The hash index is not touched, see
    /// [`NodeConfig::update_hash_entry`].
    pub fn write_event(
        &mut self,
        slot: u8,
        node_number: u16,
        event_number: u16,
    ) -> Result<(), EventError> {
        let address = self.event_address(slot)?;
        let mut header = [0u8; EVENT_HEADER_SIZE];
        header[..2].copy_from_slice(&node_number.to_be_bytes());
        header[2..].copy_from_slice(&event_number.to_be_bytes());
        self.store.write_bytes(address, &header);
        Ok(())
    }

    /// Frees a slot. The hash index is not touched, see [`NodeConfig::update_hash_entry`].
    pub fn clear_event(&mut self, slot: u8) -> Result<(), EventError> {
        let address = self.event_address(slot)?;
        for offset in 0..self.layout.event_size() {
            self.store.write(address + offset, ERASED);
        }
        Ok(())
    }

    pub fn clear_all_events(&mut self) {
        for slot in 0..self.layout.event_count {
            if !self.is_slot_free(slot) {
                unwrap!(self.clear_event(slot));
            }
        }
        self.hash_index.fill(0);
    }

    /// Reads an event variable. The index is 1-based.
    pub fn read_event_variable(&self, slot: u8, index: u8) -> Result<u8, EventError> {
        let address = self.event_variable_address(slot, index)?;
        Ok(self.store.read(address))
    }

    pub fn write_event_variable(&mut self, slot: u8, index: u8, value: u8) -> Result<(), EventError> {
        let address = self.event_variable_address(slot, index)?;
        self.store.write(address, value);
        Ok(())
    }

    pub fn rebuild_hash_index(&mut self) {
        for slot in 0..self.layout.event_count {
            self.update_hash_entry(slot);
        }
    }

    /// Recomputes the hash index entry of one slot from the stored record.
    pub fn update_hash_entry(&mut self, slot: u8) {
        let Ok(address) = self.event_address(slot) else {
            return;
        };
        let mut header = [0u8; EVENT_HEADER_SIZE];
        self.store.read_bytes(address, &mut header);
        self.hash_index[usize::from(slot)] = if header == [ERASED; EVENT_HEADER_SIZE] {
            0
        } else {
            let node_number = u16::from_be_bytes([header[0], header[1]]);
            let event_number = u16::from_be_bytes([header[2], header[3]]);
            event_hash(node_number, event_number)
        };
    }

    fn event_address(&self, slot: u8) -> Result<usize, EventError> {
        if slot >= self.layout.event_count {
            return Err(EventError::InvalidSlot);
        }
        Ok(self.layout.event_address + usize::from(slot) * self.layout.event_size())
    }

    fn event_variable_address(&self, slot: u8, index: u8) -> Result<usize, EventError> {
        let address = self.event_address(slot)?;
        if index == 0 || index > self.layout.event_variable_count {
            return Err(EventError::InvalidVariableIndex);
        }
        Ok(address + EVENT_HEADER_SIZE + usize::from(index) - 1)
    }

    fn read_u16(&self, address: usize) -> u16 {
        let mut bytes = [0u8; 2];
        self.store.read_bytes(address, &mut bytes);
        u16::from_be_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::store::RamStore;

    struct PanicRestart;

    impl Restart for PanicRestart {
        fn restart(&mut self) -> ! {
            panic!("restart");
        }
    }

    fn formatted_store() -> RamStore<256> {
        let mut store = RamStore::new();
        let mut config = unwrap!(NodeConfig::new(&mut store, Layout::new(4, 8, 2)));
        config.factory_reset();
        store
    }

    #[test]
    fn test_hash_values() {
        assert_eq!(event_hash(0, 0), 255);
        assert_eq!(event_hash(0x0100, 1), 8);
        assert_eq!(event_hash(0, 0x0080), 255);
        for node_number in [0u16, 1, 256, 0xfffe] {
            for event_number in [0u16, 1, 300, 0xffff] {
                let hash = event_hash(node_number, event_number);
                assert!(hash != 0 && (hash < 128 || hash == 255));
            }
        }
    }

    #[test]
    fn test_layout_validation() {
        assert_eq!(Layout::new(4, 8, 2).validate(256), Ok(()));
        assert_eq!(
            Layout::new(4, 100, 4).validate(256),
            Err(LayoutError::OutOfCapacity)
        );
        let mut layout = Layout::new(4, 8, 2);
        layout.event_address = 12;
        assert_eq!(layout.validate(256), Err(LayoutError::Overlap));
        layout.event_address = 20;
        layout.node_variable_address = 4;
        assert_eq!(layout.validate(256), Err(LayoutError::Overlap));
    }

    #[test]
    fn test_virgin_store_restarts() {
        let mut store = RamStore::<256>::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut config = NodeConfig::new(&mut store, Layout::new(4, 8, 2)).unwrap();
            config.begin(&mut PanicRestart);
        }));
        assert!(result.is_err());

        let mut config = NodeConfig::new(&mut store, Layout::new(4, 8, 2)).unwrap();
        config.begin(&mut PanicRestart);
        assert_eq!(config.mode(), Mode::Uninitialised);
        assert_eq!(config.node_number(), 0);
        assert_eq!(config.bus_address(), BusAddress::UNASSIGNED);
        assert!(config.reset_performed());
        assert!(config.heartbeat_enabled());
        assert_eq!(config.read_node_variable(4), 0);
        assert_eq!(config.free_slot_count(), 8);
    }

    #[test]
    fn test_identity_persists() {
        let mut store = formatted_store();
        {
            let mut config = NodeConfig::new(&mut store, Layout::new(4, 8, 2)).unwrap();
            config.begin(&mut PanicRestart);
            config.set_node_number(0x1234);
            config.set_mode(Mode::Normal);
            config.set_bus_address(BusAddress::new(5).unwrap());
            config.set_event_ack(true);
            config.set_learn(true);
        }
        let mut config = NodeConfig::new(&mut store, Layout::new(4, 8, 2)).unwrap();
        config.begin(&mut PanicRestart);
        assert_eq!(config.node_number(), 0x1234);
        assert_eq!(config.mode(), Mode::Normal);
        assert_eq!(config.bus_address().into_u8(), 5);
        assert!(config.event_ack_enabled());
        assert!(!config.learn());
    }

    #[test]
    fn test_interrupted_setup_loads_as_previous_state() {
        let mut store = formatted_store();
        {
            let mut config = NodeConfig::new(&mut store, Layout::new(4, 8, 2)).unwrap();
            config.begin(&mut PanicRestart);
            config.set_mode(Mode::Setup);
        }
        {
            let mut config = NodeConfig::new(&mut store, Layout::new(4, 8, 2)).unwrap();
            config.begin(&mut PanicRestart);
            assert_eq!(config.mode(), Mode::Uninitialised);
            config.set_node_number(77);
            config.set_mode(Mode::Setup);
        }
        let mut config = NodeConfig::new(&mut store, Layout::new(4, 8, 2)).unwrap();
        config.begin(&mut PanicRestart);
        assert_eq!(config.mode(), Mode::Normal);
    }

    #[test]
    fn test_colliding_events_resolve_to_own_slots() {
        let mut store = formatted_store();
        let mut config = NodeConfig::new(&mut store, Layout::new(4, 8, 2)).unwrap();
        config.begin(&mut PanicRestart);

        // Both pairs hash to 8
        let first = (0x0100, 0x0001);
        let second = (0x0000, 0x0008);
        assert_eq!(event_hash(first.0, first.1), event_hash(second.0, second.1));

        for (node_number, event_number) in [first, second] {
            let slot = config.find_free_slot().unwrap();
            config.write_event(slot, node_number, event_number).unwrap();
            config.update_hash_entry(slot);
        }
        assert_eq!(config.find_event(first.0, first.1), Ok(0));
        assert_eq!(config.find_event(second.0, second.1), Ok(1));
        assert_eq!(config.find_event(0x0100, 0x0008), Err(EventError::NotFound));

        config.clear_event(0).unwrap();
        config.update_hash_entry(0);
        assert_eq!(config.find_event(first.0, first.1), Err(EventError::NotFound));
        assert_eq!(config.find_event(second.0, second.1), Ok(1));
        assert_eq!(config.find_free_slot(), Ok(0));
    }

    #[test]
    fn test_hash_index_matches_store() {
        let mut store = formatted_store();
        {
            let mut config = NodeConfig::new(&mut store, Layout::new(4, 8, 2)).unwrap();
            config.begin(&mut PanicRestart);
            for slot in [1u8, 4, 7] {
                config.write_event(slot, 300, u16::from(slot) * 11).unwrap();
                config.update_hash_entry(slot);
            }
            config.write_event_variable(4, 2, 0x55).unwrap();
        }
        let mut config = NodeConfig::new(&mut store, Layout::new(4, 8, 2)).unwrap();
        config.begin(&mut PanicRestart);
        for slot in 0..8u8 {
            let expected = match config.read_event(slot).unwrap() {
                (0xffff, 0xffff) => 0,
                (node_number, event_number) => event_hash(node_number, event_number),
            };
            assert_eq!(config.hash_index()[usize::from(slot)], expected);
        }
        assert_eq!(config.stored_event_count(), 3);
        assert_eq!(config.read_event_variable(4, 2), Ok(0x55));
        assert_eq!(
            config.read_event_variable(4, 3),
            Err(EventError::InvalidVariableIndex)
        );
        assert_eq!(config.read_event(8), Err(EventError::InvalidSlot));
    }

    #[test]
    fn test_table_full() {
        let mut store = formatted_store();
        let mut config = NodeConfig::new(&mut store, Layout::new(4, 8, 2)).unwrap();
        config.begin(&mut PanicRestart);
        for slot in 0..8u8 {
            config.write_event(slot, 1, u16::from(slot)).unwrap();
            config.update_hash_entry(slot);
        }
        assert_eq!(config.find_free_slot(), Err(EventError::TableFull));
        config.clear_all_events();
        assert_eq!(config.free_slot_count(), 8);
        assert_eq!(config.find_event(1, 3), Err(EventError::NotFound));
    }
}
