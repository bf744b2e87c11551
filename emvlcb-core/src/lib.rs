//! VLCB protocol core data types
//!
//! This crate provides basic data type definitions used by other emvlcb crates.
//! emvlcb users should not depend on this crate directly. Use `emvlcb::core` reexport instead.
#![no_std]

pub mod opcodes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidValue;

/// CAN frame priority
///
/// Four bits placed above the bus address in the 11-bit identifier: two major bits followed
/// by two minor bits. Lower values win arbitration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Priority(u8);

impl Priority {
    const MAX_VALUE: u8 = 0x0f;
    /// Priority used by regular node traffic
    pub const DEFAULT: Priority = Priority(0b1011);
    pub const HIGHEST: Priority = Priority(0b0000);
    pub const LOWEST: Priority = Priority(0b1111);

    pub const fn new(value: u8) -> Option<Self> {
        if value <= Self::MAX_VALUE {
            Some(Self::from_u8_truncating(value))
        } else {
            None
        }
    }

    pub const fn from_u8_truncating(value: u8) -> Self {
        Self(value & Self::MAX_VALUE)
    }

    pub const fn into_u8(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<Priority> for u8 {
    fn from(value: Priority) -> Self {
        value.into_u8()
    }
}

impl TryFrom<u8> for Priority {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(InvalidValue)
    }
}

/// 7-bit node address on the CAN bus (CAN ID)
///
/// Distinct from the logical node number. Zero means "not assigned yet".
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusAddress(u8);

impl BusAddress {
    const MAX_VALUE: u8 = 0x7f;
    pub const MAX: BusAddress = BusAddress(0x7f);
    pub const UNASSIGNED: BusAddress = BusAddress(0);
    /// Lowest address a node may claim
    pub const MIN_ASSIGNABLE: BusAddress = BusAddress(1);
    /// Highest address a node may claim
    pub const MAX_ASSIGNABLE: BusAddress = BusAddress(99);

    pub const fn new(value: u8) -> Option<Self> {
        if value <= Self::MAX_VALUE {
            Some(Self::from_u8_truncating(value))
        } else {
            None
        }
    }

    pub const fn from_u8_truncating(value: u8) -> Self {
        Self(value & Self::MAX_VALUE)
    }

    pub const fn into_u8(self) -> u8 {
        self.0
    }

    pub const fn is_assigned(self) -> bool {
        self.0 != 0
    }

    /// Whether a node may claim this address
    pub const fn is_assignable(self) -> bool {
        self.0 >= Self::MIN_ASSIGNABLE.0 && self.0 <= Self::MAX_ASSIGNABLE.0
    }
}

impl From<BusAddress> for u8 {
    fn from(value: BusAddress) -> Self {
        value.into_u8()
    }
}

impl From<BusAddress> for usize {
    fn from(value: BusAddress) -> Self {
        value.into_u8().into()
    }
}

impl TryFrom<u8> for BusAddress {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(InvalidValue)
    }
}

/// Node operating mode
///
/// The numeric encoding matches both the persisted mode byte and the MODE opcode argument.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Mode {
    /// No node number has been claimed. This is the state of a freshly reset module.
    Uninitialised = 0xff,
    /// A node number negotiation is in progress.
    Setup = 0x00,
    /// The node owns a node number and takes part in normal traffic.
    Normal = 0x01,
}

impl Mode {
    pub const fn into_u8(self) -> u8 {
        self as u8
    }

    pub const fn try_from_u8(value: u8) -> Option<Self> {
        match value {
            0xff => Some(Mode::Uninitialised),
            0x00 => Some(Mode::Setup),
            0x01 => Some(Mode::Normal),
            _ => None,
        }
    }
}

impl From<Mode> for u8 {
    fn from(value: Mode) -> Self {
        value.into_u8()
    }
}

impl TryFrom<u8> for Mode {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from_u8(value).ok_or(InvalidValue)
    }
}

/// Argument of the MODE opcode
///
/// Besides switching the operating mode, MODE toggles a few sub-modes owned by
/// individual services.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ModeCommand {
    Setup = 0x00,
    Normal = 0x01,
    LearnOn = 0x08,
    LearnOff = 0x09,
    EventAckOn = 0x0a,
    EventAckOff = 0x0b,
    HeartbeatOn = 0x0c,
    HeartbeatOff = 0x0d,
}

impl ModeCommand {
    pub const fn try_from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(ModeCommand::Setup),
            0x01 => Some(ModeCommand::Normal),
            0x08 => Some(ModeCommand::LearnOn),
            0x09 => Some(ModeCommand::LearnOff),
            0x0a => Some(ModeCommand::EventAckOn),
            0x0b => Some(ModeCommand::EventAckOff),
            0x0c => Some(ModeCommand::HeartbeatOn),
            0x0d => Some(ModeCommand::HeartbeatOff),
            _ => None,
        }
    }

    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ModeCommand {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from_u8(value).ok_or(InvalidValue)
    }
}

/// Protocol identifier of a capability service, reported by service discovery
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceId(u8);

impl ServiceId {
    pub const MINIMUM_NODE: ServiceId = ServiceId(1);
    pub const NODE_VARIABLE: ServiceId = ServiceId(2);
    pub const CAN: ServiceId = ServiceId(3);
    pub const EVENT_TEACHING: ServiceId = ServiceId(4);
    pub const EVENT_PRODUCER: ServiceId = ServiceId(5);
    pub const EVENT_CONSUMER: ServiceId = ServiceId(6);
    pub const EVENT_ACKNOWLEDGE: ServiceId = ServiceId(9);
    pub const LONG_MESSAGE: ServiceId = ServiceId(17);

    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub const fn into_u8(self) -> u8 {
        self.0
    }
}

impl From<ServiceId> for u8 {
    fn from(value: ServiceId) -> Self {
        value.into_u8()
    }
}

/// Error code carried by the CMDERR opcode
///
/// The same numeric values are reused as GRSP result codes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CommandError {
    InvalidCommand = 1,
    NotInLearnMode = 2,
    NotInSetupMode = 3,
    TooManyEvents = 4,
    NoEvent = 5,
    InvalidEventVariableIndex = 6,
    InvalidEvent = 7,
    InvalidEventIndex = 8,
    InvalidParameterIndex = 9,
    InvalidNodeVariableIndex = 10,
    InvalidEventVariableValue = 11,
    InvalidNodeVariableValue = 12,
}

impl CommandError {
    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

impl From<CommandError> for u8 {
    fn from(value: CommandError) -> Self {
        value.into_u8()
    }
}

/// Result code carried by the GRSP (general response) opcode
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResponseCode(u8);

impl ResponseCode {
    pub const OK: ResponseCode = ResponseCode(0);
    pub const INVALID_MODE: ResponseCode = ResponseCode(0xfa);
    pub const INVALID_COMMAND_PARAMETER: ResponseCode = ResponseCode(0xfb);
    pub const INVALID_SERVICE: ResponseCode = ResponseCode(0xfc);
    pub const INVALID_DIAGNOSTIC: ResponseCode = ResponseCode(0xfd);
    pub const UNKNOWN_NVM_TYPE: ResponseCode = ResponseCode(0xfe);

    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub const fn into_u8(self) -> u8 {
        self.0
    }

    pub const fn is_ok(self) -> bool {
        self.0 == Self::OK.0
    }
}

impl From<CommandError> for ResponseCode {
    fn from(value: CommandError) -> Self {
        Self(value.into_u8())
    }
}

impl From<ResponseCode> for u8 {
    fn from(value: ResponseCode) -> Self {
        value.into_u8()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_address_range() {
        assert_eq!(BusAddress::new(0x80), None);
        assert_eq!(BusAddress::from_u8_truncating(0x85).into_u8(), 0x05);
        assert!(!BusAddress::UNASSIGNED.is_assignable());
        assert!(BusAddress::new(99).unwrap().is_assignable());
        assert!(!BusAddress::new(100).unwrap().is_assignable());
    }

    #[test]
    fn test_mode_encoding() {
        for mode in [Mode::Uninitialised, Mode::Setup, Mode::Normal] {
            assert_eq!(Mode::try_from(mode.into_u8()).unwrap(), mode);
        }
        assert!(Mode::try_from(0x02).is_err());
    }

    #[test]
    fn test_priority_default() {
        assert_eq!(Priority::default().into_u8(), 0b1011);
        assert_eq!(Priority::new(0x10), None);
    }
}
