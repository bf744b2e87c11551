//! Transport frame object

use emvlcb_core::{BusAddress, Priority};

/// Classic CAN maximum transmission unit
pub const MTU: usize = 8;

/// Header of a standard (11-bit) frame
///
/// The identifier encodes the priority above the 7-bit bus address of the sender:
/// `priority << 7 | address`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Header {
    pub priority: Priority,
    pub address: BusAddress,
}

impl Header {
    const ADDRESS_BITS: u16 = 7;

    pub const fn new(address: BusAddress) -> Self {
        Self {
            priority: Priority::DEFAULT,
            address,
        }
    }

    pub const fn from_standard_id(id: u16) -> Self {
        Self {
            priority: Priority::from_u8_truncating((id >> Self::ADDRESS_BITS) as u8),
            address: BusAddress::from_u8_truncating(id as u8),
        }
    }

    pub const fn into_standard_id(self) -> u16 {
        (self.priority.into_u8() as u16) << Self::ADDRESS_BITS | self.address.into_u8() as u16
    }
}

/// CAN frame identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Id {
    Standard(Header),
    /// 29-bit identifier. Used by bootloaders only, the node engine ignores such frames.
    Extended(u32),
}

/// Classic CAN frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    pub id: Id,
    pub remote: bool,
    pub data: Data,
}

impl Frame {
    /// Creates a standard data frame.
    pub fn new(header: Header, data: Data) -> Self {
        Self {
            id: Id::Standard(header),
            remote: false,
            data,
        }
    }

    /// Creates a zero-length standard remote request frame.
    pub fn new_remote(header: Header) -> Self {
        Self {
            id: Id::Standard(header),
            remote: true,
            data: Data::default(),
        }
    }

    pub fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    /// Sender header for standard frames
    pub fn header(&self) -> Option<Header> {
        match self.id {
            Id::Standard(header) => Some(header),
            Id::Extended(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidLength;

/// Classic CAN data vector, 0 to 8 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Data {
    length: u8,
    bytes: [u8; MTU],
}

impl Data {
    /// Creates a new vector from a slice of compatible length.
    pub fn new(data: &[u8]) -> Result<Self, InvalidLength> {
        if data.len() > MTU {
            return Err(InvalidLength);
        }
        let mut bytes = [0; MTU];
        bytes[..data.len()].copy_from_slice(data);

        Ok(Self {
            length: data.len() as u8,
            bytes,
        })
    }

    pub fn len(&self) -> usize {
        usize::from(self.length)
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl core::ops::Deref for Data {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.bytes[..usize::from(self.length)]
    }
}

impl core::ops::DerefMut for Data {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.bytes[..usize::from(self.length)]
    }
}

impl AsRef<[u8]> for Data {
    fn as_ref(&self) -> &[u8] {
        self
    }
}
