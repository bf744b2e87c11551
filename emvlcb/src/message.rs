//! Application-level protocol message
//!
//! A message is the payload of a standard data frame: an opcode followed by up to seven data
//! bytes. Most node-addressed opcodes carry the big-endian target node number in bytes 1-2.

use crate::core::opcodes;
use crate::frame::{Data, InvalidLength};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Message(Data);

impl Message {
    pub fn new(bytes: &[u8]) -> Result<Self, InvalidLength> {
        Ok(Self(Data::new(bytes)?))
    }

    /// Builds a message addressed by node number: `[opcode, nn_hi, nn_lo, args...]`.
    ///
    /// At most five arguments fit a classic frame.
    pub fn with_node_number(opcode: u8, node_number: u16, args: &[u8]) -> Self {
        let mut bytes = [0u8; 8];
        let length = 3 + args.len();
        assert!(length <= bytes.len());
        bytes[0] = opcode;
        bytes[1..3].copy_from_slice(&node_number.to_be_bytes());
        bytes[3..length].copy_from_slice(args);
        Self(unwrap!(Data::new(&bytes[..length])))
    }

    pub fn data(&self) -> &Data {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn opcode(&self) -> Option<u8> {
        self.0.first().copied()
    }

    /// Whether the message holds all data bytes its opcode requires
    pub fn is_complete(&self) -> bool {
        self.opcode()
            .is_some_and(|opcode| self.len() >= opcodes::message_length(opcode))
    }

    pub fn byte(&self, index: usize) -> Option<u8> {
        self.0.get(index).copied()
    }

    /// Big-endian 16-bit field starting at `index`
    pub fn u16_at(&self, index: usize) -> Option<u16> {
        let hi = self.byte(index)?;
        let lo = self.byte(index + 1)?;
        Some(u16::from_be_bytes([hi, lo]))
    }

    /// Target node number of a node-addressed opcode
    pub fn node_number(&self) -> Option<u16> {
        self.u16_at(1)
    }
}

impl From<Data> for Message {
    fn from(value: Data) -> Self {
        Self(value)
    }
}

impl core::ops::Deref for Message {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_addressed_layout() {
        let msg = Message::with_node_number(opcodes::NVSET, 0x0104, &[7, 42]);
        assert_eq!(&*msg, [opcodes::NVSET, 0x01, 0x04, 7, 42]);
        assert_eq!(msg.node_number(), Some(0x0104));
        assert!(msg.is_complete());
    }

    #[test]
    fn test_short_message() {
        let msg = Message::new(&[opcodes::NVSET, 0x01, 0x04]).unwrap();
        assert!(!msg.is_complete());
        assert_eq!(msg.byte(3), None);
        assert_eq!(Message::default().opcode(), None);
    }
}
