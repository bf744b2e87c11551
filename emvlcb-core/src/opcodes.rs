//! Opcode table
//!
//! The three most significant bits of an opcode encode the number of data bytes that follow
//! it, see [`data_length`].

pub const ACK: u8 = 0x00;
pub const NAK: u8 = 0x01;
pub const RQNP: u8 = 0x10;
pub const RQMN: u8 = 0x11;
pub const QNN: u8 = 0x0d;

pub const SNN: u8 = 0x42;
pub const NNRSM: u8 = 0x4f;
pub const RQNN: u8 = 0x50;
pub const NNREL: u8 = 0x51;
pub const NNACK: u8 = 0x52;
pub const NNLRN: u8 = 0x53;
pub const NNULN: u8 = 0x54;
pub const NNCLR: u8 = 0x55;
pub const NNEVN: u8 = 0x56;
pub const NERD: u8 = 0x57;
pub const RQEVN: u8 = 0x58;
pub const WRACK: u8 = 0x59;
pub const BOOT: u8 = 0x5c;
pub const ENUM: u8 = 0x5d;
pub const NNRST: u8 = 0x5e;
pub const CMDERR: u8 = 0x6f;

pub const EVNLF: u8 = 0x70;
pub const NVRD: u8 = 0x71;
pub const NENRD: u8 = 0x72;
pub const RQNPN: u8 = 0x73;
pub const NUMEV: u8 = 0x74;
pub const CANID: u8 = 0x75;
pub const MODE: u8 = 0x76;
pub const RQSD: u8 = 0x78;

pub const RDGN: u8 = 0x87;
pub const NVSETRD: u8 = 0x8e;

pub const ACON: u8 = 0x90;
pub const ACOF: u8 = 0x91;
pub const EVULN: u8 = 0x95;
pub const NVSET: u8 = 0x96;
pub const NVANS: u8 = 0x97;
pub const ASON: u8 = 0x98;
pub const ASOF: u8 = 0x99;
pub const PARAN: u8 = 0x9b;
pub const REVAL: u8 = 0x9c;

pub const HEARTB: u8 = 0xab;
pub const SD: u8 = 0xac;
pub const GRSP: u8 = 0xaf;

pub const ACON1: u8 = 0xb0;
pub const ACOF1: u8 = 0xb1;
pub const REQEV: u8 = 0xb2;
pub const NEVAL: u8 = 0xb5;
pub const PNN: u8 = 0xb6;
pub const ASON1: u8 = 0xb8;
pub const ASOF1: u8 = 0xb9;

pub const DGN: u8 = 0xc7;

pub const ACON2: u8 = 0xd0;
pub const ACOF2: u8 = 0xd1;
pub const EVLRN: u8 = 0xd2;
pub const EVANS: u8 = 0xd3;
pub const ASON2: u8 = 0xd8;
pub const ASOF2: u8 = 0xd9;

pub const NAME: u8 = 0xe2;
pub const ESD: u8 = 0xe7;
pub const DTXC: u8 = 0xe9;
pub const PARAMS: u8 = 0xef;

pub const ACON3: u8 = 0xf0;
pub const ACOF3: u8 = 0xf1;
pub const ENRSP: u8 = 0xf2;
pub const ASON3: u8 = 0xf8;
pub const ASOF3: u8 = 0xf9;

/// Number of data bytes following the opcode
pub const fn data_length(opcode: u8) -> usize {
    (opcode >> 5) as usize
}

/// Total message length including the opcode byte
pub const fn message_length(opcode: u8) -> usize {
    data_length(opcode) + 1
}

/// Accessory event opcodes
///
/// `short` events are identified by the event number alone, `on` distinguishes the ON/OFF
/// variants and `data` counts the trailing data bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventOpcode {
    pub short: bool,
    pub on: bool,
    pub data: u8,
}

impl EventOpcode {
    pub const fn decode(opcode: u8) -> Option<Self> {
        let (short, on, data) = match opcode {
            ACON => (false, true, 0),
            ACOF => (false, false, 0),
            ASON => (true, true, 0),
            ASOF => (true, false, 0),
            ACON1 => (false, true, 1),
            ACOF1 => (false, false, 1),
            ASON1 => (true, true, 1),
            ASOF1 => (true, false, 1),
            ACON2 => (false, true, 2),
            ACOF2 => (false, false, 2),
            ASON2 => (true, true, 2),
            ASOF2 => (true, false, 2),
            ACON3 => (false, true, 3),
            ACOF3 => (false, false, 3),
            ASON3 => (true, true, 3),
            ASOF3 => (true, false, 3),
            _ => return None,
        };
        Some(Self { short, on, data })
    }

    pub const fn encode(self) -> Option<u8> {
        let opcode = match (self.short, self.on, self.data) {
            (false, true, 0) => ACON,
            (false, false, 0) => ACOF,
            (true, true, 0) => ASON,
            (true, false, 0) => ASOF,
            (false, true, 1) => ACON1,
            (false, false, 1) => ACOF1,
            (true, true, 1) => ASON1,
            (true, false, 1) => ASOF1,
            (false, true, 2) => ACON2,
            (false, false, 2) => ACOF2,
            (true, true, 2) => ASON2,
            (true, false, 2) => ASOF2,
            (false, true, 3) => ACON3,
            (false, false, 3) => ACOF3,
            (true, true, 3) => ASON3,
            (true, false, 3) => ASOF3,
            _ => return None,
        };
        Some(opcode)
    }
}
