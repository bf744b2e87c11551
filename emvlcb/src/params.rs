//! Module parameter block
//!
//! Parameters are read-only bytes describing the module, addressed by a 1-based index.
//! Index 0 reports the number of parameters.

use crate::config::Layout;
use crate::core::Mode;

/// Number of parameters following index 0
pub const PARAMETER_COUNT: u8 = 20;

/// Parameter indices
pub mod index {
    pub const MANUFACTURER: u8 = 1;
    pub const MINOR_VERSION: u8 = 2;
    pub const MODULE_ID: u8 = 3;
    pub const EVENT_COUNT: u8 = 4;
    pub const EVENT_VARIABLE_COUNT: u8 = 5;
    pub const NODE_VARIABLE_COUNT: u8 = 6;
    pub const MAJOR_VERSION: u8 = 7;
    pub const FLAGS: u8 = 8;
    pub const CPU_TYPE: u8 = 9;
    pub const INTERFACE: u8 = 10;
    pub const CPU_MANUFACTURER: u8 = 19;
    pub const BETA: u8 = 20;
}

/// Bits of the flags parameter
pub mod flags {
    pub const CONSUMER: u8 = 0x01;
    pub const PRODUCER: u8 = 0x02;
    pub const NORMAL: u8 = 0x04;
    pub const BOOTABLE: u8 = 0x08;
    pub const CONSUME_OWN_EVENTS: u8 = 0x10;
    pub const LEARN: u8 = 0x20;
    pub const VLCB: u8 = 0x40;
}

const INTERFACE_CAN: u8 = 1;

/// Static module description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub struct ModuleInfo {
    pub manufacturer: u8,
    pub module_id: u8,
    /// Module name without the "CAN" prefix, space padded
    pub name: [u8; 7],
    pub major_version: u8,
    /// Minor version letter
    pub minor_version: u8,
    /// Beta number, 0 for a release build
    pub beta: u8,
    pub cpu_type: u8,
    pub cpu_manufacturer: u8,
    pub bootable: bool,
}

impl Default for ModuleInfo {
    fn default() -> Self {
        Self {
            manufacturer: 13,
            module_id: 0,
            name: *b"VLCBNOD",
            major_version: 1,
            minor_version: b'a',
            beta: 0,
            cpu_type: 0,
            cpu_manufacturer: 0,
            bootable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Parameters {
    bytes: [u8; PARAMETER_COUNT as usize + 1],
    name: [u8; 7],
}

impl Parameters {
    /// Builds the parameter block. `service_flags` are the static flag bits contributed by
    /// the registered services.
    pub fn new(info: &ModuleInfo, layout: &Layout, service_flags: u8) -> Self {
        let mut bytes = [0u8; PARAMETER_COUNT as usize + 1];
        bytes[0] = PARAMETER_COUNT;
        bytes[usize::from(index::MANUFACTURER)] = info.manufacturer;
        bytes[usize::from(index::MINOR_VERSION)] = info.minor_version;
        bytes[usize::from(index::MODULE_ID)] = info.module_id;
        bytes[usize::from(index::EVENT_COUNT)] = layout.event_count;
        bytes[usize::from(index::EVENT_VARIABLE_COUNT)] = layout.event_variable_count;
        bytes[usize::from(index::NODE_VARIABLE_COUNT)] = layout.node_variable_count;
        bytes[usize::from(index::MAJOR_VERSION)] = info.major_version;

        let mut static_flags = service_flags | flags::VLCB;
        if info.bootable {
            static_flags |= flags::BOOTABLE;
        }
        bytes[usize::from(index::FLAGS)] = static_flags;
        bytes[usize::from(index::CPU_TYPE)] = info.cpu_type;
        bytes[usize::from(index::INTERFACE)] = INTERFACE_CAN;
        bytes[usize::from(index::CPU_MANUFACTURER)] = info.cpu_manufacturer;
        bytes[usize::from(index::BETA)] = info.beta;

        Self {
            bytes,
            name: info.name,
        }
    }

    pub fn count(&self) -> u8 {
        PARAMETER_COUNT
    }

    /// Reads a parameter, with the flags reflecting the current node state.
    pub fn get(&self, index: u8, mode: Mode, learn: bool) -> Option<u8> {
        if index == index::FLAGS {
            return Some(self.flags(mode, learn));
        }
        self.bytes.get(usize::from(index)).copied()
    }

    pub fn flags(&self, mode: Mode, learn: bool) -> u8 {
        let mut flags = self.bytes[usize::from(index::FLAGS)];
        if mode == Mode::Normal {
            flags |= flags::NORMAL;
        }
        if learn {
            flags |= flags::LEARN;
        }
        flags
    }

    pub fn manufacturer(&self) -> u8 {
        self.bytes[usize::from(index::MANUFACTURER)]
    }

    pub fn module_id(&self) -> u8 {
        self.bytes[usize::from(index::MODULE_ID)]
    }

    pub fn name(&self) -> &[u8; 7] {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_layout() {
        let info = ModuleInfo {
            manufacturer: 165,
            module_id: 32,
            ..Default::default()
        };
        let params = Parameters::new(&info, &Layout::new(8, 32, 3), flags::CONSUMER);

        assert_eq!(params.get(0, Mode::Normal, false), Some(20));
        assert_eq!(params.get(index::MANUFACTURER, Mode::Normal, false), Some(165));
        assert_eq!(params.get(index::MODULE_ID, Mode::Normal, false), Some(32));
        assert_eq!(params.get(index::EVENT_COUNT, Mode::Normal, false), Some(32));
        assert_eq!(params.get(index::EVENT_VARIABLE_COUNT, Mode::Normal, false), Some(3));
        assert_eq!(params.get(index::NODE_VARIABLE_COUNT, Mode::Normal, false), Some(8));
        assert_eq!(params.get(index::INTERFACE, Mode::Normal, false), Some(1));
        assert_eq!(params.get(21, Mode::Normal, false), None);
    }

    #[test]
    fn test_dynamic_flags() {
        let params = Parameters::new(&ModuleInfo::default(), &Layout::default(), flags::PRODUCER);
        assert_eq!(params.flags(Mode::Setup, false), flags::PRODUCER | flags::VLCB);
        assert_eq!(
            params.flags(Mode::Normal, true),
            flags::PRODUCER | flags::VLCB | flags::NORMAL | flags::LEARN
        );
    }
}
