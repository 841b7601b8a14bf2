//! Owned USB descriptor model
//!
//! Backends copy the parts of the descriptor tree the scanner needs into these
//! plain values, so a `Candidate` can keep them after the backend frees its
//! own descriptor memory.

use rusb::{Direction, TransferType};

/// Device descriptor fields used during discovery and identification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub class_code: u8,
    pub num_configurations: u8,
    /// String descriptor indices (None when the device declares index 0)
    pub manufacturer_index: Option<u8>,
    pub product_index: Option<u8>,
    pub serial_number_index: Option<u8>,
}

impl DeviceDescriptor {
    /// `vvvv:pppp` label
    pub fn vid_pid(&self) -> String {
        format!("{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

impl From<&rusb::DeviceDescriptor> for DeviceDescriptor {
    fn from(desc: &rusb::DeviceDescriptor) -> Self {
        Self {
            vendor_id: desc.vendor_id(),
            product_id: desc.product_id(),
            class_code: desc.class_code(),
            num_configurations: desc.num_configurations(),
            manufacturer_index: desc.manufacturer_string_index(),
            product_index: desc.product_string_index(),
            serial_number_index: desc.serial_number_string_index(),
        }
    }
}

/// One configuration and its interfaces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDescriptor {
    /// bConfigurationValue
    pub value: u8,
    pub interfaces: Vec<Interface>,
}

impl From<&rusb::ConfigDescriptor> for ConfigDescriptor {
    fn from(config: &rusb::ConfigDescriptor) -> Self {
        let interfaces = config
            .interfaces()
            .map(|interface| Interface {
                number: interface.number(),
                alt_settings: interface.descriptors().map(|alt| AltSetting::from(&alt)).collect(),
            })
            .collect();

        Self {
            value: config.number(),
            interfaces,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub number: u8,
    pub alt_settings: Vec<AltSetting>,
}

/// Interface alternate setting with its endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltSetting {
    pub interface_number: u8,
    pub setting_number: u8,
    pub class_code: u8,
    pub sub_class_code: u8,
    pub protocol_code: u8,
    pub endpoints: Vec<Endpoint>,
}

impl From<&rusb::InterfaceDescriptor<'_>> for AltSetting {
    fn from(alt: &rusb::InterfaceDescriptor<'_>) -> Self {
        Self {
            interface_number: alt.interface_number(),
            setting_number: alt.setting_number(),
            class_code: alt.class_code(),
            sub_class_code: alt.sub_class_code(),
            protocol_code: alt.protocol_code(),
            endpoints: alt
                .endpoint_descriptors()
                .map(|ep| Endpoint {
                    address: ep.address(),
                    direction: ep.direction(),
                    transfer_type: ep.transfer_type(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// bEndpointAddress, direction bit included
    pub address: u8,
    pub direction: Direction,
    pub transfer_type: TransferType,
}

impl Endpoint {
    pub fn new(address: u8, direction: Direction, transfer_type: TransferType) -> Self {
        Self {
            address,
            direction,
            transfer_type,
        }
    }
}
