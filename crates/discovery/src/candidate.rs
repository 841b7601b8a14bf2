//! MTP candidates and their handle lifecycle
//!
//! A [`Candidate`] owns one reference to a backend device whose descriptors
//! expose the MTP endpoint triple. Opening it yields an [`OpenCandidate`],
//! which owns both the handle and the candidate. Dropping an `OpenCandidate`
//! closes the handle first and then releases the device reference, so every
//! rejected candidate is cleaned up exactly once on whatever path drops it.

use crate::usb::{AltSetting, DeviceDescriptor, UsbDevice, UsbHandle};
use std::fmt;
use tracing::{debug, trace};

/// Endpoint addresses of the MTP transport triple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MtpEndpoints {
    /// Interrupt IN
    pub event: u8,
    /// Bulk IN
    pub fetch: u8,
    /// Bulk OUT
    pub send: u8,
}

/// Per-layer debug switches carried on a candidate
///
/// Only annotation; consumed by the protocol layer above.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugFlags {
    pub usb: bool,
    pub data: bool,
    pub mtp: bool,
}

impl DebugFlags {
    pub fn all() -> Self {
        Self {
            usb: true,
            data: true,
            mtp: true,
        }
    }

    pub fn any(&self) -> bool {
        self.usb || self.data || self.mtp
    }
}

/// A device whose descriptor tree matches the MTP endpoint shape
pub struct Candidate<D: UsbDevice> {
    device: D,
    bus_number: u8,
    port_path: Vec<u8>,
    descriptor: DeviceDescriptor,
    interface: AltSetting,
    config_value: u8,
    endpoints: MtpEndpoints,
    debug: DebugFlags,
}

impl<D: UsbDevice> Candidate<D> {
    pub(crate) fn new(
        device: D,
        descriptor: DeviceDescriptor,
        interface: AltSetting,
        config_value: u8,
        endpoints: MtpEndpoints,
    ) -> Self {
        Self {
            device,
            bus_number: 0,
            port_path: Vec::new(),
            descriptor,
            interface,
            config_value,
            endpoints,
            debug: DebugFlags::default(),
        }
    }

    pub(crate) fn set_location(&mut self, bus_number: u8, port_path: Vec<u8>) {
        self.bus_number = bus_number;
        self.port_path = port_path;
    }

    pub fn set_debug(&mut self, debug: DebugFlags) {
        self.debug = debug;
    }

    pub fn debug(&self) -> DebugFlags {
        self.debug
    }

    pub fn bus_number(&self) -> u8 {
        self.bus_number
    }

    pub fn port_path(&self) -> &[u8] {
        &self.port_path
    }

    /// Topological address, e.g. `1-2.4`
    pub fn path_string(&self) -> String {
        format_path(self.bus_number, &self.port_path)
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn vendor_id(&self) -> u16 {
        self.descriptor.vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.descriptor.product_id
    }

    /// The matched interface alternate setting
    pub fn interface(&self) -> &AltSetting {
        &self.interface
    }

    /// Configuration value the matched interface lives in
    pub fn config_value(&self) -> u8 {
        self.config_value
    }

    pub fn endpoints(&self) -> MtpEndpoints {
        self.endpoints
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Open the device
    ///
    /// On failure the candidate is consumed and its device reference
    /// released along with it.
    pub fn open(self) -> Result<OpenCandidate<D>, rusb::Error> {
        let handle = self.device.open()?;
        trace!("Opened candidate {}", self.path_string());
        Ok(OpenCandidate {
            handle,
            candidate: self,
        })
    }
}

impl<D: UsbDevice> fmt::Debug for Candidate<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("path", &self.path_string())
            .field("vid_pid", &self.descriptor.vid_pid())
            .field("config_value", &self.config_value)
            .field("interface", &self.interface.interface_number)
            .field("alt_setting", &self.interface.setting_number)
            .field("endpoints", &self.endpoints)
            .field("debug", &self.debug)
            .finish()
    }
}

/// An opened candidate
///
/// Field order matters: the handle is dropped (closed) before the candidate
/// releases its device reference.
pub struct OpenCandidate<D: UsbDevice> {
    handle: D::Handle,
    candidate: Candidate<D>,
}

impl<D: UsbDevice> OpenCandidate<D> {
    pub fn candidate(&self) -> &Candidate<D> {
        &self.candidate
    }

    pub fn handle(&self) -> &D::Handle {
        &self.handle
    }

    pub fn handle_mut(&mut self) -> &mut D::Handle {
        &mut self.handle
    }

    /// Split into the open handle and the candidate metadata
    pub fn into_parts(self) -> (D::Handle, Candidate<D>) {
        (self.handle, self.candidate)
    }

    /// Identity string used for pattern matching
    ///
    /// Manufacturer, product and serial number string descriptors joined by
    /// spaces. Indices the device does not declare are skipped; a device that
    /// declares none is identified by `vvvv:pppp`.
    pub fn identity(&self) -> Result<String, rusb::Error> {
        let desc = &self.candidate.descriptor;
        let mut parts = Vec::with_capacity(3);

        for index in [
            desc.manufacturer_index,
            desc.product_index,
            desc.serial_number_index,
        ]
        .into_iter()
        .flatten()
        {
            parts.push(self.handle.read_string_descriptor(index)?);
        }

        if parts.is_empty() {
            return Ok(desc.vid_pid());
        }
        Ok(parts.join(" "))
    }

    /// Close the handle and release the device reference
    pub fn release(self) {
        let path = self.candidate.path_string();
        drop(self);
        debug!("Released candidate {}", path);
    }
}

impl<D: UsbDevice> fmt::Debug for OpenCandidate<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenCandidate")
            .field("candidate", &self.candidate)
            .finish_non_exhaustive()
    }
}

/// Format a bus number and port path as `bus-p1.p2...`
pub fn format_path(bus_number: u8, ports: &[u8]) -> String {
    let mut path = bus_number.to_string();
    for (i, port) in ports.iter().enumerate() {
        path.push(if i == 0 { '-' } else { '.' });
        path.push_str(&port.to_string());
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::find_devices;
    use crate::test_utils::{MockBus, MockDeviceSpec};

    #[test]
    fn test_format_path() {
        assert_eq!(format_path(1, &[]), "1");
        assert_eq!(format_path(1, &[2]), "1-2");
        assert_eq!(format_path(3, &[1, 4, 2]), "3-1.4.2");
    }

    #[test]
    fn test_debug_flags() {
        assert!(!DebugFlags::default().any());
        assert!(DebugFlags::all().any());
        let only_mtp = DebugFlags {
            mtp: true,
            ..Default::default()
        };
        assert!(only_mtp.any());
    }

    #[test]
    fn test_identity_joins_strings() {
        let bus = MockBus::new(vec![
            MockDeviceSpec::mtp(1)
                .with_strings("Acme", "Phone", "SN123")
                .at(2, &[1, 3]),
        ]);
        let mut candidates = find_devices(&bus).unwrap();
        let open = candidates.remove(0).open().unwrap();

        assert_eq!(open.identity().unwrap(), "Acme Phone SN123");
        assert_eq!(open.candidate().path_string(), "2-1.3");
    }

    #[test]
    fn test_identity_without_strings_uses_vid_pid() {
        let bus = MockBus::new(vec![MockDeviceSpec::mtp(1).with_ids(0x04e8, 0x6860).without_strings()]);
        let mut candidates = find_devices(&bus).unwrap();
        let open = candidates.remove(0).open().unwrap();

        assert_eq!(open.identity().unwrap(), "04e8:6860");
    }

    #[test]
    fn test_identity_read_failure() {
        let bus = MockBus::new(vec![MockDeviceSpec::mtp(1).fail_identity()]);
        let mut candidates = find_devices(&bus).unwrap();
        let open = candidates.remove(0).open().unwrap();

        assert!(open.identity().is_err());
    }

    #[test]
    fn test_release_closes_handle_and_reference() {
        let bus = MockBus::new(vec![MockDeviceSpec::mtp(7)]);
        let ledger = bus.ledger();
        let mut candidates = find_devices(&bus).unwrap();
        let open = candidates.remove(0).open().unwrap();

        assert_eq!(ledger.open_handles(), 1);
        assert_eq!(ledger.live_references(7), 1);

        open.release();

        assert_eq!(ledger.open_handles(), 0);
        assert_eq!(ledger.live_references(7), 0);
        assert_eq!(ledger.closes(7), 1);
    }

    #[test]
    fn test_failed_open_releases_reference() {
        let bus = MockBus::new(vec![MockDeviceSpec::mtp(4).fail_open()]);
        let ledger = bus.ledger();
        let mut candidates = find_devices(&bus).unwrap();

        assert!(candidates.remove(0).open().is_err());
        assert_eq!(ledger.live_references(4), 0);
        assert_eq!(ledger.open_handles(), 0);
    }
}
