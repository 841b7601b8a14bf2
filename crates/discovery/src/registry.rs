//! Bus enumeration
//!
//! Builds the candidate registry for one USB context without opening any
//! device.

use crate::candidate::Candidate;
use crate::error::{Result, SelectError};
use crate::scanner::scan_device;
use crate::usb::{UsbBus, UsbDevice};
use tracing::debug;

/// Find every MTP-shaped device on the bus
///
/// Devices that do not match, or whose descriptors cannot be read, are
/// skipped. Fails only if the device list itself cannot be retrieved.
pub fn find_devices<B: UsbBus>(bus: &B) -> Result<Vec<Candidate<B::Device>>> {
    let devices = bus.devices().map_err(SelectError::Enumeration)?;
    let total = devices.len();

    let mut candidates = Vec::new();
    for device in &devices {
        let Some(mut candidate) = scan_device(device) else {
            continue;
        };

        let bus_number = device.bus_number();
        let ports = device.port_numbers().unwrap_or_else(|e| {
            debug!("Could not read port path on bus {}: {}", bus_number, e);
            Vec::new()
        });
        candidate.set_location(bus_number, ports);

        debug!(
            "Found MTP candidate {} ({})",
            candidate.path_string(),
            candidate.descriptor().vid_pid()
        );
        candidates.push(candidate);
    }

    // Release the raw list; candidates keep their own references
    drop(devices);

    debug!("Scanned {} devices, {} MTP candidates", total, candidates.len());
    Ok(candidates)
}
