//! libusb backend
//!
//! Thin wrappers around `rusb` types implementing the backend traits.

use super::{ConfigDescriptor, DeviceDescriptor, UsbBus, UsbDevice, UsbHandle};
use rusb::{Context, UsbContext};
use tracing::trace;

/// A libusb context
///
/// Each bus owns its own context; callers selecting devices concurrently
/// should use one bus per caller.
pub struct LibUsbBus {
    context: Context,
}

impl LibUsbBus {
    /// Create a fresh libusb context
    pub fn new() -> Result<Self, rusb::Error> {
        let context = Context::new()?;
        Ok(Self { context })
    }

    /// Get USB context
    pub fn context(&self) -> &Context {
        &self.context
    }
}

impl UsbBus for LibUsbBus {
    type Device = LibUsbDevice;

    fn devices(&self) -> Result<Vec<LibUsbDevice>, rusb::Error> {
        // Each yielded device takes its own reference; the libusb list is
        // freed when `list` goes out of scope.
        let list = self.context.devices()?;
        trace!("libusb reported {} devices", list.len());
        Ok(list.iter().map(|device| LibUsbDevice { device }).collect())
    }
}

#[derive(Debug, Clone)]
pub struct LibUsbDevice {
    device: rusb::Device<Context>,
}

impl LibUsbDevice {
    pub fn inner(&self) -> &rusb::Device<Context> {
        &self.device
    }
}

impl UsbDevice for LibUsbDevice {
    type Handle = LibUsbHandle;

    fn device_descriptor(&self) -> Result<DeviceDescriptor, rusb::Error> {
        let desc = self.device.device_descriptor()?;
        Ok(DeviceDescriptor::from(&desc))
    }

    fn config_descriptor(&self, index: u8) -> Result<ConfigDescriptor, rusb::Error> {
        let config = self.device.config_descriptor(index)?;
        Ok(ConfigDescriptor::from(&config))
    }

    fn bus_number(&self) -> u8 {
        self.device.bus_number()
    }

    fn port_numbers(&self) -> Result<Vec<u8>, rusb::Error> {
        self.device.port_numbers()
    }

    fn open(&self) -> Result<LibUsbHandle, rusb::Error> {
        let handle = self.device.open()?;
        Ok(LibUsbHandle { handle })
    }
}

/// Open libusb device handle
///
/// The handle is closed when this value is dropped.
pub struct LibUsbHandle {
    handle: rusb::DeviceHandle<Context>,
}

impl LibUsbHandle {
    /// Borrow the raw handle for transfers on the MTP endpoints
    pub fn inner(&self) -> &rusb::DeviceHandle<Context> {
        &self.handle
    }

    pub fn inner_mut(&mut self) -> &mut rusb::DeviceHandle<Context> {
        &mut self.handle
    }

    pub fn into_inner(self) -> rusb::DeviceHandle<Context> {
        self.handle
    }
}

impl UsbHandle for LibUsbHandle {
    fn active_configuration(&self) -> Result<u8, rusb::Error> {
        self.handle.active_configuration()
    }

    fn set_active_configuration(&mut self, value: u8) -> Result<(), rusb::Error> {
        self.handle.set_active_configuration(value)
    }

    fn read_string_descriptor(&self, index: u8) -> Result<String, rusb::Error> {
        self.handle.read_string_descriptor_ascii(index)
    }
}
