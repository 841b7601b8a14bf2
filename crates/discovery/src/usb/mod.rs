//! USB backend seam
//!
//! The discovery pipeline only talks to USB through these traits. The
//! production implementation is [`LibUsbBus`] (libusb via `rusb`); tests use
//! the simulated bus in [`crate::test_utils`].
//!
//! Reference counting follows libusb: cloning a [`UsbDevice`] acquires a new
//! reference to the device, dropping it releases one. Dropping a
//! [`UsbHandle`] closes the handle.

pub mod descriptor;
pub mod libusb;

pub use descriptor::{AltSetting, ConfigDescriptor, DeviceDescriptor, Endpoint, Interface};
pub use libusb::{LibUsbBus, LibUsbDevice, LibUsbHandle};

/// A USB context able to list the currently attached devices
pub trait UsbBus {
    type Device: UsbDevice;

    /// List attached devices
    ///
    /// The returned devices each hold one reference; dropping the `Vec`
    /// releases the list.
    fn devices(&self) -> Result<Vec<Self::Device>, rusb::Error>;
}

/// A reference to one attached device
pub trait UsbDevice: Clone {
    type Handle: UsbHandle;

    fn device_descriptor(&self) -> Result<DeviceDescriptor, rusb::Error>;

    /// Configuration descriptor by index (not by configuration value)
    fn config_descriptor(&self, index: u8) -> Result<ConfigDescriptor, rusb::Error>;

    fn bus_number(&self) -> u8;

    /// Port numbers from the root hub down to the device
    fn port_numbers(&self) -> Result<Vec<u8>, rusb::Error>;

    fn open(&self) -> Result<Self::Handle, rusb::Error>;
}

/// An open device handle
pub trait UsbHandle {
    /// Current bConfigurationValue
    fn active_configuration(&self) -> Result<u8, rusb::Error>;

    fn set_active_configuration(&mut self, value: u8) -> Result<(), rusb::Error>;

    /// Read an ASCII string descriptor
    fn read_string_descriptor(&self, index: u8) -> Result<String, rusb::Error>;
}
