//! Test utilities: a simulated USB bus
//!
//! [`MockBus`] implements the backend traits over a list of
//! [`MockDeviceSpec`]s. Every reference acquired or released, every handle
//! opened or closed and every set-configuration call is recorded in a
//! [`MockLedger`] so tests can assert that nothing leaks.
//!
//! # Example
//!
//! ```
//! use mtp_discovery::test_utils::{MockBus, MockDeviceSpec};
//! use mtp_discovery::{DebugFlags, select_device};
//!
//! let bus = MockBus::new(vec![
//!     MockDeviceSpec::mass_storage(1),
//!     MockDeviceSpec::mtp(2).with_active_configuration(2),
//! ]);
//! let ledger = bus.ledger();
//!
//! let device = select_device(&bus, "", DebugFlags::default()).unwrap();
//! assert_eq!(device.candidate().config_value(), 1);
//! assert_eq!(ledger.active_configuration(2), 1);
//!
//! drop(device);
//! assert_eq!(ledger.open_handles(), 0);
//! ```

use crate::usb::{
    AltSetting, ConfigDescriptor, DeviceDescriptor, Endpoint, Interface, UsbBus, UsbDevice,
    UsbHandle,
};
use rusb::{Direction, TransferType};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Interrupt IN endpoint
pub fn interrupt_in(address: u8) -> Endpoint {
    Endpoint::new(address, Direction::In, TransferType::Interrupt)
}

/// Interrupt OUT endpoint
pub fn interrupt_out(address: u8) -> Endpoint {
    Endpoint::new(address, Direction::Out, TransferType::Interrupt)
}

/// Bulk IN endpoint
pub fn bulk_in(address: u8) -> Endpoint {
    Endpoint::new(address, Direction::In, TransferType::Bulk)
}

/// Bulk OUT endpoint
pub fn bulk_out(address: u8) -> Endpoint {
    Endpoint::new(address, Direction::Out, TransferType::Bulk)
}

/// Alternate setting with the given endpoints (class 0xff)
pub fn alt_setting(interface_number: u8, setting_number: u8, endpoints: Vec<Endpoint>) -> AltSetting {
    AltSetting {
        interface_number,
        setting_number,
        class_code: 0xff,
        sub_class_code: 0xff,
        protocol_code: 0x00,
        endpoints,
    }
}

/// Still Image class alternate setting with the usual MTP triple:
/// event 0x83, fetch 0x81, send 0x02
pub fn mtp_alt_setting(interface_number: u8) -> AltSetting {
    AltSetting {
        interface_number,
        setting_number: 0,
        class_code: 0x06,
        sub_class_code: 0x01,
        protocol_code: 0x01,
        endpoints: vec![bulk_in(0x81), bulk_out(0x02), interrupt_in(0x83)],
    }
}

/// Configuration built from per-interface lists of alternate settings
///
/// The interface number is taken from the first alternate setting, or the
/// list position when an interface has none.
pub fn config(value: u8, interfaces: Vec<Vec<AltSetting>>) -> ConfigDescriptor {
    let interfaces = interfaces
        .into_iter()
        .enumerate()
        .map(|(i, alt_settings)| Interface {
            number: alt_settings
                .first()
                .map_or(i as u8, |alt| alt.interface_number),
            alt_settings,
        })
        .collect();

    ConfigDescriptor { value, interfaces }
}

const MANUFACTURER_INDEX: u8 = 1;
const PRODUCT_INDEX: u8 = 2;
const SERIAL_INDEX: u8 = 3;

#[derive(Debug, Clone, Default)]
struct Faults {
    device_descriptor: bool,
    config_descriptor: Option<u8>,
    port_numbers: bool,
    open: bool,
    identity: bool,
    get_configuration: bool,
    set_configuration: bool,
}

/// Description of one simulated device
#[derive(Debug, Clone)]
pub struct MockDeviceSpec {
    id: u32,
    vendor_id: u16,
    product_id: u16,
    class_code: u8,
    bus_number: u8,
    ports: Vec<u8>,
    configs: Vec<ConfigDescriptor>,
    active_configuration: u8,
    manufacturer: Option<String>,
    product: Option<String>,
    serial_number: Option<String>,
    faults: Faults,
}

impl MockDeviceSpec {
    fn base(id: u32, vendor_id: u16, product_id: u16, class_code: u8) -> Self {
        Self {
            id,
            vendor_id,
            product_id,
            class_code,
            bus_number: 1,
            ports: vec![(id % 128) as u8],
            configs: Vec::new(),
            active_configuration: 1,
            manufacturer: Some(format!("Test Manufacturer {}", id)),
            product: Some(format!("Test Product {}", id)),
            serial_number: Some(format!("SN{:06}", id)),
            faults: Faults::default(),
        }
    }

    /// MTP device with one configuration (value 1) holding the triple
    pub fn mtp(id: u32) -> Self {
        let mut spec = Self::base(id, 0x18d1, 0x4ee0 + (id as u16), 0x00);
        spec.configs = vec![config(1, vec![vec![mtp_alt_setting(0)]])];
        spec
    }

    /// Mass storage device: bulk IN and OUT only
    pub fn mass_storage(id: u32) -> Self {
        let mut spec = Self::base(id, 0x0781, 0x5581, 0x00);
        spec.configs = vec![config(
            1,
            vec![vec![AltSetting {
                interface_number: 0,
                setting_number: 0,
                class_code: 0x08,
                sub_class_code: 0x06,
                protocol_code: 0x50,
                endpoints: vec![bulk_in(0x81), bulk_out(0x02)],
            }]],
        )];
        spec
    }

    /// HID device: a single interrupt IN endpoint
    pub fn hid(id: u32) -> Self {
        let mut spec = Self::base(id, 0x046d, 0xc52b, 0x00);
        spec.configs = vec![config(
            1,
            vec![vec![AltSetting {
                interface_number: 0,
                setting_number: 0,
                class_code: 0x03,
                sub_class_code: 0x01,
                protocol_code: 0x01,
                endpoints: vec![interrupt_in(0x81)],
            }]],
        )];
        spec
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    pub fn with_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = vendor_id;
        self.product_id = product_id;
        self
    }

    pub fn with_strings(mut self, manufacturer: &str, product: &str, serial_number: &str) -> Self {
        self.manufacturer = Some(manufacturer.to_string());
        self.product = Some(product.to_string());
        self.serial_number = Some(serial_number.to_string());
        self
    }

    /// Declare no string descriptors at all
    pub fn without_strings(mut self) -> Self {
        self.manufacturer = None;
        self.product = None;
        self.serial_number = None;
        self
    }

    /// Place the device on `bus_number` behind `ports`
    pub fn at(mut self, bus_number: u8, ports: &[u8]) -> Self {
        self.bus_number = bus_number;
        self.ports = ports.to_vec();
        self
    }

    pub fn with_configs(mut self, configs: Vec<ConfigDescriptor>) -> Self {
        self.configs = configs;
        self
    }

    pub fn with_active_configuration(mut self, value: u8) -> Self {
        self.active_configuration = value;
        self
    }

    pub fn fail_device_descriptor(mut self) -> Self {
        self.faults.device_descriptor = true;
        self
    }

    /// Fail reading the configuration descriptor at `index`
    pub fn fail_config_descriptor(mut self, index: u8) -> Self {
        self.faults.config_descriptor = Some(index);
        self
    }

    pub fn fail_port_numbers(mut self) -> Self {
        self.faults.port_numbers = true;
        self
    }

    pub fn fail_open(mut self) -> Self {
        self.faults.open = true;
        self
    }

    /// Fail every string descriptor read
    pub fn fail_identity(mut self) -> Self {
        self.faults.identity = true;
        self
    }

    pub fn fail_get_configuration(mut self) -> Self {
        self.faults.get_configuration = true;
        self
    }

    pub fn fail_set_configuration(mut self) -> Self {
        self.faults.set_configuration = true;
        self
    }

    fn device_descriptor(&self) -> DeviceDescriptor {
        DeviceDescriptor {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            class_code: self.class_code,
            num_configurations: self.configs.len() as u8,
            manufacturer_index: self.manufacturer.as_ref().map(|_| MANUFACTURER_INDEX),
            product_index: self.product.as_ref().map(|_| PRODUCT_INDEX),
            serial_number_index: self.serial_number.as_ref().map(|_| SERIAL_INDEX),
        }
    }

    fn string(&self, index: u8) -> Option<&String> {
        match index {
            MANUFACTURER_INDEX => self.manufacturer.as_ref(),
            PRODUCT_INDEX => self.product.as_ref(),
            SERIAL_INDEX => self.serial_number.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    references: HashMap<u32, usize>,
    open: HashMap<u32, usize>,
    opens: HashMap<u32, usize>,
    closes: HashMap<u32, usize>,
    active_configuration: HashMap<u32, u8>,
    set_configuration_calls: Vec<(u32, u8)>,
}

/// Shared record of everything the simulated bus was asked to do
#[derive(Debug, Clone, Default)]
pub struct MockLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl MockLedger {
    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self, id: u32) {
        *self.lock().references.entry(id).or_default() += 1;
    }

    fn release(&self, id: u32) {
        let mut state = self.lock();
        let refs = state.references.entry(id).or_default();
        *refs = refs.saturating_sub(1);
    }

    /// Device references currently held for device `id`
    pub fn live_references(&self, id: u32) -> usize {
        self.lock().references.get(&id).copied().unwrap_or(0)
    }

    /// Handles currently open across all devices
    pub fn open_handles(&self) -> usize {
        self.lock().open.values().sum()
    }

    pub fn is_open(&self, id: u32) -> bool {
        self.lock().open.get(&id).is_some_and(|n| *n > 0)
    }

    /// Successful opens of device `id`
    pub fn opens(&self, id: u32) -> usize {
        self.lock().opens.get(&id).copied().unwrap_or(0)
    }

    /// Handle closes of device `id`
    pub fn closes(&self, id: u32) -> usize {
        self.lock().closes.get(&id).copied().unwrap_or(0)
    }

    pub fn active_configuration(&self, id: u32) -> u8 {
        self.lock()
            .active_configuration
            .get(&id)
            .copied()
            .unwrap_or(0)
    }

    /// Every set-configuration attempt as `(device id, value)`, in order
    pub fn set_configuration_calls(&self) -> Vec<(u32, u8)> {
        self.lock().set_configuration_calls.clone()
    }
}

/// Simulated USB context
#[derive(Debug, Clone)]
pub struct MockBus {
    specs: Vec<Arc<MockDeviceSpec>>,
    ledger: MockLedger,
    list_error: Option<rusb::Error>,
}

impl MockBus {
    pub fn new(specs: Vec<MockDeviceSpec>) -> Self {
        let ledger = MockLedger::default();
        {
            let mut state = ledger.lock();
            for spec in &specs {
                state
                    .active_configuration
                    .insert(spec.id, spec.active_configuration);
            }
        }

        Self {
            specs: specs.into_iter().map(Arc::new).collect(),
            ledger,
            list_error: None,
        }
    }

    /// Make device listing fail with `error`
    pub fn fail_listing(mut self, error: rusb::Error) -> Self {
        self.list_error = Some(error);
        self
    }

    pub fn ledger(&self) -> MockLedger {
        self.ledger.clone()
    }
}

impl UsbBus for MockBus {
    type Device = MockDevice;

    fn devices(&self) -> Result<Vec<MockDevice>, rusb::Error> {
        if let Some(error) = self.list_error {
            return Err(error);
        }

        Ok(self
            .specs
            .iter()
            .map(|spec| MockDevice::new(spec.clone(), self.ledger.clone()))
            .collect())
    }
}

/// Reference to a simulated device
#[derive(Debug)]
pub struct MockDevice {
    spec: Arc<MockDeviceSpec>,
    ledger: MockLedger,
}

impl MockDevice {
    fn new(spec: Arc<MockDeviceSpec>, ledger: MockLedger) -> Self {
        ledger.acquire(spec.id);
        Self { spec, ledger }
    }

    pub fn id(&self) -> u32 {
        self.spec.id
    }
}

impl Clone for MockDevice {
    fn clone(&self) -> Self {
        Self::new(self.spec.clone(), self.ledger.clone())
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.ledger.release(self.spec.id);
    }
}

impl UsbDevice for MockDevice {
    type Handle = MockHandle;

    fn device_descriptor(&self) -> Result<DeviceDescriptor, rusb::Error> {
        if self.spec.faults.device_descriptor {
            return Err(rusb::Error::Io);
        }
        Ok(self.spec.device_descriptor())
    }

    fn config_descriptor(&self, index: u8) -> Result<ConfigDescriptor, rusb::Error> {
        if self.spec.faults.config_descriptor == Some(index) {
            return Err(rusb::Error::Io);
        }
        self.spec
            .configs
            .get(index as usize)
            .cloned()
            .ok_or(rusb::Error::NotFound)
    }

    fn bus_number(&self) -> u8 {
        self.spec.bus_number
    }

    fn port_numbers(&self) -> Result<Vec<u8>, rusb::Error> {
        if self.spec.faults.port_numbers {
            return Err(rusb::Error::Overflow);
        }
        Ok(self.spec.ports.clone())
    }

    fn open(&self) -> Result<MockHandle, rusb::Error> {
        if self.spec.faults.open {
            return Err(rusb::Error::Access);
        }

        let id = self.spec.id;
        {
            let mut state = self.ledger.lock();
            *state.open.entry(id).or_default() += 1;
            *state.opens.entry(id).or_default() += 1;
        }

        Ok(MockHandle {
            spec: self.spec.clone(),
            ledger: self.ledger.clone(),
        })
    }
}

/// Open handle on a simulated device
#[derive(Debug)]
pub struct MockHandle {
    spec: Arc<MockDeviceSpec>,
    ledger: MockLedger,
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        let id = self.spec.id;
        let mut state = self.ledger.lock();
        let open = state.open.entry(id).or_default();
        *open = open.saturating_sub(1);
        *state.closes.entry(id).or_default() += 1;
    }
}

impl UsbHandle for MockHandle {
    fn active_configuration(&self) -> Result<u8, rusb::Error> {
        if self.spec.faults.get_configuration {
            return Err(rusb::Error::Io);
        }
        Ok(self.ledger.active_configuration(self.spec.id))
    }

    fn set_active_configuration(&mut self, value: u8) -> Result<(), rusb::Error> {
        let id = self.spec.id;
        let mut state = self.ledger.lock();
        state.set_configuration_calls.push((id, value));

        if self.spec.faults.set_configuration {
            return Err(rusb::Error::Busy);
        }
        state.active_configuration.insert(id, value);
        Ok(())
    }

    fn read_string_descriptor(&self, index: u8) -> Result<String, rusb::Error> {
        if self.spec.faults.identity {
            return Err(rusb::Error::Pipe);
        }
        self.spec.string(index).cloned().ok_or(rusb::Error::InvalidParam)
    }
}
