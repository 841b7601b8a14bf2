//! MTP device discovery and selection
//!
//! Finds USB devices exposing the MTP transport shape (one interrupt IN, one
//! bulk IN and one bulk OUT endpoint in a single alternate setting) and
//! selects exactly one of them, leaving it open and in the right USB
//! configuration for the protocol layer.
//!
//! All operations are blocking. Run them on a dedicated thread (or
//! `spawn_blocking`) when called from async code, and impose a timeout there
//! if needed.
//!
//! # Example
//!
//! ```no_run
//! use mtp_discovery::{DeviceSelector, VidPidFilter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let selector = DeviceSelector::new()?;
//!
//! for candidate in selector.discover()? {
//!     println!("{} {}", candidate.path_string(), candidate.descriptor().vid_pid());
//! }
//!
//! // Pick the only device whose identity mentions "Pixel"
//! let device = selector.select("Pixel")?;
//! println!("event endpoint: {:#04x}", device.candidate().endpoints().event);
//! drop(device);
//!
//! // Or pick by vendor id
//! let filter: VidPidFilter = "0x18d1:*".parse()?;
//! let device = selector.select_by(&filter)?;
//! # drop(device);
//! # Ok(())
//! # }
//! ```

pub use rusb;

pub mod candidate;
pub mod error;
pub mod filter;
pub mod negotiator;
pub mod registry;
pub mod scanner;
pub mod selector;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod usb;

pub use candidate::{Candidate, DebugFlags, MtpEndpoints, OpenCandidate, format_path};
pub use error::{Result, SelectError};
pub use filter::{AllOf, CandidateFilter, FilterParseError, PathFilter, VidPidFilter};
pub use negotiator::{Negotiation, ensure_configuration};
pub use registry::find_devices;
pub use scanner::{classify_endpoints, scan_device};
pub use selector::{
    DeviceSelector, select_by_filter, select_by_pattern, select_device, select_device_by,
};
pub use usb::{LibUsbBus, UsbBus, UsbDevice, UsbHandle};
