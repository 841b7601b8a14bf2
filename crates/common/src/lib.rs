//! Common utilities for mtp-select
//!
//! Logging setup and the shared error type used by the binaries. The
//! discovery library itself only emits `tracing` events and never installs a
//! subscriber.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
pub use logging::{LOG_LEVELS, setup_logging, validate_log_level};
