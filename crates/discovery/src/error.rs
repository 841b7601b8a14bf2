//! Discovery and selection errors

use thiserror::Error;

/// Hard failures of discovery or selection
///
/// Soft misses (a device that does not look like MTP, a candidate that fails
/// to open) are never reported through this type; they are skipped.
#[derive(Debug, Error)]
pub enum SelectError {
    /// Creating the USB context failed
    #[error("Could not create USB context: {0}")]
    Context(#[source] rusb::Error),

    /// Listing attached devices failed
    #[error("USB enumeration failed: {0}")]
    Enumeration(#[source] rusb::Error),

    /// The identity pattern is not a valid regular expression
    #[error("Invalid device pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// No candidate could be found or opened
    #[error("No MTP devices found")]
    NoDevices,

    /// Reading a candidate's identity string failed
    #[error("Identify candidate {index} failed: {source}")]
    Identify {
        index: usize,
        #[source]
        source: rusb::Error,
    },

    /// Every opened candidate was rejected by the matching rule
    #[error("No device matched")]
    NoMatch,

    /// More than one candidate passed the matching rule
    #[error("More than one device matched: {}", .matched.join(", "))]
    Ambiguous { matched: Vec<String> },

    #[error("Could not get configuration of {device}: {source}")]
    GetConfiguration {
        device: String,
        #[source]
        source: rusb::Error,
    },

    #[error("Could not set configuration {value} on {device}: {source}")]
    SetConfiguration {
        device: String,
        value: u8,
        #[source]
        source: rusb::Error,
    },
}

pub type Result<T> = std::result::Result<T, SelectError>;
