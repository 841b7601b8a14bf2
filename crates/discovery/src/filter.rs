//! Candidate filters for predicate-mode selection
//!
//! Any `Fn(&Candidate<D>) -> bool` is a filter. [`VidPidFilter`] and
//! [`PathFilter`] cover the common cases of matching on USB ids or on the
//! topological location of a device.

use crate::candidate::Candidate;
use crate::usb::UsbDevice;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Decides whether an opened candidate is kept during selection
pub trait CandidateFilter<D: UsbDevice> {
    fn matches(&self, candidate: &Candidate<D>) -> bool;
}

impl<D, F> CandidateFilter<D> for F
where
    D: UsbDevice,
    F: Fn(&Candidate<D>) -> bool,
{
    fn matches(&self, candidate: &Candidate<D>) -> bool {
        self(candidate)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid filter '{filter}': {reason}")]
pub struct FilterParseError {
    pub filter: String,
    pub reason: String,
}

impl FilterParseError {
    fn new(filter: &str, reason: impl Into<String>) -> Self {
        Self {
            filter: filter.to_string(),
            reason: reason.into(),
        }
    }
}

/// Match on vendor and product id, `None` meaning any
///
/// Parsed from `0xVID:0xPID`, with `*` as wildcard on either side
/// (e.g. `0x04e8:*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VidPidFilter {
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
}

impl VidPidFilter {
    pub fn new(vendor_id: Option<u16>, product_id: Option<u16>) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }

    pub fn matches_ids(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id.is_none_or(|vid| vid == vendor_id)
            && self.product_id.is_none_or(|pid| pid == product_id)
    }

    fn parse_part(filter: &str, part: &str, name: &str) -> Result<Option<u16>, FilterParseError> {
        if part == "*" {
            return Ok(None);
        }

        let hex = part
            .strip_prefix("0x")
            .or_else(|| part.strip_prefix("0X"))
            .ok_or_else(|| {
                FilterParseError::new(filter, format!("{} must start with '0x' or be '*'", name))
            })?;

        if hex.is_empty() || hex.len() > 4 {
            return Err(FilterParseError::new(
                filter,
                format!("{} hex part must be 1-4 digits", name),
            ));
        }

        u16::from_str_radix(hex, 16)
            .map(Some)
            .map_err(|_| FilterParseError::new(filter, format!("{} is not a valid hex number", name)))
    }
}

impl FromStr for VidPidFilter {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (vid, pid) = s
            .split_once(':')
            .ok_or_else(|| FilterParseError::new(s, "expected VID:PID (e.g. '0x04e8:0x6860')"))?;

        if pid.contains(':') {
            return Err(FilterParseError::new(s, "expected exactly one ':'"));
        }

        Ok(Self {
            vendor_id: Self::parse_part(s, vid, "VID")?,
            product_id: Self::parse_part(s, pid, "PID")?,
        })
    }
}

impl fmt::Display for VidPidFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.vendor_id {
            Some(vid) => write!(f, "0x{:04x}", vid)?,
            None => write!(f, "*")?,
        }
        match self.product_id {
            Some(pid) => write!(f, ":0x{:04x}", pid),
            None => write!(f, ":*"),
        }
    }
}

impl<D: UsbDevice> CandidateFilter<D> for VidPidFilter {
    fn matches(&self, candidate: &Candidate<D>) -> bool {
        self.matches_ids(candidate.vendor_id(), candidate.product_id())
    }
}

/// Match a device by its path string (`bus-port.port...`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFilter {
    path: String,
}

impl PathFilter {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl<D: UsbDevice> CandidateFilter<D> for PathFilter {
    fn matches(&self, candidate: &Candidate<D>) -> bool {
        candidate.path_string() == self.path
    }
}

/// Both filters must match
#[derive(Debug, Clone)]
pub struct AllOf<A, B>(pub A, pub B);

impl<D: UsbDevice, A: CandidateFilter<D>, B: CandidateFilter<D>> CandidateFilter<D> for AllOf<A, B> {
    fn matches(&self, candidate: &Candidate<D>) -> bool {
        self.0.matches(candidate) && self.1.matches(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::find_devices;
    use crate::test_utils::{MockBus, MockDevice, MockDeviceSpec};

    #[test]
    fn test_parse_vid_pid() {
        let filter: VidPidFilter = "0x04e8:0x6860".parse().unwrap();
        assert_eq!(filter, VidPidFilter::new(Some(0x04e8), Some(0x6860)));

        let filter: VidPidFilter = "0X18D1:*".parse().unwrap();
        assert_eq!(filter, VidPidFilter::new(Some(0x18d1), None));

        let filter: VidPidFilter = "*:*".parse().unwrap();
        assert_eq!(filter, VidPidFilter::new(None, None));
    }

    #[test]
    fn test_parse_vid_pid_invalid() {
        assert!("04e8:6860".parse::<VidPidFilter>().is_err());
        assert!("0x04e8".parse::<VidPidFilter>().is_err());
        assert!("0x04e8:0x6860:0x1".parse::<VidPidFilter>().is_err());
        assert!("0xGHIJ:0x6860".parse::<VidPidFilter>().is_err());
        assert!("0x12345:0x6860".parse::<VidPidFilter>().is_err());
        assert!("0x:0x6860".parse::<VidPidFilter>().is_err());
    }

    #[test]
    fn test_vid_pid_display_roundtrip() {
        let filter = VidPidFilter::new(Some(0x04e8), None);
        assert_eq!(filter.to_string(), "0x04e8:*");
        assert_eq!(filter.to_string().parse::<VidPidFilter>().unwrap(), filter);
    }

    #[test]
    fn test_vid_pid_matching() {
        let exact = VidPidFilter::new(Some(0x1234), Some(0x5678));
        assert!(exact.matches_ids(0x1234, 0x5678));
        assert!(!exact.matches_ids(0x1234, 0x9999));
        assert!(!exact.matches_ids(0x9999, 0x5678));

        let vendor = VidPidFilter::new(Some(0xabcd), None);
        assert!(vendor.matches_ids(0xabcd, 0x1111));
        assert!(!vendor.matches_ids(0x1111, 0x1111));

        assert!(VidPidFilter::new(None, None).matches_ids(0, 0));
    }

    #[test]
    fn test_filters_on_candidates() {
        let bus = MockBus::new(vec![
            MockDeviceSpec::mtp(1).with_ids(0x04e8, 0x6860).at(1, &[2]),
            MockDeviceSpec::mtp(2).with_ids(0x18d1, 0x4ee1).at(1, &[3, 1]),
        ]);
        let candidates = find_devices(&bus).unwrap();

        let samsung = VidPidFilter::new(Some(0x04e8), None);
        assert!(samsung.matches(&candidates[0]));
        assert!(!samsung.matches(&candidates[1]));

        let path = PathFilter::new("1-3.1");
        assert!(!path.matches(&candidates[0]));
        assert!(path.matches(&candidates[1]));

        let both = AllOf(samsung, PathFilter::new("1-2"));
        assert!(both.matches(&candidates[0]));
        assert!(!both.matches(&candidates[1]));

        let closure = |c: &Candidate<MockDevice>| c.bus_number() == 1;
        assert!(closure.matches(&candidates[1]));
    }
}
