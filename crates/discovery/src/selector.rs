//! Device selection
//!
//! Both selection modes run the same pipeline over the candidate registry:
//!
//! 1. Open every candidate, silently dropping those that fail to open.
//! 2. Apply the matching rule left to right. Rejected candidates are released
//!    immediately.
//! 3. Zero survivors is [`SelectError::NoMatch`]; more than one is
//!    [`SelectError::Ambiguous`] after releasing all of them.
//! 4. The single survivor gets its configuration negotiated and is returned.
//!
//! Every exit path drops the candidates it still holds, which closes their
//! handles and releases their device references. That includes a failing
//! identity read and a failing configuration negotiation.

use crate::candidate::{Candidate, DebugFlags, OpenCandidate};
use crate::error::{Result, SelectError};
use crate::filter::CandidateFilter;
use crate::negotiator::ensure_configuration;
use crate::registry::find_devices;
use crate::usb::{LibUsbBus, UsbBus, UsbDevice};
use regex::Regex;
use tracing::{debug, info};

/// Select the single candidate whose identity matches `pattern`
///
/// An empty pattern matches every candidate. The pattern is a regular
/// expression searched anywhere in the identity string.
pub fn select_by_pattern<D: UsbDevice>(
    candidates: Vec<Candidate<D>>,
    pattern: &str,
) -> Result<OpenCandidate<D>> {
    let re = Regex::new(pattern)?;

    narrow(candidates, |index, open| {
        let id = open
            .identity()
            .map_err(|source| SelectError::Identify { index, source })?;

        if pattern.is_empty() || re.is_match(&id) {
            Ok(Some(id))
        } else {
            debug!("Candidate '{}' does not match '{}'", id, pattern);
            Ok(None)
        }
    })
}

/// Select the single candidate accepted by `filter`
///
/// Matched candidates are reported by path string since no identity is read.
pub fn select_by_filter<D, F>(candidates: Vec<Candidate<D>>, filter: &F) -> Result<OpenCandidate<D>>
where
    D: UsbDevice,
    F: CandidateFilter<D> + ?Sized,
{
    narrow(candidates, |_, open| {
        let candidate = open.candidate();
        if filter.matches(candidate) {
            Ok(Some(candidate.path_string()))
        } else {
            debug!("Candidate {} rejected by filter", candidate.path_string());
            Ok(None)
        }
    })
}

/// Enumerate `bus` and select by identity pattern
pub fn select_device<B: UsbBus>(
    bus: &B,
    pattern: &str,
    debug: DebugFlags,
) -> Result<OpenCandidate<B::Device>> {
    // Reject a bad pattern before touching the bus
    Regex::new(pattern)?;

    let candidates = discover(bus, debug)?;
    select_by_pattern(candidates, pattern)
}

/// Enumerate `bus` and select by filter
pub fn select_device_by<B, F>(
    bus: &B,
    filter: &F,
    debug: DebugFlags,
) -> Result<OpenCandidate<B::Device>>
where
    B: UsbBus,
    F: CandidateFilter<B::Device> + ?Sized,
{
    let candidates = discover(bus, debug)?;
    select_by_filter(candidates, filter)
}

fn discover<B: UsbBus>(bus: &B, debug: DebugFlags) -> Result<Vec<Candidate<B::Device>>> {
    let mut candidates = find_devices(bus)?;
    if candidates.is_empty() {
        return Err(SelectError::NoDevices);
    }

    if debug.any() {
        for candidate in &mut candidates {
            candidate.set_debug(debug);
        }
    }
    Ok(candidates)
}

/// Shared open / match / disambiguate / negotiate pipeline
///
/// `keep` returns the label to report for a kept candidate, `None` to reject
/// it, or an error that aborts the whole selection.
fn narrow<D, K>(candidates: Vec<Candidate<D>>, mut keep: K) -> Result<OpenCandidate<D>>
where
    D: UsbDevice,
    K: FnMut(usize, &OpenCandidate<D>) -> Result<Option<String>>,
{
    let opened: Vec<OpenCandidate<D>> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let path = candidate.path_string();
            candidate
                .open()
                .inspect_err(|e| debug!("Could not open candidate {}: {}", path, e))
                .ok()
        })
        .collect();

    if opened.is_empty() {
        return Err(SelectError::NoDevices);
    }

    let mut matched: Vec<(OpenCandidate<D>, String)> = Vec::new();
    for (index, open) in opened.into_iter().enumerate() {
        match keep(index, &open)? {
            Some(label) => matched.push((open, label)),
            None => open.release(),
        }
    }

    if matched.len() > 1 {
        let labels: Vec<String> = matched.iter().map(|(_, label)| label.clone()).collect();
        for (open, _) in matched {
            open.release();
        }
        return Err(SelectError::Ambiguous { matched: labels });
    }

    let Some((mut selected, label)) = matched.pop() else {
        return Err(SelectError::NoMatch);
    };

    ensure_configuration(&mut selected, &label)?;

    info!(
        "Selected MTP device {} at {}",
        label,
        selected.candidate().path_string()
    );
    Ok(selected)
}

/// Owns a USB bus and runs discovery and selection against it
///
/// `DeviceSelector::new()` creates a fresh libusb context, so independent
/// selectors may be used from different threads. A single selector is not
/// meant to be shared between concurrent selections.
pub struct DeviceSelector<B: UsbBus = LibUsbBus> {
    bus: B,
    debug: DebugFlags,
}

impl DeviceSelector<LibUsbBus> {
    pub fn new() -> Result<Self> {
        let bus = LibUsbBus::new().map_err(SelectError::Context)?;
        Ok(Self::with_bus(bus))
    }
}

impl<B: UsbBus> DeviceSelector<B> {
    pub fn with_bus(bus: B) -> Self {
        Self {
            bus,
            debug: DebugFlags::default(),
        }
    }

    /// Set debug flags on every candidate before selection
    pub fn with_debug(mut self, debug: DebugFlags) -> Self {
        self.debug = debug;
        self
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// List MTP-shaped devices without opening them
    pub fn discover(&self) -> Result<Vec<Candidate<B::Device>>> {
        find_devices(&self.bus)
    }

    pub fn select(&self, pattern: &str) -> Result<OpenCandidate<B::Device>> {
        select_device(&self.bus, pattern, self.debug)
    }

    pub fn select_by<F>(&self, filter: &F) -> Result<OpenCandidate<B::Device>>
    where
        F: CandidateFilter<B::Device> + ?Sized,
    {
        select_device_by(&self.bus, filter, self.debug)
    }
}
