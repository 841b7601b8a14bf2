//! Selection requests and their off-runtime execution

use anyhow::{Context, Result, anyhow};
use mtp_discovery::{
    AllOf, Candidate, DebugFlags, OpenCandidate, PathFilter, UsbBus, UsbDevice, VidPidFilter,
    find_devices, select_device, select_device_by,
};
use std::fmt;
use std::time::Duration;
use tokio::sync::oneshot;

/// How to pick the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Identity regular expression; empty matches any device
    Pattern(String),
    /// Vendor/product and/or path predicate
    Filter {
        vid_pid: Option<VidPidFilter>,
        path: Option<String>,
    },
}

impl Selection {
    /// Build a selection from optional pattern and predicate parts
    ///
    /// Any predicate part switches to predicate mode. With nothing given the
    /// empty pattern is used.
    pub fn from_parts(
        pattern: Option<String>,
        vid_pid: Option<VidPidFilter>,
        path: Option<String>,
    ) -> Result<Self> {
        match (pattern, vid_pid, path) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => Err(anyhow!(
                "A pattern cannot be combined with --vid-pid or --path"
            )),
            (None, None, None) => Ok(Selection::Pattern(String::new())),
            (Some(pattern), None, None) => Ok(Selection::Pattern(pattern)),
            (None, vid_pid, path) => Ok(Selection::Filter { vid_pid, path }),
        }
    }

    /// Run the selection against `bus` and summarize the chosen device
    ///
    /// The device is released again when this returns.
    pub fn run<B: UsbBus>(&self, bus: &B, debug: DebugFlags) -> Result<DeviceSummary> {
        let selected = match self {
            Selection::Pattern(pattern) => select_device(bus, pattern, debug)?,
            Selection::Filter { vid_pid, path } => {
                let vid_pid = vid_pid.unwrap_or(VidPidFilter::new(None, None));
                match path {
                    Some(path) => {
                        let filter = AllOf(vid_pid, PathFilter::new(path.as_str()));
                        select_device_by(bus, &filter, debug)?
                    }
                    None => select_device_by(bus, &vid_pid, debug)?,
                }
            }
        };

        Ok(DeviceSummary::from_open(&selected))
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Pattern(p) if p.is_empty() => write!(f, "any device"),
            Selection::Pattern(p) => write!(f, "identity matching '{}'", p),
            Selection::Filter { vid_pid, path } => {
                let mut parts = Vec::new();
                if let Some(vid_pid) = vid_pid {
                    parts.push(format!("vid:pid {}", vid_pid));
                }
                if let Some(path) = path {
                    parts.push(format!("path {}", path));
                }
                write!(f, "{}", parts.join(" and "))
            }
        }
    }
}

/// Printable facts about a candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub path: String,
    pub vid_pid: String,
    pub identity: Option<String>,
    pub config_value: u8,
    pub interface_number: u8,
    pub alt_setting: u8,
    pub event: u8,
    pub fetch: u8,
    pub send: u8,
}

impl DeviceSummary {
    pub fn from_candidate<D: UsbDevice>(candidate: &Candidate<D>) -> Self {
        let interface = candidate.interface();
        let endpoints = candidate.endpoints();
        Self {
            path: candidate.path_string(),
            vid_pid: candidate.descriptor().vid_pid(),
            identity: None,
            config_value: candidate.config_value(),
            interface_number: interface.interface_number,
            alt_setting: interface.setting_number,
            event: endpoints.event,
            fetch: endpoints.fetch,
            send: endpoints.send,
        }
    }

    pub fn from_open<D: UsbDevice>(open: &OpenCandidate<D>) -> Self {
        let mut summary = Self::from_candidate(open.candidate());
        summary.identity = open.identity().ok();
        summary
    }

    /// Multi-line report in the `--list` layout
    pub fn report(&self) -> String {
        let mut out = format!("{} {}", self.path, self.vid_pid);
        if let Some(identity) = &self.identity {
            out.push_str(&format!(" \"{}\"", identity));
        }
        out.push_str(&format!(
            "\n  Configuration: {}, Interface: {}, Alt setting: {}",
            self.config_value, self.interface_number, self.alt_setting
        ));
        out.push_str(&format!(
            "\n  Endpoints: event {:#04x}, fetch {:#04x}, send {:#04x}",
            self.event, self.fetch, self.send
        ));
        out
    }
}

/// Summaries of every MTP-shaped device on `bus`, without opening any
pub fn list<B: UsbBus>(bus: &B) -> Result<Vec<DeviceSummary>> {
    let candidates = find_devices(bus)?;
    Ok(candidates.iter().map(DeviceSummary::from_candidate).collect())
}

/// Run blocking USB work on its own thread with an upper time bound
///
/// The thread is detached. On timeout it is left behind without holding up
/// runtime shutdown or process exit, and it releases its devices if its USB
/// call ever returns.
pub async fn run_blocking<T, F>(timeout: Duration, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();

    std::thread::Builder::new()
        .name("usb-select".to_string())
        .spawn(move || {
            // Receiver is gone once the caller timed out
            let _ = tx.send(work());
        })
        .context("Failed to spawn USB worker thread")?;

    tokio::time::timeout(timeout, rx)
        .await
        .map_err(|_| anyhow!("USB operation timed out after {}s", timeout.as_secs_f32()))?
        .context("USB worker thread exited without a result")?
}
