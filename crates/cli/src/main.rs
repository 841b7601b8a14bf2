//! mtp-select
//!
//! Finds USB devices speaking the MTP transport and selects exactly one of
//! them, by identity pattern or by vendor/product id and port path.

mod config;
mod select;

use anyhow::{Context, Result};
use clap::Parser;
use common::setup_logging;
use config::{AppConfig, expand_path};
use mtp_discovery::{DebugFlags, LibUsbBus, SelectError, VidPidFilter};
use select::{Selection, run_blocking};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "mtp-select")]
#[command(author, version, about = "Find and select a USB MTP device")]
#[command(long_about = "
Finds USB devices exposing the MTP transport (interrupt IN, bulk IN and
bulk OUT endpoints in one alternate setting) and selects exactly one.

The identity of a device is its manufacturer, product and serial number
strings joined by spaces. A PATTERN is a regular expression searched
anywhere in that identity; an empty pattern matches any device.

EXAMPLES:
    # Select the only MTP device attached
    mtp-select

    # Select by identity
    mtp-select 'Pixel 7'

    # Select by vendor id and port path
    mtp-select --vid-pid 0x18d1:* --path 1-2.4

    # List MTP devices without opening them
    mtp-select --list

CONFIGURATION:
    Defaults are read from the first file found of:
    1. Path specified with --config
    2. ~/.config/mtp-select/config.toml
    3. /etc/mtp-select/config.toml
    4. Built-in defaults
")]
struct Args {
    /// Identity pattern (regular expression)
    #[arg(value_name = "PATTERN", conflicts_with_all = ["vid_pid", "path"])]
    pattern: Option<String>,

    /// Select by vendor/product id, e.g. 0x18d1:0x4ee1 or 0x18d1:*
    #[arg(long, value_name = "VID:PID")]
    vid_pid: Option<VidPidFilter>,

    /// Select by port path, e.g. 1-2.4
    #[arg(long, value_name = "PATH")]
    path: Option<String>,

    /// List MTP devices and exit
    #[arg(long)]
    list: bool,

    /// Enable debug flags on the selected device
    #[arg(long)]
    debug: bool,

    /// Give up after this many seconds
    #[arg(short, long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

impl Args {
    /// Command-line selection, falling back to the configured one
    fn selection(&self, config: &AppConfig) -> Result<Selection> {
        if self.pattern.is_some() || self.vid_pid.is_some() || self.path.is_some() {
            return Selection::from_parts(self.pattern.clone(), self.vid_pid, self.path.clone());
        }

        let settings = &config.selection;
        let vid_pid = settings
            .vid_pid
            .as_deref()
            .map(str::parse::<VidPidFilter>)
            .transpose()?;
        Selection::from_parts(settings.pattern.clone(), vid_pid, settings.path.clone())
    }

    fn debug_flags(&self, config: &AppConfig) -> DebugFlags {
        if self.debug || config.selection.debug {
            DebugFlags::all()
        } else {
            DebugFlags::default()
        }
    }

    fn timeout(&self, config: &AppConfig) -> Duration {
        self.timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| config.selection.timeout())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = AppConfig::default();
        let path = AppConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        AppConfig::load(Some(expand_path(path))).context("Failed to load configuration")?
    } else {
        AppConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.logging.level);

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("mtp-select v{}", env!("CARGO_PKG_VERSION"));
    debug!("Log level: {}", log_level);

    let timeout = args.timeout(&config);

    if args.list {
        return list_mode(timeout).await;
    }

    let selection = args.selection(&config)?;
    let debug_flags = args.debug_flags(&config);
    select_mode(selection, debug_flags, timeout).await
}

/// List MTP devices and exit
async fn list_mode(timeout: Duration) -> Result<()> {
    info!("Listing MTP devices...");

    let devices = run_blocking(timeout, || {
        let bus = LibUsbBus::new().map_err(SelectError::Context)?;
        select::list(&bus)
    })
    .await?;

    if devices.is_empty() {
        println!("No MTP devices found.");
    } else {
        println!("Found {} MTP device(s):\n", devices.len());
        for device in devices {
            println!("{}\n", device.report());
        }
    }

    Ok(())
}

/// Select one device, report it and exit
async fn select_mode(selection: Selection, debug: DebugFlags, timeout: Duration) -> Result<()> {
    info!("Selecting {}", selection);

    let description = selection.to_string();
    let summary = run_blocking(timeout, move || {
        let bus = LibUsbBus::new().map_err(SelectError::Context)?;
        selection.run(&bus, debug)
    })
    .await
    .with_context(|| format!("Failed to select {}", description))?;

    println!("Selected MTP device:\n");
    println!("{}", summary.report());

    Ok(())
}
