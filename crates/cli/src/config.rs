//! mtp-select configuration management

use anyhow::{Context, Result, anyhow};
use mtp_discovery::VidPidFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub selection: SelectionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "LoggingSettings::default_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

impl LoggingSettings {
    fn default_level() -> String {
        "warn".to_string()
    }
}

/// Default selection rule, used when none is given on the command line
///
/// `pattern` selects by identity string; `vid_pid` and `path` select by
/// predicate and may be combined. Pattern and predicate are exclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionSettings {
    /// Identity regular expression (empty matches any device)
    #[serde(default)]
    pub pattern: Option<String>,
    /// Vendor/product filter, e.g. "0x18d1:*"
    #[serde(default)]
    pub vid_pid: Option<String>,
    /// Topological path, e.g. "1-2.4"
    #[serde(default)]
    pub path: Option<String>,
    /// Set all debug flags on candidates
    #[serde(default)]
    pub debug: bool,
    /// Upper bound for one discovery or selection run
    #[serde(default = "SelectionSettings::default_timeout")]
    pub timeout_secs: u64,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            pattern: None,
            vid_pid: None,
            path: None,
            debug: false,
            timeout_secs: Self::default_timeout(),
        }
    }
}

impl SelectionSettings {
    fn default_timeout() -> u64 {
        10
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from the specified path, or the first standard
    /// location that exists
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/mtp-select/config.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Using default configuration: {:#}", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("mtp-select").join("config.toml")
        } else {
            PathBuf::from(".config/mtp-select/config.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        common::validate_log_level(&self.logging.level)?;

        let selection = &self.selection;

        if let Some(pattern) = &selection.pattern {
            regex::Regex::new(pattern)
                .with_context(|| format!("Invalid selection pattern '{}'", pattern))?;
        }

        if let Some(vid_pid) = &selection.vid_pid {
            vid_pid.parse::<VidPidFilter>()?;
        }

        if selection.pattern.is_some() && (selection.vid_pid.is_some() || selection.path.is_some())
        {
            return Err(anyhow!(
                "Selection 'pattern' cannot be combined with 'vid_pid' or 'path'"
            ));
        }

        if selection.timeout_secs == 0 {
            return Err(anyhow!("Selection timeout_secs must be greater than 0"));
        }

        Ok(())
    }
}

/// Expand a leading `~` in a user-supplied path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}
