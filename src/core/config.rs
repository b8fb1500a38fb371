use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub transmission: TransmissionConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransmissionConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_rpc_path")]
    pub rpc_path: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Limits fed to the decision engine. Delays and durations are in minutes.
#[derive(Debug, Clone, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_stabilization_delay")]
    pub stabilization_delay: u32,
    /// KB/s (1 KB = 1024 bytes)
    #[serde(default = "default_min_download_rate")]
    pub min_download_rate: f64,
    #[serde(default = "default_min_rate_duration")]
    pub min_rate_duration: u32,
    #[serde(default = "default_post_completion_delay")]
    pub post_completion_delay: u32,
    #[serde(default = "default_ignore_labels")]
    pub ignore_labels: BTreeSet<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Append-only log file, in addition to the console
    pub path: Option<PathBuf>,
    #[serde(default = "default_console")]
    pub console: bool,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            stabilization_delay: default_stabilization_delay(),
            min_download_rate: default_min_download_rate(),
            min_rate_duration: default_min_rate_duration(),
            post_completion_delay: default_post_completion_delay(),
            ignore_labels: default_ignore_labels(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            path: None,
            console: default_console(),
        }
    }
}

// Default value functions
fn default_port() -> u16 {
    9091
}

fn default_rpc_path() -> String {
    "/transmission/rpc".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_stabilization_delay() -> u32 {
    15
}

fn default_min_download_rate() -> f64 {
    25.0
}

fn default_min_rate_duration() -> u32 {
    30
}

fn default_post_completion_delay() -> u32 {
    30
}

fn default_ignore_labels() -> BTreeSet<String> {
    ["keep", "no-auto-remove"]
        .iter()
        .map(|label| label.to_string())
        .collect()
}

fn default_state_path() -> PathBuf {
    PathBuf::from("janitor_state.csv")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "console".to_string()
}

fn default_console() -> bool {
    true
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate transmission config
        if self.transmission.host.trim().is_empty() {
            bail!("transmission.host must not be empty");
        }

        if self.transmission.port == 0 {
            bail!("transmission.port must be greater than 0");
        }

        if !self.transmission.rpc_path.starts_with('/') {
            bail!(
                "transmission.rpc_path '{}' must start with '/'",
                self.transmission.rpc_path
            );
        }

        if self.transmission.timeout_secs == 0 {
            bail!("transmission.timeout_secs must be greater than 0");
        }

        // Validate thresholds
        if !self.thresholds.min_download_rate.is_finite() || self.thresholds.min_download_rate <= 0.0 {
            bail!("thresholds.min_download_rate must be greater than 0");
        }

        if self.thresholds.min_rate_duration == 0 {
            bail!("thresholds.min_rate_duration must be greater than 0");
        }

        if self.thresholds.ignore_labels.iter().any(|label| label.trim().is_empty()) {
            bail!("thresholds.ignore_labels must not contain empty labels");
        }

        // Validate state config
        if self.state.path.as_os_str().is_empty() {
            bail!("state.path must not be empty");
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            );
        }

        let valid_formats = ["json", "console"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            bail!(
                "Invalid log format '{}'. Must be one of: json, console",
                self.logging.format
            );
        }

        if !self.logging.console && self.logging.path.is_none() {
            bail!("logging.console is disabled and no logging.path is set; nothing would be logged");
        }

        Ok(())
    }
}

impl TransmissionConfig {
    pub fn rpc_url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.rpc_path)
    }
}
