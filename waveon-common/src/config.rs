//! Mixing configuration and config file resolution
//!
//! Configuration sources, highest priority first:
//! 1. Command-line overrides ([`ConfigOverrides`], filled in by the binary)
//! 2. Explicit config file (command-line `--config`, then `WAVEON_CONFIG`)
//! 3. Platform config file (`~/.config/waveon/config.toml`, `/etc/waveon/config.toml`)
//! 4. Compiled defaults
//!
//! A missing platform config file is not an error. An explicit config file
//! that is missing or malformed is.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Number of audio samples per segment (2^22)
///
/// Bounds peak memory at a few tens of MB per channel buffer while keeping
/// the number of mapping setups per pass small.
pub const DEFAULT_SEGMENT_SIZE: usize = 1 << 22;

/// Byte length of a canonical RIFF/WAVE header
pub const DEFAULT_HEADER_SIZE: usize = 44;

/// Gain applied to every auxiliary channel unless configured otherwise
pub const DEFAULT_GAIN: f64 = 1.0;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "WAVEON_CONFIG";

/// How auxiliary channels are folded into the primary channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineMode {
    /// `acc -= gain * aux`
    #[default]
    Subtract,
    /// `acc += gain * aux`
    Add,
}

impl CombineMode {
    /// Sign applied to `gain * aux` before accumulation
    pub fn sign(self) -> f64 {
        match self {
            CombineMode::Subtract => -1.0,
            CombineMode::Add => 1.0,
        }
    }
}

impl FromStr for CombineMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "subtract" | "sub" => Ok(CombineMode::Subtract),
            "add" => Ok(CombineMode::Add),
            other => Err(Error::Config(format!(
                "Unknown combine mode '{}' (expected 'subtract' or 'add')",
                other
            ))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Mixing configuration loaded from TOML
///
/// Every field is optional in the file; missing fields take the compiled
/// defaults.
///
/// ```toml
/// segment_size = 1048576
/// header_size = 44
/// default_gain = 0.5
/// combine = "add"
///
/// [logging]
/// level = "debug"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixConfig {
    /// Samples per segment
    pub segment_size: usize,

    /// Fixed container header length in bytes
    pub header_size: usize,

    /// Gain used for auxiliary channels without an explicit gain
    pub default_gain: f64,

    /// Combination applied to auxiliary channels
    pub combine: CombineMode,

    pub logging: LoggingConfig,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEGMENT_SIZE,
            header_size: DEFAULT_HEADER_SIZE,
            default_gain: DEFAULT_GAIN,
            combine: CombineMode::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Values supplied on the command line, applied over the file configuration
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub segment_size: Option<usize>,
    pub header_size: Option<usize>,
    pub default_gain: Option<f64>,
    pub combine: Option<CombineMode>,
    pub log_level: Option<String>,
}

impl MixConfig {
    /// Parse a configuration from TOML text
    ///
    /// `origin` is only used for error messages.
    pub fn from_toml_str(toml_str: &str, origin: &Path) -> Result<Self> {
        let config: MixConfig = toml::from_str(toml_str).map_err(|source| Error::ConfigParse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let toml_str = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&toml_str, path)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply command-line overrides and re-validate
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Result<Self> {
        if let Some(segment_size) = overrides.segment_size {
            self.segment_size = segment_size;
        }
        if let Some(header_size) = overrides.header_size {
            self.header_size = header_size;
        }
        if let Some(gain) = overrides.default_gain {
            self.default_gain = gain;
        }
        if let Some(combine) = overrides.combine {
            self.combine = combine;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values the mixer cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.segment_size == 0 {
            return Err(Error::Config("segment_size must be at least 1".to_string()));
        }
        if !self.default_gain.is_finite() {
            return Err(Error::Config(format!(
                "default_gain must be finite, got {}",
                self.default_gain
            )));
        }
        Ok(())
    }
}

/// Config file resolution following the priority order in the module docs
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// `cli_path` is the `--config` argument, if any
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Path of the config file that would be used, if any
    ///
    /// Returns `Ok(None)` when no explicit file is named and no platform
    /// file exists.
    pub fn config_path(&self) -> Result<Option<PathBuf>> {
        // Priority 1: command-line argument
        if let Some(path) = &self.cli_path {
            return Ok(Some(path.clone()));
        }

        // Priority 2: environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if path.trim().is_empty() {
                return Err(Error::Config(format!("{} is set but empty", CONFIG_ENV_VAR)));
            }
            return Ok(Some(PathBuf::from(path)));
        }

        // Priority 3: platform config file, only if present
        Ok(platform_config_paths().into_iter().find(|p| p.exists()))
    }

    /// Load the resolved configuration, falling back to compiled defaults
    pub fn resolve(&self) -> Result<MixConfig> {
        match self.config_path()? {
            Some(path) => MixConfig::from_file(&path),
            None => {
                debug!("No config file found, using compiled defaults");
                Ok(MixConfig::default())
            }
        }
    }
}

/// Candidate platform config files, most specific first
fn platform_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("waveon").join("config.toml"));
    }
    if cfg!(target_os = "linux") {
        paths.push(PathBuf::from("/etc/waveon/config.toml"));
    }
    paths
}
