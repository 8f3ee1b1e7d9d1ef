//! Device configuration
//!
//! Construction parameters of the block device, loadable from TOML:
//!
//! ```toml
//! clock_mode = "Mode3"
//! frequency = "50 MHz"
//! max_read_mode = "quad-io"
//! soft_reset = true
//!
//! [poll]
//! poll_delay_us = 100
//! ready_timeout_us = "0x1E8480"
//! wren_max_polls = 10
//! ```

use std::fmt;
use std::format;
use std::fs;
use std::path::Path;
use std::string::{String, ToString};

use crate::bus::ClockMode;
use crate::protocol::PollConfig;
use crate::spi::IoMode;

/// Default bus frequency (40 MHz)
pub const DEFAULT_FREQUENCY_HZ: u32 = 40_000_000;

/// Block device construction parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Clock polarity mode
    pub clock_mode: ClockMode,
    /// Bus frequency in Hz
    pub frequency_hz: u32,
    /// Status polling limits
    pub poll: PollConfig,
    /// Fastest read mode that may be negotiated
    pub max_read_mode: Option<IoMode>,
    /// Issue a soft reset (66h/99h) before discovery
    pub soft_reset: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            clock_mode: ClockMode::Mode0,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            poll: PollConfig::default(),
            max_read_mode: None,
            soft_reset: true,
        }
    }
}

/// Error loading a configuration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The file could not be read
    Io(std::io::ErrorKind),
    /// The content is not a valid configuration
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(kind) => write!(f, "cannot read configuration: {}", kind),
            Self::Parse(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// On-disk layout, every field optional
#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlDeviceConfig {
    clock_mode: Option<ClockMode>,
    frequency: Option<NumberOrString>,
    max_read_mode: Option<IoMode>,
    soft_reset: Option<bool>,
    poll: Option<TomlPollConfig>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlPollConfig {
    poll_delay_us: Option<NumberOrString>,
    ready_timeout_us: Option<NumberOrString>,
    wren_max_polls: Option<NumberOrString>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Int(u32),
    Str(String),
}

impl NumberOrString {
    fn to_u32(&self) -> Result<u32, String> {
        match self {
            Self::Int(n) => Ok(*n),
            Self::Str(s) => parse_number(s),
        }
    }

    fn to_frequency(&self) -> Result<u32, String> {
        match self {
            Self::Int(n) => Ok(*n),
            Self::Str(s) => parse_frequency(s),
        }
    }
}

impl DeviceConfig {
    /// Read a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io(e.kind()))?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from a TOML string
    ///
    /// Missing fields keep their default value.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: TomlDeviceConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.message().to_string()))?;
        let mut config = Self::default();

        if let Some(mode) = file.clock_mode {
            config.clock_mode = mode;
        }
        if let Some(freq) = file.frequency {
            config.frequency_hz = freq.to_frequency().map_err(ConfigError::Parse)?;
        }
        if config.frequency_hz == 0 {
            return Err(ConfigError::Parse("frequency must not be zero".to_string()));
        }
        config.max_read_mode = file.max_read_mode;
        if let Some(reset) = file.soft_reset {
            config.soft_reset = reset;
        }

        if let Some(poll) = file.poll {
            let fields = [
                (poll.poll_delay_us, &mut config.poll.poll_delay_us),
                (poll.ready_timeout_us, &mut config.poll.ready_timeout_us),
                (poll.wren_max_polls, &mut config.poll.wren_max_polls),
            ];
            for (value, slot) in fields {
                if let Some(value) = value {
                    *slot = value.to_u32().map_err(ConfigError::Parse)?;
                }
            }
        }

        Ok(config)
    }
}

/// Parse a number that can be hex (0x...) or decimal
fn parse_number(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))
    } else {
        s.parse().map_err(|e| format!("invalid number: {}", e))
    }
}

/// Parse a frequency string like "40 MHz", "500kHz" or "1000000"
fn parse_frequency(s: &str) -> Result<u32, String> {
    let s = s.trim();

    if let Ok(n) = parse_number(s) {
        return Ok(n);
    }

    let s_lower = s.to_lowercase();
    let (num_str, multiplier) = if let Some(n) = s_lower.strip_suffix("mhz") {
        (n.trim(), 1_000_000)
    } else if let Some(n) = s_lower.strip_suffix("khz") {
        (n.trim(), 1_000)
    } else if let Some(n) = s_lower.strip_suffix("hz") {
        (n.trim(), 1)
    } else {
        return Err(format!("invalid frequency: {}", s));
    };

    let num: u32 = num_str
        .parse()
        .map_err(|_| format!("invalid frequency: {}", s))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("frequency out of range: {}", s))
}
