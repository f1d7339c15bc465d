//! Runtime session configuration.
//!
//! Nothing is read from or written to disk; the binary builds a
//! [`SessionConfig`] from command-line flags and environment variables.

use std::fmt;
use std::time::Duration;

use crate::protocol::{PID_DFU, PID_RECOVERY, USB_TIMEOUT_MS};

/// Prompt shown by the interactive shell.
pub const DEFAULT_PROMPT: &str = "iDevice$ ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Product ID to open instead of the well-known ones.
    pub product_id: Option<u16>,
    /// Timeout applied to every control transfer.
    pub timeout: Duration,
    pub prompt: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            product_id: None,
            timeout: Duration::from_millis(USB_TIMEOUT_MS),
            prompt: DEFAULT_PROMPT.into(),
        }
    }
}

/// Validation errors that [`SessionConfig::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    ZeroTimeout,
    InvalidProductId(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroTimeout => write!(f, "transfer timeout must be greater than zero"),
            ConfigError::InvalidProductId(e) => write!(f, "Invalid product ID: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Product IDs to try for commands and the shell: the override, or recovery mode.
    pub fn command_candidates(&self) -> Vec<u16> {
        match self.product_id {
            Some(pid) => vec![pid],
            None => vec![PID_RECOVERY],
        }
    }

    /// Product IDs to try for uploads: the override, or recovery then DFU mode.
    pub fn upload_candidates(&self) -> Vec<u16> {
        match self.product_id {
            Some(pid) => vec![pid],
            None => vec![PID_RECOVERY, PID_DFU],
        }
    }
}

/// Parse a hexadecimal product ID, with or without a `0x` prefix.
pub fn parse_product_id(s: &str) -> Result<u16, ConfigError> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(ConfigError::InvalidProductId("empty value".into()));
    }
    u16::from_str_radix(digits, 16)
        .map_err(|e| ConfigError::InvalidProductId(format!("'{s}': {e}")))
}
