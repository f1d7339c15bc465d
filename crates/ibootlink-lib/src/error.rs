//! Unified error type for the ibootlink-lib crate.
//!
//! [`IbootError`] wraps the per-module errors so `?` can cross module
//! boundaries. `source()` chains to the wrapped error.

use std::fmt;

use crate::command::CommandError;
use crate::config::ConfigError;
use crate::device::SessionError;
use crate::status::StatusError;
use crate::transport::TransportError;
use crate::upload::{FileError, UploadError};

#[derive(Debug)]
pub enum IbootError {
    Session(SessionError),
    Transport(TransportError),
    Command(CommandError),
    Status(StatusError),
    Upload(UploadError),
    File(FileError),
    Config(ConfigError),
    /// Operator I/O (reading input lines, writing output).
    Io(std::io::Error),
}

impl fmt::Display for IbootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IbootError::Session(e) => write!(f, "{e}"),
            IbootError::Transport(e) => write!(f, "{e}"),
            IbootError::Command(e) => write!(f, "{e}"),
            IbootError::Status(e) => write!(f, "{e}"),
            IbootError::Upload(e) => write!(f, "{e}"),
            IbootError::File(e) => write!(f, "{e}"),
            IbootError::Config(e) => write!(f, "{e}"),
            IbootError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for IbootError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IbootError::Session(e) => Some(e),
            IbootError::Transport(e) => Some(e),
            IbootError::Command(e) => Some(e),
            IbootError::Status(e) => Some(e),
            IbootError::Upload(e) => Some(e),
            IbootError::File(e) => Some(e),
            IbootError::Config(e) => Some(e),
            IbootError::Io(e) => Some(e),
        }
    }
}

impl From<SessionError> for IbootError {
    fn from(e: SessionError) -> Self {
        IbootError::Session(e)
    }
}

impl From<TransportError> for IbootError {
    fn from(e: TransportError) -> Self {
        IbootError::Transport(e)
    }
}

impl From<CommandError> for IbootError {
    fn from(e: CommandError) -> Self {
        IbootError::Command(e)
    }
}

impl From<StatusError> for IbootError {
    fn from(e: StatusError) -> Self {
        IbootError::Status(e)
    }
}

impl From<UploadError> for IbootError {
    fn from(e: UploadError) -> Self {
        IbootError::Upload(e)
    }
}

impl From<FileError> for IbootError {
    fn from(e: FileError) -> Self {
        IbootError::File(e)
    }
}

impl From<ConfigError> for IbootError {
    fn from(e: ConfigError) -> Self {
        IbootError::Config(e)
    }
}

impl From<std::io::Error> for IbootError {
    fn from(e: std::io::Error) -> Self {
        IbootError::Io(e)
    }
}

/// Crate-level Result alias using [`IbootError`].
pub type Result<T> = std::result::Result<T, IbootError>;
