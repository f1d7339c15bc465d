//! Status polling: read the 6-byte status response and check its flag byte.

use std::fmt;

use crate::device::DeviceSession;
use crate::protocol::{STATUS_FLAG_OFFSET, STATUS_LEN};
use crate::transport::{ControlRequest, ControlTransport, TransportError};

#[derive(Debug)]
pub enum StatusError {
    TransferFailed(TransportError),
    /// The response ended before the flag byte.
    ShortResponse(usize),
    UnexpectedFlag { expected: u8, actual: u8 },
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusError::TransferFailed(e) => write!(f, "couldn't receive status: {e}"),
            StatusError::ShortResponse(n) => {
                write!(f, "status response too short: got {n} bytes")
            }
            StatusError::UnexpectedFlag { expected, actual } => write!(
                f,
                "invalid status response: expected flag {expected}, got {actual}"
            ),
        }
    }
}

impl std::error::Error for StatusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StatusError::TransferFailed(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StatusError>;

/// Raw status response. Only the flag byte is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusResponse {
    pub raw: [u8; STATUS_LEN],
}

impl StatusResponse {
    pub fn flag(&self) -> u8 {
        self.raw[STATUS_FLAG_OFFSET]
    }
}

/// Read one status response.
pub fn read_status<T: ControlTransport>(session: &mut DeviceSession<T>) -> Result<StatusResponse> {
    let mut raw = [0u8; STATUS_LEN];
    let n = session
        .transport_mut()
        .control_in(&ControlRequest::status(), &mut raw)
        .map_err(StatusError::TransferFailed)?;
    if n <= STATUS_FLAG_OFFSET {
        return Err(StatusError::ShortResponse(n));
    }
    Ok(StatusResponse { raw })
}

/// Poll status once and require `expected` in the flag byte. No retry.
pub fn poll_status<T: ControlTransport>(
    session: &mut DeviceSession<T>,
    expected: u8,
) -> Result<()> {
    let status = read_status(session)?;
    let actual = status.flag();
    if actual != expected {
        return Err(StatusError::UnexpectedFlag { expected, actual });
    }
    log::debug!("status flag {actual} ok");
    Ok(())
}
