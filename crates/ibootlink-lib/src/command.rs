//! Text commands: one NUL-terminated string per vendor control request.

use std::fmt;

use crate::device::DeviceSession;
use crate::protocol::{MAX_TRANSFER_LEN, REBOOT_COMMAND};
use crate::transport::{ControlRequest, ControlTransport, TransportError};

#[derive(Debug)]
pub enum CommandError {
    TransferFailed(TransportError),
    /// Interior NUL bytes would truncate the command on the device.
    ContainsNul,
    /// Encoded length (including the terminator) exceeds one transfer.
    TooLong(usize),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::TransferFailed(e) => write!(f, "Error sending command: {e}"),
            CommandError::ContainsNul => write!(f, "command contains a NUL byte"),
            CommandError::TooLong(len) => write!(
                f,
                "command too long: {len} bytes encoded, limit {MAX_TRANSFER_LEN}"
            ),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::TransferFailed(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CommandError>;

/// Successful outcomes of [`send_command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The device accepted the command.
    Sent,
    /// `reboot` was sent and the device dropped the transfer while going
    /// down. The caller should close the session now.
    RebootAcknowledgedByDisconnect,
}

/// Encode `command` as bytes plus a trailing NUL.
pub fn encode_command(command: &str) -> Result<Vec<u8>> {
    if command.as_bytes().contains(&0) {
        return Err(CommandError::ContainsNul);
    }
    let len = command.len() + 1;
    if len > MAX_TRANSFER_LEN {
        return Err(CommandError::TooLong(len));
    }
    let mut buf = Vec::with_capacity(len);
    buf.extend_from_slice(command.as_bytes());
    buf.push(0);
    Ok(buf)
}

/// Send one command. Transfer failures are never retried.
pub fn send_command<T: ControlTransport>(
    session: &mut DeviceSession<T>,
    command: &str,
) -> Result<CommandOutcome> {
    let data = encode_command(command)?;
    let request = ControlRequest::command(data.len() as u16);

    match session.transport_mut().control_out(&request, &data) {
        Ok(_) => {
            log::debug!("sent command {command:?}");
            Ok(CommandOutcome::Sent)
        }
        Err(e) if command == REBOOT_COMMAND => {
            log::info!("device went away after reboot ({e})");
            Ok(CommandOutcome::RebootAcknowledgedByDisconnect)
        }
        Err(e) => Err(CommandError::TransferFailed(e)),
    }
}
