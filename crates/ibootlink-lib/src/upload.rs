//! File upload: fixed-size packets with a status check after each, then the
//! finalization handshake.
//!
//! ```text
//! for i in 0..count:  OUT 0x21/0x01 wValue=i  <packet i>   then status == 5
//! OUT 0x21/0x01 wValue=count  <empty>                      (result ignored)
//! status == 6, status == 7
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use crate::device::DeviceSession;
use crate::protocol::*;
use crate::status::{StatusError, poll_status};
use crate::transport::{ControlRequest, ControlTransport, TransportError};

// ── Errors ──

#[derive(Debug)]
pub enum UploadError {
    /// Packet `index` could not be transferred. Nothing later was sent.
    PacketFailed {
        index: u16,
        source: TransportError,
    },
    /// The device did not acknowledge packet `index`.
    Rejected { index: u16, source: StatusError },
    /// A finalization status check failed.
    FinalizationFailed(StatusError),
    /// The packet count would not fit in `wValue`.
    PayloadTooLarge { len: usize },
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::PacketFailed { index, source } => {
                write!(f, "couldn't send packet {}: {source}", index + 1)
            }
            UploadError::Rejected { index, source } => {
                write!(f, "device rejected packet {}: {source}", index + 1)
            }
            UploadError::FinalizationFailed(e) => write!(f, "upload finalization failed: {e}"),
            UploadError::PayloadTooLarge { len } => write!(
                f,
                "payload of {len} bytes exceeds {} packets of {PACKET_SIZE} bytes",
                u16::MAX
            ),
        }
    }
}

impl std::error::Error for UploadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UploadError::PacketFailed { source, .. } => Some(source),
            UploadError::Rejected { source, .. } => Some(source),
            UploadError::FinalizationFailed(e) => Some(e),
            UploadError::PayloadTooLarge { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, UploadError>;

/// Failure to obtain an upload payload from disk.
#[derive(Debug)]
pub enum FileError {
    NotFound(PathBuf),
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::NotFound(path) => write!(f, "File doesn't exist: {}", path.display()),
            FileError::Unreadable { path, source } => {
                write!(f, "Couldn't read file {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileError::Unreadable { source, .. } => Some(source),
            FileError::NotFound(_) => None,
        }
    }
}

/// Read an upload payload.
pub fn read_payload(path: impl AsRef<Path>) -> std::result::Result<Vec<u8>, FileError> {
    let path = path.as_ref();
    std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FileError::NotFound(path.to_path_buf()),
        _ => FileError::Unreadable {
            path: path.to_path_buf(),
            source: e,
        },
    })
}

// ── Plan ──

/// How a payload splits into packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTransferPlan {
    pub total_len: usize,
    pub packet_size: usize,
    pub packet_count: u16,
}

impl FileTransferPlan {
    pub fn new(total_len: usize) -> Result<Self> {
        Self::with_packet_size(total_len, PACKET_SIZE)
    }

    fn with_packet_size(total_len: usize, packet_size: usize) -> Result<Self> {
        let count = total_len.div_ceil(packet_size);
        // The terminal packet carries the count in wValue.
        let packet_count =
            u16::try_from(count).map_err(|_| UploadError::PayloadTooLarge { len: total_len })?;
        Ok(FileTransferPlan {
            total_len,
            packet_size,
            packet_count,
        })
    }

    /// Byte range of packet `index` within the payload.
    pub fn packet_range(&self, index: u16) -> std::ops::Range<usize> {
        let start = index as usize * self.packet_size;
        let end = (start + self.packet_size).min(self.total_len);
        start..end
    }

    /// Length of every packet, in order.
    pub fn packet_lengths(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.packet_count).map(|i| self.packet_range(i).len())
    }
}

// ── Upload ──

/// Upload `payload` and wait for the device to validate it.
pub fn send_file<T: ControlTransport>(
    session: &mut DeviceSession<T>,
    payload: &[u8],
) -> Result<()> {
    send_file_with_progress(session, payload, |_, _| {})
}

/// [`send_file`], calling `on_packet(bytes_sent, total)` after each
/// acknowledged packet.
pub fn send_file_with_progress<T: ControlTransport>(
    session: &mut DeviceSession<T>,
    payload: &[u8],
    mut on_packet: impl FnMut(usize, usize),
) -> Result<()> {
    let plan = FileTransferPlan::new(payload.len())?;
    log::info!(
        "uploading {} bytes in {} packet(s)",
        plan.total_len,
        plan.packet_count
    );

    for index in 0..plan.packet_count {
        let range = plan.packet_range(index);
        let sent = range.end;
        let chunk = &payload[range];
        let request = ControlRequest::file_packet(index, chunk.len() as u16);

        session
            .transport_mut()
            .control_out(&request, chunk)
            .map_err(|source| UploadError::PacketFailed { index, source })?;

        poll_status(session, FLAG_PACKET_ACCEPTED)
            .map_err(|source| UploadError::Rejected { index, source })?;

        log::debug!("packet {index} acknowledged ({sent}/{} bytes)", plan.total_len);
        on_packet(sent, plan.total_len);
    }

    finalize(session, plan.packet_count)?;
    log::info!("upload of {} bytes complete", plan.total_len);
    Ok(())
}

/// Terminal zero-length packet, then the two finalization flags.
fn finalize<T: ControlTransport>(session: &mut DeviceSession<T>, packet_count: u16) -> Result<()> {
    let terminal = ControlRequest::terminal_packet(packet_count);
    if let Err(e) = session.transport_mut().control_out(&terminal, &[]) {
        // iBoot often does not complete this request; the status checks decide.
        log::warn!("terminal packet not acknowledged: {e}");
    }

    for flag in [FLAG_TRANSFER_COMPLETE, FLAG_IMAGE_READY] {
        poll_status(session, flag).map_err(UploadError::FinalizationFailed)?;
    }
    Ok(())
}
