//! Control-transfer transport: the trait and its nusb backend.
//!
//! The transport issues one blocking control transfer at a time and never
//! retries; interpreting failures is left to the protocol layers.

use std::fmt;
use std::time::Duration;

use crate::protocol::*;

// ── Error type ──

/// Transport-level failure of a single control transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The device answered with a STALL handshake.
    Stalled,
    /// The transfer did not complete before the timeout.
    Timeout,
    /// The device is no longer attached.
    Disconnected,
    /// Any other failure (platform error text).
    Failed(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Stalled => write!(f, "transfer stalled"),
            TransportError::Timeout => write!(f, "transfer timed out"),
            TransportError::Disconnected => write!(f, "device disconnected"),
            TransportError::Failed(e) => write!(f, "transfer failed: {e}"),
        }
    }
}

impl std::error::Error for TransportError {}

pub type Result<T> = std::result::Result<T, TransportError>;

// ── Requests ──

/// Data stage direction, taken from bit 7 of `bmRequestType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
}

/// Setup packet of one control transfer.
///
/// `length` is the declared `wLength`: the payload size for outbound
/// transfers, the maximum accepted size for inbound ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl ControlRequest {
    /// Vendor request carrying a NUL-terminated command of `len` bytes.
    pub fn command(len: u16) -> Self {
        ControlRequest {
            request_type: REQUEST_TYPE_COMMAND,
            request: BREQUEST_COMMAND,
            value: 0,
            index: 0,
            length: len,
        }
    }

    /// Class request carrying file packet `index`.
    pub fn file_packet(index: u16, len: u16) -> Self {
        ControlRequest {
            request_type: REQUEST_TYPE_FILE,
            request: BREQUEST_FILE,
            value: index,
            index: 0,
            length: len,
        }
    }

    /// Zero-length class request closing an upload of `packet_count` packets.
    pub fn terminal_packet(packet_count: u16) -> Self {
        Self::file_packet(packet_count, 0)
    }

    /// Class request reading the 6-byte status response.
    pub fn status() -> Self {
        ControlRequest {
            request_type: REQUEST_TYPE_STATUS,
            request: BREQUEST_STATUS,
            value: 0,
            index: 0,
            length: STATUS_LEN as u16,
        }
    }

    pub fn direction(&self) -> Direction {
        if self.request_type & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

// ── Trait ──

/// Synchronous control-transfer channel to one device.
///
/// Implementations block until the transfer completes, stalls, or times out.
pub trait ControlTransport {
    /// Host-to-device transfer. `data.len()` must equal `request.length`.
    fn control_out(&mut self, request: &ControlRequest, data: &[u8]) -> Result<usize>;

    /// Device-to-host transfer into `buf` (at most `request.length` bytes).
    fn control_in(&mut self, request: &ControlRequest, buf: &mut [u8]) -> Result<usize>;

    /// Issue a USB port reset.
    fn reset(&mut self) -> Result<()>;
}

// ── nusb backend ──

/// Split `bmRequestType` into nusb's type and recipient.
fn split_request_type(
    request_type: u8,
) -> Result<(nusb::transfer::ControlType, nusb::transfer::Recipient)> {
    use nusb::transfer::{ControlType, Recipient};

    let control_type = match (request_type >> 5) & 0x03 {
        0 => ControlType::Standard,
        1 => ControlType::Class,
        2 => ControlType::Vendor,
        _ => {
            return Err(TransportError::Failed(format!(
                "reserved request type 0x{request_type:02X}"
            )));
        }
    };
    let recipient = match request_type & 0x1F {
        0 => Recipient::Device,
        1 => Recipient::Interface,
        2 => Recipient::Endpoint,
        3 => Recipient::Other,
        r => {
            return Err(TransportError::Failed(format!(
                "reserved recipient {r} in request type 0x{request_type:02X}"
            )));
        }
    };
    Ok((control_type, recipient))
}

fn to_control(request: &ControlRequest) -> Result<nusb::transfer::Control> {
    let (control_type, recipient) = split_request_type(request.request_type)?;
    Ok(nusb::transfer::Control {
        control_type,
        recipient,
        request: request.request,
        value: request.value,
        index: request.index,
    })
}

fn map_transfer_error(e: nusb::transfer::TransferError) -> TransportError {
    use nusb::transfer::TransferError;

    match e {
        TransferError::Stall => TransportError::Stalled,
        // Blocking transfers are cancelled when their timeout expires.
        TransferError::Cancelled => TransportError::Timeout,
        TransferError::Disconnected => TransportError::Disconnected,
        other => TransportError::Failed(other.to_string()),
    }
}

/// Control transport over a claimed nusb interface.
///
/// Dropping it releases the interface claim and closes the device.
pub struct UsbTransport {
    device: nusb::Device,
    interface: nusb::Interface,
    timeout: Duration,
}

impl UsbTransport {
    pub fn new(device: nusb::Device, interface: nusb::Interface, timeout: Duration) -> Self {
        UsbTransport {
            device,
            interface,
            timeout,
        }
    }
}

impl ControlTransport for UsbTransport {
    fn control_out(&mut self, request: &ControlRequest, data: &[u8]) -> Result<usize> {
        debug_assert_eq!(request.direction(), Direction::Out);
        debug_assert_eq!(data.len(), request.length as usize);
        let control = to_control(request)?;
        log::debug!(
            "control_out type=0x{:02X} req={} value={} len={}",
            request.request_type,
            request.request,
            request.value,
            data.len()
        );
        self.interface
            .control_out_blocking(control, data, self.timeout)
            .map_err(map_transfer_error)
    }

    fn control_in(&mut self, request: &ControlRequest, buf: &mut [u8]) -> Result<usize> {
        debug_assert_eq!(request.direction(), Direction::In);
        let control = to_control(request)?;
        let len = buf.len().min(request.length as usize);
        let n = self
            .interface
            .control_in_blocking(control, &mut buf[..len], self.timeout)
            .map_err(map_transfer_error)?;
        log::debug!(
            "control_in type=0x{:02X} req={} -> {n} bytes",
            request.request_type,
            request.request
        );
        Ok(n)
    }

    fn reset(&mut self) -> Result<()> {
        self.device
            .reset()
            .map_err(|e| TransportError::Failed(format!("port reset: {e}")))
    }
}

// ── Mock transport for testing ──

/// In-memory transport that records every transfer and simulates the
/// bootloader's status handshake.
///
/// Compiled into every build so the integration tests can reach it.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::cell::{Cell, Ref, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// One recorded transfer. `data` is the outbound payload (empty for inbound).
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedTransfer {
        pub request: ControlRequest,
        pub data: Vec<u8>,
    }

    /// Shared handle to the transfers a [`MockTransport`] has seen.
    ///
    /// Stays readable after the transport has been dropped by `close`.
    #[derive(Debug, Clone, Default)]
    pub struct TransferLog(Rc<RefCell<Vec<RecordedTransfer>>>);

    impl TransferLog {
        fn push(&self, request: &ControlRequest, data: &[u8]) {
            self.0.borrow_mut().push(RecordedTransfer {
                request: *request,
                data: data.to_vec(),
            });
        }

        /// Every transfer in issue order, including failed ones.
        pub fn all(&self) -> Ref<'_, Vec<RecordedTransfer>> {
            self.0.borrow()
        }

        pub fn len(&self) -> usize {
            self.0.borrow().len()
        }

        pub fn is_empty(&self) -> bool {
            self.0.borrow().is_empty()
        }

        /// Recorded command payloads, in order.
        pub fn commands(&self) -> Vec<Vec<u8>> {
            self.0
                .borrow()
                .iter()
                .filter(|t| t.request.request_type == REQUEST_TYPE_COMMAND)
                .map(|t| t.data.clone())
                .collect()
        }

        /// Recorded data packets (non-empty file transfers) as `(index, bytes)`.
        pub fn data_packets(&self) -> Vec<(u16, Vec<u8>)> {
            self.0
                .borrow()
                .iter()
                .filter(|t| t.request.request_type == REQUEST_TYPE_FILE && t.request.length > 0)
                .map(|t| (t.request.value, t.data.clone()))
                .collect()
        }

        /// Recorded terminal packets, as their `wValue`.
        pub fn terminal_packets(&self) -> Vec<u16> {
            self.0
                .borrow()
                .iter()
                .filter(|t| t.request.request_type == REQUEST_TYPE_FILE && t.request.length == 0)
                .map(|t| t.request.value)
                .collect()
        }

        /// Number of status polls issued.
        pub fn status_polls(&self) -> usize {
            self.0
                .borrow()
                .iter()
                .filter(|t| t.request.request_type == REQUEST_TYPE_STATUS)
                .count()
        }
    }

    /// Simulated device. Without scripted responses it behaves like a
    /// healthy bootloader: flag 5 after each data packet, flags 6 then 7
    /// after the terminal packet.
    pub struct MockTransport {
        pub log: TransferLog,
        /// Scripted status replies, consumed before the simulated ones.
        pub status_responses: VecDeque<Result<Vec<u8>>>,
        /// If set, every command transfer fails with this error.
        pub fail_command: Option<TransportError>,
        /// If set, the data packet with this index fails.
        pub fail_packet: Option<(u16, TransportError)>,
        /// If set, the terminal packet fails.
        pub fail_terminal: Option<TransportError>,
        /// If set, `reset` fails.
        pub fail_reset: Option<TransportError>,
        /// Number of successful resets.
        pub resets: Rc<Cell<usize>>,
        pending_flags: VecDeque<u8>,
        released: Rc<Cell<bool>>,
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockTransport {
        pub fn new() -> Self {
            MockTransport {
                log: TransferLog::default(),
                status_responses: VecDeque::new(),
                fail_command: None,
                fail_packet: None,
                fail_terminal: None,
                fail_reset: None,
                resets: Rc::new(Cell::new(0)),
                pending_flags: VecDeque::new(),
                released: Rc::new(Cell::new(false)),
            }
        }

        /// Handle that flips to `true` when the transport is dropped.
        pub fn release_flag(&self) -> Rc<Cell<bool>> {
            Rc::clone(&self.released)
        }

        /// Handle to the transfer log.
        pub fn transfer_log(&self) -> TransferLog {
            self.log.clone()
        }

        /// Queue a status reply whose flag byte is `flag`.
        pub fn push_status_flag(&mut self, flag: u8) {
            let mut resp = vec![0u8; STATUS_LEN];
            resp[STATUS_FLAG_OFFSET] = flag;
            self.status_responses.push_back(Ok(resp));
        }
    }

    impl ControlTransport for MockTransport {
        fn control_out(&mut self, request: &ControlRequest, data: &[u8]) -> Result<usize> {
            self.log.push(request, data);
            match request.request_type {
                REQUEST_TYPE_COMMAND => {
                    if let Some(e) = &self.fail_command {
                        return Err(e.clone());
                    }
                }
                REQUEST_TYPE_FILE if request.length == 0 => {
                    self.pending_flags = VecDeque::from([FLAG_TRANSFER_COMPLETE, FLAG_IMAGE_READY]);
                    if let Some(e) = &self.fail_terminal {
                        return Err(e.clone());
                    }
                }
                REQUEST_TYPE_FILE => {
                    if let Some((index, e)) = &self.fail_packet
                        && *index == request.value
                    {
                        return Err(e.clone());
                    }
                    self.pending_flags = VecDeque::from([FLAG_PACKET_ACCEPTED]);
                }
                _ => {}
            }
            Ok(data.len())
        }

        fn control_in(&mut self, request: &ControlRequest, buf: &mut [u8]) -> Result<usize> {
            self.log.push(request, &[]);
            let resp = match self.status_responses.pop_front() {
                Some(scripted) => scripted?,
                None => {
                    let mut resp = vec![0u8; STATUS_LEN];
                    resp[STATUS_FLAG_OFFSET] = self.pending_flags.pop_front().unwrap_or(0);
                    resp
                }
            };
            let n = resp.len().min(buf.len());
            buf[..n].copy_from_slice(&resp[..n]);
            Ok(n)
        }

        fn reset(&mut self) -> Result<()> {
            if let Some(e) = &self.fail_reset {
                return Err(e.clone());
            }
            self.resets.set(self.resets.get() + 1);
            Ok(())
        }
    }

    impl Drop for MockTransport {
        fn drop(&mut self) {
            self.released.set(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_request_shape() {
        let r = ControlRequest::command(3);
        assert_eq!(r.request_type, 0x40);
        assert_eq!(r.request, 0);
        assert_eq!(r.value, 0);
        assert_eq!(r.index, 0);
        assert_eq!(r.length, 3);
        assert_eq!(r.direction(), Direction::Out);
    }

    #[test]
    fn file_packet_carries_index_in_value() {
        let r = ControlRequest::file_packet(7, 2048);
        assert_eq!(r.request_type, 0x21);
        assert_eq!(r.request, 1);
        assert_eq!(r.value, 7);
        assert_eq!(r.length, 2048);
    }

    #[test]
    fn terminal_packet_is_zero_length() {
        let r = ControlRequest::terminal_packet(3);
        assert_eq!(r.request_type, 0x21);
        assert_eq!(r.request, 1);
        assert_eq!(r.value, 3);
        assert_eq!(r.length, 0);
    }

    #[test]
    fn status_request_is_inbound() {
        let r = ControlRequest::status();
        assert_eq!(r.request_type, 0xA1);
        assert_eq!(r.request, 3);
        assert_eq!(r.length, 6);
        assert_eq!(r.direction(), Direction::In);
    }

    #[test]
    fn split_vendor_device() {
        use nusb::transfer::{ControlType, Recipient};
        let (t, r) = split_request_type(0x40).unwrap();
        assert!(matches!(t, ControlType::Vendor));
        assert!(matches!(r, Recipient::Device));
    }

    #[test]
    fn split_class_interface() {
        use nusb::transfer::{ControlType, Recipient};
        let (t, r) = split_request_type(0xA1).unwrap();
        assert!(matches!(t, ControlType::Class));
        assert!(matches!(r, Recipient::Interface));
    }

    #[test]
    fn split_rejects_reserved_type() {
        assert!(split_request_type(0x60).is_err());
    }

    #[test]
    fn split_rejects_reserved_recipient() {
        assert!(split_request_type(0x45).is_err());
    }

    #[test]
    fn error_display() {
        assert_eq!(TransportError::Stalled.to_string(), "transfer stalled");
        assert_eq!(
            TransportError::Failed("pipe".into()).to_string(),
            "transfer failed: pipe"
        );
    }

    // ── MockTransport ──

    #[test]
    fn mock_simulates_packet_ack() {
        let mut t = mock::MockTransport::new();
        t.control_out(&ControlRequest::file_packet(0, 2), &[1, 2])
            .unwrap();
        let mut buf = [0u8; STATUS_LEN];
        t.control_in(&ControlRequest::status(), &mut buf).unwrap();
        assert_eq!(buf[STATUS_FLAG_OFFSET], FLAG_PACKET_ACCEPTED);
    }

    #[test]
    fn mock_simulates_finalization() {
        let mut t = mock::MockTransport::new();
        t.control_out(&ControlRequest::terminal_packet(0), &[])
            .unwrap();
        let mut buf = [0u8; STATUS_LEN];
        t.control_in(&ControlRequest::status(), &mut buf).unwrap();
        assert_eq!(buf[STATUS_FLAG_OFFSET], FLAG_TRANSFER_COMPLETE);
        t.control_in(&ControlRequest::status(), &mut buf).unwrap();
        assert_eq!(buf[STATUS_FLAG_OFFSET], FLAG_IMAGE_READY);
    }

    #[test]
    fn mock_scripted_status_takes_priority() {
        let mut t = mock::MockTransport::new();
        t.push_status_flag(9);
        let mut buf = [0u8; STATUS_LEN];
        t.control_in(&ControlRequest::status(), &mut buf).unwrap();
        assert_eq!(buf[STATUS_FLAG_OFFSET], 9);
    }

    #[test]
    fn mock_reports_release_on_drop() {
        let t = mock::MockTransport::new();
        let released = t.release_flag();
        assert!(!released.get());
        drop(t);
        assert!(released.get());
    }
}
