//! Integration tests: whole sessions driven through the public API against
//! the mock transport.
//!
//! These cover the interactive loop's transitions and the guarantee that
//! the transport is released however the session ends.

use ibootlink_lib::IbootError;
use ibootlink_lib::command::{CommandOutcome, send_command};
use ibootlink_lib::device::{DeviceIdentity, DeviceSession, EndReason, SessionError};
use ibootlink_lib::protocol::*;
use ibootlink_lib::shell::{ReaderSource, run_interactive};
use ibootlink_lib::transport::TransportError;
use ibootlink_lib::transport::mock::MockTransport;
use ibootlink_lib::upload::{UploadError, send_file};

fn session(mock: MockTransport) -> DeviceSession<MockTransport> {
    let identity = DeviceIdentity {
        vendor_id: APPLE_VID,
        product_id: PID_RECOVERY,
        name: Some("Apple Mobile Device (Recovery Mode)".into()),
        serial: Some("CPID:8920 CPRV:15 SRTG:[iBoot-359.3.2]".into()),
    };
    DeviceSession::with_transport(mock, identity)
}

/// Run the shell over `script`, returning the result and everything printed.
fn run_script(
    mock: MockTransport,
    script: &str,
) -> (ibootlink_lib::error::Result<ibootlink_lib::device::SessionEnded>, String) {
    let mut input = ReaderSource::new(script.as_bytes());
    let mut out = Vec::new();
    let result = run_interactive(session(mock), &mut input, &mut out, "iDevice$ ");
    (result, String::from_utf8(out).unwrap())
}

// ── Interactive loop ──

#[test]
fn commands_are_forwarded_until_exit() {
    let mock = MockTransport::new();
    let log = mock.transfer_log();
    let released = mock.release_flag();

    let (result, out) = run_script(mock, "setenv auto-boot true\nsaveenv\n/exit\ngo\n");

    let ended = result.unwrap();
    assert_eq!(ended.reason, EndReason::Closed);
    assert!(released.get());
    assert_eq!(
        log.commands(),
        vec![b"setenv auto-boot true\0".to_vec(), b"saveenv\0".to_vec()]
    );
    assert!(out.contains("Sent command: setenv auto-boot true"));
    assert!(out.contains("Sent command: saveenv"));
}

#[test]
fn end_of_input_closes() {
    let mock = MockTransport::new();
    let released = mock.release_flag();
    let (result, _) = run_script(mock, "go\n");
    assert_eq!(result.unwrap().reason, EndReason::Closed);
    assert!(released.get());
}

#[test]
fn reset_directive_resets_and_releases() {
    let mock = MockTransport::new();
    let resets = mock.resets.clone();
    let released = mock.release_flag();
    let (result, _) = run_script(mock, "/reset\n");
    assert_eq!(result.unwrap().reason, EndReason::Reset);
    assert_eq!(resets.get(), 1);
    assert!(released.get());
}

#[test]
fn failed_reset_is_reported_after_release() {
    let mut mock = MockTransport::new();
    mock.fail_reset = Some(TransportError::Disconnected);
    let released = mock.release_flag();
    let (result, _) = run_script(mock, "/reset\n");
    assert!(matches!(
        result.unwrap_err(),
        IbootError::Session(SessionError::ResetFailed(TransportError::Disconnected))
    ));
    assert!(released.get());
}

#[test]
fn reboot_disconnect_ends_session() {
    let mut mock = MockTransport::new();
    mock.fail_command = Some(TransportError::Stalled);
    let log = mock.transfer_log();
    let released = mock.release_flag();

    let (result, out) = run_script(mock, "reboot\nnever-sent\n");

    assert_eq!(result.unwrap().reason, EndReason::Closed);
    assert!(released.get());
    assert_eq!(log.commands(), vec![b"reboot\0".to_vec()]);
    assert!(out.contains("Rebooting device..."));
}

#[test]
fn failed_command_keeps_loop_running() {
    let mut mock = MockTransport::new();
    mock.fail_command = Some(TransportError::Timeout);
    let log = mock.transfer_log();

    let (result, out) = run_script(mock, "bgcolor 0 0 255\ngo\n/exit\n");

    assert_eq!(result.unwrap().reason, EndReason::Closed);
    assert_eq!(log.commands().len(), 2);
    assert_eq!(out.matches("Error: Error sending command").count(), 2);
}

#[test]
fn unknown_directive_is_not_sent() {
    let mock = MockTransport::new();
    let log = mock.transfer_log();
    let (result, out) = run_script(mock, "/help\n/exit\n");
    assert!(result.is_ok());
    assert!(log.is_empty());
    assert!(out.contains("Unknown directive: /help"));
}

#[test]
fn blank_lines_are_sent_verbatim() {
    let mock = MockTransport::new();
    let log = mock.transfer_log();
    let (result, _) = run_script(mock, "  \n\n/exit\n");
    assert!(result.is_ok());
    assert_eq!(log.commands(), vec![b"  \0".to_vec(), b"\0".to_vec()]);
}

#[test]
fn undecodable_line_is_reported_and_loop_continues() {
    let mock = MockTransport::new();
    let log = mock.transfer_log();
    let released = mock.release_flag();

    let mut input = ReaderSource::new(&b"\xff\xfe\ngo\n/exit\n"[..]);
    let mut out = Vec::new();
    let result = run_interactive(session(mock), &mut input, &mut out, "iDevice$ ");

    assert_eq!(result.unwrap().reason, EndReason::Closed);
    assert!(released.get());
    assert_eq!(log.commands(), vec![b"go\0".to_vec()]);
    let out = String::from_utf8(out).unwrap();
    assert!(out.starts_with("Error: "));
    assert!(out.contains("Sent command: go"));
}

#[test]
fn sendfile_uploads_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("iBEC.img3");
    std::fs::write(&path, vec![0xA5u8; 5000]).unwrap();

    let mock = MockTransport::new();
    let log = mock.transfer_log();
    let script = format!("/sendfile {}\ngo\n/exit\n", path.display());
    let (result, out) = run_script(mock, &script);

    assert!(result.is_ok());
    let indices: Vec<u16> = log.data_packets().iter().map(|(i, _)| *i).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert_eq!(log.terminal_packets(), vec![3]);
    assert_eq!(log.commands(), vec![b"go\0".to_vec()]);
    assert!(out.contains(&format!("Sent file {}", path.display())));
}

#[test]
fn sendfile_missing_file_is_reported() {
    let mock = MockTransport::new();
    let log = mock.transfer_log();
    let (result, out) = run_script(mock, "/sendfile /nonexistent/iBSS.img3\n/exit\n");
    assert!(result.is_ok());
    assert!(log.is_empty());
    assert!(out.contains("Error: File doesn't exist: /nonexistent/iBSS.img3"));
}

#[test]
fn sendfile_without_path_prints_usage() {
    let (result, out) = run_script(MockTransport::new(), "/sendfile\n/exit\n");
    assert!(result.is_ok());
    assert!(out.contains("Usage: /sendfile <path>"));
}

#[test]
fn failed_upload_keeps_loop_running() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("iBSS.img3");
    std::fs::write(&path, vec![0u8; 3 * PACKET_SIZE]).unwrap();

    let mut mock = MockTransport::new();
    mock.fail_packet = Some((1, TransportError::Stalled));
    let log = mock.transfer_log();
    let script = format!("/sendfile {}\ngo\n/exit\n", path.display());
    let (result, out) = run_script(mock, &script);

    assert_eq!(result.unwrap().reason, EndReason::Closed);
    assert!(out.contains("Error: couldn't send packet 2"));
    assert_eq!(log.commands(), vec![b"go\0".to_vec()]);
}

// ── Single-shot paths ──

#[test]
fn single_command_then_close() {
    let mock = MockTransport::new();
    let released = mock.release_flag();
    let mut s = session(mock);
    assert_eq!(send_command(&mut s, "go").unwrap(), CommandOutcome::Sent);
    let ended = s.close();
    assert_eq!(ended.reason, EndReason::Closed);
    assert_eq!(ended.identity.product_id, PID_RECOVERY);
    assert!(released.get());
}

#[test]
fn upload_abort_on_packet_two_of_five() {
    let mut mock = MockTransport::new();
    mock.fail_packet = Some((2, TransportError::Timeout));
    let log = mock.transfer_log();
    let released = mock.release_flag();

    let mut s = session(mock);
    let err = send_file(&mut s, &vec![1u8; 5 * PACKET_SIZE]).unwrap_err();
    assert!(matches!(err, UploadError::PacketFailed { index: 2, .. }));
    drop(s);

    assert!(released.get());
    assert!(log.data_packets().iter().all(|(i, _)| *i < 3));
    assert!(log.terminal_packets().is_empty());
}

#[test]
fn empty_upload_then_reset() {
    let mock = MockTransport::new();
    let log = mock.transfer_log();
    let resets = mock.resets.clone();

    let mut s = session(mock);
    send_file(&mut s, &[]).unwrap();
    let ended = s.reset().unwrap();

    assert_eq!(ended.reason, EndReason::Reset);
    assert_eq!(resets.get(), 1);
    assert_eq!(log.terminal_packets(), vec![0]);
    assert_eq!(log.status_polls(), 2);
}
