//! `command` subcommand: send one command and close (or reset).

use ibootlink_lib::command::{CommandOutcome, send_command};

use super::{
    CommandOutput, ControlTransport, DeviceSession, IdentityJson, Options, Result, SessionEnded,
    end_reason_name, finish, print_json,
};

/// Send `text`, then end the session. `reset` is honored whether or not
/// the command went through.
fn send_and_finish<T: ControlTransport>(
    mut session: DeviceSession<T>,
    text: &str,
    reset: bool,
) -> Result<(CommandOutcome, SessionEnded)> {
    match send_command(&mut session, text) {
        // The device is already gone; there is nothing left to reset.
        Ok(outcome @ CommandOutcome::RebootAcknowledgedByDisconnect) => {
            Ok((outcome, session.close()))
        }
        Ok(outcome @ CommandOutcome::Sent) => Ok((outcome, finish(session, reset)?)),
        Err(e) => {
            if let Err(reset_err) = finish(session, reset) {
                log::warn!("{reset_err}");
            }
            Err(e.into())
        }
    }
}

pub(super) fn cmd_command(text: &str, opts: &Options) -> Result<()> {
    let session = DeviceSession::open_first(&opts.config.command_candidates(), &opts.config)?;
    let (outcome, ended) = send_and_finish(session, text, opts.reset)?;

    let rebooted = outcome == CommandOutcome::RebootAcknowledgedByDisconnect;
    if opts.json {
        return print_json(&CommandOutput {
            command: text.to_string(),
            rebooted,
            ended: end_reason_name(ended.reason),
            device: IdentityJson::from(&ended.identity),
        });
    }

    if rebooted {
        println!("Rebooting device...");
    } else {
        println!("Sent command: {text}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{DeviceIdentity, EndReason};
    use ibootlink_lib::IbootError;
    use ibootlink_lib::protocol::PID_RECOVERY;
    use ibootlink_lib::transport::TransportError;
    use ibootlink_lib::transport::mock::MockTransport;

    fn session(mock: MockTransport) -> DeviceSession<MockTransport> {
        DeviceSession::with_transport(mock, DeviceIdentity::new(PID_RECOVERY))
    }

    #[test]
    fn sent_then_closed() {
        let mock = MockTransport::new();
        let resets = mock.resets.clone();
        let (outcome, ended) = send_and_finish(session(mock), "go", false).unwrap();
        assert_eq!(outcome, CommandOutcome::Sent);
        assert_eq!(ended.reason, EndReason::Closed);
        assert_eq!(resets.get(), 0);
    }

    #[test]
    fn sent_then_reset() {
        let mock = MockTransport::new();
        let resets = mock.resets.clone();
        let (_, ended) = send_and_finish(session(mock), "go", true).unwrap();
        assert_eq!(ended.reason, EndReason::Reset);
        assert_eq!(resets.get(), 1);
    }

    #[test]
    fn failed_command_still_resets() {
        let mut mock = MockTransport::new();
        mock.fail_command = Some(TransportError::Timeout);
        let resets = mock.resets.clone();
        let released = mock.release_flag();

        let err = send_and_finish(session(mock), "go", true).unwrap_err();

        assert!(matches!(err, IbootError::Command(_)));
        assert_eq!(resets.get(), 1);
        assert!(released.get());
    }

    #[test]
    fn failed_command_and_reset_reports_command_error() {
        let mut mock = MockTransport::new();
        mock.fail_command = Some(TransportError::Stalled);
        mock.fail_reset = Some(TransportError::Disconnected);
        let released = mock.release_flag();

        let err = send_and_finish(session(mock), "go", true).unwrap_err();

        assert!(matches!(err, IbootError::Command(_)));
        assert!(released.get());
    }

    #[test]
    fn reboot_skips_reset() {
        let mut mock = MockTransport::new();
        mock.fail_command = Some(TransportError::Disconnected);
        let resets = mock.resets.clone();
        let (outcome, ended) = send_and_finish(session(mock), "reboot", true).unwrap();
        assert_eq!(outcome, CommandOutcome::RebootAcknowledgedByDisconnect);
        assert_eq!(ended.reason, EndReason::Closed);
        assert_eq!(resets.get(), 0);
    }
}
