//! Interactive session loop.
//!
//! Lines starting with `/` are directives (`/exit`, `/reset`,
//! `/sendfile <path>`); everything else is sent to iBoot as a command.

use std::io::{self, BufRead, Write};

use crate::command::{CommandOutcome, send_command};
use crate::device::{DeviceSession, SessionEnded};
use crate::transport::ControlTransport;
use crate::upload::{read_payload, send_file};

/// Marks a line as a directive rather than a device command.
pub const ESCAPE_PREFIX: char = '/';

const DIRECTIVE_EXIT: &str = "exit";
const DIRECTIVE_RESET: &str = "reset";
const DIRECTIVE_SENDFILE: &str = "sendfile";

/// One parsed line of operator input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellInput<'a> {
    Exit,
    Reset,
    SendFile(&'a str),
    /// `/sendfile` with no path.
    SendFileMissingPath,
    /// Escape-prefixed input matching no directive.
    UnknownDirective(&'a str),
    /// Anything else, sent verbatim (including empty and whitespace-only lines).
    Command(&'a str),
}

pub fn parse_line(line: &str) -> ShellInput<'_> {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(directive) = line.strip_prefix(ESCAPE_PREFIX) else {
        return ShellInput::Command(line);
    };

    let (name, arg) = match directive.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (directive, ""),
    };
    match name {
        DIRECTIVE_EXIT if arg.is_empty() => ShellInput::Exit,
        DIRECTIVE_RESET if arg.is_empty() => ShellInput::Reset,
        DIRECTIVE_SENDFILE if arg.is_empty() => ShellInput::SendFileMissingPath,
        DIRECTIVE_SENDFILE => ShellInput::SendFile(arg),
        _ => ShellInput::UnknownDirective(line),
    }
}

/// Source of operator input, one line at a time.
pub trait LineSource {
    /// Show `prompt` and return the next line, or `None` at end of input.
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;
}

/// [`LineSource`] over any buffered reader. The prompt is not echoed.
pub struct ReaderSource<R> {
    reader: R,
}

impl<R: BufRead> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        ReaderSource { reader }
    }
}

impl<R: BufRead> LineSource for ReaderSource<R> {
    fn read_line(&mut self, _prompt: &str) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }
}

/// Run the loop until the operator exits or resets, the device reboots,
/// or input ends. The session is released before this returns, on every
/// path including errors.
///
/// Operator messages go to `out`.
pub fn run_interactive<T, L, W>(
    mut session: DeviceSession<T>,
    input: &mut L,
    out: &mut W,
    prompt: &str,
) -> crate::error::Result<SessionEnded>
where
    T: ControlTransport,
    L: LineSource,
    W: Write,
{
    loop {
        let line = match input.read_line(prompt) {
            Ok(Some(line)) => line,
            Ok(None) => {
                log::debug!("end of input");
                return Ok(session.close());
            }
            // One undecodable line; the next one may be fine.
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                writeln!(out, "Error: {e}")?;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        match parse_line(&line) {
            ShellInput::Exit => return Ok(session.close()),
            ShellInput::Reset => return Ok(session.reset()?),
            ShellInput::SendFileMissingPath => {
                writeln!(out, "Usage: /sendfile <path>")?;
            }
            ShellInput::UnknownDirective(text) => {
                writeln!(out, "Unknown directive: {text}")?;
            }
            ShellInput::SendFile(path) => match upload_from_path(&mut session, path) {
                Ok(()) => writeln!(out, "Sent file {path}")?,
                Err(e) => writeln!(out, "Error: {e}")?,
            },
            ShellInput::Command(cmd) => match send_command(&mut session, cmd) {
                Ok(CommandOutcome::Sent) => writeln!(out, "Sent command: {cmd}")?,
                Ok(CommandOutcome::RebootAcknowledgedByDisconnect) => {
                    writeln!(out, "Rebooting device...")?;
                    return Ok(session.close());
                }
                Err(e) => writeln!(out, "Error: {e}")?,
            },
        }
    }
}

fn upload_from_path<T: ControlTransport>(
    session: &mut DeviceSession<T>,
    path: &str,
) -> crate::error::Result<()> {
    let payload = read_payload(path)?;
    send_file(session, &payload)?;
    Ok(())
}
