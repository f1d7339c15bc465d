//! CLI subcommands: one per operating mode.

mod command;
mod devices;
mod info;
mod send_file;
mod shell;

use clap::Subcommand;
use serde::Serialize;

pub(super) use ibootlink_lib::config::SessionConfig;
pub(super) use ibootlink_lib::device::{
    self, DeviceIdentity, DeviceSession, DiscoveredDevice, EndReason, SessionEnded,
};
pub(super) use ibootlink_lib::error::Result;
pub(super) use ibootlink_lib::transport::ControlTransport;

/// Options shared by every subcommand.
pub struct Options {
    pub config: SessionConfig,
    /// Reset instead of close when a single-shot operation finishes.
    pub reset: bool,
    pub json: bool,
}

const PADDING: usize = 2;

/// Alignment width for a block of key-value lines.
pub(super) fn kv_width(keys: &[&str]) -> usize {
    keys.iter().map(|k| k.len()).max().map_or(0, |m| m + PADDING)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

/// `0x1281`
pub(super) fn hex_id(id: u16) -> String {
    format!("0x{id:04x}")
}

pub(super) fn end_reason_name(reason: EndReason) -> &'static str {
    match reason {
        EndReason::Closed => "closed",
        EndReason::Reset => "reset",
    }
}

/// Finish a single-shot session: reset if asked to, otherwise close.
pub(super) fn finish<T: ControlTransport>(
    session: DeviceSession<T>,
    reset: bool,
) -> Result<SessionEnded> {
    if reset {
        Ok(session.reset()?)
    } else {
        Ok(session.close())
    }
}

pub(super) fn print_json(value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    println!("{text}");
    Ok(())
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct IdentityJson {
    pub vendor_id: String,
    pub product_id: String,
    pub mode: &'static str,
    pub name: Option<String>,
    pub serial: Option<String>,
}

impl From<&DeviceIdentity> for IdentityJson {
    fn from(id: &DeviceIdentity) -> Self {
        IdentityJson {
            vendor_id: hex_id(id.vendor_id),
            product_id: hex_id(id.product_id),
            mode: id.mode(),
            name: id.name.clone(),
            serial: id.serial.clone(),
        }
    }
}

#[derive(Serialize)]
pub(super) struct DevicesOutput {
    pub count: usize,
    pub devices: Vec<DiscoveredDevice>,
}

#[derive(Serialize)]
pub(super) struct CommandOutput {
    pub command: String,
    pub rebooted: bool,
    pub ended: &'static str,
    pub device: IdentityJson,
}

#[derive(Serialize)]
pub(super) struct SendFileOutput {
    pub path: String,
    pub bytes: usize,
    pub packets: u16,
    pub ended: &'static str,
    pub device: IdentityJson,
}

#[derive(Subcommand)]
pub enum Command {
    /// Send a single command to iBoot
    Command {
        /// Command text, e.g. "setenv auto-boot true"
        text: String,
    },

    /// Upload a file (tries recovery mode, then DFU mode)
    SendFile {
        /// Path to the file to upload
        path: String,
    },

    /// Open an interactive shell (/exit, /reset, /sendfile <path>)
    Shell,

    /// List attached devices in recovery or DFU mode
    Devices,

    /// Open the device and show its identity
    Info,
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, opts: &Options) -> Result<()> {
    opts.config.validate()?;
    match cmd {
        Command::Command { text } => command::cmd_command(&text, opts),
        Command::SendFile { path } => send_file::cmd_send_file(&path, opts),
        Command::Shell => {
            if opts.json {
                warn_json_unsupported("shell");
            }
            shell::cmd_shell(opts)
        }
        Command::Devices => devices::cmd_devices(opts.json),
        Command::Info => info::cmd_info(opts),
    }
}

#[cfg(test)]
mod format_tests {
    use super::*;
    use ibootlink_lib::protocol;

    #[test]
    fn kv_width_uses_longest_key() {
        let w = kv_width(&["Mode:", "Product ID:"]);
        // "Product ID:" = 11 + PADDING
        assert_eq!(w, 13);
    }

    #[test]
    fn kv_width_empty() {
        assert_eq!(kv_width(&[]), 0);
    }

    #[test]
    fn format_kv_pads_key() {
        assert_eq!(format_kv("Mode:", "recovery", 8), "Mode:   recovery");
    }

    #[test]
    fn format_kv_long_key_not_truncated() {
        assert_eq!(format_kv("Product ID:", "0x1281", 4), "Product ID:0x1281");
    }

    #[test]
    fn hex_id_is_zero_padded() {
        assert_eq!(hex_id(0x5ac), "0x05ac");
        assert_eq!(hex_id(protocol::PID_DFU), "0x1227");
    }

    #[test]
    fn end_reason_names() {
        assert_eq!(end_reason_name(EndReason::Closed), "closed");
        assert_eq!(end_reason_name(EndReason::Reset), "reset");
    }
}
