//! Protocol constants for the iBoot USB control-transfer interface.
//!
//! iBoot exposes no bulk endpoints in recovery or DFU mode; everything
//! travels as control transfers on endpoint 0.
//!
//! | Operation      | bmRequestType | bRequest | wValue       | wLength     |
//! |----------------|---------------|----------|--------------|-------------|
//! | Send command   | `0x40`        | `0x00`   | 0            | strlen + 1  |
//! | File packet    | `0x21`        | `0x01`   | packet index | <= 2048     |
//! | Terminal packet| `0x21`        | `0x01`   | packet count | 0           |
//! | Poll status    | `0xA1`        | `0x03`   | 0            | 6           |
//!
//! `wIndex` is always 0.

// ── Device identification ──

/// Apple's USB vendor ID.
pub const APPLE_VID: u16 = 0x05AC;

/// Product ID iBoot enumerates under in recovery mode.
pub const PID_RECOVERY: u16 = 0x1281;

/// Product ID the boot ROM / iBSS enumerates under in firmware-download (DFU) mode.
pub const PID_DFU: u16 = 0x1227;

/// Human-readable mode name for a product ID.
pub fn mode_name(product_id: u16) -> &'static str {
    match product_id {
        PID_RECOVERY => "recovery",
        PID_DFU => "dfu",
        _ => "custom",
    }
}

// ── bmRequestType values ──

/// Vendor request, host to device, recipient device.
pub const REQUEST_TYPE_COMMAND: u8 = 0x40;

/// Class request, host to device, recipient interface.
pub const REQUEST_TYPE_FILE: u8 = 0x21;

/// Class request, device to host, recipient interface.
pub const REQUEST_TYPE_STATUS: u8 = 0xA1;

// ── bRequest values ──

pub const BREQUEST_COMMAND: u8 = 0x00;
pub const BREQUEST_FILE: u8 = 0x01;
pub const BREQUEST_STATUS: u8 = 0x03;

// ── Upload parameters ──

/// Bytes per file packet.
pub const PACKET_SIZE: usize = 0x800;

/// Size of the status response.
pub const STATUS_LEN: usize = 6;

/// Offset of the flag byte within the status response.
pub const STATUS_FLAG_OFFSET: usize = 4;

/// Flag reported after each data packet has been accepted.
pub const FLAG_PACKET_ACCEPTED: u8 = 5;

/// First finalization flag, reported once the terminal packet is seen.
pub const FLAG_TRANSFER_COMPLETE: u8 = 6;

/// Second finalization flag, reported once the image has been validated.
pub const FLAG_IMAGE_READY: u8 = 7;

/// Largest payload a single control transfer can declare (`wLength`).
pub const MAX_TRANSFER_LEN: usize = u16::MAX as usize;

/// Default timeout for each control transfer.
pub const USB_TIMEOUT_MS: u64 = 5000;

/// The command whose transfer failure means the device went away on purpose.
pub const REBOOT_COMMAND: &str = "reboot";
