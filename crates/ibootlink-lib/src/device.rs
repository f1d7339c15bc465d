//! Device session: discovery and lifecycle.
//!
//! A [`DeviceSession`] exclusively owns its transport. `close` and `reset`
//! consume the session, so a closed session cannot be used again; dropping
//! the session on any other path releases the transport as well.

use std::fmt;

use serde::Serialize;

use crate::config::SessionConfig;
use crate::protocol::*;
use crate::transport::{ControlTransport, TransportError, UsbTransport};

// ── Error type ──

/// Session lifecycle errors.
///
/// String payloads follow the convention **"context: details"**.
#[derive(Debug)]
pub enum SessionError {
    /// No attached device matches the vendor ID and this product ID.
    NotFound { product_id: u16 },
    /// A matching device exists but could not be opened or claimed.
    OpenFailed(String),
    /// The port reset request failed. The session was still released.
    ResetFailed(TransportError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NotFound { product_id } => write!(
                f,
                "no device found @ 0x{APPLE_VID:04x}:0x{product_id:04x} ({})",
                mode_name(*product_id)
            ),
            SessionError::OpenFailed(e) => write!(f, "Failed to open device: {e}"),
            SessionError::ResetFailed(e) => write!(f, "Device reset failed: {e}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::ResetFailed(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

// ── Identity ──

/// Who we are talking to. Name and serial come from the device's string
/// descriptors and are absent when the device does not report them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    pub name: Option<String>,
    pub serial: Option<String>,
}

impl DeviceIdentity {
    pub fn new(product_id: u16) -> Self {
        DeviceIdentity {
            vendor_id: APPLE_VID,
            product_id,
            name: None,
            serial: None,
        }
    }

    /// `"recovery"`, `"dfu"` or `"custom"`.
    pub fn mode(&self) -> &'static str {
        mode_name(self.product_id)
    }
}

// ── Session end ──

/// Why a session ended. Only the top-level driver decides what to do
/// with it (typically exit the process).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Closed by request, at end of input, or after the device dropped
    /// off the bus following `reboot`.
    Closed,
    /// Port reset issued, then closed.
    Reset,
}

/// Termination signal returned by `close`, `reset` and the interactive loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEnded {
    pub reason: EndReason,
    pub identity: DeviceIdentity,
}

// ── Session ──

/// An open device. Generic over the transport so protocols can be driven
/// against [`crate::transport::mock::MockTransport`] in tests.
pub struct DeviceSession<T: ControlTransport = UsbTransport> {
    transport: T,
    identity: DeviceIdentity,
}

impl<T: ControlTransport> DeviceSession<T> {
    /// Wrap an already-open transport.
    pub fn with_transport(transport: T, identity: DeviceIdentity) -> Self {
        DeviceSession {
            transport,
            identity,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    #[doc(hidden)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Release the transport and end the session.
    pub fn close(self) -> SessionEnded {
        self.end(EndReason::Closed)
    }

    /// Issue a port reset, then release the transport.
    ///
    /// The transport is released even when the reset fails.
    pub fn reset(mut self) -> Result<SessionEnded> {
        let reset = self.transport.reset();
        let ended = self.end(EndReason::Reset);
        reset.map_err(SessionError::ResetFailed)?;
        Ok(ended)
    }

    fn end(self, reason: EndReason) -> SessionEnded {
        let DeviceSession {
            transport,
            identity,
        } = self;
        drop(transport);
        log::info!(
            "session with 0x{:04x} ended ({reason:?})",
            identity.product_id
        );
        SessionEnded { reason, identity }
    }
}

impl DeviceSession<UsbTransport> {
    /// Open the first attached device matching the vendor ID and `product_id`.
    pub fn open(product_id: u16, config: &SessionConfig) -> Result<Self> {
        let device_info = nusb::list_devices()
            .map_err(|e| SessionError::OpenFailed(format!("USB enumeration: {e}")))?
            .find(|dev| dev.vendor_id() == APPLE_VID && dev.product_id() == product_id)
            .ok_or(SessionError::NotFound { product_id })?;

        let identity = DeviceIdentity {
            vendor_id: APPLE_VID,
            product_id,
            name: device_info.product_string().map(|s| s.to_string()),
            serial: device_info.serial_number().map(|s| s.to_string()),
        };
        if identity.name.is_none() {
            log::warn!("device 0x{product_id:04x} reports no product string");
        }

        let usb_device = device_info
            .open()
            .map_err(|e| SessionError::OpenFailed(format!("USB open: {e}")))?;

        // Claiming interface 0 gives us exclusive access; nusb releases it on drop.
        let interface = usb_device
            .claim_interface(0)
            .map_err(|e| SessionError::OpenFailed(format!("claim interface 0: {e}")))?;

        log::info!(
            "opened {} device 0x{product_id:04x} at usb:{:03}/{:03}",
            identity.mode(),
            device_info.bus_number(),
            device_info.device_address()
        );

        Ok(DeviceSession {
            transport: UsbTransport::new(usb_device, interface, config.timeout),
            identity,
        })
    }

    /// Try each product ID in order and return the first session opened.
    pub fn open_first(candidates: &[u16], config: &SessionConfig) -> Result<Self> {
        open_first_with(candidates, |pid| Self::open(pid, config))
    }
}

/// Walk `candidates`, skipping absent devices. A device that exists but
/// cannot be opened ends the search with its error.
pub(crate) fn open_first_with<S>(
    candidates: &[u16],
    mut open: impl FnMut(u16) -> Result<S>,
) -> Result<S> {
    let mut first_missing = None;
    for &pid in candidates {
        match open(pid) {
            Ok(session) => return Ok(session),
            Err(SessionError::NotFound { product_id }) => {
                log::debug!("no device @ 0x{product_id:04x}, trying next candidate");
                first_missing.get_or_insert(product_id);
            }
            Err(e) => return Err(e),
        }
    }
    Err(SessionError::NotFound {
        product_id: first_missing.unwrap_or(PID_RECOVERY),
    })
}

// ── Device enumeration ──

/// An attached device in recovery or DFU mode (not opened).
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredDevice {
    /// Bus location, e.g. `usb:001/004`.
    pub path: String,
    pub product_id: u16,
    pub mode: &'static str,
    pub name: Option<String>,
    pub serial: Option<String>,
}

/// List attached devices in either well-known mode.
///
/// Returns an empty list if the USB stack cannot be enumerated.
pub fn enumerate_devices() -> Vec<DiscoveredDevice> {
    let Ok(devices) = nusb::list_devices() else {
        return Vec::new();
    };

    devices
        .filter(|dev| dev.vendor_id() == APPLE_VID)
        .filter(|dev| matches!(dev.product_id(), PID_RECOVERY | PID_DFU))
        .map(|dev| DiscoveredDevice {
            path: format!("usb:{:03}/{:03}", dev.bus_number(), dev.device_address()),
            product_id: dev.product_id(),
            mode: mode_name(dev.product_id()),
            name: dev.product_string().map(|s| s.to_string()),
            serial: dev.serial_number().map(|s| s.to_string()),
        })
        .collect()
}
