//! ibootlink: talk to iBoot over USB control transfers.
//!
//! Open a [`device::DeviceSession`], then send commands
//! ([`command::send_command`]), upload files ([`upload::send_file`]) or run
//! the interactive loop ([`shell::run_interactive`]).

pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod protocol;
pub mod shell;
pub mod status;
pub mod transport;
pub mod upload;

pub use error::IbootError;
