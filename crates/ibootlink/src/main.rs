//! ibootlink: send commands and files to iBoot over USB, or open a shell.

use std::time::Duration;

use clap::Parser;
use ibootlink_lib::config::{SessionConfig, parse_product_id};

mod cli;

#[derive(Parser)]
#[command(
    name = "ibootlink",
    version,
    about = "Talk to iBoot over USB: send commands, upload files, open a shell"
)]
struct Args {
    /// Product ID to open, in hex (default: recovery mode 0x1281)
    #[arg(short = 'a', long, global = true, env = "IBOOTLINK_PRODUCT_ID", value_parser = parse_product_id)]
    product_id: Option<u16>,

    /// Reset the USB connection instead of closing it when done
    #[arg(short, long, global = true)]
    reset: bool,

    /// Timeout for each control transfer, in milliseconds
    #[arg(long, global = true, env = "IBOOTLINK_TIMEOUT_MS", default_value_t = 5000)]
    timeout_ms: u64,

    /// Output as JSON (for devices, info, command, send-file)
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: cli::Command,
}

impl Args {
    fn options(&self) -> cli::Options {
        cli::Options {
            config: SessionConfig {
                product_id: self.product_id,
                timeout: Duration::from_millis(self.timeout_ms),
                ..SessionConfig::default()
            },
            reset: self.reset,
            json: self.json,
        }
    }
}

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let opts = args.options();
    if let Err(e) = cli::run(args.command, &opts) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
