//! `devices` subcommand: list attached devices in recovery or DFU mode.

use super::{DevicesOutput, Result, device, hex_id, print_json};

pub(super) fn cmd_devices(json: bool) -> Result<()> {
    let devices = device::enumerate_devices();

    if json {
        return print_json(&DevicesOutput {
            count: devices.len(),
            devices,
        });
    }

    if devices.is_empty() {
        println!("No devices in recovery or DFU mode found.");
        return Ok(());
    }

    println!(
        "Found {} device{}:",
        devices.len(),
        if devices.len() == 1 { "" } else { "s" }
    );
    println!();

    for (i, dev) in devices.iter().enumerate() {
        println!(
            "  [{}] {}  {} ({})",
            i + 1,
            dev.path,
            hex_id(dev.product_id),
            dev.mode
        );
        if let Some(ref name) = dev.name {
            println!("      Name:   {name}");
        }
        if let Some(ref serial) = dev.serial {
            println!("      Serial: {serial}");
        }
    }

    Ok(())
}
