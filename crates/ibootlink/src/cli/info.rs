//! `info` subcommand: open the device and show its identity.

use super::{
    DeviceIdentity, DeviceSession, IdentityJson, Options, Result, finish, hex_id, kv, kv_width,
    print_json,
};

fn print_identity(id: &DeviceIdentity) {
    let w = kv_width(&["Vendor ID:", "Product ID:", "Mode:", "Name:", "Serial:"]);
    kv("Vendor ID:", hex_id(id.vendor_id), w);
    kv("Product ID:", hex_id(id.product_id), w);
    kv("Mode:", id.mode(), w);
    kv("Name:", id.name.as_deref().unwrap_or("(unknown)"), w);
    kv("Serial:", id.serial.as_deref().unwrap_or("(unknown)"), w);
}

pub(super) fn cmd_info(opts: &Options) -> Result<()> {
    let session = DeviceSession::open_first(&opts.config.upload_candidates(), &opts.config)?;
    let ended = finish(session, opts.reset)?;

    if opts.json {
        return print_json(&IdentityJson::from(&ended.identity));
    }
    print_identity(&ended.identity);
    Ok(())
}
