//! `send-file` subcommand: upload a file with a progress bar.

use indicatif::{ProgressBar, ProgressStyle};
use ibootlink_lib::upload::{FileTransferPlan, read_payload, send_file_with_progress};

use super::{
    DeviceSession, IdentityJson, Options, Result, SendFileOutput, end_reason_name, finish,
    print_json,
};

fn progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    // Keep the default style if the template is rejected.
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

pub(super) fn cmd_send_file(path: &str, opts: &Options) -> Result<()> {
    // Read first so a bad path fails before the device is claimed.
    let payload = read_payload(path)?;
    let plan = FileTransferPlan::new(payload.len())?;

    let mut session = DeviceSession::open_first(&opts.config.upload_candidates(), &opts.config)?;
    log::info!(
        "sending {} to {} device 0x{:04x}",
        path,
        session.identity().mode(),
        session.identity().product_id
    );

    let pb = progress_bar(payload.len());
    let sent = send_file_with_progress(&mut session, &payload, |sent, _| {
        pb.set_position(sent as u64)
    });
    match sent {
        Ok(()) => pb.finish_and_clear(),
        Err(e) => {
            pb.abandon();
            return Err(e.into());
        }
    }

    let ended = finish(session, opts.reset)?;

    if opts.json {
        return print_json(&SendFileOutput {
            path: path.to_string(),
            bytes: plan.total_len,
            packets: plan.packet_count,
            ended: end_reason_name(ended.reason),
            device: IdentityJson::from(&ended.identity),
        });
    }

    println!("Sent file {path}");
    Ok(())
}
