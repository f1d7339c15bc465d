//! `shell` subcommand: interactive loop with line editing.

use std::io;

use ibootlink_lib::shell::{LineSource, run_interactive};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use super::{DeviceSession, EndReason, Options, Result, hex_id};

/// Terminal input via rustyline. History is kept in memory only.
struct EditorSource {
    editor: DefaultEditor,
}

impl LineSource for EditorSource {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        loop {
            match self.editor.readline(prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        self.editor.add_history_entry(line.as_str()).ok();
                    }
                    return Ok(Some(line));
                }
                // Ctrl-C abandons the current line and prompts again.
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => return Ok(None),
                Err(ReadlineError::Io(e)) => return Err(e),
                Err(e) => return Err(io::Error::other(e)),
            }
        }
    }
}

pub(super) fn cmd_shell(opts: &Options) -> Result<()> {
    let session = DeviceSession::open_first(&opts.config.command_candidates(), &opts.config)?;
    let editor = DefaultEditor::new().map_err(io::Error::other)?;
    let mut input = EditorSource { editor };

    let identity = session.identity();
    println!(
        "Connected to {} device {}. Type /exit to quit.",
        identity.mode(),
        hex_id(identity.product_id)
    );

    let ended = run_interactive(session, &mut input, &mut io::stdout(), &opts.config.prompt)?;
    if ended.reason == EndReason::Reset {
        println!("Device reset.");
    }
    Ok(())
}
