//! Interactive session control over stdin

use std::io::{self, BufRead};
use std::str::FromStr;
use std::thread;

use tokio::sync::mpsc;
use tracing::debug;

/// A request to change the recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Pause,
    Resume,
    Stop,
}

impl FromStr for ControlCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "p" | "pause" => Ok(Self::Pause),
            "r" | "resume" => Ok(Self::Resume),
            "s" | "q" | "stop" | "quit" => Ok(Self::Stop),
            other => Err(format!(
                "Unknown command '{}'. Type pause, resume or stop",
                other
            )),
        }
    }
}

/// Forward commands typed on stdin until it closes.
///
/// The reader runs on its own thread so a pending read never holds up
/// runtime shutdown. Unknown lines are reported through `on_invalid` and
/// skipped; blank lines are ignored.
pub fn spawn_stdin_reader<F>(tx: mpsc::Sender<ControlCommand>, on_invalid: F) -> io::Result<()>
where
    F: Fn(String) + Send + 'static,
{
    thread::Builder::new()
        .name("stdin-control".into())
        .spawn(move || {
            forward_lines(io::stdin().lock(), &tx, on_invalid);
            debug!("stdin closed");
        })?;
    Ok(())
}

/// Parse `reader` line by line into `tx`; stops at EOF or when the
/// receiver is gone
fn forward_lines<R, F>(reader: R, tx: &mpsc::Sender<ControlCommand>, on_invalid: F)
where
    R: BufRead,
    F: Fn(String),
{
    for line in reader.lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<ControlCommand>() {
            Ok(command) => {
                if tx.blocking_send(command).is_err() {
                    break;
                }
            }
            Err(message) => on_invalid(message),
        }
    }
}
