//! Signal handling for the record command

use tokio::sync::mpsc;
use tracing::debug;

use super::control::ControlCommand;

/// Turn Ctrl+C (and SIGTERM on Unix) into a `Stop` command.
///
/// Handlers are installed before this returns, so a signal arriving right
/// after is not lost.
pub fn forward_shutdown_signals(tx: mpsc::Sender<ControlCommand>) -> Result<(), std::io::Error> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => debug!("received SIGINT"),
                _ = sigterm.recv() => debug!("received SIGTERM"),
            }
            let _ = tx.send(ControlCommand::Stop).await;
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("received Ctrl+C");
                let _ = tx.send(ControlCommand::Stop).await;
            }
        });
    }

    Ok(())
}
