//! Asynchronous operator inputs.
//!
//! Signals and stdin lines are turned into [`Command`]s and queued on an
//! unbounded channel. The frame loop drains the queue once per frame, so
//! nothing here ever touches guard state directly.

use pool_guard::Command;
use std::io::BufRead;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Converts Ctrl-C (and SIGTERM on unix) into a single `Quit`.
pub fn spawn_signal_listener(tx: UnboundedSender<Command>) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        let _ = tx.send(Command::Quit);
    });
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM, Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Reads one command per stdin line on a plain thread. Blocking reads would
/// otherwise hold the runtime open at exit.
pub fn spawn_stdin_reader(tx: UnboundedSender<Command>) {
    let spawned = std::thread::Builder::new()
        .name("stdin-commands".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(command) => {
                        debug!(?command, "operator command");
                        if tx.send(command).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("{e} (expected a/c/q, arm, disarm, toggle, clear or quit)"),
                }
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "failed to start stdin command reader");
    }
}
