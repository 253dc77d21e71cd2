// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process shutdown: signal capture and bounded worker drain.

use std::time::Duration;

use parla_core::ParlaError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Resolves when the process is asked to stop, naming the signal.
pub async fn wait_for_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                return tokio::select! {
                    _ = tokio::signal::ctrl_c() => "SIGINT",
                    _ = sigterm.recv() => "SIGTERM",
                };
            }
            Err(e) => warn!(error = %e, "SIGTERM handler unavailable, listening for Ctrl+C only"),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without any signal source the process can only be stopped by its workers.
        error!(error = %e, "Ctrl+C handler unavailable");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}

/// Returns a token cancelled on the first shutdown signal.
///
/// Cancelling the token from elsewhere also stops the listener task.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let listener = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            signal = wait_for_signal() => {
                info!(signal, "shutdown requested");
                listener.cancel();
            }
            _ = listener.cancelled() => debug!("signal listener released"),
        }
    });
    token
}

/// Waits for named worker tasks to finish.
///
/// The first task to exit cancels `cancel` so the rest wind down too. Once
/// cancelled, tasks still running after `grace` are aborted. Returns how many
/// tasks exited with an error, a panic or by abort.
pub async fn drain_workers(
    tasks: Vec<(&'static str, JoinHandle<Result<(), ParlaError>>)>,
    cancel: &CancellationToken,
    grace: Duration,
) -> usize {
    let mut failures = 0;
    for (name, mut task) in tasks {
        let joined = tokio::select! {
            joined = &mut task => Some(joined),
            _ = async {
                cancel.cancelled().await;
                tokio::time::sleep(grace).await;
            } => None,
        };
        let Some(joined) = joined else {
            warn!(
                worker = name,
                grace_ms = grace.as_millis() as u64,
                "worker did not stop in time, aborting"
            );
            task.abort();
            failures += 1;
            cancel.cancel();
            continue;
        };
        match joined {
            Ok(Ok(())) => debug!(worker = name, "worker exited"),
            Ok(Err(e)) => {
                error!(worker = name, error = %e, "worker exited with error");
                failures += 1;
            }
            Err(e) => {
                error!(worker = name, error = %e, "worker task panicked");
                failures += 1;
            }
        }
        cancel.cancel();
    }
    failures
}
