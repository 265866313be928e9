//! Keep-alive background task.
//!
//! Ticks the session controller on a fixed interval until cancelled. The
//! tick body runs inline in the loop, so a slow tick (including a reconnect)
//! delays the next one instead of overlapping it; missed ticks are skipped.
//!
//! # Cancellation
//!
//! Cancelling the token stops the loop at the next select point. A tick that
//! is already running is allowed to finish; [`KeepAliveHandle::stop`] waits
//! for that.

use crate::observability::metrics::record_keepalive_tick;
use crate::services::session_controller::{SessionController, TickOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Handle to a running keep-alive task.
pub struct KeepAliveHandle {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl KeepAliveHandle {
    /// Spawn the keep-alive loop.
    ///
    /// The first tick fires one `interval` after spawning; the join that
    /// precedes spawning already counts as the first contact.
    pub fn spawn(
        controller: Arc<SessionController>,
        interval: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        let token = cancel_token.clone();
        let handle = tokio::spawn(async move {
            run_keep_alive(controller, interval, token).await;
        });

        Self {
            cancel_token,
            handle,
        }
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn stop(self) {
        self.cancel_token.cancel();
        if let Err(e) = self.handle.await {
            warn!(target: "pk.task.keep_alive", error = %e, "Keep-alive task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Run the keep-alive loop until `cancel_token` is cancelled.
#[instrument(skip_all, name = "pk.task.keep_alive")]
pub async fn run_keep_alive(
    controller: Arc<SessionController>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "pk.task.keep_alive",
        interval_seconds = interval.as_secs(),
        "Starting keep-alive task"
    );

    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!(
                    target: "pk.task.keep_alive",
                    "Keep-alive task received shutdown signal, exiting"
                );
                break;
            }
            _ = ticker.tick() => {
                let outcome = controller.tick().await;
                record_keepalive_tick(outcome.label());

                match outcome {
                    TickOutcome::Healthy => {
                        debug!(target: "pk.task.keep_alive", "Keep-alive tick healthy");
                    }
                    TickOutcome::Degraded { retry_count } => {
                        warn!(target: "pk.task.keep_alive", retry_count, "Keep-alive tick failed");
                    }
                    TickOutcome::Reconnected => {
                        info!(target: "pk.task.keep_alive", "Session re-joined");
                    }
                    TickOutcome::ReconnectFailed => {
                        warn!(target: "pk.task.keep_alive", "Re-join failed, will retry on next tick");
                    }
                    TickOutcome::Skipped(reason) => {
                        debug!(target: "pk.task.keep_alive", reason = ?reason, "Keep-alive tick skipped");
                    }
                }
            }
        }
    }

    info!(target: "pk.task.keep_alive", "Keep-alive task stopped");
}
