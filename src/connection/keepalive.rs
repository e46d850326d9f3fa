//! Background Keepalive
//!
//! Idle administration connections may be torn down by the server or by
//! something in between. The keepalive task sends `ping` on a fixed interval
//! to keep the session alive.
//!
//! ## Design
//!
//! The task runs on Tokio and:
//! 1. Waits for the next tick of the interval (the first ping is one full interval after start)
//! 2. Issues `ping` through the same command lock as every other caller
//! 3. Discards the response and any error, only counting failures
//!
//! A failed ping never stops the timer. Only a shutdown signal does, and a
//! ping that is already in flight is allowed to finish first.

use crate::connection::client::Channel;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

/// Command sent on every tick.
pub const PING_COMMAND: &str = "ping";

/// A handle to the running keepalive task.
///
/// When this handle is dropped, the task is signalled to stop.
#[derive(Debug)]
pub(crate) struct Keepalive {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    interval: Duration,
}

impl Keepalive {
    /// Spawns the keepalive task. `interval` must be non-zero.
    pub(crate) fn start(channel: Arc<Channel>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(keepalive_loop(channel, interval, shutdown_rx));

        info!(interval_ms = interval.as_millis(), "Keepalive started");

        Self {
            shutdown_tx,
            task: Some(task),
            interval,
        }
    }

    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }

    /// Signals the task and waits for it to exit.
    pub(crate) async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!("Keepalive stopped");
    }
}

impl Drop for Keepalive {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// The main keepalive loop.
async fn keepalive_loop(
    channel: Arc<Channel>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    trace!("Keepalive received shutdown signal");
                    return;
                }
            }
            _ = ticker.tick() => {
                channel.stats.ping_sent();
                match channel.round_trip(PING_COMMAND, &[]).await {
                    Ok(response) if response.is_success() => {
                        trace!(body = %response.body, "Keepalive ping answered");
                    }
                    Ok(response) => {
                        channel.stats.ping_failed();
                        debug!(status = %response.status, "Keepalive ping rejected");
                    }
                    Err(e) => {
                        channel.stats.ping_failed();
                        debug!(error = %e, "Keepalive ping failed");
                    }
                }
            }
        }
    }
}
