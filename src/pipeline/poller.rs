//! Background polling: run the auto-responder on a fixed interval.
//!
//! Each tick is one `run_once` over a fresh unread snapshot. A failed run
//! (e.g. the listing call failed) is logged and retried on the next tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::pipeline::processor::AutoResponder;

/// Spawn the polling loop. The first run starts immediately.
///
/// Returns a `JoinHandle` and shutdown flag; the loop exits on the tick
/// after the flag is set.
pub fn spawn_autoresponder(
    responder: Arc<AutoResponder>,
    interval: Duration,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs(),
            "Auto-responder started"
        );

        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Auto-responder shutting down");
                return;
            }

            if let Err(e) = responder.run_once().await {
                error!(error = %e, "Run failed; retrying next tick");
            }
        }
    });

    (handle, shutdown_flag)
}
