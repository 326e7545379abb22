//! Timer-driven batch rescoring, decoupled from vote handling.

use std::sync::Arc;
use std::time::Duration;

use domains::CollectionKind;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::rescore::RescoreService;

/// Runs a rescore pass for every collection on each tick until `shutdown`
/// turns `true` or its sender is dropped. Returns the number of completed ticks.
///
/// The first tick fires immediately. A failed pass is logged and the loop
/// carries on; a tick that overruns the interval causes the missed ticks to
/// be skipped rather than replayed.
pub async fn run_rescore_loop(
    rescorer: Arc<RescoreService>,
    collections: Vec<CollectionKind>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> u64 {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks = 0;

    info!(
        interval_secs = interval.as_secs(),
        collections = ?collections,
        "rescore scheduler started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for collection in &collections {
                    match rescorer.batch_update_score(*collection).await {
                        Ok(report) if !report.is_complete() => warn!(
                            %collection,
                            errored = report.errored_ids.len(),
                            skipped = report.skipped_count,
                            "rescore pass incomplete"
                        ),
                        Ok(_) => {}
                        Err(err) => error!(%collection, error = %err, "rescore pass failed"),
                    }
                }
                ticks += 1;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!(ticks, "rescore scheduler stopped");
    ticks
}
