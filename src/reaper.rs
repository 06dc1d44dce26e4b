use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::BookingEngine;
use crate::model::{Actor, BookingStatus};

/// Complete every confirmed stay whose check-out day has arrived.
/// Returns how many bookings were completed.
pub async fn complete_finished_stays(engine: &BookingEngine) -> usize {
    let today = engine.clock().today();
    let mut completed = 0;
    for booking_id in engine.collect_finished_stays(today) {
        match engine
            .transition_status(booking_id, Actor::system(), BookingStatus::Completed)
            .await
        {
            Ok(_) => {
                completed += 1;
                metrics::counter!(crate::observability::AUTO_COMPLETED_TOTAL).increment(1);
            }
            // Cancelled or completed by someone else since collection.
            Err(e) => debug!("sweeper skip {booking_id}: {e}"),
        }
    }
    completed
}

/// Background task that periodically auto-completes finished stays.
pub async fn run_sweeper(engine: Arc<BookingEngine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let n = complete_finished_stays(&engine).await;
        if n > 0 {
            info!("auto-completed {n} finished stays");
        }
    }
}

/// Background task that compacts the journal once enough appends pile up.
pub async fn run_compactor(engine: Arc<BookingEngine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = engine.journal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_journal().await {
            Ok(()) => info!("compacted journal after {appends} appends"),
            Err(e) => warn!("journal compaction failed: {e}"),
        }
    }
}
