use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

/// Background task that moves elapsed bookings to their resting status:
/// Pending whose start passed undecided → Expired, Confirmed whose end
/// passed → Completed.
pub async fn run_reaper(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64;
        match engine.sweep_elapsed(now).await {
            Ok((0, 0)) => {}
            Ok((expired, completed)) => {
                info!("swept {expired} expired, {completed} completed bookings")
            }
            Err(e) => tracing::warn!("sweep failed: {e}"),
        }
    }
}

/// Background task that compacts the WAL once enough appends accumulate.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        if engine.wal_appends_since_compact().await < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL"),
            Err(e) => tracing::warn!("WAL compaction failed: {e}"),
        }
    }
}
