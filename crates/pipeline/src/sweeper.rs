//! Periodic eviction of finished tasks from the registry.
//!
//! Runs on a fixed `tokio::time::interval` until cancelled.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::registry::TaskRegistry;

/// Run the eviction loop until `cancel` is triggered.
pub async fn run(registry: Arc<TaskRegistry>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Task sweeper started");

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Task sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                let evicted = registry.evict_expired(Utc::now()).await;
                if evicted > 0 {
                    let remaining = registry.len().await;
                    tracing::info!(
                        evicted,
                        remaining,
                        "Task sweeper: evicted finished tasks",
                    );
                } else {
                    tracing::debug!("Task sweeper: nothing to evict");
                }
            }
        }
    }
}
