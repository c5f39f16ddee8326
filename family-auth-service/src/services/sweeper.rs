//! Periodic removal of expired short-lived records.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::services::{AccessStore, StoreError, SweepReport};

pub async fn sweep_once(
    store: &dyn AccessStore,
    token_retention: Duration,
) -> Result<SweepReport, StoreError> {
    let report = store.sweep_expired(Utc::now(), token_retention).await?;

    if report.total() > 0 {
        metrics::counter!("sweeper_records_removed_total").increment(report.total());
        tracing::info!(
            verification_tokens = report.verification_tokens,
            pending_authorizations = report.pending_authorizations,
            admin_sessions = report.admin_sessions,
            "Expired records swept"
        );
    }
    Ok(report)
}

/// Run `sweep_once` every `interval` until the runtime shuts down.
pub fn spawn_sweeper(
    store: Arc<dyn AccessStore>,
    interval: std::time::Duration,
    token_retention: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = sweep_once(store.as_ref(), token_retention).await {
                tracing::warn!(error = %e, "Sweep failed");
            }
        }
    })
}
