use chrono::{Duration, Utc};
use sea_orm::Condition;
use tokio_util::sync::CancellationToken;

use crate::config::RetentionConfig;
use crate::error::{Result, StoreError};
use crate::filter::{self, AlertFilter};
use crate::store::AlertStore;

impl AlertStore {
    /// Evicts old alerts and returns how many were deleted.
    ///
    /// A positive `max_age` removes every alert created at or before
    /// `now - max_age`. A positive `max_items` then removes the oldest alerts
    /// until at most `max_items` remain. Zero disables either cap.
    pub async fn flush_alerts(
        &self,
        max_age: Duration,
        max_items: u64,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let mut deleted = 0u64;

        if max_age > Duration::zero() {
            let cutoff = Utc::now().checked_sub_signed(max_age).ok_or_else(|| {
                StoreError::ParseDurationFail {
                    field: "retention.max_age",
                    value: max_age.to_string(),
                    source: vigil_common::duration::DurationError::Overflow(max_age.to_string()),
                }
            })?;
            let cond = filter::compile(&[AlertFilter::CreatedBefore(cutoff)], Utc::now())?;
            let expired = self.select_alerts(cond, None).await?;
            tracing::debug!(count = expired.len(), cutoff = %cutoff, "Flushing alerts by age");
            deleted = self
                .delete_alert_graphs(expired.into_iter().map(|a| a.id), cancel)
                .await?;
        }

        if max_items > 0 {
            let total = self.count_alerts().await?;
            if total > max_items {
                let excess = total - max_items;
                let oldest = self.select_alerts(Condition::all(), Some(excess)).await?;
                tracing::debug!(count = oldest.len(), max_items, "Flushing alerts by count");
                let removed = self
                    .delete_alert_graphs(oldest.into_iter().map(|a| a.id), cancel)
                    .await
                    .map_err(|e| offset_cancelled(e, deleted))?;
                deleted += removed;
            }
        }

        tracing::debug!(deleted, "Alerts automatically flushed");
        Ok(deleted)
    }

    pub async fn flush_with_config(
        &self,
        config: &RetentionConfig,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        self.flush_alerts(config.max_age()?, config.max_items, cancel)
            .await
    }
}

/// Reports cancellation relative to the whole flush, not the current pass.
fn offset_cancelled(err: StoreError, already: u64) -> StoreError {
    match err {
        StoreError::Cancelled { completed } => StoreError::Cancelled {
            completed: completed + already as usize,
        },
        other => other,
    }
}
