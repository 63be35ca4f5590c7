//! Bulk alert ingestion.
//!
//! Submissions are validated and turned into detached rows one alert at a
//! time, collected in an [`AlertBatch`], and written one batch per
//! transaction. A batch is all-or-nothing; batches already committed stay
//! committed when a later one fails.

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{ActiveValue::NotSet, ActiveValue::Set, EntityTrait, TransactionTrait};
use tokio_util::sync::CancellationToken;
use vigil_common::duration::{parse_duration, DurationError};
use vigil_common::id::next_id;
use vigil_common::iprange::IpRange;
use vigil_common::types::{AlertSubmission, DecisionSubmission, EventSubmission, MetaSubmission};

use crate::entities::alert::{self, Entity as AlertEntity};
use crate::entities::decision::{self, Entity as DecisionEntity};
use crate::entities::event::{self, Entity as EventEntity};
use crate::entities::meta::{self, Entity as MetaEntity};
use crate::error::{Result, StoreError};
use crate::store::machine::{MachineLookup, MachineLookupError};
use crate::store::AlertStore;

pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Rows per INSERT, kept well under SQLite's bind-parameter limit whatever
/// the configured batch size.
const ROWS_PER_INSERT: usize = 100;

/// One validated alert and its children, not yet written.
struct PendingAlert {
    id: String,
    alert: alert::ActiveModel,
    events: Vec<event::ActiveModel>,
    metas: Vec<meta::ActiveModel>,
    decisions: Vec<decision::ActiveModel>,
}

/// Per-call accumulator of pending alerts.
struct AlertBatch {
    items: Vec<PendingAlert>,
    capacity: usize,
}

impl AlertBatch {
    fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, item: PendingAlert) {
        self.items.push(item);
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn take(&mut self) -> Vec<PendingAlert> {
        std::mem::replace(&mut self.items, Vec::with_capacity(self.capacity))
    }
}

impl AlertStore {
    /// Stores alerts reported by `machine_id` and returns their IDs in
    /// submission order.
    pub async fn ingest_alerts(
        &self,
        machine_id: &str,
        alerts: &[AlertSubmission],
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        self.ingest_alerts_with(self, machine_id, alerts, cancel).await
    }

    /// Same as [`AlertStore::ingest_alerts`], resolving the reporter through
    /// an external machine registry.
    pub async fn ingest_alerts_with(
        &self,
        lookup: &dyn MachineLookup,
        machine_id: &str,
        alerts: &[AlertSubmission],
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        if alerts.is_empty() {
            return Ok(Vec::new());
        }
        let owner_id = resolve_owner(lookup, machine_id).await?;

        let mut ids = Vec::with_capacity(alerts.len());
        let mut batch = AlertBatch::new(self.batch_size);
        for item in alerts {
            batch.push(build_pending(item, owner_id.as_deref(), Utc::now())?);
            if batch.is_full() {
                let flushed = self.flush_batch(batch.take(), cancel, ids.len()).await?;
                ids.extend(flushed);
            }
        }
        if !batch.is_empty() {
            let flushed = self.flush_batch(batch.take(), cancel, ids.len()).await?;
            ids.extend(flushed);
        }
        Ok(ids)
    }

    async fn flush_batch(
        &self,
        items: Vec<PendingAlert>,
        cancel: &CancellationToken,
        completed: usize,
    ) -> Result<Vec<String>> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled { completed });
        }

        let now = Utc::now().fixed_offset();
        let mut ids = Vec::with_capacity(items.len());
        let mut alerts = Vec::with_capacity(items.len());
        let mut events = Vec::new();
        let mut metas = Vec::new();
        let mut decisions = Vec::new();
        for mut item in items {
            item.alert.created_at = Set(now);
            ids.push(item.id);
            alerts.push(item.alert);
            events.extend(item.events.into_iter().map(|mut e| {
                e.created_at = Set(now);
                e
            }));
            metas.extend(item.metas.into_iter().map(|mut m| {
                m.created_at = Set(now);
                m
            }));
            decisions.extend(item.decisions.into_iter().map(|mut d| {
                d.created_at = Set(now);
                d
            }));
        }

        let txn = self.db().begin().await.map_err(|source| StoreError::BulkError {
            context: "starting batch transaction",
            source,
        })?;

        // 先写父表，子表外键才能成立
        for chunk in alerts.chunks(ROWS_PER_INSERT) {
            AlertEntity::insert_many(chunk.to_vec())
                .exec_without_returning(&txn)
                .await
                .map_err(|source| StoreError::BulkError {
                    context: "creating alerts",
                    source,
                })?;
        }
        for chunk in events.chunks(ROWS_PER_INSERT) {
            EventEntity::insert_many(chunk.to_vec())
                .exec_without_returning(&txn)
                .await
                .map_err(|source| StoreError::BulkError {
                    context: "creating alert events",
                    source,
                })?;
        }
        for chunk in metas.chunks(ROWS_PER_INSERT) {
            MetaEntity::insert_many(chunk.to_vec())
                .exec_without_returning(&txn)
                .await
                .map_err(|source| StoreError::BulkError {
                    context: "creating alert metas",
                    source,
                })?;
        }
        for chunk in decisions.chunks(ROWS_PER_INSERT) {
            DecisionEntity::insert_many(chunk.to_vec())
                .exec_without_returning(&txn)
                .await
                .map_err(|source| StoreError::BulkError {
                    context: "creating alert decisions",
                    source,
                })?;
        }

        txn.commit().await.map_err(|source| StoreError::BulkError {
            context: "committing batch",
            source,
        })?;
        tracing::debug!(
            alerts = ids.len(),
            events = events.len(),
            metas = metas.len(),
            decisions = decisions.len(),
            "Flushed alert batch"
        );
        Ok(ids)
    }
}

/// An unknown reporter yields an ownerless alert; any other lookup failure
/// aborts the call.
async fn resolve_owner(lookup: &dyn MachineLookup, machine_id: &str) -> Result<Option<String>> {
    match lookup.machine_by_id(machine_id).await {
        Ok(machine) => Ok(Some(machine.id)),
        Err(MachineLookupError::NotFound(_)) => {
            tracing::debug!(machine_id = %machine_id, "Unknown reporting machine, storing alerts without owner");
            Ok(None)
        }
        Err(MachineLookupError::Backend(source)) => Err(StoreError::QueryFail {
            context: format!("machine '{machine_id}'"),
            source,
        }),
    }
}

fn build_pending(
    item: &AlertSubmission,
    owner_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<PendingAlert> {
    let started_at = parse_instant("start_at", &item.start_at)?;
    let stopped_at = parse_instant("stop_at", &item.stop_at)?;

    let id = next_id();
    let events = item
        .events
        .iter()
        .map(|e| build_event(&id, e))
        .collect::<Result<Vec<_>>>()?;
    let metas = item.meta.iter().map(|m| build_meta(&id, m)).collect();
    let decisions = item
        .decisions
        .iter()
        .map(|d| build_decision(&id, d, item.simulated, now))
        .collect::<Result<Vec<_>>>()?;

    let source = &item.source;
    let alert = alert::ActiveModel {
        id: Set(id.clone()),
        owner_id: Set(owner_id.map(|s| s.to_owned())),
        scenario: Set(item.scenario.clone()),
        message: Set(item.message.clone()),
        events_count: Set(item.events_count),
        started_at: Set(started_at),
        stopped_at: Set(stopped_at),
        source_scope: Set(source.scope.clone()),
        source_value: Set(source.value.clone()),
        source_ip: Set(source.ip.clone()),
        source_range: Set(source.range.clone()),
        source_as_number: Set(source.as_number.clone()),
        source_as_name: Set(source.as_name.clone()),
        source_country: Set(source.cn.clone()),
        source_latitude: Set(source.latitude),
        source_longitude: Set(source.longitude),
        capacity: Set(item.capacity),
        leak_speed: Set(item.leakspeed.clone()),
        simulated: Set(item.simulated),
        scenario_version: Set(item.scenario_version.clone()),
        scenario_hash: Set(item.scenario_hash.clone()),
        created_at: NotSet,
    };

    Ok(PendingAlert {
        id,
        alert,
        events,
        metas,
        decisions,
    })
}

fn build_event(alert_id: &str, item: &EventSubmission) -> Result<event::ActiveModel> {
    let time = parse_instant("event timestamp", &item.timestamp)?;
    let serialized = serde_json::to_string(&item.meta).map_err(|source| StoreError::MarshalFail {
        field: "event meta",
        source,
    })?;
    Ok(event::ActiveModel {
        id: Set(next_id()),
        alert_id: Set(alert_id.to_owned()),
        time: Set(time),
        serialized: Set(serialized),
        created_at: NotSet,
    })
}

fn build_meta(alert_id: &str, item: &MetaSubmission) -> meta::ActiveModel {
    meta::ActiveModel {
        id: Set(next_id()),
        alert_id: Set(alert_id.to_owned()),
        key: Set(item.key.clone()),
        value: Set(item.value.clone()),
        created_at: NotSet,
    }
}

/// `until` is derived from the declared duration; `simulated` is copied from
/// the owning alert.
fn build_decision(
    alert_id: &str,
    item: &DecisionSubmission,
    simulated: bool,
    now: DateTime<Utc>,
) -> Result<decision::ActiveModel> {
    let duration = parse_duration(&item.duration).map_err(|source| StoreError::ParseDurationFail {
        field: "decision duration",
        value: item.duration.clone(),
        source,
    })?;
    let until = now
        .checked_add_signed(duration)
        .ok_or_else(|| StoreError::ParseDurationFail {
            field: "decision duration",
            value: item.duration.clone(),
            source: DurationError::Overflow(item.duration.clone()),
        })?;
    let (start_ip, end_ip) = decision_bounds(item)?;

    Ok(decision::ActiveModel {
        id: Set(next_id()),
        alert_id: Set(alert_id.to_owned()),
        until: Set(until.fixed_offset()),
        scenario: Set(item.scenario.clone()),
        decision_type: Set(item.decision_type.clone()),
        start_ip: Set(start_ip),
        end_ip: Set(end_ip),
        value: Set(item.value.clone()),
        scope: Set(item.scope.clone()),
        origin: Set(item.origin.clone()),
        simulated: Set(simulated),
        created_at: NotSet,
    })
}

/// Explicit bounds win. Without them, `Ip` and `Range` scoped decisions get
/// bounds from their value when it parses.
fn decision_bounds(item: &DecisionSubmission) -> Result<(Option<i64>, Option<i64>)> {
    match (item.start_ip, item.end_ip) {
        (Some(start), Some(end)) => {
            let range = IpRange::new(start, end).map_err(|source| StoreError::InvalidIpOrRange {
                field: "decision range",
                value: format!("{start}-{end}"),
                source,
            })?;
            Ok((Some(range.start), Some(range.end)))
        }
        (None, None) if is_ip_scope(&item.scope) => Ok(IpRange::parse(&item.value)
            .map(|range| (Some(range.start), Some(range.end)))
            .unwrap_or((None, None))),
        bounds => Ok(bounds),
    }
}

fn is_ip_scope(scope: &str) -> bool {
    scope.eq_ignore_ascii_case("ip") || scope.eq_ignore_ascii_case("range")
}

fn parse_instant(field: &'static str, value: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc).fixed_offset())
        .map_err(|source| StoreError::ParseTimeFail {
            field,
            value: value.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(scope: &str, value: &str) -> DecisionSubmission {
        DecisionSubmission {
            duration: "4h".to_string(),
            scenario: "ssh-bruteforce".to_string(),
            decision_type: "ban".to_string(),
            value: value.to_string(),
            scope: scope.to_string(),
            origin: "local".to_string(),
            start_ip: None,
            end_ip: None,
        }
    }

    #[test]
    fn bounds_derived_from_ip_scoped_values() {
        assert_eq!(
            decision_bounds(&decision("Ip", "10.0.0.5")).unwrap(),
            (Some(167_772_165), Some(167_772_165))
        );
        assert_eq!(
            decision_bounds(&decision("range", "10.0.0.0/24")).unwrap(),
            (Some(167_772_160), Some(167_772_415))
        );
        assert_eq!(decision_bounds(&decision("Ip", "2001:db8::1")).unwrap(), (None, None));
        assert_eq!(decision_bounds(&decision("Country", "FR")).unwrap(), (None, None));
    }

    #[test]
    fn explicit_bounds_must_be_ordered() {
        let mut d = decision("Ip", "10.0.0.5");
        d.start_ip = Some(10);
        d.end_ip = Some(20);
        assert_eq!(decision_bounds(&d).unwrap(), (Some(10), Some(20)));

        d.start_ip = Some(30);
        assert!(matches!(
            decision_bounds(&d),
            Err(StoreError::InvalidIpOrRange { field: "decision range", .. })
        ));
    }

    #[test]
    fn until_is_now_plus_duration() {
        let now = Utc::now();
        let model = build_decision("1", &decision("Ip", "10.0.0.5"), true, now).unwrap();
        assert_eq!(
            model.until,
            Set((now + chrono::Duration::hours(4)).fixed_offset())
        );
        assert_eq!(model.simulated, Set(true));
    }

    #[test]
    fn instants_are_normalized_to_utc() {
        let t = parse_instant("start_at", "2024-01-01T02:00:00+02:00").unwrap();
        assert_eq!(t.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert!(matches!(
            parse_instant("stop_at", "yesterday"),
            Err(StoreError::ParseTimeFail { field: "stop_at", .. })
        ));
    }
}
