use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, Condition, EntityTrait, LoaderTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::entities::alert::{self, Column as AlertCol, Entity as AlertEntity};
use crate::entities::decision::{self, Entity as DecisionEntity};
use crate::entities::event::{self, Entity as EventEntity};
use crate::entities::machine::{Column as MachineCol, Entity as MachineEntity};
use crate::entities::meta::{self, Entity as MetaEntity};
use crate::error::{Result, StoreError};
use crate::filter::{self, AlertFilter, FilterMap};
use crate::store::machine::{self as machine_store, MachineRow};
use crate::store::AlertStore;

/// 告警及其全部子记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRow {
    pub id: String,
    pub scenario: String,
    pub message: String,
    pub events_count: i32,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub source_scope: String,
    pub source_value: String,
    pub source_ip: Option<String>,
    pub source_range: Option<String>,
    pub source_as_number: Option<String>,
    pub source_as_name: Option<String>,
    pub source_country: Option<String>,
    pub source_latitude: Option<f64>,
    pub source_longitude: Option<f64>,
    pub capacity: i32,
    pub leak_speed: String,
    pub simulated: bool,
    pub scenario_version: String,
    pub scenario_hash: String,
    pub created_at: DateTime<Utc>,
    pub owner: Option<MachineRow>,
    pub decisions: Vec<DecisionRow>,
    pub events: Vec<EventRow>,
    pub metas: Vec<MetaRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRow {
    pub id: String,
    pub until: DateTime<Utc>,
    pub scenario: String,
    pub decision_type: String,
    pub start_ip: Option<i64>,
    pub end_ip: Option<i64>,
    pub value: String,
    pub scope: String,
    pub origin: String,
    pub simulated: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRow {
    pub id: String,
    pub time: DateTime<Utc>,
    pub serialized: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRow {
    pub id: String,
    pub key: String,
    pub value: String,
}

fn decision_to_row(m: decision::Model) -> DecisionRow {
    DecisionRow {
        id: m.id,
        until: m.until.with_timezone(&Utc),
        scenario: m.scenario,
        decision_type: m.decision_type,
        start_ip: m.start_ip,
        end_ip: m.end_ip,
        value: m.value,
        scope: m.scope,
        origin: m.origin,
        simulated: m.simulated,
        created_at: m.created_at.with_timezone(&Utc),
    }
}

fn event_to_row(m: event::Model) -> EventRow {
    EventRow {
        id: m.id,
        time: m.time.with_timezone(&Utc),
        serialized: m.serialized,
    }
}

fn meta_to_row(m: meta::Model) -> MetaRow {
    MetaRow {
        id: m.id,
        key: m.key,
        value: m.value,
    }
}

fn to_row(
    m: alert::Model,
    owner: Option<MachineRow>,
    decisions: Vec<decision::Model>,
    events: Vec<event::Model>,
    metas: Vec<meta::Model>,
) -> AlertRow {
    AlertRow {
        id: m.id,
        scenario: m.scenario,
        message: m.message,
        events_count: m.events_count,
        started_at: m.started_at.with_timezone(&Utc),
        stopped_at: m.stopped_at.with_timezone(&Utc),
        source_scope: m.source_scope,
        source_value: m.source_value,
        source_ip: m.source_ip,
        source_range: m.source_range,
        source_as_number: m.source_as_number,
        source_as_name: m.source_as_name,
        source_country: m.source_country,
        source_latitude: m.source_latitude,
        source_longitude: m.source_longitude,
        capacity: m.capacity,
        leak_speed: m.leak_speed,
        simulated: m.simulated,
        scenario_version: m.scenario_version,
        scenario_hash: m.scenario_hash,
        created_at: m.created_at.with_timezone(&Utc),
        owner,
        decisions: decisions.into_iter().map(decision_to_row).collect(),
        events: events.into_iter().map(event_to_row).collect(),
        metas: metas.into_iter().map(meta_to_row).collect(),
    }
}

impl AlertStore {
    /// Returns every alert matching the wire filter, oldest first, with its
    /// decisions, events, metas and owner loaded.
    pub async fn query_alerts(&self, filter: &FilterMap) -> Result<Vec<AlertRow>> {
        let filters = AlertFilter::parse_map(filter)?;
        self.query_alerts_with(&filters).await
    }

    pub async fn query_alerts_with(&self, filters: &[AlertFilter]) -> Result<Vec<AlertRow>> {
        let cond = filter::compile(filters, Utc::now())?;
        let alerts = self.select_alerts(cond, None).await?;
        self.load_graph(alerts).await
    }

    pub async fn get_alert(&self, alert_id: &str) -> Result<Option<AlertRow>> {
        let model = AlertEntity::find_by_id(alert_id)
            .one(self.db())
            .await
            .map_err(|e| StoreError::query(format!("alert '{alert_id}'"), e))?;
        let Some(model) = model else {
            return Ok(None);
        };
        Ok(self.load_graph(vec![model]).await?.pop())
    }

    pub async fn count_alerts(&self) -> Result<u64> {
        AlertEntity::find()
            .count(self.db())
            .await
            .map_err(|e| StoreError::query("counting alerts", e))
    }

    /// Alerts matching `cond` in `created_at ASC, id ASC` order. IDs are
    /// increasing Snowflake values, so alerts written in the same batch keep
    /// their submission order.
    pub(crate) async fn select_alerts(
        &self,
        cond: Condition,
        limit: Option<u64>,
    ) -> Result<Vec<alert::Model>> {
        AlertEntity::find()
            .filter(cond)
            .order_by_asc(AlertCol::CreatedAt)
            .order_by_asc(AlertCol::Id)
            .limit(limit)
            .all(self.db())
            .await
            .map_err(|e| StoreError::query("selecting alerts", e))
    }

    async fn load_graph(&self, alerts: Vec<alert::Model>) -> Result<Vec<AlertRow>> {
        if alerts.is_empty() {
            return Ok(Vec::new());
        }
        let decisions = alerts
            .load_many(
                DecisionEntity::find().order_by_asc(decision::Column::Id),
                self.db(),
            )
            .await
            .map_err(|e| StoreError::query("loading decisions", e))?;
        let events = alerts
            .load_many(
                EventEntity::find().order_by_asc(event::Column::Id),
                self.db(),
            )
            .await
            .map_err(|e| StoreError::query("loading events", e))?;
        let metas = alerts
            .load_many(
                MetaEntity::find().order_by_asc(meta::Column::Id),
                self.db(),
            )
            .await
            .map_err(|e| StoreError::query("loading metas", e))?;
        let owners = self.load_owners(&alerts).await?;

        let rows = alerts
            .into_iter()
            .zip(decisions)
            .zip(events)
            .zip(metas)
            .map(|(((alert, decisions), events), metas)| {
                let owner = alert.owner_id.as_ref().and_then(|id| owners.get(id).cloned());
                to_row(alert, owner, decisions, events, metas)
            })
            .collect();
        Ok(rows)
    }

    async fn load_owners(&self, alerts: &[alert::Model]) -> Result<HashMap<String, MachineRow>> {
        let mut ids: Vec<&str> = alerts.iter().filter_map(|a| a.owner_id.as_deref()).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let machines = MachineEntity::find()
            .filter(MachineCol::Id.is_in(ids))
            .all(self.db())
            .await
            .map_err(|e| StoreError::query("loading owners", e))?;
        Ok(machines
            .into_iter()
            .map(|m| (m.id.clone(), machine_store::to_row(m)))
            .collect())
    }
}
