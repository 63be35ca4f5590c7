use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, DbErr, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};

use crate::entities::machine::{self, Column as MachineCol, Entity as MachineEntity};
use crate::error::Result;
use crate::store::AlertStore;

/// 上报告警的机器
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineRow {
    pub id: String,
    pub machine_id: String,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) fn to_row(m: machine::Model) -> MachineRow {
    MachineRow {
        id: m.id,
        machine_id: m.machine_id,
        ip_address: m.ip_address,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MachineLookupError {
    /// The reporter is unknown. Ingestion continues with an ownerless alert.
    #[error("machine '{0}' does not exist")]
    NotFound(String),

    #[error("machine lookup failed: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl From<DbErr> for MachineLookupError {
    fn from(err: DbErr) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// Resolves a reporter's external identifier to its machine record.
#[async_trait]
pub trait MachineLookup: Send + Sync {
    async fn machine_by_id(&self, machine_id: &str) -> std::result::Result<MachineRow, MachineLookupError>;
}

#[async_trait]
impl MachineLookup for AlertStore {
    async fn machine_by_id(&self, machine_id: &str) -> std::result::Result<MachineRow, MachineLookupError> {
        MachineEntity::find()
            .filter(MachineCol::MachineId.eq(machine_id))
            .one(self.db())
            .await?
            .map(to_row)
            .ok_or_else(|| MachineLookupError::NotFound(machine_id.to_string()))
    }
}

impl AlertStore {
    pub async fn register_machine(
        &self,
        machine_id: &str,
        ip_address: Option<&str>,
    ) -> Result<MachineRow> {
        let now = Utc::now().fixed_offset();
        let am = machine::ActiveModel {
            id: Set(vigil_common::id::next_id()),
            machine_id: Set(machine_id.to_owned()),
            ip_address: Set(ip_address.map(|s| s.to_owned())),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(to_row(model))
    }

    pub async fn get_machine(&self, machine_id: &str) -> Result<Option<MachineRow>> {
        let model = MachineEntity::find()
            .filter(MachineCol::MachineId.eq(machine_id))
            .one(self.db())
            .await?;
        Ok(model.map(to_row))
    }
}
