use sea_orm::{ColumnTrait, DbErr, EntityTrait, QueryFilter, TransactionTrait};
use tokio_util::sync::CancellationToken;

use crate::entities::alert::Entity as AlertEntity;
use crate::entities::decision::{Column as DecisionCol, Entity as DecisionEntity};
use crate::entities::event::{Column as EventCol, Entity as EventEntity};
use crate::entities::meta::{Column as MetaCol, Entity as MetaEntity};
use crate::error::{Result, StoreError};
use crate::filter::FilterMap;
use crate::store::alert::AlertRow;
use crate::store::AlertStore;

impl AlertStore {
    /// Deletes an alert with its events, metas and decisions.
    ///
    /// Children go first, then the alert, all in one transaction. Deleting an
    /// alert that no longer exists succeeds.
    pub async fn delete_alert_graph(&self, alert_id: &str) -> Result<()> {
        let fail = |entity: &'static str| {
            move |source: DbErr| StoreError::DeleteFail {
                entity,
                alert_id: alert_id.to_string(),
                source,
            }
        };

        let txn = self.db().begin().await.map_err(fail("alert graph"))?;
        EventEntity::delete_many()
            .filter(EventCol::AlertId.eq(alert_id))
            .exec(&txn)
            .await
            .map_err(fail("events"))?;
        MetaEntity::delete_many()
            .filter(MetaCol::AlertId.eq(alert_id))
            .exec(&txn)
            .await
            .map_err(fail("metas"))?;
        DecisionEntity::delete_many()
            .filter(DecisionCol::AlertId.eq(alert_id))
            .exec(&txn)
            .await
            .map_err(fail("decisions"))?;
        AlertEntity::delete_by_id(alert_id)
            .exec(&txn)
            .await
            .map_err(fail("alert"))?;
        txn.commit().await.map_err(fail("alert graph"))?;
        Ok(())
    }

    /// Deletes every alert matching the filter and returns what was deleted.
    ///
    /// Stops at the first failure; alerts already removed stay removed.
    pub async fn delete_alerts(
        &self,
        filter: &FilterMap,
        cancel: &CancellationToken,
    ) -> Result<Vec<AlertRow>> {
        let alerts = self.query_alerts(filter).await?;
        for (done, alert) in alerts.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(StoreError::Cancelled { completed: done });
            }
            self.delete_alert_graph(&alert.id).await?;
        }
        tracing::debug!(deleted = alerts.len(), "Deleted alerts by filter");
        Ok(alerts)
    }

    /// Cascades a list of alerts, honouring cancellation between alerts.
    pub(crate) async fn delete_alert_graphs(
        &self,
        alert_ids: impl IntoIterator<Item = String>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let mut deleted = 0u64;
        for alert_id in alert_ids {
            if cancel.is_cancelled() {
                return Err(StoreError::Cancelled {
                    completed: deleted as usize,
                });
            }
            self.delete_alert_graph(&alert_id).await?;
            deleted += 1;
        }
        Ok(deleted)
    }
}
