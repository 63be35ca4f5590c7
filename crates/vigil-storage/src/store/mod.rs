use anyhow::Result;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection};

use crate::config::StoreConfig;

pub mod alert;
pub mod delete;
pub mod ingest;
pub mod machine;
pub mod retention;

// ---- 公开 Row 类型（从各子模块重新导出）----
pub use alert::{AlertRow, DecisionRow, EventRow, MetaRow};
pub use ingest::DEFAULT_BATCH_SIZE;
pub use machine::{MachineLookup, MachineLookupError, MachineRow};

/// Persistence layer for alerts and everything an alert owns.
///
/// All methods are `async fn` over SeaORM. Each call is one logical sequence
/// of statements; the store keeps no state between calls apart from its
/// connection pool and batch size.
pub struct AlertStore {
    pub(crate) db: DatabaseConnection,
    pub(crate) batch_size: usize,
}

impl AlertStore {
    /// Connects to the database and brings its schema up to date.
    ///
    /// `db_url` is a full connection URL, e.g.
    /// `sqlite:///var/lib/vigil/vigil.db?mode=rwc`.
    pub async fn new(db_url: &str) -> Result<Self> {
        let db = Database::connect(db_url).await?;

        // WAL 模式仅对 SQLite 有效
        if db_url.starts_with("sqlite:") {
            db.execute_unprepared("PRAGMA journal_mode=WAL;").await?;
        }

        Migrator::up(&db, None).await?;
        tracing::info!(db_url = %db_url, "Initialized alert store");

        Ok(Self {
            db,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    pub async fn from_config(config: &StoreConfig) -> Result<Self> {
        Ok(Self::new(&config.database_url)
            .await?
            .with_batch_size(config.batch_size))
    }

    /// Overrides how many alerts are written per flush. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub(crate) fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}
