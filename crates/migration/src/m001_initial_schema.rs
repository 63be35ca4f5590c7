use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_initial_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 父表在前，子表在后
        manager.get_connection().execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_SQL)
            .await?;
        Ok(())
    }
}

const UP_SQL: &str = "
CREATE TABLE IF NOT EXISTS machines (
    id TEXT PRIMARY KEY NOT NULL,
    machine_id TEXT NOT NULL UNIQUE,
    ip_address TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY NOT NULL,
    owner_id TEXT REFERENCES machines(id) ON DELETE SET NULL,
    scenario TEXT NOT NULL,
    message TEXT NOT NULL,
    events_count INTEGER NOT NULL DEFAULT 0,
    started_at TEXT NOT NULL,
    stopped_at TEXT NOT NULL,
    source_scope TEXT NOT NULL,
    source_value TEXT NOT NULL,
    source_ip TEXT,
    source_range TEXT,
    source_as_number TEXT,
    source_as_name TEXT,
    source_country TEXT,
    source_latitude REAL,
    source_longitude REAL,
    capacity INTEGER NOT NULL DEFAULT 0,
    leak_speed TEXT NOT NULL,
    simulated INTEGER NOT NULL DEFAULT 0,
    scenario_version TEXT NOT NULL,
    scenario_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alerts_created_at ON alerts(created_at, id);
CREATE INDEX IF NOT EXISTS idx_alerts_scenario ON alerts(scenario);
CREATE INDEX IF NOT EXISTS idx_alerts_source ON alerts(source_scope, source_value);

CREATE TABLE IF NOT EXISTS decisions (
    id TEXT PRIMARY KEY NOT NULL,
    alert_id TEXT NOT NULL REFERENCES alerts(id),
    until TEXT NOT NULL,
    scenario TEXT NOT NULL,
    decision_type TEXT NOT NULL,
    start_ip INTEGER,
    end_ip INTEGER,
    value TEXT NOT NULL,
    scope TEXT NOT NULL,
    origin TEXT NOT NULL,
    simulated INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_decisions_alert_id ON decisions(alert_id);
CREATE INDEX IF NOT EXISTS idx_decisions_until ON decisions(until);
CREATE INDEX IF NOT EXISTS idx_decisions_ip ON decisions(start_ip, end_ip);

CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY NOT NULL,
    alert_id TEXT NOT NULL REFERENCES alerts(id),
    time TEXT NOT NULL,
    serialized TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_alert_id ON events(alert_id);

CREATE TABLE IF NOT EXISTS metas (
    id TEXT PRIMARY KEY NOT NULL,
    alert_id TEXT NOT NULL REFERENCES alerts(id),
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_metas_alert_id ON metas(alert_id);
";

const DOWN_SQL: &str = "
DROP TABLE IF EXISTS metas;
DROP TABLE IF EXISTS events;
DROP TABLE IF EXISTS decisions;
DROP TABLE IF EXISTS alerts;
DROP TABLE IF EXISTS machines;
";
