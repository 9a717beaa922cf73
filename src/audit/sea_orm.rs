use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, ConnectOptions,
    ConnectionTrait, Database, DatabaseConnection, DbBackend, EntityTrait, QueryFilter,
    QueryOrder, Statement,
};
use tracing::warn;

use crate::engine::PlayerId;

use super::{entity, AuditSink, ConnectionSummary};

const LOG_TARGET: &str = "kvitlach::audit";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS connections (
        id BIGSERIAL PRIMARY KEY,
        room_id TEXT NOT NULL,
        player_id BIGINT NOT NULL,
        ip TEXT NOT NULL,
        user_agent TEXT NOT NULL,
        connected_at TIMESTAMPTZ NOT NULL,
        disconnected_at TIMESTAMPTZ,
        last_seen_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_connections_room_player
        ON connections (room_id, player_id)",
    "CREATE INDEX IF NOT EXISTS idx_connections_room
        ON connections (room_id)",
];

/// Connection audit sink backed by a relational store.
pub struct SeaOrmAuditSink {
    db: DatabaseConnection,
}

impl SeaOrmAuditSink {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let mut opts = ConnectOptions::new(database_url.to_owned());
        opts.max_connections(5)
            .min_connections(1)
            .connect_timeout(CONNECT_TIMEOUT)
            .sqlx_logging(false);
        let db = Database::connect(opts)
            .await
            .with_context(|| format!("failed to connect to audit database at {database_url}"))?;

        for statement in SCHEMA {
            db.execute(Statement::from_string(DbBackend::Postgres, *statement))
                .await
                .context("failed to prepare audit schema")?;
        }
        Ok(Self { db })
    }
}

#[async_trait]
impl AuditSink for SeaOrmAuditSink {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn record_connect(
        &self,
        room_id: &str,
        player_id: PlayerId,
        ip: &str,
        user_agent: &str,
    ) -> Option<i64> {
        let now = Utc::now();
        let record = entity::ActiveModel {
            id: NotSet,
            room_id: Set(room_id.to_string()),
            player_id: Set(player_id as i64),
            ip: Set(ip.to_string()),
            user_agent: Set(user_agent.to_string()),
            connected_at: Set(now),
            disconnected_at: Set(None),
            last_seen_at: Set(now),
        };
        match record.insert(&self.db).await {
            Ok(inserted) => Some(inserted.id),
            Err(err) => {
                warn!(target: LOG_TARGET, error = %err, "failed to record connection");
                None
            }
        }
    }

    async fn record_activity(&self, record_id: i64) {
        let update = entity::ActiveModel {
            id: Set(record_id),
            last_seen_at: Set(Utc::now()),
            ..Default::default()
        };
        if let Err(err) = update.update(&self.db).await {
            warn!(target: LOG_TARGET, error = %err, "failed to record activity");
        }
    }

    async fn record_disconnect(&self, record_id: i64) {
        let now = Utc::now();
        let update = entity::ActiveModel {
            id: Set(record_id),
            disconnected_at: Set(Some(now)),
            last_seen_at: Set(now),
            ..Default::default()
        };
        if let Err(err) = update.update(&self.db).await {
            warn!(target: LOG_TARGET, error = %err, "failed to record disconnection");
        }
    }

    async fn latest_connections(&self, room_id: &str) -> Vec<ConnectionSummary> {
        let rows = entity::Entity::find()
            .filter(entity::Column::RoomId.eq(room_id))
            .order_by_desc(entity::Column::ConnectedAt)
            .all(&self.db)
            .await;
        let rows = match rows {
            Ok(rows) => rows,
            Err(err) => {
                warn!(target: LOG_TARGET, error = %err, "failed to load connection summary");
                return Vec::new();
            }
        };

        // Latest row per player.
        let mut seen = HashSet::new();
        rows.into_iter()
            .filter(|row| seen.insert(row.player_id))
            .map(|row| ConnectionSummary {
                player_id: row.player_id as PlayerId,
                ip: row.ip,
                user_agent: row.user_agent,
                connected_at: row.connected_at.timestamp_millis(),
                disconnected_at: row.disconnected_at.map(|at| at.timestamp_millis()),
                last_seen_at: row.last_seen_at.timestamp_millis(),
            })
            .collect()
    }
}
