use async_trait::async_trait;
use serde::Serialize;

use crate::engine::PlayerId;

pub mod entity;
pub mod sea_orm;

pub use self::sea_orm::SeaOrmAuditSink;

/// Latest-known connection facts for one player of a room, shown to the
/// banker when the sink is enabled.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub player_id: PlayerId,
    pub ip: String,
    pub user_agent: String,
    pub connected_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disconnected_at: Option<i64>,
    pub last_seen_at: i64,
}

/// Write-through sink for connection records. Failures are logged and never
/// reach the game path.
#[async_trait]
pub trait AuditSink: Send + Sync {
    fn is_enabled(&self) -> bool;

    /// Record a socket binding to a room/player. Returns a record id used
    /// by the later lifecycle calls.
    async fn record_connect(
        &self,
        room_id: &str,
        player_id: PlayerId,
        ip: &str,
        user_agent: &str,
    ) -> Option<i64>;

    async fn record_activity(&self, record_id: i64);

    async fn record_disconnect(&self, record_id: i64);

    async fn latest_connections(&self, room_id: &str) -> Vec<ConnectionSummary>;
}

/// Sink used when no database is configured.
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn record_connect(
        &self,
        _room_id: &str,
        _player_id: PlayerId,
        _ip: &str,
        _user_agent: &str,
    ) -> Option<i64> {
        None
    }

    async fn record_activity(&self, _record_id: i64) {}

    async fn record_disconnect(&self, _record_id: i64) {}

    async fn latest_connections(&self, _room_id: &str) -> Vec<ConnectionSummary> {
        Vec::new()
    }
}
