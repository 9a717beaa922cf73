use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use uuid::Uuid;

use crate::engine::{GameError, PlayerId};

/// Sessions live for a day; resuming issues a fresh token and invalidates
/// the old one.
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub room_id: String,
    pub player_id: PlayerId,
    pub token: String,
    #[serde(skip_serializing)]
    pub expires_at: SystemTime,
}

impl Session {
    fn issue(room_id: &str, player_id: PlayerId) -> Self {
        Self {
            room_id: room_id.to_string(),
            player_id,
            token: Uuid::new_v4().to_string(),
            expires_at: SystemTime::now() + SESSION_TTL,
        }
    }

    pub fn is_expired(&self) -> bool {
        SystemTime::now() > self.expires_at
    }
}

/// Per-room session registry, keyed by player.
#[derive(Debug, Default)]
pub struct SessionSet {
    sessions: HashMap<PlayerId, Session>,
}

impl SessionSet {
    /// Issue a fresh token for the player, replacing any previous one.
    pub fn issue(&mut self, room_id: &str, player_id: PlayerId) -> Session {
        let session = Session::issue(room_id, player_id);
        self.sessions.insert(player_id, session.clone());
        session
    }

    /// Validate an exact, unexpired token and rotate it.
    pub fn resume(
        &mut self,
        room_id: &str,
        player_id: PlayerId,
        token: &str,
    ) -> Result<Session, GameError> {
        let valid = self
            .sessions
            .get(&player_id)
            .map_or(false, |s| {
                s.room_id == room_id && s.token == token && !s.is_expired()
            });
        if !valid {
            return Err(GameError::InvalidSession);
        }
        Ok(self.issue(room_id, player_id))
    }

    pub fn remove(&mut self, player_id: PlayerId) {
        self.sessions.remove(&player_id);
    }
}
