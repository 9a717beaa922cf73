use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audit::ConnectionSummary;
use crate::engine::{BalanceEntry, Chips, GameError, Player, PlayerId, Round, RoundId};
use crate::store::{Room, Session, StoreEvent};

/// Client -> server frame. `payload` stays untyped until the command is
/// matched so that a bad body surfaces as `invalid_payload`, not
/// `invalid_json`.
#[derive(Debug, Deserialize)]
pub struct ClientEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(rename = "requestId", default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Server -> client frame.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEnvelope {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_id: Option<PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl ServerEnvelope {
    fn bare(kind: &'static str) -> Self {
        Self {
            kind,
            room_id: None,
            player_id: None,
            request_id: None,
            payload: None,
            error: None,
        }
    }

    pub fn ack(request_id: Option<String>, payload: AckPayload) -> Self {
        Self {
            request_id,
            payload: serde_json::to_value(payload).ok(),
            ..Self::bare("ack")
        }
    }

    pub fn error(request_id: Option<String>, err: &GameError) -> Self {
        Self {
            request_id,
            error: Some(ErrorBody {
                message: err.to_string(),
                code: None,
                details: None,
            }),
            ..Self::bare("error")
        }
    }

    pub fn connections(room_id: &str, summaries: &[ConnectionSummary]) -> Self {
        Self {
            room_id: Some(room_id.to_string()),
            payload: serde_json::to_value(summaries).ok(),
            ..Self::bare("room:connections")
        }
    }

    /// Map a store event to its broadcast frame.
    pub fn from_event(event: &StoreEvent) -> Self {
        match event {
            StoreEvent::RoomState { room } => Self {
                room_id: Some(room.id.clone()),
                payload: serde_json::to_value(room).ok(),
                ..Self::bare("room:state")
            },
            StoreEvent::RoundState { round } => Self {
                room_id: Some(round.room_id.clone()),
                payload: serde_json::to_value(round).ok(),
                ..Self::bare("round:state")
            },
            StoreEvent::RoundEnded {
                room_id,
                round,
                balances,
            } => Self {
                room_id: Some(room_id.clone()),
                payload: serde_json::to_value(RoundEndedPayload { balances, round }).ok(),
                ..Self::bare("round:ended")
            },
            StoreEvent::BankerEnded { room_id, round } => Self {
                room_id: Some(room_id.clone()),
                payload: serde_json::to_value(round).ok(),
                ..Self::bare("round:banker-ended")
            },
            StoreEvent::BankerTopUp {
                room_id,
                player_id,
                amount,
                note,
            } => Self {
                room_id: Some(room_id.clone()),
                player_id: Some(*player_id),
                payload: serde_json::to_value(WalletDeltaPayload {
                    amount: *amount,
                    note: note.as_deref(),
                })
                .ok(),
                ..Self::bare("room:banker-topup")
            },
            StoreEvent::BankAdjusted {
                room_id,
                player_id,
                amount,
                note,
            } => Self {
                room_id: Some(room_id.clone()),
                player_id: Some(*player_id),
                payload: serde_json::to_value(WalletDeltaPayload {
                    amount: *amount,
                    note: note.as_deref(),
                })
                .ok(),
                ..Self::bare("player:bank-adjusted")
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RoundEndedPayload<'a> {
    balances: &'a [BalanceEntry],
    round: &'a Round,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WalletDeltaPayload<'a> {
    amount: Chips,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'a str>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AckPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<Room>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<Player>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<Round>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_up: Option<Chips>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjust: Option<Chips>,
}

// ---- command payloads ---------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreatePayload {
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub room_name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub buy_in: Option<Chips>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub banker_bankroll: Option<Chips>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoinPayload {
    pub room_id: String,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomResumePayload {
    pub room_id: String,
    pub player_id: PlayerId,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchAdminPayload {
    pub target_player_id: PlayerId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomGetPayload {
    pub room_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundStartPayload {
    pub room_id: String,
    #[serde(default)]
    pub deck_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundGetPayload {
    pub round_id: RoundId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnBetPayload {
    pub round_id: RoundId,
    pub amount: Chips,
    #[serde(default)]
    pub player_id: Option<PlayerId>,
    #[serde(default)]
    pub bank: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnHitPayload {
    pub round_id: RoundId,
    #[serde(default)]
    pub player_id: Option<PlayerId>,
    #[serde(default)]
    pub eleveroon: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnStandPayload {
    pub round_id: RoundId,
    #[serde(default)]
    pub player_id: Option<PlayerId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnSkipPayload {
    pub round_id: RoundId,
    #[serde(default)]
    pub player_id: Option<PlayerId>,
    #[serde(default)]
    pub actor_id: Option<PlayerId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequestPayload {
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerTargetPayload {
    pub player_id: PlayerId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPayload {
    pub player_id: PlayerId,
    pub block: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyInRequestPayload {
    pub amount: Chips,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankAdjustPayload {
    pub player_id: PlayerId,
    pub amount: Chips,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpPayload {
    pub amount: Chips,
    #[serde(default)]
    pub note: Option<String>,
}
