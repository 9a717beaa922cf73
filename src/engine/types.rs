use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cards::Card;

pub type Chips = i64;
pub type PlayerId = u64;
pub type RoundId = Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerRole {
    Banker,
    Player,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    Offline,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub first_name: String,
    pub last_name: String,
    pub role: PlayerRole,
    pub presence: Presence,
}

impl Player {
    pub fn is_banker(&self) -> bool {
        self.role == PlayerRole::Banker
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnState {
    Pending,
    Standby,
    Won,
    Lost,
    Skipped,
}

/// One seat's state within a round. Cards are append-only while the round
/// runs; `bet` is the cumulative stake and `settled_*` record the payout
/// once the seat has been resolved against the bank.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub player: Player,
    pub state: TurnState,
    pub cards: Vec<Card>,
    pub bet: Chips,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub bank_request: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub settled_bet: Option<Chips>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub settled_net: Option<Chips>,
}

impl Turn {
    pub fn new(player: Player, first_card: Card) -> Self {
        Self {
            player,
            state: TurnState::Pending,
            cards: vec![first_card],
            bet: 0,
            bank_request: None,
            settled_bet: None,
            settled_net: None,
        }
    }

    pub fn is_banker(&self) -> bool {
        self.player.is_banker()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    Playing,
    Final,
    Terminate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BankStage {
    Player,
    Banker,
    Decision,
}

/// Present iff a BANK! showdown is in flight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankLock {
    pub player_id: PlayerId,
    pub stage: BankStage,
    pub exposure: Chips,
    pub through_index: usize,
    pub initiated_at: u64,
}

/// Turn-timer metadata visible to clients. The scheduled task itself lives
/// outside the round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnTimer {
    pub player_id: PlayerId,
    pub expires_at: u64,
    pub duration: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceEntry {
    pub amount: Chips,
    pub payer: PlayerId,
    pub payee: PlayerId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub id: RoundId,
    pub room_id: String,
    pub deck: Vec<Card>,
    pub turns: Vec<Turn>,
    pub phase: RoundPhase,
    pub deck_count: u32,
    pub round_number: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub bank_lock: Option<BankLock>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub turn_timer: Option<TurnTimer>,
}

impl Round {
    pub fn seat_index(&self, player_id: PlayerId) -> Option<usize> {
        self.turns.iter().position(|t| t.player.id == player_id)
    }

    pub fn turn(&self, player_id: PlayerId) -> Option<&Turn> {
        self.turns.iter().find(|t| t.player.id == player_id)
    }

    pub fn turn_mut(&mut self, player_id: PlayerId) -> Option<&mut Turn> {
        self.turns.iter_mut().find(|t| t.player.id == player_id)
    }

    pub fn banker(&self) -> Option<&Turn> {
        self.turns.iter().find(|t| t.is_banker())
    }

    pub fn banker_mut(&mut self) -> Option<&mut Turn> {
        self.turns.iter_mut().find(|t| t.is_banker())
    }

    /// The seat expected to act next, if any.
    pub fn active_player(&self) -> Option<PlayerId> {
        if let Some(lock) = &self.bank_lock {
            return match lock.stage {
                BankStage::Banker => self.banker().map(|t| t.player.id),
                BankStage::Player => Some(lock.player_id),
                BankStage::Decision => None,
            };
        }
        if self.phase == RoundPhase::Final {
            return self.banker().map(|t| t.player.id);
        }
        self.turns
            .iter()
            .find(|t| t.state == TurnState::Pending)
            .map(|t| t.player.id)
    }
}
