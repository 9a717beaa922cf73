use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;

use crate::engine::{BalanceEntry, Chips, GameError, Player, PlayerId, PlayerRole, RoundId};

pub const NAME_MAX: usize = 40;
pub const ROOM_NAME_MAX: usize = 80;
pub const NOTE_MAX: usize = 160;
pub const ROOM_ID_MIN: usize = 4;
pub const ROOM_ID_MAX: usize = 20;
pub const ROOM_CODE_LEN: usize = 6;
pub const DEFAULT_BUY_IN: Chips = 100;

const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
    pub first_name: String,
    pub last_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyInRequest {
    pub amount: Chips,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// The room aggregate. Everything here is broadcast to clients except the
/// password.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub default_buy_in: Chips,
    pub banker_buy_in: Chips,
    pub wallets: HashMap<PlayerId, Chips>,
    pub players: Vec<Player>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_id: Option<RoundId>,
    /// Newest-first.
    pub balance_ledger: Vec<BalanceEntry>,
    pub completed_rounds: u32,
    pub rename_requests: HashMap<PlayerId, RenameRequest>,
    pub buy_in_requests: HashMap<PlayerId, BuyInRequest>,
    pub waiting_player_ids: Vec<PlayerId>,
    pub rename_blocked_ids: HashSet<PlayerId>,
    pub buy_in_blocked_ids: HashSet<PlayerId>,
    pub seat_rotation_cursor: usize,
    #[serde(skip_serializing)]
    pub next_player_id: PlayerId,
}

impl Room {
    pub fn new(
        id: String,
        name: String,
        password: Option<String>,
        default_buy_in: Chips,
        banker_buy_in: Chips,
    ) -> Self {
        Self {
            id,
            name,
            password,
            default_buy_in,
            banker_buy_in,
            wallets: HashMap::new(),
            players: Vec::new(),
            round_id: None,
            balance_ledger: Vec::new(),
            completed_rounds: 0,
            rename_requests: HashMap::new(),
            buy_in_requests: HashMap::new(),
            waiting_player_ids: Vec::new(),
            rename_blocked_ids: HashSet::new(),
            buy_in_blocked_ids: HashSet::new(),
            seat_rotation_cursor: 0,
            next_player_id: 1,
        }
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn player_mut(&mut self, player_id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }

    pub fn banker(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.is_banker())
    }

    pub fn is_banker(&self, player_id: PlayerId) -> bool {
        self.player(player_id).map_or(false, Player::is_banker)
    }

    pub fn wallet(&self, player_id: PlayerId) -> Chips {
        self.wallets.get(&player_id).copied().unwrap_or(0)
    }

    pub fn add_player(
        &mut self,
        first_name: &str,
        last_name: &str,
        role: PlayerRole,
        buy_in: Chips,
    ) -> PlayerId {
        let id = self.next_player_id;
        self.next_player_id += 1;
        self.players.push(Player {
            id,
            first_name: sanitize_name(first_name),
            last_name: sanitize_name(last_name),
            role,
            presence: crate::engine::Presence::Online,
        });
        self.wallets.insert(id, buy_in);
        id
    }

    /// Drop every per-player record except the wallet.
    pub fn forget_player(&mut self, player_id: PlayerId) {
        self.players.retain(|p| p.id != player_id);
        self.waiting_player_ids.retain(|id| *id != player_id);
        self.rename_requests.remove(&player_id);
        self.buy_in_requests.remove(&player_id);
        self.rename_blocked_ids.remove(&player_id);
        self.buy_in_blocked_ids.remove(&player_id);
    }
}

pub fn sanitize_name(raw: &str) -> String {
    raw.trim().chars().take(NAME_MAX).collect()
}

pub fn sanitize_room_name(raw: &str) -> String {
    raw.trim().chars().take(ROOM_NAME_MAX).collect()
}

pub fn sanitize_note(raw: &str) -> String {
    raw.trim().chars().take(NOTE_MAX).collect()
}

/// Room ids are 4-20 chars from [A-Z0-9-].
pub fn validate_room_id(id: &str) -> Result<(), GameError> {
    let ok = (ROOM_ID_MIN..=ROOM_ID_MAX).contains(&id.len())
        && id
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-');
    if ok {
        Ok(())
    } else {
        Err(GameError::validation("Game ID invalid"))
    }
}

pub fn generate_room_code(rng: &mut StdRng) -> String {
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}
