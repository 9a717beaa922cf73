use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::engine::{
    self, hand, round as round_engine, BalanceEntry, BankLock, BankStage, Chips, GameError,
    HandOutcome, Player, PlayerId, PlayerRole, Presence, Round, RoundEngine, RoundId, RoundOps,
    RoundPhase, Turn, TurnState, TurnTimer,
};

pub mod room;
pub mod session;

#[cfg(test)]
mod tests;

pub use room::{
    sanitize_name, sanitize_note, sanitize_room_name, BuyInRequest, RenameRequest, Room,
    DEFAULT_BUY_IN,
};
pub use session::{Session, SessionSet};

const LOG_TARGET: &str = "kvitlach::store";

/// A pending non-banker seat is auto-stood after this long.
pub const TURN_TIMER_DURATION: Duration = Duration::from_secs(90);
/// A room with no state-mutating traffic for this long is deleted.
pub const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30 * 60);

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events fanned out to every socket of the affected room, emitted after the
/// mutation commits.
#[derive(Clone, Debug)]
pub enum StoreEvent {
    RoomState {
        room: Room,
    },
    RoundState {
        round: Round,
    },
    RoundEnded {
        room_id: String,
        round: Round,
        balances: Vec<BalanceEntry>,
    },
    BankerEnded {
        room_id: String,
        round: Round,
    },
    BankerTopUp {
        room_id: String,
        player_id: PlayerId,
        amount: Chips,
        note: Option<String>,
    },
    BankAdjusted {
        room_id: String,
        player_id: PlayerId,
        amount: Chips,
        note: Option<String>,
    },
}

impl StoreEvent {
    pub fn room_id(&self) -> &str {
        match self {
            StoreEvent::RoomState { room } => &room.id,
            StoreEvent::RoundState { round } => &round.room_id,
            StoreEvent::RoundEnded { room_id, .. }
            | StoreEvent::BankerEnded { room_id, .. }
            | StoreEvent::BankerTopUp { room_id, .. }
            | StoreEvent::BankAdjusted { room_id, .. } => room_id,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct CreateRoomInput {
    pub first_name: String,
    pub last_name: String,
    pub room_name: Option<String>,
    pub password: Option<String>,
    pub buy_in: Option<Chips>,
    pub room_id: Option<String>,
    pub banker_bankroll: Option<Chips>,
}

#[derive(Clone, Debug, Default)]
pub struct JoinRoomInput {
    pub first_name: String,
    pub last_name: String,
    pub password: Option<String>,
}

#[derive(Clone, Debug)]
pub struct JoinOutcome {
    pub room: Room,
    pub player: Player,
    pub session: Session,
}

#[derive(Clone, Debug)]
pub struct ResumeOutcome {
    pub room: Room,
    pub round: Option<Round>,
    pub player: Player,
    pub session: Session,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TurnCmd {
    Bet,
    Hit,
    Stand,
    Skip,
}

struct TurnTimerTask {
    round_id: RoundId,
    player_id: PlayerId,
    expires_at_ms: u64,
    handle: JoinHandle<()>,
}

struct RoomEntry {
    room: Room,
    round: Option<Round>,
    sessions: SessionSet,
    turn_timer: Option<TurnTimerTask>,
    inactivity: Option<JoinHandle<()>>,
}

impl RoomEntry {
    fn new(room: Room) -> Self {
        Self {
            room,
            round: None,
            sessions: SessionSet::default(),
            turn_timer: None,
            inactivity: None,
        }
    }

    fn abort_timers(&mut self) {
        if let Some(t) = self.turn_timer.take() {
            t.handle.abort();
        }
        if let Some(h) = self.inactivity.take() {
            h.abort();
        }
    }
}

/// The authority over every room, round, session and wallet. Each room is
/// guarded by its own mutex; engine transitions run to completion inside
/// that critical section, so commands touching the same room are totally
/// ordered while other rooms proceed in parallel.
pub struct GameStore {
    rooms: DashMap<String, Arc<Mutex<RoomEntry>>>,
    round_rooms: DashMap<RoundId, String>,
    events: broadcast::Sender<StoreEvent>,
}

fn epoch_ms(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

impl GameStore {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            rooms: DashMap::new(),
            round_rooms: DashMap::new(),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    fn entry(&self, room_id: &str) -> Result<Arc<Mutex<RoomEntry>>, GameError> {
        self.rooms
            .get(room_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or(GameError::RoomNotFound)
    }

    fn room_of(&self, round_id: RoundId) -> Result<String, GameError> {
        self.round_rooms
            .get(&round_id)
            .map(|e| e.value().clone())
            .ok_or(GameError::RoundNotFound)
    }

    // ---- room lifecycle -------------------------------------------------

    pub fn create_room(self: &Arc<Self>, input: CreateRoomInput) -> Result<JoinOutcome, GameError> {
        let buy_in = input.buy_in.unwrap_or(DEFAULT_BUY_IN);
        let banker_buy_in = input.banker_bankroll.unwrap_or(buy_in);
        if buy_in <= 0 || banker_buy_in <= 0 {
            return Err(GameError::InvalidBankroll);
        }

        let room_id = match input.room_id {
            Some(custom) => {
                let id = custom.trim().to_uppercase();
                room::validate_room_id(&id)?;
                id
            }
            None => {
                let mut rng = StdRng::from_entropy();
                loop {
                    let code = room::generate_room_code(&mut rng);
                    if !self.rooms.contains_key(&code) {
                        break code;
                    }
                }
            }
        };

        let name = input
            .room_name
            .map(|n| sanitize_room_name(&n))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| room_id.clone());

        let mut new_room = Room::new(
            room_id.clone(),
            name,
            input.password.filter(|p| !p.is_empty()),
            buy_in,
            banker_buy_in,
        );
        let banker_id = new_room.add_player(
            &input.first_name,
            &input.last_name,
            PlayerRole::Banker,
            banker_buy_in,
        );

        let arc = Arc::new(Mutex::new(RoomEntry::new(new_room)));
        match self.rooms.entry(room_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(GameError::validation("Game ID taken"));
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&arc));
            }
        }

        let mut entry = arc.lock();
        let session = entry.sessions.issue(&room_id, banker_id);
        self.touch_activity(&mut entry, &room_id);
        let room_snapshot = entry.room.clone();
        let player = room_snapshot
            .player(banker_id)
            .cloned()
            .ok_or(GameError::PlayerNotFound)?;
        drop(entry);

        info!(target: LOG_TARGET, room_id = %room_id, banker_id, "room created");
        self.emit(StoreEvent::RoomState {
            room: room_snapshot.clone(),
        });
        Ok(JoinOutcome {
            room: room_snapshot,
            player,
            session,
        })
    }

    pub fn join_room(
        self: &Arc<Self>,
        room_id: &str,
        input: JoinRoomInput,
    ) -> Result<JoinOutcome, GameError> {
        let room_id = room_id.trim().to_uppercase();
        let arc = self.entry(&room_id)?;
        let mut entry = arc.lock();

        if let Some(password) = &entry.room.password {
            if input.password.as_deref() != Some(password.as_str()) {
                return Err(GameError::InvalidPassword);
            }
        }

        let buy_in = entry.room.default_buy_in;
        let player_id =
            entry
                .room
                .add_player(&input.first_name, &input.last_name, PlayerRole::Player, buy_in);
        if entry.round.is_some() {
            // Mid-round joiners wait for the next deal.
            entry.room.waiting_player_ids.push(player_id);
        }
        let session = entry.sessions.issue(&room_id, player_id);
        self.touch_activity(&mut entry, &room_id);
        let room_snapshot = entry.room.clone();
        let player = room_snapshot
            .player(player_id)
            .cloned()
            .ok_or(GameError::PlayerNotFound)?;
        drop(entry);

        info!(target: LOG_TARGET, room_id = %room_id, player_id, "player joined");
        self.emit(StoreEvent::RoomState {
            room: room_snapshot.clone(),
        });
        Ok(JoinOutcome {
            room: room_snapshot,
            player,
            session,
        })
    }

    pub fn resume_player(
        self: &Arc<Self>,
        room_id: &str,
        player_id: PlayerId,
        token: &str,
    ) -> Result<ResumeOutcome, GameError> {
        let room_id = room_id.trim().to_uppercase();
        let arc = self.entry(&room_id)?;
        let mut entry = arc.lock();

        if entry.room.player(player_id).is_none() {
            return Err(GameError::PlayerNotFound);
        }
        let session = entry.sessions.resume(&room_id, player_id, token)?;
        if let Some(player) = entry.room.player_mut(player_id) {
            player.presence = Presence::Online;
        }
        Self::sync_turn_player(&mut entry, player_id);
        self.touch_activity(&mut entry, &room_id);

        let room_snapshot = entry.room.clone();
        let round_snapshot = entry.round.clone();
        let player = room_snapshot
            .player(player_id)
            .cloned()
            .ok_or(GameError::PlayerNotFound)?;
        drop(entry);

        info!(target: LOG_TARGET, room_id = %room_id, player_id, "session resumed");
        self.emit(StoreEvent::RoomState {
            room: room_snapshot.clone(),
        });
        Ok(ResumeOutcome {
            room: room_snapshot,
            round: round_snapshot,
            player,
            session,
        })
    }

    pub fn set_presence(
        self: &Arc<Self>,
        room_id: &str,
        player_id: PlayerId,
        presence: Presence,
    ) -> Result<Room, GameError> {
        let arc = self.entry(room_id)?;
        let mut entry = arc.lock();
        let player = entry
            .room
            .player_mut(player_id)
            .ok_or(GameError::PlayerNotFound)?;
        player.presence = presence;
        Self::sync_turn_player(&mut entry, player_id);
        self.touch_activity(&mut entry, room_id);
        let room_snapshot = entry.room.clone();
        drop(entry);
        self.emit(StoreEvent::RoomState {
            room: room_snapshot.clone(),
        });
        Ok(room_snapshot)
    }

    pub fn switch_admin(
        self: &Arc<Self>,
        room_id: &str,
        actor_id: PlayerId,
        target_id: PlayerId,
    ) -> Result<Room, GameError> {
        let arc = self.entry(room_id)?;
        let mut entry = arc.lock();
        if !entry.room.is_banker(actor_id) {
            return Err(GameError::Forbidden);
        }
        if actor_id == target_id {
            return Err(GameError::InvalidTarget);
        }
        let target = entry
            .room
            .player(target_id)
            .ok_or(GameError::PlayerNotFound)?;
        if target.is_banker() {
            return Err(GameError::InvalidTarget);
        }

        if let Some(actor) = entry.room.player_mut(actor_id) {
            actor.role = PlayerRole::Player;
        }
        if let Some(target) = entry.room.player_mut(target_id) {
            target.role = PlayerRole::Banker;
        }
        Self::sync_turn_player(&mut entry, actor_id);
        Self::sync_turn_player(&mut entry, target_id);
        self.touch_activity(&mut entry, room_id);

        let room_snapshot = entry.room.clone();
        let round_snapshot = entry.round.clone();
        drop(entry);

        info!(
            target: LOG_TARGET,
            room_id, actor_id, target_id, "banker role transferred"
        );
        self.emit(StoreEvent::RoomState {
            room: room_snapshot.clone(),
        });
        if let Some(round) = round_snapshot {
            self.emit(StoreEvent::RoundState { round });
        }
        Ok(room_snapshot)
    }

    pub fn kick_player(
        self: &Arc<Self>,
        room_id: &str,
        actor_id: PlayerId,
        target_id: PlayerId,
    ) -> Result<Room, GameError> {
        let arc = self.entry(room_id)?;
        let mut entry = arc.lock();
        if !entry.room.is_banker(actor_id) {
            return Err(GameError::Forbidden);
        }
        if actor_id == target_id {
            return Err(GameError::InvalidTarget);
        }
        let target = entry
            .room
            .player(target_id)
            .ok_or(GameError::PlayerNotFound)?;
        if target.is_banker() {
            return Err(GameError::InvalidTarget);
        }

        entry.room.forget_player(target_id);
        entry.room.wallets.remove(&target_id);
        entry.sessions.remove(target_id);

        if let Some(round) = entry.round.clone() {
            let mut next = round;
            if let Some(seat) = next.seat_index(target_id) {
                next.turns.remove(seat);
                match next.bank_lock.as_mut() {
                    Some(lock) if lock.player_id == target_id => next.bank_lock = None,
                    Some(lock) if lock.through_index > seat => lock.through_index -= 1,
                    _ => {}
                }
                round_engine::advance(&mut next);
                let settled = self.run_bank_machine(&mut entry.room, &mut next);
                self.commit_round(&mut entry, next, settled);
            }
        }

        self.touch_activity(&mut entry, room_id);
        let room_snapshot = entry.room.clone();
        drop(entry);

        info!(target: LOG_TARGET, room_id, actor_id, target_id, "player kicked");
        self.emit(StoreEvent::RoomState {
            room: room_snapshot.clone(),
        });
        Ok(room_snapshot)
    }

    pub fn leave_room(self: &Arc<Self>, room_id: &str, player_id: PlayerId) -> Result<(), GameError> {
        let arc = self.entry(room_id)?;
        let mut entry = arc.lock();
        let player = entry
            .room
            .player(player_id)
            .ok_or(GameError::PlayerNotFound)?;

        if player.is_banker() {
            if entry.room.players.len() > 1 {
                // The banker cannot abandon a seated table.
                return Err(GameError::Forbidden);
            }
            drop(entry);
            self.delete_room(room_id);
            return Ok(());
        }

        entry.room.forget_player(player_id);
        entry.sessions.remove(player_id);
        self.touch_activity(&mut entry, room_id);
        let room_snapshot = entry.room.clone();
        drop(entry);

        info!(target: LOG_TARGET, room_id, player_id, "player left");
        self.emit(StoreEvent::RoomState { room: room_snapshot });
        Ok(())
    }

    pub fn room_snapshot(&self, room_id: &str) -> Result<Room, GameError> {
        let room_id = room_id.trim().to_uppercase();
        let arc = self.entry(&room_id)?;
        let entry = arc.lock();
        Ok(entry.room.clone())
    }

    pub fn round_snapshot(&self, round_id: RoundId) -> Result<Round, GameError> {
        let room_id = self.room_of(round_id)?;
        let arc = self.entry(&room_id)?;
        let entry = arc.lock();
        entry
            .round
            .clone()
            .filter(|r| r.id == round_id)
            .ok_or(GameError::RoundNotFound)
    }

    // ---- rounds ---------------------------------------------------------

    pub fn start_round(
        self: &Arc<Self>,
        room_id: &str,
        deck_count: Option<u32>,
    ) -> Result<Round, GameError> {
        let arc = self.entry(room_id)?;
        let mut entry = arc.lock();

        let online: Vec<Player> = entry
            .room
            .players
            .iter()
            .filter(|p| p.presence == Presence::Online)
            .cloned()
            .collect();
        let mut participants = if online.is_empty() {
            entry.room.players.clone()
        } else {
            online
        };
        let banker = entry
            .room
            .banker()
            .cloned()
            .ok_or(GameError::NotEnoughPlayers)?;
        if !participants.iter().any(|p| p.id == banker.id) {
            participants.push(banker.clone());
        }

        let mut non_bankers: Vec<Player> =
            participants.iter().filter(|p| !p.is_banker()).cloned().collect();
        if non_bankers.is_empty() {
            return Err(GameError::NotEnoughPlayers);
        }

        let rotation = entry.room.seat_rotation_cursor % non_bankers.len();
        non_bankers.rotate_left(rotation);
        entry.room.seat_rotation_cursor =
            (entry.room.seat_rotation_cursor + 1) % non_bankers.len();

        let shoe_count = deck_count
            .unwrap_or_else(|| engine::default_shoe_count(non_bankers.len() + 1))
            .clamp(1, engine::MAX_SHOE_COUNT);
        let mut deck = engine::build_shoe(shoe_count);

        let mut turns: Vec<Turn> = Vec::with_capacity(non_bankers.len() + 1);
        for player in non_bankers {
            turns.push(Turn::new(player, deck.remove(0)));
        }
        turns.push(Turn::new(banker, deck.remove(0)));

        let round = Round {
            id: RoundId::new_v4(),
            room_id: room_id.to_string(),
            deck,
            turns,
            phase: RoundPhase::Playing,
            deck_count: shoe_count,
            round_number: entry.room.completed_rounds + 1,
            bank_lock: None,
            turn_timer: None,
        };

        if let Some(stale) = entry.round.take() {
            warn!(
                target: LOG_TARGET,
                room_id,
                round_id = %stale.id,
                "replacing unfinished round"
            );
            self.round_rooms.remove(&stale.id);
        }
        entry.room.round_id = Some(round.id);
        entry.room.waiting_player_ids.clear();
        self.round_rooms.insert(round.id, room_id.to_string());

        let snapshot = self.persist_round(&mut entry, round);
        self.touch_activity(&mut entry, room_id);
        let room_snapshot = entry.room.clone();
        drop(entry);

        info!(
            target: LOG_TARGET,
            room_id,
            round_id = %snapshot.id,
            round_number = snapshot.round_number,
            shoe_count,
            "round started"
        );
        self.emit(StoreEvent::RoomState { room: room_snapshot });
        Ok(snapshot)
    }

    pub fn apply_bet(
        self: &Arc<Self>,
        round_id: RoundId,
        player_id: PlayerId,
        amount: Chips,
        bank: bool,
    ) -> Result<Round, GameError> {
        let room_id = self.room_of(round_id)?;
        let arc = self.entry(&room_id)?;
        let mut entry = arc.lock();
        let round = entry
            .round
            .as_ref()
            .filter(|r| r.id == round_id)
            .ok_or(GameError::RoundNotFound)?;
        Self::gate_bank(round, player_id, TurnCmd::Bet)?;
        if amount <= 0 {
            return Err(GameError::InvalidBet);
        }
        let turn = round.turn(player_id).ok_or(GameError::TurnNotFound)?;
        let is_banker = turn.is_banker();
        let wallet = entry.room.wallet(player_id);
        if turn.bet + amount > wallet {
            return Err(GameError::InsufficientFunds);
        }

        let mut open_lock = None;
        if !is_banker {
            let seat = round.seat_index(player_id).ok_or(GameError::TurnNotFound)?;
            let available = Self::bank_window(round, &entry.room, seat);
            if available <= 0 {
                return Err(GameError::BankEmpty);
            }
            let new_bet = turn.bet + amount;
            if new_bet > available {
                return Err(GameError::BankLimit(available));
            }
            if bank && new_bet != available {
                return Err(GameError::InvalidBankAmount);
            }
            if bank || new_bet == available {
                open_lock = Some(BankLock {
                    player_id,
                    stage: BankStage::Player,
                    exposure: available,
                    through_index: seat,
                    initiated_at: epoch_ms(SystemTime::now()),
                });
            }
        }

        let mut next = round.clone();
        RoundEngine::bet(&mut next, player_id, amount)?;
        if let Some(lock) = open_lock {
            if next.phase != RoundPhase::Terminate {
                if bank {
                    if let Some(turn) = next.turn_mut(player_id) {
                        turn.bank_request = Some(true);
                    }
                }
                next.bank_lock = Some(lock);
            }
        }
        let settled = self.run_bank_machine(&mut entry.room, &mut next);
        let snapshot = self.commit_round(&mut entry, next, settled);
        self.touch_activity(&mut entry, &room_id);
        Ok(snapshot)
    }

    pub fn apply_hit(
        self: &Arc<Self>,
        round_id: RoundId,
        player_id: PlayerId,
        eleveroon: bool,
    ) -> Result<Round, GameError> {
        self.turn_action(round_id, player_id, TurnCmd::Hit, |next| {
            RoundEngine::hit(next, player_id, eleveroon).map(|_| ())
        })
    }

    pub fn apply_stand(
        self: &Arc<Self>,
        round_id: RoundId,
        player_id: PlayerId,
    ) -> Result<Round, GameError> {
        self.turn_action(round_id, player_id, TurnCmd::Stand, |next| {
            RoundEngine::stand(next, player_id).map(|_| ())
        })
    }

    pub fn apply_skip(
        self: &Arc<Self>,
        round_id: RoundId,
        actor_id: PlayerId,
        target_id: PlayerId,
    ) -> Result<Round, GameError> {
        let room_id = self.room_of(round_id)?;
        let arc = self.entry(&room_id)?;
        let mut entry = arc.lock();
        let round = entry
            .round
            .as_ref()
            .filter(|r| r.id == round_id)
            .ok_or(GameError::RoundNotFound)?;
        if target_id != actor_id && !entry.room.is_banker(actor_id) {
            return Err(GameError::Forbidden);
        }
        Self::gate_bank(round, target_id, TurnCmd::Skip)?;

        let mut next = round.clone();
        RoundEngine::skip(&mut next, target_id)?;
        let settled = self.run_bank_machine(&mut entry.room, &mut next);
        let snapshot = self.commit_round(&mut entry, next, settled);
        self.touch_activity(&mut entry, &room_id);
        Ok(snapshot)
    }

    fn turn_action(
        self: &Arc<Self>,
        round_id: RoundId,
        player_id: PlayerId,
        cmd: TurnCmd,
        apply: impl FnOnce(&mut Round) -> Result<(), GameError>,
    ) -> Result<Round, GameError> {
        let room_id = self.room_of(round_id)?;
        let arc = self.entry(&room_id)?;
        let mut entry = arc.lock();
        let round = entry
            .round
            .as_ref()
            .filter(|r| r.id == round_id)
            .ok_or(GameError::RoundNotFound)?;
        Self::gate_bank(round, player_id, cmd)?;

        let mut next = round.clone();
        apply(&mut next)?;
        let settled = self.run_bank_machine(&mut entry.room, &mut next);
        let snapshot = self.commit_round(&mut entry, next, settled);
        self.touch_activity(&mut entry, &room_id);
        Ok(snapshot)
    }

    pub fn end_round_after_bank_decision(
        self: &Arc<Self>,
        room_id: &str,
        actor_id: PlayerId,
    ) -> Result<Round, GameError> {
        let arc = self.entry(room_id)?;
        let mut entry = arc.lock();
        if !entry.room.is_banker(actor_id) {
            return Err(GameError::Forbidden);
        }
        let round = entry.round.as_ref().ok_or(GameError::RoundNotFound)?;
        if round.bank_lock.as_ref().map(|l| l.stage) != Some(BankStage::Decision) {
            return Err(GameError::BankNotInDecision);
        }

        let mut next = round.clone();
        next.bank_lock = None;
        for turn in next.turns.iter_mut() {
            if !turn.is_banker()
                && matches!(turn.state, TurnState::Pending | TurnState::Standby)
            {
                turn.state = TurnState::Skipped;
            }
        }
        round_engine::advance(&mut next);

        self.emit(StoreEvent::BankerEnded {
            room_id: room_id.to_string(),
            round: next.clone(),
        });
        let snapshot = self.commit_round(&mut entry, next, false);
        self.touch_activity(&mut entry, room_id);

        info!(target: LOG_TARGET, room_id, actor_id, "round ended after bank decision");
        Ok(snapshot)
    }

    // ---- requests and approvals ----------------------------------------

    pub fn request_rename(
        self: &Arc<Self>,
        room_id: &str,
        player_id: PlayerId,
        first_name: &str,
        last_name: &str,
    ) -> Result<Room, GameError> {
        self.mutate_room(room_id, |room| {
            let player = room.player(player_id).ok_or(GameError::PlayerNotFound)?;
            if player.is_banker() {
                return Err(GameError::Forbidden);
            }
            if room.rename_blocked_ids.contains(&player_id) {
                return Err(GameError::RenameBlocked);
            }
            room.rename_requests.insert(
                player_id,
                RenameRequest {
                    first_name: sanitize_name(first_name),
                    last_name: sanitize_name(last_name),
                },
            );
            Ok(())
        })
    }

    pub fn cancel_rename(
        self: &Arc<Self>,
        room_id: &str,
        player_id: PlayerId,
    ) -> Result<Room, GameError> {
        self.mutate_room(room_id, |room| {
            room.rename_requests
                .remove(&player_id)
                .map(|_| ())
                .ok_or(GameError::RequestNotFound)
        })
    }

    pub fn approve_rename(
        self: &Arc<Self>,
        room_id: &str,
        actor_id: PlayerId,
        target_id: PlayerId,
    ) -> Result<Room, GameError> {
        let arc = self.entry(room_id)?;
        let mut entry = arc.lock();
        if !entry.room.is_banker(actor_id) {
            return Err(GameError::Forbidden);
        }
        let request = entry
            .room
            .rename_requests
            .remove(&target_id)
            .ok_or(GameError::RequestNotFound)?;
        let player = entry
            .room
            .player_mut(target_id)
            .ok_or(GameError::PlayerNotFound)?;
        player.first_name = request.first_name;
        player.last_name = request.last_name;
        Self::sync_turn_player(&mut entry, target_id);
        self.touch_activity(&mut entry, room_id);

        let room_snapshot = entry.room.clone();
        let round_snapshot = entry.round.clone();
        drop(entry);

        self.emit(StoreEvent::RoomState {
            room: room_snapshot.clone(),
        });
        if let Some(round) = round_snapshot {
            self.emit(StoreEvent::RoundState { round });
        }
        Ok(room_snapshot)
    }

    pub fn reject_rename(
        self: &Arc<Self>,
        room_id: &str,
        actor_id: PlayerId,
        target_id: PlayerId,
    ) -> Result<Room, GameError> {
        self.banker_mutate_room(room_id, actor_id, |room| {
            room.rename_requests
                .remove(&target_id)
                .map(|_| ())
                .ok_or(GameError::RequestNotFound)
        })
    }

    pub fn set_rename_block(
        self: &Arc<Self>,
        room_id: &str,
        actor_id: PlayerId,
        target_id: PlayerId,
        block: bool,
    ) -> Result<Room, GameError> {
        self.banker_mutate_room(room_id, actor_id, |room| {
            if room.player(target_id).is_none() {
                return Err(GameError::PlayerNotFound);
            }
            if block {
                room.rename_blocked_ids.insert(target_id);
                room.rename_requests.remove(&target_id);
            } else {
                room.rename_blocked_ids.remove(&target_id);
            }
            Ok(())
        })
    }

    pub fn request_buy_in(
        self: &Arc<Self>,
        room_id: &str,
        player_id: PlayerId,
        amount: Chips,
        note: Option<&str>,
    ) -> Result<Room, GameError> {
        self.mutate_room(room_id, |room| {
            let player = room.player(player_id).ok_or(GameError::PlayerNotFound)?;
            if player.is_banker() {
                return Err(GameError::Forbidden);
            }
            if room.buy_in_blocked_ids.contains(&player_id) {
                return Err(GameError::BuyinBlocked);
            }
            if amount <= 0 {
                return Err(GameError::InvalidPayload);
            }
            room.buy_in_requests.insert(
                player_id,
                BuyInRequest {
                    amount,
                    note: note.map(sanitize_note).filter(|n| !n.is_empty()),
                },
            );
            Ok(())
        })
    }

    pub fn cancel_buy_in(
        self: &Arc<Self>,
        room_id: &str,
        player_id: PlayerId,
    ) -> Result<Room, GameError> {
        self.mutate_room(room_id, |room| {
            room.buy_in_requests
                .remove(&player_id)
                .map(|_| ())
                .ok_or(GameError::RequestNotFound)
        })
    }

    pub fn approve_buy_in(
        self: &Arc<Self>,
        room_id: &str,
        actor_id: PlayerId,
        target_id: PlayerId,
    ) -> Result<Room, GameError> {
        self.banker_mutate_room(room_id, actor_id, |room| {
            let request = room
                .buy_in_requests
                .remove(&target_id)
                .ok_or(GameError::RequestNotFound)?;
            if room.player(target_id).is_none() {
                return Err(GameError::PlayerNotFound);
            }
            *room.wallets.entry(target_id).or_insert(0) += request.amount;
            info!(
                target: LOG_TARGET,
                room_id = %room.id,
                target_id,
                amount = request.amount,
                "buy-in approved"
            );
            Ok(())
        })
    }

    pub fn reject_buy_in(
        self: &Arc<Self>,
        room_id: &str,
        actor_id: PlayerId,
        target_id: PlayerId,
    ) -> Result<Room, GameError> {
        self.banker_mutate_room(room_id, actor_id, |room| {
            room.buy_in_requests
                .remove(&target_id)
                .map(|_| ())
                .ok_or(GameError::RequestNotFound)
        })
    }

    pub fn set_buy_in_block(
        self: &Arc<Self>,
        room_id: &str,
        actor_id: PlayerId,
        target_id: PlayerId,
        block: bool,
    ) -> Result<Room, GameError> {
        self.banker_mutate_room(room_id, actor_id, |room| {
            if room.player(target_id).is_none() {
                return Err(GameError::PlayerNotFound);
            }
            if block {
                room.buy_in_blocked_ids.insert(target_id);
                room.buy_in_requests.remove(&target_id);
            } else {
                room.buy_in_blocked_ids.remove(&target_id);
            }
            Ok(())
        })
    }

    pub fn top_up_banker(
        self: &Arc<Self>,
        room_id: &str,
        actor_id: PlayerId,
        amount: Chips,
        note: Option<&str>,
    ) -> Result<Room, GameError> {
        let arc = self.entry(room_id)?;
        let mut entry = arc.lock();
        if !entry.room.is_banker(actor_id) {
            return Err(GameError::Forbidden);
        }
        if amount == 0 {
            return Err(GameError::InvalidTarget);
        }
        let balance = entry.room.wallet(actor_id) + amount;
        if balance < 0 {
            return Err(GameError::InsufficientBank);
        }
        entry.room.wallets.insert(actor_id, balance);
        let note = note.map(sanitize_note).filter(|n| !n.is_empty());

        info!(
            target: LOG_TARGET,
            room_id,
            actor_id,
            amount,
            note = note.as_deref().unwrap_or(""),
            "banker wallet topped up"
        );

        // A solvent bank resumes a round parked on the bank decision.
        if balance > 0 {
            if let Some(round) = entry.round.clone() {
                if round.bank_lock.as_ref().map(|l| l.stage) == Some(BankStage::Decision) {
                    let mut next = round;
                    Self::resume_bank(&mut next);
                    self.commit_round(&mut entry, next, false);
                }
            }
        }

        self.touch_activity(&mut entry, room_id);
        let room_snapshot = entry.room.clone();
        drop(entry);

        self.emit(StoreEvent::BankerTopUp {
            room_id: room_id.to_string(),
            player_id: actor_id,
            amount,
            note,
        });
        self.emit(StoreEvent::RoomState {
            room: room_snapshot.clone(),
        });
        Ok(room_snapshot)
    }

    pub fn adjust_player_wallet(
        self: &Arc<Self>,
        room_id: &str,
        actor_id: PlayerId,
        target_id: PlayerId,
        amount: Chips,
        note: Option<&str>,
    ) -> Result<Room, GameError> {
        let arc = self.entry(room_id)?;
        let mut entry = arc.lock();
        if !entry.room.is_banker(actor_id) {
            return Err(GameError::Forbidden);
        }
        if amount == 0 {
            return Err(GameError::InvalidTarget);
        }
        if entry.room.player(target_id).is_none() {
            return Err(GameError::PlayerNotFound);
        }
        let balance = entry.room.wallet(target_id) + amount;
        if balance < 0 {
            return Err(GameError::InsufficientFunds);
        }
        entry.room.wallets.insert(target_id, balance);
        let note = note.map(sanitize_note).filter(|n| !n.is_empty());

        info!(
            target: LOG_TARGET,
            room_id,
            actor_id,
            target_id,
            amount,
            note = note.as_deref().unwrap_or(""),
            "player wallet adjusted"
        );

        self.touch_activity(&mut entry, room_id);
        let room_snapshot = entry.room.clone();
        drop(entry);

        self.emit(StoreEvent::BankAdjusted {
            room_id: room_id.to_string(),
            player_id: target_id,
            amount,
            note,
        });
        self.emit(StoreEvent::RoomState {
            room: room_snapshot.clone(),
        });
        Ok(room_snapshot)
    }

    // ---- internals ------------------------------------------------------

    fn mutate_room(
        self: &Arc<Self>,
        room_id: &str,
        f: impl FnOnce(&mut Room) -> Result<(), GameError>,
    ) -> Result<Room, GameError> {
        let arc = self.entry(room_id)?;
        let mut entry = arc.lock();
        f(&mut entry.room)?;
        self.touch_activity(&mut entry, room_id);
        let room_snapshot = entry.room.clone();
        drop(entry);
        self.emit(StoreEvent::RoomState {
            room: room_snapshot.clone(),
        });
        Ok(room_snapshot)
    }

    fn banker_mutate_room(
        self: &Arc<Self>,
        room_id: &str,
        actor_id: PlayerId,
        f: impl FnOnce(&mut Room) -> Result<(), GameError>,
    ) -> Result<Room, GameError> {
        self.mutate_room(room_id, |room| {
            if !room.is_banker(actor_id) {
                return Err(GameError::Forbidden);
            }
            f(room)
        })
    }

    fn sync_turn_player(entry: &mut RoomEntry, player_id: PlayerId) {
        let Some(player) = entry.room.player(player_id).cloned() else {
            return;
        };
        if let Some(round) = entry.round.as_mut() {
            if let Some(turn) = round.turn_mut(player_id) {
                turn.player = player;
            }
        }
    }

    fn gate_bank(round: &Round, player_id: PlayerId, cmd: TurnCmd) -> Result<(), GameError> {
        let Some(lock) = &round.bank_lock else {
            return Ok(());
        };
        match lock.stage {
            BankStage::Player => {
                if cmd == TurnCmd::Skip || player_id != lock.player_id {
                    Err(GameError::BankLocked)
                } else {
                    Ok(())
                }
            }
            BankStage::Banker => {
                if round.banker().map(|t| t.player.id) == Some(player_id) {
                    Ok(())
                } else {
                    Err(GameError::BankLocked)
                }
            }
            BankStage::Decision => Err(GameError::BankerDeciding),
        }
    }

    /// Maximum solvent wager for the seat at `seat_index`: the banker's
    /// wallet minus the live stakes of every earlier non-banker seat.
    fn bank_window(round: &Round, room: &Room, seat_index: usize) -> Chips {
        let Some(banker_id) = round.banker().map(|t| t.player.id) else {
            return 0;
        };
        let committed: Chips = round
            .turns
            .iter()
            .take(seat_index)
            .filter(|t| {
                !t.is_banker()
                    && t.state != TurnState::Lost
                    && t.state != TurnState::Skipped
            })
            .map(|t| t.bet)
            .sum();
        (room.wallet(banker_id) - committed).max(0)
    }

    /// Drive the BANK! showdown after a turn action. Returns true when
    /// wallets changed (interim settlement ran).
    fn run_bank_machine(&self, room: &mut Room, round: &mut Round) -> bool {
        let Some(lock) = round.bank_lock.clone() else {
            return false;
        };
        match lock.stage {
            BankStage::Player => {
                match round.turn(lock.player_id).map(|t| t.state) {
                    Some(TurnState::Pending) => {}
                    Some(TurnState::Lost) | None => {
                        // A busted challenger releases the table unchanged.
                        round.bank_lock = None;
                        round_engine::advance(round);
                    }
                    _ => {
                        if let Some(lock) = round.bank_lock.as_mut() {
                            lock.stage = BankStage::Banker;
                        }
                    }
                }
                false
            }
            BankStage::Banker => {
                if round.banker().map(|t| t.state) == Some(TurnState::Pending) {
                    return false;
                }
                self.settle_bank(room, round, &lock);
                true
            }
            BankStage::Decision => false,
        }
    }

    /// Interim settlement: resolve every seat up to the challenger against
    /// the banker's final hand, pay out immediately, then either resume the
    /// round on a solvent bank or park it on the bank decision.
    fn settle_bank(&self, room: &mut Room, round: &mut Round, lock: &BankLock) {
        let Some(banker_turn) = round.banker() else {
            return;
        };
        let banker_id = banker_turn.player.id;
        let banker_cards = banker_turn.cards.clone();
        let banker_busted = hand::classify(&banker_cards) == HandOutcome::Lost;
        let banker_best = hand::best_total(&banker_cards);

        let mut entries = Vec::new();
        for (seat, turn) in round.turns.iter_mut().enumerate() {
            if turn.is_banker() || seat > lock.through_index {
                continue;
            }
            if matches!(turn.state, TurnState::Skipped | TurnState::Pending) {
                continue;
            }
            let state = match hand::classify(&turn.cards) {
                HandOutcome::Won => TurnState::Won,
                HandOutcome::Lost => TurnState::Lost,
                HandOutcome::Pending => {
                    if turn.state == TurnState::Standby {
                        if banker_busted || hand::best_total(&turn.cards) > banker_best {
                            TurnState::Won
                        } else {
                            TurnState::Lost
                        }
                    } else {
                        turn.state
                    }
                }
            };
            turn.state = state;
            let net = match state {
                TurnState::Won => turn.bet,
                TurnState::Lost => -turn.bet,
                _ => 0,
            };
            if turn.bet > 0 {
                let entry = match state {
                    TurnState::Won => Some(BalanceEntry {
                        amount: turn.bet,
                        payer: banker_id,
                        payee: turn.player.id,
                    }),
                    TurnState::Lost => Some(BalanceEntry {
                        amount: turn.bet,
                        payer: turn.player.id,
                        payee: banker_id,
                    }),
                    _ => None,
                };
                entries.extend(entry);
            }
            turn.settled_bet = Some(turn.bet);
            turn.settled_net = Some(net);
            turn.bet = 0;
        }

        Self::apply_balance_entries(room, &entries);
        info!(
            target: LOG_TARGET,
            room_id = %room.id,
            round_id = %round.id,
            challenger = lock.player_id,
            settled = entries.len(),
            bank = room.wallet(banker_id),
            "bank showdown settled"
        );

        if room.wallet(banker_id) > 0 {
            Self::resume_bank(round);
        } else if let Some(lock) = round.bank_lock.as_mut() {
            lock.stage = BankStage::Decision;
        }
    }

    /// Clear the lock and hand the banker a fresh single-card hand so the
    /// main round can continue.
    fn resume_bank(round: &mut Round) {
        round.bank_lock = None;
        if !round.deck.is_empty() {
            let card = round.deck.remove(0);
            if let Some(banker) = round.banker_mut() {
                banker.cards = vec![card];
                banker.state = TurnState::Pending;
                banker.bet = 0;
            }
        }
        round_engine::advance(round);
    }

    fn apply_balance_entries(room: &mut Room, entries: &[BalanceEntry]) {
        for entry in entries {
            *room.wallets.entry(entry.payer).or_insert(0) -= entry.amount;
            *room.wallets.entry(entry.payee).or_insert(0) += entry.amount;
        }
        // Newest first, one batch, engine order preserved within the batch.
        room.balance_ledger.splice(0..0, entries.iter().cloned());
    }

    /// Commit a mutated round: finalize it when terminated, otherwise
    /// persist it and keep the turn timer in step.
    fn commit_round(
        self: &Arc<Self>,
        entry: &mut RoomEntry,
        mut next: Round,
        wallets_changed: bool,
    ) -> Round {
        if next.phase == RoundPhase::Terminate {
            let balances = round_engine::balances(&next.turns);
            Self::apply_balance_entries(&mut entry.room, &balances);
            entry.room.completed_rounds += 1;
            entry.room.round_id = None;
            if let Some(timer) = entry.turn_timer.take() {
                timer.handle.abort();
            }
            next.turn_timer = None;
            self.round_rooms.remove(&next.id);
            entry.round = None;

            info!(
                target: LOG_TARGET,
                room_id = %entry.room.id,
                round_id = %next.id,
                entries = balances.len(),
                "round finalized"
            );
            self.emit(StoreEvent::RoomState {
                room: entry.room.clone(),
            });
            self.emit(StoreEvent::RoundEnded {
                room_id: entry.room.id.clone(),
                round: next.clone(),
                balances,
            });
            next
        } else {
            if wallets_changed {
                self.emit(StoreEvent::RoomState {
                    room: entry.room.clone(),
                });
            }
            self.persist_round(entry, next)
        }
    }

    /// Store the round, reschedule the turn timer if the active seat moved,
    /// and broadcast the new state.
    fn persist_round(self: &Arc<Self>, entry: &mut RoomEntry, mut next: Round) -> Round {
        let candidate = next
            .active_player()
            .and_then(|pid| next.turn(pid))
            .filter(|t| !t.is_banker() && t.state == TurnState::Pending)
            .map(|t| t.player.id);

        match candidate {
            Some(player_id) => {
                let retained = entry
                    .turn_timer
                    .as_ref()
                    .filter(|t| t.round_id == next.id && t.player_id == player_id)
                    .map(|t| t.expires_at_ms);
                let expires_at_ms = match retained {
                    Some(expiry) => expiry,
                    None => {
                        if let Some(timer) = entry.turn_timer.take() {
                            timer.handle.abort();
                        }
                        let expires_at_ms =
                            epoch_ms(SystemTime::now() + TURN_TIMER_DURATION);
                        let store = Arc::clone(self);
                        let round_id = next.id;
                        let handle = tokio::spawn(async move {
                            tokio::time::sleep(TURN_TIMER_DURATION).await;
                            store.auto_stand(round_id, player_id);
                        });
                        entry.turn_timer = Some(TurnTimerTask {
                            round_id,
                            player_id,
                            expires_at_ms,
                            handle,
                        });
                        expires_at_ms
                    }
                };
                next.turn_timer = Some(TurnTimer {
                    player_id,
                    expires_at: expires_at_ms,
                    duration: TURN_TIMER_DURATION.as_millis() as u64,
                });
            }
            None => {
                if let Some(timer) = entry.turn_timer.take() {
                    timer.handle.abort();
                }
                next.turn_timer = None;
            }
        }

        entry.round = Some(next.clone());
        self.emit(StoreEvent::RoundState {
            round: next.clone(),
        });
        next
    }

    /// Turn-timer expiry: stand the seat that is still holding the table.
    fn auto_stand(self: &Arc<Self>, round_id: RoundId, player_id: PlayerId) {
        let Ok(room_id) = self.room_of(round_id) else {
            return;
        };
        let Ok(arc) = self.entry(&room_id) else {
            return;
        };
        let mut entry = arc.lock();
        let Some(round) = entry.round.as_ref().filter(|r| r.id == round_id) else {
            return;
        };
        if round.active_player() != Some(player_id) {
            return;
        }
        let Some(turn) = round.turn(player_id) else {
            return;
        };
        if turn.is_banker() || turn.state != TurnState::Pending {
            return;
        }

        let mut next = round.clone();
        if let Err(err) = RoundEngine::stand(&mut next, player_id) {
            warn!(
                target: LOG_TARGET,
                room_id = %room_id,
                player_id,
                error = %err,
                "auto-stand failed"
            );
            return;
        }
        info!(
            target: LOG_TARGET,
            room_id = %room_id,
            round_id = %round_id,
            player_id,
            "turn timer expired, standing player"
        );
        let settled = self.run_bank_machine(&mut entry.room, &mut next);
        self.commit_round(&mut entry, next, settled);
        self.touch_activity(&mut entry, &room_id);
    }

    /// Restart the room's inactivity countdown.
    fn touch_activity(self: &Arc<Self>, entry: &mut RoomEntry, room_id: &str) {
        if let Some(handle) = entry.inactivity.take() {
            handle.abort();
        }
        let store = Arc::clone(self);
        let room_id = room_id.to_string();
        entry.inactivity = Some(tokio::spawn(async move {
            tokio::time::sleep(INACTIVITY_TIMEOUT).await;
            info!(target: LOG_TARGET, room_id = %room_id, "room expired after inactivity");
            store.delete_room(&room_id);
        }));
    }

    #[cfg(test)]
    pub(crate) fn with_round_mut<R>(
        &self,
        round_id: RoundId,
        f: impl FnOnce(&mut Round) -> R,
    ) -> Option<R> {
        let room_id = self.room_of(round_id).ok()?;
        let arc = self.entry(&room_id).ok()?;
        let mut entry = arc.lock();
        entry.round.as_mut().filter(|r| r.id == round_id).map(f)
    }

    fn delete_room(&self, room_id: &str) {
        if let Some((_, arc)) = self.rooms.remove(room_id) {
            let mut entry = arc.lock();
            entry.abort_timers();
            if let Some(round) = entry.round.take() {
                self.round_rooms.remove(&round.id);
            }
            info!(target: LOG_TARGET, room_id, "room deleted");
        }
    }
}
