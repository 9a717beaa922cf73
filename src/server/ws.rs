use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::AuditSink;
use crate::engine::{GameError, PlayerId, Presence};
use crate::store::{CreateRoomInput, GameStore, JoinRoomInput};

use super::protocol::*;

const LOG_TARGET: &str = "kvitlach::server::ws";

/// Per-socket metadata plus its outbound queue. The queue decouples game
/// handling from socket backpressure.
struct ConnHandle {
    room_id: Option<String>,
    player_id: Option<PlayerId>,
    audit_id: Option<i64>,
    tx: mpsc::UnboundedSender<Message>,
}

pub struct WsState {
    store: Arc<GameStore>,
    audit: Arc<dyn AuditSink>,
    connections: DashMap<Uuid, ConnHandle>,
}

impl WsState {
    pub fn new(store: Arc<GameStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            audit,
            connections: DashMap::new(),
        }
    }

    fn binding(&self, conn_id: Uuid) -> Option<(String, PlayerId)> {
        let conn = self.connections.get(&conn_id)?;
        Some((conn.room_id.clone()?, conn.player_id?))
    }

    fn bind(&self, conn_id: Uuid, room_id: &str, player_id: PlayerId) {
        if let Some(mut conn) = self.connections.get_mut(&conn_id) {
            conn.room_id = Some(room_id.to_string());
            conn.player_id = Some(player_id);
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WsState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let ip = client_ip(&headers, addr);
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    ws.on_upgrade(move |socket| handle_socket(socket, state, ip, user_agent))
}

/// Prefer the first `X-Forwarded-For` hop when a proxy fronts the server.
fn client_ip(headers: &HeaderMap, addr: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| addr.ip().to_string())
}

async fn handle_socket(socket: WebSocket, state: Arc<WsState>, ip: String, user_agent: String) {
    let conn_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    state.connections.insert(
        conn_id,
        ConnHandle {
            room_id: None,
            player_id: None,
            audit_id: None,
            tx: tx.clone(),
        },
    );
    debug!(target: LOG_TARGET, %conn_id, %ip, "socket connected");

    let write_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    // Forward store broadcasts for the room this socket is bound to.
    let broadcast_task = {
        let state = Arc::clone(&state);
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut events = state.store.subscribe();
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let bound = state
                            .connections
                            .get(&conn_id)
                            .and_then(|c| c.room_id.clone());
                        if bound.as_deref() == Some(event.room_id()) {
                            send_envelope(&tx, &ServerEnvelope::from_event(&event));
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(target: LOG_TARGET, %conn_id, skipped, "socket lagged behind broadcasts");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    };

    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => {
                handle_frame(&state, conn_id, &ip, &user_agent, &text, &tx).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    write_task.abort();
    broadcast_task.abort();
    on_disconnect(&state, conn_id).await;
}

fn send_envelope(tx: &mpsc::UnboundedSender<Message>, envelope: &ServerEnvelope) {
    if let Ok(json) = serde_json::to_string(envelope) {
        let _ = tx.send(Message::Text(json));
    }
}

async fn handle_frame(
    state: &Arc<WsState>,
    conn_id: Uuid,
    ip: &str,
    user_agent: &str,
    text: &str,
    tx: &mpsc::UnboundedSender<Message>,
) {
    let envelope: ClientEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(_) => {
            send_envelope(tx, &ServerEnvelope::error(None, &GameError::InvalidJson));
            return;
        }
    };
    let request_id = envelope.request_id.clone();

    match dispatch(state, conn_id, ip, user_agent, envelope).await {
        Ok(payload) => send_envelope(tx, &ServerEnvelope::ack(request_id, payload)),
        Err(err) => {
            debug!(target: LOG_TARGET, %conn_id, error = %err, "command rejected");
            send_envelope(tx, &ServerEnvelope::error(request_id, &err));
        }
    }

    // Write-through activity stamp; never on the game path.
    if state.audit.is_enabled() {
        let audit_id = state.connections.get(&conn_id).and_then(|c| c.audit_id);
        if let Some(audit_id) = audit_id {
            let audit = Arc::clone(&state.audit);
            tokio::spawn(async move { audit.record_activity(audit_id).await });
        }
    }
}

fn parse<T: DeserializeOwned>(payload: Option<Value>) -> Result<T, GameError> {
    serde_json::from_value(payload.unwrap_or(Value::Null)).map_err(|_| GameError::InvalidPayload)
}

fn bound(state: &WsState, conn_id: Uuid) -> Result<(String, PlayerId), GameError> {
    state.binding(conn_id).ok_or(GameError::InvalidSession)
}

/// Resolve the acting seat for a turn command: the payload may restate the
/// caller's own id but may not impersonate another seat.
fn own_seat(bound_player: PlayerId, requested: Option<PlayerId>) -> Result<PlayerId, GameError> {
    match requested {
        Some(requested) if requested != bound_player => Err(GameError::Forbidden),
        _ => Ok(bound_player),
    }
}

async fn dispatch(
    state: &Arc<WsState>,
    conn_id: Uuid,
    ip: &str,
    user_agent: &str,
    envelope: ClientEnvelope,
) -> Result<AckPayload, GameError> {
    let store = &state.store;
    match envelope.kind.as_str() {
        "room:create" => {
            let p: RoomCreatePayload = parse(envelope.payload)?;
            let out = store.create_room(CreateRoomInput {
                first_name: p.first_name,
                last_name: p.last_name.unwrap_or_default(),
                room_name: p.room_name,
                password: p.password,
                buy_in: p.buy_in,
                room_id: p.room_id,
                banker_bankroll: p.banker_bankroll,
            })?;
            attach(state, conn_id, &out.room.id, out.player.id, ip, user_agent).await;
            Ok(AckPayload {
                room: Some(out.room),
                player: Some(out.player),
                session: Some(out.session),
                ..Default::default()
            })
        }
        "room:join" => {
            let p: RoomJoinPayload = parse(envelope.payload)?;
            let out = store.join_room(
                &p.room_id,
                JoinRoomInput {
                    first_name: p.first_name,
                    last_name: p.last_name.unwrap_or_default(),
                    password: p.password,
                },
            )?;
            attach(state, conn_id, &out.room.id, out.player.id, ip, user_agent).await;
            Ok(AckPayload {
                room: Some(out.room),
                player: Some(out.player),
                session: Some(out.session),
                ..Default::default()
            })
        }
        "room:resume" => {
            let p: RoomResumePayload = parse(envelope.payload)?;
            let out = store.resume_player(&p.room_id, p.player_id, &p.token)?;
            attach(state, conn_id, &out.room.id, out.player.id, ip, user_agent).await;
            Ok(AckPayload {
                room: Some(out.room),
                round: out.round,
                player: Some(out.player),
                session: Some(out.session),
                ..Default::default()
            })
        }
        "room:get" => {
            let p: RoomGetPayload = parse(envelope.payload)?;
            let room = store.room_snapshot(&p.room_id)?;
            Ok(AckPayload {
                room: Some(room),
                ..Default::default()
            })
        }
        "room:switch-admin" => {
            let p: SwitchAdminPayload = parse(envelope.payload)?;
            let (room_id, player_id) = bound(state, conn_id)?;
            let room = store.switch_admin(&room_id, player_id, p.target_player_id)?;
            Ok(AckPayload {
                room: Some(room),
                ..Default::default()
            })
        }
        "round:start" => {
            let p: RoundStartPayload = parse(envelope.payload)?;
            let round = store.start_round(&p.room_id.trim().to_uppercase(), p.deck_count)?;
            Ok(AckPayload {
                round: Some(round),
                ..Default::default()
            })
        }
        "round:get" => {
            let p: RoundGetPayload = parse(envelope.payload)?;
            let round = store.round_snapshot(p.round_id)?;
            Ok(AckPayload {
                round: Some(round),
                ..Default::default()
            })
        }
        "round:banker-end" => {
            let (room_id, player_id) = bound(state, conn_id)?;
            let round = store.end_round_after_bank_decision(&room_id, player_id)?;
            Ok(AckPayload {
                round: Some(round),
                ..Default::default()
            })
        }
        "turn:bet" => {
            let p: TurnBetPayload = parse(envelope.payload)?;
            let (_, bound_player) = bound(state, conn_id)?;
            let player_id = own_seat(bound_player, p.player_id)?;
            let round =
                store.apply_bet(p.round_id, player_id, p.amount, p.bank.unwrap_or(false))?;
            Ok(AckPayload {
                round: Some(round),
                ..Default::default()
            })
        }
        "turn:hit" => {
            let p: TurnHitPayload = parse(envelope.payload)?;
            let (_, bound_player) = bound(state, conn_id)?;
            let player_id = own_seat(bound_player, p.player_id)?;
            let round = store.apply_hit(p.round_id, player_id, p.eleveroon.unwrap_or(false))?;
            Ok(AckPayload {
                round: Some(round),
                ..Default::default()
            })
        }
        "turn:stand" => {
            let p: TurnStandPayload = parse(envelope.payload)?;
            let (_, bound_player) = bound(state, conn_id)?;
            let player_id = own_seat(bound_player, p.player_id)?;
            let round = store.apply_stand(p.round_id, player_id)?;
            Ok(AckPayload {
                round: Some(round),
                ..Default::default()
            })
        }
        "turn:skip" => {
            let p: TurnSkipPayload = parse(envelope.payload)?;
            let (_, bound_player) = bound(state, conn_id)?;
            if matches!(p.actor_id, Some(actor) if actor != bound_player) {
                return Err(GameError::Forbidden);
            }
            let target = p.player_id.unwrap_or(bound_player);
            let round = store.apply_skip(p.round_id, bound_player, target)?;
            Ok(AckPayload {
                round: Some(round),
                ..Default::default()
            })
        }
        "player:rename-request" => {
            let p: RenameRequestPayload = parse(envelope.payload)?;
            let (room_id, player_id) = bound(state, conn_id)?;
            let room = store.request_rename(
                &room_id,
                player_id,
                &p.first_name,
                p.last_name.as_deref().unwrap_or_default(),
            )?;
            Ok(AckPayload {
                room: Some(room),
                ..Default::default()
            })
        }
        "player:rename-cancel" => {
            let (room_id, player_id) = bound(state, conn_id)?;
            let room = store.cancel_rename(&room_id, player_id)?;
            Ok(AckPayload {
                room: Some(room),
                ..Default::default()
            })
        }
        "player:rename-approve" => {
            let p: PlayerTargetPayload = parse(envelope.payload)?;
            let (room_id, player_id) = bound(state, conn_id)?;
            let room = store.approve_rename(&room_id, player_id, p.player_id)?;
            Ok(AckPayload {
                room: Some(room),
                ..Default::default()
            })
        }
        "player:rename-reject" => {
            let p: PlayerTargetPayload = parse(envelope.payload)?;
            let (room_id, player_id) = bound(state, conn_id)?;
            let room = store.reject_rename(&room_id, player_id, p.player_id)?;
            Ok(AckPayload {
                room: Some(room),
                ..Default::default()
            })
        }
        "player:rename-block" => {
            let p: BlockPayload = parse(envelope.payload)?;
            let (room_id, player_id) = bound(state, conn_id)?;
            let room = store.set_rename_block(&room_id, player_id, p.player_id, p.block)?;
            Ok(AckPayload {
                room: Some(room),
                ..Default::default()
            })
        }
        "player:buyin-request" => {
            let p: BuyInRequestPayload = parse(envelope.payload)?;
            let (room_id, player_id) = bound(state, conn_id)?;
            let room =
                store.request_buy_in(&room_id, player_id, p.amount, p.note.as_deref())?;
            Ok(AckPayload {
                room: Some(room),
                ..Default::default()
            })
        }
        "player:buyin-cancel" => {
            let (room_id, player_id) = bound(state, conn_id)?;
            let room = store.cancel_buy_in(&room_id, player_id)?;
            Ok(AckPayload {
                room: Some(room),
                ..Default::default()
            })
        }
        "player:buyin-approve" => {
            let p: PlayerTargetPayload = parse(envelope.payload)?;
            let (room_id, player_id) = bound(state, conn_id)?;
            let room = store.approve_buy_in(&room_id, player_id, p.player_id)?;
            Ok(AckPayload {
                room: Some(room),
                ..Default::default()
            })
        }
        "player:buyin-reject" => {
            let p: PlayerTargetPayload = parse(envelope.payload)?;
            let (room_id, player_id) = bound(state, conn_id)?;
            let room = store.reject_buy_in(&room_id, player_id, p.player_id)?;
            Ok(AckPayload {
                room: Some(room),
                ..Default::default()
            })
        }
        "player:buyin-block" => {
            let p: BlockPayload = parse(envelope.payload)?;
            let (room_id, player_id) = bound(state, conn_id)?;
            let room = store.set_buy_in_block(&room_id, player_id, p.player_id, p.block)?;
            Ok(AckPayload {
                room: Some(room),
                ..Default::default()
            })
        }
        "player:kick" => {
            let p: PlayerTargetPayload = parse(envelope.payload)?;
            let (room_id, player_id) = bound(state, conn_id)?;
            let room = store.kick_player(&room_id, player_id, p.player_id)?;
            Ok(AckPayload {
                room: Some(room),
                ..Default::default()
            })
        }
        "player:bank-adjust" => {
            let p: BankAdjustPayload = parse(envelope.payload)?;
            let (room_id, player_id) = bound(state, conn_id)?;
            let room = store.adjust_player_wallet(
                &room_id,
                player_id,
                p.player_id,
                p.amount,
                p.note.as_deref(),
            )?;
            Ok(AckPayload {
                room: Some(room.clone()),
                adjust: Some(room.wallet(p.player_id)),
                ..Default::default()
            })
        }
        "room:banker-topup" => {
            let p: TopUpPayload = parse(envelope.payload)?;
            let (room_id, player_id) = bound(state, conn_id)?;
            let room = store.top_up_banker(&room_id, player_id, p.amount, p.note.as_deref())?;
            Ok(AckPayload {
                top_up: Some(room.wallet(player_id)),
                room: Some(room),
                ..Default::default()
            })
        }
        _ => Err(GameError::UnknownType),
    }
}

/// Bind the socket to a room/player and record the connection in the audit
/// sink.
async fn attach(
    state: &Arc<WsState>,
    conn_id: Uuid,
    room_id: &str,
    player_id: PlayerId,
    ip: &str,
    user_agent: &str,
) {
    state.bind(conn_id, room_id, player_id);
    info!(target: LOG_TARGET, %conn_id, room_id, player_id, "socket bound to player");

    if state.audit.is_enabled() {
        let audit_id = state
            .audit
            .record_connect(room_id, player_id, ip, user_agent)
            .await;
        if let Some(mut conn) = state.connections.get_mut(&conn_id) {
            conn.audit_id = audit_id;
        }
        notify_connections(state, room_id).await;
    }
}

/// Push a fresh connection summary to every banker socket of the room.
async fn notify_connections(state: &Arc<WsState>, room_id: &str) {
    let summaries = state.audit.latest_connections(room_id).await;
    let Ok(room) = state.store.room_snapshot(room_id) else {
        return;
    };
    let Some(banker_id) = room.banker().map(|p| p.id) else {
        return;
    };
    let envelope = ServerEnvelope::connections(room_id, &summaries);
    for conn in state.connections.iter() {
        if conn.room_id.as_deref() == Some(room_id) && conn.player_id == Some(banker_id) {
            send_envelope(&conn.tx, &envelope);
        }
    }
}

async fn on_disconnect(state: &Arc<WsState>, conn_id: Uuid) {
    let Some((_, handle)) = state.connections.remove(&conn_id) else {
        return;
    };
    debug!(target: LOG_TARGET, %conn_id, "socket closed");
    let (Some(room_id), Some(player_id)) = (handle.room_id, handle.player_id) else {
        return;
    };

    // Presence only flips when the last socket of the player goes away.
    let has_other = state.connections.iter().any(|c| {
        c.room_id.as_deref() == Some(room_id.as_str()) && c.player_id == Some(player_id)
    });
    if !has_other {
        if let Err(err) = state.store.set_presence(&room_id, player_id, Presence::Offline) {
            debug!(target: LOG_TARGET, %conn_id, error = %err, "presence not updated");
        }
    }

    if state.audit.is_enabled() {
        if let Some(audit_id) = handle.audit_id {
            state.audit.record_disconnect(audit_id).await;
        }
        notify_connections(state, &room_id).await;
    }
}
