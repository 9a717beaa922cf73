#![cfg(test)]

use std::sync::Arc;

use crate::engine::{
    BankStage, Card, Chips, GameError, PlayerId, PlayerRole, Presence, RoundId, TurnState,
};

use super::*;

fn cards(ranks: &[u32]) -> Vec<Card> {
    ranks.iter().map(|r| Card::new(*r)).collect()
}

fn create(store: &Arc<GameStore>, bankroll: Chips) -> (String, PlayerId) {
    let out = store
        .create_room(CreateRoomInput {
            first_name: "Dana".to_string(),
            last_name: "Banker".to_string(),
            banker_bankroll: Some(bankroll),
            ..Default::default()
        })
        .unwrap();
    (out.room.id, out.player.id)
}

fn join(store: &Arc<GameStore>, room_id: &str, name: &str) -> PlayerId {
    store
        .join_room(
            room_id,
            JoinRoomInput {
                first_name: name.to_string(),
                ..Default::default()
            },
        )
        .unwrap()
        .player
        .id
}

/// Rewrite a freshly dealt round into a known position: every listed seat
/// gets the given hand, and the shoe is replaced outright.
fn script_round(
    store: &Arc<GameStore>,
    round_id: RoundId,
    hands: &[(PlayerId, &[u32])],
    deck: &[u32],
) {
    store
        .with_round_mut(round_id, |round| {
            for (player_id, ranks) in hands {
                let turn = round.turn_mut(*player_id).unwrap();
                turn.cards = cards(ranks);
            }
            round.deck = cards(deck);
        })
        .unwrap();
}

fn total_chips(room: &Room) -> Chips {
    room.wallets.values().copied().sum()
}

// ---- room lifecycle -----------------------------------------------------

#[tokio::test]
async fn create_room_assigns_banker_and_bankroll() {
    let store = GameStore::new();
    let (room_id, banker_id) = create(&store, 250);
    let room = store.room_snapshot(&room_id).unwrap();
    assert_eq!(room.id.len(), 6);
    assert_eq!(room.default_buy_in, 100);
    assert_eq!(room.banker_buy_in, 250);
    assert_eq!(room.wallet(banker_id), 250);
    assert!(room.player(banker_id).unwrap().is_banker());
}

#[tokio::test]
async fn custom_room_ids_are_validated_and_unique() {
    let store = GameStore::new();
    let out = store
        .create_room(CreateRoomInput {
            first_name: "Dana".to_string(),
            room_id: Some("tisch-1".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(out.room.id, "TISCH-1");

    let taken = store
        .create_room(CreateRoomInput {
            first_name: "Mo".to_string(),
            room_id: Some("TISCH-1".to_string()),
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(taken, GameError::validation("Game ID taken"));

    let invalid = store
        .create_room(CreateRoomInput {
            first_name: "Mo".to_string(),
            room_id: Some("ab".to_string()),
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(invalid, GameError::validation("Game ID invalid"));

    let bankroll = store
        .create_room(CreateRoomInput {
            first_name: "Mo".to_string(),
            banker_bankroll: Some(0),
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(bankroll, GameError::InvalidBankroll);
}

#[tokio::test]
async fn password_guards_the_door() {
    let store = GameStore::new();
    let out = store
        .create_room(CreateRoomInput {
            first_name: "Dana".to_string(),
            password: Some("gelt".to_string()),
            ..Default::default()
        })
        .unwrap();

    let denied = store
        .join_room(
            &out.room.id,
            JoinRoomInput {
                first_name: "Mo".to_string(),
                password: Some("wrong".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert_eq!(denied, GameError::InvalidPassword);

    store
        .join_room(
            &out.room.id,
            JoinRoomInput {
                first_name: "Mo".to_string(),
                password: Some("gelt".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
}

#[tokio::test]
async fn mid_round_joiners_wait_for_the_next_deal() {
    let store = GameStore::new();
    let (room_id, _) = create(&store, 500);
    let a = join(&store, &room_id, "Aba");
    let round = store.start_round(&room_id, None).unwrap();
    assert!(round.turn(a).is_some());

    let late = join(&store, &room_id, "Leah");
    let room = store.room_snapshot(&room_id).unwrap();
    assert!(room.waiting_player_ids.contains(&late));
    assert!(store.round_snapshot(round.id).unwrap().turn(late).is_none());

    let next = store.start_round(&room_id, None).unwrap();
    assert!(next.turn(late).is_some());
    assert!(store
        .room_snapshot(&room_id)
        .unwrap()
        .waiting_player_ids
        .is_empty());
}

#[tokio::test]
async fn resume_rotates_the_token_and_rejects_the_old_one() {
    let store = GameStore::new();
    let (room_id, _) = create(&store, 100);
    let out = store
        .join_room(
            &room_id,
            JoinRoomInput {
                first_name: "Mo".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
    let first_token = out.session.token.clone();

    let resumed = store
        .resume_player(&room_id, out.player.id, &first_token)
        .unwrap();
    assert_ne!(resumed.session.token, first_token);
    assert_eq!(resumed.player.presence, Presence::Online);

    let stale = store
        .resume_player(&room_id, out.player.id, &first_token)
        .unwrap_err();
    assert_eq!(stale, GameError::InvalidSession);
}

#[tokio::test]
async fn switch_admin_swaps_roles_atomically() {
    let store = GameStore::new();
    let (room_id, banker_id) = create(&store, 100);
    let a = join(&store, &room_id, "Aba");

    assert_eq!(
        store.switch_admin(&room_id, a, banker_id).unwrap_err(),
        GameError::Forbidden
    );
    assert_eq!(
        store.switch_admin(&room_id, banker_id, banker_id).unwrap_err(),
        GameError::InvalidTarget
    );

    let room = store.switch_admin(&room_id, banker_id, a).unwrap();
    assert!(room.player(a).unwrap().is_banker());
    assert_eq!(room.player(banker_id).unwrap().role, PlayerRole::Player);
    assert_eq!(room.players.iter().filter(|p| p.is_banker()).count(), 1);
}

#[tokio::test]
async fn kick_removes_the_player_everywhere() {
    let store = GameStore::new();
    let (room_id, banker_id) = create(&store, 500);
    let a = join(&store, &room_id, "Aba");
    let b = join(&store, &room_id, "Bela");
    let round = store.start_round(&room_id, None).unwrap();

    assert_eq!(
        store.kick_player(&room_id, a, b).unwrap_err(),
        GameError::Forbidden
    );
    assert_eq!(
        store.kick_player(&room_id, banker_id, banker_id).unwrap_err(),
        GameError::InvalidTarget
    );

    let room = store.kick_player(&room_id, banker_id, a).unwrap();
    assert!(room.player(a).is_none());
    assert!(!room.wallets.contains_key(&a));
    assert!(store.round_snapshot(round.id).unwrap().turn(a).is_none());
}

#[tokio::test]
async fn start_round_requires_company() {
    let store = GameStore::new();
    let (room_id, _) = create(&store, 100);
    assert_eq!(
        store.start_round(&room_id, None).unwrap_err(),
        GameError::NotEnoughPlayers
    );
}

#[tokio::test]
async fn offline_players_are_not_dealt_in() {
    let store = GameStore::new();
    let (room_id, _) = create(&store, 500);
    let a = join(&store, &room_id, "Aba");
    let b = join(&store, &room_id, "Bela");
    store
        .set_presence(&room_id, b, Presence::Offline)
        .unwrap();

    let round = store.start_round(&room_id, None).unwrap();
    assert!(round.turn(a).is_some());
    assert!(round.turn(b).is_none());
}

#[tokio::test]
async fn seat_rotation_gives_everyone_the_first_seat() {
    let store = GameStore::new();
    let (room_id, _) = create(&store, 500);
    let a = join(&store, &room_id, "Aba");
    let b = join(&store, &room_id, "Bela");
    let c = join(&store, &room_id, "Cvi");

    let mut firsts = Vec::new();
    for _ in 0..3 {
        let round = store.start_round(&room_id, None).unwrap();
        firsts.push(round.turns[0].player.id);
        // The banker always closes the seating.
        assert!(round.turns.last().unwrap().is_banker());
    }
    assert_eq!(firsts, vec![a, b, c]);
}

// ---- turn actions and the turn timer ------------------------------------

#[tokio::test]
async fn bets_are_capped_by_the_wallet() {
    let store = GameStore::new();
    let (room_id, _) = create(&store, 1_000);
    let a = join(&store, &room_id, "Aba");
    let round = store.start_round(&room_id, None).unwrap();
    script_round(&store, round.id, &[(a, &[5])], &[5, 5, 5]);

    assert_eq!(
        store.apply_bet(round.id, a, 150, false).unwrap_err(),
        GameError::InsufficientFunds
    );
    let round = store.apply_bet(round.id, a, 60, false).unwrap();
    assert_eq!(round.turn(a).unwrap().bet, 60);
}

#[tokio::test]
async fn the_turn_timer_tracks_the_first_pending_seat() {
    let store = GameStore::new();
    let (room_id, _) = create(&store, 500);
    let a = join(&store, &room_id, "Aba");
    let b = join(&store, &room_id, "Bela");
    let round = store.start_round(&room_id, None).unwrap();

    let timer = round.turn_timer.clone().unwrap();
    assert_eq!(timer.player_id, a);
    assert_eq!(timer.duration, 90_000);

    script_round(&store, round.id, &[(a, &[5]), (b, &[5])], &[5, 5, 5, 5]);
    let after_bet = store.apply_bet(round.id, a, 10, false).unwrap();
    // Same active seat, same expiry.
    assert_eq!(after_bet.turn_timer.clone().unwrap().expires_at, timer.expires_at);

    let after_stand = store.apply_stand(round.id, a).unwrap();
    assert_eq!(after_stand.turn_timer.unwrap().player_id, b);
}

#[tokio::test]
async fn expired_turns_are_stood_automatically() {
    let store = GameStore::new();
    let (room_id, _) = create(&store, 500);
    let a = join(&store, &room_id, "Aba");
    let b = join(&store, &room_id, "Bela");
    let round = store.start_round(&room_id, None).unwrap();

    store.auto_stand(round.id, a);
    let round = store.round_snapshot(round.id).unwrap();
    // A stakeless timeout resolves as a push.
    assert_eq!(round.turn(a).unwrap().state, TurnState::Won);
    assert_eq!(round.turn(a).unwrap().settled_bet, Some(0));
    assert_eq!(round.turn_timer.unwrap().player_id, b);

    // Stale expiry for a seat that is no longer active does nothing.
    store.auto_stand(round.id, a);
    assert_eq!(
        store.round_snapshot(round.id).unwrap().turn(a).unwrap().state,
        TurnState::Won
    );
}

#[tokio::test]
async fn banker_may_skip_other_seats_but_players_may_not() {
    let store = GameStore::new();
    let (room_id, banker_id) = create(&store, 500);
    let a = join(&store, &room_id, "Aba");
    let b = join(&store, &room_id, "Bela");
    let round = store.start_round(&room_id, None).unwrap();

    assert_eq!(
        store.apply_skip(round.id, a, b).unwrap_err(),
        GameError::Forbidden
    );
    let round = store.apply_skip(round.id, banker_id, a).unwrap();
    assert_eq!(round.turn(a).unwrap().state, TurnState::Skipped);
}

#[tokio::test]
async fn wallets_are_conserved_through_a_full_round() {
    let store = GameStore::new();
    let (room_id, _) = create(&store, 500);
    let a = join(&store, &room_id, "Aba");
    let b = join(&store, &room_id, "Bela");
    let before = total_chips(&store.room_snapshot(&room_id).unwrap());

    let round = store.start_round(&room_id, None).unwrap();
    let round_id = round.id;
    let banker_id = store.room_snapshot(&room_id).unwrap().banker().unwrap().id;
    // A stands on 18, B busts, the banker stands on 17.
    script_round(
        &store,
        round_id,
        &[(a, &[10]), (b, &[10]), (banker_id, &[10, 7])],
        &[8, 9, 9],
    );

    store.apply_bet(round_id, a, 20, false).unwrap();
    store.apply_stand(round_id, a).unwrap();
    store.apply_bet(round_id, b, 15, false).unwrap();
    store.apply_hit(round_id, b, false).unwrap();
    let ended = store.apply_stand(round_id, banker_id).unwrap();
    assert_eq!(ended.phase, crate::engine::RoundPhase::Terminate);

    let room = store.room_snapshot(&room_id).unwrap();
    assert_eq!(total_chips(&room), before);
    // A's 18 beats 17, B's bust pays the bank.
    assert_eq!(room.wallet(a), 120);
    assert_eq!(room.wallet(b), 85);
    assert_eq!(room.wallet(banker_id), 495);
    assert_eq!(room.completed_rounds, 1);
    assert_eq!(room.balance_ledger.len(), 2);
    assert!(room.round_id.is_none());
    assert_eq!(
        store.round_snapshot(round_id).unwrap_err(),
        GameError::RoundNotFound
    );
}

// ---- the BANK! showdown -------------------------------------------------

/// Stage a table one stand away from the interim settlement: A has a
/// standing stake of 10, B has challenged the bank for the full window.
fn stage_bank_challenge(
    store: &Arc<GameStore>,
) -> (String, RoundId, PlayerId, PlayerId, PlayerId, PlayerId) {
    let (room_id, banker_id) = create(store, 50);
    let a = join(store, &room_id, "Aba");
    let b = join(store, &room_id, "Bela");
    let c = join(store, &room_id, "Cvi");
    let round = store.start_round(&room_id, None).unwrap();
    let round_id = round.id;
    script_round(
        store,
        round_id,
        &[(a, &[5]), (b, &[5]), (c, &[5]), (banker_id, &[10, 9])],
        &[5, 5, 10, 7, 6],
    );

    store.apply_bet(round_id, a, 10, false).unwrap();
    store.apply_stand(round_id, a).unwrap();

    let round = store.apply_bet(round_id, b, 40, true).unwrap();
    let lock = round.bank_lock.clone().unwrap();
    assert_eq!(lock.stage, BankStage::Player);
    assert_eq!(lock.player_id, b);
    assert_eq!(lock.exposure, 40);
    assert_eq!(lock.through_index, 1);

    (room_id, round_id, banker_id, a, b, c)
}

#[tokio::test]
async fn bank_window_bounds_the_wager() {
    let store = GameStore::new();
    let (room_id, banker_id) = create(&store, 50);
    let a = join(&store, &room_id, "Aba");
    let b = join(&store, &room_id, "Bela");
    let round = store.start_round(&room_id, None).unwrap();
    script_round(
        &store,
        round.id,
        &[(a, &[5]), (b, &[5]), (banker_id, &[10])],
        &[5, 5, 5],
    );

    store.apply_bet(round.id, a, 10, false).unwrap();
    store.apply_stand(round.id, a).unwrap();

    assert_eq!(
        store.apply_bet(round.id, b, 45, false).unwrap_err(),
        GameError::BankLimit(40)
    );
    assert_eq!(
        store.apply_bet(round.id, b, 30, true).unwrap_err(),
        GameError::InvalidBankAmount
    );
}

#[tokio::test]
async fn drained_bank_rejects_new_stakes() {
    let store = GameStore::new();
    let (room_id, banker_id) = create(&store, 50);
    let a = join(&store, &room_id, "Aba");
    let b = join(&store, &room_id, "Bela");
    let round = store.start_round(&room_id, None).unwrap();
    script_round(
        &store,
        round.id,
        &[(a, &[5]), (b, &[5]), (banker_id, &[10])],
        &[5, 5, 5],
    );
    store.apply_bet(round.id, a, 10, false).unwrap();
    store.apply_stand(round.id, a).unwrap();
    // Shrink the bank to exactly A's standing stake.
    store
        .top_up_banker(&room_id, banker_id, -40, None)
        .unwrap();

    assert_eq!(
        store.apply_bet(round.id, b, 1, false).unwrap_err(),
        GameError::BankEmpty
    );
}

#[tokio::test]
async fn bank_challenge_locks_the_table_and_settles_interim() {
    let store = GameStore::new();
    let (room_id, round_id, banker_id, a, b, c) = stage_bank_challenge(&store);

    // Everyone but the challenger is frozen, and skipping out is barred.
    assert_eq!(
        store.apply_hit(round_id, c, false).unwrap_err(),
        GameError::BankLocked
    );
    assert_eq!(
        store.apply_skip(round_id, b, b).unwrap_err(),
        GameError::BankLocked
    );

    // Challenger stands: the banker is on.
    let round = store.apply_stand(round_id, b).unwrap();
    assert_eq!(
        round.bank_lock.as_ref().unwrap().stage,
        BankStage::Banker
    );
    assert_eq!(
        store.apply_hit(round_id, c, false).unwrap_err(),
        GameError::BankLocked
    );

    // The banker draws a 10 onto 19 and busts: A and B are paid at once.
    let round = store.apply_hit(round_id, banker_id, false).unwrap();
    assert_eq!(
        round.bank_lock.as_ref().unwrap().stage,
        BankStage::Decision
    );
    let room = store.room_snapshot(&room_id).unwrap();
    assert_eq!(room.wallet(a), 110);
    assert_eq!(room.wallet(b), 140);
    assert_eq!(room.wallet(banker_id), 0);
    assert_eq!(room.balance_ledger.len(), 2);
    assert_eq!(round.turn(a).unwrap().bet, 0);
    assert_eq!(round.turn(a).unwrap().settled_bet, Some(10));
    assert_eq!(round.turn(b).unwrap().settled_net, Some(40));

    // Untouched seats still hold their cards and may not act yet.
    assert_eq!(round.turn(c).unwrap().state, TurnState::Pending);
    assert_eq!(
        store.apply_hit(round_id, c, false).unwrap_err(),
        GameError::BankerDeciding
    );
}

#[tokio::test]
async fn top_up_revives_a_bank_in_decision() {
    let store = GameStore::new();
    let (room_id, round_id, banker_id, _, b, c) = stage_bank_challenge(&store);
    store.apply_stand(round_id, b).unwrap();
    store.apply_hit(round_id, banker_id, false).unwrap();

    let room = store.top_up_banker(&room_id, banker_id, 100, None).unwrap();
    assert_eq!(room.wallet(banker_id), 100);

    let round = store.round_snapshot(round_id).unwrap();
    assert!(round.bank_lock.is_none());
    let banker = round.banker().unwrap();
    assert_eq!(banker.state, TurnState::Pending);
    assert_eq!(banker.cards.len(), 1);
    // The rest of the table plays on.
    assert_eq!(round.phase, crate::engine::RoundPhase::Playing);
    store.apply_stand(round_id, c).unwrap();
}

#[tokio::test]
async fn banker_end_skips_the_leftover_seats() {
    let store = GameStore::new();
    let (room_id, round_id, banker_id, _, b, c) = stage_bank_challenge(&store);
    store.apply_stand(round_id, b).unwrap();
    store.apply_hit(round_id, banker_id, false).unwrap();

    assert_eq!(
        store
            .end_round_after_bank_decision(&room_id, c)
            .unwrap_err(),
        GameError::Forbidden
    );
    let round = store
        .end_round_after_bank_decision(&room_id, banker_id)
        .unwrap();
    assert_eq!(round.phase, crate::engine::RoundPhase::Terminate);
    assert_eq!(round.turn(c).unwrap().state, TurnState::Skipped);

    let room = store.room_snapshot(&room_id).unwrap();
    assert_eq!(room.completed_rounds, 1);
    assert!(room.round_id.is_none());
    assert_eq!(
        store
            .end_round_after_bank_decision(&room_id, banker_id)
            .unwrap_err(),
        GameError::RoundNotFound
    );
}

#[tokio::test]
async fn a_busted_challenger_releases_the_table() {
    let store = GameStore::new();
    let (room_id, banker_id) = create(&store, 50);
    let a = join(&store, &room_id, "Aba");
    let c = join(&store, &room_id, "Cvi");
    let round = store.start_round(&room_id, None).unwrap();
    script_round(
        &store,
        round.id,
        &[(a, &[10]), (c, &[5]), (banker_id, &[5])],
        &[9, 10, 5],
    );

    let locked = store.apply_bet(round.id, a, 50, true).unwrap();
    assert_eq!(locked.bank_lock.as_ref().unwrap().stage, BankStage::Player);

    // 10 + 9 + 10 busts the challenger; the round simply continues.
    let round = store.apply_hit(round.id, a, false).unwrap();
    assert!(round.bank_lock.is_none());
    assert_eq!(round.turn(a).unwrap().state, TurnState::Lost);
    assert_eq!(round.phase, crate::engine::RoundPhase::Playing);
    let room = store.room_snapshot(&room_id).unwrap();
    assert_eq!(room.wallet(banker_id), 50);
}

// ---- requests, approvals, wallet adjustments ----------------------------

#[tokio::test]
async fn rename_flow_applies_sanitized_names() {
    let store = GameStore::new();
    let (room_id, banker_id) = create(&store, 100);
    let a = join(&store, &room_id, "Aba");
    store.start_round(&room_id, None).unwrap();

    assert_eq!(
        store
            .request_rename(&room_id, banker_id, "X", "Y")
            .unwrap_err(),
        GameError::Forbidden
    );

    let long_name = "N".repeat(60);
    let room = store
        .request_rename(&room_id, a, "  Moshe  ", &long_name)
        .unwrap();
    let request = room.rename_requests.get(&a).unwrap();
    assert_eq!(request.first_name, "Moshe");
    assert_eq!(request.last_name.chars().count(), 40);

    assert_eq!(
        store.approve_rename(&room_id, a, a).unwrap_err(),
        GameError::Forbidden
    );
    let room = store.approve_rename(&room_id, banker_id, a).unwrap();
    assert_eq!(room.player(a).unwrap().first_name, "Moshe");
    assert!(room.rename_requests.is_empty());
    // The live turn carries the new name too.
    let round = store.room_snapshot(&room_id).unwrap().round_id.unwrap();
    assert_eq!(
        store.round_snapshot(round).unwrap().turn(a).unwrap().player.first_name,
        "Moshe"
    );
}

#[tokio::test]
async fn blocking_clears_and_bars_requests() {
    let store = GameStore::new();
    let (room_id, banker_id) = create(&store, 100);
    let a = join(&store, &room_id, "Aba");

    store.request_rename(&room_id, a, "New", "Name").unwrap();
    let room = store
        .set_rename_block(&room_id, banker_id, a, true)
        .unwrap();
    assert!(room.rename_requests.is_empty());
    assert_eq!(
        store.request_rename(&room_id, a, "New", "Name").unwrap_err(),
        GameError::RenameBlocked
    );

    store.set_rename_block(&room_id, banker_id, a, false).unwrap();
    store.request_rename(&room_id, a, "New", "Name").unwrap();
}

#[tokio::test]
async fn buy_in_flow_credits_the_wallet_on_approval() {
    let store = GameStore::new();
    let (room_id, banker_id) = create(&store, 100);
    let a = join(&store, &room_id, "Aba");

    assert_eq!(
        store
            .request_buy_in(&room_id, a, 0, None)
            .unwrap_err(),
        GameError::InvalidPayload
    );
    store.request_buy_in(&room_id, a, 50, Some("rebuy")).unwrap();
    let room = store.approve_buy_in(&room_id, banker_id, a).unwrap();
    assert_eq!(room.wallet(a), 150);
    assert!(room.buy_in_requests.is_empty());

    assert_eq!(
        store.approve_buy_in(&room_id, banker_id, a).unwrap_err(),
        GameError::RequestNotFound
    );

    store
        .set_buy_in_block(&room_id, banker_id, a, true)
        .unwrap();
    assert_eq!(
        store.request_buy_in(&room_id, a, 50, None).unwrap_err(),
        GameError::BuyinBlocked
    );
}

#[tokio::test]
async fn wallet_adjustments_never_go_negative() {
    let store = GameStore::new();
    let (room_id, banker_id) = create(&store, 100);
    let a = join(&store, &room_id, "Aba");

    assert_eq!(
        store
            .adjust_player_wallet(&room_id, banker_id, a, -200, None)
            .unwrap_err(),
        GameError::InsufficientFunds
    );
    assert_eq!(
        store
            .adjust_player_wallet(&room_id, banker_id, a, 0, None)
            .unwrap_err(),
        GameError::InvalidTarget
    );
    let room = store
        .adjust_player_wallet(&room_id, banker_id, a, -50, Some("penalty"))
        .unwrap();
    assert_eq!(room.wallet(a), 50);

    assert_eq!(
        store
            .top_up_banker(&room_id, banker_id, -200, None)
            .unwrap_err(),
        GameError::InsufficientBank
    );
    let room = store.top_up_banker(&room_id, banker_id, 25, None).unwrap();
    assert_eq!(room.wallet(banker_id), 125);
}

#[tokio::test]
async fn store_events_fan_out_after_commits() {
    let store = GameStore::new();
    let mut events = store.subscribe();
    let (room_id, _) = create(&store, 100);

    let event = events.recv().await.unwrap();
    match event {
        StoreEvent::RoomState { room } => assert_eq!(room.id, room_id),
        other => panic!("unexpected event: {other:?}"),
    }
}
