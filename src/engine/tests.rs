#![cfg(test)]

use super::cards::{default_shoe_count, single_shoe, Card};
use super::errors::GameError;
use super::hand::{self, HandOutcome};
use super::round::{advance, balances, end_state, RoundEngine, RoundOps};
use super::types::*;

fn player(id: PlayerId, role: PlayerRole) -> Player {
    Player {
        id,
        first_name: format!("Player{id}"),
        last_name: String::new(),
        role,
        presence: Presence::Online,
    }
}

fn cards(ranks: &[u32]) -> Vec<Card> {
    ranks.iter().map(|r| Card::new(*r)).collect()
}

fn turn(id: PlayerId, role: PlayerRole, ranks: &[u32], bet: Chips) -> Turn {
    Turn {
        player: player(id, role),
        state: TurnState::Pending,
        cards: cards(ranks),
        bet,
        bank_request: None,
        settled_bet: None,
        settled_net: None,
    }
}

fn round(turns: Vec<Turn>, deck: &[u32]) -> Round {
    Round {
        id: RoundId::new_v4(),
        room_id: "TEST-ROOM".to_string(),
        deck: cards(deck),
        turns,
        phase: RoundPhase::Playing,
        deck_count: 1,
        round_number: 1,
        bank_lock: None,
        turn_timer: None,
    }
}

// ---- evaluator ----------------------------------------------------------

#[test]
fn all_totals_cross_product_has_full_multiplicity() {
    // Two 12s: 3 values each, 9 combinations with multiplicity.
    let hand = cards(&[12, 12]);
    let totals = hand::all_totals(&hand);
    assert_eq!(totals.len(), 9);
    assert!(totals.contains(&24));
    assert!(totals.contains(&18));
}

#[test]
fn best_total_prefers_highest_non_bust() {
    assert_eq!(hand::best_total(&cards(&[10, 12])), 20);
    assert_eq!(hand::best_total(&cards(&[10, 10])), 20);
    // Everything busts: report the smallest bust.
    assert_eq!(hand::best_total(&cards(&[10, 10, 5])), 25);
}

#[test]
fn classify_detects_twenty_one_and_busts() {
    assert_eq!(hand::classify(&cards(&[10, 10, 1])), HandOutcome::Won);
    assert_eq!(hand::classify(&cards(&[10, 10, 5])), HandOutcome::Lost);
    assert_eq!(hand::classify(&cards(&[10, 5])), HandOutcome::Pending);
}

#[test]
fn rosier_pair_is_an_automatic_win() {
    // 2 + 11 totals 13, but both carry the rosier frame.
    assert_eq!(hand::classify(&cards(&[2, 11])), HandOutcome::Won);
    // A third card breaks the pair.
    assert_eq!(hand::classify(&cards(&[2, 11, 5])), HandOutcome::Pending);
}

#[test]
fn eleveroon_applies_only_when_the_eleven_would_bust_an_eleven() {
    let eleven = Card::new(11);
    assert!(hand::eleveroon_applies(&cards(&[5, 6]), &eleven));
    // 1 + 12 has best total 11 but drawing the 11 can still make 21.
    assert!(!hand::eleveroon_applies(&cards(&[1, 12]), &eleven));
    assert!(!hand::eleveroon_applies(&cards(&[5, 4]), &eleven));
    assert!(!hand::eleveroon_applies(&cards(&[5, 6]), &Card::new(10)));
}

#[test]
fn ignored_cards_never_reach_the_totals() {
    let mut hand_cards = cards(&[5, 6, 11]);
    hand_cards[2].eleveroon_ignored = true;
    assert_eq!(hand::best_total(&hand_cards), 11);
    assert_eq!(hand::classify(&hand_cards), HandOutcome::Pending);
}

// ---- turn transitions ---------------------------------------------------

#[test]
fn bet_draws_a_card_and_raises_the_stake() {
    let mut r = round(
        vec![turn(2, PlayerRole::Player, &[10], 0), turn(1, PlayerRole::Banker, &[5], 0)],
        &[5, 8],
    );
    RoundEngine::bet(&mut r, 2, 10).unwrap();
    let t = r.turn(2).unwrap();
    assert_eq!(t.cards.len(), 2);
    assert_eq!(t.bet, 10);
    assert_eq!(t.state, TurnState::Pending);
    assert_eq!(r.deck.len(), 1);
}

#[test]
fn bet_validates_amount_deck_and_phase() {
    let mut r = round(
        vec![turn(2, PlayerRole::Player, &[10], 0), turn(1, PlayerRole::Banker, &[5], 0)],
        &[5],
    );
    assert_eq!(RoundEngine::bet(&mut r, 2, 0), Err(GameError::InvalidBet));
    assert_eq!(RoundEngine::bet(&mut r, 9, 5), Err(GameError::TurnNotFound));

    r.deck.clear();
    assert_eq!(RoundEngine::bet(&mut r, 2, 5), Err(GameError::DeckEmpty));

    r.phase = RoundPhase::Terminate;
    assert_eq!(RoundEngine::bet(&mut r, 2, 5), Err(GameError::RoundTerminated));
}

#[test]
fn blatt_draw_cannot_bust_and_stands_at_twenty() {
    // First card 10, no stake; the 12 busts as 22 but counts as 19/20.
    let mut r = round(
        vec![turn(2, PlayerRole::Player, &[10], 0), turn(1, PlayerRole::Banker, &[5], 0)],
        &[12],
    );
    RoundEngine::hit(&mut r, 2, false).unwrap();
    let t = r.turn(2).unwrap();
    assert_eq!(t.state, TurnState::Standby);
    assert_eq!(t.bet, 0);
    assert_eq!(r.phase, RoundPhase::Final);
}

#[test]
fn staked_hit_busts_normally() {
    let mut r = round(
        vec![turn(2, PlayerRole::Player, &[10, 9], 5), turn(1, PlayerRole::Banker, &[5], 0)],
        &[10],
    );
    RoundEngine::hit(&mut r, 2, false).unwrap();
    assert_eq!(r.turn(2).unwrap().state, TurnState::Lost);
}

#[test]
fn eleveroon_hit_tags_the_card_and_keeps_the_total() {
    let mut r = round(
        vec![turn(2, PlayerRole::Player, &[5, 6], 3), turn(1, PlayerRole::Banker, &[5], 0)],
        &[11],
    );
    RoundEngine::hit(&mut r, 2, true).unwrap();
    let t = r.turn(2).unwrap();
    assert!(t.cards.last().unwrap().eleveroon_ignored);
    assert_eq!(hand::best_total(&t.cards), 11);
    assert_eq!(t.state, TurnState::Pending);
}

#[test]
fn banker_hit_forces_eleveroon() {
    let mut r = round(
        vec![
            turn(2, PlayerRole::Player, &[10, 9], 5),
            turn(1, PlayerRole::Banker, &[5, 6], 0),
        ],
        &[11],
    );
    r.turn_mut(2).unwrap().state = TurnState::Standby;
    RoundEngine::hit(&mut r, 1, false).unwrap();
    assert!(r.banker().unwrap().cards.last().unwrap().eleveroon_ignored);
}

#[test]
fn stand_on_a_stakeless_hand_is_a_push() {
    let mut r = round(
        vec![turn(2, PlayerRole::Player, &[10], 0), turn(1, PlayerRole::Banker, &[5], 0)],
        &[5],
    );
    RoundEngine::stand(&mut r, 2).unwrap();
    let t = r.turn(2).unwrap();
    assert_eq!(t.state, TurnState::Won);
    assert_eq!(t.settled_bet, Some(0));
}

#[test]
fn stand_with_a_stake_moves_to_standby_and_final() {
    let mut r = round(
        vec![turn(2, PlayerRole::Player, &[10, 7], 5), turn(1, PlayerRole::Banker, &[5], 0)],
        &[5],
    );
    RoundEngine::stand(&mut r, 2).unwrap();
    assert_eq!(r.turn(2).unwrap().state, TurnState::Standby);
    assert_eq!(r.phase, RoundPhase::Final);
}

#[test]
fn round_skips_to_terminate_when_nobody_stands() {
    let mut r = round(
        vec![
            turn(2, PlayerRole::Player, &[10, 10, 5], 5),
            turn(3, PlayerRole::Player, &[9], 0),
            turn(1, PlayerRole::Banker, &[5], 0),
        ],
        &[5],
    );
    r.turn_mut(2).unwrap().state = TurnState::Lost;
    let hint = RoundEngine::skip(&mut r, 3).unwrap();
    assert_eq!(r.phase, RoundPhase::Terminate);
    assert!(!hint.terminate_delay);
    // The lone loser's stake already belongs to the bank.
    assert_eq!(r.banker().unwrap().bet, 5);
}

// ---- end state and balances ---------------------------------------------

#[test]
fn tie_goes_to_the_banker() {
    let mut turns = vec![
        turn(2, PlayerRole::Player, &[10, 5, 5], 5),
        turn(1, PlayerRole::Banker, &[10, 10], 0),
    ];
    turns[0].state = TurnState::Standby;
    end_state(&mut turns);
    assert_eq!(turns[0].state, TurnState::Lost);
    assert_eq!(turns[1].bet, 5);

    let entries = balances(&turns);
    assert_eq!(
        entries,
        vec![BalanceEntry {
            amount: 5,
            payer: 2,
            payee: 1
        }]
    );
}

#[test]
fn busted_banker_pays_every_stand() {
    let mut turns = vec![
        turn(2, PlayerRole::Player, &[10, 6], 8),
        turn(1, PlayerRole::Banker, &[10, 10, 5], 0),
    ];
    turns[0].state = TurnState::Standby;
    end_state(&mut turns);
    assert_eq!(turns[0].state, TurnState::Won);
    assert_eq!(turns[1].state, TurnState::Lost);
    assert_eq!(turns[1].bet, -8);
}

#[test]
fn rosier_pair_beats_a_losing_banker() {
    let mut turns = vec![
        turn(2, PlayerRole::Player, &[2, 11], 10),
        turn(1, PlayerRole::Banker, &[10, 9], 0),
    ];
    turns[0].state = TurnState::Won;
    turns[1].state = TurnState::Standby;
    end_state(&mut turns);
    assert_eq!(turns[0].state, TurnState::Won);
    assert_eq!(turns[1].bet, -10);
    assert_eq!(turns[1].state, TurnState::Lost);

    let entries = balances(&turns);
    assert_eq!(
        entries,
        vec![BalanceEntry {
            amount: 10,
            payer: 1,
            payee: 2
        }]
    );
}

#[test]
fn skipped_and_stakeless_seats_produce_no_entries() {
    let mut turns = vec![
        turn(2, PlayerRole::Player, &[10], 0),
        turn(3, PlayerRole::Player, &[9, 9], 4),
        turn(1, PlayerRole::Banker, &[10, 8], 0),
    ];
    turns[0].state = TurnState::Skipped;
    turns[1].state = TurnState::Standby;
    end_state(&mut turns);

    let entries = balances(&turns);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].payee, 1);
}

#[test]
fn stakes_are_conserved_after_finalization() {
    let mut turns = vec![
        turn(2, PlayerRole::Player, &[10, 8], 7),
        turn(3, PlayerRole::Player, &[10, 10, 5], 9),
        turn(4, PlayerRole::Player, &[10, 10, 1], 12),
        turn(1, PlayerRole::Banker, &[10, 7], 0),
    ];
    turns[0].state = TurnState::Standby;
    end_state(&mut turns);

    let player_net: Chips = turns
        .iter()
        .filter(|t| !t.is_banker())
        .filter_map(|t| t.settled_net)
        .sum();
    assert_eq!(turns.last().unwrap().bet, -player_net);

    let entries = balances(&turns);
    let ledger_net: Chips = entries
        .iter()
        .map(|e| if e.payee == 1 { e.amount } else { -e.amount })
        .sum();
    assert_eq!(ledger_net, turns.last().unwrap().bet);
}

#[test]
fn advance_keeps_playing_while_seats_are_pending() {
    let mut r = round(
        vec![
            turn(2, PlayerRole::Player, &[10], 0),
            turn(3, PlayerRole::Player, &[9], 0),
            turn(1, PlayerRole::Banker, &[5], 0),
        ],
        &[5],
    );
    r.turn_mut(2).unwrap().state = TurnState::Standby;
    advance(&mut r);
    assert_eq!(r.phase, RoundPhase::Playing);
}

// ---- deck ---------------------------------------------------------------

#[test]
fn shoe_has_forty_eight_cards_with_eight_rosiers() {
    let shoe = single_shoe();
    assert_eq!(shoe.len(), 48);
    assert_eq!(shoe.iter().filter(|c| c.is_rosier()).count(), 8);
    let twelve = shoe.iter().find(|c| c.name == "12").unwrap();
    assert_eq!(twelve.values, vec![12, 9, 10]);
}

#[test]
fn shoe_count_scales_with_the_table_and_is_capped() {
    assert_eq!(default_shoe_count(2), 1);
    assert_eq!(default_shoe_count(7), 1);
    assert_eq!(default_shoe_count(8), 2);
    assert_eq!(default_shoe_count(500), 16);
}
