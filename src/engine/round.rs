use super::errors::GameError;
use super::hand::{self, HandOutcome, BLATT_STANDBY_TOTAL};
use super::types::*;

/// Informational hint produced by a transition; the caller may use it to
/// delay the terminate broadcast for presentation purposes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdvanceHint {
    pub terminate_delay: bool,
}

/// Pure transitions over a round value. Callers apply them to a copy and
/// commit the copy only on success.
pub trait RoundOps {
    fn bet(round: &mut Round, player_id: PlayerId, amount: Chips) -> Result<AdvanceHint, GameError>;
    fn hit(round: &mut Round, player_id: PlayerId, eleveroon: bool)
        -> Result<AdvanceHint, GameError>;
    fn stand(round: &mut Round, player_id: PlayerId) -> Result<AdvanceHint, GameError>;
    fn skip(round: &mut Round, player_id: PlayerId) -> Result<AdvanceHint, GameError>;
}

pub struct RoundEngine;

fn outcome_state(outcome: HandOutcome) -> TurnState {
    match outcome {
        HandOutcome::Pending => TurnState::Pending,
        HandOutcome::Won => TurnState::Won,
        HandOutcome::Lost => TurnState::Lost,
    }
}

fn draw_checked(round: &mut Round, player_id: PlayerId) -> Result<usize, GameError> {
    if round.phase == RoundPhase::Terminate {
        return Err(GameError::RoundTerminated);
    }
    if round.deck.is_empty() {
        return Err(GameError::DeckEmpty);
    }
    round.seat_index(player_id).ok_or(GameError::TurnNotFound)
}

impl RoundOps for RoundEngine {
    fn bet(round: &mut Round, player_id: PlayerId, amount: Chips) -> Result<AdvanceHint, GameError> {
        if amount <= 0 {
            return Err(GameError::InvalidBet);
        }
        let seat = draw_checked(round, player_id)?;
        let card = round.deck.remove(0);
        let turn = &mut round.turns[seat];
        turn.cards.push(card);
        turn.bet += amount;
        turn.state = outcome_state(hand::classify(&turn.cards));
        advance(round);
        Ok(AdvanceHint::default())
    }

    fn hit(
        round: &mut Round,
        player_id: PlayerId,
        eleveroon: bool,
    ) -> Result<AdvanceHint, GameError> {
        let seat = draw_checked(round, player_id)?;
        let is_banker = round.turns[seat].is_banker();
        // Eleveroon is always on for the banker.
        let eleveroon = eleveroon || is_banker;
        let card = round.deck.remove(0);
        let turn = &mut round.turns[seat];
        let ignore = eleveroon && hand::eleveroon_applies(&turn.cards, &card);
        turn.cards.push(card);
        if ignore {
            if let Some(last) = turn.cards.last_mut() {
                last.eleveroon_ignored = true;
            }
        }
        let mut state = outcome_state(hand::classify(&turn.cards));
        if !is_banker && turn.bet == 0 {
            // Blatt draw: a would-be bust never loses, and a strong total
            // stands automatically.
            if state == TurnState::Lost {
                state = TurnState::Pending;
            }
            if state == TurnState::Pending && hand::best_total(&turn.cards) >= BLATT_STANDBY_TOTAL {
                state = TurnState::Standby;
            }
        }
        turn.state = state;
        advance(round);
        Ok(AdvanceHint::default())
    }

    fn stand(round: &mut Round, player_id: PlayerId) -> Result<AdvanceHint, GameError> {
        if round.phase == RoundPhase::Terminate {
            return Err(GameError::RoundTerminated);
        }
        let seat = round.seat_index(player_id).ok_or(GameError::TurnNotFound)?;
        let turn = &mut round.turns[seat];
        if !turn.is_banker() && turn.bet == 0 {
            // Standing on a stakeless hand is a push.
            turn.state = TurnState::Won;
            turn.settled_bet = Some(0);
            turn.settled_net = Some(0);
        } else if turn.state == TurnState::Pending {
            turn.state = TurnState::Standby;
        }
        advance(round);
        Ok(AdvanceHint {
            terminate_delay: round.phase == RoundPhase::Terminate,
        })
    }

    fn skip(round: &mut Round, player_id: PlayerId) -> Result<AdvanceHint, GameError> {
        if round.phase == RoundPhase::Terminate {
            return Err(GameError::RoundTerminated);
        }
        let seat = round.seat_index(player_id).ok_or(GameError::TurnNotFound)?;
        round.turns[seat].state = TurnState::Skipped;
        advance(round);
        Ok(AdvanceHint::default())
    }
}

/// Derive the round phase from turn states. While a bank lock is in flight
/// the showdown sub-machine owns the flow and the phase is left untouched.
pub fn advance(round: &mut Round) {
    if round.phase == RoundPhase::Terminate || round.bank_lock.is_some() {
        return;
    }
    let pending_non_banker = round
        .turns
        .iter()
        .any(|t| !t.is_banker() && t.state == TurnState::Pending);
    let resolved_non_banker = round
        .turns
        .iter()
        .any(|t| !t.is_banker() && t.state != TurnState::Pending);
    let awaiting_banker = round
        .turns
        .iter()
        .any(|t| !t.is_banker() && t.state == TurnState::Standby);
    let banker_pending = round
        .banker()
        .map_or(false, |t| t.state == TurnState::Pending);

    if pending_non_banker {
        round.phase = RoundPhase::Playing;
    } else if banker_pending && awaiting_banker {
        round.phase = RoundPhase::Final;
    } else if resolved_non_banker || !banker_pending {
        terminate(round);
    } else {
        round.phase = RoundPhase::Playing;
    }
}

fn terminate(round: &mut Round) {
    round.phase = RoundPhase::Terminate;
    end_state(&mut round.turns);
}

/// Resolve every seat against the banker and fold the banker's net into its
/// turn. Classification is recomputed from the cards; the Blatt suppression
/// does not survive the end of the round.
pub fn end_state(turns: &mut [Turn]) {
    let Some(banker_idx) = turns.iter().position(|t| t.is_banker()) else {
        return;
    };
    let banker_outcome = hand::classify(&turns[banker_idx].cards);
    let banker_best = hand::best_total(&turns[banker_idx].cards);
    let banker_busted = banker_outcome == HandOutcome::Lost;
    let banker_id = turns[banker_idx].player.id;

    let mut banker_net: Chips = 0;
    for turn in turns.iter_mut() {
        if turn.player.id == banker_id || turn.state == TurnState::Skipped {
            continue;
        }
        let state = match hand::classify(&turn.cards) {
            HandOutcome::Won => TurnState::Won,
            HandOutcome::Lost => TurnState::Lost,
            HandOutcome::Pending => match turn.state {
                // Ties go to the banker; a busted banker pays every stand.
                TurnState::Standby => {
                    if banker_busted || hand::best_total(&turn.cards) > banker_best {
                        TurnState::Won
                    } else {
                        TurnState::Lost
                    }
                }
                other => other,
            },
        };
        turn.state = state;
        let net = match state {
            TurnState::Won => turn.bet,
            TurnState::Lost => -turn.bet,
            _ => 0,
        };
        banker_net -= net;
        if turn.settled_bet.is_none() {
            turn.settled_bet = Some(turn.bet);
            turn.settled_net = Some(net);
        }
    }

    let banker = &mut turns[banker_idx];
    banker.bet = banker_net;
    banker.settled_net = Some(banker_net);
    banker.state = if banker_net < 0 {
        TurnState::Lost
    } else if banker_outcome == HandOutcome::Won {
        TurnState::Won
    } else {
        TurnState::Standby
    };
}

/// Ledger entries for a resolved set of turns. Skipped seats and stakeless
/// pushes produce nothing.
pub fn balances(turns: &[Turn]) -> Vec<BalanceEntry> {
    let Some(banker_id) = turns.iter().find(|t| t.is_banker()).map(|t| t.player.id) else {
        return Vec::new();
    };
    let mut entries = Vec::new();
    for turn in turns {
        if turn.player.id == banker_id || turn.bet <= 0 {
            continue;
        }
        match turn.state {
            TurnState::Won => entries.push(BalanceEntry {
                amount: turn.bet,
                payer: banker_id,
                payee: turn.player.id,
            }),
            TurnState::Lost => entries.push(BalanceEntry {
                amount: turn.bet,
                payer: turn.player.id,
                payee: banker_id,
            }),
            _ => {}
        }
    }
    entries
}
