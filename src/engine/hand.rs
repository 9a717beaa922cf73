use super::cards::Card;

/// Target total for the game.
pub const TARGET_TOTAL: u32 = 21;
/// A Blatt draw stops drawing once the best total reaches this value.
pub const BLATT_STANDBY_TOTAL: u32 = 20;

/// Outcome of evaluating a hand in isolation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandOutcome {
    Pending,
    Won,
    Lost,
}

fn live_cards(cards: &[Card]) -> impl Iterator<Item = &Card> {
    cards.iter().filter(|c| !c.eleveroon_ignored)
}

/// Every sum reachable from the cross-product of per-card values, with
/// multiplicity. Eleveroon-ignored cards do not contribute.
pub fn all_totals(cards: &[Card]) -> Vec<u32> {
    let mut totals = vec![0u32];
    for card in live_cards(cards) {
        let mut next = Vec::with_capacity(totals.len() * card.values.len());
        for total in &totals {
            for value in &card.values {
                next.push(total + value);
            }
        }
        totals = next;
    }
    totals
}

/// The highest total not exceeding 21, or the lowest total when every
/// combination busts.
pub fn best_total(cards: &[Card]) -> u32 {
    let totals = all_totals(cards);
    totals
        .iter()
        .copied()
        .filter(|t| *t <= TARGET_TOTAL)
        .max()
        .unwrap_or_else(|| totals.into_iter().min().unwrap_or(0))
}

/// Two rosier cards as the only cards dealt form an automatic 21.
pub fn is_rosier_pair(cards: &[Card]) -> bool {
    let live: Vec<&Card> = live_cards(cards).collect();
    live.len() == 2 && live.iter().all(|c| c.is_rosier())
}

/// Classify a hand: won on any exact 21 or a rosier pair, lost when every
/// total busts, pending otherwise.
pub fn classify(cards: &[Card]) -> HandOutcome {
    if is_rosier_pair(cards) {
        return HandOutcome::Won;
    }
    let totals = all_totals(cards);
    if totals.iter().any(|t| *t == TARGET_TOTAL) {
        HandOutcome::Won
    } else if totals.iter().all(|t| *t > TARGET_TOTAL) {
        HandOutcome::Lost
    } else {
        HandOutcome::Pending
    }
}

/// Whether appending `card` to `cards` qualifies for the eleveroon rule:
/// the draw is an 11, the prior best total is exactly 11, and taking the
/// card would bust the hand.
pub fn eleveroon_applies(cards: &[Card], card: &Card) -> bool {
    if !card.values.contains(&11) || best_total(cards) != 11 {
        return false;
    }
    let mut with_card = cards.to_vec();
    with_card.push(card.clone());
    classify(&with_card) == HandOutcome::Lost
}
