use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Number of distinct card names in the Kvitlach deck.
pub const DISTINCT_CARDS: u32 = 12;
/// Copies of each card in a single shoe.
pub const COPIES_PER_SHOE: u32 = 4;
/// Cards in one shoe (12 names x 4 copies).
pub const SHOE_SIZE: u32 = DISTINCT_CARDS * COPIES_PER_SHOE;
/// Upper bound on the number of shoes a round may use.
pub const MAX_SHOE_COUNT: u32 = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardKind {
    Rosier,
}

/// A single card. `values` holds every legal point value; only the "12"
/// carries more than one. Immutable once dealt, except for the eleveroon
/// marker which a draw may set exactly once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub name: String,
    pub values: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub kind: Option<CardKind>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub eleveroon_ignored: bool,
}

impl Card {
    pub fn new(rank: u32) -> Self {
        let values = match rank {
            12 => vec![12, 9, 10],
            other => vec![other],
        };
        let kind = match rank {
            2 | 11 => Some(CardKind::Rosier),
            _ => None,
        };
        Self {
            name: rank.to_string(),
            values,
            kind,
            eleveroon_ignored: false,
        }
    }

    pub fn is_rosier(&self) -> bool {
        self.kind == Some(CardKind::Rosier)
    }
}

/// One unshuffled shoe: four copies of each of the twelve cards.
pub fn single_shoe() -> Vec<Card> {
    let mut cards = Vec::with_capacity(SHOE_SIZE as usize);
    for rank in 1..=DISTINCT_CARDS {
        for _ in 0..COPIES_PER_SHOE {
            cards.push(Card::new(rank));
        }
    }
    cards
}

/// Build a shuffled shoe of `shoe_count` decks using the provided RNG.
pub fn build_shoe_with(shoe_count: u32, rng: &mut StdRng) -> Vec<Card> {
    let shoe_count = shoe_count.clamp(1, MAX_SHOE_COUNT);
    let mut cards = Vec::with_capacity((shoe_count * SHOE_SIZE) as usize);
    for _ in 0..shoe_count {
        cards.extend(single_shoe());
    }
    cards.shuffle(rng);
    cards
}

/// Build a shuffled shoe seeded from the platform entropy source.
pub fn build_shoe(shoe_count: u32) -> Vec<Card> {
    let mut rng = StdRng::from_entropy();
    build_shoe_with(shoe_count, &mut rng)
}

/// Default shoe count for a table of `player_count` seats:
/// ceil((6 * players + 6) / 48), clamped to [1, 16].
pub fn default_shoe_count(player_count: usize) -> u32 {
    let needed = 6 * player_count as u32 + 6;
    needed.div_ceil(SHOE_SIZE).clamp(1, MAX_SHOE_COUNT)
}
