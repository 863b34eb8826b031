use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use setgrid_types::Card;

/// Cards not currently on the grid. Owned by the dealer.
#[derive(Debug)]
pub struct Deck {
    cards: Vec<Card>,
    rng: StdRng,
}

impl Deck {
    /// A deck holding cards `0..deck_size`.
    pub fn new(deck_size: u32, seed: u64) -> Self {
        Self::from_cards((0..deck_size).map(Card).collect(), seed)
    }

    pub fn from_cards(cards: Vec<Card>, seed: u64) -> Self {
        Self {
            cards,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn shuffle(&mut self) {
        self.cards.shuffle(&mut self.rng);
    }

    /// Takes the top card.
    pub fn draw(&mut self) -> Option<Card> {
        self.cards.pop()
    }

    pub fn return_cards(&mut self, cards: Vec<Card>) {
        self.cards.extend(cards);
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }
}
