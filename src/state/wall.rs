//! The wall: live tiles, dead wall and dora indicators.
//!
//! ```text
//!  draw order ──▶
//! ┌──────────────────────────────── live (122) ───────┬─ dead (14) ─────────────┐
//! │ t0 t1 t2 ...                               t121  │ R R R R │ D×5 │ U×5     │
//! └───────────────────────────────────────────────────┴─────────┴─────┴─────────┘
//!                                                     replacements  dora  ura
//! ```
//!
//! One dora indicator is revealed at round start and one more per kan. Each
//! replacement draw moves the last live tile into the dead wall so the dead
//! wall keeps its size.

use std::fmt;

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::rule::RedFive;
use super::tile::{kind_counts, standard_set, Tile, TOTAL_TILES};

/// Tiles held back from normal draws.
pub const DEAD_WALL_SIZE: usize = 14;

/// Replacement tiles in the dead wall.
pub const REPLACEMENT_TILES: usize = 4;

/// One initial indicator plus four kan indicators.
pub const MAX_DORA_INDICATORS: usize = 5;

/// Wall state for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wall {
    /// Live tiles, next draw at the end.
    live: Vec<Tile>,
    /// Replacement tiles, next draw at the end.
    replacements: Vec<Tile>,
    /// Unrevealed dora indicator slots, next reveal first.
    dora_slots: Vec<Tile>,
    /// Ura indicators, paired with dora indicators by position.
    ura: Vec<Tile>,
    /// Revealed dora indicators.
    revealed: Vec<Tile>,
    seed: u64,
    salt: String,
    digest: String,
}

impl Wall {
    /// Shuffle a fresh standard set with a seeded ChaCha8 stream.
    pub fn shuffled(seed: u64, red_five: RedFive) -> Self {
        let mut tiles = standard_set(red_five.per_suit());
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        fisher_yates_shuffle(&mut tiles, &mut rng);
        let salt = format!("{:016x}", rng.next_u64());

        // Length is always TOTAL_TILES here.
        let mut wall = Self::split(tiles, seed, salt);
        wall.reveal_dora_indicator();
        wall
    }

    /// Build a wall from a full 136-tile draw sequence.
    ///
    /// Tiles `0..122` are drawn in order, `122..126` are the replacement
    /// tiles, `126..131` the dora indicators and `131..136` the ura indicators.
    pub fn from_sequence(sequence: Vec<Tile>, seed: u64) -> Result<Self, WallError> {
        if sequence.len() != TOTAL_TILES {
            return Err(WallError::BadLength(sequence.len()));
        }
        if let Some(tile) = over_limit(&sequence) {
            return Err(WallError::TooManyCopies(tile));
        }
        let mut wall = Self::split(sequence, seed, String::new());
        wall.reveal_dora_indicator();
        Ok(wall)
    }

    /// Build a wall whose first draws are `front`, padded with the rest of a
    /// plain standard set in ascending order.
    pub fn arranged(front: &[Tile]) -> Result<Self, WallError> {
        let mut rest = standard_set([0, 0, 0]);
        for tile in front {
            let pos = rest
                .iter()
                .position(|t| t == tile)
                .or_else(|| rest.iter().position(|t| t.kind() == tile.kind()))
                .ok_or(WallError::TooManyCopies(*tile))?;
            rest.remove(pos);
        }
        let mut sequence = front.to_vec();
        sequence.extend(rest);
        Self::from_sequence(sequence, 0)
    }

    fn split(sequence: Vec<Tile>, seed: u64, salt: String) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        for t in &sequence {
            hasher.update([t.code()]);
        }
        let digest = format!("{:x}", hasher.finalize());

        let live_len = TOTAL_TILES - DEAD_WALL_SIZE;
        let mut live = sequence[..live_len].to_vec();
        live.reverse();
        let dead = &sequence[live_len..];
        let mut replacements = dead[..REPLACEMENT_TILES].to_vec();
        replacements.reverse();
        let dora_slots = dead[REPLACEMENT_TILES..REPLACEMENT_TILES + MAX_DORA_INDICATORS].to_vec();
        let ura = dead[REPLACEMENT_TILES + MAX_DORA_INDICATORS..].to_vec();

        Self {
            live,
            replacements,
            dora_slots,
            ura,
            revealed: Vec::new(),
            seed,
            salt,
            digest,
        }
    }

    /// Draw the next live tile.
    pub fn draw(&mut self) -> Result<Tile, WallError> {
        self.live.pop().ok_or(WallError::Exhausted)
    }

    /// Draw a replacement tile after a kan.
    pub fn draw_replacement(&mut self) -> Result<Tile, WallError> {
        let tile = self
            .replacements
            .pop()
            .ok_or(WallError::DeadWallExhausted)?;
        // The last live tile slides into the dead wall.
        if !self.live.is_empty() {
            let moved = self.live.remove(0);
            self.replacements.insert(0, moved);
        }
        Ok(tile)
    }

    /// Reveal the next dora indicator. No-op once five are showing.
    pub fn reveal_dora_indicator(&mut self) -> Option<Tile> {
        if self.revealed.len() >= MAX_DORA_INDICATORS || self.dora_slots.is_empty() {
            return None;
        }
        let tile = self.dora_slots.remove(0);
        self.revealed.push(tile);
        Some(tile)
    }

    /// Tiles left for normal draws.
    pub fn remaining(&self) -> usize {
        self.live.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.live.is_empty()
    }

    /// Tiles still in the dead wall (revealed indicators excluded).
    pub fn dead_wall_len(&self) -> usize {
        self.replacements.len() + self.dora_slots.len() + self.ura.len()
    }

    pub fn dora_indicators(&self) -> &[Tile] {
        &self.revealed
    }

    /// Ura indicators under the revealed dora indicators.
    pub fn ura_indicators(&self) -> &[Tile] {
        let n = self.revealed.len().min(self.ura.len());
        &self.ura[..n]
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// SHA-256 commitment over the salt and the full initial sequence.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }
}

/// Fisher-Yates over a seeded generator, independent of `SliceRandom`.
fn fisher_yates_shuffle<T>(slice: &mut [T], rng: &mut impl Rng) {
    for i in (1..slice.len()).rev() {
        let j = rng.gen_range(0..=i);
        slice.swap(i, j);
    }
}

fn over_limit(tiles: &[Tile]) -> Option<Tile> {
    let counts = kind_counts(tiles);
    counts
        .iter()
        .position(|&c| c > 4)
        .and_then(|k| Tile::from_kind(k as u8))
}

/// Wall errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WallError {
    /// No live tiles left. Ends the round in an exhaustive draw.
    Exhausted,
    /// No replacement tiles left.
    DeadWallExhausted,
    BadLength(usize),
    TooManyCopies(Tile),
}

impl fmt::Display for WallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "Live wall is empty"),
            Self::DeadWallExhausted => write!(f, "Dead wall has no replacement tiles"),
            Self::BadLength(n) => write!(f, "Wall must hold {} tiles, got {}", TOTAL_TILES, n),
            Self::TooManyCopies(t) => write!(f, "More than four copies of {}", t),
        }
    }
}

impl std::error::Error for WallError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tile::parse_tiles;

    fn total(wall: &Wall) -> usize {
        wall.remaining() + wall.dead_wall_len() + wall.dora_indicators().len()
    }

    #[test]
    fn test_shuffle_is_deterministic() {
        let a = Wall::shuffled(42, RedFive::Three);
        let b = Wall::shuffled(42, RedFive::Three);
        let c = Wall::shuffled(43, RedFive::Three);
        assert_eq!(a, b);
        assert_ne!(a.digest(), c.digest());
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn test_initial_layout() {
        let wall = Wall::shuffled(7, RedFive::None);
        assert_eq!(wall.remaining(), 122);
        assert_eq!(wall.dead_wall_len(), 13);
        assert_eq!(wall.dora_indicators().len(), 1);
        assert_eq!(wall.ura_indicators().len(), 1);
        assert_eq!(total(&wall), TOTAL_TILES);
    }

    #[test]
    fn test_draw_until_exhausted() {
        let mut wall = Wall::shuffled(1, RedFive::None);
        for _ in 0..122 {
            wall.draw().unwrap();
        }
        assert!(wall.is_exhausted());
        assert_eq!(wall.draw(), Err(WallError::Exhausted));
    }

    #[test]
    fn test_replacement_keeps_dead_wall_size() {
        let mut wall = Wall::shuffled(5, RedFive::None);
        wall.draw_replacement().unwrap();
        wall.reveal_dora_indicator();
        assert_eq!(wall.remaining(), 121);
        assert_eq!(wall.dead_wall_len() + wall.dora_indicators().len(), DEAD_WALL_SIZE);
    }

    #[test]
    fn test_dora_reveal_capped() {
        let mut wall = Wall::shuffled(9, RedFive::None);
        for _ in 0..4 {
            assert!(wall.reveal_dora_indicator().is_some());
        }
        assert_eq!(wall.reveal_dora_indicator(), None);
        assert_eq!(wall.dora_indicators().len(), MAX_DORA_INDICATORS);
        assert_eq!(total(&wall), TOTAL_TILES);
    }

    #[test]
    fn test_arranged_front() {
        let front = parse_tiles("123m").unwrap();
        let mut wall = Wall::arranged(&front).unwrap();
        assert_eq!(wall.draw().unwrap(), front[0]);
        assert_eq!(wall.draw().unwrap(), front[1]);
        assert_eq!(wall.draw().unwrap(), front[2]);

        let five = parse_tiles("11111m").unwrap();
        assert!(matches!(
            Wall::arranged(&five),
            Err(WallError::TooManyCopies(_))
        ));
    }

    #[test]
    fn test_from_sequence_rejects_bad_length() {
        assert_eq!(
            Wall::from_sequence(parse_tiles("1m").unwrap(), 0),
            Err(WallError::BadLength(1))
        );
    }
}
