//! One hand of play.
//!
//! A [`Round`] owns the wall, the four seats and the turn pointer. The
//! [`RoundCounter`] carries prevailing wind, dealer index and honba from one
//! round to the next.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::player::PlayerState;
use super::rule::{GameLength, RuleSet};
use super::tile::{Tile, Wind, TOTAL_TILES};
use super::wall::Wall;

/// Tiles dealt to each seat.
pub const HAND_SIZE: usize = 13;

/// Maximum kans in one round.
pub const MAX_KANS: usize = 4;

/// Wind, dealer and honba counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundCounter {
    pub wind: Wind,
    /// Dealer seat index, 0..=3.
    pub round: u8,
    pub honba: u32,
    /// Dealer rotations so far.
    pub spent_rounds: u32,
}

impl RoundCounter {
    pub fn new(wind: Wind) -> Self {
        Self {
            wind,
            round: 0,
            honba: 0,
            spent_rounds: 0,
        }
    }

    pub fn for_length(length: GameLength) -> Self {
        Self::new(length.start_wind())
    }

    pub fn dealer(&self) -> usize {
        self.round as usize
    }

    /// Dealer keeps the seat, honba goes up.
    pub fn repeat(&mut self) {
        self.honba += 1;
    }

    /// Dealer passes to the next seat, honba resets.
    pub fn rotate(&mut self) {
        self.honba = 0;
        self.spent_rounds += 1;
        self.round = (self.round + 1) % 4;
        if self.round == 0 {
            self.wind = self.wind.next();
        }
    }

    /// Advance after a round ends.
    pub fn next(&mut self, dealer_repeats: bool) {
        if dealer_repeats {
            self.repeat();
        } else {
            self.rotate();
        }
    }

    /// Last scheduled hand of the match.
    pub fn is_all_last(&self, rule: &RuleSet) -> bool {
        self.spent_rounds + 1 >= rule.length.rounds()
    }

    /// Past the last hand extension play may reach.
    pub fn is_past_limit(&self, rule: &RuleSet) -> bool {
        let (wind, round) = rule.length.final_round();
        (self.wind, self.round) > (wind, round)
    }

    /// Wind of `seat` for this counter.
    pub fn seat_wind(&self, seat: usize) -> Wind {
        Wind::from_index((seat + 4 - self.dealer()) % 4)
    }
}

impl fmt::Display for RoundCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}-{}", self.wind, self.round + 1, self.honba)
    }
}

/// Identity for a seat when a round is dealt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatInfo {
    pub uuid: String,
    pub is_bot: bool,
    pub points: i32,
}

/// A discard that is open to claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contested {
    pub seat: usize,
    pub tile: Tile,
}

/// Kind of kan waiting on a robbing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingKanKind {
    Ankan,
    Kakan,
}

/// A declared kan that has not drawn its replacement yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingKan {
    pub seat: usize,
    pub tile: Tile,
    pub kind: PendingKanKind,
}

/// One hand of play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: u64,
    pub counter: RoundCounter,
    /// Riichi sticks on the table, carried ones included.
    pub deposits: u32,
    /// Seat whose turn it is.
    pub turn: usize,
    pub contested: Option<Contested>,
    pub pending_kan: Option<PendingKan>,
    /// A call or kan has broken the first go-around.
    pub calls_made: bool,
    /// The current turn's tile came from the dead wall.
    pub rinshan: bool,
    /// Seats that declared each kan, in order.
    pub kan_owners: Vec<usize>,
    /// Four kans by more than one seat; aborts once the next discard passes.
    pub four_kan_pending: bool,
    /// Monotonic counter for action tokens.
    pub token_seq: u32,
    wall: Wall,
    players: Vec<PlayerState>,
}

impl Round {
    /// Deal a new round. Each seat takes thirteen tiles, dealer first.
    pub fn deal(
        id: u64,
        counter: RoundCounter,
        mut wall: Wall,
        seats: [SeatInfo; 4],
        deposits: u32,
    ) -> Self {
        let dealer = counter.dealer();
        let mut players: Vec<PlayerState> = seats
            .into_iter()
            .enumerate()
            .map(|(seat, info)| {
                PlayerState::new(seat, info.uuid, info.is_bot, counter.seat_wind(seat), info.points)
            })
            .collect();

        for offset in 0..4 {
            let seat = (dealer + offset) % 4;
            let mut tiles = Vec::with_capacity(HAND_SIZE);
            for _ in 0..HAND_SIZE {
                // 52 tiles from 122 live tiles never exhausts.
                if let Ok(t) = wall.draw() {
                    tiles.push(t);
                }
            }
            players[seat].deal(tiles);
        }

        Self {
            id,
            counter,
            deposits,
            turn: dealer,
            contested: None,
            pending_kan: None,
            calls_made: false,
            rinshan: false,
            kan_owners: Vec::new(),
            four_kan_pending: false,
            token_seq: 0,
            wall,
            players,
        }
    }

    pub fn dealer(&self) -> usize {
        self.counter.dealer()
    }

    pub fn wall(&self) -> &Wall {
        &self.wall
    }

    pub(crate) fn wall_mut(&mut self) -> &mut Wall {
        &mut self.wall
    }

    pub fn players(&self) -> &[PlayerState] {
        &self.players
    }

    pub fn player(&self, seat: usize) -> &PlayerState {
        &self.players[seat % 4]
    }

    pub(crate) fn player_mut(&mut self, seat: usize) -> &mut PlayerState {
        &mut self.players[seat % 4]
    }

    /// Seat allowed to draw or discard, none while a claim window is open.
    pub fn active_seat(&self) -> Option<usize> {
        if self.contested.is_some() || self.pending_kan.is_some() {
            None
        } else {
            Some(self.turn)
        }
    }

    pub fn kan_count(&self) -> usize {
        self.kan_owners.len()
    }

    /// Discards made this round, claimed ones included.
    pub fn discard_total(&self) -> usize {
        self.players.iter().map(|p| p.discards().len()).sum()
    }

    /// Still inside the first uninterrupted go-around.
    pub fn in_first_go_around(&self) -> bool {
        !self.calls_made && self.discard_total() < 4
    }

    /// Tiles in wall, dead wall, indicators, hands, melds and table discards.
    pub fn tile_total(&self) -> usize {
        let players: usize = self
            .players
            .iter()
            .map(|p| p.tile_count() + p.table_discard_count())
            .sum();
        self.wall.remaining()
            + self.wall.dead_wall_len()
            + self.wall.dora_indicators().len()
            + players
    }

    pub fn is_conserved(&self) -> bool {
        self.tile_total() == TOTAL_TILES
    }

    pub(crate) fn next_token_seq(&mut self) -> u32 {
        self.token_seq += 1;
        self.token_seq
    }
}
