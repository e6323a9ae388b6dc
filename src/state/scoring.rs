//! Scoring oracle boundary.
//!
//! Yaku, han, fu and point tables are computed outside this crate. The
//! engine only checks hand shapes and hands the oracle everything it needs
//! to price a win.

use serde::{Deserialize, Serialize};

use super::meld::Meld;
use super::player::RiichiStatus;
use super::tile::{Tile, Wind};

/// Situation around a win.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringContext {
    pub dora_indicators: Vec<Tile>,
    /// Only filled for riichi winners.
    pub ura_indicators: Vec<Tile>,
    pub seat_wind: Wind,
    pub round_wind: Wind,
    pub riichi: RiichiStatus,
    pub ippatsu: bool,
    pub tsumo: bool,
    /// Win on a kan replacement tile.
    pub rinshan: bool,
    /// Win by robbing a kan.
    pub chankan: bool,
    /// Win on the last tile of the live wall.
    pub last_tile: bool,
    /// Win in the first uninterrupted go-around.
    pub first_turn: bool,
    pub is_dealer: bool,
    pub honba: u32,
    pub open_tanyao: bool,
    pub local_yaku: bool,
}

/// Input to the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRequest {
    /// Concealed tiles without the winning tile.
    pub hand: Vec<Tile>,
    pub melds: Vec<Meld>,
    pub winning_tile: Tile,
    pub context: ScoringContext,
}

/// A scored yaku.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Yaku {
    pub name: String,
    pub han: u32,
}

impl Yaku {
    pub fn new(name: impl Into<String>, han: u32) -> Self {
        Self {
            name: name.into(),
            han,
        }
    }
}

/// Oracle verdict for a winning hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringResult {
    pub yaku: Vec<Yaku>,
    pub han: u32,
    pub fu: u32,
    /// Full hand value for this winner, dealer bonus applied, honba excluded.
    pub score: i32,
}

impl ScoringResult {
    /// Whether the hand reaches `minimum` han. Yakuman counts as 13.
    pub fn meets_minimum(&self, minimum: u32) -> bool {
        !self.yaku.is_empty() && self.han >= minimum
    }
}

/// Prices winning hands.
///
/// Returns `None` when the hand has no yaku.
pub trait ScoringOracle: Send + Sync {
    fn evaluate(&self, request: &ScoringRequest) -> Option<ScoringResult>;
}
