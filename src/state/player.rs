//! Per-seat player state for one round.
//!
//! Created from the session's point totals when a round is dealt and merged
//! back through the round's settlement. Mutators are crate-private: only the
//! turn engine changes a seat.

use serde::{Deserialize, Serialize};

use super::hand;
use super::meld::{Meld, MeldKind};
use super::tile::{kind_counts, Tile, Wind};

/// Riichi status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiichiStatus {
    #[default]
    None,
    Riichi,
    DoubleRiichi,
}

impl RiichiStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Riichi => "riichi",
            Self::DoubleRiichi => "double_riichi",
        }
    }

    pub fn is_declared(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// One discarded tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discard {
    pub tile: Tile,
    /// Taken into another seat's meld.
    pub claimed: bool,
    /// The riichi declaration tile.
    pub riichi: bool,
    /// Discarded straight after drawing it.
    pub tsumogiri: bool,
}

/// Furiten flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Furiten {
    /// A waiting tile is in the seat's own discards.
    pub discard: bool,
    /// Passed a ron since the seat's last discard.
    pub temporary: bool,
    /// Passed a ron while in riichi. Lasts the whole round.
    pub riichi: bool,
}

impl Furiten {
    pub fn is_active(&self) -> bool {
        self.discard || self.temporary || self.riichi
    }
}

/// State of one seat during a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub seat: usize,
    /// Stable identity of the occupant.
    pub uuid: String,
    pub is_bot: bool,
    pub seat_wind: Wind,
    pub points: i32,
    pub riichi: RiichiStatus,
    /// Declared riichi whose tile is still in a claim window.
    pub riichi_pending: bool,
    /// Riichi accepted during this round (deposit paid).
    pub riichi_paid: bool,
    pub ippatsu: bool,
    pub furiten: Furiten,
    pub connected: bool,
    hand: Vec<Tile>,
    melds: Vec<Meld>,
    discards: Vec<Discard>,
    drawn: Option<Tile>,
    /// Kinds barred from the next discard after a call.
    forbidden: Vec<u8>,
}

impl PlayerState {
    pub fn new(seat: usize, uuid: String, is_bot: bool, seat_wind: Wind, points: i32) -> Self {
        Self {
            seat,
            uuid,
            is_bot,
            seat_wind,
            points,
            riichi: RiichiStatus::None,
            riichi_pending: false,
            riichi_paid: false,
            ippatsu: false,
            furiten: Furiten::default(),
            connected: true,
            hand: Vec::new(),
            melds: Vec::new(),
            discards: Vec::new(),
            drawn: None,
            forbidden: Vec::new(),
        }
    }

    pub fn hand(&self) -> &[Tile] {
        &self.hand
    }

    pub fn melds(&self) -> &[Meld] {
        &self.melds
    }

    pub fn discards(&self) -> &[Discard] {
        &self.discards
    }

    /// Tile drawn this turn, if the seat has not discarded yet.
    pub fn drawn(&self) -> Option<Tile> {
        self.drawn
    }

    pub fn forbidden_kinds(&self) -> &[u8] {
        &self.forbidden
    }

    pub fn is_dealer(&self) -> bool {
        self.seat_wind == Wind::East
    }

    /// No called melds (concealed kans allowed).
    pub fn is_closed(&self) -> bool {
        self.melds.iter().all(|m| m.is_concealed())
    }

    pub fn kan_count(&self) -> usize {
        self.melds.iter().filter(|m| m.is_kan()).count()
    }

    /// Tiles held in hand and melds.
    pub fn tile_count(&self) -> usize {
        self.hand.len() + self.melds.iter().map(|m| m.len()).sum::<usize>()
    }

    /// Discards still on the table.
    pub fn table_discard_count(&self) -> usize {
        self.discards.iter().filter(|d| !d.claimed).count()
    }

    pub fn waits(&self) -> Vec<u8> {
        hand::waits(&self.hand, self.melds.len())
    }

    pub fn is_tenpai(&self) -> bool {
        hand::is_tenpai(&self.hand, self.melds.len())
    }

    /// Hand plus `tile` forms a complete shape.
    pub fn completes_with(&self, tile: Tile) -> bool {
        let mut tiles = self.hand.clone();
        tiles.push(tile);
        hand::is_complete(&tiles, self.melds.len())
    }

    pub fn has_complete_hand(&self) -> bool {
        hand::is_complete(&self.hand, self.melds.len())
    }

    /// Furiten at this moment, discard furiten recomputed from the pile.
    pub fn is_furiten(&self) -> bool {
        self.furiten.temporary || self.furiten.riichi || self.discard_furiten()
    }

    fn discard_furiten(&self) -> bool {
        let waits = self.waits();
        self.discards
            .iter()
            .any(|d| waits.contains(&d.tile.kind()))
    }

    /// Every discard is a terminal or honor and none was called.
    pub fn nagashi_eligible(&self) -> bool {
        !self.discards.is_empty()
            && self.discards.iter().all(|d| d.tile.is_yaochu() && !d.claimed)
    }

    pub fn count_kind(&self, kind: u8) -> usize {
        kind_counts(&self.hand)[kind as usize] as usize
    }

    /// Hand tiles of `kind`, red fives first.
    pub fn tiles_of_kind(&self, kind: u8) -> Vec<Tile> {
        let mut tiles: Vec<Tile> = self
            .hand
            .iter()
            .copied()
            .filter(|t| t.kind() == kind)
            .collect();
        tiles.sort_by_key(|t| !t.is_red());
        tiles
    }

    /// Whether `tile` may be discarded now.
    pub fn can_discard(&self, tile: Tile) -> bool {
        if !self.hand.contains(&tile) {
            return false;
        }
        if self.riichi.is_declared() && !self.riichi_pending {
            return self.drawn == Some(tile);
        }
        !self.forbidden.contains(&tile.kind())
    }

    /// Tiles the seat may not discard now.
    pub fn forbidden_discards(&self) -> Vec<Tile> {
        let mut out: Vec<Tile> = Vec::new();
        for &t in &self.hand {
            if !self.can_discard(t) && !out.contains(&t) {
                out.push(t);
            }
        }
        out
    }

    pub(crate) fn deal(&mut self, tiles: Vec<Tile>) {
        self.hand = tiles;
        self.hand.sort_unstable();
    }

    pub(crate) fn draw(&mut self, tile: Tile) {
        self.hand.push(tile);
        self.drawn = Some(tile);
    }

    /// Remove one copy of `tile`. Returns false if not held.
    pub(crate) fn take(&mut self, tile: Tile) -> bool {
        match self.hand.iter().position(|&t| t == tile) {
            Some(i) => {
                self.hand.remove(i);
                true
            }
            None => false,
        }
    }

    /// Discard `tile`, which must already be checked with [`can_discard`].
    ///
    /// [`can_discard`]: PlayerState::can_discard
    pub(crate) fn discard(&mut self, tile: Tile, riichi: bool) -> Discard {
        self.take(tile);
        let discard = Discard {
            tile,
            claimed: false,
            riichi,
            tsumogiri: self.drawn == Some(tile),
        };
        self.discards.push(discard);
        self.drawn = None;
        self.forbidden.clear();
        self.hand.sort_unstable();
        self.furiten.temporary = false;
        self.furiten.discard = self.discard_furiten();
        discard
    }

    pub(crate) fn mark_last_discard_claimed(&mut self) {
        if let Some(d) = self.discards.last_mut() {
            d.claimed = true;
        }
    }

    pub(crate) fn add_meld(&mut self, meld: Meld, forbidden: Vec<u8>) {
        self.melds.push(meld);
        self.forbidden = forbidden;
        self.drawn = None;
    }

    /// Upgrade the pon of `tile`'s kind to an added kan.
    pub(crate) fn upgrade_pon(&mut self, tile: Tile) -> bool {
        let Some(meld) = self
            .melds
            .iter_mut()
            .find(|m| m.kind() == MeldKind::Pon && m.base_kind() == tile.kind())
        else {
            return false;
        };
        if meld.upgrade_to_kakan(tile).is_err() {
            return false;
        }
        self.take(tile);
        self.drawn = None;
        true
    }
}
