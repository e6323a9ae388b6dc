//! Tiles and seat winds.
//!
//! A [`Tile`] is a plain numeric code:
//!
//! ```text
//!  0..=8   1m..9m
//!  9..=17  1p..9p
//! 18..=26  1s..9s
//! 27..=30  E S W N
//! 31..=33  P F C   (white, green, red dragon)
//! 34..=36  5mr 5pr 5sr (red fives)
//! ```
//!
//! Red fives compare unequal to their plain counterparts but share the same
//! [`Tile::kind`], which is what hand shape analysis works with.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Number of distinct tile kinds (red fives folded).
pub const TILE_KINDS: usize = 34;

/// Number of tiles in a standard set.
pub const TOTAL_TILES: usize = 136;

const TILE_CODES: u8 = 37;

const TILE_STRINGS: [&str; TILE_CODES as usize] = [
    "1m", "2m", "3m", "4m", "5m", "6m", "7m", "8m", "9m", //
    "1p", "2p", "3p", "4p", "5p", "6p", "7p", "8p", "9p", //
    "1s", "2s", "3s", "4s", "5s", "6s", "7s", "8s", "9s", //
    "E", "S", "W", "N", "P", "F", "C", //
    "5mr", "5pr", "5sr",
];

/// A single mahjong tile.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Tile(u8);

/// Tile suits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suit {
    Man,
    Pin,
    Sou,
}

impl Tile {
    pub const EAST: Tile = Tile(27);
    pub const SOUTH: Tile = Tile(28);
    pub const WEST: Tile = Tile(29);
    pub const NORTH: Tile = Tile(30);
    pub const WHITE: Tile = Tile(31);
    pub const GREEN: Tile = Tile(32);
    pub const RED: Tile = Tile(33);

    /// Plain tile for a kind index (0..34).
    pub const fn from_kind(kind: u8) -> Option<Tile> {
        if (kind as usize) < TILE_KINDS {
            Some(Tile(kind))
        } else {
            None
        }
    }

    pub const fn code(self) -> u8 {
        self.0
    }

    /// Kind index with red fives folded onto plain fives.
    pub const fn kind(self) -> u8 {
        match self.0 {
            34 => 4,
            35 => 13,
            36 => 22,
            c => c,
        }
    }

    /// The plain (non-red) tile of the same kind.
    pub const fn plain(self) -> Tile {
        Tile(self.kind())
    }

    pub const fn is_red(self) -> bool {
        self.0 >= 34
    }

    pub const fn is_honor(self) -> bool {
        let k = self.kind();
        k >= 27
    }

    pub const fn is_wind(self) -> bool {
        let k = self.kind();
        k >= 27 && k <= 30
    }

    pub const fn is_dragon(self) -> bool {
        let k = self.kind();
        k >= 31
    }

    /// Suited 1 or 9.
    pub const fn is_terminal(self) -> bool {
        let k = self.kind();
        k < 27 && (k % 9 == 0 || k % 9 == 8)
    }

    /// Terminal or honor.
    pub const fn is_yaochu(self) -> bool {
        self.is_terminal() || self.is_honor()
    }

    pub const fn suit(self) -> Option<Suit> {
        match self.kind() {
            0..=8 => Some(Suit::Man),
            9..=17 => Some(Suit::Pin),
            18..=26 => Some(Suit::Sou),
            _ => None,
        }
    }

    /// Face value 1..=9 for suited tiles.
    pub const fn number(self) -> Option<u8> {
        let k = self.kind();
        if k < 27 {
            Some(k % 9 + 1)
        } else {
            None
        }
    }

    /// Tile indicated as dora when `self` is revealed as an indicator.
    pub const fn dora_successor(self) -> Tile {
        let k = self.kind();
        let next = match k {
            0..=26 => {
                if k % 9 == 8 {
                    k - 8
                } else {
                    k + 1
                }
            }
            27..=30 => {
                if k == 30 {
                    27
                } else {
                    k + 1
                }
            }
            _ => {
                if k == 33 {
                    31
                } else {
                    k + 1
                }
            }
        };
        Tile(next)
    }

    /// Same-suit tile `offset` steps away, if it exists.
    pub fn offset(self, offset: i8) -> Option<Tile> {
        let k = self.kind() as i16;
        if k >= 27 {
            return None;
        }
        let base = k - k % 9;
        let moved = k + offset as i16;
        if moved < base || moved > base + 8 {
            return None;
        }
        Some(Tile(moved as u8))
    }
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(TILE_STRINGS[self.0 as usize])
    }
}

impl TryFrom<u8> for Tile {
    type Error = InvalidTile;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        if code < TILE_CODES {
            Ok(Tile(code))
        } else {
            Err(InvalidTile::Code(code))
        }
    }
}

impl From<Tile> for u8 {
    fn from(tile: Tile) -> u8 {
        tile.0
    }
}

impl FromStr for Tile {
    type Err = InvalidTile;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TILE_STRINGS
            .iter()
            .position(|&t| t == s)
            .map(|i| Tile(i as u8))
            .ok_or_else(|| InvalidTile::Text(s.to_string()))
    }
}

/// Parse compact hand notation such as `"123m406p77z"`.
///
/// Digits are collected until a suit letter (`m`, `p`, `s`, `z`). In suits,
/// `0` is the red five. Honors use `1z..7z` for E S W N P F C.
pub fn parse_tiles(s: &str) -> Result<Vec<Tile>, InvalidTile> {
    let mut tiles = Vec::new();
    let mut digits: Vec<u8> = Vec::new();

    for c in s.chars() {
        if c.is_whitespace() {
            continue;
        }
        if let Some(d) = c.to_digit(10) {
            digits.push(d as u8);
            continue;
        }
        let base = match c {
            'm' => 0,
            'p' => 9,
            's' => 18,
            'z' => 27,
            _ => return Err(InvalidTile::Text(s.to_string())),
        };
        if digits.is_empty() {
            return Err(InvalidTile::Text(s.to_string()));
        }
        for d in digits.drain(..) {
            let code = match (c, d) {
                ('z', 1..=7) => base + d - 1,
                ('z', _) => return Err(InvalidTile::Text(s.to_string())),
                (_, 0) => 34 + base / 9,
                (_, 1..=9) => base + d - 1,
                _ => return Err(InvalidTile::Text(s.to_string())),
            };
            tiles.push(Tile(code));
        }
    }

    if !digits.is_empty() {
        return Err(InvalidTile::Text(s.to_string()));
    }
    Ok(tiles)
}

/// Build the standard 136-tile set, with `reds` red fives substituted.
///
/// `reds` is `[man, pin, sou]`.
pub fn standard_set(reds: [u8; 3]) -> Vec<Tile> {
    let mut tiles = Vec::with_capacity(TOTAL_TILES);
    for kind in 0..TILE_KINDS as u8 {
        let red_count = match kind {
            4 => reds[0],
            13 => reds[1],
            22 => reds[2],
            _ => 0,
        }
        .min(4);
        for copy in 0..4 {
            if copy < red_count {
                tiles.push(Tile(34 + kind / 9));
            } else {
                tiles.push(Tile(kind));
            }
        }
    }
    tiles
}

/// Count tiles by kind.
pub fn kind_counts(tiles: &[Tile]) -> [u8; TILE_KINDS] {
    let mut counts = [0u8; TILE_KINDS];
    for t in tiles {
        counts[t.kind() as usize] += 1;
    }
    counts
}

/// Invalid tile code or text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidTile {
    Code(u8),
    Text(String),
}

impl fmt::Display for InvalidTile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(c) => write!(f, "Invalid tile code {}", c),
            Self::Text(s) => write!(f, "Invalid tile notation '{}'", s),
        }
    }
}

impl std::error::Error for InvalidTile {}

/// Seat and round winds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Wind {
    #[default]
    East,
    South,
    West,
    North,
}

impl Wind {
    pub const ALL: [Wind; 4] = [Wind::East, Wind::South, Wind::West, Wind::North];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::East => "east",
            Self::South => "south",
            Self::West => "west",
            Self::North => "north",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Wind {
        Self::ALL[index % 4]
    }

    pub fn next(self) -> Wind {
        Self::from_index(self.index() + 1)
    }

    /// The honor tile for this wind.
    pub fn tile(self) -> Tile {
        Tile(27 + self as u8)
    }
}

impl fmt::Display for Wind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::East => "East",
            Self::South => "South",
            Self::West => "West",
            Self::North => "North",
        };
        f.write_str(name)
    }
}
