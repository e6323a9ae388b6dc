//! Table rule set.
//!
//! Rules are chosen by the host before a match starts and persisted as JSON.
//! Unknown or missing fields fall back to the defaults below.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::tile::Wind;

/// Highest starting points a table may configure.
pub const MAX_POINTS: i32 = 200_000;

/// Lowest starting points a table may configure.
pub const MIN_POINTS: i32 = 100;

/// Points paid into the pool by a riichi declaration.
pub const RIICHI_DEPOSIT: i32 = 1000;

/// Match length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameLength {
    /// A single hand.
    OneGame,
    /// East round only (tonpuusen).
    East,
    /// South round only.
    South,
    /// East and South rounds (hanchan).
    #[default]
    TwoWind,
}

impl GameLength {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneGame => "one_game",
            Self::East => "east",
            Self::South => "south",
            Self::TwoWind => "two_wind",
        }
    }

    /// Prevailing wind of the first hand.
    pub fn start_wind(&self) -> Wind {
        match self {
            Self::South => Wind::South,
            _ => Wind::East,
        }
    }

    /// Dealer rotations that make up the regular match.
    pub fn rounds(&self) -> u32 {
        match self {
            Self::OneGame => 1,
            Self::East | Self::South => 4,
            Self::TwoWind => 8,
        }
    }

    /// Last hand that extension play may reach, as `(wind, dealer index)`.
    pub fn final_round(&self) -> (Wind, u8) {
        match self {
            Self::OneGame => (Wind::East, 3),
            Self::East => (Wind::South, 3),
            Self::South | Self::TwoWind => (Wind::West, 3),
        }
    }
}

/// Thinking time per decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingTime {
    VeryShort,
    Short,
    #[default]
    Normal,
    Long,
    VeryLong,
}

impl ThinkingTime {
    /// Base seconds for every decision.
    pub fn base_secs(&self) -> i64 {
        match self {
            Self::VeryShort => 3,
            Self::Short => 5,
            Self::Normal => 5,
            Self::Long => 60,
            Self::VeryLong => 300,
        }
    }

    /// Extra seconds granted on a player's own turn.
    pub fn extra_secs(&self) -> i64 {
        match self {
            Self::VeryShort => 5,
            Self::Short => 10,
            Self::Normal => 20,
            Self::Long | Self::VeryLong => 0,
        }
    }

    /// Claim window length in milliseconds.
    pub fn claim_ms(&self) -> i64 {
        self.base_secs() * 1000
    }

    /// Own-turn deadline in milliseconds.
    pub fn turn_ms(&self) -> i64 {
        (self.base_secs() + self.extra_secs()) * 1000
    }
}

/// Minimum han required to win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinimumHan {
    #[default]
    One,
    Two,
    Four,
    Yakuman,
}

impl MinimumHan {
    pub fn value(&self) -> u32 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Four => 4,
            Self::Yakuman => 13,
        }
    }
}

/// Red five configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedFive {
    #[default]
    None,
    /// One red five per suit.
    Three,
    /// Two red pin fives, one each of man and sou.
    Four,
}

impl RedFive {
    /// Red fives per suit as `[man, pin, sou]`.
    pub fn per_suit(&self) -> [u8; 3] {
        match self {
            Self::None => [0, 0, 0],
            Self::Three => [1, 1, 1],
            Self::Four => [1, 2, 1],
        }
    }
}

/// How simultaneous ron on one discard is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultipleRon {
    /// Every claimant wins. Honba and deposits go to the claimant nearest
    /// downstream of the discarder.
    #[default]
    All,
    /// Only the claimant nearest downstream of the discarder wins.
    HeadBump,
}

/// Full rule set for a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    pub length: GameLength,
    pub thinking_time: ThinkingTime,
    pub starting_points: i32,
    pub min_points_to_win: i32,
    pub minimum_han: MinimumHan,
    pub spectate: bool,
    pub red_five: RedFive,
    pub open_tanyao: bool,
    pub local_yaku: bool,
    pub multiple_ron: MultipleRon,
    pub bankruptcy_ends_game: bool,
    pub nagashi_mangan: bool,
    pub ron_on_ankan_for_kokushi: bool,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            length: GameLength::TwoWind,
            thinking_time: ThinkingTime::Normal,
            starting_points: 25_000,
            min_points_to_win: 30_000,
            minimum_han: MinimumHan::One,
            spectate: true,
            red_five: RedFive::None,
            open_tanyao: false,
            local_yaku: false,
            multiple_ron: MultipleRon::All,
            bankruptcy_ends_game: true,
            nagashi_mangan: true,
            ron_on_ankan_for_kokushi: true,
        }
    }
}

impl RuleSet {
    /// Parse and validate a persisted rule set.
    pub fn from_json_str(s: &str) -> Result<Self, RuleError> {
        let rule: RuleSet =
            serde_json::from_str(s).map_err(|e| RuleError::Malformed(e.to_string()))?;
        rule.validate()?;
        Ok(rule)
    }

    pub fn to_json_string(&self) -> String {
        // Plain enums and integers always serialize.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Check numeric fields are within table limits.
    pub fn validate(&self) -> Result<(), RuleError> {
        if !(MIN_POINTS..=MAX_POINTS).contains(&self.starting_points) {
            return Err(RuleError::OutOfRange {
                field: "starting_points",
                value: self.starting_points as i64,
            });
        }
        if !(MIN_POINTS..=MAX_POINTS).contains(&self.min_points_to_win) {
            return Err(RuleError::OutOfRange {
                field: "min_points_to_win",
                value: self.min_points_to_win as i64,
            });
        }
        Ok(())
    }
}

/// Rule set errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    Malformed(String),
    OutOfRange { field: &'static str, value: i64 },
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "Malformed rule set: {}", e),
            Self::OutOfRange { field, value } => {
                write!(f, "Rule field {} out of range: {}", field, value)
            }
        }
    }
}

impl std::error::Error for RuleError {}
