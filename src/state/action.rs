//! Action requests and responses exchanged with seat occupants.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::tile::Tile;

/// Identifies one outstanding request. Responses carrying an older token
/// are stale and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionToken {
    pub round_id: u64,
    pub seq: u32,
}

impl fmt::Display for ActionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.round_id, self.seq)
    }
}

/// An option offered to a seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AvailableAction {
    Discard { forbidden: Vec<Tile> },
    Riichi { discards: Vec<Tile> },
    Tsumo,
    /// One tile per kind that can form a concealed kan.
    Ankan { tiles: Vec<Tile> },
    /// One tile per pon that can be upgraded.
    Kakan { tiles: Vec<Tile> },
    KyuushuKyuuhai,
    Ron,
    Pon,
    Minkan,
    Chii { options: Vec<[Tile; 2]> },
}

impl AvailableAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discard { .. } => "discard",
            Self::Riichi { .. } => "riichi",
            Self::Tsumo => "tsumo",
            Self::Ankan { .. } => "ankan",
            Self::Kakan { .. } => "kakan",
            Self::KyuushuKyuuhai => "kyuushu_kyuuhai",
            Self::Ron => "ron",
            Self::Pon => "pon",
            Self::Minkan => "minkan",
            Self::Chii { .. } => "chii",
        }
    }
}

/// A seat's answer to an [`ActionRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "tile", rename_all = "snake_case")]
pub enum ActionChoice {
    Discard(Tile),
    Riichi(Tile),
    Tsumo,
    Ankan(Tile),
    Kakan(Tile),
    KyuushuKyuuhai,
    Ron,
    Pon,
    Minkan,
    Chii([Tile; 2]),
    /// Decline every offered call.
    Pass,
}

impl ActionChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discard(_) => "discard",
            Self::Riichi(_) => "riichi",
            Self::Tsumo => "tsumo",
            Self::Ankan(_) => "ankan",
            Self::Kakan(_) => "kakan",
            Self::KyuushuKyuuhai => "kyuushu_kyuuhai",
            Self::Ron => "ron",
            Self::Pon => "pon",
            Self::Minkan => "minkan",
            Self::Chii(_) => "chii",
            Self::Pass => "pass",
        }
    }
}

/// "Will you act on this, before the deadline?"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub token: ActionToken,
    pub seat: usize,
    pub actions: Vec<AvailableAction>,
    /// Discard under contention, for claim requests.
    pub tile: Option<Tile>,
    pub deadline: chrono::DateTime<chrono::Utc>,
    pub deadline_ms: i64,
}

impl ActionRequest {
    pub fn is_claim(&self) -> bool {
        self.tile.is_some()
    }

    pub fn offers(&self, name: &str) -> bool {
        self.actions.iter().any(|a| a.as_str() == name)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "token": self.token.to_string(),
            "seat": self.seat,
            "actions": self.actions.iter().map(|a| a.as_str()).collect::<Vec<_>>(),
            "tile": self.tile.map(|t| t.to_string()),
            "deadline_ms": self.deadline_ms
        })
    }
}
