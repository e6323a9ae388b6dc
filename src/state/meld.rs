//! Melds (fuuro).
//!
//! A meld is fixed once formed. The only mutation is upgrading a called
//! triplet into an added kan.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::tile::Tile;

/// Meld kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeldKind {
    Chii,
    Pon,
    /// Open kan called on a discard.
    Minkan,
    /// Concealed kan from four tiles in hand.
    Ankan,
    /// Added kan upgraded from a pon.
    Kakan,
}

impl MeldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chii => "chii",
            Self::Pon => "pon",
            Self::Minkan => "minkan",
            Self::Ankan => "ankan",
            Self::Kakan => "kakan",
        }
    }

    pub fn is_kan(&self) -> bool {
        matches!(self, Self::Minkan | Self::Ankan | Self::Kakan)
    }
}

/// Where the claimed tile came from, relative to the meld owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimSource {
    SelfDrawn,
    /// The seat after the owner (shimocha).
    Right,
    /// The seat opposite the owner (toimen).
    Across,
    /// The seat before the owner (kamicha).
    Left,
}

impl ClaimSource {
    /// Direction of `discarder` as seen from `caller`.
    pub fn between(caller: usize, discarder: usize) -> Self {
        match (discarder + 4 - caller) % 4 {
            1 => Self::Right,
            2 => Self::Across,
            3 => Self::Left,
            _ => Self::SelfDrawn,
        }
    }
}

/// A committed group of tiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meld {
    kind: MeldKind,
    /// All tiles in the meld, sorted, claimed tile included.
    tiles: Vec<Tile>,
    claimed: Option<Tile>,
    source: ClaimSource,
    /// Tile added when a pon became a kakan.
    added: Option<Tile>,
}

impl Meld {
    /// Sequence from two hand tiles plus the claimed tile.
    pub fn chii(own: [Tile; 2], claimed: Tile, source: ClaimSource) -> Result<Self, MeldError> {
        if source == ClaimSource::SelfDrawn {
            return Err(MeldError::SelfClaim);
        }
        let mut kinds = [own[0].kind(), own[1].kind(), claimed.kind()];
        kinds.sort_unstable();
        let same_suit = kinds[0] < 27 && kinds[0] / 9 == kinds[2] / 9;
        if !same_suit || kinds[1] != kinds[0] + 1 || kinds[2] != kinds[0] + 2 {
            return Err(MeldError::NotSequence);
        }
        Ok(Self::open(MeldKind::Chii, &own, claimed, source))
    }

    /// Triplet from two hand tiles plus the claimed tile.
    pub fn pon(own: [Tile; 2], claimed: Tile, source: ClaimSource) -> Result<Self, MeldError> {
        if source == ClaimSource::SelfDrawn {
            return Err(MeldError::SelfClaim);
        }
        if own.iter().any(|t| t.kind() != claimed.kind()) {
            return Err(MeldError::NotMatching);
        }
        Ok(Self::open(MeldKind::Pon, &own, claimed, source))
    }

    /// Open kan from three hand tiles plus the claimed tile.
    pub fn minkan(own: [Tile; 3], claimed: Tile, source: ClaimSource) -> Result<Self, MeldError> {
        if source == ClaimSource::SelfDrawn {
            return Err(MeldError::SelfClaim);
        }
        if own.iter().any(|t| t.kind() != claimed.kind()) {
            return Err(MeldError::NotMatching);
        }
        Ok(Self::open(MeldKind::Minkan, &own, claimed, source))
    }

    /// Concealed kan.
    pub fn ankan(tiles: [Tile; 4]) -> Result<Self, MeldError> {
        if tiles.iter().any(|t| t.kind() != tiles[0].kind()) {
            return Err(MeldError::NotMatching);
        }
        let mut tiles = tiles.to_vec();
        tiles.sort_unstable();
        Ok(Self {
            kind: MeldKind::Ankan,
            tiles,
            claimed: None,
            source: ClaimSource::SelfDrawn,
            added: None,
        })
    }

    fn open(kind: MeldKind, own: &[Tile], claimed: Tile, source: ClaimSource) -> Self {
        let mut tiles = own.to_vec();
        tiles.push(claimed);
        tiles.sort_unstable();
        Self {
            kind,
            tiles,
            claimed: Some(claimed),
            source,
            added: None,
        }
    }

    /// Upgrade a pon to an added kan.
    pub fn upgrade_to_kakan(&mut self, added: Tile) -> Result<(), MeldError> {
        if self.kind != MeldKind::Pon {
            return Err(MeldError::NotPon);
        }
        if added.kind() != self.tiles[0].kind() {
            return Err(MeldError::NotMatching);
        }
        self.kind = MeldKind::Kakan;
        self.tiles.push(added);
        self.tiles.sort_unstable();
        self.added = Some(added);
        Ok(())
    }

    pub fn kind(&self) -> MeldKind {
        self.kind
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn claimed(&self) -> Option<Tile> {
        self.claimed
    }

    pub fn source(&self) -> ClaimSource {
        self.source
    }

    pub fn added(&self) -> Option<Tile> {
        self.added
    }

    /// Kind of the lowest tile.
    pub fn base_kind(&self) -> u8 {
        self.tiles[0].kind()
    }

    pub fn is_concealed(&self) -> bool {
        self.kind == MeldKind::Ankan
    }

    pub fn is_kan(&self) -> bool {
        self.kind.is_kan()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

impl fmt::Display for Meld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind.as_str())?;
        for (i, t) in self.tiles.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", t)?;
        }
        write!(f, ")")
    }
}

/// Meld construction errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeldError {
    NotSequence,
    NotMatching,
    NotPon,
    SelfClaim,
}

impl fmt::Display for MeldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSequence => write!(f, "Tiles do not form a sequence"),
            Self::NotMatching => write!(f, "Tiles are not all the same kind"),
            Self::NotPon => write!(f, "Only a pon can become an added kan"),
            Self::SelfClaim => write!(f, "A called meld needs a discarding seat"),
        }
    }
}

impl std::error::Error for MeldError {}
