//! Round snapshots for durable storage.
//!
//! A snapshot is the whole [`Round`] plus where the turn engine stood. Open
//! claim windows are not kept: on restore the window reopens with a fresh
//! deadline and every eligible seat is asked again.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::engine::TurnPhase;
use super::round::{Round, MAX_KANS};
use super::tile::TOTAL_TILES;

/// Snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Saved round state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub version: u32,
    pub round: Round,
    pub phase: TurnPhase,
    pub saved_at: chrono::DateTime<chrono::Utc>,
}

impl RoundSnapshot {
    pub fn new(round: Round, phase: TurnPhase) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            round,
            phase,
            saved_at: chrono::Utc::now(),
        }
    }

    /// Check the snapshot describes a playable round.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::Version(self.version));
        }
        if self.round.players().len() != 4 {
            return Err(SnapshotError::SeatCount(self.round.players().len()));
        }
        let total = self.round.tile_total();
        if total != TOTAL_TILES {
            return Err(SnapshotError::TileCount(total));
        }
        self.validate_seats()
    }

    /// Every seat index in the round and phase must name one of the four seats.
    fn validate_seats(&self) -> Result<(), SnapshotError> {
        let round = &self.round;
        let seats = [
            ("counter.round", Some(round.counter.dealer())),
            ("turn", Some(round.turn)),
            ("contested", round.contested.map(|c| c.seat)),
            ("pending_kan", round.pending_kan.map(|k| k.seat)),
            ("phase", self.phase.seat()),
        ];
        for (field, seat) in seats {
            if let Some(seat) = seat.filter(|&s| s >= 4) {
                return Err(SnapshotError::SeatOutOfRange { field, seat });
            }
        }
        if let Some(&seat) = round.kan_owners.iter().find(|&&s| s >= 4) {
            return Err(SnapshotError::SeatOutOfRange {
                field: "kan_owners",
                seat,
            });
        }
        if round.kan_owners.len() > MAX_KANS {
            return Err(SnapshotError::KanCount(round.kan_owners.len()));
        }
        for (i, p) in round.players().iter().enumerate() {
            if p.seat != i {
                return Err(SnapshotError::SeatOutOfRange {
                    field: "players",
                    seat: p.seat,
                });
            }
        }
        Ok(())
    }

    pub fn to_json_string(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(self).map_err(|e| SnapshotError::Malformed(e.to_string()))
    }

    /// Parse and validate.
    pub fn from_json_str(s: &str) -> Result<Self, SnapshotError> {
        let snapshot: RoundSnapshot =
            serde_json::from_str(s).map_err(|e| SnapshotError::Malformed(e.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}

/// Snapshot load failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    Malformed(String),
    Version(u32),
    SeatCount(usize),
    TileCount(usize),
    /// A seat index outside 0..4.
    SeatOutOfRange { field: &'static str, seat: usize },
    KanCount(usize),
    /// Saved seats do not match the table's roster.
    RosterMismatch,
    /// The saved round already ended and cannot resume.
    Finished,
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "Malformed round snapshot: {}", e),
            Self::Version(v) => write!(f, "Unsupported snapshot version {}", v),
            Self::SeatCount(n) => write!(f, "Snapshot has {} seats", n),
            Self::TileCount(n) => {
                write!(f, "Snapshot holds {} tiles, expected {}", n, TOTAL_TILES)
            }
            Self::SeatOutOfRange { field, seat } => {
                write!(f, "Snapshot field {} names seat {}", field, seat)
            }
            Self::KanCount(n) => write!(f, "Snapshot holds {} kans", n),
            Self::RosterMismatch => write!(f, "Snapshot seats do not match the table"),
            Self::Finished => write!(f, "Snapshot round has already ended"),
        }
    }
}

impl std::error::Error for SnapshotError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::round::{RoundCounter, SeatInfo};
    use crate::state::rule::RedFive;
    use crate::state::tile::{Tile, Wind};
    use crate::state::wall::Wall;
    use pretty_assertions::assert_eq;

    fn round() -> Round {
        let seats = std::array::from_fn(|i| SeatInfo {
            uuid: format!("p{}", i),
            is_bot: false,
            points: 25_000,
        });
        Round::deal(
            9,
            RoundCounter::new(Wind::East),
            Wall::shuffled(11, RedFive::Three),
            seats,
            1,
        )
    }

    #[test]
    fn test_json_round_trip() {
        let snapshot = RoundSnapshot::new(round(), TurnPhase::Draw);
        let json = snapshot.to_json_string().unwrap();
        let parsed = RoundSnapshot::from_json_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            RoundSnapshot::from_json_str("{\"version\":1}"),
            Err(SnapshotError::Malformed(_))
        ));
    }

    #[test]
    fn test_rejects_wrong_version() {
        let mut snapshot = RoundSnapshot::new(round(), TurnPhase::Draw);
        snapshot.version = 99;
        let json = snapshot.to_json_string().unwrap();
        assert_eq!(
            RoundSnapshot::from_json_str(&json),
            Err(SnapshotError::Version(99))
        );
    }

    #[test]
    fn test_rejects_lost_tiles() {
        let mut r = round();
        let tile = r.player(2).hand()[0];
        r.player_mut(2).take(tile);
        let snapshot = RoundSnapshot::new(r, TurnPhase::Draw);
        assert_eq!(snapshot.validate(), Err(SnapshotError::TileCount(135)));
    }

    #[test]
    fn test_rejects_dealer_outside_table() {
        let mut r = round();
        r.counter.round = 5;
        let json = RoundSnapshot::new(r, TurnPhase::Draw)
            .to_json_string()
            .unwrap();
        assert_eq!(
            RoundSnapshot::from_json_str(&json),
            Err(SnapshotError::SeatOutOfRange {
                field: "counter.round",
                seat: 5
            })
        );
    }

    #[test]
    fn test_rejects_out_of_range_seats() {
        let mut r = round();
        r.turn = 4;
        assert_eq!(
            RoundSnapshot::new(r, TurnPhase::Draw).validate(),
            Err(SnapshotError::SeatOutOfRange {
                field: "turn",
                seat: 4
            })
        );

        let mut r = round();
        r.contested = Some(crate::state::round::Contested {
            seat: 7,
            tile: Tile::EAST,
        });
        assert_eq!(
            RoundSnapshot::new(r, TurnPhase::Draw).validate(),
            Err(SnapshotError::SeatOutOfRange {
                field: "contested",
                seat: 7
            })
        );

        let mut r = round();
        r.kan_owners = vec![0, 9];
        assert_eq!(
            RoundSnapshot::new(r, TurnPhase::Draw).validate(),
            Err(SnapshotError::SeatOutOfRange {
                field: "kan_owners",
                seat: 9
            })
        );

        let phase = TurnPhase::Discard {
            seat: 6,
            after_call: false,
        };
        assert_eq!(
            RoundSnapshot::new(round(), phase).validate(),
            Err(SnapshotError::SeatOutOfRange {
                field: "phase",
                seat: 6
            })
        );
    }

    #[test]
    fn test_rejects_five_kans() {
        let mut r = round();
        r.kan_owners = vec![0, 1, 2, 3, 0];
        assert_eq!(
            RoundSnapshot::new(r, TurnPhase::Draw).validate(),
            Err(SnapshotError::KanCount(5))
        );
    }
}
