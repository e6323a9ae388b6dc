//! Collaborator boundaries.
//!
//! The crate never talks to the network, a clock or a disk. The host plugs
//! these traits in and feeds responses and timer callbacks back through
//! [`GameSession`](super::session::GameSession).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::{ActionRequest, ActionToken};
use super::meld::Meld;
use super::settlement::{RoundEndReason, ScoreSettlement, YakuSettlement};
use super::snapshot::RoundSnapshot;
use super::tile::Tile;

/// Something every seat may want to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TableEvent {
    RoundStarted { round_id: u64, dealer: usize, digest: String },
    Drew { seat: usize },
    Discarded { seat: usize, tile: Tile, riichi: bool },
    RiichiAccepted { seat: usize },
    Called { seat: usize, meld: Meld },
    DoraRevealed { tile: Tile },
    ClaimsCancelled { tile: Tile },
    Rejected { seat: usize, reason: String },
    RoundEnded { round_id: u64, reason: RoundEndReason },
}

/// Request/response channel to seat occupants.
///
/// Requests are fire-and-forget. Answers come back through
/// `GameSession::respond` carrying the request's token.
pub trait PlayerChannel: Send + Sync {
    fn request_action(&mut self, request: &ActionRequest);

    fn notify(&mut self, _event: &TableEvent) {}
}

/// Timer identities handed to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "timer", rename_all = "snake_case")]
pub enum Timer {
    /// Deadline of an action request or claim window.
    Action { token: ActionToken },
    /// Pause between a finished round and the next deal.
    NextRound { round_id: u64 },
}

/// Wall-clock callbacks. `GameSession::on_timer` must be called at `at`.
pub trait Scheduler: Send + Sync {
    fn schedule(&mut self, timer: Timer, at: DateTime<Utc>);

    fn cancel(&mut self, timer: Timer);
}

/// Durable storage for the round in progress.
pub trait RoundStore: Send + Sync {
    fn save_round_state(&mut self, snapshot: &RoundSnapshot) -> Result<(), StoreError>;

    fn load_round_state(&mut self) -> Result<Option<RoundSnapshot>, StoreError>;

    fn clear(&mut self) -> Result<(), StoreError>;
}

/// Receives settlement values for display.
pub trait SettlementSink: Send + Sync {
    fn score_settlement(&mut self, settlement: &ScoreSettlement);

    fn yaku_settlement(&mut self, settlement: &YakuSettlement);
}

/// Everything a session needs from the host.
pub struct Collaborators {
    pub channel: Box<dyn PlayerChannel>,
    pub scheduler: Box<dyn Scheduler>,
    pub store: Box<dyn RoundStore>,
    pub settlements: Box<dyn SettlementSink>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Store errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    Io(String),
    Corrupt(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Round store I/O failed: {}", e),
            Self::Corrupt(e) => write!(f, "Stored round is corrupt: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Keeps the latest snapshot as a JSON string.
#[derive(Debug, Clone, Default)]
pub struct MemoryRoundStore {
    json: Option<String>,
    pub saves: usize,
}

impl MemoryRoundStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with raw JSON, as if read back from disk.
    pub fn with_json(json: impl Into<String>) -> Self {
        Self {
            json: Some(json.into()),
            saves: 0,
        }
    }

    pub fn json(&self) -> Option<&str> {
        self.json.as_deref()
    }
}

impl RoundStore for MemoryRoundStore {
    fn save_round_state(&mut self, snapshot: &RoundSnapshot) -> Result<(), StoreError> {
        self.json = Some(snapshot.to_json_string().map_err(|e| StoreError::Io(e.to_string()))?);
        self.saves += 1;
        Ok(())
    }

    fn load_round_state(&mut self) -> Result<Option<RoundSnapshot>, StoreError> {
        match &self.json {
            None => Ok(None),
            Some(json) => RoundSnapshot::from_json_str(json)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(e.to_string())),
        }
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.json = None;
        Ok(())
    }
}
