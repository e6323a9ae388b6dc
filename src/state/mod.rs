//! Table state for riichi mahjong.
//!
//! This module provides the core state types and managers:
//!
//! - `tile`, `meld`, `hand` - Tile model, open and closed sets, hand shapes
//! - `wall` - Seeded 136-tile wall with dead wall and dora indicators
//! - `player`, `round` - Per-seat state and the round being played
//! - `claim` - Collects claims on a discard and resolves them by priority
//! - `engine` - Drives draw, discard, call and kan through to the round's end
//! - `settlement` - Point movement for wins and draws
//! - `session`, `roster`, `registry` - Tables, seats and the match loop
//! - `channel`, `snapshot` - Host integration and persistence
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                    SessionTable (TableKey → GameSession)              │
//! │                                                                      │
//! │  ┌────────────────────────────────────────────────────────────────┐  │
//! │  │ GameSession                                                    │  │
//! │  │   Roster (4 seats, host at 0)      RuleSet     points ledger   │  │
//! │  │                                                                │  │
//! │  │   ┌──────────────────────────────────────────────────────┐     │  │
//! │  │   │ TurnEngine                                           │     │  │
//! │  │   │   Round { Wall, [PlayerState; 4], RoundCounter }     │     │  │
//! │  │   │   ClaimArbiter ─── ron > kan/pon > chii              │     │  │
//! │  │   │                                                      │     │  │
//! │  │   │   Draw ──▶ Discard ──▶ ClaimWindow ──▶ Draw ...      │     │  │
//! │  │   │               │              │                       │     │  │
//! │  │   │               └─▶ KanDeclared └─▶ RoundEnd           │     │  │
//! │  │   └──────────────────────────────────────────────────────┘     │  │
//! │  │                              │ RoundResult                     │  │
//! │  │                              ▼                                 │  │
//! │  │                     settle() ──▶ Settlement                    │  │
//! │  └────────────────────────────────────────────────────────────────┘  │
//! │                                                                      │
//! │  Host side: PlayerChannel, Scheduler, RoundStore, SettlementSink,    │
//! │             ScoringOracle                                            │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use riichi_table_state::state::{GameSession, SessionTable, TableKey};
//!
//! let tables = SessionTable::new();
//! let key = TableKey::new("overworld", 12, 64, -40);
//! tables.create(GameSession::new(key.clone(), oracle, collaborators));
//!
//! tables.with_session(&key, |table| {
//!     table.join("uuid-1", "Alice")?;
//!     table.add_bot()?;
//!     table.add_bot()?;
//!     table.add_bot()?;
//!     table.start(chrono::Utc::now())
//! });
//! ```

pub mod action;
pub mod bot;
pub mod channel;
pub mod claim;
pub mod engine;
pub mod hand;
pub mod meld;
pub mod player;
pub mod registry;
pub mod roster;
pub mod round;
pub mod rule;
pub mod scoring;
pub mod session;
pub mod settlement;
pub mod snapshot;
pub mod tile;
pub mod wall;

// Re-export commonly used types
pub use action::{ActionChoice, ActionRequest, ActionToken, AvailableAction};
pub use channel::{
    Collaborators, MemoryRoundStore, PlayerChannel, RoundStore, Scheduler, SettlementSink,
    StoreError, TableEvent, Timer,
};
pub use claim::{ArbiterPhase, Call, ClaimArbiter, ClaimError, ClaimOutcome, Eligibility};
pub use engine::{ActionError, Step, TurnEngine, TurnPhase};
pub use meld::{ClaimSource, Meld, MeldError, MeldKind};
pub use player::{Furiten, PlayerState, RiichiStatus};
pub use registry::SessionTable;
pub use roster::{Roster, Seat, SEATS};
pub use round::{Round, RoundCounter, SeatInfo};
pub use rule::{
    GameLength, MinimumHan, MultipleRon, RedFive, RuleError, RuleSet, ThinkingTime,
    RIICHI_DEPOSIT,
};
pub use scoring::{ScoringContext, ScoringOracle, ScoringRequest, ScoringResult, Yaku};
pub use session::{
    FinalStandings, GameSession, SessionError, SessionStatus, SettleOutcome, Standing, TableKey,
};
pub use settlement::{
    settle, DrawKind, RoundEndReason, RoundResult, ScoreItem, ScoreSettlement, Settlement,
    WinRecord, YakuSettlement,
};
pub use snapshot::{RoundSnapshot, SnapshotError};
pub use tile::{parse_tiles, InvalidTile, Suit, Tile, Wind};
pub use wall::{Wall, WallError};
