//! Riichi Table State Library
//!
//! This crate provides the game engine for four-seat riichi mahjong tables.
//!
//! # Overview
//!
//! The state module provides:
//!
//! - **Tiles and hands** - The 136-tile set with red fives, melds, and hand
//!   analysis for completion, waits and tenpai.
//!
//! - **Turn engine** - Draw, discard, riichi, chii/pon/kan calls and the claim
//!   window, resolved by priority with per-request deadlines.
//!
//! - **Settlement** - Ron, tsumo and exhaustive-draw payments, honba and riichi
//!   deposits, abortive draws.
//!
//! - **Sessions** - Table roster, match progression across rounds, restore
//!   from a saved snapshot.
//!
//! # Design Principles
//!
//! 1. **The host owns I/O** - Requests, timers, storage and scoring go through
//!    traits the embedding server implements.
//!
//! 2. **Stale answers are rejected** - Every request carries a token; late or
//!    replayed responses never change state.
//!
//! 3. **Tiles are conserved** - Wall, hands, melds and discards always hold
//!    all 136 tiles.
//!
//! 4. **Serialization-ready** - Rounds and settlements serialize to JSON.
//!
//! # Example
//!
//! ```rust
//! use riichi_table_state::state::{
//!     parse_tiles, GameLength, RuleSet, hand,
//! };
//!
//! let tiles = parse_tiles("123m456p789s1122z").unwrap();
//! assert!(hand::is_tenpai(&tiles, 0));
//!
//! let rule = RuleSet {
//!     length: GameLength::East,
//!     ..RuleSet::default()
//! };
//! assert!(rule.validate().is_ok());
//! ```

pub mod state;

pub use state::*;
