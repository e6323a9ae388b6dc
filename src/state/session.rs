//! Game session management.
//!
//! A [`GameSession`] is one mahjong table: its roster, the match status, the
//! point ledger across rounds and at most one running [`TurnEngine`].
//!
//! # Lifecycle
//!
//! ```text
//!   join / leave / add_bot / set_rule        start()
//!  ┌───────────────────────────────┐   ┌──────────────┐
//!  │            Waiting            │──▶│   Playing    │──┐ round over:
//!  └───────────────────────────────┘   └──────────────┘  │ settle, next deal
//!                  ▲                         │    ▲      │
//!                  └── end() / destroyed ────┘    └──────┘
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::action::{ActionChoice, ActionToken};
use super::channel::{Collaborators, StoreError, Timer};
use super::engine::{ActionError, Step, TurnEngine};
use super::roster::{Roster, Seat, SEATS};
use super::round::{Round, RoundCounter, SeatInfo};
use super::rule::{RuleError, RuleSet, RIICHI_DEPOSIT};
use super::scoring::ScoringOracle;
use super::settlement::{settle, ScoreItem, ScoreSettlement, Settlement};
use super::snapshot::SnapshotError;
use super::wall::Wall;

/// Pause between the end of a round and the next deal.
pub const NEXT_ROUND_DELAY_MS: i64 = 5_000;

/// Match status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Waiting,
    Playing,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Playing => "playing",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a table sits in the host world.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableKey {
    pub world: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl TableKey {
    pub fn new(world: impl Into<String>, x: i32, y: i32, z: i32) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{},{},{}", self.world, self.x, self.y, self.z)
    }
}

/// What applying a round result did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    /// The round was already settled. Nothing changed.
    Duplicate,
    /// Points applied, next deal scheduled.
    Continued,
    /// Points applied and the match is over.
    MatchOver(FinalStandings),
}

/// One row of the final table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub rank: usize,
    pub uuid: String,
    pub display_name: String,
    pub is_bot: bool,
    pub points: i32,
}

/// Match result, sorted by points then uuid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalStandings {
    pub standings: Vec<Standing>,
    pub rounds_played: usize,
}

impl FinalStandings {
    fn from_roster(roster: &Roster, rounds_played: usize) -> Self {
        let mut seats: Vec<&Seat> = roster.seats().iter().collect();
        seats.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.uuid.cmp(&b.uuid)));
        let standings = seats
            .into_iter()
            .enumerate()
            .map(|(i, s)| Standing {
                rank: i + 1,
                uuid: s.uuid.clone(),
                display_name: s.display_name.clone(),
                is_bot: s.is_bot,
                points: s.points,
            })
            .collect();
        Self {
            standings,
            rounds_played,
        }
    }

    pub fn winner(&self) -> Option<&Standing> {
        self.standings.first()
    }
}

/// A mahjong table.
pub struct GameSession {
    key: TableKey,
    status: SessionStatus,
    rule: RuleSet,
    roster: Roster,
    counter: RoundCounter,
    /// Riichi sticks carried between rounds.
    deposits: u32,
    engine: Option<TurnEngine>,
    settled: HashSet<u64>,
    next_round_id: u64,
    seed: u64,
    queued_wall: Option<Wall>,
    oracle: Arc<dyn ScoringOracle>,
    io: Collaborators,
    ledger: Vec<Settlement>,
    standings: Option<FinalStandings>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for GameSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameSession")
            .field("key", &self.key)
            .field("status", &self.status)
            .field("roster", &self.roster)
            .field("counter", &self.counter)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl GameSession {
    pub fn new(key: TableKey, oracle: Arc<dyn ScoringOracle>, io: Collaborators) -> Self {
        let rule = RuleSet::default();
        Self {
            key,
            status: SessionStatus::Waiting,
            counter: RoundCounter::for_length(rule.length),
            rule,
            roster: Roster::new(),
            deposits: 0,
            engine: None,
            settled: HashSet::new(),
            next_round_id: 1,
            seed: rand::random(),
            queued_wall: None,
            oracle,
            io,
            ledger: Vec::new(),
            standings: None,
            created_at: Utc::now(),
            started_at: None,
        }
    }

    /// Fix the match seed so every wall can be replayed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn key(&self) -> &TableKey {
        &self.key
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn rule(&self) -> &RuleSet {
        &self.rule
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn counter(&self) -> RoundCounter {
        self.counter
    }

    pub fn deposits(&self) -> u32 {
        self.deposits
    }

    pub fn engine(&self) -> Option<&TurnEngine> {
        self.engine.as_ref()
    }

    pub fn ledger(&self) -> &[Settlement] {
        &self.ledger
    }

    /// Result of the last finished match.
    pub fn standings(&self) -> Option<&FinalStandings> {
        self.standings.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn has_player(&self, uuid: &str) -> bool {
        self.roster.contains(uuid)
    }

    fn require_waiting(&self) -> Result<(), SessionError> {
        match self.status {
            SessionStatus::Waiting => Ok(()),
            status => Err(SessionError::InvalidState(status)),
        }
    }

    // ----- roster -----

    pub fn join(&mut self, uuid: &str, display_name: &str) -> Result<usize, SessionError> {
        self.require_waiting()?;
        let seat = self.roster.join(Seat::human(uuid, display_name))?;
        tracing::info!(table = %self.key, seat, "{} joined", uuid);
        Ok(seat)
    }

    pub fn leave(&mut self, uuid: &str) -> Result<(), SessionError> {
        self.require_waiting()?;
        self.roster.leave(uuid)?;
        tracing::info!(table = %self.key, "{} left", uuid);
        Ok(())
    }

    pub fn add_bot(&mut self) -> Result<usize, SessionError> {
        self.require_waiting()?;
        self.roster.add_bot()
    }

    pub fn kick(&mut self, index: usize) -> Result<(), SessionError> {
        self.require_waiting()?;
        let seat = self.roster.kick(index)?;
        tracing::info!(table = %self.key, "{} was removed from seat {}", seat.uuid, index);
        Ok(())
    }

    pub fn set_ready(&mut self, uuid: &str, ready: bool) -> Result<(), SessionError> {
        self.require_waiting()?;
        self.roster.set_ready(uuid, ready)
    }

    /// Replace the rules. Guests have to ready up again.
    pub fn set_rule(&mut self, rule: RuleSet) -> Result<(), SessionError> {
        self.require_waiting()?;
        rule.validate()?;
        self.counter = RoundCounter::for_length(rule.length);
        self.rule = rule;
        self.roster.unready_guests();
        Ok(())
    }

    /// Use `wall` for the next deal instead of a shuffled one.
    pub fn queue_wall(&mut self, wall: Wall) {
        self.queued_wall = Some(wall);
    }

    // ----- match flow -----

    /// Start the match. Needs four ready occupants.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.require_waiting()?;
        if self.roster.len() < SEATS {
            return Err(SessionError::NotEnoughPlayers);
        }
        if !self.roster.all_ready() {
            return Err(SessionError::NotReady);
        }

        for seat in self.roster.seats_mut() {
            seat.points = self.rule.starting_points;
        }
        self.counter = RoundCounter::for_length(self.rule.length);
        self.deposits = 0;
        self.ledger.clear();
        self.settled.clear();
        self.standings = None;
        self.status = SessionStatus::Playing;
        self.started_at = Some(now);
        tracing::info!(table = %self.key, length = self.rule.length.as_str(), "Match started");
        self.deal_round(now)
    }

    fn round_seed(&self, round_id: u64) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_le_bytes());
        hasher.update(round_id.to_le_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(bytes)
    }

    fn deal_round(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        let round_id = self.next_round_id;
        self.next_round_id += 1;
        let wall = match self.queued_wall.take() {
            Some(wall) => wall,
            None => Wall::shuffled(self.round_seed(round_id), self.rule.red_five),
        };
        let seats: [SeatInfo; SEATS] = std::array::from_fn(|i| {
            let seat = self.roster.seat(i);
            SeatInfo {
                uuid: seat.map(|s| s.uuid.clone()).unwrap_or_default(),
                is_bot: seat.is_some_and(|s| s.is_bot),
                points: seat.map_or(0, |s| s.points),
            }
        });
        let round = Round::deal(round_id, self.counter, wall, seats, self.deposits);
        let mut engine = TurnEngine::new(round, self.rule.clone(), self.oracle.clone());
        for (i, seat) in self.roster.seats().iter().enumerate() {
            engine.set_connected(i, seat.connected);
        }
        tracing::debug!(table = %self.key, round = %self.counter, "Dealt round {}", round_id);
        let step = engine.start(&mut self.io, now);
        self.engine = Some(engine);
        self.handle_step(step, now)
    }

    fn handle_step(&mut self, step: Step, now: DateTime<Utc>) -> Result<(), SessionError> {
        if let Step::RoundOver(result) = step {
            let settlement = settle(&result, &self.rule);
            self.apply_round_result(&settlement, now)?;
        }
        Ok(())
    }

    /// Forward a seat's answer to the running round.
    pub fn respond(
        &mut self,
        uuid: &str,
        token: ActionToken,
        choice: ActionChoice,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let seat = self.roster.index_of(uuid).ok_or(SessionError::NotSeated)?;
        let engine = self.engine.as_mut().ok_or(SessionError::NoActiveRound)?;
        let step = engine.respond(&mut self.io, seat, token, choice, now)?;
        self.handle_step(step, now)
    }

    /// Scheduler callback.
    pub fn on_timer(&mut self, timer: Timer, now: DateTime<Utc>) -> Result<(), SessionError> {
        match timer {
            Timer::Action { token } => {
                let Some(engine) = self.engine.as_mut() else {
                    tracing::debug!(table = %self.key, "Timer {} fired with no round", token);
                    return Ok(());
                };
                let step = engine.on_timeout(&mut self.io, token, now);
                self.handle_step(step, now)
            }
            Timer::NextRound { round_id } => {
                if self.status != SessionStatus::Playing
                    || self.engine.is_some()
                    || round_id != self.next_round_id
                {
                    tracing::debug!(table = %self.key, "Ignoring next-round timer {}", round_id);
                    return Ok(());
                }
                self.deal_round(now)
            }
        }
    }

    /// Apply a settled round to the ledger. Safe to call twice.
    pub fn apply_round_result(
        &mut self,
        settlement: &Settlement,
        now: DateTime<Utc>,
    ) -> Result<SettleOutcome, SessionError> {
        if self.status != SessionStatus::Playing {
            return Err(SessionError::InvalidState(self.status));
        }
        if settlement.counter.dealer() >= SEATS
            || settlement.winners.iter().any(|&seat| seat >= SEATS)
        {
            tracing::warn!(
                table = %self.key,
                "Round {} settlement names a seat outside the table",
                settlement.round_id
            );
            return Err(SessionError::InvalidSettlement(settlement.round_id));
        }
        if !self.settled.insert(settlement.round_id) {
            tracing::warn!(
                table = %self.key,
                "Round {} was already settled, ignoring",
                settlement.round_id
            );
            return Ok(SettleOutcome::Duplicate);
        }

        let items: Vec<ScoreItem> = self
            .roster
            .seats()
            .iter()
            .zip(settlement.deltas)
            .map(|(seat, delta)| ScoreItem {
                display_name: seat.display_name.clone(),
                uuid: seat.uuid.clone(),
                is_real_player: !seat.is_bot,
                score_origin: seat.points,
                score_change: delta,
            })
            .collect();
        for (seat, delta) in self.roster.seats_mut().zip(settlement.deltas) {
            seat.points += delta;
        }
        self.deposits = settlement.deposits_left;
        self.ledger.push(settlement.clone());
        self.engine = None;
        if let Err(e) = self.io.store.clear() {
            tracing::warn!(table = %self.key, "Failed to clear saved round: {}", e);
        }

        for yaku in &settlement.yaku {
            self.io.settlements.yaku_settlement(yaku);
        }
        self.io.settlements.score_settlement(&ScoreSettlement::new(
            format!("{} {}", settlement.counter, settlement.reason.as_str()),
            items,
        ));
        tracing::info!(
            table = %self.key,
            round = %settlement.counter,
            "Settled round {} ({})",
            settlement.round_id,
            settlement.reason.as_str()
        );

        self.counter = settlement.counter;
        self.counter.next(settlement.dealer_repeats);
        if self.is_match_over(settlement) {
            let standings = self.end(now);
            return Ok(SettleOutcome::MatchOver(standings));
        }

        let at = now + Duration::milliseconds(NEXT_ROUND_DELAY_MS);
        self.io.scheduler.schedule(
            Timer::NextRound {
                round_id: self.next_round_id,
            },
            at,
        );
        Ok(SettleOutcome::Continued)
    }

    fn is_match_over(&self, settlement: &Settlement) -> bool {
        let seats = self.roster.seats();
        if self.rule.bankruptcy_ends_game && seats.iter().any(|s| s.points < 0) {
            return true;
        }
        if !settlement.counter.is_all_last(&self.rule) {
            return false;
        }
        if seats.iter().any(|s| s.points >= self.rule.min_points_to_win) {
            return true;
        }
        // Nobody has the target yet: a repeating dealer plays on.
        !settlement.dealer_repeats && self.counter.is_past_limit(&self.rule)
    }

    /// Finish the match and return to waiting.
    pub fn end(&mut self, now: DateTime<Utc>) -> FinalStandings {
        let standings = FinalStandings::from_roster(&self.roster, self.ledger.len());
        let items: Vec<ScoreItem> = self
            .roster
            .seats()
            .iter()
            .map(|seat| ScoreItem {
                display_name: seat.display_name.clone(),
                uuid: seat.uuid.clone(),
                is_real_player: !seat.is_bot,
                score_origin: self.rule.starting_points,
                score_change: seat.points - self.rule.starting_points,
            })
            .collect();
        self.io
            .settlements
            .score_settlement(&ScoreSettlement::new("Game over", items));
        if let Err(e) = self.io.store.clear() {
            tracing::warn!(table = %self.key, "Failed to clear saved round: {}", e);
        }

        self.engine = None;
        self.status = SessionStatus::Waiting;
        self.roster.unready_guests();
        let played = self
            .started_at
            .take()
            .map(|t| (now - t).num_seconds())
            .unwrap_or(0);
        tracing::info!(
            table = %self.key,
            rounds = standings.rounds_played,
            "Match ended after {}s, winner {}",
            played,
            standings.winner().map(|s| s.uuid.as_str()).unwrap_or("-")
        );
        self.standings = Some(standings.clone());
        standings
    }

    // ----- failures -----

    /// A seat's connection dropped.
    ///
    /// While waiting the player leaves. During play the seat is marked
    /// disconnected and an open claim window closes with no calls.
    pub fn on_player_disconnect(&mut self, uuid: &str, now: DateTime<Utc>) -> Result<(), SessionError> {
        let index = self.roster.index_of(uuid).ok_or(SessionError::NotSeated)?;
        if self.status == SessionStatus::Waiting {
            return self.leave(uuid);
        }
        if let Some(seat) = self.roster.seat_mut(index) {
            seat.connected = false;
        }
        tracing::info!(table = %self.key, seat = index, "{} disconnected", uuid);
        let Some(engine) = self.engine.as_mut() else {
            return Ok(());
        };
        engine.set_connected(index, false);
        let step = engine.cancel_claims(&mut self.io, now);
        self.handle_step(step, now)
    }

    pub fn on_player_reconnect(&mut self, uuid: &str) -> Result<(), SessionError> {
        let index = self.roster.index_of(uuid).ok_or(SessionError::NotSeated)?;
        if let Some(seat) = self.roster.seat_mut(index) {
            seat.connected = true;
        }
        if let Some(engine) = self.engine.as_mut() {
            engine.set_connected(index, true);
        }
        Ok(())
    }

    /// The table block is gone. Drop the round without settling it.
    pub fn on_table_destroyed(&mut self) {
        if let Some(engine) = self.engine.take() {
            tracing::info!(
                table = %self.key,
                "Table destroyed during round {}",
                engine.round().id
            );
        }
        if let Err(e) = self.io.store.clear() {
            tracing::warn!(table = %self.key, "Failed to clear saved round: {}", e);
        }
        self.status = SessionStatus::Waiting;
        self.started_at = None;
    }

    /// Reload the round in progress from the store and continue it.
    ///
    /// Point totals, counters and deposits are taken from the snapshot.
    pub fn restore_round(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.engine.is_some() {
            return Err(SessionError::InvalidState(self.status));
        }
        let snapshot = match self.io.store.load_round_state() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Err(SessionError::NoSavedRound),
            Err(e) => {
                tracing::warn!(table = %self.key, "Failed to load saved round: {}", e);
                return Err(SessionError::Store(e));
            }
        };

        let players = snapshot.round.players();
        if players.len() != self.roster.len()
            || players
                .iter()
                .zip(self.roster.seats())
                .any(|(p, s)| p.uuid != s.uuid)
        {
            tracing::warn!(table = %self.key, "Saved round does not match the roster");
            return Err(SessionError::Snapshot(SnapshotError::RosterMismatch));
        }

        let engine = TurnEngine::from_snapshot(snapshot, self.rule.clone(), self.oracle.clone())
            .map_err(|e| {
                tracing::warn!(table = %self.key, "Saved round rejected: {}", e);
                SessionError::Snapshot(e)
            })?;

        let round = engine.round();
        let mut paid = 0;
        for (seat, player) in self.roster.seats_mut().zip(round.players()) {
            // Deposits paid this round come back out of the pool.
            seat.points = player.points + if player.riichi_paid { RIICHI_DEPOSIT } else { 0 };
            paid += u32::from(player.riichi_paid);
        }
        self.counter = round.counter;
        self.deposits = round.deposits.saturating_sub(paid);
        self.next_round_id = round.id + 1;
        self.status = SessionStatus::Playing;
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        tracing::info!(table = %self.key, round = %self.counter, "Restored round {}", round.id);

        let mut engine = engine;
        let step = engine.resume(&mut self.io, now);
        self.engine = Some(engine);
        self.handle_step(step, now)
    }

    /// Throw away the current round and deal it again with the same counter.
    pub fn restart_round(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.status != SessionStatus::Playing {
            return Err(SessionError::InvalidState(self.status));
        }
        if let Some(engine) = self.engine.take() {
            tracing::warn!(table = %self.key, "Restarting round {}", engine.round().id);
        }
        if let Err(e) = self.io.store.clear() {
            tracing::warn!(table = %self.key, "Failed to clear saved round: {}", e);
        }
        self.deal_round(now)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::json!({
            "table": self.key.to_string(),
            "status": self.status.as_str(),
            "roster": self.roster.to_json(),
            "round": self.counter.to_string(),
            "honba": self.counter.honba,
            "deposits": self.deposits,
            "rounds_played": self.ledger.len(),
            "spectate": self.rule.spectate
        });
        if let Some(engine) = &self.engine {
            obj["round_id"] = serde_json::json!(engine.round().id);
            obj["phase"] = serde_json::json!(engine.phase().as_str());
            obj["tiles_left"] = serde_json::json!(engine.round().wall().remaining());
        }
        obj
    }
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Operation not allowed in this status.
    InvalidState(SessionStatus),
    Full,
    AlreadySeated,
    NotSeated,
    NoHost,
    CannotKickHost,
    NotEnoughPlayers,
    NotReady,
    NoActiveRound,
    NoSavedRound,
    /// A settlement whose dealer or winners are not seats at this table.
    InvalidSettlement(u64),
    Rule(RuleError),
    Action(ActionError),
    Snapshot(SnapshotError),
    Store(StoreError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidState(status) => write!(f, "Not allowed while {}", status),
            Self::Full => write!(f, "Table is full"),
            Self::AlreadySeated => write!(f, "Already seated at this table"),
            Self::NotSeated => write!(f, "Not seated at this table"),
            Self::NoHost => write!(f, "Table has no host"),
            Self::CannotKickHost => write!(f, "The host cannot be removed"),
            Self::NotEnoughPlayers => write!(f, "Four seats must be filled"),
            Self::NotReady => write!(f, "Not every seat is ready"),
            Self::NoActiveRound => write!(f, "No round in progress"),
            Self::NoSavedRound => write!(f, "No saved round"),
            Self::InvalidSettlement(id) => write!(f, "Settlement for round {} is invalid", id),
            Self::Rule(e) => write!(f, "{}", e),
            Self::Action(e) => write!(f, "{}", e),
            Self::Snapshot(e) => write!(f, "{}", e),
            Self::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<RuleError> for SessionError {
    fn from(e: RuleError) -> Self {
        Self::Rule(e)
    }
}

impl From<ActionError> for SessionError {
    fn from(e: ActionError) -> Self {
        Self::Action(e)
    }
}

impl From<SnapshotError> for SessionError {
    fn from(e: SnapshotError) -> Self {
        Self::Snapshot(e)
    }
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::action::{ActionRequest, AvailableAction};
    use crate::state::channel::{
        MemoryRoundStore, PlayerChannel, RoundStore, Scheduler, SettlementSink, TableEvent,
    };
    use crate::state::engine::TurnPhase;
    use crate::state::scoring::{ScoringRequest, ScoringResult, Yaku};
    use crate::state::settlement::{RoundEndReason, YakuSettlement};
    use crate::state::snapshot::RoundSnapshot;
    use crate::state::tile::{parse_tiles, Tile, Wind};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Log {
        requests: Vec<ActionRequest>,
        events: Vec<TableEvent>,
        timers: Vec<Timer>,
        scores: Vec<ScoreSettlement>,
        yaku: Vec<YakuSettlement>,
    }

    /// Channel, scheduler and sink in one, sharing a log with the test.
    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Log>>);

    impl Recorder {
        fn last_request(&self) -> ActionRequest {
            self.0.lock().unwrap().requests.last().cloned().unwrap()
        }
    }

    impl PlayerChannel for Recorder {
        fn request_action(&mut self, request: &ActionRequest) {
            self.0.lock().unwrap().requests.push(request.clone());
        }

        fn notify(&mut self, event: &TableEvent) {
            self.0.lock().unwrap().events.push(event.clone());
        }
    }

    impl Scheduler for Recorder {
        fn schedule(&mut self, timer: Timer, _at: DateTime<Utc>) {
            self.0.lock().unwrap().timers.push(timer);
        }

        fn cancel(&mut self, _timer: Timer) {}
    }

    impl SettlementSink for Recorder {
        fn score_settlement(&mut self, settlement: &ScoreSettlement) {
            self.0.lock().unwrap().scores.push(settlement.clone());
        }

        fn yaku_settlement(&mut self, settlement: &YakuSettlement) {
            self.0.lock().unwrap().yaku.push(settlement.clone());
        }
    }

    /// Survives the session that wrote to it.
    #[derive(Clone, Default)]
    struct SharedStore(Arc<Mutex<MemoryRoundStore>>);

    impl RoundStore for SharedStore {
        fn save_round_state(&mut self, snapshot: &RoundSnapshot) -> Result<(), StoreError> {
            self.0.lock().unwrap().save_round_state(snapshot)
        }

        fn load_round_state(&mut self) -> Result<Option<RoundSnapshot>, StoreError> {
            self.0.lock().unwrap().load_round_state()
        }

        fn clear(&mut self) -> Result<(), StoreError> {
            self.0.lock().unwrap().clear()
        }
    }

    /// Every complete hand is a 1500 point hand, or nothing scores.
    struct FixedOracle(bool);

    impl ScoringOracle for FixedOracle {
        fn evaluate(&self, _request: &ScoringRequest) -> Option<ScoringResult> {
            self.0.then(|| ScoringResult {
                yaku: vec![Yaku::new("yakuhai", 1)],
                han: 1,
                fu: 30,
                score: 1500,
            })
        }
    }

    /// Alice waits on east or south. The bots hold closed triplets and wait
    /// on tiles nobody throws.
    const HANDS: [&str; 4] = [
        "123m456p789s1122z",
        "444555666m777p8p",
        "111222333999p7p",
        "111222333444s5s",
    ];

    /// Same, except bob at seat 1 holds a pair of 8m.
    const CLAIM_HANDS: [&str; 4] = [
        "123m456p789s1122z",
        "44455566677m88m",
        "111222333999p7p",
        "111222333444s5s",
    ];

    fn tile(s: &str) -> Tile {
        parse_tiles(s).unwrap()[0]
    }

    fn wall(hands: [&str; 4], draws: &str) -> Wall {
        let front = parse_tiles(&format!("{}{}", hands.concat(), draws)).unwrap();
        Wall::arranged(&front).unwrap()
    }

    fn table_with(
        humans: &[&str],
        scores: bool,
        recorder: &Recorder,
        store: &SharedStore,
    ) -> GameSession {
        let io = Collaborators {
            channel: Box::new(recorder.clone()),
            scheduler: Box::new(recorder.clone()),
            store: Box::new(store.clone()),
            settlements: Box::new(recorder.clone()),
        };
        let key = TableKey::new("overworld", 10, 64, -3);
        let mut s = GameSession::new(key, Arc::new(FixedOracle(scores)), io).with_seed(7);
        for uuid in humans {
            s.join(uuid, uuid).unwrap();
            s.set_ready(uuid, true).unwrap();
        }
        while !s.roster().is_full() {
            s.add_bot().unwrap();
        }
        s
    }

    fn session() -> GameSession {
        table_with(&["alice"], false, &Recorder::default(), &SharedStore::default())
    }

    fn playing() -> GameSession {
        table_with(
            &["alice", "bob"],
            false,
            &Recorder::default(),
            &SharedStore::default(),
        )
    }

    fn settlement(round_id: u64, deltas: [i32; 4], dealer_repeats: bool) -> Settlement {
        Settlement {
            round_id,
            counter: RoundCounter::new(Wind::East),
            reason: RoundEndReason::Tsumo,
            deltas,
            deposits_left: 0,
            dealer_repeats,
            winners: vec![0],
            tenpai: [false; 4],
            yaku: Vec::new(),
        }
    }

    fn respond(s: &mut GameSession, uuid: &str, request: &ActionRequest, choice: ActionChoice) {
        s.respond(uuid, request.token, choice, Utc::now()).unwrap();
    }

    #[test]
    fn test_table_key_display() {
        assert_eq!(TableKey::new("nether", 1, 2, 3).to_string(), "nether@1,2,3");
    }

    #[test]
    fn test_start_requirements() {
        let store = SharedStore::default();
        let recorder = Recorder::default();
        let io = Collaborators {
            channel: Box::new(recorder.clone()),
            scheduler: Box::new(recorder.clone()),
            store: Box::new(store),
            settlements: Box::new(recorder),
        };
        let key = TableKey::new("overworld", 0, 0, 0);
        let mut s = GameSession::new(key, Arc::new(FixedOracle(false)), io);
        s.join("alice", "Alice").unwrap();
        assert_eq!(s.start(Utc::now()), Err(SessionError::NotEnoughPlayers));
        s.join("bob", "Bob").unwrap();
        s.add_bot().unwrap();
        s.add_bot().unwrap();
        assert_eq!(s.start(Utc::now()), Err(SessionError::NotReady));
        s.set_ready("bob", true).unwrap();
        assert_eq!(s.start(Utc::now()), Ok(()));
        assert_eq!(s.status(), SessionStatus::Playing);
        assert!(s.roster().seats().iter().all(|seat| seat.points == 25_000));
    }

    #[test]
    fn test_roster_locked_while_playing() {
        let mut s = playing();
        s.start(Utc::now()).unwrap();
        assert_eq!(
            s.join("carol", "Carol"),
            Err(SessionError::InvalidState(SessionStatus::Playing))
        );
        assert_eq!(
            s.leave("bob"),
            Err(SessionError::InvalidState(SessionStatus::Playing))
        );
        assert_eq!(
            s.set_rule(RuleSet::default()),
            Err(SessionError::InvalidState(SessionStatus::Playing))
        );
    }

    #[test]
    fn test_set_rule_unreadies_guests() {
        let mut s = playing();
        let rule = RuleSet {
            starting_points: 30_000,
            ..RuleSet::default()
        };
        s.set_rule(rule).unwrap();
        assert!(!s.roster().seat(1).unwrap().ready);
        assert!(s.roster().seat(0).unwrap().ready);

        let bad = RuleSet {
            starting_points: 0,
            ..RuleSet::default()
        };
        assert!(matches!(s.set_rule(bad), Err(SessionError::Rule(_))));
    }

    #[test]
    fn test_double_settlement_is_ignored() {
        let mut s = playing();
        s.start(Utc::now()).unwrap();
        let st = settlement(900, [3000, -1000, -1000, -1000], true);

        assert_eq!(
            s.apply_round_result(&st, Utc::now()),
            Ok(SettleOutcome::Continued)
        );
        let points: Vec<i32> = s.roster().seats().iter().map(|x| x.points).collect();
        assert_eq!(
            s.apply_round_result(&st, Utc::now()),
            Ok(SettleOutcome::Duplicate)
        );
        let again: Vec<i32> = s.roster().seats().iter().map(|x| x.points).collect();
        assert_eq!(points, again);
        assert_eq!(points[0], 28_000);
        assert_eq!(s.counter().honba, 1);
        assert_eq!(s.ledger().len(), 1);
    }

    #[test]
    fn test_bankruptcy_ends_match() {
        let mut s = playing();
        s.start(Utc::now()).unwrap();
        let st = settlement(901, [26_000, -26_000, 0, 0], false);
        let outcome = s.apply_round_result(&st, Utc::now()).unwrap();
        let SettleOutcome::MatchOver(standings) = outcome else {
            panic!("bankruptcy should end the match");
        };
        assert_eq!(standings.winner().unwrap().uuid, "alice");
        assert_eq!(standings.standings[3].uuid, "bob");
        assert_eq!(s.status(), SessionStatus::Waiting);
        assert!(s.engine().is_none());
        assert!(!s.roster().seat(1).unwrap().ready);
    }

    #[test]
    fn test_all_last_dealer_on_top_stops() {
        let mut s = playing();
        s.set_rule(RuleSet {
            length: crate::state::rule::GameLength::OneGame,
            ..RuleSet::default()
        })
        .unwrap();
        s.set_ready("bob", true).unwrap();
        s.start(Utc::now()).unwrap();
        let st = settlement(902, [6000, -2000, -2000, -2000], true);
        assert!(matches!(
            s.apply_round_result(&st, Utc::now()),
            Ok(SettleOutcome::MatchOver(_))
        ));
    }

    fn one_game() -> GameSession {
        let mut s = playing();
        s.set_rule(RuleSet {
            length: crate::state::rule::GameLength::OneGame,
            ..RuleSet::default()
        })
        .unwrap();
        s.set_ready("bob", true).unwrap();
        s.start(Utc::now()).unwrap();
        s
    }

    #[test]
    fn test_all_last_target_reached_ends_despite_dealer_repeat() {
        let mut s = one_game();
        // Bob passes the target while the dealer repeats.
        let st = settlement(903, [-9000, 9000, 1000, -1000], true);
        let outcome = s.apply_round_result(&st, Utc::now()).unwrap();
        let SettleOutcome::MatchOver(standings) = outcome else {
            panic!("a seat at the target ends all-last");
        };
        assert_eq!(standings.winner().unwrap().uuid, "bob");
        assert_eq!(standings.winner().unwrap().points, 34_000);
        assert_eq!(s.status(), SessionStatus::Waiting);
    }

    #[test]
    fn test_all_last_dealer_repeats_below_target() {
        let mut s = one_game();
        let st = settlement(904, [3000, -1000, -1000, -1000], true);
        assert_eq!(
            s.apply_round_result(&st, Utc::now()),
            Ok(SettleOutcome::Continued)
        );
        assert_eq!(s.status(), SessionStatus::Playing);
        assert_eq!(s.counter().dealer(), 0);
        assert_eq!(s.counter().honba, 1);
    }

    #[test]
    fn test_all_last_below_target_rotates_until_limit() {
        let mut s = one_game();
        // East 1 of a one-game match: nobody at target, play moves on.
        let st = settlement(905, [-1000, 1000, 0, 0], false);
        assert_eq!(
            s.apply_round_result(&st, Utc::now()),
            Ok(SettleOutcome::Continued)
        );
        assert_eq!(s.counter().dealer(), 1);

        // East 4 is the last hand play may reach.
        let mut last = settlement(906, [-1000, 1000, 0, 0], false);
        last.counter.round = 3;
        assert!(matches!(
            s.apply_round_result(&last, Utc::now()),
            Ok(SettleOutcome::MatchOver(_))
        ));
    }

    #[test]
    fn test_settlement_with_foreign_seat_rejected() {
        let mut s = playing();
        s.start(Utc::now()).unwrap();
        let mut st = settlement(907, [0, 0, 0, 0], false);
        st.counter.round = 7;
        assert_eq!(
            s.apply_round_result(&st, Utc::now()),
            Err(SessionError::InvalidSettlement(907))
        );

        let mut st = settlement(908, [0, 0, 0, 0], false);
        st.winners = vec![4];
        assert_eq!(
            s.apply_round_result(&st, Utc::now()),
            Err(SessionError::InvalidSettlement(908))
        );
        assert!(s.ledger().is_empty());
        assert!(s.roster().seats().iter().all(|x| x.points == 25_000));
    }

    #[test]
    fn test_disconnect_while_waiting_leaves() {
        let mut s = playing();
        s.on_player_disconnect("bob", Utc::now()).unwrap();
        assert!(!s.has_player("bob"));
    }

    #[test]
    fn test_table_destroyed_drops_round() {
        let mut s = playing();
        s.start(Utc::now()).unwrap();
        s.on_table_destroyed();
        assert_eq!(s.status(), SessionStatus::Waiting);
        assert!(s.engine().is_none());
        assert!(s.ledger().is_empty());
    }

    #[test]
    fn test_round_seed_differs_per_round() {
        let mut s = session();
        assert_ne!(s.round_seed(1), s.round_seed(2));
        assert_eq!(s.round_seed(1), session().round_seed(1));

        // The same seed deals the same first wall.
        s.start(Utc::now()).unwrap();
        let mut again = session();
        again.start(Utc::now()).unwrap();
        assert_eq!(
            s.engine().unwrap().round().wall().digest(),
            again.engine().unwrap().round().wall().digest()
        );
    }

    #[test]
    fn test_dealer_tsumo_settles_and_repeats() {
        let recorder = Recorder::default();
        let mut s = table_with(&["alice"], true, &recorder, &SharedStore::default());
        s.queue_wall(wall(HANDS, "1z"));
        s.start(Utc::now()).unwrap();

        let request = recorder.last_request();
        assert!(request.offers("tsumo"));
        respond(&mut s, "alice", &request, ActionChoice::Tsumo);

        let points: Vec<i32> = s.roster().seats().iter().map(|x| x.points).collect();
        assert_eq!(points, vec![26_500, 24_500, 24_500, 24_500]);
        assert_eq!(s.ledger().len(), 1);
        assert_eq!(s.ledger()[0].reason, RoundEndReason::Tsumo);
        assert!(s.engine().is_none());
        assert_eq!(s.counter().honba, 1);
        assert_eq!(s.counter().dealer(), 0);
        {
            let log = recorder.0.lock().unwrap();
            assert_eq!(log.yaku.len(), 1);
            assert_eq!(log.scores.len(), 1);
            assert!(log.timers.contains(&Timer::NextRound { round_id: 2 }));
        }

        // The same round cannot be settled twice.
        let again = s.ledger()[0].clone();
        assert_eq!(
            s.apply_round_result(&again, Utc::now()),
            Ok(SettleOutcome::Duplicate)
        );

        // A stale next-round timer is ignored; the right one deals.
        s.on_timer(Timer::NextRound { round_id: 9 }, Utc::now()).unwrap();
        assert!(s.engine().is_none());
        s.on_timer(Timer::NextRound { round_id: 2 }, Utc::now()).unwrap();
        let engine = s.engine().unwrap();
        assert_eq!(engine.round().id, 2);
        assert_eq!(engine.round().counter.honba, 1);
        assert!(engine.round().is_conserved());
        assert_eq!(recorder.last_request().seat, 0);
    }

    #[test]
    fn test_passed_ron_is_furiten_until_own_discard() {
        let recorder = Recorder::default();
        let mut s = table_with(&["alice"], true, &recorder, &SharedStore::default());
        s.queue_wall(wall(HANDS, "9m1z2z3z5z1z"));
        s.start(Utc::now()).unwrap();

        let turn = recorder.last_request();
        respond(&mut s, "alice", &turn, ActionChoice::Discard(tile("9m")));
        assert!(!s.engine().unwrap().round().player(0).is_furiten());

        // Seat 1 throws east: alice may ron or pon, and passes.
        let window = recorder.last_request();
        assert!(window.is_claim());
        assert_eq!(window.seat, 0);
        assert_eq!(window.tile, Some(tile("1z")));
        assert!(window.offers("ron"));
        respond(&mut s, "alice", &window, ActionChoice::Pass);
        {
            let alice = s.engine().unwrap().round().player(0);
            assert!(alice.furiten.temporary);
            assert!(alice.is_furiten());
        }

        // Seat 2 throws south: only pon is left.
        let window = recorder.last_request();
        assert_eq!(window.tile, Some(tile("2z")));
        assert!(window.offers("pon"));
        assert!(!window.offers("ron"));
        respond(&mut s, "alice", &window, ActionChoice::Pass);
        assert!(s.engine().unwrap().round().player(0).is_furiten());

        // Alice's own discard lifts it.
        let turn = recorder.last_request();
        assert!(!turn.is_claim());
        respond(&mut s, "alice", &turn, ActionChoice::Discard(tile("5z")));
        assert!(!s.engine().unwrap().round().player(0).is_furiten());

        let window = recorder.last_request();
        assert_eq!(window.tile, Some(tile("1z")));
        assert!(window.offers("ron"));
        respond(&mut s, "alice", &window, ActionChoice::Ron);

        assert_eq!(s.ledger()[0].reason, RoundEndReason::Ron);
        assert_eq!(s.ledger()[0].deltas, [1500, -1500, 0, 0]);
    }

    #[test]
    fn test_claim_window_timeout_passes() {
        let recorder = Recorder::default();
        let mut s = table_with(&["alice", "bob"], false, &recorder, &SharedStore::default());
        s.queue_wall(wall(CLAIM_HANDS, "8m"));
        s.start(Utc::now()).unwrap();

        let turn = recorder.last_request();
        respond(&mut s, "alice", &turn, ActionChoice::Discard(tile("8m")));
        let window = recorder.last_request();
        assert_eq!(window.seat, 1);
        assert!(window.offers("pon"));
        assert!(window.offers("chii"));

        // A response after the deadline does not count.
        let late = window.deadline + chrono::Duration::seconds(1);
        assert!(s
            .respond("bob", window.token, ActionChoice::Pon, late)
            .is_err());

        s.on_timer(Timer::Action { token: window.token }, window.deadline)
            .unwrap();
        let engine = s.engine().unwrap();
        assert!(engine.round().player(1).melds().is_empty());
        assert_eq!(
            engine.phase(),
            &TurnPhase::Discard {
                seat: 1,
                after_call: false
            }
        );
        let turn = recorder.last_request();
        assert_eq!(turn.seat, 1);
        assert!(!turn.is_claim());
        assert!(engine.round().is_conserved());
    }

    #[test]
    fn test_pon_moves_turn_to_caller() {
        let recorder = Recorder::default();
        let mut s = table_with(&["alice", "bob"], false, &recorder, &SharedStore::default());
        s.queue_wall(wall(CLAIM_HANDS, "8m"));
        s.start(Utc::now()).unwrap();

        let turn = recorder.last_request();
        respond(&mut s, "alice", &turn, ActionChoice::Discard(tile("8m")));
        let window = recorder.last_request();
        respond(&mut s, "bob", &window, ActionChoice::Pon);

        let engine = s.engine().unwrap();
        assert_eq!(engine.round().player(1).melds().len(), 1);
        assert!(engine.round().player(0).discards()[0].claimed);
        let turn = recorder.last_request();
        assert_eq!(turn.seat, 1);
        // After a call the only option is a discard.
        assert_eq!(turn.actions.len(), 1);
        assert!(matches!(turn.actions[0], AvailableAction::Discard { .. }));
        assert_eq!(engine.round().player(1).hand().len(), 11);
        assert!(engine.round().is_conserved());
    }

    #[test]
    fn test_disconnect_cancels_claim_window() {
        let recorder = Recorder::default();
        let mut s = table_with(&["alice", "bob"], false, &recorder, &SharedStore::default());
        s.queue_wall(wall(CLAIM_HANDS, "8m"));
        s.start(Utc::now()).unwrap();

        let turn = recorder.last_request();
        respond(&mut s, "alice", &turn, ActionChoice::Discard(tile("8m")));
        let window = recorder.last_request();
        assert!(window.is_claim());

        s.on_player_disconnect("bob", Utc::now()).unwrap();
        assert!(!s.roster().seat(1).unwrap().connected);
        let engine = s.engine().unwrap();
        assert!(engine.round().player(1).melds().is_empty());
        assert!(!engine.round().player(1).connected);
        assert!(recorder
            .0
            .lock()
            .unwrap()
            .events
            .contains(&TableEvent::ClaimsCancelled { tile: tile("8m") }));

        // The cancelled window's token is dead.
        assert_eq!(
            s.respond("bob", window.token, ActionChoice::Pon, Utc::now()),
            Err(SessionError::Action(ActionError::StaleToken))
        );
        s.on_player_reconnect("bob").unwrap();
        assert!(s.roster().seat(1).unwrap().connected);
    }

    #[test]
    fn test_restore_round_after_riichi() {
        let store = SharedStore::default();
        let recorder = Recorder::default();
        let mut s = table_with(&["alice"], false, &recorder, &store);
        s.queue_wall(wall(HANDS, "9m3z4z5z6z"));
        s.start(Utc::now()).unwrap();

        let turn = recorder.last_request();
        assert!(turn.offers("riichi"));
        respond(&mut s, "alice", &turn, ActionChoice::Riichi(tile("9m")));
        let old = recorder.last_request();
        assert_eq!(old.seat, 0);
        {
            let engine = s.engine().unwrap();
            assert!(engine.round().player(0).riichi_paid);
            assert_eq!(engine.round().player(0).points, 24_000);
            assert_eq!(engine.round().deposits, 1);
        }

        // The server restarts with the same roster and store.
        let recorder = Recorder::default();
        let mut restored = table_with(&["alice"], false, &recorder, &store);
        restored.restore_round(Utc::now()).unwrap();

        assert_eq!(restored.status(), SessionStatus::Playing);
        assert!(restored.roster().seats().iter().all(|x| x.points == 25_000));
        assert_eq!(restored.deposits(), 0);
        let engine = restored.engine().unwrap();
        assert!(engine.round().player(0).riichi.is_declared());
        assert_eq!(
            engine.phase(),
            &TurnPhase::Discard {
                seat: 0,
                after_call: false
            }
        );

        let turn = recorder.last_request();
        assert_eq!(turn.seat, 0);
        assert_ne!(turn.token, old.token);
        // Riichi hands discard what they draw.
        assert_eq!(
            restored.respond("alice", turn.token, ActionChoice::Discard(tile("1m")), Utc::now()),
            Err(SessionError::Action(ActionError::ForbiddenDiscard(tile("1m"))))
        );
        respond(&mut restored, "alice", &turn, ActionChoice::Discard(tile("6z")));
        assert!(restored.engine().unwrap().round().is_conserved());
    }

    #[test]
    fn test_restore_rejects_other_roster() {
        let store = SharedStore::default();
        let mut s = table_with(&["alice"], false, &Recorder::default(), &store);
        assert_eq!(s.restore_round(Utc::now()), Err(SessionError::NoSavedRound));
        s.queue_wall(wall(HANDS, "9m"));
        s.start(Utc::now()).unwrap();

        let mut other = table_with(&["carol"], false, &Recorder::default(), &store);
        assert_eq!(
            other.restore_round(Utc::now()),
            Err(SessionError::Snapshot(SnapshotError::RosterMismatch))
        );
        assert_eq!(other.status(), SessionStatus::Waiting);
    }

    #[test]
    fn test_restart_round_redeals() {
        let recorder = Recorder::default();
        let mut s = table_with(&["alice"], false, &recorder, &SharedStore::default());
        s.start(Utc::now()).unwrap();
        assert_eq!(s.engine().unwrap().round().id, 1);
        s.restart_round(Utc::now()).unwrap();
        let engine = s.engine().unwrap();
        assert_eq!(engine.round().id, 2);
        assert_eq!(engine.round().counter, RoundCounter::new(Wind::East));
        assert!(s.ledger().is_empty());
    }

    #[test]
    fn test_to_json() {
        let mut s = playing();
        s.start(Utc::now()).unwrap();
        let json = s.to_json();
        assert_eq!(json["status"], "playing");
        assert_eq!(json["round"], "East 1-0");
        assert_eq!(json["round_id"], 1);
    }
}
