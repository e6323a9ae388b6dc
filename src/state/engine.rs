//! Turn engine.
//!
//! Drives one [`Round`] from the dealer's first draw to its end. The engine
//! never blocks: whenever a human seat has to decide, it sends an
//! [`ActionRequest`], schedules the deadline and returns [`Step::Waiting`].
//! Responses and timer callbacks re-enter through [`TurnEngine::respond`] and
//! [`TurnEngine::on_timeout`]. Bot seats are answered inline.
//!
//! # Turn Flow
//!
//! ```text
//!            ┌────────────────────── no calls ───────────────────────┐
//!            ▼                                                       │
//!       ┌────────┐  draw  ┌─────────┐  discard  ┌─────────────┐      │
//!  ────▶│  Draw  │───────▶│ Discard │──────────▶│ ClaimWindow │──────┘
//!       └────────┘        └─────────┘           └─────────────┘
//!            ▲              │  ▲   │                 │    │
//!  replacement              │  │   │ kan      pon/chii    │ ron
//!            │              │  │   ▼                 │    ▼
//!            │              │  │ ┌─────────────┐     │ ┌──────────┐
//!            └──────────────┼──┼─│ KanDeclared │     │ │ RoundEnd │
//!                           │  │ └─────────────┘     │ └──────────┘
//!                           │  └─────────────────────┘      ▲
//!                           └── tsumo / abort ──────────────┘
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::action::{ActionChoice, ActionRequest, ActionToken, AvailableAction};
use super::bot;
use super::channel::{Collaborators, TableEvent, Timer};
use super::claim::{ArbiterPhase, Call, ClaimArbiter, ClaimError, ClaimOutcome, Eligibility, Resolution};
use super::hand;
use super::meld::{ClaimSource, Meld, MeldError, MeldKind};
use super::player::{PlayerState, RiichiStatus};
use super::round::{Contested, PendingKan, PendingKanKind, Round, MAX_KANS};
use super::rule::{RuleSet, RIICHI_DEPOSIT};
use super::scoring::{ScoringContext, ScoringOracle, ScoringRequest, ScoringResult};
use super::settlement::{DrawKind, RoundEndReason, RoundResult, WinRecord};
use super::snapshot::{RoundSnapshot, SnapshotError};
use super::tile::Tile;

/// Where the engine stands within a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum TurnPhase {
    /// The seat in `Round::turn` draws next.
    Draw,
    /// A seat holds fourteen tiles and must act.
    Discard { seat: usize, after_call: bool },
    /// An added or concealed kan waits on robbing calls.
    KanDeclared { seat: usize, tile: Tile },
    /// A discard is open to calls.
    ClaimWindow { discarder: usize, tile: Tile },
    RoundEnd,
}

impl TurnPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draw => "draw",
            Self::Discard { .. } => "discard",
            Self::KanDeclared { .. } => "kan_declared",
            Self::ClaimWindow { .. } => "claim_window",
            Self::RoundEnd => "round_end",
        }
    }

    /// Seat the phase belongs to, if any.
    pub fn seat(&self) -> Option<usize> {
        match self {
            Self::Discard { seat, .. } | Self::KanDeclared { seat, .. } => Some(*seat),
            Self::ClaimWindow { discarder, .. } => Some(*discarder),
            Self::Draw | Self::RoundEnd => None,
        }
    }
}

/// What the caller should do after driving the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Waiting on a human response or a timer.
    Waiting,
    /// The round is over. Settle it.
    RoundOver(RoundResult),
}

/// Rejected responses. The engine state is unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    RoundOver,
    StaleToken,
    NotYourTurn,
    DeadlinePassed,
    NotOffered(&'static str),
    TileNotInHand(Tile),
    ForbiddenDiscard(Tile),
    Furiten,
    Claim(ClaimError),
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoundOver => write!(f, "Round is over"),
            Self::StaleToken => write!(f, "Response token is stale"),
            Self::NotYourTurn => write!(f, "Not your turn"),
            Self::DeadlinePassed => write!(f, "Response arrived after the deadline"),
            Self::NotOffered(action) => write!(f, "Action {} was not offered", action),
            Self::TileNotInHand(t) => write!(f, "Tile {} is not in hand", t),
            Self::ForbiddenDiscard(t) => write!(f, "Tile {} may not be discarded now", t),
            Self::Furiten => write!(f, "Cannot ron while furiten"),
            Self::Claim(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ActionError {}

impl From<ClaimError> for ActionError {
    fn from(e: ClaimError) -> Self {
        Self::Claim(e)
    }
}

/// Internal transitions, driven by [`TurnEngine::pump`].
#[derive(Debug)]
enum Flow {
    Draw(usize),
    Replacement(usize),
    Offer { seat: usize, after_call: bool },
    Claims,
    KanWindow,
    Resolved(Resolution),
    Suspend,
    End(RoundResult),
}

/// Outstanding own-turn request.
#[derive(Debug, Clone, Copy)]
struct TurnRequest {
    seat: usize,
    token: ActionToken,
    deadline: DateTime<Utc>,
}

/// Runs a single round.
pub struct TurnEngine {
    round: Round,
    phase: TurnPhase,
    rule: RuleSet,
    oracle: Arc<dyn ScoringOracle>,
    arbiter: ClaimArbiter,
    turn_request: Option<TurnRequest>,
}

impl fmt::Debug for TurnEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnEngine")
            .field("round", &self.round.id)
            .field("phase", &self.phase)
            .field("arbiter", &self.arbiter.phase())
            .finish_non_exhaustive()
    }
}

impl TurnEngine {
    pub fn new(round: Round, rule: RuleSet, oracle: Arc<dyn ScoringOracle>) -> Self {
        Self {
            round,
            phase: TurnPhase::Draw,
            arbiter: ClaimArbiter::new(rule.multiple_ron),
            rule,
            oracle,
            turn_request: None,
        }
    }

    /// Rebuild an engine from a stored snapshot. Call [`resume`] next.
    ///
    /// [`resume`]: TurnEngine::resume
    pub fn from_snapshot(
        snapshot: RoundSnapshot,
        rule: RuleSet,
        oracle: Arc<dyn ScoringOracle>,
    ) -> Result<Self, SnapshotError> {
        snapshot.validate()?;
        if snapshot.phase == TurnPhase::RoundEnd {
            return Err(SnapshotError::Finished);
        }
        let mut engine = Self::new(snapshot.round, rule, oracle);
        engine.phase = snapshot.phase;
        Ok(engine)
    }

    pub fn round(&self) -> &Round {
        &self.round
    }

    pub fn phase(&self) -> &TurnPhase {
        &self.phase
    }

    pub fn arbiter(&self) -> &ClaimArbiter {
        &self.arbiter
    }

    pub fn rule(&self) -> &RuleSet {
        &self.rule
    }

    /// Token of the outstanding own-turn request.
    pub fn turn_token(&self) -> Option<ActionToken> {
        self.turn_request.map(|r| r.token)
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot::new(self.round.clone(), self.phase.clone())
    }

    pub fn set_connected(&mut self, seat: usize, connected: bool) {
        self.round.player_mut(seat).connected = connected;
    }

    /// Deal is done. The dealer draws first.
    pub fn start(&mut self, io: &mut Collaborators, now: DateTime<Utc>) -> Step {
        tracing::info!(
            "Round {} ({}) started, dealer seat {}",
            self.round.id,
            self.round.counter,
            self.round.dealer()
        );
        io.channel.notify(&TableEvent::RoundStarted {
            round_id: self.round.id,
            dealer: self.round.dealer(),
            digest: self.round.wall().digest().to_string(),
        });
        let dealer = self.round.dealer();
        self.pump(io, Flow::Draw(dealer), now)
    }

    /// Continue a restored round. Pending decisions are asked again with
    /// fresh tokens and deadlines.
    pub fn resume(&mut self, io: &mut Collaborators, now: DateTime<Utc>) -> Step {
        let flow = match self.phase.clone() {
            TurnPhase::Draw => Flow::Draw(self.round.turn),
            TurnPhase::Discard { seat, after_call } => Flow::Offer { seat, after_call },
            TurnPhase::ClaimWindow { .. } => Flow::Claims,
            TurnPhase::KanDeclared { .. } => Flow::KanWindow,
            TurnPhase::RoundEnd => return Step::Waiting,
        };
        tracing::info!(
            "Round {} resumed in phase {}",
            self.round.id,
            self.phase.as_str()
        );
        self.pump(io, flow, now)
    }

    /// Apply a seat's answer to an outstanding request.
    pub fn respond(
        &mut self,
        io: &mut Collaborators,
        seat: usize,
        token: ActionToken,
        choice: ActionChoice,
        now: DateTime<Utc>,
    ) -> Result<Step, ActionError> {
        let result = self.try_respond(io, seat, token, choice, now);
        if let Err(e) = &result {
            tracing::warn!(
                "Rejected {} from seat {} on {}: {}",
                choice.as_str(),
                seat,
                token,
                e
            );
        }
        result
    }

    fn try_respond(
        &mut self,
        io: &mut Collaborators,
        seat: usize,
        token: ActionToken,
        choice: ActionChoice,
        now: DateTime<Utc>,
    ) -> Result<Step, ActionError> {
        if self.phase == TurnPhase::RoundEnd {
            return Err(ActionError::RoundOver);
        }

        if let Some(request) = self.turn_request {
            if request.token == token {
                if request.seat != seat {
                    return Err(ActionError::NotYourTurn);
                }
                if now > request.deadline {
                    return Err(ActionError::DeadlinePassed);
                }
                let flow = self.apply_turn_choice(io, seat, choice)?;
                self.turn_request = None;
                io.scheduler.cancel(Timer::Action { token });
                return Ok(self.pump(io, flow, now));
            }
        }

        if self.arbiter.phase() == ArbiterPhase::Awaiting && self.arbiter.token() == Some(token) {
            let call = Call::from_choice(choice)?;
            if call == Some(Call::Ron) && seat < 4 && self.round.player(seat).is_furiten() {
                io.channel.notify(&TableEvent::Rejected {
                    seat,
                    reason: ActionError::Furiten.to_string(),
                });
                return Err(ActionError::Furiten);
            }
            return match self.arbiter.submit(token, seat, call, now)? {
                Some(resolution) => Ok(self.pump(io, Flow::Resolved(resolution), now)),
                None => Ok(Step::Waiting),
            };
        }

        Err(ActionError::StaleToken)
    }

    /// A scheduled deadline fired.
    ///
    /// An own turn discards the drawn tile. A claim window closes with the
    /// silent seats passing. Timers for answered requests are ignored.
    pub fn on_timeout(
        &mut self,
        io: &mut Collaborators,
        token: ActionToken,
        now: DateTime<Utc>,
    ) -> Step {
        if let Some(request) = self.turn_request {
            if request.token == token {
                tracing::info!("Seat {} timed out on {}", request.seat, token);
                self.turn_request = None;
                let flow = self.fallback_discard(io, request.seat);
                return self.pump(io, flow, now);
            }
        }
        if self.arbiter.token() == Some(token) {
            if let Some(resolution) = self.arbiter.expire(token, now) {
                tracing::debug!("Claim window {} expired", token);
                return self.pump(io, Flow::Resolved(resolution), now);
            }
            return Step::Waiting;
        }
        tracing::debug!("Ignoring stale timer {}", token);
        Step::Waiting
    }

    /// Close an open claim window as if everyone passed.
    pub fn cancel_claims(&mut self, io: &mut Collaborators, now: DateTime<Utc>) -> Step {
        let Some(resolution) = self.arbiter.cancel() else {
            return Step::Waiting;
        };
        tracing::info!("Claim window {} cancelled", resolution.token);
        io.channel.notify(&TableEvent::ClaimsCancelled {
            tile: resolution.tile,
        });
        self.pump(io, Flow::Resolved(resolution), now)
    }

    fn pump(&mut self, io: &mut Collaborators, mut flow: Flow, now: DateTime<Utc>) -> Step {
        loop {
            flow = match flow {
                Flow::Draw(seat) => self.draw_tile(io, seat),
                Flow::Replacement(seat) => self.draw_replacement(io, seat),
                Flow::Offer { seat, after_call } => self.offer_turn(io, seat, after_call, now),
                Flow::Claims => self.open_claims(io, now),
                Flow::KanWindow => self.open_kan_window(io, now),
                Flow::Resolved(resolution) => self.apply_resolution(io, resolution),
                Flow::Suspend => {
                    self.save(io);
                    return Step::Waiting;
                }
                Flow::End(result) => return self.finish(io, result),
            };
        }
    }

    fn save(&self, io: &mut Collaborators) {
        if let Err(e) = io.store.save_round_state(&self.snapshot()) {
            tracing::warn!("Failed to save round {}: {}", self.round.id, e);
        }
    }

    fn finish(&mut self, io: &mut Collaborators, result: RoundResult) -> Step {
        self.phase = TurnPhase::RoundEnd;
        self.turn_request = None;
        self.arbiter.reset();
        self.round.contested = None;
        self.round.pending_kan = None;
        self.save(io);
        tracing::info!(
            "Round {} ended by {}",
            self.round.id,
            result.reason.as_str()
        );
        io.channel.notify(&TableEvent::RoundEnded {
            round_id: self.round.id,
            reason: result.reason,
        });
        Step::RoundOver(result)
    }

    fn issue_token(&mut self) -> ActionToken {
        ActionToken {
            round_id: self.round.id,
            seq: self.round.next_token_seq(),
        }
    }

    // ----- drawing -----

    fn draw_tile(&mut self, io: &mut Collaborators, seat: usize) -> Flow {
        self.phase = TurnPhase::Draw;
        self.round.turn = seat;
        self.round.rinshan = false;
        match self.round.wall_mut().draw() {
            Ok(tile) => {
                self.round.player_mut(seat).draw(tile);
                tracing::debug!(
                    "Seat {} drew, {} tiles left",
                    seat,
                    self.round.wall().remaining()
                );
                io.channel.notify(&TableEvent::Drew { seat });
                Flow::Offer {
                    seat,
                    after_call: false,
                }
            }
            Err(_) => Flow::End(self.draw_result(DrawKind::Normal)),
        }
    }

    fn draw_replacement(&mut self, io: &mut Collaborators, seat: usize) -> Flow {
        self.round.pending_kan = None;
        self.round.turn = seat;
        match self.round.wall_mut().draw_replacement() {
            Ok(tile) => {
                self.round.player_mut(seat).draw(tile);
                self.round.rinshan = true;
                io.channel.notify(&TableEvent::Drew { seat });
                Flow::Offer {
                    seat,
                    after_call: false,
                }
            }
            Err(e) => {
                tracing::warn!("Seat {} has no replacement tile: {}", seat, e);
                Flow::End(self.draw_result(DrawKind::Normal))
            }
        }
    }

    // ----- own turn -----

    fn offer_turn(
        &mut self,
        io: &mut Collaborators,
        seat: usize,
        after_call: bool,
        now: DateTime<Utc>,
    ) -> Flow {
        self.phase = TurnPhase::Discard { seat, after_call };
        let actions = self.turn_actions(seat, after_call);

        if self.round.player(seat).is_bot {
            let choice = bot::turn_choice(self.round.player(seat), &actions);
            return match self.apply_turn_choice(io, seat, choice) {
                Ok(flow) => flow,
                Err(e) => {
                    tracing::warn!("Bot seat {} chose {}: {}", seat, choice.as_str(), e);
                    self.fallback_discard(io, seat)
                }
            };
        }

        let token = self.issue_token();
        let deadline = now + Duration::milliseconds(self.rule.thinking_time.turn_ms());
        io.channel.request_action(&ActionRequest {
            token,
            seat,
            actions,
            tile: None,
            deadline,
            deadline_ms: deadline.timestamp_millis(),
        });
        io.scheduler.schedule(Timer::Action { token }, deadline);
        self.turn_request = Some(TurnRequest {
            seat,
            token,
            deadline,
        });
        Flow::Suspend
    }

    /// Discard for a seat that did not choose: the default tile, else the
    /// drawn one.
    fn fallback_discard(&mut self, io: &mut Collaborators, seat: usize) -> Flow {
        let p = self.round.player(seat);
        match bot::default_discard(p).or(p.drawn()) {
            Some(tile) => {
                tracing::debug!("Seat {} discards {} by default", seat, tile);
                self.discard(io, seat, tile, false)
            }
            None => {
                tracing::warn!("Seat {} has nothing to discard, ending round", seat);
                Flow::End(self.draw_result(DrawKind::Normal))
            }
        }
    }

    fn turn_actions(&self, seat: usize, after_call: bool) -> Vec<AvailableAction> {
        let p = self.round.player(seat);
        let mut actions = vec![AvailableAction::Discard {
            forbidden: p.forbidden_discards(),
        }];
        if after_call {
            return actions;
        }

        if self.tsumo_result(seat).is_some() {
            actions.push(AvailableAction::Tsumo);
        }
        let discards = self.riichi_discards(p);
        if !discards.is_empty() {
            actions.push(AvailableAction::Riichi { discards });
        }
        if self.round.kan_count() < MAX_KANS && !self.round.wall().is_exhausted() {
            let tiles = self.ankan_tiles(p);
            if !tiles.is_empty() {
                actions.push(AvailableAction::Ankan { tiles });
            }
            let tiles = kakan_tiles(p);
            if !tiles.is_empty() {
                actions.push(AvailableAction::Kakan { tiles });
            }
        }
        if self.round.in_first_go_around()
            && p.discards().is_empty()
            && hand::yaochu_kinds(p.hand()) >= 9
        {
            actions.push(AvailableAction::KyuushuKyuuhai);
        }
        actions
    }

    fn riichi_discards(&self, p: &PlayerState) -> Vec<Tile> {
        if p.riichi.is_declared()
            || !p.is_closed()
            || p.points < RIICHI_DEPOSIT
            || self.round.wall().remaining() < 4
        {
            return Vec::new();
        }
        hand::tenpai_discards(p.hand(), p.melds().len())
    }

    fn ankan_tiles(&self, p: &PlayerState) -> Vec<Tile> {
        let mut tiles: Vec<Tile> = Vec::new();
        for &t in p.hand() {
            let kind = t.kind();
            if tiles.iter().any(|x| x.kind() == kind) || p.count_kind(kind) < 4 {
                continue;
            }
            if p.riichi.is_declared() && !riichi_kan_keeps_waits(p, kind) {
                continue;
            }
            tiles.push(t);
        }
        tiles
    }

    fn apply_turn_choice(
        &mut self,
        io: &mut Collaborators,
        seat: usize,
        choice: ActionChoice,
    ) -> Result<Flow, ActionError> {
        let after_call = match self.phase {
            TurnPhase::Discard { seat: s, after_call } if s == seat => after_call,
            _ => return Err(ActionError::NotYourTurn),
        };
        let actions = self.turn_actions(seat, after_call);

        match choice {
            ActionChoice::Discard(tile) => {
                let p = self.round.player(seat);
                if !p.hand().contains(&tile) {
                    return Err(ActionError::TileNotInHand(tile));
                }
                if !p.can_discard(tile) {
                    return Err(ActionError::ForbiddenDiscard(tile));
                }
                Ok(self.discard(io, seat, tile, false))
            }
            ActionChoice::Riichi(tile) => {
                let offered = actions.iter().any(
                    |a| matches!(a, AvailableAction::Riichi { discards } if discards.contains(&tile)),
                );
                if !offered {
                    return Err(ActionError::NotOffered("riichi"));
                }
                Ok(self.discard(io, seat, tile, true))
            }
            ActionChoice::Tsumo => {
                let result = self
                    .tsumo_result(seat)
                    .ok_or(ActionError::NotOffered("tsumo"))?;
                let (hand, tile) = hand_without_drawn(self.round.player(seat))
                    .ok_or(ActionError::NotOffered("tsumo"))?;
                tracing::info!("Seat {} won by tsumo on {}", seat, tile);
                let win = self.win_record(seat, None, tile, hand, result);
                Ok(Flow::End(self.result(RoundEndReason::Tsumo, vec![win])))
            }
            ActionChoice::Ankan(tile) => {
                let offered = actions.iter().any(|a| {
                    matches!(a, AvailableAction::Ankan { tiles } if tiles.iter().any(|t| t.kind() == tile.kind()))
                });
                if !offered {
                    return Err(ActionError::NotOffered("ankan"));
                }
                Ok(self.declare_ankan(io, seat, tile.kind()))
            }
            ActionChoice::Kakan(tile) => {
                let offered = actions.iter().any(|a| {
                    matches!(a, AvailableAction::Kakan { tiles } if tiles.iter().any(|t| t.kind() == tile.kind()))
                });
                if !offered {
                    return Err(ActionError::NotOffered("kakan"));
                }
                Ok(self.declare_kakan(seat, tile))
            }
            ActionChoice::KyuushuKyuuhai => {
                if !actions
                    .iter()
                    .any(|a| matches!(a, AvailableAction::KyuushuKyuuhai))
                {
                    return Err(ActionError::NotOffered("kyuushu_kyuuhai"));
                }
                tracing::info!("Seat {} aborted with nine terminals", seat);
                Ok(Flow::End(self.draw_result(DrawKind::KyuushuKyuuhai)))
            }
            other => Err(ActionError::NotOffered(other.as_str())),
        }
    }

    fn discard(&mut self, io: &mut Collaborators, seat: usize, tile: Tile, riichi: bool) -> Flow {
        let p = self.round.player_mut(seat);
        if p.riichi.is_declared() {
            // Letting a winning draw go locks riichi furiten.
            if p.drawn().is_some() && p.has_complete_hand() {
                p.furiten.riichi = true;
            }
            p.ippatsu = false;
        }
        if riichi {
            p.riichi_pending = true;
        }
        p.discard(tile, riichi);
        self.round.rinshan = false;
        self.round.contested = Some(Contested { seat, tile });
        tracing::debug!(
            "Seat {} discarded {}{}",
            seat,
            tile,
            if riichi { " declaring riichi" } else { "" }
        );
        io.channel.notify(&TableEvent::Discarded { seat, tile, riichi });
        Flow::Claims
    }

    // ----- kans -----

    fn declare_ankan(&mut self, io: &mut Collaborators, seat: usize, kind: u8) -> Flow {
        let tiles = self.round.player(seat).tiles_of_kind(kind);
        let meld = match pick::<4>(&tiles).and_then(Meld::ankan) {
            Ok(meld) => meld,
            Err(e) => {
                tracing::warn!("Seat {} cannot form a concealed kan: {}", seat, e);
                return Flow::Offer {
                    seat,
                    after_call: false,
                };
            }
        };
        let p = self.round.player_mut(seat);
        for &t in meld.tiles() {
            p.take(t);
        }
        p.add_meld(meld.clone(), Vec::new());
        tracing::debug!("Seat {} declared concealed kan {}", seat, meld);
        io.channel.notify(&TableEvent::Called { seat, meld });
        self.register_kan(io, seat);

        if self.rule.ron_on_ankan_for_kokushi {
            self.round.pending_kan = Some(PendingKan {
                seat,
                tile: tiles[0],
                kind: PendingKanKind::Ankan,
            });
            return Flow::KanWindow;
        }
        Flow::Replacement(seat)
    }

    fn declare_kakan(&mut self, seat: usize, tile: Tile) -> Flow {
        let p = self.round.player(seat);
        let tile = if p.hand().contains(&tile) {
            tile
        } else {
            match p.tiles_of_kind(tile.kind()).first() {
                Some(&t) => t,
                None => {
                    return Flow::Offer {
                        seat,
                        after_call: false,
                    }
                }
            }
        };
        tracing::debug!("Seat {} declared added kan with {}", seat, tile);
        self.round.pending_kan = Some(PendingKan {
            seat,
            tile,
            kind: PendingKanKind::Kakan,
        });
        Flow::KanWindow
    }

    fn open_kan_window(&mut self, io: &mut Collaborators, now: DateTime<Utc>) -> Flow {
        let Some(kan) = self.round.pending_kan else {
            return Flow::Offer {
                seat: self.round.turn,
                after_call: false,
            };
        };
        self.phase = TurnPhase::KanDeclared {
            seat: kan.seat,
            tile: kan.tile,
        };
        let eligible: Vec<Eligibility> = (1..4)
            .map(|d| (kan.seat + d) % 4)
            .filter(|&seat| {
                let p = self.round.player(seat);
                let robbable = match kan.kind {
                    PendingKanKind::Kakan => true,
                    PendingKanKind::Ankan => hand::completes_thirteen_orphans(p.hand(), kan.tile),
                };
                robbable
                    && !p.is_furiten()
                    && p.completes_with(kan.tile)
                    && self.ron_result(seat, kan.tile, true).is_some()
            })
            .map(|seat| Eligibility {
                ron: true,
                ..Eligibility::new(seat)
            })
            .collect();
        self.open_window(io, kan.seat, kan.tile, eligible, now)
    }

    fn complete_kan(&mut self, io: &mut Collaborators, kan: PendingKan) -> Flow {
        self.round.pending_kan = None;
        if kan.kind == PendingKanKind::Kakan {
            if !self.round.player_mut(kan.seat).upgrade_pon(kan.tile) {
                tracing::warn!("Seat {} has no pon to upgrade with {}", kan.seat, kan.tile);
                return Flow::Offer {
                    seat: kan.seat,
                    after_call: false,
                };
            }
            if let Some(meld) = self
                .round
                .player(kan.seat)
                .melds()
                .iter()
                .find(|m| m.kind() == MeldKind::Kakan && m.base_kind() == kan.tile.kind())
                .cloned()
            {
                io.channel.notify(&TableEvent::Called {
                    seat: kan.seat,
                    meld,
                });
            }
            self.register_kan(io, kan.seat);
        }
        Flow::Replacement(kan.seat)
    }

    /// Count a new kan and flip the next dora indicator.
    fn register_kan(&mut self, io: &mut Collaborators, seat: usize) {
        self.break_first_go_around();
        self.round.kan_owners.push(seat);
        let owners = &self.round.kan_owners;
        if owners.len() == MAX_KANS && owners.iter().any(|&s| s != owners[0]) {
            self.round.four_kan_pending = true;
        }
        if let Some(indicator) = self.round.wall_mut().reveal_dora_indicator() {
            io.channel.notify(&TableEvent::DoraRevealed { tile: indicator });
        }
    }

    fn break_first_go_around(&mut self) {
        self.round.calls_made = true;
        for seat in 0..4 {
            self.round.player_mut(seat).ippatsu = false;
        }
    }

    // ----- claims -----

    fn open_claims(&mut self, io: &mut Collaborators, now: DateTime<Utc>) -> Flow {
        let Some(contested) = self.round.contested else {
            return Flow::Draw((self.round.turn + 1) % 4);
        };
        self.phase = TurnPhase::ClaimWindow {
            discarder: contested.seat,
            tile: contested.tile,
        };
        let eligible: Vec<Eligibility> = (1..4)
            .map(|d| (contested.seat + d) % 4)
            .map(|seat| self.claim_eligibility(seat, contested.seat, contested.tile))
            .filter(|e| !e.is_empty())
            .collect();
        self.open_window(io, contested.seat, contested.tile, eligible, now)
    }

    fn claim_eligibility(&self, seat: usize, discarder: usize, tile: Tile) -> Eligibility {
        let p = self.round.player(seat);
        let mut e = Eligibility::new(seat);
        e.ron = !p.is_furiten()
            && p.completes_with(tile)
            && self.ron_result(seat, tile, false).is_some();
        if self.round.wall().is_exhausted() || p.riichi.is_declared() {
            return e;
        }

        let kind = tile.kind();
        let same = p.tiles_of_kind(kind);
        if same.len() >= 2 && has_legal_discard(p.hand(), &same[..2], &[kind]) {
            e.pon = true;
        }
        if same.len() >= 3 && self.round.kan_count() < MAX_KANS {
            e.minkan = true;
        }
        if seat == (discarder + 1) % 4 {
            e.chii = chii_options(p, tile);
        }
        e
    }

    /// Open a window, let bots answer, then ask the humans.
    fn open_window(
        &mut self,
        io: &mut Collaborators,
        discarder: usize,
        tile: Tile,
        eligible: Vec<Eligibility>,
        now: DateTime<Utc>,
    ) -> Flow {
        let token = self.issue_token();
        let no_calls = Resolution {
            token,
            discarder,
            tile,
            outcome: ClaimOutcome::NoCalls,
            passed_ron: Vec::new(),
        };
        if eligible.is_empty() {
            return Flow::Resolved(no_calls);
        }

        let deadline = now + Duration::milliseconds(self.rule.thinking_time.claim_ms());
        if let Err(e) = self
            .arbiter
            .open(token, discarder, tile, eligible.clone(), deadline)
        {
            tracing::warn!("Could not open claim window on {}: {}", tile, e);
            self.arbiter.reset();
            return Flow::Resolved(no_calls);
        }
        tracing::debug!(
            "Claim window {} on {} open for {} seats",
            token,
            tile,
            eligible.len()
        );

        for e in eligible.iter().filter(|e| self.round.player(e.seat).is_bot) {
            let call = Call::from_choice(bot::claim_choice(e)).unwrap_or(None);
            match self.arbiter.submit(token, e.seat, call, now) {
                Ok(Some(resolution)) => return Flow::Resolved(resolution),
                Ok(None) => {}
                Err(err) => tracing::warn!("Bot seat {} claim rejected: {}", e.seat, err),
            }
        }

        for e in eligible.iter().filter(|e| !self.round.player(e.seat).is_bot) {
            io.channel.request_action(&ActionRequest {
                token,
                seat: e.seat,
                actions: e.actions(),
                tile: Some(tile),
                deadline,
                deadline_ms: deadline.timestamp_millis(),
            });
        }
        io.scheduler.schedule(Timer::Action { token }, deadline);
        Flow::Suspend
    }

    fn apply_resolution(&mut self, io: &mut Collaborators, resolution: Resolution) -> Flow {
        self.arbiter.reset();
        io.scheduler.cancel(Timer::Action {
            token: resolution.token,
        });
        for &seat in &resolution.passed_ron {
            let p = self.round.player_mut(seat);
            p.furiten.temporary = true;
            if p.riichi.is_declared() {
                p.furiten.riichi = true;
            }
        }

        if let Some(kan) = self.round.pending_kan {
            if let ClaimOutcome::Ron(seats) = &resolution.outcome {
                if let Some(result) = self.ron_end(seats, kan.seat, kan.tile, true) {
                    return Flow::End(result);
                }
            }
            return self.complete_kan(io, kan);
        }

        let discarder = resolution.discarder;
        let tile = resolution.tile;
        self.round.contested = None;

        if let ClaimOutcome::Ron(seats) = &resolution.outcome {
            self.round.player_mut(discarder).riichi_pending = false;
            if let Some(result) = self.ron_end(seats, discarder, tile, false) {
                return Flow::End(result);
            }
            tracing::warn!("Ron on {} did not score, continuing", tile);
        }

        if let Some(flow) = self.accept_riichi(io, discarder) {
            return flow;
        }
        if self.round.four_kan_pending {
            tracing::info!("Round {} aborted after four kans", self.round.id);
            return Flow::End(self.draw_result(DrawKind::SuuKaikan));
        }
        if let ClaimOutcome::Meld(request) = resolution.outcome {
            return self.apply_call(io, discarder, request.seat, request.call, tile);
        }
        if self.four_winds() {
            tracing::info!("Round {} aborted on four winds", self.round.id);
            return Flow::End(self.draw_result(DrawKind::SuufonRenda));
        }
        Flow::Draw((discarder + 1) % 4)
    }

    /// The riichi discard survived its window. Collect the deposit.
    fn accept_riichi(&mut self, io: &mut Collaborators, seat: usize) -> Option<Flow> {
        let calls_made = self.round.calls_made;
        let p = self.round.player_mut(seat);
        if !p.riichi_pending {
            return None;
        }
        p.riichi_pending = false;
        p.riichi = if !calls_made && p.discards().len() == 1 {
            RiichiStatus::DoubleRiichi
        } else {
            RiichiStatus::Riichi
        };
        p.ippatsu = true;
        p.riichi_paid = true;
        p.points -= RIICHI_DEPOSIT;
        self.round.deposits += 1;
        tracing::debug!("Seat {} riichi accepted", seat);
        io.channel.notify(&TableEvent::RiichiAccepted { seat });

        if self.round.players().iter().all(|p| p.riichi.is_declared()) {
            tracing::info!("Round {} aborted on four riichi", self.round.id);
            return Some(Flow::End(self.draw_result(DrawKind::SuuchaRiichi)));
        }
        None
    }

    fn apply_call(
        &mut self,
        io: &mut Collaborators,
        discarder: usize,
        caller: usize,
        call: Call,
        tile: Tile,
    ) -> Flow {
        let source = ClaimSource::between(caller, discarder);
        let p = self.round.player(caller);
        let built = match call {
            Call::Pon => pick::<2>(&p.tiles_of_kind(tile.kind()))
                .and_then(|own| Meld::pon(own, tile, source).map(|m| (m, vec![tile.kind()]))),
            Call::Minkan => pick::<3>(&p.tiles_of_kind(tile.kind()))
                .and_then(|own| Meld::minkan(own, tile, source).map(|m| (m, Vec::new()))),
            Call::Chii(pair) => {
                if pair.iter().all(|t| p.hand().contains(t)) {
                    Meld::chii(pair, tile, source).map(|m| (m, chii_forbidden(tile, pair)))
                } else {
                    Err(MeldError::NotSequence)
                }
            }
            Call::Ron => Err(MeldError::NotMatching),
        };
        let (meld, forbidden) = match built {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Seat {} cannot call {} on {}: {}", caller, call.as_str(), tile, e);
                return Flow::Draw((discarder + 1) % 4);
            }
        };

        self.break_first_go_around();
        self.round.player_mut(discarder).mark_last_discard_claimed();
        let p = self.round.player_mut(caller);
        let mut claimed_taken = false;
        for &t in meld.tiles() {
            if t == tile && !claimed_taken {
                claimed_taken = true;
                continue;
            }
            p.take(t);
        }
        p.add_meld(meld.clone(), forbidden);
        self.round.turn = caller;
        tracing::debug!(
            "Seat {} called {} on {} from seat {}",
            caller,
            call.as_str(),
            tile,
            discarder
        );
        io.channel.notify(&TableEvent::Called { seat: caller, meld });

        if call == Call::Minkan {
            self.register_kan(io, caller);
            return Flow::Replacement(caller);
        }
        Flow::Offer {
            seat: caller,
            after_call: true,
        }
    }

    /// Four identical winds as the first four discards, with no calls.
    fn four_winds(&self) -> bool {
        if self.round.calls_made || self.round.discard_total() != 4 {
            return false;
        }
        let first: Vec<Tile> = self
            .round
            .players()
            .iter()
            .filter_map(|p| p.discards().first().map(|d| d.tile))
            .collect();
        first.len() == 4 && first[0].is_wind() && first.iter().all(|t| t.kind() == first[0].kind())
    }

    // ----- scoring -----

    fn context(&self, seat: usize, tsumo: bool, chankan: bool) -> ScoringContext {
        let p = self.round.player(seat);
        let wall = self.round.wall();
        ScoringContext {
            dora_indicators: wall.dora_indicators().to_vec(),
            ura_indicators: if p.riichi.is_declared() {
                wall.ura_indicators().to_vec()
            } else {
                Vec::new()
            },
            seat_wind: p.seat_wind,
            round_wind: self.round.counter.wind,
            riichi: p.riichi,
            ippatsu: p.ippatsu,
            tsumo,
            rinshan: tsumo && self.round.rinshan,
            chankan,
            last_tile: wall.is_exhausted() && !self.round.rinshan && !chankan,
            first_turn: self.round.in_first_go_around() && p.discards().is_empty(),
            is_dealer: p.is_dealer(),
            honba: self.round.counter.honba,
            open_tanyao: self.rule.open_tanyao,
            local_yaku: self.rule.local_yaku,
        }
    }

    fn evaluate(
        &self,
        seat: usize,
        hand: Vec<Tile>,
        tile: Tile,
        tsumo: bool,
        chankan: bool,
    ) -> Option<ScoringResult> {
        let request = ScoringRequest {
            hand,
            melds: self.round.player(seat).melds().to_vec(),
            winning_tile: tile,
            context: self.context(seat, tsumo, chankan),
        };
        self.oracle
            .evaluate(&request)
            .filter(|r| r.meets_minimum(self.rule.minimum_han.value()))
    }

    fn tsumo_result(&self, seat: usize) -> Option<ScoringResult> {
        let p = self.round.player(seat);
        if !p.has_complete_hand() {
            return None;
        }
        let (hand, tile) = hand_without_drawn(p)?;
        self.evaluate(seat, hand, tile, true, false)
    }

    fn ron_result(&self, seat: usize, tile: Tile, chankan: bool) -> Option<ScoringResult> {
        let hand = self.round.player(seat).hand().to_vec();
        self.evaluate(seat, hand, tile, false, chankan)
    }

    fn ron_end(&self, seats: &[usize], from: usize, tile: Tile, chankan: bool) -> Option<RoundResult> {
        let wins: Vec<WinRecord> = seats
            .iter()
            .filter_map(|&seat| {
                let result = self.ron_result(seat, tile, chankan)?;
                let hand = self.round.player(seat).hand().to_vec();
                Some(self.win_record(seat, Some(from), tile, hand, result))
            })
            .collect();
        if wins.is_empty() {
            return None;
        }
        tracing::info!(
            "Seats {:?} won by ron on {} from seat {}",
            seats,
            tile,
            from
        );
        Some(self.result(RoundEndReason::Ron, wins))
    }

    fn win_record(
        &self,
        seat: usize,
        from: Option<usize>,
        tile: Tile,
        hand: Vec<Tile>,
        result: ScoringResult,
    ) -> WinRecord {
        let p = self.round.player(seat);
        let wall = self.round.wall();
        let riichi = p.riichi.is_declared();
        WinRecord {
            seat,
            from,
            tile,
            hand,
            melds: p.melds().to_vec(),
            riichi,
            dora_indicators: wall.dora_indicators().to_vec(),
            ura_indicators: if riichi {
                wall.ura_indicators().to_vec()
            } else {
                Vec::new()
            },
            result,
        }
    }

    fn result(&self, reason: RoundEndReason, wins: Vec<WinRecord>) -> RoundResult {
        let players = self.round.players();
        let normal = reason == RoundEndReason::ExhaustiveDraw(DrawKind::Normal);
        RoundResult {
            round_id: self.round.id,
            counter: self.round.counter,
            reason,
            wins,
            tenpai: std::array::from_fn(|i| normal && players[i].is_tenpai()),
            nagashi: if normal {
                players
                    .iter()
                    .filter(|p| p.nagashi_eligible())
                    .map(|p| p.seat)
                    .collect()
            } else {
                Vec::new()
            },
            riichi_paid: std::array::from_fn(|i| players[i].riichi_paid),
            deposits: self.round.deposits,
            uuids: std::array::from_fn(|i| players[i].uuid.clone()),
        }
    }

    fn draw_result(&self, kind: DrawKind) -> RoundResult {
        self.result(RoundEndReason::ExhaustiveDraw(kind), Vec::new())
    }
}

fn hand_without_drawn(p: &PlayerState) -> Option<(Vec<Tile>, Tile)> {
    let drawn = p.drawn()?;
    let mut hand = p.hand().to_vec();
    let i = hand.iter().position(|&t| t == drawn)?;
    hand.remove(i);
    Some((hand, drawn))
}

fn pick<const N: usize>(tiles: &[Tile]) -> Result<[Tile; N], MeldError> {
    tiles
        .get(..N)
        .and_then(|s| <[Tile; N]>::try_from(s).ok())
        .ok_or(MeldError::NotMatching)
}

fn kakan_tiles(p: &PlayerState) -> Vec<Tile> {
    p.melds()
        .iter()
        .filter(|m| m.kind() == MeldKind::Pon)
        .filter_map(|m| p.tiles_of_kind(m.base_kind()).first().copied())
        .collect()
}

/// A riichi hand may only kan the drawn tile, and only if its waits stay.
fn riichi_kan_keeps_waits(p: &PlayerState, kind: u8) -> bool {
    let Some((before, drawn)) = hand_without_drawn(p) else {
        return false;
    };
    if drawn.kind() != kind {
        return false;
    }
    let after: Vec<Tile> = p
        .hand()
        .iter()
        .copied()
        .filter(|t| t.kind() != kind)
        .collect();
    let waits = hand::waits(&before, p.melds().len());
    !waits.is_empty() && waits == hand::waits(&after, p.melds().len() + 1)
}

fn has_legal_discard(hand: &[Tile], used: &[Tile], forbidden: &[u8]) -> bool {
    let mut rest = hand.to_vec();
    for t in used {
        if let Some(i) = rest.iter().position(|x| x == t) {
            rest.remove(i);
        }
    }
    rest.iter().any(|t| !forbidden.contains(&t.kind()))
}

fn chii_options(p: &PlayerState, tile: Tile) -> Vec<[Tile; 2]> {
    const SHAPES: [(i8, i8); 3] = [(-2, -1), (-1, 1), (1, 2)];
    let mut options = Vec::new();
    for (a, b) in SHAPES {
        let (Some(ta), Some(tb)) = (tile.offset(a), tile.offset(b)) else {
            continue;
        };
        let (Some(&ha), Some(&hb)) = (
            p.tiles_of_kind(ta.kind()).first(),
            p.tiles_of_kind(tb.kind()).first(),
        ) else {
            continue;
        };
        let pair = [ha, hb];
        if has_legal_discard(p.hand(), &pair, &chii_forbidden(tile, pair)) {
            options.push(pair);
        }
    }
    options
}

/// Kinds barred after a chii: the claimed kind, plus the tile three steps
/// away on an edge call.
fn chii_forbidden(claimed: Tile, pair: [Tile; 2]) -> Vec<u8> {
    let kind = claimed.kind();
    let lo = pair[0].kind().min(pair[1].kind());
    let hi = pair[0].kind().max(pair[1].kind());
    let mut forbidden = vec![kind];
    let suji = if lo > kind {
        claimed.offset(3)
    } else if hi < kind {
        claimed.offset(-3)
    } else {
        None
    };
    if let Some(t) = suji {
        forbidden.push(t.kind());
    }
    forbidden
}
