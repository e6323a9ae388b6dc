//! Claim arbitration for a single contested tile.
//!
//! # State Diagram
//!
//! ```text
//!            open()                      all answered / deadline / cancel
//! ┌──────┐ ───────────▶ ┌──────────┐ ─────────────────────────────────▶ ┌──────────┐
//! │ Idle │              │ Awaiting │                                    │ Resolved │
//! └──────┘ ◀─────────── └──────────┘                                    └────┬─────┘
//!     ▲                                                                      │
//!     └──────────────────────────── reset() ─────────────────────────────────┘
//! ```
//!
//! Priority is ron > pon/minkan > chii. Among rons, seats are ordered by
//! distance downstream of the discarder. The window resolves early as soon
//! as no seat still thinking could outrank the best call already made.

use std::fmt;

use chrono::{DateTime, Utc};

use super::action::{ActionChoice, ActionToken, AvailableAction};
use super::rule::MultipleRon;
use super::tile::Tile;

/// A call on the contested tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Ron,
    Minkan,
    Pon,
    Chii([Tile; 2]),
}

impl Call {
    pub fn priority(&self) -> u8 {
        match self {
            Self::Ron => 3,
            Self::Minkan | Self::Pon => 2,
            Self::Chii(_) => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ron => "ron",
            Self::Minkan => "minkan",
            Self::Pon => "pon",
            Self::Chii(_) => "chii",
        }
    }

    /// Map a seat's answer onto a call. `None` means pass.
    pub fn from_choice(choice: ActionChoice) -> Result<Option<Call>, ClaimError> {
        match choice {
            ActionChoice::Pass => Ok(None),
            ActionChoice::Ron => Ok(Some(Self::Ron)),
            ActionChoice::Pon => Ok(Some(Self::Pon)),
            ActionChoice::Minkan => Ok(Some(Self::Minkan)),
            ActionChoice::Chii(tiles) => Ok(Some(Self::Chii(tiles))),
            _ => Err(ClaimError::NotOffered),
        }
    }
}

/// Calls a seat may make on the contested tile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Eligibility {
    pub seat: usize,
    pub ron: bool,
    pub pon: bool,
    pub minkan: bool,
    pub chii: Vec<[Tile; 2]>,
}

impl Eligibility {
    pub fn new(seat: usize) -> Self {
        Self {
            seat,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.ron && !self.pon && !self.minkan && self.chii.is_empty()
    }

    /// Highest priority this seat could still claim with.
    pub fn best_priority(&self) -> u8 {
        if self.ron {
            3
        } else if self.pon || self.minkan {
            2
        } else if !self.chii.is_empty() {
            1
        } else {
            0
        }
    }

    pub fn allows(&self, call: &Call) -> bool {
        match call {
            Call::Ron => self.ron,
            Call::Pon => self.pon,
            Call::Minkan => self.minkan,
            Call::Chii(tiles) => self.chii.iter().any(|o| same_pair(o, tiles)),
        }
    }

    /// Offered actions for a request.
    pub fn actions(&self) -> Vec<AvailableAction> {
        let mut actions = Vec::new();
        if self.ron {
            actions.push(AvailableAction::Ron);
        }
        if self.minkan {
            actions.push(AvailableAction::Minkan);
        }
        if self.pon {
            actions.push(AvailableAction::Pon);
        }
        if !self.chii.is_empty() {
            actions.push(AvailableAction::Chii {
                options: self.chii.clone(),
            });
        }
        actions
    }
}

fn same_pair(a: &[Tile; 2], b: &[Tile; 2]) -> bool {
    (a[0] == b[0] && a[1] == b[1]) || (a[0] == b[1] && a[1] == b[0])
}

/// A submitted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimRequest {
    pub seat: usize,
    pub call: Call,
    pub tile: Tile,
    pub submitted_at: DateTime<Utc>,
}

/// Arbiter phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArbiterPhase {
    #[default]
    Idle,
    Awaiting,
    Resolved,
}

impl ArbiterPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Awaiting => "awaiting_responses",
            Self::Resolved => "resolved",
        }
    }
}

/// Winning outcome of a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    NoCalls,
    /// Winning seats, nearest downstream of the discarder first.
    Ron(Vec<usize>),
    Meld(ClaimRequest),
}

/// Result of a resolved window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub token: ActionToken,
    pub discarder: usize,
    pub tile: Tile,
    pub outcome: ClaimOutcome,
    /// Seats that could have called ron and did not.
    pub passed_ron: Vec<usize>,
}

#[derive(Debug, Clone)]
struct ClaimWindow {
    token: ActionToken,
    discarder: usize,
    tile: Tile,
    deadline: DateTime<Utc>,
    eligible: Vec<Eligibility>,
    /// `Some(None)` is an explicit pass.
    responses: [Option<Option<ClaimRequest>>; 4],
}

impl ClaimWindow {
    fn eligibility(&self, seat: usize) -> Option<&Eligibility> {
        self.eligible.iter().find(|e| e.seat == seat)
    }

    fn distance(&self, seat: usize) -> usize {
        (seat + 4 - self.discarder) % 4
    }

    fn submitted(&self) -> impl Iterator<Item = &ClaimRequest> {
        self.responses.iter().flatten().flatten()
    }

    fn pending(&self) -> impl Iterator<Item = &Eligibility> {
        self.eligible
            .iter()
            .filter(|e| self.responses[e.seat].is_none())
    }

    fn can_resolve(&self, multiple_ron: MultipleRon) -> bool {
        let best = self.submitted().map(|r| r.call.priority()).max().unwrap_or(0);
        // Under head bump, seats behind the nearest ron cannot change the outcome.
        let head = match multiple_ron {
            MultipleRon::HeadBump => self
                .submitted()
                .filter(|r| r.call == Call::Ron)
                .map(|r| self.distance(r.seat))
                .min(),
            MultipleRon::All => None,
        };
        self.pending().all(|e| {
            e.best_priority() < best.max(1) || head.is_some_and(|d| self.distance(e.seat) > d)
        })
    }
}

/// Collects and ranks calls on one discard at a time.
#[derive(Debug, Clone, Default)]
pub struct ClaimArbiter {
    phase: ArbiterPhase,
    multiple_ron: MultipleRon,
    window: Option<ClaimWindow>,
}

impl ClaimArbiter {
    pub fn new(multiple_ron: MultipleRon) -> Self {
        Self {
            phase: ArbiterPhase::Idle,
            multiple_ron,
            window: None,
        }
    }

    pub fn phase(&self) -> ArbiterPhase {
        self.phase
    }

    pub fn token(&self) -> Option<ActionToken> {
        self.window.as_ref().map(|w| w.token)
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.window.as_ref().map(|w| w.deadline)
    }

    /// Seats that have not answered yet.
    pub fn pending_seats(&self) -> Vec<usize> {
        match &self.window {
            Some(w) if self.phase == ArbiterPhase::Awaiting => {
                w.pending().map(|e| e.seat).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn eligibility(&self, seat: usize) -> Option<&Eligibility> {
        self.window.as_ref().and_then(|w| w.eligibility(seat))
    }

    /// Open a window for `tile` discarded by `discarder`.
    pub fn open(
        &mut self,
        token: ActionToken,
        discarder: usize,
        tile: Tile,
        eligible: Vec<Eligibility>,
        deadline: DateTime<Utc>,
    ) -> Result<(), ClaimError> {
        if self.phase != ArbiterPhase::Idle {
            return Err(ClaimError::AlreadyOpen);
        }
        let eligible: Vec<Eligibility> = eligible
            .into_iter()
            .filter(|e| !e.is_empty() && e.seat != discarder && e.seat < 4)
            .collect();
        if eligible.is_empty() {
            return Err(ClaimError::NobodyEligible);
        }
        self.window = Some(ClaimWindow {
            token,
            discarder,
            tile,
            deadline,
            eligible,
            responses: [None; 4],
        });
        self.phase = ArbiterPhase::Awaiting;
        Ok(())
    }

    /// Record a seat's answer. Returns the resolution once the window closes.
    pub fn submit(
        &mut self,
        token: ActionToken,
        seat: usize,
        call: Option<Call>,
        now: DateTime<Utc>,
    ) -> Result<Option<Resolution>, ClaimError> {
        if self.phase != ArbiterPhase::Awaiting {
            return Err(ClaimError::NotOpen);
        }
        let Some(window) = self.window.as_mut() else {
            return Err(ClaimError::NotOpen);
        };
        if window.token != token {
            return Err(ClaimError::StaleToken);
        }
        if now > window.deadline {
            return Err(ClaimError::DeadlinePassed);
        }
        let eligibility = window.eligibility(seat).ok_or(ClaimError::NotEligible)?;
        if let Some(call) = &call {
            if !eligibility.allows(call) {
                return Err(ClaimError::NotOffered);
            }
        }
        if window.responses[seat].is_some() {
            return Err(ClaimError::AlreadyResponded);
        }

        let tile = window.tile;
        window.responses[seat] = Some(call.map(|call| ClaimRequest {
            seat,
            call,
            tile,
            submitted_at: now,
        }));

        if window.can_resolve(self.multiple_ron) {
            return Ok(self.resolve());
        }
        Ok(None)
    }

    /// Close the window at its deadline. Silent seats pass.
    pub fn expire(&mut self, token: ActionToken, now: DateTime<Utc>) -> Option<Resolution> {
        let window = self.window.as_ref()?;
        if self.phase != ArbiterPhase::Awaiting || window.token != token || now < window.deadline {
            return None;
        }
        self.resolve()
    }

    /// Force the window closed with no calls.
    pub fn cancel(&mut self) -> Option<Resolution> {
        if self.phase != ArbiterPhase::Awaiting {
            return None;
        }
        let window = self.window.as_ref()?;
        let resolution = Resolution {
            token: window.token,
            discarder: window.discarder,
            tile: window.tile,
            outcome: ClaimOutcome::NoCalls,
            passed_ron: Vec::new(),
        };
        self.phase = ArbiterPhase::Resolved;
        Some(resolution)
    }

    /// Back to idle after the engine applied a resolution.
    pub fn reset(&mut self) {
        self.phase = ArbiterPhase::Idle;
        self.window = None;
    }

    fn resolve(&mut self) -> Option<Resolution> {
        let window = self.window.as_ref()?;

        let mut rons: Vec<usize> = window
            .submitted()
            .filter(|r| r.call == Call::Ron)
            .map(|r| r.seat)
            .collect();
        rons.sort_by_key(|&s| window.distance(s));

        let outcome = if !rons.is_empty() {
            if self.multiple_ron == MultipleRon::HeadBump {
                rons.truncate(1);
            }
            ClaimOutcome::Ron(rons)
        } else {
            window
                .submitted()
                .max_by(|a, b| {
                    a.call
                        .priority()
                        .cmp(&b.call.priority())
                        .then(window.distance(b.seat).cmp(&window.distance(a.seat)))
                })
                .map(|r| ClaimOutcome::Meld(*r))
                .unwrap_or(ClaimOutcome::NoCalls)
        };

        let passed_ron: Vec<usize> = window
            .eligible
            .iter()
            .filter(|e| e.ron)
            .filter(|e| !matches!(window.responses[e.seat], Some(Some(r)) if r.call == Call::Ron))
            .map(|e| e.seat)
            .collect();

        let resolution = Resolution {
            token: window.token,
            discarder: window.discarder,
            tile: window.tile,
            outcome,
            passed_ron,
        };
        self.phase = ArbiterPhase::Resolved;
        Some(resolution)
    }
}

/// Claim errors. None of these change arbiter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimError {
    AlreadyOpen,
    NobodyEligible,
    NotOpen,
    StaleToken,
    DeadlinePassed,
    NotEligible,
    NotOffered,
    AlreadyResponded,
}

impl fmt::Display for ClaimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyOpen => write!(f, "A claim window is already open"),
            Self::NobodyEligible => write!(f, "No seat can call this tile"),
            Self::NotOpen => write!(f, "No claim window is open"),
            Self::StaleToken => write!(f, "Response belongs to an earlier window"),
            Self::DeadlinePassed => write!(f, "Claim window deadline has passed"),
            Self::NotEligible => write!(f, "Seat cannot call this tile"),
            Self::NotOffered => write!(f, "Call was not offered to this seat"),
            Self::AlreadyResponded => write!(f, "Seat already answered"),
        }
    }
}

impl std::error::Error for ClaimError {}
