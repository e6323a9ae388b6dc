//! Table registry.
//!
//! Sessions live in a sharded map keyed by table position, so hosts can drive
//! different tables from different threads through `&self`.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::session::{GameSession, SessionStatus, TableKey};

/// All live tables.
#[derive(Default)]
pub struct SessionTable {
    sessions: DashMap<TableKey, GameSession>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Returns false if its position is already taken.
    pub fn create(&self, session: GameSession) -> bool {
        match self.sessions.entry(session.key().clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                tracing::debug!(table = %session.key(), "Table created");
                slot.insert(session);
                true
            }
        }
    }

    pub fn contains(&self, key: &TableKey) -> bool {
        self.sessions.contains_key(key)
    }

    /// Run `f` with exclusive access to one session.
    ///
    /// Holds the shard lock for the duration of `f`; do not call back into
    /// the table from inside it.
    pub fn with_session<R>(
        &self,
        key: &TableKey,
        f: impl FnOnce(&mut GameSession) -> R,
    ) -> Option<R> {
        let mut session = self.sessions.get_mut(key)?;
        Some(f(&mut session))
    }

    /// Tear down a table. The running round is dropped without settlement.
    pub fn remove(&self, key: &TableKey) -> Option<GameSession> {
        let (_, mut session) = self.sessions.remove(key)?;
        session.on_table_destroyed();
        Some(session)
    }

    /// Table a player is seated at.
    pub fn find_by_player(&self, uuid: &str) -> Option<TableKey> {
        self.sessions
            .iter()
            .find(|entry| entry.value().has_player(uuid))
            .map(|entry| entry.key().clone())
    }

    pub fn keys(&self) -> Vec<TableKey> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Count tables in a match.
    pub fn playing_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().status() == SessionStatus::Playing)
            .count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::action::ActionRequest;
    use crate::state::channel::{
        Collaborators, MemoryRoundStore, PlayerChannel, Scheduler, SettlementSink, Timer,
    };
    use crate::state::scoring::{ScoringOracle, ScoringRequest, ScoringResult};
    use crate::state::settlement::{ScoreSettlement, YakuSettlement};
    use chrono::{DateTime, Utc};
    use std::sync::Arc;

    struct Quiet;

    impl PlayerChannel for Quiet {
        fn request_action(&mut self, _request: &ActionRequest) {}
    }

    impl Scheduler for Quiet {
        fn schedule(&mut self, _timer: Timer, _at: DateTime<Utc>) {}
        fn cancel(&mut self, _timer: Timer) {}
    }

    impl SettlementSink for Quiet {
        fn score_settlement(&mut self, _settlement: &ScoreSettlement) {}
        fn yaku_settlement(&mut self, _settlement: &YakuSettlement) {}
    }

    impl ScoringOracle for Quiet {
        fn evaluate(&self, _request: &ScoringRequest) -> Option<ScoringResult> {
            None
        }
    }

    fn session(x: i32) -> GameSession {
        let io = Collaborators {
            channel: Box::new(Quiet),
            scheduler: Box::new(Quiet),
            store: Box::new(MemoryRoundStore::new()),
            settlements: Box::new(Quiet),
        };
        GameSession::new(TableKey::new("overworld", x, 70, 0), Arc::new(Quiet), io)
    }

    #[test]
    fn test_create_rejects_taken_position() {
        let table = SessionTable::new();
        assert!(table.create(session(1)));
        assert!(!table.create(session(1)));
        assert!(table.create(session(2)));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_find_by_player() {
        let table = SessionTable::new();
        table.create(session(1));
        table.create(session(2));
        let key = TableKey::new("overworld", 2, 70, 0);
        table
            .with_session(&key, |s| s.join("alice", "Alice"))
            .unwrap()
            .unwrap();

        assert_eq!(table.find_by_player("alice"), Some(key.clone()));
        assert_eq!(table.find_by_player("bob"), None);

        let removed = table.remove(&key).unwrap();
        assert!(removed.has_player("alice"));
        assert_eq!(table.find_by_player("alice"), None);
        assert!(table.with_session(&key, |_| ()).is_none());
    }

    #[test]
    fn test_playing_count() {
        let table = SessionTable::new();
        table.create(session(1));
        let key = TableKey::new("overworld", 1, 70, 0);
        table.with_session(&key, |s| {
            s.join("alice", "Alice").unwrap();
            for _ in 0..3 {
                s.add_bot().unwrap();
            }
            s.start(Utc::now()).unwrap();
        });
        assert_eq!(table.playing_count(), 1);
    }
}
