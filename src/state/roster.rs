//! Seat roster for a table.
//!
//! Seat 0 is the host. The host is always ready and is the only occupant
//! allowed to configure the table. When the host leaves, the first remaining
//! human takes over; a table left with only bots is cleared.

use serde::{Deserialize, Serialize};

use super::session::SessionError;

/// Seats at a table.
pub const SEATS: usize = 4;

/// One occupant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    /// Stable identity, also used for bots.
    pub uuid: String,
    pub display_name: String,
    pub is_bot: bool,
    pub ready: bool,
    pub connected: bool,
    /// Persistent point total across rounds.
    pub points: i32,
    pub joined_at: chrono::DateTime<chrono::Utc>,
}

impl Seat {
    pub fn human(uuid: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            display_name: display_name.into(),
            is_bot: false,
            ready: false,
            connected: true,
            points: 0,
            joined_at: chrono::Utc::now(),
        }
    }

    fn bot(serial: u32) -> Self {
        Self {
            uuid: format!("bot-{}", serial),
            display_name: format!("Bot {}", serial),
            is_bot: true,
            ready: true,
            connected: true,
            points: 0,
            joined_at: chrono::Utc::now(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "uuid": self.uuid,
            "display_name": self.display_name,
            "is_bot": self.is_bot,
            "ready": self.ready,
            "connected": self.connected,
            "points": self.points
        })
    }
}

/// Ordered seat list. Index is the seat number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    seats: Vec<Seat>,
    bot_serial: u32,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    pub fn seat(&self, index: usize) -> Option<&Seat> {
        self.seats.get(index)
    }

    pub(crate) fn seat_mut(&mut self, index: usize) -> Option<&mut Seat> {
        self.seats.get_mut(index)
    }

    pub(crate) fn seats_mut(&mut self) -> impl Iterator<Item = &mut Seat> {
        self.seats.iter_mut()
    }

    pub fn host(&self) -> Option<&Seat> {
        self.seats.first()
    }

    pub fn is_host(&self, uuid: &str) -> bool {
        self.host().is_some_and(|s| s.uuid == uuid)
    }

    pub fn index_of(&self, uuid: &str) -> Option<usize> {
        self.seats.iter().position(|s| s.uuid == uuid)
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.index_of(uuid).is_some()
    }

    pub fn len(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.seats.len() >= SEATS
    }

    pub fn human_count(&self) -> usize {
        self.seats.iter().filter(|s| !s.is_bot).count()
    }

    pub fn all_ready(&self) -> bool {
        self.seats.iter().all(|s| s.ready)
    }

    /// Seat a human. The first one becomes host.
    pub fn join(&mut self, mut seat: Seat) -> Result<usize, SessionError> {
        if self.contains(&seat.uuid) {
            return Err(SessionError::AlreadySeated);
        }
        if self.is_full() {
            return Err(SessionError::Full);
        }
        if self.seats.is_empty() {
            seat.ready = true;
        }
        self.seats.push(seat);
        Ok(self.seats.len() - 1)
    }

    /// Add a bot. A table needs a human host first.
    pub fn add_bot(&mut self) -> Result<usize, SessionError> {
        if self.seats.is_empty() {
            return Err(SessionError::NoHost);
        }
        if self.is_full() {
            return Err(SessionError::Full);
        }
        self.bot_serial += 1;
        self.seats.push(Seat::bot(self.bot_serial));
        Ok(self.seats.len() - 1)
    }

    /// Remove an occupant, handing the host seat over if needed.
    pub fn leave(&mut self, uuid: &str) -> Result<Seat, SessionError> {
        let index = self.index_of(uuid).ok_or(SessionError::NotSeated)?;
        let seat = self.seats.remove(index);
        if index == 0 {
            self.transfer_host();
        }
        Ok(seat)
    }

    /// Remove a guest by seat index. The host cannot be kicked.
    pub fn kick(&mut self, index: usize) -> Result<Seat, SessionError> {
        if index == 0 {
            return Err(SessionError::CannotKickHost);
        }
        if index >= self.seats.len() {
            return Err(SessionError::NotSeated);
        }
        Ok(self.seats.remove(index))
    }

    pub fn set_ready(&mut self, uuid: &str, ready: bool) -> Result<(), SessionError> {
        let index = self.index_of(uuid).ok_or(SessionError::NotSeated)?;
        // Host stays ready.
        self.seats[index].ready = ready || index == 0;
        Ok(())
    }

    /// Guests must confirm again after the rules change.
    pub fn unready_guests(&mut self) {
        for seat in self.seats.iter_mut().skip(1).filter(|s| !s.is_bot) {
            seat.ready = false;
        }
    }

    fn transfer_host(&mut self) {
        match self.seats.iter().position(|s| !s.is_bot) {
            Some(i) => {
                let host = self.seats.remove(i);
                self.seats.insert(0, host);
                self.seats[0].ready = true;
            }
            None => self.seats.clear(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let seats: Vec<serde_json::Value> = self.seats.iter().map(Seat::to_json).collect();
        serde_json::json!({
            "host": self.host().map(|s| s.uuid.clone()),
            "seats": seats,
            "max_seats": SEATS
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(names: &[&str]) -> Roster {
        let mut roster = Roster::new();
        for name in names {
            roster.join(Seat::human(*name, *name)).unwrap();
        }
        roster
    }

    #[test]
    fn test_first_human_hosts_and_is_ready() {
        let r = roster(&["alice", "bob"]);
        assert!(r.is_host("alice"));
        assert!(r.seat(0).unwrap().ready);
        assert!(!r.seat(1).unwrap().ready);
    }

    #[test]
    fn test_join_limits() {
        let mut r = roster(&["alice", "bob", "carol", "dave"]);
        assert!(r.is_full());
        assert_eq!(r.join(Seat::human("erin", "erin")), Err(SessionError::Full));
        let mut r = roster(&["alice"]);
        assert_eq!(
            r.join(Seat::human("alice", "again")),
            Err(SessionError::AlreadySeated)
        );
    }

    #[test]
    fn test_bots_need_a_host() {
        let mut r = Roster::new();
        assert_eq!(r.add_bot(), Err(SessionError::NoHost));
        let mut r = roster(&["alice"]);
        assert_eq!(r.add_bot(), Ok(1));
        assert_eq!(r.add_bot(), Ok(2));
        assert_ne!(r.seat(1).unwrap().uuid, r.seat(2).unwrap().uuid);
        assert!(r.seat(1).unwrap().ready);
    }

    #[test]
    fn test_host_transfer_to_first_human() {
        let mut r = roster(&["alice"]);
        r.add_bot().unwrap();
        r.join(Seat::human("bob", "bob")).unwrap();

        r.leave("alice").unwrap();
        assert!(r.is_host("bob"));
        assert!(r.seat(0).unwrap().ready);
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn test_only_bots_left_clears_table() {
        let mut r = roster(&["alice"]);
        r.add_bot().unwrap();
        r.add_bot().unwrap();
        r.leave("alice").unwrap();
        assert!(r.is_empty());
    }

    #[test]
    fn test_kick_and_ready() {
        let mut r = roster(&["alice", "bob"]);
        assert_eq!(r.kick(0), Err(SessionError::CannotKickHost));
        assert_eq!(r.kick(5), Err(SessionError::NotSeated));

        r.set_ready("bob", true).unwrap();
        r.set_ready("alice", false).unwrap();
        assert!(r.all_ready());

        r.unready_guests();
        assert!(!r.seat(1).unwrap().ready);
        assert!(r.seat(0).unwrap().ready);

        assert_eq!(r.kick(1).unwrap().uuid, "bob");
        assert_eq!(r.set_ready("bob", true), Err(SessionError::NotSeated));
    }
}
