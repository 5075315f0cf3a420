//! Per-connection session records owned by the simulation loop.
//!
//! Each session holds the bounded sender for its connection's writer
//! task plus the latest decoded input. Sends never block the tick: a
//! full queue marks the session for removal and the disconnect is
//! applied at the next tick boundary.

use std::collections::HashMap;

use log::warn;
use tokio::sync::mpsc;

use shared::protocol::ServerMessage;

use crate::game::InputIntent;

pub struct Session {
    pub conn_id: u32,
    /// Assigned once the CON handshake succeeds.
    pub player_id: Option<u32>,
    pub intent: InputIntent,
    /// Set by SHT, consumed once per tick.
    pub shoot_requested: bool,
    /// Marked sessions are dropped at the next tick boundary.
    pub remove: bool,
    sender: mpsc::Sender<String>,
}

impl Session {
    pub fn new(conn_id: u32, sender: mpsc::Sender<String>) -> Session {
        Session {
            conn_id,
            player_id: None,
            intent: InputIntent::default(),
            shoot_requested: false,
            remove: false,
            sender,
        }
    }

    pub fn send(&mut self, message: &ServerMessage) {
        self.send_line(message.encode());
    }

    /// Non-blocking enqueue. Backpressure is treated the same as a
    /// closed connection: the session is marked for removal.
    pub fn send_line(&mut self, line: String) {
        if self.remove {
            return;
        }
        if let Err(err) = self.sender.try_send(line) {
            match err {
                mpsc::error::TrySendError::Full(_) => {
                    warn!("Connection {} outbound queue full, dropping", self.conn_id);
                }
                mpsc::error::TrySendError::Closed(_) => {
                    warn!("Connection {} writer closed, dropping", self.conn_id);
                }
            }
            self.remove = true;
        }
    }
}

/// All live sessions, keyed by connection ID.
#[derive(Default)]
pub struct SessionManager {
    sessions: HashMap<u32, Session>,
}

impl SessionManager {
    pub fn new() -> SessionManager {
        SessionManager {
            sessions: HashMap::new(),
        }
    }

    pub fn insert(&mut self, session: Session) {
        self.sessions.insert(session.conn_id, session);
    }

    pub fn get_mut(&mut self, conn_id: u32) -> Option<&mut Session> {
        self.sessions.get_mut(&conn_id)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }

    /// Sessions that completed the handshake and control a tank.
    pub fn player_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|s| s.player_id.is_some() && !s.remove)
            .count()
    }

    pub fn send_to(&mut self, conn_id: u32, message: &ServerMessage) {
        if let Some(session) = self.sessions.get_mut(&conn_id) {
            session.send(message);
        }
    }

    /// Encodes once and fans the line out to every joined session.
    pub fn broadcast(&mut self, message: &ServerMessage) {
        let line = message.encode();
        for session in self.sessions.values_mut() {
            if session.player_id.is_some() {
                session.send_line(line.clone());
            }
        }
    }

    pub fn broadcast_except(&mut self, skip_conn_id: u32, message: &ServerMessage) {
        let line = message.encode();
        for session in self.sessions.values_mut() {
            if session.conn_id != skip_conn_id && session.player_id.is_some() {
                session.send_line(line.clone());
            }
        }
    }

    /// Removes every marked session and reports what was dropped so
    /// the caller can despawn tanks and broadcast LEF.
    pub fn take_removals(&mut self) -> Vec<(u32, Option<u32>)> {
        let marked: Vec<u32> = self
            .sessions
            .values()
            .filter(|s| s.remove)
            .map(|s| s.conn_id)
            .collect();
        marked
            .into_iter()
            .filter_map(|conn_id| {
                self.sessions
                    .remove(&conn_id)
                    .map(|s| (conn_id, s.player_id))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_pair(conn_id: u32, capacity: usize) -> (Session, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Session::new(conn_id, tx), rx)
    }

    #[test]
    fn test_send_enqueues_encoded_line() {
        let (mut session, mut rx) = session_pair(1, 8);
        session.send(&ServerMessage::Pong);
        assert_eq!(rx.try_recv().unwrap(), "PON");
    }

    #[test]
    fn test_full_queue_marks_for_removal() {
        let (mut session, _rx) = session_pair(1, 1);
        session.send(&ServerMessage::Pong);
        assert!(!session.remove);
        session.send(&ServerMessage::Pong);
        assert!(session.remove);
    }

    #[test]
    fn test_closed_receiver_marks_for_removal() {
        let (mut session, rx) = session_pair(1, 8);
        drop(rx);
        session.send(&ServerMessage::Pong);
        assert!(session.remove);
    }

    #[test]
    fn test_broadcast_skips_unjoined_sessions() {
        let mut manager = SessionManager::new();
        let (mut joined, mut joined_rx) = session_pair(1, 8);
        joined.player_id = Some(1);
        let (pending, mut pending_rx) = session_pair(2, 8);
        manager.insert(joined);
        manager.insert(pending);

        manager.broadcast(&ServerMessage::Pong);
        assert_eq!(joined_rx.try_recv().unwrap(), "PON");
        assert!(pending_rx.try_recv().is_err());
    }

    #[test]
    fn test_take_removals_reports_player_id() {
        let mut manager = SessionManager::new();
        let (mut session, _rx) = session_pair(3, 8);
        session.player_id = Some(7);
        session.remove = true;
        manager.insert(session);

        let removed = manager.take_removals();
        assert_eq!(removed, vec![(3, Some(7))]);
        assert!(manager.get_mut(3).is_none());
        assert!(manager.take_removals().is_empty());
    }

    #[test]
    fn test_player_count_excludes_marked_and_pending() {
        let mut manager = SessionManager::new();
        let (mut a, _ra) = session_pair(1, 8);
        a.player_id = Some(1);
        let (b, _rb) = session_pair(2, 8);
        let (mut c, _rc) = session_pair(3, 8);
        c.player_id = Some(3);
        c.remove = true;
        manager.insert(a);
        manager.insert(b);
        manager.insert(c);

        assert_eq!(manager.player_count(), 1);
    }
}
