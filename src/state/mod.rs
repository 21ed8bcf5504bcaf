mod roster;
mod round;

pub use roster::PresenterJoin;
pub use round::RoundError;

use crate::protocol::ServerMessage;
use crate::types::*;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Everything the coordinator owns: who is connected and what is being
/// asked. Mutation goes through the operation modules, which hold the
/// write lock for the whole read-modify-publish sequence: no two inbound
/// events interleave, and broadcasts leave under the lock, so subscribers
/// see snapshots in mutation order.
#[derive(Debug, Default)]
pub struct Session {
    pub students: Vec<Student>,
    pub presenters: Vec<Presenter>,
    pub round: Option<Round>,
}

impl Session {
    /// Participant list snapshot, in join order
    pub fn roster(&self) -> Vec<Student> {
        self.students.clone()
    }

    /// Flag the named participant as having answered. Answers are keyed by
    /// display name, not validated against the list, so unknown names are
    /// silently ignored.
    pub fn mark_answered(&mut self, name: &str) {
        if let Some(student) = self.students.iter_mut().find(|s| s.name == name) {
            student.has_answered = true;
        }
    }

    /// True when every registered participant has answered. An empty
    /// classroom never counts as fully answered, so only the timer path can
    /// close a round with nobody registered.
    pub fn all_answered(&self) -> bool {
        !self.students.is_empty() && self.students.iter().all(|s| s.has_answered)
    }

    pub fn reset_answered(&mut self) {
        for student in &mut self.students {
            student.has_answered = false;
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<RwLock<Session>>,
    /// Broadcast channel reaching every connected client
    pub broadcast: broadcast::Sender<ServerMessage>,
    /// Broadcast channel reaching student clients only
    pub student_broadcast: broadcast::Sender<ServerMessage>,
    /// Broadcast channel reaching presenter clients only
    pub presenter_broadcast: broadcast::Sender<ServerMessage>,
}

impl AppState {
    pub fn new() -> Self {
        let (all_tx, _rx) = broadcast::channel(100);
        let (student_tx, _rx) = broadcast::channel(100);
        let (presenter_tx, _rx) = broadcast::channel(100);
        Self {
            session: Arc::new(RwLock::new(Session::default())),
            broadcast: all_tx,
            student_broadcast: student_tx,
            presenter_broadcast: presenter_tx,
        }
    }

    /// Send a message to every connected client. A send error only means
    /// nobody is subscribed right now, which is fine.
    pub fn broadcast_to_all(&self, msg: ServerMessage) {
        let _ = self.broadcast.send(msg);
    }

    pub fn broadcast_to_students(&self, msg: ServerMessage) {
        let _ = self.student_broadcast.send(msg);
    }

    pub fn broadcast_to_presenters(&self, msg: ServerMessage) {
        let _ = self.presenter_broadcast.send(msg);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
