use super::AppState;
use crate::protocol::{QuestionInfo, ServerMessage};
use crate::results::{self, PollResults};
use crate::types::*;

/// What a presenter join produced
#[derive(Debug)]
pub struct PresenterJoin {
    pub students: Vec<Student>,
    /// Live tallies, present only when the current round already has answers
    pub current_results: Option<PollResults>,
}

impl AppState {
    /// Register a student connection and notify presenters of the new
    /// roster. Joining under an already-used name replaces the stale entry,
    /// so a refreshed tab or reconnect never inflates the roster. Last
    /// writer for a name wins; this is policy, not authentication.
    ///
    /// Returns the in-progress question, if any, so late joiners can still
    /// answer.
    pub async fn join_student(
        &self,
        connection_id: ConnectionId,
        name: String,
    ) -> Option<QuestionInfo> {
        let mut session = self.session.write().await;

        session.students.retain(|s| s.name != name);
        session.students.push(Student {
            id: connection_id,
            name: name.clone(),
            has_answered: false,
        });

        tracing::info!(
            "Student {} joined. Total students: {}",
            name,
            session.students.len()
        );

        self.broadcast_to_presenters(ServerMessage::StudentsUpdated {
            students: session.roster(),
        });

        session.round.as_ref().map(|round| {
            tracing::debug!("Sending existing question to {}", name);
            QuestionInfo::from(round)
        })
    }

    /// Register a presenter connection, deduplicated by connection id
    pub async fn join_presenter(&self, connection_id: ConnectionId) -> PresenterJoin {
        let mut session = self.session.write().await;

        session.presenters.retain(|p| p.id != connection_id);
        session.presenters.push(Presenter { id: connection_id });

        tracing::info!(
            "Presenter joined. Total presenters: {}",
            session.presenters.len()
        );

        let current_results = session
            .round
            .as_ref()
            .filter(|round| !round.answers.is_empty())
            .map(results::aggregate);

        PresenterJoin {
            students: session.roster(),
            current_results,
        }
    }

    /// Drop a connection from both lists. A departing student changes the
    /// roster, so presenters get a fresh snapshot; presenter departures
    /// change nothing the clients see.
    pub async fn leave(&self, connection_id: &ConnectionId) {
        let mut session = self.session.write().await;

        let students_before = session.students.len();
        session.students.retain(|s| s.id != *connection_id);
        let student_left = session.students.len() < students_before;

        session.presenters.retain(|p| p.id != *connection_id);

        tracing::info!(
            "Connection {} left. Remaining students: {}, presenters: {}",
            connection_id,
            session.students.len(),
            session.presenters.len()
        );

        if student_left {
            self.broadcast_to_presenters(ServerMessage::StudentsUpdated {
                students: session.roster(),
            });
        }
    }
}
