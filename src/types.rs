use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type ConnectionId = String;
pub type QuestionId = String;

/// A connected student. Keyed by the connection that joined; the display
/// name is what answers are matched against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: ConnectionId,
    pub name: String,
    pub has_answered: bool,
}

/// A connected presenter. No display identity is collected, so dedup on
/// reconnect goes by connection id alone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Presenter {
    pub id: ConnectionId,
}

/// One choice of the live question. Ids are assigned from input order when
/// the question is created and are unique within that question only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PollOption {
    pub id: u32,
    pub text: String,
    pub is_correct: bool,
}

/// One recorded answer. `selected_option` is None for timeout submissions
/// where the client never picked anything; those still count toward the
/// answer total.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub student_name: String,
    pub selected_option: Option<u32>,
    pub is_timeout: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RoundState {
    Open,
    Closed,
}

/// The single live round. At most one exists at a time; asking a new
/// question replaces it wholesale, clearing discards it.
#[derive(Debug, Clone)]
pub struct Round {
    pub id: QuestionId,
    pub question: String,
    pub options: Vec<PollOption>,
    pub timer_seconds: u32,
    pub asked_at: DateTime<Utc>,
    pub answers: Vec<Answer>,
    pub state: RoundState,
}

impl Round {
    /// Whether the round still accepts answers
    pub fn is_open(&self) -> bool {
        self.state == RoundState::Open
    }
}
