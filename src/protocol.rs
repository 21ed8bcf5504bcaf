use crate::results::PollResults;
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinStudent {
        name: String,
    },
    JoinPresenter,
    Ask {
        question: String,
        options: Vec<OptionInput>,
        timer: u32,
    },
    /// Sent by students on selection or when their local countdown runs out
    /// (then with `is_timeout` set and no selection). Extra fields some
    /// clients attach, like `questionId`, are ignored.
    #[serde(rename_all = "camelCase")]
    Answer {
        student_name: String,
        #[serde(default)]
        selected_option: Option<u32>,
        #[serde(default)]
        is_timeout: bool,
    },
    Clear,
}

/// An option as supplied by the presenter in an `ask`. Ids are assigned
/// server-side after blank entries are filtered out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionInput {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Participant list in join order, sent to presenters on every change
    StudentsUpdated {
        students: Vec<Student>,
    },
    /// The live question; broadcast on ask, and sent directly to late
    /// joiners (then with the answers collected so far)
    NewQuestion {
        question: QuestionInfo,
    },
    /// Live tallies after every recorded answer
    ResultsUpdated {
        results: PollResults,
        students: Vec<Student>,
    },
    /// Final tallies, sent exactly once when the round closes
    ShowResults {
        results: PollResults,
    },
    Error {
        code: String,
        msg: String,
    },
}

/// Wire form of the live round. The round phase stays internal; clients
/// only ever see open rounds plus the final `show-results`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionInfo {
    pub id: QuestionId,
    pub question: String,
    pub options: Vec<PollOption>,
    pub timer: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    pub answers: Vec<Answer>,
}

impl From<&Round> for QuestionInfo {
    fn from(round: &Round) -> Self {
        Self {
            id: round.id.clone(),
            question: round.question.clone(),
            options: round.options.clone(),
            timer: round.timer_seconds,
            start_time: round.asked_at,
            answers: round.answers.clone(),
        }
    }
}
