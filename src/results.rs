//! Vote aggregation for the live round.
//!
//! Pure functions over a borrowed round, so the tallies can be recomputed
//! and tested without touching the session lock.

use crate::types::Round;
use serde::{Deserialize, Serialize};

/// Counts and percentage for a single option
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptionTally {
    pub id: u32,
    pub text: String,
    pub count: usize,
    pub percentage: u32,
}

/// Aggregated results for the current round, in option declaration order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PollResults {
    pub question: String,
    pub total_answers: usize,
    pub results: Vec<OptionTally>,
}

/// Tally every recorded answer against the round's options.
///
/// Answers without a selection (timeouts) count toward the total but not
/// toward any option, so percentages can sum below 100. With no answers at
/// all every percentage is 0.
pub fn aggregate(round: &Round) -> PollResults {
    let total_answers = round.answers.len();

    let results = round
        .options
        .iter()
        .map(|option| {
            let count = round
                .answers
                .iter()
                .filter(|answer| answer.selected_option == Some(option.id))
                .count();
            let percentage = if total_answers == 0 {
                0
            } else {
                (count as f64 / total_answers as f64 * 100.0).round() as u32
            };
            OptionTally {
                id: option.id,
                text: option.text.clone(),
                count,
                percentage,
            }
        })
        .collect();

    PollResults {
        question: round.question.clone(),
        total_answers,
        results,
    }
}
