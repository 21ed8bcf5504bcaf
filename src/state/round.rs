use super::AppState;
use crate::protocol::{OptionInput, QuestionInfo, ServerMessage};
use crate::results::aggregate;
use crate::types::*;
use chrono::Utc;

/// Why an `ask` was rejected
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RoundError {
    #[error("question text is empty")]
    EmptyQuestion,
    #[error("question needs at least one non-blank option")]
    NoOptions,
}

impl AppState {
    /// Open a new round, replacing whatever round existed before. Blank
    /// options are dropped and the survivors get sequential ids from 1;
    /// every participant's answered flag is reset. The question goes out
    /// to students and the reset roster to presenters.
    pub async fn ask(
        &self,
        question: String,
        options: Vec<OptionInput>,
        timer_seconds: u32,
    ) -> Result<(), RoundError> {
        let question = question.trim().to_string();
        if question.is_empty() {
            return Err(RoundError::EmptyQuestion);
        }

        let options: Vec<PollOption> = options
            .into_iter()
            .filter(|option| !option.text.trim().is_empty())
            .enumerate()
            .map(|(i, option)| PollOption {
                id: i as u32 + 1,
                text: option.text,
                is_correct: option.is_correct,
            })
            .collect();
        if options.is_empty() {
            return Err(RoundError::NoOptions);
        }

        let round = Round {
            id: ulid::Ulid::new().to_string(),
            question,
            options,
            timer_seconds,
            asked_at: Utc::now(),
            answers: Vec::new(),
            state: RoundState::Open,
        };

        tracing::info!(
            "New question \"{}\" with {} options, timer {}s",
            round.question,
            round.options.len(),
            round.timer_seconds
        );

        let mut session = self.session.write().await;
        session.reset_answered();
        let question = QuestionInfo::from(&round);
        session.round = Some(round);

        self.broadcast_to_students(ServerMessage::NewQuestion { question });
        self.broadcast_to_presenters(ServerMessage::StudentsUpdated {
            students: session.roster(),
        });
        Ok(())
    }

    /// Record an answer for the live round and fan the refreshed tallies
    /// out to everyone. Answers arriving with no open round are dropped
    /// without fan-out, which covers both the idle and the already-closed
    /// case and keeps the final-results broadcast a one-time event.
    ///
    /// Closure is only ever evaluated here: either everyone registered has
    /// answered, or this answer arrived past the timer (clients report
    /// their own expiry as a timeout answer). The coordinator runs no clock
    /// of its own.
    pub async fn submit_answer(
        &self,
        student_name: String,
        selected_option: Option<u32>,
        is_timeout: bool,
    ) {
        let mut session = self.session.write().await;

        match session.round.as_ref() {
            Some(round) if round.is_open() => {}
            _ => {
                tracing::debug!("Dropping answer from {}: no open round", student_name);
                return;
            }
        }

        if !session.students.iter().any(|s| s.name == student_name) {
            // Recorded anyway; names are a join key, not a foreign key
            tracing::debug!("Answer from unregistered name {}", student_name);
        }
        session.mark_answered(&student_name);
        let all_answered = session.all_answered();
        let answered = session.students.iter().filter(|s| s.has_answered).count();
        let registered = session.students.len();

        let now = Utc::now();
        let Some(round) = session.round.as_mut() else {
            return;
        };

        round.answers.push(Answer {
            student_name,
            selected_option,
            is_timeout,
            timestamp: now,
        });

        tracing::debug!(
            "Answer recorded: {}/{} students answered, {} answers total",
            answered,
            registered,
            round.answers.len()
        );

        let results = aggregate(round);

        let time_up = now.signed_duration_since(round.asked_at).num_seconds()
            >= i64::from(round.timer_seconds);
        let closed = all_answered || time_up;
        if closed {
            round.state = RoundState::Closed;
            tracing::info!(
                "Round closed ({})",
                if all_answered { "all answered" } else { "time up" }
            );
        }

        // Published before the lock drops, so no later answer can slip a
        // newer tally in front of this one
        self.broadcast_to_all(ServerMessage::ResultsUpdated {
            results: results.clone(),
            students: session.roster(),
        });
        if closed {
            self.broadcast_to_all(ServerMessage::ShowResults { results });
        }
    }

    /// Drop the live round, reset everyone's answered flag and hand
    /// presenters the cleaned-up roster. Valid from any state and
    /// idempotent.
    pub async fn clear(&self) {
        let mut session = self.session.write().await;

        tracing::info!("Clearing current poll");
        session.round = None;
        session.reset_answered();

        self.broadcast_to_presenters(ServerMessage::StudentsUpdated {
            students: session.roster(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::PollResults;
    use chrono::Duration;
    use tokio::sync::broadcast;

    fn options(texts: &[&str]) -> Vec<OptionInput> {
        texts
            .iter()
            .map(|text| OptionInput {
                text: text.to_string(),
                is_correct: false,
            })
            .collect()
    }

    async fn state_with_students(names: &[&str]) -> AppState {
        let state = AppState::new();
        for (i, name) in names.iter().enumerate() {
            state
                .join_student(format!("conn{}", i), name.to_string())
                .await;
        }
        state
    }

    /// Shift the live round's creation time into the past
    async fn backdate_round(state: &AppState, seconds: i64) {
        let mut session = state.session.write().await;
        if let Some(round) = session.round.as_mut() {
            round.asked_at = Utc::now() - Duration::seconds(seconds);
        }
    }

    fn expect_new_question(rx: &mut broadcast::Receiver<ServerMessage>) -> QuestionInfo {
        match rx.try_recv() {
            Ok(ServerMessage::NewQuestion { question }) => question,
            other => panic!("Expected NewQuestion, got {:?}", other),
        }
    }

    fn expect_results_updated(rx: &mut broadcast::Receiver<ServerMessage>) -> PollResults {
        match rx.try_recv() {
            Ok(ServerMessage::ResultsUpdated { results, .. }) => results,
            other => panic!("Expected ResultsUpdated, got {:?}", other),
        }
    }

    fn expect_show_results(rx: &mut broadcast::Receiver<ServerMessage>) -> PollResults {
        match rx.try_recv() {
            Ok(ServerMessage::ShowResults { results }) => results,
            other => panic!("Expected ShowResults, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ask_rejects_empty_question_text() {
        let state = AppState::new();
        let result = state.ask("   ".to_string(), options(&["Cat"]), 30).await;
        assert_eq!(result.unwrap_err(), RoundError::EmptyQuestion);

        // Nothing was installed
        assert!(state.session.read().await.round.is_none());
    }

    #[tokio::test]
    async fn test_ask_rejects_all_blank_options() {
        let state = AppState::new();
        let result = state
            .ask("Cat or Dog?".to_string(), options(&["", "   "]), 30)
            .await;
        assert_eq!(result.unwrap_err(), RoundError::NoOptions);
    }

    #[tokio::test]
    async fn test_ask_filters_blanks_and_ids_start_at_one() {
        let state = AppState::new();
        let mut student_rx = state.student_broadcast.subscribe();

        state
            .ask("Cat or Dog?".to_string(), options(&["Cat", "  ", "Dog"]), 30)
            .await
            .unwrap();

        let question = expect_new_question(&mut student_rx);
        let ids: Vec<u32> = question.options.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(question.options[0].text, "Cat");
        assert_eq!(question.options[1].text, "Dog");
        assert!(question.answers.is_empty());
        assert_eq!(question.timer, 30);
    }

    #[tokio::test]
    async fn test_ask_resets_answered_flags() {
        let state = state_with_students(&["Asha", "Ben"]).await;
        state
            .ask("First?".to_string(), options(&["A", "B"]), 30)
            .await
            .unwrap();
        state.submit_answer("Asha".to_string(), Some(1), false).await;

        state
            .ask("Second?".to_string(), options(&["A", "B"]), 30)
            .await
            .unwrap();

        let session = state.session.read().await;
        assert!(session.students.iter().all(|s| !s.has_answered));
    }

    #[tokio::test]
    async fn test_ask_replaces_previous_round_wholesale() {
        let state = state_with_students(&["Asha"]).await;
        let mut student_rx = state.student_broadcast.subscribe();

        state
            .ask("First?".to_string(), options(&["A"]), 30)
            .await
            .unwrap();
        state.submit_answer("Asha".to_string(), Some(1), false).await;
        state
            .ask("Second?".to_string(), options(&["A"]), 30)
            .await
            .unwrap();

        let first = expect_new_question(&mut student_rx);
        let second = expect_new_question(&mut student_rx);
        assert_ne!(first.id, second.id);
        assert!(second.answers.is_empty());
    }

    #[tokio::test]
    async fn test_answer_without_round_is_dropped() {
        let state = state_with_students(&["Asha"]).await;
        let mut all_rx = state.broadcast.subscribe();

        state.submit_answer("Asha".to_string(), Some(1), false).await;

        assert!(all_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_answers_close_round_when_everyone_answered() {
        let state = state_with_students(&["Asha", "Ben"]).await;
        state
            .ask("Cat or Dog?".to_string(), options(&["Cat", "Dog"]), 30)
            .await
            .unwrap();
        let mut all_rx = state.broadcast.subscribe();

        state.submit_answer("Asha".to_string(), Some(1), false).await;
        let first = expect_results_updated(&mut all_rx);
        assert_eq!(first.total_answers, 1);
        // Still open, so no final reveal yet
        assert!(all_rx.try_recv().is_err());

        state.submit_answer("Ben".to_string(), Some(1), false).await;
        let second = expect_results_updated(&mut all_rx);
        assert_eq!(second.total_answers, 2);
        assert_eq!(second.results[0].count, 2);
        assert_eq!(second.results[0].percentage, 100);
        assert_eq!(second.results[1].percentage, 0);

        let final_results = expect_show_results(&mut all_rx);
        assert_eq!(final_results.total_answers, 2);

        let session = state.session.read().await;
        assert_eq!(session.round.as_ref().unwrap().state, RoundState::Closed);
    }

    #[tokio::test]
    async fn test_closed_round_drops_further_answers() {
        let state = state_with_students(&["Asha"]).await;
        state
            .ask("Cat or Dog?".to_string(), options(&["Cat", "Dog"]), 30)
            .await
            .unwrap();
        let mut all_rx = state.broadcast.subscribe();

        state.submit_answer("Asha".to_string(), Some(1), false).await;
        expect_results_updated(&mut all_rx);
        expect_show_results(&mut all_rx);

        // A straggler after closure produces nothing, so the final results
        // can never be broadcast twice for one round
        state.submit_answer("Asha".to_string(), Some(2), false).await;
        assert!(all_rx.try_recv().is_err());

        let session = state.session.read().await;
        assert_eq!(session.round.as_ref().unwrap().answers.len(), 1);
    }

    #[tokio::test]
    async fn test_timer_expiry_closes_on_next_answer() {
        let state = state_with_students(&["Asha", "Ben"]).await;
        state
            .ask("Cat or Dog?".to_string(), options(&["Cat", "Dog"]), 30)
            .await
            .unwrap();
        backdate_round(&state, 31).await;
        let mut all_rx = state.broadcast.subscribe();

        // Only one of two answered, but the answer arrived past the timer
        state.submit_answer("Asha".to_string(), Some(1), false).await;

        expect_results_updated(&mut all_rx);
        expect_show_results(&mut all_rx);
    }

    #[tokio::test]
    async fn test_expired_round_stays_open_until_an_answer_arrives() {
        let state = state_with_students(&["Asha"]).await;
        state
            .ask("Cat or Dog?".to_string(), options(&["Cat", "Dog"]), 30)
            .await
            .unwrap();
        backdate_round(&state, 120).await;

        // No clock runs inside the coordinator; expiry alone changes nothing
        {
            let session = state.session.read().await;
            assert!(session.round.as_ref().unwrap().is_open());
        }

        // The client-reported timeout answer is what closes it
        let mut all_rx = state.broadcast.subscribe();
        state.submit_answer("Asha".to_string(), None, true).await;

        expect_results_updated(&mut all_rx);
        let results = expect_show_results(&mut all_rx);
        assert_eq!(results.total_answers, 1);
        assert_eq!(results.results[0].count, 0);
    }

    #[tokio::test]
    async fn test_answer_from_unregistered_name_still_recorded() {
        let state = state_with_students(&["Asha"]).await;
        state
            .ask("Cat or Dog?".to_string(), options(&["Cat", "Dog"]), 30)
            .await
            .unwrap();
        let mut all_rx = state.broadcast.subscribe();

        state.submit_answer("Ghost".to_string(), Some(2), false).await;

        let results = expect_results_updated(&mut all_rx);
        assert_eq!(results.total_answers, 1);
        assert_eq!(results.results[1].count, 1);
        // The ghost is not on the roster, so the round is not fully
        // answered and nothing final goes out
        assert!(all_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_classroom_never_closes_by_participation() {
        let state = AppState::new();
        state
            .ask("Cat or Dog?".to_string(), options(&["Cat", "Dog"]), 30)
            .await
            .unwrap();
        let mut all_rx = state.broadcast.subscribe();

        state.submit_answer("Ghost".to_string(), Some(1), false).await;

        expect_results_updated(&mut all_rx);
        assert!(all_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_duplicate_answers_from_one_name_all_counted() {
        // Double submissions are accepted as-is; nothing dedups by name
        let state = state_with_students(&["Asha", "Ben"]).await;
        state
            .ask("Cat or Dog?".to_string(), options(&["Cat", "Dog"]), 30)
            .await
            .unwrap();
        let mut all_rx = state.broadcast.subscribe();

        state.submit_answer("Asha".to_string(), Some(1), false).await;
        state.submit_answer("Asha".to_string(), Some(2), false).await;

        expect_results_updated(&mut all_rx);
        let second = expect_results_updated(&mut all_rx);
        assert_eq!(second.total_answers, 2);
        assert_eq!(second.results[0].count, 1);
        assert_eq!(second.results[1].count, 1);
        // Ben has not answered, so the round stays open
        assert!(all_rx.try_recv().is_err());
    }

    /// Tallies are published while the session lock is held, so racing
    /// answers can never deliver a stale total after a newer one.
    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_racing_answers_broadcast_in_tally_order() {
        for _ in 0..100 {
            let state = state_with_students(&["Asha"]).await;
            state
                .ask("Cat or Dog?".to_string(), options(&["Cat", "Dog"]), 300)
                .await
                .unwrap();
            let mut all_rx = state.broadcast.subscribe();

            let mut tasks = Vec::new();
            for i in 0..8 {
                let state = state.clone();
                tasks.push(tokio::spawn(async move {
                    state
                        .submit_answer(format!("Ghost{}", i), Some(1), false)
                        .await;
                }));
            }
            for task in tasks {
                task.await.unwrap();
            }

            let mut last_total = 0;
            for _ in 0..8 {
                let results = expect_results_updated(&mut all_rx);
                assert!(results.total_answers > last_total);
                last_total = results.total_answers;
            }
            assert_eq!(last_total, 8);
            assert!(all_rx.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn test_clear_discards_round_and_resets_flags() {
        let state = state_with_students(&["Asha"]).await;
        state
            .ask("Cat or Dog?".to_string(), options(&["Cat", "Dog"]), 30)
            .await
            .unwrap();
        state.submit_answer("Asha".to_string(), Some(1), false).await;

        let mut presenter_rx = state.presenter_broadcast.subscribe();
        state.clear().await;

        if let Ok(ServerMessage::StudentsUpdated { students }) = presenter_rx.try_recv() {
            assert_eq!(students.len(), 1);
            assert!(!students[0].has_answered);
        } else {
            panic!("Expected StudentsUpdated broadcast");
        }
        assert!(state.session.read().await.round.is_none());
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let state = AppState::new();
        state.clear().await;
        state.clear().await;

        let session = state.session.read().await;
        assert!(session.round.is_none());
        assert!(session.students.is_empty());
    }
}
