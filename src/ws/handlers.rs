//! WebSocket message dispatch
//!
//! Maps inbound client events onto roster and round operations and
//! returns the replies that go back to the issuing connection only.
//! Fan-out to other connections happens inside the operations
//! themselves, under the session lock.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::ConnectionId;
use std::sync::Arc;

/// Handle a client message and return replies for this connection
pub async fn handle_message(
    msg: ClientMessage,
    connection_id: &ConnectionId,
    state: &Arc<AppState>,
) -> Vec<ServerMessage> {
    match msg {
        ClientMessage::JoinStudent { name } => {
            // Late joiners get the question already on the floor
            match state.join_student(connection_id.clone(), name).await {
                Some(question) => vec![ServerMessage::NewQuestion { question }],
                None => Vec::new(),
            }
        }

        ClientMessage::JoinPresenter => {
            let join = state.join_presenter(connection_id.clone()).await;
            let mut replies = vec![ServerMessage::StudentsUpdated {
                students: join.students.clone(),
            }];
            if let Some(results) = join.current_results {
                replies.push(ServerMessage::ResultsUpdated {
                    results,
                    students: join.students,
                });
            }
            replies
        }

        ClientMessage::Ask {
            question,
            options,
            timer,
        } => match state.ask(question, options, timer).await {
            Ok(()) => Vec::new(),
            Err(e) => vec![ServerMessage::Error {
                code: "INVALID_QUESTION".to_string(),
                msg: e.to_string(),
            }],
        },

        ClientMessage::Answer {
            student_name,
            selected_option,
            is_timeout,
        } => {
            state
                .submit_answer(student_name, selected_option, is_timeout)
                .await;
            Vec::new()
        }

        ClientMessage::Clear => {
            state.clear().await;
            Vec::new()
        }
    }
}
