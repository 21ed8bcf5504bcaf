pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::ConnectionId;

/// Which broadcast lane this connection listens on, set by its join
/// messages. A later join overrides an earlier one.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Role {
    Unassigned,
    Student,
    Presenter,
}

impl Role {
    /// Student-lane messages reach only connections joined as students
    fn hears_student_lane(self) -> bool {
        self == Role::Student
    }

    /// Presenter-lane messages reach only connections joined as presenters
    fn hears_presenter_lane(self) -> bool {
        self == Role::Presenter
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One inbound text frame: parse, track the role, dispatch. A frame that
/// does not parse produces a directed error and leaves the connection,
/// and its role, untouched.
async fn handle_text_frame(
    text: &str,
    role: &mut Role,
    connection_id: &ConnectionId,
    state: &Arc<AppState>,
) -> Vec<ServerMessage> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(client_msg) => {
            match &client_msg {
                ClientMessage::JoinStudent { .. } => *role = Role::Student,
                ClientMessage::JoinPresenter => *role = Role::Presenter,
                _ => {}
            }

            handlers::handle_message(client_msg, connection_id, state).await
        }
        Err(e) => {
            tracing::error!("Failed to parse client message: {}", e);
            vec![ServerMessage::Error {
                code: "PARSE_ERROR".to_string(),
                msg: format!("Invalid message format: {}", e),
            }]
        }
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let connection_id: ConnectionId = ulid::Ulid::new().to_string();
    let mut role = Role::Unassigned;

    tracing::info!("Client connected: {}", connection_id);

    // A connection declares itself student or presenter only with its
    // join messages, so subscribe to every lane up front and filter by
    // the current role when forwarding.
    let mut all_rx = state.broadcast.subscribe();
    let mut student_rx = state.student_broadcast.subscribe();
    let mut presenter_rx = state.presenter_broadcast.subscribe();

    'conn: loop {
        tokio::select! {
            // Broadcasts addressed to every connection
            broadcast_msg = all_rx.recv() => {
                if let Ok(msg) = broadcast_msg {
                    if let Ok(json) = serde_json::to_string(&msg) {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
            }

            // Student-lane broadcasts
            student_msg = student_rx.recv() => {
                if let Ok(msg) = student_msg {
                    if role.hears_student_lane() {
                        if let Ok(json) = serde_json::to_string(&msg) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }

            // Presenter-lane broadcasts
            presenter_msg = presenter_rx.recv() => {
                if let Ok(msg) = presenter_msg {
                    if role.hears_presenter_lane() {
                        if let Ok(json) = serde_json::to_string(&msg) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }

            // Handle client messages
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        let replies =
                            handle_text_frame(&text, &mut role, &connection_id, &state).await;
                        for reply in replies {
                            if let Ok(json) = serde_json::to_string(&reply) {
                                if sender.send(Message::Text(json.into())).await.is_err() {
                                    tracing::error!("Failed to send response");
                                    break 'conn;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    // Roster cleanup; presenters hear about departing students
    state.leave(&connection_id).await;

    tracing::info!("Client disconnected: {}", connection_id);
}
