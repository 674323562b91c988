//! Live event socket: `GET /ws/{user_id}`.
//!
//! The socket is attached to the in-process transport and a dispatcher
//! session is opened for the user. Clients manage their subscriptions with
//! control messages:
//!
//! ```json
//! { "action": "subscribe", "event": "case_assigned" }
//! { "action": "unsubscribe", "event": "case_assigned" }
//! ```
//!
//! Every matching notification is pushed as an envelope
//! (`{ type, payload, message, timestamp }`).

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use rescue_core::validate_id;
use rescue_notifications::{EventType, SubscriptionId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientCommand {
    Subscribe { event: EventType },
    Unsubscribe { event: EventType },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerReply {
    Subscribed {
        event: EventType,
        subscription: SubscriptionId,
    },
    Unsubscribed {
        event: EventType,
        removed: usize,
    },
    Error {
        message: String,
    },
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    if let Err(e) = validate_id(&user_id) {
        return ApiError::bad_request(format!("invalid user id: {e}")).into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

async fn handle_socket(socket: WebSocket, user_id: String, state: AppState) {
    let mut envelopes = state.transport.attach(&user_id);
    // A newer socket takes over from any earlier one for the same user.
    state.dispatcher.disconnect(&user_id);
    if let Err(e) = state.dispatcher.connect(&user_id).await {
        warn!(user_id = %user_id, error = %e, "Could not open notification session");
        state.transport.detach(&user_id);
        return;
    }
    info!(user_id = %user_id, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();
    let mut replaced = false;

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = apply_command(&state, &user_id, text.as_str());
                        let Ok(json) = serde_json::to_string(&reply) else {
                            continue;
                        };
                        if let Err(e) = sink.send(Message::Text(json.into())).await {
                            debug!(error = %e, "Failed to send reply, closing");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(user_id = %user_id, "Client closed socket");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "Client WebSocket error");
                        break;
                    }
                }
            }

            envelope = envelopes.recv() => {
                match envelope {
                    Some(envelope) => {
                        let json = match serde_json::to_string(&envelope) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!(error = %e, "Could not encode envelope");
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(Message::Text(json.into())).await {
                            debug!(error = %e, "Failed to push envelope, closing");
                            break;
                        }
                    }
                    None => {
                        // Every sender is gone: another socket took over.
                        replaced = true;
                        break;
                    }
                }
            }
        }
    }

    let _ = sink.close().await;
    if !replaced {
        state.dispatcher.disconnect(&user_id);
        state.transport.detach(&user_id);
    }
    info!(user_id = %user_id, replaced, "WebSocket closed");
}

fn apply_command(state: &AppState, user_id: &str, text: &str) -> ServerReply {
    let command = match serde_json::from_str::<ClientCommand>(text) {
        Ok(command) => command,
        Err(e) => {
            return ServerReply::Error {
                message: format!("invalid command: {e}"),
            };
        }
    };

    match command {
        ClientCommand::Subscribe { event } => match state.dispatcher.subscribe(user_id, event) {
            Ok(subscription) => ServerReply::Subscribed {
                event,
                subscription,
            },
            Err(e) => ServerReply::Error {
                message: e.to_string(),
            },
        },
        ClientCommand::Unsubscribe { event } => {
            let removed = state
                .dispatcher
                .subscriptions(user_id)
                .into_iter()
                .filter(|(_, subscribed)| *subscribed == event)
                .filter(|(id, _)| state.dispatcher.unsubscribe(user_id, *id))
                .count();
            ServerReply::Unsubscribed { event, removed }
        }
    }
}
