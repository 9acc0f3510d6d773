//! WebSocket handler for the mutation channel.
//!
//! Each connection becomes one hub [`Session`](taskpulse_core::Session). A
//! receive task turns inbound frames into hub requests; a send task writes the
//! session's events and the request replies back to the socket.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use taskpulse_core::protocol::{Reply, ServerFrame};
use taskpulse_core::HubError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut session = state.hub.connect();
    let session_id = session.id().clone();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Reply>();

    // Forward hub events and replies to this client
    let mut send_task = tokio::spawn(async move {
        'outer: loop {
            let frame: ServerFrame = tokio::select! {
                event = session.next_event() => match event {
                    Some(event) => event.into(),
                    None => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(reply) => reply.into(),
                    None => break,
                },
            };

            // Events already queued, including any broadcast caused by this
            // request, are written ahead of the reply.
            let mut frames: Vec<ServerFrame> = Vec::new();
            if matches!(frame, ServerFrame::Reply(_)) {
                frames.extend(std::iter::from_fn(|| session.try_next_event()).map(ServerFrame::from));
            }
            frames.push(frame);

            for frame in frames {
                let json = match serde_json::to_string(&frame) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode outbound frame");
                        continue;
                    }
                };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    debug!(session_id = %session.id(), "WebSocket send failed, client disconnected");
                    break 'outer;
                }
            }
        }
        session
    });

    // Handle incoming requests from the client
    let hub = state.hub.clone();
    let recv_session_id = session_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let reply = match msg {
                Ok(Message::Text(text)) => hub.handle_text(&recv_session_id, text.as_str()),
                Ok(Message::Binary(_)) => {
                    Reply::failure(None, &HubError::bad_request("Binary frames are not supported"))
                }
                Ok(Message::Close(_)) => {
                    debug!(session_id = %recv_session_id, "WebSocket client sent close frame");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    debug!(session_id = %recv_session_id, error = %e, "WebSocket receive error");
                    break;
                }
            };
            if reply_tx.send(reply).is_err() {
                break;
            }
        }
    });

    let outcome = tokio::select! {
        result = &mut send_task => {
            recv_task.abort();
            result
        }
        _ = &mut recv_task => (&mut send_task).await,
        _ = state.closed() => {
            recv_task.abort();
            send_task.abort();
            (&mut send_task).await
        }
    };

    match outcome {
        Ok(mut session) => session.disconnect(),
        // An aborted send task dropped the session, which disconnected it.
        Err(e) if e.is_cancelled() => {}
        Err(e) => warn!(session_id = %session_id, error = %e, "WebSocket task failed"),
    }

    info!(session_id = %session_id, "WebSocket client disconnected");
}
