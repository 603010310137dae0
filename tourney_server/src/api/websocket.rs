//! WebSocket subscription to a tournament room.
//!
//! A client connecting to `GET /ws/tournaments/{id}` joins the room
//! `tournament_{id}` on the notification hub and receives every room message
//! as a JSON text frame:
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:8080/ws/tournaments/1');
//!
//! ws.onmessage = (event) => {
//!   const { type, payload, roomId } = JSON.parse(event.data);
//!   if (type === 'BRACKET_UPDATED') refreshBracket(payload.tournamentId);
//! };
//! ```
//!
//! The connection is read-only; inbound text frames are ignored. On close the
//! connection leaves the room.

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tourney::{
    db::TournamentStore,
    notify::{RoomMessage, tournament_room},
    tournament::models::TournamentId,
};
use uuid::Uuid;

use super::{AppState, api_error};
use crate::metrics;

/// Per-connection buffer; the hub drops messages for a full buffer
pub const CONNECTION_BUFFER: usize = 64;

/// Upgrade to a WebSocket subscribed to the tournament's room.
///
/// Answers `404 Not Found` for an unknown tournament and `500` when the
/// lookup fails, without upgrading.
pub async fn websocket_handler<S: TournamentStore>(
    ws: WebSocketUpgrade,
    Path(id): Path<TournamentId>,
    State(state): State<AppState<S>>,
) -> Response {
    match state.store.get_tournament(id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return api_error(StatusCode::NOT_FOUND, "Tournament not found").into_response();
        }
        Err(e) => {
            tracing::error!(tournament_id = id, error = %e, "WebSocket lookup failed");
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                .into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_socket(socket, id, state))
}

async fn handle_socket<S: TournamentStore>(
    socket: WebSocket,
    tournament_id: TournamentId,
    state: AppState<S>,
) {
    let room = tournament_room(tournament_id);
    let connection_id = Uuid::new_v4();
    let (room_tx, mut room_rx) = mpsc::channel::<RoomMessage>(CONNECTION_BUFFER);

    if state
        .hub
        .register(room.clone(), connection_id, room_tx)
        .await
        .is_err()
    {
        tracing::error!(%connection_id, room = %room, "Hub closed, dropping WebSocket");
        return;
    }

    metrics::websocket_connected();
    tracing::info!(%connection_id, room = %room, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(message) = room_rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize room message");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
            metrics::websocket_messages_sent();
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) => break,
            Ok(Message::Text(text)) => {
                tracing::debug!(%connection_id, len = text.len(), "Ignoring inbound text frame");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(%connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    send_task.abort();

    if state.hub.unregister(room.clone(), connection_id).await.is_err() {
        tracing::debug!(%connection_id, "Hub already closed on disconnect");
    }
    metrics::websocket_disconnected();

    tracing::info!(%connection_id, room = %room, "WebSocket disconnected");
}
