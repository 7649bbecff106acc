//! WebSocket Handler
//!
//! One task per connection: authenticates, joins the room, then forwards
//! decoded client messages to the room hub and writes the hub's frames to
//! the socket until either side goes away.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use std::fmt::Display;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::hub::{JoinTicket, RoomHandle};
use crate::project::{Identity, RoomId};
use crate::protocol::{self, Inbound, ServerMessage};
use crate::registry::RoomRegistry;
use crate::session::Outbound;

/// Query parameters of the upgrade request
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Bearer token
    pub token: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<RoomId>,
    Query(params): Query<ConnectParams>,
    State(registry): State<RoomRegistry>,
) -> impl IntoResponse {
    info!(room_id = %room_id, "WebSocket upgrade requested");
    ws.on_upgrade(move |socket: WebSocket| async move {
        let (sink, stream) = socket.split();
        serve_connection(sink, stream, room_id, params.token, registry).await;
    })
}

/// Drive one connection over any message sink/stream pair
pub async fn serve_connection<W, R, E>(
    mut sink: W,
    mut stream: R,
    room_id: RoomId,
    token: Option<String>,
    registry: RoomRegistry,
) where
    W: Sink<Message> + Unpin,
    R: Stream<Item = std::result::Result<Message, E>> + Unpin,
    E: Display,
{
    let identity = match registry
        .authenticator()
        .verify_bearer(token.as_deref().unwrap_or_default())
    {
        Ok(identity) => identity,
        Err(e) => {
            warn!(room_id = %room_id, error = %e, "WebSocket authentication failed");
            reject(&mut sink, ServerMessage::from_error(&Error::from(e))).await;
            return;
        }
    };

    let config = registry.config().clone();
    let (tx, mut rx) = mpsc::channel(config.outbound_buffer);

    let (handle, ticket) = match join_room(&registry, &room_id, identity, tx).await {
        Ok(joined) => joined,
        Err(Error::NotFound(_)) => {
            info!(room_id = %room_id, "room not found");
            reject(&mut sink, ServerMessage::error("room_not_found", "Room not found")).await;
            return;
        }
        Err(e) => {
            info!(room_id = %room_id, error = %e, "join refused");
            reject(&mut sink, ServerMessage::from_error(&e)).await;
            return;
        }
    };
    let session_id = ticket.session_id;

    info!(
        room_id = %room_id,
        session_id = %session_id,
        role = ?ticket.role,
        "WebSocket connected"
    );

    let mut ping = tokio::time::interval(config.ping_interval);
    ping.tick().await;

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => match protocol::decode(&text) {
                    Ok(Inbound::Message(message)) => {
                        if handle.submit(session_id, message).await.is_err() {
                            break;
                        }
                    }
                    Ok(Inbound::Unknown(action)) => {
                        debug!(session_id = %session_id, action = %action, "ignoring unknown action");
                    }
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "dropping malformed message");
                    }
                },
                Some(Ok(Message::Ping(data))) => {
                    if sink.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!(session_id = %session_id, "WebSocket closed by client");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(session_id = %session_id, error = %e, "WebSocket error");
                    break;
                }
            },

            outbound = rx.recv() => match outbound {
                Some(frame) => {
                    if sink.send(Message::Text(frame.to_string())).await.is_err() {
                        break;
                    }
                }
                None => {
                    // the hub dropped this session
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },

            _ = ping.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    if let Err(e) = handle.leave(session_id).await {
        debug!(session_id = %session_id, error = %e, "leave after room closed");
    }
    info!(room_id = %room_id, session_id = %session_id, "WebSocket disconnected");
}

/// Join a room, retrying when the resident hub closes underneath us
async fn join_room(
    registry: &RoomRegistry,
    room_id: &str,
    identity: Identity,
    outbound: Outbound,
) -> Result<(RoomHandle, JoinTicket)> {
    let mut attempts = 0;
    loop {
        let handle = registry.get_or_create(room_id).await?;
        match handle.join(identity.clone(), outbound.clone()).await {
            Ok(ticket) => return Ok((handle, ticket)),
            Err(Error::Closed) if attempts < registry.config().join_retries => {
                attempts += 1;
                debug!(room_id = %room_id, attempts, "room closed during join, retrying");
            }
            Err(e) => return Err(e),
        }
    }
}

async fn reject<W>(sink: &mut W, message: ServerMessage)
where
    W: Sink<Message> + Unpin,
{
    if let Ok(frame) = message.encode() {
        let _ = sink.send(Message::Text(frame.to_string())).await;
    }
    let _ = sink.send(Message::Close(None)).await;
}
