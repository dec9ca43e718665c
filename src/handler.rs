//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake with
//! connection parameters, room lookup, and the reader/writer pair that
//! connects the socket to a [`Session`].

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::message::Message;
use crate::router::Session;
use crate::server::RelayState;
use crate::store::RoomStore;
use crate::types::ConnId;

/// Parameters a client supplies when opening `/ws/{roomId}?userID=..&userName=..`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub room_id: String,
    pub user_id: String,
    pub user_name: Option<String>,
}

impl ConnectParams {
    /// Parse the request path and query string
    pub fn from_uri(path: &str, query: Option<&str>) -> Result<Self, AppError> {
        let room_id = path
            .strip_prefix("/ws/")
            .map(|rest| rest.trim_end_matches('/'))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(percent_decode)
            .ok_or(AppError::MissingParam("roomID"))?;

        let mut user_id = None;
        let mut user_name = None;
        for pair in query.unwrap_or("").split('&') {
            let mut it = pair.splitn(2, '=');
            let key = it.next().unwrap_or("");
            let value = percent_decode(it.next().unwrap_or(""));
            match key {
                "userID" => user_id = Some(value),
                "userName" => user_name = Some(value),
                _ => {}
            }
        }

        let user_id = user_id
            .filter(|id| !id.is_empty())
            .ok_or(AppError::MissingParam("userID"))?;

        Ok(Self {
            room_id,
            user_id,
            user_name: user_name.filter(|name| !name.is_empty()),
        })
    }
}

/// Decode `%XX` escapes and `+` in a query component
///
/// Malformed escapes are kept literally.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Value of one ASCII hex digit
fn hex_value(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

fn bad_request(reason: &AppError) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response
}

/// Resolve the display name: query parameter, then stored user, then the id
async fn resolve_user_name(store: &dyn RoomStore, params: &ConnectParams) -> String {
    if let Some(name) = &params.user_name {
        return name.clone();
    }
    match store.get_user(&params.user_id).await {
        Ok(user) => user.name,
        Err(_) => params.user_id.clone(),
    }
}

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, joins the requested room and runs
/// the read loop until the client closes or the socket errors.
pub async fn handle_connection(stream: TcpStream, state: Arc<RelayState>) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake; missing parameters are refused with 400
    let mut parsed = None;
    let handshake = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        let result = ConnectParams::from_uri(req.uri().path(), req.uri().query());
        let reply = match &result {
            Ok(_) => Ok(resp),
            Err(e) => Err(bad_request(e)),
        };
        parsed = Some(result);
        reply
    })
    .await;

    let mut ws_stream = match handshake {
        Ok(ws) => ws,
        Err(e) => {
            if let Some(Err(reason)) = parsed {
                warn!("Rejected connection from {}: {}", peer_addr, reason);
                return Err(reason);
            }
            return Err(e.into());
        }
    };
    let params = match parsed {
        Some(Ok(params)) => params,
        Some(Err(reason)) => return Err(reason),
        None => return Err(AppError::MissingParam("roomID")),
    };

    // Persistence is consulted before any hub mutation
    let record = match state.store.lookup_room(&params.room_id).await {
        Ok(record) => record,
        Err(e) => {
            warn!("Room {} not found for {}: {}", params.room_id, params.user_id, e);
            let frame = CloseFrame {
                code: CloseCode::Policy,
                reason: "room not found".into(),
            };
            let _ = ws_stream.close(Some(frame)).await;
            return Err(e.into());
        }
    };
    let user_name = resolve_user_name(state.store.as_ref(), &params).await;

    let conn_id = ConnId::new();
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Channel for server -> client messages
    let (msg_tx, mut msg_rx) = mpsc::channel::<Message>(state.outbound_buffer);

    // Spawn write task (Message -> WebSocket)
    let write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match msg.encode() {
                Ok(json) => {
                    if ws_sender.send(WsMessage::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                }
            }
        }
        debug!("Write task ended for {}", conn_id);

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    let session = Session::join(
        Arc::clone(&state.hub),
        &record,
        conn_id,
        params.user_id,
        user_name,
        msg_tx,
    )?;

    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => session.dispatch(&text),
            Ok(WsMessage::Binary(data)) => match std::str::from_utf8(&data) {
                Ok(text) => session.dispatch(text),
                Err(e) => warn!(conn_id = %conn_id, "Non UTF-8 binary frame: {}", e),
            },
            Ok(WsMessage::Close(_)) => {
                debug!("Client {} sent close frame", conn_id);
                break;
            }
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {
                // Pong is handled automatically by tungstenite
            }
            Ok(WsMessage::Frame(_)) => {}
            Err(e) => {
                warn!("WebSocket error for {}: {}", conn_id, e);
                break;
            }
        }
    }

    // Unregister and announce; the writer drains and closes once the
    // last sender is gone
    drop(session);
    let _ = write_task.await;

    info!("Connection {} from {} closed", conn_id, peer_addr);
    Ok(())
}
