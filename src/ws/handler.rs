//! WebSocket upgrade handler
//!
//! Each socket is one participant's message channel: text frames in are
//! intents, snapshots out are JSON text frames.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::{PlayerIntent, RaceHandle};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{Intent, ServerMsg};

/// Query parameters for WebSocket connection
///
/// Identity comes from the hosting platform and is trusted as given.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Platform instance the race belongs to
    pub room: String,
    /// Participant id
    pub id: String,
    /// Display name
    pub name: String,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    info!(room = %query.room, player_id = %query.id, "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, query, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, query: WsQuery, state: AppState) {
    let race = state.races.get_or_create(&query.room);
    race.connect();

    let (mut ws_sink, ws_stream) = socket.split();

    // Subscribe before joining so the join snapshot is not missed
    let snapshot_rx = race.subscribe();
    if let Some(latest) = race.latest_snapshot() {
        if let Err(e) = send_msg(&mut ws_sink, &latest).await {
            error!(player_id = %query.id, error = %e, "Failed to send initial snapshot");
            race.disconnect();
            return;
        }
    }

    let join = PlayerIntent {
        sender_id: query.id.clone(),
        intent: Intent::Join {
            id: query.id.clone(),
            name: query.name.clone(),
        },
        received_at: unix_millis(),
    };
    if race.send(join).await {
        run_session(&query.id, &race, ws_sink, ws_stream, snapshot_rx).await;
    } else {
        warn!(room = %query.room, player_id = %query.id, "Race closed before join");
    }

    race.disconnect();
    info!(room = %query.room, player_id = %query.id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    player_id: &str,
    race: &RaceHandle,
    ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut snapshot_rx: broadcast::Receiver<ServerMsg>,
) {
    let rate_limiter = ConnectionRateLimiter::new();

    // Writer shares the sink with the reader for error replies
    let ws_sink = std::sync::Arc::new(tokio::sync::Mutex::new(ws_sink));

    // Spawn writer task: race broadcasts -> WebSocket
    let writer_id = player_id.to_string();
    let writer_sink = ws_sink.clone();
    let writer_handle = tokio::spawn(async move {
        loop {
            match snapshot_rx.recv().await {
                Ok(msg) => {
                    let mut sink = writer_sink.lock().await;
                    if let Err(e) = send_msg(&mut sink, &msg).await {
                        debug!(player_id = %writer_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Only the newest snapshot matters; keep going
                    warn!(player_id = %writer_id, lagged_count = n, "Client lagged, skipping snapshots");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(player_id = %writer_id, "Snapshot channel closed");
                    break;
                }
            }
        }
    });

    // Reader loop: WebSocket -> race session
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_intent() {
                    warn!(player_id = %player_id, "Rate limited intent");
                    continue;
                }

                match serde_json::from_str::<Intent>(&text) {
                    Ok(intent) => {
                        let input = PlayerIntent {
                            sender_id: player_id.to_string(),
                            intent,
                            received_at: unix_millis(),
                        };
                        if !race.send(input).await {
                            debug!(player_id = %player_id, "Race session gone");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse intent");
                        let reply = ServerMsg::Error {
                            code: "bad_intent".to_string(),
                            message: e.to_string(),
                        };
                        let mut sink = ws_sink.lock().await;
                        if send_msg(&mut sink, &reply).await.is_err() {
                            break;
                        }
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
