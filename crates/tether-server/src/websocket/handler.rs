//! `WebSocket` upgrade and socket pump.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::channel::{Channel, CloseNotice, Outbound};
use super::handshake::HandshakeOutcome;
use crate::metrics::{
    REGISTRY_ENTRIES, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};
use crate::server::AppState;

/// First `token` query parameter, if any.
fn token_param(params: Vec<(String, String)>) -> Option<String> {
    params
        .into_iter()
        .find_map(|(key, value)| (key == "token").then_some(value))
}

/// GET /ws (and /): upgrade, then run the handshake on the new channel.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<Vec<(String, String)>>,
    State(state): State<AppState>,
) -> Response {
    let token = token_param(params);
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, token, state))
}

#[allow(clippy::cast_precision_loss)]
async fn handle_socket(socket: WebSocket, token: Option<String>, state: AppState) {
    let (channel, rx) = Channel::pair(state.config.send_queue_capacity);
    let active = state.live_channels.fetch_add(1, Ordering::Relaxed) + 1;
    metrics::counter!(WS_CONNECTIONS_TOTAL).increment(1);
    metrics::gauge!(WS_CONNECTIONS_ACTIVE).set(active as f64);

    match state.gateway.open(&channel, token.as_deref()) {
        Ok(HandshakeOutcome::Authenticated { .. }) => {
            metrics::gauge!(REGISTRY_ENTRIES).set(state.gateway.registry().len() as f64);
        }
        Ok(HandshakeOutcome::Rejected(_)) => {}
        Err(e) => {
            warn!(conn_id = %channel.id(), error = %e, "handshake failed");
            let _ = channel.terminate(None);
        }
    }

    pump(
        socket,
        Arc::clone(&channel),
        rx,
        state.config.heartbeat_interval,
        state.shutdown.clone(),
    )
    .await;

    state.gateway.close(&channel);
    let active = state.live_channels.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
    metrics::counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    metrics::gauge!(WS_CONNECTIONS_ACTIVE).set(active as f64);
    metrics::gauge!(REGISTRY_ENTRIES).set(state.gateway.registry().len() as f64);
}

fn close_frame(notice: CloseNotice) -> CloseFrame {
    CloseFrame {
        code: notice.code,
        reason: notice.reason.into(),
    }
}

/// Writer drains the channel queue into the socket and pings on an
/// interval; reader waits for the peer to close. Returns when either ends.
async fn pump(
    socket: WebSocket,
    channel: Arc<Channel>,
    mut rx: mpsc::Receiver<Outbound>,
    heartbeat: Duration,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_channel = Arc::clone(&channel);
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat);
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(Outbound::Text(text)) => {
                        if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close(notice)) => {
                        let _ = ws_tx.send(Message::Close(notice.map(close_frame))).await;
                        break;
                    }
                    None => break,
                },
                _ = ping_interval.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                    trace!(conn_id = %writer_channel.id(), "sent ping");
                }
                () = writer_channel.hung_up() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                () = shutdown.cancelled() => {
                    let frame = close_frame(CloseNotice::going_away());
                    let _ = ws_tx.send(Message::Close(Some(frame))).await;
                    break;
                }
            }
        }

        let _ = ws_tx.close().await;
        writer_channel.mark_closed();
    });

    let reader_id = channel.id().clone();
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Close(_) => break,
                Message::Text(_) | Message::Binary(_) => {
                    debug!(conn_id = %reader_id, "ignoring inbound frame");
                }
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }
}
