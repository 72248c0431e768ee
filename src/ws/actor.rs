use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, timeout};

use crate::presence;
use crate::state::AppState;
use crate::ws::protocol;
use crate::ws::{ConnectionSender, SEND_QUEUE_CAPACITY};

/// Ping interval: server sends WebSocket ping every 30 seconds.
/// Prevents registry leaks from abrupt disconnects.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the actor-per-connection pattern for an authenticated WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from a bounded mpsc channel
/// - Ping task: heartbeat; declares the channel dead on a missed pong
/// - Reader loop: processes incoming messages, dispatches to protocol handlers
///
/// The mpsc channel allows any part of the system to send messages to this
/// client by cloning the sender. Every exit path funnels into one cleanup:
/// unregister, then exactly one presence re-broadcast.
pub async fn run_connection(socket: WebSocket, state: AppState, user_id: String) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<Message>(SEND_QUEUE_CAPACITY);

    // Register this connection and announce the updated presence set.
    // The snapshot broadcast reaches the new channel too, so the client gets
    // its initial online-users view without a separate send.
    register_connection(&state, &user_id, tx.clone());
    presence::broadcast_online_users(&state.connections);

    tracing::info!(user_id = %user_id, "WebSocket actor started");

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::channel::<()>(1);

    // Heartbeat declares the connection dead through this signal; the reader
    // loop may otherwise hang on a peer whose TCP side silently vanished.
    let (dead_tx, mut dead_rx) = oneshot::channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            match ping_tx.try_send(Message::Ping(vec![1, 2, 3, 4].into())) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // Outbound queue congested; don't count a missing pong
                    // against the client this round.
                    continue;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => break,
            }

            // Wait for pong within timeout
            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {
                    // Pong received, continue
                }
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.try_send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    let _ = dead_tx.send(());
                    break;
                }
            }
        }
    });

    // Reader loop: process incoming WebSocket messages
    loop {
        tokio::select! {
            _ = &mut dead_rx => {
                tracing::warn!(user_id = %user_id, "Heartbeat declared connection dead");
                break;
            }
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(msg)) => match msg {
                    Message::Text(text) => {
                        protocol::handle_text_message(&text, &tx, &state, &user_id).await;
                    }
                    Message::Binary(_) => {
                        tracing::debug!(
                            user_id = %user_id,
                            "Received binary frame (expected JSON text), ignoring"
                        );
                    }
                    Message::Pong(_) => {
                        // Pong received — notify the ping task
                        let _ = pong_tx.try_send(());
                    }
                    Message::Ping(data) => {
                        // Respond to client pings with pong
                        let _ = tx.try_send(Message::Pong(data));
                    }
                    Message::Close(frame) => {
                        tracing::info!(
                            user_id = %user_id,
                            reason = ?frame,
                            "Client initiated close"
                        );
                        break;
                    }
                },
                Some(Err(e)) => {
                    tracing::warn!(
                        user_id = %user_id,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
                None => {
                    // Stream ended — client disconnected
                    tracing::info!(user_id = %user_id, "WebSocket stream ended");
                    break;
                }
            }
        }
    }

    // Cleanup: stop writer and ping tasks. Await the writer so its receiver
    // is dropped before eviction checks sender liveness.
    writer_handle.abort();
    ping_handle.abort();
    let _ = writer_handle.await;

    // Evict this connection and re-announce presence exactly once
    unregister_connection(&state, &user_id, &tx);
    presence::broadcast_online_users(&state.connections);

    tracing::info!(user_id = %user_id, "WebSocket actor stopped");
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed — connection is broken
            break;
        }
    }
}

/// Register a connection sender in the connection registry.
fn register_connection(state: &AppState, user_id: &str, tx: ConnectionSender) {
    state
        .connections
        .entry(user_id.to_string())
        .or_default()
        .push(tx);

    let conn_count = state
        .connections
        .get(user_id)
        .map(|v| v.len())
        .unwrap_or(0);
    tracing::debug!(
        user_id = %user_id,
        connections = conn_count,
        "Connection registered"
    );
}

/// Remove closed connections from the registry for a user.
/// After the writer task ends, the channel is closed, so any senders pointing
/// at it report closed. Evicting an already-absent channel is a no-op.
fn unregister_connection(state: &AppState, user_id: &str, _tx: &ConnectionSender) {
    let mut remove_user = false;

    if let Some(mut connections) = state.connections.get_mut(user_id) {
        connections.retain(|sender| !sender.is_closed());
        if connections.is_empty() {
            remove_user = true;
        }
    }

    if remove_user {
        state.connections.remove(user_id);
    }

    tracing::debug!(
        user_id = %user_id,
        "Connection unregistered"
    );
}
