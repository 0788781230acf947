use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::presence::snapshot::compute_snapshot;
use crate::state::AppState;
use crate::ws::broadcast::send_to_connection;
use crate::ws::lifecycle::Connection;
use crate::ws::protocol::{self, ServerEvent};
use crate::ws::ConnectionHandle;

/// Ping interval: server sends WebSocket ping every 30 seconds.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the actor-per-connection pattern for one WebSocket.
///
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Ping task: keepalive, closes the socket if pongs stop arriving
/// - Reader loop (this task): parses client events and drives the presence
///   lifecycle; also re-arms the presence TTL on a timer while registered
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let handle = ConnectionHandle::new(tx.clone());
    let conn_id = handle.id;
    state.clients.insert(conn_id, tx.clone());
    let mut connection = Connection::new(handle);

    tracing::info!(
        conn_id = %conn_id,
        clients = state.clients.len(),
        "WebSocket actor started"
    );

    // Send the current snapshot to the newly connected client only
    let online = compute_snapshot(&state.connections, &state.records).await;
    send_to_connection(connection.handle(), &ServerEvent::OnlineUsers(online));

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died, connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // A zero-length interval would spin; treat it as "no refresh".
    let mut refresh_timer = state
        .refresh_interval
        .filter(|period| !period.is_zero())
        .map(|period| {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });
    if let Some(timer) = refresh_timer.as_mut() {
        timer.tick().await;
    }

    // Reader loop: process incoming WebSocket messages
    loop {
        let incoming = tokio::select! {
            msg = ws_receiver.next() => msg,
            _ = tick(&mut refresh_timer) => {
                connection.refresh(&state).await;
                continue;
            }
        };

        match incoming {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => match protocol::parse_client_event(text.as_str()) {
                    Ok(event) => connection.dispatch(event, &state).await,
                    Err(e) => {
                        tracing::debug!(
                            conn_id = %conn_id,
                            error = %e,
                            "Ignoring unparseable frame: {}",
                            text.as_str().chars().take(100).collect::<String>()
                        );
                    }
                },
                Message::Binary(data) => {
                    tracing::debug!(
                        conn_id = %conn_id,
                        bytes = data.len(),
                        "Ignoring binary frame (protocol is JSON text)"
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        conn_id = %conn_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    conn_id = %conn_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(conn_id = %conn_id, "WebSocket stream ended");
                break;
            }
        }
    }

    // Cleanup: abort writer and ping tasks
    writer_handle.abort();
    ping_handle.abort();

    // Stop receiving broadcasts before the final snapshot goes out
    state.clients.remove(&conn_id);
    connection.terminate(&state).await;

    tracing::info!(conn_id = %conn_id, "WebSocket actor stopped");
}

/// Resolves on the next refresh tick, or never when refresh is disabled.
async fn tick(timer: &mut Option<tokio::time::Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed, connection is broken
            break;
        }
    }
}
