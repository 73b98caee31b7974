//! Per-connection actor: owns the socket from successful handshake to
//! deregistration.
//!
//! The socket splits into a writer task (drains the connection's outbound
//! mpsc queue into the sink) and a reader loop (keep-alive only: inbound
//! frames are drained and otherwise ignored). The registry entry is
//! released by a scoped guard, so any exit path deregisters exactly once.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::state::AppState;
use crate::ws::registry::{Connection, ConnectionRegistry, Transport, TransportError};

/// Ping interval: server sends WebSocket ping every 30 seconds.
/// Prevents connection leaks from abrupt disconnects.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Production transport: enqueues onto the connection's outbound queue.
/// Never blocks; actual socket I/O happens in the writer task, so the
/// registry's lock is never held across a network send.
pub struct SocketTransport {
    tx: mpsc::UnboundedSender<Message>,
}

impl SocketTransport {
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { tx }
    }
}

impl Transport for SocketTransport {
    fn send(&self, text: &str) -> Result<(), TransportError> {
        self.tx
            .send(Message::Text(text.to_string().into()))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        let _ = self.tx.send(Message::Close(None));
    }
}

/// Deregisters the connection when dropped. Exactly-once cleanup on
/// every path out of the receive loop.
struct RegistrationGuard {
    registry: Arc<ConnectionRegistry>,
    channel_id: String,
    connection_id: u64,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.deregister(&self.channel_id, self.connection_id);
    }
}

/// Run the actor for an authenticated, authorized WebSocket.
pub async fn run_connection(
    socket: WebSocket,
    state: AppState,
    channel_id: String,
    user_id: String,
) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let connection = Connection::new(user_id.clone(), Arc::new(SocketTransport::new(tx.clone())));
    let connection_id = connection.id;
    state.registry.register(&channel_id, connection);
    let _registration = RegistrationGuard {
        registry: state.registry.clone(),
        channel_id: channel_id.clone(),
        connection_id,
    };

    tracing::info!(
        user_id = %user_id,
        channel_id = %channel_id,
        connection_id = connection_id,
        "WebSocket actor started"
    );

    // Writer task: forwards mpsc messages to the WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Ping task: sends periodic pings and monitors pong responses
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died — connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {
                    // Pong received, continue
                }
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

    // Reader loop. The protocol defines no inbound operations: data frames
    // keep the connection alive and are otherwise dropped.
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(_) | Message::Binary(_) => {
                    tracing::trace!(
                        user_id = %user_id,
                        channel_id = %channel_id,
                        "Inbound frame drained"
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
                        user_id = %user_id,
                        channel_id = %channel_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    user_id = %user_id,
                    channel_id = %channel_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(
                    user_id = %user_id,
                    channel_id = %channel_id,
                    "WebSocket stream ended"
                );
                break;
            }
        }
    }

    writer_handle.abort();
    ping_handle.abort();

    tracing::info!(
        user_id = %user_id,
        channel_id = %channel_id,
        connection_id = connection_id,
        "WebSocket actor stopped"
    );
    // _registration drops here and deregisters the connection.
}

/// Writer task: receives messages from the mpsc channel and forwards them
/// to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed — connection is broken
            break;
        }
    }
}
