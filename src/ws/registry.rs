//! Connection registry: tracks all live WebSocket connections per channel.
//!
//! A channel is either a chat id (multi-party delivery target) or a user id
//! (personal notification target; one entry per active device). The registry
//! is the only shared mutable state in the real-time layer. Its backing map
//! gives per-key mutual exclusion, and no network I/O ever happens under the
//! shard lock: a transport send just enqueues onto the connection's outbound
//! mpsc queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

/// Send failure on an established connection. Local to that connection:
/// the dispatcher catches it, deregisters the member, and moves on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
}

/// Narrow send/close capability over one live socket.
/// The production implementation wraps the connection's outbound queue;
/// tests substitute a recording fake.
pub trait Transport: Send + Sync {
    fn send(&self, text: &str) -> Result<(), TransportError>;
    fn close(&self);
}

/// One authenticated, live transport session, registered under exactly
/// one channel. The transport handle is owned by the registry entry;
/// user_id is set at handshake and immutable thereafter.
#[derive(Clone)]
pub struct Connection {
    pub id: u64,
    pub user_id: String,
    pub transport: Arc<dyn Transport>,
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl Connection {
    /// Wrap a transport with a process-unique connection id.
    pub fn new(user_id: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            user_id: user_id.into(),
            transport,
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Process-wide mapping from channel id to the set of live connections.
/// Built once at startup, shared via Arc, never implicitly recreated.
#[derive(Default)]
pub struct ConnectionRegistry {
    channels: DashMap<String, Vec<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Insert the connection into the channel's member set.
    /// Re-registering the same connection id is a no-op.
    pub fn register(&self, channel_id: &str, connection: Connection) {
        let mut members = self.channels.entry(channel_id.to_string()).or_default();
        if members.iter().all(|c| c.id != connection.id) {
            members.push(connection);
        }

        tracing::debug!(
            channel_id = %channel_id,
            connections = members.len(),
            "Connection registered"
        );
    }

    /// Remove the connection from the channel's member set. Removing the
    /// last member drops the channel key entirely, so an idle channel
    /// holds no memory. Deregistering a connection that is not present
    /// is a no-op.
    pub fn deregister(&self, channel_id: &str, connection_id: u64) {
        // retain + empty check run under the same shard lock, so a
        // concurrent broadcast snapshot never sees a half-removed entry.
        self.channels.remove_if_mut(channel_id, |_, members| {
            members.retain(|c| c.id != connection_id);
            members.is_empty()
        });

        tracing::debug!(
            channel_id = %channel_id,
            connection_id = connection_id,
            "Connection deregistered"
        );
    }

    /// Snapshot of the channel's current members. The snapshot does not
    /// stay current after subsequent register/deregister calls.
    pub fn members_of(&self, channel_id: &str) -> Vec<Connection> {
        self.channels
            .get(channel_id)
            .map(|members| members.clone())
            .unwrap_or_default()
    }

    /// Number of channels with at least one live connection.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::{Transport, TransportError};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Recording transport for unit tests. Can be flipped to closed to
    /// simulate a peer that went away.
    #[derive(Default)]
    pub struct FakeTransport {
        pub sent: Mutex<Vec<String>>,
        pub closed: AtomicBool,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn broken() -> Self {
            let transport = Self::default();
            transport.closed.store(true, Ordering::SeqCst);
            transport
        }

        pub fn sent_payloads(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Transport for FakeTransport {
        fn send(&self, text: &str) -> Result<(), TransportError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }
}
