//! Broadcast dispatcher: best-effort fan-out of a payload to every
//! connection registered under a channel.
//!
//! Delivery is at-most-once per member, no retry. A member whose transport
//! has died is logged and deregistered without disturbing delivery to the
//! rest, and never surfaces as an error to the broadcast caller.

use super::registry::{Connection, ConnectionRegistry, TransportError};

/// Outcome of one broadcast call. Useful for tests and observability;
/// callers that fire-and-forget just drop it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Deliver the payload to every current member of the channel.
/// Works against a snapshot, so members added mid-broadcast may miss
/// this event. An empty or unknown channel is a silent no-op.
pub fn broadcast(registry: &ConnectionRegistry, channel_id: &str, payload: &str) -> DeliveryReport {
    let members = registry.members_of(channel_id);
    let mut report = DeliveryReport::default();

    for member in &members {
        match member.transport.send(payload) {
            Ok(()) => report.delivered += 1,
            Err(err) => {
                report.failed += 1;
                tracing::warn!(
                    channel_id = %channel_id,
                    connection_id = member.id,
                    user_id = %member.user_id,
                    error = %err,
                    "Dropping dead connection during broadcast"
                );
                registry.deregister(channel_id, member.id);
            }
        }
    }

    if report.delivered > 0 || report.failed > 0 {
        tracing::debug!(
            channel_id = %channel_id,
            delivered = report.delivered,
            failed = report.failed,
            "Broadcast dispatched"
        );
    }

    report
}

/// Same contract restricted to a single known connection.
pub fn send_to_connection(connection: &Connection, payload: &str) -> Result<(), TransportError> {
    connection.transport.send(payload)
}

/// Deliver to all of a user's active devices via their personal
/// notification channel (channel id == user id).
pub fn notify_user(registry: &ConnectionRegistry, user_id: &str, payload: &str) -> DeliveryReport {
    broadcast(registry, user_id, payload)
}
