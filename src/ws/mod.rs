//! Real-time delivery layer: connection registry, broadcast dispatch,
//! and the authenticated WebSocket upgrade handshake.

pub mod actor;
pub mod broadcast;
pub mod events;
pub mod handler;
pub mod registry;

pub use broadcast::DeliveryReport;
pub use registry::{Connection, ConnectionRegistry, Transport, TransportError};
