//! Controller link for the drover agent.
//!
//! One logical bidirectional stream of [`drover_model::Envelope`] messages
//! to a single controller URL, behind two interchangeable wire bindings:
//! a WebSocket carrying one JSON envelope per text frame, and a gRPC
//! bidirectional stream carrying the same fields with a JSON-bytes payload.
//! The binding is chosen from the URL scheme by [`create_transport`].

mod proto {
    tonic::include_proto!("drover.link.v1");
}

mod error;
pub use error::TransportError;

mod config;
pub use config::TransportConfig;

mod state;

mod factory;
pub use factory::create_transport;

mod websocket;
pub use websocket::WebSocketTransport;

mod grpc;
pub use grpc::GrpcTransport;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use drover_model::{ConnectionInfo, Envelope};

/// Capacity of the outbound and inbound message channels.
pub(crate) const CHANNEL_DEPTH: usize = 100;
/// How long `send` waits for space on the outbound channel.
pub(crate) const SEND_ENQUEUE_WAIT: std::time::Duration = std::time::Duration::from_secs(5);
/// Write deadline applied by the send pumps.
pub(crate) const WRITE_DEADLINE: std::time::Duration = std::time::Duration::from_secs(10);
/// Read deadline applied by the WebSocket receive pump.
pub(crate) const READ_DEADLINE: std::time::Duration = std::time::Duration::from_secs(60);
/// Keepalive ping cadence.
pub(crate) const PING_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

/// A single logical message stream to the controller.
///
/// Implementations recover from wire failures themselves (reconnect); the
/// caller only ever observes `DISCONNECTED` while a reconnect cycle runs.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the connection, authenticate, and start the pumps.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Close the stream and wait for the pumps to exit. Idempotent.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Enqueue a message for the controller, assigning id and timestamp
    /// when absent. Fails `TIMEOUT` when the outbound queue stays full.
    async fn send(&self, message: Envelope) -> Result<(), TransportError>;

    /// Block until the next inbound message, a transport error, or `ctx`
    /// cancellation.
    async fn recv(&self, ctx: &CancellationToken) -> Result<Envelope, TransportError>;

    fn is_connected(&self) -> bool;

    fn info(&self) -> ConnectionInfo;
}
