//! Push channel lifecycle.
//!
//! [`StreamManager`] connects through a [`Connector`], decodes each inbound
//! frame and hands the payload to an [`EventSink`]. It knows nothing about
//! how the sink merges payloads.

pub mod manager;
pub mod policy;
pub mod state;
pub mod transport;
pub mod websocket;

use serde_json::Value;

pub use manager::StreamManager;
pub use policy::ReconnectPolicy;
pub use state::ConnectionState;
pub use transport::{decode_frame, CloseInfo, Connector, EventChannel, Frame};
pub use websocket::WsConnector;

/// Receives decoded stream payloads.
///
/// `deliver` runs while the manager holds its session lock, which is how
/// `stop` guarantees nothing arrives after it returns. Implementations must
/// return promptly and must not call back into the [`StreamManager`]
/// (`state`, `pending_reconnects`, `start`, ...), or they deadlock.
pub trait EventSink: Send + Sync {
    fn deliver(&self, payload: Value);
}
