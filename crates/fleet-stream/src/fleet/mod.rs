//! Fleet-health stream client.
//!
//! [`StreamController::spawn`] starts a background task that keeps one SSE
//! connection to the producer open, decodes each `fleet-health` event into a
//! [`Snapshot`] and reconnects with exponential backoff when the connection
//! drops. The returned [`StreamHandle`] exposes the latest [`StreamState`].

pub mod codec;
pub mod config;
mod controller;
pub mod machine;
pub mod session;
pub mod types;

pub use codec::{DecodeError, FALLBACK_SERVER_ERROR, Snapshot};
pub use config::{DEFAULT_ERROR_EVENT, DEFAULT_SNAPSHOT_EVENT, DEFAULT_STREAM_PATH, StreamConfig};
pub use controller::{ControlCommand, StreamController, StreamHandle};
pub use machine::{Effect, Input, RETRIES_EXHAUSTED_MESSAGE, StreamMachine};
pub use session::{SessionEvent, SessionId, SessionReport};
pub use types::{ConnectionStatus, StreamFault, StreamFaultKind, StreamState};
