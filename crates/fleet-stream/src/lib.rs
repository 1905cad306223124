//! # Fleet Stream
//!
//! Self-healing Server-Sent Events client for live fleet-health snapshots.
//!
//! A background controller keeps exactly one push connection to the producer
//! open, decodes every `fleet-health` event into a typed [`Snapshot`] and
//! retries dropped connections with exponential backoff. Consumers observe the
//! latest snapshot, the connection status and the most recent error through a
//! clone-able [`StreamHandle`].
//!
//! ## Features
//!
//! - **Typed Snapshots**: Strict decoding; malformed payloads never drop the connection
//! - **Bounded Reconnects**: Deterministic 2s/4s/8s/16s/32s backoff, then a terminal error
//! - **Single Connection**: A new session starts only after the previous one is released
//! - **Resumption**: `Last-Event-ID` is sent when the producer assigns event ids
//! - **Observability**: `tracing` logs and OpenTelemetry counters
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fleet_stream::{StreamConfig, StreamController};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StreamConfig::for_host("https://ops.example.com");
//!     let handle = StreamController::spawn(config)?;
//!
//!     let state = handle.wait_for(|s| s.snapshot.is_some()).await?;
//!     if let Some(snapshot) = state.snapshot {
//!         println!("fleet health: {}", snapshot.fleet_health_score);
//!     }
//!
//!     handle.close().await?;
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod error;
pub mod fleet;
pub mod metrics;
pub mod sse;
pub mod transport;

// Re-export commonly used types
pub use backoff::{Backoff, BackoffPolicy};
pub use error::{StreamError, StreamResult};
pub use fleet::{
    ConnectionStatus, DecodeError, Snapshot, StreamConfig, StreamController, StreamFault,
    StreamFaultKind, StreamHandle, StreamState,
};
#[cfg(feature = "otlp")]
pub use metrics::init_metrics;
pub use metrics::StreamMetrics;
pub use sse::SseEvent;
pub use transport::{EventStream, HttpTransport, Transport};
