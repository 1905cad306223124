//! Error handling for the stream client.

use std::time::Duration;

use thiserror::Error;

/// The main result type used throughout the crate.
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors raised while establishing or reading the push connection, or while
/// talking to the controller task.
///
/// Per-event payload problems are not represented here; see
/// [`DecodeError`](crate::fleet::DecodeError).
#[derive(Error, Debug)]
pub enum StreamError {
    /// HTTP request errors (wraps reqwest::Error)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The connection was not established in time
    #[error("Connection timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Non-2xx response from the stream endpoint
    #[error("Stream endpoint returned status {status}")]
    InvalidStatus { status: http::StatusCode },

    /// The endpoint answered with something other than `text/event-stream`
    #[error("Unexpected content type: {content_type}")]
    InvalidContentType { content_type: String },

    /// The byte stream could not be decoded as server-sent events
    #[error("Event stream protocol error: {message}")]
    Protocol { message: String },

    /// The server closed the stream
    #[error("Event stream ended by server")]
    StreamEnded,

    /// Nothing arrived on an open stream for too long
    #[error("No events received for {duration:?}")]
    Idle { duration: Duration },

    /// The controller task has shut down
    #[error("Stream controller has shut down")]
    ControllerClosed,
}

impl StreamError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Create an invalid status error.
    pub fn invalid_status(status: http::StatusCode) -> Self {
        Self::InvalidStatus { status }
    }

    /// Create an invalid content type error.
    pub fn invalid_content_type(content_type: impl Into<String>) -> Self {
        Self::InvalidContentType {
            content_type: content_type.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create an idle timeout error.
    pub fn idle(duration: Duration) -> Self {
        Self::Idle { duration }
    }
}
