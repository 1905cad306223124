//! Consumer-facing state types.

use std::{fmt, sync::Arc};

use super::codec::Snapshot;

/// Connection status published by the controller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ConnectionStatus {
    /// A session is being opened, or a retry is pending.
    #[default]
    Connecting,
    /// The push connection is established.
    Open,
    /// The controller was torn down; no further sessions will be created.
    Closed,
    /// Retries are exhausted. Terminal until a manual reconnect.
    Error,
}

impl ConnectionStatus {
    /// Returns `true` if the push connection is established.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` if retries are exhausted.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// Returns `true` if the controller has shut down.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Lower-case name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a published error.
///
/// The kinds recover differently, so they are never collapsed: the first two
/// leave the connection open, a transport failure drives the retry schedule,
/// and exhaustion needs a manual reconnect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum StreamFaultKind {
    /// A snapshot payload could not be decoded.
    PayloadDecode,
    /// The producer sent an `error` event.
    ServerReported,
    /// The underlying connection dropped or could not be established.
    TransportFailure,
    /// The backoff policy gave up.
    RetriesExhausted,
}

impl StreamFaultKind {
    /// Returns `true` for kinds that do not affect the connection.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::PayloadDecode | Self::ServerReported)
    }
}

impl fmt::Display for StreamFaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadDecode => write!(f, "PayloadDecode"),
            Self::ServerReported => write!(f, "ServerReported"),
            Self::TransportFailure => write!(f, "TransportFailure"),
            Self::RetriesExhausted => write!(f, "RetriesExhausted"),
        }
    }
}

/// The most recent error, with its kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamFault {
    pub kind: StreamFaultKind,
    pub message: String,
}

impl StreamFault {
    pub fn new(kind: StreamFaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for StreamFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Projection published to observers after every transition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamState {
    /// Latest decoded snapshot; survives disconnects.
    pub snapshot: Option<Arc<Snapshot>>,
    pub status: ConnectionStatus,
    /// Latest error, kept until replaced by a newer one.
    pub last_error: Option<StreamFault>,
    /// Retries used since the last healthy message or manual reconnect.
    pub retries: u32,
}
