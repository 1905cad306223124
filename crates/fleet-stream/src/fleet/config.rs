//! Stream client configuration.

use std::time::Duration;

use crate::backoff::BackoffPolicy;

/// Path of the fleet-health push endpoint on the producer.
pub const DEFAULT_STREAM_PATH: &str = "/api/fleet-health/stream";
/// Event name carrying a snapshot.
pub const DEFAULT_SNAPSHOT_EVENT: &str = "fleet-health";
/// Event name carrying a producer error.
pub const DEFAULT_ERROR_EVENT: &str = "error";

/// Configuration for a [`StreamController`](super::StreamController).
///
/// Built with [`StreamConfig::new`] and chainable setters; every field has a
/// default except the URL.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// SSE endpoint URL.
    pub url: String,
    /// Additional HTTP headers sent with every connection attempt.
    pub headers: http::HeaderMap,
    /// Time allowed to receive response headers.
    pub connect_timeout: Duration,
    /// Treat an open stream that stays silent this long as a transport
    /// failure (None = never).
    pub idle_timeout: Option<Duration>,
    /// Retry schedule after transport failures.
    pub backoff: BackoffPolicy,
    /// Event name carrying snapshot payloads.
    pub snapshot_event: String,
    /// Event name carrying producer error payloads.
    pub error_event: String,
    /// Send `Last-Event-ID` on reconnect when the stream assigned ids.
    pub resume_with_last_event_id: bool,
    /// Capacity of the session → controller report channel.
    pub report_channel_capacity: usize,
    /// Capacity of the handle → controller command channel.
    pub command_channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            headers: http::HeaderMap::new(),
            connect_timeout: Duration::from_secs(10),
            idle_timeout: None,
            backoff: BackoffPolicy::default(),
            snapshot_event: DEFAULT_SNAPSHOT_EVENT.to_string(),
            error_event: DEFAULT_ERROR_EVENT.to_string(),
            resume_with_last_event_id: true,
            report_channel_capacity: 64,
            command_channel_capacity: 16,
        }
    }
}

impl StreamConfig {
    /// Create a new configuration with the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Create a configuration for the producer's standard stream path under
    /// `base_url`.
    #[must_use]
    pub fn for_host(base_url: &str) -> Self {
        Self::new(format!(
            "{}{DEFAULT_STREAM_PATH}",
            base_url.trim_end_matches('/')
        ))
    }

    /// Set additional HTTP headers.
    #[must_use]
    pub fn headers(mut self, headers: http::HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the idle timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the backoff policy.
    #[must_use]
    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the snapshot event name.
    #[must_use]
    pub fn snapshot_event(mut self, name: impl Into<String>) -> Self {
        self.snapshot_event = name.into();
        self
    }

    /// Set the error event name.
    #[must_use]
    pub fn error_event(mut self, name: impl Into<String>) -> Self {
        self.error_event = name.into();
        self
    }

    /// Set whether reconnects resume from the last event id.
    #[must_use]
    pub fn resume_with_last_event_id(mut self, resume: bool) -> Self {
        self.resume_with_last_event_id = resume;
        self
    }

    /// Set the report channel capacity.
    #[must_use]
    pub fn report_channel_capacity(mut self, capacity: usize) -> Self {
        self.report_channel_capacity = capacity;
        self
    }

    /// Set the command channel capacity.
    #[must_use]
    pub fn command_channel_capacity(mut self, capacity: usize) -> Self {
        self.command_channel_capacity = capacity;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error message string if any field has an invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("URL cannot be empty".to_string());
        }
        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be > 0".to_string());
        }
        if self.idle_timeout.is_some_and(|t| t.is_zero()) {
            return Err("Idle timeout must be > 0".to_string());
        }
        if self.snapshot_event.is_empty() || self.error_event.is_empty() {
            return Err("Event names cannot be empty".to_string());
        }
        if self.snapshot_event == self.error_event {
            return Err("Snapshot and error event names must differ".to_string());
        }
        if self.report_channel_capacity == 0 {
            return Err("Report channel capacity must be > 0".to_string());
        }
        if self.command_channel_capacity == 0 {
            return Err("Command channel capacity must be > 0".to_string());
        }
        self.backoff.validate()
    }
}
