//! Push transport abstraction.
//!
//! A [`Transport`] opens one connection to the event endpoint and yields the
//! decoded [`SseEvent`]s. Dropping the returned stream closes the connection.
//! [`HttpTransport`] is the production implementation; tests substitute
//! in-memory transports.

use std::{pin::Pin, sync::Arc};

use async_trait::async_trait;
use futures_util::Stream;
use tokio::time::timeout;
use tracing::debug;

use crate::{
    error::{StreamError, StreamResult},
    fleet::StreamConfig,
    sse::{SseEvent, event_stream},
};

/// Events from one open connection. Ends (or yields an error) when the
/// connection is lost.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamResult<SseEvent>> + Send>>;

/// Opens push connections.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open one connection, resuming after `last_event_id` when given.
    ///
    /// Returns once the connection is established, i.e. when it is ready to
    /// deliver events.
    async fn connect(&self, last_event_id: Option<&str>) -> StreamResult<EventStream>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn connect(&self, last_event_id: Option<&str>) -> StreamResult<EventStream> {
        (**self).connect(last_event_id).await
    }
}

/// [`Transport`] over HTTP with `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: Arc<StreamConfig>,
}

impl HttpTransport {
    /// Build a transport for the endpoint in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: Arc<StreamConfig>) -> StreamResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| StreamError::config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn request_headers(&self, last_event_id: Option<&str>) -> http::HeaderMap {
        let mut headers = self.config.headers.clone();
        headers.insert(
            http::header::ACCEPT,
            http::HeaderValue::from_static("text/event-stream"),
        );
        headers.insert(
            http::header::CACHE_CONTROL,
            http::HeaderValue::from_static("no-cache"),
        );

        if let Some(id) = last_event_id
            && let Ok(value) = http::HeaderValue::from_str(id)
        {
            headers.insert(
                http::header::HeaderName::from_static("last-event-id"),
                value,
            );
        }
        headers
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self, last_event_id: Option<&str>) -> StreamResult<EventStream> {
        let request = self
            .client
            .get(&self.config.url)
            .headers(self.request_headers(last_event_id));

        let resp = timeout(self.config.connect_timeout, request.send())
            .await
            .map_err(|_| StreamError::timeout(self.config.connect_timeout))??;

        let status = resp.status();
        if !status.is_success() {
            return Err(StreamError::invalid_status(status));
        }

        if let Some(ct) = resp.headers().get(http::header::CONTENT_TYPE) {
            let ct_str = ct.to_str().unwrap_or("");
            if !ct_str.contains("text/event-stream") {
                return Err(StreamError::invalid_content_type(ct_str));
            }
        }

        debug!(url = %self.config.url, status = %status, "Event stream response accepted");
        Ok(Box::pin(event_stream(resp.bytes_stream(), StreamError::Http)))
    }
}
