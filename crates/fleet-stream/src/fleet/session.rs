//! One transport connection attempt.
//!
//! A [`StreamSession`] runs on its own task. It connects, routes each event to
//! the codec, and reports everything to the controller as [`SessionReport`]s.
//! A transport failure ends the session: the connection is dropped first and
//! the failure reported after, so the controller never sees two live
//! connections.

use std::{fmt, sync::Arc};

use futures_util::StreamExt;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, warn};

use super::{
    codec::{self, DecodeError, Snapshot},
    config::StreamConfig,
};
use crate::{
    error::{StreamError, StreamResult},
    sse::SseEvent,
    transport::{EventStream, Transport},
};

/// Identifies a session within one controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub(crate) u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a session observed.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// The transport connection is established.
    Opened,
    /// A snapshot event decoded successfully.
    Snapshot(Snapshot),
    /// A snapshot event failed to decode. Non-fatal.
    DecodeFailed(DecodeError),
    /// The producer sent an error event. Non-fatal.
    ServerError(String),
    /// The connection failed or was lost. The session has ended.
    TransportFailed(String),
}

/// A [`SessionEvent`] tagged with its origin.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionReport {
    pub session: SessionId,
    /// SSE id of the event that produced this report, if the stream assigns ids.
    pub event_id: Option<String>,
    pub event: SessionEvent,
}

/// Owner of one connection attempt.
///
/// Dropping the session signals its task to stop; [`close`](Self::close)
/// additionally waits until the connection has been released.
pub struct StreamSession {
    id: SessionId,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl StreamSession {
    /// Spawn a session task that connects through `transport`.
    pub(crate) fn open(
        id: SessionId,
        transport: Arc<dyn Transport>,
        config: Arc<StreamConfig>,
        last_event_id: Option<String>,
        reports: mpsc::Sender<SessionReport>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_session(
            id,
            transport,
            config,
            last_event_id,
            reports,
            shutdown_rx,
        ));

        Self {
            id,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns `true` once [`close`](Self::close) has completed.
    pub fn is_closed(&self) -> bool {
        self.task.is_none()
    }

    /// Stop the session and wait for its connection to be dropped.
    ///
    /// Idempotent.
    pub async fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
            && err.is_panic()
        {
            warn!(session = %self.id, "Session task panicked");
        }
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct Reporter {
    session: SessionId,
    reports: mpsc::Sender<SessionReport>,
    shutdown: oneshot::Receiver<()>,
}

impl Reporter {
    /// Deliver a report. Returns `false` if the session should stop, either
    /// because shutdown was requested or the controller is gone.
    async fn send(&mut self, event_id: Option<String>, event: SessionEvent) -> bool {
        let report = SessionReport {
            session: self.session,
            event_id,
            event,
        };
        tokio::select! {
            biased;
            _ = &mut self.shutdown => false,
            sent = self.reports.send(report) => sent.is_ok(),
        }
    }
}

async fn run_session(
    id: SessionId,
    transport: Arc<dyn Transport>,
    config: Arc<StreamConfig>,
    last_event_id: Option<String>,
    reports: mpsc::Sender<SessionReport>,
    shutdown: oneshot::Receiver<()>,
) {
    let mut reporter = Reporter {
        session: id,
        reports,
        shutdown,
    };

    let connected = tokio::select! {
        biased;
        _ = &mut reporter.shutdown => return,
        result = transport.connect(last_event_id.as_deref()) => result,
    };

    let mut events = match connected {
        Ok(events) => events,
        Err(err) => {
            reporter
                .send(None, SessionEvent::TransportFailed(err.to_string()))
                .await;
            return;
        }
    };

    if !reporter.send(None, SessionEvent::Opened).await {
        return;
    }

    loop {
        let item = tokio::select! {
            biased;
            _ = &mut reporter.shutdown => return,
            item = next_event(&mut events, &config) => item,
        };

        let failure = match item {
            Some(Ok(event)) => {
                let event_id = event.id().map(str::to_string);
                if let Some(routed) = route_event(&config, event)
                    && !reporter.send(event_id, routed).await
                {
                    return;
                }
                continue;
            }
            Some(Err(err)) => err,
            None => StreamError::StreamEnded,
        };

        // Release the connection before the controller hears about it.
        drop(events);
        reporter
            .send(None, SessionEvent::TransportFailed(failure.to_string()))
            .await;
        return;
    }
}

async fn next_event(
    events: &mut EventStream,
    config: &StreamConfig,
) -> Option<StreamResult<SseEvent>> {
    match config.idle_timeout {
        Some(idle) => match timeout(idle, events.next()).await {
            Ok(item) => item,
            Err(_) => Some(Err(StreamError::idle(idle))),
        },
        None => events.next().await,
    }
}

fn route_event(config: &StreamConfig, event: SseEvent) -> Option<SessionEvent> {
    if event.event == config.snapshot_event {
        return Some(match codec::decode(&event.data) {
            Ok(snapshot) => SessionEvent::Snapshot(snapshot),
            Err(err) => SessionEvent::DecodeFailed(err),
        });
    }
    if event.event == config.error_event {
        return Some(SessionEvent::ServerError(codec::server_error_message(
            &event.data,
        )));
    }

    debug!(event_type = %event.event, "Ignoring unrecognised event");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StreamConfig {
        StreamConfig::new("http://127.0.0.1:1/stream")
    }

    #[test]
    fn test_route_snapshot_event() {
        let event = SseEvent::new(
            "fleet-health",
            r#"{"fleetHealthScore":50,"totalAircraft":4,"availableAircraft":2,"overdueMaintenanceCount":0,"openWorkOrders":1,"urgentWorkOrders":0,"alertsLast24h":0,"aiDecisionsLast7d":3,"timestamp":"2026-02-08T10:00:00Z"}"#,
        );
        match route_event(&config(), event) {
            Some(SessionEvent::Snapshot(snapshot)) => assert_eq!(snapshot.total_aircraft, 4),
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn test_route_bad_snapshot_is_decode_failure() {
        let event = SseEvent::new("fleet-health", "{}");
        assert!(matches!(
            route_event(&config(), event),
            Some(SessionEvent::DecodeFailed(DecodeError::Malformed { .. }))
        ));
    }

    #[test]
    fn test_route_server_error() {
        let event = SseEvent::new("error", r#"{"message":"db down"}"#);
        assert_eq!(
            route_event(&config(), event),
            Some(SessionEvent::ServerError("db down".to_string()))
        );
    }

    #[test]
    fn test_route_ignores_other_events() {
        assert_eq!(route_event(&config(), SseEvent::new("message", "hi")), None);
        assert_eq!(route_event(&config(), SseEvent::new("ping", "1")), None);
    }

    #[test]
    fn test_route_uses_configured_names() {
        let config = config().snapshot_event("health").error_event("oops");
        assert_eq!(
            route_event(&config, SseEvent::new("oops", "busy")),
            Some(SessionEvent::ServerError("busy".to_string()))
        );
        assert_eq!(route_event(&config, SseEvent::new("error", "busy")), None);
    }

    #[test]
    fn test_session_id_display() {
        assert_eq!(SessionId(3).to_string(), "#3");
    }
}
