//! Controller task and its consumer handle.
//!
//! The controller owns every piece of mutable state: the machine, the live
//! session and the retry timer. It multiplexes handle commands, session
//! reports and the timer in one biased `select!`, so transitions are applied
//! one at a time. Observers read the published [`StreamState`] through a
//! watch channel.

use std::{future, pin::Pin, sync::Arc};

use tokio::{
    sync::{mpsc, watch},
    time::{Sleep, sleep},
};
use tracing::{debug, error, info};

use super::{
    codec::Snapshot,
    config::StreamConfig,
    machine::{Effect, Input, StreamMachine},
    session::{SessionEvent, SessionReport, StreamSession},
    types::{ConnectionStatus, StreamFault, StreamState},
};
use crate::{
    error::{StreamError, StreamResult},
    metrics::StreamMetrics,
    transport::{HttpTransport, Transport},
};

/// Commands sent from a [`StreamHandle`] to the controller task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlCommand {
    /// Drop the current session and backoff, and connect again now.
    Reconnect,
    /// Stop the controller.
    Close,
}

/// Background task that keeps one push connection alive.
pub struct StreamController {
    config: Arc<StreamConfig>,
    transport: Arc<dyn Transport>,
    machine: StreamMachine,
    session: Option<StreamSession>,
    retry: Option<Pin<Box<Sleep>>>,
    cmd_rx: mpsc::Receiver<ControlCommand>,
    report_tx: mpsc::Sender<SessionReport>,
    report_rx: mpsc::Receiver<SessionReport>,
    state_tx: watch::Sender<StreamState>,
    metrics: StreamMetrics,
}

impl StreamController {
    /// Start a controller that connects over HTTP.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn spawn(config: StreamConfig) -> StreamResult<StreamHandle> {
        config.validate().map_err(StreamError::config)?;
        let config = Arc::new(config);
        let transport = HttpTransport::new(Arc::clone(&config))?;
        Ok(Self::launch(config, Arc::new(transport)))
    }

    /// Start a controller that connects through `transport`.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn spawn_with_transport(
        config: StreamConfig,
        transport: impl Transport,
    ) -> StreamResult<StreamHandle> {
        config.validate().map_err(StreamError::config)?;
        Ok(Self::launch(Arc::new(config), Arc::new(transport)))
    }

    fn launch(config: Arc<StreamConfig>, transport: Arc<dyn Transport>) -> StreamHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_channel_capacity);
        let (report_tx, report_rx) = mpsc::channel(config.report_channel_capacity);
        let (state_tx, state_rx) = watch::channel(StreamState::default());

        let controller = Self {
            machine: StreamMachine::new(config.backoff),
            config,
            transport,
            session: None,
            retry: None,
            cmd_rx,
            report_tx,
            report_rx,
            state_tx,
            metrics: StreamMetrics::new(),
        };
        tokio::spawn(controller.run());

        StreamHandle { cmd_tx, state_rx }
    }

    async fn run(mut self) {
        info!(url = %self.config.url, "Fleet stream controller started");
        self.apply(Input::Start).await;

        while !self.machine.is_torn_down() {
            let input = tokio::select! {
                biased;

                cmd = self.cmd_rx.recv() => match cmd {
                    Some(ControlCommand::Reconnect) => {
                        info!(url = %self.config.url, "Fleet stream reconnect requested");
                        self.metrics.reconnects_requested.add(1, &[]);
                        Input::Reconnect
                    }
                    Some(ControlCommand::Close) => {
                        info!(url = %self.config.url, "Fleet stream closing (requested)");
                        Input::Teardown
                    }
                    None => {
                        info!(url = %self.config.url, "All stream handles dropped, shutting down");
                        Input::Teardown
                    }
                },

                Some(report) = self.report_rx.recv() => Input::Report(report),

                () = retry_elapsed(&mut self.retry) => {
                    self.retry = None;
                    Input::RetryElapsed
                }
            };

            self.apply(input).await;
        }

        info!(url = %self.config.url, "Fleet stream controller stopped");
    }

    /// Feed one input to the machine, carry out its effects, publish.
    async fn apply(&mut self, input: Input) {
        if let Input::Report(report) = &input
            && self.machine.live_session() == Some(report.session)
        {
            self.record(&report.event);
        }

        for effect in self.machine.handle(input) {
            match effect {
                Effect::CancelRetry => self.retry = None,
                Effect::CloseSession => {
                    if let Some(mut session) = self.session.take() {
                        session.close().await;
                        debug!(session = %session.id(), "Session closed");
                    }
                }
                Effect::OpenSession(id) => {
                    let last_event_id = if self.config.resume_with_last_event_id {
                        self.machine.last_event_id().map(str::to_string)
                    } else {
                        None
                    };
                    info!(
                        session = %id,
                        url = %self.config.url,
                        attempt = self.machine.state().retries,
                        "Fleet stream connecting"
                    );
                    self.metrics.sessions_opened.add(1, &[]);
                    self.session = Some(StreamSession::open(
                        id,
                        Arc::clone(&self.transport),
                        Arc::clone(&self.config),
                        last_event_id,
                        self.report_tx.clone(),
                    ));
                }
                Effect::ScheduleRetry(delay) => {
                    self.metrics.retries_scheduled.add(1, &[]);
                    self.retry = Some(Box::pin(sleep(delay)));
                }
            }
        }

        self.publish();
    }

    fn record(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Opened => {}
            SessionEvent::Snapshot(snapshot) => {
                debug!(
                    score = snapshot.fleet_health_score,
                    timestamp = %snapshot.timestamp,
                    "Fleet snapshot received"
                );
                self.metrics.snapshots_decoded.add(1, &[]);
            }
            SessionEvent::DecodeFailed(_) => self.metrics.decode_failures.add(1, &[]),
            SessionEvent::ServerError(_) => self.metrics.server_errors.add(1, &[]),
            SessionEvent::TransportFailed(message) => {
                error!(url = %self.config.url, error = %message, "Fleet stream connection failed");
                self.metrics.transport_failures.add(1, &[]);
            }
        }
    }

    fn publish(&self) {
        let next = self.machine.state();
        self.state_tx.send_if_modified(|current| {
            if current == next {
                return false;
            }
            *current = next.clone();
            true
        });
    }
}

async fn retry_elapsed(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(sleep) => sleep.as_mut().await,
        None => future::pending().await,
    }
}

/// Clone-able handle for observing and controlling a running controller.
///
/// The controller stops when [`close`](Self::close) is called or when every
/// handle has been dropped.
#[derive(Clone, Debug)]
pub struct StreamHandle {
    cmd_tx: mpsc::Sender<ControlCommand>,
    state_rx: watch::Receiver<StreamState>,
}

impl StreamHandle {
    /// The latest published state.
    pub fn state(&self) -> StreamState {
        self.state_rx.borrow().clone()
    }

    /// The latest decoded snapshot, if any has arrived.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.state_rx.borrow().snapshot.clone()
    }

    /// The current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.state_rx.borrow().status
    }

    /// The most recent error, if any has been published.
    pub fn last_error(&self) -> Option<StreamFault> {
        self.state_rx.borrow().last_error.clone()
    }

    /// A receiver notified after every state change.
    pub fn subscribe(&self) -> watch::Receiver<StreamState> {
        self.state_rx.clone()
    }

    /// Wait until the published state satisfies `predicate`.
    ///
    /// The current state is checked first.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::ControllerClosed`] if the controller stops
    /// before the predicate holds.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&StreamState) -> bool,
    ) -> StreamResult<StreamState> {
        let mut rx = self.state_rx.clone();
        let state = rx
            .wait_for(predicate)
            .await
            .map_err(|_| StreamError::ControllerClosed)?;
        Ok(state.clone())
    }

    /// Connect again immediately, cancelling any pending backoff and resetting
    /// the retry count. Works in every status, including after retries are
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller has already stopped.
    pub async fn reconnect(&self) -> StreamResult<()> {
        self.cmd_tx
            .send(ControlCommand::Reconnect)
            .await
            .map_err(|_| StreamError::ControllerClosed)
    }

    /// Stop the controller and wait until its connection has been released.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller has already stopped.
    pub async fn close(&self) -> StreamResult<()> {
        self.cmd_tx
            .send(ControlCommand::Close)
            .await
            .map_err(|_| StreamError::ControllerClosed)?;
        self.cmd_tx.closed().await;
        Ok(())
    }

    /// Whether the controller task is still running.
    pub fn is_running(&self) -> bool {
        !self.cmd_tx.is_closed()
    }
}
