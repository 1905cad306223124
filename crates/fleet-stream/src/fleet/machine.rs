//! Controller transition table.
//!
//! [`StreamMachine`] holds the controller's state and maps each [`Input`] to a
//! list of [`Effect`]s without performing any I/O. The controller task feeds it
//! inputs one at a time and carries out the effects in order, which keeps every
//! transition testable without a transport or a clock.
//!
//! | State        | Input                    | Next state   | Effects                                  |
//! |--------------|--------------------------|--------------|------------------------------------------|
//! | any          | Start / Reconnect        | Connecting   | CancelRetry?, CloseSession?, OpenSession |
//! | Connecting   | Opened                   | Open         |                                          |
//! | any live     | Snapshot                 | Open         | (retries reset)                          |
//! | any live     | DecodeFailed/ServerError | unchanged    | (error published)                        |
//! | any live     | TransportFailed, budget  | Connecting   | CloseSession, ScheduleRetry              |
//! | any live     | TransportFailed, spent   | Error        | CloseSession                             |
//! | Connecting   | RetryElapsed             | Connecting   | OpenSession                              |
//! | any          | Teardown                 | Closed       | CancelRetry?, CloseSession?              |

use std::{sync::Arc, time::Duration};

use tracing::{error, info, warn};

use super::{
    session::{SessionEvent, SessionId, SessionReport},
    types::{ConnectionStatus, StreamFault, StreamFaultKind, StreamState},
};
use crate::backoff::{Backoff, BackoffPolicy};

/// Message published when the retry budget is spent.
pub const RETRIES_EXHAUSTED_MESSAGE: &str = "Lost connection — max retries exceeded.";

/// Something that happened to the controller.
#[derive(Clone, Debug, PartialEq)]
pub enum Input {
    /// First activation.
    Start,
    /// Consumer-issued reconnect.
    Reconnect,
    /// The backoff timer fired.
    RetryElapsed,
    /// A session reported something.
    Report(SessionReport),
    /// The consumer stopped observing.
    Teardown,
}

/// Work the controller must carry out, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Drop the pending backoff timer.
    CancelRetry,
    /// Close the live session and wait for its connection to be released.
    CloseSession,
    /// Start a new session with this id.
    OpenSession(SessionId),
    /// Arm the backoff timer.
    ScheduleRetry(Duration),
}

/// The controller's state and transition logic.
#[derive(Debug)]
pub struct StreamMachine {
    policy: BackoffPolicy,
    state: StreamState,
    live: Option<SessionId>,
    next_session: u64,
    retry_pending: bool,
    torn_down: bool,
    last_event_id: Option<String>,
}

impl StreamMachine {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            state: StreamState::default(),
            live: None,
            next_session: 0,
            retry_pending: false,
            torn_down: false,
            last_event_id: None,
        }
    }

    /// The projection to publish.
    pub fn state(&self) -> &StreamState {
        &self.state
    }

    /// The session whose reports are currently accepted.
    pub fn live_session(&self) -> Option<SessionId> {
        self.live
    }

    /// Whether a backoff timer is armed.
    pub fn retry_pending(&self) -> bool {
        self.retry_pending
    }

    /// The last SSE id received, for resuming.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Whether [`Input::Teardown`] has been applied.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Apply one input.
    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        if self.torn_down {
            return Vec::new();
        }

        match input {
            Input::Start | Input::Reconnect => self.restart(),
            Input::RetryElapsed => self.retry_elapsed(),
            Input::Report(report) => self.report(report),
            Input::Teardown => self.teardown(),
        }
    }

    fn restart(&mut self) -> Vec<Effect> {
        let mut effects = self.release();
        self.state.retries = 0;
        effects.push(self.open_session());
        effects
    }

    fn retry_elapsed(&mut self) -> Vec<Effect> {
        if !self.retry_pending {
            return Vec::new();
        }
        self.retry_pending = false;
        vec![self.open_session()]
    }

    fn report(&mut self, report: SessionReport) -> Vec<Effect> {
        if self.live != Some(report.session) {
            return Vec::new();
        }
        if report.event_id.is_some() {
            self.last_event_id = report.event_id;
        }

        match report.event {
            SessionEvent::Opened => {
                info!(session = %report.session, "Fleet stream open");
                self.state.status = ConnectionStatus::Open;
                Vec::new()
            }
            SessionEvent::Snapshot(snapshot) => {
                for warning in snapshot.cross_field_warnings() {
                    warn!(session = %report.session, %warning, "Inconsistent fleet snapshot");
                }
                self.state.snapshot = Some(Arc::new(snapshot));
                self.state.retries = 0;
                self.state.status = ConnectionStatus::Open;
                Vec::new()
            }
            SessionEvent::DecodeFailed(err) => {
                warn!(session = %report.session, error = %err, "Dropping undecodable snapshot");
                self.state.last_error =
                    Some(StreamFault::new(StreamFaultKind::PayloadDecode, err.to_string()));
                Vec::new()
            }
            SessionEvent::ServerError(message) => {
                warn!(session = %report.session, %message, "Producer reported an error");
                self.state.last_error =
                    Some(StreamFault::new(StreamFaultKind::ServerReported, message));
                Vec::new()
            }
            SessionEvent::TransportFailed(message) => self.transport_failed(report.session, message),
        }
    }

    fn transport_failed(&mut self, session: SessionId, message: String) -> Vec<Effect> {
        self.live = None;
        let mut effects = vec![Effect::CloseSession];

        match self.policy.delay_for(self.state.retries) {
            Backoff::Delay(delay) => {
                self.state.retries = self.state.retries.saturating_add(1);
                warn!(
                    %session,
                    attempt = self.state.retries,
                    delay_ms = millis(delay),
                    error = %message,
                    "Fleet stream reconnecting after backoff"
                );
                self.state.status = ConnectionStatus::Connecting;
                self.state.last_error =
                    Some(StreamFault::new(StreamFaultKind::TransportFailure, message));
                self.retry_pending = true;
                effects.push(Effect::ScheduleRetry(delay));
            }
            Backoff::GiveUp => {
                error!(
                    %session,
                    attempts = self.state.retries,
                    error = %message,
                    "Max fleet stream reconnect attempts exceeded"
                );
                self.state.status = ConnectionStatus::Error;
                self.state.last_error = Some(StreamFault::new(
                    StreamFaultKind::RetriesExhausted,
                    RETRIES_EXHAUSTED_MESSAGE,
                ));
            }
        }
        effects
    }

    fn teardown(&mut self) -> Vec<Effect> {
        let effects = self.release();
        self.state.status = ConnectionStatus::Closed;
        self.torn_down = true;
        effects
    }

    /// Cancel any pending retry and close any live session.
    fn release(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.retry_pending {
            self.retry_pending = false;
            effects.push(Effect::CancelRetry);
        }
        if self.live.take().is_some() {
            effects.push(Effect::CloseSession);
        }
        effects
    }

    fn open_session(&mut self) -> Effect {
        self.next_session += 1;
        let id = SessionId(self.next_session);
        self.live = Some(id);
        self.state.status = ConnectionStatus::Connecting;
        Effect::OpenSession(id)
    }
}

/// Whole milliseconds for logging, saturating at `u64::MAX`.
fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}
