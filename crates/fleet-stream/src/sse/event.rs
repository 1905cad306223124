//! A single dispatched server-sent event.

/// Event type used when the server does not name one.
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// One event as dispatched by the
/// [event stream interpretation](https://html.spec.whatwg.org/multipage/server-sent-events.html#event-stream-interpretation)
/// rules.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// The event type (`"message"` when the server sent none).
    pub event: String,
    /// The data payload; multiple `data:` lines are joined with `\n`.
    pub data: String,
    /// The last event ID seen on the stream, empty if none.
    pub id: String,
}

impl SseEvent {
    /// Create an event from its parts.
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            id: String::new(),
        }
    }

    /// Attach an event ID.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// The event ID, or `None` when the stream has not assigned one.
    pub fn id(&self) -> Option<&str> {
        (!self.id.is_empty()).then_some(self.id.as_str())
    }
}
