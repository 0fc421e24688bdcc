//! Events driving the watchdog state machines
//!
//! Events are the only way to cause a state transition. They originate from
//! the message bus (heartbeats, readiness acks), delayed self-timers, active
//! probe outcomes, and the remote-control boundary.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Initialize,
    Alive,
    IsAliveCheck,
    WebAlive,
    IsWebAliveCheck,
    WebTestSuccess,
    WebTestFailure,
    Restart,
    ProcessDead,
    Shutdown,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A tagged event with a variable-length untyped data payload.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub data: Vec<serde_json::Value>,
}

impl Event {
    pub fn new(kind: EventKind) -> Event {
        Event { kind, data: Vec::new() }
    }

    pub fn with_data(kind: EventKind, data: Vec<serde_json::Value>) -> Event {
        Event { kind, data }
    }
}

impl From<EventKind> for Event {
    fn from(kind: EventKind) -> Event {
        Event::new(kind)
    }
}
