//! Participant identity for the monitor system
//!
//! A participant is a logical peer, identified independently of whatever
//! transient network address it is currently bound to. The message bus maps
//! addresses to participants on the way in and participants to addresses on
//! the way out.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Global participant identity - set once at startup
static PARTICIPANT: OnceLock<Participant> = OnceLock::new();

/// Logical peer identity for every process in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Participant {
    /// The supervisor process itself
    Monitor,
    /// The monitored HTTP server worker
    Http,
    /// The monitored HTTPS server worker
    Https,
}

impl Participant {
    /// Initialize the global identity for the monitor process
    pub fn init_monitor() -> &'static Participant {
        PARTICIPANT.get_or_init(|| Participant::Monitor)
    }

    /// Initialize the global identity for a worker process
    pub fn init_worker(worker: Participant) -> &'static Participant {
        PARTICIPANT.get_or_init(|| worker)
    }

    /// Get the global identity (must be initialized first)
    pub fn current() -> &'static Participant {
        PARTICIPANT.get().expect("Participant not initialized - call init_* first")
    }

    /// The two monitored worker participants
    pub fn workers() -> [Participant; 2] {
        [Participant::Http, Participant::Https]
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Participant::Monitor => write!(f, "monitor"),
            Participant::Http => write!(f, "http"),
            Participant::Https => write!(f, "https"),
        }
    }
}

impl std::str::FromStr for Participant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "monitor" => Ok(Participant::Monitor),
            "http" => Ok(Participant::Http),
            "https" => Ok(Participant::Https),
            _ => Err(format!("Unknown participant: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_participant_display_roundtrip() {
        for p in [Participant::Monitor, Participant::Http, Participant::Https] {
            assert_eq!(Participant::from_str(&p.to_string()).unwrap(), p);
        }
        assert!(Participant::from_str("redirector").is_err());
    }
}
