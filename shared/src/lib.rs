//! Shared plumbing for the blog monitor system
//!
//! Contains only the pieces that are meaningful on both sides of the
//! inter-process boundary: participant identity, the wire protocol, the
//! datagram message bus, and logging utilities. Everything specific to the
//! monitor's control logic lives in the `monitor` crate.

pub mod bus;
pub mod errors;
pub mod logging;
pub mod types;
pub mod wire;

pub use bus::{BusConfig, MessageBus, MsgAction};
pub use errors::{BusError, ProtocolError};
pub use logging::{log_error, log_shutdown, log_startup, log_success};
pub use types::Participant;
pub use wire::{Message, MsgType, Payload, SequenceData, MAX_DATAGRAM_BYTES};
