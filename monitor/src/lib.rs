//! Monitor library: keeps a set of worker processes alive.
//!
//! Each worker is spawned as a child process, watched over a datagram
//! control bus and an active HTTP probe, and restarted when it stops
//! responding. All side effects sit behind injectable traits so the state
//! machines are fully testable with mocks.

pub mod config;
pub mod error;
pub mod event;
pub mod fsm;
pub mod services;
pub mod supervisor;
pub mod traits;
pub mod watchdog;

// Re-export commonly used types
pub use config::{MailConfig, MonitorConfig, WorkerSpec};
pub use error::{MonitorError, MonitorResult};
pub use event::{Event, EventKind};
pub use supervisor::Supervisor;
pub use traits::{Alerter, ControlChannel, MailGateway, ProcessControl, Prober};
pub use watchdog::{WatchContext, WatchKind, Watchdog};
