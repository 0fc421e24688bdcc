//! Production implementations of the collaborator traits.

pub mod bus_channel;
pub mod mail;
pub mod probe;
pub mod process;

pub use bus_channel::BusChannel;
pub use mail::{MailMessage, MailPortal};
pub use probe::HttpProber;
pub use process::MonitoredProcess;
