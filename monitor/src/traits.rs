//! Trait definitions with mockall annotations for testing
//!
//! Every side-effecting collaborator a watchdog touches is behind one of
//! these traits, so state behaviour can be driven entirely by mocks. The
//! production implementations live in the services module.

use crate::error::MonitorResult;
use crate::services::mail::MailMessage;
use shared::{Message, Participant};

/// Lifecycle control of one monitored child process.
#[mockall::automock]
#[async_trait::async_trait]
pub trait ProcessControl: Send + Sync {
    /// Whether the child is currently running.
    async fn is_alive(&self) -> bool;

    /// Spawn the child. Fails if it is already running or cannot be started.
    async fn run(&self) -> MonitorResult<()>;

    /// Kill the child and wait for it to exit. No-op if it is not running.
    async fn stop(&self);

    /// Block until the child has exited.
    async fn wait_for_exit(&self);
}

/// Outbound control-message channel to the worker processes.
#[mockall::automock]
#[async_trait::async_trait]
pub trait ControlChannel: Send + Sync {
    async fn send_control(&self, message: &Message, to: Participant) -> MonitorResult<()>;

    async fn shutdown(&self);
}

/// A single pass/fail health probe against a worker's public endpoint.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    async fn check(&self) -> bool;
}

/// Operator notification sink.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Alerter: Send + Sync {
    async fn notify(&self, subject: &str, body: &str);
}

/// Mailbox transport used by the mail command portal.
#[mockall::automock]
#[async_trait::async_trait]
pub trait MailGateway: Send + Sync {
    /// Fetch and consume all unread messages.
    async fn fetch(&self) -> MonitorResult<Vec<MailMessage>>;

    async fn send(&self, message: MailMessage) -> MonitorResult<()>;
}
