//! Mail command portal
//!
//! Polls a mailbox for operator commands and answers them. Only mail from
//! the configured operator address is acted on; everything else is logged
//! and dropped. The portal doubles as the notification sink the watchdogs
//! use for "worker started" alerts.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::MailConfig;
use crate::event::{Event, EventKind};
use crate::fsm::EventSender;
use crate::traits::{Alerter, MailGateway};
use shared::Participant;

const HELP_TEXT: &str = "Available commands:\n\
    HELP - this text\n\
    PING - check that the monitor is responsive\n\
    RESTART HTTP|HTTPS - restart the named worker\n\
    SHUTDOWN - stop the monitor and all workers";

/// One mailbox message, as the portal sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct MailMessage {
    pub from: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    pub fn reply_to(original: &MailMessage, subject: impl Into<String>, body: impl Into<String>) -> MailMessage {
        MailMessage {
            from: String::new(),
            recipients: vec![original.from.clone()],
            subject: subject.into(),
            body: body.into(),
        }
    }
}

pub struct MailPortal {
    gateway: Arc<dyn MailGateway>,
    config: MailConfig,
    watchdog_events: HashMap<Participant, EventSender<Event>>,
    shutdown: tokio::sync::mpsc::Sender<()>,
}

impl MailPortal {
    pub fn new(
        gateway: Arc<dyn MailGateway>,
        config: MailConfig,
        watchdog_events: HashMap<Participant, EventSender<Event>>,
        shutdown: tokio::sync::mpsc::Sender<()>,
    ) -> MailPortal {
        MailPortal { gateway, config, watchdog_events, shutdown }
    }

    /// Start the polling loop. The returned handle stops the portal when
    /// aborted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let interval = Duration::from_secs(self.config.fetch_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.poll_once().await;
            }
        })
    }

    pub async fn poll_once(&self) {
        let messages = match self.gateway.fetch().await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("mail fetch failed: {e}");
                return;
            }
        };

        for message in messages {
            if !message
                .from
                .eq_ignore_ascii_case(&self.config.authorized_user)
            {
                warn!(from = %message.from, "ignoring mail from unauthorized sender");
                continue;
            }
            self.handle_command(&message).await;
        }
    }

    async fn handle_command(&self, message: &MailMessage) {
        let mut words = message.subject.split_whitespace();
        let command = words.next().unwrap_or("").to_uppercase();
        let argument = words.next().map(str::to_uppercase);

        info!(command = %command, "mail command received");
        match command.as_str() {
            "HELP" => {
                self.reply(message, "Monitor help", HELP_TEXT).await;
            }
            "PING" => {
                self.reply(message, "PONG", "The monitor is up.").await;
            }
            "RESTART" => match argument.as_deref().and_then(|a| a.parse::<Participant>().ok()) {
                Some(participant) => match self.watchdog_events.get(&participant) {
                    Some(events) => {
                        events.fire(Event::new(EventKind::Restart));
                        self.reply(
                            message,
                            format!("Restarting {participant}"),
                            format!("A restart of the {participant} worker has been requested."),
                        )
                        .await;
                    }
                    None => {
                        self.reply(
                            message,
                            "Unknown worker",
                            format!("No watchdog is registered for {participant}."),
                        )
                        .await;
                    }
                },
                None => {
                    self.reply(message, "RESTART needs a worker name", HELP_TEXT).await;
                }
            },
            "SHUTDOWN" => {
                self.reply(message, "Shutting down", "The monitor is shutting down.").await;
                if self.shutdown.send(()).await.is_err() {
                    warn!("shutdown requested by mail but supervisor is gone");
                }
            }
            other => {
                warn!(command = %other, "unrecognized mail command");
                self.reply(message, format!("Unknown command: {other}"), HELP_TEXT).await;
            }
        }
    }

    async fn reply(&self, original: &MailMessage, subject: impl Into<String>, body: impl Into<String>) {
        let mut reply = MailMessage::reply_to(original, subject, body);
        reply.from = self.config.user.clone();
        if let Err(e) = self.gateway.send(reply).await {
            warn!("failed to send mail reply: {e}");
        }
    }
}

#[async_trait]
impl Alerter for MailPortal {
    async fn notify(&self, subject: &str, body: &str) {
        let message = MailMessage {
            from: self.config.user.clone(),
            recipients: vec![self.config.authorized_user.clone()],
            subject: subject.to_string(),
            body: body.to_string(),
        };
        if let Err(e) = self.gateway.send(message).await {
            warn!("failed to send notification mail: {e}");
        }
    }
}

/// Alerter used when no mail account is configured.
pub struct LogAlerter;

#[async_trait]
impl Alerter for LogAlerter {
    async fn notify(&self, subject: &str, body: &str) {
        info!(subject = %subject, "{body}");
    }
}
