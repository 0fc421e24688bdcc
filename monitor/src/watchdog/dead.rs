//! Dead state: spawn the worker and shepherd it through startup.
//!
//! On Initialize the process is spawned and given a fixed window to send its
//! heartbeat over the bus. Once it has, it is told to open its public
//! endpoint and given the same window to acknowledge that. An ack arriving
//! early cancels the window and advances the evaluation immediately; a
//! window expiring without its ack is unrecoverable.

use async_trait::async_trait;
use std::time::Duration;

use crate::event::{Event, EventKind};
use crate::fsm::{Reaction, TimerHandle};
use crate::watchdog::{AliveState, ErrorState, WatchContext, WatchKind, WatchReaction};
use shared::{process_info, process_warn, Message};

/// How long the worker has to acknowledge each startup step.
const STARTUP_ACK_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DeadState {
    got_alive: bool,
    got_web_alive: bool,
    /// Whether the heartbeat evaluation already passed and StartWeb went out.
    web_phase: bool,
    alive_check: Option<TimerHandle>,
    web_alive_check: Option<TimerHandle>,
}

impl DeadState {
    pub fn new() -> DeadState {
        DeadState {
            got_alive: false,
            got_web_alive: false,
            web_phase: false,
            alive_check: None,
            web_alive_check: None,
        }
    }

    async fn initialize(&mut self, ctx: &mut WatchContext) -> WatchReaction {
        if let Err(e) = ctx.process.run().await {
            process_warn!(ctx.participant, "spawn failed: {}", e);
            return Reaction::Transition(Box::new(ErrorState::new()));
        }
        process_info!(ctx.participant, "worker spawned, waiting for heartbeat");
        self.alive_check = Some(
            ctx.events
                .delayed(STARTUP_ACK_TIMEOUT, Event::new(EventKind::IsAliveCheck)),
        );
        Reaction::Handled
    }

    async fn evaluate_alive(&mut self, ctx: &mut WatchContext) -> WatchReaction {
        if self.web_phase {
            // cancelled check timer fired anyway
            return Reaction::Handled;
        }
        if !ctx.process.is_alive().await {
            process_warn!(ctx.participant, "worker exited during startup");
            return Reaction::Transition(Box::new(ErrorState::new()));
        }
        if !self.got_alive {
            process_warn!(ctx.participant, "no heartbeat within startup window");
            return Reaction::Transition(Box::new(ErrorState::new()));
        }

        self.web_phase = true;
        if let Err(e) = ctx
            .control
            .send_control(&Message::start_web(), ctx.participant)
            .await
        {
            // stay put; the web-alive window will expire and surface the fault
            process_warn!(ctx.participant, "StartWeb send failed: {}", e);
        }
        if self.got_web_alive {
            return self.evaluate_web_alive(ctx).await;
        }
        self.web_alive_check = Some(
            ctx.events
                .delayed(STARTUP_ACK_TIMEOUT, Event::new(EventKind::IsWebAliveCheck)),
        );
        Reaction::Handled
    }

    async fn evaluate_web_alive(&mut self, ctx: &mut WatchContext) -> WatchReaction {
        if !self.web_phase {
            return Reaction::Handled;
        }
        if !self.got_web_alive {
            process_warn!(ctx.participant, "endpoint not up within startup window");
            return Reaction::Transition(Box::new(ErrorState::new()));
        }

        process_info!(ctx.participant, "worker is up and serving");
        ctx.alerter
            .notify(
                &format!("{} started", ctx.participant),
                "Thought you might like to know.",
            )
            .await;
        Reaction::Transition(Box::new(AliveState::new()))
    }

    fn cancel_alive_check(&mut self) {
        if let Some(timer) = self.alive_check.take() {
            timer.cancel();
        }
    }

    fn cancel_web_alive_check(&mut self) {
        if let Some(timer) = self.web_alive_check.take() {
            timer.cancel();
        }
    }
}

#[async_trait]
impl crate::fsm::State<WatchContext, WatchKind, Event> for DeadState {
    fn kind(&self) -> WatchKind {
        WatchKind::Dead
    }

    async fn handle(&mut self, ctx: &mut WatchContext, event: &Event) -> WatchReaction {
        match event.kind {
            EventKind::Initialize => self.initialize(ctx).await,
            EventKind::Alive => {
                self.got_alive = true;
                self.cancel_alive_check();
                if self.web_phase {
                    Reaction::Handled
                } else {
                    self.evaluate_alive(ctx).await
                }
            }
            EventKind::IsAliveCheck => self.evaluate_alive(ctx).await,
            EventKind::WebAlive => {
                self.got_web_alive = true;
                self.cancel_web_alive_check();
                if self.web_phase {
                    self.evaluate_web_alive(ctx).await
                } else {
                    Reaction::Handled
                }
            }
            EventKind::IsWebAliveCheck => self.evaluate_web_alive(ctx).await,
            // probe results and exit notices from a previous residency
            EventKind::WebTestSuccess | EventKind::WebTestFailure | EventKind::ProcessDead => {
                Reaction::Handled
            }
            _ => Reaction::Unhandled,
        }
    }

    async fn on_leave(&mut self, _ctx: &mut WatchContext) {
        self.cancel_alive_check();
        self.cancel_web_alive_check();
    }
}
