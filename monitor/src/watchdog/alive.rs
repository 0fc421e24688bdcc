//! Alive state: periodic active probing of the worker's endpoint.
//!
//! A background task sleeps, runs the probe, and reports the outcome back as
//! an event. A success resets the failure count and slows the cadence; a
//! failure speeds it up, and three failures in a row trigger a restart.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::event::{Event, EventKind};
use crate::fsm::Reaction;
use crate::watchdog::{RestartingState, WatchContext, WatchKind, WatchReaction};
use shared::{process_info, process_warn};

const FIRST_PROBE_DELAY: Duration = Duration::from_secs(5);
const PROBE_INTERVAL_HEALTHY: Duration = Duration::from_secs(15);
const PROBE_INTERVAL_SUSPECT: Duration = Duration::from_secs(5);
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

pub struct AliveState {
    consecutive_failures: u32,
    probe: Option<JoinHandle<()>>,
}

impl AliveState {
    pub fn new() -> AliveState {
        AliveState { consecutive_failures: 0, probe: None }
    }

    fn schedule_probe(&mut self, ctx: &mut WatchContext, delay: Duration) {
        if let Some(old) = self.probe.take() {
            old.abort();
        }
        let prober = Arc::clone(&ctx.prober);
        let events = ctx.events.clone();
        self.probe = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let kind = if prober.check().await {
                EventKind::WebTestSuccess
            } else {
                EventKind::WebTestFailure
            };
            events.fire(Event::new(kind));
        }));
    }
}

#[async_trait]
impl crate::fsm::State<WatchContext, WatchKind, Event> for AliveState {
    fn kind(&self) -> WatchKind {
        WatchKind::Alive
    }

    async fn handle(&mut self, ctx: &mut WatchContext, event: &Event) -> WatchReaction {
        match event.kind {
            EventKind::WebTestSuccess => {
                self.consecutive_failures = 0;
                self.schedule_probe(ctx, PROBE_INTERVAL_HEALTHY);
                Reaction::Handled
            }
            EventKind::WebTestFailure => {
                self.consecutive_failures += 1;
                process_warn!(
                    ctx.participant,
                    "probe failed ({}/{})",
                    self.consecutive_failures,
                    MAX_CONSECUTIVE_FAILURES
                );
                if self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    Reaction::TransitionThen(
                        Box::new(RestartingState::new()),
                        Event::new(EventKind::Initialize),
                    )
                } else {
                    self.schedule_probe(ctx, PROBE_INTERVAL_SUSPECT);
                    Reaction::Handled
                }
            }
            EventKind::Restart => {
                process_info!(ctx.participant, "restart requested");
                Reaction::TransitionThen(
                    Box::new(RestartingState::new()),
                    Event::new(EventKind::Initialize),
                )
            }
            // routine heartbeats and leftover startup timers
            EventKind::Alive
            | EventKind::WebAlive
            | EventKind::IsAliveCheck
            | EventKind::IsWebAliveCheck => Reaction::Handled,
            _ => Reaction::Unhandled,
        }
    }

    async fn on_enter(&mut self, ctx: &mut WatchContext) {
        self.schedule_probe(ctx, FIRST_PROBE_DELAY);
    }

    async fn on_leave(&mut self, _ctx: &mut WatchContext) {
        if let Some(probe) = self.probe.take() {
            probe.abort();
        }
    }
}
