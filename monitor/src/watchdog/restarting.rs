//! Restarting state: take the worker down, then hand back to Dead.
//!
//! Stopping is initiated immediately; a background waiter reports the actual
//! exit as an event so the actor loop is never blocked on a dying process.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::event::{Event, EventKind};
use crate::fsm::Reaction;
use crate::watchdog::{DeadState, WatchContext, WatchKind, WatchReaction};
use shared::process_info;

pub struct RestartingState {
    waiter: Option<JoinHandle<()>>,
}

impl RestartingState {
    pub fn new() -> RestartingState {
        RestartingState { waiter: None }
    }
}

#[async_trait]
impl crate::fsm::State<WatchContext, WatchKind, Event> for RestartingState {
    fn kind(&self) -> WatchKind {
        WatchKind::Restarting
    }

    async fn handle(&mut self, ctx: &mut WatchContext, event: &Event) -> WatchReaction {
        match event.kind {
            EventKind::Initialize => {
                process_info!(ctx.participant, "stopping worker for restart");
                ctx.process.stop().await;

                let process = Arc::clone(&ctx.process);
                let events = ctx.events.clone();
                self.waiter = Some(tokio::spawn(async move {
                    process.wait_for_exit().await;
                    events.fire(Event::new(EventKind::ProcessDead));
                }));
                Reaction::Handled
            }
            EventKind::ProcessDead => {
                process_info!(ctx.participant, "worker is down, starting it again");
                Reaction::TransitionThen(
                    Box::new(DeadState::new()),
                    Event::new(EventKind::Initialize),
                )
            }
            // a restart is already underway; late probe results and
            // heartbeats from the dying process carry no information
            EventKind::Restart
            | EventKind::Alive
            | EventKind::WebAlive
            | EventKind::IsAliveCheck
            | EventKind::IsWebAliveCheck
            | EventKind::WebTestSuccess
            | EventKind::WebTestFailure => Reaction::Handled,
            _ => Reaction::Unhandled,
        }
    }

    async fn on_leave(&mut self, _ctx: &mut WatchContext) {
        if let Some(waiter) = self.waiter.take() {
            waiter.abort();
        }
    }
}
