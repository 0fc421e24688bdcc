//! Per-worker watchdog
//!
//! Each monitored worker gets one watchdog: an actor task that exclusively
//! owns that worker's state machine and drains its event channel, so all
//! event handling for one worker is serialized. Current state is published
//! through a watch channel for the supervisor and for tests.
//!
//! The lifecycle is Dead -> Alive -> Restarting -> Dead, with Error as the
//! terminal state for anything unrecoverable.

mod alive;
mod dead;
mod error;
mod restarting;

pub use alive::AliveState;
pub use dead::DeadState;
pub use error::ErrorState;
pub use restarting::RestartingState;

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::event::Event;
use crate::fsm::{EventSender, Reaction, StateMachine};
use crate::traits::{Alerter, ControlChannel, ProcessControl, Prober};
use shared::{process_error, Participant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    Dead,
    Alive,
    Restarting,
    Error,
}

/// Everything a state may touch while handling an event.
pub struct WatchContext {
    pub participant: Participant,
    pub process: Arc<dyn ProcessControl>,
    pub control: Arc<dyn ControlChannel>,
    pub prober: Arc<dyn Prober>,
    pub alerter: Arc<dyn Alerter>,
    /// Loops events (timers, probe results) back into this watchdog.
    pub events: EventSender<Event>,
}

pub type WatchMachine = StateMachine<WatchContext, WatchKind, Event>;
pub type WatchReaction = Reaction<WatchContext, WatchKind, Event>;

fn allowed_states() -> Vec<WatchKind> {
    vec![WatchKind::Dead, WatchKind::Alive, WatchKind::Restarting, WatchKind::Error]
}

/// Running watchdog actor for one worker.
pub struct Watchdog {
    events: EventSender<Event>,
    state_rx: watch::Receiver<WatchKind>,
    task: JoinHandle<()>,
}

impl Watchdog {
    pub fn spawn(
        participant: Participant,
        process: Arc<dyn ProcessControl>,
        control: Arc<dyn ControlChannel>,
        prober: Arc<dyn Prober>,
        alerter: Arc<dyn Alerter>,
    ) -> Watchdog {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let events = EventSender::new(event_tx);
        let (state_tx, state_rx) = watch::channel(WatchKind::Dead);

        let mut ctx = WatchContext {
            participant,
            process,
            control,
            prober,
            alerter,
            events: events.clone(),
        };

        let task = tokio::spawn(async move {
            let mut machine = match StateMachine::start(
                format!("{participant}-watchdog"),
                allowed_states(),
                Box::new(DeadState::new()),
                &mut ctx,
            )
            .await
            {
                Ok(machine) => machine,
                Err(e) => {
                    process_error!(participant, "watchdog failed to start: {}", e);
                    return;
                }
            };

            while let Some(event) = event_rx.recv().await {
                if let Err(e) = machine.on(&mut ctx, event).await {
                    process_error!(participant, "watchdog event error: {}", e);
                }
                let _ = state_tx.send(machine.current_kind());
            }
        });

        Watchdog { events, state_rx, task }
    }

    /// Sender for delivering events to this watchdog.
    pub fn events(&self) -> EventSender<Event> {
        self.events.clone()
    }

    pub fn state(&self) -> WatchKind {
        *self.state_rx.borrow()
    }

    /// Watch channel carrying every published state change.
    pub fn state_watch(&self) -> watch::Receiver<WatchKind> {
        self.state_rx.clone()
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}
