//! Shared helpers for driving a watchdog machine directly in tests.
//!
//! The machine is dispatched by the test itself instead of a spawned actor
//! task: timer and probe events land in a receiver the test owns, so every
//! delivery is explicit and the paused tokio clock fast-forwards the delays.

use std::sync::Arc;
use tokio::sync::mpsc;

use monitor::event::Event;
use monitor::fsm::{EventSender, State, StateMachine};
use monitor::traits::{MockAlerter, MockControlChannel, MockProcessControl, MockProber};
use monitor::watchdog::{WatchContext, WatchKind, WatchMachine};
use shared::Participant;

pub struct Harness {
    pub ctx: WatchContext,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl Harness {
    pub fn new(
        process: MockProcessControl,
        control: MockControlChannel,
        prober: MockProber,
        alerter: MockAlerter,
    ) -> Harness {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = WatchContext {
            participant: Participant::Http,
            process: Arc::new(process),
            control: Arc::new(control),
            prober: Arc::new(prober),
            alerter: Arc::new(alerter),
            events: EventSender::new(tx),
        };
        Harness { ctx, rx }
    }

    pub async fn start(
        &mut self,
        initial: Box<dyn State<WatchContext, WatchKind, Event>>,
    ) -> WatchMachine {
        StateMachine::start(
            "test-watchdog",
            vec![WatchKind::Dead, WatchKind::Alive, WatchKind::Restarting, WatchKind::Error],
            initial,
            &mut self.ctx,
        )
        .await
        .expect("machine should start")
    }

    /// Next self-event produced by a timer or background task. Under a
    /// paused clock this fast-forwards to the timer's deadline.
    pub async fn next_event(&mut self) -> Event {
        self.rx.recv().await.expect("event channel closed")
    }
}
