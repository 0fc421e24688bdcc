//! Supervisor: owns the watchdogs and runs the shutdown sequence.
//!
//! The supervisor itself stays out of the per-worker lifecycle; it only
//! starts the watchdogs, routes bus messages to them, and tears everything
//! down in order when a shutdown is requested.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::event::{Event, EventKind};
use crate::fsm::EventSender;
use crate::traits::{ControlChannel, ProcessControl};
use crate::watchdog::Watchdog;
use shared::{log_shutdown, Message, MsgAction, MsgType, Participant, Payload};

/// Grace period between the Shutdown broadcast and force-stopping workers.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

pub struct Supervisor {
    control: Arc<dyn ControlChannel>,
    processes: HashMap<Participant, Arc<dyn ProcessControl>>,
    watchdogs: HashMap<Participant, Watchdog>,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl Supervisor {
    pub fn new(control: Arc<dyn ControlChannel>) -> Supervisor {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        Supervisor {
            control,
            processes: HashMap::new(),
            watchdogs: HashMap::new(),
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn register_worker(
        &mut self,
        participant: Participant,
        process: Arc<dyn ProcessControl>,
        watchdog: Watchdog,
    ) {
        self.processes.insert(participant, process);
        self.watchdogs.insert(participant, watchdog);
    }

    /// Cloneable trigger for the shutdown sequence (ctrl-c handler, mail
    /// portal).
    pub fn shutdown_sender(&self) -> mpsc::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub fn watchdog_events(&self) -> HashMap<Participant, EventSender<Event>> {
        self.watchdogs
            .iter()
            .map(|(participant, watchdog)| (*participant, watchdog.events()))
            .collect()
    }

    /// Kick every watchdog out of its initial idle Dead state.
    pub fn start_all(&self) {
        for (participant, watchdog) in &self.watchdogs {
            info!(worker = %participant, "starting watchdog");
            watchdog.events().fire(Event::new(EventKind::Initialize));
        }
    }

    /// Block until a shutdown is requested, then tear everything down.
    pub async fn run(mut self) {
        self.shutdown_rx.recv().await;
        self.shutdown().await;
    }

    async fn shutdown(&self) {
        log_shutdown(&Participant::Monitor, "shutdown requested");

        for participant in self.processes.keys() {
            if let Err(e) = self
                .control
                .send_control(&Message::shutdown(), *participant)
                .await
            {
                warn!(worker = %participant, "Shutdown send failed: {e}");
            }
        }

        // watchdogs must not fight the shutdown by restarting workers
        for watchdog in self.watchdogs.values() {
            watchdog.abort();
        }

        tokio::time::sleep(SHUTDOWN_GRACE).await;

        for (participant, process) in &self.processes {
            if process.is_alive().await {
                warn!(worker = %participant, "worker still up after grace period, killing it");
                process.stop().await;
            }
        }

        self.control.shutdown().await;
        log_shutdown(&Participant::Monitor, "shutdown complete");
    }
}

/// Bus dispatch table: routes worker messages to the owning watchdog.
pub fn message_actions(
    watchdog_events: HashMap<Participant, EventSender<Event>>,
) -> HashMap<MsgType, MsgAction> {
    let mut actions: HashMap<MsgType, MsgAction> = HashMap::new();

    let for_alive = watchdog_events.clone();
    actions.insert(
        MsgType::ProcessAlive,
        Arc::new(move |from: Participant, payload: Option<Payload>| {
            if let Some(events) = for_alive.get(&from) {
                let data = match payload {
                    Some(Payload::Sequence(seq)) => vec![serde_json::json!(seq.sequence)],
                    None => Vec::new(),
                };
                events.fire(Event::with_data(EventKind::Alive, data));
            }
        }),
    );

    let for_web_alive = watchdog_events;
    actions.insert(
        MsgType::WebAlive,
        Arc::new(move |from: Participant, _payload: Option<Payload>| {
            if let Some(events) = for_web_alive.get(&from) {
                events.fire(Event::new(EventKind::WebAlive));
            }
        }),
    );

    actions.insert(
        MsgType::ShuttingDown,
        Arc::new(|from: Participant, _payload: Option<Payload>| {
            info!(worker = %from, "worker acknowledged shutdown");
        }),
    );

    actions
}
