//! Point-to-point datagram message bus
//!
//! One UDP socket per process. Inbound datagrams are accepted only from the
//! configured peer addresses, decoded, filtered against the set of message
//! types this instance acts on, and handed to a bounded worker pool so that
//! slow processing can never stall the receive loop. Outbound sends are
//! best-effort single datagrams: no delivery guarantee, no retry, no
//! ordering between distinct sends.

use crate::errors::BusError;
use crate::types::Participant;
use crate::wire::{Message, MsgType, Payload, MAX_DATAGRAM_BYTES};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Queue depth between the receive loop and the dispatch workers.
const DISPATCH_QUEUE_DEPTH: usize = 64;
/// Number of dispatch worker tasks draining the queue.
const DISPATCH_WORKERS: usize = 4;

/// Callback invoked for each accepted message. Must be cheap; anything slow
/// belongs behind a channel send.
pub type MsgAction = Arc<dyn Fn(Participant, Option<Payload>) + Send + Sync>;

/// Address table for the bus: where to listen, and which peers are legitimate.
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub listen_addr: SocketAddr,
    /// participant -> address, inverted internally for sender validation
    pub peers: HashMap<Participant, SocketAddr>,
}

struct Runtime {
    socket: Arc<UdpSocket>,
    listener: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

/// Datagram listener/sender bound to one local address.
pub struct MessageBus {
    listen_addr: SocketAddr,
    senders: HashMap<SocketAddr, Participant>,
    recipients: HashMap<Participant, SocketAddr>,
    runtime: Mutex<Option<Runtime>>,
    shutdown: AtomicBool,
}

impl MessageBus {
    /// Create a bus from one peer table; the sender and recipient maps are
    /// derived from it and are mutual inverses by construction.
    pub fn new(config: BusConfig) -> Self {
        let recipients = config.peers.clone();
        let senders = config
            .peers
            .into_iter()
            .map(|(participant, addr)| (addr, participant))
            .collect();

        MessageBus {
            listen_addr: config.listen_addr,
            senders,
            recipients,
            runtime: Mutex::new(None),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Start the receive loop and dispatch pool. Idempotent: a second call
    /// while already running is a silent no-op.
    pub async fn start(&self, actions: HashMap<MsgType, MsgAction>) -> Result<(), BusError> {
        let mut runtime = self.runtime.lock().await;
        if runtime.is_some() {
            return Ok(());
        }
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(BusError::NotRunning);
        }

        let socket = Arc::new(UdpSocket::bind(self.listen_addr).await?);
        info!(addr = %socket.local_addr()?, "message bus listening");

        let (dispatch_tx, dispatch_rx) =
            mpsc::channel::<(Participant, Message)>(DISPATCH_QUEUE_DEPTH);
        let dispatch_rx = Arc::new(Mutex::new(dispatch_rx));

        let actions = Arc::new(actions);
        let mut workers = Vec::with_capacity(DISPATCH_WORKERS);
        for _ in 0..DISPATCH_WORKERS {
            let rx = dispatch_rx.clone();
            let actions = actions.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let next = { rx.lock().await.recv().await };
                    let Some((from, msg)) = next else { break };
                    if let Some(action) = actions.get(&msg.msg_type()) {
                        action(from, msg.into_payload());
                    }
                }
            }));
        }

        let listener = tokio::spawn(Self::receive_loop(
            socket.clone(),
            self.senders.clone(),
            actions,
            dispatch_tx,
        ));

        *runtime = Some(Runtime { socket, listener, workers });
        Ok(())
    }

    async fn receive_loop(
        socket: Arc<UdpSocket>,
        senders: HashMap<SocketAddr, Participant>,
        actions: Arc<HashMap<MsgType, MsgAction>>,
        dispatch_tx: mpsc::Sender<(Participant, Message)>,
    ) {
        let mut buf = [0u8; MAX_DATAGRAM_BYTES];

        loop {
            let (len, from_addr) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    // transport errors are retried forever; shutdown aborts this task
                    error!(error = %e, "retrying after failure while listening");
                    continue;
                }
            };

            // datagrams from strangers are dropped without decoding
            let Some(&from) = senders.get(&from_addr) else {
                info!(addr = %from_addr, "ignoring datagram from unknown sender");
                continue;
            };

            let msg = match Message::decode(&buf[..len]) {
                Ok(msg) => msg,
                Err(e) => {
                    error!(from = %from, error = %e, "dropping undecodable datagram");
                    continue;
                }
            };

            if !actions.contains_key(&msg.msg_type()) {
                info!(from = %from, msg_type = %msg.msg_type(), "ignoring message with unexpected type");
                continue;
            }

            debug!(from = %from, msg_type = %msg.msg_type(), "dispatching message");
            if let Err(e) = dispatch_tx.try_send((from, msg)) {
                // processing must never block the receive loop
                warn!(from = %from, error = %e, "dispatch queue full; dropping message");
            }
        }
    }

    /// Encode and transmit one datagram to the given participant.
    pub async fn send(&self, msg: &Message, to: Participant) -> Result<(), BusError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(BusError::NotRunning);
        }

        let addr = self
            .recipients
            .get(&to)
            .copied()
            .ok_or(BusError::UnknownRecipient(to))?;

        let bytes = msg.encode()?;
        if bytes.len() > MAX_DATAGRAM_BYTES {
            return Err(BusError::MessageTooLarge { len: bytes.len(), limit: MAX_DATAGRAM_BYTES });
        }

        let socket = {
            let runtime = self.runtime.lock().await;
            runtime.as_ref().map(|r| r.socket.clone()).ok_or(BusError::NotRunning)?
        };
        socket.send_to(&bytes, addr).await?;
        Ok(())
    }

    /// Stop the receive loop and release the local endpoint. Subsequent sends
    /// and starts fail.
    pub async fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let mut runtime = self.runtime.lock().await;
        if let Some(runtime) = runtime.take() {
            runtime.listener.abort();
            for worker in runtime.workers {
                worker.abort();
            }
            info!("message bus shut down");
        }
    }

    /// The bound local address, once started. Useful when listening on port 0.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let runtime = self.runtime.lock().await;
        runtime.as_ref().and_then(|r| r.socket.local_addr().ok())
    }
}
