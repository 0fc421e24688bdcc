//! Generic hierarchical state machine framework
//!
//! A machine owns exactly one current state drawn from a fixed allowed set.
//! Events are dispatched to the current state; a state that does not
//! recognize an event may delegate to an optional child machine; an event
//! recognized nowhere is a fatal usage error. Transitions always run in the
//! order: new state fully constructed, old state's leaving hook, pointer
//! swap, new state's entering hook.
//!
//! The framework is generic over the context `C` handed to every hook, the
//! state-kind discriminant `K`, and the event type `E`.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum MachineError<K: fmt::Debug> {
    #[error("state {target:?} is not allowed in machine \"{machine}\"")]
    DisallowedState { machine: String, target: K },

    #[error("unhandled event {event} in machine \"{machine}\" state {state:?}")]
    UnhandledEvent { machine: String, state: K, event: String },
}

/// What a state's handler decided to do with an event.
pub enum Reaction<C, K, E>
where
    C: Send + 'static,
    K: Copy + Eq + fmt::Debug + Send + 'static,
    E: fmt::Debug + Send + 'static,
{
    /// The event was recognized and acted on; the machine stays put.
    Handled,
    /// Replace the current state with the given one.
    Transition(Box<dyn State<C, K, E>>),
    /// Replace the current state, then deliver a follow-up event to the new one.
    TransitionThen(Box<dyn State<C, K, E>>, E),
    /// Not recognized here; fall through to the child machine, if any.
    Unhandled,
}

/// One state of a machine. Created fresh on every transition in, discarded on
/// transition out; a state instance is never reused across two residencies.
#[async_trait]
pub trait State<C, K, E>: Send
where
    C: Send + 'static,
    K: Copy + Eq + fmt::Debug + Send + 'static,
    E: fmt::Debug + Send + 'static,
{
    fn kind(&self) -> K;

    async fn handle(&mut self, ctx: &mut C, event: &E) -> Reaction<C, K, E>;

    async fn on_enter(&mut self, _ctx: &mut C) {}

    async fn on_leave(&mut self, _ctx: &mut C) {}

    /// Optional nested machine this state delegates unrecognized events to.
    fn child_mut(&mut self) -> Option<&mut StateMachine<C, K, E>> {
        None
    }
}

/// A named machine holding one current state from a fixed allowed set.
pub struct StateMachine<C, K, E>
where
    C: Send + 'static,
    K: Copy + Eq + fmt::Debug + Send + 'static,
    E: fmt::Debug + Send + 'static,
{
    name: String,
    allowed: Vec<K>,
    state: Option<Box<dyn State<C, K, E>>>,
    queue: VecDeque<E>,
    dispatching: bool,
}

impl<C, K, E> StateMachine<C, K, E>
where
    C: Send + 'static,
    K: Copy + Eq + fmt::Debug + Send + 'static,
    E: fmt::Debug + Send + 'static,
{
    /// Construct the machine and perform the initial transition: there is no
    /// prior state, so only the entering hook runs.
    pub async fn start(
        name: impl Into<String>,
        allowed: Vec<K>,
        initial: Box<dyn State<C, K, E>>,
        ctx: &mut C,
    ) -> Result<StateMachine<C, K, E>, MachineError<K>> {
        let mut machine = StateMachine {
            name: name.into(),
            allowed,
            state: None,
            queue: VecDeque::new(),
            dispatching: false,
        };
        machine.transition_to(ctx, initial).await?;
        Ok(machine)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_kind(&self) -> K {
        self.state
            .as_ref()
            .expect("machine always holds a state after start()")
            .kind()
    }

    /// Single entry point: deliver one event to the current state. Follow-up
    /// events produced while handling are queued and drained in order, which
    /// is what serializes event handling per machine.
    pub fn on<'a>(
        &'a mut self,
        ctx: &'a mut C,
        event: E,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<(), MachineError<K>>> + Send + 'a>,
    > {
        Box::pin(async move {
            self.queue.push_back(event);
            if self.dispatching {
                return Ok(());
            }

            self.dispatching = true;
            let mut result = Ok(());
            while let Some(next) = self.queue.pop_front() {
                if let Err(e) = self.dispatch(ctx, next).await {
                    // anything still queued was predicated on the failed dispatch
                    self.queue.clear();
                    result = Err(e);
                    break;
                }
            }
            self.dispatching = false;
            result
        })
    }

    async fn dispatch(&mut self, ctx: &mut C, event: E) -> Result<(), MachineError<K>> {
        let state = self
            .state
            .as_mut()
            .expect("machine always holds a state after start()");

        match state.handle(ctx, &event).await {
            Reaction::Handled => Ok(()),
            Reaction::Transition(next) => self.transition_to(ctx, next).await,
            Reaction::TransitionThen(next, follow_up) => {
                self.transition_to(ctx, next).await?;
                self.queue.push_back(follow_up);
                Ok(())
            }
            Reaction::Unhandled => match state.child_mut() {
                Some(child) => child.on(ctx, event).await,
                None => Err(MachineError::UnhandledEvent {
                    machine: self.name.clone(),
                    state: state.kind(),
                    event: format!("{event:?}"),
                }),
            },
        }
    }

    /// Replace the current state. The target kind is validated before any
    /// hook runs; a disallowed target is a configuration error.
    pub async fn transition_to(
        &mut self,
        ctx: &mut C,
        next: Box<dyn State<C, K, E>>,
    ) -> Result<(), MachineError<K>> {
        let target = next.kind();
        if !self.allowed.contains(&target) {
            return Err(MachineError::DisallowedState { machine: self.name.clone(), target });
        }

        match &self.state {
            Some(current) => {
                info!(machine = %self.name, from = ?current.kind(), to = ?target, "state transition")
            }
            None => info!(machine = %self.name, to = ?target, "initial state transition"),
        }

        if let Some(mut old) = self.state.take() {
            old.on_leave(ctx).await;
        }
        self.state = Some(next);
        if let Some(state) = self.state.as_mut() {
            state.on_enter(ctx).await;
        }
        Ok(())
    }
}

/// Handle for delivering events into a machine's actor loop, including from
/// timers and background tasks.
pub struct EventSender<E>(mpsc::UnboundedSender<E>);

impl<E: Send + 'static> EventSender<E> {
    pub fn new(tx: mpsc::UnboundedSender<E>) -> EventSender<E> {
        EventSender(tx)
    }

    /// Deliver an event now. Delivery is lost (and logged) if the machine's
    /// actor loop has already shut down.
    pub fn fire(&self, event: E) {
        if self.0.send(event).is_err() {
            debug!("event dropped; machine loop has shut down");
        }
    }

    /// Schedule a one-shot delayed self-event. Cancellation is best-effort:
    /// a timer that fires anyway must be tolerated by the receiving state.
    pub fn delayed(&self, delay: Duration, event: E) -> TimerHandle {
        let tx = self.0.clone();
        TimerHandle(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        }))
    }
}

impl<E> Clone for EventSender<E> {
    fn clone(&self) -> EventSender<E> {
        EventSender(self.0.clone())
    }
}

/// Cancellable handle for a scheduled delayed event.
pub struct TimerHandle(JoinHandle<()>);

impl TimerHandle {
    pub fn cancel(&self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Kind {
        Even,
        Odd,
        Forbidden,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Ev {
        Flip,
        FlipTwice,
        Nested,
        Bogus,
    }

    /// Counts hook invocations so tests can assert ordering.
    #[derive(Default)]
    struct Trace {
        entered: Vec<Kind>,
        left: Vec<Kind>,
        nested_handled: u32,
    }

    struct Flipper {
        kind: Kind,
        child: Option<StateMachine<Trace, Kind, Ev>>,
    }

    impl Flipper {
        fn boxed(kind: Kind) -> Box<dyn State<Trace, Kind, Ev>> {
            Box::new(Flipper { kind, child: None })
        }

        fn other(&self) -> Kind {
            match self.kind {
                Kind::Even => Kind::Odd,
                _ => Kind::Even,
            }
        }
    }

    #[async_trait]
    impl State<Trace, Kind, Ev> for Flipper {
        fn kind(&self) -> Kind {
            self.kind
        }

        async fn handle(&mut self, _ctx: &mut Trace, event: &Ev) -> Reaction<Trace, Kind, Ev> {
            match event {
                Ev::Flip => Reaction::Transition(Flipper::boxed(self.other())),
                Ev::FlipTwice => {
                    Reaction::TransitionThen(Flipper::boxed(self.other()), Ev::Flip)
                }
                _ => Reaction::Unhandled,
            }
        }

        async fn on_enter(&mut self, ctx: &mut Trace) {
            ctx.entered.push(self.kind);
        }

        async fn on_leave(&mut self, ctx: &mut Trace) {
            ctx.left.push(self.kind);
        }

        fn child_mut(&mut self) -> Option<&mut StateMachine<Trace, Kind, Ev>> {
            self.child.as_mut()
        }
    }

    struct NestedLeaf;

    #[async_trait]
    impl State<Trace, Kind, Ev> for NestedLeaf {
        fn kind(&self) -> Kind {
            Kind::Even
        }

        async fn handle(&mut self, ctx: &mut Trace, event: &Ev) -> Reaction<Trace, Kind, Ev> {
            match event {
                Ev::Nested => {
                    ctx.nested_handled += 1;
                    Reaction::Handled
                }
                _ => Reaction::Unhandled,
            }
        }
    }

    async fn machine(ctx: &mut Trace) -> StateMachine<Trace, Kind, Ev> {
        StateMachine::start("test", vec![Kind::Even, Kind::Odd], Flipper::boxed(Kind::Even), ctx)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_initial_transition_runs_enter_only() {
        let mut ctx = Trace::default();
        let m = machine(&mut ctx).await;
        assert_eq!(m.current_kind(), Kind::Even);
        assert_eq!(ctx.entered, vec![Kind::Even]);
        assert!(ctx.left.is_empty());
    }

    #[tokio::test]
    async fn test_transition_hook_order() {
        let mut ctx = Trace::default();
        let mut m = machine(&mut ctx).await;

        m.on(&mut ctx, Ev::Flip).await.unwrap();
        assert_eq!(m.current_kind(), Kind::Odd);
        assert_eq!(ctx.left, vec![Kind::Even]);
        assert_eq!(ctx.entered, vec![Kind::Even, Kind::Odd]);
    }

    #[tokio::test]
    async fn test_follow_up_event_processed_in_order() {
        let mut ctx = Trace::default();
        let mut m = machine(&mut ctx).await;

        // transition to Odd, then the queued Flip brings it back to Even
        m.on(&mut ctx, Ev::FlipTwice).await.unwrap();
        assert_eq!(m.current_kind(), Kind::Even);
        assert_eq!(ctx.entered, vec![Kind::Even, Kind::Odd, Kind::Even]);
    }

    #[tokio::test]
    async fn test_disallowed_target_rejected_before_hooks() {
        let mut ctx = Trace::default();
        let mut m = machine(&mut ctx).await;

        let err = m
            .transition_to(&mut ctx, Flipper::boxed(Kind::Forbidden))
            .await
            .unwrap_err();
        assert!(matches!(err, MachineError::DisallowedState { target: Kind::Forbidden, .. }));
        // neither hook ran and the machine still holds its previous state
        assert_eq!(ctx.left, Vec::<Kind>::new());
        assert_eq!(ctx.entered, vec![Kind::Even]);
        assert_eq!(m.current_kind(), Kind::Even);
    }

    #[tokio::test]
    async fn test_unhandled_event_is_an_error() {
        let mut ctx = Trace::default();
        let mut m = machine(&mut ctx).await;

        let err = m.on(&mut ctx, Ev::Bogus).await.unwrap_err();
        assert!(matches!(err, MachineError::UnhandledEvent { .. }));
    }

    #[tokio::test]
    async fn test_child_machine_fallback() {
        let mut ctx = Trace::default();
        let child = StateMachine::start("child", vec![Kind::Even], Box::new(NestedLeaf), &mut ctx)
            .await
            .unwrap();
        let parent_state = Box::new(Flipper { kind: Kind::Even, child: Some(child) });
        let mut m = StateMachine::start("parent", vec![Kind::Even, Kind::Odd], parent_state, &mut ctx)
            .await
            .unwrap();

        m.on(&mut ctx, Ev::Nested).await.unwrap();
        assert_eq!(ctx.nested_handled, 1);

        // unrecognized in parent and child alike is still fatal
        assert!(m.on(&mut ctx, Ev::Bogus).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_event_delivery_and_cancel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender: EventSender<Ev> = EventSender::new(tx);

        let timer = sender.delayed(Duration::from_secs(5), Ev::Flip);
        let cancelled = sender.delayed(Duration::from_secs(5), Ev::Bogus);
        cancelled.cancel();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(rx.recv().await, Some(Ev::Flip));
        assert!(rx.try_recv().is_err());
        drop(timer);
    }
}
