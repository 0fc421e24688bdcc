//! Error state: terminal. The worker is stopped and stays stopped until an
//! operator intervenes; every further event is reported as unhandled.

use async_trait::async_trait;

use crate::event::Event;
use crate::fsm::Reaction;
use crate::watchdog::{WatchContext, WatchKind, WatchReaction};
use shared::process_error;

pub struct ErrorState;

impl ErrorState {
    pub fn new() -> ErrorState {
        ErrorState
    }
}

#[async_trait]
impl crate::fsm::State<WatchContext, WatchKind, Event> for ErrorState {
    fn kind(&self) -> WatchKind {
        WatchKind::Error
    }

    async fn handle(&mut self, _ctx: &mut WatchContext, _event: &Event) -> WatchReaction {
        Reaction::Unhandled
    }

    async fn on_enter(&mut self, ctx: &mut WatchContext) {
        ctx.process.stop().await;
        process_error!(
            ctx.participant,
            "watchdog gave up on this worker; manual intervention required"
        );
    }
}
