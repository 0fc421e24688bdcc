//! Control channel backed by the UDP message bus.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::MonitorResult;
use crate::traits::ControlChannel;
use shared::{Message, MessageBus, Participant};

pub struct BusChannel {
    bus: Arc<MessageBus>,
}

impl BusChannel {
    pub fn new(bus: Arc<MessageBus>) -> BusChannel {
        BusChannel { bus }
    }
}

#[async_trait]
impl ControlChannel for BusChannel {
    async fn send_control(&self, message: &Message, to: Participant) -> MonitorResult<()> {
        self.bus.send(message, to).await?;
        Ok(())
    }

    async fn shutdown(&self) {
        self.bus.shutdown().await;
    }
}
