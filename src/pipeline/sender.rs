use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, warn};

use super::{OutboundItem, PipelineError, Shutdown};
use crate::platform::{ChatPlatform, PlatformError};

/// Outbound stage: performs platform calls in the order the dispatcher queued them
pub struct Sender {
    platform: Arc<dyn ChatPlatform>,
    outbound: UnboundedReceiver<OutboundItem>,
    idle_interval: Duration,
}

impl Sender {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        outbound: UnboundedReceiver<OutboundItem>,
        idle_interval: Duration,
    ) -> Self {
        Self {
            platform,
            outbound,
            idle_interval,
        }
    }

    pub async fn run(mut self, mut shutdown: Shutdown) -> Result<(), PipelineError> {
        loop {
            shutdown.check()?;

            match self.drain().await {
                Ok(0) => shutdown.pause(self.idle_interval).await?,
                Ok(_) => {}
                // upstream stage already stopped for the same shutdown
                Err(PipelineError::QueueClosed(_)) if shutdown.is_triggered() => {
                    return Err(PipelineError::Cancelled)
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Deliver every queued item sequentially. Failed items are dropped.
    pub async fn drain(&mut self) -> Result<usize, PipelineError> {
        let mut handled = 0;
        loop {
            let item = match self.outbound.try_recv() {
                Ok(item) => item,
                Err(TryRecvError::Empty) => return Ok(handled),
                Err(TryRecvError::Disconnected) if handled > 0 => return Ok(handled),
                Err(TryRecvError::Disconnected) => {
                    return Err(PipelineError::QueueClosed("outbound"))
                }
            };
            handled += 1;

            match self.deliver(&item).await {
                Ok(()) => {}
                Err(PlatformError::NotFound(reason)) => {
                    warn!("Dropping response, target is gone: {}", reason)
                }
                Err(e) => error!(item = ?item, "Failed to deliver response: {}", e),
            }
        }
    }

    pub async fn deliver(&self, item: &OutboundItem) -> Result<(), PlatformError> {
        match item {
            OutboundItem::NewMessage {
                chat_id,
                text,
                reply_to,
                buttons,
            } => {
                let message_id = self
                    .platform
                    .send_message(*chat_id, text, *reply_to, buttons)
                    .await?;
                debug!(chat_id, message_id, "Sent message");
            }
            OutboundItem::EditButtons { target, buttons } => {
                self.platform.edit_message_buttons(*target, buttons).await?;
                debug!(
                    chat_id = target.chat_id,
                    message_id = target.message_id,
                    "Updated buttons"
                );
            }
        }
        Ok(())
    }
}
