use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};

use super::{PipelineError, Shutdown};
use crate::platform::{ChatPlatform, InboundEvent, PlatformError, RawEvent};

/// Offset of the next unseen update. Only ever moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollCursor {
    next: i64,
}

impl PollCursor {
    pub fn offset(&self) -> i64 {
        self.next
    }

    /// Move past every event in `batch`. An empty batch leaves the cursor alone.
    pub fn advance(&mut self, batch: &[RawEvent]) {
        if let Some(max_id) = batch.iter().map(|e| e.id).max() {
            self.next = self.next.max(max_id + 1);
        }
    }
}

/// Inbound stage: polls the platform and feeds the inbound queue
pub struct Fetcher {
    platform: Arc<dyn ChatPlatform>,
    inbound: UnboundedSender<InboundEvent>,
    cursor: PollCursor,
    batch_size: u8,
    poll_interval: Duration,
}

impl Fetcher {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        inbound: UnboundedSender<InboundEvent>,
        batch_size: u8,
        poll_interval: Duration,
    ) -> Self {
        Self {
            platform,
            inbound,
            cursor: PollCursor::default(),
            batch_size,
            poll_interval,
        }
    }

    pub fn cursor(&self) -> PollCursor {
        self.cursor
    }

    /// Fetch one batch, enqueue it in receipt order and advance the cursor.
    /// Returns the number of events enqueued.
    pub async fn poll_once(&mut self) -> Result<usize, PlatformError> {
        let batch = self
            .platform
            .fetch_events(self.cursor.offset(), self.batch_size)
            .await?;

        if batch.is_empty() {
            return Ok(0);
        }

        info!("{} new update(s)", batch.len());
        self.cursor.advance(&batch);

        let count = batch.len();
        for raw in batch {
            debug!(update_id = raw.id, "Queued update");
            if self.inbound.send(raw.event).is_err() {
                // dispatcher is gone; it only stops on shutdown
                debug!(update_id = raw.id, "Inbound queue closed, dropping update");
            }
        }
        Ok(count)
    }

    pub async fn run(mut self, mut shutdown: Shutdown) -> Result<(), PipelineError> {
        info!("Getting bot updates...");

        loop {
            shutdown.check()?;

            if let Err(e) = self.poll_once().await {
                error!(offset = self.cursor.offset(), "Failed to fetch updates: {}", e);
            }

            shutdown.pause(self.poll_interval).await?;
        }
    }
}
