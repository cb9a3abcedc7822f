//! Three-stage update pipeline.
//!
//! ```text
//! platform -> Fetcher -> inbound queue -> Dispatcher -> outbound queue -> Sender -> platform
//! ```
//!
//! Stages share nothing but the two FIFO queues and the shutdown signal.
//! Each stage checks the signal at the top of its loop; a call already in
//! flight completes before the stage notices.

pub mod dispatcher;
pub mod fetcher;
pub mod sender;

#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinError;
use tracing::{error, info};

use crate::config::Config;
use crate::platform::{ChatPlatform, MessageRef};
use crate::render::ButtonGrid;
use crate::store::VoteStore;

pub use dispatcher::{DispatchSettings, Dispatcher};
pub use fetcher::{Fetcher, PollCursor};
pub use sender::Sender;

/// A platform call produced by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundItem {
    NewMessage {
        chat_id: i64,
        text: String,
        reply_to: Option<i32>,
        buttons: ButtonGrid,
    },
    EditButtons {
        target: MessageRef,
        buttons: ButtonGrid,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cancellation requested")]
    Cancelled,
    #[error("{0} queue closed")]
    QueueClosed(&'static str),
    #[error("{stage} stage failed: {reason}")]
    Stage { stage: &'static str, reason: String },
}

/// Triggers shutdown of every stage holding a [`Shutdown`]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Cooperative cancellation signal. Dropping the [`ShutdownHandle`] also
/// counts as a shutdown request.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn shutdown_channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, Shutdown { rx })
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Fails with [`PipelineError::Cancelled`] once shutdown was requested
    pub fn check(&self) -> Result<(), PipelineError> {
        if self.is_triggered() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves when shutdown is requested
    pub async fn triggered(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleep for `period`, cut short by a shutdown request
    pub async fn pause(&mut self, period: Duration) -> Result<(), PipelineError> {
        tokio::select! {
            _ = tokio::time::sleep(period) => Ok(()),
            _ = self.triggered() => Err(PipelineError::Cancelled),
        }
    }
}

/// Runtime knobs for all three stages
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub batch_size: u8,
    pub poll_interval: Duration,
    pub idle_interval: Duration,
    pub dispatch: DispatchSettings,
}

impl PipelineSettings {
    pub fn from_config(config: &Config, bot_username: Option<String>) -> Self {
        Self {
            batch_size: config.pipeline.batch_size,
            poll_interval: Duration::from_millis(config.pipeline.poll_interval_ms),
            idle_interval: Duration::from_millis(config.pipeline.idle_interval_ms),
            dispatch: DispatchSettings {
                bot_username,
                working_chat_id: config.telegram.working_chat_id,
                working_chat_name: config.telegram.working_chat_name.clone(),
                verify_membership: config.telegram.verify_membership,
                show_vote_counts: config.pipeline.show_vote_counts,
            },
        }
    }
}

/// Owns the queues and runs the three stages until shutdown
pub struct Pipeline {
    platform: Arc<dyn ChatPlatform>,
    store: Arc<dyn VoteStore>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        store: Arc<dyn VoteStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            platform,
            store,
            settings,
        }
    }

    /// Run all stages concurrently. Returns `Ok(())` when every stage stopped
    /// because of the shutdown signal, otherwise the first unexpected failure.
    ///
    /// A stage that exits for any reason, a panic included, stops the other
    /// two as well.
    pub async fn run(self, mut shutdown: Shutdown) -> Result<(), PipelineError> {
        let (stop, signal) = shutdown_channel();
        let stop = Arc::new(stop);
        let forward = {
            let stop = Arc::clone(&stop);
            tokio::spawn(async move {
                shutdown.triggered().await;
                stop.trigger();
            })
        };

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let fetcher = Fetcher::new(
            Arc::clone(&self.platform),
            inbound_tx,
            self.settings.batch_size,
            self.settings.poll_interval,
        );
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.platform),
            self.store,
            self.settings.dispatch,
            inbound_rx,
            outbound_tx,
            self.settings.idle_interval,
        );
        let sender = Sender::new(self.platform, outbound_rx, self.settings.idle_interval);

        info!("Starting pipeline stages");
        let fetch = tokio::spawn(supervised(
            fetcher.run(signal.clone()),
            Arc::clone(&stop),
        ));
        let dispatch = tokio::spawn(supervised(
            dispatcher.run(signal.clone()),
            Arc::clone(&stop),
        ));
        let send = tokio::spawn(supervised(sender.run(signal), stop));

        let (fetched, dispatched, sent) = tokio::join!(fetch, dispatch, send);
        forward.abort();

        let results = [
            settle("fetcher", fetched),
            settle("dispatcher", dispatched),
            settle("sender", sent),
        ];
        results.into_iter().collect::<Result<Vec<()>, _>>()?;

        info!("Pipeline stopped");
        Ok(())
    }
}

/// Triggers the pipeline-wide stop when dropped, which also happens while a
/// stage task unwinds from a panic
struct StopOnExit(Arc<ShutdownHandle>);

impl Drop for StopOnExit {
    fn drop(&mut self) {
        self.0.trigger();
    }
}

async fn supervised<F>(stage: F, stop: Arc<ShutdownHandle>) -> Result<(), PipelineError>
where
    F: Future<Output = Result<(), PipelineError>>,
{
    let _stop = StopOnExit(stop);
    stage.await
}

fn settle(
    stage: &'static str,
    joined: Result<Result<(), PipelineError>, JoinError>,
) -> Result<(), PipelineError> {
    match joined {
        Ok(Ok(())) | Ok(Err(PipelineError::Cancelled)) => {
            info!("{} stage stopped", stage);
            Ok(())
        }
        Ok(Err(e)) => {
            error!("{} stage failed: {}", stage, e);
            Err(e)
        }
        Err(e) => {
            error!("{} stage panicked: {}", stage, e);
            Err(PipelineError::Stage {
                stage,
                reason: e.to_string(),
            })
        }
    }
}
