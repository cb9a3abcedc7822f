use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

use super::{OutboundItem, PipelineError, Shutdown};
use crate::classifier::{classify, Command, UpdateKind};
use crate::ledger::{resolve_vote, VoteChange};
use crate::platform::{ChatPlatform, InboundEvent, IncomingMessage, PlatformError, VoteCallback};
use crate::render::{render_ballot, ButtonGrid};
use crate::store::{StoreError, VoteStore};

pub const UNKNOWN_COMMAND_TEXT: &str = "Неизвестная команда";
const NOT_A_MEMBER_PREFIX: &str = "Голос не учитывается, т.к. вы не являетесь участником";

/// Reply to a command from someone outside the working chat
pub fn not_a_member_text(working_chat_name: Option<&str>) -> String {
    match working_chat_name {
        Some(name) => format!("{} чата {}", NOT_A_MEMBER_PREFIX, name),
        None => format!("{} рабочего чата", NOT_A_MEMBER_PREFIX),
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

#[derive(Debug, Clone, Default)]
pub struct DispatchSettings {
    /// Stripped from command text as `@bot_username`
    pub bot_username: Option<String>,
    pub working_chat_id: Option<i64>,
    pub working_chat_name: Option<String>,
    pub verify_membership: bool,
    pub show_vote_counts: bool,
}

/// Handling stage: turns inbound events into store mutations and outbound items.
///
/// Events are handled one at a time, in queue order, which keeps every
/// read-then-write on a user's vote linearized within the process.
pub struct Dispatcher {
    platform: Arc<dyn ChatPlatform>,
    store: Arc<dyn VoteStore>,
    settings: DispatchSettings,
    inbound: UnboundedReceiver<InboundEvent>,
    outbound: UnboundedSender<OutboundItem>,
    idle_interval: Duration,
}

impl Dispatcher {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        store: Arc<dyn VoteStore>,
        settings: DispatchSettings,
        inbound: UnboundedReceiver<InboundEvent>,
        outbound: UnboundedSender<OutboundItem>,
        idle_interval: Duration,
    ) -> Self {
        Self {
            platform,
            store,
            settings,
            inbound,
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

    /// Handle every event currently queued. Returns how many were taken.
    pub async fn drain(&mut self) -> Result<usize, PipelineError> {
        let mut handled = 0;
        loop {
            let event = match self.inbound.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => return Ok(handled),
                Err(TryRecvError::Disconnected) if handled > 0 => return Ok(handled),
                Err(TryRecvError::Disconnected) => {
                    return Err(PipelineError::QueueClosed("inbound"))
                }
            };
            handled += 1;
            self.process(&event).await;
        }
    }

    /// Handle one event and enqueue its response. Failures are logged and
    /// do not affect the next event.
    pub async fn process(&self, event: &InboundEvent) {
        match self.handle(event).await {
            Ok(Some(item)) => {
                if self.outbound.send(item).is_err() {
                    warn!("Outbound queue closed, dropping response");
                }
            }
            Ok(None) => {}
            Err(e) => error!(event = ?event, "Cannot handle an update: {}", e),
        }
    }

    pub async fn handle(
        &self,
        event: &InboundEvent,
    ) -> Result<Option<OutboundItem>, DispatchError> {
        match (classify(event, self.settings.bot_username.as_deref()), event) {
            (UpdateKind::Command(command), InboundEvent::Message(msg)) => {
                debug!(chat_id = msg.chat_id, "Handling message update");
                self.handle_command(msg, command).await
            }
            (UpdateKind::Vote { .. }, InboundEvent::CallbackVote(cb)) => {
                debug!(user_id = cb.user_id, "Handling callback query update");
                self.handle_vote(cb).await
            }
            (UpdateKind::Ignored(reason), _) => {
                debug!("Ignoring update: {}", reason);
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    async fn handle_command(
        &self,
        msg: &IncomingMessage,
        command: Command,
    ) -> Result<Option<OutboundItem>, DispatchError> {
        if let Some(working_chat_id) = self.settings.working_chat_id {
            if working_chat_id == msg.chat_id {
                debug!(chat_id = msg.chat_id, "Command inside the working chat, ignoring");
                return Ok(None);
            }

            if self.settings.verify_membership {
                let status = self
                    .platform
                    .check_membership(working_chat_id, msg.user_id)
                    .await?;
                if !status.is_member() {
                    info!(
                        user_id = msg.user_id,
                        "{} is not a member of the working chat", msg.user_name
                    );
                    let text = not_a_member_text(self.settings.working_chat_name.as_deref());
                    return Ok(Some(reply(msg, text, ButtonGrid::default())));
                }
            }
        }

        match command {
            Command::List => {
                info!(
                    user_id = msg.user_id,
                    "Handling /list command triggered by {}", msg.user_name
                );
                let snapshot = self.store.ballot(Some(msg.user_id)).await?;
                let ballot = render_ballot(&snapshot, self.settings.show_vote_counts);
                Ok(Some(reply(msg, ballot.text, ballot.buttons)))
            }
            Command::Unknown(token) => {
                info!(
                    user_id = msg.user_id,
                    "Unknown command {} triggered by {}", token, msg.user_name
                );
                let text = UNKNOWN_COMMAND_TEXT.to_string();
                Ok(Some(reply(msg, text, ButtonGrid::default())))
            }
        }
    }

    async fn handle_vote(
        &self,
        cb: &VoteCallback,
    ) -> Result<Option<OutboundItem>, DispatchError> {
        let who = cb.username.as_deref().unwrap_or("unknown");

        let ballot = self.store.ballot(None).await?;
        if ballot.is_empty() {
            debug!("No candidates, ignoring vote");
            return Ok(None);
        }
        if !ballot.contains(cb.candidate_id) {
            warn!(
                user_id = cb.user_id,
                candidate_id = cb.candidate_id,
                "Vote for unknown candidate"
            );
            return Ok(None);
        }

        let current = self.store.vote_for_user(cb.user_id).await?;
        let change = resolve_vote(current.as_ref(), cb.user_id, cb.candidate_id, Utc::now());

        match &change {
            VoteChange::Cast(vote) => {
                self.store.upsert_vote(vote).await?;
                info!(user_id = cb.user_id, candidate_id = vote.candidate_id, "{} voted", who);
            }
            VoteChange::Changed { previous, vote } => {
                self.store.upsert_vote(vote).await?;
                info!(
                    user_id = cb.user_id,
                    from = previous,
                    to = vote.candidate_id,
                    "{} revoted",
                    who
                );
            }
            VoteChange::Withdrawn {
                user_id,
                candidate_id,
            } => {
                self.store.delete_vote(*user_id).await?;
                info!(user_id, candidate_id, "{} canceled vote", who);
            }
        }
        debug!(user_id = cb.user_id, selected = ?change.selected(), "Vote applied");

        let target = match cb.message {
            Some(target) => target,
            None => return Ok(None),
        };

        let snapshot = self.store.ballot(Some(cb.user_id)).await?;
        let rendered = render_ballot(&snapshot, self.settings.show_vote_counts);
        Ok(Some(OutboundItem::EditButtons {
            target,
            buttons: rendered.buttons,
        }))
    }
}

fn reply(msg: &IncomingMessage, text: String, buttons: ButtonGrid) -> OutboundItem {
    OutboundItem::NewMessage {
        chat_id: msg.chat_id,
        text,
        reply_to: Some(msg.message_id),
        buttons,
    }
}
