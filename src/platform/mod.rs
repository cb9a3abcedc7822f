pub mod telegram;

use async_trait::async_trait;
use thiserror::Error;

use crate::render::ButtonGrid;

/// A message or callback that can be addressed later (for in-place edits)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i32,
}

/// A text message received from the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub message_id: i32,
    pub user_id: i64,
    /// Username if set, first name otherwise
    pub user_name: String,
    pub text: Option<String>,
    /// Whether the platform marked a bot command entity in the text
    pub has_command: bool,
}

/// A tap on one of the ballot buttons
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteCallback {
    /// The ballot message the button belongs to, when the platform still exposes it
    pub message: Option<MessageRef>,
    pub user_id: i64,
    pub username: Option<String>,
    pub candidate_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Message(IncomingMessage),
    CallbackVote(VoteCallback),
    Other,
}

/// An inbound event together with the platform's monotonically increasing update id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub id: i64,
    pub event: InboundEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipStatus {
    Owner,
    Admin,
    Member,
    None,
}

impl MembershipStatus {
    pub fn is_member(self) -> bool {
        !matches!(self, MembershipStatus::None)
    }
}

#[derive(Debug, Error)]
pub enum PlatformError {
    /// Network failure, rate limit or any other error worth retrying later
    #[error("platform request failed: {0}")]
    Transient(String),
    #[error("not found: {0}")]
    NotFound(String),
}

/// Operations the pipeline needs from the messaging platform
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Fetch up to `limit` events with ids >= `offset`, in platform order
    async fn fetch_events(&self, offset: i64, limit: u8) -> Result<Vec<RawEvent>, PlatformError>;

    /// Send a text message with link previews disabled. Returns the new message id.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
        buttons: &ButtonGrid,
    ) -> Result<i32, PlatformError>;

    /// Replace only the inline buttons of an existing message
    async fn edit_message_buttons(
        &self,
        target: MessageRef,
        buttons: &ButtonGrid,
    ) -> Result<(), PlatformError>;

    async fn check_membership(
        &self,
        group_id: i64,
        user_id: i64,
    ) -> Result<MembershipStatus, PlatformError>;
}
