use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQuery, ChatId, InlineKeyboardButton, InlineKeyboardMarkup, LinkPreviewOptions,
    MaybeInaccessibleMessage, Message, MessageEntityKind, MessageId, ReplyParameters, Update,
    UpdateKind, UserId,
};
use teloxide::{ApiError, RequestError};
use tracing::debug;

use crate::platform::{
    ChatPlatform, InboundEvent, IncomingMessage, MembershipStatus, MessageRef, PlatformError,
    RawEvent, VoteCallback,
};
use crate::render::{parse_vote_payload, ButtonGrid};

/// Telegram rejects texts longer than this
const MAX_MESSAGE_LEN: usize = 4096;

/// Split long messages for Telegram's 4096 char limit
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        // Prefer breaking between ballot paragraphs, then lines
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind("\n\n")
                .map(|pos| start + pos + 2)
                .or_else(|| text[start..end].rfind('\n').map(|pos| start + pos + 1))
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

impl From<RequestError> for PlatformError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Api(ApiError::MessageToEditNotFound) => {
                PlatformError::NotFound(err.to_string())
            }
            other => PlatformError::Transient(other.to_string()),
        }
    }
}

fn keyboard(buttons: &ButtonGrid) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(buttons.rows().iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.payload.clone()))
            .collect::<Vec<_>>()
    }))
}

fn preview_disabled() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

fn message_event(msg: &Message) -> InboundEvent {
    let user = match msg.from.as_ref() {
        Some(user) => user,
        None => return InboundEvent::Other,
    };

    let has_command = msg.entities().is_some_and(|entities| {
        entities
            .iter()
            .any(|e| matches!(e.kind, MessageEntityKind::BotCommand))
    });

    InboundEvent::Message(IncomingMessage {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        user_id: user.id.0 as i64,
        user_name: user
            .username
            .clone()
            .unwrap_or_else(|| user.first_name.clone()),
        text: msg.text().map(str::to_owned),
        has_command,
    })
}

fn callback_event(q: &CallbackQuery) -> InboundEvent {
    let candidate_id = match q.data.as_deref().and_then(parse_vote_payload) {
        Some(id) => id,
        None => {
            debug!(user_id = %q.from.id, data = ?q.data, "Callback without a vote payload");
            return InboundEvent::Other;
        }
    };

    let message = q.message.as_ref().map(|m: &MaybeInaccessibleMessage| MessageRef {
        chat_id: m.chat().id.0,
        message_id: m.id().0,
    });

    InboundEvent::CallbackVote(VoteCallback {
        message,
        user_id: q.from.id.0 as i64,
        username: q.from.username.clone(),
        candidate_id,
    })
}

fn convert_update(update: Update) -> RawEvent {
    let id = i64::from(update.id.0);
    let event = match &update.kind {
        UpdateKind::Message(msg) => message_event(msg),
        UpdateKind::CallbackQuery(q) => callback_event(q),
        _ => InboundEvent::Other,
    };
    RawEvent { id, event }
}

/// Telegram Bot API backed by teloxide
#[derive(Clone)]
pub struct TelegramPlatform {
    bot: Bot,
}

impl TelegramPlatform {
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }

    /// The bot's own username, used to strip `@mentions` from commands
    pub async fn username(&self) -> Result<Option<String>> {
        let me = self
            .bot
            .get_me()
            .await
            .context("Failed to query bot identity")?;
        Ok(me.user.username.clone())
    }
}

#[async_trait]
impl ChatPlatform for TelegramPlatform {
    async fn fetch_events(&self, offset: i64, limit: u8) -> Result<Vec<RawEvent>, PlatformError> {
        let offset = i32::try_from(offset).map_err(|_| {
            PlatformError::Transient(format!("update offset {} out of range", offset))
        })?;

        let updates = self.bot.get_updates().offset(offset).limit(limit).await?;

        Ok(updates.into_iter().map(convert_update).collect())
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
        buttons: &ButtonGrid,
    ) -> Result<i32, PlatformError> {
        let chunks = split_message(text, MAX_MESSAGE_LEN);
        let last = chunks.len() - 1;
        let mut sent_id = 0;

        for (i, chunk) in chunks.into_iter().enumerate() {
            let mut request = self
                .bot
                .send_message(ChatId(chat_id), chunk)
                .link_preview_options(preview_disabled());
            if i == 0 {
                if let Some(id) = reply_to {
                    request = request.reply_parameters(ReplyParameters::new(MessageId(id)));
                }
            }
            // Buttons go under the final chunk
            if i == last && !buttons.is_empty() {
                request = request.reply_markup(keyboard(buttons));
            }
            sent_id = request.await?.id.0;
        }

        Ok(sent_id)
    }

    async fn edit_message_buttons(
        &self,
        target: MessageRef,
        buttons: &ButtonGrid,
    ) -> Result<(), PlatformError> {
        let result = self
            .bot
            .edit_message_reply_markup(ChatId(target.chat_id), MessageId(target.message_id))
            .reply_markup(keyboard(buttons))
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(RequestError::Api(ApiError::MessageNotModified)) => {
                debug!(
                    chat_id = target.chat_id,
                    message_id = target.message_id,
                    "Buttons already up to date"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn check_membership(
        &self,
        group_id: i64,
        user_id: i64,
    ) -> Result<MembershipStatus, PlatformError> {
        let member = self
            .bot
            .get_chat_member(ChatId(group_id), UserId(user_id as u64))
            .await?;

        let status = if member.kind.is_owner() {
            MembershipStatus::Owner
        } else if member.kind.is_administrator() {
            MembershipStatus::Admin
        } else if member.kind.is_member() {
            MembershipStatus::Member
        } else {
            MembershipStatus::None
        };
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Button;

    #[test]
    fn test_short_message_is_single_chunk() {
        assert_eq!(split_message("hello", 10), vec!["hello".to_string()]);
        assert_eq!(split_message("", 10), vec![String::new()]);
    }

    #[test]
    fn test_split_prefers_paragraph_breaks() {
        let text = "aaaa\nbbb\n\ncccc\n\n";
        let chunks = split_message(text, 12);
        assert_eq!(chunks[0], "aaaa\nbbb\n\n");
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let text = "Проект №1 Проект №2 Проект №3";
        let chunks = split_message(text, 7);
        assert!(chunks.iter().all(|c| c.len() <= 7));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_keyboard_mirrors_grid() {
        let grid = ButtonGrid::single_column(vec![
            Button {
                label: "Проект №1".into(),
                payload: "1".into(),
            },
            Button {
                label: "Проект №2 ✅".into(),
                payload: "2".into(),
            },
        ]);
        let markup = keyboard(&grid);
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[1][0].text, "Проект №2 ✅");
    }
}
