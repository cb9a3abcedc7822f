//! Decides what an inbound event asks the bot to do.

use crate::platform::InboundEvent;

/// Bot commands understood by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/list`: show the ballot
    List,
    /// Anything else that was marked as a command
    Unknown(String),
}

impl Command {
    fn from_token(token: &str) -> Self {
        match token {
            "/list" => Command::List,
            other => Command::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateKind {
    Command(Command),
    Vote { candidate_id: i64 },
    Ignored(&'static str),
}

/// Remove `@bot_username` mentions and split the rest on whitespace
pub fn command_tokens(text: &str, bot_username: Option<&str>) -> Vec<String> {
    let stripped = match bot_username {
        Some(name) if !name.is_empty() => text.replace(&format!("@{}", name), ""),
        _ => text.to_string(),
    };
    stripped.split_whitespace().map(str::to_owned).collect()
}

pub fn classify(event: &InboundEvent, bot_username: Option<&str>) -> UpdateKind {
    match event {
        InboundEvent::Message(msg) => {
            if !msg.has_command {
                return UpdateKind::Ignored("message contains no command");
            }
            let tokens = msg
                .text
                .as_deref()
                .map(|text| command_tokens(text, bot_username))
                .unwrap_or_default();
            match tokens.first() {
                Some(first) => UpdateKind::Command(Command::from_token(first)),
                None => UpdateKind::Ignored("empty command"),
            }
        }
        InboundEvent::CallbackVote(cb) => UpdateKind::Vote {
            candidate_id: cb.candidate_id,
        },
        InboundEvent::Other => UpdateKind::Ignored("unsupported update"),
    }
}
