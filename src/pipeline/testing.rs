//! In-process stand-in for the messaging platform used by pipeline tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::platform::{
    ChatPlatform, InboundEvent, IncomingMessage, MembershipStatus, MessageRef, PlatformError,
    RawEvent, VoteCallback,
};
use crate::render::ButtonGrid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Message {
        chat_id: i64,
        text: String,
        reply_to: Option<i32>,
        buttons: ButtonGrid,
    },
    Edit {
        target: MessageRef,
        buttons: ButtonGrid,
    },
}

/// Records every call and replays scripted fetch results
#[derive(Default)]
pub struct FakePlatform {
    batches: Mutex<VecDeque<Result<Vec<RawEvent>, PlatformError>>>,
    offsets: Mutex<Vec<i64>>,
    deliveries: Mutex<Vec<Delivery>>,
    members: Mutex<HashMap<i64, MembershipStatus>>,
    membership_checks: Mutex<Vec<(i64, i64)>>,
    fail_membership: Mutex<bool>,
    fail_sends: Mutex<usize>,
    panic_on_send: Mutex<bool>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_batch(&self, events: Vec<RawEvent>) {
        self.batches.lock().unwrap().push_back(Ok(events));
    }

    pub fn push_failure(&self) {
        self.batches
            .lock()
            .unwrap()
            .push_back(Err(PlatformError::Transient("connection reset".into())));
    }

    pub fn set_member(&self, user_id: i64, status: MembershipStatus) {
        self.members.lock().unwrap().insert(user_id, status);
    }

    pub fn fail_membership_checks(&self) {
        *self.fail_membership.lock().unwrap() = true;
    }

    /// Make the next `n` sends or edits fail
    pub fn fail_next_sends(&self, n: usize) {
        *self.fail_sends.lock().unwrap() = n;
    }

    /// Make every send panic, as a bug in the delivery path would
    pub fn panic_on_send(&self) {
        *self.panic_on_send.lock().unwrap() = true;
    }

    pub fn offsets(&self) -> Vec<i64> {
        self.offsets.lock().unwrap().clone()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn membership_checks(&self) -> Vec<(i64, i64)> {
        self.membership_checks.lock().unwrap().clone()
    }

    fn take_send_failure(&self) -> bool {
        let mut remaining = self.fail_sends.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn fetch_events(&self, offset: i64, _limit: u8) -> Result<Vec<RawEvent>, PlatformError> {
        self.offsets.lock().unwrap().push(offset);
        self.batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
        buttons: &ButtonGrid,
    ) -> Result<i32, PlatformError> {
        if *self.panic_on_send.lock().unwrap() {
            panic!("send_message blew up");
        }
        if self.take_send_failure() {
            return Err(PlatformError::Transient("too many requests".into()));
        }
        let mut deliveries = self.deliveries.lock().unwrap();
        deliveries.push(Delivery::Message {
            chat_id,
            text: text.to_string(),
            reply_to,
            buttons: buttons.clone(),
        });
        Ok(deliveries.len() as i32)
    }

    async fn edit_message_buttons(
        &self,
        target: MessageRef,
        buttons: &ButtonGrid,
    ) -> Result<(), PlatformError> {
        if self.take_send_failure() {
            return Err(PlatformError::NotFound("message to edit not found".into()));
        }
        self.deliveries.lock().unwrap().push(Delivery::Edit {
            target,
            buttons: buttons.clone(),
        });
        Ok(())
    }

    async fn check_membership(
        &self,
        group_id: i64,
        user_id: i64,
    ) -> Result<MembershipStatus, PlatformError> {
        self.membership_checks
            .lock()
            .unwrap()
            .push((group_id, user_id));
        if *self.fail_membership.lock().unwrap() {
            return Err(PlatformError::Transient("timeout".into()));
        }
        Ok(self
            .members
            .lock()
            .unwrap()
            .get(&user_id)
            .copied()
            .unwrap_or(MembershipStatus::None))
    }
}

/// A command message as Telegram would deliver it
pub fn command(chat_id: i64, message_id: i32, user_id: i64, text: &str) -> InboundEvent {
    InboundEvent::Message(IncomingMessage {
        chat_id,
        message_id,
        user_id,
        user_name: format!("user{}", user_id),
        text: Some(text.to_string()),
        has_command: true,
    })
}

pub fn vote_callback(callback: VoteCallback) -> InboundEvent {
    InboundEvent::CallbackVote(callback)
}
