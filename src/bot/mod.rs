use core::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::db::models::{ChatId, UserId};
use crate::economy::ActivityKind;

pub mod commands;
pub mod dispatch;
pub mod format;
pub mod telegram;

pub type TransportResult<T> = core::result::Result<T, TransportError>;

/// Chat platform the dispatcher talks to
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn send_message(&self, reply: Reply) -> TransportResult<()>;
    async fn delete_message(&self, chat_id: ChatId, message_id: i64) -> TransportResult<()>;

    /// Ids of the chat's creator and administrators
    async fn chat_administrators(&self, chat_id: ChatId) -> TransportResult<Vec<UserId>>;

    async fn bot_identity(&self) -> TransportResult<BotIdentity>;
}

/// Outgoing Markdown message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub chat_id: ChatId,
    pub text: String,
    /// Message to reply to
    pub reply_to: Option<i64>,
    /// Delete `reply_to` once the reply is sent
    pub delete_trigger: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: UserId,
    pub first_name: String,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    pub fn is_group(self) -> bool {
        matches!(self, Self::Group | Self::Supergroup)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    pub id: UserId,
    pub first_name: String,
    pub username: Option<String>,
    pub is_bot: bool,
}

/// Platform-neutral view of one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub message_id: i64,
    pub chat_id: ChatId,
    pub chat_kind: ChatKind,
    pub sender: ChatUser,
    pub text: Option<String>,
    /// What the message earns points as, if anything
    pub activity: Option<ActivityKind>,
    /// Author of the message this one replies to
    pub reply_to: Option<ChatUser>,
    pub new_members: Vec<ChatUser>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    #[error("{method} rejected: {description}")]
    Api { method: String, description: String },

    #[error("{0} returned no result")]
    EmptyResult(String),
}
