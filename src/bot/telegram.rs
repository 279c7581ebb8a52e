use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt, stream};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::instrument;

use crate::bot::{
    BotIdentity, ChatKind, ChatUser, InboundEvent, Reply, Transport, TransportError,
    TransportResult,
};
use crate::db::models::{ChatId, UserId};
use crate::economy::ActivityKind;

pub const API_BASE: &str = "https://api.telegram.org";

/// Pause after a failed poll before asking again
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Bot API client. Updates arrive by long polling; the bot's own identity is fetched once.
#[derive(Debug)]
pub struct Telegram {
    client: reqwest::Client,
    base: String,
    poll_timeout: Duration,
    identity: OnceCell<BotIdentity>,
}

impl Telegram {
    pub fn new(token: &str, poll_timeout: Duration) -> TransportResult<Self> {
        Self::with_base(API_BASE, token, poll_timeout)
    }

    /// Client against a Bot API server other than the public one
    pub fn with_base(
        api_base: &str,
        token: &str,
        poll_timeout: Duration,
    ) -> TransportResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(poll_timeout + Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base: format!("{}/bot{token}", api_base.trim_end_matches('/')),
            poll_timeout,
            identity: OnceCell::new(),
        })
    }

    /// Endless stream of inbound messages. Poll failures are logged and retried after a pause.
    pub fn updates(&self) -> impl Stream<Item = InboundEvent> + '_ {
        stream::unfold(0_i64, move |offset| async move {
            match self.get_updates(offset).await {
                Ok(batch) => Some(decode_batch(offset, batch)),
                Err(e) => {
                    tracing::error!(error = ?e, "update poll failure");
                    tokio::time::sleep(RETRY_DELAY).await;
                    Some((Vec::new(), offset))
                }
            }
        })
        .flat_map(stream::iter)
    }

    #[instrument(skip(self))]
    async fn get_updates(&self, offset: i64) -> TransportResult<Vec<Value>> {
        let updates: Vec<Value> = self
            .call(
                "getUpdates",
                &json!({
                    "offset": offset,
                    "timeout": self.poll_timeout.as_secs(),
                    "allowed_updates": ["message"],
                }),
            )
            .await?;

        if !updates.is_empty() {
            tracing::debug!(count = updates.len(), "received updates");
        }
        Ok(updates)
    }

    /// POSTs `params` to `method` and unwraps the `{ok, result, description}` envelope
    async fn call<P, R>(&self, method: &str, params: &P) -> TransportResult<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let envelope = self
            .client
            .post(format!("{}/{method}", self.base))
            .json(params)
            .send()
            .await?
            .json::<Envelope<R>>()
            .await?;

        envelope.into_result(method)
    }
}

/// Converts one `getUpdates` batch and returns the next offset.
///
/// The offset moves past every update id in the batch, including updates that fail to decode,
/// which are logged and dropped.
fn decode_batch(offset: i64, batch: Vec<Value>) -> (Vec<InboundEvent>, i64) {
    let next = batch
        .iter()
        .filter_map(|raw| raw.get("update_id").and_then(Value::as_i64))
        .map(|id| id + 1)
        .fold(offset, i64::max);

    let events = batch
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<Update>(raw) {
            Ok(update) => update.message.and_then(Message::into_event),
            Err(e) => {
                tracing::warn!(error = ?e, "skipping malformed update");
                None
            }
        })
        .collect();

    (events, next)
}

#[async_trait]
impl Transport for Telegram {
    #[instrument(skip(self, reply), fields(chat = reply.chat_id.0))]
    async fn send_message(&self, reply: Reply) -> TransportResult<()> {
        let mut params = json!({
            "chat_id": reply.chat_id.0,
            "text": reply.text,
            "parse_mode": "Markdown",
        });
        if let Some(message_id) = reply.reply_to {
            params["reply_parameters"] = json!({
                "message_id": message_id,
                "allow_sending_without_reply": true,
            });
        }

        let _: Value = self.call("sendMessage", &params).await?;

        if reply.delete_trigger
            && let Some(message_id) = reply.reply_to
            && let Err(e) = self.delete_message(reply.chat_id, message_id).await
        {
            tracing::warn!(error = ?e, "failed to delete command message");
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_message(&self, chat_id: ChatId, message_id: i64) -> TransportResult<()> {
        let _: bool = self
            .call(
                "deleteMessage",
                &json!({ "chat_id": chat_id.0, "message_id": message_id }),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn chat_administrators(&self, chat_id: ChatId) -> TransportResult<Vec<UserId>> {
        let members: Vec<ChatMember> = self
            .call("getChatAdministrators", &json!({ "chat_id": chat_id.0 }))
            .await?;

        Ok(members
            .into_iter()
            .filter(|m| matches!(m.status.as_str(), "creator" | "administrator"))
            .map(|m| UserId(m.user.id))
            .collect())
    }

    async fn bot_identity(&self) -> TransportResult<BotIdentity> {
        self.identity
            .get_or_try_init(|| async {
                let me: User = self.call("getMe", &json!({})).await?;
                tracing::info!(id = me.id, username = ?me.username, "resolved bot identity");

                Ok::<_, TransportError>(BotIdentity {
                    id: UserId(me.id),
                    first_name: me.first_name,
                    username: me.username.unwrap_or_default(),
                })
            })
            .await
            .cloned()
    }
}

// ---
//  Bot API wire types (only the fields the bot reads)
// ---

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> Envelope<T> {
    fn into_result(self, method: &str) -> TransportResult<T> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err(TransportError::EmptyResult(method.to_string())),
            (false, _) => Err(TransportError::Api {
                method: method.to_string(),
                description: self.description.unwrap_or_default(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Update {
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    from: Option<User>,
    chat: Chat,
    text: Option<String>,
    document: Option<Value>,
    photo: Option<Vec<Value>>,
    sticker: Option<Value>,
    audio: Option<Value>,
    animation: Option<Value>,
    reply_to_message: Option<Box<Message>>,
    #[serde(default)]
    new_chat_members: Vec<User>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    #[serde(rename = "type")]
    kind: ChatKind,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    first_name: String,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMember {
    status: String,
    user: User,
}

impl Message {
    /// Animations also carry a `document`, so they are classified first
    fn activity(&self) -> Option<ActivityKind> {
        if self.text.is_some() {
            Some(ActivityKind::Text)
        } else if self.animation.is_some() {
            Some(ActivityKind::Animation)
        } else if self.document.is_some() {
            Some(ActivityKind::Document)
        } else if self.photo.is_some() {
            Some(ActivityKind::Photo)
        } else if self.sticker.is_some() {
            Some(ActivityKind::Sticker)
        } else if self.audio.is_some() {
            Some(ActivityKind::Audio)
        } else {
            None
        }
    }

    fn into_event(self) -> Option<InboundEvent> {
        let activity = self.activity();
        let sender: ChatUser = self.from?.into();

        Some(InboundEvent {
            message_id: self.message_id,
            chat_id: ChatId(self.chat.id),
            chat_kind: self.chat.kind,
            sender,
            text: self.text,
            activity,
            reply_to: self
                .reply_to_message
                .and_then(|m| m.from)
                .map(ChatUser::from),
            new_members: self.new_chat_members.into_iter().map(Into::into).collect(),
        })
    }
}

impl From<User> for ChatUser {
    fn from(user: User) -> Self {
        Self {
            id: UserId(user.id),
            first_name: user.first_name,
            username: user.username,
            is_bot: user.is_bot,
        }
    }
}
