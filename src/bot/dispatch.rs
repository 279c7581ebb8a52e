use tracing::instrument;

use crate::bot::commands::{self, Command, GiftTarget};
use crate::bot::{BotIdentity, ChatUser, InboundEvent, Reply, Transport, format};
use crate::db::prelude::LedgerStore;
use crate::economy::{Economy, EconomyError, EconomyResult, ErrorKind, GiftRequest, Period};

/// Reply behaviour and read limits the dispatcher applies to every command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    pub delete_command: bool,
    pub ranking_limit: i64,
    pub history_limit: i64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            delete_command: false,
            ranking_limit: 20,
            history_limit: 50,
        }
    }
}

/// Routes inbound events to the economy and renders the outcome back through the transport
#[derive(Debug)]
pub struct Dispatcher<S, T> {
    economy: Economy<S>,
    transport: T,
    settings: DispatchSettings,
}

impl<S: LedgerStore, T: Transport> Dispatcher<S, T> {
    pub fn new(economy: Economy<S>, transport: T, settings: DispatchSettings) -> Self {
        Self {
            economy,
            transport,
            settings,
        }
    }

    #[cfg(test)]
    pub fn economy(&self) -> &Economy<S> {
        &self.economy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[instrument(skip(self, event), fields(chat = event.chat_id.0, user = event.sender.id.0, message = event.message_id))]
    pub async fn handle(&self, event: InboundEvent) {
        let me = match self.transport.bot_identity().await {
            Ok(me) => me,
            Err(e) => {
                tracing::error!(error = ?e, "failed to resolve bot identity");
                return;
            }
        };

        if !event.new_members.is_empty() {
            self.greet(&event, &me).await;
            return;
        }

        let command = event.text.as_deref().and_then(|text| {
            commands::parse(text, &me.username, event.reply_to.is_some())
        });

        match command {
            Some(Ok(command)) => self.run_command(&event, &me, command).await,
            Some(Err(e)) => {
                if event.chat_kind.is_group() {
                    tracing::debug!(error = %e, "malformed command");
                    self.reply(&event, format::parse_error(&e)).await;
                }
            }
            None => self.accrue(&event).await,
        }
    }

    async fn greet(&self, event: &InboundEvent, me: &BotIdentity) {
        if event.new_members.iter().any(|member| member.id == me.id) {
            tracing::info!("added to a new chat");
            self.send(Reply {
                chat_id: event.chat_id,
                text: format::welcome(&me.first_name),
                reply_to: None,
                delete_trigger: false,
            })
            .await;
        }
    }

    async fn accrue(&self, event: &InboundEvent) {
        let Some(kind) = event.activity else {
            return;
        };
        if !event.chat_kind.is_group() || event.sender.is_bot {
            return;
        }

        if let Err(e) = self
            .economy
            .award_activity(event.chat_id, event.sender.id, kind)
            .await
        {
            self.fail(event, &e).await;
        }
    }

    #[instrument(skip(self, event, me))]
    async fn run_command(&self, event: &InboundEvent, me: &BotIdentity, command: Command) {
        let anywhere = matches!(command, Command::Start | Command::Help | Command::Id);
        if !anywhere && !event.chat_kind.is_group() {
            tracing::debug!("group command outside a group chat, ignoring");
            return;
        }

        let chat_id = event.chat_id;
        let target = event.reply_to.as_ref().unwrap_or(&event.sender);

        let outcome = match command {
            Command::Start => Ok(format::start(&me.first_name)),
            Command::Help => Ok(format::HELP.to_string()),
            Command::Id => Ok(format::ids(chat_id, target.id)),

            Command::Stats => self
                .economy
                .stats(chat_id, target.id)
                .await
                .map(|account| match account {
                    Some(account) => format::stats(target, &account),
                    None => format::NO_STATS.to_string(),
                }),

            Command::Rank(period) => self.rank(event, period).await,

            Command::Top => self
                .economy
                .leaderboard(chat_id, self.settings.ranking_limit)
                .await
                .map(|accounts| match accounts.is_empty() {
                    true => format::NO_RANKINGS.to_string(),
                    false => format::leaderboard(&accounts),
                }),

            Command::History => match self.is_admin(event).await {
                Some(true) => self.history(event, target).await,
                Some(false) => Ok(format::NOT_ADMIN.to_string()),
                None => Ok(format::ADMIN_CHECK_FAILED.to_string()),
            },

            Command::Gift { to, amount } => {
                let receiver_id = match to {
                    GiftTarget::Reply => target.id,
                    GiftTarget::User(id) => id,
                };

                self.economy
                    .gift(GiftRequest {
                        chat_id,
                        sender_id: event.sender.id,
                        receiver_id,
                        amount: &amount,
                        bot_id: me.id,
                    })
                    .await
                    .map(|transfer| format::gift_sent(transfer.gift.amount, receiver_id))
            }

            Command::Shop => self.economy.shop_items().await.map(|items| {
                match items.is_empty() {
                    true => format::NO_ITEMS.to_string(),
                    false => format::shop(&items),
                }
            }),

            Command::Buy(item_id) => self
                .economy
                .purchase(chat_id, event.sender.id, item_id)
                .await
                .map(|receipt| {
                    format::purchased(&receipt.item, &receipt.boost, receipt.account.points)
                }),

            Command::Boost => self
                .economy
                .active_boosts(chat_id, event.sender.id)
                .await
                .map(|boosts| match boosts.is_empty() {
                    true => format::NO_BOOST.to_string(),
                    false => format::boosts(&boosts),
                }),
        };

        match outcome {
            Ok(text) => self.reply(event, text).await,
            Err(e) => self.fail(event, &e).await,
        }
    }

    async fn rank(&self, event: &InboundEvent, period: Period) -> EconomyResult<String> {
        let rows = self
            .economy
            .ranking(event.chat_id, self.settings.ranking_limit, period)
            .await?;

        Ok(match rows.is_empty() {
            true => format::NO_RANKINGS.to_string(),
            false => format::ranking(period, &rows),
        })
    }

    async fn history(&self, event: &InboundEvent, target: &ChatUser) -> EconomyResult<String> {
        let limit = self.settings.history_limit;
        let entries = self.economy.history(event.chat_id, target.id, limit).await?;

        Ok(match entries.is_empty() {
            true => format::NO_HISTORY.to_string(),
            false => format::history(target, &entries, limit),
        })
    }

    /// `None` when the administrator list could not be fetched
    async fn is_admin(&self, event: &InboundEvent) -> Option<bool> {
        match self.transport.chat_administrators(event.chat_id).await {
            Ok(admins) => Some(admins.contains(&event.sender.id)),
            Err(e) => {
                tracing::error!(error = ?e, "failed to retrieve chat administrators");
                None
            }
        }
    }

    async fn fail(&self, event: &InboundEvent, err: &EconomyError) {
        match err.kind() {
            ErrorKind::Persistence => tracing::error!(error = ?err, "economy operation failure"),
            ErrorKind::Validation | ErrorKind::Rule => {
                tracing::debug!(error = %err, "economy operation refused")
            }
        }

        self.reply(event, format::economy_error(err)).await;
    }

    async fn reply(&self, event: &InboundEvent, text: String) {
        self.send(Reply {
            chat_id: event.chat_id,
            text,
            reply_to: Some(event.message_id),
            delete_trigger: self.settings.delete_command,
        })
        .await;
    }

    async fn send(&self, reply: Reply) {
        if let Err(e) = self.transport.send_message(reply).await {
            tracing::error!(error = ?e, "failed to send reply");
        }
    }
}
