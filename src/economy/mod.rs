//! Business rules of the points economy.
//!
//! [`Economy`] validates requests, computes awards and hands every state change to a
//! [`LedgerStore`] as a single atomic operation. It never talks to the chat transport.

use chrono::Utc;
use thiserror::Error;
use tracing::instrument;

use crate::db::prelude::*;

pub mod award;
pub mod ranking;

pub use award::{ActivityKind, Award, PointsConfig};
pub use ranking::Period;

pub type EconomyResult<T> = core::result::Result<T, EconomyError>;

#[derive(Debug)]
pub struct Economy<S> {
    store: S,
    points: PointsConfig,
}

/// Points credited by one activity
#[derive(Debug, Clone, PartialEq)]
pub struct Accrual {
    pub award: Award,
    pub account: Account,
}

/// A committed purchase together with the item it was made from
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub item: ShopItem,
    pub boost: Boost,
    pub account: Account,
}

/// A gift as typed by the sender; `amount` is still raw text
#[derive(Debug, Clone, Copy)]
pub struct GiftRequest<'a> {
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub amount: &'a str,
    pub bot_id: UserId,
}

impl<S: LedgerStore> Economy<S> {
    pub fn new(store: S, points: PointsConfig) -> Self {
        Self { store, points }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Credits one activity. First-ever activity skips the boost lookup.
    #[instrument(skip(self), fields(chat = chat_id.0, user = user_id.0))]
    pub async fn award_activity(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        kind: ActivityKind,
    ) -> EconomyResult<Accrual> {
        let boosts = match self.store.account(chat_id, user_id).await? {
            Some(_) => self.store.active_boosts(chat_id, user_id, Utc::now()).await?,
            None => Vec::new(),
        };

        let award = self.points.award(kind, &boosts);
        let account = self
            .store
            .accrue(NewEntry::gain(chat_id, user_id, award.amount, award.source))
            .await?;

        tracing::trace!(amount = award.amount, source = %award.source, "activity points credited");
        Ok(Accrual { award, account })
    }

    #[instrument(skip(self, req), fields(chat = req.chat_id.0, sender = req.sender_id.0, receiver = req.receiver_id.0))]
    pub async fn gift(&self, req: GiftRequest<'_>) -> EconomyResult<Transfer> {
        let amount = parse_amount(req.amount)?;

        if req.sender_id == req.receiver_id {
            return Err(EconomyError::SelfGift);
        }
        if req.receiver_id == req.bot_id {
            return Err(EconomyError::GiftToBot);
        }

        let sender = self
            .store
            .account(req.chat_id, req.sender_id)
            .await?
            .ok_or(EconomyError::NoAccount(req.sender_id))?;

        if sender.points <= 0 || sender.points < amount {
            return Err(EconomyError::InsufficientPoints {
                balance: sender.points,
                required: amount,
            });
        }

        if self
            .store
            .account(req.chat_id, req.receiver_id)
            .await?
            .is_none()
        {
            return Err(EconomyError::UnknownReceiver(req.receiver_id));
        }

        let gift = NewGift {
            chat_id: req.chat_id,
            sender_id: req.sender_id,
            receiver_id: req.receiver_id,
            amount,
        };

        match self.store.transfer(gift).await {
            Ok(transfer) => {
                tracing::info!(amount, "gift transferred");
                Ok(transfer)
            }
            Err(DbError::Conflict(Conflict::MissingAccount { user_id, .. }))
                if user_id == req.receiver_id =>
            {
                Err(EconomyError::UnknownReceiver(user_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(chat = chat_id.0, user = user_id.0))]
    pub async fn purchase(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        item_id: i64,
    ) -> EconomyResult<Receipt> {
        if self.store.account(chat_id, user_id).await?.is_none() {
            return Err(EconomyError::NoAccount(user_id));
        }

        let item = self
            .store
            .shop_item(item_id)
            .await?
            .ok_or(EconomyError::UnknownItem(item_id))?;

        let Purchase { boost, account } = self
            .store
            .purchase(chat_id, user_id, &item, Utc::now())
            .await?;

        tracing::info!(item = item.id, kind = %item.kind, "boost purchased");
        Ok(Receipt {
            item,
            boost,
            account,
        })
    }

    /// Not wired to a command; `/boost` lists every active boost instead
    #[allow(dead_code)]
    #[instrument(skip(self))]
    pub async fn active_boost(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> EconomyResult<Option<Boost>> {
        Ok(self
            .store
            .active_boost(chat_id, user_id, Utc::now())
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn active_boosts(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> EconomyResult<Vec<Boost>> {
        Ok(self
            .store
            .active_boosts(chat_id, user_id, Utc::now())
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn stats(&self, chat_id: ChatId, user_id: UserId) -> EconomyResult<Option<Account>> {
        Ok(self.store.account(chat_id, user_id).await?)
    }

    #[instrument(skip(self))]
    pub async fn leaderboard(&self, chat_id: ChatId, limit: i64) -> EconomyResult<Vec<Account>> {
        Ok(self.store.leaderboard(chat_id, limit).await?)
    }

    /// Per-user totals for the `period` window containing the current instant
    #[instrument(skip(self))]
    pub async fn ranking(
        &self,
        chat_id: ChatId,
        limit: i64,
        period: Period,
    ) -> EconomyResult<Vec<RankingRow>> {
        let window = period.window(Utc::now());
        Ok(self.store.ranking(chat_id, window, limit).await?)
    }

    #[instrument(skip(self))]
    pub async fn history(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        limit: i64,
    ) -> EconomyResult<Vec<LedgerEntry>> {
        Ok(self.store.history(chat_id, user_id, limit).await?)
    }

    #[instrument(skip(self))]
    pub async fn shop_items(&self) -> EconomyResult<Vec<ShopItem>> {
        Ok(self.store.shop_items().await?)
    }

}

fn parse_amount(raw: &str) -> EconomyResult<i64> {
    match raw.trim().parse::<i64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(EconomyError::InvalidAmount(raw.to_string())),
    }
}

/// Broad class of an [`EconomyError`], which decides how it is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input; nothing was touched
    Validation,
    /// A business rule refused the operation; nothing was applied
    Rule,
    /// The store failed; logged and reported generically
    Persistence,
}

#[derive(Debug, Error)]
pub enum EconomyError {
    #[error("'{0}' is not a positive whole number")]
    InvalidAmount(String),

    #[error("cannot gift points to yourself")]
    SelfGift,

    #[error("cannot gift points to the bot")]
    GiftToBot,

    #[error("user {0} has no points yet")]
    NoAccount(UserId),

    #[error("balance of {balance} cannot cover {required}")]
    InsufficientPoints { balance: i64, required: i64 },

    #[error("user {0} has never been active here")]
    UnknownReceiver(UserId),

    #[error("a '{0}' boost is already active")]
    BoostActive(BoostKind),

    #[error("no shop item with id {0}")]
    UnknownItem(i64),

    #[error(transparent)]
    Store(DbError),
}

impl EconomyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount(_) => ErrorKind::Validation,
            Self::Store(_) => ErrorKind::Persistence,
            _ => ErrorKind::Rule,
        }
    }
}

/// Conflicts detected inside a transaction surface as the rule they violated
impl From<DbError> for EconomyError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Conflict(Conflict::MissingAccount { user_id, .. }) => Self::NoAccount(user_id),
            DbError::Conflict(Conflict::InsufficientPoints { balance, required }) => {
                Self::InsufficientPoints { balance, required }
            }
            DbError::Conflict(Conflict::BoostActive(kind)) => Self::BoostActive(kind),
            other => Self::Store(other),
        }
    }
}
