use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use tracing::instrument;

use crate::db::models::{
    Account, Boost, ChatId, LedgerEntry, NewEntry, NewGift, Purchase, RankingRow, ShopItem,
    Source, Transfer, UserId, Window,
};
use crate::db::repositories::account::AccountRepository;
use crate::db::repositories::boost::BoostRepository;
use crate::db::repositories::ledger::LedgerRepository;
use crate::db::repositories::shop::ShopRepository;
use crate::db::repositories::{LedgerStore, Tx};
use crate::db::{Conflict, DbResult, bounded};

/// Postgres-backed ledger. Every call is bounded by `timeout`.
#[derive(Debug)]
pub struct PgLedger {
    pool: &'static Pool<Postgres>,
    timeout: Duration,
}

impl PgLedger {
    pub fn new(pool: &'static Pool<Postgres>, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    #[instrument(skip(self))]
    async fn account(&self, chat_id: ChatId, user_id: UserId) -> DbResult<Option<Account>> {
        let repo = AccountRepository::new(self.pool);
        bounded(self.timeout, async { Ok(repo.get(chat_id, user_id).await?) }).await
    }

    #[instrument(skip(self, entry), fields(chat = entry.chat_id.0, user = entry.user_id.0, source = %entry.source))]
    async fn accrue(&self, entry: NewEntry) -> DbResult<Account> {
        let op = Tx::with_tx(self.pool, |mut tx| async move {
            let result: DbResult<Account> = async {
                let account = tx.credit_or_open(&entry).await?;
                tx.append_entry(&entry).await?;
                Ok(account)
            }
            .await;

            (tx, result)
        });

        bounded(self.timeout, op).await
    }

    #[instrument(skip(self, gift), fields(chat = gift.chat_id.0, sender = gift.sender_id.0, receiver = gift.receiver_id.0))]
    async fn transfer(&self, gift: NewGift) -> DbResult<Transfer> {
        let op = Tx::with_tx(self.pool, |mut tx| async move {
            let result: DbResult<Transfer> = async {
                // ascending lock order keeps two opposing gifts from deadlocking
                let (first, second) = if gift.sender_id <= gift.receiver_id {
                    (gift.sender_id, gift.receiver_id)
                } else {
                    (gift.receiver_id, gift.sender_id)
                };

                let first = tx.lock_account(gift.chat_id, first).await?;
                let second = tx.lock_account(gift.chat_id, second).await?;

                let (sender, receiver) = if gift.sender_id <= gift.receiver_id {
                    (first, second)
                } else {
                    (second, first)
                };

                let sender = sender.ok_or(Conflict::MissingAccount {
                    chat_id: gift.chat_id,
                    user_id: gift.sender_id,
                })?;
                receiver.ok_or(Conflict::MissingAccount {
                    chat_id: gift.chat_id,
                    user_id: gift.receiver_id,
                })?;

                if sender.points < gift.amount {
                    return Err(Conflict::InsufficientPoints {
                        balance: sender.points,
                        required: gift.amount,
                    }
                    .into());
                }

                let sender = tx
                    .adjust_points(gift.chat_id, gift.sender_id, -gift.amount)
                    .await?;
                let receiver = tx
                    .adjust_points(gift.chat_id, gift.receiver_id, gift.amount)
                    .await?;

                tx.append_entry(&NewEntry::loss(
                    gift.chat_id,
                    gift.sender_id,
                    gift.amount,
                    Source::Gift,
                ))
                .await?;
                tx.append_entry(&NewEntry::gain(
                    gift.chat_id,
                    gift.receiver_id,
                    gift.amount,
                    Source::Gift,
                ))
                .await?;

                let gift = tx.insert_gift(&gift).await?;

                Ok(Transfer {
                    gift,
                    sender,
                    receiver,
                })
            }
            .await;

            (tx, result)
        });

        bounded(self.timeout, op).await
    }

    #[instrument(skip(self, item), fields(item = item.id, kind = %item.kind))]
    async fn purchase(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        item: &ShopItem,
        now: DateTime<Utc>,
    ) -> DbResult<Purchase> {
        let op = Tx::with_tx(self.pool, |mut tx| async move {
            let result: DbResult<Purchase> = async {
                let account = tx
                    .lock_account(chat_id, user_id)
                    .await?
                    .ok_or(Conflict::MissingAccount { chat_id, user_id })?;

                if tx
                    .active_boost_of_kind(chat_id, user_id, &item.kind, now)
                    .await?
                    .is_some()
                {
                    return Err(Conflict::BoostActive(item.kind.clone()).into());
                }

                if account.points < item.price {
                    return Err(Conflict::InsufficientPoints {
                        balance: account.points,
                        required: item.price,
                    }
                    .into());
                }

                let account = tx.adjust_points(chat_id, user_id, -item.price).await?;
                tx.append_entry(&NewEntry::loss(
                    chat_id,
                    user_id,
                    item.price,
                    Source::BoostPurchase,
                ))
                .await?;
                let boost = tx.insert_boost(chat_id, user_id, item, now).await?;

                Ok(Purchase { boost, account })
            }
            .await;

            (tx, result)
        });

        bounded(self.timeout, op).await
    }

    #[instrument(skip(self))]
    async fn active_boost(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Boost>> {
        let repo = BoostRepository::new(self.pool);
        bounded(self.timeout, async {
            Ok(repo.active(chat_id, user_id, now).await?)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn active_boosts(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> DbResult<Vec<Boost>> {
        let repo = BoostRepository::new(self.pool);
        bounded(self.timeout, async {
            Ok(repo.active_all(chat_id, user_id, now).await?)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn shop_item(&self, item_id: i64) -> DbResult<Option<ShopItem>> {
        let repo = ShopRepository::new(self.pool);
        bounded(self.timeout, async { Ok(repo.get(item_id).await?) }).await
    }

    #[instrument(skip(self))]
    async fn shop_items(&self) -> DbResult<Vec<ShopItem>> {
        let repo = ShopRepository::new(self.pool);
        bounded(self.timeout, async { Ok(repo.list().await?) }).await
    }

    #[instrument(skip(self))]
    async fn ranking(
        &self,
        chat_id: ChatId,
        window: Window,
        limit: i64,
    ) -> DbResult<Vec<RankingRow>> {
        let repo = LedgerRepository::new(self.pool);
        bounded(self.timeout, async {
            Ok(repo.ranking(chat_id, window, limit).await?)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn history(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        limit: i64,
    ) -> DbResult<Vec<LedgerEntry>> {
        let repo = LedgerRepository::new(self.pool);
        bounded(self.timeout, async {
            Ok(repo.history(chat_id, user_id, limit).await?)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn leaderboard(&self, chat_id: ChatId, limit: i64) -> DbResult<Vec<Account>> {
        let repo = AccountRepository::new(self.pool);
        bounded(self.timeout, async {
            Ok(repo.leaderboard(chat_id, limit).await?)
        })
        .await
    }
}
