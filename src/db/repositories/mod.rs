use core::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Transaction};
use tracing::instrument;

use crate::db::DbResult;
use crate::db::models::{
    Account, Boost, BoostKind, ChatId, Gift, LedgerEntry, NewEntry, NewGift, Purchase,
    RankingRow, ShopItem, Transfer, UserId, Window,
};

pub mod account;
pub mod boost;
pub mod ledger;
pub mod shop;

/// Persistence seam of the economy engine.
///
/// Every mutating method is one transaction: it either applies the balance change(s), the
/// matching ledger entries and any gift/boost rows together, or applies nothing.
#[async_trait]
pub trait LedgerStore: Send + Sync + fmt::Debug {
    async fn account(&self, chat_id: ChatId, user_id: UserId) -> DbResult<Option<Account>>;

    /// Credits `entry.amount` to the account (opening it when missing) and appends `entry`
    async fn accrue(&self, entry: NewEntry) -> DbResult<Account>;

    /// Debits the sender, credits the receiver, appends both entries and the gift record.
    /// Both accounts must exist and the sender must cover the amount.
    async fn transfer(&self, gift: NewGift) -> DbResult<Transfer>;

    /// Debits the item price, appends the purchase entry and records the boost. Fails with a
    /// conflict when a boost of the same kind is already active at `now`.
    async fn purchase(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        item: &ShopItem,
        now: DateTime<Utc>,
    ) -> DbResult<Purchase>;

    /// Any one boost active at `now`
    #[allow(dead_code)]
    async fn active_boost(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Boost>>;

    /// Every boost active at `now`, at most one per kind
    async fn active_boosts(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> DbResult<Vec<Boost>>;

    async fn shop_item(&self, item_id: i64) -> DbResult<Option<ShopItem>>;
    async fn shop_items(&self) -> DbResult<Vec<ShopItem>>;

    /// Signed per-user totals inside `window`, highest first
    async fn ranking(&self, chat_id: ChatId, window: Window, limit: i64)
    -> DbResult<Vec<RankingRow>>;

    /// Most recent entries first
    async fn history(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        limit: i64,
    ) -> DbResult<Vec<LedgerEntry>>;

    /// All-time balances, highest first
    async fn leaderboard(&self, chat_id: ChatId, limit: i64) -> DbResult<Vec<Account>>;
}

pub mod sql_fragment {
    pub const ACCOUNT_FIELDS: &str = r#"
        chat_id,
        user_id,
        points,
        created_at,
        updated_at
    "#;

    pub const ENTRY_FIELDS: &str = r#"
        id,
        chat_id,
        user_id,
        amount,
        change,
        source,
        timestamp
    "#;

    pub const BOOST_FIELDS: &str = r#"
        id,
        user_id,
        chat_id,
        item_id,
        boost_type,
        expires_at,
        created_at
    "#;

    pub const SHOP_FIELDS: &str = r#"
        id,
        name,
        type,
        description,
        price,
        duration,
        created_at
    "#;
}

pub struct Tx {
    inner: Option<Transaction<'static, Postgres>>,
}

impl Tx {
    /// Runs `f` inside a transaction: commits when it returns `Ok`, rolls back otherwise.
    ///
    /// `f` hands the transaction back alongside its result so the outcome decides the ending.
    #[instrument(skip(pool, f))]
    pub async fn with_tx<F, Fut, T>(pool: &'static Pool<Postgres>, f: F) -> DbResult<T>
    where
        F: FnOnce(Tx) -> Fut,
        Fut: Future<Output = (Tx, DbResult<T>)>,
    {
        let tx = Self::begin(pool).await?;
        let (mut tx, result) = f(tx).await;

        match result {
            Ok(val) => {
                tx.commit().await?;
                Ok(val)
            }
            Err(e) => {
                tracing::debug!(error = ?e, "transacted query failure, rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = ?rollback_err, "rollback failure");
                }
                Err(e)
            }
        }
    }

    #[instrument(skip(pool))]
    pub async fn begin(pool: &'static Pool<Postgres>) -> DbResult<Self> {
        let inner = pool.begin().await?;
        Ok(Self { inner: Some(inner) })
    }

    #[instrument(skip(self))]
    pub async fn commit(&mut self) -> DbResult<()> {
        match self.inner.take() {
            Some(tx) => Ok(tx.commit().await?),
            None => Err(completed().into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn rollback(&mut self) -> DbResult<()> {
        match self.inner.take() {
            Some(tx) => Ok(tx.rollback().await?),
            None => Err(completed().into()),
        }
    }

    fn inner_mut(&mut self) -> DbResult<&mut Transaction<'static, Postgres>> {
        self.inner.as_mut().ok_or_else(|| completed().into())
    }

    /// Reads an account and holds its row lock until the transaction ends
    #[instrument(skip(self))]
    pub async fn lock_account(
        &mut self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> DbResult<Option<Account>> {
        Ok(sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM users WHERE chat_id = $1 AND user_id = $2 FOR UPDATE",
            sql_fragment::ACCOUNT_FIELDS
        ))
        .bind(chat_id)
        .bind(user_id)
        .fetch_optional(&mut **self.inner_mut()?)
        .await?)
    }

    /// Adds `entry.amount` to the balance, creating the account with that amount when it does
    /// not exist yet. The increment happens in the database so concurrent credits cannot lose
    /// updates.
    #[instrument(skip(self, entry), fields(chat = entry.chat_id.0, user = entry.user_id.0, amount = entry.amount))]
    pub async fn credit_or_open(&mut self, entry: &NewEntry) -> DbResult<Account> {
        Ok(sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO users (
                chat_id,
                user_id,
                points,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, NOW(), NOW())
            ON CONFLICT (chat_id, user_id)
            DO UPDATE SET
                points = users.points + EXCLUDED.points,
                updated_at = NOW()
            RETURNING {}
            "#,
            sql_fragment::ACCOUNT_FIELDS
        ))
        .bind(entry.chat_id)
        .bind(entry.user_id)
        .bind(entry.amount)
        .fetch_one(&mut **self.inner_mut()?)
        .await?)
    }

    /// Adds a signed `delta` to an existing balance
    #[instrument(skip(self))]
    pub async fn adjust_points(
        &mut self,
        chat_id: ChatId,
        user_id: UserId,
        delta: i64,
    ) -> DbResult<Account> {
        Ok(sqlx::query_as::<_, Account>(&format!(
            r#"
            UPDATE users
            SET points = points + $3,
                updated_at = NOW()
            WHERE chat_id = $1
            AND user_id = $2
            RETURNING {}
            "#,
            sql_fragment::ACCOUNT_FIELDS
        ))
        .bind(chat_id)
        .bind(user_id)
        .bind(delta)
        .fetch_one(&mut **self.inner_mut()?)
        .await?)
    }

    #[instrument(skip(self, entry), fields(source = %entry.source))]
    pub async fn append_entry(&mut self, entry: &NewEntry) -> DbResult<LedgerEntry> {
        Ok(sqlx::query_as::<_, LedgerEntry>(&format!(
            r#"
            INSERT INTO point_history (
                chat_id,
                user_id,
                amount,
                change,
                source,
                timestamp
            )
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING {}
            "#,
            sql_fragment::ENTRY_FIELDS
        ))
        .bind(entry.chat_id)
        .bind(entry.user_id)
        .bind(entry.amount)
        .bind(entry.direction.as_str())
        .bind(entry.source.as_str())
        .fetch_one(&mut **self.inner_mut()?)
        .await?)
    }

    #[instrument(skip(self))]
    pub async fn insert_gift(&mut self, gift: &NewGift) -> DbResult<Gift> {
        Ok(sqlx::query_as::<_, Gift>(
            r#"
            INSERT INTO gifts (
                chat_id,
                sender_id,
                receiver_id,
                amount,
                timestamp
            )
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING
                id,
                chat_id,
                sender_id,
                receiver_id,
                amount,
                timestamp
            "#,
        )
        .bind(gift.chat_id)
        .bind(gift.sender_id)
        .bind(gift.receiver_id)
        .bind(gift.amount)
        .fetch_one(&mut **self.inner_mut()?)
        .await?)
    }

    #[instrument(skip(self))]
    pub async fn active_boost_of_kind(
        &mut self,
        chat_id: ChatId,
        user_id: UserId,
        kind: &BoostKind,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Boost>> {
        Ok(sqlx::query_as::<_, Boost>(&format!(
            r#"
            SELECT {}
            FROM boosts
            WHERE chat_id = $1
            AND user_id = $2
            AND boost_type = $3
            AND (expires_at IS NULL OR expires_at > $4)
            LIMIT 1
            "#,
            sql_fragment::BOOST_FIELDS
        ))
        .bind(chat_id)
        .bind(user_id)
        .bind(kind.as_str())
        .bind(now)
        .fetch_optional(&mut **self.inner_mut()?)
        .await?)
    }

    #[instrument(skip(self, item), fields(item = item.id))]
    pub async fn insert_boost(
        &mut self,
        chat_id: ChatId,
        user_id: UserId,
        item: &ShopItem,
        now: DateTime<Utc>,
    ) -> DbResult<Boost> {
        Ok(sqlx::query_as::<_, Boost>(&format!(
            r#"
            INSERT INTO boosts (
                user_id,
                chat_id,
                item_id,
                boost_type,
                expires_at,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            sql_fragment::BOOST_FIELDS
        ))
        .bind(user_id)
        .bind(chat_id)
        .bind(item.id)
        .bind(item.kind.as_str())
        .bind(item.expiry_from(now))
        .bind(now)
        .fetch_one(&mut **self.inner_mut()?)
        .await?)
    }
}

fn completed() -> sqlx::Error {
    sqlx::Error::Protocol("Transaction already completed".into())
}
