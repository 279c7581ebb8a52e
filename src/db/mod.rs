use std::sync::LazyLock;
use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::db::models::{BoostKind, ChatId, UserId};
use crate::util::env::{self, Var};
use crate::var;

#[cfg(test)]
pub mod memory;
pub mod migrate;
pub mod models;
pub mod repositories;
pub mod store;

pub mod prelude {
    pub use crate::db::models::{
        Account, Boost, BoostKind, ChatId, LedgerEntry, NewEntry, NewGift, Purchase, RankingRow,
        ShopItem, Transfer, UserId,
    };
    pub use crate::db::repositories::LedgerStore;
    pub use crate::db::store::PgLedger;
    pub use crate::db::{Conflict, DbError, db_pool};
}

static DB_POOL: LazyLock<OnceCell<Db>> = LazyLock::new(OnceCell::new);

pub async fn db_pool() -> DbResult<&'static PgPool> {
    Ok(&DB_POOL
        .get_or_try_init(|| async { Db::new_pool().await })
        .await?
        .pool)
}

struct Db {
    pool: PgPool,
}

impl Db {
    pub async fn new_pool() -> DbResult<Self> {
        let db_url = var!(Var::DatabaseUrl).await?;
        let timeout = Duration::from_secs(env::env().await?.store_timeout_secs);

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(timeout)
            .connect(db_url)
            .await?;

        tracing::info!("connected to database");
        Ok(Self { pool })
    }
}

/// Runs a store operation under a deadline. The future is dropped on expiry, which rolls back
/// any transaction it had open.
pub async fn bounded<T, F>(limit: Duration, op: F) -> DbResult<T>
where
    F: Future<Output = DbResult<T>>,
{
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(limit_ms = limit.as_millis() as u64, "store operation timed out");
            Err(DbError::Timeout(limit))
        }
    }
}

pub type DbResult<T> = core::result::Result<T, DbError>;

#[allow(clippy::enum_variant_names)]
#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    SqlxError(#[from] sqlx::Error),

    #[error(transparent)]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("{0}")]
    EnvError(#[from] env::EnvErr),

    #[error("store operation exceeded {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Conflict(#[from] Conflict),
}

/// A precondition that no longer held once the transaction locked its rows
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Conflict {
    #[error("user {user_id} has no account in chat {chat_id}")]
    MissingAccount { chat_id: ChatId, user_id: UserId },

    #[error("balance of {balance} cannot cover {required}")]
    InsufficientPoints { balance: i64, required: i64 },

    #[error("a '{0}' boost is already active")]
    BoostActive(BoostKind),
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, DbError>(1)
        };

        let err = bounded(Duration::from_secs(5), slow).await.unwrap_err();
        assert!(matches!(err, DbError::Timeout(d) if d == Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_bounded_passes_results_through() {
        let value = bounded(Duration::from_secs(5), async { Ok::<_, DbError>(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }
}
