use sqlx::{Pool, Postgres, Result as SqlxResult};
use tracing::instrument;

use super::sql_fragment;
use crate::db::models::{Account, ChatId, UserId};

#[derive(Debug)]
pub struct AccountRepository {
    pool: &'static Pool<Postgres>,
}

impl AccountRepository {
    pub fn new(pool: &'static Pool<Postgres>) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, chat_id: ChatId, user_id: UserId) -> SqlxResult<Option<Account>> {
        sqlx::query_as::<_, Account>(&format!(
            r#"
            SELECT {}
            FROM users
            WHERE chat_id = $1
            AND user_id = $2
            "#,
            sql_fragment::ACCOUNT_FIELDS
        ))
        .bind(chat_id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await
    }

    /// Balances in a chat, highest first; ties fall back to the lower user id
    #[instrument(skip(self))]
    pub async fn leaderboard(&self, chat_id: ChatId, limit: i64) -> SqlxResult<Vec<Account>> {
        match sqlx::query_as::<_, Account>(&format!(
            r#"
            SELECT {}
            FROM users
            WHERE chat_id = $1
            ORDER BY points DESC, user_id ASC
            LIMIT $2
            "#,
            sql_fragment::ACCOUNT_FIELDS
        ))
        .bind(chat_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await
        {
            Ok(rows) => Ok(rows),
            Err(e) => {
                tracing::error!(error = ?e, "leaderboard query failure");
                Err(e)
            }
        }
    }
}
