use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Result as SqlxResult};
use tracing::instrument;

use super::sql_fragment;
use crate::db::models::{Boost, ChatId, UserId};

#[derive(Debug)]
pub struct BoostRepository {
    pool: &'static Pool<Postgres>,
}

impl BoostRepository {
    pub fn new(pool: &'static Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Newest boost that has not lapsed at `now`, whatever its kind
    #[instrument(skip(self))]
    pub async fn active(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> SqlxResult<Option<Boost>> {
        sqlx::query_as::<_, Boost>(&format!(
            r#"
            SELECT {}
            FROM boosts
            WHERE chat_id = $1
            AND user_id = $2
            AND (expires_at IS NULL OR expires_at > $3)
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
            sql_fragment::BOOST_FIELDS
        ))
        .bind(chat_id)
        .bind(user_id)
        .bind(now)
        .fetch_optional(self.pool)
        .await
    }

    /// Newest unexpired boost of each kind
    #[instrument(skip(self))]
    pub async fn active_all(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> SqlxResult<Vec<Boost>> {
        sqlx::query_as::<_, Boost>(&format!(
            r#"
            SELECT DISTINCT ON (boost_type) {}
            FROM boosts
            WHERE chat_id = $1
            AND user_id = $2
            AND (expires_at IS NULL OR expires_at > $3)
            ORDER BY boost_type, created_at DESC, id DESC
            "#,
            sql_fragment::BOOST_FIELDS
        ))
        .bind(chat_id)
        .bind(user_id)
        .bind(now)
        .fetch_all(self.pool)
        .await
    }
}
