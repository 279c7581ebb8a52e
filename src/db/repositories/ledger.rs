use sqlx::{Pool, Postgres, Result as SqlxResult};
use tracing::instrument;

use super::sql_fragment;
use crate::db::models::{ChatId, LedgerEntry, RankingRow, UserId, Window};

#[derive(Debug)]
pub struct LedgerRepository {
    pool: &'static Pool<Postgres>,
}

impl LedgerRepository {
    pub fn new(pool: &'static Pool<Postgres>) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn history(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        limit: i64,
    ) -> SqlxResult<Vec<LedgerEntry>> {
        sqlx::query_as::<_, LedgerEntry>(&format!(
            r#"
            SELECT {}
            FROM point_history
            WHERE chat_id = $1
            AND user_id = $2
            ORDER BY timestamp DESC, id DESC
            LIMIT $3
            "#,
            sql_fragment::ENTRY_FIELDS
        ))
        .bind(chat_id)
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await
    }

    /// Signed totals of every user with at least one entry in `[window.start, window.end)`
    #[instrument(skip(self))]
    pub async fn ranking(
        &self,
        chat_id: ChatId,
        window: Window,
        limit: i64,
    ) -> SqlxResult<Vec<RankingRow>> {
        match sqlx::query_as::<_, RankingRow>(
            r#"
            SELECT
                user_id,
                SUM(amount)::BIGINT AS total
            FROM point_history
            WHERE chat_id = $1
            AND timestamp >= $2
            AND timestamp < $3
            GROUP BY user_id
            ORDER BY total DESC, user_id ASC
            LIMIT $4
            "#,
        )
        .bind(chat_id)
        .bind(window.start)
        .bind(window.end)
        .bind(limit)
        .fetch_all(self.pool)
        .await
        {
            Ok(rows) => Ok(rows),
            Err(e) => {
                tracing::error!(error = ?e, "ranking query failure");
                Err(e)
            }
        }
    }
}
