use sqlx::{Pool, Postgres, Result as SqlxResult};
use tracing::instrument;

use super::sql_fragment;
use crate::db::models::ShopItem;

#[derive(Debug)]
pub struct ShopRepository {
    pool: &'static Pool<Postgres>,
}

impl ShopRepository {
    pub fn new(pool: &'static Pool<Postgres>) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, item_id: i64) -> SqlxResult<Option<ShopItem>> {
        sqlx::query_as::<_, ShopItem>(&format!(
            "SELECT {} FROM shop WHERE id = $1",
            sql_fragment::SHOP_FIELDS
        ))
        .bind(item_id)
        .fetch_optional(self.pool)
        .await
    }

    /// Whole catalog, cheapest first
    #[instrument(skip(self))]
    pub async fn list(&self) -> SqlxResult<Vec<ShopItem>> {
        sqlx::query_as::<_, ShopItem>(&format!(
            "SELECT {} FROM shop ORDER BY price ASC, id ASC",
            sql_fragment::SHOP_FIELDS
        ))
        .fetch_all(self.pool)
        .await
    }
}
