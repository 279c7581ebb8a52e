use std::time::Duration;

use sqlx::migrate::{Migrate, MigrateError, Migrator};
use sqlx::{PgConnection, PgPool};
use tracing::instrument;

use super::{DbResult, bounded};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Upper bound on the dirty-state cleanup and the retried run
const RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Applies pending migrations.
///
/// A migration left dirty by an earlier crash is forgotten (the schema falls back to the last
/// version that completed) and the run is retried exactly once before giving up.
///
/// Everything happens on one connection: the migrator's advisory lock is session-scoped and a
/// failed run returns without releasing it.
#[instrument(skip(pool))]
pub async fn run(pool: &PgPool) -> DbResult<()> {
    let mut conn = pool.acquire().await?;

    match MIGRATOR.run(&mut *conn).await {
        Ok(()) => {
            tracing::info!("migrations up to date");
            Ok(())
        }

        Err(MigrateError::Dirty(version)) => {
            tracing::warn!(version, "database is in a dirty state, forcing last good version");

            bounded(RECOVERY_TIMEOUT, async {
                conn.unlock().await?;
                force_clean(&mut conn, version).await?;

                if let Err(e) = MIGRATOR.run(&mut *conn).await {
                    tracing::error!(error = ?e, "migration failed after fixing dirty state");
                    release(&mut conn).await;
                    return Err(e.into());
                }

                Ok(())
            })
            .await?;

            tracing::info!("migrations up to date after dirty-state recovery");
            Ok(())
        }

        Err(e) => {
            tracing::error!(error = ?e, "migration failed");
            release(&mut conn).await;
            Err(e.into())
        }
    }
}

async fn force_clean(conn: &mut PgConnection, version: i64) -> DbResult<()> {
    let removed = sqlx::query(
        r#"
        DELETE FROM _sqlx_migrations
        WHERE version = $1
        AND success = false
        "#,
    )
    .bind(version)
    .execute(conn)
    .await?
    .rows_affected();

    tracing::debug!(version, removed, "dropped dirty migration record");
    Ok(())
}

/// Drops the migrator lock so the connection goes back to the pool clean
async fn release(conn: &mut PgConnection) {
    if let Err(e) = conn.unlock().await {
        tracing::warn!(error = ?e, "failed to release migration lock");
    }
}

#[cfg(test)]
mod test {
    use super::*;

    async fn dirty_versions(pool: &PgPool) -> Vec<i64> {
        sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success = false")
            .fetch_all(pool)
            .await
            .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_clean_database_is_left_alone(pool: PgPool) {
        run(&pool).await.unwrap();
        assert!(dirty_versions(&pool).await.is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_dirty_migration_is_reapplied(pool: PgPool) {
        sqlx::query("UPDATE _sqlx_migrations SET success = false WHERE version = $1")
            .bind(20250101000002_i64)
            .execute(&pool)
            .await
            .unwrap();
        assert_eq!(dirty_versions(&pool).await, vec![20250101000002]);

        tokio::time::timeout(Duration::from_secs(30), run(&pool))
            .await
            .expect("dirty-state recovery hung")
            .unwrap();

        assert!(dirty_versions(&pool).await.is_empty());

        let items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shop")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(items, 2);

        // the lock must be free again for the next migrator
        run(&pool).await.unwrap();
    }
}
