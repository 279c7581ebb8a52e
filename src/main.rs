use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::bot::dispatch::{DispatchSettings, Dispatcher};
use crate::bot::telegram::Telegram;
use crate::bot::{Transport, TransportError};
use crate::db::prelude::*;
use crate::economy::{Economy, PointsConfig};
use crate::util::env::{self, EnvErr, Var};
use crate::util::telemetry;

mod args;
mod bot;
mod db;
mod economy;
mod util;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Env(#[from] EnvErr),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = args::parse_cli_args();
    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path).map_err(EnvErr::from)?;
        }
        // a missing .env is fine, the process environment may carry everything
        None => {
            _ = dotenvy::dotenv();
        }
    }

    let config = env::env().await?;
    telemetry::register(config.log_format);

    tracing::info!("starting modbot");

    let points = PointsConfig::from_env(config)?;
    let pool = db_pool().await?;
    db::migrate::run(pool).await?;

    if cli.migrate_only {
        tracing::info!("migrations applied, exiting");
        return Ok(());
    }

    let token = env::get_var(Var::Token).await?;
    let telegram = Telegram::new(token, Duration::from_secs(config.poll_timeout_secs))?;
    let me = telegram.bot_identity().await?;
    tracing::info!(id = %me.id, username = %me.username, "bot identity confirmed");

    let store = PgLedger::new(pool, Duration::from_secs(config.store_timeout_secs));
    let dispatcher = Arc::new(Dispatcher::new(
        Economy::new(store, points),
        telegram,
        DispatchSettings {
            delete_command: config.delete_command,
            ranking_limit: config.ranking_limit,
            history_limit: config.history_limit,
        },
    ));

    let updates = dispatcher.transport().updates();
    tokio::pin!(updates);

    loop {
        tokio::select! {
            Some(event) = updates.next() => {
                let dispatcher = Arc::clone(&dispatcher);
                let span = tracing::info_span!("update", request_id = %Uuid::new_v4());

                tokio::spawn(async move { dispatcher.handle(event).await }.instrument(span));
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}
