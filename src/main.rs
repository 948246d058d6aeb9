use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;

use tracing::info;

use relay::server::services::RelayServices;
use relay::{AppConfig, ApplicationServer, Logger, RedisDatabase};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Arc::new(AppConfig::parse());

    // guards flush the log writer and keep sentry alive until main returns
    let _guards = Logger::init(&config);

    info!("logger and env prepped...");

    let redis_db = match config.redis_url.as_deref() {
        Some(redis_url) => {
            info!("connecting to redis...");
            let redis_db = RedisDatabase::connect(redis_url)
                .await
                .context("could not connect to redis")?;
            Some(redis_db)
        }
        None => None,
    };

    let services = RelayServices::new(config.clone(), redis_db)
        .context("could not start relay services")?;

    info!("services ok, starting relay server...");

    ApplicationServer::serve(config, services)
        .await
        .context("relay server failed to start")?;

    Ok(())
}
