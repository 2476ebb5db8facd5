use crate::components::google_calendar::{GoogleCalendarClient, GoogleOAuthClient};
use crate::components::redis_service::{RedisActor, RedisActorHandle, RedisNotifier};
use crate::components::sync::SyncEngine;
use crate::config::{Config, SyncSettings};
use crate::error::{Error, SyncResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging with environment-based configuration
pub fn init_logging() -> miette::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,household_sync=debug,reqwest=warn")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Other(format!("Failed to set up logging: {}", e)))?;

    Ok(())
}

/// Load and initialize the application config
pub async fn load_config() -> miette::Result<Arc<RwLock<Config>>> {
    match Config::load() {
        Ok(config) => Ok(Arc::new(RwLock::new(config))),
        Err(e) => {
            error!("Failed to load configuration: {:?}", e);
            Err(e.into())
        }
    }
}

/// Connect to Redis and spawn the store actor
pub async fn start_redis(config: Arc<RwLock<Config>>) -> SyncResult<RedisActorHandle> {
    let (mut redis_actor, redis_handle) = RedisActor::connect(config).await?;

    tokio::spawn(async move {
        redis_actor.run().await;
    });

    Ok(redis_handle)
}

/// Wire the sync engine against Google Calendar and the Redis store
pub async fn build_engine(
    config: Arc<RwLock<Config>>,
    redis_handle: RedisActorHandle,
) -> SyncResult<SyncEngine> {
    let config_read = config.read().await;
    let settings = SyncSettings::from_config(&config_read)?;
    let timeout = Duration::from_secs(config_read.tuning.request_timeout_secs);

    let provider = GoogleCalendarClient::new(&config_read.google_api_base, timeout)?;
    let refresher = GoogleOAuthClient::new(
        config_read.google_client_id.clone(),
        config_read.google_client_secret.clone(),
        config_read.google_token_url.clone(),
        timeout,
    )?;

    info!(
        "Sync engine ready (timezone {}, race guard {}s)",
        settings.timezone,
        settings.race_guard.num_seconds()
    );

    Ok(SyncEngine::new(
        Arc::new(redis_handle.clone()),
        Arc::new(provider),
        Arc::new(refresher),
        Arc::new(RedisNotifier::new(redis_handle)),
        settings,
    ))
}
