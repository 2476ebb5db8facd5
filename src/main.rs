use chrono::Utc;
use household_sync::components::sync::TimeWindow;
use household_sync::error::{validation_error, Error};
use household_sync::startup;
use std::env;
use tracing::info;

const USAGE: &str = "Usage: household-sync <user_id> <household_id> [days]";

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize logging
    startup::init_logging()?;

    let args: Vec<String> = env::args().skip(1).collect();
    let (user_id, household_id) = match (args.first(), args.get(1)) {
        (Some(user_id), Some(household_id)) => (user_id.clone(), household_id.clone()),
        _ => return Err(validation_error(USAGE).into()),
    };
    let days = match args.get(2) {
        Some(days) => Some(
            days.parse::<i64>()
                .map_err(|_| validation_error(&format!("Invalid day count '{}'", days)))?,
        ),
        None => None,
    };

    info!("Listing events of household {}", household_id);

    // Load configuration
    let config = startup::load_config().await?;

    let redis_handle = startup::start_redis(config.clone()).await?;
    let engine = startup::build_engine(config, redis_handle.clone()).await?;

    let window = match days {
        Some(days) => TimeWindow::upcoming(Utc::now(), days),
        None => engine.default_window(),
    };

    let result = engine.list_events(&user_id, &household_id, window).await;
    let _ = redis_handle.shutdown().await;

    let events = result?;
    let json = serde_json::to_string_pretty(&events)
        .map_err(Error::from)?;
    println!("{}", json);

    Ok(())
}
