use chrono::{Duration, Utc};
use household_sync::components::google_calendar::{
    CalendarProvider, GoogleCalendarClient, GoogleOAuthClient, TokenRefresher,
};
use household_sync::components::sync::models::CalendarBinding;
use household_sync::components::sync::EventStore;
use household_sync::error::{not_found_error, other_error, validation_error, SyncResult};
use household_sync::startup;
use std::env;
use std::time::Duration as StdDuration;
use url::Url;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const REDIRECT_URI: &str = "http://localhost:8080";
const SCOPE: &str = "https://www.googleapis.com/auth/calendar";
const USAGE: &str = "Usage: connect_calendar <household_id> <profile_id> [calendar_id]";

/// Read `code` from the callback request, checking the OAuth state
fn authorization_code(request_url: &str, expected_state: &str) -> SyncResult<String> {
    let url = Url::parse(REDIRECT_URI)
        .and_then(|base| base.join(request_url))
        .map_err(|e| other_error(&format!("Invalid callback URL: {}", e)))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Err(other_error(&format!("Authorization denied: {}", value))),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err(other_error("OAuth state mismatch"));
    }
    code.ok_or_else(|| other_error("No authorization code found in callback"))
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    startup::init_logging()?;

    let args: Vec<String> = env::args().skip(1).collect();
    let (household_id, profile_id) = match (args.first(), args.get(1)) {
        (Some(household_id), Some(profile_id)) => (household_id.clone(), profile_id.clone()),
        _ => return Err(validation_error(USAGE).into()),
    };
    let calendar_arg = args.get(2).cloned();

    let config = startup::load_config().await?;
    let redis_handle = startup::start_redis(config.clone()).await?;

    let (client_id, client_secret, token_url, api_base, timeout) = {
        let config_read = config.read().await;
        (
            config_read.google_client_id.clone(),
            config_read.google_client_secret.clone(),
            config_read.google_token_url.clone(),
            config_read.google_api_base.clone(),
            StdDuration::from_secs(config_read.tuning.request_timeout_secs),
        )
    };

    let mut profile = redis_handle
        .list_profiles(&household_id)
        .await?
        .into_iter()
        .find(|p| p.id == profile_id)
        .ok_or_else(|| not_found_error(&format!("Profile {} in household {}", profile_id, household_id)))?;

    // Generate random state for security
    let state = uuid::Uuid::new_v4().to_string();

    let auth_url = Url::parse_with_params(
        AUTH_URL,
        &[
            ("client_id", client_id.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("response_type", "code"),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("scope", SCOPE),
            ("state", state.as_str()),
        ],
    )
    .map_err(|e| other_error(&format!("Invalid authorization URL: {}", e)))?;

    println!("Opening browser to connect the calendar of {}...", profile.display_name);
    if webbrowser::open(auth_url.as_str()).is_err() {
        println!("Open this URL manually:\n{}", auth_url);
    }

    let server = tiny_http::Server::http("127.0.0.1:8080")
        .map_err(|e| other_error(&format!("Failed to start callback listener: {}", e)))?;
    println!("Waiting for authorization callback...");

    let request = server.recv().map_err(household_sync::error::Error::from)?;
    let code = authorization_code(request.url(), &state)?;

    let oauth = GoogleOAuthClient::new(client_id, client_secret, token_url, timeout)?;
    let grant = oauth.exchange_code(&code, REDIRECT_URI).await?;

    let selected_calendar_id = match calendar_arg {
        Some(calendar_id) => calendar_id,
        None => {
            // Prefer a writable calendar named after the member, then the primary one
            let provider = GoogleCalendarClient::new(&api_base, timeout)?;
            let calendars = provider.list_calendars(&grant.access_token).await?;
            let wanted = profile.display_name.trim().to_lowercase();
            calendars
                .iter()
                .filter(|c| c.is_writable())
                .find(|c| c.display_name().trim().to_lowercase() == wanted)
                .or_else(|| calendars.iter().find(|c| c.primary == Some(true)))
                .map(|c| c.id.clone())
                .ok_or_else(|| not_found_error("No writable calendar on the account"))?
        }
    };

    profile.calendar = Some(CalendarBinding {
        access_token: Some(grant.access_token),
        refresh_token: grant.refresh_token,
        expires_at: Some(Utc::now() + Duration::seconds(grant.expires_in.unwrap_or(3600))),
        selected_calendar_id: Some(selected_calendar_id.clone()),
    });
    redis_handle.save_profile(&profile).await?;

    let response = tiny_http::Response::from_string(
        "Calendar connected! You can close this window.",
    );
    request
        .respond(response)
        .map_err(household_sync::error::Error::from)?;

    println!(
        "Connected calendar {} to profile {}",
        selected_calendar_id, profile.display_name
    );
    let _ = redis_handle.shutdown().await;

    Ok(())
}
