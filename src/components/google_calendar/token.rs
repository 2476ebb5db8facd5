use super::provider::TokenRefresher;
use crate::components::sync::models::{CalendarToken, MemberProfile};
use crate::components::sync::store::EventStore;
use crate::error::{auth_error, SyncResult};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Lifetime assumed when the token endpoint omits `expires_in`
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Hands out valid access tokens for member profiles, refreshing them on demand.
///
/// Refreshing is synchronous and idempotent. Concurrent refreshes need no lock:
/// the store only ever moves a token's expiry forward, so the last successful
/// refresh wins.
#[derive(Clone)]
pub struct TokenManager {
    store: Arc<dyn EventStore>,
    refresher: Arc<dyn TokenRefresher>,
    refresh_skew: Duration,
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn EventStore>,
        refresher: Arc<dyn TokenRefresher>,
        refresh_skew: Duration,
    ) -> Self {
        Self {
            store,
            refresher,
            refresh_skew,
        }
    }

    /// Return an access token for `profile` that stays valid for at least the refresh skew
    pub async fn ensure_valid_token(&self, profile: &MemberProfile) -> SyncResult<String> {
        let binding = profile.calendar.as_ref().ok_or_else(|| {
            auth_error(&format!("Profile {} has no connected calendar", profile.id))
        })?;

        let now = Utc::now();
        let access_token = binding.access_token.as_deref().filter(|t| !t.is_empty());

        if let (Some(token), Some(expires_at)) = (access_token, binding.expires_at) {
            if expires_at - now > self.refresh_skew {
                return Ok(token.to_string());
            }
        }

        let refresh_token = binding.refresh_token.as_deref().ok_or_else(|| {
            auth_error(&format!(
                "Access token for profile {} expired and no refresh token is stored",
                profile.id
            ))
        })?;

        debug!("Refreshing access token for profile {}", profile.id);
        let grant = self.refresher.refresh(refresh_token).await?;

        let expires_at =
            now + Duration::seconds(grant.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS));
        let token = CalendarToken {
            access_token: grant.access_token.clone(),
            // Keep the stored refresh token unless the provider rotated it
            refresh_token: grant
                .refresh_token
                .clone()
                .or_else(|| Some(refresh_token.to_string())),
            expires_at,
        };

        let written = self
            .store
            .update_calendar_token(&profile.household_id, &profile.id, token)
            .await?;
        if written {
            info!("Stored refreshed access token for profile {}", profile.id);
        } else {
            debug!(
                "A newer token for profile {} was stored concurrently; keeping it",
                profile.id
            );
        }

        Ok(grant.access_token)
    }
}
