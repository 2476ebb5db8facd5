use super::models::TokenGrant;
use super::provider::TokenRefresher;
use crate::error::{auth_error, transient_error, Error, SyncResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Client for Google's OAuth token endpoint
#[derive(Clone)]
pub struct GoogleOAuthClient {
    client: Client,
    client_id: String,
    client_secret: String,
    token_url: String,
}

impl GoogleOAuthClient {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_url: impl Into<String>,
        timeout: Duration,
    ) -> SyncResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: token_url.into(),
        })
    }

    async fn request_token(&self, params: &[(&str, &str)], context: &str) -> SyncResult<TokenGrant> {
        let mut form = vec![
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        form.extend_from_slice(params);

        let response = self.client.post(&self.token_url).form(&form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            let message = format!("{}: HTTP {} - {}", context, status, error_body);

            // invalid_grant / invalid_client come back as 400 or 401
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    auth_error(&message)
                }
                _ => transient_error(&message),
            });
        }

        let grant: TokenGrant = response.json().await?;
        if grant.access_token.is_empty() {
            return Err(Error::Auth(format!("{}: response missing access_token", context)));
        }

        Ok(grant)
    }
}

#[async_trait]
impl TokenRefresher for GoogleOAuthClient {
    async fn refresh(&self, refresh_token: &str) -> SyncResult<TokenGrant> {
        self.request_token(
            &[
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ],
            "Failed to refresh token",
        )
        .await
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> SyncResult<TokenGrant> {
        self.request_token(
            &[
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ],
            "Failed to exchange authorization code",
        )
        .await
    }
}
