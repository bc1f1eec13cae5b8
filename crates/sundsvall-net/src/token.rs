//! OAuth2 client-credentials token lifecycle for the registry API.

use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;

/// Renew this long before the token actually expires.
const TOKEN_MARGIN: Duration = Duration::from_secs(300);

/// Token acquisition gets its own timeout, separate from resource calls.
const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Token-endpoint configuration.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// OAuth2 token endpoint URL.
    pub token_url: String,
    /// Client id; `None` leaves the manager unconfigured.
    pub client_id: Option<String>,
    /// Client secret; `None` leaves the manager unconfigured.
    pub client_secret: Option<String>,
    /// Fixed scope string sent with every request.
    pub scope: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

const fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// OAuth2 client-credentials token manager.
///
/// Tokens are cached until shortly before expiry. Refresh is
/// single-flighted: the cache mutex is held across the mint request, so
/// concurrent callers observing an expired token perform exactly one
/// refresh and the rest await it.
///
/// Token acquisition is not routed through the circuit breaker; a failure
/// to mint yields `None`, which adapters treat as a provider-wide outage
/// for that call.
#[derive(Debug)]
pub struct TokenManager {
    config: TokenConfig,
    client: reqwest::Client,
    cache: tokio::sync::Mutex<Option<CachedToken>>,
}

impl TokenManager {
    /// Create a manager for the given token endpoint.
    pub fn new(config: TokenConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(TOKEN_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            config,
            client,
            cache: tokio::sync::Mutex::new(None),
        }
    }

    /// Whether credentials are configured.
    pub const fn is_configured(&self) -> bool {
        self.config.client_id.is_some() && self.config.client_secret.is_some()
    }

    /// Return a valid access token, minting one if needed.
    ///
    /// Returns `None` when the manager is unconfigured or the token
    /// endpoint cannot be reached.
    pub async fn token(&self) -> Option<String> {
        let (Some(client_id), Some(client_secret)) =
            (&self.config.client_id, &self.config.client_secret)
        else {
            tracing::warn!("OAuth credentials not configured");
            return None;
        };

        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.as_ref() {
            if Instant::now() + TOKEN_MARGIN < cached.expires_at {
                return Some(cached.access_token.clone());
            }
        }

        let response = self
            .client
            .post(&self.config.token_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("scope", self.config.scope.as_str()),
            ])
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "failed to reach token endpoint");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::error!(status = %response.status(), "token endpoint rejected request");
            return None;
        }

        let token_data: TokenResponse = match response.json().await {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, "failed to parse token response");
                return None;
            }
        };

        tracing::debug!(expires_in = token_data.expires_in, "OAuth token refreshed");

        let token = token_data.access_token.clone();
        *cache = Some(CachedToken {
            access_token: token_data.access_token,
            expires_at: Instant::now() + Duration::from_secs(token_data.expires_in),
        });

        Some(token)
    }

    /// Drop the cached token, forcing a refresh on the next call.
    ///
    /// Called by adapters after an HTTP 401 from a resource endpoint.
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
        tracing::debug!("OAuth token invalidated");
    }
}
