//! Bearer token lifecycle for the state-vector API.
//!
//! The producer owns a single [`TokenManager`]. Before every poll it calls
//! [`TokenManager::ensure_valid`], which exchanges client credentials for a new
//! token when none is held or the held one has expired. Tokens are treated as
//! expired after 80% of their advertised lifetime so a request never goes out
//! with a token that dies in flight.
//!
//! Any failure to obtain a token is fatal: there is no retry at this layer.

use crate::clock::Clock;
use crate::error::{AuthError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Lifetime assumed when the grant omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 1800;

/// Fraction of the advertised lifetime a token is used for.
const REFRESH_FRACTION: f64 = 0.8;

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Performs one client-credentials exchange.
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    async fn exchange(&self) -> std::result::Result<TokenGrant, AuthError>;
}

/// OAuth client-credentials client.
pub struct OAuthClient {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl OAuthClient {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        timeout: std::time::Duration,
    ) -> std::result::Result<Self, AuthError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        })
    }

    /// Build from configuration, failing when credentials are absent.
    pub fn from_config(config: &crate::config::AuthConfig) -> std::result::Result<Self, AuthError> {
        let client_id = config
            .client_id
            .clone()
            .filter(|v| !v.is_empty())
            .ok_or(AuthError::MissingCredentials("OPENSKY_CLIENTID"))?;
        let client_secret = config
            .client_secret
            .clone()
            .filter(|v| !v.is_empty())
            .ok_or(AuthError::MissingCredentials("OPENSKY_CLIENTSECRET"))?;

        Self::new(
            config.token_url.clone(),
            client_id,
            client_secret,
            std::time::Duration::from_secs(config.request_timeout_secs),
        )
    }
}

#[async_trait]
impl CredentialExchange for OAuthClient {
    async fn exchange(&self) -> std::result::Result<TokenGrant, AuthError> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self.client.post(&self.token_url).form(&form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        let grant: TokenGrant = serde_json::from_slice(&body)
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        if grant.access_token.is_empty() {
            return Err(AuthError::MalformedResponse("empty access_token".into()));
        }

        Ok(grant)
    }
}

/// A bearer token and the instant after which it must not be used.
#[derive(Debug, Clone)]
pub struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Expiry outside the representable time range is a malformed grant.
    fn from_grant(
        grant: TokenGrant,
        issued_at: DateTime<Utc>,
    ) -> std::result::Result<Self, AuthError> {
        let expires_in = grant.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let usable_ms = (expires_in as f64 * REFRESH_FRACTION * 1000.0).round() as i64;
        let expires_at = Duration::try_milliseconds(usable_ms)
            .and_then(|usable| issued_at.checked_add_signed(usable))
            .ok_or_else(|| {
                AuthError::MalformedResponse(format!("expires_in {} is out of range", expires_in))
            })?;

        Ok(Self {
            value: grant.access_token,
            expires_at,
        })
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Owns the current token and refreshes it on demand.
pub struct TokenManager {
    exchange: Arc<dyn CredentialExchange>,
    clock: Arc<dyn Clock>,
    token: Option<AccessToken>,
    refreshes: u64,
}

impl TokenManager {
    pub fn new(exchange: Arc<dyn CredentialExchange>, clock: Arc<dyn Clock>) -> Self {
        Self {
            exchange,
            clock,
            token: None,
            refreshes: 0,
        }
    }

    /// Return a token valid at this instant, exchanging credentials if needed.
    pub async fn ensure_valid(&mut self) -> Result<String> {
        let now = self.clock.now();
        if let Some(token) = &self.token {
            if !token.is_expired(now) {
                return Ok(token.value.clone());
            }
            debug!(expired_at = %token.expires_at, "Access token expired");
        }

        // Drop the old token first so a failed refresh leaves nothing usable.
        self.token = None;

        let grant = self.exchange.exchange().await?;
        let token = AccessToken::from_grant(grant, now)?;
        info!(expires_at = %token.expires_at, "Acquired access token");

        let value = token.value.clone();
        self.token = Some(token);
        self.refreshes += 1;
        Ok(value)
    }

    /// Forget the held token so the next call re-acquires one.
    pub fn invalidate(&mut self) {
        if self.token.take().is_some() {
            info!("Access token invalidated");
        }
    }

    pub fn current(&self) -> Option<&AccessToken> {
        self.token.as_ref()
    }

    /// Number of successful exchanges so far.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes
    }
}
