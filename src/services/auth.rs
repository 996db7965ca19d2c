// src/services/auth.rs

//! Bearer token handling for the discussion API and Google APIs.

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::models::{Secret, WarehouseConfig};
use crate::utils::http::describe_failure;

/// Refresh tokens this long before they expire.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// OAuth token endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// A bearer token together with its expiry.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Build from a token endpoint response received at `now`.
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            token: response.access_token,
            expires_at: response
                .expires_in
                .map(|secs| now + Duration::seconds(secs)),
        }
    }

    /// Whether the token can still be used at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now + Duration::seconds(EXPIRY_MARGIN_SECS) < expires_at,
            None => true,
        }
    }
}

enum TokenMode {
    Static(Secret),
    Metadata { url: String },
}

/// Token provider for Google REST APIs.
///
/// Uses a configured static token when present, otherwise asks the compute
/// metadata server for the attached service account's token.
pub struct GoogleAuth {
    client: Client,
    mode: TokenMode,
    cached: RwLock<Option<AccessToken>>,
}

impl GoogleAuth {
    /// Create a provider from warehouse settings.
    pub fn from_config(client: Client, config: &WarehouseConfig) -> Self {
        let mode = match &config.access_token {
            Some(token) if !token.is_empty() => TokenMode::Static(token.clone()),
            _ => TokenMode::Metadata {
                url: config.metadata_token_url.clone(),
            },
        };
        Self {
            client,
            mode,
            cached: RwLock::new(None),
        }
    }

    /// Short description of where tokens come from.
    pub fn describe(&self) -> &'static str {
        match self.mode {
            TokenMode::Static(_) => "static access token",
            TokenMode::Metadata { .. } => "metadata server",
        }
    }

    /// Current bearer token, fetching a new one when needed.
    pub async fn bearer(&self) -> Result<String> {
        let url = match &self.mode {
            TokenMode::Static(token) => return Ok(token.expose().to_string()),
            TokenMode::Metadata { url } => url,
        };

        let now = Utc::now();
        if let Some(token) = self.cached.read().await.as_ref() {
            if token.is_fresh(now) {
                return Ok(token.token.clone());
            }
        }

        log::debug!("Requesting Google access token from metadata server");
        let response = self
            .client
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| AppError::auth(format!("metadata server unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::auth(format!(
                "metadata server refused token request: {}",
                describe_failure(response).await
            )));
        }

        let token = AccessToken::from_response(response.json().await?, now);
        let bearer = token.token.clone();
        *self.cached.write().await = Some(token);
        Ok(bearer)
    }
}
