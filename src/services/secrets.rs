// src/services/secrets.rs

//! Secret Manager access.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use reqwest::Client;
use serde_json::Value;

use super::auth::GoogleAuth;
use crate::error::{AppError, Result};
use crate::utils::http::describe_failure;
use crate::utils::join_url;

/// Reads the latest version of named secrets.
pub struct SecretClient {
    client: Client,
    api_base: String,
    project_id: String,
    auth: Arc<GoogleAuth>,
}

impl SecretClient {
    pub fn new(
        client: Client,
        api_base: impl Into<String>,
        project_id: impl Into<String>,
        auth: Arc<GoogleAuth>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            project_id: project_id.into(),
            auth,
        }
    }

    /// Current payload of `name` as UTF-8 text.
    pub async fn access(&self, name: &str) -> Result<String> {
        let path = format!(
            "projects/{}/secrets/{}/versions/latest:access",
            self.project_id, name
        );
        let url = join_url(&self.api_base, &path);
        let bearer = self.auth.bearer().await?;

        log::info!("Reading secret {} from project {}", name, self.project_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| AppError::secret(name, e))?;

        if !response.status().is_success() {
            return Err(AppError::secret(name, describe_failure(response).await));
        }

        let body: Value = response.json().await.map_err(|e| AppError::secret(name, e))?;
        decode_payload(name, &body)
    }
}

/// Extract and decode `payload.data` from an access response.
pub fn decode_payload(name: &str, body: &Value) -> Result<String> {
    let encoded = body
        .pointer("/payload/data")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::secret(name, "response has no payload data"))?;

    let bytes = B64
        .decode(encoded)
        .map_err(|e| AppError::secret(name, format!("payload is not base64: {e}")))?;

    String::from_utf8(bytes)
        .map(|s| s.trim_end_matches(['\n', '\r']).to_string())
        .map_err(|e| AppError::secret(name, format!("payload is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_payload() {
        let body = json!({
            "name": "projects/1/secrets/reddit-secret/versions/3",
            "payload": { "data": B64.encode("s3cr3t\n") }
        });
        assert_eq!(decode_payload("reddit-secret", &body).unwrap(), "s3cr3t");
    }

    #[test]
    fn rejects_missing_or_invalid_payload() {
        assert!(decode_payload("x", &json!({})).is_err());
        assert!(decode_payload("x", &json!({ "payload": { "data": "%%%" } })).is_err());

        let not_utf8 = B64.encode([0xff, 0xfe]);
        assert!(decode_payload("x", &json!({ "payload": { "data": not_utf8 } })).is_err());
    }
}
