//! Ephemeral credential fetch
//!
//! A short-lived secret is minted per session by a trusted backend and
//! presented once to the signaling endpoint. The secret is never persisted
//! and never logged.

use crate::config::SessionConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Short-lived secret authorizing one signaling exchange
#[derive(Clone)]
pub struct EphemeralCredential {
    secret: String,
}

impl EphemeralCredential {
    /// Wrap a raw secret value
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// The raw secret value
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for EphemeralCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralCredential")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Source of ephemeral session credentials
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Fetch a fresh credential
    ///
    /// Single attempt, no retry; failure aborts session start.
    async fn fetch(&self) -> Result<EphemeralCredential>;
}

/// Production credential fetcher backed by an HTTP(S) backend route
pub struct HttpCredentialFetcher {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpCredentialFetcher {
    /// Create a fetcher for the configured credential endpoint
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::CredentialError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: config.credential_url.clone(),
        })
    }
}

#[async_trait]
impl CredentialProvider for HttpCredentialFetcher {
    async fn fetch(&self) -> Result<EphemeralCredential> {
        debug!("Fetching ephemeral credential from {}", self.endpoint);

        let response = self
            .http
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| Error::CredentialError(format!("credential request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::CredentialError(format!(
                "credential endpoint returned {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::CredentialError(format!("malformed credential response: {}", e)))?;

        let secret = extract_secret(&body)?;

        debug!("Ephemeral credential fetched");

        Ok(EphemeralCredential::new(secret))
    }
}

/// Extract the secret at the `client_secret.value` field path
fn extract_secret(body: &Value) -> Result<String> {
    body.pointer("/client_secret/value")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| {
            Error::CredentialError("response is missing client_secret.value".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_secret() {
        let body = json!({"client_secret": {"value": "ek_abc123"}});
        assert_eq!(extract_secret(&body).unwrap(), "ek_abc123");
    }

    #[test]
    fn test_extract_secret_missing_path() {
        let body = json!({"token": "ek_abc123"});
        let err = extract_secret(&body).unwrap_err();
        assert!(matches!(err, Error::CredentialError(_)));
    }

    #[test]
    fn test_extract_secret_non_string_value() {
        let body = json!({"client_secret": {"value": 42}});
        assert!(extract_secret(&body).is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let credential = EphemeralCredential::new("ek_super_secret");
        let rendered = format!("{:?}", credential);
        assert!(!rendered.contains("ek_super_secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
