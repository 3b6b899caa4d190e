//! Offer/answer signaling over HTTPS
//!
//! The local SDP offer is POSTed to the remote session endpoint with the
//! ephemeral credential as a bearer token; the response body is the remote
//! answer SDP verbatim. One exchange per call, no retries; a failed
//! exchange requires a fresh offer.

use crate::config::SessionConfig;
use crate::credential::EphemeralCredential;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Session description type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpType {
    /// Local offer
    Offer,
    /// Remote answer
    Answer,
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdpType::Offer => write!(f, "offer"),
            SdpType::Answer => write!(f, "answer"),
        }
    }
}

/// An SDP payload with its type tag
///
/// Exactly one local (offer) and one remote (answer) description exist per
/// active session.
#[derive(Debug, Clone)]
pub struct SessionDescription {
    /// Offer or answer
    pub kind: SdpType,
    /// Opaque SDP text blob
    pub sdp: String,
}

impl SessionDescription {
    /// Create a local offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create a remote answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    /// Check if this description is an offer
    pub fn is_offer(&self) -> bool {
        self.kind == SdpType::Offer
    }
}

/// Offer/answer exchange with the remote session endpoint
#[async_trait]
pub trait SignalingExchange: Send + Sync {
    /// Exchange the local offer for the remote answer
    async fn exchange(
        &self,
        offer: &SessionDescription,
        credential: &EphemeralCredential,
    ) -> Result<SessionDescription>;
}

/// Production signaling exchange over HTTPS
pub struct HttpSignalingExchange {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpSignalingExchange {
    /// Create an exchange for the configured realtime endpoint and model
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::SignalingError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: endpoint_url(&config.realtime_url, &config.model),
        })
    }
}

#[async_trait]
impl SignalingExchange for HttpSignalingExchange {
    async fn exchange(
        &self,
        offer: &SessionDescription,
        credential: &EphemeralCredential,
    ) -> Result<SessionDescription> {
        if !offer.is_offer() {
            return Err(Error::SignalingError(
                "exchange requires a local offer".to_string(),
            ));
        }

        debug!("Exchanging SDP offer at {}", self.endpoint);

        let response = self
            .http
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", credential.secret()))
            .header(CONTENT_TYPE, "application/sdp")
            .body(offer.sdp.clone())
            .send()
            .await
            .map_err(|e| Error::SignalingError(format!("signaling request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::SignalingError(format!(
                "signaling endpoint returned {}",
                response.status()
            )));
        }

        let answer_sdp = response
            .text()
            .await
            .map_err(|e| Error::SignalingError(format!("failed to read answer body: {}", e)))?;

        debug!("Received SDP answer ({} bytes)", answer_sdp.len());

        Ok(SessionDescription::answer(answer_sdp))
    }
}

/// Build the signaling URL with the model query parameter
fn endpoint_url(base: &str, model: &str) -> String {
    if base.contains('?') {
        format!("{}&model={}", base, model)
    } else {
        format!("{}?model={}", base, model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url("https://api.example.com/v1/realtime", "gpt-4o"),
            "https://api.example.com/v1/realtime?model=gpt-4o"
        );
    }

    #[test]
    fn test_endpoint_url_existing_query() {
        assert_eq!(
            endpoint_url("https://api.example.com/v1/realtime?beta=1", "gpt-4o"),
            "https://api.example.com/v1/realtime?beta=1&model=gpt-4o"
        );
    }

    #[test]
    fn test_session_description_kinds() {
        let offer = SessionDescription::offer("v=0");
        assert!(offer.is_offer());
        assert_eq!(offer.kind.to_string(), "offer");

        let answer = SessionDescription::answer("v=0");
        assert!(!answer.is_offer());
        assert_eq!(answer.kind.to_string(), "answer");
    }
}
