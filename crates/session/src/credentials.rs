//! Fetching the short-lived session credential from the broker.

use crate::error::SessionError;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// An opaque, time-limited token authorizing one transport negotiation.
///
/// Never persisted and never printed; the inner secret is redacted from
/// `Debug` output.
#[derive(Debug)]
pub struct SessionCredential(SecretString);

impl SessionCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// The raw token, for the `Authorization` header of the signaling
    /// request.
    pub(crate) fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

/// Source of session credentials. One `fetch` per `start()` attempt; the
/// session never retries on its own.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch(&self) -> Result<SessionCredential, SessionError>;
}

/// Fetches credentials from a trusted server-side broker over HTTP.
pub struct BrokerClient {
    http: reqwest::Client,
    url: String,
}

impl BrokerClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    ephemeral_key: String,
}

#[async_trait]
impl CredentialSource for BrokerClient {
    async fn fetch(&self) -> Result<SessionCredential, SessionError> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| SessionError::Credential(format!("credential broker unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            // Prefer the broker's own error message when the body carries one.
            let message = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|body| body.get("error")?.as_str().map(str::to_owned))
                .unwrap_or_else(|| format!("credential broker returned {status}"));
            return Err(SessionError::Credential(message));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            SessionError::Credential(format!("malformed credential response: {e}"))
        })?;
        Ok(SessionCredential::new(token.ephemeral_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_the_token() {
        let credential = SessionCredential::new("ek_live_abc123");
        let printed = format!("{credential:?}");
        assert!(!printed.contains("ek_live_abc123"));
    }
}
