//! Offer/answer exchange with the remote realtime endpoint.

use crate::credentials::SessionCredential;
use crate::error::SessionError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

/// Exchanges a local SDP offer for the remote answer.
#[async_trait]
pub trait SignalingClient: Send + Sync {
    async fn exchange(
        &self,
        offer_sdp: &str,
        credential: &SessionCredential,
    ) -> Result<String, SessionError>;
}

/// POSTs the raw offer to the realtime endpoint, authenticated with the
/// bearer credential, and returns the raw answer body.
pub struct HttpSignalingClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

impl HttpSignalingClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl SignalingClient for HttpSignalingClient {
    async fn exchange(
        &self,
        offer_sdp: &str,
        credential: &SessionCredential,
    ) -> Result<String, SessionError> {
        let url = format!("{}?model={}", self.endpoint, self.model);
        let response = self
            .http
            .post(&url)
            .bearer_auth(credential.expose())
            .header(CONTENT_TYPE, "application/sdp")
            .body(offer_sdp.to_owned())
            .send()
            .await
            .map_err(|e| SessionError::Signaling(format!("offer could not be sent: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Signaling(format!(
                "realtime endpoint returned {status}"
            )));
        }

        response
            .text()
            .await
            .map_err(|e| SessionError::Signaling(format!("answer could not be read: {e}")))
    }
}
