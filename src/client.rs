//! Typed client for the gateway's HTTP API
//!
//! Front ends hold one [`GatewayClient`] per session. The bearer token lives in
//! the session and is attached to every call; any non-2xx answer becomes a
//! [`ClientError::Server`] carrying the server's `error` message.

use crate::payments::{CardDetails, PaymentRequest, PaymentResponse, RetryRequest};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Gateway returned {status}: {message}")]
    Server { status: StatusCode, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Bearer token shared by every clone of a client
#[derive(Debug, Clone, Default)]
pub struct Session {
    token: Arc<RwLock<Option<String>>>,
}

impl Session {
    pub async fn set_token(&self, token: impl Into<String>) {
        *self.token.write().await = Some(token.into());
    }

    pub async fn clear(&self) {
        *self.token.write().await = None;
    }

    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }
}

#[derive(Debug, Clone)]
pub struct GatewayClient {
    base_url: String,
    http: Client,
    session: Session,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ClientError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_http_client(base_url, http))
    }

    pub fn with_http_client(base_url: impl Into<String>, http: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            session: Session::default(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn initiate(&self, request: &PaymentRequest) -> ClientResult<PaymentResponse> {
        let builder = self.http.post(self.url("/initiate")).json(request);
        self.send(builder).await
    }

    pub async fn status(&self, transaction_id: &str) -> ClientResult<PaymentResponse> {
        let builder = self.http.get(self.url(&format!("/status/{}", transaction_id)));
        self.send(builder).await
    }

    pub async fn retry(&self, transaction_id: &str) -> ClientResult<PaymentResponse> {
        let builder = self.http.post(self.url(&format!("/retry/{}", transaction_id)));
        self.send(builder).await
    }

    /// Retry a failed card payment. The gateway never stores card data, so it
    /// has to be supplied again.
    pub async fn retry_with_card(
        &self,
        transaction_id: &str,
        card_details: &CardDetails,
    ) -> ClientResult<PaymentResponse> {
        let body = RetryRequest {
            card_details: Some(card_details.clone()),
        };
        let builder = self
            .http
            .post(self.url(&format!("/retry/{}", transaction_id)))
            .json(&body);
        self.send(builder).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ClientResult<T> {
        let builder = match self.session.token().await {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
            warn!("Gateway call failed with {}: {}", status, message);
            return Err(ClientError::Server { status, message });
        }

        debug!("Gateway call succeeded with {}", status);
        serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }
}
