//! Payment provider implementations
//!
//! Concrete implementations of the PaymentProvider trait for different providers,
//! plus the HTTP and webhook plumbing they share.

pub mod airtel;
pub mod dpo;
pub mod mpesa;
pub mod pesapal;

pub use airtel::{AirtelConfig, AirtelProvider};
pub use dpo::{DpoConfig, DpoProvider};
pub use mpesa::{MpesaConfig, MpesaProvider};
pub use pesapal::{PesapalConfig, PesapalProvider};

use crate::error::{AppError, AppResult};
use crate::payments::signature::verify_signature;
use crate::payments::types::ProviderName;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Build the HTTP client shared by every provider
pub fn build_http_client(timeout: Duration) -> AppResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("isapay-gateway/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {}", e)))
}

/// Send a request to a provider and decode its JSON body.
///
/// No retries: a transport failure, a non-2xx status, or an undecodable body all
/// surface as `ExternalError::ProviderTransport`.
pub(crate) async fn send_json<T>(provider: ProviderName, request: RequestBuilder) -> AppResult<T>
where
    T: DeserializeOwned,
{
    let response = request.send().await.map_err(|e| {
        error!("{} request error: {}", provider, e);
        AppError::provider_transport(provider.as_str(), format!("Request error: {}", e), None)
    })?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if !status.is_success() {
        error!("{} API error: HTTP {}: {}", provider, status, body);
        return Err(AppError::provider_transport(
            provider.as_str(),
            format!("HTTP {}: {}", status, body),
            Some(status.as_u16()),
        ));
    }

    serde_json::from_str::<T>(&body).map_err(|e| {
        error!("Failed to parse {} response: {}", provider, e);
        AppError::provider_transport(
            provider.as_str(),
            format!("Invalid response format: {}", e),
            Some(status.as_u16()),
        )
    })
}

/// Run the signature check and decode the callback body.
///
/// Returns `Ok(None)` when the signature does not match.
pub(crate) fn verify_and_decode<T>(
    provider: ProviderName,
    secret: Option<&str>,
    body: &[u8],
    signature: Option<&str>,
) -> AppResult<Option<T>>
where
    T: DeserializeOwned,
{
    if !verify_signature(secret, body, signature)? {
        warn!("Rejected {} webhook: signature mismatch", provider);
        return Ok(None);
    }

    let payload = serde_json::from_slice::<T>(body).map_err(|e| {
        AppError::validation("body", format!("malformed {} callback: {}", provider, e))
    })?;

    debug!("Decoded {} webhook payload", provider);
    Ok(Some(payload))
}

/// Read an optional, non-empty environment variable
pub(crate) fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Providers send some identifiers as numbers and others as strings
pub(crate) fn json_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::signature::compute_signature;
    use serde_json::json;

    #[test]
    fn test_verify_and_decode_rejects_bad_signature() {
        let body = br#"{"status":"success"}"#;
        let decoded: Option<serde_json::Value> =
            verify_and_decode(ProviderName::Dpo, Some("s"), body, Some("deadbeef")).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_verify_and_decode_accepts_good_signature() {
        let body = br#"{"status":"success"}"#;
        let sig = compute_signature("s", body).unwrap();
        let decoded: Option<serde_json::Value> =
            verify_and_decode(ProviderName::Dpo, Some("s"), body, Some(&sig)).unwrap();
        assert_eq!(decoded, Some(json!({"status": "success"})));
    }

    #[test]
    fn test_verify_and_decode_malformed_body() {
        let err = verify_and_decode::<serde_json::Value>(ProviderName::Airtel, None, b"not json", None)
            .unwrap_err();
        assert_eq!(err.field(), Some("body"));
    }

    #[test]
    fn test_json_to_string() {
        assert_eq!(json_to_string(&json!(0)), Some("0".to_string()));
        assert_eq!(json_to_string(&json!("TS")), Some("TS".to_string()));
        assert_eq!(json_to_string(&json!("")), None);
        assert_eq!(json_to_string(&json!(null)), None);
    }

    #[tokio::test]
    async fn test_send_json_connection_refused_is_transport_error() {
        let client = build_http_client(Duration::from_secs(2)).unwrap();
        let result: AppResult<serde_json::Value> =
            send_json(ProviderName::Airtel, client.get("http://127.0.0.1:9/unreachable")).await;
        let err = result.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_GATEWAY);
    }
}
