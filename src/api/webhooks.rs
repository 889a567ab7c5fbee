use crate::api::AppState;
use crate::error::{AppError, AppResult};
use crate::payments::signature::SIGNATURE_HEADER;
use crate::payments::{ProviderName, Settlement};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use tracing::info;

/// `POST /webhook/:provider`
///
/// The signature covers the raw body, so the body is taken as bytes and only
/// decoded by the adapter after the HMAC check.
pub async fn receive(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Settlement>> {
    let name: ProviderName = provider
        .parse()
        .map_err(|_| AppError::unknown_provider(provider.as_str()))?;
    let adapter = state
        .service
        .gateway()
        .provider(name)
        .ok_or_else(|| AppError::unknown_provider(provider.as_str()))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let verification = adapter
        .verify_webhook(&body, signature)?
        .ok_or_else(|| AppError::signature_mismatch(name.as_str()))?;

    info!(
        "Verified {} webhook: status={} transaction_id={:?}",
        name, verification.status, verification.transaction_id
    );

    let settlement = state.service.settle(name, verification).await?;
    Ok(Json(settlement))
}
