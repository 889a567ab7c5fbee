use crate::api::AppState;
use crate::error::{AppError, AppResult};
use crate::payments::{PaymentRequest, PaymentResponse, RetryRequest};
use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};

/// `POST /initiate`
///
/// The body is parsed by hand so malformed JSON comes back as a 400 with the
/// same `{error}` shape as every other failure.
pub async fn initiate(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<PaymentResponse>> {
    let request: PaymentRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::validation("body", e.to_string()))?;

    let response = state.service.initiate(request).await?;
    Ok(Json(response))
}

/// `GET /status/:transaction_id`
pub async fn status(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> AppResult<Json<PaymentResponse>> {
    Ok(Json(state.service.status(&transaction_id).await?))
}

/// `POST /retry/:transaction_id`
///
/// The body is optional. Card payments need one carrying `card_details`.
pub async fn retry(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
    body: Bytes,
) -> AppResult<Json<PaymentResponse>> {
    let retry: RetryRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RetryRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::validation("body", e.to_string()))?
    };

    let response = state
        .service
        .retry(&transaction_id, retry.card_details)
        .await?;
    Ok(Json(response))
}
