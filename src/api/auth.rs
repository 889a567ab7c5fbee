use crate::api::AppState;
use crate::error::AppError;
use crate::payments::signature::constant_time_eq;
use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Reject callers without a configured bearer token. A no-op when no tokens
/// are configured.
pub async fn require_bearer(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !state.auth.is_enabled() {
        return next.run(req).await;
    }

    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    let authorized = presented.is_some_and(|token| {
        state
            .auth
            .api_tokens
            .iter()
            .any(|known| constant_time_eq(known.as_bytes(), token.as_bytes()))
    });

    if authorized {
        next.run(req).await
    } else {
        AppError::unauthorized().into_response()
    }
}
