//! HTTP surface of the gateway

pub mod auth;
pub mod health;
pub mod payments;
pub mod webhooks;

use crate::config::{AuthConfig, Config};
use crate::payments::PaymentService;
use axum::{
    http::HeaderName,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub service: PaymentService,
    pub auth: Arc<AuthConfig>,
    pub environment: String,
}

impl AppState {
    pub fn new(service: PaymentService, config: &Config) -> Self {
        Self {
            service,
            auth: Arc::new(config.auth.clone()),
            environment: config.server.environment.clone(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let guarded = Router::new()
        .route("/initiate", post(payments::initiate))
        .route("/status/:transaction_id", get(payments::status))
        .route("/retry/:transaction_id", post(payments::retry))
        .layer(from_fn_with_state(state.clone(), auth::require_bearer));

    Router::new()
        .merge(guarded)
        .route("/webhook/:provider", post(webhooks::receive))
        .route("/health", get(health::health_check))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
        .with_state(state)
}
