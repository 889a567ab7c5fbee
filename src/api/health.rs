use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::payments::ProviderName;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub providers: Vec<ProviderHealth>,
}

#[derive(Serialize, Deserialize)]
pub struct ProviderHealth {
    pub name: ProviderName,
    /// Credentials are configured, so requests reach the real API
    pub live: bool,
    pub webhook_signed: bool,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let version = env!("CARGO_PKG_VERSION").to_string();

    let providers = state
        .service
        .gateway()
        .providers()
        .into_iter()
        .map(|provider| ProviderHealth {
            name: provider.name(),
            live: provider.is_live(),
            webhook_signed: provider.has_webhook_secret(),
        })
        .collect();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version,
        environment: state.environment.clone(),
        providers,
    })
}
