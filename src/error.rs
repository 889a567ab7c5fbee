//! Application error types
//!
//! Every fallible operation in the gateway returns [`AppResult`]. The HTTP layer
//! turns an [`AppError`] into a status code and a `{ "error": ... }` body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

/// Business rule violations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("Transaction not found: {transaction_id}")]
    NotFound { transaction_id: String },

    #[error("Transaction {transaction_id} cannot be retried from status '{status}'")]
    Conflict {
        transaction_id: String,
        status: String,
    },

    #[error("Missing or invalid bearer token")]
    Unauthorized,

    #[error("Webhook signature mismatch for provider {provider}")]
    SignatureMismatch { provider: String },

    #[error("Unknown provider: {provider}")]
    UnknownProvider { provider: String },
}

/// Failures talking to a payment provider
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExternalError {
    #[error("{provider} request failed: {message}")]
    ProviderTransport {
        provider: String,
        message: String,
        status_code: Option<u16>,
    },
}

/// Failures in our own plumbing
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InfrastructureError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Transaction store error: {message}")]
    Store { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppErrorKind {
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    External(#[from] ExternalError),

    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}")]
pub struct AppError {
    pub kind: AppErrorKind,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self { kind }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation {
            field: field.into(),
            message: message.into(),
        })
    }

    pub fn not_found(transaction_id: impl Into<String>) -> Self {
        DomainError::NotFound {
            transaction_id: transaction_id.into(),
        }
        .into()
    }

    pub fn conflict(transaction_id: impl Into<String>, status: impl Into<String>) -> Self {
        DomainError::Conflict {
            transaction_id: transaction_id.into(),
            status: status.into(),
        }
        .into()
    }

    pub fn unauthorized() -> Self {
        DomainError::Unauthorized.into()
    }

    pub fn signature_mismatch(provider: impl Into<String>) -> Self {
        DomainError::SignatureMismatch {
            provider: provider.into(),
        }
        .into()
    }

    pub fn unknown_provider(provider: impl Into<String>) -> Self {
        DomainError::UnknownProvider {
            provider: provider.into(),
        }
        .into()
    }

    pub fn provider_transport(
        provider: impl Into<String>,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        ExternalError::ProviderTransport {
            provider: provider.into(),
            message: message.into(),
            status_code,
        }
        .into()
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        InfrastructureError::Configuration {
            message: message.into(),
        }
        .into()
    }

    pub fn store(message: impl Into<String>) -> Self {
        InfrastructureError::Store {
            message: message.into(),
        }
        .into()
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        InfrastructureError::Serialization {
            message: message.into(),
        }
        .into()
    }

    /// Name of the request field a validation error points at
    pub fn field(&self) -> Option<&str> {
        match &self.kind {
            AppErrorKind::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.kind, AppErrorKind::Validation { .. })
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.kind {
            AppErrorKind::Validation { .. } => StatusCode::BAD_REQUEST,
            AppErrorKind::Domain(DomainError::NotFound { .. })
            | AppErrorKind::Domain(DomainError::UnknownProvider { .. }) => StatusCode::NOT_FOUND,
            AppErrorKind::Domain(DomainError::Conflict { .. }) => StatusCode::CONFLICT,
            AppErrorKind::Domain(DomainError::Unauthorized)
            | AppErrorKind::Domain(DomainError::SignatureMismatch { .. }) => {
                StatusCode::UNAUTHORIZED
            }
            AppErrorKind::External(_) => StatusCode::BAD_GATEWAY,
            AppErrorKind::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        Self::new(AppErrorKind::Domain(err))
    }
}

impl From<ExternalError> for AppError {
    fn from(err: ExternalError) -> Self {
        Self::new(AppErrorKind::External(err))
    }
}

impl From<InfrastructureError> for AppError {
    fn from(err: InfrastructureError) -> Self {
        Self::new(AppErrorKind::Infrastructure(err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed with {}: {}", status, self);
        } else {
            warn!("Request rejected with {}: {}", status, self);
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
