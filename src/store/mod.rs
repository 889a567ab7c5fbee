//! Transaction persistence
//!
//! The gateway itself is stateless. This store keeps the one piece of state that
//! has to outlive a request: which transaction id maps to which request and
//! what its last known status is.

pub mod memory;
#[cfg(feature = "cache")]
pub mod redis_store;

pub use memory::InMemoryTransactionStore;
#[cfg(feature = "cache")]
pub use redis_store::{RedisStoreConfig, RedisTransactionStore};

use crate::error::AppResult;
use crate::payments::types::{PaymentRequest, PaymentResponse, PaymentStatus, ProviderName};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted initiation attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub request: PaymentRequest,
    pub response: PaymentResponse,
    /// 1 for a first attempt, incremented on every retry
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn new(request: PaymentRequest, response: PaymentResponse) -> Self {
        let now = Utc::now();
        Self {
            request,
            response,
            attempts: 1,
            retry_of: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transaction_id(&self) -> &str {
        &self.response.transaction_id
    }

    pub fn provider(&self) -> ProviderName {
        self.response.provider
    }

    pub fn status(&self) -> PaymentStatus {
        self.response.status
    }
}

/// Result of a compare-and-set status transition
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The record moved from `pending` to the requested status
    Applied(TransactionRecord),
    /// The record had already left `pending`; nothing changed
    AlreadySettled(TransactionRecord),
    /// No record with that id
    Unknown,
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Persist a new record keyed by its transaction id
    async fn insert(&self, record: &TransactionRecord) -> AppResult<()>;

    async fn get(&self, transaction_id: &str) -> AppResult<Option<TransactionRecord>>;

    /// Look a transaction up by the provider-side reference it was given
    async fn find_by_reference(
        &self,
        provider: ProviderName,
        reference_id: &str,
    ) -> AppResult<Option<TransactionRecord>>;

    /// Atomically move a `pending` record to `status`.
    ///
    /// Terminal records are never changed, so a duplicate or late webhook
    /// comes back as [`TransitionOutcome::AlreadySettled`].
    async fn transition(
        &self,
        transaction_id: &str,
        status: PaymentStatus,
    ) -> AppResult<TransitionOutcome>;
}

/// Key under which a provider reference points at a transaction id
pub(crate) fn reference_key(provider: ProviderName, reference_id: &str) -> String {
    format!("{}:{}", provider, reference_id)
}
