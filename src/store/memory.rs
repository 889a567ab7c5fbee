//! In-process transaction store

use crate::error::AppResult;
use crate::payments::types::{PaymentStatus, ProviderName};
use crate::store::{reference_key, TransactionRecord, TransactionStore, TransitionOutcome};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::debug;

/// Records kept by [`InMemoryTransactionStore::new`] before the oldest are evicted
pub const DEFAULT_MAX_RECORDS: usize = 10_000;

#[derive(Default)]
struct Inner {
    records: HashMap<String, TransactionRecord>,
    references: HashMap<String, String>,
    /// Transaction ids in insertion order, oldest first
    order: VecDeque<String>,
}

impl Inner {
    fn evict_oldest(&mut self) {
        let Some(id) = self.order.pop_front() else {
            return;
        };
        if let Some(record) = self.records.remove(&id) {
            if let Some(reference) = &record.response.reference_id {
                let key = reference_key(record.provider(), reference);
                if self.references.get(&key) == Some(&id) {
                    self.references.remove(&key);
                }
            }
            debug!("Evicted transaction {} from memory store", id);
        }
    }
}

/// Transaction store backed by a map behind a tokio `RwLock`.
///
/// Meant for development and tests. Records are lost on restart and only the
/// most recent `max_records` are kept, so a webhook for an evicted payment is
/// reported as unknown. Use the Redis store for anything durable.
pub struct InMemoryTransactionStore {
    inner: RwLock<Inner>,
    max_records: usize,
}

impl Default for InMemoryTransactionStore {
    fn default() -> Self {
        Self::with_max_records(DEFAULT_MAX_RECORDS)
    }
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that keeps at most `max_records`, evicting the oldest first
    pub fn with_max_records(max_records: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_records: max_records.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, record: &TransactionRecord) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let id = record.transaction_id().to_string();

        if let Some(reference) = &record.response.reference_id {
            inner
                .references
                .insert(reference_key(record.provider(), reference), id.clone());
        }
        if inner.records.insert(id.clone(), record.clone()).is_none() {
            inner.order.push_back(id);
        }
        while inner.records.len() > self.max_records {
            inner.evict_oldest();
        }
        Ok(())
    }

    async fn get(&self, transaction_id: &str) -> AppResult<Option<TransactionRecord>> {
        Ok(self.inner.read().await.records.get(transaction_id).cloned())
    }

    async fn find_by_reference(
        &self,
        provider: ProviderName,
        reference_id: &str,
    ) -> AppResult<Option<TransactionRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .references
            .get(&reference_key(provider, reference_id))
            .and_then(|id| inner.records.get(id))
            .cloned())
    }

    async fn transition(
        &self,
        transaction_id: &str,
        status: PaymentStatus,
    ) -> AppResult<TransitionOutcome> {
        let mut inner = self.inner.write().await;
        let Some(record) = inner.records.get_mut(transaction_id) else {
            return Ok(TransitionOutcome::Unknown);
        };

        if record.status().is_terminal() {
            debug!(
                "Ignoring transition of {} to {}: already {}",
                transaction_id,
                status,
                record.status()
            );
            return Ok(TransitionOutcome::AlreadySettled(record.clone()));
        }

        record.response.status = status;
        record.updated_at = Utc::now();
        Ok(TransitionOutcome::Applied(record.clone()))
    }
}
