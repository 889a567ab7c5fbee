//! Payment service
//!
//! Ties the stateless gateway to the transaction store: initiations are
//! persisted, failed ones can be retried and webhook outcomes are settled
//! exactly once per transaction.

use crate::error::{AppError, AppResult};
use crate::payments::gateway::PaymentGateway;
use crate::payments::types::{
    CardDetails, PaymentRequest, PaymentResponse, PaymentStatus, ProviderName,
    WebhookVerification,
};
use crate::store::{TransactionRecord, TransactionStore, TransitionOutcome};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// What happened to a verified webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// The transaction moved out of `pending`
    Applied,
    /// The transaction was already terminal; the event was ignored
    AlreadySettled,
    /// The callback still reports an in-flight payment
    StillPending,
    /// No stored transaction matched the callback
    UnknownTransaction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settlement {
    pub provider: ProviderName,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    pub outcome: SettlementOutcome,
}

#[derive(Clone)]
pub struct PaymentService {
    gateway: Arc<PaymentGateway>,
    store: Arc<dyn TransactionStore>,
}

impl PaymentService {
    pub fn new(gateway: Arc<PaymentGateway>, store: Arc<dyn TransactionStore>) -> Self {
        Self { gateway, store }
    }

    pub fn gateway(&self) -> &PaymentGateway {
        &self.gateway
    }

    /// Initiate a payment and persist the attempt.
    ///
    /// Card data is forwarded to the provider but never stored.
    pub async fn initiate(&self, request: PaymentRequest) -> AppResult<PaymentResponse> {
        let response = self.gateway.initiate(&request).await?;
        let record = TransactionRecord::new(request.redacted(), response.clone());
        self.record(&record).await?;

        info!(
            "Payment {} initiated with {} ({})",
            response.transaction_id, response.provider, response.status
        );
        Ok(response)
    }

    /// Last known state of a transaction
    pub async fn status(&self, transaction_id: &str) -> AppResult<PaymentResponse> {
        self.store
            .get(transaction_id)
            .await?
            .map(|record| record.response)
            .ok_or_else(|| AppError::not_found(transaction_id))
    }

    /// Re-run initiation for a failed transaction.
    ///
    /// The retry is a new transaction with a fresh id that points back at the
    /// one it replaces. There is no backoff and no attempt limit. Card data is
    /// not kept, so card payments must pass fresh `card_details`.
    pub async fn retry(
        &self,
        transaction_id: &str,
        card_details: Option<CardDetails>,
    ) -> AppResult<PaymentResponse> {
        let previous = self
            .store
            .get(transaction_id)
            .await?
            .ok_or_else(|| AppError::not_found(transaction_id))?;

        if previous.status() != PaymentStatus::Failed {
            return Err(AppError::conflict(
                transaction_id,
                previous.status().as_str(),
            ));
        }

        let mut request = previous.request.clone();
        request.card_details = card_details;

        let mut response = self.gateway.initiate(&request).await?;
        response.set_metadata("retry_of", json!(transaction_id));

        let mut record = TransactionRecord::new(request.redacted(), response.clone());
        record.attempts = previous.attempts + 1;
        record.retry_of = Some(transaction_id.to_string());
        self.record(&record).await?;

        info!(
            "Retried payment {} as {} (attempt {})",
            transaction_id, response.transaction_id, record.attempts
        );
        Ok(response)
    }

    /// Apply a verified webhook to the stored transaction
    pub async fn settle(
        &self,
        provider: ProviderName,
        verification: WebhookVerification,
    ) -> AppResult<Settlement> {
        let record = self.resolve(provider, &verification).await?;
        let transaction_id = record
            .as_ref()
            .map(|r| r.transaction_id().to_string())
            .or_else(|| verification.transaction_id.clone());

        let outcome = match (&record, verification.status) {
            (None, _) => {
                warn!(
                    "{} webhook for unknown transaction (transaction_id={:?}, reference_id={:?})",
                    provider, verification.transaction_id, verification.reference_id
                );
                SettlementOutcome::UnknownTransaction
            }
            (Some(_), PaymentStatus::Pending) => SettlementOutcome::StillPending,
            (Some(record), status) => {
                match self.store.transition(record.transaction_id(), status).await? {
                    TransitionOutcome::Applied(_) => {
                        info!(
                            "Transaction {} settled as {} by {} webhook",
                            record.transaction_id(),
                            status,
                            provider
                        );
                        SettlementOutcome::Applied
                    }
                    TransitionOutcome::AlreadySettled(existing) => {
                        warn!(
                            "Duplicate {} webhook for {}: already {}",
                            provider,
                            record.transaction_id(),
                            existing.status()
                        );
                        SettlementOutcome::AlreadySettled
                    }
                    TransitionOutcome::Unknown => SettlementOutcome::UnknownTransaction,
                }
            }
        };

        Ok(Settlement {
            provider,
            status: verification.status,
            transaction_id,
            reference_id: verification.reference_id,
            outcome,
        })
    }

    /// Persist a record whose payment is already live at the provider.
    ///
    /// A failure here leaves a payment the store knows nothing about, so it is
    /// logged with everything needed to reconcile it by hand.
    async fn record(&self, record: &TransactionRecord) -> AppResult<()> {
        self.store.insert(record).await.map_err(|e| {
            error!(
                "Payment {} accepted by {} (reference_id={:?}) but not recorded: {}",
                record.transaction_id(),
                record.provider(),
                record.response.reference_id,
                e
            );
            AppError::store(format!(
                "payment {} was accepted by {} but could not be recorded: {}",
                record.transaction_id(),
                record.provider(),
                e
            ))
        })
    }

    async fn resolve(
        &self,
        provider: ProviderName,
        verification: &WebhookVerification,
    ) -> AppResult<Option<TransactionRecord>> {
        if let Some(id) = &verification.transaction_id {
            if let Some(record) = self.store.get(id).await? {
                return Ok(Some(record).filter(|r| r.provider() == provider));
            }
        }

        match &verification.reference_id {
            Some(reference) => self.store.find_by_reference(provider, reference).await,
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::gateway::{ProvidersConfig, RouteTable};
    use crate::error::AppErrorKind;
    use crate::store::InMemoryTransactionStore;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use std::time::Duration;

    fn gateway() -> Arc<PaymentGateway> {
        let gateway = PaymentGateway::from_config(
            ProvidersConfig::default(),
            RouteTable::default(),
            Duration::from_secs(5),
        )
        .unwrap();
        Arc::new(gateway)
    }

    fn service() -> PaymentService {
        PaymentService::new(gateway(), Arc::new(InMemoryTransactionStore::new()))
    }

    /// Store whose writes always fail
    struct FailingStore;

    #[async_trait]
    impl TransactionStore for FailingStore {
        async fn insert(&self, _record: &TransactionRecord) -> AppResult<()> {
            Err(AppError::store("connection reset"))
        }

        async fn get(&self, _transaction_id: &str) -> AppResult<Option<TransactionRecord>> {
            Ok(None)
        }

        async fn find_by_reference(
            &self,
            _provider: ProviderName,
            _reference_id: &str,
        ) -> AppResult<Option<TransactionRecord>> {
            Ok(None)
        }

        async fn transition(
            &self,
            _transaction_id: &str,
            _status: PaymentStatus,
        ) -> AppResult<TransitionOutcome> {
            Ok(TransitionOutcome::Unknown)
        }
    }

    fn card() -> CardDetails {
        CardDetails {
            number: "4111111111111111".to_string(),
            expiry_month: "12".to_string(),
            expiry_year: "2031".to_string(),
            cvv: "321".to_string(),
            holder_name: Some("A Holder".to_string()),
        }
    }

    fn card_request() -> PaymentRequest {
        PaymentRequest {
            user_id: "user-1".to_string(),
            amount: 120.0,
            currency: "USD".to_string(),
            method: "card".to_string(),
            order_id: Some("order-9".to_string()),
            description: None,
            phone_number: None,
            card_details: Some(card()),
            bank_details: None,
        }
    }

    fn mpesa_request() -> PaymentRequest {
        PaymentRequest {
            user_id: "user-1".to_string(),
            amount: 75.0,
            currency: "KES".to_string(),
            method: "mpesa".to_string(),
            order_id: Some("order-3".to_string()),
            description: None,
            phone_number: Some("254712345678".to_string()),
            card_details: None,
            bank_details: None,
        }
    }

    fn verification(id: &str, status: PaymentStatus) -> WebhookVerification {
        WebhookVerification {
            status,
            reference_id: None,
            transaction_id: Some(id.to_string()),
        }
    }

    #[tokio::test]
    async fn test_initiate_persists_record() {
        let service = service();
        let response = service.initiate(mpesa_request()).await.unwrap();

        let stored = service.status(&response.transaction_id).await.unwrap();
        assert_eq!(stored, response);
    }

    #[tokio::test]
    async fn test_validation_failure_persists_nothing() {
        let service = service();
        let mut request = mpesa_request();
        request.method = "cheque".to_string();

        let err = service.initiate(request).await.unwrap_err();
        assert_eq!(err.field(), Some("method"));
    }

    #[tokio::test]
    async fn test_status_unknown_is_not_found() {
        let err = service().status("txn_missing").await.unwrap_err();
        assert_eq!(err, AppError::not_found("txn_missing"));
    }

    #[tokio::test]
    async fn test_settle_applies_once() {
        let service = service();
        let response = service.initiate(mpesa_request()).await.unwrap();
        let id = response.transaction_id.clone();

        let first = service
            .settle(ProviderName::Mpesa, verification(&id, PaymentStatus::Success))
            .await
            .unwrap();
        assert_eq!(first.outcome, SettlementOutcome::Applied);

        let second = service
            .settle(ProviderName::Mpesa, verification(&id, PaymentStatus::Failed))
            .await
            .unwrap();
        assert_eq!(second.outcome, SettlementOutcome::AlreadySettled);

        assert_eq!(
            service.status(&id).await.unwrap().status,
            PaymentStatus::Success
        );
    }

    #[tokio::test]
    async fn test_settle_pending_changes_nothing() {
        let service = service();
        let response = service.initiate(mpesa_request()).await.unwrap();

        let settlement = service
            .settle(
                ProviderName::Mpesa,
                verification(&response.transaction_id, PaymentStatus::Pending),
            )
            .await
            .unwrap();
        assert_eq!(settlement.outcome, SettlementOutcome::StillPending);
    }

    #[tokio::test]
    async fn test_settle_ignores_other_providers_transactions() {
        let service = service();
        let response = service.initiate(mpesa_request()).await.unwrap();

        let settlement = service
            .settle(
                ProviderName::Airtel,
                verification(&response.transaction_id, PaymentStatus::Success),
            )
            .await
            .unwrap();
        assert_eq!(settlement.outcome, SettlementOutcome::UnknownTransaction);
        assert_eq!(
            service.status(&response.transaction_id).await.unwrap().status,
            PaymentStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_retry_requires_failed_status() {
        let service = service();
        let response = service.initiate(mpesa_request()).await.unwrap();
        let id = response.transaction_id.clone();

        let err = service.retry(&id, None).await.unwrap_err();
        assert_eq!(err, AppError::conflict(id.as_str(), "pending"));

        let err = service.retry("txn_missing", None).await.unwrap_err();
        assert_eq!(err, AppError::not_found("txn_missing"));
    }

    #[tokio::test]
    async fn test_retry_creates_linked_transaction() {
        let service = service();
        let response = service.initiate(mpesa_request()).await.unwrap();
        let id = response.transaction_id.clone();

        service
            .settle(ProviderName::Mpesa, verification(&id, PaymentStatus::Failed))
            .await
            .unwrap();

        let retried = service.retry(&id, None).await.unwrap();
        assert_ne!(retried.transaction_id, id);
        assert_eq!(retried.status, PaymentStatus::Pending);
        assert_eq!(retried.metadata["retry_of"], id.as_str());

        let original = service.status(&id).await.unwrap();
        assert_eq!(original.status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_card_data_is_never_stored() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let service = PaymentService::new(gateway(), store.clone());
        let response = service.initiate(card_request()).await.unwrap();

        let record = store.get(&response.transaction_id).await.unwrap().unwrap();
        assert!(record.request.card_details.is_none());

        let serialized = serde_json::to_string(&record).unwrap();
        assert!(!serialized.contains("cvv"));
        assert!(!serialized.contains("4111111111111111"));
    }

    #[tokio::test]
    async fn test_card_retry_requires_fresh_details() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let service = PaymentService::new(gateway(), store.clone());
        let response = service.initiate(card_request()).await.unwrap();
        let id = response.transaction_id.clone();
        service
            .settle(ProviderName::Dpo, verification(&id, PaymentStatus::Failed))
            .await
            .unwrap();

        let err = service.retry(&id, None).await.unwrap_err();
        assert_eq!(err.field(), Some("card_details"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let retried = service.retry(&id, Some(card())).await.unwrap();
        assert_eq!(retried.metadata["retry_of"], id.as_str());

        let record = store.get(&retried.transaction_id).await.unwrap().unwrap();
        assert_eq!(record.attempts, 2);
        assert!(record.request.card_details.is_none());
    }

    #[tokio::test]
    async fn test_store_failure_after_provider_accepts() {
        let service = PaymentService::new(gateway(), Arc::new(FailingStore));

        let err = service.initiate(mpesa_request()).await.unwrap_err();
        assert!(matches!(err.kind, AppErrorKind::Infrastructure(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("accepted by mpesa"));
        assert!(err.to_string().contains("connection reset"));
    }
}
