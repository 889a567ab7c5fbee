//! Integration tests for the Redis transaction store
//!
//! These tests require a running Redis instance.
//! Run with: REDIS_URL=redis://localhost:6379 cargo test --test redis_store_integration_test -- --ignored

#[cfg(feature = "cache")]
mod redis_store_tests {
    use isapay_gateway::payments::{
        PaymentRequest, PaymentResponse, PaymentStatus, ProviderName,
    };
    use isapay_gateway::store::{
        RedisStoreConfig, RedisTransactionStore, TransactionRecord, TransactionStore,
        TransitionOutcome,
    };
    use serde_json::json;
    use std::sync::Arc;

    async fn setup_store() -> RedisTransactionStore {
        let config = RedisStoreConfig {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            ..Default::default()
        };

        RedisTransactionStore::connect(&config)
            .await
            .expect("Failed to connect to Redis")
    }

    fn record(reference: &str) -> TransactionRecord {
        let id = format!("txn_{}", uuid::Uuid::new_v4().simple());
        let request = PaymentRequest {
            user_id: "user-1".to_string(),
            amount: 42.0,
            currency: "KES".to_string(),
            method: "mpesa".to_string(),
            order_id: None,
            description: None,
            phone_number: Some("254712345678".to_string()),
            card_details: None,
            bank_details: None,
        };
        let response = PaymentResponse {
            transaction_id: id,
            provider: ProviderName::Mpesa,
            status: PaymentStatus::Pending,
            amount: 42.0,
            currency: "KES".to_string(),
            redirect_url: None,
            reference_id: Some(reference.to_string()),
            metadata: json!({ "mode": "stub" }),
        };
        TransactionRecord::new(request, response)
    }

    #[tokio::test]
    #[ignore]
    async fn test_insert_get_and_reference_lookup() {
        let store = setup_store().await;
        store.health_check().await.unwrap();

        let reference = format!("ws_CO_{}", uuid::Uuid::new_v4().simple());
        let record = record(&reference);
        store.insert(&record).await.unwrap();

        let found = store.get(record.transaction_id()).await.unwrap().unwrap();
        assert_eq!(found.response, record.response);

        let by_ref = store
            .find_by_reference(ProviderName::Mpesa, &reference)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_ref.transaction_id(), record.transaction_id());

        assert!(store
            .find_by_reference(ProviderName::Dpo, &reference)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    #[ignore]
    async fn test_transition_is_compare_and_set() {
        let store = setup_store().await;
        let record = record("ws_CO_cas");
        store.insert(&record).await.unwrap();
        let id = record.transaction_id().to_string();

        let first = store.transition(&id, PaymentStatus::Failed).await.unwrap();
        assert!(matches!(first, TransitionOutcome::Applied(ref r) if r.status() == PaymentStatus::Failed));

        let second = store.transition(&id, PaymentStatus::Success).await.unwrap();
        assert!(matches!(second, TransitionOutcome::AlreadySettled(ref r) if r.status() == PaymentStatus::Failed));

        let unknown = store
            .transition("txn_does_not_exist", PaymentStatus::Success)
            .await
            .unwrap();
        assert_eq!(unknown, TransitionOutcome::Unknown);
    }

    #[tokio::test]
    #[ignore]
    async fn test_concurrent_transitions_apply_once() {
        let store = Arc::new(setup_store().await);
        let record = record("ws_CO_race");
        store.insert(&record).await.unwrap();
        let id = record.transaction_id().to_string();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store.transition(&id, PaymentStatus::Success).await.unwrap()
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), TransitionOutcome::Applied(_)) {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
    }
}
