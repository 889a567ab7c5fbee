//! Redis-backed transaction store
//!
//! Each transaction is a hash at `isapay:txn:{id}` holding the JSON record plus
//! separate `status` and `updated_at` fields. Status transitions run as a Lua
//! script so the pending check and the write happen atomically on the server.

use crate::error::{AppError, AppResult};
use crate::payments::types::{PaymentStatus, ProviderName};
use crate::store::{reference_key, TransactionRecord, TransactionStore, TransitionOutcome};
use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use bb8_redis::RedisConnectionManager;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub type RedisPool = Pool<RedisConnectionManager>;

type RedisConnection<'a> = PooledConnection<'a, RedisConnectionManager>;

const KEY_PREFIX: &str = "isapay";

const TRANSITION_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], 'status')
if not current then
  return 'unknown'
end
if current ~= 'pending' then
  return current
end
redis.call('HSET', KEYS[1], 'status', ARGV[1], 'updated_at', ARGV[2])
return 'applied'
"#;

#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    pub redis_url: String,
    pub max_connections: u32,
    pub min_idle: u32,
    pub connection_timeout: Duration,
    pub max_lifetime: Duration,
    pub idle_timeout: Duration,
    /// How long settled and abandoned transactions are kept
    pub record_ttl: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            max_connections: 20,
            min_idle: 2,
            connection_timeout: Duration::from_secs(5),
            max_lifetime: Duration::from_secs(300),
            idle_timeout: Duration::from_secs(60),
            record_ttl: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

pub async fn init_pool(config: &RedisStoreConfig) -> AppResult<RedisPool> {
    info!(
        "Initializing Redis store pool: max_connections={}, redis_url={}",
        config.max_connections, config.redis_url
    );

    let manager = RedisConnectionManager::new(config.redis_url.clone()).map_err(|e| {
        error!("Failed to create Redis connection manager: {}", e);
        AppError::store(e.to_string())
    })?;

    let pool = Pool::builder()
        .max_size(config.max_connections)
        .min_idle(config.min_idle)
        .connection_timeout(config.connection_timeout)
        .max_lifetime(config.max_lifetime)
        .idle_timeout(config.idle_timeout)
        .test_on_check_out(false)
        .build(manager)
        .await
        .map_err(|e| {
            error!("Failed to build Redis connection pool: {}", e);
            AppError::store(e.to_string())
        })?;

    info!("Redis store pool initialized successfully");
    Ok(pool)
}

/// Transaction store backed by Redis
pub struct RedisTransactionStore {
    pool: RedisPool,
    record_ttl: Duration,
}

impl RedisTransactionStore {
    pub fn new(pool: RedisPool, record_ttl: Duration) -> Self {
        Self { pool, record_ttl }
    }

    /// Connect, then verify the server answers before handing the store out
    pub async fn connect(config: &RedisStoreConfig) -> AppResult<Self> {
        let pool = init_pool(config).await?;
        let store = Self::new(pool, config.record_ttl);
        store.health_check().await?;
        Ok(store)
    }

    pub async fn health_check(&self) -> AppResult<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| {
                error!("Redis PING failed: {}", e);
                AppError::store(e.to_string())
            })?;
        Ok(())
    }

    async fn connection(&self) -> AppResult<RedisConnection<'_>> {
        self.pool.get().await.map_err(|e| {
            warn!("Failed to get Redis connection: {}", e);
            AppError::store(e.to_string())
        })
    }

    fn txn_key(transaction_id: &str) -> String {
        format!("{}:txn:{}", KEY_PREFIX, transaction_id)
    }

    fn ref_key(provider: ProviderName, reference_id: &str) -> String {
        format!("{}:ref:{}", KEY_PREFIX, reference_key(provider, reference_id))
    }

    fn ttl_secs(&self) -> u64 {
        self.record_ttl.as_secs().max(1)
    }
}

fn redis_err(context: &str) -> impl Fn(redis::RedisError) -> AppError + '_ {
    move |e| {
        warn!("Redis {} failed: {}", context, e);
        AppError::store(format!("{}: {}", context, e))
    }
}

fn parse_status(raw: &str) -> AppResult<PaymentStatus> {
    match raw {
        "pending" => Ok(PaymentStatus::Pending),
        "success" => Ok(PaymentStatus::Success),
        "failed" => Ok(PaymentStatus::Failed),
        other => Err(AppError::store(format!("unexpected stored status '{}'", other))),
    }
}

#[async_trait]
impl TransactionStore for RedisTransactionStore {
    async fn insert(&self, record: &TransactionRecord) -> AppResult<()> {
        let key = Self::txn_key(record.transaction_id());
        let json = serde_json::to_string(record)?;
        let mut conn = self.connection().await?;

        let mut pipeline = redis::pipe();
        pipeline
            .atomic()
            .cmd("HSET")
            .arg(&key)
            .arg("record")
            .arg(json)
            .arg("status")
            .arg(record.status().as_str())
            .arg("updated_at")
            .arg(record.updated_at.to_rfc3339())
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(self.ttl_secs())
            .ignore();

        if let Some(reference) = &record.response.reference_id {
            pipeline
                .cmd("SET")
                .arg(Self::ref_key(record.provider(), reference))
                .arg(record.transaction_id())
                .arg("EX")
                .arg(self.ttl_secs())
                .ignore();
        }

        let _: () = pipeline
            .query_async(&mut *conn)
            .await
            .map_err(redis_err("insert"))?;

        debug!("Stored transaction {}", record.transaction_id());
        Ok(())
    }

    async fn get(&self, transaction_id: &str) -> AppResult<Option<TransactionRecord>> {
        let mut conn = self.connection().await?;
        let fields: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(Self::txn_key(transaction_id))
            .arg("record")
            .arg("status")
            .arg("updated_at")
            .query_async(&mut *conn)
            .await
            .map_err(redis_err("get"))?;

        let mut fields = fields.into_iter();
        let (Some(Some(json)), status, updated_at) =
            (fields.next(), fields.next().flatten(), fields.next().flatten())
        else {
            return Ok(None);
        };

        let mut record: TransactionRecord = serde_json::from_str(&json)?;
        if let Some(status) = status {
            record.response.status = parse_status(&status)?;
        }
        if let Some(updated_at) = updated_at {
            record.updated_at = DateTime::parse_from_rfc3339(&updated_at)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| AppError::store(format!("bad updated_at: {}", e)))?;
        }
        Ok(Some(record))
    }

    async fn find_by_reference(
        &self,
        provider: ProviderName,
        reference_id: &str,
    ) -> AppResult<Option<TransactionRecord>> {
        let mut conn = self.connection().await?;
        let transaction_id: Option<String> = redis::cmd("GET")
            .arg(Self::ref_key(provider, reference_id))
            .query_async(&mut *conn)
            .await
            .map_err(redis_err("find_by_reference"))?;
        drop(conn);

        match transaction_id {
            Some(id) => self.get(&id).await,
            None => Ok(None),
        }
    }

    async fn transition(
        &self,
        transaction_id: &str,
        status: PaymentStatus,
    ) -> AppResult<TransitionOutcome> {
        let script = redis::Script::new(TRANSITION_SCRIPT);
        let mut conn = self.connection().await?;
        let outcome: String = script
            .key(Self::txn_key(transaction_id))
            .arg(status.as_str())
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut *conn)
            .await
            .map_err(redis_err("transition"))?;
        drop(conn);

        if outcome == "unknown" {
            return Ok(TransitionOutcome::Unknown);
        }

        let Some(record) = self.get(transaction_id).await? else {
            return Ok(TransitionOutcome::Unknown);
        };

        if outcome == "applied" {
            Ok(TransitionOutcome::Applied(record))
        } else {
            debug!(
                "Ignoring transition of {} to {}: already {}",
                transaction_id, status, outcome
            );
            Ok(TransitionOutcome::AlreadySettled(record))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RedisStoreConfig::default();
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.record_ttl, Duration::from_secs(2_592_000));
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(RedisTransactionStore::txn_key("txn_1"), "isapay:txn:txn_1");
        assert_eq!(
            RedisTransactionStore::ref_key(ProviderName::Mpesa, "ws_CO_1"),
            "isapay:ref:mpesa:ws_CO_1"
        );
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("failed").unwrap(), PaymentStatus::Failed);
        assert!(parse_status("refunded").is_err());
    }
}
