use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use redis::{aio::ConnectionManager, Client, RedisError, RedisResult};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::ServiceError;
use crate::config::RedisConfig;
use crate::models::TokenType;

/// Structured revocation-store key, rendered `scope:partition:discriminator`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RevocationKey {
    pub scope: String,
    pub partition: String,
    pub discriminator: String,
}

impl RevocationKey {
    pub fn new(
        scope: impl Into<String>,
        partition: impl Into<String>,
        discriminator: impl Into<String>,
    ) -> Self {
        Self {
            scope: scope.into(),
            partition: partition.into(),
            discriminator: discriminator.into(),
        }
    }

    /// Marker for one token: `access_banned:<user>:<jti>`.
    pub fn individual(token_type: TokenType, user_id: Uuid, jti: Uuid) -> Self {
        Self::new(token_type.ban_scope(), user_id.to_string(), jti.to_string())
    }

    /// Marker for every token of a type held by a user: `access_banned:all:<user>`.
    pub fn global(token_type: TokenType, user_id: Uuid) -> Self {
        Self::new(token_type.ban_scope(), "all", user_id.to_string())
    }
}

impl fmt::Display for RevocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.scope, self.partition, self.discriminator)
    }
}

/// Key-value store with per-key expiry backing the ban markers.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    async fn get(&self, key: &RevocationKey) -> Result<Option<String>, ServiceError>;

    /// Write one marker. A non-positive TTL writes nothing.
    async fn set(
        &self,
        key: &RevocationKey,
        value: &str,
        ttl_seconds: i64,
    ) -> Result<(), ServiceError>;

    /// Write many markers sharing one TTL in a single round trip.
    async fn pipeline_set(
        &self,
        entries: &[(RevocationKey, String)],
        ttl_seconds: i64,
    ) -> Result<(), ServiceError>;

    async fn health_check(&self) -> Result<(), ServiceError>;
}

#[derive(Clone)]
pub struct RedisService {
    _client: Client,
    manager: ConnectionManager,
    max_retries: u32,
}

impl RedisService {
    pub async fn new(config: &RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        // Use ConnectionManager for automatic reconnection
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
            max_retries: config.max_retries.max(1),
        })
    }

    /// Run `op` against a fresh handle, retrying connection-class failures
    /// with exponential backoff up to `max_retries` attempts.
    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut f: F) -> Result<T, ServiceError>
    where
        F: FnMut(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(50),
            max_interval: Duration::from_secs(2),
            max_elapsed_time: None,
            ..Default::default()
        };
        let attempts = AtomicU32::new(0);
        let max_retries = self.max_retries;

        let result = retry(policy, || {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            let call = f(self.manager.clone());
            async move {
                call.await.map_err(|e| {
                    if is_transient(&e) && attempt < max_retries {
                        tracing::warn!(op, attempt, error = %e, "Redis call failed, retrying");
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await;

        result.map_err(|e| {
            if is_transient(&e) {
                tracing::error!(op, error = %e, "Redis retries exhausted");
                ServiceError::TransientStoreFailure(format!("{} failed: {}", op, e))
            } else {
                ServiceError::Internal(anyhow::anyhow!("Redis {} failed: {}", op, e))
            }
        })
    }
}

fn is_transient(err: &RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout()
}

#[async_trait]
impl RevocationStore for RedisService {
    async fn get(&self, key: &RevocationKey) -> Result<Option<String>, ServiceError> {
        let key = key.to_string();
        self.with_retry("GET", move |mut conn| {
            let key = key.clone();
            async move { redis::cmd("GET").arg(key).query_async(&mut conn).await }
        })
        .await
    }

    async fn set(
        &self,
        key: &RevocationKey,
        value: &str,
        ttl_seconds: i64,
    ) -> Result<(), ServiceError> {
        if ttl_seconds <= 0 {
            return Ok(());
        }
        let key = key.to_string();
        let value = value.to_string();
        self.with_retry("SET", move |mut conn| {
            let (key, value) = (key.clone(), value.clone());
            async move {
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("EX")
                    .arg(ttl_seconds)
                    .query_async(&mut conn)
                    .await
            }
        })
        .await
    }

    async fn pipeline_set(
        &self,
        entries: &[(RevocationKey, String)],
        ttl_seconds: i64,
    ) -> Result<(), ServiceError> {
        if entries.is_empty() || ttl_seconds <= 0 {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            pipe.cmd("SET")
                .arg(key.to_string())
                .arg(value)
                .arg("EX")
                .arg(ttl_seconds)
                .ignore();
        }

        self.with_retry("MULTI/EXEC", move |mut conn| {
            let pipe = pipe.clone();
            async move { pipe.query_async(&mut conn).await }
        })
        .await
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| ServiceError::TransientStoreFailure(format!("health check failed: {}", e)))
    }
}

/// In-memory store honouring TTLs.
pub struct MockRevocationStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    unavailable: AtomicBool,
}

impl Default for MockRevocationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRevocationStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every call fail as if the store were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Remaining TTL of a live key.
    pub fn ttl(&self, key: &RevocationKey) -> Option<Duration> {
        let entries = self.entries.lock().ok()?;
        let (_, deadline) = entries.get(&key.to_string())?;
        deadline.checked_duration_since(Instant::now())
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|(_, d)| *d > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), ServiceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ServiceError::TransientStoreFailure(
                "mock store unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn insert(&self, key: String, value: String, ttl_seconds: i64) -> Result<(), ServiceError> {
        let deadline = Instant::now() + Duration::from_secs(ttl_seconds as u64);
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock revocation store mutex poisoned: {}", e))?
            .insert(key, (value, deadline));
        Ok(())
    }
}

#[async_trait]
impl RevocationStore for MockRevocationStore {
    async fn get(&self, key: &RevocationKey) -> Result<Option<String>, ServiceError> {
        self.check_available()?;
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock revocation store mutex poisoned: {}", e))?;

        let key = key.to_string();
        match entries.get(&key) {
            Some((_, deadline)) if *deadline <= Instant::now() => {
                entries.remove(&key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &RevocationKey,
        value: &str,
        ttl_seconds: i64,
    ) -> Result<(), ServiceError> {
        self.check_available()?;
        if ttl_seconds <= 0 {
            return Ok(());
        }
        self.insert(key.to_string(), value.to_string(), ttl_seconds)
    }

    async fn pipeline_set(
        &self,
        entries: &[(RevocationKey, String)],
        ttl_seconds: i64,
    ) -> Result<(), ServiceError> {
        self.check_available()?;
        if ttl_seconds <= 0 {
            return Ok(());
        }
        for (key, value) in entries {
            self.insert(key.to_string(), value.clone(), ttl_seconds)?;
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_rendering() {
        let user = Uuid::new_v4();
        let jti = Uuid::new_v4();

        assert_eq!(
            RevocationKey::global(TokenType::Access, user).to_string(),
            format!("access_banned:all:{}", user)
        );
        assert_eq!(
            RevocationKey::individual(TokenType::Refresh, user, jti).to_string(),
            format!("refresh_banned:{}:{}", user, jti)
        );
    }

    #[tokio::test]
    async fn test_mock_get_set() -> Result<(), anyhow::Error> {
        let store = MockRevocationStore::new();
        let key = RevocationKey::new("scope", "partition", "disc");

        assert_eq!(store.get(&key).await?, None);
        store.set(&key, "value", 60).await?;
        assert_eq!(store.get(&key).await?.as_deref(), Some("value"));
        assert!(store.ttl(&key).is_some_and(|ttl| ttl <= Duration::from_secs(60)));
        Ok(())
    }

    #[tokio::test]
    async fn test_mock_skips_non_positive_ttl() -> Result<(), anyhow::Error> {
        let store = MockRevocationStore::new();
        let key = RevocationKey::new("scope", "partition", "disc");

        store.set(&key, "value", 0).await?;
        store
            .pipeline_set(&[(key.clone(), "value".to_string())], -5)
            .await?;
        assert!(store.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_mock_pipeline_writes_every_entry() -> Result<(), anyhow::Error> {
        let store = MockRevocationStore::new();
        let entries: Vec<_> = (0..3)
            .map(|_| (RevocationKey::global(TokenType::Access, Uuid::new_v4()), "1".to_string()))
            .collect();

        store.pipeline_set(&entries, 30).await?;
        assert_eq!(store.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_mock_unavailable() {
        let store = MockRevocationStore::new();
        store.set_unavailable(true);
        let result = store.get(&RevocationKey::new("a", "b", "c")).await;
        assert!(matches!(result, Err(ServiceError::TransientStoreFailure(_))));
    }
}
