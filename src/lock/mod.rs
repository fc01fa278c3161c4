use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use redis::{AsyncCommands, Client, Script};
use tracing::{debug, warn};

use crate::errors::ServiceError;

const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

fn random_token() -> String {
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| rng.sample(rand::distributions::Alphanumeric) as char)
        .collect()
}

/// Short-lived per-key mutual exclusion across service replicas, backed by
/// Redis `SET key value NX PX ttl` for acquisition and a Lua script for
/// compare-and-delete release so a stale holder can never release a lock that
/// has since expired and been reacquired by someone else.
///
/// Locks are advisory: correctness of the counters never depends on them
/// (the store's predicate-guarded updates, `repositories::inventory_repository`,
/// are what actually prevent overselling). The lock only bounds the window in
/// which a duplicate event or a partial side effect could be observed between
/// the atomic counter update and its corresponding event emission.
#[derive(Clone)]
pub struct LockService {
    client: Arc<Client>,
    default_ttl: Duration,
}

/// A held lock; releasing is explicit via `LockService::release`, or implicit
/// when used through `LockService::with_lock`.
pub struct LockGuard {
    pub key: String,
    pub token: String,
}

impl LockService {
    pub fn new(client: Arc<Client>, default_ttl: Duration) -> Self {
        Self { client, default_ttl }
    }

    /// Compare-and-set NX semantics with an absolute expiration. Returns a
    /// freshly minted owner token on success, or `None` if the key is already
    /// held. Non-blocking: does not wait or retry.
    pub async fn acquire(&self, key: &str) -> Result<Option<LockGuard>, ServiceError> {
        self.acquire_with_ttl(key, self.default_ttl).await
    }

    pub async fn acquire_with_ttl(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<LockGuard>, ServiceError> {
        let mut conn = self
            .client
            .get_tokio_connection_manager()
            .await
            .map_err(|e| ServiceError::StoreError(format!("redis connection error: {e}")))?;

        let token = random_token();
        let ttl_ms = ttl.as_millis().max(1) as usize;

        let set: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| ServiceError::StoreError(format!("redis SET NX error: {e}")))?;

        if set.is_some() {
            debug!(lock_key = %key, "lock acquired");
            Ok(Some(LockGuard {
                key: key.to_string(),
                token,
            }))
        } else {
            Ok(None)
        }
    }

    /// Atomically deletes the key only if the stored value equals `token`.
    pub async fn release(&self, key: &str, token: &str) -> Result<bool, ServiceError> {
        let mut conn = self
            .client
            .get_tokio_connection_manager()
            .await
            .map_err(|e| ServiceError::StoreError(format!("redis connection error: {e}")))?;

        let script = Script::new(RELEASE_SCRIPT);
        let deleted: i32 = script
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| ServiceError::StoreError(format!("redis release script error: {e}")))?;

        if deleted == 0 {
            warn!(lock_key = %key, "release no-op: token mismatch or already expired");
        }
        Ok(deleted == 1)
    }

    pub async fn release_guard(&self, guard: &LockGuard) -> Result<bool, ServiceError> {
        self.release(&guard.key, &guard.token).await
    }

    /// Checks that the Redis backend is reachable, for health checks.
    pub async fn ping(&self) -> Result<(), ServiceError> {
        let mut conn = self
            .client
            .get_tokio_connection_manager()
            .await
            .map_err(|e| ServiceError::StoreError(format!("redis connection error: {e}")))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| ServiceError::StoreError(format!("redis PING failed: {e}")))?;

        Ok(())
    }

    /// Acquires `key`, runs `f`, and releases on every exit path, propagating
    /// `f`'s result or error. Returns `ServiceError::LockBusy` if acquisition
    /// fails instead of running `f`.
    pub async fn with_lock<F, Fut, T>(&self, key: &str, f: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let guard = self
            .acquire(key)
            .await?
            .ok_or_else(|| ServiceError::LockBusy(key.to_string()))?;

        let result = f().await;

        if let Err(e) = self.release_guard(&guard).await {
            warn!(lock_key = %key, error = %e, "failed to release lock after critical section");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These exercise the token-generation helper only; acquire/release round
    // trips require a live Redis and are covered by the ignored integration
    // tests in tests/inventory_concurrency_test.rs.
    #[test]
    fn random_token_is_unique_and_nonempty() {
        let a = random_token();
        let b = random_token();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
