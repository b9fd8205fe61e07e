//! Result caching and distributed locking (§4.5).
//!
//! Wraps a `fred` Redis client. When the deployment hasn't configured caching
//! ([`crate::config::EngineConfig::caching_active`] is `false`), [`CacheHandler::disabled`]
//! builds a handler that never touches the network: `lookup` always misses and `lock`/`store`
//! are no-ops, so the engine loop doesn't need two code paths.

pub mod codec;
pub mod key;

use std::time::Duration;

use fred::clients::Client;
use fred::interfaces::{ClientLike, HashesInterface, KeysInterface, LuaInterface};
use fred::types::Expiration;
use uuid::Uuid;

use crate::error::TrapiError;
use crate::record::Record;

pub use key::CacheKeyInput;

/// Unlocks only if the caller's token still matches what's stored — guards against releasing a
/// lock some other process has since acquired after this one's lease expired (§4.5 "Locking").
const UNLOCK_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// A held lock; releasing it is an explicit call rather than a `Drop` impl, since release needs
/// to run against an async client and the caller already has one in scope (§4.5).
pub struct LockGuard {
    key: String,
    token: String,
}

pub struct CacheHandler {
    client: Option<Client>,
    ttl: Duration,
}

impl CacheHandler {
    /// Builds a handler backed by a live Redis connection.
    pub async fn connect(host: &str, port: u16, ttl: Duration) -> Result<Self, TrapiError> {
        let config = fred::types::config::Config {
            server: fred::types::config::ServerConfig::new_centralized(host, port),
            ..Default::default()
        };
        let client = Client::new(config, None, None, None);
        let _join_handle = client.connect();
        client
            .wait_for_connect()
            .await
            .map_err(|e| crate::internal_error!("failed to connect to cache backend: {e}"))?;
        Ok(CacheHandler {
            client: Some(client),
            ttl,
        })
    }

    /// A handler that never touches the network (§9 "caching disabled" deployments).
    pub fn disabled() -> Self {
        CacheHandler {
            client: None,
            ttl: Duration::from_secs(600),
        }
    }

    pub fn is_active(&self) -> bool {
        self.client.is_some()
    }

    /// Tries to acquire the distributed lock for `cache_key` (§4.5: `SET NX PX` under a
    /// `:lock` suffix). Returns `None` immediately if caching is disabled or another process
    /// already holds the lock — callers treat a miss as "someone else is filling this entry,
    /// proceed without caching this round".
    pub async fn lock(&self, cache_key: &str, lease: Duration) -> Result<Option<LockGuard>, TrapiError> {
        let Some(client) = &self.client else {
            return Ok(None);
        };
        let lock_key = format!("{cache_key}:lock");
        let token = Uuid::new_v4().to_string();
        let acquired: Option<String> = client
            .set(
                &lock_key,
                &token,
                Some(Expiration::PX(lease.as_millis() as i64)),
                Some(fred::types::SetOptions::NX),
                false,
            )
            .await
            .map_err(|e| crate::internal_error!("cache lock SET failed: {e}"))?;
        Ok(acquired.map(|_| LockGuard {
            key: lock_key,
            token,
        }))
    }

    pub async fn unlock(&self, guard: LockGuard) -> Result<(), TrapiError> {
        let Some(client) = &self.client else {
            return Ok(());
        };
        let _: i64 = client
            .eval(UNLOCK_SCRIPT, vec![guard.key], vec![guard.token])
            .await
            .map_err(|e| crate::internal_error!("cache unlock script failed: {e}"))?;
        Ok(())
    }

    /// Looks up a previously cached record set. Misses (disabled cache, absent key, any
    /// decode failure) return `Ok(None)` rather than erroring — a cache miss always just falls
    /// through to the live batch handler (§4.5, §7).
    pub async fn lookup(&self, cache_key: &str, qedge_id: &str) -> Result<Option<Vec<Record>>, TrapiError> {
        let Some(client) = &self.client else {
            return Ok(None);
        };
        let raw: std::collections::HashMap<String, String> = client
            .hgetall(cache_key)
            .await
            .map_err(|e| crate::internal_error!("cache HGETALL failed: {e}"))?;
        if raw.is_empty() {
            return Ok(None);
        }
        let chunk_count: usize = raw
            .get("chunk_count")
            .and_then(|c| c.parse().ok())
            .unwrap_or(0);
        if chunk_count == 0 {
            return Ok(None);
        }
        let mut chunks = Vec::with_capacity(chunk_count);
        for i in 0..chunk_count {
            match raw.get(&format!("chunk:{i}")) {
                Some(c) => chunks.push(c.clone()),
                None => return Ok(None),
            }
        }
        Ok(Some(codec::decode(&chunks, qedge_id)))
    }

    /// Stores a record set, chunked and compressed, with this handler's configured TTL (§4.5).
    pub async fn store(&self, cache_key: &str, records: &[Record]) -> Result<(), TrapiError> {
        let Some(client) = &self.client else {
            return Ok(());
        };
        let chunks = codec::encode(records)?;
        let mut fields: Vec<(String, String)> = vec![("chunk_count".to_string(), chunks.len().to_string())];
        for (i, chunk) in chunks.into_iter().enumerate() {
            fields.push((format!("chunk:{i}"), chunk));
        }
        client
            .hset(cache_key, fields)
            .await
            .map_err(|e| crate::internal_error!("cache HSET failed: {e}"))?;
        client
            .expire(cache_key, self.ttl.as_secs() as i64, None)
            .await
            .map_err(|e| crate::internal_error!("cache EXPIRE failed: {e}"))?;
        Ok(())
    }
}
