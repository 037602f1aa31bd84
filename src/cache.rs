//! Result cache keyed by content fingerprint.
//!
//! Cache unavailability must never block extraction: every backend or
//! serialization failure is logged and read as a miss (`get`), a no-write
//! (`set` returning false), or absence (`exists`). That contract is encoded
//! in the trait's return types: there is no error branch to propagate.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::schema::InvoiceData;

/// Key prefix for extraction results in the backing store.
const KEY_PREFIX: &str = "invoice_extract:result:";
/// Bound on how long a degraded backend can stall a request.
const OP_TIMEOUT: Duration = Duration::from_secs(5);
/// Default time-to-live for cached results (24 hours).
pub const DEFAULT_TTL: Duration = Duration::from_secs(86400);

/// Fingerprint-keyed store of extraction results.
///
/// Implementations swallow their own failures; callers can always treat the
/// cache as best-effort.
#[async_trait::async_trait]
pub trait ResultCache: Send + Sync {
    /// Look up a cached record. Backend errors read as a miss.
    async fn get(&self, fingerprint: &str) -> Option<InvoiceData>;
    /// Store a record with the configured TTL. Returns false on failure.
    async fn set(&self, fingerprint: &str, record: &InvoiceData) -> bool;
    /// Whether a record exists. False on error.
    async fn exists(&self, fingerprint: &str) -> bool;
    /// Health probe for the backing store.
    async fn ping(&self) -> bool;
}

fn data_key(fingerprint: &str) -> String {
    format!("{}{}", KEY_PREFIX, fingerprint)
}

fn short(fingerprint: &str) -> &str {
    &fingerprint[..fingerprint.len().min(8)]
}

// ============================================================================
// Redis backend
// ============================================================================

/// Redis-backed result cache.
///
/// One `ConnectionManager` is established lazily on first use and reused
/// for the process lifetime; it reconnects internally on connection loss.
pub struct RedisResultCache {
    url: String,
    ttl: Duration,
    conn: tokio::sync::Mutex<Option<ConnectionManager>>,
}

impl RedisResultCache {
    pub fn new(url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            url: url.into(),
            ttl,
            conn: tokio::sync::Mutex::new(None),
        }
    }

    async fn connection(&self) -> Result<ConnectionManager, redis::RedisError> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let client = redis::Client::open(self.url.as_str())?;
        let conn = ConnectionManager::new(client).await?;
        info!("connected to redis at {}", self.url);
        *guard = Some(conn.clone());
        Ok(conn)
    }
}

#[async_trait::async_trait]
impl ResultCache for RedisResultCache {
    async fn get(&self, fingerprint: &str) -> Option<InvoiceData> {
        let lookup = tokio::time::timeout(OP_TIMEOUT, async {
            let mut conn = self.connection().await?;
            conn.get::<_, Option<String>>(data_key(fingerprint)).await
        })
        .await;

        match lookup {
            Ok(Ok(Some(raw))) => match serde_json::from_str(&raw) {
                Ok(record) => {
                    info!("cache hit for key: {}...", short(fingerprint));
                    Some(record)
                }
                Err(e) => {
                    warn!("cache entry for {}... failed to parse: {}", short(fingerprint), e);
                    None
                }
            },
            Ok(Ok(None)) => {
                info!("cache miss for key: {}...", short(fingerprint));
                None
            }
            Ok(Err(e)) => {
                warn!("redis get error for key {}...: {}", short(fingerprint), e);
                None
            }
            Err(_) => {
                warn!("redis get timed out for key {}...", short(fingerprint));
                None
            }
        }
    }

    async fn set(&self, fingerprint: &str, record: &InvoiceData) -> bool {
        let raw = match serde_json::to_string(record) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("failed to serialize record for cache: {}", e);
                return false;
            }
        };

        let write = tokio::time::timeout(OP_TIMEOUT, async {
            let mut conn = self.connection().await?;
            conn.set_ex::<_, _, ()>(data_key(fingerprint), raw, self.ttl.as_secs())
                .await
        })
        .await;

        match write {
            Ok(Ok(())) => {
                info!("cache set for key: {}...", short(fingerprint));
                true
            }
            Ok(Err(e)) => {
                warn!("redis set error for key {}...: {}", short(fingerprint), e);
                false
            }
            Err(_) => {
                warn!("redis set timed out for key {}...", short(fingerprint));
                false
            }
        }
    }

    async fn exists(&self, fingerprint: &str) -> bool {
        let check = tokio::time::timeout(OP_TIMEOUT, async {
            let mut conn = self.connection().await?;
            conn.exists::<_, bool>(data_key(fingerprint)).await
        })
        .await;

        match check {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                warn!("redis exists error for key {}...: {}", short(fingerprint), e);
                false
            }
            Err(_) => {
                warn!("redis exists timed out for key {}...", short(fingerprint));
                false
            }
        }
    }

    async fn ping(&self) -> bool {
        let probe = tokio::time::timeout(OP_TIMEOUT, async {
            let mut conn = self.connection().await?;
            redis::cmd("PING").query_async::<String>(&mut conn).await
        })
        .await;

        matches!(probe, Ok(Ok(_)))
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// In-memory result cache for redis-less deployments and tests.
///
/// Entries carry their own expiry instant; expired entries are dropped on
/// read.
pub struct MemoryResultCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, (InvoiceData, Instant)>>,
}

impl MemoryResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn live_entry(&self, fingerprint: &str) -> Option<InvoiceData> {
        let expired = {
            let entries = self.entries.read().unwrap();
            match entries.get(fingerprint) {
                Some((record, expires_at)) if *expires_at > Instant::now() => {
                    return Some(record.clone());
                }
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.entries.write().unwrap().remove(fingerprint);
            debug!("evicted expired cache entry for {}...", short(fingerprint));
        }
        None
    }
}

impl Default for MemoryResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[async_trait::async_trait]
impl ResultCache for MemoryResultCache {
    async fn get(&self, fingerprint: &str) -> Option<InvoiceData> {
        let hit = self.live_entry(fingerprint);
        if hit.is_some() {
            info!("cache hit for key: {}...", short(fingerprint));
        } else {
            info!("cache miss for key: {}...", short(fingerprint));
        }
        hit
    }

    async fn set(&self, fingerprint: &str, record: &InvoiceData) -> bool {
        let expires_at = Instant::now() + self.ttl;
        self.entries
            .write()
            .unwrap()
            .insert(fingerprint.to_string(), (record.clone(), expires_at));
        true
    }

    async fn exists(&self, fingerprint: &str) -> bool {
        self.live_entry(fingerprint).is_some()
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> InvoiceData {
        serde_json::from_str(
            r#"{"invoice_number":"INV-1","vendor_name":"Acme","subtotal":10,"tax":1,"total":11}"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_memory_set_get_roundtrip() {
        let cache = MemoryResultCache::default();
        let record = sample_record();

        assert!(cache.get("abc").await.is_none());
        assert!(cache.set("abc", &record).await);
        assert_eq!(cache.get("abc").await.unwrap(), record);
        assert!(cache.exists("abc").await);
    }

    #[tokio::test]
    async fn test_memory_set_is_idempotent() {
        let cache = MemoryResultCache::default();
        let record = sample_record();

        assert!(cache.set("abc", &record).await);
        assert!(cache.set("abc", &record).await);
        assert_eq!(cache.get("abc").await.unwrap(), record);
    }

    #[tokio::test]
    async fn test_memory_entries_expire() {
        let cache = MemoryResultCache::new(Duration::from_millis(10));
        cache.set("abc", &sample_record()).await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get("abc").await.is_none());
        assert!(!cache.exists("abc").await);
    }

    #[tokio::test]
    async fn test_redis_degrades_to_miss_when_unreachable() {
        // Nothing listens on this port; connection errors must read as
        // miss/no-write, never as a request failure.
        let cache = RedisResultCache::new("redis://127.0.0.1:1/", DEFAULT_TTL);

        assert!(cache.get("abc").await.is_none());
        assert!(!cache.set("abc", &sample_record()).await);
        assert!(!cache.exists("abc").await);
        assert!(!cache.ping().await);
    }
}
