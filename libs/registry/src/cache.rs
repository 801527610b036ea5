use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio::time::Instant;

use recscope_api::{SerdeContext, SerdeError};

/// How long resolved entries live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Lifetime of successful entries. `None` keeps them until the cache is dropped.
    pub ttl: Option<Duration>,
    /// Lifetime of cached failures. `None` means failures are never cached:
    /// the entry is evicted so the next caller retries.
    pub error_ttl: Option<Duration>,
}

impl CachePolicy {
    /// Successes live forever, failures are retried.
    pub fn immutable() -> Self {
        Self { ttl: None, error_ttl: None }
    }

    pub fn expiring(ttl: Duration, error_ttl: Duration) -> Self {
        Self { ttl: Some(ttl), error_ttl: Some(error_ttl) }
    }
}

struct Resolved<V> {
    result: Result<V, SerdeError>,
    at: Instant,
}

type Slot<V> = Arc<OnceCell<Resolved<V>>>;

/// Keyed cache that collapses concurrent misses for the same key into one
/// upstream fetch.
///
/// The first caller for a key runs `fetch`; everyone else arriving before it
/// finishes waits on the same slot. A waiter whose context is cancelled
/// stops waiting without disturbing the others.
pub struct SingleFlightCache<K, V> {
    entries: Mutex<HashMap<K, Slot<V>>>,
    policy: CachePolicy,
}

impl<K, V> SingleFlightCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Slot<V>>> {
        match self.entries.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("single-flight cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn is_stale(&self, slot: &Slot<V>) -> bool {
        // Still in flight: join it.
        let Some(resolved) = slot.get() else {
            return false;
        };
        let ttl = match resolved.result {
            Ok(_) => self.policy.ttl,
            Err(_) => match self.policy.error_ttl {
                Some(t) => Some(t),
                None => return true,
            },
        };
        ttl.is_some_and(|t| resolved.at.elapsed() >= t)
    }

    /// Return the cached value for `key`, fetching it at most once across
    /// concurrent callers.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        ctx: &SerdeContext,
        key: K,
        fetch: F,
    ) -> Result<V, SerdeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, SerdeError>>,
    {
        let slot = {
            let mut entries = self.lock();
            match entries.get(&key) {
                Some(slot) if !self.is_stale(slot) => slot.clone(),
                _ => {
                    let slot: Slot<V> = Arc::new(OnceCell::new());
                    entries.insert(key.clone(), slot.clone());
                    slot
                }
            }
        };

        let waiting = &slot;
        let result = ctx
            .run(async move {
                let resolved = waiting
                    .get_or_init(move || async move {
                        Resolved {
                            result: fetch().await,
                            at: Instant::now(),
                        }
                    })
                    .await;
                Ok(resolved.result.clone())
            })
            .await?;

        if result.is_err() && self.policy.error_ttl.is_none() {
            let mut entries = self.lock();
            if entries.get(&key).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
                entries.remove(&key);
            }
        }
        result
    }

    /// Cached successful value, if present and fresh.
    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.lock();
        let slot = entries.get(key)?;
        if self.is_stale(slot) {
            return None;
        }
        slot.get().and_then(|r| r.result.as_ref().ok().cloned())
    }

    pub fn invalidate(&self, key: &K) {
        self.lock().remove(key);
    }

    /// Drop entries whose TTL has passed.
    pub fn purge_expired(&self) {
        let mut entries = self.lock();
        let stale: Vec<K> = entries
            .iter()
            .filter(|(_, slot)| self.is_stale(slot))
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
