use super::Cache;
use crate::core::{PersistError, Result};
use async_trait::async_trait;
use lru::LruCache;
use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

struct Store {
    values: LruCache<String, Entry>,
    /// Index sets are never evicted, so an index outlives the keys it lists.
    sets: HashMap<String, BTreeSet<String>>,
}

impl Store {
    /// Live value for `key`, dropping it first when expired.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        if self.values.peek(key).is_some_and(Entry::is_expired) {
            self.values.pop(key);
            return None;
        }
        self.values.get_mut(key)
    }
}

/// In-process cache with LRU eviction and per-key expiry for values.
pub struct MemoryCache {
    store: Mutex<Store>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            store: Mutex::new(Store {
                values: LruCache::new(capacity),
                sets: HashMap::new(),
            }),
        }
    }

    /// Values and sets currently held.
    pub fn len(&self) -> usize {
        self.store
            .lock()
            .map(|store| store.values.len() + store.sets.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_store<T>(&self, f: impl FnOnce(&mut Store) -> Result<T>) -> Result<T> {
        let mut store = self
            .store
            .lock()
            .map_err(|_| PersistError::Cache("memory cache lock poisoned".into()))?;
        f(&mut store)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

fn wrong_type(key: &str) -> PersistError {
    PersistError::Cache(format!(
        "WRONGTYPE operation against key '{}' holding the wrong kind of value",
        key
    ))
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_store(|store| {
            if store.sets.contains_key(key) {
                return Err(wrong_type(key));
            }
            Ok(store.live(key).map(|entry| entry.value.clone()))
        })
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.with_store(|store| {
            store.sets.remove(key);
            store.values.put(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: ttl.map(|ttl| Instant::now() + ttl),
                },
            );
            Ok(())
        })
    }

    async fn del(&self, keys: &[String]) -> Result<()> {
        self.with_store(|store| {
            for key in keys {
                store.values.pop(key.as_str());
                store.sets.remove(key.as_str());
            }
            Ok(())
        })
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        self.with_store(|store| {
            if store.live(key).is_some() {
                return Err(wrong_type(key));
            }
            store
                .sets
                .entry(key.to_string())
                .or_default()
                .insert(member.to_string());
            Ok(())
        })
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        self.with_store(|store| {
            if store.live(key).is_some() {
                return Err(wrong_type(key));
            }
            if let Some(members) = store.sets.get_mut(key) {
                members.remove(member);
                if members.is_empty() {
                    store.sets.remove(key);
                }
            }
            Ok(())
        })
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.with_store(|store| {
            if store.live(key).is_some() {
                return Err(wrong_type(key));
            }
            Ok(store
                .sets
                .get(key)
                .map(|members| members.iter().cloned().collect())
                .unwrap_or_default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_del() {
        let cache = MemoryCache::default();
        cache.set("category:1", "{}", None).await.unwrap();
        assert_eq!(cache.get("category:1").await.unwrap(), Some("{}".to_string()));

        cache.del(&["category:1".to_string()]).await.unwrap();
        assert_eq!(cache.get("category:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = MemoryCache::default();
        cache
            .set("k", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(cache.get("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_sets() {
        let cache = MemoryCache::default();
        cache.sadd("categories", "b").await.unwrap();
        cache.sadd("categories", "a").await.unwrap();
        cache.sadd("categories", "a").await.unwrap();
        assert_eq!(cache.smembers("categories").await.unwrap(), vec!["a", "b"]);

        cache.srem("categories", "a").await.unwrap();
        cache.srem("categories", "b").await.unwrap();
        assert!(cache.smembers("categories").await.unwrap().is_empty());
        assert!(cache.is_empty());

        cache.set("text", "v", None).await.unwrap();
        assert!(cache.sadd("text", "x").await.is_err());
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = MemoryCache::new(2);
        cache.set("a", "1", None).await.unwrap();
        cache.set("b", "2", None).await.unwrap();
        cache.get("a").await.unwrap();
        cache.set("c", "3", None).await.unwrap();

        assert!(cache.get("a").await.unwrap().is_some());
        assert!(cache.get("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_index_sets_survive_eviction() {
        let grant = "user:permission:user:7:posts:create".to_string();
        let cache = MemoryCache::new(2);
        cache.set(&grant, "true", None).await.unwrap();
        cache.sadd("user:permissions:7", &grant).await.unwrap();
        cache.set("category:1", "{}", None).await.unwrap();
        cache.get(&grant).await.unwrap();
        cache.set("category:2", "{}", None).await.unwrap();

        assert!(cache.get("category:1").await.unwrap().is_none());
        let mut keys = cache.smembers("user:permissions:7").await.unwrap();
        assert_eq!(keys, vec![grant.clone()]);

        keys.push("user:permissions:7".to_string());
        cache.del(&keys).await.unwrap();
        assert!(cache.get(&grant).await.unwrap().is_none());
    }
}
