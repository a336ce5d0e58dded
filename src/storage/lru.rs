// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! In-memory LRU storage. */

use {
    super::{Key, Namespace, Storage},
    lru::LruCache,
    serde::Deserialize,
    std::{
        collections::HashMap,
        num::NonZeroUsize,
        sync::Mutex,
        time::{Duration, Instant},
    },
};

const DEFAULT_SIZE: usize = 128;
const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LruConfig {
    /// Entry capacity of each namespace's LRU.
    #[serde(default)]
    pub size: Option<usize>,

    /// Default per-entry time to live, in seconds.
    #[serde(default)]
    pub ttl: Option<u64>,
}

struct Entry {
    expires_at: Option<Instant>,
    data: Vec<u8>,
}

struct NamespaceLru {
    ttl: Option<Duration>,
    entries: LruCache<Key, Entry>,
}

impl NamespaceLru {
    fn new(size: NonZeroUsize, ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            entries: LruCache::new(size),
        }
    }
}

/// Thread-safe in-memory store: one bounded LRU per namespace, each entry
/// carrying its own expiry deadline.
pub struct LruStorage {
    size: NonZeroUsize,
    default_ttl: Option<Duration>,
    namespaces: Mutex<HashMap<Namespace, NamespaceLru>>,
}

impl LruStorage {
    pub fn new(config: LruConfig) -> Self {
        let size = NonZeroUsize::new(config.size.unwrap_or(DEFAULT_SIZE))
            .unwrap_or(NonZeroUsize::MIN);
        let default_ttl = match config.ttl {
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(DEFAULT_TTL),
        };

        Self {
            size,
            default_ttl,
            namespaces: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for LruStorage {
    fn default() -> Self {
        Self::new(LruConfig::default())
    }
}

impl Storage for LruStorage {
    fn get(&self, key: &Key) -> Option<Vec<u8>> {
        let mut namespaces = self.namespaces.lock().expect("lru lock poisoned");
        let lru = namespaces.get_mut(&key.namespace())?;

        let expired = match lru.entries.get(key) {
            Some(entry) => match entry.expires_at {
                Some(deadline) => Instant::now() >= deadline,
                None => false,
            },
            None => return None,
        };

        if expired {
            lru.entries.pop(key);
            return None;
        }

        lru.entries.get(key).map(|entry| entry.data.clone())
    }

    fn put(&self, key: &Key, value: Vec<u8>) {
        let mut namespaces = self.namespaces.lock().expect("lru lock poisoned");

        let namespace = key.namespace();
        let lru = namespaces
            .entry(namespace)
            .or_insert_with(|| NamespaceLru::new(self.size, self.default_ttl));

        let entry = Entry {
            expires_at: lru.ttl.map(|ttl| Instant::now() + ttl),
            data: value,
        };
        lru.entries.put(key.clone(), entry);
    }

    fn set_namespace_ttl(&self, namespace: Namespace, ttl: Option<Duration>) {
        let mut namespaces = self.namespaces.lock().expect("lru lock poisoned");

        // Replaces the namespace's LRU wholesale; entries cached under the
        // previous policy are discarded.
        namespaces.insert(namespace, NamespaceLru::new(self.size, ttl));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Key {
        Key(s.to_string())
    }

    #[test]
    fn eviction_drops_oldest_entries() {
        let lru = LruStorage::new(LruConfig {
            size: Some(5),
            ttl: None,
        });

        for i in 0..10 {
            lru.put(&key(&i.to_string()), b"testValue".to_vec());
        }

        for i in 0..5 {
            assert_eq!(lru.get(&key(&i.to_string())), None, "key {} should miss", i);
        }
        for i in 5..10 {
            assert_eq!(
                lru.get(&key(&i.to_string())),
                Some(b"testValue".to_vec()),
                "key {} should hit",
                i
            );
        }
    }

    #[test]
    fn entries_expire_after_ttl() {
        let lru = LruStorage::default();
        let ns = Namespace::new("fast");
        lru.set_namespace_ttl(ns.clone(), Some(Duration::from_millis(10)));

        let k = ns.key(["testKey"]);
        lru.put(&k, b"testValue".to_vec());
        assert_eq!(lru.get(&k), Some(b"testValue".to_vec()));

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(lru.get(&k), None);
    }

    #[test]
    fn namespace_ttls_are_independent() {
        let lru = LruStorage::default();
        let fast = Namespace::new("fast");
        let slow = Namespace::new("slow");
        lru.set_namespace_ttl(fast.clone(), Some(Duration::from_millis(10)));
        lru.set_namespace_ttl(slow.clone(), Some(Duration::from_secs(60)));

        lru.put(&fast.key(["foo"]), b"testValue".to_vec());
        lru.put(&slow.key(["foo"]), b"testValue".to_vec());

        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(lru.get(&fast.key(["foo"])), None);
        assert_eq!(lru.get(&slow.key(["foo"])), Some(b"testValue".to_vec()));
    }

    #[test]
    fn setting_ttl_discards_previous_entries() {
        let lru = LruStorage::default();
        let ns = Namespace::new("releases");

        lru.put(&ns.key(["bookworm"]), b"old".to_vec());
        lru.set_namespace_ttl(ns.clone(), Some(Duration::from_secs(60)));

        assert_eq!(lru.get(&ns.key(["bookworm"])), None);
    }
}
