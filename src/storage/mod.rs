// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Blob storage backing the cache layers.

Cached blobs are addressed by [Key]s of the shape
`<namespace>:::<segment>( <segment>)*`. The namespace selects retention
policy (TTL, eviction) while the segments identify the blob within it.
*/

use std::{fmt, time::Duration};

mod file;
mod lru;

pub use {
    file::{FileConfig, FileStorage},
    lru::{LruConfig, LruStorage},
};

/// A cache namespace.
///
/// Namespaces scope retention: TTLs are configured per namespace and the
/// in-memory store maintains one LRU per namespace.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(name: impl ToString) -> Self {
        Self(name.to_string())
    }

    /// Derive a [Key] in this namespace from path segments.
    pub fn key<S: AsRef<str>>(&self, segments: impl IntoIterator<Item = S>) -> Key {
        let joined = segments
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(" ");

        Key(format!("{}:::{}", self.0, joined))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fully qualified cache key.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Key(String);

impl Key {
    /// Extract the namespace prefix of this key.
    ///
    /// Keys without a `:::` separator belong to the anonymous (empty)
    /// namespace.
    pub fn namespace(&self) -> Namespace {
        match self.0.split_once(":::") {
            Some((ns, _)) => Namespace::new(ns),
            None => Namespace::new(""),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shared contract for blob stores.
///
/// Implementations are internally synchronized: the request path calls
/// them concurrently. Lookup failures of any kind are misses, never
/// errors; a failing store must not break request serving.
pub trait Storage: Send + Sync {
    /// Fetch a blob. Expired or absent entries return [None].
    fn get(&self, key: &Key) -> Option<Vec<u8>>;

    /// Store a blob under a key.
    fn put(&self, key: &Key, value: Vec<u8>);

    /// Configure the retention for a namespace.
    ///
    /// [None] disables expiry for the namespace.
    fn set_namespace_ttl(&self, namespace: Namespace, ttl: Option<Duration>);
}
