// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Memoize another repo's outputs in a [Storage].

Each operation derives a key from its parameters in a fixed namespace.
On a miss the inner repo is consulted and a non-empty result stored;
empty results and errors are never cached, so absence and failure stay
re-checkable.

`releases`, `packages`, and `by-hash` share one logical snapshot, so
their TTLs are deliberately aligned: expiring one while the others
persist opens a window where a fresh `InRelease` references by-hash
objects a client cannot fetch. `pool` is immutable by Debian convention
and `by-hash` immutable by construction, so neither needs invalidation.
*/

use {
    super::Repo,
    crate::{
        error::Result,
        io::Compression,
        storage::{Namespace, Storage},
    },
    async_trait::async_trait,
    std::{sync::Arc, time::Duration},
    tracing::info,
};

/// Shared TTL for the snapshot-coupled namespaces.
const SNAPSHOT_TTL: Duration = Duration::from_secs(4 * 60 * 60);

/// Wraps a [Repo] with keyed memoization.
pub struct CacheRepo {
    inner: Arc<dyn Repo>,
    storage: Arc<dyn Storage>,
    releases: Namespace,
    packages: Namespace,
    by_hash: Namespace,
    pool: Namespace,
    translations: Namespace,
}

impl CacheRepo {
    pub fn new(inner: Arc<dyn Repo>, storage: Arc<dyn Storage>) -> Self {
        let releases = Namespace::new("releases");
        let packages = Namespace::new("packages");
        let by_hash = Namespace::new("by-hash");
        let pool = Namespace::new("pool");
        let translations = Namespace::new("translations");

        for namespace in [&releases, &packages, &by_hash] {
            storage.set_namespace_ttl(namespace.clone(), Some(SNAPSHOT_TTL));
        }
        for namespace in [&pool, &translations] {
            storage.set_namespace_ttl(namespace.clone(), None);
        }

        Self {
            inner,
            storage,
            releases,
            packages,
            by_hash,
            pool,
            translations,
        }
    }

    /// The shared hit/store discipline for every operation.
    async fn through<F>(&self, op: &'static str, key: crate::storage::Key, fetch: F) -> Result<Vec<u8>>
    where
        F: std::future::Future<Output = Result<Vec<u8>>> + Send,
    {
        if let Some(value) = self.storage.get(&key) {
            info!(op, key = %key, "cache hit");
            return Ok(value);
        }
        info!(op, key = %key, "cache miss");

        let value = fetch.await?;
        if !value.is_empty() {
            self.storage.put(&key, value.clone());
        }

        Ok(value)
    }
}

#[async_trait]
impl Repo for CacheRepo {
    async fn in_release(&self, dist: &str) -> Result<Vec<u8>> {
        let key = self.releases.key([dist]);
        self.through("InRelease", key, self.inner.in_release(dist)).await
    }

    async fn packages(
        &self,
        dist: &str,
        component: &str,
        architecture: &str,
        compression: Compression,
    ) -> Result<Vec<u8>> {
        let key = self
            .packages
            .key([dist, component, architecture, compression.extension()]);
        self.through(
            "Packages",
            key,
            self.inner.packages(dist, component, architecture, compression),
        )
        .await
    }

    async fn by_hash(
        &self,
        dist: &str,
        component: &str,
        architecture: &str,
        digest: &str,
    ) -> Result<Vec<u8>> {
        let key = self.by_hash.key([dist, component, architecture, digest]);
        self.through(
            "ByHash",
            key,
            self.inner.by_hash(dist, component, architecture, digest),
        )
        .await
    }

    async fn pool(&self, component: &str, package: &str, filename: &str) -> Result<Vec<u8>> {
        let key = self.pool.key([component, package, filename]);
        self.through("Pool", key, self.inner.pool(component, package, filename))
            .await
    }

    async fn translations(
        &self,
        dist: &str,
        component: &str,
        lang: &str,
        compression: Compression,
    ) -> Result<Vec<u8>> {
        let key = self
            .translations
            .key([dist, component, lang, compression.extension()]);
        self.through(
            "Translations",
            key,
            self.inner.translations(dist, component, lang, compression),
        )
        .await
    }

    async fn signing_key(&self) -> Result<Vec<u8>> {
        self.inner.signing_key().await
    }
}
