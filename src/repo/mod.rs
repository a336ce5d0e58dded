// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Repository variants behind one serving interface.

Every configured archive name resolves to a [Repo]: an upstream
pass-through, a dynamically rendered repository, or a cache overlay
wrapping either. The wire layer only ever talks to this trait.

Absence is expressed as empty bytes rather than an error: Debian clients
treat 404 as "variant not published", and the overlay must be able to
distinguish "absent" (not cached) from transient failure (also not
cached, but propagated).
*/

use {crate::error::Result, crate::io::Compression, async_trait::async_trait};

mod cache;
mod dynamic;
mod upstream;

pub use {
    cache::CacheRepo,
    dynamic::DynamicRepo,
    upstream::{UpstreamConfig, UpstreamRepo},
};

/// A source of Debian repository artifacts.
#[async_trait]
pub trait Repo: Send + Sync {
    /// The signed description of a distribution and its contents.
    async fn in_release(&self, dist: &str) -> Result<Vec<u8>>;

    /// A `Packages` index in the requested compression.
    async fn packages(
        &self,
        dist: &str,
        component: &str,
        architecture: &str,
        compression: Compression,
    ) -> Result<Vec<u8>>;

    /// Content-addressed index retrieval by hex SHA-256.
    async fn by_hash(
        &self,
        dist: &str,
        component: &str,
        architecture: &str,
        digest: &str,
    ) -> Result<Vec<u8>>;

    /// A package blob from the pool.
    async fn pool(&self, component: &str, package: &str, filename: &str) -> Result<Vec<u8>>;

    /// A `Translation-<lang>` index. Most variants publish none.
    async fn translations(
        &self,
        _dist: &str,
        _component: &str,
        _lang: &str,
        _compression: Compression,
    ) -> Result<Vec<u8>> {
        Ok(vec![])
    }

    /// Armored public signing key, for variants that sign their output.
    async fn signing_key(&self) -> Result<Vec<u8>> {
        Ok(vec![])
    }
}
