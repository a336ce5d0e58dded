// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package sources feeding the dynamic repository.

A source produces the bag of packages to publish plus the timestamp the
bag reflects, and serves the raw `.deb` bytes the pool hands out. The
dynamic repo decides *when* to ask; sources only answer.
*/

use {
    crate::{error::Result, packages::PackageList},
    async_trait::async_trait,
    chrono::{DateTime, Utc},
};

mod github;
mod local;

pub use {
    github::{GitHubConfig, GitHubReleasesSource, GitHubRepoConfig},
    local::{LocalConfig, LocalSource},
};

/// Provides package data for a dynamic repository.
#[async_trait]
pub trait PackageSource: Send + Sync {
    /// Produce the current package list and the time it reflects.
    async fn packages(&self) -> Result<(PackageList, DateTime<Utc>)>;

    /// Serve raw `.deb` bytes for a pool filename.
    ///
    /// Empty bytes mean the file is unknown; the wire layer surfaces that
    /// as 404.
    async fn deb(&self, filename: &str) -> Result<Vec<u8>>;
}
