// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Pass-through to a remote Debian repository. */

use {
    super::Repo,
    crate::{
        error::{DebcacheError, Result},
        io::Compression,
    },
    async_trait::async_trait,
    serde::Deserialize,
    tracing::debug,
    url::Url,
};

const USER_AGENT: &str = "debcache/1.0";

#[derive(Clone, Debug, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the remote repository, e.g.
    /// `https://deb.debian.org/debian`.
    pub url: String,
}

/// A remote repository reached over HTTP.
///
/// Requests map one-to-one onto the standard archive URL shape; no
/// rendering or verification happens here.
pub struct UpstreamRepo {
    base_url: Url,
    client: reqwest::Client,
}

impl UpstreamRepo {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &UpstreamConfig) -> Result<Self> {
        let url = Url::parse(&config.url)?;
        debug!(url = %url, "upstream repo");

        Ok(Self::new(url))
    }

    async fn get(&self, segments: &[&str]) -> Result<Vec<u8>> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);

        let response = self
            .client
            .get(url.clone())
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(DebcacheError::UpstreamStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl Repo for UpstreamRepo {
    async fn in_release(&self, dist: &str) -> Result<Vec<u8>> {
        self.get(&["dists", dist, "InRelease"]).await
    }

    async fn packages(
        &self,
        dist: &str,
        component: &str,
        architecture: &str,
        compression: Compression,
    ) -> Result<Vec<u8>> {
        self.get(&[
            "dists",
            dist,
            component,
            &format!("binary-{}", architecture),
            &format!("Packages{}", compression.extension()),
        ])
        .await
    }

    async fn by_hash(
        &self,
        dist: &str,
        component: &str,
        architecture: &str,
        digest: &str,
    ) -> Result<Vec<u8>> {
        self.get(&[
            "dists",
            dist,
            component,
            &format!("binary-{}", architecture),
            "by-hash",
            "SHA256",
            digest,
        ])
        .await
    }

    async fn pool(&self, component: &str, package: &str, filename: &str) -> Result<Vec<u8>> {
        self.get(&["pool", component, pool_prefix(package), package, filename])
            .await
    }

    async fn translations(
        &self,
        dist: &str,
        component: &str,
        lang: &str,
        compression: Compression,
    ) -> Result<Vec<u8>> {
        self.get(&[
            "dists",
            dist,
            component,
            "i18n",
            &format!("Translation-{}{}", lang, compression.extension()),
        ])
        .await
    }
}

/// Pool directories shard by package name: `lib` packages use a four
/// character prefix, everything else the first character.
pub(crate) fn pool_prefix(package: &str) -> &str {
    if package.starts_with("lib") && package.len() >= 4 {
        &package[..4]
    } else {
        &package[..package.len().min(1)]
    }
}
