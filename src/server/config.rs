// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! YAML configuration and repo construction. */

use {
    crate::{
        error::{DebcacheError, Result},
        repo::{CacheRepo, DynamicRepo, Repo, UpstreamConfig, UpstreamRepo},
        signer::{Signer, SigningConfig},
        source::{GitHubConfig, GitHubReleasesSource, LocalConfig, LocalSource, PackageSource},
        storage::{FileConfig, FileStorage, LruConfig, LruStorage},
    },
    futures::future::BoxFuture,
    serde::Deserialize,
    std::{collections::HashMap, sync::Arc},
    tracing::{debug, info},
};

const CONFIG_ENV: &str = "DEBCACHE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "debcache.yml";
const DEFAULT_ADDR: &str = ":8080";
const DEFAULT_UPSTREAM: &str = "https://deb.debian.org/debian";

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Listen address. A bare `:port` binds all interfaces.
    #[serde(default)]
    pub addr: Option<String>,

    /// Served repositories, keyed by URL name.
    #[serde(default)]
    pub repos: HashMap<String, RepoConfig>,
}

/// One repository definition: a `type` tag plus type-specific fields.
#[derive(Clone, Debug, Deserialize)]
pub struct RepoConfig {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(flatten)]
    pub config: serde_yaml::Mapping,
}

#[derive(Debug, Deserialize)]
struct DynamicConfig {
    #[serde(default, rename = "signingKey")]
    signing_key: Option<String>,
    #[serde(default, rename = "signingKeyPath")]
    signing_key_path: Option<String>,

    #[serde(default)]
    files: Option<LocalConfig>,
    #[serde(default)]
    github: Option<GitHubConfig>,
}

#[derive(Debug, Deserialize)]
struct FileCacheConfig {
    #[serde(flatten)]
    storage: FileConfig,
    source: RepoConfig,
}

#[derive(Debug, Deserialize)]
struct MemoryCacheConfig {
    #[serde(flatten)]
    storage: LruConfig,
    source: RepoConfig,
}

impl Config {
    /// Load configuration from disk.
    ///
    /// `DEBCACHE_CONFIG` overrides the default path. A missing file is
    /// not an error: the server falls back to proxying the Debian
    /// mirror network.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let mut config = match std::fs::read_to_string(&path) {
            Ok(text) => serde_yaml::from_str::<Config>(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no config file found, using defaults");
                Config {
                    addr: None,
                    repos: HashMap::new(),
                }
            }
            Err(e) => return Err(e.into()),
        };

        if config.repos.is_empty() {
            config.repos.insert(
                "debian".to_string(),
                RepoConfig {
                    kind: "upstream".to_string(),
                    config: serde_yaml::from_str(&format!("url: {}", DEFAULT_UPSTREAM))?,
                },
            );
        }

        Ok(config)
    }

    /// The address to bind, normalized to `host:port`.
    pub fn listen_addr(&self) -> String {
        let addr = self.addr.as_deref().unwrap_or(DEFAULT_ADDR);
        if let Some(port) = addr.strip_prefix(':') {
            format!("0.0.0.0:{}", port)
        } else {
            addr.to_string()
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(mapping: &serde_yaml::Mapping) -> Result<T> {
    Ok(serde_yaml::from_value(serde_yaml::Value::Mapping(
        mapping.clone(),
    ))?)
}

/// Build the [Repo] a [RepoConfig] describes.
///
/// Cache variants nest a `source` repo config, so construction recurses.
pub fn build_repo(name: String, config: RepoConfig) -> BoxFuture<'static, Result<Arc<dyn Repo>>> {
    Box::pin(async move {
        debug!(repo = %name, r#type = %config.kind, "building repo");

        match config.kind.as_str() {
            "dynamic" => {
                let dynamic: DynamicConfig = decode(&config.config)?;

                let signer = Signer::from_config(&SigningConfig {
                    signing_key: dynamic.signing_key,
                    signing_key_path: dynamic.signing_key_path,
                })?;

                let source: Arc<dyn PackageSource> = if let Some(files) = dynamic.files {
                    Arc::new(LocalSource::new(files))
                } else if let Some(github) = dynamic.github {
                    Arc::new(GitHubReleasesSource::new(github).await?)
                } else {
                    return Err(DebcacheError::NoSourceConfigured);
                };

                Ok(Arc::new(DynamicRepo::new(signer, source)) as Arc<dyn Repo>)
            }

            "upstream" => {
                let upstream: UpstreamConfig = decode(&config.config)?;
                Ok(Arc::new(UpstreamRepo::from_config(&upstream)?) as Arc<dyn Repo>)
            }

            "file-cache" => {
                let cache: FileCacheConfig = decode(&config.config)?;
                let inner = build_repo(format!("file-cache.{}", name), cache.source).await?;

                Ok(Arc::new(CacheRepo::new(
                    inner,
                    Arc::new(FileStorage::new(cache.storage)),
                )) as Arc<dyn Repo>)
            }

            "memory-cache" => {
                let cache: MemoryCacheConfig = decode(&config.config)?;
                let inner = build_repo(format!("memory-cache.{}", name), cache.source).await?;

                Ok(Arc::new(CacheRepo::new(
                    inner,
                    Arc::new(LruStorage::new(cache.storage)),
                )) as Arc<dyn Repo>)
            }

            other => Err(DebcacheError::UnknownRepoType(other.to_string())),
        }
    })
}
