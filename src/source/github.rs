// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Serve packages from signed GitHub release assets.

For each configured `owner/repo` the source walks recent releases and
publishes the `.deb` assets of the first release that carries any for the
configured architectures. Assets are verified before they enter the
repository: either each `.deb` directly, or a checksum manifest is
verified and the `.deb` matched against it.

Raw asset bytes are cached under the `github-release-assets` namespace
keyed by a stable identity so repeated renders do not re-download, and so
pool lookups resolve without touching the network.
*/

use {
    super::{local::POOL_PREFIX, PackageSource},
    crate::{
        deb::control_paragraph,
        error::{DebcacheError, Result},
        io::MultiDigester,
        packages::PackageList,
        storage::{FileConfig, FileStorage, LruStorage, Namespace, Storage},
        verify::{AlwaysPass, FulcioIdentity, RekorVerifier, Verifier},
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    regex::Regex,
    serde::Deserialize,
    sha2::{Digest, Sha256, Sha512},
    std::{
        collections::{HashMap, HashSet},
        sync::Arc,
    },
    tracing::{debug, info, warn},
    url::Url,
};

const DEFAULT_API_URL: &str = "https://api.github.com/";
const USER_AGENT: &str = "debcache/1.0";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct GitHubConfig {
    /// API token, either literal or `env.<VAR>` indirection.
    #[serde(default)]
    pub token: Option<String>,

    /// GitHub repositories to publish, keyed by `owner/name`.
    #[serde(default)]
    pub repositories: HashMap<String, GitHubRepoConfig>,

    /// Debian architectures of interest. Defaults to `amd64`.
    #[serde(default)]
    pub architectures: Vec<String>,

    /// Backing store for downloaded assets.
    #[serde(default)]
    pub cache: Option<FileConfig>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct GitHubRepoConfig {
    /// Identity a transparency log entry must carry. Verification is
    /// disabled when absent.
    #[serde(default, rename = "rekor-signer")]
    pub signer: Option<FulcioIdentity>,

    /// Checksum manifest asset name, templated with `{{VERSION}}` /
    /// `{{VERSION_WITHOUT_V}}` against the release tag.
    #[serde(default, rename = "checksums")]
    pub checksum_file: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

#[derive(Clone, Debug, Deserialize)]
struct ReleaseAsset {
    id: i64,
    name: String,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

struct ReleaseRepo {
    checksum_file: Option<String>,
    verifier: Arc<dyn Verifier>,
}

/// Which digest a checksum manifest speaks, decided by digest length.
#[derive(Clone, Copy)]
enum ManifestDigest {
    Sha256,
    Sha512,
}

impl ManifestDigest {
    fn hex(&self, data: &[u8]) -> String {
        match self {
            Self::Sha256 => hex::encode(Sha256::digest(data)),
            Self::Sha512 => hex::encode(Sha512::digest(data)),
        }
    }
}

pub struct GitHubReleasesSource {
    client: reqwest::Client,
    api_base: Url,
    token: Option<String>,
    cache: Arc<dyn Storage>,
    architectures: HashSet<String>,
    repos: HashMap<String, ReleaseRepo>,
    assets_namespace: Namespace,
    manifest_line: Regex,
}

impl GitHubReleasesSource {
    pub async fn new(config: GitHubConfig) -> Result<Self> {
        Self::with_api_base(config, Url::parse(DEFAULT_API_URL)?).await
    }

    pub async fn with_api_base(config: GitHubConfig, api_base: Url) -> Result<Self> {
        let token = config.token.as_deref().map(|token| {
            match token.strip_prefix("env.") {
                Some(var) => std::env::var(var).unwrap_or_default(),
                None => token.to_string(),
            }
        });

        let mut architectures = HashSet::new();
        for architecture in &config.architectures {
            architectures.insert(architecture.clone());

            // Some projects (aquasec/trivy) name assets by platform
            // rather than Debian architecture.
            match architecture.as_str() {
                "amd64" => {
                    architectures.insert("Linux-64bit".to_string());
                }
                "arm64" => {
                    architectures.insert("Linux-ARM64".to_string());
                }
                _ => {}
            }
        }
        if architectures.is_empty() {
            architectures.insert("amd64".to_string());
            architectures.insert("Linux-64bit".to_string());
        }

        let cache: Arc<dyn Storage> = match &config.cache {
            Some(file) => {
                debug!(path = %file.path.display(), "github asset cache set up");
                Arc::new(FileStorage::new(file.clone()))
            }
            None => {
                warn!("github asset cache is in-memory, don't use this in production");
                Arc::new(LruStorage::default())
            }
        };

        let mut repos = HashMap::new();
        for (name, repo_config) in &config.repositories {
            let verifier: Arc<dyn Verifier> = match &repo_config.signer {
                Some(identity) => {
                    debug!(github_repository = %name, "using rekor verifier");
                    Arc::new(RekorVerifier::new(identity).await?)
                }
                None => {
                    debug!(github_repository = %name, "verification disabled");
                    Arc::new(AlwaysPass)
                }
            };

            repos.insert(
                name.clone(),
                ReleaseRepo {
                    checksum_file: repo_config.checksum_file.clone(),
                    verifier,
                },
            );
        }

        debug!(repo_count = repos.len(), ?architectures, "github releases source");

        Ok(Self {
            client: reqwest::Client::new(),
            api_base,
            token,
            cache,
            architectures,
            repos,
            assets_namespace: Namespace::new("github-release-assets"),
            manifest_line: Regex::new(r"^([a-f0-9]+)\s+(\S+)$").expect("static regex"),
        })
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, url).header("User-Agent", USER_AGENT);
        if let Some(token) = &self.token {
            if !token.is_empty() {
                builder = builder.header("Authorization", format!("Bearer {}", token));
            }
        }
        builder
    }

    async fn list_releases(&self, owner: &str, repo: &str) -> Result<Vec<Release>> {
        let url = self
            .api_base
            .join(&format!("repos/{}/{}/releases?per_page=5", owner, repo))?;

        let response = self
            .request(reqwest::Method::GET, url.clone())
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DebcacheError::UpstreamStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(response.json().await?)
    }

    /// Stable identity an asset's bytes are cached and served under.
    fn asset_file_name(owner: &str, repo: &str, asset_id: i64) -> String {
        format!("{}_{}_{}.deb", owner, repo, asset_id)
    }

    /// Fetch an asset's bytes, consulting the asset cache first.
    async fn asset_bytes(&self, owner: &str, repo: &str, asset_id: i64) -> Result<Vec<u8>> {
        let key = self
            .assets_namespace
            .key([Self::asset_file_name(owner, repo, asset_id)]);
        if let Some(data) = self.cache.get(&key) {
            return Ok(data);
        }

        let url = self
            .api_base
            .join(&format!("repos/{}/{}/releases/assets/{}", owner, repo, asset_id))?;

        let response = self
            .request(reqwest::Method::GET, url.clone())
            .header("Accept", "application/octet-stream")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DebcacheError::UpstreamStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let data = response.bytes().await?.to_vec();
        debug!(
            repo_owner = owner,
            repo_name = repo,
            asset_id,
            bytes = data.len(),
            "fetched asset"
        );

        self.cache.put(&key, data.clone());
        Ok(data)
    }

    /// Download and verify a release's checksum manifest, if configured.
    ///
    /// Returns the filename to hex digest map and the digest flavor the
    /// manifest speaks.
    async fn checksums(
        &self,
        owner: &str,
        repo: &str,
        repo_config: &ReleaseRepo,
        release: &Release,
    ) -> Result<Option<(HashMap<String, String>, ManifestDigest)>> {
        let Some(template) = &repo_config.checksum_file else {
            return Ok(None);
        };

        let manifest_name = template
            .replace("{{VERSION}}", &release.tag_name)
            .replace(
                "{{VERSION_WITHOUT_V}}",
                release.tag_name.strip_prefix('v').unwrap_or(&release.tag_name),
            );
        debug!(filename = %manifest_name, "looking for checksum manifest");

        for asset in &release.assets {
            if asset.name != manifest_name {
                continue;
            }

            let data = self.asset_bytes(owner, repo, asset.id).await?;
            if !repo_config
                .verifier
                .verify(&release.tag_name, &data)
                .await?
            {
                warn!(filename = %manifest_name, "checksum manifest failed verification");
                continue;
            }
            debug!("checksum manifest passed signature verification");

            let mut entries = HashMap::new();
            let mut digest_len = 0usize;
            for line in String::from_utf8_lossy(&data).lines() {
                let Some(captures) = self.manifest_line.captures(line.trim_end()) else {
                    continue;
                };

                let digest = captures[1].to_string();
                if digest_len == 0 {
                    digest_len = digest.len();
                } else if digest.len() != digest_len {
                    return Err(DebcacheError::ChecksumDigestLength(digest.len()));
                }
                entries.insert(captures[2].to_string(), digest);
            }

            let flavor = match digest_len {
                64 => ManifestDigest::Sha256,
                128 => ManifestDigest::Sha512,
                other => return Err(DebcacheError::ChecksumDigestLength(other)),
            };

            return Ok(Some((entries, flavor)));
        }

        Err(DebcacheError::ChecksumManifestNotFound(manifest_name))
    }

    /// The architecture hint encoded in an asset filename:
    /// `name_<arch>.deb`.
    fn asset_architecture(name: &str) -> Option<&str> {
        let stem = name.strip_suffix(".deb")?;
        Some(match stem.rfind('_') {
            Some(i) => &stem[i + 1..],
            None => stem,
        })
    }
}

#[async_trait]
impl PackageSource for GitHubReleasesSource {
    async fn packages(&self) -> Result<(PackageList, DateTime<Utc>)> {
        let mut list = PackageList::default();
        let mut latest = DateTime::<Utc>::MIN_UTC;

        for (name, repo_config) in &self.repos {
            let (owner, repo) = name
                .split_once('/')
                .ok_or_else(|| DebcacheError::GitHubRepoName(name.clone()))?;

            debug!(repo_owner = owner, repo_name = repo, "listing releases");
            let releases = self.list_releases(owner, repo).await?;

            for release in &releases {
                debug!(
                    tag = %release.tag_name,
                    asset_count = release.assets.len(),
                    "inspecting release"
                );
                if release.draft || release.prerelease {
                    continue;
                }

                let checksums = self.checksums(owner, repo, repo_config, release).await?;

                let mut has_deb = false;
                for asset in &release.assets {
                    let Some(architecture) = Self::asset_architecture(&asset.name) else {
                        continue;
                    };
                    if !self.architectures.contains(architecture) {
                        debug!(fn_ = %asset.name, "release has other arch deb");
                        continue;
                    }
                    debug!(fn_ = %asset.name, "release has deb asset");

                    let data = self.asset_bytes(owner, repo, asset.id).await?;
                    debug!(fn_ = %asset.name, bytes = data.len(), "asset download complete");

                    match &checksums {
                        None => {
                            if !repo_config
                                .verifier
                                .verify(&release.tag_name, &data)
                                .await?
                            {
                                warn!(fn_ = %asset.name, "deb failed verification");
                                continue;
                            }
                            debug!(fn_ = %asset.name, "deb passed signature verification");
                        }
                        Some((entries, flavor)) => {
                            let expected = entries.get(&asset.name).ok_or_else(|| {
                                DebcacheError::ChecksumEntryMissing(asset.name.clone())
                            })?;

                            let actual = flavor.hex(&data);
                            if actual != *expected {
                                return Err(DebcacheError::ChecksumMismatch {
                                    filename: asset.name.clone(),
                                    expected: expected.clone(),
                                    actual,
                                });
                            }
                            debug!(fn_ = %asset.name, %expected, "checksum verified");
                        }
                    }

                    let Some(mut paragraph) = control_paragraph(&data).await? else {
                        info!(fn_ = %asset.name, "package not found in asset");
                        continue;
                    };

                    let mut digester = MultiDigester::default();
                    digester.update(&data);
                    let (md5, sha256) = digester.finish();

                    paragraph.set_field_from_string(
                        "Filename".into(),
                        format!("{}{}", POOL_PREFIX, Self::asset_file_name(owner, repo, asset.id))
                            .into(),
                    );
                    paragraph.set_field_from_string("Size".into(), data.len().to_string().into());
                    paragraph.set_field_from_string("MD5sum".into(), md5.into());
                    paragraph.set_field_from_string("SHA256".into(), sha256.into());

                    if let Some(updated_at) = asset.updated_at {
                        if updated_at > latest {
                            latest = updated_at;
                        }
                    }

                    let architecture =
                        paragraph.field_str("Architecture").unwrap_or_default().to_string();
                    list.add("main", architecture, paragraph);
                    has_deb = true;
                }

                // First release with a matching .deb wins for this repo.
                if has_deb {
                    break;
                }
            }
        }

        Ok((list, latest))
    }

    async fn deb(&self, filename: &str) -> Result<Vec<u8>> {
        let filename = filename.strip_prefix("main/p/pkg/").unwrap_or(filename);

        let key = self.assets_namespace.key([filename]);
        let cached = self.cache.get(&key);
        debug!(cache_key = %key, hit = cached.is_some(), "github serving deb");

        Ok(cached.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn architecture_from_asset_name() {
        assert_eq!(
            GitHubReleasesSource::asset_architecture("tool_1.2.3_amd64.deb"),
            Some("amd64")
        );
        assert_eq!(
            GitHubReleasesSource::asset_architecture("trivy_0.50.0_Linux-64bit.deb"),
            Some("Linux-64bit")
        );
        assert_eq!(
            GitHubReleasesSource::asset_architecture("underscoreless.deb"),
            Some("underscoreless")
        );
        assert_eq!(
            GitHubReleasesSource::asset_architecture("checksums.txt"),
            None
        );
    }

    #[test]
    fn asset_file_names_are_stable() {
        assert_eq!(
            GitHubReleasesSource::asset_file_name("owner", "repo", 42),
            "owner_repo_42.deb"
        );
    }

    #[tokio::test]
    async fn deb_serves_from_cache_only() -> Result<()> {
        let source = GitHubReleasesSource::new(GitHubConfig::default()).await?;

        assert!(source.deb("owner_repo_1.deb").await?.is_empty());

        let key = source.assets_namespace.key(["owner_repo_1.deb"]);
        source.cache.put(&key, b"deb bytes".to_vec());

        assert_eq!(source.deb("owner_repo_1.deb").await?, b"deb bytes");
        assert_eq!(source.deb("main/p/pkg/owner_repo_1.deb").await?, b"deb bytes");

        Ok(())
    }

    #[test]
    fn manifest_lines_parse() {
        let re = Regex::new(r"^([a-f0-9]+)\s+(\S+)$").unwrap();

        let captures = re
            .captures("0123456789abcdef  tool_1.0.0_amd64.deb")
            .unwrap();
        assert_eq!(&captures[1], "0123456789abcdef");
        assert_eq!(&captures[2], "tool_1.0.0_amd64.deb");

        assert!(re.captures("# comment line").is_none());
    }
}
