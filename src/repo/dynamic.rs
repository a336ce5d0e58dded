// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! A repository rendered on demand from a [PackageSource].

The repo owns a single snapshot slot. Requests share it: a render happens
only when the slot is stale, only one task renders at a time, and readers
observe either the old snapshot or the new one, never a mix. Rendering
holds the writer half of the lock for its whole duration: a snapshot
must be internally consistent, so the lock cannot be released mid-render.
*/

use {
    super::Repo,
    crate::{
        error::Result,
        io::{compress, Compression},
        renderer::{render, RenderedSnapshot},
        signer::Signer,
        source::PackageSource,
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    std::{sync::Arc, time::Duration},
    tokio::sync::RwLock,
    tracing::debug,
};

/// How long a rendered snapshot serves before the source is re-consulted.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(5 * 60);

#[derive(Default)]
struct RenderState {
    render_time: Option<DateTime<Utc>>,
    snapshot: Option<Arc<RenderedSnapshot>>,
}

/// A repository dynamically generated from a [PackageSource].
pub struct DynamicRepo {
    signer: Signer,
    source: Arc<dyn PackageSource>,
    max_age: chrono::Duration,
    state: RwLock<RenderState>,
}

impl DynamicRepo {
    pub fn new(signer: Signer, source: Arc<dyn PackageSource>) -> Self {
        Self::with_max_age(signer, source, DEFAULT_MAX_AGE)
    }

    pub fn with_max_age(
        signer: Signer,
        source: Arc<dyn PackageSource>,
        max_age: Duration,
    ) -> Self {
        Self {
            signer,
            source,
            max_age: chrono::Duration::from_std(max_age)
                .expect("max_age fits a chrono duration"),
            state: RwLock::new(RenderState::default()),
        }
    }

    /// Make sure the snapshot slot holds something fresh enough to serve.
    ///
    /// The fast path is a shared-lock age check. The slow path re-checks
    /// under the write lock (another task may have rendered during the
    /// handoff), consults the source, and skips the render when the
    /// source has not advanced past the last render.
    async fn ensure_fresh(&self, dist: &str) -> Result<Arc<RenderedSnapshot>> {
        {
            let state = self.state.read().await;
            if let (Some(render_time), Some(snapshot)) = (state.render_time, &state.snapshot) {
                let age = Utc::now() - render_time;
                if age < self.max_age {
                    debug!(age_secs = age.num_seconds(), "skipping render");
                    return Ok(snapshot.clone());
                }
            }
        }

        let mut state = self.state.write().await;

        if let (Some(render_time), Some(snapshot)) = (state.render_time, &state.snapshot) {
            let age = Utc::now() - render_time;
            if age < self.max_age {
                debug!(age_secs = age.num_seconds(), "skipping render");
                return Ok(snapshot.clone());
            }
        }

        let (packages, source_time) = self.source.packages().await?;

        if let (Some(render_time), Some(snapshot)) = (state.render_time, &state.snapshot) {
            if source_time < render_time {
                debug!(
                    source_time = %source_time,
                    render_time = %render_time,
                    "source has not advanced, skipping render"
                );
                let snapshot = snapshot.clone();
                state.render_time = Some(Utc::now());
                return Ok(snapshot);
            }
        }

        debug!(count = packages.package_count(), "rendering packages");
        let snapshot = Arc::new(render(&packages, source_time, dist, &self.signer).await?);

        state.snapshot = Some(snapshot.clone());
        state.render_time = Some(Utc::now());

        Ok(snapshot)
    }
}

#[async_trait]
impl Repo for DynamicRepo {
    async fn in_release(&self, dist: &str) -> Result<Vec<u8>> {
        let snapshot = self.ensure_fresh(dist).await?;
        Ok(snapshot.in_release().to_vec())
    }

    async fn packages(
        &self,
        dist: &str,
        component: &str,
        architecture: &str,
        compression: Compression,
    ) -> Result<Vec<u8>> {
        let snapshot = self.ensure_fresh(dist).await?;

        match snapshot.packages(component, architecture) {
            Some(raw) => compress(compression, raw).await,
            None => Ok(vec![]),
        }
    }

    async fn by_hash(
        &self,
        dist: &str,
        _component: &str,
        _architecture: &str,
        digest: &str,
    ) -> Result<Vec<u8>> {
        let snapshot = self.ensure_fresh(dist).await?;
        Ok(snapshot.by_hash(digest).map(<[u8]>::to_vec).unwrap_or_default())
    }

    async fn pool(&self, _component: &str, _package: &str, filename: &str) -> Result<Vec<u8>> {
        self.source.deb(filename).await
    }

    async fn signing_key(&self) -> Result<Vec<u8>> {
        self.signer.public_key_armored()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            control::ControlParagraph, io::decompress, packages::PackageList,
            signer::tests::test_signer,
        },
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    struct FakeSource {
        calls: AtomicUsize,
        lists: std::sync::Mutex<Vec<(PackageList, DateTime<Utc>)>>,
        fail: std::sync::atomic::AtomicBool,
    }

    impl FakeSource {
        fn new(lists: Vec<(PackageList, DateTime<Utc>)>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                lists: std::sync::Mutex::new(lists),
                fail: std::sync::atomic::AtomicBool::new(false),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PackageSource for FakeSource {
        async fn packages(&self) -> Result<(PackageList, DateTime<Utc>)> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(crate::error::DebcacheError::NoSourceConfigured);
            }

            // Serve lists in order, repeating the last.
            let mut lists = self.lists.lock().unwrap();
            if lists.len() > 1 {
                Ok(lists.remove(0))
            } else {
                Ok(lists[0].clone())
            }
        }

        async fn deb(&self, _filename: &str) -> Result<Vec<u8>> {
            Ok(b"deb bytes".to_vec())
        }
    }

    fn package(name: &str, architecture: &str) -> ControlParagraph<'static> {
        let mut p = ControlParagraph::default();
        p.set_field_from_string("Package".into(), name.to_string().into());
        p.set_field_from_string("Architecture".into(), architecture.to_string().into());
        p.set_field_from_string("Version".into(), "1.0.0".into());
        p
    }

    fn list_with(name: &str) -> PackageList {
        let mut list = PackageList::default();
        list.add("main", "amd64", package(name, "amd64"));
        list
    }

    #[tokio::test]
    async fn serves_a_coherent_snapshot() -> Result<()> {
        let source = Arc::new(FakeSource::new(vec![(list_with("test"), Utc::now())]));
        let repo = DynamicRepo::new(test_signer(), source);

        let in_release = repo.in_release("bookworm").await?;
        let text = String::from_utf8(in_release).unwrap();
        assert!(text.starts_with("-----BEGIN PGP SIGNED MESSAGE-----\n"));
        assert!(text.contains("Codename: bookworm\n"));

        let raw = repo
            .packages("bookworm", "main", "amd64", Compression::None)
            .await?;
        assert!(String::from_utf8_lossy(&raw).contains("Package: test\n"));

        let gz = repo
            .packages("bookworm", "main", "amd64", Compression::Gzip)
            .await?;
        assert_eq!(decompress(Compression::Gzip, &gz).await?, raw);

        let digest = crate::io::sha256_hex(&raw);
        assert_eq!(repo.by_hash("bookworm", "main", "amd64", &digest).await?, raw);
        assert!(repo
            .by_hash("bookworm", "main", "amd64", "ffffffffffffffff")
            .await?
            .is_empty());

        assert!(repo
            .packages("bookworm", "main", "riscv64", Compression::None)
            .await?
            .is_empty());

        assert_eq!(repo.pool("main", "pkg", "whatever.deb").await?, b"deb bytes");

        Ok(())
    }

    #[tokio::test]
    async fn fresh_snapshot_skips_the_source() -> Result<()> {
        let source = Arc::new(FakeSource::new(vec![(list_with("test"), Utc::now())]));
        let repo = DynamicRepo::new(test_signer(), source.clone());

        repo.in_release("bookworm").await?;
        repo.in_release("bookworm").await?;
        repo.packages("bookworm", "main", "amd64", Compression::None)
            .await?;

        assert_eq!(source.call_count(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn concurrent_requests_coalesce_into_one_render() -> Result<()> {
        let source = Arc::new(FakeSource::new(vec![(list_with("test"), Utc::now())]));
        let repo = Arc::new(DynamicRepo::new(test_signer(), source.clone()));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let repo = repo.clone();
            tasks.spawn(async move { repo.in_release("bookworm").await });
        }

        let mut bodies = vec![];
        while let Some(result) = tasks.join_next().await {
            bodies.push(result.unwrap()?);
        }

        assert_eq!(source.call_count(), 1);
        assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));

        Ok(())
    }

    #[tokio::test]
    async fn stale_source_does_not_rerender() -> Result<()> {
        let old_time = Utc::now() - chrono::Duration::hours(2);
        let source = Arc::new(FakeSource::new(vec![
            (list_with("current"), Utc::now()),
            (list_with("regressed"), old_time),
        ]));
        let repo = DynamicRepo::with_max_age(test_signer(), source.clone(), Duration::ZERO);

        let first = repo
            .packages("bookworm", "main", "amd64", Compression::None)
            .await?;
        assert!(String::from_utf8_lossy(&first).contains("Package: current\n"));

        // Source reports an older timestamp: the snapshot stays put.
        let second = repo
            .packages("bookworm", "main", "amd64", Compression::None)
            .await?;
        assert_eq!(source.call_count(), 2);
        assert_eq!(second, first);

        Ok(())
    }

    #[tokio::test]
    async fn source_failure_preserves_the_previous_snapshot() -> Result<()> {
        let source = Arc::new(FakeSource::new(vec![(list_with("test"), Utc::now())]));
        let repo = DynamicRepo::with_max_age(test_signer(), source.clone(), Duration::ZERO);

        repo.in_release("bookworm").await?;

        source.fail.store(true, Ordering::SeqCst);
        assert!(repo.in_release("bookworm").await.is_err());

        // Recovery: the next request retries the source.
        source.fail.store(false, Ordering::SeqCst);
        let calls_before = source.call_count();
        repo.in_release("bookworm").await?;
        assert_eq!(source.call_count(), calls_before + 1);

        Ok(())
    }

    #[tokio::test]
    async fn signing_key_is_the_public_half() -> Result<()> {
        let source = Arc::new(FakeSource::new(vec![(list_with("test"), Utc::now())]));
        let repo = DynamicRepo::new(test_signer(), source);

        let key = repo.signing_key().await?;
        assert!(String::from_utf8_lossy(&key)
            .starts_with("-----BEGIN PGP PUBLIC KEY BLOCK-----"));

        Ok(())
    }
}
