// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Serve packages from a local directory of `.deb` files. */

use {
    super::PackageSource,
    crate::{
        deb::control_paragraph, error::Result, io::MultiDigester, packages::PackageList,
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    serde::Deserialize,
    std::path::{Path, PathBuf},
    tracing::warn,
    walkdir::WalkDir,
};

/// Pool paths published by sources that place everything under one
/// synthetic package directory.
pub(crate) const POOL_PREFIX: &str = "pool/main/p/pkg/";

#[derive(Clone, Debug, Deserialize)]
pub struct LocalConfig {
    /// Directory tree to scan for `*.deb` files.
    pub dir: PathBuf,
}

/// A package source reading `.deb` files from a directory tree.
///
/// Every readable `.deb` lands in component `main` under the architecture
/// its control paragraph declares. The snapshot time is the newest file
/// mtime, so touching a package re-renders the repository.
pub struct LocalSource {
    dir: PathBuf,
}

impl LocalSource {
    pub fn new(config: LocalConfig) -> Self {
        Self { dir: config.dir }
    }

    async fn package_paragraph(
        &self,
        path: &Path,
    ) -> Result<Option<crate::control::ControlParagraph<'static>>> {
        let data = std::fs::read(path)?;

        let Some(mut paragraph) = control_paragraph(&data).await? else {
            return Ok(None);
        };

        let mut digester = MultiDigester::default();
        digester.update(&data);
        let (md5, sha256) = digester.finish();

        let relative = path
            .strip_prefix(&self.dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, "/");

        paragraph.set_field_from_string(
            "Filename".into(),
            format!("{}{}", POOL_PREFIX, relative).into(),
        );
        paragraph.set_field_from_string("Size".into(), data.len().to_string().into());
        paragraph.set_field_from_string("MD5sum".into(), md5.into());
        paragraph.set_field_from_string("SHA256".into(), sha256.into());

        Ok(Some(paragraph))
    }
}

#[async_trait]
impl PackageSource for LocalSource {
    async fn packages(&self) -> Result<(PackageList, DateTime<Utc>)> {
        let mut list = PackageList::default();
        let mut latest = DateTime::<Utc>::MIN_UTC;

        for entry in WalkDir::new(&self.dir) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file()
                || entry.path().extension().map(|e| e != "deb").unwrap_or(true)
            {
                continue;
            }

            if let Ok(mtime) = entry.metadata().map_err(std::io::Error::from)?.modified() {
                let mtime = DateTime::<Utc>::from(mtime);
                if mtime > latest {
                    latest = mtime;
                }
            }

            let Some(paragraph) = self.package_paragraph(entry.path()).await? else {
                warn!(file = %entry.path().display(), "no control paragraph found");
                continue;
            };

            let architecture = paragraph.field_str("Architecture").unwrap_or_default().to_string();
            list.add("main", architecture, paragraph);
        }

        Ok((list, latest))
    }

    async fn deb(&self, filename: &str) -> Result<Vec<u8>> {
        // Accept both the relative name and the full pool path.
        let filename = filename.strip_prefix("main/p/pkg/").unwrap_or(filename);

        match std::fs::read(self.dir.join(filename)) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(vec![]),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{deb::tests::build_deb, io::Compression},
    };

    async fn write_deb(dir: &Path, name: &str, package: &str, architecture: &str) {
        let deb = build_deb(
            &[
                ("Package", package),
                ("Version", "1.0.0"),
                ("Architecture", architecture),
            ],
            Compression::Gzip,
        )
        .await;
        std::fs::write(dir.join(name), deb).unwrap();
    }

    #[tokio::test]
    async fn indexes_debs_with_digests_and_pool_paths() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        write_deb(dir.path(), "a_1.0.0_amd64.deb", "a", "amd64").await;
        write_deb(dir.path(), "b_1.0.0_arm64.deb", "b", "arm64").await;
        std::fs::write(dir.path().join("README.md"), "not a deb").unwrap();

        let source = LocalSource::new(LocalConfig {
            dir: dir.path().to_path_buf(),
        });
        let (list, time) = source.packages().await?;

        assert_eq!(list.component_names(), vec!["main"]);
        assert_eq!(list.architecture_names(), vec!["amd64", "arm64"]);
        assert!(time > DateTime::<Utc>::MIN_UTC);

        let (_, _, packages) = list
            .iter_groups()
            .find(|(_, arch, _)| *arch == "amd64")
            .unwrap();
        let paragraph = &packages[0];
        assert_eq!(
            paragraph.field_str("Filename"),
            Some("pool/main/p/pkg/a_1.0.0_amd64.deb")
        );
        assert_eq!(paragraph.field_str("SHA256").map(str::len), Some(64));
        assert_eq!(paragraph.field_str("MD5sum").map(str::len), Some(32));
        assert!(paragraph.field_str("Size").unwrap().parse::<u64>().unwrap() > 0);

        Ok(())
    }

    #[tokio::test]
    async fn serves_deb_bytes_by_pool_name() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        write_deb(dir.path(), "a_1.0.0_amd64.deb", "a", "amd64").await;

        let source = LocalSource::new(LocalConfig {
            dir: dir.path().to_path_buf(),
        });

        let direct = source.deb("a_1.0.0_amd64.deb").await?;
        assert!(!direct.is_empty());

        let prefixed = source.deb("main/p/pkg/a_1.0.0_amd64.deb").await?;
        assert_eq!(direct, prefixed);

        assert!(source.deb("missing.deb").await?.is_empty());

        Ok(())
    }
}
