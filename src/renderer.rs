// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Render a [PackageList] into a servable repository snapshot.

Given a bag of packages the renderer produces the full family of
artifacts a Debian client expects: a clearsigned `Release` paragraph
(`InRelease`), one `Packages` file per `(component, architecture)` in
three compression variants, and a content-addressed by-hash view. Every
digest advertised in `InRelease` refers to bytes present in the same
snapshot; the whole family derives from one input and is immutable once
built.
*/

use {
    crate::{
        control::{write_paragraphs, ControlField, ControlParagraph},
        error::{DebcacheError, Result},
        io::{compress, sha256_hex, Compression},
        packages::PackageList,
        signer::Signer,
    },
    chrono::{DateTime, Utc},
    std::collections::HashMap,
};

/// `Date:` field format: RFC 1123 with a numeric timezone.
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// The artifacts of one render, immutable once constructed.
pub struct RenderedSnapshot {
    in_release: Vec<u8>,
    packages: HashMap<(String, String), Vec<u8>>,
    by_hash: HashMap<String, Vec<u8>>,
    snapshot_time: DateTime<Utc>,
}

impl RenderedSnapshot {
    /// The clearsigned `InRelease` bytes.
    pub fn in_release(&self) -> &[u8] {
        &self.in_release
    }

    /// Uncompressed `Packages` bytes for a `(component, architecture)`.
    pub fn packages(&self, component: &str, architecture: &str) -> Option<&[u8]> {
        self.packages
            .get(&(component.to_string(), architecture.to_string()))
            .map(Vec::as_slice)
    }

    /// Look up a compressed index variant by its hex SHA-256.
    pub fn by_hash(&self, digest: &str) -> Option<&[u8]> {
        self.by_hash.get(digest).map(Vec::as_slice)
    }

    /// The source-reported timestamp this snapshot reflects.
    pub fn snapshot_time(&self) -> DateTime<Utc> {
        self.snapshot_time
    }
}

struct DigestEntry {
    digest: String,
    size: usize,
    path: String,
}

/// Render a snapshot.
///
/// Deterministic for fixed inputs, modulo compressor output and the
/// signature nonce: all downstream consistency is anchored on the digests
/// computed here, not on reproducible compressed bytes.
pub async fn render(
    packages: &PackageList,
    snapshot_time: DateTime<Utc>,
    distribution: &str,
    signer: &Signer,
) -> Result<RenderedSnapshot> {
    let mut rendered_packages = HashMap::new();
    let mut by_hash: HashMap<String, Vec<u8>> = HashMap::new();
    let mut digests = Vec::new();

    for (component, architecture, group) in packages.iter_groups() {
        let mut uncompressed = Vec::new();
        write_paragraphs(&mut uncompressed, group.iter())?;

        for compression in Compression::render_order() {
            let data = compress(compression, &uncompressed).await?;
            let digest = sha256_hex(&data);

            digests.push(DigestEntry {
                digest: digest.clone(),
                size: data.len(),
                path: format!(
                    "{}/binary-{}/Packages{}",
                    component,
                    architecture,
                    compression.extension()
                ),
            });

            // Identical index content legitimately recurs across groups
            // and re-inserts the same bytes. Differing bytes under one
            // digest mean the snapshot is incoherent.
            if let Some(existing) = by_hash.get(&digest) {
                if *existing != data {
                    return Err(DebcacheError::ByHashCollision(digest));
                }
            } else {
                by_hash.insert(digest, data);
            }
        }

        rendered_packages.insert(
            (component.to_string(), architecture.to_string()),
            uncompressed,
        );
    }

    digests.sort_by(|a, b| a.path.cmp(&b.path));

    let mut release = ControlParagraph::default();
    release.set_field_from_string("Origin".into(), "Debian".into());
    release.set_field_from_string("Label".into(), "Debian".into());
    release.set_field_from_string(
        "Architectures".into(),
        packages.architecture_names().join(" ").into(),
    );
    release.set_field_from_string(
        "Components".into(),
        packages.component_names().join(" ").into(),
    );
    release.set_field_from_string(
        "Date".into(),
        snapshot_time
            .with_timezone(&Utc)
            .format(DATE_FORMAT)
            .to_string()
            .into(),
    );
    release.set_field_from_string("Acquire-By-Hash".into(), "yes".into());
    release.set_field_from_string("Description".into(), "Debian".into());
    release.set_field_from_string("Codename".into(), distribution.to_string().into());
    release.set_field(ControlField::from_lines(
        "SHA256".into(),
        std::iter::once(String::new()).chain(
            digests
                .iter()
                .map(|entry| format!("{}  {} {}", entry.digest, entry.size, entry.path)),
        ),
    ));

    let mut release_bytes = Vec::new();
    write_paragraphs(&mut release_bytes, std::iter::once(&release))?;

    let in_release = signer.clearsign(&release_bytes)?;

    Ok(RenderedSnapshot {
        in_release,
        packages: rendered_packages,
        by_hash,
        snapshot_time,
    })
}
