// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end exercises of the gateway: a directory of `.deb` files
//! served through the dynamic repo, the cache overlay, and the HTTP
//! surface, the way an apt client would walk it.

use {
    axum::{body::Body, http::Request},
    debcache::{
        io::{compress, decompress, sha256_hex, Compression},
        repo::{CacheRepo, DynamicRepo, Repo, UpstreamRepo},
        server::{router, RepoMap},
        signer::Signer,
        source::{LocalConfig, LocalSource},
        storage::LruStorage,
    },
    http_body_util::BodyExt,
    pgp::{
        crypto::{hash::HashAlgorithm, sym::SymmetricKeyAlgorithm},
        types::CompressionAlgorithm,
        KeyType, SecretKeyParamsBuilder,
    },
    smallvec::smallvec,
    std::{collections::HashMap, path::Path, sync::Arc},
    tower::ServiceExt,
};

fn test_signer() -> Signer {
    let params = SecretKeyParamsBuilder::default()
        .key_type(KeyType::Rsa(2048))
        .preferred_symmetric_algorithms(smallvec![SymmetricKeyAlgorithm::AES256])
        .preferred_hash_algorithms(smallvec![HashAlgorithm::SHA2_256])
        .preferred_compression_algorithms(smallvec![CompressionAlgorithm::ZLIB])
        .can_sign(true)
        .primary_user_id("debcache test <test@example.com>".to_string())
        .build()
        .unwrap();

    Signer::new(params.generate().unwrap().sign(String::new).unwrap())
}

/// Assemble a minimal `.deb` holding just a control paragraph.
async fn write_deb(dir: &Path, name: &str, fields: &[(&str, &str)]) -> Vec<u8> {
    let control = fields
        .iter()
        .map(|(field, value)| format!("{}: {}\n", field, value))
        .collect::<String>()
        .into_bytes();

    let mut control_tar = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_path("./control").unwrap();
    header.set_size(control.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    control_tar.append(&header, control.as_slice()).unwrap();
    let control_member = compress(Compression::Gzip, &control_tar.into_inner().unwrap())
        .await
        .unwrap();

    let data_member = compress(
        Compression::Gzip,
        &tar::Builder::new(Vec::new()).into_inner().unwrap(),
    )
    .await
    .unwrap();

    let mut deb = ar::Builder::new(Vec::new());
    deb.append(
        &ar::Header::new(b"debian-binary".to_vec(), 4),
        &b"2.0\n"[..],
    )
    .unwrap();
    deb.append(
        &ar::Header::new(b"control.tar.gz".to_vec(), control_member.len() as u64),
        control_member.as_slice(),
    )
    .unwrap();
    deb.append(
        &ar::Header::new(b"data.tar.gz".to_vec(), data_member.len() as u64),
        data_member.as_slice(),
    )
    .unwrap();

    let deb = deb.into_inner().unwrap();
    std::fs::write(dir.join(name), &deb).unwrap();
    deb
}

/// A `tools` repo: dynamic over a local directory, behind the memory
/// cache overlay, mounted in the router.
async fn gateway(dir: &Path) -> RepoMap {
    let source = Arc::new(LocalSource::new(LocalConfig {
        dir: dir.to_path_buf(),
    }));
    let dynamic = Arc::new(DynamicRepo::new(test_signer(), source));
    let cached = Arc::new(CacheRepo::new(dynamic, Arc::new(LruStorage::default())));

    let mut repos: HashMap<String, Arc<dyn Repo>> = HashMap::new();
    repos.insert("tools".to_string(), cached);
    Arc::new(repos)
}

async fn get(repos: &RepoMap, uri: &str) -> (u16, Vec<u8>) {
    let response = router(repos.clone())
        .oneshot(
            Request::builder()
                .uri(uri)
                .header("host", "localhost:8080")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status().as_u16();
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, body)
}

/// Pull the ` <digest>  <size> <path>` entries out of an `InRelease`.
fn sha256_entries(in_release: &str) -> Vec<(String, usize, String)> {
    in_release
        .lines()
        .filter_map(|line| {
            let line = line.strip_prefix(' ')?;
            let mut words = line.split_whitespace();
            let digest = words.next()?;
            let size = words.next()?.parse().ok()?;
            let path = words.next()?;
            (digest.len() == 64 && path.contains("binary-")).then(|| {
                (digest.to_string(), size, path.to_string())
            })
        })
        .collect()
}

#[tokio::test]
async fn apt_walk_over_the_dynamic_repo() {
    let dir = tempfile::tempdir().unwrap();
    let deb = write_deb(
        dir.path(),
        "foobar_1.2.3_amd64.deb",
        &[
            ("Package", "foobar"),
            ("Version", "1.2.3"),
            ("Architecture", "amd64"),
        ],
    )
    .await;

    let repos = gateway(dir.path()).await;

    // The one-shot source paragraph for client configuration.
    let (status, body) = get(&repos, "/tools/repo.source").await;
    assert_eq!(status, 200);
    let source_text = String::from_utf8(body).unwrap();
    assert!(source_text.contains("Types: deb\n"));
    assert!(source_text.contains("/tools\n"));
    assert!(source_text.contains("Signed-By: -----BEGIN PGP PUBLIC KEY BLOCK-----"));

    // InRelease advertises three digest entries for main/amd64.
    let (status, body) = get(&repos, "/tools/dists/bookworm/InRelease").await;
    assert_eq!(status, 200);
    let in_release = String::from_utf8(body).unwrap();
    assert!(in_release.starts_with("-----BEGIN PGP SIGNED MESSAGE-----\n"));
    assert!(in_release.contains("Codename: bookworm"));
    assert!(in_release.contains("Architectures: amd64"));
    assert!(in_release.contains("Components: main"));

    let entries = sha256_entries(&in_release);
    assert_eq!(entries.len(), 3);

    // Every advertised digest resolves by-hash to bytes matching it.
    for (digest, size, path) in &entries {
        let uri = format!(
            "/tools/dists/bookworm/main/binary-amd64/by-hash/SHA256/{}",
            digest
        );
        let (status, body) = get(&repos, &uri).await;
        assert_eq!(status, 200, "by-hash for {}", path);
        assert_eq!(body.len(), *size);
        assert_eq!(&sha256_hex(&body), digest);
    }

    // The Packages variants decode to the same index.
    let (status, plain) = get(
        &repos,
        "/tools/dists/bookworm/main/binary-amd64/Packages",
    )
    .await;
    assert_eq!(status, 200);
    let index = String::from_utf8(plain.clone()).unwrap();
    assert!(index.contains("Package: foobar\n"));
    assert!(index.contains("Filename: pool/main/p/pkg/foobar_1.2.3_amd64.deb\n"));

    let (status, gz) = get(
        &repos,
        "/tools/dists/bookworm/main/binary-amd64/Packages.gz",
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(decompress(Compression::Gzip, &gz).await.unwrap(), plain);

    // The pool serves the original .deb bytes.
    let (status, body) = get(&repos, "/tools/pool/main/p/pkg/foobar_1.2.3_amd64.deb").await;
    assert_eq!(status, 200);
    assert_eq!(body, deb);
}

#[tokio::test]
async fn not_found_surface() {
    let dir = tempfile::tempdir().unwrap();
    write_deb(
        dir.path(),
        "foobar_1.2.3_amd64.deb",
        &[
            ("Package", "foobar"),
            ("Version", "1.2.3"),
            ("Architecture", "amd64"),
        ],
    )
    .await;
    let repos = gateway(dir.path()).await;

    // Unknown repo name.
    let (status, _) = get(&repos, "/nope/dists/bookworm/InRelease").await;
    assert_eq!(status, 404);

    // Digest algorithms other than SHA256 are absent by definition.
    let (status, _) = get(
        &repos,
        "/tools/dists/bookworm/main/binary-amd64/by-hash/MD5Sum/abc123",
    )
    .await;
    assert_eq!(status, 404);

    // Unpublished architecture yields empty bytes, surfaced as 404.
    let (status, _) = get(
        &repos,
        "/tools/dists/bookworm/main/binary-riscv64/Packages",
    )
    .await;
    assert_eq!(status, 404);

    // Unknown pool file.
    let (status, _) = get(&repos, "/tools/pool/main/p/pkg/missing.deb").await;
    assert_eq!(status, 404);

    // Dynamic repos publish no translations.
    let (status, _) = get(&repos, "/tools/dists/bookworm/main/i18n/Translation-en").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn upstream_round_trip_through_a_live_listener() {
    let dir = tempfile::tempdir().unwrap();
    let deb = write_deb(
        dir.path(),
        "foobar_1.2.3_amd64.deb",
        &[
            ("Package", "foobar"),
            ("Version", "1.2.3"),
            ("Architecture", "amd64"),
        ],
    )
    .await;

    // Serve the dynamic repo on a real socket and treat it as a remote
    // mirror.
    let repos = gateway(dir.path()).await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(repos)).await.unwrap();
    });

    let base = url::Url::parse(&format!("http://{}/tools", addr)).unwrap();
    let upstream = UpstreamRepo::new(base);

    let in_release = upstream.in_release("bookworm").await.unwrap();
    assert!(String::from_utf8_lossy(&in_release)
        .starts_with("-----BEGIN PGP SIGNED MESSAGE-----\n"));

    let packages = upstream
        .packages("bookworm", "main", "amd64", Compression::None)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&packages).contains("Package: foobar\n"));

    let pooled = upstream
        .pool("main", "pkg", "foobar_1.2.3_amd64.deb")
        .await
        .unwrap();
    assert_eq!(pooled, deb);

    // A 404 from the remote side is an upstream status error.
    assert!(upstream
        .packages("bookworm", "main", "riscv64", Compression::None)
        .await
        .is_err());
}
