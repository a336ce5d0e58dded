// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The wire adapter: URL shape in, core operations out.

A thin layer only. Paths are parsed into `(dist, component, architecture,
compression, ...)` tuples and dispatched to the named [Repo]; empty
results become 404 (Debian clients treat that as "variant not
published"), errors become 500.
*/

use {
    crate::{
        control::ControlParagraph,
        io::Compression,
        repo::Repo,
    },
    axum::{
        extract::{Host, Path, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::get,
        Router,
    },
    std::{collections::HashMap, sync::Arc},
    tower_http::trace::TraceLayer,
    tracing::error,
};

pub type RepoMap = Arc<HashMap<String, Arc<dyn Repo>>>;

pub fn router(repos: RepoMap) -> Router {
    Router::new()
        .route("/:repo/repo.source", get(repo_source))
        .route("/:repo/dists/:dist/InRelease", get(in_release))
        .route("/:repo/dists/:dist/*rest", get(dists_rest))
        .route("/:repo/pool/*rest", get(pool))
        .layer(TraceLayer::new_for_http())
        .with_state(repos)
}

/// An index request parsed out of the path below `dists/<dist>/`.
#[derive(Debug, Eq, PartialEq)]
enum IndexRequest<'a> {
    Packages {
        component: &'a str,
        architecture: &'a str,
        compression: Compression,
    },
    ByHash {
        component: &'a str,
        architecture: &'a str,
        algorithm: &'a str,
        digest: &'a str,
    },
    Translations {
        component: &'a str,
        lang: &'a str,
        compression: Compression,
    },
}

/// Parse the path tail after `dists/<dist>/`.
fn parse_index_path(rest: &str) -> Option<IndexRequest<'_>> {
    let segments = rest.split('/').collect::<Vec<_>>();

    // Literal `i18n` arms come first: the catch-all `binary-*` arms
    // would otherwise swallow their paths.
    match segments.as_slice() {
        &[component, "i18n", "by-hash", algorithm, digest] => Some(IndexRequest::ByHash {
            component,
            architecture: "",
            algorithm,
            digest,
        }),

        &[component, "i18n", file] => {
            let name = file.strip_prefix("Translation-")?;
            let (lang, extension) = match name.split_once('.') {
                Some((lang, extension)) => (lang, extension),
                None => (name, ""),
            };
            if !matches!(extension, "" | "gz" | "xz") {
                return None;
            }

            Some(IndexRequest::Translations {
                component,
                lang,
                compression: Compression::from_extension(extension),
            })
        }

        &[component, binary, "by-hash", algorithm, digest] => {
            let architecture = binary.strip_prefix("binary-")?;

            Some(IndexRequest::ByHash {
                component,
                architecture,
                algorithm,
                digest,
            })
        }

        &[component, binary, file] => {
            let architecture = binary.strip_prefix("binary-")?;
            let extension = file.strip_prefix("Packages")?;
            if !matches!(extension, "" | ".gz" | ".xz") {
                return None;
            }

            Some(IndexRequest::Packages {
                component,
                architecture,
                compression: Compression::from_extension(extension),
            })
        }

        _ => None,
    }
}

/// Parse the path tail after `pool/`:
/// `<component>/<prefix>/<package>/<filename...>`.
fn parse_pool_path(rest: &str) -> Option<(&str, &str, &str)> {
    let mut parts = rest.splitn(4, '/');
    let component = parts.next()?;
    let _prefix = parts.next()?;
    let package = parts.next()?;
    let filename = parts.next()?;

    if component.is_empty() || package.is_empty() || filename.is_empty() {
        return None;
    }

    Some((component, package, filename))
}

fn respond(op: &'static str, result: crate::error::Result<Vec<u8>>) -> Response {
    match result {
        Ok(data) if data.is_empty() => StatusCode::NOT_FOUND.into_response(),
        Ok(data) => data.into_response(),
        Err(e) => {
            error!(op, error = %e, "request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn in_release(
    State(repos): State<RepoMap>,
    Path((repo, dist)): Path<(String, String)>,
) -> Response {
    let Some(repo) = repos.get(&repo) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    respond("InRelease", repo.in_release(&dist).await)
}

async fn dists_rest(
    State(repos): State<RepoMap>,
    Path((repo, dist, rest)): Path<(String, String, String)>,
) -> Response {
    let Some(repo) = repos.get(&repo) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match parse_index_path(&rest) {
        Some(IndexRequest::Packages {
            component,
            architecture,
            compression,
        }) => respond(
            "Packages",
            repo.packages(&dist, component, architecture, compression).await,
        ),

        Some(IndexRequest::ByHash {
            component,
            architecture,
            algorithm,
            digest,
        }) => {
            if algorithm != "SHA256" {
                return StatusCode::NOT_FOUND.into_response();
            }

            respond(
                "ByHash",
                repo.by_hash(&dist, component, architecture, digest).await,
            )
        }

        Some(IndexRequest::Translations {
            component,
            lang,
            compression,
        }) => respond(
            "Translations",
            repo.translations(&dist, component, lang, compression).await,
        ),

        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn pool(
    State(repos): State<RepoMap>,
    Path((repo, rest)): Path<(String, String)>,
) -> Response {
    let Some(repo) = repos.get(&repo) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let Some((component, package, filename)) = parse_pool_path(&rest) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    respond("Pool", repo.pool(component, package, filename).await)
}

async fn repo_source(
    State(repos): State<RepoMap>,
    Host(host): Host,
    Path(repo_name): Path<String>,
) -> Response {
    let Some(repo) = repos.get(&repo_name) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let signed_by = match repo.signing_key().await {
        Ok(key) if !key.is_empty() => String::from_utf8_lossy(&key).trim_end().to_string(),
        Ok(_) => "/usr/share/keyrings/debian-archive-keyring.gpg".to_string(),
        Err(e) => {
            error!(error = %e, "signing key unavailable");
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    let suite = if repo_name.contains("-security") {
        "bookworm-security"
    } else {
        "bookworm"
    };

    let mut paragraph = ControlParagraph::default();
    paragraph.set_field_from_string("Types".into(), "deb".into());
    paragraph.set_field_from_string(
        "URIs".into(),
        format!("http://{}/{}", host, repo_name).into(),
    );
    paragraph.set_field_from_string("Suites".into(), suite.to_string().into());
    paragraph.set_field_from_string("Components".into(), "main".into());
    paragraph.set_field_from_string("Signed-By".into(), signed_by.into());

    paragraph.to_string().into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packages_paths_parse() {
        assert_eq!(
            parse_index_path("main/binary-amd64/Packages"),
            Some(IndexRequest::Packages {
                component: "main",
                architecture: "amd64",
                compression: Compression::None,
            })
        );
        assert_eq!(
            parse_index_path("main/binary-arm64/Packages.xz"),
            Some(IndexRequest::Packages {
                component: "main",
                architecture: "arm64",
                compression: Compression::Xz,
            })
        );

        assert_eq!(parse_index_path("main/binary-amd64/Packages.bz2"), None);
        assert_eq!(parse_index_path("main/source/Sources"), None);
    }

    #[test]
    fn by_hash_paths_parse() {
        assert_eq!(
            parse_index_path("main/binary-amd64/by-hash/SHA256/abc123"),
            Some(IndexRequest::ByHash {
                component: "main",
                architecture: "amd64",
                algorithm: "SHA256",
                digest: "abc123",
            })
        );
        assert_eq!(
            parse_index_path("main/i18n/by-hash/SHA256/abc123"),
            Some(IndexRequest::ByHash {
                component: "main",
                architecture: "",
                algorithm: "SHA256",
                digest: "abc123",
            })
        );
    }

    #[test]
    fn translation_paths_parse() {
        assert_eq!(
            parse_index_path("main/i18n/Translation-en"),
            Some(IndexRequest::Translations {
                component: "main",
                lang: "en",
                compression: Compression::None,
            })
        );
        assert_eq!(
            parse_index_path("main/i18n/Translation-de.gz"),
            Some(IndexRequest::Translations {
                component: "main",
                lang: "de",
                compression: Compression::Gzip,
            })
        );
    }

    #[test]
    fn pool_paths_parse() {
        assert_eq!(
            parse_pool_path("main/p/pkg/foo_1.0_amd64.deb"),
            Some(("main", "pkg", "foo_1.0_amd64.deb"))
        );
        assert_eq!(
            parse_pool_path("main/p/pkg/nested/dir/foo.deb"),
            Some(("main", "pkg", "nested/dir/foo.deb"))
        );
        assert_eq!(parse_pool_path("main/p"), None);
        assert_eq!(parse_pool_path("main/p/pkg/"), None);
    }
}
