// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use thiserror::Error;

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum DebcacheError {
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("URL error: {0:?}")]
    Url(#[from] url::ParseError),

    #[error("HTTP error: {0:?}")]
    Reqwest(#[from] reqwest::Error),

    #[error("hex parsing error: {0:?}")]
    Hex(#[from] hex::FromHexError),

    #[error("base64 decoding error: {0:?}")]
    Base64(#[from] base64::DecodeError),

    #[error("PGP error: {0:?}")]
    Pgp(#[from] pgp::errors::Error),

    #[error("JSON error: {0:?}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0:?}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("PEM error: {0:?}")]
    Pem(#[from] pem::PemError),

    #[error("X.509 error: {0:?}")]
    X509(#[from] x509_certificate::X509CertificateError),

    #[error("regex error: {0:?}")]
    Regex(#[from] regex::Error),

    #[error("control file parse error: {0}")]
    ControlParseError(String),

    #[error("unknown compression in deb archive member: {0}")]
    DebUnknownCompression(String),

    #[error("malformed .deb archive: {0}")]
    DebParseError(String),

    #[error("upstream returned status {status} for {url}")]
    UpstreamStatus { url: String, status: u16 },

    #[error("no signing key provided")]
    SigningKeyMissing,

    #[error("no package source configured")]
    NoSourceConfigured,

    #[error("unknown repo type: {0}")]
    UnknownRepoType(String),

    #[error("github repository name is not owner/name: {0}")]
    GitHubRepoName(String),

    #[error("checksum mismatch on {filename}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        filename: String,
        expected: String,
        actual: String,
    },

    #[error("checksum manifest {0} not found in release")]
    ChecksumManifestNotFound(String),

    #[error("{0} not present in checksum manifest")]
    ChecksumEntryMissing(String),

    #[error("unknown digest length in checksum manifest: {0}")]
    ChecksumDigestLength(usize),

    #[error("two by-hash entries share digest {0} with differing content")]
    ByHashCollision(String),

    #[error("unsupported transparency log entry kind: {0}")]
    RekorEntryKind(String),

    #[error("malformed transparency log entry: {0}")]
    RekorEntryMalformed(String),

    #[error("DER decoding error: {0}")]
    DerDecode(String),
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, DebcacheError>;
