// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Artifact trust verification.

Package sources do not care *how* a `.deb` (or its checksum manifest) is
attested: they hold a [Verifier] and ask it. Concrete implementations
range from the trivial ([AlwaysPass] for unsigned sources, [AlwaysFail]
for tests) to the transparency-log backed [RekorVerifier].
*/

use {crate::error::Result, async_trait::async_trait};

mod certificate;
mod identity;
mod rekor;

pub use {
    certificate::CertificateVerifier,
    identity::FulcioIdentity,
    rekor::RekorVerifier,
};

/// Decides whether artifact bytes are trusted for a given release version.
///
/// The interface is deliberately free of protocol types: bytes in,
/// verdict out. `Ok(false)` is an untrusted artifact; `Err` is reserved
/// for malformed data and transport failures.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, version: &str, artifact: &[u8]) -> Result<bool>;
}

/// Accepts everything. For sources with verification disabled.
pub struct AlwaysPass;

#[async_trait]
impl Verifier for AlwaysPass {
    async fn verify(&self, _version: &str, _artifact: &[u8]) -> Result<bool> {
        Ok(true)
    }
}

/// Rejects everything.
pub struct AlwaysFail;

#[async_trait]
impl Verifier for AlwaysFail {
    async fn verify(&self, _version: &str, _artifact: &[u8]) -> Result<bool> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trivial_verifiers() -> Result<()> {
        assert!(AlwaysPass.verify("v1.0.0", b"anything").await?);
        assert!(!AlwaysFail.verify("v1.0.0", b"anything").await?);

        Ok(())
    }
}
