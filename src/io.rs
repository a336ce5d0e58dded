// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! I/O helpers: compression and content digesting. */

use {
    crate::error::Result,
    async_compression::futures::bufread::{GzipDecoder, GzipEncoder, XzDecoder, XzEncoder},
    digest::Digest,
    futures::AsyncReadExt,
    md5::Md5,
    sha2::Sha256,
};

/// Compression format used by archive index files.
///
/// The set is closed: Debian publishes `Packages` indices uncompressed and
/// in gzip and xz variants. Bzip2 is intentionally unsupported.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Compression {
    /// No compression (no extension).
    #[default]
    None,

    /// Gzip compression (.gz extension).
    Gzip,

    /// XZ compression (.xz extension).
    Xz,
}

impl Compression {
    /// Filename extension for files compressed in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Gzip => ".gz",
            Self::Xz => ".xz",
        }
    }

    /// Resolve a compression from a filename extension.
    ///
    /// Accepts the extension with or without its leading dot. Unknown
    /// extensions map to [Self::None].
    pub fn from_extension(s: &str) -> Self {
        match s {
            "gz" | ".gz" => Self::Gzip,
            "xz" | ".xz" => Self::Xz,
            _ => Self::None,
        }
    }

    /// The order in which index variants are rendered and advertised.
    pub fn render_order() -> impl Iterator<Item = Compression> {
        [Self::None, Self::Gzip, Self::Xz].into_iter()
    }
}

/// Compress a buffer with the given format at the default level.
pub async fn compress(compression: Compression, data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();

    match compression {
        Compression::None => out.extend_from_slice(data),
        Compression::Gzip => {
            GzipEncoder::new(data).read_to_end(&mut out).await?;
        }
        Compression::Xz => {
            XzEncoder::new(data).read_to_end(&mut out).await?;
        }
    }

    Ok(out)
}

/// Decompress a buffer previously encoded with [compress].
pub async fn decompress(compression: Compression, data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();

    match compression {
        Compression::None => out.extend_from_slice(data),
        Compression::Gzip => {
            GzipDecoder::new(data).read_to_end(&mut out).await?;
        }
        Compression::Xz => {
            XzDecoder::new(data).read_to_end(&mut out).await?;
        }
    }

    Ok(out)
}

/// Hex-encoded SHA-256 of a buffer.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// A content digester computing the MD5 and SHA-256 flavors `Packages`
/// entries carry, in one pass.
pub struct MultiDigester {
    md5: Md5,
    sha256: Sha256,
}

impl Default for MultiDigester {
    fn default() -> Self {
        Self {
            md5: Md5::new(),
            sha256: Sha256::new(),
        }
    }
}

impl MultiDigester {
    /// Write content into the digesters.
    pub fn update(&mut self, data: &[u8]) {
        self.md5.update(data);
        self.sha256.update(data);
    }

    /// Finish digesting, returning `(md5_hex, sha256_hex)`.
    pub fn finish(self) -> (String, String) {
        (
            hex::encode(self.md5.finalize()),
            hex::encode(self.sha256.finalize()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_mapping_is_bijective_on_defined_set() {
        for compression in Compression::render_order() {
            assert_eq!(
                Compression::from_extension(compression.extension()),
                compression
            );
        }

        assert_eq!(Compression::from_extension(".bz2"), Compression::None);
        assert_eq!(Compression::from_extension("lzma"), Compression::None);
    }

    #[tokio::test]
    async fn compression_round_trips() -> Result<()> {
        let data = b"Package: test\nVersion: 1.0.0\nArchitecture: amd64\n".repeat(32);

        for compression in Compression::render_order() {
            let encoded = compress(compression, &data).await?;
            if compression != Compression::None {
                assert_ne!(encoded, data);
            }
            assert_eq!(decompress(compression, &encoded).await?, data);
        }

        Ok(())
    }

    #[test]
    fn multi_digester_known_values() {
        let mut digester = MultiDigester::default();
        digester.update(b"debcache");
        let (md5, sha256) = digester.finish();

        assert_eq!(md5.len(), 32);
        assert_eq!(sha256.len(), 64);
        assert_eq!(sha256, sha256_hex(b"debcache"));
    }
}
