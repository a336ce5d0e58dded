// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! PGP signing of release metadata.

`InRelease` files are PGP cleartext signed messages: the `Release`
paragraph wrapped in a `-----BEGIN PGP SIGNED MESSAGE-----` envelope with
an inline armored signature. This module owns the signing key and the
clearsigning operation, and can emit the armored public half for client
configuration.
*/

use {
    crate::error::{DebcacheError, Result},
    pgp::{
        crypto::hash::HashAlgorithm,
        types::{KeyTrait, PublicKeyTrait, SecretKeyTrait},
        Deserializable, SignedSecretKey,
    },
    serde::Deserialize,
    std::io::Cursor,
};

/// How the signing key is provided in configuration.
///
/// Exactly one of the fields must be set; a repo without a usable key is a
/// bootstrap failure.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigningConfig {
    /// Armored secret key material inline in the config.
    #[serde(default, rename = "signingKey")]
    pub signing_key: Option<String>,

    /// Path to a file holding the armored secret key.
    #[serde(default, rename = "signingKeyPath")]
    pub signing_key_path: Option<String>,
}

/// Signs release paragraphs with a PGP secret key.
#[derive(Debug)]
pub struct Signer {
    key: SignedSecretKey,
}

impl Signer {
    /// Construct an instance from a parsed secret key.
    pub fn new(key: SignedSecretKey) -> Self {
        Self { key }
    }

    /// Load the signing key described by a [SigningConfig].
    pub fn from_config(config: &SigningConfig) -> Result<Self> {
        let armored = if let Some(key) = &config.signing_key {
            tracing::debug!("reading signing key from config");
            key.clone()
        } else if let Some(path) = &config.signing_key_path {
            tracing::debug!(%path, "reading signing key from file");
            std::fs::read_to_string(path)?
        } else {
            return Err(DebcacheError::SigningKeyMissing);
        };

        Self::from_armored(&armored)
    }

    /// Parse an armored secret key.
    pub fn from_armored(armored: &str) -> Result<Self> {
        let (key, _) = SignedSecretKey::from_armor_single(Cursor::new(armored.as_bytes()))?;
        tracing::debug!(fingerprint = %hex::encode(key.fingerprint()), "signing key loaded");

        Ok(Self::new(key))
    }

    /// Clearsign a buffer, returning the complete signed message.
    ///
    /// The output ends with a trailing newline after the signature armor,
    /// matching how apt expects `InRelease` files to terminate.
    pub fn clearsign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let signed = pgp_cleartext::cleartext_sign(
            &self.key,
            String::new,
            HashAlgorithm::SHA2_256,
            Cursor::new(data),
        )?;

        let mut out = signed.into_bytes();
        if out.last() != Some(&b'\n') {
            out.push(b'\n');
        }

        Ok(out)
    }

    /// Emit the armored public half of the signing key.
    pub fn public_key_armored(&self) -> Result<Vec<u8>> {
        let public = self.key.public_key().sign(&self.key, String::new)?;

        Ok(public.to_armored_string(None)?.into_bytes())
    }

    /// Access the underlying secret key.
    pub fn secret_key(&self) -> &SignedSecretKey {
        &self.key
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use {
        super::*,
        pgp::{
            crypto::sym::SymmetricKeyAlgorithm, types::CompressionAlgorithm, KeyType,
            SecretKeyParamsBuilder,
        },
        pgp_cleartext::CleartextSignatureReader,
        smallvec::smallvec,
        std::io::Read,
    };

    /// Generate a throwaway signing key for tests.
    pub(crate) fn test_signer() -> Signer {
        let params = SecretKeyParamsBuilder::default()
            .key_type(KeyType::Rsa(2048))
            .preferred_symmetric_algorithms(smallvec![SymmetricKeyAlgorithm::AES256])
            .preferred_hash_algorithms(smallvec![HashAlgorithm::SHA2_256])
            .preferred_compression_algorithms(smallvec![CompressionAlgorithm::ZLIB])
            .can_sign(true)
            .primary_user_id("debcache test <test@example.com>".to_string())
            .build()
            .unwrap();

        let key = params.generate().unwrap().sign(String::new).unwrap();

        Signer::new(key)
    }

    #[test]
    fn clearsign_envelope_and_signature_verify() -> Result<()> {
        let signer = test_signer();
        let content = b"Origin: Debian\nCodename: bookworm\n";

        let signed = signer.clearsign(content)?;
        let text = std::str::from_utf8(&signed).unwrap();

        assert!(text.starts_with("-----BEGIN PGP SIGNED MESSAGE-----\n"));
        assert!(text.contains("\n-----BEGIN PGP SIGNATURE-----\n"));
        assert!(text.ends_with("-----END PGP SIGNATURE-----\n"));

        let mut reader = CleartextSignatureReader::new(Cursor::new(signed.clone()));
        let mut cleartext = String::new();
        reader.read_to_string(&mut cleartext).unwrap();
        assert_eq!(
            cleartext.trim_end(),
            std::str::from_utf8(content).unwrap().trim_end()
        );

        let public = signer.key.public_key().sign(&signer.key, String::new)?;
        let signatures = reader.finalize();
        assert_eq!(signatures.verify(&public)?, 1);

        Ok(())
    }

    #[test]
    fn public_key_is_armored() -> Result<()> {
        let signer = test_signer();
        let armored = signer.public_key_armored()?;

        assert!(std::str::from_utf8(&armored)
            .unwrap()
            .starts_with("-----BEGIN PGP PUBLIC KEY BLOCK-----"));

        Ok(())
    }

    #[test]
    fn missing_key_is_a_bootstrap_error() {
        let err = Signer::from_config(&SigningConfig::default()).unwrap_err();
        assert!(matches!(err, DebcacheError::SigningKeyMissing));
    }
}
