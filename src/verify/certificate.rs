// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Match signing certificates against a declared identity. */

use {
    super::identity::{decode_extension, oid, san_uris, FulcioIdentity},
    crate::error::Result,
    regex::Regex,
    std::collections::HashMap,
    tracing::debug,
    x509_certificate::{rfc5280, CapturedX509Certificate},
};

/// Verifies that a certificate's extensions satisfy a [FulcioIdentity].
pub struct CertificateVerifier {
    values: HashMap<String, String>,
    patterns: HashMap<String, Regex>,
}

impl CertificateVerifier {
    pub fn new(identity: &FulcioIdentity) -> Result<Self> {
        Ok(Self {
            values: identity.values(),
            patterns: identity.patterns()?,
        })
    }

    /// Whether the certificate satisfies every declared field.
    ///
    /// Literal values are compared after `{{VERSION}}` substitution; the
    /// SAN is matched against the certificate's URI SANs. Returns as soon
    /// as every required match has succeeded.
    pub fn verify(&self, version: &str, cert: &CapturedX509Certificate) -> Result<bool> {
        let cert_ref: &rfc5280::Certificate = cert.as_ref();

        let mut value_count = self.values.len();
        let mut pattern_count = self.patterns.len();
        debug!(
            needed_values = value_count,
            needed_patterns = pattern_count,
            "verifying certificate extensions"
        );

        // The SAN is not decoded like the other extensions: matching is
        // against the certificate's URI SANs.
        if self.values.contains_key(oid::SAN) || self.patterns.contains_key(oid::SAN) {
            let uris = cert_ref
                .iter_extensions()
                .find(|ext| ext.id.to_string() == oid::SAN)
                .map(|ext| san_uris(ext.value.to_bytes().as_ref()))
                .transpose()?
                .unwrap_or_default();

            if let Some(expected) = self.values.get(oid::SAN) {
                let expected = expected.replace("{{VERSION}}", version);
                if !uris.iter().any(|uri| *uri == expected) {
                    debug!(%expected, "subject alt name mismatch");
                    return Ok(false);
                }
                value_count = value_count.saturating_sub(1);
            }

            if let Some(pattern) = self.patterns.get(oid::SAN) {
                if !uris.iter().any(|uri| pattern.is_match(uri)) {
                    debug!(pattern = pattern.as_str(), "subject alt name pattern mismatch");
                    return Ok(false);
                }
                pattern_count = pattern_count.saturating_sub(1);
            }
        }

        if value_count == 0 && pattern_count == 0 {
            return Ok(true);
        }

        for extension in cert_ref.iter_extensions() {
            let extension_oid = extension.id.to_string();
            let Some(actual) =
                decode_extension(&extension_oid, extension.value.to_bytes().as_ref())?
            else {
                continue;
            };
            if actual.is_empty() {
                continue;
            }

            if let Some(expected) = self.values.get(&extension_oid) {
                if actual != expected.replace("{{VERSION}}", version) {
                    debug!(oid = %extension_oid, %actual, %expected, "extension value mismatch");
                    return Ok(false);
                }
                value_count = value_count.saturating_sub(1);
            }

            if let Some(pattern) = self.patterns.get(&extension_oid) {
                if !pattern.is_match(&actual) {
                    debug!(
                        oid = %extension_oid,
                        %actual,
                        pattern = pattern.as_str(),
                        "extension pattern mismatch"
                    );
                    return Ok(false);
                }
                pattern_count = pattern_count.saturating_sub(1);
            }

            if value_count == 0 && pattern_count == 0 {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Match decoded `(oid, value)` pairs plus URI SANs directly.
    ///
    /// This is the certificate-free core of [Self::verify], split out so
    /// policy logic is testable without minting certificates.
    #[cfg(test)]
    fn verify_decoded(&self, version: &str, extensions: &[(&str, &str)], uris: &[&str]) -> bool {
        let mut value_count = self.values.len();
        let mut pattern_count = self.patterns.len();

        if let Some(expected) = self.values.get(oid::SAN) {
            let expected = expected.replace("{{VERSION}}", version);
            if !uris.iter().any(|uri| *uri == expected) {
                return false;
            }
            value_count -= 1;
        }
        if let Some(pattern) = self.patterns.get(oid::SAN) {
            if !uris.iter().any(|uri| pattern.is_match(uri)) {
                return false;
            }
            pattern_count -= 1;
        }

        for (extension_oid, actual) in extensions {
            if let Some(expected) = self.values.get(*extension_oid) {
                if *actual != expected.replace("{{VERSION}}", version) {
                    return false;
                }
                value_count -= 1;
            }
            if let Some(pattern) = self.patterns.get(*extension_oid) {
                if !pattern.is_match(actual) {
                    return false;
                }
                pattern_count -= 1;
            }
            if value_count == 0 && pattern_count == 0 {
                return true;
            }
        }

        value_count == 0 && pattern_count == 0
    }
}
