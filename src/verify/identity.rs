// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Declared signing identities and Fulcio extension decoding.

A [FulcioIdentity] names the X.509 extension values a signing certificate
must carry for an artifact to be trusted: the OIDC issuer, the SAN of the
workflow, and any of the Fulcio-defined build metadata extensions.
Literal fields require equality (after `{{VERSION}}` substitution);
`*-pattern` fields require a regex match.

Fulcio defines two generations of extension encodings: the deprecated
single OIDs (`1.3.6.1.4.1.57264.1.1`-`1.3.6.1.4.1.57264.1.6`) carry raw
UTF-8, while the v2 OIDs wrap the value in a DER IA5String. See
<https://github.com/sigstore/fulcio/blob/main/docs/oid-info.md>.
*/

use {
    crate::error::{DebcacheError, Result},
    regex::Regex,
    serde::Deserialize,
    std::collections::HashMap,
    tracing::warn,
};

/// OID constants, dotted-decimal.
pub mod oid {
    /// X.509 Subject Alternative Name.
    pub const SAN: &str = "2.5.29.17";

    /// OIDC issuer (deprecated raw-UTF-8 form).
    pub const ISSUER_V1: &str = "1.3.6.1.4.1.57264.1.1";
    pub const GITHUB_WORKFLOW_TRIGGER: &str = "1.3.6.1.4.1.57264.1.2";
    pub const GITHUB_WORKFLOW_SHA: &str = "1.3.6.1.4.1.57264.1.3";
    pub const GITHUB_WORKFLOW_NAME: &str = "1.3.6.1.4.1.57264.1.4";
    pub const GITHUB_WORKFLOW_REPOSITORY: &str = "1.3.6.1.4.1.57264.1.5";
    pub const GITHUB_WORKFLOW_REF: &str = "1.3.6.1.4.1.57264.1.6";

    /// OIDC issuer (v2, DER IA5String).
    pub const ISSUER_V2: &str = "1.3.6.1.4.1.57264.1.8";
    pub const BUILD_SIGNER_URI: &str = "1.3.6.1.4.1.57264.1.9";
    pub const BUILD_SIGNER_DIGEST: &str = "1.3.6.1.4.1.57264.1.10";
    pub const RUNNER_ENVIRONMENT: &str = "1.3.6.1.4.1.57264.1.11";
    pub const SOURCE_REPOSITORY_URI: &str = "1.3.6.1.4.1.57264.1.12";
    pub const SOURCE_REPOSITORY_DIGEST: &str = "1.3.6.1.4.1.57264.1.13";
    pub const SOURCE_REPOSITORY_REF: &str = "1.3.6.1.4.1.57264.1.14";
    pub const SOURCE_REPOSITORY_IDENTIFIER: &str = "1.3.6.1.4.1.57264.1.15";
    pub const SOURCE_REPOSITORY_OWNER_URI: &str = "1.3.6.1.4.1.57264.1.16";
    pub const SOURCE_REPOSITORY_OWNER_IDENTIFIER: &str = "1.3.6.1.4.1.57264.1.17";
    pub const BUILD_CONFIG_URI: &str = "1.3.6.1.4.1.57264.1.18";
    pub const BUILD_CONFIG_DIGEST: &str = "1.3.6.1.4.1.57264.1.19";
    pub const BUILD_TRIGGER: &str = "1.3.6.1.4.1.57264.1.20";
    pub const RUN_INVOCATION_URI: &str = "1.3.6.1.4.1.57264.1.21";
    pub const SOURCE_REPOSITORY_VISIBILITY: &str = "1.3.6.1.4.1.57264.1.22";

    pub(super) const SUBJECT_KEY_IDENTIFIER: &str = "2.5.29.14";
    pub(super) const KEY_USAGE: &str = "2.5.29.15";
    pub(super) const AUTHORITY_KEY_IDENTIFIER: &str = "2.5.29.35";
    pub(super) const EXTENDED_KEY_USAGE: &str = "2.5.29.37";

    pub(super) const V1_UTF8: &[&str] = &[
        ISSUER_V1,
        GITHUB_WORKFLOW_TRIGGER,
        GITHUB_WORKFLOW_SHA,
        GITHUB_WORKFLOW_NAME,
        GITHUB_WORKFLOW_REPOSITORY,
        GITHUB_WORKFLOW_REF,
    ];

    pub(super) const V2_DER_STRING: &[&str] = &[
        ISSUER_V2,
        BUILD_SIGNER_URI,
        BUILD_SIGNER_DIGEST,
        RUNNER_ENVIRONMENT,
        SOURCE_REPOSITORY_URI,
        SOURCE_REPOSITORY_DIGEST,
        SOURCE_REPOSITORY_REF,
        SOURCE_REPOSITORY_IDENTIFIER,
        SOURCE_REPOSITORY_OWNER_URI,
        SOURCE_REPOSITORY_OWNER_IDENTIFIER,
        BUILD_CONFIG_URI,
        BUILD_CONFIG_DIGEST,
        BUILD_TRIGGER,
        RUN_INVOCATION_URI,
        SOURCE_REPOSITORY_VISIBILITY,
    ];
}

const DEFAULT_ISSUER: &str = "https://token.actions.githubusercontent.com";

/// A declared Fulcio certificate identity.
///
/// Unset fields are not required. `Issuer` defaults to the GitHub Actions
/// OIDC issuer when no value is given.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FulcioIdentity {
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default, rename = "subject-alt-name")]
    pub subject_alt_name: Option<String>,

    #[serde(default, rename = "github-workflow-trigger")]
    pub github_workflow_trigger: Option<String>,
    #[serde(default, rename = "github-workflow-sha")]
    pub github_workflow_sha: Option<String>,
    #[serde(default, rename = "github-workflow-name")]
    pub github_workflow_name: Option<String>,
    #[serde(default, rename = "github-workflow-repository")]
    pub github_workflow_repository: Option<String>,
    #[serde(default, rename = "github-workflow-ref")]
    pub github_workflow_ref: Option<String>,

    #[serde(default, rename = "build-signer-uri")]
    pub build_signer_uri: Option<String>,
    #[serde(default, rename = "build-signer-digest")]
    pub build_signer_digest: Option<String>,
    #[serde(default, rename = "runner-environment")]
    pub runner_environment: Option<String>,
    #[serde(default, rename = "source-repository-uri")]
    pub source_repository_uri: Option<String>,
    #[serde(default, rename = "source-repository-digest")]
    pub source_repository_digest: Option<String>,
    #[serde(default, rename = "source-repository-ref")]
    pub source_repository_ref: Option<String>,
    #[serde(default, rename = "source-repository-identifier")]
    pub source_repository_identifier: Option<String>,
    #[serde(default, rename = "source-repository-owner-uri")]
    pub source_repository_owner_uri: Option<String>,
    #[serde(default, rename = "source-repository-owner-identifier")]
    pub source_repository_owner_identifier: Option<String>,
    #[serde(default, rename = "build-config-uri")]
    pub build_config_uri: Option<String>,
    #[serde(default, rename = "build-config-digest")]
    pub build_config_digest: Option<String>,
    #[serde(default, rename = "build-trigger")]
    pub build_trigger: Option<String>,
    #[serde(default, rename = "run-invocation-uri")]
    pub run_invocation_uri: Option<String>,
    #[serde(default, rename = "source-repository-visibility-at-signing")]
    pub source_repository_visibility: Option<String>,

    #[serde(default, rename = "issuer-pattern")]
    pub issuer_pattern: Option<String>,
    #[serde(default, rename = "subject-alt-name-pattern")]
    pub subject_alt_name_pattern: Option<String>,

    #[serde(default, rename = "github-workflow-trigger-pattern")]
    pub github_workflow_trigger_pattern: Option<String>,
    #[serde(default, rename = "github-workflow-sha-pattern")]
    pub github_workflow_sha_pattern: Option<String>,
    #[serde(default, rename = "github-workflow-name-pattern")]
    pub github_workflow_name_pattern: Option<String>,
    #[serde(default, rename = "github-workflow-repository-pattern")]
    pub github_workflow_repository_pattern: Option<String>,
    #[serde(default, rename = "github-workflow-ref-pattern")]
    pub github_workflow_ref_pattern: Option<String>,

    #[serde(default, rename = "build-signer-uri-pattern")]
    pub build_signer_uri_pattern: Option<String>,
    #[serde(default, rename = "build-signer-digest-pattern")]
    pub build_signer_digest_pattern: Option<String>,
    #[serde(default, rename = "runner-environment-pattern")]
    pub runner_environment_pattern: Option<String>,
    #[serde(default, rename = "source-repository-uri-pattern")]
    pub source_repository_uri_pattern: Option<String>,
    #[serde(default, rename = "source-repository-digest-pattern")]
    pub source_repository_digest_pattern: Option<String>,
    #[serde(default, rename = "source-repository-ref-pattern")]
    pub source_repository_ref_pattern: Option<String>,
    #[serde(default, rename = "source-repository-identifier-pattern")]
    pub source_repository_identifier_pattern: Option<String>,
    #[serde(default, rename = "source-repository-owner-uri-pattern")]
    pub source_repository_owner_uri_pattern: Option<String>,
    #[serde(default, rename = "source-repository-owner-identifier-pattern")]
    pub source_repository_owner_identifier_pattern: Option<String>,
    #[serde(default, rename = "build-config-uri-pattern")]
    pub build_config_uri_pattern: Option<String>,
    #[serde(default, rename = "build-config-digest-pattern")]
    pub build_config_digest_pattern: Option<String>,
    #[serde(default, rename = "build-trigger-pattern")]
    pub build_trigger_pattern: Option<String>,
    #[serde(default, rename = "run-invocation-uri-pattern")]
    pub run_invocation_uri_pattern: Option<String>,
    #[serde(default, rename = "source-repository-visibility-at-signing-pattern")]
    pub source_repository_visibility_pattern: Option<String>,
}

impl FulcioIdentity {
    /// Required literal values, keyed by dotted OID.
    pub(crate) fn values(&self) -> HashMap<String, String> {
        let mut ret = HashMap::new();

        ret.insert(
            oid::ISSUER_V1.to_string(),
            self.issuer.clone().unwrap_or_else(|| DEFAULT_ISSUER.to_string()),
        );

        let fields: &[(&str, &Option<String>)] = &[
            (oid::SAN, &self.subject_alt_name),
            (oid::GITHUB_WORKFLOW_TRIGGER, &self.github_workflow_trigger),
            (oid::GITHUB_WORKFLOW_SHA, &self.github_workflow_sha),
            (oid::GITHUB_WORKFLOW_NAME, &self.github_workflow_name),
            (
                oid::GITHUB_WORKFLOW_REPOSITORY,
                &self.github_workflow_repository,
            ),
            (oid::GITHUB_WORKFLOW_REF, &self.github_workflow_ref),
            (oid::BUILD_SIGNER_URI, &self.build_signer_uri),
            (oid::BUILD_SIGNER_DIGEST, &self.build_signer_digest),
            (oid::RUNNER_ENVIRONMENT, &self.runner_environment),
            (oid::SOURCE_REPOSITORY_URI, &self.source_repository_uri),
            (oid::SOURCE_REPOSITORY_DIGEST, &self.source_repository_digest),
            (oid::SOURCE_REPOSITORY_REF, &self.source_repository_ref),
            (
                oid::SOURCE_REPOSITORY_IDENTIFIER,
                &self.source_repository_identifier,
            ),
            (
                oid::SOURCE_REPOSITORY_OWNER_URI,
                &self.source_repository_owner_uri,
            ),
            (
                oid::SOURCE_REPOSITORY_OWNER_IDENTIFIER,
                &self.source_repository_owner_identifier,
            ),
            (oid::BUILD_CONFIG_URI, &self.build_config_uri),
            (oid::BUILD_CONFIG_DIGEST, &self.build_config_digest),
            (oid::BUILD_TRIGGER, &self.build_trigger),
            (oid::RUN_INVOCATION_URI, &self.run_invocation_uri),
            (
                oid::SOURCE_REPOSITORY_VISIBILITY,
                &self.source_repository_visibility,
            ),
        ];

        for (oid, value) in fields {
            if let Some(value) = value {
                ret.insert(oid.to_string(), value.clone());
            }
        }

        ret
    }

    /// Required regex matches, keyed by dotted OID.
    pub(crate) fn patterns(&self) -> Result<HashMap<String, Regex>> {
        let fields: &[(&str, &Option<String>)] = &[
            (oid::ISSUER_V1, &self.issuer_pattern),
            (oid::SAN, &self.subject_alt_name_pattern),
            (
                oid::GITHUB_WORKFLOW_TRIGGER,
                &self.github_workflow_trigger_pattern,
            ),
            (oid::GITHUB_WORKFLOW_SHA, &self.github_workflow_sha_pattern),
            (oid::GITHUB_WORKFLOW_NAME, &self.github_workflow_name_pattern),
            (
                oid::GITHUB_WORKFLOW_REPOSITORY,
                &self.github_workflow_repository_pattern,
            ),
            (oid::GITHUB_WORKFLOW_REF, &self.github_workflow_ref_pattern),
            (oid::BUILD_SIGNER_URI, &self.build_signer_uri_pattern),
            (oid::BUILD_SIGNER_DIGEST, &self.build_signer_digest_pattern),
            (oid::RUNNER_ENVIRONMENT, &self.runner_environment_pattern),
            (oid::SOURCE_REPOSITORY_URI, &self.source_repository_uri_pattern),
            (
                oid::SOURCE_REPOSITORY_DIGEST,
                &self.source_repository_digest_pattern,
            ),
            (oid::SOURCE_REPOSITORY_REF, &self.source_repository_ref_pattern),
            (
                oid::SOURCE_REPOSITORY_IDENTIFIER,
                &self.source_repository_identifier_pattern,
            ),
            (
                oid::SOURCE_REPOSITORY_OWNER_URI,
                &self.source_repository_owner_uri_pattern,
            ),
            (
                oid::SOURCE_REPOSITORY_OWNER_IDENTIFIER,
                &self.source_repository_owner_identifier_pattern,
            ),
            (oid::BUILD_CONFIG_URI, &self.build_config_uri_pattern),
            (oid::BUILD_CONFIG_DIGEST, &self.build_config_digest_pattern),
            (oid::BUILD_TRIGGER, &self.build_trigger_pattern),
            (oid::RUN_INVOCATION_URI, &self.run_invocation_uri_pattern),
            (
                oid::SOURCE_REPOSITORY_VISIBILITY,
                &self.source_repository_visibility_pattern,
            ),
        ];

        let mut ret = HashMap::new();
        for (oid, pattern) in fields {
            if let Some(pattern) = pattern {
                ret.insert(oid.to_string(), Regex::new(pattern)?);
            }
        }

        Ok(ret)
    }
}

/// Decode a Fulcio extension payload into its string value.
///
/// Returns `Ok(None)` for extensions that carry no identity material:
/// key identifiers, key usage, the SAN (matched against URI SANs
/// separately), and anything unknown.
pub(crate) fn decode_extension(oid: &str, value: &[u8]) -> Result<Option<String>> {
    if oid::V1_UTF8.contains(&oid) {
        return Ok(Some(String::from_utf8_lossy(value).into_owned()));
    }

    if oid::V2_DER_STRING.contains(&oid) {
        return Ok(Some(parse_der_string(value)?));
    }

    match oid {
        oid::SAN
        | oid::SUBJECT_KEY_IDENTIFIER
        | oid::KEY_USAGE
        | oid::AUTHORITY_KEY_IDENTIFIER
        | oid::EXTENDED_KEY_USAGE => {}
        other => warn!(oid = other, "unknown certificate extension"),
    }

    Ok(None)
}

/// Decode one DER TLV header, returning `(tag, content_range)`.
fn der_header(data: &[u8]) -> Result<(u8, std::ops::Range<usize>)> {
    let err = |msg: &str| DebcacheError::DerDecode(msg.to_string());

    if data.len() < 2 {
        return Err(err("truncated TLV"));
    }

    let tag = data[0];
    let first = data[1] as usize;

    let (length, header_len) = if first < 0x80 {
        (first, 2)
    } else {
        let num_bytes = first & 0x7f;
        if num_bytes == 0 || num_bytes > 4 || data.len() < 2 + num_bytes {
            return Err(err("unsupported TLV length"));
        }
        let mut length = 0usize;
        for byte in &data[2..2 + num_bytes] {
            length = (length << 8) | *byte as usize;
        }
        (length, 2 + num_bytes)
    };

    if data.len() < header_len + length {
        return Err(err("TLV overruns buffer"));
    }

    Ok((tag, header_len..header_len + length))
}

/// Decode a DER-encoded IA5String (or UTF8String) payload.
fn parse_der_string(data: &[u8]) -> Result<String> {
    let (tag, content) = der_header(data)?;

    match tag {
        // IA5String and UTF8String both hold the value bytes directly.
        0x16 | 0x0c => Ok(String::from_utf8_lossy(&data[content]).into_owned()),
        other => Err(DebcacheError::DerDecode(format!(
            "expected string tag, got 0x{:02x}",
            other
        ))),
    }
}

/// Extract URI SANs from a SubjectAltName extension payload.
///
/// The payload is a DER `GeneralNames` sequence; URIs are the
/// context-specific `[6]` members. Other name forms are skipped.
pub(crate) fn san_uris(extension_value: &[u8]) -> Result<Vec<String>> {
    let (tag, content) = der_header(extension_value)?;
    if tag != 0x30 {
        return Err(DebcacheError::DerDecode(format!(
            "expected GeneralNames sequence, got tag 0x{:02x}",
            tag
        )));
    }

    let mut uris = vec![];
    let mut rest = &extension_value[content];

    while !rest.is_empty() {
        let (tag, content) = der_header(rest)?;
        let end = content.end;

        // uniformResourceIdentifier is [6] IA5String, primitive.
        if tag == 0x86 {
            uris.push(String::from_utf8_lossy(&rest[content]).into_owned());
        }

        rest = &rest[end..];
    }

    Ok(uris)
}
