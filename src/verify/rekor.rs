// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Verify artifacts against the Rekor transparency log.

An artifact is trusted when the log holds an entry for its SHA-256 whose
inclusion proof verifies offline, whose signed entry timestamp verifies
against the log's public key, and whose embedded signing certificate
satisfies the declared [FulcioIdentity].

The REST models are written by hand against the Rekor API; the upstream
JSON schemas do not generate cleanly.
*/

use {
    super::{CertificateVerifier, FulcioIdentity, Verifier},
    crate::error::{DebcacheError, Result},
    async_trait::async_trait,
    base64::Engine,
    serde::{Deserialize, Serialize},
    sha2::{Digest, Sha256},
    std::collections::HashMap,
    tracing::debug,
    url::Url,
    x509_certificate::CapturedX509Certificate,
};

const DEFAULT_REKOR_URL: &str = "https://rekor.sigstore.dev/";

fn base64_decode(data: &str) -> Result<Vec<u8>> {
    Ok(base64::engine::general_purpose::STANDARD.decode(data)?)
}

/// A persisted log entry, as returned by `/api/v1/log/entries/{uuid}`.
#[derive(Clone, Debug, Deserialize)]
struct LogEntry {
    /// Base64 of the canonicalized entry body.
    body: String,
    #[serde(rename = "integratedTime")]
    integrated_time: i64,
    #[serde(rename = "logID")]
    log_id: String,
    #[serde(rename = "logIndex")]
    log_index: i64,
    verification: EntryVerification,
}

#[derive(Clone, Debug, Deserialize)]
struct EntryVerification {
    #[serde(rename = "inclusionProof")]
    inclusion_proof: Option<InclusionProof>,
    #[serde(rename = "signedEntryTimestamp")]
    signed_entry_timestamp: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
struct InclusionProof {
    hashes: Vec<String>,
    #[serde(rename = "logIndex")]
    log_index: u64,
    #[serde(rename = "rootHash")]
    root_hash: String,
    #[serde(rename = "treeSize")]
    tree_size: u64,
}

/// The payload covered by the signed entry timestamp.
///
/// Serialization order matches the canonical JSON form: keys sorted, no
/// whitespace.
#[derive(Serialize)]
struct SetPayload<'a> {
    body: &'a str,
    #[serde(rename = "integratedTime")]
    integrated_time: i64,
    #[serde(rename = "logID")]
    log_id: &'a str,
    #[serde(rename = "logIndex")]
    log_index: i64,
}

/// The decoded entry body: a kind tag selecting the spec shape.
#[derive(Debug, Deserialize)]
struct EntryBody {
    kind: String,
    spec: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct IntotoSpec {
    #[serde(rename = "publicKey")]
    public_key: String,
}

#[derive(Debug, Deserialize)]
struct HashedRekordSpec {
    signature: HashedRekordSignature,
}

#[derive(Debug, Deserialize)]
struct HashedRekordSignature {
    #[serde(rename = "publicKey")]
    public_key: HashedRekordPublicKey,
}

#[derive(Debug, Deserialize)]
struct HashedRekordPublicKey {
    content: String,
}

#[derive(Debug, Deserialize)]
struct DsseSpec {
    #[serde(default)]
    signatures: Vec<DsseSignature>,
}

#[derive(Debug, Deserialize)]
struct DsseSignature {
    verifier: String,
}

/// Extract the base64-encoded PEM signing materials from an entry body.
fn signing_materials(body: &EntryBody) -> Result<Vec<String>> {
    Ok(match body.kind.as_str() {
        "intoto" => {
            let spec: IntotoSpec = serde_json::from_value(body.spec.clone())?;
            vec![spec.public_key]
        }
        "hashedrekord" => {
            let spec: HashedRekordSpec = serde_json::from_value(body.spec.clone())?;
            vec![spec.signature.public_key.content]
        }
        "dsse" => {
            let spec: DsseSpec = serde_json::from_value(body.spec.clone())?;
            spec.signatures.into_iter().map(|s| s.verifier).collect()
        }
        other => return Err(DebcacheError::RekorEntryKind(other.to_string())),
    })
}

/// RFC 6962 leaf hash: `SHA-256(0x00 || data)`.
fn leaf_hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([0u8]);
    hasher.update(data);
    hasher.finalize().into()
}

/// RFC 6962 interior node hash: `SHA-256(0x01 || left || right)`.
fn node_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([1u8]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// RFC 9162 §2.1.3.2 inclusion proof check.
fn verify_inclusion(
    leaf_index: u64,
    tree_size: u64,
    leaf: [u8; 32],
    proof: &[[u8; 32]],
    root: &[u8; 32],
) -> bool {
    if leaf_index >= tree_size {
        return false;
    }

    let mut fnode = leaf_index;
    let mut snode = tree_size - 1;
    let mut hash = leaf;

    for sibling in proof {
        if snode == 0 {
            return false;
        }

        if fnode & 1 == 1 || fnode == snode {
            hash = node_hash(sibling, &hash);
            if fnode & 1 == 0 {
                while fnode & 1 == 0 && fnode != 0 {
                    fnode >>= 1;
                    snode >>= 1;
                }
            }
        } else {
            hash = node_hash(&hash, sibling);
        }

        fnode >>= 1;
        snode >>= 1;
    }

    snode == 0 && hash == *root
}

/// Pull the uncompressed EC point out of a DER SubjectPublicKeyInfo.
///
/// ring verifies against the raw point, not the SPKI wrapper. A P-256
/// point is the trailing `04 || X || Y` run of the BIT STRING.
fn spki_ec_point(spki_der: &[u8]) -> Result<&[u8]> {
    const BIT_STRING_PREFIX: &[u8] = &[0x03, 0x42, 0x00, 0x04];

    let start = spki_der
        .windows(BIT_STRING_PREFIX.len())
        .position(|window| window == BIT_STRING_PREFIX)
        .ok_or_else(|| DebcacheError::DerDecode("no P-256 point in SPKI".to_string()))?;

    let point = &spki_der[start + 3..];
    if point.len() != 65 {
        return Err(DebcacheError::DerDecode(format!(
            "unexpected EC point length {}",
            point.len()
        )));
    }

    Ok(point)
}

/// Verifies artifacts against a Rekor transparency log.
pub struct RekorVerifier {
    client: reqwest::Client,
    base_url: Url,
    /// DER SPKI of the log's signing key.
    log_key: Vec<u8>,
    certificate: CertificateVerifier,
}

impl RekorVerifier {
    /// Construct against the public-good Rekor instance.
    ///
    /// Fetches the log's public key once so later entry verification is
    /// fully offline.
    pub async fn new(identity: &FulcioIdentity) -> Result<Self> {
        Self::with_base_url(identity, Url::parse(DEFAULT_REKOR_URL)?).await
    }

    /// Construct against a specific Rekor deployment.
    pub async fn with_base_url(identity: &FulcioIdentity, base_url: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("debcache/1.0")
            .build()?;

        let pem_text = client
            .get(base_url.join("api/v1/log/publicKey")?)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let log_key = pem::parse(pem_text.as_bytes())?.into_contents();

        Ok(Self {
            client,
            base_url,
            log_key,
            certificate: CertificateVerifier::new(identity)?,
        })
    }

    async fn find_entries(&self, digest: &str) -> Result<Vec<String>> {
        let mut query = HashMap::new();
        query.insert("hash", digest);

        Ok(self
            .client
            .post(self.base_url.join("api/v1/index/retrieve")?)
            .json(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    async fn verify_entry(&self, version: &str, entry_uuid: &str) -> Result<bool> {
        let entries: HashMap<String, LogEntry> = self
            .client
            .get(
                self.base_url
                    .join(&format!("api/v1/log/entries/{}", entry_uuid))?,
            )
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        for entry in entries.values() {
            self.verify_entry_offline(entry)?;

            let body = base64_decode(&entry.body)?;
            let body: EntryBody = serde_json::from_slice(&body)?;

            for material in signing_materials(&body)? {
                let pem_text = base64_decode(&material)?;
                let cert = CapturedX509Certificate::from_pem(&pem_text)?;

                if self.certificate.verify(version, &cert)? {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    /// Offline checks: inclusion proof and signed entry timestamp.
    fn verify_entry_offline(&self, entry: &LogEntry) -> Result<()> {
        let malformed = |msg: &str| DebcacheError::RekorEntryMalformed(msg.to_string());

        let proof = entry
            .verification
            .inclusion_proof
            .as_ref()
            .ok_or_else(|| malformed("entry lacks inclusion proof"))?;
        let set = entry
            .verification
            .signed_entry_timestamp
            .as_ref()
            .ok_or_else(|| malformed("entry lacks signed entry timestamp"))?;

        let body = base64_decode(&entry.body)?;
        let leaf = leaf_hash(&body);

        let mut hashes = Vec::with_capacity(proof.hashes.len());
        for hash in &proof.hashes {
            let decoded: [u8; 32] = hex::decode(hash)?
                .try_into()
                .map_err(|_| malformed("inclusion proof hash is not 32 bytes"))?;
            hashes.push(decoded);
        }
        let root: [u8; 32] = hex::decode(&proof.root_hash)?
            .try_into()
            .map_err(|_| malformed("root hash is not 32 bytes"))?;

        if !verify_inclusion(proof.log_index, proof.tree_size, leaf, &hashes, &root) {
            return Err(malformed("inclusion proof does not verify"));
        }

        let payload = serde_json::to_vec(&SetPayload {
            body: &entry.body,
            integrated_time: entry.integrated_time,
            log_id: &entry.log_id,
            log_index: entry.log_index,
        })?;
        let signature = base64_decode(set)?;

        let key = ring::signature::UnparsedPublicKey::new(
            &ring::signature::ECDSA_P256_SHA256_ASN1,
            spki_ec_point(&self.log_key)?,
        );
        key.verify(&payload, &signature)
            .map_err(|_| malformed("signed entry timestamp does not verify"))?;

        Ok(())
    }
}

#[async_trait]
impl Verifier for RekorVerifier {
    async fn verify(&self, version: &str, artifact: &[u8]) -> Result<bool> {
        let digest = format!("sha256:{}", hex::encode(Sha256::digest(artifact)));

        let entries = self.find_entries(&digest).await?;
        if entries.is_empty() {
            debug!(%digest, "no transparency log entry found");
            return Ok(false);
        }
        debug!(%digest, count = entries.len(), "transparency log entries found");

        for entry_uuid in &entries {
            if self.verify_entry(version, entry_uuid).await? {
                debug!(%digest, %entry_uuid, "entry verified");
                return Ok(true);
            }
        }

        debug!(%digest, "no entry could be verified");
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inclusion_proof_two_leaves() {
        let a = leaf_hash(b"leaf a");
        let b = leaf_hash(b"leaf b");
        let root = node_hash(&a, &b);

        assert!(verify_inclusion(0, 2, a, &[b], &root));
        assert!(verify_inclusion(1, 2, b, &[a], &root));
        assert!(!verify_inclusion(0, 2, b, &[a], &root));
        assert!(!verify_inclusion(2, 2, a, &[b], &root));
    }

    #[test]
    fn inclusion_proof_three_leaves() {
        let a = leaf_hash(b"a");
        let b = leaf_hash(b"b");
        let c = leaf_hash(b"c");
        let ab = node_hash(&a, &b);
        let root = node_hash(&ab, &c);

        assert!(verify_inclusion(0, 3, a, &[b, c], &root));
        assert!(verify_inclusion(1, 3, b, &[a, c], &root));
        assert!(verify_inclusion(2, 3, c, &[ab], &root));
        assert!(!verify_inclusion(2, 3, c, &[a], &root));
    }

    #[test]
    fn set_payload_is_canonical_json() {
        let payload = SetPayload {
            body: "Zm9v",
            integrated_time: 1700000000,
            log_id: "c0ffee",
            log_index: 42,
        };

        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"body":"Zm9v","integratedTime":1700000000,"logID":"c0ffee","logIndex":42}"#
        );
    }

    #[test]
    fn signing_materials_by_kind() -> Result<()> {
        let intoto: EntryBody = serde_json::from_str(
            r#"{"kind":"intoto","apiVersion":"0.0.2","spec":{"publicKey":"cGVt"}}"#,
        )?;
        assert_eq!(signing_materials(&intoto)?, vec!["cGVt".to_string()]);

        let hashedrekord: EntryBody = serde_json::from_str(
            r#"{"kind":"hashedrekord","apiVersion":"0.0.1","spec":{"signature":{"publicKey":{"content":"cGVt"}}}}"#,
        )?;
        assert_eq!(signing_materials(&hashedrekord)?, vec!["cGVt".to_string()]);

        let dsse: EntryBody = serde_json::from_str(
            r#"{"kind":"dsse","apiVersion":"0.0.1","spec":{"signatures":[{"verifier":"cGVt","signature":"c2ln"}]}}"#,
        )?;
        assert_eq!(signing_materials(&dsse)?, vec!["cGVt".to_string()]);

        let unknown: EntryBody =
            serde_json::from_str(r#"{"kind":"rpm","apiVersion":"0.0.1","spec":{}}"#)?;
        assert!(matches!(
            signing_materials(&unknown),
            Err(DebcacheError::RekorEntryKind(_))
        ));

        Ok(())
    }

    #[test]
    fn spki_point_extraction() {
        let mut spki = vec![0x30, 0x59, 0x30, 0x13, 0x06, 0x07];
        spki.extend_from_slice(&[0u8; 12]);
        spki.extend_from_slice(&[0x03, 0x42, 0x00, 0x04]);
        spki.extend_from_slice(&[0xab; 64]);

        let point = spki_ec_point(&spki).unwrap();
        assert_eq!(point.len(), 65);
        assert_eq!(point[0], 0x04);

        assert!(spki_ec_point(&[0x30, 0x10, 0x00]).is_err());
    }
}
