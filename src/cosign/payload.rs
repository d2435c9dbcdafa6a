//
// Copyright 2025 The Sigstore Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Decoded forms of the artifacts attached to an image.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64_STD_ENGINE, Engine as _};
use serde::{ser::Error as _, Deserialize, Serialize, Serializer};
use x509_cert::der::{Decode, Encode};
use x509_cert::Certificate;

use super::bundle::RekorBundle;
use super::constants::{
    SIGSTORE_BUNDLE_ANNOTATION, SIGSTORE_CERT_ANNOTATION, SIGSTORE_CHAIN_ANNOTATION,
    SIGSTORE_SIGNATURE_ANNOTATION,
};
use super::envelope::null_as_default;
use super::signed_entity::Artifact;
use crate::errors::{Result, SigstoreError};

/// One signature attached to an image, decoded from its layer
#[derive(Clone, PartialEq)]
pub struct SignedPayload {
    pub base64_signature: String,
    pub payload: Vec<u8>,
    pub cert: Option<Certificate>,
    pub chain: Vec<Certificate>,
    pub bundle: Option<RekorBundle>,
}

impl fmt::Debug for SignedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedPayload")
            .field("base64_signature", &self.base64_signature)
            .field("payload", &String::from_utf8_lossy(&self.payload))
            .field("cert", &self.cert.is_some())
            .field("chain", &self.chain.len())
            .field("bundle", &self.bundle)
            .finish()
    }
}

impl SignedPayload {
    /// Decode a signature layer.
    ///
    /// `data` must be the content addressed by `artifact`. The signature, the
    /// certificates and the Rekor bundle are taken from the layer annotations.
    pub fn decode(artifact: &Artifact, data: Vec<u8>) -> Result<Self> {
        artifact.verify_data(&data)?;
        let annotations = &artifact.annotations;

        let base64_signature = annotations
            .get(SIGSTORE_SIGNATURE_ANNOTATION)
            .cloned()
            .ok_or_else(|| {
                SigstoreError::UnexpectedError(format!(
                    "missing {SIGSTORE_SIGNATURE_ANNOTATION} annotation"
                ))
            })?;
        BASE64_STD_ENGINE
            .decode(&base64_signature)
            .map_err(|e| SigstoreError::UnexpectedError(format!("invalid signature: {e}")))?;

        let cert = match non_empty(annotations, SIGSTORE_CERT_ANNOTATION) {
            Some(raw) => Some(parse_pem_certificate(raw)?),
            None => None,
        };
        let chain = match non_empty(annotations, SIGSTORE_CHAIN_ANNOTATION) {
            Some(raw) => parse_pem_chain(raw)?,
            None => Vec::new(),
        };
        let bundle = match non_empty(annotations, SIGSTORE_BUNDLE_ANNOTATION) {
            Some(raw) => Some(serde_json::from_str(raw).map_err(|e| {
                SigstoreError::UnexpectedError(format!("invalid Rekor bundle: {e}"))
            })?),
            None => None,
        };

        Ok(SignedPayload {
            base64_signature,
            payload: data,
            cert,
            chain,
            bundle,
        })
    }
}

fn non_empty<'a>(annotations: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    annotations
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.trim().is_empty())
}

fn parse_pem_certificate(raw: &str) -> Result<Certificate> {
    let pem = pem::parse(raw)
        .map_err(|e| SigstoreError::UnexpectedError(format!("invalid certificate PEM: {e}")))?;
    Certificate::from_der(pem.contents())
        .map_err(|e| SigstoreError::UnexpectedError(format!("invalid certificate: {e}")))
}

fn parse_pem_chain(raw: &str) -> Result<Vec<Certificate>> {
    let pems = pem::parse_many(raw)
        .map_err(|e| SigstoreError::UnexpectedError(format!("invalid chain PEM: {e}")))?;
    pems.iter()
        .map(|pem| {
            Certificate::from_der(pem.contents()).map_err(|e| {
                SigstoreError::UnexpectedError(format!("invalid chain certificate: {e}"))
            })
        })
        .collect()
}

fn certificate_to_pem(cert: &Certificate) -> std::result::Result<String, x509_cert::der::Error> {
    let der = cert.to_der()?;
    Ok(pem::encode(&pem::Pem::new("CERTIFICATE", der)))
}

/// JSON representation used when printing signatures
impl Serialize for SignedPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Printable<'a> {
            base64_signature: &'a str,
            payload: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            cert: Option<String>,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            chain: Vec<String>,
            #[serde(rename = "rekorBundle", skip_serializing_if = "Option::is_none")]
            bundle: Option<&'a RekorBundle>,
        }

        let cert = self
            .cert
            .as_ref()
            .map(certificate_to_pem)
            .transpose()
            .map_err(S::Error::custom)?;
        let chain = self
            .chain
            .iter()
            .map(certificate_to_pem)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(S::Error::custom)?;

        Printable {
            base64_signature: &self.base64_signature,
            payload: BASE64_STD_ENGINE.encode(&self.payload),
            cert,
            chain,
            bundle: self.bundle.as_ref(),
        }
        .serialize(serializer)
    }
}

/// A signature inside of an attestation
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Signatures {
    #[serde(default)]
    pub keyid: String,
    pub sig: String,
}

/// One attestation attached to an image, decoded from its layer
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AttestationPayload {
    #[serde(rename = "payloadType")]
    pub payload_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub payload: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub signatures: Vec<Signatures>,
}

impl AttestationPayload {
    /// Decode an attestation layer. `data` must be the content addressed by `artifact`.
    pub fn decode(artifact: &Artifact, data: &[u8]) -> Result<Self> {
        artifact.verify_data(data)?;
        Ok(serde_json::from_slice(data)?)
    }
}

/// A signature produced by cosign and stored on the local filesystem
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LocalSignedPayload {
    #[serde(rename = "base64Signature")]
    pub base64_signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert: Option<String>,
    #[serde(
        rename = "rekorBundle",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub bundle: Option<RekorBundle>,
}

/// Read a [`LocalSignedPayload`] from a JSON file
pub fn fetch_local_signed_payload_from_path(path: impl AsRef<Path>) -> Result<LocalSignedPayload> {
    let path = path.as_ref();
    let contents =
        std::fs::read(path).map_err(|source| SigstoreError::ReadFileError {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(serde_json::from_slice(&contents)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cosign::constants::{DSSE_PAYLOAD_TYPE, SIGSTORE_OCI_MEDIA_TYPE};
    use rstest::rstest;
    use serde_json::json;
    use std::io::Write;

    pub(crate) const CERT_PEM: &str = r#"-----BEGIN CERTIFICATE-----
MIICdzCCAfygAwIBAgITA+PsaKjaEZqn7IY94b1e/jJnizAKBggqhkjOPQQDAzAq
MRUwEwYDVQQKEwxzaWdzdG9yZS5kZXYxETAPBgNVBAMTCHNpZ3N0b3JlMB4XDTIx
MTAyMDA3MjUxNloXDTIxMTAyMDA3NDUxNVowADBZMBMGByqGSM49AgEGCCqGSM49
AwEHA0IABINewQBS1f4AmNIENdL+U/HJotMSM7ZNnkTnYefxwV9TErpvnAZ0+DzL
yfAAVaeJtKjFvbOTb8F1yhJFU0XY+RijggEpMIIBJTAOBgNVHQ8BAf8EBAMCB4Aw
EwYDVR0lBAwwCgYIKwYBBQUHAwMwDAYDVR0TAQH/BAIwADAdBgNVHQ4EFgQUMf1R
MMsqNFBrWbx8mRNdxOkEEYswHwYDVR0jBBgwFoAUyMUdAEGaJCkyUSTrDa5K7UoG
0+wwgY0GCCsGAQUFBwEBBIGAMH4wfAYIKwYBBQUHMAKGcGh0dHA6Ly9wcml2YXRl
Y2EtY29udGVudC02MDNmZTdlNy0wMDAwLTIyMjctYmY3NS1mNGY1ZTgwZDI5NTQu
c3RvcmFnZS5nb29nbGVhcGlzLmNvbS9jYTM2YTFlOTYyNDJiOWZjYjE0Ni9jYS5j
cnQwIAYDVR0RAQH/BBYwFIESZmxhdmlvQGNhc3RlbGxpLm1lMAoGCCqGSM49BAMD
A2kAMGYCMQC3Y2ulPTsPmNS4czaKeje0BnOQHz5e6NBX0Bqx9Xca+t2kOi17sopc
/v/xH1xLuPoCMQDKND4WjHfKqXXOeUvZ9A96DqrEwGaqGMtnIuN4JzZYaULZrx9g
oXqqo/C9QnOHTto=
-----END CERTIFICATE-----"#;

    fn signature_artifact(annotations: &[(&str, &str)]) -> (Artifact, Vec<u8>) {
        let data = br#"{"critical":{"identity":{"docker-reference":"busybox"}}}"#.to_vec();
        let annotations = annotations
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let artifact = Artifact::new(SIGSTORE_OCI_MEDIA_TYPE, data.clone(), annotations);
        (artifact, data)
    }

    #[test]
    fn decode_signature_with_certificate_and_bundle() {
        let bundle = json!({
            "SignedEntryTimestamp": "MEUCIDx9M+yRpD0O47/Mzm8NAPCbtqy4uiTkLWWexW0bo4jZAiEA1wwueIW8XzJWNkut5y9snYj7UOfbMmUXp7fH3CzJmWg=",
            "Payload": {
                "body": "eyJhcGlWZXJzaW9uIjoiMC4wLjEifQ==",
                "integratedTime": 1634714717,
                "logIndex": 783607,
                "logID": "c0d23d6ad406973f9559f3ba2d1ca01f84147d8ffc5b8445c224f98b9591801d"
            }
        })
        .to_string();
        let (artifact, data) = signature_artifact(&[
            (SIGSTORE_SIGNATURE_ANNOTATION, "c2lnbmF0dXJl"),
            (SIGSTORE_CERT_ANNOTATION, CERT_PEM),
            (SIGSTORE_CHAIN_ANNOTATION, CERT_PEM),
            (SIGSTORE_BUNDLE_ANNOTATION, &bundle),
        ]);

        let payload = SignedPayload::decode(&artifact, data.clone()).expect("cannot decode");

        assert_eq!(payload.base64_signature, "c2lnbmF0dXJl");
        assert_eq!(payload.payload, data);
        assert!(payload.cert.is_some());
        assert_eq!(payload.chain.len(), 1);
        assert_eq!(payload.bundle.map(|b| b.payload.log_index), Some(783607));
    }

    #[test]
    fn decode_signature_without_optional_fields() {
        let (artifact, data) = signature_artifact(&[
            (SIGSTORE_SIGNATURE_ANNOTATION, "c2lnbmF0dXJl"),
            (SIGSTORE_CERT_ANNOTATION, ""),
        ]);
        let payload = SignedPayload::decode(&artifact, data).expect("cannot decode");
        assert!(payload.cert.is_none());
        assert!(payload.chain.is_empty());
        assert!(payload.bundle.is_none());

        let printed = serde_json::to_value(&payload).unwrap();
        assert_eq!(printed["base64Signature"], "c2lnbmF0dXJl");
        assert_eq!(printed["payload"], BASE64_STD_ENGINE.encode(&payload.payload));
        assert!(printed.get("cert").is_none());
        assert!(printed.get("rekorBundle").is_none());
    }

    #[test]
    fn decode_signature_failures() {
        let (artifact, data) = signature_artifact(&[]);
        assert!(SignedPayload::decode(&artifact, data).is_err());

        let (artifact, data) =
            signature_artifact(&[(SIGSTORE_SIGNATURE_ANNOTATION, "not base64!")]);
        assert!(SignedPayload::decode(&artifact, data).is_err());

        let (artifact, data) = signature_artifact(&[
            (SIGSTORE_SIGNATURE_ANNOTATION, "c2lnbmF0dXJl"),
            (
                SIGSTORE_CERT_ANNOTATION,
                "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----",
            ),
        ]);
        assert!(SignedPayload::decode(&artifact, data).is_err());

        let (artifact, _) = signature_artifact(&[(SIGSTORE_SIGNATURE_ANNOTATION, "c2lnbmF0dXJl")]);
        assert!(SignedPayload::decode(&artifact, b"tampered".to_vec()).is_err());
    }

    #[test]
    fn decode_attestation() {
        let data = json!({
            "payloadType": "application/vnd.in-toto+json",
            "payload": "eyJfdHlwZSI6Imh0dHBzOi8vaW4tdG90by5pby9TdGF0ZW1lbnQvdjAuMSJ9",
            "signatures": [{"keyid": "", "sig": "MEUCIQ=="}]
        })
        .to_string()
        .into_bytes();
        let artifact = Artifact::new(DSSE_PAYLOAD_TYPE, data.clone(), BTreeMap::new());

        let attestation = AttestationPayload::decode(&artifact, &data).expect("cannot decode");
        assert_eq!(attestation.payload_type, "application/vnd.in-toto+json");
        assert_eq!(
            attestation.signatures,
            vec![Signatures {
                keyid: String::new(),
                sig: "MEUCIQ==".into()
            }]
        );

        let artifact = Artifact::new(DSSE_PAYLOAD_TYPE, b"not json".to_vec(), BTreeMap::new());
        assert!(AttestationPayload::decode(&artifact, b"not json").is_err());
    }

    #[rstest]
    #[case(json!({"payloadType": "application/vnd.in-toto+json", "payload": "e30="}))]
    #[case(json!({
        "payloadType": "application/vnd.in-toto+json",
        "payload": "e30=",
        "signatures": null
    }))]
    fn decode_attestation_without_signatures(#[case] value: serde_json::Value) {
        let data = value.to_string().into_bytes();
        let artifact = Artifact::new(DSSE_PAYLOAD_TYPE, data.clone(), BTreeMap::new());

        let attestation = AttestationPayload::decode(&artifact, &data).expect("cannot decode");
        assert_eq!(attestation.payload, "e30=");
        assert!(attestation.signatures.is_empty());
    }

    #[test]
    fn local_signed_payload_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"base64Signature":"c2lnbmF0dXJl","cert":"{}"}}"#,
            CERT_PEM.replace('\n', "\\n")
        )
        .unwrap();

        let local = fetch_local_signed_payload_from_path(file.path()).expect("cannot read");
        assert_eq!(local.base64_signature, "c2lnbmF0dXJl");
        assert_eq!(local.cert.as_deref(), Some(CERT_PEM));
        assert!(local.bundle.is_none());

        let err = fetch_local_signed_payload_from_path("/does/not/exist.json").unwrap_err();
        assert!(matches!(err, SigstoreError::ReadFileError { .. }));
    }
}
