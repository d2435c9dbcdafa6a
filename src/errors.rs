//
// Copyright 2021 The Sigstore Authors.
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

//! The errors that can be raised by sigstore-attach

use std::path::PathBuf;

use thiserror::Error;

use crate::cosign::ArtifactKind;

pub type Result<T> = std::result::Result<T, SigstoreError>;

#[derive(Error, Debug)]
pub enum SigstoreError {
    #[error("OCI reference not valid: {reference}")]
    OciReferenceNotValidError { reference: String },

    #[error("digest mismatch for {reference}: expected {expected}, got {actual}")]
    DigestMismatch {
        reference: String,
        expected: String,
        actual: String,
    },

    #[error("no {kind}s associated with {image}")]
    NoArtifacts { kind: ArtifactKind, image: String },

    #[error("cannot decode {kind} #{index}: {reason}")]
    DecodeFailure {
        kind: ArtifactKind,
        index: usize,
        reason: String,
    },

    #[error("cannot fetch {kind} #{index}: {source}")]
    ArtifactFetchError {
        kind: ArtifactKind,
        index: usize,
        #[source]
        source: Box<SigstoreError>,
    },

    #[error("{}: document #{document}: malformed envelope: {reason}", path.display())]
    MalformedEnvelope {
        path: PathBuf,
        document: usize,
        reason: String,
    },

    #[error("{}: document #{document}: invalid payloadType {found} on envelope. Expected {expected}", path.display())]
    UnsupportedPayloadType {
        path: PathBuf,
        document: usize,
        found: String,
        expected: String,
    },

    #[error("{}: document #{document}: could not attach attestation without having signatures", path.display())]
    UnsignedAttestation { path: PathBuf, document: usize },

    #[error("cannot read {}: {source}", path.display())]
    ReadFileError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot fetch manifest of {image}: {error}")]
    RegistryFetchManifestError { image: String, error: String },

    #[error("Cannot pull manifest of {image}: {error}")]
    RegistryPullManifestError { image: String, error: String },

    #[error("Manifest of {image} not found")]
    RegistryManifestNotFoundError { image: String },

    #[error("Cannot pull blob {digest} of {image}: {error}")]
    RegistryPullBlobError {
        image: String,
        digest: String,
        error: String,
    },

    #[error("Cannot push {image}: {error}")]
    RegistryPushError { image: String, error: String },

    #[error("operation canceled")]
    Canceled,

    #[error(transparent)]
    JoinError(#[from] tokio::task::JoinError),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::error::Error),

    #[error("{0}")]
    UnexpectedError(String),
}

impl SigstoreError {
    /// Whether the error has been raised while talking with the remote
    /// artifact store, as opposed to a local validation or decoding problem.
    pub fn is_remote_store_error(&self) -> bool {
        match self {
            SigstoreError::ArtifactFetchError { source, .. } => source.is_remote_store_error(),
            err => matches!(
                err,
                SigstoreError::RegistryFetchManifestError { .. }
                    | SigstoreError::RegistryPullManifestError { .. }
                    | SigstoreError::RegistryManifestNotFoundError { .. }
                    | SigstoreError::RegistryPullBlobError { .. }
                    | SigstoreError::RegistryPushError { .. }
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_errors_are_classified_as_remote() {
        let err = SigstoreError::RegistryPushError {
            image: "registry.lan/busybox:sha256-abc.att".into(),
            error: "denied".into(),
        };
        assert!(err.is_remote_store_error());

        let err = SigstoreError::UnsignedAttestation {
            path: PathBuf::from("att.json"),
            document: 2,
        };
        assert!(!err.is_remote_store_error());
    }

    #[test]
    fn messages_identify_the_offending_item() {
        let err = SigstoreError::DecodeFailure {
            kind: ArtifactKind::Attestation,
            index: 3,
            reason: "expected value".into(),
        };
        assert_eq!(
            err.to_string(),
            "cannot decode attestation #3: expected value"
        );

        let err = SigstoreError::UnsupportedPayloadType {
            path: PathBuf::from("/tmp/att.json"),
            document: 0,
            found: "text/plain".into(),
            expected: "application/vnd.in-toto+json".into(),
        };
        assert!(err.to_string().contains("/tmp/att.json"));
        assert!(err.to_string().contains("text/plain"));
    }

    #[test]
    fn fetch_errors_keep_the_store_error() {
        let err = SigstoreError::ArtifactFetchError {
            kind: ArtifactKind::Signature,
            index: 1,
            source: Box::new(SigstoreError::RegistryPullBlobError {
                image: "registry.lan/busybox:sha256-abc.sig".into(),
                digest: "sha256:abc".into(),
                error: "connection reset".into(),
            }),
        };
        assert!(err.is_remote_store_error());
        assert!(err.to_string().starts_with("cannot fetch signature #1: "));
        assert!(err.to_string().contains("connection reset"));

        let err = SigstoreError::ArtifactFetchError {
            kind: ArtifactKind::Attestation,
            index: 0,
            source: Box::new(SigstoreError::Canceled),
        };
        assert!(!err.is_remote_store_error());
    }
}
