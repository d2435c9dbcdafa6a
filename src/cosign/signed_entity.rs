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

//! Immutable view over the artifacts cosign attaches to an image.
//!
//! A [`SignedEntity`] is keyed by a pinned digest and exposes three independent
//! collections: signatures, attestations and SBOMs. Attaching a new artifact
//! never touches the original entity; it returns a new one sharing every
//! unmodified collection with the original.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use super::constants::{
    ATTESTATION_TAG_SUFFIX, DSSE_PAYLOAD_TYPE, SBOM_TAG_SUFFIX, SIGNATURE_TAG_SUFFIX,
    SIGSTORE_SIGNATURE_ANNOTATION,
};
use crate::errors::{Result, SigstoreError};
use crate::registry::OciReference;

/// The kinds of artifacts that can be attached to an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactKind {
    Signature,
    Attestation,
    Sbom,
}

impl ArtifactKind {
    /// Suffix of the tag cosign uses to store this kind of artifact
    pub fn tag_suffix(&self) -> &'static str {
        match self {
            ArtifactKind::Signature => SIGNATURE_TAG_SUFFIX,
            ArtifactKind::Attestation => ATTESTATION_TAG_SUFFIX,
            ArtifactKind::Sbom => SBOM_TAG_SUFFIX,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactKind::Signature => "signature",
            ArtifactKind::Attestation => "attestation",
            ArtifactKind::Sbom => "sbom",
        };
        write!(f, "{name}")
    }
}

/// One artifact layer.
///
/// Artifacts listed from a remote store only carry their descriptor; the data is
/// retrieved on demand through [`ArtifactStore::fetch_artifact`](crate::cosign::ArtifactStore::fetch_artifact).
/// Artifacts built locally (e.g. a new attestation) carry their data inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub media_type: String,
    pub digest: String,
    pub size: i64,
    pub annotations: BTreeMap<String, String>,
    data: Option<Vec<u8>>,
}

impl Artifact {
    /// Build the descriptor of an artifact whose data lives in the remote store
    pub fn remote(
        media_type: impl Into<String>,
        digest: impl Into<String>,
        size: i64,
        annotations: BTreeMap<String, String>,
    ) -> Self {
        Artifact {
            media_type: media_type.into(),
            digest: digest.into(),
            size,
            annotations,
            data: None,
        }
    }

    /// Build an artifact from local data, computing its sha256 digest
    pub fn new(
        media_type: impl Into<String>,
        data: Vec<u8>,
        annotations: BTreeMap<String, String>,
    ) -> Self {
        Artifact {
            media_type: media_type.into(),
            digest: sha256_digest(&data),
            size: data.len() as i64,
            annotations,
            data: Some(data),
        }
    }

    /// Wrap a serialized DSSE envelope into an attestation artifact.
    ///
    /// Cosign stores attestations with an empty signature annotation: the
    /// signatures live inside of the envelope.
    pub fn new_attestation(envelope: Vec<u8>) -> Self {
        let annotations = BTreeMap::from([(
            SIGSTORE_SIGNATURE_ANNOTATION.to_string(),
            String::new(),
        )]);
        Artifact::new(DSSE_PAYLOAD_TYPE, envelope, annotations)
    }

    /// Data carried inline, if any
    pub fn inline_data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Ensure `data` is the content addressed by this artifact.
    ///
    /// Only sha256 digests are checked; other algorithms are accepted as they are.
    pub fn verify_data(&self, data: &[u8]) -> Result<()> {
        if !self.digest.starts_with("sha256:") {
            return Ok(());
        }
        let actual = sha256_digest(data);
        if actual != self.digest {
            return Err(SigstoreError::UnexpectedError(format!(
                "layer digest mismatch: expected {}, got {actual}",
                self.digest
            )));
        }
        Ok(())
    }
}

pub(crate) fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

/// Ordered, immutable list of artifacts of one kind.
///
/// Cloning a collection is cheap: the items are shared.
#[derive(Debug, Clone)]
pub struct ArtifactCollection {
    kind: ArtifactKind,
    location: OciReference,
    items: Arc<[Artifact]>,
}

impl ArtifactCollection {
    pub fn new(kind: ArtifactKind, location: OciReference, items: Vec<Artifact>) -> Self {
        ArtifactCollection {
            kind,
            location,
            items: items.into(),
        }
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Reference of the tag holding this collection
    pub fn location(&self) -> &OciReference {
        &self.location
    }

    /// The artifacts, in listing order
    pub fn items(&self) -> &[Artifact] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn appended(&self, artifact: Artifact) -> Self {
        let mut items = Vec::with_capacity(self.items.len() + 1);
        items.extend(self.items.iter().cloned());
        items.push(artifact);
        ArtifactCollection::new(self.kind, self.location.clone(), items)
    }

    fn shares_items_with(&self, other: &ArtifactCollection) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }
}

/// An image digest paired with the artifacts attached to it
#[derive(Debug, Clone)]
pub struct SignedEntity {
    image: OciReference,
    signatures: ArtifactCollection,
    attestations: ArtifactCollection,
    sboms: ArtifactCollection,
}

impl SignedEntity {
    /// Build an entity for the digest-form reference `image`.
    pub fn new(
        image: OciReference,
        signatures: Vec<Artifact>,
        attestations: Vec<Artifact>,
        sboms: Vec<Artifact>,
    ) -> Result<Self> {
        let digest = image
            .digest()
            .ok_or_else(|| SigstoreError::OciReferenceNotValidError {
                reference: image.whole(),
            })?
            .to_string();
        let collection = |kind, items| {
            ArtifactCollection::new(kind, image.artifact_location(&digest, kind), items)
        };
        Ok(SignedEntity {
            signatures: collection(ArtifactKind::Signature, signatures),
            attestations: collection(ArtifactKind::Attestation, attestations),
            sboms: collection(ArtifactKind::Sbom, sboms),
            image,
        })
    }

    /// The pinned, digest-form reference of the image
    pub fn image(&self) -> &OciReference {
        &self.image
    }

    pub fn digest(&self) -> &str {
        // checked at construction time
        self.image.digest().unwrap_or_default()
    }

    pub fn signatures(&self) -> &ArtifactCollection {
        &self.signatures
    }

    pub fn attestations(&self) -> &ArtifactCollection {
        &self.attestations
    }

    pub fn sboms(&self) -> &ArtifactCollection {
        &self.sboms
    }

    pub fn collection(&self, kind: ArtifactKind) -> &ArtifactCollection {
        match kind {
            ArtifactKind::Signature => &self.signatures,
            ArtifactKind::Attestation => &self.attestations,
            ArtifactKind::Sbom => &self.sboms,
        }
    }

    /// Return a new entity with `artifact` appended to the collection of the
    /// given kind. `self` is left untouched.
    pub fn attach(&self, kind: ArtifactKind, artifact: Artifact) -> SignedEntity {
        let mut entity = self.clone();
        let collection = match kind {
            ArtifactKind::Signature => &mut entity.signatures,
            ArtifactKind::Attestation => &mut entity.attestations,
            ArtifactKind::Sbom => &mut entity.sboms,
        };
        *collection = collection.appended(artifact);
        entity
    }

    pub fn attach_signature(&self, artifact: Artifact) -> SignedEntity {
        self.attach(ArtifactKind::Signature, artifact)
    }

    pub fn attach_attestation(&self, artifact: Artifact) -> SignedEntity {
        self.attach(ArtifactKind::Attestation, artifact)
    }

    pub fn attach_sbom(&self, artifact: Artifact) -> SignedEntity {
        self.attach(ArtifactKind::Sbom, artifact)
    }

    /// Whether the collection of the given kind is the very same one held by `other`
    pub fn shares_collection(&self, other: &SignedEntity, kind: ArtifactKind) -> bool {
        self.collection(kind).shares_items_with(other.collection(kind))
    }
}
