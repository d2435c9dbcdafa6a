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

//! In-memory [`ArtifactStore`], meant to be used inside of test suites.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::signed_entity::{Artifact, ArtifactKind, SignedEntity};
use super::store::ArtifactStore;
use crate::errors::{Result, SigstoreError};
use crate::registry::OciReference;

#[derive(Default)]
struct State {
    /// `registry/repository:tag` -> digest
    tags: HashMap<String, String>,
    /// `registry/repository@digest`
    images: HashSet<String>,
    artifacts: HashMap<(String, ArtifactKind), Vec<Artifact>>,
    blobs: HashMap<String, Vec<u8>>,
    fetch_delays: HashMap<String, Duration>,
}

/// Store keeping images, tags and artifacts in memory.
///
/// Besides the [`ArtifactStore`] capabilities, it counts the calls it receives
/// and can delay the retrieval of single artifacts, which makes it possible to
/// observe how callers interact with a remote store.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    state: Mutex<State>,
    resolve_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    write_calls: AtomicUsize,
}

fn repository_key(image: &OciReference) -> String {
    format!("{}/{}", image.registry(), image.repository())
}

fn image_key(image: &OciReference, digest: &str) -> String {
    format!("{}@{digest}", repository_key(image))
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the image `digest` inside of the repository of `image`. When
    /// `image` has a tag, the tag is pointed to `digest`.
    pub fn add_image(&self, image: &OciReference, digest: &str) {
        let mut state = self.state();
        state.images.insert(image_key(image, digest));
        if let Some(tag) = image.tag() {
            state
                .tags
                .insert(format!("{}:{tag}", repository_key(image)), digest.to_string());
        }
    }

    /// Store an artifact attached to the digest-form reference `image`
    pub fn add_artifact(
        &self,
        image: &OciReference,
        kind: ArtifactKind,
        media_type: &str,
        data: Vec<u8>,
        annotations: BTreeMap<String, String>,
    ) -> Artifact {
        let artifact = Artifact::new(media_type, data, annotations);
        let digest = image.digest().unwrap_or_default().to_string();
        let mut state = self.state();
        state.store(image_key(image, &digest), kind, &artifact);
        artifact
    }

    /// Delay every retrieval of the artifact with the given digest
    pub fn set_fetch_delay(&self, artifact_digest: &str, delay: Duration) {
        self.state()
            .fetch_delays
            .insert(artifact_digest.to_string(), delay);
    }

    /// The artifacts of the given kind currently attached to `image`
    pub fn artifacts(&self, image: &OciReference, kind: ArtifactKind) -> Vec<Artifact> {
        let digest = image.digest().unwrap_or_default();
        self.state()
            .artifacts
            .get(&(image_key(image, digest), kind))
            .cloned()
            .unwrap_or_default()
    }

    /// The stored data of an artifact
    pub fn blob(&self, artifact_digest: &str) -> Option<Vec<u8>> {
        self.state().blobs.get(artifact_digest).cloned()
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }
}

impl State {
    fn store(&mut self, key: String, kind: ArtifactKind, artifact: &Artifact) {
        if let Some(data) = artifact.inline_data() {
            self.blobs.insert(artifact.digest.clone(), data.to_vec());
        }
        let descriptor = Artifact::remote(
            artifact.media_type.clone(),
            artifact.digest.clone(),
            artifact.size,
            artifact.annotations.clone(),
        );
        self.artifacts.entry((key, kind)).or_default().push(descriptor);
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn resolve_digest(&self, image: &OciReference) -> Result<String> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(digest) = image.digest() {
            return Ok(digest.to_string());
        }
        let tag = image.tag().unwrap_or("latest");
        self.state()
            .tags
            .get(&format!("{}:{tag}", repository_key(image)))
            .cloned()
            .ok_or_else(|| SigstoreError::RegistryFetchManifestError {
                image: image.whole(),
                error: "manifest unknown".into(),
            })
    }

    async fn signed_entity(&self, image: &OciReference) -> Result<SignedEntity> {
        let digest = image
            .digest()
            .ok_or_else(|| SigstoreError::OciReferenceNotValidError {
                reference: image.whole(),
            })?;
        let key = image_key(image, digest);
        let state = self.state();
        if !state.images.contains(&key) {
            return Err(SigstoreError::RegistryManifestNotFoundError {
                image: image.whole(),
            });
        }
        let collection = |kind| {
            state
                .artifacts
                .get(&(key.clone(), kind))
                .cloned()
                .unwrap_or_default()
        };
        SignedEntity::new(
            image.clone(),
            collection(ArtifactKind::Signature),
            collection(ArtifactKind::Attestation),
            collection(ArtifactKind::Sbom),
        )
    }

    async fn fetch_artifact(
        &self,
        location: &OciReference,
        artifact: &Artifact,
    ) -> Result<Vec<u8>> {
        if let Some(data) = artifact.inline_data() {
            return Ok(data.to_vec());
        }
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state().fetch_delays.get(&artifact.digest).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state()
            .blobs
            .get(&artifact.digest)
            .cloned()
            .ok_or_else(|| SigstoreError::RegistryPullBlobError {
                image: location.whole(),
                digest: artifact.digest.clone(),
                error: "blob unknown".into(),
            })
    }

    async fn write(&self, entity: &SignedEntity, kind: ArtifactKind) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let key = image_key(entity.image(), entity.digest());
        let mut state = self.state();
        if !state.images.contains(&key) {
            return Err(SigstoreError::RegistryPushError {
                image: entity.collection(kind).location().whole(),
                error: "image unknown".into(),
            });
        }
        state.artifacts.remove(&(key.clone(), kind));
        for artifact in entity.collection(kind).items() {
            state.store(key.clone(), kind, artifact);
        }
        Ok(())
    }
}
