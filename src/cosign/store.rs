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

//! Access to the remote store holding the artifacts attached to images.

use async_trait::async_trait;
use oci_client::client::{Config, ImageLayer};
use oci_client::manifest::{OciDescriptor, OciManifest};
use tracing::{debug, info};

use super::constants::OCI_EMPTY_CONFIG_MEDIA_TYPE;
use super::signed_entity::{Artifact, ArtifactKind, SignedEntity};
use crate::errors::{Result, SigstoreError};
use crate::registry::{Auth, ClientCapabilities, ClientConfig, OciClient, OciReference};

/// Capabilities of the store holding images and their attached artifacts.
///
/// Every method may perform network I/O. Implementations must not retry:
/// transient failures are returned to the caller.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Resolve a tag-form reference to the digest it currently points to
    async fn resolve_digest(&self, image: &OciReference) -> Result<String>;

    /// List the artifacts attached to the digest-form reference `image`
    async fn signed_entity(&self, image: &OciReference) -> Result<SignedEntity>;

    /// Retrieve the data of an artifact listed at `location`
    async fn fetch_artifact(&self, location: &OciReference, artifact: &Artifact)
        -> Result<Vec<u8>>;

    /// Publish the collection of the given kind of `entity`
    async fn write(&self, entity: &SignedEntity, kind: ArtifactKind) -> Result<()>;

    async fn write_signatures(&self, entity: &SignedEntity) -> Result<()> {
        self.write(entity, ArtifactKind::Signature).await
    }

    async fn write_attestations(&self, entity: &SignedEntity) -> Result<()> {
        self.write(entity, ArtifactKind::Attestation).await
    }

    async fn write_sboms(&self, entity: &SignedEntity) -> Result<()> {
        self.write(entity, ArtifactKind::Sbom).await
    }
}

/// [`ArtifactStore`] backed by an OCI registry, following the cosign
/// storage conventions.
pub struct RegistryArtifactStore {
    registry_client: Box<dyn ClientCapabilities>,
    auth: Auth,
}

impl RegistryArtifactStore {
    /// Connect to the registries using the given configuration and credentials
    pub fn new(config: ClientConfig, auth: Auth) -> Self {
        let oci_client = oci_client::Client::new(config.into());
        Self::with_client(
            Box::new(OciClient {
                registry_client: oci_client,
            }),
            auth,
        )
    }

    pub(crate) fn with_client(registry_client: Box<dyn ClientCapabilities>, auth: Auth) -> Self {
        RegistryArtifactStore {
            registry_client,
            auth,
        }
    }

    async fn list(&self, location: &OciReference) -> Result<Vec<Artifact>> {
        let manifest = match self
            .registry_client
            .pull_manifest(&location.oci_reference, &(&self.auth).into())
            .await
        {
            Ok((manifest, _)) => manifest,
            Err(SigstoreError::RegistryManifestNotFoundError { .. }) => {
                debug!(location = %location, "no artifacts stored");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        match manifest {
            OciManifest::Image(image) => Ok(image
                .layers
                .into_iter()
                .map(|layer| {
                    Artifact::remote(
                        layer.media_type,
                        layer.digest,
                        layer.size,
                        layer.annotations.unwrap_or_default(),
                    )
                })
                .collect()),
            OciManifest::ImageIndex(_) => Err(SigstoreError::RegistryPullManifestError {
                image: location.whole(),
                error: "expected an image manifest, found an image index".into(),
            }),
        }
    }
}

#[async_trait]
impl ArtifactStore for RegistryArtifactStore {
    async fn resolve_digest(&self, image: &OciReference) -> Result<String> {
        self.registry_client
            .fetch_manifest_digest(&image.oci_reference, &(&self.auth).into())
            .await
    }

    async fn signed_entity(&self, image: &OciReference) -> Result<SignedEntity> {
        if !image.is_digest() {
            return Err(SigstoreError::OciReferenceNotValidError {
                reference: image.whole(),
            });
        }
        // the image itself must exist, regardless of its attached artifacts
        self.registry_client
            .fetch_manifest_digest(&image.oci_reference, &(&self.auth).into())
            .await?;

        let digest = image.digest().unwrap_or_default();
        let signatures = self
            .list(&image.artifact_location(digest, ArtifactKind::Signature))
            .await?;
        let attestations = self
            .list(&image.artifact_location(digest, ArtifactKind::Attestation))
            .await?;
        let sboms = self
            .list(&image.artifact_location(digest, ArtifactKind::Sbom))
            .await?;

        SignedEntity::new(image.clone(), signatures, attestations, sboms)
    }

    async fn fetch_artifact(
        &self,
        location: &OciReference,
        artifact: &Artifact,
    ) -> Result<Vec<u8>> {
        if let Some(data) = artifact.inline_data() {
            return Ok(data.to_vec());
        }
        let descriptor = OciDescriptor {
            media_type: artifact.media_type.clone(),
            digest: artifact.digest.clone(),
            size: artifact.size,
            ..Default::default()
        };
        self.registry_client
            .pull_blob(&location.oci_reference, &descriptor)
            .await
    }

    async fn write(&self, entity: &SignedEntity, kind: ArtifactKind) -> Result<()> {
        let collection = entity.collection(kind);
        let location = collection.location();

        let mut layers = Vec::with_capacity(collection.len());
        for artifact in collection.items() {
            let data = self.fetch_artifact(location, artifact).await?;
            layers.push(ImageLayer::new(
                data,
                artifact.media_type.clone(),
                Some(artifact.annotations.clone()),
            ));
        }
        let config = Config::new(
            b"{}".to_vec(),
            OCI_EMPTY_CONFIG_MEDIA_TYPE.to_string(),
            None,
        );

        let response = self
            .registry_client
            .push(&location.oci_reference, &layers, config, &(&self.auth).into())
            .await?;
        info!(
            location = %location,
            manifest = response.manifest_url.as_str(),
            layers = layers.len(),
            "published {kind}s"
        );
        Ok(())
    }
}
