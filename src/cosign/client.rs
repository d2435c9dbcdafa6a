//
// Copyright 2022 The Sigstore Authors.
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

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{
    cancellable, ArtifactFetcher, ArtifactStore, AttestationIngestor, AttestationPayload,
    CosignCapabilities, ReferenceResolver, ResolvedReference, SignedEntity, SignedPayload,
};
use crate::errors::Result;

/// Cosign Client
///
/// Instances of `Client` can be built via [`sigstore_attach::cosign::ClientBuilder`](crate::cosign::ClientBuilder).
pub struct Client {
    pub(crate) store: Arc<dyn ArtifactStore>,
    pub(crate) resolver: Arc<ReferenceResolver>,
    pub(crate) fetcher: ArtifactFetcher,
    pub(crate) ingestor: AttestationIngestor,
}

#[async_trait]
impl CosignCapabilities for Client {
    async fn resolve(
        &self,
        image: &str,
        expected_digest: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ResolvedReference> {
        self.resolver.resolve(image, expected_digest, cancel).await
    }

    async fn fetch_signatures_for_reference(
        &self,
        image: &str,
        expected_digest: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<SignedPayload>> {
        let entity = self.signed_entity(image, expected_digest, cancel).await?;
        self.fetcher.fetch_signatures(&entity, cancel).await
    }

    async fn fetch_attestations_for_reference(
        &self,
        image: &str,
        expected_digest: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<AttestationPayload>> {
        let entity = self.signed_entity(image, expected_digest, cancel).await?;
        self.fetcher.fetch_attestations(&entity, cancel).await
    }

    async fn attach_attestations(
        &self,
        image: &str,
        files: &[PathBuf],
        expected_digest: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        self.ingestor
            .attach(image, files, expected_digest, cancel)
            .await
    }
}

impl Client {
    /// Internal helper method used to list the artifacts attached to the
    /// digest `image` currently resolves to
    async fn signed_entity(
        &self,
        image: &str,
        expected_digest: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<SignedEntity> {
        let resolved = self
            .resolver
            .resolve(image, expected_digest, cancel)
            .await?;
        cancellable(cancel, self.store.signed_entity(resolved.pinned())).await
    }
}
