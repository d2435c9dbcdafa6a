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

//! Attach local in-toto attestations to an image.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::cancellable;
use super::constants::INTOTO_PAYLOAD_TYPE;
use super::envelope::{Envelope, EnvelopeStream};
use super::resolver::ReferenceResolver;
use super::signed_entity::Artifact;
use super::store::ArtifactStore;
use crate::errors::{Result, SigstoreError};
use crate::registry::OciReference;

/// Publishes the attestations stored inside of local files.
///
/// Ingestion is not transactional. Each document is published as soon as it
/// has been validated. When a document is rejected the file is not processed
/// any further, while the documents that preceded it stay published.
///
/// Publishing appends: ingesting the same file twice attaches every
/// attestation twice.
pub struct AttestationIngestor {
    resolver: Arc<ReferenceResolver>,
    store: Arc<dyn ArtifactStore>,
}

impl AttestationIngestor {
    pub fn new(resolver: Arc<ReferenceResolver>, store: Arc<dyn ArtifactStore>) -> Self {
        AttestationIngestor { resolver, store }
    }

    /// Attach every attestation found inside of `files` to `image_ref`.
    ///
    /// `image_ref` is resolved again for each document, so that a tag moved
    /// during a long run is noticed. Returns the number of published
    /// attestations.
    pub async fn attach<P: AsRef<Path>>(
        &self,
        image_ref: &str,
        files: &[P],
        expected_digest: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        // reject a malformed reference before touching any file
        image_ref.trim().parse::<OciReference>()?;

        let mut published = 0;
        for file in files {
            let path = file.as_ref();
            info!(path = %path.display(), "Using payload from");

            let mut stream = EnvelopeStream::open(path)?;
            loop {
                let document = stream.position();
                let Some(envelope) = stream.next() else {
                    break;
                };
                let envelope = envelope?;
                validate(&envelope, path, document)?;
                self.publish(image_ref, &envelope, expected_digest, cancel)
                    .await?;
                debug!(path = %path.display(), document, "attestation published");
                published += 1;
            }
        }
        Ok(published)
    }

    async fn publish(
        &self,
        image_ref: &str,
        envelope: &Envelope,
        expected_digest: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let resolved = self
            .resolver
            .resolve(image_ref, expected_digest, cancel)
            .await?;

        let attestation = Artifact::new_attestation(serde_json::to_vec(envelope)?);

        let entity = cancellable(cancel, self.store.signed_entity(resolved.pinned())).await?;
        let mutated = entity.attach_attestation(attestation);
        cancellable(cancel, self.store.write_attestations(&mutated)).await
    }
}

fn validate(envelope: &Envelope, path: &Path, document: usize) -> Result<()> {
    if envelope.payload_type != INTOTO_PAYLOAD_TYPE {
        return Err(SigstoreError::UnsupportedPayloadType {
            path: path.to_path_buf(),
            document,
            found: envelope.payload_type.clone(),
            expected: INTOTO_PAYLOAD_TYPE.to_string(),
        });
    }
    if envelope.signatures.is_empty() {
        return Err(SigstoreError::UnsignedAttestation {
            path: path.to_path_buf(),
            document,
        });
    }
    Ok(())
}
