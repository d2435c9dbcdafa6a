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

//! Concurrent retrieval of the artifacts attached to an image.
//!
//! A fetch either returns every artifact of the collection, decoded and in
//! listing order, or fails. Partial results are never returned.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::available_parallelism;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::payload::{AttestationPayload, SignedPayload};
use super::signed_entity::{Artifact, ArtifactKind, SignedEntity};
use super::store::ArtifactStore;
use crate::errors::{Result, SigstoreError};

/// Number of workers used when none is configured
pub fn default_parallelism() -> usize {
    available_parallelism().map(|n| n.get()).unwrap_or(4)
}

type FirstError = Arc<Mutex<Option<SigstoreError>>>;

/// Record `error` unless another one has been recorded before
fn record_error(first_error: &FirstError, error: SigstoreError) {
    let mut slot = first_error.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_none() {
        *slot = Some(error);
    }
}

fn has_error(first_error: &FirstError) -> bool {
    first_error
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .is_some()
}

pub struct ArtifactFetcher {
    store: Arc<dyn ArtifactStore>,
    parallelism: usize,
}

impl ArtifactFetcher {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        ArtifactFetcher {
            store,
            parallelism: default_parallelism(),
        }
    }

    /// Limit the number of artifacts retrieved at the same time
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Retrieve and decode every signature attached to `entity`
    pub async fn fetch_signatures(
        &self,
        entity: &SignedEntity,
        cancel: &CancellationToken,
    ) -> Result<Vec<SignedPayload>> {
        self.fetch(entity, ArtifactKind::Signature, cancel, SignedPayload::decode)
            .await
    }

    /// Retrieve and decode every attestation attached to `entity`
    pub async fn fetch_attestations(
        &self,
        entity: &SignedEntity,
        cancel: &CancellationToken,
    ) -> Result<Vec<AttestationPayload>> {
        self.fetch(
            entity,
            ArtifactKind::Attestation,
            cancel,
            |artifact: &Artifact, data: Vec<u8>| AttestationPayload::decode(artifact, &data),
        )
        .await
    }

    async fn fetch<T, F>(
        &self,
        entity: &SignedEntity,
        kind: ArtifactKind,
        cancel: &CancellationToken,
        decode: F,
    ) -> Result<Vec<T>>
    where
        T: Send + 'static,
        F: Fn(&Artifact, Vec<u8>) -> Result<T> + Copy + Send + Sync + 'static,
    {
        let collection = entity.collection(kind);
        if collection.is_empty() {
            return Err(SigstoreError::NoArtifacts {
                kind,
                image: entity.image().whole(),
            });
        }
        debug!(
            location = %collection.location(),
            items = collection.len(),
            workers = self.parallelism,
            "fetching {kind}s"
        );

        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let first_error: FirstError = Arc::default();
        let mut tasks = JoinSet::new();

        for (index, artifact) in collection.items().iter().cloned().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(SigstoreError::Canceled);
                }
                permit = Arc::clone(&semaphore).acquire_owned() => permit
                    .map_err(|e| SigstoreError::UnexpectedError(e.to_string()))?,
            };
            if has_error(&first_error) {
                break;
            }

            let store = Arc::clone(&self.store);
            let location = collection.location().clone();
            let first_error = Arc::clone(&first_error);
            tasks.spawn(async move {
                let _permit = permit;
                if has_error(&first_error) {
                    return None;
                }
                let decoded = match store.fetch_artifact(&location, &artifact).await {
                    Ok(data) => decode(&artifact, data).map_err(|e| SigstoreError::DecodeFailure {
                        kind,
                        index,
                        reason: e.to_string(),
                    }),
                    Err(e) => Err(SigstoreError::ArtifactFetchError {
                        kind,
                        index,
                        source: Box::new(e),
                    }),
                };
                match decoded {
                    Ok(value) => Some((index, value)),
                    Err(e) => {
                        record_error(&first_error, e);
                        None
                    }
                }
            });
        }

        let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None)
            .take(collection.len())
            .collect();
        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(SigstoreError::Canceled);
                }
                joined = tasks.join_next() => joined,
            };
            match joined {
                None => break,
                Some(Ok(Some((index, value)))) => slots[index] = Some(value),
                // the failure has been recorded, in-flight requests are abandoned
                Some(Ok(None)) => {
                    tasks.abort_all();
                }
                Some(Err(e)) if e.is_cancelled() => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }

        let recorded = first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(error) = recorded {
            return Err(error);
        }

        slots
            .into_iter()
            .collect::<Option<Vec<T>>>()
            .ok_or_else(|| SigstoreError::UnexpectedError(format!("incomplete {kind} fetch")))
    }
}
