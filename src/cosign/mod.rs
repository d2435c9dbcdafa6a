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

//! Structs managing the artifacts cosign attaches to container images
//!
//! The artifacts can be handled using [`sigstore_attach::cosign::Client`](crate::cosign::client::Client).
//! Instances of this struct can be created via the [`sigstore_attach::cosign::ClientBuilder`](crate::cosign::client_builder::ClientBuilder).
//!
//! ## What is currently supported
//!
//!   * Resolve an image reference to a digest, optionally checking it against
//!     an expected one
//!   * Fetch the signatures and the attestations attached to an image
//!   * Attach the in-toto attestations stored inside of local files
//!
//! Verifying signatures and attestations is not in the scope of this crate:
//! the fetched payloads are returned as they are.
//!
//! ## Digest pinning
//!
//! Every read and write of artifacts is done against the digest of the image,
//! never against a tag. Tags are resolved right before each operation, and a
//! warning is emitted when nothing but a live tag lookup backs the digest.
//!
//! ## Unit testing inside of our own libraries
//!
//! In case you want to mock sigstore interactions inside of your own code, you
//! can implement the [`CosignCapabilities`] trait inside of your test suite, or
//! build a [`Client`] on top of an [`InMemoryArtifactStore`].

use std::future::Future;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::{Result, SigstoreError};

pub mod bundle;
pub(crate) mod constants;
pub use constants::{DSSE_PAYLOAD_TYPE, INTOTO_PAYLOAD_TYPE};

pub mod signed_entity;
pub use signed_entity::{Artifact, ArtifactCollection, ArtifactKind, SignedEntity};

pub mod store;
pub use store::{ArtifactStore, RegistryArtifactStore};

pub mod memory_store;
pub use memory_store::InMemoryArtifactStore;

pub mod resolver;
pub use resolver::{normalize_digest, ReferenceResolver, ResolvedReference};

pub mod payload;
pub use payload::{
    fetch_local_signed_payload_from_path, AttestationPayload, LocalSignedPayload, SignedPayload,
};

pub mod envelope;
pub use envelope::{Envelope, EnvelopeStream};

pub mod fetch;
pub use fetch::ArtifactFetcher;

pub mod attach;
pub use attach::AttestationIngestor;

pub mod client;
pub use self::client::Client;

pub mod client_builder;
pub use self::client_builder::ClientBuilder;

/// Run `fut` unless `cancel` is triggered first. A canceled future is dropped,
/// not awaited.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SigstoreError::Canceled),
        res = fut => res,
    }
}

#[async_trait]
/// Cosign Abilities that have to be implemented by a
/// Cosign client
pub trait CosignCapabilities {
    /// Resolve `image` to a digest-form reference.
    ///
    /// When `expected_digest` is given, the digest obtained from the reference
    /// or from the registry must match it.
    async fn resolve(
        &self,
        image: &str,
        expected_digest: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ResolvedReference>;

    /// Returns every signature attached to `image`, in the order they are
    /// stored. The call fails when a single signature cannot be retrieved or
    /// decoded.
    ///
    /// `expected_digest` is checked the same way [`CosignCapabilities::resolve`] does.
    async fn fetch_signatures_for_reference(
        &self,
        image: &str,
        expected_digest: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<SignedPayload>>;

    /// Returns every attestation attached to `image`, in the order they are
    /// stored. The call fails when a single attestation cannot be retrieved or
    /// decoded.
    async fn fetch_attestations_for_reference(
        &self,
        image: &str,
        expected_digest: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<AttestationPayload>>;

    /// Attach the attestations stored inside of `files` to `image`.
    ///
    /// Each file holds one or more DSSE envelopes carrying an in-toto
    /// statement. Returns the number of published attestations.
    async fn attach_attestations(
        &self,
        image: &str,
        files: &[PathBuf],
        expected_digest: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<usize>;
}
