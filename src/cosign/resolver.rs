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

//! Turn user supplied image references into digest-form references.
//!
//! Every artifact read or write must happen against the digest returned by
//! [`ReferenceResolver::resolve`], never against the tag the user typed: the
//! owner of a registry can move a tag at any time.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::cancellable;
use super::store::ArtifactStore;
use crate::errors::{Result, SigstoreError};
use crate::registry::OciReference;
use crate::ui::Diagnostics;

/// The outcome of a resolution: what the user asked for, and what is
/// going to be operated on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReference {
    original: OciReference,
    pinned: OciReference,
}

impl ResolvedReference {
    /// The reference as parsed from user input
    pub fn original(&self) -> &OciReference {
        &self.original
    }

    /// The digest-form reference every store operation must use
    pub fn pinned(&self) -> &OciReference {
        &self.pinned
    }

    pub fn digest(&self) -> &str {
        // pinned references are built from a digest
        self.pinned.digest().unwrap_or_default()
    }
}

pub struct ReferenceResolver {
    store: Arc<dyn ArtifactStore>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl ReferenceResolver {
    pub fn new(store: Arc<dyn ArtifactStore>, diagnostics: Arc<dyn Diagnostics>) -> Self {
        ReferenceResolver { store, diagnostics }
    }

    /// Resolve `raw` to a digest-form reference.
    ///
    /// A digest-form input is used as it is, without contacting the store.
    /// A tag-form input is resolved with exactly one store lookup.
    ///
    /// When `expected_digest` is provided, the obtained digest must match it,
    /// otherwise [`SigstoreError::DigestMismatch`] is returned.
    ///
    /// When the digest depends only on a live tag lookup, an advisory is sent
    /// to the diagnostics sink. The resolution still succeeds.
    pub async fn resolve(
        &self,
        raw: &str,
        expected_digest: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ResolvedReference> {
        let original: OciReference = raw.trim().parse()?;
        let expected = expected_digest.map(normalize_digest).transpose()?;

        let digest = match original.digest() {
            Some(digest) => digest.to_ascii_lowercase(),
            None => cancellable(cancel, self.store.resolve_digest(&original))
                .await?
                .to_ascii_lowercase(),
        };

        if let Some(expected) = expected.as_deref() {
            if expected != digest {
                return Err(SigstoreError::DigestMismatch {
                    reference: original.whole(),
                    expected: expected.to_string(),
                    actual: digest,
                });
            }
        } else if !original.is_digest() {
            self.diagnostics.warn(&tag_reference_message(raw.trim()));
        }

        let pinned = original.pin(&digest);
        debug!(reference = %original, pinned = %pinned, "reference resolved");
        Ok(ResolvedReference { original, pinned })
    }
}

fn tag_reference_message(reference: &str) -> String {
    format!(
        "Image reference {reference} uses a tag, not a digest, to identify the image to operate on.\n    \
         The tag can be pointed to a different image at any time, so artifacts may end up attached \
         to an image other than the one intended.\n    \
         Pin the image with a digest (e.g. {reference}@sha256:<hex>) or pass --digest to avoid this race."
    )
}

/// Normalize a user supplied digest to the `<algorithm>:<hex>` form.
///
/// A bare 64 characters hex string is taken as a sha256 digest.
pub fn normalize_digest(input: &str) -> Result<String> {
    let digest = input.trim().to_ascii_lowercase();
    let invalid = || SigstoreError::OciReferenceNotValidError {
        reference: input.to_string(),
    };

    if digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok(format!("sha256:{digest}"));
    }

    let (algorithm, hex) = digest.split_once(':').ok_or_else(invalid)?;
    let valid_algorithm = !algorithm.is_empty()
        && algorithm
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '_' | '-'));
    let valid_hex = !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit());
    if !valid_algorithm || !valid_hex {
        return Err(invalid());
    }
    Ok(digest)
}
