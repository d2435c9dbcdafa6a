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

use crate::cosign::ArtifactKind;
use crate::errors::SigstoreError;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// `OciReference` provides a general type to represent any way of referencing images within an OCI registry.
///
/// A reference is either in *tag form* (`registry/repo:tag`), which is mutable and can be
/// reassigned by the registry owner at any time, or in *digest form* (`registry/repo@sha256:...`),
/// which identifies immutable content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OciReference {
    pub(crate) oci_reference: oci_client::Reference,
}

impl FromStr for OciReference {
    type Err = SigstoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<oci_client::Reference>()
            .map_err(|_| SigstoreError::OciReferenceNotValidError {
                reference: s.to_string(),
            })
            .map(|oci_reference| OciReference { oci_reference })
    }
}

impl From<oci_client::Reference> for OciReference {
    fn from(oci_reference: oci_client::Reference) -> Self {
        OciReference { oci_reference }
    }
}

impl OciReference {
    /// Create a Reference with a registry, repository and tag.
    pub fn with_tag(registry: String, repository: String, tag: String) -> Self {
        OciReference {
            oci_reference: oci_client::Reference::with_tag(registry, repository, tag),
        }
    }

    /// Create a Reference with a registry, repository and digest.
    pub fn with_digest(registry: String, repository: String, digest: String) -> Self {
        OciReference {
            oci_reference: oci_client::Reference::with_digest(registry, repository, digest),
        }
    }

    /// registry returns the name of the registry.
    pub fn registry(&self) -> &str {
        self.oci_reference.registry()
    }

    /// resolve_registry returns the host serving the registry, mapping
    /// `docker.io` to the Docker Hub endpoint.
    pub fn resolve_registry(&self) -> &str {
        self.oci_reference.resolve_registry()
    }

    /// repository returns the name of the repository
    pub fn repository(&self) -> &str {
        self.oci_reference.repository()
    }

    /// digest returns the object's digest, if present.
    pub fn digest(&self) -> Option<&str> {
        self.oci_reference.digest()
    }

    /// tag returns the object's tag, if present.
    pub fn tag(&self) -> Option<&str> {
        self.oci_reference.tag()
    }

    /// whole returns the whole reference.
    pub fn whole(&self) -> String {
        self.oci_reference.whole()
    }

    /// Whether the reference identifies immutable content.
    pub fn is_digest(&self) -> bool {
        self.digest().is_some()
    }

    /// The digest-form reference to `digest` inside of the same repository.
    pub fn pin(&self, digest: &str) -> OciReference {
        OciReference::with_digest(
            self.registry().to_string(),
            self.repository().to_string(),
            digest.to_string(),
        )
    }

    /// Location where cosign keeps the artifacts of the given kind that are
    /// attached to `digest`: `<registry>/<repository>:<alg>-<hex>.<suffix>`.
    pub fn artifact_location(&self, digest: &str, kind: ArtifactKind) -> OciReference {
        OciReference::with_tag(
            self.registry().to_string(),
            self.repository().to_string(),
            format!("{}{}", digest.replace(':', "-"), kind.tag_suffix()),
        )
    }
}

impl Display for OciReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.oci_reference.fmt(f)
    }
}
