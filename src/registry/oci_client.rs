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

use super::{ClientCapabilities, PushResponse};
use crate::errors::{Result, SigstoreError};

use async_trait::async_trait;
use oci_client::errors::{OciDistributionError, OciErrorCode};

/// Internal client for an OCI Registry. This performs actual
/// calls against the remote registry.
///
/// For testing purposes, use instead the client inside of the
/// `mock_client` module.
pub(crate) struct OciClient {
    pub registry_client: oci_client::Client,
}

/// Registries answer a missing tag either with a plain 404 or with a
/// `MANIFEST_UNKNOWN` error envelope.
fn is_manifest_unknown(error: &OciDistributionError) -> bool {
    match error {
        OciDistributionError::ImageManifestNotFoundError(_) => true,
        OciDistributionError::RegistryError { envelope, .. } => envelope
            .errors
            .iter()
            .any(|e| matches!(e.code, OciErrorCode::ManifestUnknown)),
        _ => false,
    }
}

#[async_trait]
impl ClientCapabilities for OciClient {
    async fn fetch_manifest_digest(
        &self,
        image: &oci_client::Reference,
        auth: &oci_client::secrets::RegistryAuth,
    ) -> Result<String> {
        self.registry_client
            .fetch_manifest_digest(image, auth)
            .await
            .map_err(|e| SigstoreError::RegistryFetchManifestError {
                image: image.whole(),
                error: e.to_string(),
            })
    }

    async fn pull_manifest(
        &self,
        image: &oci_client::Reference,
        auth: &oci_client::secrets::RegistryAuth,
    ) -> Result<(oci_client::manifest::OciManifest, String)> {
        self.registry_client
            .pull_manifest(image, auth)
            .await
            .map_err(|e| {
                if is_manifest_unknown(&e) {
                    SigstoreError::RegistryManifestNotFoundError {
                        image: image.whole(),
                    }
                } else {
                    SigstoreError::RegistryPullManifestError {
                        image: image.whole(),
                        error: e.to_string(),
                    }
                }
            })
    }

    async fn pull_blob(
        &self,
        image: &oci_client::Reference,
        descriptor: &oci_client::manifest::OciDescriptor,
    ) -> Result<Vec<u8>> {
        let mut data: Vec<u8> = Vec::new();
        self.registry_client
            .pull_blob(image, descriptor, &mut data)
            .await
            .map_err(|e| SigstoreError::RegistryPullBlobError {
                image: image.whole(),
                digest: descriptor.digest.clone(),
                error: e.to_string(),
            })?;
        Ok(data)
    }

    async fn push(
        &self,
        image_ref: &oci_client::Reference,
        layers: &[oci_client::client::ImageLayer],
        config: oci_client::client::Config,
        auth: &oci_client::secrets::RegistryAuth,
    ) -> Result<PushResponse> {
        self.registry_client
            .push(image_ref, layers, config, auth, None)
            .await
            .map(PushResponse::from)
            .map_err(|e| SigstoreError::RegistryPushError {
                image: image_ref.whole(),
                error: e.to_string(),
            })
    }
}
