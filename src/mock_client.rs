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

#[cfg(test)]
pub(crate) mod test {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use oci_client::{
        client::{Config, ImageLayer},
        manifest::{OciDescriptor, OciManifest},
        secrets::RegistryAuth,
        Reference,
    };

    use crate::errors::{Result, SigstoreError};
    use crate::registry::PushResponse;

    /// A single push received by the mock
    pub struct PushedImage {
        pub reference: String,
        pub layers: Vec<ImageLayer>,
        pub config: Config,
    }

    /// Registry client returning canned responses.
    ///
    /// Manifests and blobs are keyed by the whole reference and by digest;
    /// lookups of unknown manifests fail with `RegistryManifestNotFoundError`.
    #[derive(Default)]
    pub struct MockOciClient {
        pub fetch_manifest_digest_response: HashMap<String, String>,
        pub pull_manifest_response: HashMap<String, OciManifest>,
        pub pull_blob_response: HashMap<String, Vec<u8>>,
        pub push_error: Option<String>,
        pub pushed: Arc<Mutex<Vec<PushedImage>>>,
    }

    #[async_trait]
    impl crate::registry::ClientCapabilities for MockOciClient {
        async fn fetch_manifest_digest(
            &self,
            image: &Reference,
            _auth: &RegistryAuth,
        ) -> Result<String> {
            self.fetch_manifest_digest_response
                .get(&image.whole())
                .cloned()
                .ok_or_else(|| SigstoreError::RegistryFetchManifestError {
                    image: image.whole(),
                    error: "no fetch_manifest_digest_response provided".into(),
                })
        }

        async fn pull_manifest(
            &self,
            image: &Reference,
            _auth: &RegistryAuth,
        ) -> Result<(OciManifest, String)> {
            self.pull_manifest_response
                .get(&image.whole())
                .cloned()
                .map(|m| (m, String::from("sha256:manifest")))
                .ok_or_else(|| SigstoreError::RegistryManifestNotFoundError {
                    image: image.whole(),
                })
        }

        async fn pull_blob(
            &self,
            image: &Reference,
            descriptor: &OciDescriptor,
        ) -> Result<Vec<u8>> {
            self.pull_blob_response
                .get(&descriptor.digest)
                .cloned()
                .ok_or_else(|| SigstoreError::RegistryPullBlobError {
                    image: image.whole(),
                    digest: descriptor.digest.clone(),
                    error: "no pull_blob_response provided".into(),
                })
        }

        async fn push(
            &self,
            image_ref: &Reference,
            layers: &[ImageLayer],
            config: Config,
            _auth: &RegistryAuth,
        ) -> Result<PushResponse> {
            if let Some(error) = &self.push_error {
                return Err(SigstoreError::RegistryPushError {
                    image: image_ref.whole(),
                    error: error.clone(),
                });
            }
            self.pushed
                .lock()
                .map_err(|e| SigstoreError::UnexpectedError(e.to_string()))?
                .push(PushedImage {
                    reference: image_ref.whole(),
                    layers: layers.to_vec(),
                    config,
                });
            Ok(PushResponse {
                config_url: format!("{}/config", image_ref.whole()),
                manifest_url: format!("{}/manifest", image_ref.whole()),
            })
        }
    }
}
