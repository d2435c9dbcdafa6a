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

use std::sync::Arc;

use tracing::info;

use super::client::Client;
use super::{
    ArtifactFetcher, ArtifactStore, AttestationIngestor, ReferenceResolver, RegistryArtifactStore,
};
use crate::errors::Result;
use crate::registry::{Auth, ClientConfig};
use crate::ui::{Diagnostics, StderrDiagnostics};

/// A builder that generates Client objects.
///
/// ## Registry access
///
/// By default the client talks with the OCI registries referenced by the
/// images, using the [`ClientConfig`] and the [`Auth`] provided here.
///
/// A different store, like the [`InMemoryArtifactStore`](crate::cosign::InMemoryArtifactStore),
/// can be provided via [`ClientBuilder::with_store`]. In that case the OCI
/// configuration and the credentials are ignored.
///
/// ## Diagnostics
///
/// Advisories, like the one emitted when an image is referenced by tag, are
/// written to stderr unless a different [`Diagnostics`] sink is provided.
#[derive(Default)]
pub struct ClientBuilder {
    oci_client_config: ClientConfig,
    auth: Auth,
    diagnostics: Option<Arc<dyn Diagnostics>>,
    parallelism: Option<usize>,
    store: Option<Arc<dyn ArtifactStore>>,
}

impl ClientBuilder {
    /// Optional - the configuration to be used by the OCI client.
    ///
    /// This can be used when dealing with registries that are not using
    /// TLS termination, or are using self-signed certificates.
    pub fn with_oci_client_config(mut self, config: ClientConfig) -> Self {
        self.oci_client_config = config;
        self
    }

    /// Optional - the credentials used to access the registries
    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    /// Optional - where advisories are sent
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Optional - the number of artifacts fetched concurrently. Defaults to
    /// the available parallelism of the host.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    /// Optional - the store holding images and artifacts
    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<Client> {
        let store = match self.store {
            Some(store) => store,
            None => {
                info!("No artifact store provided, using OCI registries");
                Arc::new(RegistryArtifactStore::new(self.oci_client_config, self.auth))
                    as Arc<dyn ArtifactStore>
            }
        };
        let diagnostics = self
            .diagnostics
            .unwrap_or_else(|| Arc::new(StderrDiagnostics));

        let resolver = Arc::new(ReferenceResolver::new(store.clone(), diagnostics));
        let mut fetcher = ArtifactFetcher::new(store.clone());
        if let Some(parallelism) = self.parallelism {
            fetcher = fetcher.with_parallelism(parallelism);
        }
        let ingestor = AttestationIngestor::new(resolver.clone(), store.clone());

        Ok(Client {
            store,
            resolver,
            fetcher,
            ingestor,
        })
    }
}
