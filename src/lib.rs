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

//! This crate resolves, fetches and attaches the artifacts [cosign](https://github.com/sigstore/cosign)
//! stores next to container images: signatures, attestations and SBOMs.
//!
//! Artifacts are kept inside of the same OCI repository as the image, under
//! tags derived from the image digest (`sha256-<hex>.sig`, `sha256-<hex>.att`,
//! `sha256-<hex>.sbom`). Because tags can be moved, every operation first pins
//! the user supplied reference to a digest, see [`cosign::ReferenceResolver`].
//!
//! # Example
//!
//! ```rust,no_run
//! use sigstore_attach::cosign::{ClientBuilder, CosignCapabilities};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! pub async fn main() {
//!     let client = ClientBuilder::default()
//!         .build()
//!         .expect("Unexpected failure while building Client");
//!
//!     let attestations = client
//!         .fetch_attestations_for_reference(
//!             "registry-testing.svc.lan/busybox@sha256:f3cfc9d0dbf931d3db4685ec659b7ac68e2a578219da4aae65427886e649b06b",
//!             None,
//!             &CancellationToken::new(),
//!         )
//!         .await
//!         .expect("cannot fetch attestations");
//!
//!     for attestation in attestations {
//!         println!("{}", attestation.payload_type);
//!     }
//! }
//! ```

pub mod cosign;
pub mod errors;
pub mod registry;
pub mod ui;

mod mock_client;
