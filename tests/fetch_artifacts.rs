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

//! Concurrent fetching of attached artifacts.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STD_ENGINE, Engine as _};
use proptest::prelude::*;
use rstest::rstest;
use sigstore_attach::cosign::{
    Artifact, ArtifactFetcher, ArtifactKind, ArtifactStore, InMemoryArtifactStore, SignedEntity,
    DSSE_PAYLOAD_TYPE,
};
use sigstore_attach::errors::{Result, SigstoreError};
use sigstore_attach::registry::OciReference;
use tokio_util::sync::CancellationToken;

const DIGEST: &str = "sha256:f3cfc9d0dbf931d3db4685ec659b7ac68e2a578219da4aae65427886e649b06b";

fn image() -> OciReference {
    format!("registry-testing.svc.lan/busybox@{DIGEST}")
        .parse()
        .unwrap()
}

const SIMPLE_SIGNING_MEDIA_TYPE: &str = "application/vnd.dev.cosign.simplesigning.v1+json";
const SIGNATURE_ANNOTATION: &str = "dev.cosignproject.cosign/signature";

fn attestation(n: usize) -> Vec<u8> {
    format!(
        r#"{{"payloadType":"application/vnd.in-toto+json","payload":"statement-{n}","signatures":[{{"keyid":"","sig":"c2ln"}}]}}"#
    )
    .into_bytes()
}

fn signature_annotations(n: usize) -> BTreeMap<String, String> {
    BTreeMap::from([(
        SIGNATURE_ANNOTATION.to_string(),
        BASE64_STD_ENGINE.encode(format!("sig-{n}")),
    )])
}

/// Store an attestation for each latency, in order. The data of the attestation
/// at position `n` is given by `data(n)`.
fn store_with(
    latencies: &[u64],
    data: impl Fn(usize) -> Vec<u8>,
) -> Arc<InMemoryArtifactStore> {
    let store = Arc::new(InMemoryArtifactStore::new());
    store.add_image(&image(), DIGEST);
    add_delayed(&store, ArtifactKind::Attestation, latencies, |n| {
        (data(n), BTreeMap::new())
    });
    store
}

/// Store a simple signing payload `statement-<n>`, signed by `sig-<n>`, for
/// each latency
fn store_with_signatures(latencies: &[u64]) -> Arc<InMemoryArtifactStore> {
    let store = Arc::new(InMemoryArtifactStore::new());
    store.add_image(&image(), DIGEST);
    add_delayed(&store, ArtifactKind::Signature, latencies, |n| {
        (
            format!("statement-{n}").into_bytes(),
            signature_annotations(n),
        )
    });
    store
}

fn add_delayed(
    store: &InMemoryArtifactStore,
    kind: ArtifactKind,
    latencies: &[u64],
    item: impl Fn(usize) -> (Vec<u8>, BTreeMap<String, String>),
) {
    let media_type = match kind {
        ArtifactKind::Signature => SIMPLE_SIGNING_MEDIA_TYPE,
        _ => DSSE_PAYLOAD_TYPE,
    };
    for (n, latency) in latencies.iter().enumerate() {
        let (data, annotations) = item(n);
        let artifact = store.add_artifact(&image(), kind, media_type, data, annotations);
        store.set_fetch_delay(&artifact.digest, Duration::from_millis(*latency));
    }
}

/// Payloads of the `kind` artifacts attached to the image, in the order the
/// fetcher returns them
async fn fetch_payloads(
    store: Arc<InMemoryArtifactStore>,
    kind: ArtifactKind,
    parallelism: usize,
) -> Result<Vec<String>> {
    let entity = store.signed_entity(&image()).await?;
    let fetcher = ArtifactFetcher::new(store).with_parallelism(parallelism);
    let cancel = CancellationToken::new();
    match kind {
        ArtifactKind::Signature => {
            let signatures = fetcher.fetch_signatures(&entity, &cancel).await?;
            for (n, signature) in signatures.iter().enumerate() {
                let expected = BASE64_STD_ENGINE.encode(format!("sig-{n}"));
                if signature.base64_signature != expected {
                    return Err(SigstoreError::UnexpectedError(format!(
                        "signature #{n} is {}",
                        signature.base64_signature
                    )));
                }
            }
            Ok(signatures
                .into_iter()
                .map(|s| String::from_utf8_lossy(&s.payload).into_owned())
                .collect())
        }
        _ => Ok(fetcher
            .fetch_attestations(&entity, &cancel)
            .await?
            .into_iter()
            .map(|a| a.payload)
            .collect()),
    }
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("cannot build runtime")
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    /// Whatever the order in which items complete, results follow the listing order
    #[test]
    fn results_follow_listing_order(
        kind in prop_oneof![Just(ArtifactKind::Attestation), Just(ArtifactKind::Signature)],
        latencies in prop::collection::vec(0u64..500, 1..24),
        parallelism in 1usize..8,
    ) {
        let store = match kind {
            ArtifactKind::Signature => store_with_signatures(&latencies),
            _ => store_with(&latencies, attestation),
        };
        let fetched = paused_runtime().block_on(fetch_payloads(store, kind, parallelism));

        let fetched = fetched.map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(fetched.len(), latencies.len());
        for (n, payload) in fetched.iter().enumerate() {
            prop_assert_eq!(payload, &format!("statement-{n}"));
        }
    }
}

#[rstest]
#[case::first(0)]
#[case::middle(3)]
#[case::last(6)]
#[tokio::test(start_paused = true)]
async fn one_corrupted_item_aborts_the_fetch(#[case] corrupted: usize) {
    let latencies = [30, 10, 50, 20, 0, 40, 5];
    let store = store_with(&latencies, |n| {
        if n == corrupted {
            b"{\"payloadType\": 1".to_vec()
        } else {
            attestation(n)
        }
    });
    let entity = store.signed_entity(&image()).await.unwrap();

    let err = ArtifactFetcher::new(store)
        .with_parallelism(3)
        .fetch_attestations(&entity, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        SigstoreError::DecodeFailure { kind, index, .. } => {
            assert_eq!(kind, ArtifactKind::Attestation);
            assert_eq!(index, corrupted);
        }
        e => panic!("unexpected error {e:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn signatures_follow_listing_order() {
    // the first listed signatures are the slowest ones
    let store = store_with_signatures(&[400, 300, 0, 200, 100]);

    let payloads = fetch_payloads(store.clone(), ArtifactKind::Signature, 5)
        .await
        .expect("cannot fetch signatures");

    assert_eq!(
        payloads,
        ["statement-0", "statement-1", "statement-2", "statement-3", "statement-4"]
    );
    assert_eq!(store.fetch_calls(), 5);
}

/// Store tracking how many artifacts are being fetched at the same time
struct ConcurrencyTracker {
    inner: Arc<InMemoryArtifactStore>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl ArtifactStore for ConcurrencyTracker {
    async fn resolve_digest(&self, image: &OciReference) -> Result<String> {
        self.inner.resolve_digest(image).await
    }

    async fn signed_entity(&self, image: &OciReference) -> Result<SignedEntity> {
        self.inner.signed_entity(image).await
    }

    async fn fetch_artifact(
        &self,
        location: &OciReference,
        artifact: &Artifact,
    ) -> Result<Vec<u8>> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        let data = self.inner.fetch_artifact(location, artifact).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        data
    }

    async fn write(&self, entity: &SignedEntity, kind: ArtifactKind) -> Result<()> {
        self.inner.write(entity, kind).await
    }
}

#[tokio::test(start_paused = true)]
async fn workers_are_bounded() {
    let inner = store_with(&[100; 12], attestation);
    let tracker = Arc::new(ConcurrencyTracker {
        inner: inner.clone(),
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let entity = tracker.signed_entity(&image()).await.unwrap();

    let fetched = ArtifactFetcher::new(tracker.clone())
        .with_parallelism(3)
        .fetch_attestations(&entity, &CancellationToken::new())
        .await
        .expect("cannot fetch");

    assert_eq!(fetched.len(), 12);
    assert_eq!(tracker.peak.load(Ordering::SeqCst), 3);
    assert_eq!(inner.fetch_calls(), 12);
}
