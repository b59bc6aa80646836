mod common;

use common::{Fault, FakeProvider, key_for, manifest};
use depot_core::{ClientError, RetryPolicy, TransportError};
use depot_schema::{DepotDescriptor, ManifestFile, Platform};
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;

const DEPOT: u32 = 481;

async fn ready(provider: &FakeProvider, retry: RetryPolicy) -> std::sync::Arc<depot_core::ContentClient> {
    let client = provider.client(retry);
    client.connect().await.unwrap();
    client.authenticate().await.unwrap();
    client
}

fn descriptor(manifest_id: u64) -> DepotDescriptor {
    DepotDescriptor::new(DEPOT, manifest_id, key_for(DEPOT))
}

#[tokio::test]
async fn session_must_be_established_in_order() {
    let provider = FakeProvider::new(&["cdn1"]);
    let client = provider.client(RetryPolicy::immediate(1));

    assert!(matches!(
        client.enumerate_eligible_depots(Platform::REFERENCE).await,
        Err(ClientError::NotConnected)
    ));
    assert!(matches!(client.authenticate().await, Err(ClientError::NotConnected)));

    client.connect().await.unwrap();
    assert!(matches!(
        client.fetch_manifest(&descriptor(1), &CancellationToken::new()).await,
        Err(ClientError::NotAuthenticated)
    ));

    client.authenticate().await.unwrap();
    client.connect().await.unwrap();
    client.authenticate().await.unwrap();

    assert_eq!(provider.control.connects.load(Ordering::SeqCst), 1);
    assert_eq!(provider.control.logins.load(Ordering::SeqCst), 1);
    assert!(client.is_authenticated());
}

#[tokio::test]
async fn request_codes_are_cached() {
    let provider = FakeProvider::new(&["cdn1"]);
    provider.publish(Platform::REFERENCE, DEPOT, 5, manifest(&["bin"], vec![]));
    let client = ready(&provider, RetryPolicy::immediate(1)).await;
    let cancel = CancellationToken::new();

    client.fetch_manifest(&descriptor(5), &cancel).await.unwrap();
    client.fetch_manifest(&descriptor(5), &cancel).await.unwrap();

    assert_eq!(provider.control.code_requests.load(Ordering::SeqCst), 1);
    assert_eq!(provider.cdn.manifest_requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn manifests_are_fetched_in_depot_order() {
    let provider = FakeProvider::new(&["cdn1", "cdn2"]);
    provider.publish(Platform::REFERENCE, DEPOT, 1, manifest(&["first"], vec![]));
    provider.publish(Platform::REFERENCE, DEPOT + 1, 1, manifest(&["second"], vec![]));
    let client = ready(&provider, RetryPolicy::immediate(1)).await;

    let depots = client.enumerate_eligible_depots(Platform::REFERENCE).await.unwrap();
    let manifests = client.fetch_manifests(&depots, &CancellationToken::new()).await.unwrap();

    assert_eq!(manifests.len(), 2);
    assert!(manifests[0].contains_directory("first"));
    assert!(manifests[1].contains_directory("second"));
}

#[tokio::test]
async fn one_missing_manifest_fails_the_batch() {
    let provider = FakeProvider::new(&["cdn1", "cdn2"]);
    provider.publish(Platform::REFERENCE, DEPOT, 1, manifest(&[], vec![]));
    let client = ready(&provider, RetryPolicy::immediate(1)).await;

    let depots = vec![descriptor(1), DepotDescriptor::new(999, 1, key_for(999))];
    let result = client.fetch_manifests(&depots, &CancellationToken::new()).await;

    assert!(matches!(result, Err(ClientError::NotFound(_))));
}

#[tokio::test]
async fn timeout_retries_on_same_connection() {
    let provider = FakeProvider::new(&["cdn1", "cdn2"]);
    let file = provider.file(DEPOT, "a.bin", &[b"payload"]);
    let client = ready(&provider, RetryPolicy::immediate(3)).await;
    provider.cdn.inject(Fault::Fail(TransportError::Timeout));

    let data = client
        .fetch_chunk(DEPOT, &key_for(DEPOT), &file.chunks()[0], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(data.as_ref(), b"payload");
    let hosts = provider.cdn.hosts.lock().unwrap().clone();
    assert_eq!(hosts, vec!["cdn1".to_string(), "cdn1".to_string()]);
}

#[tokio::test]
async fn network_failure_switches_connection() {
    let provider = FakeProvider::new(&["cdn1", "cdn2", "cdn3"]);
    let file = provider.file(DEPOT, "a.bin", &[b"payload"]);
    let client = ready(&provider, RetryPolicy::immediate(3)).await;
    provider.cdn.inject(Fault::Fail(TransportError::Other("connection reset".into())));

    client
        .fetch_chunk(DEPOT, &key_for(DEPOT), &file.chunks()[0], &CancellationToken::new())
        .await
        .unwrap();

    let hosts = provider.cdn.hosts.lock().unwrap().clone();
    assert_eq!(hosts.len(), 2);
    assert_ne!(hosts[0], hosts[1]);

    // The broken endpoint was replaced, not dropped.
    let pool = client.pool().unwrap();
    tokio::task::yield_now().await;
    assert_eq!(pool.stats().size(), 2);
}

#[tokio::test]
async fn corrupt_payload_is_retried() {
    let provider = FakeProvider::new(&["cdn1", "cdn2"]);
    let file = provider.file(DEPOT, "a.bin", &[b"payload"]);
    let client = ready(&provider, RetryPolicy::immediate(3)).await;
    provider.cdn.inject(Fault::Corrupt);

    let data = client
        .fetch_chunk(DEPOT, &key_for(DEPOT), &file.chunks()[0], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(data.as_ref(), b"payload");
    assert_eq!(provider.cdn.chunk_requests(), 2);
}

#[tokio::test]
async fn unauthorized_is_not_retried() {
    let provider = FakeProvider::new(&["cdn1", "cdn2"]);
    let file = provider.file(DEPOT, "a.bin", &[b"payload"]);
    let client = ready(&provider, RetryPolicy::immediate(5)).await;
    provider.cdn.inject(Fault::Fail(TransportError::Unauthorized(403)));

    let result = client
        .fetch_chunk(DEPOT, &key_for(DEPOT), &file.chunks()[0], &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(ClientError::Unauthorized { status: 403, .. })));
    assert_eq!(provider.cdn.chunk_requests(), 1);
}

#[tokio::test]
async fn retry_budget_is_bounded() {
    let provider = FakeProvider::new(&["cdn1", "cdn2"]);
    let file = provider.file(DEPOT, "a.bin", &[b"payload"]);
    let client = ready(&provider, RetryPolicy::immediate(3)).await;
    for _ in 0..5 {
        provider.cdn.inject(Fault::Fail(TransportError::Timeout));
    }

    let result = client
        .fetch_chunk(DEPOT, &key_for(DEPOT), &file.chunks()[0], &CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(ClientError::Transport {
            attempts: 3,
            source: TransportError::Timeout,
            ..
        })
    ));
    assert_eq!(provider.cdn.chunk_requests(), 3);
}

#[tokio::test]
async fn file_bytes_are_assembled_and_verified() {
    let provider = FakeProvider::new(&["cdn1"]);
    let file = provider.file(DEPOT, "Build.version", &[b"2.", b"5.", b"0"]);
    let client = ready(&provider, RetryPolicy::immediate(1)).await;

    let bytes = client
        .fetch_file_bytes(&file, &key_for(DEPOT), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(bytes, b"2.5.0");
}

#[tokio::test]
async fn oversized_file_is_refused_before_download() {
    let provider = FakeProvider::new(&["cdn1"]);
    let small = provider.file(DEPOT, "Build.version", &[b"1.0.0"]);
    let huge = ManifestFile::new(DEPOT, "Build.version", u64::MAX / 2, small.hash, small.chunks().to_vec(), false)
        .unwrap();
    let client = ready(&provider, RetryPolicy::immediate(1)).await;

    let result = client
        .fetch_file_bytes(&huge, &key_for(DEPOT), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(ClientError::Corrupt { .. })));
    assert_eq!(provider.cdn.chunk_requests(), 0);
}

#[tokio::test]
async fn cancelled_fetch_returns_cancelled() {
    let provider = FakeProvider::new(&["cdn1"]);
    let file = provider.file(DEPOT, "a.bin", &[b"payload"]);
    let client = ready(&provider, RetryPolicy::immediate(1)).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = client.fetch_chunk(DEPOT, &key_for(DEPOT), &file.chunks()[0], &cancel).await;

    assert!(matches!(result, Err(ClientError::Cancelled)));
    assert_eq!(provider.cdn.chunk_requests(), 0);
}
