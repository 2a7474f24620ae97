use radula::storage::ObjectStore;
use radula::{Context, FsStore, MemoryStore, Owner, Radula, RadulaError, Transcript, TransferConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// 4 KiB threshold with 1 KiB parts, so a 10,000 byte file has 10 parts.
fn settings(retries: u32, retry_delay: Duration) -> TransferConfig {
    TransferConfig {
        multipart_threshold: 4096,
        part_size: 1024,
        threads: 4,
        part_retries: retries,
        retry_delay,
    }
}

/// Helper to create test data with a pattern that changes every byte
fn create_test_file(dir: &TempDir, name: &str, size: usize) -> (PathBuf, Vec<u8>) {
    let data: Vec<u8> = (0..size).map(|i| (i * 7 % 256) as u8).collect();
    let path = dir.path().join(name);
    std::fs::write(&path, &data).unwrap();
    (path, data)
}

async fn memory_radula(settings: TransferConfig) -> (Arc<MemoryStore>, Radula) {
    let store = Arc::new(MemoryStore::new(Owner::new("abc123")));
    store.create_bucket("tests").await.unwrap();
    let radula = Radula::new(Context::new(store.clone(), settings), Transcript::capture());
    (store, radula)
}

#[tokio::test]
async fn test_multipart_round_trip_on_filesystem() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FsStore::new(dir.path().join("store"), Owner::new("abc123")).unwrap());
    let radula = Radula::new(
        Context::new(store.clone(), settings(0, Duration::from_millis(1))),
        Transcript::capture(),
    );
    radula.make_bucket("tests").await.unwrap();

    let (local, data) = create_test_file(&dir, "big.bin", 10_000);
    let info = radula.upload(&local, "tests").await.unwrap();
    assert_eq!(info.key, "big.bin");
    assert_eq!(info.size, 10_000);
    assert!(info.etag.ends_with("-10"));
    assert!(radula
        .transcript()
        .contains(&format!("uploaded {} to tests/big.bin (10000 bytes)", local.display())));

    let downloaded = dir.path().join("copy.bin");
    radula.download("tests/big.bin", &downloaded).await.unwrap();
    assert_eq!(std::fs::read(&downloaded).unwrap(), data);
    assert!(store.list_multipart_uploads("tests").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_exact_threshold_is_single_put() {
    let (store, radula) = memory_radula(settings(0, Duration::from_millis(1))).await;
    let dir = TempDir::new().unwrap();
    let (local, _) = create_test_file(&dir, "edge.bin", 4096);

    let info = radula.upload(&local, "tests/edge.bin").await.unwrap();
    assert!(!info.etag.contains('-'));
    assert_eq!(store.part_attempts(), 0);
}

#[tokio::test]
async fn test_transient_part_failures_are_retried() {
    let (store, radula) = memory_radula(settings(3, Duration::from_millis(1))).await;
    store.inject_part_failures(3);
    let dir = TempDir::new().unwrap();
    let (local, data) = create_test_file(&dir, "big.bin", 10_000);

    radula.upload(&local, "tests/big.bin").await.unwrap();
    assert_eq!(store.part_attempts(), 13);

    let (stored, _) = store.get_object("tests", "big.bin").await.unwrap();
    assert_eq!(stored.as_ref(), data.as_slice());
}

#[tokio::test]
async fn test_exhausted_retries_leave_nothing_behind() {
    let (store, radula) = memory_radula(settings(2, Duration::from_millis(1))).await;
    store.fail_part(3);
    let dir = TempDir::new().unwrap();
    let (local, _) = create_test_file(&dir, "big.bin", 10_000);

    let err = radula.upload(&local, "tests/big.bin").await.unwrap_err();
    match err {
        RadulaError::Transfer { bucket, key, reason } => {
            assert_eq!(bucket, "tests");
            assert_eq!(key, "big.bin");
            assert!(reason.contains("part 3"), "{}", reason);
        }
        other => panic!("unexpected error: {}", other),
    }

    assert!(store.head_object("tests", "big.bin").await.unwrap_err().is_not_found());
    assert!(store.list_multipart_uploads("tests").await.unwrap().is_empty());
    assert!(radula.transcript().lines().is_empty());
}

#[tokio::test]
async fn test_cancel_aborts_upload() {
    let (store, radula) = memory_radula(settings(5, Duration::from_secs(10))).await;
    // part 2 keeps failing and waits out a long backoff
    store.fail_part(2);
    let dir = TempDir::new().unwrap();
    let (local, _) = create_test_file(&dir, "big.bin", 10_000);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        radula.upload_with_cancel(&local, "tests/big.bin", cancel),
    )
    .await
    .expect("cancellation should stop the upload")
    .unwrap_err();
    assert!(matches!(err, RadulaError::Cancelled));

    assert!(store.head_object("tests", "big.bin").await.is_err());
    assert!(store.list_multipart_uploads("tests").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let (store, radula) = memory_radula(settings(0, Duration::from_millis(1))).await;
    let dir = TempDir::new().unwrap();
    let (local, _) = create_test_file(&dir, "big.bin", 10_000);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = radula
        .upload_with_cancel(&local, "tests/big.bin", cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, RadulaError::Cancelled));
    assert_eq!(store.part_attempts(), 0);
}

#[tokio::test]
async fn test_multipart_clean_after_interrupted_upload() {
    let (store, radula) = memory_radula(settings(0, Duration::from_millis(1))).await;
    let upload_id = store.create_multipart_upload("tests", "stale.bin").await.unwrap();

    let uploads = radula.multipart_list("tests").await.unwrap();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].upload_id, upload_id);

    assert_eq!(radula.multipart_clean("tests").await.unwrap(), 1);
    assert!(radula
        .transcript()
        .contains(&format!("aborted {} (stale.bin)", upload_id)));
}
