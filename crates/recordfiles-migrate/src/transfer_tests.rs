//! Tests for the bounded transfer pool.

use super::*;
use crate::store::MemoryStore;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

fn record(value: Value) -> SourceRecord {
    match value {
        Value::Object(map) => map,
        _ => panic!("record must be an object"),
    }
}

#[tokio::test]
async fn test_run_bounded_visits_every_item() {
    let mut seen = Vec::new();

    run_bounded(
        (1..=10).collect::<Vec<u32>>(),
        3,
        |n| async move { Ok(n * 2) },
        |doubled| {
            seen.push(doubled);
            Ok(())
        },
    )
    .await
    .unwrap();

    seen.sort_unstable();
    assert_eq!(seen, (1..=10).map(|n| n * 2).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_run_bounded_respects_worker_limit() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    run_bounded(
        (0..12).collect::<Vec<u32>>(),
        2,
        |_| {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        },
        |()| Ok(()),
    )
    .await
    .unwrap();

    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_run_bounded_stops_on_error() {
    let result = run_bounded(
        vec![1u32, 2, 3],
        1,
        |n| async move {
            if n == 2 {
                Err(Error::MissingPayload(PathBuf::from("2")))
            } else {
                Ok(n)
            }
        },
        |_| Ok(()),
    )
    .await;

    assert!(matches!(result, Err(Error::MissingPayload(_))));
}

#[tokio::test]
async fn test_failed_download_does_not_block_others() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    store.add_blob("/blob/A", b"alpha".to_vec());
    store.add_blob("/blob/C", b"gamma".to_vec());
    let jobs = vec![
        DownloadJob {
            record_id: "A".into(),
            url: Some("/blob/A".into()),
        },
        DownloadJob {
            record_id: "B".into(),
            url: Some("/blob/B".into()),
        },
        DownloadJob {
            record_id: "C".into(),
            url: Some("/blob/C".into()),
        },
    ];
    let mut outcomes = Vec::new();

    let shared: Arc<dyn RecordStore> = store;
    let output_dir = dir.path().join("files");
    run_bounded(
        jobs,
        2,
        |job| download_payload(Arc::clone(&shared), job, output_dir.clone()),
        |outcome| {
            outcomes.push(outcome);
            Ok(())
        },
    )
    .await
    .unwrap();

    assert_eq!(outcomes.iter().filter(|o| o.is_saved()).count(), 2);
    assert!(outcomes
        .iter()
        .any(|o| matches!(o, DownloadOutcome::Failed { id, .. } if id == "B")));
    assert_eq!(std::fs::read(output_dir.join("A")).unwrap(), b"alpha");
    assert_eq!(std::fs::read(output_dir.join("C")).unwrap(), b"gamma");
    assert!(!output_dir.join("B").exists());
}

#[test]
fn test_download_job_from_record() {
    let job = DownloadJob::from_record(
        &record(json!({"Id": "00P1", "Body": "/services/data/v59.0/sobjects/Attachment/00P1/Body"})),
        "Body",
    )
    .unwrap();
    assert_eq!(job.record_id, "00P1");
    assert!(job.url.is_some());

    let no_url = DownloadJob::from_record(&record(json!({"Id": "00P2", "Body": null})), "Body").unwrap();
    assert!(no_url.url.is_none());

    assert!(DownloadJob::from_record(&record(json!({"Body": "/x"})), "Body").is_err());
}

#[tokio::test]
async fn test_upload_replaces_payload_with_path() {
    let dir = TempDir::new().unwrap();
    let payload_path = dir.path().join("00P1");
    std::fs::write(&payload_path, b"hello").unwrap();
    let store = Arc::new(MemoryStore::new());
    let job = UploadJob {
        record_id: "00P1".into(),
        object_type: "Attachment".into(),
        payload_field: "Body".into(),
        payload_path: payload_path.clone(),
        body: record(json!({"Name": "hello.txt", "Body": null, "ParentId": "NEW1"})),
        mode: WriteMode::Create,
    };

    let outcome = upload_payload(store.clone(), job).await.unwrap();

    assert!(outcome.is_success());
    assert!(outcome.new_id.is_some());
    assert_eq!(outcome.body["Body"], payload_path.display().to_string());
    let writes = store.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].body["Body"], "aGVsbG8=");
    assert_eq!(writes[0].external_id, None);
}

#[tokio::test]
async fn test_upload_upsert_uses_original_id() {
    let dir = TempDir::new().unwrap();
    let payload_path = dir.path().join("068A");
    std::fs::write(&payload_path, b"v").unwrap();
    let store = Arc::new(MemoryStore::new());
    let job = UploadJob {
        record_id: "068A".into(),
        object_type: "ContentVersion".into(),
        payload_field: "VersionData".into(),
        payload_path,
        body: record(json!({"Title": "doc"})),
        mode: WriteMode::Upsert {
            external_id_field: "Original_Id__c".into(),
        },
    };

    upload_payload(store.clone(), job).await.unwrap();

    assert_eq!(
        store.writes()[0].external_id,
        Some(("Original_Id__c".to_string(), "068A".to_string()))
    );
}

#[tokio::test]
async fn test_upload_captures_store_rejection() {
    let dir = TempDir::new().unwrap();
    let payload_path = dir.path().join("00P1");
    std::fs::write(&payload_path, b"x").unwrap();
    let store = Arc::new(MemoryStore::new());
    store.reject_when("Name", "dup.pdf", "DUPLICATE_VALUE", "duplicate value found");
    let job = UploadJob {
        record_id: "00P1".into(),
        object_type: "Attachment".into(),
        payload_field: "Body".into(),
        payload_path,
        body: record(json!({"Name": "dup.pdf"})),
        mode: WriteMode::Create,
    };

    let outcome = upload_payload(store, job).await.unwrap();

    assert!(!outcome.is_success());
    assert_eq!(outcome.error.as_deref(), Some("duplicate value found"));
}

#[tokio::test]
async fn test_upload_missing_payload_is_fatal() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let job = UploadJob {
        record_id: "00P9".into(),
        object_type: "Attachment".into(),
        payload_field: "Body".into(),
        payload_path: dir.path().join("00P9"),
        body: SourceRecord::new(),
        mode: WriteMode::Create,
    };

    let result = upload_payload(store.clone(), job).await;

    assert!(matches!(result, Err(Error::MissingPayload(_))));
    assert!(store.writes().is_empty());
}

#[test]
fn test_payload_path_accepts_plain_ids_only() {
    let dir = Path::new("/tmp/files");
    assert_eq!(payload_path(dir, "00P1").unwrap(), dir.join("00P1"));

    for id in ["", ".", "..", "../escaped", "a/b", "/etc/passwd"] {
        assert!(
            matches!(payload_path(dir, id), Err(Error::Manifest(_))),
            "{id:?} should be rejected"
        );
    }
}

#[tokio::test]
async fn test_download_rejects_id_outside_output_dir() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    store.add_blob("/blob/x", b"payload".to_vec());
    let output_dir = dir.path().join("files");
    let job = DownloadJob {
        record_id: "../escaped".into(),
        url: Some("/blob/x".into()),
    };

    let outcome = download_payload(store, job, output_dir).await.unwrap();

    assert!(matches!(outcome, DownloadOutcome::Failed { ref id, .. } if id == "../escaped"));
    assert!(!dir.path().join("escaped").exists());
}
