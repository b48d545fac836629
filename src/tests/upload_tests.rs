// src/tests/upload_tests.rs
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::Notify;

use super::support::{harness, MemoryObjectStore};
use crate::models::{FileStatus, PrepareUploadRequest, ServiceError};
use crate::services::UploadService;
use crate::utils::object_store::{ObjectStat, ObjectStore, SignedUrl};

fn request(name: &str, size: u64) -> PrepareUploadRequest {
    PrepareUploadRequest {
        file_name: name.to_string(),
        content_type: None,
        file_size: size,
    }
}

#[actix_rt::test]
async fn test_oversized_upload_is_rejected_before_anything_is_created() {
    let h = harness();
    let alice = h.user("alice");

    let result = h.state.uploads.prepare(&alice, &request("big.csv", 60_000_000)).await;
    assert_eq!(
        result.unwrap_err(),
        ServiceError::BadRequest("File is too large, the limit is 50 MB".into())
    );
    assert_eq!(h.state.db.read(|c| c.files.len()).unwrap(), 0);
}

#[actix_rt::test]
async fn test_prepare_rejects_bad_names_and_sizes() {
    let h = harness();
    let alice = h.user("alice");

    for (name, size) in [("notes.txt", 10), ("noext", 10), ("  ", 10), ("empty.csv", 0)] {
        let result = h.state.uploads.prepare(&alice, &request(name, size)).await;
        assert!(matches!(result, Err(ServiceError::BadRequest(_))), "{}", name);
    }
    assert_eq!(h.state.db.read(|c| c.files.len()).unwrap(), 0);
}

#[actix_rt::test]
async fn test_prepared_upload_is_pending_and_hidden() {
    let h = harness();
    let alice = h.user("alice");

    let prepared = h
        .state
        .uploads
        .prepare(&alice, &request("Q1 sales.csv", 12))
        .await
        .unwrap();

    let file = &prepared.file;
    assert_eq!(file.status, FileStatus::Pending);
    assert_eq!(file.name, "Q1 sales.csv");
    assert_eq!(file.content_type, "text/csv");
    assert_eq!(file.path, format!("uploads/alice/{}/Q1_sales.csv", file.id));
    assert!(prepared.upload_url.starts_with("memory://"));
    assert!(prepared.expires_at > Utc::now());

    assert!(h.state.files.files_for_user(&alice.id, &[]).unwrap().is_empty());
    assert!(matches!(
        h.state.files.file_by_id(&file.id, &alice.id, &[]),
        Err(ServiceError::NotFound(_))
    ));
}

#[actix_rt::test]
async fn test_confirm_checks_the_stored_object() {
    let h = harness();
    let alice = h.user("alice");
    let prepared = h.state.uploads.prepare(&alice, &request("a.csv", 5)).await.unwrap();
    let file_id = prepared.file.id.clone();

    assert_eq!(
        h.state.uploads.confirm(&file_id, &alice.id).await.unwrap_err(),
        ServiceError::Conflict("No uploaded content was found for this file".into())
    );

    h.objects.put(&prepared.file.path, b"abc");
    assert!(matches!(
        h.state.uploads.confirm(&file_id, &alice.id).await,
        Err(ServiceError::Conflict(_))
    ));
    assert_eq!(h.stored_file(&file_id).unwrap().status, FileStatus::Pending);

    h.objects.put(&prepared.file.path, b"a,b,c");
    let confirmed = h.state.uploads.confirm(&file_id, &alice.id).await.unwrap();
    assert_eq!(confirmed.status, FileStatus::Uploaded);
    assert_eq!(h.state.files.files_for_user(&alice.id, &[]).unwrap().len(), 1);
}

#[actix_rt::test]
async fn test_second_confirm_conflicts() {
    let h = harness();
    let alice = h.user("alice");
    let file = h.uploaded_file(&alice, "a.csv", "x,y\n1,2\n").await;

    assert_eq!(
        h.state.uploads.confirm(&file.id, &alice.id).await.unwrap_err(),
        ServiceError::Conflict("Upload has already been confirmed".into())
    );
    assert_eq!(h.stored_file(&file.id).unwrap().status, FileStatus::Uploaded);
}

#[actix_rt::test]
async fn test_only_the_uploader_confirms_or_abandons() {
    let h = harness();
    let alice = h.user("alice");
    let bob = h.user("bob");
    let prepared = h.state.uploads.prepare(&alice, &request("a.csv", 3)).await.unwrap();
    h.objects.put(&prepared.file.path, b"a,b");

    assert!(matches!(
        h.state.uploads.confirm(&prepared.file.id, &bob.id).await,
        Err(ServiceError::Forbidden(_))
    ));
    assert!(matches!(
        h.state.uploads.abandon(&prepared.file.id, &bob.id).await,
        Err(ServiceError::Forbidden(_))
    ));
    assert!(matches!(
        h.state.uploads.confirm("missing", &alice.id).await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(h.stored_file(&prepared.file.id).is_some());
}

#[actix_rt::test]
async fn test_abandon_is_idempotent() {
    let h = harness();
    let alice = h.user("alice");
    let prepared = h.state.uploads.prepare(&alice, &request("a.csv", 3)).await.unwrap();
    h.objects.put(&prepared.file.path, b"a,b");

    h.state.uploads.abandon(&prepared.file.id, &alice.id).await.unwrap();
    assert!(h.stored_file(&prepared.file.id).is_none());
    assert!(!h.objects.contains(&prepared.file.path));

    h.state.uploads.abandon(&prepared.file.id, &alice.id).await.unwrap();
    assert!(h.stored_file(&prepared.file.id).is_none());
}

#[actix_rt::test]
async fn test_abandon_after_confirm_conflicts() {
    let h = harness();
    let alice = h.user("alice");
    let file = h.uploaded_file(&alice, "a.csv", "x,y\n").await;

    assert!(matches!(
        h.state.uploads.abandon(&file.id, &alice.id).await,
        Err(ServiceError::Conflict(_))
    ));
    assert!(h.objects.contains(&file.path));
    assert_eq!(h.stored_file(&file.id).unwrap().status, FileStatus::Uploaded);
}

#[actix_rt::test]
async fn test_purge_removes_only_stale_pending_uploads() {
    let h = harness();
    let alice = h.user("alice");
    let stale = h.state.uploads.prepare(&alice, &request("stale.csv", 3)).await.unwrap();
    h.objects.put(&stale.file.path, b"a,b");
    let kept = h.uploaded_file(&alice, "kept.csv", "x,y\n").await;

    assert_eq!(h.state.uploads.purge_stale_uploads(Utc::now()).await.unwrap(), 0);

    let purged = h
        .state
        .uploads
        .purge_stale_uploads(Utc::now() + Duration::hours(2))
        .await
        .unwrap();
    assert_eq!(purged, 1);
    assert!(h.stored_file(&stale.file.id).is_none());
    assert!(!h.objects.contains(&stale.file.path));
    assert!(h.stored_file(&kept.id).is_some());
}

// Parks confirm right after its stat and abandon right after its delete, so
// the test decides how the two interleave.
#[derive(Default)]
struct SteppedStore {
    inner: MemoryObjectStore,
    stat_done: Notify,
    resume_confirm: Notify,
    delete_done: Notify,
    resume_abandon: Notify,
}

#[async_trait]
impl ObjectStore for SteppedStore {
    async fn signed_upload_url(&self, path: &str, content_type: &str, ttl: Duration) -> Result<SignedUrl, ServiceError> {
        self.inner.signed_upload_url(path, content_type, ttl).await
    }

    async fn signed_download_url(&self, path: &str, ttl: Duration) -> Result<SignedUrl, ServiceError> {
        self.inner.signed_download_url(path, ttl).await
    }

    async fn stat(&self, path: &str) -> Result<Option<ObjectStat>, ServiceError> {
        let stat = self.inner.stat(path).await;
        self.stat_done.notify_one();
        self.resume_confirm.notified().await;
        stat
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, ServiceError> {
        self.inner.read(path).await
    }

    async fn delete(&self, path: &str) -> Result<(), ServiceError> {
        let deleted = self.inner.delete(path).await;
        self.delete_done.notify_one();
        self.resume_abandon.notified().await;
        deleted
    }
}

#[actix_rt::test]
async fn test_abandon_racing_confirm_never_leaves_a_record_without_bytes() {
    let h = harness();
    let alice = h.user("alice");
    let store = Arc::new(SteppedStore::default());
    let uploads = UploadService::new(
        h.state.db.clone(),
        store.clone(),
        50 * 1024 * 1024,
        Duration::minutes(15),
        Duration::hours(1),
    );

    let prepared = uploads.prepare(&alice, &request("a.csv", 3)).await.unwrap();
    let file_id = prepared.file.id.clone();
    store.inner.put(&prepared.file.path, b"a,b");
    let confirm_done = Notify::new();

    // confirm has seen the bytes; abandon then runs up to its object delete,
    // confirm finishes, and only then does abandon return
    let (confirmed, abandoned, _) = futures::join!(
        async {
            let result = uploads.confirm(&file_id, &alice.id).await;
            confirm_done.notify_one();
            result
        },
        async {
            store.stat_done.notified().await;
            uploads.abandon(&file_id, &alice.id).await
        },
        async {
            store.delete_done.notified().await;
            store.resume_confirm.notify_one();
            confirm_done.notified().await;
            store.resume_abandon.notify_one();
        }
    );

    assert_eq!(confirmed.unwrap_err(), ServiceError::NotFound("Upload not found".into()));
    abandoned.unwrap();
    assert!(h.stored_file(&file_id).is_none());
    assert!(!store.inner.contains(&prepared.file.path));
}
