use super::{
    calculate_etag, multipart_etag, ordered_parts, validate_bucket_name, BucketInfo,
    CompletedPart, ObjectInfo, ObjectStore, UploadInfo,
};
use crate::acl::{AccessControlList, Owner};
use crate::error::{RadulaError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;
use uuid::Uuid;

struct BucketEntry {
    info: BucketInfo,
    acl: AccessControlList,
    objects: BTreeMap<String, ObjectEntry>,
}

struct ObjectEntry {
    data: Bytes,
    info: ObjectInfo,
    acl: AccessControlList,
}

struct PendingUpload {
    info: UploadInfo,
    parts: BTreeMap<u32, (Bytes, String)>,
}

#[derive(Default)]
struct State {
    buckets: BTreeMap<String, BucketEntry>,
    uploads: HashMap<String, PendingUpload>,
}

/// Process-local store. Nothing survives the value being dropped.
///
/// Part uploads can be made to fail on purpose, either the next `n` calls
/// ([`MemoryStore::inject_part_failures`]) or every call for a given part
/// number ([`MemoryStore::fail_part`]).
pub struct MemoryStore {
    owner: Owner,
    state: Mutex<State>,
    pending_failures: AtomicUsize,
    failing_parts: Mutex<HashSet<u32>>,
    part_attempts: AtomicUsize,
}

impl MemoryStore {
    pub fn new(owner: Owner) -> Self {
        Self {
            owner,
            state: Mutex::new(State::default()),
            pending_failures: AtomicUsize::new(0),
            failing_parts: Mutex::new(HashSet::new()),
            part_attempts: AtomicUsize::new(0),
        }
    }

    pub fn inject_part_failures(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_part(&self, part_number: u32) {
        self.failing_parts.lock().insert(part_number);
    }

    pub fn part_attempts(&self) -> usize {
        self.part_attempts.load(Ordering::SeqCst)
    }

    fn take_injected_failure(&self, part_number: u32) -> Option<RadulaError> {
        if self.failing_parts.lock().contains(&part_number) {
            return Some(RadulaError::Injected(format!("part {} always fails", part_number)));
        }
        let consumed = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        consumed
            .ok()
            .map(|_| RadulaError::Injected(format!("transient failure on part {}", part_number)))
    }
}

fn bucket_mut<'a>(state: &'a mut State, bucket: &str) -> Result<&'a mut BucketEntry> {
    state
        .buckets
        .get_mut(bucket)
        .ok_or_else(|| RadulaError::NoSuchBucket(bucket.to_string()))
}

fn bucket_ref<'a>(state: &'a State, bucket: &str) -> Result<&'a BucketEntry> {
    state
        .buckets
        .get(bucket)
        .ok_or_else(|| RadulaError::NoSuchBucket(bucket.to_string()))
}

fn object_ref<'a>(state: &'a State, bucket: &str, key: &str) -> Result<&'a ObjectEntry> {
    bucket_ref(state, bucket)?
        .objects
        .get(key)
        .ok_or_else(|| RadulaError::no_such_key(bucket, key))
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn owner(&self) -> &Owner {
        &self.owner
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        validate_bucket_name(bucket)?;
        let mut state = self.state.lock();
        if state.buckets.contains_key(bucket) {
            return Err(RadulaError::BucketAlreadyExists(bucket.to_string()));
        }
        state.buckets.insert(
            bucket.to_string(),
            BucketEntry {
                info: BucketInfo {
                    name: bucket.to_string(),
                    created: Utc::now(),
                },
                acl: AccessControlList::private(&self.owner),
                objects: BTreeMap::new(),
            },
        );
        debug!("Created bucket: {}", bucket);
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let mut state = self.state.lock();
        if !bucket_ref(&state, bucket)?.objects.is_empty() {
            return Err(RadulaError::BucketNotEmpty(bucket.to_string()));
        }
        state.buckets.remove(bucket);
        state.uploads.retain(|_, upload| upload.info.bucket != bucket);
        debug!("Deleted bucket: {}", bucket);
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let state = self.state.lock();
        Ok(state.buckets.values().map(|b| b.info.clone()).collect())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.state.lock().buckets.contains_key(bucket))
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<ObjectInfo> {
        let mut state = self.state.lock();
        let entry = bucket_mut(&mut state, bucket)?;
        let info = ObjectInfo {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: data.len() as u64,
            etag: calculate_etag(&data),
            last_modified: Utc::now(),
            content_type: "application/octet-stream".to_string(),
        };
        entry.objects.insert(
            key.to_string(),
            ObjectEntry {
                data,
                info: info.clone(),
                acl: AccessControlList::private(&self.owner),
            },
        );
        debug!("Stored object: {}/{} (size: {} bytes)", bucket, key, info.size);
        Ok(info)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<(Bytes, ObjectInfo)> {
        let state = self.state.lock();
        let object = object_ref(&state, bucket, key)?;
        Ok((object.data.clone(), object.info.clone()))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectInfo> {
        let state = self.state.lock();
        Ok(object_ref(&state, bucket, key)?.info.clone())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let mut state = self.state.lock();
        bucket_mut(&mut state, bucket)?
            .objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| RadulaError::no_such_key(bucket, key))
    }

    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>> {
        let state = self.state.lock();
        Ok(bucket_ref(&state, bucket)?.objects.keys().cloned().collect())
    }

    async fn get_bucket_acl(&self, bucket: &str) -> Result<AccessControlList> {
        let state = self.state.lock();
        Ok(bucket_ref(&state, bucket)?.acl.clone())
    }

    async fn put_bucket_acl(&self, bucket: &str, acl: AccessControlList) -> Result<()> {
        let mut state = self.state.lock();
        bucket_mut(&mut state, bucket)?.acl = acl;
        Ok(())
    }

    async fn get_object_acl(&self, bucket: &str, key: &str) -> Result<AccessControlList> {
        let state = self.state.lock();
        Ok(object_ref(&state, bucket, key)?.acl.clone())
    }

    async fn put_object_acl(&self, bucket: &str, key: &str, acl: AccessControlList) -> Result<()> {
        let mut state = self.state.lock();
        let object = bucket_mut(&mut state, bucket)?
            .objects
            .get_mut(key)
            .ok_or_else(|| RadulaError::no_such_key(bucket, key))?;
        object.acl = acl;
        Ok(())
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String> {
        let mut state = self.state.lock();
        bucket_ref(&state, bucket)?;
        let upload_id = Uuid::new_v4().to_string();
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                info: UploadInfo {
                    upload_id: upload_id.clone(),
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    initiated: Utc::now(),
                },
                parts: BTreeMap::new(),
            },
        );
        debug!("Initiated multipart upload: {} for {}/{}", upload_id, bucket, key);
        Ok(upload_id)
    }

    async fn upload_part(&self, upload_id: &str, part_number: u32, data: Bytes) -> Result<String> {
        self.part_attempts.fetch_add(1, Ordering::SeqCst);
        if part_number == 0 {
            return Err(RadulaError::InvalidPart("part numbers start at 1".to_string()));
        }
        if let Some(err) = self.take_injected_failure(part_number) {
            return Err(err);
        }

        let mut state = self.state.lock();
        let upload = state
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| RadulaError::NoSuchUpload(upload_id.to_string()))?;
        let etag = calculate_etag(&data);
        upload.parts.insert(part_number, (data, etag.clone()));
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<ObjectInfo> {
        let parts = ordered_parts(parts)?;
        let mut state = self.state.lock();
        let upload = state
            .uploads
            .get(upload_id)
            .ok_or_else(|| RadulaError::NoSuchUpload(upload_id.to_string()))?;

        let mut chunks = Vec::with_capacity(parts.len());
        for part in &parts {
            match upload.parts.get(&part.part_number) {
                Some((data, etag)) if *etag == part.etag => chunks.push(data.clone()),
                Some(_) => {
                    return Err(RadulaError::InvalidPart(format!(
                        "etag mismatch for part {}",
                        part.part_number
                    )))
                }
                None => {
                    return Err(RadulaError::InvalidPart(format!(
                        "part {} was never uploaded",
                        part.part_number
                    )))
                }
            }
        }

        let mut assembled = Vec::with_capacity(chunks.iter().map(|c| c.len()).sum());
        for chunk in &chunks {
            assembled.extend_from_slice(chunk);
        }
        let digests: Vec<md5::Digest> = chunks.iter().map(|c| md5::compute(c)).collect();
        let etag = multipart_etag(&digests);
        let bucket = upload.info.bucket.clone();
        let key = upload.info.key.clone();

        let info = ObjectInfo {
            bucket: bucket.clone(),
            key: key.clone(),
            size: assembled.len() as u64,
            etag,
            last_modified: Utc::now(),
            content_type: "binary/octet-stream".to_string(),
        };
        let entry = bucket_mut(&mut state, &bucket)?;
        entry.objects.insert(
            key.clone(),
            ObjectEntry {
                data: Bytes::from(assembled),
                info: info.clone(),
                acl: AccessControlList::private(&self.owner),
            },
        );
        state.uploads.remove(upload_id);
        debug!("Multipart upload completed: {}/{}, size: {} bytes", bucket, key, info.size);
        Ok(info)
    }

    async fn abort_multipart_upload(&self, upload_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.uploads.remove(upload_id).is_none() {
            return Err(RadulaError::NoSuchUpload(upload_id.to_string()));
        }
        debug!("Aborted multipart upload: {}", upload_id);
        Ok(())
    }

    async fn list_multipart_uploads(&self, bucket: &str) -> Result<Vec<UploadInfo>> {
        let state = self.state.lock();
        bucket_ref(&state, bucket)?;
        let mut uploads: Vec<UploadInfo> = state
            .uploads
            .values()
            .filter(|u| u.info.bucket == bucket)
            .map(|u| u.info.clone())
            .collect();
        uploads.sort_by(|a, b| a.initiated.cmp(&b.initiated));
        Ok(uploads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::CannedAcl;

    fn store() -> MemoryStore {
        MemoryStore::new(Owner::new("owner"))
    }

    #[tokio::test]
    async fn test_new_objects_get_private_acl() {
        let store = store();
        store.create_bucket("tests").await.unwrap();
        store.put_object("tests", "a", Bytes::from_static(b"x")).await.unwrap();

        let acl = store.get_object_acl("tests", "a").await.unwrap();
        assert!(acl.same_grants(&CannedAcl::Private.to_acl(store.owner())));
    }

    #[tokio::test]
    async fn test_overwrite_resets_acl() {
        let store = store();
        store.create_bucket("tests").await.unwrap();
        store.put_object("tests", "a", Bytes::from_static(b"x")).await.unwrap();
        store
            .put_object_acl("tests", "a", CannedAcl::PublicRead.to_acl(store.owner()))
            .await
            .unwrap();
        store.put_object("tests", "a", Bytes::from_static(b"y")).await.unwrap();

        let acl = store.get_object_acl("tests", "a").await.unwrap();
        assert_eq!(acl.grants().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_bucket_requires_empty() {
        let store = store();
        store.create_bucket("tests").await.unwrap();
        store.put_object("tests", "a", Bytes::from_static(b"x")).await.unwrap();
        assert!(matches!(
            store.delete_bucket("tests").await,
            Err(RadulaError::BucketNotEmpty(_))
        ));
        store.delete_object("tests", "a").await.unwrap();
        store.delete_bucket("tests").await.unwrap();
        assert!(!store.bucket_exists("tests").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_bucket_rejected() {
        let store = store();
        store.create_bucket("tests").await.unwrap();
        assert!(matches!(
            store.create_bucket("tests").await,
            Err(RadulaError::BucketAlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_multipart_assembles_in_part_order() {
        let store = store();
        store.create_bucket("tests").await.unwrap();
        let upload_id = store.create_multipart_upload("tests", "big").await.unwrap();

        let etag2 = store
            .upload_part(&upload_id, 2, Bytes::from_static(b"BB"))
            .await
            .unwrap();
        let etag1 = store
            .upload_part(&upload_id, 1, Bytes::from_static(b"AAA"))
            .await
            .unwrap();

        // nothing visible before completion
        assert!(store.head_object("tests", "big").await.is_err());

        let info = store
            .complete_multipart_upload(
                &upload_id,
                vec![
                    CompletedPart { part_number: 2, etag: etag2 },
                    CompletedPart { part_number: 1, etag: etag1 },
                ],
            )
            .await
            .unwrap();
        assert_eq!(info.size, 5);
        assert!(info.etag.ends_with("-2"));

        let (data, _) = store.get_object("tests", "big").await.unwrap();
        assert_eq!(&data[..], b"AAABB");
        assert!(store.list_multipart_uploads("tests").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_complete_with_wrong_etag_fails() {
        let store = store();
        store.create_bucket("tests").await.unwrap();
        let upload_id = store.create_multipart_upload("tests", "big").await.unwrap();
        store
            .upload_part(&upload_id, 1, Bytes::from_static(b"A"))
            .await
            .unwrap();
        let result = store
            .complete_multipart_upload(
                &upload_id,
                vec![CompletedPart { part_number: 1, etag: "bogus".into() }],
            )
            .await;
        assert!(matches!(result, Err(RadulaError::InvalidPart(_))));
        assert!(store.head_object("tests", "big").await.is_err());
    }

    #[tokio::test]
    async fn test_abort_discards_upload() {
        let store = store();
        store.create_bucket("tests").await.unwrap();
        let upload_id = store.create_multipart_upload("tests", "big").await.unwrap();
        assert_eq!(store.list_multipart_uploads("tests").await.unwrap().len(), 1);

        store.abort_multipart_upload(&upload_id).await.unwrap();
        assert!(store.list_multipart_uploads("tests").await.unwrap().is_empty());
        assert!(matches!(
            store.upload_part(&upload_id, 1, Bytes::from_static(b"A")).await,
            Err(RadulaError::NoSuchUpload(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = store();
        store.create_bucket("tests").await.unwrap();
        let upload_id = store.create_multipart_upload("tests", "big").await.unwrap();
        store.inject_part_failures(1);

        let first = store.upload_part(&upload_id, 1, Bytes::from_static(b"A")).await;
        assert!(matches!(first, Err(RadulaError::Injected(_))));
        assert!(store.upload_part(&upload_id, 1, Bytes::from_static(b"A")).await.is_ok());
        assert_eq!(store.part_attempts(), 2);
    }
}
