use super::{
    calculate_etag, multipart_etag, ordered_parts, validate_bucket_name, BucketInfo,
    CompletedPart, ObjectInfo, ObjectStore, UploadInfo,
};
use crate::acl::{AccessControlList, Owner};
use crate::error::{RadulaError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

const BUCKET_RECORD: &str = ".bucket";
const META_DIR: &str = ".meta";
const MULTIPART_DIR: &str = ".multipart";
const UPLOAD_RECORD: &str = "upload.json";

#[derive(Serialize, Deserialize)]
struct BucketRecord {
    info: BucketInfo,
    acl: AccessControlList,
}

#[derive(Serialize, Deserialize)]
struct ObjectRecord {
    info: ObjectInfo,
    acl: AccessControlList,
}

/// Store backed by a local directory.
///
/// ```text
/// {base}/{bucket}/.bucket                        bucket info + ACL
/// {base}/{bucket}/{key}                          object bytes
/// {base}/{bucket}/.meta/{key}.json               object info + ACL
/// {base}/{bucket}/.multipart/{upload_id}/...     staged parts
/// ```
///
/// Object bytes are written to a staging file and renamed into place, so a
/// key never holds a partially written object.
pub struct FsStore {
    base_path: PathBuf,
    owner: Owner,
}

impl FsStore {
    pub fn new(base_path: impl Into<PathBuf>, owner: Owner) -> Result<Self> {
        let base_path = base_path.into();

        // Create base directory if it doesn't exist
        std::fs::create_dir_all(&base_path)?;

        Ok(Self { base_path, owner })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.base_path.join(bucket)
    }

    fn bucket_record_path(&self, bucket: &str) -> PathBuf {
        self.bucket_path(bucket).join(BUCKET_RECORD)
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.bucket_path(bucket).join(key)
    }

    fn record_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.bucket_path(bucket)
            .join(META_DIR)
            .join(format!("{}.json", key))
    }

    fn multipart_root(&self, bucket: &str) -> PathBuf {
        self.bucket_path(bucket).join(MULTIPART_DIR)
    }

    fn staging_path(&self, bucket: &str) -> PathBuf {
        self.multipart_root(bucket)
            .join(format!("staging-{}", Uuid::new_v4()))
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        if self.bucket_exists(bucket).await? {
            Ok(())
        } else {
            Err(RadulaError::NoSuchBucket(bucket.to_string()))
        }
    }

    async fn load_bucket(&self, bucket: &str) -> Result<BucketRecord> {
        self.ensure_bucket(bucket).await?;
        let json = fs::read_to_string(self.bucket_record_path(bucket)).await?;
        Ok(serde_json::from_str(&json)?)
    }

    async fn save_bucket(&self, bucket: &str, record: &BucketRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        fs::write(self.bucket_record_path(bucket), json).await?;
        Ok(())
    }

    async fn load_object(&self, bucket: &str, key: &str) -> Result<ObjectRecord> {
        self.ensure_bucket(bucket).await?;
        validate_key(key)?;
        match fs::read_to_string(self.record_path(bucket, key)).await {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RadulaError::no_such_key(bucket, key))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save_object(&self, bucket: &str, key: &str, record: &ObjectRecord) -> Result<()> {
        let path = self.record_path(bucket, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string(record)?;
        fs::write(path, json).await?;
        Ok(())
    }

    async fn publish(&self, staged: &Path, info: ObjectInfo) -> Result<ObjectInfo> {
        let object_path = self.object_path(&info.bucket, &info.key);
        if let Some(parent) = object_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(staged, &object_path).await?;

        let record = ObjectRecord {
            info,
            acl: AccessControlList::private(&self.owner),
        };
        self.save_object(&record.info.bucket, &record.info.key, &record)
            .await?;
        Ok(record.info)
    }

    async fn load_upload(&self, upload_id: &str) -> Result<(UploadInfo, PathBuf)> {
        let id = Uuid::parse_str(upload_id)
            .map_err(|_| RadulaError::NoSuchUpload(upload_id.to_string()))?;
        for bucket in self.list_buckets().await? {
            let dir = self.multipart_root(&bucket.name).join(id.to_string());
            let record = dir.join(UPLOAD_RECORD);
            if fs::try_exists(&record).await? {
                let json = fs::read_to_string(&record).await?;
                return Ok((serde_json::from_str(&json)?, dir));
            }
        }
        Err(RadulaError::NoSuchUpload(upload_id.to_string()))
    }

    async fn prune_empty_dirs(&self, bucket: &str, start: Option<&Path>) {
        let bucket_root = self.bucket_path(bucket);
        let mut current = start.map(Path::to_path_buf);
        while let Some(dir) = current {
            if dir == bucket_root || !dir.starts_with(&bucket_root) {
                break;
            }
            if fs::remove_dir(&dir).await.is_err() {
                // not empty
                break;
            }
            debug!("Removed empty directory: {:?}", dir);
            current = dir.parent().map(Path::to_path_buf);
        }
    }
}

/// Keys map onto paths, so every segment must be a plain name.
fn validate_key(key: &str) -> Result<()> {
    let bad = key.is_empty()
        || key
            .split('/')
            .any(|segment| segment.is_empty() || segment.starts_with('.'));
    if bad {
        return Err(RadulaError::InvalidArgument(format!(
            "key '{}' cannot be stored on the filesystem",
            key
        )));
    }
    Ok(())
}

async fn assemble_parts(
    dir: &Path,
    parts: &[CompletedPart],
    staged: &Path,
) -> Result<(Vec<md5::Digest>, u64)> {
    let mut out = fs::File::create(staged).await?;
    let mut digests = Vec::with_capacity(parts.len());
    let mut size = 0u64;

    for part in parts {
        let part_path = dir.join(format!("part-{}", part.part_number));
        let data = fs::read(&part_path).await.map_err(|_| {
            RadulaError::InvalidPart(format!("part {} was never uploaded", part.part_number))
        })?;
        let digest = md5::compute(&data);
        if format!("{:x}", digest) != part.etag {
            return Err(RadulaError::InvalidPart(format!(
                "etag mismatch for part {}",
                part.part_number
            )));
        }
        out.write_all(&data).await?;
        digests.push(digest);
        size += data.len() as u64;
    }
    out.flush().await?;
    Ok((digests, size))
}

async fn discard_staged<T>(staged: &Path, result: Result<T>) -> Result<T> {
    if result.is_err() {
        if let Err(e) = fs::remove_file(staged).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove staging file {:?}: {}", staged, e);
            }
        }
    }
    result
}

fn walk_keys(bucket_path: &Path) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    let walker = WalkDir::new(bucket_path)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !entry.file_name().to_string_lossy().starts_with('.'));

    for entry in walker {
        let entry = entry.map_err(|e| RadulaError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(bucket_path) {
            let key: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            keys.push(key.join("/"));
        }
    }

    keys.sort();
    Ok(keys)
}

#[async_trait]
impl ObjectStore for FsStore {
    fn owner(&self) -> &Owner {
        &self.owner
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        validate_bucket_name(bucket)?;
        let path = self.bucket_path(bucket);

        if fs::try_exists(self.bucket_record_path(bucket)).await? {
            return Err(RadulaError::BucketAlreadyExists(bucket.to_string()));
        }

        fs::create_dir_all(&path).await?;

        let record = BucketRecord {
            info: BucketInfo {
                name: bucket.to_string(),
                created: Utc::now(),
            },
            acl: AccessControlList::private(&self.owner),
        };
        self.save_bucket(bucket, &record).await?;

        info!("Created bucket: {}", bucket);
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.ensure_bucket(bucket).await?;
        if !self.list_keys(bucket).await?.is_empty() {
            return Err(RadulaError::BucketNotEmpty(bucket.to_string()));
        }

        fs::remove_dir_all(self.bucket_path(bucket)).await?;
        info!("Deleted bucket: {}", bucket);
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let mut buckets = Vec::new();
        let mut entries = fs::read_dir(&self.base_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let record_path = entry.path().join(BUCKET_RECORD);
            if !fs::try_exists(&record_path).await? {
                continue;
            }
            let json = fs::read_to_string(record_path).await?;
            match serde_json::from_str::<BucketRecord>(&json) {
                Ok(record) => buckets.push(record.info),
                Err(e) => warn!("Skipping unreadable bucket record {:?}: {}", entry.path(), e),
            }
        }

        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        if validate_bucket_name(bucket).is_err() {
            return Ok(false);
        }
        Ok(fs::try_exists(self.bucket_record_path(bucket)).await?)
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<ObjectInfo> {
        self.ensure_bucket(bucket).await?;
        validate_key(key)?;

        let staged = self.staging_path(bucket);
        if let Some(parent) = staged.parent() {
            fs::create_dir_all(parent).await?;
        }

        let info = ObjectInfo {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: data.len() as u64,
            etag: calculate_etag(&data),
            last_modified: Utc::now(),
            content_type: "application/octet-stream".to_string(),
        };
        let result = match fs::write(&staged, &data).await {
            Ok(()) => self.publish(&staged, info).await,
            Err(e) => Err(e.into()),
        };
        let info = discard_staged(&staged, result).await?;

        debug!("Stored object: {}/{} (size: {} bytes)", bucket, key, data.len());
        Ok(info)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<(Bytes, ObjectInfo)> {
        let record = self.load_object(bucket, key).await?;
        let data = fs::read(self.object_path(bucket, key)).await?;
        Ok((Bytes::from(data), record.info))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectInfo> {
        Ok(self.load_object(bucket, key).await?.info)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.load_object(bucket, key).await?;

        let object_path = self.object_path(bucket, key);
        fs::remove_file(&object_path).await?;

        let record_path = self.record_path(bucket, key);
        if let Err(e) = fs::remove_file(&record_path).await {
            warn!("Failed to remove record for {}/{}: {}", bucket, key, e);
        }

        self.prune_empty_dirs(bucket, object_path.parent()).await;
        self.prune_empty_dirs(bucket, record_path.parent()).await;

        debug!("Deleted object: {}/{}", bucket, key);
        Ok(())
    }

    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>> {
        self.ensure_bucket(bucket).await?;
        let bucket_path = self.bucket_path(bucket);
        tokio::task::spawn_blocking(move || walk_keys(&bucket_path))
            .await
            .map_err(|e| RadulaError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }

    async fn get_bucket_acl(&self, bucket: &str) -> Result<AccessControlList> {
        Ok(self.load_bucket(bucket).await?.acl)
    }

    async fn put_bucket_acl(&self, bucket: &str, acl: AccessControlList) -> Result<()> {
        let mut record = self.load_bucket(bucket).await?;
        record.acl = acl;
        self.save_bucket(bucket, &record).await
    }

    async fn get_object_acl(&self, bucket: &str, key: &str) -> Result<AccessControlList> {
        Ok(self.load_object(bucket, key).await?.acl)
    }

    async fn put_object_acl(&self, bucket: &str, key: &str, acl: AccessControlList) -> Result<()> {
        let mut record = self.load_object(bucket, key).await?;
        record.acl = acl;
        self.save_object(bucket, key, &record).await
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String> {
        self.ensure_bucket(bucket).await?;
        validate_key(key)?;

        let upload_id = Uuid::new_v4().to_string();
        let dir = self.multipart_root(bucket).join(&upload_id);
        fs::create_dir_all(&dir).await?;

        let upload = UploadInfo {
            upload_id: upload_id.clone(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            initiated: Utc::now(),
        };
        fs::write(dir.join(UPLOAD_RECORD), serde_json::to_string(&upload)?).await?;

        info!("Initiated multipart upload: {} for {}/{}", upload_id, bucket, key);
        Ok(upload_id)
    }

    async fn upload_part(&self, upload_id: &str, part_number: u32, data: Bytes) -> Result<String> {
        if part_number == 0 {
            return Err(RadulaError::InvalidPart("part numbers start at 1".to_string()));
        }
        let (_, dir) = self.load_upload(upload_id).await?;

        // write-then-rename so a retried part never leaves a torn file
        let part_path = dir.join(format!("part-{}", part_number));
        let tmp_path = dir.join(format!("part-{}.{}", part_number, Uuid::new_v4()));
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        drop(file);
        fs::rename(&tmp_path, &part_path).await?;

        Ok(calculate_etag(&data))
    }

    async fn complete_multipart_upload(
        &self,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<ObjectInfo> {
        let parts = ordered_parts(parts)?;
        let (upload, dir) = self.load_upload(upload_id).await?;

        let staged = self.staging_path(&upload.bucket);
        let result = match assemble_parts(&dir, &parts, &staged).await {
            Ok((digests, size)) => {
                let info = ObjectInfo {
                    bucket: upload.bucket.clone(),
                    key: upload.key.clone(),
                    size,
                    etag: multipart_etag(&digests),
                    last_modified: Utc::now(),
                    content_type: "binary/octet-stream".to_string(),
                };
                self.publish(&staged, info).await
            }
            Err(e) => Err(e),
        };
        let info = discard_staged(&staged, result).await?;

        if let Err(e) = fs::remove_dir_all(&dir).await {
            warn!("Failed to clean up multipart directory: {}", e);
        }

        info!(
            "Multipart upload completed: {}/{}, size: {} bytes",
            upload.bucket, upload.key, info.size
        );
        Ok(info)
    }

    async fn abort_multipart_upload(&self, upload_id: &str) -> Result<()> {
        let (_, dir) = self.load_upload(upload_id).await?;
        fs::remove_dir_all(&dir).await?;
        info!("Aborted multipart upload: {}", upload_id);
        Ok(())
    }

    async fn list_multipart_uploads(&self, bucket: &str) -> Result<Vec<UploadInfo>> {
        self.ensure_bucket(bucket).await?;
        let root = self.multipart_root(bucket);
        let mut uploads = Vec::new();
        if !fs::try_exists(&root).await? {
            return Ok(uploads);
        }

        let mut entries = fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let record = entry.path().join(UPLOAD_RECORD);
            if entry.file_type().await?.is_dir() && fs::try_exists(&record).await? {
                let json = fs::read_to_string(record).await?;
                uploads.push(serde_json::from_str::<UploadInfo>(&json)?);
            }
        }

        uploads.sort_by(|a, b| a.initiated.cmp(&b.initiated));
        Ok(uploads)
    }
}
