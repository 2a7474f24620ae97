pub mod filesystem;
pub mod memory;

use crate::acl::{AccessControlList, Owner};
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use filesystem::FsStore;
pub use memory::MemoryStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadInfo {
    pub upload_id: String,
    pub bucket: String,
    pub key: String,
    pub initiated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Identity that owns every bucket and key in this store.
    fn owner(&self) -> &Owner;

    // Bucket operations
    async fn create_bucket(&self, bucket: &str) -> Result<()>;
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>>;
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    // Object operations
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<ObjectInfo>;
    async fn get_object(&self, bucket: &str, key: &str) -> Result<(Bytes, ObjectInfo)>;
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectInfo>;
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;
    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>>;

    // ACLs
    async fn get_bucket_acl(&self, bucket: &str) -> Result<AccessControlList>;
    async fn put_bucket_acl(&self, bucket: &str, acl: AccessControlList) -> Result<()>;
    async fn get_object_acl(&self, bucket: &str, key: &str) -> Result<AccessControlList>;
    async fn put_object_acl(&self, bucket: &str, key: &str, acl: AccessControlList) -> Result<()>;

    // Multipart uploads
    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String>;
    async fn upload_part(&self, upload_id: &str, part_number: u32, data: Bytes) -> Result<String>;
    /// Assembles the listed parts in part-number order. The object becomes
    /// visible only once this returns.
    async fn complete_multipart_upload(
        &self,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<ObjectInfo>;
    async fn abort_multipart_upload(&self, upload_id: &str) -> Result<()>;
    async fn list_multipart_uploads(&self, bucket: &str) -> Result<Vec<UploadInfo>>;
}

pub(crate) fn calculate_etag(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

pub(crate) fn multipart_etag(part_digests: &[md5::Digest]) -> String {
    let mut context = md5::Context::new();
    for digest in part_digests {
        context.consume(digest.0);
    }
    format!("{:x}-{}", context.compute(), part_digests.len())
}

pub(crate) fn ordered_parts(mut parts: Vec<CompletedPart>) -> Result<Vec<CompletedPart>> {
    use crate::error::RadulaError;

    if parts.is_empty() {
        return Err(RadulaError::InvalidPart("no parts listed".to_string()));
    }
    parts.sort_by_key(|p| p.part_number);
    for (idx, part) in parts.iter().enumerate() {
        let expected = idx as u32 + 1;
        if part.part_number != expected {
            return Err(RadulaError::InvalidPart(format!(
                "expected part {}, got {}",
                expected, part.part_number
            )));
        }
    }
    Ok(parts)
}

pub(crate) fn validate_bucket_name(bucket: &str) -> Result<()> {
    use crate::error::RadulaError;

    if bucket.is_empty() || bucket.starts_with('.') || bucket.contains('/') {
        return Err(RadulaError::InvalidArgument(format!(
            "invalid bucket name: '{}'",
            bucket
        )));
    }
    Ok(())
}
