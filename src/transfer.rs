use crate::config::TransferConfig;
use crate::error::{RadulaError, Result};
use crate::output::Transcript;
use crate::radula::Context;
use crate::storage::{CompletedPart, ObjectInfo, ObjectStore};
use crate::subject::Subject;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub async fn upload(
    ctx: &Context,
    out: &Transcript,
    local: &Path,
    target: &Subject,
) -> Result<ObjectInfo> {
    upload_with_cancel(ctx, out, local, target, CancellationToken::new()).await
}

/// Uploads `local` to `target`, giving up as soon as `cancel` fires.
///
/// Returns only once the object can be queried. On error no object is
/// created and any multipart upload that was started has been aborted.
pub async fn upload_with_cancel(
    ctx: &Context,
    out: &Transcript,
    local: &Path,
    target: &Subject,
    cancel: CancellationToken,
) -> Result<ObjectInfo> {
    let settings = ctx.transfer();
    settings.validate()?;

    let target = target.upload_target(local)?;
    let bucket = target.bucket();
    let key = target.key().unwrap_or_default();

    if !ctx.store().bucket_exists(bucket).await? {
        return Err(RadulaError::NoSuchBucket(bucket.to_string()));
    }

    let size = tokio::fs::metadata(local).await?.len();
    if cancel.is_cancelled() {
        return Err(RadulaError::Cancelled);
    }

    if size <= settings.multipart_threshold {
        let data = tokio::fs::read(local).await?;
        ctx.store().put_object(bucket, key, Bytes::from(data)).await?;
    } else {
        multipart_upload(ctx.shared_store(), settings, local, bucket, key, size, cancel).await?;
    }

    let info = ctx.store().head_object(bucket, key).await?;
    info!("Uploaded {} to {}/{} ({} bytes)", local.display(), bucket, key, info.size);
    out.line(format!(
        "uploaded {} to {}/{} ({} bytes)",
        local.display(),
        bucket,
        key,
        info.size
    ));
    Ok(info)
}

async fn multipart_upload(
    store: Arc<dyn ObjectStore>,
    settings: &TransferConfig,
    local: &Path,
    bucket: &str,
    key: &str,
    size: u64,
    cancel: CancellationToken,
) -> Result<ObjectInfo> {
    let upload_id = store.create_multipart_upload(bucket, key).await?;
    debug!("Started multipart upload {} for {}/{}", upload_id, bucket, key);

    let outcome = match upload_parts(&store, settings, local, &upload_id, size, &cancel).await {
        Ok(parts) => store
            .complete_multipart_upload(&upload_id, parts)
            .await
            .map_err(|e| transfer_error(bucket, key, format!("completion failed: {}", e))),
        Err(PartsError::Cancelled) => Err(RadulaError::Cancelled),
        Err(PartsError::Failed(reason)) => Err(transfer_error(bucket, key, reason)),
    };

    if outcome.is_err() {
        if let Err(e) = store.abort_multipart_upload(&upload_id).await {
            if !e.is_not_found() {
                warn!("Failed to abort multipart upload {}: {}", upload_id, e);
            }
        }
    }
    outcome
}

enum PartsError {
    Cancelled,
    Failed(String),
}

impl From<RadulaError> for PartsError {
    fn from(err: RadulaError) -> Self {
        match err {
            RadulaError::Cancelled => PartsError::Cancelled,
            other => PartsError::Failed(other.to_string()),
        }
    }
}

/// Reads the file part by part and keeps at most `settings.threads` part
/// uploads in flight. The first part to fail stops the rest.
async fn upload_parts(
    store: &Arc<dyn ObjectStore>,
    settings: &TransferConfig,
    local: &Path,
    upload_id: &str,
    size: u64,
    cancel: &CancellationToken,
) -> std::result::Result<Vec<CompletedPart>, PartsError> {
    let part_count = size.div_ceil(settings.part_size);
    let part_count = u32::try_from(part_count)
        .map_err(|_| PartsError::Failed(format!("{} parts is too many", part_count)))?;

    let abort = cancel.child_token();
    let semaphore = Arc::new(Semaphore::new(settings.threads));
    let mut tasks = JoinSet::new();
    let mut file = File::open(local).await.map_err(RadulaError::from)?;

    for part_number in 1..=part_count {
        let permit = tokio::select! {
            _ = abort.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => permit
                .map_err(|_| PartsError::Failed("part scheduler closed".to_string()))?,
        };

        let offset = u64::from(part_number - 1) * settings.part_size;
        let len = settings.part_size.min(size - offset) as usize;
        let mut chunk = vec![0u8; len];
        file.read_exact(&mut chunk).await.map_err(RadulaError::from)?;

        let part = PartJob {
            store: store.clone(),
            upload_id: upload_id.to_string(),
            part_number,
            data: Bytes::from(chunk),
            retries: settings.part_retries,
            retry_delay: settings.retry_delay,
        };
        let abort = abort.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let result = part.run(&abort).await;
            if result.is_err() {
                abort.cancel();
            }
            (part.part_number, result)
        });
    }

    let mut parts = Vec::with_capacity(part_count as usize);
    let mut failure = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(part))) => parts.push(part),
            Ok((_, Err(RadulaError::Cancelled))) => {}
            Ok((part_number, Err(e))) => {
                failure.get_or_insert(format!("part {}: {}", part_number, e));
            }
            Err(e) => {
                abort.cancel();
                failure.get_or_insert(format!("part task failed: {}", e));
            }
        }
    }

    if cancel.is_cancelled() {
        return Err(PartsError::Cancelled);
    }
    if let Some(reason) = failure {
        return Err(PartsError::Failed(reason));
    }
    if parts.len() != part_count as usize {
        return Err(PartsError::Failed(format!(
            "{} of {} parts uploaded",
            parts.len(),
            part_count
        )));
    }
    debug!("Uploaded {} parts for {}", part_count, upload_id);
    Ok(parts)
}

struct PartJob {
    store: Arc<dyn ObjectStore>,
    upload_id: String,
    part_number: u32,
    data: Bytes,
    retries: u32,
    retry_delay: std::time::Duration,
}

impl PartJob {
    async fn run(&self, abort: &CancellationToken) -> Result<CompletedPart> {
        let mut attempt = 0;
        loop {
            let result = tokio::select! {
                _ = abort.cancelled() => return Err(RadulaError::Cancelled),
                result = self.store.upload_part(&self.upload_id, self.part_number, self.data.clone()) => result,
            };

            match result {
                Ok(etag) => {
                    debug!(
                        "Part {} of {} stored ({} bytes)",
                        self.part_number,
                        self.upload_id,
                        self.data.len()
                    );
                    return Ok(CompletedPart {
                        part_number: self.part_number,
                        etag,
                    });
                }
                Err(e) if e.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        "Part {} of {} failed (attempt {}/{}): {}",
                        self.part_number,
                        self.upload_id,
                        attempt,
                        self.retries + 1,
                        e
                    );
                    tokio::select! {
                        _ = abort.cancelled() => return Err(RadulaError::Cancelled),
                        _ = tokio::time::sleep(self.retry_delay * attempt) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn transfer_error(bucket: &str, key: &str, reason: String) -> RadulaError {
    RadulaError::Transfer {
        bucket: bucket.to_string(),
        key: key.to_string(),
        reason,
    }
}

pub async fn download(
    ctx: &Context,
    out: &Transcript,
    subject: &Subject,
    local: &Path,
) -> Result<PathBuf> {
    let key = subject.key().ok_or_else(|| {
        RadulaError::InvalidArgument(format!("{} does not name a key", subject))
    })?;
    let bucket = subject.bucket();
    let (data, info) = ctx.store().get_object(bucket, key).await?;

    let dest = if tokio::fs::metadata(local).await.map(|m| m.is_dir()).unwrap_or(false) {
        local.join(key.rsplit('/').next().unwrap_or(key))
    } else {
        local.to_path_buf()
    };

    let file_name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| RadulaError::InvalidArgument(format!("bad destination {}", dest.display())))?;
    let temp = dest.with_file_name(format!(".{}.{}.part", file_name, Uuid::new_v4()));

    let written = match tokio::fs::write(&temp, &data).await {
        Ok(()) => tokio::fs::rename(&temp, &dest).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e.into());
    }

    debug!("Downloaded {}/{} ({} bytes)", bucket, key, info.size);
    out.line(format!("downloaded {}/{} to {}", bucket, key, dest.display()));
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::Owner;
    use crate::storage::MemoryStore;
    use std::time::Duration;

    fn small_parts() -> TransferConfig {
        TransferConfig {
            multipart_threshold: 1024,
            part_size: 256,
            threads: 3,
            part_retries: 2,
            retry_delay: Duration::from_millis(1),
        }
    }

    async fn setup(settings: TransferConfig) -> (Arc<MemoryStore>, Context) {
        let store = Arc::new(MemoryStore::new(Owner::new("abc123")));
        store.create_bucket("tests").await.unwrap();
        let ctx = Context::new(store.clone(), settings);
        (store, ctx)
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, len: usize) -> (PathBuf, Vec<u8>) {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let path = dir.path().join(name);
        std::fs::write(&path, &data).unwrap();
        (path, data)
    }

    #[tokio::test]
    async fn test_small_file_is_single_put() {
        let (store, ctx) = setup(small_parts()).await;
        let dir = tempfile::tempdir().unwrap();
        let (path, data) = write_file(&dir, "data.txt", 100);
        let out = Transcript::capture();

        let info = upload(&ctx, &out, &path, &Subject::parse("tests").unwrap())
            .await
            .unwrap();
        assert_eq!(info.key, "data.txt");
        assert_eq!(info.size, 100);
        assert_eq!(store.part_attempts(), 0);

        let (stored, _) = store.get_object("tests", "data.txt").await.unwrap();
        assert_eq!(stored.as_ref(), data.as_slice());
    }

    #[tokio::test]
    async fn test_large_file_goes_multipart() {
        let (store, ctx) = setup(small_parts()).await;
        let dir = tempfile::tempdir().unwrap();
        let (path, data) = write_file(&dir, "big.bin", 2000);
        let out = Transcript::capture();

        let info = upload(&ctx, &out, &path, &Subject::parse("tests/big.bin").unwrap())
            .await
            .unwrap();
        assert!(info.etag.ends_with("-8"));
        assert_eq!(store.part_attempts(), 8);

        let (stored, _) = store.get_object("tests", "big.bin").await.unwrap();
        assert_eq!(stored.as_ref(), data.as_slice());
        assert!(store.list_multipart_uploads("tests").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_bucket() {
        let (_, ctx) = setup(small_parts()).await;
        let dir = tempfile::tempdir().unwrap();
        let (path, _) = write_file(&dir, "data.txt", 10);
        let out = Transcript::capture();

        let err = upload(&ctx, &out, &path, &Subject::parse("nope").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RadulaError::NoSuchBucket(_)));
        assert!(out.lines().is_empty());
    }

    #[tokio::test]
    async fn test_download_into_directory() {
        let (store, ctx) = setup(small_parts()).await;
        store
            .put_object("tests", "nested/data.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let out = Transcript::capture();

        let dest = download(
            &ctx,
            &out,
            &Subject::parse("tests/nested/data.txt").unwrap(),
            dir.path(),
        )
        .await
        .unwrap();
        assert_eq!(dest, dir.path().join("data.txt"));
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello");
        assert!(out.contains(&format!(
            "downloaded tests/nested/data.txt to {}",
            dest.display()
        )));
    }

    #[tokio::test]
    async fn test_download_failure_leaves_no_temp_file() {
        let (store, ctx) = setup(small_parts()).await;
        store
            .put_object("tests", "data.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        // a non-empty directory sits where the file should land
        std::fs::create_dir_all(dir.path().join("data.txt/keep")).unwrap();

        let result = download(
            &ctx,
            &Transcript::capture(),
            &Subject::parse("tests/data.txt").unwrap(),
            dir.path(),
        )
        .await;
        assert!(result.is_err());

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["data.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_download_needs_key() {
        let (_, ctx) = setup(small_parts()).await;
        let dir = tempfile::tempdir().unwrap();
        let err = download(
            &ctx,
            &Transcript::capture(),
            &Subject::parse("tests").unwrap(),
            dir.path(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RadulaError::InvalidArgument(_)));
    }
}
