use crate::acl::{AccessControlList, CannedAcl, Owner};
use crate::command::Command;
use crate::config::TransferConfig;
use crate::diff::{self, AclComparison};
use crate::display::acl_lines;
use crate::error::{RadulaError, Result};
use crate::grant::{self, AccessMode};
use crate::output::Transcript;
use crate::storage::{BucketInfo, ObjectInfo, ObjectStore, UploadInfo};
use crate::subject::Subject;
use crate::transfer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct Context {
    store: Arc<dyn ObjectStore>,
    transfer: TransferConfig,
}

impl Context {
    pub fn new(store: Arc<dyn ObjectStore>, transfer: TransferConfig) -> Self {
        Self { store, transfer }
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub fn shared_store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    pub fn owner(&self) -> &Owner {
        self.store.owner()
    }

    pub fn transfer(&self) -> &TransferConfig {
        &self.transfer
    }
}

/// One method per command. Report lines go to the transcript.
///
/// ```
/// use std::sync::Arc;
/// use radula::{Context, MemoryStore, Owner, Radula, Transcript, TransferConfig};
///
/// tokio_test::block_on(async {
///     let store = Arc::new(MemoryStore::new(Owner::new("abc123")));
///     let radula = Radula::new(
///         Context::new(store, TransferConfig::default()),
///         Transcript::capture(),
///     );
///     radula.make_bucket("tests").await.unwrap();
///     radula.get_acl("tests").await.unwrap();
///     assert!(radula
///         .transcript()
///         .contains("[CanonicalUser:OWNER] None = FULL_CONTROL"));
/// });
/// ```
pub struct Radula {
    ctx: Context,
    out: Transcript,
}

impl Radula {
    pub fn new(ctx: Context, out: Transcript) -> Self {
        Self { ctx, out }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn transcript(&self) -> &Transcript {
        &self.out
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        let name = command.name();
        debug!("Running {}", name);
        let result = self.dispatch(command).await;
        if let Err(e) = &result {
            debug!("{} failed with {}: {}", name, e.error_code(), e);
        }
        result
    }

    async fn dispatch(&self, command: Command) -> Result<()> {
        match command {
            Command::Upload(args) => {
                self.upload(&args.local, &args.target).await?;
            }
            Command::Download(args) => {
                self.download(&args.subject, &args.local).await?;
            }
            Command::Allow(args) => {
                self.allow_user(&args.user, &args.subject, args.mode).await?;
            }
            Command::Disallow(args) => {
                self.disallow_user(&args.user, &args.subject, args.mode).await?;
            }
            Command::GetAcl { subject } => {
                self.get_acl(&subject).await?;
            }
            Command::SetAcl(args) => {
                self.set_acl(&args.subject, &args.acl).await?;
            }
            Command::CompareAcl(args) => {
                self.compare_acl(&args.subject, &args.acl).await?;
            }
            Command::SyncAcl { subject } => {
                self.sync_acl(&subject).await?;
            }
            Command::MakeBucket { bucket } => self.make_bucket(&bucket).await?,
            Command::RemoveBucket { bucket } => self.remove_bucket(&bucket).await?,
            Command::ListBuckets => {
                self.list_buckets().await?;
            }
            Command::ListKeys { bucket } => {
                self.list_keys(&bucket).await?;
            }
            Command::RemoveKey { subject } => self.remove_key(&subject).await?,
            Command::MultipartList { bucket } => {
                self.multipart_list(&bucket).await?;
            }
            Command::MultipartClean { bucket } => {
                self.multipart_clean(&bucket).await?;
            }
        }
        Ok(())
    }

    pub async fn make_bucket(&self, bucket: &str) -> Result<()> {
        self.ctx.store().create_bucket(bucket).await?;
        info!("Created bucket: {}", bucket);
        self.out.line(format!("created bucket {}", bucket));
        Ok(())
    }

    pub async fn remove_bucket(&self, bucket: &str) -> Result<()> {
        self.ctx.store().delete_bucket(bucket).await?;
        info!("Deleted bucket: {}", bucket);
        self.out.line(format!("removed bucket {}", bucket));
        Ok(())
    }

    pub async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let buckets = self.ctx.store().list_buckets().await?;
        for bucket in &buckets {
            self.out.line(bucket.name.clone());
        }
        Ok(buckets)
    }

    pub async fn list_keys(&self, bucket: &str) -> Result<Vec<String>> {
        let keys = self.ctx.store().list_keys(bucket).await?;
        for key in &keys {
            self.out.line(key.clone());
        }
        Ok(keys)
    }

    pub async fn remove_key(&self, subject: &str) -> Result<()> {
        let subject = Subject::parse(subject)?;
        let key = subject.key().ok_or_else(|| {
            RadulaError::InvalidArgument(format!("{} does not name a key", subject))
        })?;
        self.ctx.store().delete_object(subject.bucket(), key).await?;
        self.out.line(format!("removed {}", subject));
        Ok(())
    }

    pub async fn upload(&self, local: impl AsRef<Path>, target: &str) -> Result<ObjectInfo> {
        let target = Subject::parse(target)?;
        transfer::upload(&self.ctx, &self.out, local.as_ref(), &target).await
    }

    pub async fn upload_with_cancel(
        &self,
        local: impl AsRef<Path>,
        target: &str,
        cancel: CancellationToken,
    ) -> Result<ObjectInfo> {
        let target = Subject::parse(target)?;
        transfer::upload_with_cancel(&self.ctx, &self.out, local.as_ref(), &target, cancel).await
    }

    pub async fn download(&self, subject: &str, local: impl AsRef<Path>) -> Result<PathBuf> {
        let subject = Subject::parse(subject)?;
        transfer::download(&self.ctx, &self.out, &subject, local.as_ref()).await
    }

    pub async fn allow_user(&self, user: &str, subject: &str, mode: AccessMode) -> Result<usize> {
        let subject = Subject::parse(subject)?;
        grant::allow_user(&self.ctx, &self.out, user, &subject, mode).await
    }

    pub async fn disallow_user(&self, user: &str, subject: &str, mode: AccessMode) -> Result<usize> {
        let subject = Subject::parse(subject)?;
        grant::disallow_user(&self.ctx, &self.out, user, &subject, mode).await
    }

    pub async fn get_acl(&self, subject: &str) -> Result<AccessControlList> {
        let subject = Subject::parse(subject)?.resolve(self.ctx.store()).await?;
        let acl = match subject.key() {
            Some(key) => {
                let acl = self.ctx.store().get_object_acl(subject.bucket(), key).await?;
                self.out.line(format!("ACL for key: {}", key));
                acl
            }
            None => {
                let acl = self.ctx.store().get_bucket_acl(subject.bucket()).await?;
                self.out.line(format!("ACL for bucket: {}", subject.bucket()));
                acl
            }
        };
        self.print_acl(&acl);
        Ok(acl)
    }

    /// Replaces the subject's ACL with a canned one. The name is checked
    /// before the store is touched.
    pub async fn set_acl(&self, subject: &str, acl: &str) -> Result<AccessControlList> {
        let canned: CannedAcl = acl.parse()?;
        let subject = Subject::parse(subject)?.resolve(self.ctx.store()).await?;
        let bucket = subject.bucket();
        let acl = canned.to_acl(self.ctx.owner());

        match subject.key() {
            Some(key) => {
                self.ctx.store().put_object_acl(bucket, key, acl.clone()).await?;
                self.out.line(format!("ACL for key: {}", key));
                self.print_acl(&acl);
            }
            None => {
                self.ctx.store().put_bucket_acl(bucket, acl.clone()).await?;
                self.out.line(format!("Bucket ACL for: {}", bucket));
                self.print_acl(&acl);
                for key in self.ctx.store().list_keys(bucket).await? {
                    self.out.line(format!("Setting bucket's ACL on {}", key));
                }
            }
        }
        info!("Set {} ACL on {}", canned, subject);
        Ok(acl)
    }

    pub async fn compare_acl(&self, subject: &str, acl: &str) -> Result<AclComparison> {
        let canned: CannedAcl = acl.parse()?;
        let subject = Subject::parse(subject)?;
        diff::compare_acl(&self.ctx, &self.out, &subject, canned).await
    }

    pub async fn sync_acl(&self, subject: &str) -> Result<Vec<String>> {
        let subject = Subject::parse(subject)?.resolve(self.ctx.store()).await?;
        let bucket = subject.bucket();
        let acl = self.ctx.store().get_bucket_acl(bucket).await?;

        let keys = match subject.key() {
            Some(key) => vec![key.to_string()],
            None => self.ctx.store().list_keys(bucket).await?,
        };
        for key in &keys {
            self.out.line(format!("Setting bucket's ACL on {}", key));
            self.ctx.store().put_object_acl(bucket, key, acl.clone()).await?;
        }
        info!("Synced bucket ACL of {} onto {} keys", bucket, keys.len());
        Ok(keys)
    }

    pub async fn multipart_list(&self, bucket: &str) -> Result<Vec<UploadInfo>> {
        let uploads = self.ctx.store().list_multipart_uploads(bucket).await?;
        for upload in &uploads {
            self.out.line(format!(
                "{} {} {}",
                upload.upload_id,
                upload.key,
                upload.initiated.to_rfc3339()
            ));
        }
        Ok(uploads)
    }

    pub async fn multipart_clean(&self, bucket: &str) -> Result<usize> {
        let uploads = self.ctx.store().list_multipart_uploads(bucket).await?;
        let mut aborted = 0;
        for upload in &uploads {
            match self.ctx.store().abort_multipart_upload(&upload.upload_id).await {
                Ok(()) => {
                    aborted += 1;
                    self.out
                        .line(format!("aborted {} ({})", upload.upload_id, upload.key));
                }
                // finished or aborted by someone else meanwhile
                Err(e) if e.is_not_found() => {
                    warn!("Upload {} disappeared before abort", upload.upload_id)
                }
                Err(e) => return Err(e),
            }
        }
        self.out.line(format!("aborted {} uploads", aborted));
        Ok(aborted)
    }

    fn print_acl(&self, acl: &AccessControlList) {
        for line in acl_lines(acl) {
            self.out.line(line);
        }
    }
}
