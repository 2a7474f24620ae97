use crate::acl::{AccessControlList, CannedAcl, Grant};
use crate::display::{acl_lines, grant_line};
use crate::error::Result;
use crate::output::Transcript;
use crate::radula::Context;
use crate::subject::Subject;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDifference {
    pub key: String,
    /// Grants only the key has, then grants only the bucket has.
    pub grants: Vec<Grant>,
}

#[derive(Debug, Clone)]
pub struct AclComparison {
    pub bucket: String,
    pub bucket_acl: AccessControlList,
    pub bucket_drift: Vec<Grant>,
    pub identical: usize,
    pub different: Vec<KeyDifference>,
}

impl AclComparison {
    pub fn keys_scanned(&self) -> usize {
        self.identical + self.different.len()
    }
}

pub fn symmetric_difference(left: &AccessControlList, right: &AccessControlList) -> Vec<Grant> {
    left.missing_from(right)
        .into_iter()
        .chain(right.missing_from(left))
        .cloned()
        .collect()
}

pub async fn compare_acl(
    ctx: &Context,
    out: &Transcript,
    subject: &Subject,
    canned: CannedAcl,
) -> Result<AclComparison> {
    let subject = subject.clone().resolve(ctx.store()).await?;
    let bucket = subject.bucket();

    let bucket_acl = ctx.store().get_bucket_acl(bucket).await?;
    out.line(format!("Bucket ACL for: {}", bucket));
    for line in acl_lines(&bucket_acl) {
        out.line(line);
    }

    let template = canned.to_acl(bucket_acl.owner());
    let bucket_drift = symmetric_difference(&bucket_acl, &template);
    if !bucket_drift.is_empty() {
        out.line(format!("Bucket ACL differs from {}:", canned));
        for grant in &bucket_drift {
            out.line(grant_line(grant, bucket_acl.owner()));
        }
    }

    let mut identical = 0;
    let mut different = Vec::new();
    for key in ctx.store().list_keys(bucket).await? {
        let key_acl = ctx.store().get_object_acl(bucket, &key).await?;
        let grants = symmetric_difference(&key_acl, &bucket_acl);
        if grants.is_empty() {
            identical += 1;
            continue;
        }
        out.line(format!("Difference in {}:", key));
        for grant in &grants {
            out.line(grant_line(grant, bucket_acl.owner()));
        }
        different.push(KeyDifference { key, grants });
    }

    out.line(format!("Keys with identical ACL: {}", identical));
    out.line(format!("Keys with different ACL: {}", different.len()));
    debug!(
        "compared {} keys in {} against bucket ACL ({} differ)",
        identical + different.len(),
        bucket,
        different.len()
    );

    Ok(AclComparison {
        bucket: bucket.to_string(),
        bucket_acl,
        bucket_drift,
        identical,
        different,
    })
}
