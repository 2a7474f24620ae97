use crate::acl::{AccessControlList, Grant, Grantee, Permission};
use crate::error::Result;
use crate::output::Transcript;
use crate::radula::Context;
use crate::subject::Subject;
use std::fmt;
use tracing::debug;

/// Which permission pairs a grant or revoke touches.
///
/// `DefaultRead` is what an invocation without `-r`/`-w` asks for; it covers
/// the same permissions as `Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    DefaultRead,
    Read,
    Write,
    ReadWrite,
}

impl AccessMode {
    pub fn from_flags(read: bool, write: bool) -> Self {
        match (read, write) {
            (false, false) => AccessMode::DefaultRead,
            (true, false) => AccessMode::Read,
            (false, true) => AccessMode::Write,
            (true, true) => AccessMode::ReadWrite,
        }
    }

    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            AccessMode::DefaultRead | AccessMode::Read => &[Permission::Read, Permission::ReadAcp],
            AccessMode::Write => &[Permission::Write, Permission::WriteAcp],
            AccessMode::ReadWrite => &[
                Permission::Read,
                Permission::ReadAcp,
                Permission::Write,
                Permission::WriteAcp,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Change {
    Grant,
    Revoke,
}

enum Target<'a> {
    Bucket(&'a str),
    Key(&'a str, &'a str),
}

impl fmt::Display for Target<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Bucket(bucket) => write!(f, "bucket {}", bucket),
            Target::Key(_, key) => write!(f, "key {}", key),
        }
    }
}

impl Target<'_> {
    async fn load(&self, ctx: &Context) -> Result<AccessControlList> {
        match self {
            Target::Bucket(bucket) => ctx.store().get_bucket_acl(bucket).await,
            Target::Key(bucket, key) => ctx.store().get_object_acl(bucket, key).await,
        }
    }

    async fn save(&self, ctx: &Context, acl: AccessControlList) -> Result<()> {
        match self {
            Target::Bucket(bucket) => ctx.store().put_bucket_acl(bucket, acl).await,
            Target::Key(bucket, key) => ctx.store().put_object_acl(bucket, key, acl).await,
        }
    }
}

/// A key subject only touches that key. A bucket subject updates every key
/// in the bucket and then the bucket itself. One line is written per
/// permission and target, whether or not the grant already existed.
/// Returns how many grants were actually added.
pub async fn allow_user(
    ctx: &Context,
    out: &Transcript,
    user: &str,
    subject: &Subject,
    mode: AccessMode,
) -> Result<usize> {
    apply(ctx, out, user, subject, mode, Change::Grant).await
}

pub async fn disallow_user(
    ctx: &Context,
    out: &Transcript,
    user: &str,
    subject: &Subject,
    mode: AccessMode,
) -> Result<usize> {
    apply(ctx, out, user, subject, mode, Change::Revoke).await
}

async fn apply(
    ctx: &Context,
    out: &Transcript,
    user: &str,
    subject: &Subject,
    mode: AccessMode,
    change: Change,
) -> Result<usize> {
    let subject = subject.clone().resolve(ctx.store()).await?;
    let grantee = Grantee::user(user);
    let bucket = subject.bucket();

    let keys = match subject.key() {
        Some(key) => vec![key.to_string()],
        None => ctx.store().list_keys(bucket).await?,
    };

    let mut changed = 0;
    for key in &keys {
        changed += apply_to(ctx, out, &grantee, user, &Target::Key(bucket, key), mode, change).await?;
    }
    if subject.is_bucket() {
        changed += apply_to(ctx, out, &grantee, user, &Target::Bucket(bucket), mode, change).await?;
    }

    debug!(
        "{:?} {:?} for {} on {}: {} grants changed",
        change, mode, user, subject, changed
    );
    Ok(changed)
}

async fn apply_to(
    ctx: &Context,
    out: &Transcript,
    grantee: &Grantee,
    user: &str,
    target: &Target<'_>,
    mode: AccessMode,
    change: Change,
) -> Result<usize> {
    let mut acl = target.load(ctx).await?;
    let mut changed = 0;

    for permission in mode.permissions() {
        let grant = Grant::new(grantee.clone(), *permission);
        let applied = match change {
            Change::Grant => {
                out.line(format!("granting {} to {} on {}", permission, user, target));
                acl.add(grant)
            }
            Change::Revoke => {
                out.line(format!("revoking {} from {} on {}", permission, user, target));
                acl.revoke(&grant)
            }
        };
        if applied {
            changed += 1;
        }
    }

    if changed > 0 {
        target.save(ctx, acl).await?;
    }
    Ok(changed)
}
