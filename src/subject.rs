use crate::error::{RadulaError, Result};
use crate::storage::ObjectStore;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    Bucket,
    Key,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    raw: String,
    bucket: String,
    key: Option<String>,
}

impl Subject {
    /// Splits on the first `/`. Anything after it, when non-empty, is the
    /// key; no other normalization happens.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(RadulaError::InvalidArgument("empty subject".to_string()));
        }

        let (bucket, key) = match raw.split_once('/') {
            Some((bucket, key)) if !key.is_empty() => (bucket, Some(key.to_string())),
            Some((bucket, _)) => (bucket, None),
            None => (raw, None),
        };

        if bucket.is_empty() {
            return Err(RadulaError::InvalidArgument(format!(
                "subject '{}' has no bucket name",
                raw
            )));
        }

        Ok(Self {
            raw: raw.to_string(),
            bucket: bucket.to_string(),
            key,
        })
    }

    pub fn bucket_only(bucket: impl Into<String>) -> Self {
        let bucket = bucket.into();
        Self {
            raw: bucket.clone(),
            bucket,
            key: None,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> SubjectKind {
        match self.key {
            Some(_) => SubjectKind::Key,
            None => SubjectKind::Bucket,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn is_bucket(&self) -> bool {
        self.key.is_none()
    }

    pub fn upload_target(&self, local: &Path) -> Result<Subject> {
        if self.key.is_some() {
            return Ok(self.clone());
        }
        let name = local
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                RadulaError::InvalidArgument(format!(
                    "cannot derive a key name from {}",
                    local.display()
                ))
            })?;
        Ok(Subject {
            raw: format!("{}/{}", self.bucket, name),
            bucket: self.bucket.clone(),
            key: Some(name.to_string()),
        })
    }

    pub async fn resolve(self, store: &dyn ObjectStore) -> Result<Subject> {
        if !store.bucket_exists(&self.bucket).await? {
            return Err(RadulaError::NoSuchBucket(self.bucket));
        }
        if let Some(key) = &self.key {
            store.head_object(&self.bucket, key).await?;
        }
        Ok(self)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}/{}", self.bucket, key),
            None => f.write_str(&self.bucket),
        }
    }
}
