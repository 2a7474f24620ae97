use crate::grant::AccessMode;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadArgs {
    pub local: PathBuf,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadArgs {
    pub subject: String,
    pub local: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantArgs {
    pub user: String,
    pub subject: String,
    pub mode: AccessMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CannedArgs {
    pub subject: String,
    pub acl: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Upload(UploadArgs),
    Download(DownloadArgs),
    Allow(GrantArgs),
    Disallow(GrantArgs),
    GetAcl { subject: String },
    SetAcl(CannedArgs),
    CompareAcl(CannedArgs),
    SyncAcl { subject: String },
    MakeBucket { bucket: String },
    RemoveBucket { bucket: String },
    ListBuckets,
    ListKeys { bucket: String },
    RemoveKey { subject: String },
    MultipartList { bucket: String },
    MultipartClean { bucket: String },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Upload(_) => "up",
            Command::Download(_) => "down",
            Command::Allow(_) => "allow",
            Command::Disallow(_) => "disallow",
            Command::GetAcl { .. } => "get-acl",
            Command::SetAcl(_) => "set-acl",
            Command::CompareAcl(_) => "compare-acl",
            Command::SyncAcl { .. } => "sync-acl",
            Command::MakeBucket { .. } => "mb",
            Command::RemoveBucket { .. } => "rb",
            Command::ListBuckets => "lb",
            Command::ListKeys { .. } => "keys",
            Command::RemoveKey { .. } => "rm",
            Command::MultipartList { .. } => "multipart-list",
            Command::MultipartClean { .. } => "multipart-clean",
        }
    }
}
