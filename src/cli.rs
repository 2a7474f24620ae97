use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::command::{CannedArgs, Command, DownloadArgs, GrantArgs, UploadArgs};
use crate::grant::AccessMode;

#[derive(Debug, Parser)]
#[command(name = "radula", version, about = "ACLs and uploads for bucket/key stores")]
pub struct Cli {
    /// Store directory, overriding RADULA_STORAGE_PATH.
    #[arg(short, long, global = true)]
    pub storage: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Args)]
pub struct AccessArgs {
    pub user: String,
    /// `bucket` or `bucket/key`
    pub subject: String,
    #[arg(short, long)]
    pub read: bool,
    #[arg(short, long)]
    pub write: bool,
}

impl AccessArgs {
    fn into_grant(self) -> GrantArgs {
        GrantArgs {
            mode: AccessMode::from_flags(self.read, self.write),
            user: self.user,
            subject: self.subject,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Upload a local file
    Up { local: PathBuf, target: String },
    /// Download a key to a local path
    Down { subject: String, local: PathBuf },
    /// Grant a user read (-r, the default) and/or write (-w) access
    #[command(alias = "allow-user")]
    Allow(AccessArgs),
    /// Revoke permissions granted with `allow`
    #[command(alias = "disallow-user")]
    Disallow(AccessArgs),
    GetAcl { subject: String },
    /// Apply a canned ACL
    SetAcl { subject: String, acl: String },
    /// Compare key ACLs with the bucket ACL
    CompareAcl { subject: String, acl: String },
    /// Copy the bucket ACL onto its keys
    SyncAcl { subject: String },
    Mb { bucket: String },
    Rb { bucket: String },
    Lb,
    Keys { bucket: String },
    Rm { subject: String },
    MultipartList { bucket: String },
    MultipartClean { bucket: String },
}

impl From<Commands> for Command {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Up { local, target } => Command::Upload(UploadArgs { local, target }),
            Commands::Down { subject, local } => Command::Download(DownloadArgs { subject, local }),
            Commands::Allow(args) => Command::Allow(args.into_grant()),
            Commands::Disallow(args) => Command::Disallow(args.into_grant()),
            Commands::GetAcl { subject } => Command::GetAcl { subject },
            Commands::SetAcl { subject, acl } => Command::SetAcl(CannedArgs { subject, acl }),
            Commands::CompareAcl { subject, acl } => {
                Command::CompareAcl(CannedArgs { subject, acl })
            }
            Commands::SyncAcl { subject } => Command::SyncAcl { subject },
            Commands::Mb { bucket } => Command::MakeBucket { bucket },
            Commands::Rb { bucket } => Command::RemoveBucket { bucket },
            Commands::Lb => Command::ListBuckets,
            Commands::Keys { bucket } => Command::ListKeys { bucket },
            Commands::Rm { subject } => Command::RemoveKey { subject },
            Commands::MultipartList { bucket } => Command::MultipartList { bucket },
            Commands::MultipartClean { bucket } => Command::MultipartClean { bucket },
        }
    }
}
