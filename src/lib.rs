pub mod acl;
pub mod cli;
pub mod command;
pub mod config;
pub mod diff;
pub mod display;
pub mod error;
pub mod grant;
pub mod output;
pub mod radula;
pub mod storage;
pub mod subject;
pub mod transfer;

pub use acl::{AccessControlList, CannedAcl, Grant, Grantee, GroupUri, Owner, Permission};
pub use command::Command;
pub use config::{Config, TransferConfig};
pub use diff::AclComparison;
pub use error::{RadulaError, Result};
pub use grant::AccessMode;
pub use output::Transcript;
pub use radula::{Context, Radula};
pub use storage::{FsStore, MemoryStore, ObjectStore};
pub use subject::Subject;
