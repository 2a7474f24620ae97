use crate::acl::Owner;
use crate::error::{RadulaError, Result as RadulaResult};
use anyhow::Result;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_MULTIPART_THRESHOLD: u64 = 104_857_600; // 100MB
const DEFAULT_CHUNK_SIZE: u64 = 5_242_880; // 5MB

#[derive(Debug, Clone)]
pub struct Config {
    pub storage_path: PathBuf,
    pub owner: Owner,
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub multipart_threshold: u64,
    pub part_size: u64,
    pub threads: usize,
    /// Extra attempts per part after the first failure.
    pub part_retries: u32,
    pub retry_delay: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            part_size: DEFAULT_CHUNK_SIZE,
            threads: num_cpus::get(),
            part_retries: 3,
            retry_delay: Duration::from_millis(200),
        }
    }
}

impl TransferConfig {
    pub fn validate(&self) -> RadulaResult<()> {
        if self.part_size == 0 {
            return Err(RadulaError::InvalidArgument(
                "part size must be greater than zero".to_string(),
            ));
        }
        if self.threads == 0 {
            return Err(RadulaError::InvalidArgument(
                "upload threads must be greater than zero".to_string(),
            ));
        }
        if self.part_size > self.multipart_threshold {
            return Err(RadulaError::InvalidArgument(format!(
                "part size {} exceeds multipart threshold {}",
                self.part_size, self.multipart_threshold
            )));
        }
        Ok(())
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let owner = Owner {
            id: env::var("RADULA_OWNER_ID").unwrap_or_else(|_| "radula".to_string()),
            display_name: env::var("RADULA_OWNER_NAME").ok(),
            email: env::var("RADULA_OWNER_EMAIL").ok(),
        };

        let transfer = TransferConfig {
            multipart_threshold: env::var("MULTIPART_THRESHOLD")
                .unwrap_or_else(|_| DEFAULT_MULTIPART_THRESHOLD.to_string())
                .parse()?,
            part_size: env::var("MULTIPART_CHUNK_SIZE")
                .unwrap_or_else(|_| DEFAULT_CHUNK_SIZE.to_string())
                .parse()?,
            threads: env::var("UPLOAD_THREADS")
                .unwrap_or_else(|_| num_cpus::get().to_string())
                .parse()?,
            part_retries: env::var("PART_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            retry_delay: Duration::from_millis(
                env::var("RETRY_DELAY_MS")
                    .unwrap_or_else(|_| "200".to_string())
                    .parse()?,
            ),
        };
        transfer.validate()?;

        Ok(Config {
            storage_path: PathBuf::from(
                env::var("RADULA_STORAGE_PATH").unwrap_or_else(|_| "./radula-data".to_string()),
            ),
            owner,
            transfer,
        })
    }
}

// Helper to get num_cpus
mod num_cpus {
    pub fn get() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }
}
