use anyhow::{Context as _, Result};
use clap::Parser;
use radula::cli::Cli;
use radula::{Config, Context, FsStore, Radula, Transcript};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "radula=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(storage) = cli.storage {
        config.storage_path = storage;
    }
    debug!("Using storage path: {:?}", config.storage_path);

    let store = FsStore::new(&config.storage_path, config.owner.clone())
        .with_context(|| format!("opening store at {}", config.storage_path.display()))?;
    let radula = Radula::new(
        Context::new(Arc::new(store), config.transfer),
        Transcript::stdout(),
    );

    radula.run(cli.command.into()).await?;
    Ok(())
}
