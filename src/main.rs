use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod models;
mod services;

use services::{
    deployer::Deployer,
    object_store::{DryRunStore, ObjectStore},
    oss_client::OssClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;
    tracing::info!("Starting oss-deploy with config: {:?}", cfg);

    // --- Pick the store and deploy ---
    let result = if cfg.dry_run {
        let store = DryRunStore {
            bucket: cfg.bucket.clone(),
        };
        deploy(store, &cfg).await
    } else {
        let store = OssClient::new(&cfg).context("building OSS client")?;
        deploy(store, &cfg).await
    };

    if let Err(err) = &result {
        tracing::error!("deploy aborted: {:#}", err);
    }
    result
}

async fn deploy<S: ObjectStore>(store: S, cfg: &config::AppConfig) -> Result<()> {
    Deployer::new(store, cfg.root.clone(), cfg.max_depth)
        .run()
        .await
        .with_context(|| format!("deploying `{}` to bucket `{}`", cfg.root.display(), cfg.bucket))?;
    Ok(())
}
