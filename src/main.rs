use agera5::{
    config::Config,
    fetch::{cds::CdsClient, credentials::Credentials},
    pipeline,
};
use anyhow::Result;
use std::{env, sync::Arc};
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::new("").add_directive(level.parse().unwrap_or(Level::INFO.into()))
    });
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) configuration & credentials ──────────────────────────────
    let config = Config::load()?;
    info!(
        out_dir = %config.out_dir.display(),
        years = ?config.years(),
        variables = config.variables.len(),
        max_concurrent = config.max_concurrent_requests,
        "configured"
    );
    let credentials = Credentials::load()?;
    let client = CdsClient::new(credentials, config.poll);

    // ─── 3) download, unpack, clean up ───────────────────────────────
    let summary = pipeline::run(&config, Arc::new(client)).await?;
    info!(
        downloaded = summary.downloaded,
        year_dirs = summary.year_dirs,
        removed = summary.removed,
        "all done"
    );
    Ok(())
}
