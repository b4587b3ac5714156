// src/pipeline.rs

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::{fs, time::Instant};
use tracing::info;

use crate::{
    cleanup::remove_archives,
    config::Config,
    fetch::{batch::fetch_all, request::plan, Retriever},
    unpack::unpack_all,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub downloaded: usize,
    pub year_dirs: usize,
    pub removed: usize,
}

/// Download, unpack, then clean up. Any error ends the run; whatever is
/// already on disk stays there.
pub async fn run(config: &Config, retriever: Arc<dyn Retriever>) -> Result<Summary> {
    config.validate()?;
    fs::create_dir_all(&config.out_dir)
        .await
        .with_context(|| format!("creating output directory {}", config.out_dir.display()))?;

    // ─── 1) download ─────────────────────────────────────────────────
    let start = Instant::now();
    let archives = fetch_all(
        retriever,
        &config.dataset,
        plan(config),
        config.max_concurrent_requests,
    )
    .await?;
    let minutes = start.elapsed().as_secs_f64() / 60.0;
    info!("---------- {:.2} minutes ----------", minutes);

    // ─── 2) unpack into year directories ─────────────────────────────
    let year_dirs = unpack_all(config).await?;

    // ─── 3) drop the archives ────────────────────────────────────────
    let removed = remove_archives(config).await?;

    Ok(Summary {
        downloaded: archives.len(),
        year_dirs: year_dirs.len(),
        removed,
    })
}
