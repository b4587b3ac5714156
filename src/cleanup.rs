// src/cleanup.rs

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::{
    archive::{list_archives, require_archive},
    config::Config,
};

/// Delete every (variable, year) archive. An archive that has already gone
/// missing is an error, as is any failed removal. Archives outside the
/// configured variables and years are left alone but logged. Returns the
/// number removed.
pub async fn remove_archives(config: &Config) -> Result<usize> {
    let mut removed = 0;
    for var in &config.variables {
        for year in config.years() {
            let path = require_archive(&config.out_dir, &var.label, &config.dataset_tag, year)?;
            fs::remove_file(&path)
                .await
                .with_context(|| format!("removing {}", path.display()))?;
            debug!(path = %path.display(), "removed");
            removed += 1;
        }
    }
    info!(removed, "removed archives");

    let leftover = list_archives(&config.out_dir, &config.dataset_tag)?;
    if !leftover.is_empty() {
        warn!(
            count = leftover.len(),
            dir = %config.out_dir.display(),
            "archives outside the configured range remain"
        );
    }
    Ok(removed)
}
