// src/unpack.rs

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

use crate::{
    archive::{extract_tar_gz, require_archive},
    config::Config,
};

/// Unpack every year in range into `<out_dir>/<year>`, one year at a time.
/// Returns the year directories in order.
pub async fn unpack_all(config: &Config) -> Result<Vec<PathBuf>> {
    info!("unpacking zipped tar files...");
    let labels: Vec<&str> = config.variables.iter().map(|v| v.label.as_str()).collect();

    let mut dirs = Vec::new();
    for year in config.years() {
        let dir = unpack_year(&config.out_dir, &config.dataset_tag, &labels, year).await?;
        dirs.push(dir);
    }
    Ok(dirs)
}

/// All of a year's archives are located before anything is extracted, so a
/// missing archive leaves that year untouched.
#[instrument(skip(out_dir, tag, labels))]
pub async fn unpack_year(out_dir: &Path, tag: &str, labels: &[&str], year: i32) -> Result<PathBuf> {
    let archives = labels
        .iter()
        .map(|label| require_archive(out_dir, label, tag, year))
        .collect::<Result<Vec<_>>>()?;

    let dest = out_dir.join(year.to_string());
    fs::create_dir_all(&dest)
        .await
        .with_context(|| format!("creating year directory {}", dest.display()))?;

    for archive in archives {
        info!(archive = %archive.display(), "extracting");
        let target = dest.clone();
        tokio::task::spawn_blocking(move || extract_tar_gz(&archive, &target)).await??;
    }
    Ok(dest)
}
