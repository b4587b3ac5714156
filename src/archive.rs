// src/archive.rs

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use glob::{glob, Pattern};
use std::{
    fs::File,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("{year}: problem finding {label} archive (no file matches {pattern})")]
    Missing {
        label: String,
        year: i32,
        pattern: String,
    },
}

/// `<label>_<tag>_<year>.tar.gz`
pub fn archive_name(label: &str, tag: &str, year: i32) -> String {
    format!("{}_{}_{}.tar.gz", label, tag, year)
}

pub fn archive_path(out_dir: &Path, label: &str, tag: &str, year: i32) -> PathBuf {
    out_dir.join(archive_name(label, tag, year))
}

fn archive_pattern(out_dir: &Path, label: &str, tag: &str, year: i32) -> String {
    format!(
        "{}/{}",
        Pattern::escape(&out_dir.to_string_lossy()),
        Pattern::escape(&archive_name(label, tag, year))
    )
}

/// First file matching the archive's name pattern, if any.
pub fn find_archive(out_dir: &Path, label: &str, tag: &str, year: i32) -> Result<Option<PathBuf>> {
    let pattern = archive_pattern(out_dir, label, tag, year);
    let found = glob(&pattern)
        .with_context(|| format!("bad archive pattern {}", pattern))?
        .filter_map(Result::ok)
        .find(|p| p.is_file());
    Ok(found)
}

/// Like [`find_archive`] but a missing file is an [`ArchiveError::Missing`].
pub fn require_archive(out_dir: &Path, label: &str, tag: &str, year: i32) -> Result<PathBuf> {
    find_archive(out_dir, label, tag, year)?.ok_or_else(|| {
        ArchiveError::Missing {
            label: label.to_string(),
            year,
            pattern: archive_pattern(out_dir, label, tag, year),
        }
        .into()
    })
}

/// Every file in `out_dir` that follows the archive naming convention for `tag`.
pub fn list_archives(out_dir: &Path, tag: &str) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/*_{}_*.tar.gz",
        Pattern::escape(&out_dir.to_string_lossy()),
        Pattern::escape(tag)
    );
    let mut paths: Vec<PathBuf> = glob(&pattern)
        .with_context(|| format!("bad archive pattern {}", pattern))?
        .filter_map(Result::ok)
        .collect();
    paths.sort();
    Ok(paths)
}

/// Decompress a `.tar.gz` into `dest`. Blocking.
pub fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<()> {
    let file =
        File::open(archive).with_context(|| format!("opening archive {}", archive.display()))?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    tar.unpack(dest).with_context(|| {
        format!(
            "extracting {} into {}",
            archive.display(),
            dest.display()
        )
    })?;
    Ok(())
}
