// src/test_utils.rs

use anyhow::Result;
use async_trait::async_trait;
use flate2::{write::GzEncoder, Compression};
use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use crate::fetch::{request::RequestPayload, Retriever};

/// Write a `.tar.gz` at `path` holding `(name, contents)` entries.
pub fn write_tar_gz(path: &Path, entries: &[(&str, &str)]) -> Result<()> {
    let file = File::create(path)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for (name, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, contents.as_bytes())?;
    }
    builder.into_inner()?.finish()?;
    Ok(())
}

/// Stands in for the archive service: writes a small archive per request
/// containing one file named after the variable and year. Each request waits
/// `delay` scaled by a per-year factor (1x to 4x), so completions come back
/// out of submission order.
#[derive(Default)]
pub struct FakeRetriever {
    pub calls: Mutex<Vec<(String, RequestPayload, PathBuf)>>,
    pub completed: Mutex<Vec<PathBuf>>,
    pub fail_year: Option<String>,
    pub delay: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeRetriever {
    pub fn failing_on(year: i32) -> Self {
        Self {
            fail_year: Some(year.to_string()),
            ..Default::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Retriever for FakeRetriever {
    async fn retrieve(&self, dataset: &str, payload: &RequestPayload, target: &Path) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push((
            dataset.to_string(),
            payload.clone(),
            target.to_path_buf(),
        ));

        let year: u32 = payload.year.parse()?;
        tokio::time::sleep(self.delay * (4 - year % 4)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_year.as_deref() == Some(payload.year.as_str()) {
            anyhow::bail!("request rejected for {}", payload.year);
        }

        let member = format!(
            "{}_{}_{}.nc",
            payload.variable,
            payload.statistic.as_deref().unwrap_or("total"),
            payload.year
        );
        write_tar_gz(target, &[(&member, "data")])?;
        self.completed.lock().unwrap().push(target.to_path_buf());
        Ok(())
    }
}
