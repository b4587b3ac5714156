// src/fetch/batch.rs

use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc};
use tokio::{sync::Semaphore, task::JoinSet, time::Instant};
use tracing::{error, info};

use super::{request::RetrievalTask, Retriever};

/// Run every task with at most `max_concurrent` in flight and wait for all of
/// them. The first failure aborts the rest of the batch and is returned.
/// On success the archive paths are returned sorted.
pub async fn fetch_all(
    retriever: Arc<dyn Retriever>,
    dataset: &str,
    tasks: Vec<RetrievalTask>,
    max_concurrent: usize,
) -> Result<Vec<PathBuf>> {
    let total = tasks.len();
    let sem = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut set = JoinSet::new();

    info!(total, max_concurrent, "submitting retrieval tasks");

    for task in tasks {
        let retriever = Arc::clone(&retriever);
        let sem = Arc::clone(&sem);
        let dataset = dataset.to_string();

        set.spawn(async move {
            let _permit = sem.acquire_owned().await?;
            info!(label = %task.label, year = task.year, "requesting");
            let start = Instant::now();
            retriever
                .retrieve(&dataset, &task.payload, &task.target)
                .await
                .with_context(|| format!("retrieving {} for {}", task.label, task.year))?;
            info!(label = %task.label, year = task.year, elapsed = ?start.elapsed(), "downloaded");
            Ok::<_, anyhow::Error>(task.target)
        });
    }

    let mut done = Vec::with_capacity(total);
    while let Some(joined) = set.join_next().await {
        match joined? {
            Ok(path) => done.push(path),
            Err(err) => {
                error!("{:#}", err);
                // dropping the set aborts whatever is still in flight
                return Err(err);
            }
        }
    }

    done.sort();
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        fetch::request::plan,
        test_utils::FakeRetriever,
    };
    use glob::glob;
    use std::{sync::atomic::Ordering, time::Duration};
    use tempfile::tempdir;

    fn config_in(dir: &std::path::Path) -> Config {
        Config {
            out_dir: dir.to_path_buf(),
            year_first: 2020,
            year_last: 2021,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn one_archive_per_variable_year() -> Result<()> {
        let tmp = tempdir()?;
        let config = config_in(tmp.path());
        let fake = Arc::new(FakeRetriever::default());

        let paths = fetch_all(fake.clone(), &config.dataset, plan(&config), 4).await?;

        assert_eq!(paths.len(), 6);
        assert_eq!(fake.call_count(), 6);
        let on_disk: Vec<_> = glob(&format!("{}/*_AgERA5_*.tar.gz", tmp.path().display()))?
            .filter_map(Result::ok)
            .collect();
        assert_eq!(on_disk, paths);
        for (dataset, _, _) in fake.calls.lock().unwrap().iter() {
            assert_eq!(dataset, "sis-agrometeorological-indicators");
        }
        Ok(())
    }

    #[tokio::test]
    async fn concurrency_stays_within_limit() -> Result<()> {
        let tmp = tempdir()?;
        let mut config = config_in(tmp.path());
        config.year_first = 2011;
        let fake = Arc::new(FakeRetriever::with_delay(Duration::from_millis(20)));
        let tasks = plan(&config);
        let submitted: Vec<_> = tasks.iter().map(|t| t.target.clone()).collect();

        let paths = fetch_all(fake.clone(), &config.dataset, tasks, 3).await?;

        assert_eq!(paths.len(), 33);
        let completed = fake.completed.lock().unwrap().clone();
        assert_eq!(completed.len(), 33);
        assert_ne!(completed, submitted, "completions should interleave");
        let mut expected = submitted.clone();
        expected.sort();
        assert_eq!(paths, expected);
        let peak = fake.max_in_flight.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak {peak}");
        assert!(peak >= 2, "peak {peak}");
        Ok(())
    }

    #[tokio::test]
    async fn failure_names_the_pair_and_fails_the_batch() -> Result<()> {
        let tmp = tempdir()?;
        let config = config_in(tmp.path());
        let fake = Arc::new(FakeRetriever::failing_on(2021));

        let err = fetch_all(fake, &config.dataset, plan(&config), 1)
            .await
            .unwrap_err();

        // serial run: tmin 2020 succeeds, tmin 2021 is the first failure
        assert!(err.to_string().contains("retrieving tmin for 2021"), "{err:#}");
        assert!(format!("{err:#}").contains("request rejected"));
        Ok(())
    }
}
