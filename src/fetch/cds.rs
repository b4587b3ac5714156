// src/fetch/cds.rs

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt, time::sleep};
use tracing::{debug, info, warn};

use super::{credentials::Credentials, request::RequestPayload, Retriever};
use crate::config::PollSettings;

const TOKEN_HEADER: &str = "PRIVATE-TOKEN";

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Accepted,
    Running,
    Successful,
    Failed,
    Rejected,
    Dismissed,
    Deleted,
    #[serde(other)]
    Unknown,
}

impl JobState {
    pub fn is_finished(self) -> bool {
        !matches!(self, JobState::Accepted | JobState::Running | JobState::Unknown)
    }
}

#[derive(Deserialize, Debug)]
struct JobStatus {
    #[serde(rename = "jobID")]
    job_id: String,
    status: JobState,
}

#[derive(Deserialize, Debug)]
struct JobResults {
    asset: Asset,
}

#[derive(Deserialize, Debug)]
struct Asset {
    value: AssetValue,
}

#[derive(Deserialize, Debug)]
struct AssetValue {
    href: String,
    #[serde(rename = "file:size")]
    size: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
struct ApiError {
    #[serde(default)]
    title: String,
    #[serde(default)]
    detail: String,
}

/// Client for the Climate Data Store retrieve API: submit a job, poll it
/// until it settles, then stream the result asset to disk.
#[derive(Clone)]
pub struct CdsClient {
    http: Client,
    credentials: Credentials,
    poll: PollSettings,
}

impl CdsClient {
    pub fn new(credentials: Credentials, poll: PollSettings) -> Self {
        Self {
            http: Client::new(),
            credentials,
            poll,
        }
    }

    async fn submit(&self, dataset: &str, payload: &RequestPayload) -> Result<JobStatus> {
        let url = self
            .credentials
            .endpoint(&format!("processes/{}/execution", dataset));
        let resp = self
            .http
            .post(&url)
            .header(TOKEN_HEADER, &self.credentials.key)
            .json(&json!({ "inputs": payload }))
            .send()
            .await
            .with_context(|| format!("POST {}", url))?;
        let job: JobStatus = checked(resp).await?.json().await?;
        Ok(job)
    }

    async fn status(&self, job_id: &str) -> Result<JobState> {
        let url = self.credentials.endpoint(&format!("jobs/{}", job_id));
        let resp = self
            .http
            .get(&url)
            .header(TOKEN_HEADER, &self.credentials.key)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;
        let job: JobStatus = checked(resp).await?.json().await?;
        Ok(job.status)
    }

    /// Poll until the job reaches a terminal state.
    async fn wait(&self, job_id: &str, mut state: JobState) -> Result<JobState> {
        let mut delay = self.poll.initial();
        while !state.is_finished() {
            sleep(delay).await;
            delay = self.poll.next(delay);
            state = self.status(job_id).await?;
            debug!(job = %job_id, ?state, "polled");
        }
        Ok(state)
    }

    async fn results(&self, job_id: &str) -> Result<Response> {
        let url = self.credentials.endpoint(&format!("jobs/{}/results", job_id));
        self.http
            .get(&url)
            .header(TOKEN_HEADER, &self.credentials.key)
            .send()
            .await
            .with_context(|| format!("GET {}", url))
    }

    /// Stream `href` into `target`, going through a `.part` file.
    async fn download(&self, href: &str, target: &Path) -> Result<u64> {
        let url = self
            .credentials
            .url
            .join(href)
            .with_context(|| format!("resolving asset href {}", href))?;
        let resp = self
            .http
            .get(url.as_str())
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;
        let resp = checked(resp).await?;

        let mut part = PartFile::new(target);
        let mut file = fs::File::create(&part.path)
            .await
            .with_context(|| format!("creating {}", part.path.display()))?;
        let mut written = 0u64;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.with_context(|| format!("reading body of {}", url))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        fs::rename(&part.path, target)
            .await
            .with_context(|| format!("moving {} into place", part.path.display()))?;
        part.keep = true;
        Ok(written)
    }
}

/// `<target>.part`, removed on drop unless the download was moved into place.
/// Covers both error returns and a task aborted mid-stream.
struct PartFile {
    path: PathBuf,
    keep: bool,
}

impl PartFile {
    fn new(target: &Path) -> Self {
        Self {
            path: part_path(target),
            keep: false,
        }
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if !self.keep {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), "failed to remove partial download: {}", e);
                }
            }
        }
    }
}

#[async_trait]
impl Retriever for CdsClient {
    async fn retrieve(&self, dataset: &str, payload: &RequestPayload, target: &Path) -> Result<()> {
        let job = self.submit(dataset, payload).await?;
        info!(job = %job.job_id, variable = %payload.variable, year = %payload.year, "request accepted");

        let state = self.wait(&job.job_id, job.status).await?;
        let resp = self.results(&job.job_id).await?;

        if state != JobState::Successful {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let err: ApiError = serde_json::from_str(&body).unwrap_or_default();
            bail!(
                "job {} ended {:?} ({}): {} {}",
                job.job_id,
                state,
                status,
                err.title,
                err.detail
            );
        }

        let results: JobResults = checked(resp).await?.json().await?;
        let expected = results.asset.value.size;
        let written = self.download(&results.asset.value.href, target).await?;
        if let Some(expected) = expected.filter(|&n| n != written) {
            warn!(
                target = %target.display(),
                expected,
                written,
                "downloaded size differs from advertised size"
            );
        }
        Ok(())
    }
}

/// Turn non-2xx responses into errors carrying the response body.
async fn checked(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let url = resp.url().clone();
    let body = resp.text().await.unwrap_or_default();
    Err(anyhow!("HTTP {} from {}: {}", status, url, body.trim()))
}

fn part_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}
