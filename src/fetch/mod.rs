// src/fetch/mod.rs

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

pub mod batch;
pub mod cds;
pub mod credentials;
pub mod request;

use request::RequestPayload;

/// Something that can turn one request payload into an archive on disk.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Retrieve `payload` from `dataset` and write the result to `target`.
    async fn retrieve(&self, dataset: &str, payload: &RequestPayload, target: &Path) -> Result<()>;
}
