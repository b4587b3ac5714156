// src/fetch/credentials.rs

use anyhow::{anyhow, Context, Result};
use std::{env, fs, path::PathBuf};
use url::Url;

/// API endpoint and personal access token for the archive service.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub url: Url,
    pub key: String,
}

impl Credentials {
    /// `CDSAPI_URL` + `CDSAPI_KEY` if both are set, otherwise the rc file at
    /// `CDSAPI_RC` or `~/.cdsapirc`.
    pub fn load() -> Result<Self> {
        if let (Ok(url), Ok(key)) = (env::var("CDSAPI_URL"), env::var("CDSAPI_KEY")) {
            return Self::new(&url, &key);
        }
        let path = rc_path()?;
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("reading API credentials from {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn new(url: &str, key: &str) -> Result<Self> {
        let url = Url::parse(url.trim()).with_context(|| format!("invalid API url {:?}", url))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(anyhow!("API key is empty"));
        }
        Ok(Self {
            url,
            key: key.to_string(),
        })
    }

    /// Parse the `key: value` lines of an rc file.
    pub fn parse(contents: &str) -> Result<Self> {
        let mut url = None;
        let mut key = None;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((k, v)) = line.split_once(':') {
                match k.trim() {
                    "url" => url = Some(v.trim()),
                    "key" => key = Some(v.trim()),
                    _ => {}
                }
            }
        }
        Self::new(
            url.ok_or_else(|| anyhow!("missing `url:` entry"))?,
            key.ok_or_else(|| anyhow!("missing `key:` entry"))?,
        )
    }

    /// `{url}/retrieve/v1/{path}`
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/retrieve/v1/{}",
            self.url.as_str().trim_end_matches('/'),
            path
        )
    }
}

fn rc_path() -> Result<PathBuf> {
    if let Some(path) = env::var_os("CDSAPI_RC") {
        return Ok(PathBuf::from(path));
    }
    dirs::home_dir()
        .map(|home| home.join(".cdsapirc"))
        .ok_or_else(|| anyhow!("cannot locate home directory for .cdsapirc"))
}
