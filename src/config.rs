// src/config.rs

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    env, fs,
    ops::RangeInclusive,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::info;

/// Environment variable naming an optional YAML config file.
pub const CONFIG_ENV: &str = "AGERA5_CONFIG";

/// Upper bound for either poll setting, in seconds.
const MAX_POLL_SECS: f64 = u32::MAX as f64;

/// One variable to fetch: the dataset's name for it, the per-day statistic
/// (if the variable has one) and the short label used in file names.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct VariableSpec {
    pub name: String,
    #[serde(default)]
    pub statistic: Option<String>,
    pub label: String,
}

impl VariableSpec {
    pub fn new(name: &str, statistic: Option<&str>, label: &str) -> Self {
        Self {
            name: name.to_string(),
            statistic: statistic.map(str::to_string),
            label: label.to_string(),
        }
    }
}

/// Geographic extent of the request, in degrees.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub north: f64,
    pub west: f64,
    pub south: f64,
    pub east: f64,
}

impl BoundingBox {
    /// `[north, west, south, east]`, the order the archive service expects.
    pub fn as_area(&self) -> [f64; 4] {
        [self.north, self.west, self.south, self.east]
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct PollSettings {
    pub interval_secs: f64,
    pub max_interval_secs: f64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: 1.0,
            max_interval_secs: 60.0,
        }
    }
}

impl PollSettings {
    pub fn initial(&self) -> Duration {
        saturating_secs(self.interval_secs)
    }

    /// Next poll delay: 1.5x the previous one, capped.
    pub fn next(&self, current: Duration) -> Duration {
        saturating_secs(current.as_secs_f64() * 1.5).min(saturating_secs(self.max_interval_secs))
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Flat directory receiving the archives; year directories go below it.
    pub out_dir: PathBuf,
    /// Collection identifier on the remote archive.
    pub dataset: String,
    /// Short dataset name embedded in archive file names.
    pub dataset_tag: String,
    pub version: String,
    pub format: String,
    pub year_first: i32,
    pub year_last: i32,
    pub variables: Vec<VariableSpec>,
    pub area: BoundingBox,
    pub max_concurrent_requests: usize,
    pub poll: PollSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("AgERA5_daily/orig"),
            dataset: "sis-agrometeorological-indicators".to_string(),
            dataset_tag: "AgERA5".to_string(),
            version: "1_1".to_string(),
            format: "tgz".to_string(),
            year_first: 1979,
            year_last: 2023,
            variables: vec![
                VariableSpec::new("2m_temperature", Some("24_hour_minimum"), "tmin"),
                VariableSpec::new("2m_temperature", Some("24_hour_maximum"), "tmax"),
                VariableSpec::new("precipitation_flux", None, "prcp"),
            ],
            // North America
            area: BoundingBox {
                north: 71.7,
                west: -170.2,
                south: 13.4,
                east: -59.6,
            },
            max_concurrent_requests: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            poll: PollSettings::default(),
        }
    }
}

impl Config {
    /// Load from the YAML file named by `AGERA5_CONFIG`, or fall back to the
    /// built-in defaults. Either way the result is validated.
    pub fn load() -> Result<Self> {
        let config = match env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => {
                info!("{} not set, using built-in configuration", CONFIG_ENV);
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config = Self::from_yaml_str(&contents)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn years(&self) -> RangeInclusive<i32> {
        self.year_first..=self.year_last
    }

    pub fn validate(&self) -> Result<()> {
        if self.year_first > self.year_last {
            bail!(
                "year_first ({}) is after year_last ({})",
                self.year_first,
                self.year_last
            );
        }
        if self.variables.is_empty() {
            bail!("no variables configured");
        }
        if self.dataset.trim().is_empty() || self.dataset_tag.trim().is_empty() {
            bail!("dataset and dataset_tag must be non-empty");
        }
        check_name_part("dataset_tag", &self.dataset_tag)?;

        let mut labels = HashSet::new();
        for var in &self.variables {
            if var.label.is_empty() {
                bail!("variable {:?} has an empty label", var.name);
            }
            check_name_part("label", &var.label)?;
            if !labels.insert(var.label.as_str()) {
                bail!("duplicate label {:?}", var.label);
            }
        }

        let BoundingBox {
            north,
            west,
            south,
            east,
        } = self.area;
        for lat in [north, south] {
            if !(-90.0..=90.0).contains(&lat) {
                bail!("latitude {} out of range", lat);
            }
        }
        for lon in [west, east] {
            if !(-180.0..=360.0).contains(&lon) {
                bail!("longitude {} out of range", lon);
            }
        }
        if north <= south {
            bail!("north ({}) must be greater than south ({})", north, south);
        }

        if self.max_concurrent_requests == 0 {
            bail!("max_concurrent_requests must be at least 1");
        }

        let PollSettings {
            interval_secs,
            max_interval_secs,
        } = self.poll;
        for secs in [interval_secs, max_interval_secs] {
            if !(0.0..=MAX_POLL_SECS).contains(&secs) {
                bail!("poll interval {} must be between 0 and {} seconds", secs, MAX_POLL_SECS);
            }
        }
        if interval_secs > max_interval_secs {
            bail!(
                "poll.interval_secs ({}) exceeds poll.max_interval_secs ({})",
                interval_secs,
                max_interval_secs
            );
        }
        Ok(())
    }
}

fn saturating_secs(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Labels and the dataset tag end up in file names and glob patterns.
fn check_name_part(what: &str, value: &str) -> Result<()> {
    if value
        .chars()
        .any(|c| matches!(c, '/' | '\\' | '*' | '?' | '[' | ']'))
    {
        bail!("{} {:?} must not contain path or glob characters", what, value);
    }
    Ok(())
}
