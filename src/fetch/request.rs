// src/fetch/request.rs

use serde::Serialize;
use std::path::PathBuf;

use crate::{
    archive::archive_path,
    config::{Config, VariableSpec},
};

/// Body of one retrieval request.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RequestPayload {
    pub variable: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistic: Option<String>,
    pub year: String,
    pub month: Vec<String>,
    /// Always 01..31; the service ignores dates that do not exist.
    pub day: Vec<String>,
    pub area: [f64; 4],
    pub version: String,
    pub format: String,
}

impl RequestPayload {
    pub fn new(config: &Config, var: &VariableSpec, year: i32) -> Self {
        Self {
            variable: var.name.clone(),
            statistic: var.statistic.clone(),
            year: year.to_string(),
            month: two_digit(1..=12),
            day: two_digit(1..=31),
            area: config.area.as_area(),
            version: config.version.clone(),
            format: config.format.clone(),
        }
    }
}

fn two_digit(range: std::ops::RangeInclusive<u32>) -> Vec<String> {
    range.map(|n| format!("{:02}", n)).collect()
}

/// One (variable, year) unit of work.
#[derive(Debug, Clone)]
pub struct RetrievalTask {
    pub label: String,
    pub year: i32,
    pub payload: RequestPayload,
    pub target: PathBuf,
}

/// All tasks for the configured variables and years, variable-major.
pub fn plan(config: &Config) -> Vec<RetrievalTask> {
    config
        .variables
        .iter()
        .flat_map(|var| {
            config.years().map(move |year| RetrievalTask {
                label: var.label.clone(),
                year,
                payload: RequestPayload::new(config, var, year),
                target: archive_path(&config.out_dir, &var.label, &config.dataset_tag, year),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn small_config() -> Config {
        Config {
            out_dir: PathBuf::from("/data"),
            year_first: 2020,
            year_last: 2021,
            ..Default::default()
        }
    }

    #[test]
    fn payload_enumerates_full_calendar() {
        let config = small_config();
        let payload = RequestPayload::new(&config, &config.variables[0], 2020);

        assert_eq!(payload.month.len(), 12);
        assert_eq!(payload.month.first().unwrap(), "01");
        assert_eq!(payload.month.last().unwrap(), "12");
        assert_eq!(payload.day.len(), 31);
        assert_eq!(payload.day[29], "30");
        assert_eq!(payload.day[30], "31");
    }

    #[test]
    fn payload_serializes_statistic_only_when_present() {
        let config = small_config();

        let tmin = serde_json::to_value(RequestPayload::new(&config, &config.variables[0], 2020))
            .unwrap();
        assert_eq!(tmin["variable"], json!("2m_temperature"));
        assert_eq!(tmin["statistic"], json!("24_hour_minimum"));
        assert_eq!(tmin["year"], json!("2020"));
        assert_eq!(tmin["area"], json!([71.7, -170.2, 13.4, -59.6]));
        assert_eq!(tmin["version"], json!("1_1"));
        assert_eq!(tmin["format"], json!("tgz"));

        let prcp = serde_json::to_value(RequestPayload::new(&config, &config.variables[2], 2020))
            .unwrap();
        assert_eq!(prcp["variable"], json!("precipitation_flux"));
        assert!(prcp.get("statistic").is_none());
    }

    #[test]
    fn plan_covers_every_pair_variable_major() {
        let config = small_config();
        let tasks = plan(&config);

        let order: Vec<_> = tasks.iter().map(|t| (t.label.as_str(), t.year)).collect();
        assert_eq!(
            order,
            [
                ("tmin", 2020),
                ("tmin", 2021),
                ("tmax", 2020),
                ("tmax", 2021),
                ("prcp", 2020),
                ("prcp", 2021),
            ]
        );
        assert_eq!(
            tasks[3].target,
            PathBuf::from("/data/tmax_AgERA5_2021.tar.gz")
        );
        assert_eq!(tasks[3].payload.statistic.as_deref(), Some("24_hour_maximum"));
    }
}
