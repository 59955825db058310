//! State carried between runs

use crate::error::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Cursors persisted in `state.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunState {
    /// Passed through untouched
    #[serde(deserialize_with = "lenient")]
    pub tokens: Map<String, Value>,

    /// Last fully processed transformation job, per project key
    #[serde(rename = "tr_last_processed_id", deserialize_with = "job_cursors")]
    pub last_processed_jobs: BTreeMap<String, String>,

    /// Day the table load events were last read
    #[serde(deserialize_with = "lenient")]
    pub date: Option<String>,
}

/// Fields written by older versions in another shape read as their default
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Job cursors were stored as numbers by older versions; entries of any
/// other shape are dropped one by one
fn job_cursors<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Object(entries) = Value::deserialize(deserializer)? else {
        return Ok(BTreeMap::new());
    };

    Ok(entries
        .into_iter()
        .filter_map(|(key, cursor)| match cursor {
            Value::String(id) => Some((key, id)),
            Value::Number(id) => Some((key, id.to_string())),
            other => {
                tracing::warn!(project = %key, cursor = %other, "ignoring job cursor");
                None
            }
        })
        .collect())
}

impl RunState {
    /// Load state; a missing or empty file is a first run
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(RunState::default());
        }
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(RunState::default());
        }

        match serde_json::from_str::<Value>(&content)? {
            value @ Value::Object(_) => Ok(serde_json::from_value(value).unwrap_or_default()),
            _ => Ok(RunState::default()),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec(self)?)?;
        Ok(())
    }

    /// First day whose table load events are read; a week back on first run
    pub fn since_date(&self, today: NaiveDate) -> NaiveDate {
        self.date
            .as_deref()
            .and_then(|date| NaiveDate::parse_from_str(date, DATE_FORMAT).ok())
            .unwrap_or_else(|| today - chrono::Duration::days(7))
    }

    pub fn set_date(&mut self, day: NaiveDate) {
        self.date = Some(day.format(DATE_FORMAT).to_string());
    }

    pub fn job_cursor(&self, project_key: &str) -> Option<&str> {
        self.last_processed_jobs.get(project_key).map(String::as_str)
    }

    pub fn set_job_cursor(&mut self, project_key: String, cursor: Option<String>) {
        if let Some(cursor) = cursor {
            self.last_processed_jobs.insert(project_key, cursor);
        }
    }
}

/// Key identifying a project across stacks: `eu_central_1|42`
pub fn project_key(region: &str, project_id: &str) -> String {
    format!("{}|{}", region.replace('-', "_"), project_id)
}
