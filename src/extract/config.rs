//! Run configuration read from `config.json`

use crate::error::{Error, Result};
use crate::flatten::FlattenConfig;
use crate::table::{registry, RowErrorPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable naming the stack the run executes on
pub const STACK_ID_VAR: &str = "KBC_STACKID";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub parameters: Parameters,
}

impl ConfigFile {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::InvalidConfig(format!("config.json: {}", e)))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    pub projects: Vec<ProjectConfig>,
    pub organization: Option<OrganizationConfig>,
    pub datasets: Datasets,
    #[serde(rename = "incremental_load")]
    pub incremental: bool,
    pub debug: bool,
    pub flatten: FlattenConfig,
    pub on_row_error: RowErrorPolicy,
    /// Stack of the current run, from the environment
    #[serde(skip)]
    pub current_stack: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub id: String,
    pub region: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationConfig {
    pub id: String,
    pub region: String,
}

/// Which datasets to extract
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Datasets {
    pub get_all_configurations: bool,
    pub get_tokens: bool,
    pub get_tokens_last_events: bool,
    pub get_orchestrations: bool,
    pub get_orchestrations_v2: bool,
    pub get_waiting_jobs: bool,
    pub get_tables: bool,
    pub get_columns: bool,
    pub get_transformations: bool,
    pub get_transformations_v2: bool,
    pub get_project_users: bool,
    pub get_organization_users: bool,
    pub get_triggers: bool,
    pub get_workspace_load_events: bool,
    pub get_tables_load_events: bool,
}

impl Datasets {
    /// Tables each enabled dataset writes
    pub fn tables(&self) -> Vec<&'static str> {
        let groups: [(bool, &[&'static str]); 15] = [
            (self.get_all_configurations, &["configurations"]),
            (self.get_tokens, &["tokens"]),
            (self.get_tokens && self.get_tokens_last_events, &["tokens-last-events"]),
            (
                self.get_orchestrations,
                &["orchestrations", "orchestrations-notifications", "orchestrations-tasks"],
            ),
            (
                self.get_orchestrations_v2,
                &["orchestrations-v2", "orchestrations-v2-tasks", "orchestrations-v2-phases"],
            ),
            (self.get_waiting_jobs, &["waiting-jobs"]),
            (self.get_tables, &["tables", "tables-metadata"]),
            (
                self.get_tables && self.get_columns,
                &["tables-columns", "tables-columns-metadata"],
            ),
            (
                self.get_transformations,
                &[
                    "transformations-buckets",
                    "transformations",
                    "transformations-inputs",
                    "transformations-inputs-metadata",
                    "transformations-outputs",
                    "transformations-queries",
                ],
            ),
            (
                self.get_transformations_v2,
                &[
                    "transformations-v2",
                    "transformations-v2-inputs",
                    "transformations-v2-inputs-metadata",
                    "transformations-v2-outputs",
                    "transformations-v2-codes",
                ],
            ),
            (self.get_project_users, &["project-users"]),
            (self.get_organization_users, &["organization-users"]),
            (self.get_triggers, &["triggers", "triggers-tables"]),
            (self.get_workspace_load_events, &["workspace-table-loads"]),
            (self.get_tables_load_events, &["tables-load-events"]),
        ];

        groups
            .iter()
            .filter(|(enabled, _)| *enabled)
            .flat_map(|(_, tables)| tables.iter().copied())
            .collect()
    }

    /// Datasets that need organization access
    pub fn needs_organization(&self) -> bool {
        self.get_project_users || self.get_organization_users
    }
}

impl Parameters {
    /// Pick up the current stack from the environment
    pub fn with_env(mut self) -> Self {
        self.current_stack = std::env::var(STACK_ID_VAR).ok();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.projects.is_empty() && self.organization.is_none() {
            return Err(Error::InvalidConfig(
                "no projects configured and no organization to list them from".to_string(),
            ));
        }

        for project in &self.projects {
            if project.id.trim().is_empty() || project.region.trim().is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "project {:?} needs both an id and a region",
                    project
                )));
            }
        }

        match &self.organization {
            Some(org) if org.id.trim().is_empty() || org.region.trim().is_empty() => {
                return Err(Error::InvalidConfig(
                    "organization needs both an id and a region".to_string(),
                ));
            }
            None if self.datasets.needs_organization() => {
                return Err(Error::InvalidConfig(
                    "user datasets need an organization".to_string(),
                ));
            }
            _ => {}
        }

        for table in self.datasets.tables() {
            registry::lookup(table)?;
        }
        Ok(())
    }

    /// Stack hostname a region refers to
    pub fn resolve_region(&self, region: &str) -> String {
        resolve_stack(region, self.current_stack.as_deref())
    }
}

/// Expand region aliases to stack hostnames
pub fn resolve_stack(region: &str, current_stack: Option<&str>) -> String {
    match region {
        "us-east-1" => "keboola.com".to_string(),
        "eu-central-1" => "eu-central-1.keboola.com".to_string(),
        "current" => current_stack
            .map(|stack| stack.replace("connection.", ""))
            .unwrap_or_else(|| region.to_string()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = ConfigFile::from_json(
            r#"{"parameters": {"projects": [{"id": "7", "region": "us-east-1"}],
                "datasets": {"get_tables": true}, "incremental_load": true}}"#,
        )
        .unwrap();
        let params = config.parameters;

        assert_eq!(params.projects[0].id, "7");
        assert!(params.incremental);
        assert!(params.datasets.get_tables);
        assert!(!params.datasets.get_columns);
        assert_eq!(params.flatten.separator, "_");
        assert_eq!(params.on_row_error, RowErrorPolicy::Abort);
        params.validate().unwrap();
    }

    #[test]
    fn test_flatten_and_policy_overrides() {
        let config = ConfigFile::from_json(
            r#"{"parameters": {"projects": [{"id": "7", "region": "keboola.com"}],
                "flatten": {"separator": "__", "preserve_keys": ["configuration"]},
                "on_row_error": "skip"}}"#,
        )
        .unwrap();

        assert_eq!(config.parameters.flatten.separator, "__");
        assert_eq!(config.parameters.flatten.preserve_keys, vec!["configuration"]);
        assert_eq!(config.parameters.on_row_error, RowErrorPolicy::Skip);
    }

    #[test]
    fn test_validation_failures() {
        let empty = Parameters::default();
        assert!(empty.validate().is_err());

        let blank_region = Parameters {
            projects: vec![ProjectConfig {
                id: "7".to_string(),
                region: " ".to_string(),
                name: None,
            }],
            ..Parameters::default()
        };
        assert!(blank_region.validate().is_err());

        let users_without_org = Parameters {
            projects: vec![ProjectConfig {
                id: "7".to_string(),
                region: "keboola.com".to_string(),
                name: None,
            }],
            datasets: Datasets {
                get_project_users: true,
                ..Datasets::default()
            },
            ..Parameters::default()
        };
        let err = users_without_org.validate().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_malformed_config_is_configuration_error() {
        let err = ConfigFile::from_json(r#"{"parameters": {"projects": "7"}}"#).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_dataset_tables() {
        let datasets = Datasets {
            get_tables: true,
            get_columns: true,
            get_tokens_last_events: true,
            ..Datasets::default()
        };

        assert_eq!(
            datasets.tables(),
            vec!["tables", "tables-metadata", "tables-columns", "tables-columns-metadata"]
        );
    }

    #[test]
    fn test_every_dataset_table_is_registered() {
        let all = Datasets {
            get_all_configurations: true,
            get_tokens: true,
            get_tokens_last_events: true,
            get_orchestrations: true,
            get_orchestrations_v2: true,
            get_waiting_jobs: true,
            get_tables: true,
            get_columns: true,
            get_transformations: true,
            get_transformations_v2: true,
            get_project_users: true,
            get_organization_users: true,
            get_triggers: true,
            get_workspace_load_events: true,
            get_tables_load_events: true,
        };

        assert_eq!(all.tables().len(), registry::table_names().count());
        for table in all.tables() {
            registry::lookup(table).unwrap();
        }
    }

    #[test]
    fn test_resolve_stack() {
        assert_eq!(resolve_stack("us-east-1", None), "keboola.com");
        assert_eq!(resolve_stack("eu-central-1", None), "eu-central-1.keboola.com");
        assert_eq!(
            resolve_stack("current", Some("connection.north-europe.azure.keboola.com")),
            "north-europe.azure.keboola.com"
        );
        assert_eq!(resolve_stack("connection.keboola.cloud", None), "connection.keboola.cloud");
    }
}
