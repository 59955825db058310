use crate::error::{Error, Result};
use crate::extract::config::{Parameters, ProjectConfig};
use crate::extract::datasets::{organization_users, ProjectRun};
use crate::extract::source::{Endpoint, MetadataSource, Scope};
use crate::extract::state::{project_key, RunState};
use crate::table::{CatalogOptions, TableCatalog, TableSummary};
use chrono::NaiveDate;
use serde_json::Value;
use std::path::Path;

/// Outcome of a run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: RunState,
    pub tables: Vec<TableSummary>,
}

/// Runs every enabled dataset for every project into one set of tables
pub struct Extractor<S: MetadataSource> {
    params: Parameters,
    source: S,
    state: RunState,
    today: NaiveDate,
}

impl<S: MetadataSource> Extractor<S> {
    pub fn new(params: Parameters, source: S, state: RunState) -> Self {
        Extractor {
            params,
            source,
            state,
            today: chrono::Local::now().date_naive(),
        }
    }

    /// Fix the run date instead of reading the clock
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn catalog_options(&self) -> CatalogOptions {
        CatalogOptions {
            incremental: self.params.incremental,
            flatten: self.params.flatten.clone(),
            on_row_error: self.params.on_row_error,
        }
    }

    /// Extract into `output_dir` and return the state for the next run.
    ///
    /// Tables already written stay on disk, flushed, when a dataset fails.
    pub fn run<P: AsRef<Path>>(&mut self, output_dir: P) -> Result<RunReport> {
        self.params.validate()?;
        let mut catalog = TableCatalog::new(output_dir, self.catalog_options())?;

        catalog.scoped(|catalog| {
            self.organization_datasets(catalog)?;

            let projects = self.projects()?;
            tracing::info!(count = projects.len(), "extracting projects");
            for project in &projects {
                self.project_datasets(catalog, project)?;
            }
            Ok::<_, Error>(())
        })?;

        if self.params.datasets.get_tables_load_events {
            self.state.set_date(self.today);
        }

        Ok(RunReport {
            state: self.state.clone(),
            tables: catalog.summary(),
        })
    }

    /// Configured projects, or every project of the organization
    fn projects(&mut self) -> Result<Vec<ProjectConfig>> {
        let Some(org) = self.params.organization.clone() else {
            return Ok(self.params.projects.clone());
        };

        let endpoint = Endpoint::Organization;
        let detail = self.source.fetch(&Scope::Organization, &endpoint)?;
        let listed = match detail.get("projects") {
            Some(Value::Array(projects)) => projects,
            Some(Value::Null) | None => return Ok(vec![]),
            Some(_) => {
                return Err(Error::MalformedResponse {
                    endpoint: endpoint.to_string(),
                    reason: "`projects` is not a list".to_string(),
                })
            }
        };

        Ok(listed
            .iter()
            .filter_map(|project| {
                let id = match project.get("id")? {
                    Value::String(id) => id.clone(),
                    Value::Number(id) => id.to_string(),
                    _ => return None,
                };
                Some(ProjectConfig {
                    id,
                    region: org.region.clone(),
                    name: project.get("name").and_then(Value::as_str).map(str::to_string),
                })
            })
            .collect())
    }

    fn organization_datasets(&mut self, catalog: &mut TableCatalog) -> Result<()> {
        let Some(org) = self.params.organization.clone() else {
            return Ok(());
        };
        if self.params.datasets.get_organization_users {
            let region = self.params.resolve_region(&org.region);
            tracing::info!(organization = %org.id, "extracting organization users");
            organization_users(&mut self.source, catalog, &org.id, &region)?;
        }
        Ok(())
    }

    fn project_datasets(&mut self, catalog: &mut TableCatalog, project: &ProjectConfig) -> Result<()> {
        let region = self.params.resolve_region(&project.region);
        let key = project_key(&region, &project.id);
        let datasets = self.params.datasets.clone();
        let cursor = self.state.job_cursor(&key).map(str::to_string);
        let since = self.state.since_date(self.today);
        let today = self.today;

        tracing::info!(
            project = %project.id,
            name = project.name.as_deref().unwrap_or_default(),
            %region,
            "extracting project"
        );

        let mut run = ProjectRun::new(&mut self.source, catalog, &project.id, &region);

        if datasets.get_waiting_jobs {
            run.waiting_jobs()?;
        }
        if datasets.get_tokens {
            run.tokens(datasets.get_tokens_last_events)?;
        }
        if datasets.get_all_configurations {
            run.configurations()?;
        }
        if datasets.get_tables {
            run.tables(datasets.get_columns)?;
        }
        if datasets.get_orchestrations {
            run.orchestrations()?;
        }
        if datasets.get_orchestrations_v2 {
            run.orchestrations_v2()?;
        }
        if datasets.get_triggers {
            run.triggers()?;
        }
        let new_cursor = if datasets.get_workspace_load_events {
            run.workspace_load_events(cursor.as_deref(), today)?
        } else {
            None
        };
        if datasets.get_transformations {
            run.transformations()?;
        }
        if datasets.get_transformations_v2 {
            run.transformations_v2()?;
        }
        if datasets.get_tables_load_events {
            run.table_load_events(since)?;
        }
        if datasets.get_project_users {
            run.project_users()?;
        }

        self.state.set_job_cursor(key, new_cursor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::config::{Datasets, OrganizationConfig};
    use crate::extract::source::MemorySource;
    use serde_json::json;

    fn params(datasets: Datasets) -> Parameters {
        Parameters {
            projects: vec![ProjectConfig {
                id: "7".to_string(),
                region: "us-east-1".to_string(),
                name: Some("main".to_string()),
            }],
            datasets,
            ..Parameters::default()
        }
    }

    #[test]
    fn test_run_writes_enabled_datasets_only() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemorySource::new().with(
            Scope::Project("7".to_string()),
            Endpoint::Triggers,
            json!([{"id": "1", "tables": []}]),
        );
        let datasets = Datasets {
            get_triggers: true,
            ..Datasets::default()
        };

        let mut extractor = Extractor::new(params(datasets), source, RunState::default());
        let report = extractor.run(dir.path()).unwrap();

        let names: Vec<&str> = report.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["triggers", "triggers-tables"]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("triggers.csv")).unwrap(),
            "\"1\",\"keboola.com\",\"7\",\"\",\"\",\"\",\"\",\"\",\"\",\"\"\n"
        );
        assert!(!dir.path().join("tables.csv").exists());
    }

    #[test]
    fn test_cursor_and_date_advance() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemorySource::new().with(
            Scope::Project("7".to_string()),
            Endpoint::TransformationJobs,
            json!([{"id": "12", "runId": "12", "status": "success"}]),
        );
        let mut state = RunState::default();
        state.set_job_cursor(project_key("keboola.com", "7"), Some("10".to_string()));
        let datasets = Datasets {
            get_workspace_load_events: true,
            get_tables_load_events: true,
            ..Datasets::default()
        };
        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();

        let mut extractor = Extractor::new(params(datasets), source, state).with_today(today);
        let report = extractor.run(dir.path()).unwrap();

        assert_eq!(report.state.job_cursor("keboola.com|7"), Some("12"));
        assert_eq!(report.state.date.as_deref(), Some("2024-05-10"));
    }

    #[test]
    fn test_organization_lists_projects() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemorySource::new()
            .with(
                Scope::Organization,
                Endpoint::Organization,
                json!({"id": 3, "projects": [{"id": 7, "name": "a"}, {"id": 8, "name": "b"}]}),
            )
            .with(
                Scope::Organization,
                Endpoint::OrganizationUsers,
                json!([{"id": 1, "email": "ada@example.com"}]),
            );
        let parameters = Parameters {
            organization: Some(OrganizationConfig {
                id: "3".to_string(),
                region: "eu-central-1".to_string(),
            }),
            datasets: Datasets {
                get_project_users: true,
                get_organization_users: true,
                ..Datasets::default()
            },
            ..Parameters::default()
        };

        let mut extractor = Extractor::new(parameters, source, RunState::default());
        extractor.run(dir.path()).unwrap();

        let project_fetches: Vec<&Scope> = extractor
            .source()
            .requests()
            .iter()
            .filter(|(_, endpoint)| *endpoint == Endpoint::ProjectUsers)
            .map(|(scope, _)| scope)
            .collect();
        assert_eq!(
            project_fetches,
            vec![&Scope::Project("7".to_string()), &Scope::Project("8".to_string())]
        );
        let users = std::fs::read_to_string(dir.path().join("organization-users.csv")).unwrap();
        assert!(users.starts_with("\"1\",\"eu-central-1.keboola.com\",\"3\","));
    }

    #[test]
    fn test_invalid_parameters_stop_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("tables");
        let mut extractor = Extractor::new(Parameters::default(), MemorySource::new(), RunState::default());

        assert!(extractor.run(&out).is_err());
        assert!(!out.exists());
    }
}
