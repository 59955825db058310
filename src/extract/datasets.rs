//! Dataset routines: walk source responses and stitch child rows to parents
//!
//! Every routine writes the parent rows of a dataset with the project's base
//! context, then writes child rows with a context extended by the parent's
//! key (`table_id`, `orchestration_id`, `transformation_id`, ...). The API
//! never echoes those keys on the children, so this is the only place the
//! linkage is made.

use crate::error::{json_type_name, Error, Result};
use crate::extract::source::{rows, Endpoint, MetadataSource, Scope};
use crate::flatten::ParentContext;
use crate::table::TableCatalog;
use chrono::NaiveDate;
use md5::{Digest, Md5};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;

/// Components whose configurations are version 2 transformations
pub const TRANSFORMATION_V2_COMPONENTS: &[&str] = &[
    "keboola.snowflake-transformation",
    "keboola.python-transformation-v2",
    "keboola.synapse-transformation",
    "keboola.redshift-transformation",
    "keboola.r-transformation-v2",
    "keboola.openrefine-transformation",
    "keboola.oracle-transformation",
    "keboola.csas-python-transformation-v2",
    "keboola.databricks-transformation",
    "keboola.exasol-transformation",
    "keboola.python-mlflow-transformation",
];

/// Storage events that count as a table load
pub const TABLE_LOAD_EVENTS: &[&str] = &[
    "storage.tableExported",
    "storage.tableImportError",
    "storage.tableImportStarted",
    "storage.tableImportDone",
    "storage.workspaceLoaded",
    "storage.workspaceTableCloned",
];

const LEGACY_ORCHESTRATOR: &str = "orchestrator";
const FLOW_ORCHESTRATOR: &str = "keboola.orchestrator";
const LEGACY_TRANSFORMATION: &str = "transformation";
const WORKSPACE_LOADED_EVENT: &str = "storage.workspaceLoaded";
const UNFINISHED_JOB_STATUSES: &[&str] = &["processing", "waiting", "terminating"];

/// Extraction of one project's datasets into a catalog
pub struct ProjectRun<'a> {
    source: &'a mut dyn MetadataSource,
    catalog: &'a mut TableCatalog,
    scope: Scope,
    base: ParentContext,
}

impl<'a> ProjectRun<'a> {
    pub fn new(
        source: &'a mut dyn MetadataSource,
        catalog: &'a mut TableCatalog,
        project_id: &str,
        region: &str,
    ) -> Self {
        ProjectRun {
            source,
            catalog,
            scope: Scope::Project(project_id.to_string()),
            base: ParentContext::new()
                .with("region", region)
                .with("project_id", project_id),
        }
    }

    /// Context every row of this project carries
    pub fn base(&self) -> &ParentContext {
        &self.base
    }

    fn fetch_rows(&mut self, endpoint: Endpoint) -> Result<Vec<Value>> {
        let response = self.source.fetch(&self.scope, &endpoint)?;
        rows(&endpoint, response)
    }

    pub fn waiting_jobs(&mut self) -> Result<()> {
        let jobs = self.fetch_rows(Endpoint::WaitingJobs)?;
        self.catalog.write_rows("waiting-jobs", jobs, &self.base)
    }

    /// Tokens, and optionally the most recent event of each
    pub fn tokens(&mut self, with_last_events: bool) -> Result<()> {
        let tokens = self.fetch_rows(Endpoint::Tokens)?;
        let token_ids: Vec<Value> = tokens
            .iter()
            .filter_map(|token| token.get("id").cloned())
            .collect();

        self.catalog.write_rows("tokens", tokens, &self.base)?;

        if with_last_events {
            for token_id in token_ids {
                let events = self.fetch_rows(Endpoint::TokenEvents {
                    token_id: text(Some(&token_id)),
                })?;
                let parent = self.base.clone().with("token_id", token_id);
                self.catalog
                    .write_rows("tokens-last-events", events.into_iter().take(1), &parent)?;
            }
        }
        Ok(())
    }

    /// Configurations of every component, labelled with their component
    pub fn configurations(&mut self) -> Result<()> {
        let components = self.fetch_rows(Endpoint::Components)?;

        for mut component in components {
            let endpoint = Endpoint::Components;
            let obj = as_object_mut(&endpoint, &mut component)?;
            let parent = self
                .base
                .clone()
                .with("component_id", field(obj, "id"))
                .with("component_type", field(obj, "type"))
                .with("component_name", field(obj, "name"));
            let configurations = take_rows(obj, "configurations");

            self.catalog.write_rows("configurations", configurations, &parent)?;
        }
        Ok(())
    }

    /// Tables with their metadata and, optionally, columns and column metadata
    pub fn tables(&mut self, with_columns: bool) -> Result<()> {
        let mut tables = self.fetch_rows(Endpoint::Tables)?;

        for table in tables.iter_mut() {
            let obj = as_object_mut(&Endpoint::Tables, table)?;
            let primary_key = join_list(obj.get("primaryKey"));
            obj.insert("primaryKey".to_string(), Value::String(primary_key));

            let parent = self.base.clone().with("table_id", field(obj, "id"));
            let metadata = take_rows(obj, "metadata");
            self.catalog.write_rows("tables-metadata", metadata, &parent)?;

            if with_columns {
                let columns = take_rows(obj, "columns")
                    .into_iter()
                    .map(|column| json!({ "column": column }));
                self.catalog.write_rows("tables-columns", columns, &parent)?;

                if let Some(Value::Object(column_metadata)) = obj.remove("columnMetadata") {
                    for (column, metadata) in column_metadata {
                        let column_parent = parent.clone().with("column", column);
                        self.catalog.write_rows(
                            "tables-columns-metadata",
                            into_rows(metadata),
                            &column_parent,
                        )?;
                    }
                }
            }
        }

        self.catalog.write_rows("tables", tables, &self.base)
    }

    /// Legacy orchestrations with notifications, and tasks from their stored configuration
    pub fn orchestrations(&mut self) -> Result<()> {
        let mut orchestrations = self.fetch_rows(Endpoint::Orchestrations)?;
        let configs = self.fetch_rows(Endpoint::ComponentConfigs {
            component_id: LEGACY_ORCHESTRATOR.to_string(),
        })?;

        let mut children = Vec::with_capacity(orchestrations.len());
        for orchestration in orchestrations.iter_mut() {
            let obj = as_object_mut(&Endpoint::Orchestrations, orchestration)?;
            children.push((field(obj, "id"), take_rows(obj, "notifications")));
        }

        self.catalog.write_rows("orchestrations", orchestrations, &self.base)?;

        for (orchestration_id, notifications) in children {
            let id = text(Some(&orchestration_id));
            let parent = self.base.clone().with("orchestration_id", orchestration_id);
            self.catalog
                .write_rows("orchestrations-notifications", notifications, &parent)?;

            let Some(config) = configs.iter().find(|c| text(c.get("id")) == id) else {
                tracing::warn!(orchestration = %id, "orchestration has no stored configuration");
                continue;
            };
            let tasks = config
                .pointer("/configuration/tasks")
                .cloned()
                .map(into_rows)
                .unwrap_or_default();

            for (idx, mut task) in tasks.into_iter().enumerate() {
                if let Some(obj) = task.as_object_mut() {
                    obj.insert("api_index".to_string(), json!(idx));
                }
                self.catalog.write_row("orchestrations-tasks", task, &parent)?;
            }
        }
        Ok(())
    }

    /// Flow orchestrations with their phases and tasks
    pub fn orchestrations_v2(&mut self) -> Result<()> {
        let endpoint = Endpoint::ComponentConfigs {
            component_id: FLOW_ORCHESTRATOR.to_string(),
        };
        let flows = self.fetch_rows(endpoint.clone())?;

        for mut flow in flows {
            let obj = as_object_mut(&endpoint, &mut flow)?;
            let mut configuration = obj.remove("configuration").unwrap_or(Value::Null);
            if let Some(created) = obj.get("created").cloned() {
                obj.entry("createdTime").or_insert(created);
            }
            if let Some(creator) = obj.remove("creatorToken") {
                obj.entry("token").or_insert(creator);
            }

            let parent = self.base.clone().with("orchestration_id", field(obj, "id"));
            self.catalog.write_row("orchestrations-v2", flow, &self.base)?;

            for (idx, mut phase) in take_pointer(&mut configuration, "/phases")
                .into_iter()
                .enumerate()
            {
                if let Some(obj) = phase.as_object_mut() {
                    obj.insert("phase_index".to_string(), json!(idx));
                }
                self.catalog.write_row("orchestrations-v2-phases", phase, &parent)?;
            }

            for mut task in take_pointer(&mut configuration, "/tasks") {
                if let Some(obj) = task.as_object_mut() {
                    if let Some(Value::Object(target)) = obj.remove("task") {
                        obj.insert("component_id".to_string(), field(&target, "componentId"));
                        obj.insert("config_id".to_string(), field(&target, "configId"));
                        obj.insert("mode".to_string(), field(&target, "mode"));
                    }
                }
                self.catalog.write_row("orchestrations-v2-tasks", task, &parent)?;
            }
        }
        Ok(())
    }

    pub fn triggers(&mut self) -> Result<()> {
        let mut triggers = self.fetch_rows(Endpoint::Triggers)?;

        let mut children = Vec::with_capacity(triggers.len());
        for trigger in triggers.iter_mut() {
            let obj = as_object_mut(&Endpoint::Triggers, trigger)?;
            children.push((field(obj, "id"), take_rows(obj, "tables")));
        }

        self.catalog.write_rows("triggers", triggers, &self.base)?;

        for (trigger_id, tables) in children {
            let parent = self.base.clone().with("trigger_id", trigger_id);
            self.catalog.write_rows("triggers-tables", tables, &parent)?;
        }
        Ok(())
    }

    /// Workspace load events of transformation jobs newer than `cursor`.
    ///
    /// Without a cursor, jobs created in the seven days before `today` are
    /// read. Returns the new cursor: the last job before the first unfinished
    /// one, so unfinished jobs are read again next run.
    pub fn workspace_load_events(
        &mut self,
        cursor: Option<&str>,
        today: NaiveDate,
    ) -> Result<Option<String>> {
        let mut jobs = self.fetch_rows(Endpoint::TransformationJobs)?;

        match cursor {
            Some(last) => jobs.retain(|job| compare_job_ids(&text(job.get("id")), last).is_gt()),
            None => {
                let since = today - chrono::Duration::days(7);
                jobs.retain(|job| created_on_or_after(job.get("createdTime"), since));
            }
        }
        jobs.sort_by(|a, b| compare_job_ids(&text(a.get("id")), &text(b.get("id"))));

        let mut new_cursor = cursor.map(str::to_string);
        let mut unfinished_seen = false;

        for job in jobs {
            let status = job.get("status").and_then(Value::as_str).unwrap_or_default();
            if UNFINISHED_JOB_STATUSES.contains(&status) {
                unfinished_seen = true;
            }
            if !unfinished_seen {
                new_cursor = Some(text(job.get("id")));
            }

            let run_id = text(job.get("runId"));
            let events = self
                .fetch_rows(Endpoint::RunEvents { run_id })?
                .into_iter()
                .filter(|event| event.get("event").and_then(Value::as_str) == Some(WORKSPACE_LOADED_EVENT));
            self.catalog.write_rows("workspace-table-loads", events, &self.base)?;
        }

        Ok(new_cursor)
    }

    /// Legacy transformation buckets and everything configured inside them
    pub fn transformations(&mut self) -> Result<()> {
        let endpoint = Endpoint::ComponentConfigs {
            component_id: LEGACY_TRANSFORMATION.to_string(),
        };
        let mut buckets = self.fetch_rows(endpoint.clone())?;

        let mut bucket_rows = Vec::with_capacity(buckets.len());
        for bucket in buckets.iter_mut() {
            let obj = as_object_mut(&endpoint, bucket)?;
            bucket_rows.push((field(obj, "id"), take_rows(obj, "rows")));
        }

        self.catalog.write_rows("transformations-buckets", buckets, &self.base)?;

        for (bucket_id, transformations) in bucket_rows {
            let bucket_key = text(Some(&bucket_id));
            let bucket_parent = self.base.clone().with("bucket_id", bucket_id);

            for transformation in transformations {
                self.legacy_transformation(&endpoint, transformation, &bucket_key, &bucket_parent)?;
            }
        }
        Ok(())
    }

    fn legacy_transformation(
        &mut self,
        endpoint: &Endpoint,
        mut transformation: Value,
        bucket_id: &str,
        bucket_parent: &ParentContext,
    ) -> Result<()> {
        let obj = as_object_mut(endpoint, &mut transformation)?;
        let mut configuration = obj
            .remove("configuration")
            .unwrap_or_else(|| Value::Object(Map::new()));
        let backend = configuration
            .get("backend")
            .and_then(Value::as_str)
            .map(str::to_string);

        if backend.as_deref() == Some("mysql") {
            return Ok(());
        }

        let inputs = take_pointer(&mut configuration, "/input");
        let outputs = take_pointer(&mut configuration, "/output");
        let queries = take_pointer(&mut configuration, "/queries");
        if let Some(config) = configuration.as_object_mut() {
            let packages = join_list(config.get("packages"));
            let requires = join_list(config.get("requires"));
            config.insert("packages".to_string(), Value::String(packages));
            config.insert("requires".to_string(), Value::String(requires));
        }

        let hash = transformation_hash(&text(obj.get("id")), bucket_id);
        obj.insert("id_md5".to_string(), Value::String(hash.clone()));
        obj.insert("configuration".to_string(), configuration);
        self.catalog.write_row("transformations", transformation, bucket_parent)?;

        let parent = bucket_parent.clone().with("transformation_id", hash);

        for mut input in inputs {
            let mut datatypes = Value::Null;
            if let Some(obj) = input.as_object_mut() {
                let columns = join_list(obj.get("columns"));
                let where_values = join_list(obj.get("whereValues"));
                obj.insert("columns".to_string(), Value::String(columns));
                obj.insert("whereValues".to_string(), Value::String(where_values));
                obj.entry("loadType").or_insert_with(|| json!("copy"));
                datatypes = obj.remove("datatypes").unwrap_or(Value::Null);
            }
            let source = input.get("source").cloned().unwrap_or(Value::Null);
            let destination = input.get("destination").cloned().unwrap_or(Value::Null);
            self.catalog.write_row("transformations-inputs", input, &parent)?;

            if backend.as_deref() == Some("redshift") {
                continue;
            }
            let datatypes = match datatypes {
                Value::Object(by_column) => by_column.into_iter().map(|(_, dt)| dt).collect(),
                other => into_rows(other),
            };
            for mut datatype in datatypes {
                let Some(obj) = datatype.as_object_mut() else {
                    continue;
                };
                obj.insert("source".to_string(), source.clone());
                obj.insert("destination".to_string(), destination.clone());
                self.catalog
                    .write_row("transformations-inputs-metadata", datatype, &parent)?;
            }
        }

        for mut output in outputs {
            if let Some(obj) = output.as_object_mut() {
                let primary_key = join_list(obj.get("primaryKey"));
                let delete_where_values = join_list(obj.get("deleteWhereValues"));
                obj.insert("primaryKey".to_string(), Value::String(primary_key));
                obj.insert("deleteWhereValues".to_string(), Value::String(delete_where_values));
                obj.entry("incremental").or_insert(Value::Bool(false));
            }
            self.catalog.write_row("transformations-outputs", output, &parent)?;
        }

        let queries = queries
            .into_iter()
            .enumerate()
            .map(|(idx, query)| json!({ "query_index": idx, "query": query }));
        self.catalog.write_rows("transformations-queries", queries, &parent)
    }

    /// Version 2 transformations of every transformation component
    pub fn transformations_v2(&mut self) -> Result<()> {
        for component_id in TRANSFORMATION_V2_COMPONENTS {
            let endpoint = Endpoint::ComponentConfigs {
                component_id: component_id.to_string(),
            };
            let configs = self.fetch_rows(endpoint.clone())?;
            let component_parent = self.base.clone().with("component_id", *component_id);

            for config in configs {
                self.transformation_v2(&endpoint, config, &component_parent)?;
            }
        }
        Ok(())
    }

    fn transformation_v2(
        &mut self,
        endpoint: &Endpoint,
        mut transformation: Value,
        component_parent: &ParentContext,
    ) -> Result<()> {
        let obj = as_object_mut(endpoint, &mut transformation)?;
        let mut configuration = obj.remove("configuration").unwrap_or(Value::Null);

        obj.insert(
            "packages".to_string(),
            Value::String(join_list(configuration.pointer("/parameters/packages"))),
        );
        obj.insert("variables_id".to_string(), json!(text(configuration.get("variables_id"))));
        obj.insert(
            "variables_values_id".to_string(),
            json!(text(configuration.get("variables_values_id"))),
        );
        let transformation_id = field(obj, "id");
        self.catalog
            .write_row("transformations-v2", transformation, component_parent)?;

        let parent = component_parent
            .clone()
            .with("transformation_id", transformation_id);

        for mut input in take_pointer(&mut configuration, "/storage/input/tables") {
            let column_types = match input.as_object_mut() {
                Some(obj) => take_rows(obj, "column_types"),
                None => vec![],
            };
            let input_parent = parent
                .clone()
                .with("table_source", input.get("source").cloned().unwrap_or(Value::Null))
                .with(
                    "table_destination",
                    input.get("destination").cloned().unwrap_or(Value::Null),
                );
            self.catalog.write_row("transformations-v2-inputs", input, &parent)?;
            self.catalog
                .write_rows("transformations-v2-inputs-metadata", column_types, &input_parent)?;
        }

        for output in take_pointer(&mut configuration, "/storage/output/tables") {
            self.catalog.write_row("transformations-v2-outputs", output, &parent)?;
        }

        for (block_idx, block) in take_pointer(&mut configuration, "/parameters/blocks")
            .into_iter()
            .enumerate()
        {
            let block_parent = parent
                .clone()
                .with("block_name", block.get("name").cloned().unwrap_or(Value::Null))
                .with("block_index", block_idx);
            let codes = block.get("codes").cloned().map(into_rows).unwrap_or_default();

            for (code_idx, code) in codes.into_iter().enumerate() {
                let code_parent = block_parent
                    .clone()
                    .with("code_name", code.get("name").cloned().unwrap_or(Value::Null))
                    .with("code_index", code_idx);
                let scripts = match code.get("script") {
                    Some(Value::String(script)) => vec![Value::String(script.clone())],
                    Some(other) => into_rows(other.clone()),
                    None => vec![],
                };

                let scripts = scripts
                    .into_iter()
                    .enumerate()
                    .map(|(idx, script)| json!({ "script": script, "script_index": idx }));
                self.catalog
                    .write_rows("transformations-v2-codes", scripts, &code_parent)?;
            }
        }
        Ok(())
    }

    /// Load events of every table created on or after `since`
    pub fn table_load_events(&mut self, since: NaiveDate) -> Result<()> {
        let table_ids: Vec<String> = self
            .fetch_rows(Endpoint::Tables)?
            .iter()
            .map(|table| text(table.get("id")))
            .filter(|id| !id.is_empty())
            .collect();

        for table_id in table_ids {
            let events = self.fetch_rows(Endpoint::TableEvents { table_id })?;
            let events = events.into_iter().filter(|event| {
                let name = event.get("event").and_then(Value::as_str).unwrap_or_default();
                TABLE_LOAD_EVENTS.contains(&name) && created_on_or_after(event.get("created"), since)
            });
            self.catalog.write_rows("tables-load-events", events, &self.base)?;
        }
        Ok(())
    }

    /// Users of this project; needs organization access
    pub fn project_users(&mut self) -> Result<()> {
        let users = self.fetch_rows(Endpoint::ProjectUsers)?;
        self.catalog.write_rows("project-users", users, &self.base)
    }
}

/// Members of the organization itself
pub fn organization_users(
    source: &mut dyn MetadataSource,
    catalog: &mut TableCatalog,
    organization_id: &str,
    region: &str,
) -> Result<()> {
    let endpoint = Endpoint::OrganizationUsers;
    let users = rows(&endpoint, source.fetch(&Scope::Organization, &endpoint)?)?;
    let parent = ParentContext::new()
        .with("organization_id", organization_id)
        .with("region", region);
    catalog.write_rows("organization-users", users, &parent)
}

/// Stable identifier of a legacy transformation: md5 of `id|bucket_id`
pub fn transformation_hash(transformation_id: &str, bucket_id: &str) -> String {
    let digest = Md5::digest(format!("{}|{}", transformation_id, bucket_id).as_bytes());
    format!("{:x}", digest)
}

/// Job ids are numeric strings; fall back to text order otherwise
pub fn compare_job_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// A timestamp's date is on or after `since`; unparsable timestamps pass
fn created_on_or_after(created: Option<&Value>, since: NaiveDate) -> bool {
    let Some(created) = created.and_then(Value::as_str) else {
        return true;
    };
    match created.get(..10).map(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d")) {
        Some(Ok(day)) => day >= since,
        _ => true,
    }
}

fn as_object_mut<'v>(endpoint: &Endpoint, value: &'v mut Value) -> Result<&'v mut Map<String, Value>> {
    let found = json_type_name(value);
    value.as_object_mut().ok_or_else(|| Error::MalformedResponse {
        endpoint: endpoint.to_string(),
        reason: format!("expected an object, found {}", found),
    })
}

fn field(obj: &Map<String, Value>, key: &str) -> Value {
    obj.get(key).cloned().unwrap_or(Value::Null)
}

/// Text form of an identifier: strings as-is, numbers in decimal
fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Join a list into one comma-separated cell
fn join_list(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| text(Some(item)))
            .collect::<Vec<_>>()
            .join(","),
        other => text(other),
    }
}

fn into_rows(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => vec![],
        other => vec![other],
    }
}

fn take_rows(obj: &mut Map<String, Value>, key: &str) -> Vec<Value> {
    obj.remove(key).map(into_rows).unwrap_or_default()
}

fn take_pointer(value: &mut Value, pointer: &str) -> Vec<Value> {
    value
        .pointer_mut(pointer)
        .map(Value::take)
        .map(into_rows)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::source::MemorySource;
    use crate::table::CatalogOptions;
    use std::path::Path;

    fn project() -> Scope {
        Scope::Project("7".to_string())
    }

    fn read_table(dir: &Path, name: &str) -> Vec<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(dir.join(format!("{}.csv", name)))
            .unwrap();
        reader
            .records()
            .map(|record| record.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    fn column(dir: &Path, table: &str, name: &str) -> Vec<String> {
        let schema = crate::table::registry::lookup(table).unwrap();
        let position = schema.output_columns.iter().position(|c| *c == name).unwrap();
        read_table(dir, table).into_iter().map(|row| row[position].clone()).collect()
    }

    fn run<F>(source: &mut MemorySource, f: F) -> tempfile::TempDir
    where
        F: FnOnce(&mut ProjectRun<'_>) -> Result<()>,
    {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = TableCatalog::new(dir.path(), CatalogOptions::default()).unwrap();
        {
            let mut run = ProjectRun::new(source, &mut catalog, "7", "eu-central-1.keboola.com");
            f(&mut run).unwrap();
        }
        catalog.flush().unwrap();
        dir
    }

    #[test]
    fn test_tables_stitch_children() {
        let mut source = MemorySource::new().with(
            project(),
            Endpoint::Tables,
            json!([{
                "id": "in.c-main.users",
                "name": "users",
                "primaryKey": ["id", "email"],
                "bucket": {"id": "in.c-main", "sharedBy": {"name": "hub"}},
                "metadata": [{"id": "m1", "key": "owner", "value": "ops", "project_id": "999"}],
                "columns": ["id", "email"],
                "columnMetadata": {"email": [{"id": "cm1", "key": "type", "value": "STRING"}]}
            }]),
        );

        let dir = run(&mut source, |run| run.tables(true));

        assert_eq!(column(dir.path(), "tables", "primary_key"), vec!["id,email"]);
        assert_eq!(column(dir.path(), "tables", "bucket_id"), vec!["in.c-main"]);
        assert_eq!(column(dir.path(), "tables", "shared_by_name"), vec!["hub"]);
        assert_eq!(column(dir.path(), "tables", "region"), vec!["eu-central-1.keboola.com"]);

        assert_eq!(column(dir.path(), "tables-metadata", "table_id"), vec!["in.c-main.users"]);
        assert_eq!(column(dir.path(), "tables-metadata", "project_id"), vec!["7"]);

        assert_eq!(column(dir.path(), "tables-columns", "column"), vec!["id", "email"]);
        assert_eq!(column(dir.path(), "tables-columns-metadata", "column"), vec!["email"]);
        assert_eq!(column(dir.path(), "tables-columns-metadata", "value"), vec!["STRING"]);
    }

    #[test]
    fn test_tables_without_columns() {
        let mut source = MemorySource::new().with(
            project(),
            Endpoint::Tables,
            json!([{"id": "in.c-main.users", "columns": ["id"], "metadata": []}]),
        );

        let dir = run(&mut source, |run| run.tables(false));

        assert_eq!(read_table(dir.path(), "tables").len(), 1);
        assert!(read_table(dir.path(), "tables-metadata").is_empty());
        assert!(!dir.path().join("tables-columns.csv").exists());
    }

    #[test]
    fn test_configurations_carry_component() {
        let mut source = MemorySource::new().with(
            project(),
            Endpoint::Components,
            json!([{
                "id": "keboola.ex-db",
                "type": "extractor",
                "name": "Database",
                "configurations": [
                    {"id": "101", "name": "prod", "configuration": {"tables": [1]}, "rows": []}
                ]
            }]),
        );

        let dir = run(&mut source, |run| run.configurations());

        assert_eq!(column(dir.path(), "configurations", "component_id"), vec!["keboola.ex-db"]);
        assert_eq!(column(dir.path(), "configurations", "component_type"), vec!["extractor"]);
        assert_eq!(column(dir.path(), "configurations", "configuration"), vec![r#"{"tables": [1]}"#]);
        assert_eq!(column(dir.path(), "configurations", "rows"), vec!["[]"]);
    }

    #[test]
    fn test_tokens_keep_only_last_event() {
        let mut source = MemorySource::new()
            .with(project(), Endpoint::Tokens, json!([{"id": "55", "description": "ci"}]))
            .with(
                project(),
                Endpoint::TokenEvents {
                    token_id: "55".to_string(),
                },
                json!([{"id": 9, "event": "storage.tableExported"}, {"id": 8, "event": "older"}]),
            );

        let dir = run(&mut source, |run| run.tokens(true));

        assert_eq!(column(dir.path(), "tokens-last-events", "token_id"), vec!["55"]);
        assert_eq!(column(dir.path(), "tokens-last-events", "event_id"), vec!["9"]);
    }

    #[test]
    fn test_orchestration_tasks_from_configuration() {
        let mut source = MemorySource::new()
            .with(
                project(),
                Endpoint::Orchestrations,
                json!([{
                    "id": 31,
                    "name": "nightly",
                    "notifications": [{"email": "ops@example.com", "channel": "error", "parameters": {}}]
                }]),
            )
            .with(
                project(),
                Endpoint::ComponentConfigs {
                    component_id: "orchestrator".to_string(),
                },
                json!([{"id": "31", "configuration": {"tasks": [
                    {"id": 1, "component": "ex", "actionParameters": {"config": "a"}},
                    {"id": 2, "component": "wr", "actionParameters": {"config": "b"}}
                ]}}]),
            );

        let dir = run(&mut source, |run| run.orchestrations());

        assert_eq!(column(dir.path(), "orchestrations", "name"), vec!["nightly"]);
        assert_eq!(column(dir.path(), "orchestrations-notifications", "orchestration_id"), vec!["31"]);
        assert_eq!(column(dir.path(), "orchestrations-notifications", "parameters"), vec!["{}"]);
        assert_eq!(column(dir.path(), "orchestrations-tasks", "api_index"), vec!["0", "1"]);
        assert_eq!(
            column(dir.path(), "orchestrations-tasks", "action_parameters"),
            vec![r#"{"config": "a"}"#, r#"{"config": "b"}"#]
        );
        assert_eq!(column(dir.path(), "orchestrations-tasks", "orchestration_id"), vec!["31", "31"]);
    }

    #[test]
    fn test_flows_phases_and_tasks() {
        let mut source = MemorySource::new().with(
            project(),
            Endpoint::ComponentConfigs {
                component_id: "keboola.orchestrator".to_string(),
            },
            json!([{
                "id": "900",
                "name": "flow",
                "created": "2024-01-01T00:00:00+0100",
                "creatorToken": {"id": 4, "description": "me"},
                "configuration": {
                    "phases": [{"id": 1, "name": "load", "dependsOn": []}, {"id": 2, "name": "run", "dependsOn": [1]}],
                    "tasks": [{"id": 10, "name": "t", "phase": 2,
                               "task": {"componentId": "keboola.wr-db", "configId": "77", "mode": "run"},
                               "continueOnFailure": false, "enabled": true}]
                }
            }]),
        );

        let dir = run(&mut source, |run| run.orchestrations_v2());

        assert_eq!(column(dir.path(), "orchestrations-v2", "token_id"), vec!["4"]);
        assert_eq!(
            column(dir.path(), "orchestrations-v2", "created_time"),
            vec!["2024-01-01T00:00:00+0100"]
        );
        assert_eq!(column(dir.path(), "orchestrations-v2-phases", "depends_on"), vec!["[]", "[1]"]);
        assert_eq!(column(dir.path(), "orchestrations-v2-phases", "phase_index"), vec!["0", "1"]);
        assert_eq!(column(dir.path(), "orchestrations-v2-tasks", "component_id"), vec!["keboola.wr-db"]);
        assert_eq!(column(dir.path(), "orchestrations-v2-tasks", "orchestration_id"), vec!["900"]);
    }

    #[test]
    fn test_triggers_tables() {
        let mut source = MemorySource::new().with(
            project(),
            Endpoint::Triggers,
            json!([{"id": "3", "runWithTokenId": 1, "tables": [{"tableId": "in.c-a.x"}, {"tableId": "in.c-a.y"}]}]),
        );

        let dir = run(&mut source, |run| run.triggers());

        assert_eq!(column(dir.path(), "triggers", "run_with_token_id"), vec!["1"]);
        assert_eq!(column(dir.path(), "triggers-tables", "table_id"), vec!["in.c-a.x", "in.c-a.y"]);
        assert_eq!(column(dir.path(), "triggers-tables", "trigger_id"), vec!["3", "3"]);
    }

    #[test]
    fn test_legacy_transformations() {
        let mut source = MemorySource::new().with(
            project(),
            Endpoint::ComponentConfigs {
                component_id: "transformation".to_string(),
            },
            json!([{
                "id": "b1",
                "name": "bucket",
                "rows": [
                    {"id": "t1", "name": "clean", "configuration": {
                        "backend": "snowflake", "packages": ["a", "b"],
                        "input": [{"source": "in.c-a.x", "destination": "x", "columns": ["c1", "c2"],
                                   "whereValues": [1, "two"],
                                   "datatypes": {"c1": {"column": "c1", "type": "VARCHAR"}, "c2": null}}],
                        "output": [{"source": "out", "destination": "out.c-a.y", "primaryKey": ["c1"]}],
                        "queries": ["select 1", "select 2"]
                    }},
                    {"id": "t2", "configuration": {"backend": "mysql"}}
                ]
            }]),
        );

        let dir = run(&mut source, |run| run.transformations());
        let hash = transformation_hash("t1", "b1");

        assert_eq!(column(dir.path(), "transformations-buckets", "id"), vec!["b1"]);
        assert_eq!(column(dir.path(), "transformations", "id"), vec![hash.clone()]);
        assert_eq!(column(dir.path(), "transformations", "number"), vec!["t1"]);
        assert_eq!(column(dir.path(), "transformations", "packages"), vec!["a,b"]);
        assert_eq!(column(dir.path(), "transformations", "bucket_id"), vec!["b1"]);

        assert_eq!(column(dir.path(), "transformations-inputs", "transformation_id"), vec![hash.clone()]);
        assert_eq!(column(dir.path(), "transformations-inputs", "input_columns"), vec!["c1,c2"]);
        assert_eq!(column(dir.path(), "transformations-inputs", "filter_where_values"), vec!["1,two"]);
        assert_eq!(column(dir.path(), "transformations-inputs", "load_type"), vec!["copy"]);

        assert_eq!(column(dir.path(), "transformations-inputs-metadata", "datatype"), vec!["VARCHAR"]);
        assert_eq!(column(dir.path(), "transformations-inputs-metadata", "source"), vec!["in.c-a.x"]);

        assert_eq!(column(dir.path(), "transformations-outputs", "incremental_load"), vec!["False"]);
        assert_eq!(column(dir.path(), "transformations-outputs", "primary_key"), vec!["c1"]);

        assert_eq!(column(dir.path(), "transformations-queries", "query_index"), vec!["0", "1"]);
        assert_eq!(column(dir.path(), "transformations-queries", "query"), vec!["select 1", "select 2"]);
    }

    #[test]
    fn test_transformations_v2_codes_and_io() {
        let mut source = MemorySource::new().with(
            project(),
            Endpoint::ComponentConfigs {
                component_id: "keboola.snowflake-transformation".to_string(),
            },
            json!([{
                "id": "501",
                "name": "model",
                "configuration": {
                    "parameters": {
                        "packages": ["pandas"],
                        "blocks": [{"name": "Block 1", "codes": [
                            {"name": "first", "script": ["select 1;", "select 2;"]},
                            {"name": "second", "script": "select 3;"}
                        ]}]
                    },
                    "storage": {
                        "input": {"tables": [{"source": "in.c-a.x", "destination": "x", "where_values": ["a"],
                                              "column_types": [{"source": "c1", "type": "VARCHAR"}]}]},
                        "output": {"tables": [{"source": "y", "destination": "out.c-a.y", "primary_key": ["id"]}]}
                    },
                    "variables_id": "12"
                }
            }]),
        );

        let dir = run(&mut source, |run| run.transformations_v2());

        assert_eq!(column(dir.path(), "transformations-v2", "packages"), vec!["pandas"]);
        assert_eq!(column(dir.path(), "transformations-v2", "variables_id"), vec!["12"]);
        assert_eq!(
            column(dir.path(), "transformations-v2", "component_id"),
            vec!["keboola.snowflake-transformation"]
        );
        assert_eq!(column(dir.path(), "transformations-v2-inputs", "where_values"), vec![r#"["a"]"#]);
        assert_eq!(column(dir.path(), "transformations-v2-inputs-metadata", "column"), vec!["c1"]);
        assert_eq!(
            column(dir.path(), "transformations-v2-inputs-metadata", "table_source"),
            vec!["in.c-a.x"]
        );
        assert_eq!(column(dir.path(), "transformations-v2-outputs", "primary_key"), vec![r#"["id"]"#]);

        assert_eq!(
            column(dir.path(), "transformations-v2-codes", "script"),
            vec!["select 1;", "select 2;", "select 3;"]
        );
        assert_eq!(column(dir.path(), "transformations-v2-codes", "code_index"), vec!["0", "0", "1"]);
        assert_eq!(column(dir.path(), "transformations-v2-codes", "script_index"), vec!["0", "1", "0"]);
        assert_eq!(column(dir.path(), "transformations-v2-codes", "transformation_id"), vec!["501"; 3]);
    }

    #[test]
    fn test_workspace_cursor_stops_at_unfinished_job() {
        let mut source = MemorySource::new()
            .with(
                project(),
                Endpoint::TransformationJobs,
                json!([
                    {"id": "104", "runId": "104", "status": "success"},
                    {"id": "103", "runId": "103", "status": "processing"},
                    {"id": "102", "runId": "102", "status": "success"},
                    {"id": "100", "runId": "100", "status": "success"}
                ]),
            )
            .with(
                project(),
                Endpoint::RunEvents {
                    run_id: "102".to_string(),
                },
                json!([{"id": 1, "event": "storage.workspaceLoaded", "params": {"rows": 5}}]),
            );

        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let mut cursor = None;
        let dir = run(&mut source, |run| {
            cursor = run.workspace_load_events(Some("100"), today)?;
            Ok(())
        });

        assert_eq!(cursor.as_deref(), Some("102"));
        assert_eq!(column(dir.path(), "workspace-table-loads", "params"), vec![r#"{"rows": 5}"#]);

        let fetched_runs: Vec<&Endpoint> = source
            .requests()
            .iter()
            .map(|(_, endpoint)| endpoint)
            .filter(|endpoint| matches!(endpoint, Endpoint::RunEvents { .. }))
            .collect();
        assert_eq!(fetched_runs.len(), 3);
    }

    #[test]
    fn test_workspace_loads_keep_only_workspace_loaded_events() {
        let mut source = MemorySource::new()
            .with(
                project(),
                Endpoint::TransformationJobs,
                json!([{"id": "20", "runId": "20.1", "status": "success"}]),
            )
            .with(
                project(),
                Endpoint::RunEvents {
                    run_id: "20.1".to_string(),
                },
                json!([
                    {"id": 3, "event": "storage.workspaceLoaded", "objectId": "in.c-a.x"},
                    {"id": 2, "event": "transformation.prepare"},
                    {"id": 1, "event": "storage.tableImportDone", "objectId": "out.c-a.y"}
                ]),
            );

        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let dir = run(&mut source, |run| run.workspace_load_events(Some("10"), today).map(|_| ()));

        assert_eq!(column(dir.path(), "workspace-table-loads", "id"), vec!["3"]);
        assert_eq!(column(dir.path(), "workspace-table-loads", "object_id"), vec!["in.c-a.x"]);
    }

    #[test]
    fn test_workspace_without_cursor_reads_last_week() {
        let mut source = MemorySource::new().with(
            project(),
            Endpoint::TransformationJobs,
            json!([
                {"id": "9", "runId": "9", "status": "success", "createdTime": "2024-05-08T10:00:00+0200"},
                {"id": "5", "runId": "5", "status": "success", "createdTime": "2024-04-01T10:00:00+0200"}
            ]),
        );

        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let mut cursor = None;
        run(&mut source, |run| {
            cursor = run.workspace_load_events(None, today)?;
            Ok(())
        });

        assert_eq!(cursor.as_deref(), Some("9"));
    }

    #[test]
    fn test_table_load_events_filtered_by_date_and_kind() {
        let mut source = MemorySource::new()
            .with(project(), Endpoint::Tables, json!([{"id": "in.c-a.x"}]))
            .with(
                project(),
                Endpoint::TableEvents {
                    table_id: "in.c-a.x".to_string(),
                },
                json!([
                    {"id": 3, "event": "storage.tableImportDone", "created": "2024-05-09T08:00:00+0200"},
                    {"id": 2, "event": "storage.tableCreated", "created": "2024-05-09T07:00:00+0200"},
                    {"id": 1, "event": "storage.tableImportDone", "created": "2024-04-01T07:00:00+0200"}
                ]),
            );

        let since = NaiveDate::from_ymd_opt(2024, 5, 3).unwrap();
        let dir = run(&mut source, |run| run.table_load_events(since));

        assert_eq!(column(dir.path(), "tables-load-events", "id"), vec!["3"]);
    }

    #[test]
    fn test_organization_users_context() {
        let mut source = MemorySource::new().with(
            Scope::Organization,
            Endpoint::OrganizationUsers,
            json!([{"id": 1, "name": "Ada", "invitor": {"email": "root@example.com"}}]),
        );
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = TableCatalog::new(dir.path(), CatalogOptions::default()).unwrap();

        organization_users(&mut source, &mut catalog, "12", "keboola.com").unwrap();
        catalog.flush().unwrap();

        assert_eq!(column(dir.path(), "organization-users", "organization_id"), vec!["12"]);
        assert_eq!(column(dir.path(), "organization-users", "invitor_email"), vec!["root@example.com"]);
    }

    #[test]
    fn test_malformed_response() {
        let mut source = MemorySource::new().with(project(), Endpoint::Triggers, json!({"error": "denied"}));
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = TableCatalog::new(dir.path(), CatalogOptions::default()).unwrap();
        let mut run = ProjectRun::new(&mut source, &mut catalog, "7", "keboola.com");

        let err = run.triggers().unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::MalformedInput);
    }

    #[test]
    fn test_helpers() {
        assert_eq!(transformation_hash("1", "2"), format!("{:x}", Md5::digest(b"1|2")));
        assert_eq!(compare_job_ids("99", "100"), Ordering::Less);
        assert_eq!(compare_job_ids("b", "a"), Ordering::Greater);
        assert_eq!(join_list(Some(&json!(["a", 1, true]))), "a,1,true");
        assert_eq!(join_list(None), "");
    }
}
