//! Static registry of the logical output tables
//!
//! Each entry lists the flattened key-paths read from source rows, the column
//! names published downstream (same position), the primary key and the
//! columns kept as JSON text. Versioned tables such as `transformations` and
//! `transformations-v2` are ordinary separate entries.

use crate::error::{Error, Result};
use crate::table::definition::TableDefinition;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// A registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub raw_columns: &'static [&'static str],
    pub output_columns: &'static [&'static str],
    pub primary_key: &'static [&'static str],
    pub json_columns: &'static [&'static str],
}

static REGISTRY: Lazy<HashMap<&'static str, &'static TableSchema>> =
    Lazy::new(|| TABLES.iter().map(|schema| (schema.name, schema)).collect());

/// Canonical form of a table name: lowercase, words joined by `-`
pub fn normalize_name(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace('_', "-")
}

/// Look up a table, accepting `TABLES_METADATA` as well as `tables-metadata`
pub fn lookup(name: &str) -> Result<&'static TableSchema> {
    REGISTRY
        .get(normalize_name(name).as_str())
        .copied()
        .ok_or_else(|| Error::UnknownTable(name.to_string()))
}

/// All registered table names, in declaration order
pub fn table_names() -> impl Iterator<Item = &'static str> {
    TABLES.iter().map(|schema| schema.name)
}

/// Check every registry entry once at startup
pub fn validate_all() -> Result<()> {
    if REGISTRY.len() != TABLES.len() {
        return Err(Error::InvalidConfig(
            "table registry contains duplicate names".to_string(),
        ));
    }
    for schema in TABLES {
        TableDefinition::from_schema(schema, false).validate()?;
    }
    Ok(())
}

static TABLES: &[TableSchema] = &[
    TableSchema {
        name: "orchestrations",
        raw_columns: &[
            "id", "region", "project_id", "name", "crontabRecord", "crontabTimezone",
            "createdTime", "lastScheduledTime", "nextScheduledTime", "token_id",
            "token_description", "active", "lastExecutedJob_id", "lastExecutedJob_status",
            "lastExecutedJob_createdTime", "lastExecutedJob_startTime", "lastExecutedJob_endTime",
        ],
        output_columns: &[
            "id", "region", "project_id", "name", "crontab_record", "crontab_timezone",
            "created_time", "last_scheduled_time", "next_scheduled_time", "token_id",
            "token_description", "active", "last_executed_job_id", "last_executed_job_status",
            "last_executed_job_created_time", "last_executed_job_start_time",
            "last_executed_job_end_time",
        ],
        primary_key: &["id", "region"],
        json_columns: &[],
    },
    TableSchema {
        name: "orchestrations-tasks",
        raw_columns: &[
            "id", "orchestration_id", "region", "component", "action", "actionParameters",
            "timeoutMinutes", "active", "continueOnFailure", "phase", "api_index",
        ],
        output_columns: &[
            "id", "orchestration_id", "region", "component_id", "action", "action_parameters",
            "timeout_minutes", "is_active", "continue_on_failure", "phase", "api_index",
        ],
        primary_key: &["id", "region"],
        json_columns: &["actionParameters"],
    },
    TableSchema {
        name: "orchestrations-notifications",
        raw_columns: &["orchestration_id", "region", "email", "channel", "parameters"],
        output_columns: &["orchestration_id", "region", "email", "channel", "parameters"],
        primary_key: &["orchestration_id", "region", "email", "channel"],
        json_columns: &["parameters"],
    },
    TableSchema {
        name: "orchestrations-v2",
        raw_columns: &[
            "id", "region", "project_id", "name", "description", "createdTime", "token_id",
            "token_description", "version", "isDisabled", "isDeleted",
        ],
        output_columns: &[
            "id", "region", "project_id", "name", "description", "created_time", "token_id",
            "token_description", "version", "is_disabled", "is_deleted",
        ],
        primary_key: &["id", "region", "project_id"],
        json_columns: &[],
    },
    TableSchema {
        name: "orchestrations-v2-tasks",
        raw_columns: &[
            "id", "orchestration_id", "region", "project_id", "name", "phase", "component_id",
            "config_id", "mode", "continueOnFailure", "enabled",
        ],
        output_columns: &[
            "id", "orchestration_id", "region", "project_id", "name", "phase", "component_id",
            "config_id", "mode", "continue_on_failure", "enabled",
        ],
        primary_key: &["id", "region", "project_id"],
        json_columns: &[],
    },
    TableSchema {
        name: "orchestrations-v2-phases",
        raw_columns: &["id", "orchestration_id", "region", "project_id", "name", "dependsOn", "phase_index"],
        output_columns: &["id", "orchestration_id", "region", "project_id", "name", "depends_on", "phase_index"],
        primary_key: &["id", "region", "project_id"],
        json_columns: &[],
    },
    TableSchema {
        name: "waiting-jobs",
        raw_columns: &[
            "id", "region", "runId", "project_id", "project_name", "token_id", "token_description",
            "component", "status", "createdTime", "startTime", "endTime", "params_config",
            "params_configBucketId",
        ],
        output_columns: &[
            "id", "region", "run_id", "project_id", "project_name", "token_id",
            "token_description", "component", "status", "created_time", "start_time", "end_time",
            "params_configuration_id", "params_configuration_bucket_id",
        ],
        primary_key: &["id", "region"],
        json_columns: &[],
    },
    TableSchema {
        name: "tokens",
        raw_columns: &[
            "id", "region", "project_id", "created", "refreshed", "description", "isMasterToken",
            "canManageBuckets", "canManageTokens", "canReadAllFileUploads", "canPurgeTrash",
            "expires", "isExpired", "isDisabled", "dailyCapacity", "creatorToken_id",
            "creatorToken_description", "admin_id", "admin_name",
        ],
        output_columns: &[
            "id", "region", "project_id", "created", "refreshed", "description", "is_master_token",
            "can_manage_buckets", "can_manage_tokens", "can_read_all_file_uploads",
            "can_purge_trash", "expires", "is_expired", "is_disabled", "daily_capacity",
            "creator_token_id", "creator_token_description", "admin_id", "admin_name",
        ],
        primary_key: &["id", "region"],
        json_columns: &[],
    },
    TableSchema {
        name: "tokens-last-events",
        raw_columns: &[
            "token_id", "region", "project_id", "id", "event", "component", "message",
            "description", "type", "created", "configurationId", "objectId", "objectName",
            "objectType", "uri",
        ],
        output_columns: &[
            "token_id", "region", "project_id", "event_id", "event", "component", "message",
            "description", "type", "event_created", "configuration_id", "object_id", "object_name",
            "object_type", "uri",
        ],
        primary_key: &["token_id", "region", "project_id"],
        json_columns: &[],
    },
    TableSchema {
        name: "configurations",
        raw_columns: &[
            "id", "region", "project_id", "name", "created", "creatorToken_id",
            "creatorToken_description", "component_id", "component_name", "component_type",
            "version", "isDeleted", "currentVersion_created", "currentVersion_creatorToken_id",
            "currentVersion_creatorToken_description", "currentVersion_changeDescription",
            "description", "configuration", "rows",
        ],
        output_columns: &[
            "id", "region", "project_id", "name", "created", "creator_token_id",
            "creator_token_description", "component_id", "component_name", "component_type",
            "version", "is_deleted", "current_version_created", "current_version_creator_token_id",
            "current_version_creator_token_description", "current_version_change_description",
            "description", "configuration", "rows",
        ],
        primary_key: &["id", "region"],
        json_columns: &["configuration", "rows"],
    },
    TableSchema {
        name: "tables",
        raw_columns: &[
            "id", "region", "project_id", "name", "primaryKey", "created", "lastImportDate",
            "lastChangeDate", "rowsCount", "dataSizeBytes", "isAlias", "isAliasable", "bucket_id",
            "bucket_name", "bucket_stage", "bucket_created", "bucket_lastChangeDate",
            "bucket_isReadOnly", "bucket_sharing", "bucket_sharedBy_id", "bucket_sharedBy_name",
            "bucket_sharedBy_date", "sourceTable_id", "sourceTable_project_id",
        ],
        output_columns: &[
            "id", "region", "project_id", "name", "primary_key", "created", "last_import_date",
            "last_change_date", "rows_count", "data_size_bytes", "is_alias", "is_aliasable",
            "bucket_id", "bucket_name", "bucket_stage", "bucket_created",
            "bucket_last_change_date", "bucket_is_read_only", "sharing", "shared_by_id",
            "shared_by_name", "shared_by_date", "source_table_id", "source_table_project_id",
        ],
        primary_key: &["id", "region", "project_id"],
        json_columns: &[],
    },
    TableSchema {
        name: "tables-metadata",
        raw_columns: &["table_id", "region", "project_id", "id", "key", "value", "provider", "timestamp"],
        output_columns: &["table_id", "region", "project_id", "id", "key", "value", "provider", "timestamp"],
        primary_key: &["id", "table_id", "region", "project_id"],
        json_columns: &[],
    },
    TableSchema {
        name: "tables-columns",
        raw_columns: &["table_id", "region", "project_id", "column"],
        output_columns: &["table_id", "region", "project_id", "column"],
        primary_key: &["table_id", "region", "project_id", "column"],
        json_columns: &[],
    },
    TableSchema {
        name: "tables-columns-metadata",
        raw_columns: &[
            "table_id", "region", "project_id", "column", "id", "key", "value", "provider",
            "timestamp",
        ],
        output_columns: &[
            "table_id", "region", "project_id", "column", "id", "key", "value", "provider",
            "timestamp",
        ],
        primary_key: &["id"],
        json_columns: &[],
    },
    TableSchema {
        name: "tables-load-events",
        raw_columns: &[
            "id", "region", "project_id", "event", "component", "message", "runId", "created",
            "configurationId", "objectId", "objectName", "objectType", "context", "params",
            "results", "performance", "token_id", "token_name", "uri",
        ],
        output_columns: &[
            "id", "region", "project_id", "event", "component", "message", "run_id", "created",
            "configuration_id", "object_id", "object_name", "object_type", "context", "params",
            "results", "performance", "token_id", "token_name", "uri",
        ],
        primary_key: &["id", "region", "project_id"],
        json_columns: &["context", "params", "results", "performance"],
    },
    TableSchema {
        name: "transformations-buckets",
        raw_columns: &[
            "id", "region", "project_id", "name", "description", "version", "created",
            "creatorToken_id", "creatorToken_description", "changeDescription",
            "currentVersion_created", "currentVersion_creatorToken_id",
            "currentVersion_creatorToken_description",
        ],
        output_columns: &[
            "id", "region", "project_id", "name", "description", "version", "created",
            "creator_token_id", "creator_token_description", "change_description",
            "current_version_created", "current_version_creator_token_id",
            "current_version_creator_token_description",
        ],
        primary_key: &["id", "region", "project_id"],
        json_columns: &[],
    },
    TableSchema {
        name: "transformations",
        raw_columns: &[
            "id_md5", "id", "region", "project_id", "bucket_id", "name", "description",
            "configuration_packages", "configuration_requires", "configuration_backend",
            "configuration_type", "configuration_phase", "configuration_disabled", "version",
            "created", "creatorToken_id", "creatorToken_description", "changeDescription",
        ],
        output_columns: &[
            "id", "number", "region", "project_id", "bucket_id", "name", "description", "packages",
            "requires", "backend", "type", "phase", "disabled", "version", "created",
            "creator_token_id", "creator_token_description", "change_description",
        ],
        primary_key: &["id", "region", "project_id"],
        json_columns: &[],
    },
    TableSchema {
        name: "transformations-inputs",
        raw_columns: &[
            "transformation_id", "region", "source", "destination", "loadType", "whereColumn",
            "whereValues", "whereOperator", "changedSince", "columns",
        ],
        output_columns: &[
            "transformation_id", "region", "source", "destination", "load_type",
            "filter_where_column", "filter_where_values", "filter_where_operator",
            "filter_changed_since", "input_columns",
        ],
        primary_key: &["transformation_id", "region", "source", "destination"],
        json_columns: &[],
    },
    TableSchema {
        name: "transformations-inputs-metadata",
        raw_columns: &[
            "transformation_id", "region", "source", "destination", "column", "type", "length",
            "convertEmptyValuesToNull",
        ],
        output_columns: &[
            "transformation_id", "region", "source", "destination", "column", "datatype", "length",
            "convert_empty_values_to_null",
        ],
        primary_key: &["transformation_id", "region", "source", "destination", "column"],
        json_columns: &[],
    },
    TableSchema {
        name: "transformations-outputs",
        raw_columns: &[
            "transformation_id", "region", "destination", "source", "primaryKey", "incremental",
            "deleteWhereColumn", "deleteWhereOperator", "deleteWhereValues",
        ],
        output_columns: &[
            "transformation_id", "region", "destination", "source", "primary_key",
            "incremental_load", "delete_where_column", "delete_where_operator",
            "delete_where_values",
        ],
        primary_key: &["transformation_id", "region", "destination", "source"],
        json_columns: &[],
    },
    TableSchema {
        name: "transformations-queries",
        raw_columns: &["transformation_id", "region", "query_index", "query", "bucket_id"],
        output_columns: &["transformation_id", "region", "query_index", "query", "bucket_id"],
        primary_key: &["transformation_id", "region", "query_index"],
        json_columns: &[],
    },
    TableSchema {
        name: "transformations-v2",
        raw_columns: &[
            "id", "region", "project_id", "component_id", "name", "description", "version",
            "created", "creatorToken_id", "creatorToken_description", "changeDescription",
            "packages", "variables_id", "variables_values_id", "currentVersion_created",
            "currentVersion_creatorToken_id", "currentVersion_creatorToken_description",
        ],
        output_columns: &[
            "id", "region", "project_id", "component_id", "name", "description", "version",
            "created", "creator_token_id", "creator_token_description", "change_description",
            "packages", "variables_id", "variables_values_id", "current_version_created",
            "current_version_creator_token_id", "current_version_creator_token_description",
        ],
        primary_key: &["id", "region", "project_id", "component_id"],
        json_columns: &[],
    },
    TableSchema {
        name: "transformations-v2-inputs",
        raw_columns: &[
            "transformation_id", "region", "project_id", "component_id", "source", "destination",
            "where_column", "where_values", "where_operator", "columns", "changed_since",
        ],
        output_columns: &[
            "transformation_id", "region", "project_id", "component_id", "source", "destination",
            "where_column", "where_values", "where_operator", "columns", "changed_since",
        ],
        primary_key: &["transformation_id", "region", "project_id", "component_id", "source", "destination"],
        json_columns: &["where_values", "columns"],
    },
    TableSchema {
        name: "transformations-v2-inputs-metadata",
        raw_columns: &[
            "transformation_id", "region", "project_id", "component_id", "table_source",
            "table_destination", "source", "type", "length", "nullable",
            "convert_empty_values_to_null",
        ],
        output_columns: &[
            "transformation_id", "region", "project_id", "component_id", "table_source",
            "table_destination", "column", "type", "length", "nullable",
            "convert_empty_values_to_null",
        ],
        primary_key: &[
            "transformation_id", "region", "project_id", "component_id", "table_source",
            "table_destination", "column",
        ],
        json_columns: &[],
    },
    TableSchema {
        name: "transformations-v2-outputs",
        raw_columns: &[
            "transformation_id", "region", "project_id", "component_id", "source", "destination",
            "incremental", "delete_where_column", "delete_where_operator", "delete_where_values",
            "primary_key", "where_column", "where_values", "where_operator", "columns",
            "changed_since",
        ],
        output_columns: &[
            "transformation_id", "region", "project_id", "component_id", "source", "destination",
            "incremental", "delete_where_column", "delete_where_operator", "delete_where_values",
            "primary_key", "where_column", "where_values", "where_operator", "columns",
            "changed_since",
        ],
        primary_key: &["transformation_id", "region", "project_id", "component_id", "source", "destination"],
        json_columns: &["delete_where_values", "primary_key"],
    },
    TableSchema {
        name: "transformations-v2-codes",
        raw_columns: &[
            "transformation_id", "region", "project_id", "component_id", "block_name",
            "block_index", "code_name", "code_index", "script", "script_index",
        ],
        output_columns: &[
            "transformation_id", "region", "project_id", "component_id", "block_name",
            "block_index", "code_name", "code_index", "script", "script_index",
        ],
        primary_key: &[
            "transformation_id", "region", "project_id", "component_id", "block_index",
            "code_index", "script_index",
        ],
        json_columns: &[],
    },
    TableSchema {
        name: "project-users",
        raw_columns: &[
            "id", "region", "project_id", "name", "email", "mfaEnabled", "canAccessLogs",
            "isSuperAdmin", "expires", "created", "reason", "role", "status", "invitor_id",
            "invitor_name", "invitor_email", "approver_id", "approver_name", "approver_email",
        ],
        output_columns: &[
            "id", "region", "project_id", "name", "email", "mfa_enabled", "can_access_logs",
            "is_super_admin", "expires", "created", "reason", "role", "status", "invitor_id",
            "invitor_name", "invitor_email", "approver_id", "approver_name", "approver_email",
        ],
        primary_key: &["id", "region", "project_id"],
        json_columns: &[],
    },
    TableSchema {
        name: "organization-users",
        raw_columns: &[
            "id", "region", "organization_id", "name", "email", "mfaEnabled", "canAccessLogs",
            "isSuperAdmin", "created", "invitor_id", "invitor_name", "invitor_email",
        ],
        output_columns: &[
            "id", "region", "organization_id", "name", "email", "mfa_enabled", "can_access_logs",
            "is_super_admin", "created", "invitor_id", "invitor_name", "invitor_email",
        ],
        primary_key: &["id", "region", "organization_id"],
        json_columns: &[],
    },
    TableSchema {
        name: "triggers",
        raw_columns: &[
            "id", "region", "project_id", "runWithTokenId", "component", "configurationId",
            "lastRun", "creatorToken_id", "creatorToken_description", "coolDownPeriodMinutes",
        ],
        output_columns: &[
            "id", "region", "project_id", "run_with_token_id", "component", "configuration_id",
            "last_run", "creator_token_id", "creator_token_description", "cooldown_period_minutes",
        ],
        primary_key: &["id", "region", "project_id"],
        json_columns: &[],
    },
    TableSchema {
        name: "triggers-tables",
        raw_columns: &["trigger_id", "region", "project_id", "tableId"],
        output_columns: &["trigger_id", "region", "project_id", "table_id"],
        primary_key: &["trigger_id", "region", "project_id"],
        json_columns: &[],
    },
    TableSchema {
        name: "workspace-table-loads",
        raw_columns: &[
            "id", "region", "project_id", "event", "component", "message", "runId", "created",
            "configurationId", "objectId", "objectName", "objectType", "context", "params",
            "results", "performance", "token_id", "token_name", "uri",
        ],
        output_columns: &[
            "id", "region", "project_id", "event", "component", "message", "run_id", "created",
            "configuration_id", "object_id", "object_name", "object_type", "context", "params",
            "results", "performance", "token_id", "token_name", "uri",
        ],
        primary_key: &["id", "region", "project_id"],
        json_columns: &["context", "params", "results", "performance"],
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_consistent() {
        validate_all().unwrap();
        assert_eq!(table_names().count(), 31);
    }

    #[test]
    fn test_lookup_normalizes_names() {
        let schema = lookup("TABLES_METADATA").unwrap();
        assert_eq!(schema.name, "tables-metadata");
        assert_eq!(lookup("tables-metadata").unwrap(), schema);
        assert_eq!(lookup(" Transformations-V2 ").unwrap().name, "transformations-v2");
    }

    #[test]
    fn test_unknown_table() {
        let err = lookup("orchestration").unwrap_err();
        assert!(matches!(err, Error::UnknownTable(ref name) if name == "orchestration"));
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_renamed_columns_stay_aligned() {
        let schema = lookup("transformations").unwrap();
        let position = schema.raw_columns.iter().position(|c| *c == "id_md5").unwrap();
        assert_eq!(schema.output_columns[position], "id");
        let position = schema.raw_columns.iter().position(|c| *c == "id").unwrap();
        assert_eq!(schema.output_columns[position], "number");
    }
}
