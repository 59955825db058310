//! Where API responses come from
//!
//! The extractor never talks HTTP itself. It asks a [`MetadataSource`] for
//! the decoded response of an endpoint; [`DirectorySource`] serves responses
//! captured to disk and [`MemorySource`] serves fixtures.

use crate::error::{json_type_name, Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Whose data an endpoint returns
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Organization,
    Project(String),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Organization => write!(f, "organization"),
            Scope::Project(id) => write!(f, "project {}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Organization detail, including its `projects`
    Organization,
    OrganizationUsers,
    ProjectUsers,
    Tokens,
    TokenEvents { token_id: String },
    /// All components with their configurations and rows
    Components,
    ComponentConfigs { component_id: String },
    Tables,
    TableEvents { table_id: String },
    Triggers,
    Orchestrations,
    WaitingJobs,
    TransformationJobs,
    RunEvents { run_id: String },
}

impl Endpoint {
    /// Path of the captured response, relative to its scope directory
    pub fn relative_path(&self) -> PathBuf {
        let path = match self {
            Endpoint::Organization => "organization".to_string(),
            Endpoint::OrganizationUsers => "users".to_string(),
            Endpoint::ProjectUsers => "users".to_string(),
            Endpoint::Tokens => "tokens".to_string(),
            Endpoint::TokenEvents { token_id } => format!("tokens/{}/events", token_id),
            Endpoint::Components => "components".to_string(),
            Endpoint::ComponentConfigs { component_id } => {
                format!("components/{}/configs", component_id)
            }
            Endpoint::Tables => "tables".to_string(),
            Endpoint::TableEvents { table_id } => format!("tables/{}/events", table_id),
            Endpoint::Triggers => "triggers".to_string(),
            Endpoint::Orchestrations => "orchestrations".to_string(),
            Endpoint::WaitingJobs => "jobs/waiting".to_string(),
            Endpoint::TransformationJobs => "jobs/transformations".to_string(),
            Endpoint::RunEvents { run_id } => format!("events/runs/{}", run_id),
        };
        PathBuf::from(format!("{}.json", path))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relative_path().with_extension("").display())
    }
}

pub trait MetadataSource {
    /// Decoded response of `endpoint`; an endpoint with no data yields `[]`
    fn fetch(&mut self, scope: &Scope, endpoint: &Endpoint) -> Result<Value>;
}

/// Serves responses captured under a directory tree:
/// `<root>/organization/<endpoint>.json` and `<root>/projects/<id>/<endpoint>.json`
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        DirectorySource {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, scope: &Scope, endpoint: &Endpoint) -> PathBuf {
        let scope_dir = match scope {
            Scope::Organization => self.root.join("organization"),
            Scope::Project(id) => self.root.join("projects").join(id),
        };
        scope_dir.join(endpoint.relative_path())
    }
}

impl MetadataSource for DirectorySource {
    fn fetch(&mut self, scope: &Scope, endpoint: &Endpoint) -> Result<Value> {
        let path = self.path_for(scope, endpoint);
        if !path.exists() {
            tracing::debug!(%scope, %endpoint, path = %path.display(), "no captured response");
            return Ok(Value::Array(vec![]));
        }
        read_json_file(&path)
    }
}

/// Parse a JSON document from disk with simd-json
pub fn read_json_file(path: &Path) -> Result<Value> {
    let mut content = std::fs::read(path)?;
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    simd_json::serde::from_slice::<Value>(&mut content).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// In-memory responses keyed by scope and endpoint
#[derive(Debug, Default)]
pub struct MemorySource {
    responses: HashMap<(Scope, Endpoint), Value>,
    requests: Vec<(Scope, Endpoint)>,
}

impl MemorySource {
    pub fn new() -> Self {
        MemorySource::default()
    }

    pub fn insert(&mut self, scope: Scope, endpoint: Endpoint, response: Value) {
        self.responses.insert((scope, endpoint), response);
    }

    pub fn with(mut self, scope: Scope, endpoint: Endpoint, response: Value) -> Self {
        self.insert(scope, endpoint, response);
        self
    }

    /// Every fetch made so far, in order
    pub fn requests(&self) -> &[(Scope, Endpoint)] {
        &self.requests
    }
}

impl MetadataSource for MemorySource {
    fn fetch(&mut self, scope: &Scope, endpoint: &Endpoint) -> Result<Value> {
        let key = (scope.clone(), endpoint.clone());
        let response = self
            .responses
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Value::Array(vec![]));
        self.requests.push(key);
        Ok(response)
    }
}

/// Turn a list response into its rows
pub fn rows(endpoint: &Endpoint, response: Value) -> Result<Vec<Value>> {
    match response {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(vec![]),
        other => Err(Error::MalformedResponse {
            endpoint: endpoint.to_string(),
            reason: format!("expected a list, found {}", json_type_name(&other)),
        }),
    }
}
