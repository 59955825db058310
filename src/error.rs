use std::path::PathBuf;

/// Broad classes of failure, used by callers to decide how loudly to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The run is misconfigured: unknown table, bad registry entry, unusable sink
    Configuration,
    /// A row or response does not have the shape the engine expects
    MalformedInput,
    /// Reading or writing failed after the resources were acquired
    Io,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown table `{0}`")]
    UnknownTable(String),

    #[error("invalid definition for table `{table}`: {reason}")]
    InvalidDefinition { table: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot serialize JSON column `{column}` of table `{table}`")]
    JsonColumn {
        table: String,
        column: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot open output for table `{table}` at {}", path.display())]
    Sink {
        table: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed row for table `{table}`: expected an object, found {found}")]
    MalformedRow { table: String, found: &'static str },

    #[error("malformed response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },

    #[error("cannot parse {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: simd_json::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownTable(_)
            | Error::InvalidDefinition { .. }
            | Error::InvalidConfig(_)
            | Error::JsonColumn { .. }
            | Error::Sink { .. } => ErrorKind::Configuration,
            Error::MalformedRow { .. } | Error::MalformedResponse { .. } | Error::Parse { .. } => {
                ErrorKind::MalformedInput
            }
            Error::Csv(_) | Error::Json(_) | Error::Io(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Name of a JSON value's type, for error messages
pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
