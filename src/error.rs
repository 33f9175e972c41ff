use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for the analysis pipeline
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while generating a document.
///
/// Everything except [`Error::MissingLocation`] aborts the run. A missing
/// location tag only removes the offending endpoint; see [`Error::is_fatal`].
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A source file could not be parsed.
    #[error("parse error in {}: {message}", file.display())]
    Parse { file: PathBuf, message: String },

    /// Invalid command-line or configuration value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No serve/run call with a router argument was found in the entry points.
    #[error("no root router is passed to a serve call in entry point(s): {0}")]
    NoRootRouter(String),

    /// Two leaf routes resolved to the same operation id.
    #[error("duplicate operationId `{id}`: `{first}` and `{second}`")]
    DuplicateOperationId {
        id: String,
        first: String,
        second: String,
    },

    /// A map whose key does not serialize to a string.
    #[error("unsupported map key type `{key}` in `{context}`")]
    UnsupportedMapKey { key: String, context: String },

    /// A numeric-looking primitive outside the primitive table.
    #[error("unknown primitive type `{name}` in `{context}`")]
    UnknownPrimitive { name: String, context: String },

    /// An operator field without a `#[param(..)]` location.
    #[error("operator `{operator}`: field `{field}` has no #[param(..)] location")]
    MissingLocation { operator: String, field: String },

    /// Document serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether the error aborts the whole run rather than a single endpoint.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::MissingLocation { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(format!("JSON: {}", err))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(format!("YAML: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_location_is_recoverable() {
        let err = Error::MissingLocation {
            operator: "ListUsers".to_string(),
            field: "size".to_string(),
        };
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("ListUsers"));
    }

    #[test]
    fn test_configuration_errors_are_fatal() {
        let err = Error::UnsupportedMapKey {
            key: "u32".to_string(),
            context: "Stats".to_string(),
        };
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "unsupported map key type `u32` in `Stats`");
    }
}
