use std::path::PathBuf;

use thiserror::Error;

/// Failure to load or validate a CODEGROUPS / CODEOWNERS file.
#[derive(Debug, Error)]
pub enum SpecError {
    /// Underlying I/O failure other than a missing file.
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The spec file did not exist at the given path.
    #[error("spec file not found at {path}")]
    NotFound { path: PathBuf },

    /// serde_json's message carries the line and column.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// YAML parse error for `.yaml` / `.yml` spec files.
    #[error("failed to parse {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The file parsed but its content is semantically invalid.
    #[error("invalid spec {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    /// Two spec entries map to the same remote display name.
    #[error("group names {first:?} and {second:?} both format to {display_name:?}")]
    DuplicateName {
        first: String,
        second: String,
        display_name: String,
    },
}
