//! Error types for the ocsf-orm-gen crate.

use std::path::PathBuf;

/// Errors that can occur while loading, analyzing, filtering, or generating.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A file the schema tree must contain is absent.
    #[error("required file not found: {}", path.display())]
    MissingFile { path: PathBuf },

    /// Failed to read a file from disk.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A schema file is not valid JSON or does not have the expected shape.
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The filter root is not an object of the schema.
    #[error("core object '{name}' not found in schema (available: {available})")]
    ObjectNotFound { name: String, available: String },

    /// A relationship survived into a schema that does not define its target.
    #[error("'{entity}.{attribute}' references '{target}', which is not part of the schema being generated")]
    DanglingReference {
        entity: String,
        attribute: String,
        target: String,
    },

    /// Two generated files resolved to the same output path.
    #[error("more than one generated file targets {}", path.display())]
    DuplicateOutput { path: PathBuf },

    /// Two generated files define the same table or class.
    #[error("{what} '{name}' is defined by both {} and {}", first.display(), second.display())]
    DuplicateName {
        what: &'static str,
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// Failed to write generated files.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Format a sample of valid names for "not found" messages.
///
/// Lists at most ten names, then `... and N more`.
pub(crate) fn sample_names<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    let names: Vec<&str> = names.into_iter().collect();
    if names.len() > 10 {
        format!("{} ... and {} more", names[..10].join(", "), names.len() - 10)
    } else {
        names.join(", ")
    }
}
