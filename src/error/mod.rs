use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a compilation
///
/// Anything that can be recovered from is reported through
/// [`Diagnostics`](crate::diagnostics::Diagnostics) instead.
#[derive(Error, Debug)]
pub enum BcmdError {
    /// Failed to read or write a file
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The AST feed could not be decoded
    #[error("Failed to parse model source: {0}")]
    Parse(#[from] serde_json::Error),

    /// A source file could not be found on the model search path
    #[error("Source file not found on model path: {0}")]
    SourceNotFound(String),

    /// One or more source files failed to load
    #[error("{} source file(s) failed to load: {}", .0.len(), .0.join(", "))]
    SourcesFailed(Vec<String>),

    /// Assignment pairing is ambiguous and strict mode is enabled
    #[error("Ambiguous assignments for symbol(s): {}", .0.join(", "))]
    AmbiguousAssignment(Vec<String>),

    /// Writing the generated source failed
    #[error("Code generation failed: {0}")]
    CodeGen(#[from] std::fmt::Error),
}

impl BcmdError {
    /// Wrap an I/O error with the path it occurred on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
