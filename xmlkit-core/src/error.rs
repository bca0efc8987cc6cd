//! Error types for xmlkit operations

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum XmlkitError {
    #[error("{file}: {message} at line {line}, column {column}, byte {byte}, depth {depth}")]
    Parse {
        file: String,
        message: String,
        line: u64,
        column: u64,
        byte: u64,
        depth: usize,
    },

    #[error("invalid path expression: {0}")]
    PathSyntax(String),

    #[error("invalid predicate [{0}")]
    Predicate(String),

    #[error("bad echo string: {0}")]
    EchoSyntax(String),

    #[error("bad substitution script: {0}")]
    SedScript(String),

    #[error("string value exceeds available pattern space")]
    Overflow,

    #[error("unrepairable document")]
    Unrecoverable,

    #[error("cannot open directory {}", .0.display())]
    IsDirectory(PathBuf),

    #[error("unable to safely write file {}", .0.display())]
    Rollback(PathBuf),

    #[error("usage: {0}")]
    Usage(String),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl XmlkitError {
    /// Process exit code under the shared Unix convention.
    pub fn exit_code(&self) -> i32 {
        match self {
            XmlkitError::Usage(_) => 2,
            _ => 1,
        }
    }
}
