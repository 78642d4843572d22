use std::path::PathBuf;
use thiserror::Error;

/// Problems with the run configuration. All of them are fatal before any
/// source is opened.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("parser required")]
    MissingParser,

    #[error("unknown parser {0:?}; use --list to see available parsers")]
    UnknownParser(String),

    #[error("write key required")]
    MissingWriteKey,

    #[error("dataset name required")]
    MissingDataset,

    #[error("log file name or '-' required")]
    MissingLogFiles,

    #[error("reading from the end and stopping there would process zero lines")]
    EndWithStop,

    #[error("statefile can not be set when tailing from multiple files")]
    StateFileWithMultipleFiles,

    #[error("invalid add field {0:?}: expected key=value")]
    MalformedAddField(String),

    #[error("sample rate must be at least 1")]
    ZeroSampleRate,

    #[error("pool size must be at least 1")]
    ZeroPoolSize,

    #[error("invalid glob pattern {pattern:?}: {reason}")]
    InvalidGlob { pattern: String, reason: String },

    #[error("no files match {0:?}")]
    NoMatches(String),

    #[error("regex parser requires --regex.line_regex")]
    MissingLineRegex,

    #[error("invalid line regex: {0}")]
    InvalidLineRegex(String),

    #[error("line regex must contain at least one named capture group")]
    NoNamedGroups,
}

/// A single line that the selected parser could not turn into a record.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("JSON line is not an object")]
    NotAnObject,

    #[error("line does not match pattern: {0:?}")]
    NoMatch(String),
}

#[derive(Error, Debug)]
pub enum TailError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file error: {0}")]
    State(String),
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("event rejected: {0}")]
    Rejected(String),
}
