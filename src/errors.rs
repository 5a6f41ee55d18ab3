//! Error taxonomy for catalog loading and case assertions.
//!
//! Harness faults travel as `eyre::Report`; these enums cover the failures
//! that are part of normal operation and get reported, not propagated.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::outcome::{ExitState, Stream};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read catalog {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("catalog must contain at least one [[case]] entry")]
    NoCases,

    #[error("case name '{0}' is declared more than once")]
    DuplicateCase(String),

    #[error("case '{0}' has an empty `exec` order")]
    EmptyExecOrder(String),

    #[error("case '{case}' launches undeclared process '{process}'")]
    UnknownProcess { case: String, process: String },

    #[error("case '{case}' launches process '{process}' more than once")]
    DuplicateLaunch { case: String, process: String },

    #[error("case '{case}' declares process '{process}' but never launches it")]
    NotLaunched { case: String, process: String },

    #[error("process '{case}/{process}' has an empty command")]
    EmptyCommand { case: String, process: String },

    #[error("process '{case}/{process}' has invalid timeout {value} (seconds, must be > 0)")]
    InvalidTimeout { case: String, process: String, value: f64 },

    #[error("process '{case}/{process}' has invalid injection delay {value} (seconds, must be >= 0)")]
    InvalidDelay { case: String, process: String, value: f64 },

    #[error("process '{case}/{process}' has an invalid {stream} pattern: {source}")]
    InvalidPattern {
        case: String,
        process: String,
        stream: Stream,
        #[source]
        source: regex::Error,
    },
}

/// A failed check against a case or one of its processes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CheckFailure {
    #[error("{process}: failed to launch '{command}': {reason}")]
    LaunchFailure {
        process: String,
        command: String,
        reason: String,
    },

    #[error("actual {process} {stream} does not match expected pattern\n actual {process} {stream}:\n  >>>\n{actual}\n  <<<\n  Expected regex: '{pattern}'")]
    PatternMismatch {
        process: String,
        stream: Stream,
        pattern: String,
        actual: String,
    },

    #[error("actual rc {actual} does not match expected {expected} for {process}")]
    ExitCodeMismatch {
        process: String,
        expected: i32,
        actual: ExitState,
    },

    #[error("case did not complete within {deadline:?}, surviving processes were terminated")]
    WatchdogTimeout { deadline: Duration },
}
