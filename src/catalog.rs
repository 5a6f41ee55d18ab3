//! Test case catalog: the declarative description of what to launch and
//! what to expect.
//!
//! Catalogs are written in TOML. Deserialization goes through loosely typed
//! `Raw*` structs which are validated once into [`TestCase`] and
//! [`ProcessSpec`]; nothing downstream re-checks names or patterns.

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::environment::Environment;
use crate::errors::CatalogError;
use crate::matcher::Pattern;
use crate::outcome::Stream;
use crate::signals::SignalKind;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCatalog {
    #[serde(default)]
    case: Vec<RawCase>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCase {
    name: String,
    exec: Vec<String>,
    #[serde(default)]
    allow_timeout: bool,
    #[serde(default)]
    process: BTreeMap<String, RawProcess>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProcess {
    cmd: RawCommand,
    #[serde(default)]
    env: Environment,
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
    #[serde(default)]
    rc: i32,
    timeout: f64,
    inject: Option<RawInjection>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCommand {
    /// Whitespace-separated command line
    Line(String),
    Argv(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawInjection {
    signal: SignalKind,
    #[serde(default)]
    delay: f64,
}

/// Executable path plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine(Vec<String>);

impl CommandLine {
    /// Returns `None` for an empty argv.
    pub fn new(argv: Vec<String>) -> Option<Self> {
        if argv.is_empty() || argv[0].is_empty() {
            None
        } else {
            Some(Self(argv))
        }
    }

    pub fn program(&self) -> &str {
        &self.0[0]
    }

    pub fn args(&self) -> &[String] {
        &self.0[1..]
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

/// A signal scheduled for delivery to a running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Injection {
    pub kind: SignalKind,
    /// Measured from the moment the target process was launched
    pub delay: Duration,
}

/// One process to launch within a case, and what it is expected to produce.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub name: String,
    pub command: CommandLine,
    /// Merged on top of the inherited environment
    pub env: Environment,
    pub expected_stdout: Pattern,
    pub expected_stderr: Pattern,
    /// 0 means the exit code is not checked
    pub expected_exit_code: i32,
    pub timeout: Duration,
    pub injection: Option<Injection>,
}

impl ProcessSpec {
    pub fn expected(&self, stream: Stream) -> &Pattern {
        match stream {
            Stream::Stdout => &self.expected_stdout,
            Stream::Stderr => &self.expected_stderr,
        }
    }
}

/// A named scenario: processes in the order they are launched.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    /// When set, outliving the deadline is not by itself a failure
    pub allow_timeout: bool,
    processes: Vec<ProcessSpec>,
}

impl TestCase {
    /// Declared processes in exec order. Never empty.
    pub fn processes(&self) -> &[ProcessSpec] {
        &self.processes
    }

    pub fn exec_order(&self) -> impl Iterator<Item = &str> {
        self.processes.iter().map(|p| p.name.as_str())
    }

    pub fn process(&self, name: &str) -> Option<&ProcessSpec> {
        self.processes.iter().find(|p| p.name == name)
    }

    /// Case-wide watchdog deadline: the longest process timeout.
    pub fn deadline(&self) -> Duration {
        self.processes
            .iter()
            .map(|p| p.timeout)
            .max()
            .unwrap_or_default()
    }
}

/// A validated, ordered set of test cases.
#[derive(Debug, Clone)]
pub struct Catalog {
    cases: Vec<TestCase>,
}

impl Catalog {
    /// Reads and validates a TOML catalog file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, CatalogError> {
        let raw: RawCatalog = toml::from_str(contents)?;
        Self::try_from(raw)
    }

    /// Cases in catalog order.
    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Length of the longest case name, for column alignment.
    pub fn longest_name(&self) -> usize {
        self.cases.iter().map(|c| c.name.len()).max().unwrap_or(0)
    }
}

/// Catalog file used when none is given on the command line.
pub fn default_catalog_path() -> PathBuf {
    PathBuf::from("exectest.toml")
}

impl TryFrom<RawCatalog> for Catalog {
    type Error = CatalogError;

    fn try_from(raw: RawCatalog) -> Result<Self, Self::Error> {
        if raw.case.is_empty() {
            return Err(CatalogError::NoCases);
        }

        let mut seen = HashSet::new();
        let mut cases = Vec::with_capacity(raw.case.len());
        for raw_case in raw.case {
            if !seen.insert(raw_case.name.clone()) {
                return Err(CatalogError::DuplicateCase(raw_case.name));
            }
            cases.push(validate_case(raw_case)?);
        }

        Ok(Catalog { cases })
    }
}

fn validate_case(mut raw: RawCase) -> Result<TestCase, CatalogError> {
    if raw.exec.is_empty() {
        return Err(CatalogError::EmptyExecOrder(raw.name));
    }

    let mut processes: Vec<ProcessSpec> = Vec::with_capacity(raw.exec.len());
    for name in &raw.exec {
        let Some(raw_process) = raw.process.remove(name) else {
            let err = if processes.iter().any(|p| &p.name == name) {
                CatalogError::DuplicateLaunch { case: raw.name.clone(), process: name.clone() }
            } else {
                CatalogError::UnknownProcess { case: raw.name.clone(), process: name.clone() }
            };
            return Err(err);
        };
        processes.push(validate_process(&raw.name, name, raw_process)?);
    }

    if let Some(leftover) = raw.process.into_keys().next() {
        return Err(CatalogError::NotLaunched { case: raw.name, process: leftover });
    }

    Ok(TestCase {
        name: raw.name,
        allow_timeout: raw.allow_timeout,
        processes,
    })
}

fn validate_process(case: &str, name: &str, raw: RawProcess) -> Result<ProcessSpec, CatalogError> {
    let argv = match raw.cmd {
        RawCommand::Line(line) => line.split_whitespace().map(str::to_string).collect(),
        RawCommand::Argv(argv) => argv,
    };
    let command = CommandLine::new(argv).ok_or_else(|| CatalogError::EmptyCommand {
        case: case.to_string(),
        process: name.to_string(),
    })?;

    let timeout = Some(raw.timeout)
        .filter(|t| *t > 0.0)
        .and_then(|t| Duration::try_from_secs_f64(t).ok())
        .ok_or_else(|| CatalogError::InvalidTimeout {
            case: case.to_string(),
            process: name.to_string(),
            value: raw.timeout,
        })?;

    let injection = match raw.inject {
        Some(inject) => {
            let delay = Duration::try_from_secs_f64(inject.delay).map_err(|_| {
                CatalogError::InvalidDelay {
                    case: case.to_string(),
                    process: name.to_string(),
                    value: inject.delay,
                }
            })?;
            Some(Injection { kind: inject.signal, delay })
        }
        None => None,
    };

    let compile = |pattern: &str, stream: Stream| {
        Pattern::new(pattern).map_err(|source| CatalogError::InvalidPattern {
            case: case.to_string(),
            process: name.to_string(),
            stream,
            source,
        })
    };

    Ok(ProcessSpec {
        name: name.to_string(),
        command,
        env: raw.env,
        expected_stdout: compile(&raw.stdout, Stream::Stdout)?,
        expected_stderr: compile(&raw.stderr, Stream::Stderr)?,
        expected_exit_code: raw.rc,
        timeout,
        injection,
    })
}
