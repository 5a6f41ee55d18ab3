//! Reconciles expected patterns and exit codes with what a process produced.

use regex::{Regex, RegexBuilder};
use std::fmt;

use crate::catalog::ProcessSpec;
use crate::errors::CheckFailure;
use crate::outcome::{ExitState, ProcessResult, ProcessVerdict, Stream};

/// An expected-output regular expression.
///
/// Compiled with `.` matching newlines and searched for anywhere in the
/// captured stream. `^` and `$` anchor to the start and end of the whole
/// stream, not to line boundaries; see [`matches`] for how `$` treats a
/// final newline.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        RegexBuilder::new(pattern)
            .dot_matches_new_line(true)
            .build()
            .map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `pattern` is found anywhere in `actual`, decoded as UTF-8.
///
/// `$` also matches just before a single trailing newline, so `'^$'`
/// accepts a stream holding nothing but an empty line.
pub fn matches(pattern: &Pattern, actual: &[u8]) -> bool {
    let text = String::from_utf8_lossy(actual);
    pattern.0.is_match(&text)
        || text
            .strip_suffix('\n')
            .is_some_and(|trimmed| pattern.0.is_match(trimmed))
}

/// Whether `actual` satisfies the expected exit code.
///
/// Known gap: an expected code of 0 is never enforced, so a process that is
/// expected to succeed passes this check whatever it exits with.
pub fn exit_code_ok(expected: i32, actual: ExitState) -> bool {
    if expected == 0 {
        return true;
    }
    actual.code() == Some(expected)
}

/// Runs the stdout, stderr and exit-code checks for one process.
///
/// A process that never launched fails with a single launch failure; its
/// empty output is not checked.
pub fn evaluate(spec: &ProcessSpec, result: &ProcessResult) -> ProcessVerdict {
    let mut failures = Vec::new();

    if let Some(reason) = &result.launch_error {
        failures.push(CheckFailure::LaunchFailure {
            process: spec.name.clone(),
            command: spec.command.to_string(),
            reason: reason.clone(),
        });
        return ProcessVerdict { name: spec.name.clone(), failures };
    }

    for stream in [Stream::Stdout, Stream::Stderr] {
        let pattern = spec.expected(stream);
        let actual = result.output(stream);
        if !matches(pattern, actual) {
            failures.push(CheckFailure::PatternMismatch {
                process: spec.name.clone(),
                stream,
                pattern: pattern.to_string(),
                actual: String::from_utf8_lossy(actual).into_owned(),
            });
        }
    }

    if !exit_code_ok(spec.expected_exit_code, result.exit) {
        failures.push(CheckFailure::ExitCodeMismatch {
            process: spec.name.clone(),
            expected: spec.expected_exit_code,
            actual: result.exit,
        });
    }

    ProcessVerdict { name: spec.name.clone(), failures }
}
