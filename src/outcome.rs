use chrono::{DateTime, Local};
use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::Duration;
use tracing::debug;

use crate::errors::CheckFailure;
use crate::signals::SignalKind;

/// Captured output stream of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => write!(f, "stdout"),
            Stream::Stderr => write!(f, "stderr"),
        }
    }
}

/// How a process ended, as far as the harness could observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// Exited normally with this code
    Exited(i32),
    /// Killed by this signal number
    Signaled(i32),
    /// Never launched, or force-killed before reporting a status
    Unknown,
}

impl ExitState {
    pub fn code(&self) -> Option<i32> {
        match self {
            ExitState::Exited(code) => Some(*code),
            _ => None,
        }
    }
}

impl From<ExitStatus> for ExitState {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            ExitState::Exited(code)
        } else if let Some(signal) = status.signal() {
            ExitState::Signaled(signal)
        } else {
            ExitState::Unknown
        }
    }
}

impl fmt::Display for ExitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitState::Exited(code) => write!(f, "{}", code),
            ExitState::Signaled(signal) => write!(f, "signal {}", signal),
            ExitState::Unknown => write!(f, "unknown"),
        }
    }
}

/// What happened to a scheduled signal injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectionReport {
    Delivered(SignalKind),
    /// The process had already exited when the delay elapsed
    Skipped(SignalKind),
    Failed { kind: SignalKind, reason: String },
}

/// Frozen runtime record of one launched process.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub name: String,
    pub pid: Option<u32>,
    pub launched_at: DateTime<Local>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit: ExitState,
    /// Set when the process could not be started at all
    pub launch_error: Option<String>,
    pub injection: Option<InjectionReport>,
}

impl ProcessResult {
    pub fn output(&self, stream: Stream) -> &[u8] {
        match stream {
            Stream::Stdout => &self.stdout,
            Stream::Stderr => &self.stderr,
        }
    }
}

/// Lifecycle of a single case run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasePhase {
    Pending,
    Launching,
    AwaitingCompletion,
    Completed,
    TimedOut,
    Reported,
}

impl CasePhase {
    pub fn can_advance_to(self, next: CasePhase) -> bool {
        use CasePhase::*;
        matches!(
            (self, next),
            (Pending, Launching)
                | (Launching, AwaitingCompletion)
                | (AwaitingCompletion, Completed)
                | (AwaitingCompletion, TimedOut)
                | (Completed, Reported)
                | (TimedOut, Reported)
        )
    }

    /// Moves to `next`, logging the transition.
    pub fn advance(&mut self, next: CasePhase, case: &str) {
        debug_assert!(self.can_advance_to(next), "illegal transition {:?} -> {:?}", self, next);
        debug!("case '{}': {:?} -> {:?}", case, self, next);
        *self = next;
    }
}

/// Pass/fail verdict for one process of a case.
#[derive(Debug, Clone)]
pub struct ProcessVerdict {
    pub name: String,
    pub failures: Vec<CheckFailure>,
}

impl ProcessVerdict {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Everything a case run produced.
#[derive(Debug, Clone)]
pub struct CaseOutcome {
    pub name: String,
    pub phase: CasePhase,
    pub deadline: Duration,
    /// Results in launch order
    pub results: Vec<ProcessResult>,
    pub verdicts: Vec<ProcessVerdict>,
    /// Case-level failures, currently only the watchdog timeout
    pub case_failures: Vec<CheckFailure>,
}

impl CaseOutcome {
    pub fn timed_out(&self) -> bool {
        self.phase == CasePhase::TimedOut
    }

    pub fn passed(&self) -> bool {
        self.case_failures.is_empty() && self.verdicts.iter().all(ProcessVerdict::passed)
    }

    pub fn result(&self, name: &str) -> Option<&ProcessResult> {
        self.results.iter().find(|r| r.name == name)
    }

    pub fn verdict(&self, name: &str) -> Option<&ProcessVerdict> {
        self.verdicts.iter().find(|v| v.name == name)
    }

    /// All failures, case-level first.
    pub fn failures(&self) -> impl Iterator<Item = &CheckFailure> {
        self.case_failures
            .iter()
            .chain(self.verdicts.iter().flat_map(|v| v.failures.iter()))
    }
}
