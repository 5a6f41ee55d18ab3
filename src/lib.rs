//! Black-box integration test runner.
//!
//! Launches a program (and any companion processes) per test case, injects
//! signals at timed points, enforces a case-wide deadline and checks the
//! captured stdout/stderr and exit codes against expected patterns.

pub type Result<T> = color_eyre::eyre::Result<T>;

pub mod catalog;
pub mod cli;
pub mod environment;
pub mod errors;
pub mod matcher;
pub mod outcome;
pub mod process;
pub mod reporter;
pub mod runner;
pub mod signals;
pub mod watchdog;

pub use catalog::{Catalog, ProcessSpec, TestCase};
pub use cli::{Cli, Config};
pub use environment::Environment;
pub use outcome::{CaseOutcome, ExitState, ProcessResult};
pub use reporter::{CaseStatus, Reporter};
pub use runner::{CaseRunner, RunnerConfig};
pub use signals::SignalKind;
