use super::Result;
use std::io::Write;
use tokio::task::JoinError;
use tracing::{error, info};

use crate::catalog::{Catalog, TestCase};
use crate::cli::Config;
use crate::outcome::{CaseOutcome, CasePhase, Stream};
use crate::runner::CaseRunner;

/// Final status of one catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseStatus {
    Passed,
    Failed,
    Skipped,
    /// The harness itself failed while running the case
    Exception(String),
}

impl CaseStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, CaseStatus::Failed | CaseStatus::Exception(_))
    }
}

/// Drives the catalog through the runner and prints a line per case.
pub struct Reporter<'a, W: Write> {
    config: &'a Config,
    out: W,
    width: usize,
    statuses: Vec<(String, CaseStatus)>,
}

impl<'a, W: Write> Reporter<'a, W> {
    pub fn new(config: &'a Config, out: W) -> Self {
        Self {
            config,
            out,
            width: 0,
            statuses: Vec::new(),
        }
    }

    /// Runs every selected case in catalog order.
    ///
    /// Returns the process exit code for the whole run: 1 if any case failed
    /// or raised, 0 otherwise. Only failures to write the report are errors.
    pub async fn run_all(&mut self, catalog: &Catalog) -> Result<i32> {
        self.width = catalog.longest_name() + 4;

        for case in catalog.cases() {
            let status = self.run_case(case).await?;
            self.statuses.push((case.name.clone(), status));
        }

        let failed = self.failed();
        info!("{} cases, {} failed", self.statuses.len(), failed);
        Ok(if failed > 0 { 1 } else { 0 })
    }

    /// Runs one case, or skips it if the filter does not select it.
    pub async fn run_case(&mut self, case: &TestCase) -> Result<CaseStatus> {
        self.announce(case)?;

        if !self.config.selects(&case.name) {
            writeln!(self.out, "skipped")?;
            return Ok(CaseStatus::Skipped);
        }

        // Run in its own task so a panic is reported against this case only
        let runner_config = self.config.runner.clone();
        let owned = case.clone();
        let task = tokio::spawn(async move { CaseRunner::new(&runner_config).run(&owned).await });

        let status = match task.await {
            Ok(Ok(mut outcome)) => {
                self.print_details(&outcome)?;
                outcome.phase.advance(CasePhase::Reported, &case.name);
                if outcome.passed() {
                    CaseStatus::Passed
                } else {
                    CaseStatus::Failed
                }
            }
            Ok(Err(report)) => {
                error!("case '{}' raised: {:?}", case.name, report);
                CaseStatus::Exception(format!("{:#}", report))
            }
            Err(join_error) => {
                error!("case '{}' aborted: {}", case.name, join_error);
                CaseStatus::Exception(abort_cause(join_error))
            }
        };

        match &status {
            CaseStatus::Passed => writeln!(self.out, "pass")?,
            CaseStatus::Failed => writeln!(self.out, "fail")?,
            CaseStatus::Exception(cause) => {
                writeln!(self.out, "exception while running test: {}", cause)?
            }
            CaseStatus::Skipped => {}
        }
        self.out.flush()?;
        Ok(status)
    }

    /// Number of cases that failed or raised so far.
    pub fn failed(&self) -> usize {
        self.statuses.iter().filter(|(_, s)| s.is_failure()).count()
    }

    pub fn statuses(&self) -> &[(String, CaseStatus)] {
        &self.statuses
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn announce(&mut self, case: &TestCase) -> Result<()> {
        write!(self.out, ">> {:<width$}", case.name, width = self.width)?;

        if self.config.verbose {
            writeln!(self.out, "=== '{}' ===", case.name)?;
            for process in case.processes() {
                writeln!(self.out, "  {}: {}", process.name, process.command)?;
            }
        }
        self.out.flush()?;
        Ok(())
    }

    fn print_details(&mut self, outcome: &CaseOutcome) -> Result<()> {
        if self.config.verbose {
            for result in &outcome.results {
                for stream in [Stream::Stdout, Stream::Stderr] {
                    writeln!(
                        self.out,
                        "|| {} {}: >>> {} <<<\n",
                        result.name,
                        stream,
                        String::from_utf8_lossy(result.output(stream))
                    )?;
                }
            }
        }

        for failure in outcome.failures() {
            writeln!(self.out, "\n !!! {}", failure)?;
        }
        Ok(())
    }
}

/// Describes a case task that ended without producing an outcome.
fn abort_cause(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("panicked: {}", message)
}
