use super::Result;
use futures::future::join_all;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::catalog::TestCase;
use crate::errors::CheckFailure;
use crate::matcher;
use crate::outcome::{CaseOutcome, CasePhase};
use crate::process::ManagedProcess;
use crate::watchdog::Watchdog;

/// Timing knobs for running a case.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Pause before each launch, so an earlier process (typically a server)
    /// can initialize before the next one starts
    pub stagger: Duration,
    /// How long a process gets to honour a termination request after the
    /// watchdog fires before it is killed outright
    pub kill_grace: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            stagger: Duration::from_millis(200),
            kill_grace: Duration::from_secs(1),
        }
    }
}

/// Runs one test case: launch, inject, wait under the watchdog, evaluate.
pub struct CaseRunner<'a> {
    config: &'a RunnerConfig,
}

impl<'a> CaseRunner<'a> {
    pub fn new(config: &'a RunnerConfig) -> Self {
        Self { config }
    }

    /// Runs `case` to completion or until its deadline.
    ///
    /// Per-process problems (launch failures, mismatches, timeouts) end up in
    /// the returned outcome. An `Err` means the harness itself failed.
    pub async fn run(&self, case: &TestCase) -> Result<CaseOutcome> {
        let mut phase = CasePhase::Pending;
        phase.advance(CasePhase::Launching, &case.name);

        let mut processes = Vec::with_capacity(case.processes().len());
        for spec in case.processes() {
            sleep(self.config.stagger).await;
            processes.push(ManagedProcess::launch(spec)?);
        }

        let deadline = case.deadline();
        let watchdog = Watchdog::arm(deadline);
        phase.advance(CasePhase::AwaitingCompletion, &case.name);

        let completed = tokio::select! {
            _ = watchdog.expired() => false,
            _ = join_all(processes.iter_mut().map(|p| p.supervise())) => true,
        };
        watchdog.disarm();

        let mut case_failures = Vec::new();
        if completed {
            phase.advance(CasePhase::Completed, &case.name);
        } else {
            warn!("case '{}' exceeded its {:?} deadline", case.name, deadline);
            for process in processes.iter_mut().filter(|p| p.is_running()) {
                process.terminate(self.config.kill_grace).await;
            }
            phase.advance(CasePhase::TimedOut, &case.name);
            if case.allow_timeout {
                debug!("case '{}' allows timing out", case.name);
            } else {
                case_failures.push(CheckFailure::WatchdogTimeout { deadline });
            }
        }

        let results = processes
            .iter_mut()
            .map(ManagedProcess::finish)
            .collect::<Result<Vec<_>>>()?;

        let verdicts = case
            .processes()
            .iter()
            .zip(&results)
            .map(|(spec, result)| matcher::evaluate(spec, result))
            .collect();

        info!("case '{}' finished: {:?}", case.name, phase);
        Ok(CaseOutcome {
            name: case.name.clone(),
            phase,
            deadline,
            results,
            verdicts,
            case_failures,
        })
    }
}
