use crate::integration::infrastructure::*;
use anyhow::Result;
use exectest::errors::CheckFailure;
use exectest::ExitState;
use std::time::{Duration, Instant};

/// Every process overruns its own timeout: the case fails, all are gone
#[tokio::test]
async fn test_all_processes_overrun() -> Result<()> {
    let fixture = FixtureProgram::new()?;
    let started = Instant::now();
    let outcome = fixture
        .run_single(
            r#"
[[case]]
name = "hung"
exec = ["a", "b", "c"]
[case.process.a]
cmd = "sh {prog} -c {conf}"
timeout = 0.3
[case.process.b]
cmd = "sleep 30"
timeout = 0.4
[case.process.c]
cmd = ["sh", "-c", "sleep 30 & sleep 30 & wait"]
timeout = 0.5
"#,
        )
        .await?;

    assert!(started.elapsed() < Duration::from_secs(10), "watchdog did not preempt the wait");
    assert!(outcome.timed_out());
    assert_eq!(outcome.deadline, Duration::from_millis(500));
    assert_failed_only_on(
        &outcome,
        |f| matches!(f, CheckFailure::WatchdogTimeout { .. }),
        "the watchdog",
    );
    assert_no_leaked_processes(&outcome);

    // The fixture honours the termination request and exits 0
    assert_eq!(outcome.result("a").unwrap().exit, ExitState::Exited(0));
    assert_eq!(outcome.result("b").unwrap().exit, ExitState::Signaled(15));
    Ok(())
}

/// A process ignoring the termination request is killed after the grace period
#[tokio::test]
async fn test_stubborn_process_is_killed() -> Result<()> {
    let fixture = FixtureProgram::new()?;
    let outcome = fixture
        .run_single(
            r#"
[[case]]
name = "stubborn"
exec = ["p"]
[case.process.p]
cmd = ["sh", "-c", "trap '' TERM; echo ignoring; while true; do sleep 0.05; done"]
stdout = 'ignoring'
timeout = 0.3
"#,
        )
        .await?;

    assert!(outcome.timed_out());
    assert_eq!(outcome.results[0].exit, ExitState::Unknown);
    assert!(outcome.verdict("p").unwrap().passed());
    assert_no_leaked_processes(&outcome);
    Ok(())
}

/// A case finishing inside its deadline is not cut short
#[tokio::test]
async fn test_completion_disarms_watchdog() -> Result<()> {
    let fixture = FixtureProgram::new()?;
    let outcome = fixture
        .run_single(
            r#"
[[case]]
name = "quick"
exec = ["p"]
[case.process.p]
cmd = ["sh", "-c", "sleep 0.2; echo done"]
stdout = 'done'
timeout = 2
"#,
        )
        .await?;

    assert!(!outcome.timed_out());
    assert_case_passed(&outcome);
    Ok(())
}
