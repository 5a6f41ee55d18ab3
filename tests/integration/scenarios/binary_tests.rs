use crate::integration::infrastructure::*;
use anyhow::{Context, Result};
use std::process::Output;
use tokio::process::Command;

const CATALOG: &str = r#"
[[case]]
name = "commandline"
exec = ["show-help", "wrong-arg"]
[case.process.show-help]
cmd = "sh {prog} -h"
stdout = '^Usage: prog'
stderr = '^$'
timeout = 5
[case.process.wrong-arg]
cmd = "sh {prog} -foo"
stdout = 'Usage: prog'
stderr = 'Unknown argument "-foo"'
rc = 1
timeout = 5

[[case]]
name = "signals"
exec = ["term"]
[case.process.term]
cmd = "sh {prog} -c {conf}"
stdout = '\*\*\* terminate signal received'
timeout = 3
inject = { signal = "terminate", delay = 0.2 }

[[case]]
name = "broken"
exec = ["p"]
[case.process.p]
cmd = "sh {prog} -h"
stdout = 'this will not be printed'
timeout = 5
"#;

async fn run_exectest(
    fixture: &FixtureProgram,
    args: &[&str],
    env: &[(&str, &str)],
) -> Result<Output> {
    let catalog = fixture.write_catalog(CATALOG)?;
    let mut command = Command::new(env!("CARGO_BIN_EXE_exectest"));
    command
        .arg("--catalog")
        .arg(&catalog)
        .args(["--stagger-ms", "20", "--kill-grace-ms", "500"])
        .args(args)
        .env_remove("EXECTEST_VERBOSE");
    for (key, value) in env {
        command.env(key, value);
    }
    command.output().await.context("Failed to run exectest")
}

#[tokio::test]
async fn test_filter_selects_matching_cases() -> Result<()> {
    let fixture = FixtureProgram::new()?;
    let output = run_exectest(&fixture, &["SIGNAL"], &[]).await?;
    let stdout = String::from_utf8(output.stdout)?;

    assert_eq!(output.status.code(), Some(0), "stdout:\n{}", stdout);
    assert!(stdout.contains(">> commandline    skipped\n"), "{}", stdout);
    assert!(stdout.contains(">> signals        pass\n"), "{}", stdout);
    assert!(stdout.contains(">> broken         skipped\n"), "{}", stdout);
    Ok(())
}

#[tokio::test]
async fn test_any_failure_sets_exit_code() -> Result<()> {
    let fixture = FixtureProgram::new()?;
    let output = run_exectest(&fixture, &[], &[]).await?;
    let stdout = String::from_utf8(output.stdout)?;

    assert_eq!(output.status.code(), Some(1), "stdout:\n{}", stdout);
    assert!(stdout.contains(">> commandline    pass\n"), "{}", stdout);
    assert!(stdout.contains("!!! actual p stdout does not match expected pattern"), "{}", stdout);
    assert!(stdout.contains("Expected regex: 'this will not be printed'"), "{}", stdout);
    assert!(stdout.ends_with("fail\n"), "{}", stdout);
    Ok(())
}

#[tokio::test]
async fn test_verbose_from_environment() -> Result<()> {
    let fixture = FixtureProgram::new()?;
    let output =
        run_exectest(&fixture, &["commandline"], &[("EXECTEST_VERBOSE", "1")]).await?;
    let stdout = String::from_utf8(output.stdout)?;

    assert_eq!(output.status.code(), Some(0), "stdout:\n{}", stdout);
    assert!(stdout.contains("=== 'commandline' ==="), "{}", stdout);
    assert!(stdout.contains("  wrong-arg: sh "), "{}", stdout);
    assert!(stdout.contains("|| wrong-arg stderr: >>> Unknown argument \"-foo\""), "{}", stdout);
    Ok(())
}

/// Harness faults are reported per case and the run carries on
#[tokio::test]
async fn test_harness_exception_does_not_abort_run() -> Result<()> {
    let fixture = FixtureProgram::new()?;
    let output =
        run_exectest(&fixture, &[], &[("TMPDIR", "/nonexistent/exectest-tmp")]).await?;
    let stdout = String::from_utf8(output.stdout)?;

    assert_eq!(output.status.code(), Some(1), "stdout:\n{}", stdout);
    assert_eq!(stdout.matches("exception while running test:").count(), 3, "{}", stdout);
    Ok(())
}

#[tokio::test]
async fn test_invalid_catalog_is_fatal() -> Result<()> {
    let fixture = FixtureProgram::new()?;
    let path = fixture.temp_path().join("broken.toml");
    std::fs::write(&path, "[[case]]\nname = \"x\"\nexec = [\"missing\"]\n")?;

    let output = Command::new(env!("CARGO_BIN_EXE_exectest"))
        .arg("--catalog")
        .arg(&path)
        .output()
        .await?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("launches undeclared process 'missing'"), "{}", stderr);
    Ok(())
}

/// Variables that are not valid UTF-8 reach the program under test unchanged
#[tokio::test]
async fn test_non_utf8_environment_is_inherited() -> Result<()> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let fixture = FixtureProgram::new()?;
    let catalog = fixture.write_catalog(
        r#"
[[case]]
name = "latin1"
exec = ["p"]
[case.process.p]
cmd = ["sh", "-c", "printf %s \"${EXECTEST_LATIN1-UNSET}\" | od -An -tx1"]
stdout = '63 61 66 e9'
timeout = 5
"#,
    )?;

    let output = Command::new(env!("CARGO_BIN_EXE_exectest"))
        .arg("--catalog")
        .arg(&catalog)
        .args(["--stagger-ms", "20"])
        .env_remove("EXECTEST_VERBOSE")
        .env("EXECTEST_LATIN1", OsStr::from_bytes(b"caf\xe9"))
        .output()
        .await?;
    let stdout = String::from_utf8(output.stdout)?;

    assert_eq!(output.status.code(), Some(0), "stdout:\n{}", stdout);
    assert!(stdout.contains(">> latin1    pass\n"), "{}", stdout);
    Ok(())
}
