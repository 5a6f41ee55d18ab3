use anyhow::{Context, Result};
use exectest::{Catalog, CaseOutcome, CaseRunner, RunnerConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Shell stand-in for the program under test.
///
/// Supports `-h`, `-v`, `-c <config>` and `-l <log>`; unknown flags print the
/// usage line and an error, then exit with `$PROG_UNKNOWN_RC` (default 1).
/// With a readable config it prints the startup banner and loops until
/// terminated, acknowledging SIGUSR1 (reload) and SIGTERM (terminate).
const FIXTURE_SCRIPT: &str = r#"#!/bin/sh
usage() { echo "Usage: prog [-h] [-v[v]] [-c <config>] [-l <log>]"; }
config="./conf/prog.conf"
while [ $# -gt 0 ]; do
    case "$1" in
        -h) usage; exit 0 ;;
        -v) echo "prog 1.0"; exit 0 ;;
        -c|-l)
            if [ $# -lt 2 ]; then
                usage
                echo "option \"$1\" requires argument" >&2
                exit 1
            fi
            [ "$1" = "-c" ] && config="$2"
            shift ;;
        *)
            usage
            echo "Unknown argument \"$1\"" >&2
            exit "${PROG_UNKNOWN_RC:-1}" ;;
    esac
    shift
done
echo "[00:00:00] -log- using configuration file '$config'"
if [ ! -r "$config" ]; then
    echo "[00:00:00] -err- open(\"$config\") failed"
    exit 1
fi
trap 'echo "*** reload signal received"' USR1
trap 'echo "*** terminate signal received"; exit 0' TERM
echo "[00:00:00] -log- prog ver.1.0.0 started..."
echo "[00:00:00] -log- desktop geometry is 1920 x 1080"
echo "*** starting event loop"
while true; do sleep 0.05; done
"#;

/// A temporary directory holding the fixture program and a valid config.
pub struct FixtureProgram {
    temp_dir: TempDir,
    program: PathBuf,
    config: PathBuf,
}

impl FixtureProgram {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new().context("Failed to create temporary directory")?;
        let program = temp_dir.path().join("prog.sh");
        let config = temp_dir.path().join("prog.conf");

        std::fs::write(&program, FIXTURE_SCRIPT).context("Failed to write fixture program")?;
        std::fs::write(&config, "layout.corner = top-left\n")
            .context("Failed to write fixture config")?;

        Ok(Self { temp_dir, program, config })
    }

    /// Path of the fixture script. Run it through `sh`; it is not executable.
    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn config_file(&self) -> &Path {
        &self.config
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Expands `{prog}` and `{conf}` in a catalog template.
    pub fn render(&self, template: &str) -> String {
        template
            .replace("{prog}", &self.program.display().to_string())
            .replace("{conf}", &self.config.display().to_string())
    }

    pub fn catalog(&self, template: &str) -> Result<Catalog> {
        Catalog::from_toml_str(&self.render(template)).context("Failed to load test catalog")
    }

    /// Writes the rendered catalog next to the fixture and returns its path.
    pub fn write_catalog(&self, template: &str) -> Result<PathBuf> {
        let path = self.temp_path().join("cases.toml");
        std::fs::write(&path, self.render(template)).context("Failed to write catalog")?;
        Ok(path)
    }

    /// Runs the first case of the rendered catalog.
    pub async fn run_single(&self, template: &str) -> Result<CaseOutcome> {
        let catalog = self.catalog(template)?;
        let config = fast_runner();
        let outcome = CaseRunner::new(&config)
            .run(&catalog.cases()[0])
            .await
            .map_err(|e| anyhow::anyhow!("{:#}", e))?;
        Ok(outcome)
    }
}

/// Runner settings that keep the suite quick.
pub fn fast_runner() -> RunnerConfig {
    RunnerConfig {
        stagger: Duration::from_millis(20),
        kill_grace: Duration::from_millis(500),
    }
}
