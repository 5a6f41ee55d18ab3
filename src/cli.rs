use clap::Parser;
use eyre::eyre;
use regex::{Regex, RegexBuilder};
use std::path::PathBuf;
use std::time::Duration;

use crate::catalog::default_catalog_path;
use crate::runner::RunnerConfig;

type Result<T> = color_eyre::eyre::Result<T>;

/// Black-box test runner: launches programs, injects signals and checks
/// their output and exit codes
#[derive(Parser, Debug)]
#[command(name = "exectest")]
#[command(
    about = "Black-box test runner: launches programs, injects signals and checks their output"
)]
#[command(version)]
pub struct Cli {
    /// Only run cases whose name matches this case-insensitive regex
    pub filter: Option<String>,

    /// Test case catalog (TOML)
    #[arg(long, default_value_os_t = default_catalog_path())]
    pub catalog: PathBuf,

    /// Delay before launching each process of a case (ms)
    #[arg(long, default_value = "200")]
    pub stagger_ms: u64,

    /// Time a process gets to exit after a termination request before it is killed (ms)
    #[arg(long, default_value = "1000")]
    pub kill_grace_ms: u64,

    /// Print command lines and captured output (any non-empty value)
    #[arg(long, env = "EXECTEST_VERBOSE", value_name = "FLAG")]
    pub verbose: Option<String>,
}

/// Run-wide context, built once and passed by reference.
#[derive(Debug, Clone)]
pub struct Config {
    pub catalog_path: PathBuf,
    /// Case-name filter; matches everything when none was given
    pub filter: Regex,
    pub verbose: bool,
    pub runner: RunnerConfig,
}

impl Config {
    /// Parse command line arguments into configuration
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let filter = cli.filter.as_deref().unwrap_or("");
        let filter = RegexBuilder::new(filter)
            .case_insensitive(true)
            .build()
            .map_err(|e| eyre!("Invalid case filter '{}': {}", filter, e))?;

        Ok(Config {
            catalog_path: cli.catalog,
            filter,
            verbose: cli.verbose.is_some_and(|v| !v.is_empty()),
            runner: RunnerConfig {
                stagger: Duration::from_millis(cli.stagger_ms),
                kill_grace: Duration::from_millis(cli.kill_grace_ms),
            },
        })
    }

    /// Whether the case named `name` passes the filter.
    pub fn selects(&self, name: &str) -> bool {
        self.filter.is_match(name)
    }
}
