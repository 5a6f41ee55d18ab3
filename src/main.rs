use clap::Parser;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use exectest::{Catalog, Cli, Config, Reporter, Result};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    // Initialize error handling and logging
    color_eyre::install()?;

    // Logs go to stderr, the report owns stdout
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_cli(cli)?;

    let catalog = Catalog::load(&config.catalog_path)?;
    info!(
        "loaded {} cases from {}",
        catalog.cases().len(),
        config.catalog_path.display()
    );

    let stdout = std::io::stdout();
    let mut reporter = Reporter::new(&config, stdout.lock());
    let code = reporter.run_all(&catalog).await?;

    Ok(ExitCode::from(code as u8))
}
