//! Application entry point for aimusic-dataset.
//!
//! # Startup sequence
//!
//! 1. Parse the command line and initialise logging.
//! 2. Load [`PipelineConfig`] from disk (returns default on first run) and
//!    apply command-line overrides.
//! 3. Load the [`SourceManifest`].
//! 4. Create the [`tokio`] runtime (multi-thread, `run.workers` threads).
//! 5. Run [`DatasetBuilder::build`].
//! 6. Write `dataset.json` and `report.json` to the output directory.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;

use aimusic_dataset::config::PipelineConfig;
use aimusic_dataset::dataset::SourceManifest;
use aimusic_dataset::pipeline::DatasetBuilder;

use cli::Cli;

fn main() -> Result<()> {
    // 1. CLI + logging
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_filter()))
        .init();
    log::info!("aimusic-dataset starting up");

    // 2. Configuration
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load_from(path)?,
        None => PipelineConfig::load().unwrap_or_else(|e| {
            log::warn!("Failed to load config ({e:#}); using defaults");
            PipelineConfig::default()
        }),
    };
    cli.apply(&mut config);

    // 3. Sources
    let sources = SourceManifest::load(&cli.sources)
        .with_context(|| format!("loading source manifest {}", cli.sources.display()))?;

    // 4. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.run.workers.clamp(1, 4))
        .max_blocking_threads(config.run.workers.max(1))
        .enable_all()
        .build()
        .context("creating tokio runtime")?;

    // 5. Build
    let builder = DatasetBuilder::new(config).context("invalid configuration")?;
    if let Some(root) = builder.cache_root() {
        log::info!("tensor cache: {}", root.display());
    }
    let (manifest, report) = rt.block_on(builder.build(&sources))?;

    // 6. Outputs
    manifest.save(&cli.out.join("dataset.json"))?;
    report.save(&cli.out.join("report.json"))?;
    report.log_summary();

    Ok(())
}
