//! Command-line interface for aimusic-dataset.

use std::path::PathBuf;

use clap::Parser;

use aimusic_dataset::config::PipelineConfig;

/// Build balanced, augmented human-vs-synthetic music datasets
#[derive(Parser, Debug)]
#[command(name = "aimusic-dataset", version)]
pub struct Cli {
    /// Source manifest (JSON: clip id → {path, label, platform, segment})
    #[arg(value_name = "SOURCES")]
    pub sources: PathBuf,

    /// Path to settings.toml (default: platform config directory)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output directory for dataset.json and report.json
    #[arg(long, short = 'o', value_name = "DIR", default_value = "dataset")]
    pub out: PathBuf,

    /// Override dataset.seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override run.workers
    #[arg(long, short = 'j')]
    pub workers: Option<usize>,

    /// Override run.cache_dir
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Store tensors inside the manifest instead of .npy files
    #[arg(long)]
    pub inline: bool,

    /// Write every rendered clip as WAV under this directory
    #[arg(long, value_name = "DIR")]
    pub export_audio: Option<PathBuf>,

    /// Verbose output (-v: per-clip detail, -vv: everything)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Log filter matching the verbosity flags.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Fold command-line overrides into `config`.
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(seed) = self.seed {
            config.dataset.seed = seed;
        }
        if let Some(workers) = self.workers {
            config.run.workers = workers;
        }
        if let Some(dir) = &self.cache_dir {
            config.run.cache_dir = Some(dir.clone());
        }
        if self.inline {
            config.run.inline_tensors = true;
        }
        if let Some(dir) = &self.export_audio {
            config.run.export_audio_dir = Some(dir.clone());
        }
    }
}
