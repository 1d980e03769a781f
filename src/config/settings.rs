//! Pipeline settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across worker
//! threads.  Every section is `#[serde(default)]`, so a settings file only
//! needs the keys it changes.

use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::audio::{CropPolicy, NormalizeMode, Normalizer, DEFAULT_TARGET_RMS};
use crate::augment::{AugmentRanges, PITCH_LIMITS, TEMPO_LIMITS};
use crate::dataset::{ContinuousCurriculum, DatasetAssembler, DrawMode, SplitTargets, Variant};
use crate::features::{FeatureExtractor, MelParams};

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Decoding, clip length and loudness settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Every clip is resampled to this rate in Hz.
    pub sample_rate: u32,
    /// Fixed clip duration in seconds.
    pub clip_secs: f32,
    pub normalization: NormalizeMode,
    /// RMS level used when `normalization = "rms"`.
    pub target_rms: f32,
    /// How a time-stretched clip is fitted back to `clip_secs`.
    pub crop: CropPolicy,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            clip_secs: 10.0,
            normalization: NormalizeMode::Peak,
            target_rms: DEFAULT_TARGET_RMS,
            crop: CropPolicy::Head,
        }
    }
}

impl AudioConfig {
    /// Samples per clip.
    pub fn clip_samples(&self) -> usize {
        (self.clip_secs as f64 * self.sample_rate as f64).round() as usize
    }

    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.normalization, self.target_rms)
    }
}

// ---------------------------------------------------------------------------
// AugmentConfig
// ---------------------------------------------------------------------------

/// Random pitch / tempo draw settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    /// `[min, max]` semitones, inside `[-2, 2]`.
    pub pitch_range: [f32; 2],
    /// `[min, max]` tempo ratio, inside `[0.8, 1.2]`.
    pub tempo_range: [f32; 2],
    /// Chance each enabled transform is applied.
    pub apply_probability: f32,
    /// Independent draws per variant, or one shared pair per clip.
    pub draws: DrawMode,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            pitch_range: [*PITCH_LIMITS.start(), *PITCH_LIMITS.end()],
            tempo_range: [*TEMPO_LIMITS.start(), *TEMPO_LIMITS.end()],
            apply_probability: 1.0,
            draws: DrawMode::Independent,
        }
    }
}

impl AugmentConfig {
    pub fn ranges(&self) -> AugmentRanges {
        AugmentRanges {
            pitch: Some(self.pitch_range[0]..=self.pitch_range[1]),
            tempo: Some(self.tempo_range[0]..=self.tempo_range[1]),
            apply_probability: self.apply_probability,
        }
    }
}

// ---------------------------------------------------------------------------
// FeatureConfig
// ---------------------------------------------------------------------------

/// Mel spectrogram and image tensor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub n_fft: usize,
    pub hop_length: usize,
    pub win_length: usize,
    pub n_mels: usize,
    pub fmin: f32,
    /// `None` means Nyquist.
    pub fmax: Option<f32>,
    /// Dynamic range of the dB image.
    pub top_db: f32,
    /// `[height, width]` of the output image; `None` keeps the mel shape.
    pub image_size: Option<[usize; 2]>,
    pub n_mfcc: usize,
    /// Attach a [`crate::features::DescriptorSummary`] to every entry.
    pub descriptors: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        let mel = MelParams::default();
        Self {
            n_fft: mel.n_fft,
            hop_length: mel.hop_length,
            win_length: mel.win_length,
            n_mels: mel.n_mels,
            fmin: mel.fmin,
            fmax: mel.fmax,
            top_db: 80.0,
            image_size: None,
            n_mfcc: 13,
            descriptors: false,
        }
    }
}

impl FeatureConfig {
    pub fn extractor(&self) -> FeatureExtractor {
        FeatureExtractor {
            mel: MelParams {
                n_fft: self.n_fft,
                hop_length: self.hop_length,
                win_length: self.win_length,
                n_mels: self.n_mels,
                fmin: self.fmin,
                fmax: self.fmax,
            },
            top_db: Some(self.top_db),
            image_size: self.image_size.map(|[h, w]| (h, w)),
            n_mfcc: self.n_mfcc,
        }
    }
}

// ---------------------------------------------------------------------------
// DatasetConfig
// ---------------------------------------------------------------------------

/// Seed, split targets and curriculum order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub seed: u64,
    pub train: usize,
    pub validation: usize,
    pub test: usize,
    pub curriculum: Vec<Variant>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        let targets = SplitTargets::default();
        Self {
            seed: 42,
            train: targets.train,
            validation: targets.validation,
            test: targets.test,
            curriculum: Variant::ALL.to_vec(),
        }
    }
}

impl DatasetConfig {
    pub fn targets(&self) -> SplitTargets {
        SplitTargets {
            train: self.train,
            validation: self.validation,
            test: self.test,
        }
    }
}

// ---------------------------------------------------------------------------
// RunConfig
// ---------------------------------------------------------------------------

/// Execution and output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Worker threads for per-clip work.
    pub workers: usize,
    /// Tensor cache root; `None` uses the platform cache directory.
    pub cache_dir: Option<PathBuf>,
    /// Store tensors inside the manifest instead of `.npy` files.
    pub inline_tensors: bool,
    /// Also write every rendered clip as WAV under this directory.
    pub export_audio_dir: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            cache_dir: None,
            inline_tensors: false,
            export_audio_dir: None,
        }
    }
}

impl RunConfig {
    /// Tensor cache root, made absolute so manifests stay valid from any
    /// working directory.
    pub fn resolved_cache_dir(&self) -> PathBuf {
        let dir = self
            .cache_dir
            .clone()
            .unwrap_or_else(|| AppPaths::new().tensor_cache_dir);
        if dir.is_relative() {
            if let Ok(cwd) = std::env::current_dir() {
                return cwd.join(dir);
            }
        }
        dir
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level pipeline configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use aimusic_dataset::config::PipelineConfig;
///
/// // Load (returns Default when file is missing)
/// let config = PipelineConfig::load().unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub audio: AudioConfig,
    pub augment: AugmentConfig,
    pub features: FeatureConfig,
    pub dataset: DatasetConfig,
    pub run: RunConfig,
}

impl PipelineConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(PipelineConfig::default())` when the file does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        let a = &self.audio;
        ensure!(a.sample_rate > 0, "audio.sample_rate must be > 0");
        ensure!(
            a.clip_secs.is_finite() && a.clip_secs > 0.0,
            "audio.clip_secs must be > 0, got {}",
            a.clip_secs
        );
        ensure!(a.clip_samples() > 0, "audio.clip_secs too short for the sample rate");
        ensure!(
            a.target_rms.is_finite() && a.target_rms > 0.0,
            "audio.target_rms must be > 0, got {}",
            a.target_rms
        );

        self.augment
            .ranges()
            .validate()
            .context("augment section")?;

        let f = &self.features;
        ensure!(f.n_fft >= 2 && f.hop_length > 0, "features.n_fft / hop_length must be positive");
        ensure!(
            f.win_length > 0 && f.win_length <= f.n_fft,
            "features.win_length must be in 1..=n_fft"
        );
        ensure!(f.n_mels > 0, "features.n_mels must be > 0");
        ensure!(f.top_db > 0.0, "features.top_db must be > 0");
        ensure!(
            f.n_mfcc > 0 && f.n_mfcc <= f.n_mels,
            "features.n_mfcc must be in 1..=n_mels"
        );
        if let Some([h, w]) = f.image_size {
            ensure!(h > 0 && w > 0, "features.image_size must be positive");
        }
        f.extractor()
            .mel
            .validate(a.sample_rate)
            .context("features section")?;

        ensure!(self.dataset.targets().total() > 0, "dataset split targets are all zero");
        ContinuousCurriculum::new(self.dataset.curriculum.clone()).context("dataset.curriculum")?;

        ensure!(self.run.workers > 0, "run.workers must be > 0");
        Ok(())
    }

    /// Assembler configured from the `dataset` and `augment` sections.
    pub fn assembler(&self) -> Result<DatasetAssembler> {
        let curriculum = ContinuousCurriculum::new(self.dataset.curriculum.clone())
            .context("dataset.curriculum")?;
        Ok(DatasetAssembler::new(self.dataset.seed)
            .with_targets(self.dataset.targets())
            .with_ranges(self.augment.ranges())
            .with_draw_mode(self.augment.draws)
            .with_curriculum(curriculum))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
