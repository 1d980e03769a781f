//! Dataset builder: drives scan → assemble → extract over a source manifest.
//!
//! [`DatasetBuilder`] owns a validated [`PipelineConfig`] and turns a
//! [`SourceManifest`] into a [`DatasetManifest`] plus a [`RunReport`].
//!
//! # Build flow
//!
//! ```text
//! SourceManifest
//!   └─▶ scan     spawn_blocking per clip: load → window → normalize
//!         ├─ Ok  → Clip with audio properties
//!         └─ Err → SkippedClip (warn, counted)                 [recoverable]
//!   └─▶ assemble DatasetAssembler: balance, split, draw specs    [fatal on error]
//!   └─▶ extract  spawn_blocking per kept clip, for each variant:
//!                 spec.apply → fix_length → image tensor → .npy / inline
//!                 (+ descriptors, + WAV export)                 [fatal on error]
//!   └─▶ DatasetManifest (variants in Variant::ALL order)
//! ```
//!
//! All blocking work (decoding, resampling, STFTs, file writes) runs on
//! `tokio::task::spawn_blocking`, at most `run.workers` jobs at a time.
//! Every random draw happens inside the assembler, so the order in which
//! workers finish never changes the output.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::audio::{
    fix_length, load, save_wav, CropPolicy, LoadError, NormalizeError, Normalizer, WaveformBuffer,
};
use crate::augment::{AugmentError, AugmentationSpec};
use crate::config::PipelineConfig;
use crate::dataset::{
    AssemblyError, Clip, DatasetAssembler, DatasetManifest, DatasetVariant, ManifestEntry,
    SkippedClip, SourceManifest, TensorRef, Variant, VariantManifest, MANIFEST_VERSION,
};
use crate::features::{
    write_npy, DescriptorSummary, FeatureError, FeatureExtractor, FeatureTensor, TensorCacheError,
};

use super::report::RunReport;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a single clip could not be processed.
#[derive(Debug, Error)]
pub enum ClipError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Augment(#[from] AugmentError),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Cache(#[from] TensorCacheError),

    /// The requested window lies past the end of the source.
    #[error("segment {segment} requested but only {available} available")]
    MissingSegment { segment: usize, available: usize },
}

impl ClipError {
    /// Short snake_case error class used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ClipError::Load(LoadError::Io { .. }) => "io",
            ClipError::Load(LoadError::UnsupportedFormat { .. }) => "unsupported_format",
            ClipError::Load(LoadError::CorruptFile { .. }) => "corrupt_file",
            ClipError::Load(LoadError::Resample { .. }) => "resample",
            ClipError::Load(LoadError::Write { .. }) => "write",
            ClipError::Normalize(NormalizeError::SilentClip { .. }) => "silent_clip",
            ClipError::Normalize(_) => "normalize",
            ClipError::Augment(AugmentError::ParameterRange { .. }) => "parameter_range",
            ClipError::Augment(AugmentError::InvertedRange { .. }) => "inverted_range",
            ClipError::Augment(AugmentError::Resample(_)) => "resample",
            ClipError::Feature(FeatureError::EmptySignal) => "empty_signal",
            ClipError::Feature(_) => "feature",
            ClipError::Cache(_) => "tensor_cache",
            ClipError::MissingSegment { .. } => "missing_segment",
        }
    }
}

/// Failures that abort a whole build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    /// A clip that passed the scan failed afterwards.
    #[error("clip {clip_id}: {source}")]
    Clip {
        clip_id: String,
        #[source]
        source: ClipError,
    },

    #[error("clips {first} and {second} map to the same cache file {path}")]
    CacheCollision {
        path: PathBuf,
        first: String,
        second: String,
    },

    #[error("fingerprinting run: {0}")]
    Fingerprint(#[from] serde_json::Error),

    /// A worker task panicked or the pool shut down.
    #[error("worker failed: {0}")]
    Worker(String),
}

// ---------------------------------------------------------------------------
// ClipRenderer
// ---------------------------------------------------------------------------

/// Where rendered tensors go.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorSink {
    /// Write `.npy` files under this root.
    Cache(PathBuf),
    /// Keep tensors in memory for an inline manifest.
    Inline,
}

/// Result of rendering one clip in one variant.
#[derive(Debug, Clone)]
pub struct RenderedVariant {
    pub variant: Variant,
    pub tensor: TensorOutput,
    pub descriptors: Option<DescriptorSummary>,
    pub exported: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum TensorOutput {
    /// Path relative to the cache root.
    Cached(PathBuf),
    Inline(FeatureTensor),
}

/// Per-clip work shared by every worker.  Read-only once built.
#[derive(Debug, Clone)]
pub struct ClipRenderer {
    pub sample_rate: u32,
    pub clip_samples: usize,
    pub crop: CropPolicy,
    pub normalizer: Normalizer,
    pub extractor: FeatureExtractor,
    pub descriptors: bool,
    pub sink: TensorSink,
    pub export_dir: Option<PathBuf>,
}

impl ClipRenderer {
    pub fn from_config(config: &PipelineConfig) -> Self {
        let sink = if config.run.inline_tensors {
            TensorSink::Inline
        } else {
            TensorSink::Cache(config.run.resolved_cache_dir())
        };
        Self {
            sample_rate: config.audio.sample_rate,
            clip_samples: config.audio.clip_samples(),
            crop: config.audio.crop,
            normalizer: config.audio.normalizer(),
            extractor: config.features.extractor(),
            descriptors: config.features.descriptors,
            sink,
            export_dir: config.run.export_audio_dir.clone(),
        }
    }

    /// Load `clip`, cut its window and normalise it.
    pub fn prepare(&self, clip: &Clip) -> Result<WaveformBuffer, ClipError> {
        let source = load(&clip.path, self.sample_rate)?;
        let available = source.segment_count(self.clip_samples, self.clip_samples);
        if available == 0 {
            return Err(FeatureError::EmptySignal.into());
        }
        let window = source
            .segments(self.clip_samples, self.clip_samples)
            .nth(clip.segment)
            .ok_or(ClipError::MissingSegment {
                segment: clip.segment,
                available,
            })?;
        Ok(self.normalizer.normalize(&window)?)
    }

    /// Render every `(variant, spec)` of an already prepared clip.
    pub fn render(
        &self,
        clip: &Clip,
        prepared: &WaveformBuffer,
        specs: &[(Variant, AugmentationSpec)],
    ) -> Result<Vec<RenderedVariant>, ClipError> {
        let file_stem = cache_file_stem(&clip.id);
        let mut out = Vec::with_capacity(specs.len());

        for &(variant, spec) in specs {
            let augmented = spec.apply(prepared)?;
            let fitted = fix_length(&augmented, self.clip_samples, self.crop);
            let tensor = self.extractor.image_tensor(&fitted)?;

            let tensor = match &self.sink {
                TensorSink::Cache(root) => {
                    let rel = cache_rel_path(variant, &file_stem);
                    write_npy(&root.join(&rel), &tensor)?;
                    TensorOutput::Cached(rel)
                }
                TensorSink::Inline => TensorOutput::Inline(tensor),
            };

            let descriptors = if self.descriptors {
                Some(self.extractor.descriptors(&fitted)?)
            } else {
                None
            };

            let exported = match &self.export_dir {
                Some(dir) => {
                    let path = dir.join(variant.slug()).join(format!("{file_stem}.wav"));
                    save_wav(&fitted, &path)?;
                    Some(path)
                }
                None => None,
            };

            log::debug!("rendered {} [{variant}] {spec:?}", clip.id);
            out.push(RenderedVariant {
                variant,
                tensor,
                descriptors,
                exported,
            });
        }
        Ok(out)
    }
}

/// File-system-safe stem for a clip id.
fn cache_file_stem(clip_id: &str) -> String {
    clip_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn cache_rel_path(variant: Variant, stem: &str) -> PathBuf {
    Path::new(variant.slug()).join(format!("{stem}.npy"))
}

// ---------------------------------------------------------------------------
// DatasetBuilder
// ---------------------------------------------------------------------------

/// Builds a [`DatasetManifest`] from a [`SourceManifest`].
///
/// ```rust,no_run
/// use std::path::Path;
/// use aimusic_dataset::config::PipelineConfig;
/// use aimusic_dataset::dataset::SourceManifest;
/// use aimusic_dataset::pipeline::DatasetBuilder;
///
/// # async fn example() -> anyhow::Result<()> {
/// let sources = SourceManifest::load(Path::new("sources.json"))?;
/// let builder = DatasetBuilder::new(PipelineConfig::default())?;
/// let (manifest, report) = builder.build(&sources).await?;
/// manifest.save(Path::new("dataset.json"))?;
/// report.log_summary();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DatasetBuilder {
    config: PipelineConfig,
    assembler: DatasetAssembler,
    renderer: Arc<ClipRenderer>,
}

impl DatasetBuilder {
    /// Validate `config` and prepare the assembler and renderer.
    pub fn new(config: PipelineConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let assembler = config.assembler()?;
        let renderer = Arc::new(ClipRenderer::from_config(&config));
        Ok(Self {
            config,
            assembler,
            renderer,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Base tensor cache directory, if tensors are cached on disk.  Each
    /// build writes into its own [`run_dir_name`] subdirectory.
    pub fn cache_root(&self) -> Option<&Path> {
        match &self.renderer.sink {
            TensorSink::Cache(root) => Some(root.as_path()),
            TensorSink::Inline => None,
        }
    }

    /// Run the whole build.
    pub async fn build(
        &self,
        sources: &SourceManifest,
    ) -> Result<(DatasetManifest, RunReport), BuildError> {
        let started = Instant::now();
        let workers = self.config.run.workers;
        let mut report = RunReport::new(sources.len());

        // ── 1. Scan ──────────────────────────────────────────────────────
        log::info!("scanning {} source clip(s) with {workers} worker(s)", sources.len());
        let renderer = Arc::clone(&self.renderer);
        let scanned = run_blocking_pool(workers, sources.clips(), move |clip: Clip| {
            let result = renderer.prepare(&clip).map(|w| w.duration_secs());
            (clip, result)
        })
        .await?;

        let sample_rate = self.renderer.sample_rate;
        let mut usable = Vec::with_capacity(scanned.len());
        let mut skipped = Vec::new();
        for (clip, result) in scanned {
            match result {
                Ok(duration) => usable.push(clip.with_audio(sample_rate, duration)),
                Err(e) => {
                    log::warn!("skipping {} ({}): {e}", clip.id, clip.path.display());
                    let entry = SkippedClip {
                        clip_id: clip.id,
                        path: clip.path,
                        kind: e.kind().to_string(),
                        reason: e.to_string(),
                    };
                    report.record_skip(&entry);
                    skipped.push(entry);
                }
            }
        }
        report.usable = usable.len();

        // ── 2. Assemble ──────────────────────────────────────────────────
        let assembled = self.assembler.assemble(usable)?;
        report.excluded = assembled.excluded.len();

        // ── 3. Extract ───────────────────────────────────────────────────
        let jobs = render_jobs(&assembled.variants);
        check_cache_collisions(jobs.iter().map(|(clip, _)| clip.id.as_str()))?;
        report.dataset_clips = jobs.len();
        log::info!(
            "rendering {} clip(s) x {} variant(s)",
            jobs.len(),
            assembled.variants.len()
        );

        let (renderer, tensor_root) = match &self.renderer.sink {
            TensorSink::Cache(root) => {
                let run_root = root.join(run_dir_name(&self.config, sources)?);
                log::info!("tensor cache for this run: {}", run_root.display());
                let renderer = ClipRenderer {
                    sink: TensorSink::Cache(run_root.clone()),
                    ..(*self.renderer).clone()
                };
                (Arc::new(renderer), Some(run_root))
            }
            TensorSink::Inline => (Arc::clone(&self.renderer), None),
        };
        let rendered = run_blocking_pool(workers, jobs, move |job: RenderJob| {
            let (clip, specs) = job;
            let result = renderer
                .prepare(&clip)
                .and_then(|prepared| renderer.render(&clip, &prepared, &specs));
            (clip.id, result)
        })
        .await?;

        let mut outputs: HashMap<(String, Variant), RenderedVariant> = HashMap::new();
        for (clip_id, result) in rendered {
            let variants = result.map_err(|source| BuildError::Clip {
                clip_id: clip_id.clone(),
                source,
            })?;
            for r in variants {
                match r.tensor {
                    TensorOutput::Cached(_) => report.tensors_written += 1,
                    TensorOutput::Inline(_) => report.tensors_inline += 1,
                }
                if r.exported.is_some() {
                    report.audio_exported += 1;
                }
                outputs.insert((clip_id.clone(), r.variant), r);
            }
        }

        // ── 4. Manifest ──────────────────────────────────────────────────
        let mut variants = Vec::with_capacity(assembled.variants.len());
        for dv in &assembled.variants {
            let mut vm = VariantManifest::new(dv.variant);
            for (split, entry) in dv.entries() {
                let key = (entry.clip.id.clone(), dv.variant);
                let rendered = outputs.remove(&key).ok_or_else(|| {
                    BuildError::Worker(format!("no output for {} [{}]", key.0, key.1))
                })?;
                vm.split_mut(split).push(manifest_entry(&entry.clip, entry.augmentation, rendered));
            }
            variants.push(vm);
        }

        let manifest = DatasetManifest {
            version: MANIFEST_VERSION,
            seed: assembled.seed,
            sample_rate,
            clip_samples: self.renderer.clip_samples,
            tensor_shape: self.renderer.extractor.output_shape(self.renderer.clip_samples),
            tensor_root,
            curriculum: assembled.curriculum,
            variants,
            skipped,
            excluded: assembled.excluded,
        };
        manifest.verify()?;

        report.set_elapsed(started.elapsed());
        Ok((manifest, report))
    }
}

/// Cache subdirectory for one build: `seed<seed>-<hash>`, where the hash
/// covers every setting that shapes the tensors plus the source list.
/// Identical runs share a directory; any other run gets a fresh one.
pub fn run_dir_name(config: &PipelineConfig, sources: &SourceManifest) -> Result<String, serde_json::Error> {
    let key = serde_json::to_vec(&(
        &config.audio,
        &config.augment,
        &config.features,
        &config.dataset,
        sources,
    ))?;
    let mut hasher = Sha256::new();
    hasher.update(&key);
    let hex = format!("{:x}", hasher.finalize());
    Ok(format!("seed{}-{}", config.dataset.seed, &hex[..12]))
}

type RenderJob = (Clip, Vec<(Variant, AugmentationSpec)>);

/// One job per kept clip, carrying the spec of every variant.
fn render_jobs(variants: &[DatasetVariant]) -> Vec<RenderJob> {
    let mut by_clip: BTreeMap<String, RenderJob> = BTreeMap::new();
    for dv in variants {
        for (_, entry) in dv.entries() {
            by_clip
                .entry(entry.clip.id.clone())
                .or_insert_with(|| (entry.clip.clone(), Vec::new()))
                .1
                .push((dv.variant, entry.augmentation));
        }
    }
    by_clip.into_values().collect()
}

fn check_cache_collisions<'a>(ids: impl Iterator<Item = &'a str>) -> Result<(), BuildError> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for id in ids {
        let stem = cache_file_stem(id);
        if let Some(first) = seen.insert(stem.clone(), id) {
            return Err(BuildError::CacheCollision {
                path: PathBuf::from(format!("{stem}.npy")),
                first: first.to_string(),
                second: id.to_string(),
            });
        }
    }
    Ok(())
}

fn manifest_entry(
    clip: &Clip,
    augmentation: AugmentationSpec,
    rendered: RenderedVariant,
) -> ManifestEntry {
    let tensor = match rendered.tensor {
        TensorOutput::Cached(path) => TensorRef::Cached { path },
        TensorOutput::Inline(t) => TensorRef::Inline {
            shape: t.shape(),
            data: t.to_vec(),
        },
    };
    ManifestEntry {
        clip_id: clip.id.clone(),
        label: clip.label,
        platform: clip.platform.clone(),
        source: clip.path.clone(),
        segment: clip.segment,
        augmentation,
        tensor,
        descriptors: rendered.descriptors,
    }
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

/// Run `f` over `items` on the blocking pool, at most `workers` at a time.
/// Results come back in input order.
async fn run_blocking_pool<T, R, F>(workers: usize, items: Vec<T>, f: F) -> Result<Vec<R>, BuildError>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> R + Send + Sync + 'static,
{
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let f = Arc::new(f);
    let total = items.len();
    let mut set = JoinSet::new();

    for (index, item) in items.into_iter().enumerate() {
        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .map_err(|e| BuildError::Worker(e.to_string()))?;
        let f = Arc::clone(&f);
        set.spawn_blocking(move || {
            let _permit = permit;
            (index, f(item))
        });
    }

    let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        let (index, result) = joined.map_err(|e| BuildError::Worker(e.to_string()))?;
        slots[index] = Some(result);
    }
    Ok(slots.into_iter().flatten().collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Label, SourceEntry, Split, SplitTargets};
    use std::f32::consts::PI;
    use tempfile::{tempdir, TempDir};

    const SR: u32 = 8_000;

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn write_wav(path: &Path, samples: &[f32]) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: SR,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn tone(freq: f32, secs: f32) -> Vec<f32> {
        let n = (secs * SR as f32) as usize;
        (0..n)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / SR as f32).sin())
            .collect()
    }

    fn small_config(dir: &Path) -> PipelineConfig {
        let mut cfg = PipelineConfig::default();
        cfg.audio.sample_rate = SR;
        cfg.audio.clip_secs = 0.5;
        cfg.features.n_fft = 512;
        cfg.features.win_length = 512;
        cfg.features.hop_length = 128;
        cfg.features.n_mels = 32;
        cfg.dataset.train = 4;
        cfg.dataset.validation = 2;
        cfg.dataset.test = 2;
        cfg.run.workers = 2;
        cfg.run.cache_dir = Some(dir.join("cache"));
        cfg
    }

    /// Five usable clips per label plus one broken source of each kind.
    fn fixture() -> (TempDir, SourceManifest) {
        let dir = tempdir().expect("temp dir");
        let mut sources = SourceManifest::default();
        let mut add = |id: &str, label: Label, samples: Option<Vec<f32>>, segment: usize| {
            let path = dir.path().join(format!("{id}.wav"));
            match samples {
                Some(s) => write_wav(&path, &s),
                None => std::fs::write(&path, b"definitely not audio").unwrap(),
            }
            sources.insert(
                id,
                SourceEntry {
                    path,
                    label,
                    platform: (label == Label::Synthetic).then(|| "suno".to_string()),
                    segment,
                },
            );
        };

        for i in 0..5 {
            add(&format!("human_{i}"), Label::Human, Some(tone(220.0 + 40.0 * i as f32, 1.0)), i % 2);
            add(&format!("synth_{i}"), Label::Synthetic, Some(tone(330.0 + 40.0 * i as f32, 1.0)), 0);
        }
        add("corrupt", Label::Human, None, 0);
        add("silent", Label::Synthetic, Some(vec![0.0; SR as usize]), 0);
        add("short", Label::Human, Some(tone(440.0, 0.2)), 0);
        add("past_end", Label::Synthetic, Some(tone(440.0, 1.0)), 5);
        (dir, sources)
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[test]
    fn cache_stems_are_filesystem_safe() {
        assert_eq!(cache_file_stem("suno/track 01.mp3"), "suno_track_01.mp3");
        assert_eq!(cache_file_stem("human-0001"), "human-0001");
        assert!(check_cache_collisions(["a/b", "a_b"].into_iter()).is_err());
        assert!(check_cache_collisions(["a", "b"].into_iter()).is_ok());
    }

    #[test]
    fn prepare_selects_window_and_normalises() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("two.wav");
        let mut samples = tone(200.0, 0.5);
        samples.extend(tone(200.0, 0.5).iter().map(|s| s * 0.2));
        write_wav(&path, &samples);

        let renderer = ClipRenderer::from_config(&small_config(dir.path()));
        let second = renderer
            .prepare(&Clip::new("two", &path, Label::Human).with_segment(1))
            .unwrap();
        assert_eq!(second.len(), 4_000);
        assert!((second.peak() - 1.0).abs() < 1e-4);

        let err = renderer
            .prepare(&Clip::new("two", &path, Label::Human).with_segment(2))
            .unwrap_err();
        assert_eq!(err.kind(), "missing_segment");
    }

    #[tokio::test]
    async fn pool_preserves_input_order() {
        let out = run_blocking_pool(3, (0..50).collect(), |i: usize| {
            std::thread::sleep(std::time::Duration::from_millis((50 - i as u64) % 7));
            i * 2
        })
        .await
        .unwrap();
        assert_eq!(out, (0..50).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn build_skips_bad_sources_and_writes_tensors() {
        let (dir, sources) = fixture();
        let cfg = small_config(dir.path());
        let builder = DatasetBuilder::new(cfg).unwrap();

        let (manifest, report) = builder.build(&sources).await.unwrap();

        assert_eq!(report.sources, 14);
        assert_eq!(report.usable, 10);
        assert_eq!(report.skipped_total(), 4);
        let undecodable = ["corrupt_file", "unsupported_format"]
            .iter()
            .filter_map(|k| report.skipped.get(*k))
            .sum::<usize>();
        assert_eq!(undecodable, 1);
        assert_eq!(report.skipped["silent_clip"], 1);
        assert_eq!(report.skipped["empty_signal"], 1);
        assert_eq!(report.skipped["missing_segment"], 1);
        assert_eq!(report.excluded, 2);
        assert_eq!(report.dataset_clips, 8);
        assert_eq!(report.tensors_written, 32);
        assert_eq!(manifest.skipped.len(), 4);

        let root = manifest.tensor_root.as_deref().unwrap();
        assert!(root.starts_with(builder.cache_root().unwrap()));
        assert_eq!(root.file_name().unwrap().to_str().unwrap(), run_dir_name(builder.config(), &sources).unwrap());
        for variant in Variant::ALL {
            let vm = manifest.variant(variant).unwrap();
            assert_eq!(vm.len(), 8);
            for split in Split::ALL {
                let loader = manifest.loader(variant, split).unwrap();
                let humans = loader.entries().iter().filter(|e| e.label == Label::Human).count();
                assert_eq!(humans * 2, loader.len());
                for item in loader.iter() {
                    let (tensor, _) = item.unwrap();
                    assert_eq!(tensor.shape(), manifest.tensor_shape);
                }
            }
        }
        assert_eq!(manifest.tensor_shape, [3, 32, 32]);
    }

    #[tokio::test]
    async fn inline_build_is_reproducible() {
        let (dir, sources) = fixture();
        let mut cfg = small_config(dir.path());
        cfg.run.inline_tensors = true;
        cfg.features.descriptors = true;

        let builder = DatasetBuilder::new(cfg.clone()).unwrap();
        assert!(builder.cache_root().is_none());
        let (first, _) = builder.build(&sources).await.unwrap();
        assert!(first.tensor_root.is_none());

        cfg.run.workers = 1;
        let (second, report) = DatasetBuilder::new(cfg).unwrap().build(&sources).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(report.tensors_inline, 32);
        let entry = &first.variant(Variant::PitchTempo).unwrap().train[0];
        assert!(matches!(entry.tensor, TensorRef::Inline { .. }));
        assert!(entry.descriptors.is_some());
    }

    #[tokio::test]
    async fn audio_export_writes_fixed_length_wavs() {
        let (dir, sources) = fixture();
        let mut cfg = small_config(dir.path());
        cfg.run.export_audio_dir = Some(dir.path().join("audit"));

        let (manifest, report) = DatasetBuilder::new(cfg).unwrap().build(&sources).await.unwrap();
        assert_eq!(report.audio_exported, 32);

        let entry = &manifest.variant(Variant::Tempo).unwrap().test[0];
        let path = dir
            .path()
            .join("audit/tempo")
            .join(format!("{}.wav", entry.clip_id));
        let reader = hound::WavReader::open(path).unwrap();
        assert_eq!(reader.len(), 4_000);
    }

    #[tokio::test]
    async fn too_few_clips_is_fatal() {
        let (dir, sources) = fixture();
        let mut cfg = small_config(dir.path());
        cfg.dataset.train = 20;
        let err = DatasetBuilder::new(cfg).unwrap().build(&sources).await.unwrap_err();
        assert!(matches!(
            err,
            BuildError::Assembly(AssemblyError::InsufficientData { .. })
        ));
    }

    #[tokio::test]
    async fn later_run_leaves_earlier_tensors_intact() {
        let (dir, sources) = fixture();
        let first_cfg = small_config(dir.path());
        let mut second_cfg = first_cfg.clone();
        second_cfg.dataset.seed = 43;

        let collect = |m: &DatasetManifest| -> Vec<(String, FeatureTensor)> {
            let mut out = Vec::new();
            for variant in Variant::ALL {
                for split in Split::ALL {
                    let loader = m.loader(variant, split).unwrap();
                    for (entry, item) in loader.entries().iter().zip(loader.iter()) {
                        out.push((format!("{variant}/{}", entry.clip_id), item.unwrap().0));
                    }
                }
            }
            out
        };

        let (first, _) = DatasetBuilder::new(first_cfg).unwrap().build(&sources).await.unwrap();
        let before = collect(&first);
        assert_eq!(before.len(), 32);

        let (second, _) = DatasetBuilder::new(second_cfg).unwrap().build(&sources).await.unwrap();
        assert_ne!(first.tensor_root, second.tensor_root);
        assert_eq!(collect(&first), before);
        assert_eq!(collect(&second).len(), 32);
    }

    #[test]
    fn run_dir_name_tracks_settings() {
        let (dir, sources) = fixture();
        let cfg = small_config(dir.path());
        let name = run_dir_name(&cfg, &sources).unwrap();
        assert!(name.starts_with("seed42-"));
        assert_eq!(name.len(), "seed42-".len() + 12);
        assert_eq!(run_dir_name(&cfg, &sources).unwrap(), name);

        let mut other = cfg.clone();
        other.run.workers = 7;
        assert_eq!(run_dir_name(&other, &sources).unwrap(), name);

        other.features.n_mels = 16;
        assert_ne!(run_dir_name(&other, &sources).unwrap(), name);

        let mut reseeded = cfg.clone();
        reseeded.dataset.seed = 43;
        assert!(run_dir_name(&reseeded, &sources).unwrap().starts_with("seed43-"));
    }

    #[test]
    fn augment_errors_keep_their_kind() {
        let range: ClipError = AugmentError::ParameterRange {
            parameter: "pitch_semitones",
            value: 3.0,
            min: -2.0,
            max: 2.0,
        }
        .into();
        assert_eq!(range.kind(), "parameter_range");

        let inverted: ClipError = AugmentError::InvertedRange {
            parameter: "tempo_ratio",
            start: 1.1,
            end: 0.9,
        }
        .into();
        assert_eq!(inverted.kind(), "inverted_range");

        let resample: ClipError =
            AugmentError::Resample(crate::audio::ResampleError::InvalidRatio(0.0)).into();
        assert_eq!(resample.kind(), "resample");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.augment.tempo_range = [0.5, 1.2];
        assert!(DatasetBuilder::new(cfg).is_err());
    }

    #[test]
    fn targets_default_match_config() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.dataset.targets(), SplitTargets::default());
    }
}
