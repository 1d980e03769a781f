//! Run bookkeeping: how many clips came in, how many were skipped and why,
//! and what was written.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dataset::manifest::write_json;
use crate::dataset::{ManifestError, SkippedClip};

/// Summary of one [`DatasetBuilder::build`](super::DatasetBuilder::build).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Entries in the source manifest.
    pub sources: usize,
    /// Sources that decoded, had the requested window and normalised.
    pub usable: usize,
    /// Skip count per error kind.
    pub skipped: BTreeMap<String, usize>,
    /// Usable clips left out by class balancing or the split targets.
    pub excluded: usize,
    /// Clips present in every variant.
    pub dataset_clips: usize,
    /// `.npy` files written to the tensor cache.
    pub tensors_written: usize,
    /// Tensors stored inside the manifest.
    pub tensors_inline: usize,
    /// WAV files written for auditing.
    pub audio_exported: usize,
    pub elapsed_secs: f64,
}

impl RunReport {
    pub fn new(sources: usize) -> Self {
        Self {
            sources,
            ..Self::default()
        }
    }

    pub fn record_skip(&mut self, skipped: &SkippedClip) {
        *self.skipped.entry(skipped.kind.clone()).or_insert(0) += 1;
    }

    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed_secs = elapsed.as_secs_f64();
    }

    pub fn log_summary(&self) {
        log::info!(
            "run finished in {:.1}s: {} sources, {} usable, {} skipped, {} excluded, {} clips per variant",
            self.elapsed_secs,
            self.sources,
            self.usable,
            self.skipped_total(),
            self.excluded,
            self.dataset_clips
        );
        for (kind, count) in &self.skipped {
            log::info!("  skipped {count} clip(s): {kind}");
        }
        log::info!(
            "tensors: {} cached, {} inline; {} audio file(s) exported",
            self.tensors_written,
            self.tensors_inline,
            self.audio_exported
        );
    }

    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        write_json(path, self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn skipped(id: &str, kind: &str) -> SkippedClip {
        SkippedClip {
            clip_id: id.into(),
            path: PathBuf::from(format!("{id}.wav")),
            kind: kind.into(),
            reason: "test".into(),
        }
    }

    #[test]
    fn skips_are_counted_per_kind() {
        let mut report = RunReport::new(5);
        report.record_skip(&skipped("a", "corrupt_file"));
        report.record_skip(&skipped("b", "silent_clip"));
        report.record_skip(&skipped("c", "corrupt_file"));

        assert_eq!(report.sources, 5);
        assert_eq!(report.skipped_total(), 3);
        assert_eq!(report.skipped["corrupt_file"], 2);
        assert_eq!(report.skipped["silent_clip"], 1);
    }

    #[test]
    fn saved_report_is_json() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("out/report.json");

        let mut report = RunReport::new(2);
        report.usable = 2;
        report.set_elapsed(Duration::from_millis(1500));
        report.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let back: RunReport = serde_json::from_str(&text).unwrap();
        assert_eq!(back, report);
        assert!((back.elapsed_secs - 1.5).abs() < 1e-9);
    }
}
