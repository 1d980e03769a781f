//! Labelled source clips and the input manifest that declares them.
//!
//! The input manifest is JSON:
//!
//! ```json
//! {
//!   "clips": {
//!     "human_0001": { "path": "human/0001.mp3", "label": "human" },
//!     "suno_0042":  { "path": "ai/suno/42.wav", "label": "synthetic", "platform": "suno", "segment": 1 }
//!   }
//! }
//! ```
//!
//! Relative paths are resolved against the manifest's directory.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::manifest::ManifestError;

// ---------------------------------------------------------------------------
// Label
// ---------------------------------------------------------------------------

/// Binary class of a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Human = 0,
    Synthetic = 1,
}

impl Label {
    pub const ALL: [Label; 2] = [Label::Human, Label::Synthetic];

    /// Numeric class index fed to the classifier.
    pub fn index(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Label::Human => "human",
            Label::Synthetic => "synthetic",
        })
    }
}

// ---------------------------------------------------------------------------
// Clip
// ---------------------------------------------------------------------------

/// One labelled source clip.  Audio properties are filled in once the clip
/// has been decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: String,
    pub path: PathBuf,
    pub label: Label,
    /// Generator name for synthetic clips.
    pub platform: Option<String>,
    /// Which fixed-length window of the source file to use.
    pub segment: usize,
    pub sample_rate: u32,
    /// Always 1 after loading.
    pub channels: u16,
    pub duration_secs: f32,
}

impl Clip {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>, label: Label) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            label,
            platform: None,
            segment: 0,
            sample_rate: 0,
            channels: 1,
            duration_secs: 0.0,
        }
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn with_segment(mut self, segment: usize) -> Self {
        self.segment = segment;
        self
    }

    /// Record the properties of the decoded clip window.
    pub fn with_audio(mut self, sample_rate: u32, duration_secs: f32) -> Self {
        self.sample_rate = sample_rate;
        self.channels = 1;
        self.duration_secs = duration_secs;
        self
    }
}

// ---------------------------------------------------------------------------
// SourceManifest
// ---------------------------------------------------------------------------

/// One declared source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub path: PathBuf,
    pub label: Label,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default)]
    pub segment: usize,
}

/// Clip id → source file declaration.  Ids iterate in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceManifest {
    pub clips: BTreeMap<String, SourceEntry>,
}

impl SourceManifest {
    pub fn insert(&mut self, id: impl Into<String>, entry: SourceEntry) {
        self.clips.insert(id.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn count(&self, label: Label) -> usize {
        self.clips.values().filter(|e| e.label == label).count()
    }

    /// Clips in id order, audio properties not yet known.
    pub fn clips(&self) -> Vec<Clip> {
        self.clips
            .iter()
            .map(|(id, entry)| {
                let clip = Clip::new(id.clone(), entry.path.clone(), entry.label)
                    .with_segment(entry.segment);
                match &entry.platform {
                    Some(p) => clip.with_platform(p.clone()),
                    None => clip,
                }
            })
            .collect()
    }

    /// Load from JSON, resolving relative paths against the file's directory.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut manifest: Self =
            serde_json::from_str(&content).map_err(|source| ManifestError::Json {
                path: path.to_path_buf(),
                source,
            })?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        for entry in manifest.clips.values_mut() {
            if entry.path.is_relative() {
                entry.path = base.join(&entry.path);
            }
        }
        log::info!(
            "source manifest {}: {} human, {} synthetic",
            path.display(),
            manifest.count(Label::Human),
            manifest.count(Label::Synthetic)
        );
        Ok(manifest)
    }

    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        super::manifest::write_json(path, self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn label_serialises_lowercase_and_indexes() {
        assert_eq!(serde_json::to_string(&Label::Synthetic).unwrap(), "\"synthetic\"");
        assert_eq!(Label::Human.index(), 0);
        assert_eq!(Label::Synthetic.index(), 1);
        assert_eq!(Label::Synthetic.to_string(), "synthetic");
    }

    #[test]
    fn load_resolves_relative_paths_and_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("sources.json");
        std::fs::write(
            &path,
            r#"{"clips": {
                "b": {"path": "ai/b.wav", "label": "synthetic", "platform": "suno", "segment": 2},
                "a": {"path": "/abs/a.wav", "label": "human"}
            }}"#,
        )
        .unwrap();

        let manifest = SourceManifest::load(&path).expect("load");
        let clips = manifest.clips();
        assert_eq!(clips.len(), 2);
        assert_eq!(clips[0].id, "a");
        assert_eq!(clips[0].path, PathBuf::from("/abs/a.wav"));
        assert_eq!(clips[0].segment, 0);
        assert!(clips[0].platform.is_none());
        assert_eq!(clips[1].path, dir.path().join("ai/b.wav"));
        assert_eq!(clips[1].platform.as_deref(), Some("suno"));
        assert_eq!(clips[1].segment, 2);
        assert_eq!(manifest.count(Label::Human), 1);
    }

    #[test]
    fn unknown_label_is_json_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"clips": {"x": {"path": "x.wav", "label": "robot"}}}"#).unwrap();
        assert!(matches!(SourceManifest::load(&path), Err(ManifestError::Json { .. })));
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("out.json");
        let mut manifest = SourceManifest::default();
        manifest.insert(
            "h1",
            SourceEntry {
                path: dir.path().join("h1.wav"),
                label: Label::Human,
                platform: None,
                segment: 0,
            },
        );
        manifest.save(&path).expect("save");
        assert_eq!(SourceManifest::load(&path).expect("load"), manifest);
    }
}
