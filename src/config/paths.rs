//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\aimusic-dataset\
//!   macOS:   ~/Library/Application Support/aimusic-dataset/
//!   Linux:   ~/.config/aimusic-dataset/
//!
//! Cache dir (feature tensors):
//!   Windows: %LOCALAPPDATA%\aimusic-dataset\
//!   macOS:   ~/Library/Caches/aimusic-dataset/
//!   Linux:   ~/.cache/aimusic-dataset/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Default root of the `.npy` tensor cache.
    pub tensor_cache_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "aimusic-dataset";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        Self {
            settings_file: config_dir.join("settings.toml"),
            config_dir,
            tensor_cache_dir: cache_dir.join("tensors"),
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
