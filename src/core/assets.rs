use crate::core::config::{AppConfig, ProjectPaths};
use std::path::{Path, PathBuf};

/// What a scanned file is used for in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Image,
}

impl MediaKind {
    /// The folder and extension set this kind draws from.
    fn pool<'a>(&self, paths: &'a ProjectPaths, config: &'a AppConfig) -> (&'a Path, &'a [String]) {
        match self {
            MediaKind::Audio => (&paths.music, &config.audio_extensions),
            MediaKind::Image => (&paths.images, &config.image_extensions),
        }
    }
}

/// Scan the asset pool of one media kind under the project layout.
pub fn scan_pool(kind: MediaKind, paths: &ProjectPaths, config: &AppConfig) -> Vec<PathBuf> {
    let (folder, extensions) = kind.pool(paths, config);
    scan_media_files(folder, extensions)
}

/// List the files in `folder` whose extension (case-insensitive, without the
/// dot) appears in `extensions`. Non-recursive. A missing or unreadable
/// folder degrades to an empty result; whether that is an error is the
/// caller's call.
pub fn scan_media_files(folder: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Cannot scan {}: {}", folder.display(), e);
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && matches_extension(path, extensions))
        .collect();

    if files.is_empty() {
        log::warn!("No supported files found in {}", folder.display());
    }

    // Name order keeps scans deterministic across platforms.
    files.sort();
    files
}

fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}
