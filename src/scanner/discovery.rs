use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::model::MediaKind;

/// A media file found under a library root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub kind: MediaKind,
}

/// Classify a file by extension. `None` for files the library ignores.
pub fn media_kind(path: &Path, image_extensions: &[String], video_extensions: &[String]) -> Option<MediaKind> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    if image_extensions.iter().any(|e| e.to_lowercase() == ext) {
        Some(MediaKind::Image)
    } else if video_extensions.iter().any(|e| e.to_lowercase() == ext) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// Recursively list media files under `directory`. Hidden entries are skipped.
pub fn discover_media(
    directory: &Path,
    image_extensions: &[String],
    video_extensions: &[String],
) -> Result<Vec<DiscoveredFile>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if entry.file_type().is_file() {
            if let Some(kind) = media_kind(path, image_extensions, video_extensions) {
                files.push(DiscoveredFile {
                    path: path.to_path_buf(),
                    kind,
                });
            }
        }
    }

    // Sort by path for consistent ordering
    files.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(files)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}
