pub mod change_detection;
pub mod discovery;
pub mod metadata;
pub mod thumbnails;

use anyhow::Result;
use chrono::NaiveDateTime;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use crate::config::LibraryConfig;
use crate::model::MediaKind;

pub use change_detection::{detect_changes, fingerprint, ChangeDetectionResult, Fingerprint};
pub use discovery::{discover_media, media_kind, DiscoveredFile};
pub use thumbnails::{Thumbnail, ThumbnailManager};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedMedia {
    pub path: PathBuf,
    pub kind: MediaKind,
    pub created: Option<NaiveDateTime>,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MemoKey {
    modified: Option<SystemTime>,
    size_bytes: u64,
}

/// Walks a directory tree and extracts creation times.
///
/// Reading EXIF is the expensive part of a scan, so creation times are
/// memoized per path and reused while the file's mtime and size are unchanged.
pub struct Scanner {
    image_extensions: Vec<String>,
    video_extensions: Vec<String>,
    memo: Mutex<HashMap<PathBuf, (MemoKey, Option<NaiveDateTime>)>>,
}

impl Scanner {
    pub fn new(config: &LibraryConfig) -> Self {
        Self {
            image_extensions: config.image_extensions.clone(),
            video_extensions: config.video_extensions.clone(),
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn media_kind(&self, path: &Path) -> Option<MediaKind> {
        media_kind(path, &self.image_extensions, &self.video_extensions)
    }

    pub fn discover(&self, directory: &Path) -> Result<Vec<DiscoveredFile>> {
        discover_media(directory, &self.image_extensions, &self.video_extensions)
    }

    /// Discover and scan every media file under `directory`. Memo entries
    /// under `directory` for files that no longer exist are dropped.
    pub fn scan_directory(&self, directory: &Path) -> Result<Vec<ScannedMedia>> {
        let files = self.discover(directory)?;
        self.forget_missing(directory, &files);
        Ok(self.scan_files(&files))
    }

    fn forget_missing(&self, directory: &Path, files: &[DiscoveredFile]) {
        let present: HashSet<&Path> = files.iter().map(|f| f.path.as_path()).collect();
        if let Ok(mut memo) = self.memo.lock() {
            memo.retain(|path, _| !path.starts_with(directory) || present.contains(path.as_path()));
        }
    }


    /// Scan a known list of files. Files that vanished meanwhile are skipped.
    pub fn scan_files(&self, files: &[DiscoveredFile]) -> Vec<ScannedMedia> {
        files
            .par_iter()
            .filter_map(|file| self.scan_single_file(file))
            .collect()
    }

    fn scan_single_file(&self, file: &DiscoveredFile) -> Option<ScannedMedia> {
        let file_metadata = std::fs::metadata(&file.path).ok()?;
        let key = MemoKey {
            modified: file_metadata.modified().ok(),
            size_bytes: file_metadata.len(),
        };

        let cached = self
            .memo
            .lock()
            .ok()
            .and_then(|memo| memo.get(&file.path).copied())
            .filter(|(memo_key, _)| *memo_key == key)
            .map(|(_, created)| created);

        let created = match cached {
            Some(created) => created,
            None => {
                let created = metadata::creation_time(&file.path);
                if let Ok(mut memo) = self.memo.lock() {
                    memo.insert(file.path.clone(), (key, created));
                }
                created
            }
        };

        Some(ScannedMedia {
            path: file.path.clone(),
            kind: file.kind,
            created,
            size_bytes: key.size_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn memo_len(scanner: &Scanner) -> usize {
        scanner.memo.lock().unwrap().len()
    }

    #[test]
    fn test_scan_directory_reports_kind_and_size() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"12345").unwrap();
        std::fs::write(dir.path().join("b.mp4"), b"1").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let scanner = Scanner::new(&LibraryConfig::default());
        let mut scanned = scanner.scan_directory(dir.path()).unwrap();
        scanned.sort_by(|a, b| a.path.cmp(&b.path));

        assert_eq!(scanned.len(), 2);
        assert_eq!(scanned[0].kind, MediaKind::Image);
        assert_eq!(scanned[0].size_bytes, 5);
        assert!(scanned[0].created.is_some());
        assert_eq!(scanned[1].kind, MediaKind::Video);
    }

    #[test]
    fn test_removed_files_leave_the_memo() {
        let dir = tempdir().unwrap();
        let album = dir.path().join("album");
        std::fs::create_dir(&album).unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"a").unwrap();
        std::fs::write(album.join("b.jpg"), b"b").unwrap();
        std::fs::write(album.join("c.jpg"), b"c").unwrap();

        let scanner = Scanner::new(&LibraryConfig::default());
        scanner.scan_directory(dir.path()).unwrap();
        assert_eq!(memo_len(&scanner), 3);

        std::fs::remove_file(album.join("c.jpg")).unwrap();
        scanner.scan_directory(&album).unwrap();
        assert_eq!(memo_len(&scanner), 2);

        std::fs::rename(dir.path().join("a.jpg"), dir.path().join("renamed.jpg")).unwrap();
        scanner.scan_directory(dir.path()).unwrap();
        assert_eq!(memo_len(&scanner), 2);
    }
}
