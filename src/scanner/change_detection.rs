//! Change detection for a library root.
//!
//! Compares two fingerprints of the same directory tree and reports files
//! that appeared, changed or disappeared between them.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::SystemTime;

use super::discovery::DiscoveredFile;

/// Tolerance in seconds for timestamp comparison.
/// Some filesystems only have 1-2 second precision.
const TIMESTAMP_TOLERANCE_SECS: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub modified: Option<SystemTime>,
    pub size_bytes: u64,
}

/// Path to stamp, for every media file under a root.
pub type Fingerprint = BTreeMap<PathBuf, FileStamp>;

pub fn fingerprint(files: &[DiscoveredFile]) -> Fingerprint {
    files
        .iter()
        .filter_map(|f| {
            let meta = std::fs::metadata(&f.path).ok()?;
            Some((
                f.path.clone(),
                FileStamp {
                    modified: meta.modified().ok(),
                    size_bytes: meta.len(),
                },
            ))
        })
        .collect()
}

/// Result of comparing two fingerprints.
#[derive(Debug, Clone, Default)]
pub struct ChangeDetectionResult {
    /// Files present now but not before.
    pub new_files: Vec<PathBuf>,
    /// Files whose size changed or whose mtime moved past the tolerance.
    pub modified_files: Vec<PathBuf>,
    /// Files present before but gone now.
    pub removed_files: Vec<PathBuf>,
}

impl ChangeDetectionResult {
    /// Check if there are any changes detected.
    pub fn has_changes(&self) -> bool {
        !self.new_files.is_empty() || !self.modified_files.is_empty() || !self.removed_files.is_empty()
    }

    /// Total number of changes.
    pub fn total_count(&self) -> usize {
        self.new_files.len() + self.modified_files.len() + self.removed_files.len()
    }
}

pub fn detect_changes(previous: &Fingerprint, current: &Fingerprint) -> ChangeDetectionResult {
    let mut result = ChangeDetectionResult::default();

    for (path, stamp) in current {
        match previous.get(path) {
            None => result.new_files.push(path.clone()),
            Some(old) if is_modified(old, stamp) => result.modified_files.push(path.clone()),
            Some(_) => {}
        }
    }

    result.removed_files = previous
        .keys()
        .filter(|path| !current.contains_key(*path))
        .cloned()
        .collect();

    result
}

fn is_modified(old: &FileStamp, new: &FileStamp) -> bool {
    if old.size_bytes != new.size_bytes {
        return true;
    }
    match (old.modified, new.modified) {
        (Some(a), Some(b)) => {
            let diff = match b.duration_since(a) {
                Ok(d) => d,
                Err(e) => e.duration(),
            };
            diff.as_secs() > TIMESTAMP_TOLERANCE_SECS
        }
        (None, None) => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn stamp(secs: u64, size: u64) -> FileStamp {
        FileStamp {
            modified: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(secs)),
            size_bytes: size,
        }
    }

    #[test]
    fn test_change_detection_result() {
        let result = ChangeDetectionResult {
            new_files: vec![PathBuf::from("/test/a.jpg")],
            modified_files: vec![PathBuf::from("/test/b.jpg")],
            removed_files: vec![PathBuf::from("/test/c.jpg")],
        };

        assert!(result.has_changes());
        assert_eq!(result.total_count(), 3);
    }

    #[test]
    fn test_empty_result() {
        let result = ChangeDetectionResult::default();
        assert!(!result.has_changes());
        assert_eq!(result.total_count(), 0);
    }

    #[test]
    fn test_detect_changes() {
        let mut before = Fingerprint::new();
        before.insert(PathBuf::from("keep.jpg"), stamp(100, 10));
        before.insert(PathBuf::from("touched.jpg"), stamp(100, 10));
        before.insert(PathBuf::from("edited.jpg"), stamp(100, 10));
        before.insert(PathBuf::from("gone.jpg"), stamp(100, 10));

        let mut after = Fingerprint::new();
        after.insert(PathBuf::from("keep.jpg"), stamp(100, 10));
        after.insert(PathBuf::from("touched.jpg"), stamp(101, 10));
        after.insert(PathBuf::from("edited.jpg"), stamp(100, 11));
        after.insert(PathBuf::from("new.jpg"), stamp(200, 10));

        let result = detect_changes(&before, &after);
        assert_eq!(result.new_files, vec![PathBuf::from("new.jpg")]);
        assert_eq!(result.modified_files, vec![PathBuf::from("edited.jpg")]);
        assert_eq!(result.removed_files, vec![PathBuf::from("gone.jpg")]);
    }
}
