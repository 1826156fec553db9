use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::TrashConfig;

/// Recoverable holding folder for photos deleted from a directory library.
pub struct TrashManager {
    config: TrashConfig,
}

impl TrashManager {
    pub fn new(config: TrashConfig) -> Self {
        Self { config }
    }

    /// Ensure the trash directory exists
    fn ensure_trash_dir(&self) -> Result<()> {
        if !self.config.path.exists() {
            fs::create_dir_all(&self.config.path)
                .context("Failed to create trash directory")?;
        }
        Ok(())
    }

    /// Generate a unique trash filename to avoid conflicts.
    /// Uses a global atomic counter to ensure uniqueness even when called
    /// from multiple threads within the same second.
    fn generate_trash_name(&self, original: &Path) -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let timestamp = Utc::now().timestamp();
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let original_name = original.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let extension = original.extension()
            .map(|s| format!(".{}", s.to_string_lossy()))
            .unwrap_or_default();

        let trash_name = format!("{}_{}_{}{}", original_name, timestamp, seq, extension);
        self.config.path.join(trash_name)
    }

    /// Move file to trash, returns new path
    pub fn move_to_trash(&self, path: &Path) -> Result<PathBuf> {
        self.ensure_trash_dir()?;

        let trash_path = self.generate_trash_name(path);

        // Try rename first (fastest, same filesystem)
        match fs::rename(path, &trash_path) {
            Ok(_) => Ok(trash_path),
            Err(_) => {
                // Fall back to copy + delete for cross-filesystem moves
                fs::copy(path, &trash_path)
                    .context("Failed to copy file to trash")?;
                fs::remove_file(path)
                    .context("Failed to remove original file after copying to trash")?;
                Ok(trash_path)
            }
        }
    }

    /// Get all files in trash directory
    pub fn list_trash_files(&self) -> Result<Vec<PathBuf>> {
        if !self.config.path.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.config.path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Get total trash size in bytes
    pub fn total_size(&self) -> Result<u64> {
        let mut total = 0u64;
        for path in self.list_trash_files()? {
            total += fs::metadata(&path)?.len();
        }
        Ok(total)
    }

    pub fn trash_path(&self) -> &Path {
        &self.config.path
    }
}
