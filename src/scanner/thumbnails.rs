use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ThumbnailConfig;

/// A rendered thumbnail on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Manages thumbnail generation and caching
pub struct ThumbnailManager {
    cache_dir: PathBuf,
}

impl ThumbnailManager {
    pub fn new(config: &ThumbnailConfig) -> Self {
        Self {
            cache_dir: config.path.clone(),
        }
    }

    /// Ensure cache directory exists
    fn ensure_cache_dir(&self) -> Result<()> {
        if !self.cache_dir.exists() {
            fs::create_dir_all(&self.cache_dir)?;
        }
        Ok(())
    }

    /// Cache filename for an original at a given size.
    /// The modification time is part of the key so edited originals re-render.
    fn cache_path(&self, original: &Path, size: u32) -> PathBuf {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        original.to_string_lossy().hash(&mut hasher);
        if let Ok(modified) = fs::metadata(original).and_then(|m| m.modified()) {
            modified.hash(&mut hasher);
        }
        let hash = hasher.finish();

        self.cache_dir.join(format!("{:016x}_{}.jpg", hash, size))
    }

    /// Get the cached thumbnail if one exists at this size
    pub fn get_cached(&self, original: &Path, size: u32) -> Option<Thumbnail> {
        let cache_path = self.cache_path(original, size);
        if !cache_path.exists() {
            return None;
        }
        let (width, height) = image::image_dimensions(&cache_path).ok()?;
        Some(Thumbnail {
            path: cache_path,
            width,
            height,
        })
    }

    /// Generate and cache a thumbnail whose longest edge is at most `size`
    pub fn generate(&self, original: &Path, size: u32) -> Result<Thumbnail> {
        if let Some(cached) = self.get_cached(original, size) {
            return Ok(cached);
        }

        self.ensure_cache_dir()?;
        let cache_path = self.cache_path(original, size);

        let img = image::open(original)?;
        let thumbnail = img.thumbnail(size, size).to_rgb8();

        // Save as JPEG (smaller file size, fast to load)
        thumbnail.save(&cache_path)?;

        Ok(Thumbnail {
            path: cache_path,
            width: thumbnail.width(),
            height: thumbnail.height(),
        })
    }

    /// Get cache directory path
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_generate_caches_by_size() {
        let dir = tempdir().unwrap();
        let original = dir.path().join("red.png");
        image::RgbImage::from_pixel(400, 200, image::Rgb([200, 10, 10]))
            .save(&original)
            .unwrap();

        let manager = ThumbnailManager::new(&ThumbnailConfig {
            path: dir.path().join("thumbs"),
            size: 100,
            degraded_size: 16,
        });

        let thumb = manager.generate(&original, 100).unwrap();
        assert_eq!((thumb.width, thumb.height), (100, 50));
        assert!(manager.get_cached(&original, 100).is_some());
        assert!(manager.get_cached(&original, 16).is_none());
        assert!(thumb.path.starts_with(manager.cache_dir()));
    }
}
