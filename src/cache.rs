//! Per-album photo lists, kept until the next index rebuild.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::library::{FetchOptions, LibraryError, PhotoLibrary};
use crate::model::{AlbumId, PhotoRef};

/// Per-collection photo listings, fetched on first use.
///
/// Entries are never refreshed individually. The whole cache is dropped when
/// a rebuilt index is applied.
#[derive(Debug, Default)]
pub struct AlbumPhotoCache {
    entries: HashMap<AlbumId, Arc<Vec<PhotoRef>>>,
}

impl AlbumPhotoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Still images of a collection, newest first.
    pub fn photos_for(
        &mut self,
        library: &dyn PhotoLibrary,
        album_id: &AlbumId,
    ) -> Result<Arc<Vec<PhotoRef>>, LibraryError> {
        if let Some(photos) = self.entries.get(album_id) {
            return Ok(Arc::clone(photos));
        }

        let photos = Arc::new(library.fetch_in_collection(album_id, &FetchOptions::still_images())?);
        debug!("Cached {} photos for album {}", photos.len(), album_id);
        self.entries.insert(album_id.clone(), Arc::clone(&photos));
        Ok(photos)
    }

    pub fn invalidate(&mut self) {
        if !self.entries.is_empty() {
            debug!("Dropping {} cached album listings", self.entries.len());
        }
        self.entries.clear();
    }

    pub fn contains(&self, album_id: &AlbumId) -> bool {
        self.entries.contains_key(album_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
