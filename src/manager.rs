//! The engine's single owner.
//!
//! `LibraryManager` holds the index snapshot, the album cache, the decision
//! store and the reconciliation controller. Everything that mutates them
//! goes through `&mut self`, and background results are only applied from
//! [`LibraryManager::poll`], so an index swap and the matching cache drop are
//! never observed separately.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::AlbumPhotoCache;
use crate::config::Config;
use crate::decisions::{DecisionStore, StoreError};
use crate::images::ImageDelivery;
use crate::index::{rebuild_index, LibraryIndex};
use crate::library::{AuthorizationStatus, LibraryError, PhotoLibrary};
use crate::model::{AlbumId, AlbumRef, Decision, MonthAlbum, PhotoId, PhotoRef, ReviewState};
use crate::reconcile::{resolve, ReconcileState, ReconciliationController, Rebuilt};
use crate::stats::{AlbumProgress, LibraryStats, SpaceEstimate};

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Grid thumbnail edge length.
    pub thumbnail_size: u32,
    pub high_quality_size: u32,
    /// Prune orphaned decisions after each rebuild.
    pub prune_on_change: bool,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            thumbnail_size: 320,
            high_quality_size: 2000,
            prune_on_change: true,
        }
    }
}

impl From<&Config> for ManagerOptions {
    fn from(config: &Config) -> Self {
        Self {
            thumbnail_size: config.thumbnails.size,
            high_quality_size: config.images.high_quality_size,
            prune_on_change: config.reconcile.prune_on_change,
        }
    }
}

/// What a `poll` applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    pub generation: u64,
    /// False when the rebuild failed and the previous index was kept.
    pub applied: bool,
    /// Orphaned decisions removed afterwards; `None` when pruning was skipped.
    pub pruned: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyTrashOutcome {
    /// Trashed photos the library still had.
    pub requested: usize,
    /// Photos the library accepted for deletion.
    pub deleted: usize,
    pub space: SpaceEstimate,
}

pub struct LibraryManager {
    library: Arc<dyn PhotoLibrary>,
    index: LibraryIndex,
    cache: AlbumPhotoCache,
    decisions: DecisionStore,
    controller: ReconciliationController,
    images: ImageDelivery,
    options: ManagerOptions,
}

impl LibraryManager {
    /// Build the first index inline and start listening for library changes.
    pub fn new(
        library: Arc<dyn PhotoLibrary>,
        decisions: DecisionStore,
        options: ManagerOptions,
    ) -> Self {
        let index = match rebuild_index(library.as_ref()) {
            Ok(index) => index,
            Err(e) => {
                warn!("Initial index build failed: {}", e);
                LibraryIndex::default()
            }
        };
        info!(
            "Indexed {} photos in {} months, {} system and {} user albums",
            index.photo_count(),
            index.months.len(),
            index.system.len(),
            index.user.len()
        );

        let mut controller = ReconciliationController::new(Arc::clone(&library));
        controller.subscribe();
        let images = ImageDelivery::new(
            Arc::clone(&library),
            options.thumbnail_size,
            options.high_quality_size,
        );

        Self {
            library,
            index,
            cache: AlbumPhotoCache::new(),
            decisions,
            controller,
            images,
            options,
        }
    }

    pub fn library(&self) -> &Arc<dyn PhotoLibrary> {
        &self.library
    }

    pub fn index(&self) -> &LibraryIndex {
        &self.index
    }

    pub fn decisions(&self) -> &DecisionStore {
        &self.decisions
    }

    pub fn images(&mut self) -> &mut ImageDelivery {
        &mut self.images
    }

    pub fn reconcile_state(&self) -> ReconcileState {
        self.controller.state()
    }

    // ========================================================================
    // Albums
    // ========================================================================

    pub fn month_albums(&self) -> &[MonthAlbum] {
        &self.index.months
    }

    pub fn system_albums(&self) -> &[AlbumRef] {
        &self.index.system
    }

    pub fn user_albums(&self) -> &[AlbumRef] {
        &self.index.user
    }

    pub fn find_album(&self, album_id: &AlbumId) -> Option<&AlbumRef> {
        self.index.find(album_id)
    }

    /// Still images of an album, newest first. Month buckets come from the
    /// index snapshot; collections go through the cache. Query failures are
    /// logged and read as an empty album.
    pub fn photos_for(&mut self, album_id: &AlbumId) -> Arc<Vec<PhotoRef>> {
        if let Some(month) = self.index.month(album_id) {
            return Arc::new(month.photos.clone());
        }
        match self.cache.photos_for(self.library.as_ref(), album_id) {
            Ok(photos) => photos,
            Err(e) => {
                warn!("Failed to list photos of {}: {}", album_id, e);
                Arc::new(Vec::new())
            }
        }
    }

    /// Photos of an album that have no decision yet.
    pub fn unreviewed_photos(&mut self, album_id: &AlbumId) -> Vec<PhotoRef> {
        let photos = self.photos_for(album_id);
        photos
            .iter()
            .filter(|p| !self.decisions.is_reviewed(&p.id))
            .cloned()
            .collect()
    }

    pub fn album_progress(&mut self, album_id: &AlbumId) -> AlbumProgress {
        let photos = self.photos_for(album_id);
        AlbumProgress::from_photos(photos.iter(), &self.decisions)
    }

    /// Every photo of a non-empty album has a decision.
    pub fn fully_reviewed(&mut self, album_id: &AlbumId) -> bool {
        self.album_progress(album_id).is_complete()
    }

    // ========================================================================
    // Decisions
    // ========================================================================

    pub fn is_reviewed(&self, photo_id: &PhotoId) -> bool {
        self.decisions.is_reviewed(photo_id)
    }

    pub fn state_of(&self, photo_id: &PhotoId) -> ReviewState {
        self.decisions.state_of(photo_id)
    }

    pub fn decide(&mut self, photo_id: &PhotoId, decision: Decision) -> Result<bool, StoreError> {
        self.decisions.decide(photo_id, decision)
    }

    pub fn clear(&mut self, photo_id: &PhotoId) -> Result<bool, StoreError> {
        self.decisions.clear(photo_id)
    }

    pub fn restore_all(&mut self, decision: Decision) -> Result<usize, StoreError> {
        let restored = self.decisions.restore_all(decision)?;
        info!("Restored {} {} photos", restored, decision);
        Ok(restored)
    }

    /// Return an album's photos in the given state to review.
    pub fn restore_album(
        &mut self,
        album_id: &AlbumId,
        decision: Decision,
    ) -> Result<usize, StoreError> {
        let photos = self.photos_for(album_id);
        let restored = self
            .decisions
            .restore_ids(photos.iter().map(|p| &p.id), decision)?;
        info!("Restored {} {} photos of {}", restored, decision, album_id);
        Ok(restored)
    }

    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.decisions.flush()
    }

    // ========================================================================
    // Library access and mutation
    // ========================================================================

    pub fn authorization_status(&self) -> AuthorizationStatus {
        self.library.authorization_status()
    }

    /// Ask for library access. Granting it schedules a rebuild.
    pub fn request_access(&mut self) -> AuthorizationStatus {
        let before = self.library.authorization_status();
        let status = self.library.request_authorization();
        if status.allows_access() && !before.allows_access() {
            info!("Library access granted ({})", status.display_name());
            self.controller.request_rebuild();
        }
        status
    }

    /// Flip a photo's favorite flag. Returns the new value.
    pub fn toggle_favorite(&mut self, photo_id: &PhotoId) -> Result<bool, LibraryError> {
        let ids: HashSet<PhotoId> = std::iter::once(photo_id.clone()).collect();
        let photo = self
            .library
            .fetch_by_ids(&ids)?
            .into_iter()
            .find(|p| &p.id == photo_id)
            .ok_or_else(|| LibraryError::PhotoNotFound(photo_id.clone()))?;

        let favorite = !photo.is_favorite;
        self.library.set_favorite(photo_id, favorite)?;
        debug!("{} favorite -> {}", photo_id, favorite);
        Ok(favorite)
    }

    /// Drop decisions for photos the library no longer has.
    ///
    /// Returns `None` without touching anything unless the library grants
    /// full access: a limited view cannot tell a deleted photo from a hidden
    /// one.
    pub fn reconcile_orphans(&mut self) -> Result<Option<usize>, ManagerError> {
        let status = self.library.authorization_status();
        if status != AuthorizationStatus::Authorized {
            info!("Skipping orphan pruning, library access is {}", status.display_name());
            return Ok(None);
        }

        let resolution = resolve(self.library.as_ref(), &self.decisions.ids())?;
        if !resolution.orphaned.is_empty() {
            debug!("Orphaned decisions: {:?}", resolution.orphaned);
        }
        let pruned = self.decisions.prune_orphans(&resolution.found)?;
        Ok(Some(pruned))
    }

    /// Hand every trashed photo to the library for deletion, then forget the
    /// decisions of photos that are gone. A photo the library kept stays in
    /// the Trash.
    pub fn empty_trash(&mut self) -> Result<EmptyTrashOutcome, ManagerError> {
        let trashed: HashSet<PhotoId> = self.decisions.ids_with(Decision::Trashed).into_iter().collect();
        let resolution = resolve(self.library.as_ref(), &trashed)?;

        let mut ids: Vec<PhotoId> = resolution.found.into_iter().collect();
        ids.sort();
        // Sizes must be read before the files disappear.
        let sizes: Vec<(PhotoId, SpaceEstimate)> = ids
            .iter()
            .map(|id| (id.clone(), SpaceEstimate::for_photos(self.library.as_ref(), [id])))
            .collect();

        let deleted = if ids.is_empty() {
            Vec::new()
        } else {
            self.library.delete_photos(&ids)?
        };
        let gone: HashSet<&PhotoId> = deleted.iter().collect();
        let space = sizes
            .iter()
            .filter(|(id, _)| gone.contains(id))
            .fold(SpaceEstimate::default(), |total, (_, size)| total + *size);

        if deleted.len() < ids.len() {
            warn!(
                "Library kept {} of {} trashed photos; they stay in the Trash",
                ids.len() - deleted.len(),
                ids.len()
            );
        }
        self.decisions.restore_ids(
            deleted.iter().chain(resolution.orphaned.iter()),
            Decision::Trashed,
        )?;

        info!(
            "Emptied trash: {} of {} photos deleted, {}",
            deleted.len(),
            ids.len(),
            space.display()
        );
        Ok(EmptyTrashOutcome {
            requested: ids.len(),
            deleted: deleted.len(),
            space,
        })
    }

    pub fn stats(&self) -> LibraryStats {
        LibraryStats::collect(&self.index, &self.decisions, self.library.as_ref())
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Rebuild the index as if the library had announced a change.
    pub fn refresh(&mut self) {
        self.controller.request_rebuild();
    }

    /// Apply a finished rebuild, if any. Never blocks.
    pub fn poll(&mut self) -> Option<RebuildReport> {
        let rebuilt = self.controller.poll()?;
        Some(self.apply(rebuilt))
    }

    /// Wait up to `timeout` for a running rebuild and apply it.
    pub fn poll_timeout(&mut self, timeout: Duration) -> Option<RebuildReport> {
        let rebuilt = self.controller.poll_timeout(timeout)?;
        Some(self.apply(rebuilt))
    }

    /// Apply rebuilds until none is running or queued.
    pub fn settle(&mut self, timeout: Duration) -> Vec<RebuildReport> {
        let mut reports = Vec::new();
        while self.controller.state() == ReconcileState::Rebuilding {
            match self.poll_timeout(timeout) {
                Some(report) => reports.push(report),
                None => break,
            }
        }
        reports
    }

    fn apply(&mut self, rebuilt: Rebuilt) -> RebuildReport {
        let index = match rebuilt.result {
            Ok(index) => index,
            Err(_) => {
                return RebuildReport {
                    generation: rebuilt.generation,
                    applied: false,
                    pruned: None,
                }
            }
        };

        self.index = index;
        self.cache.invalidate();

        let pruned = if self.options.prune_on_change {
            match self.reconcile_orphans() {
                Ok(pruned) => pruned,
                Err(e) => {
                    warn!("Orphan pruning failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        RebuildReport {
            generation: rebuilt.generation,
            applied: true,
            pruned,
        }
    }
}

impl Drop for LibraryManager {
    fn drop(&mut self) {
        if let Err(e) = self.decisions.flush() {
            warn!("Decisions not saved on shutdown: {}", e);
        }
    }
}
