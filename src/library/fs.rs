//! A photo library backed by a directory tree.
//!
//! Photo ids are paths relative to the library root, so they survive restarts
//! and renames of the root itself. Immediate sub-folders are user albums; a
//! symlinked sub-folder points outside the library and counts as shared. The
//! system collections are derived: Recents, Favorites, Screenshots, Videos.
//!
//! Nothing in the root is ever deleted. `delete_photos` moves files into the
//! configured trash folder, and favorite flags are stored outside the root.

use anyhow::Context;
use std::collections::{BTreeSet, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{
    AuthorizationStatus, Collection, CollectionKind, DeliveredImage, DeliveryMode, FetchOptions,
    ImageFrame, ImageRequest, LibraryChange, LibraryError, ObserverId, ObserverRegistry,
    PhotoLibrary, ResourceKey, ResourceValue,
};
use crate::config::Config;
use crate::model::{AlbumId, MediaKind, PhotoId, PhotoRef};
use crate::scanner::{self, DiscoveredFile, ScannedMedia, Scanner, ThumbnailManager};
use crate::trash::TrashManager;

const RECENTS: &str = "system:recents";
const FAVORITES: &str = "system:favorites";
const SCREENSHOTS: &str = "system:screenshots";
const VIDEOS: &str = "system:videos";
const ALBUM_PREFIX: &str = "album:";

const SYSTEM_COLLECTIONS: [(&str, &str); 4] = [
    (RECENTS, "Recents"),
    (FAVORITES, "Favorites"),
    (SCREENSHOTS, "Screenshots"),
    (VIDEOS, "Videos"),
];

pub struct FsLibrary {
    root: PathBuf,
    scanner: Scanner,
    thumbnails: Arc<ThumbnailManager>,
    degraded_size: u32,
    trash: TrashManager,
    favorites_path: PathBuf,
    favorites: Mutex<BTreeSet<PhotoId>>,
    observers: ObserverRegistry,
}

impl FsLibrary {
    pub fn open(config: &Config) -> anyhow::Result<Self> {
        let favorites_path = config.library.favorites_path.clone();
        let favorites = load_favorites(&favorites_path)?;

        Ok(Self {
            root: config.library.root.clone(),
            scanner: Scanner::new(&config.library),
            thumbnails: Arc::new(ThumbnailManager::new(&config.thumbnails)),
            degraded_size: config.thumbnails.degraded_size,
            trash: TrashManager::new(config.trash.clone()),
            favorites_path,
            favorites: Mutex::new(favorites),
            observers: ObserverRegistry::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn trash(&self) -> &TrashManager {
        &self.trash
    }

    /// Start polling the root for changes. Observers are notified whenever a
    /// fingerprint differs from the previous one. Dropping the watcher stops it.
    pub fn watch(self: &Arc<Self>, interval: Duration) -> LibraryWatcher {
        let stop = Arc::new(AtomicBool::new(false));
        let library = Arc::clone(self);
        let stop_flag = Arc::clone(&stop);

        let handle = thread::spawn(move || {
            let mut previous = library.fingerprint();
            info!("Watching {:?} every {:?}", library.root, interval);

            while sleep_unless_stopped(&stop_flag, interval) {
                let current = library.fingerprint();
                let changes = scanner::detect_changes(&previous, &current);
                if changes.has_changes() {
                    debug!(
                        "Library changed: {} new, {} modified, {} removed",
                        changes.new_files.len(),
                        changes.modified_files.len(),
                        changes.removed_files.len()
                    );
                    library.observers.notify(&LibraryChange::now());
                }
                previous = current;
            }
        });

        LibraryWatcher {
            stop,
            handle: Some(handle),
        }
    }

    fn fingerprint(&self) -> scanner::Fingerprint {
        match self.scanner.discover(&self.root) {
            Ok(files) => scanner::fingerprint(&files),
            Err(e) => {
                warn!("Failed to fingerprint {:?}: {}", self.root, e);
                scanner::Fingerprint::new()
            }
        }
    }

    fn check_access(&self) -> Result<(), LibraryError> {
        match self.authorization_status() {
            status if status.allows_access() => Ok(()),
            status => Err(LibraryError::NotAuthorized(status)),
        }
    }

    fn photo_id(&self, path: &Path) -> Option<PhotoId> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        Some(PhotoId::new(parts.join("/")))
    }

    /// Path of a photo id, refusing ids that would escape the root.
    fn resolve_path(&self, id: &str) -> Option<PathBuf> {
        let relative = Path::new(id);
        if id.is_empty() || !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return None;
        }
        Some(self.root.join(relative))
    }

    fn to_photo(&self, media: ScannedMedia, favorites: &BTreeSet<PhotoId>) -> Option<PhotoRef> {
        let id = self.photo_id(&media.path)?;
        let is_favorite = favorites.contains(&id);
        Some(
            PhotoRef::new(id, media.created)
                .with_kind(media.kind)
                .favorite(is_favorite),
        )
    }

    fn favorites_snapshot(&self) -> BTreeSet<PhotoId> {
        self.favorites.lock().map(|f| f.clone()).unwrap_or_default()
    }

    fn scan_dir(&self, dir: &Path) -> Result<Vec<PhotoRef>, LibraryError> {
        let scanned = self
            .scanner
            .scan_directory(dir)
            .map_err(|e| LibraryError::Unavailable(e.to_string()))?;
        let favorites = self.favorites_snapshot();
        Ok(scanned
            .into_iter()
            .filter_map(|m| self.to_photo(m, &favorites))
            .collect())
    }

    fn scan_ids<'a>(&self, ids: impl Iterator<Item = &'a PhotoId>) -> Vec<PhotoRef> {
        let files: Vec<DiscoveredFile> = ids
            .filter_map(|id| self.resolve_path(id.as_str()))
            .filter(|path| path.is_file())
            .filter_map(|path| {
                let kind = self.scanner.media_kind(&path)?;
                Some(DiscoveredFile { path, kind })
            })
            .collect();
        let favorites = self.favorites_snapshot();
        self.scanner
            .scan_files(&files)
            .into_iter()
            .filter_map(|m| self.to_photo(m, &favorites))
            .collect()
    }

    fn album_dirs(&self) -> Result<Vec<(String, bool)>, LibraryError> {
        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                dirs.push((name, false));
            } else if file_type.is_symlink() && entry.path().is_dir() {
                dirs.push((name, true));
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    fn collection_photos(&self, collection: &AlbumId) -> Result<Vec<PhotoRef>, LibraryError> {
        match collection.as_str() {
            RECENTS => self.scan_dir(&self.root),
            VIDEOS => Ok(self
                .scan_dir(&self.root)?
                .into_iter()
                .filter(|p| p.media_kind == MediaKind::Video)
                .collect()),
            FAVORITES => {
                let favorites = self.favorites_snapshot();
                Ok(self.scan_ids(favorites.iter()))
            }
            SCREENSHOTS => Ok(self
                .scan_dir(&self.root)?
                .into_iter()
                .filter(|p| is_screenshot(p.id.as_str()))
                .collect()),
            other => {
                let dir = other
                    .strip_prefix(ALBUM_PREFIX)
                    .and_then(|name| self.resolve_path(name))
                    .filter(|dir| dir.is_dir())
                    .ok_or_else(|| LibraryError::CollectionNotFound(collection.clone()))?;
                self.scan_dir(&dir)
            }
        }
    }

    fn save_favorites(&self, favorites: &BTreeSet<PhotoId>) -> Result<(), LibraryError> {
        if let Some(parent) = self.favorites_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(favorites)
            .map_err(|e| LibraryError::ChangeRejected(e.to_string()))?;
        let tmp = self.favorites_path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.favorites_path)?;
        Ok(())
    }
}

fn load_favorites(path: &Path) -> anyhow::Result<BTreeSet<PhotoId>> {
    if !path.exists() {
        return Ok(BTreeSet::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read favorites from {}", path.display()))?;
    match serde_json::from_str(&content) {
        Ok(favorites) => Ok(favorites),
        Err(e) => {
            warn!("Ignoring unreadable favorites file {:?}: {}", path, e);
            Ok(BTreeSet::new())
        }
    }
}

fn is_screenshot(id: &str) -> bool {
    let name = id.rsplit('/').next().unwrap_or(id).to_lowercase();
    name.starts_with("screenshot") || name.starts_with("screen shot")
}

/// Sleep for `interval` in short steps. Returns false once `stop` is set.
fn sleep_unless_stopped(stop: &AtomicBool, interval: Duration) -> bool {
    let deadline = Instant::now() + interval;
    while Instant::now() < deadline {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        thread::sleep(Duration::from_millis(50).min(interval));
    }
    !stop.load(Ordering::SeqCst)
}

/// Background poller started by [`FsLibrary::watch`].
pub struct LibraryWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl LibraryWatcher {
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LibraryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl PhotoLibrary for FsLibrary {
    fn authorization_status(&self) -> AuthorizationStatus {
        match std::fs::read_dir(&self.root) {
            Ok(_) => AuthorizationStatus::Authorized,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => AuthorizationStatus::Denied,
            Err(_) => AuthorizationStatus::Restricted,
        }
    }

    fn request_authorization(&self) -> AuthorizationStatus {
        self.authorization_status()
    }

    fn fetch_all(&self, options: &FetchOptions) -> Result<Vec<PhotoRef>, LibraryError> {
        self.check_access()?;
        let mut photos = self.scan_dir(&self.root)?;
        options.apply(&mut photos);
        Ok(photos)
    }

    fn fetch_by_ids(&self, ids: &HashSet<PhotoId>) -> Result<Vec<PhotoRef>, LibraryError> {
        self.check_access()?;
        let mut photos = self.scan_ids(ids.iter());
        FetchOptions::default().apply(&mut photos);
        Ok(photos)
    }

    fn fetch_collections(&self, kind: CollectionKind) -> Result<Vec<Collection>, LibraryError> {
        self.check_access()?;
        match kind {
            CollectionKind::System => Ok(SYSTEM_COLLECTIONS
                .iter()
                .map(|(id, title)| Collection {
                    id: AlbumId::new(*id),
                    title: Some(title.to_string()),
                    kind,
                    cloud_shared: false,
                })
                .collect()),
            CollectionKind::User => Ok(self
                .album_dirs()?
                .into_iter()
                .map(|(name, shared)| Collection {
                    id: AlbumId::new(format!("{}{}", ALBUM_PREFIX, name)),
                    title: Some(name),
                    kind,
                    cloud_shared: shared,
                })
                .collect()),
        }
    }

    fn fetch_in_collection(
        &self,
        collection: &AlbumId,
        options: &FetchOptions,
    ) -> Result<Vec<PhotoRef>, LibraryError> {
        self.check_access()?;
        let mut photos = self.collection_photos(collection)?;
        options.apply(&mut photos);
        Ok(photos)
    }

    fn count_in_collection(
        &self,
        collection: &AlbumId,
        options: &FetchOptions,
    ) -> Result<usize, LibraryError> {
        let counting = FetchOptions {
            limit: None,
            ..options.clone()
        };
        self.fetch_in_collection(collection, &counting).map(|p| p.len())
    }

    fn resource_value(&self, id: &PhotoId, key: ResourceKey) -> Option<ResourceValue> {
        let path = self.resolve_path(id.as_str())?;
        match key {
            ResourceKey::FileSize => std::fs::metadata(&path)
                .ok()
                .map(|m| ResourceValue::Unsigned(m.len())),
            ResourceKey::OriginalFilename => path
                .file_name()
                .map(|n| ResourceValue::Text(n.to_string_lossy().to_string())),
        }
    }

    fn set_favorite(&self, id: &PhotoId, favorite: bool) -> Result<(), LibraryError> {
        self.check_access()?;
        let exists = self.resolve_path(id.as_str()).map_or(false, |p| p.is_file());
        if !exists {
            return Err(LibraryError::PhotoNotFound(id.clone()));
        }

        {
            let mut favorites = self
                .favorites
                .lock()
                .map_err(|_| LibraryError::ChangeRejected("favorites lock poisoned".into()))?;
            let mut updated = favorites.clone();
            if favorite {
                updated.insert(id.clone());
            } else {
                updated.remove(id);
            }
            self.save_favorites(&updated)?;
            *favorites = updated;
        }

        self.observers.notify(&LibraryChange::now());
        Ok(())
    }

    fn delete_photos(&self, ids: &[PhotoId]) -> Result<Vec<PhotoId>, LibraryError> {
        self.check_access()?;
        let mut moved = Vec::new();
        for id in ids {
            let Some(path) = self.resolve_path(id.as_str()).filter(|p| p.is_file()) else {
                debug!("Skipping delete of unresolvable photo {}", id);
                continue;
            };
            match self.trash.move_to_trash(&path) {
                Ok(trash_path) => {
                    debug!("Moved {} to {:?}", id, trash_path);
                    moved.push(id.clone());
                }
                Err(e) => warn!("Failed to move {} to trash: {}", id, e),
            }
        }

        if !moved.is_empty() {
            let deleted: HashSet<&PhotoId> = moved.iter().collect();
            let remaining = self
                .favorites_snapshot()
                .into_iter()
                .filter(|id| !deleted.contains(id))
                .collect::<BTreeSet<_>>();
            if let Err(e) = self.save_favorites(&remaining) {
                warn!("Failed to update favorites after delete: {}", e);
            } else if let Ok(mut favorites) = self.favorites.lock() {
                *favorites = remaining;
            }
            self.observers.notify(&LibraryChange::now());
        }

        Ok(moved)
    }

    fn register_change_observer(&self, tx: Sender<LibraryChange>) -> ObserverId {
        self.observers.register(tx)
    }

    fn unregister_change_observer(&self, id: ObserverId) {
        self.observers.unregister(id);
    }

    fn request_image(&self, id: &PhotoId, request: ImageRequest, frames: Sender<ImageFrame>) {
        let path = self.resolve_path(id.as_str()).filter(|p| p.is_file());
        let thumbnails = Arc::clone(&self.thumbnails);
        let degraded_size = self.degraded_size.min(request.target_size);
        let id = id.clone();

        rayon::spawn(move || {
            let Some(path) = path else {
                let _ = frames.send(ImageFrame {
                    result: Err(LibraryError::PhotoNotFound(id)),
                    degraded: false,
                });
                return;
            };

            let deliver = |thumb: scanner::Thumbnail| DeliveredImage {
                photo_id: id.clone(),
                path: thumb.path,
                width: thumb.width,
                height: thumb.height,
            };

            let placeholder = match request.mode {
                DeliveryMode::Opportunistic => thumbnails.generate(&path, degraded_size).ok(),
                // Only reuse what is already rendered; never delay the real image.
                DeliveryMode::HighQuality => thumbnails.get_cached(&path, degraded_size),
            };
            if let Some(thumb) = placeholder {
                if frames
                    .send(ImageFrame {
                        result: Ok(deliver(thumb)),
                        degraded: true,
                    })
                    .is_err()
                {
                    return;
                }
            }

            let result = thumbnails
                .generate(&path, request.target_size)
                .map(deliver)
                .map_err(|e| LibraryError::Unavailable(e.to_string()));
            let _ = frames.send(ImageFrame {
                result,
                degraded: false,
            });
        });
    }
}
