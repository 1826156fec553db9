//! The external photo library seam.
//!
//! The engine never owns the photo library. Everything it knows comes from
//! queries through [`PhotoLibrary`], and the library may change underneath it
//! at any time. Implementations report those changes by sending
//! [`LibraryChange`] messages to registered observers.

pub mod fs;
pub mod memory;
pub mod resource;

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Mutex;
use thiserror::Error;

use crate::model::{AlbumId, MediaKind, PhotoId, PhotoRef};

pub use fs::FsLibrary;
pub use memory::MemoryLibrary;
pub use resource::{ResourceKey, ResourceValue};

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("photo library access not granted ({0:?})")]
    NotAuthorized(AuthorizationStatus),

    #[error("photo not found: {0}")]
    PhotoNotFound(PhotoId),

    #[error("collection not found: {0}")]
    CollectionNotFound(AlbumId),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("change request rejected: {0}")]
    ChangeRejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Access level granted to the photo library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthorizationStatus {
    NotDetermined,
    Restricted,
    Denied,
    Authorized,
    /// The user granted access to a subset of the library.
    Limited,
}

impl AuthorizationStatus {
    /// Whether library queries may be issued at all.
    pub fn allows_access(&self) -> bool {
        matches!(self, AuthorizationStatus::Authorized | AuthorizationStatus::Limited)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AuthorizationStatus::NotDetermined => "not determined",
            AuthorizationStatus::Restricted => "restricted",
            AuthorizationStatus::Denied => "denied",
            AuthorizationStatus::Authorized => "authorized",
            AuthorizationStatus::Limited => "limited",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    CreationDescending,
    CreationAscending,
}

/// Filter and ordering applied by the library itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchOptions {
    pub media_kind: Option<MediaKind>,
    pub sort: SortOrder,
    pub limit: Option<usize>,
}

impl FetchOptions {
    /// Still images only, newest first. The only shape the engine asks for.
    pub fn still_images() -> Self {
        Self {
            media_kind: Some(MediaKind::Image),
            sort: SortOrder::CreationDescending,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, photo: &PhotoRef) -> bool {
        self.media_kind.map_or(true, |kind| photo.media_kind == kind)
    }

    /// Filter, sort and truncate a candidate list in place.
    pub fn apply(&self, photos: &mut Vec<PhotoRef>) {
        photos.retain(|p| self.matches(p));
        // Undated photos sort last either way.
        match self.sort {
            SortOrder::CreationDescending => photos.sort_by(|a, b| b.created.cmp(&a.created)),
            SortOrder::CreationAscending => photos.sort_by(|a, b| match (a.created, b.created) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }),
        }
        if let Some(limit) = self.limit {
            photos.truncate(limit);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    /// Collections curated by the library (Recents, Favorites, Screenshots...).
    System,
    /// Albums created by the user.
    User,
}

/// A collection handle as reported by the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub id: AlbumId,
    pub title: Option<String>,
    pub kind: CollectionKind,
    /// Shared through the cloud rather than held exclusively on this device.
    pub cloud_shared: bool,
}

/// Notification that the library changed outside the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryChange {
    pub detected_at: DateTime<Utc>,
}

impl LibraryChange {
    pub fn now() -> Self {
        Self { detected_at: Utc::now() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ObserverId(COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

/// Change observers registered with a library.
///
/// Observers whose receiving end is gone are dropped on the next notify.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Mutex<HashMap<ObserverId, Sender<LibraryChange>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tx: Sender<LibraryChange>) -> ObserverId {
        let id = ObserverId::next();
        if let Ok(mut observers) = self.observers.lock() {
            observers.insert(id, tx);
        }
        id
    }

    pub fn unregister(&self, id: ObserverId) {
        if let Ok(mut observers) = self.observers.lock() {
            observers.remove(&id);
        }
    }

    pub fn notify(&self, change: &LibraryChange) {
        if let Ok(mut observers) = self.observers.lock() {
            observers.retain(|_, tx| tx.send(change.clone()).is_ok());
        }
    }

    pub fn len(&self) -> usize {
        self.observers.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Image request shapes the engine issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRequest {
    /// Longest edge, in pixels.
    pub target_size: u32,
    pub mode: DeliveryMode,
    /// Allow the library to download originals that are not on this device.
    pub allow_network: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Deliver a fast placeholder first, then better versions.
    Opportunistic,
    /// Only the final version matters to the caller.
    HighQuality,
}

/// Image data as handed over by the library: an encoded file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredImage {
    pub photo_id: PhotoId,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// One callback from the library for an image request.
#[derive(Debug)]
pub struct ImageFrame {
    pub result: Result<DeliveredImage, LibraryError>,
    /// A low-fidelity placeholder; a better frame may follow.
    pub degraded: bool,
}

/// The external photo library.
///
/// Implementations must tolerate concurrent use: rebuilds and image requests
/// run on background threads while the owner keeps querying.
pub trait PhotoLibrary: Send + Sync {
    fn authorization_status(&self) -> AuthorizationStatus;

    fn request_authorization(&self) -> AuthorizationStatus;

    /// Every asset matching `options`.
    fn fetch_all(&self, options: &FetchOptions) -> Result<Vec<PhotoRef>, LibraryError>;

    /// The subset of `ids` that still resolves. Unknown ids are silently absent.
    fn fetch_by_ids(&self, ids: &HashSet<PhotoId>) -> Result<Vec<PhotoRef>, LibraryError>;

    fn fetch_collections(&self, kind: CollectionKind) -> Result<Vec<Collection>, LibraryError>;

    fn fetch_in_collection(
        &self,
        collection: &AlbumId,
        options: &FetchOptions,
    ) -> Result<Vec<PhotoRef>, LibraryError>;

    /// Count-only query; must not be more expensive than `fetch_in_collection`.
    fn count_in_collection(
        &self,
        collection: &AlbumId,
        options: &FetchOptions,
    ) -> Result<usize, LibraryError>;

    /// Raw resource metadata; `None` when the value is unavailable.
    fn resource_value(&self, id: &PhotoId, key: ResourceKey) -> Option<ResourceValue>;

    /// Transactional change request for the favorite flag.
    fn set_favorite(&self, id: &PhotoId, favorite: bool) -> Result<(), LibraryError>;

    /// Hand photos over to the library's own deletion flow. Returns the ids
    /// actually removed; anything else is still in the library.
    fn delete_photos(&self, ids: &[PhotoId]) -> Result<Vec<PhotoId>, LibraryError>;

    fn register_change_observer(&self, tx: Sender<LibraryChange>) -> ObserverId;

    fn unregister_change_observer(&self, id: ObserverId);

    /// Start an image request. Frames are sent on `frames` from the shared
    /// rayon pool; dropping the sender ends the request.
    fn request_image(&self, id: &PhotoId, request: ImageRequest, frames: Sender<ImageFrame>);
}
