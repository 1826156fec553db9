//! In-memory photo library for tests and development.
//!
//! Every query is counted so callers can observe whether a cache served a
//! request or went to the library. Mutations made through the inherent
//! `insert_*`/`remove_*` methods are silent; call [`MemoryLibrary::notify_change`]
//! to simulate the library announcing them. Mutations made through the
//! [`PhotoLibrary`] trait notify observers like a real library would.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Mutex;

use super::{
    AuthorizationStatus, Collection, CollectionKind, DeliveredImage, DeliveryMode, FetchOptions,
    ImageFrame, ImageRequest, LibraryChange, LibraryError, ObserverId, ObserverRegistry,
    PhotoLibrary, ResourceKey, ResourceValue,
};
use crate::model::{AlbumId, PhotoId, PhotoRef};

/// One scripted callback for an image request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedFrame {
    Degraded,
    Final,
    Fail(String),
}

/// Snapshot of how many times each query ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryCounts {
    pub fetch_all: usize,
    pub fetch_by_ids: usize,
    pub fetch_collections: usize,
    pub fetch_in_collection: usize,
    pub count_in_collection: usize,
    pub image_requests: usize,
}

#[derive(Default)]
struct Counters {
    fetch_all: AtomicUsize,
    fetch_by_ids: AtomicUsize,
    fetch_collections: AtomicUsize,
    fetch_in_collection: AtomicUsize,
    count_in_collection: AtomicUsize,
    image_requests: AtomicUsize,
}

struct MemoryCollection {
    info: Collection,
    members: Vec<PhotoId>,
}

struct MemoryState {
    status: AuthorizationStatus,
    photos: BTreeMap<PhotoId, PhotoRef>,
    collections: Vec<MemoryCollection>,
    resources: HashMap<(PhotoId, ResourceKey), ResourceValue>,
    image_scripts: HashMap<PhotoId, Vec<ScriptedFrame>>,
    deleted: Vec<PhotoId>,
    undeletable: HashSet<PhotoId>,
}

pub struct MemoryLibrary {
    state: Mutex<MemoryState>,
    counters: Counters,
    observers: ObserverRegistry,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                status: AuthorizationStatus::Authorized,
                photos: BTreeMap::new(),
                collections: Vec::new(),
                resources: HashMap::new(),
                image_scripts: HashMap::new(),
                deleted: Vec::new(),
                undeletable: HashSet::new(),
            }),
            counters: Counters::default(),
            observers: ObserverRegistry::new(),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub fn set_authorization(&self, status: AuthorizationStatus) {
        self.with_state(|s| s.status = status);
    }

    pub fn insert_photo(&self, photo: PhotoRef) {
        self.with_state(|s| {
            s.photos.insert(photo.id.clone(), photo);
        });
    }

    pub fn remove_photo(&self, id: &PhotoId) -> bool {
        self.with_state(|s| s.photos.remove(id).is_some())
    }

    pub fn add_collection(
        &self,
        id: impl Into<AlbumId>,
        title: Option<&str>,
        kind: CollectionKind,
        cloud_shared: bool,
    ) -> AlbumId {
        let id = id.into();
        let info = Collection {
            id: id.clone(),
            title: title.map(str::to_string),
            kind,
            cloud_shared,
        };
        self.with_state(|s| {
            s.collections.push(MemoryCollection {
                info,
                members: Vec::new(),
            })
        });
        id
    }

    pub fn add_to_collection(&self, collection: &AlbumId, photo: &PhotoId) {
        self.with_state(|s| {
            if let Some(c) = s.collections.iter_mut().find(|c| &c.info.id == collection) {
                if !c.members.contains(photo) {
                    c.members.push(photo.clone());
                }
            }
        });
    }

    pub fn set_resource(&self, id: &PhotoId, key: ResourceKey, value: ResourceValue) {
        self.with_state(|s| {
            s.resources.insert((id.clone(), key), value);
        });
    }

    pub fn script_image(&self, id: &PhotoId, frames: Vec<ScriptedFrame>) {
        self.with_state(|s| {
            s.image_scripts.insert(id.clone(), frames);
        });
    }

    /// Make `delete_photos` leave this photo in place, as a library does when
    /// the user declines or the file is locked.
    pub fn refuse_deletion(&self, id: &PhotoId) {
        self.with_state(|s| {
            s.undeletable.insert(id.clone());
        });
    }

    /// Ids removed by `delete_photos`, in order.
    pub fn deleted(&self) -> Vec<PhotoId> {
        self.with_state(|s| s.deleted.clone())
    }

    pub fn photo(&self, id: &PhotoId) -> Option<PhotoRef> {
        self.with_state(|s| s.photos.get(id).cloned())
    }

    /// Announce a change to every registered observer.
    pub fn notify_change(&self) {
        self.observers.notify(&LibraryChange::now());
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn queries(&self) -> QueryCounts {
        QueryCounts {
            fetch_all: self.counters.fetch_all.load(Ordering::SeqCst),
            fetch_by_ids: self.counters.fetch_by_ids.load(Ordering::SeqCst),
            fetch_collections: self.counters.fetch_collections.load(Ordering::SeqCst),
            fetch_in_collection: self.counters.fetch_in_collection.load(Ordering::SeqCst),
            count_in_collection: self.counters.count_in_collection.load(Ordering::SeqCst),
            image_requests: self.counters.image_requests.load(Ordering::SeqCst),
        }
    }

    fn check_access(state: &MemoryState) -> Result<(), LibraryError> {
        if state.status.allows_access() {
            Ok(())
        } else {
            Err(LibraryError::NotAuthorized(state.status))
        }
    }

    fn collection_photos(
        &self,
        collection: &AlbumId,
        options: &FetchOptions,
    ) -> Result<Vec<PhotoRef>, LibraryError> {
        self.with_state(|s| {
            Self::check_access(s)?;
            let c = s
                .collections
                .iter()
                .find(|c| &c.info.id == collection)
                .ok_or_else(|| LibraryError::CollectionNotFound(collection.clone()))?;
            let mut photos: Vec<PhotoRef> = c
                .members
                .iter()
                .filter_map(|id| s.photos.get(id).cloned())
                .collect();
            options.apply(&mut photos);
            Ok(photos)
        })
    }
}

impl Default for MemoryLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl PhotoLibrary for MemoryLibrary {
    fn authorization_status(&self) -> AuthorizationStatus {
        self.with_state(|s| s.status)
    }

    fn request_authorization(&self) -> AuthorizationStatus {
        self.with_state(|s| {
            if s.status == AuthorizationStatus::NotDetermined {
                s.status = AuthorizationStatus::Authorized;
            }
            s.status
        })
    }

    fn fetch_all(&self, options: &FetchOptions) -> Result<Vec<PhotoRef>, LibraryError> {
        self.counters.fetch_all.fetch_add(1, Ordering::SeqCst);
        self.with_state(|s| {
            Self::check_access(s)?;
            let mut photos: Vec<PhotoRef> = s.photos.values().cloned().collect();
            options.apply(&mut photos);
            Ok(photos)
        })
    }

    fn fetch_by_ids(&self, ids: &HashSet<PhotoId>) -> Result<Vec<PhotoRef>, LibraryError> {
        self.counters.fetch_by_ids.fetch_add(1, Ordering::SeqCst);
        self.with_state(|s| {
            Self::check_access(s)?;
            let mut photos: Vec<PhotoRef> = ids.iter().filter_map(|id| s.photos.get(id).cloned()).collect();
            FetchOptions::default().apply(&mut photos);
            Ok(photos)
        })
    }

    fn fetch_collections(&self, kind: CollectionKind) -> Result<Vec<Collection>, LibraryError> {
        self.counters.fetch_collections.fetch_add(1, Ordering::SeqCst);
        self.with_state(|s| {
            Self::check_access(s)?;
            Ok(s.collections
                .iter()
                .filter(|c| c.info.kind == kind)
                .map(|c| c.info.clone())
                .collect())
        })
    }

    fn fetch_in_collection(
        &self,
        collection: &AlbumId,
        options: &FetchOptions,
    ) -> Result<Vec<PhotoRef>, LibraryError> {
        self.counters.fetch_in_collection.fetch_add(1, Ordering::SeqCst);
        self.collection_photos(collection, options)
    }

    fn count_in_collection(
        &self,
        collection: &AlbumId,
        options: &FetchOptions,
    ) -> Result<usize, LibraryError> {
        self.counters.count_in_collection.fetch_add(1, Ordering::SeqCst);
        self.collection_photos(collection, options).map(|p| p.len())
    }

    fn resource_value(&self, id: &PhotoId, key: ResourceKey) -> Option<ResourceValue> {
        self.with_state(|s| s.resources.get(&(id.clone(), key)).cloned())
    }

    fn set_favorite(&self, id: &PhotoId, favorite: bool) -> Result<(), LibraryError> {
        self.with_state(|s| {
            Self::check_access(s)?;
            let photo = s
                .photos
                .get_mut(id)
                .ok_or_else(|| LibraryError::PhotoNotFound(id.clone()))?;
            photo.is_favorite = favorite;
            Ok::<(), LibraryError>(())
        })?;
        self.notify_change();
        Ok(())
    }

    fn delete_photos(&self, ids: &[PhotoId]) -> Result<Vec<PhotoId>, LibraryError> {
        let removed = self.with_state(|s| {
            Self::check_access(s)?;
            let mut removed = Vec::new();
            for id in ids {
                if s.undeletable.contains(id) {
                    continue;
                }
                if s.photos.remove(id).is_some() {
                    s.deleted.push(id.clone());
                    removed.push(id.clone());
                }
            }
            Ok::<_, LibraryError>(removed)
        })?;
        if !removed.is_empty() {
            self.notify_change();
        }
        Ok(removed)
    }

    fn register_change_observer(&self, tx: Sender<LibraryChange>) -> ObserverId {
        self.observers.register(tx)
    }

    fn unregister_change_observer(&self, id: ObserverId) {
        self.observers.unregister(id);
    }

    fn request_image(&self, id: &PhotoId, request: ImageRequest, frames: Sender<ImageFrame>) {
        self.counters.image_requests.fetch_add(1, Ordering::SeqCst);
        let (exists, script) = self.with_state(|s| {
            let script = s
                .image_scripts
                .get(id)
                .cloned()
                .unwrap_or_else(|| vec![ScriptedFrame::Degraded, ScriptedFrame::Final]);
            (s.photos.contains_key(id), script)
        });
        let id = id.clone();

        rayon::spawn(move || {
            if !exists {
                let _ = frames.send(ImageFrame {
                    result: Err(LibraryError::PhotoNotFound(id)),
                    degraded: false,
                });
                return;
            }
            let quality = match request.mode {
                DeliveryMode::Opportunistic => "opportunistic",
                DeliveryMode::HighQuality => "high-quality",
            };
            for (n, frame) in script.into_iter().enumerate() {
                let make_image = |degraded: bool| {
                    let size = if degraded { request.target_size / 8 } else { request.target_size };
                    DeliveredImage {
                        photo_id: id.clone(),
                        path: PathBuf::from(format!("memory/{}/{}-{}.jpg", id, quality, n)),
                        width: size,
                        height: size,
                    }
                };
                let frame = match frame {
                    ScriptedFrame::Degraded => ImageFrame {
                        result: Ok(make_image(true)),
                        degraded: true,
                    },
                    ScriptedFrame::Final => ImageFrame {
                        result: Ok(make_image(false)),
                        degraded: false,
                    },
                    ScriptedFrame::Fail(message) => ImageFrame {
                        result: Err(LibraryError::Unavailable(message)),
                        degraded: false,
                    },
                };
                if frames.send(frame).is_err() {
                    return;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MediaKind;
    use chrono::NaiveDate;

    fn day(d: u32) -> Option<chrono::NaiveDateTime> {
        NaiveDate::from_ymd_opt(2024, 5, d).and_then(|d| d.and_hms_opt(9, 0, 0))
    }

    #[test]
    fn test_fetch_by_ids_returns_only_resolvable() {
        let lib = MemoryLibrary::new();
        lib.insert_photo(PhotoRef::new("a", day(1)));
        lib.insert_photo(PhotoRef::new("b", day(2)));

        let ids: HashSet<PhotoId> = ["a", "gone"].into_iter().map(PhotoId::from).collect();
        let found = lib.fetch_by_ids(&ids).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id.as_str(), "a");
        assert_eq!(lib.queries().fetch_by_ids, 1);
    }

    #[test]
    fn test_collection_counts_respect_filter() {
        let lib = MemoryLibrary::new();
        lib.insert_photo(PhotoRef::new("v", day(1)).with_kind(MediaKind::Video));
        let album = lib.add_collection("videos", Some("Videos"), CollectionKind::System, false);
        lib.add_to_collection(&album, &PhotoId::from("v"));

        let count = lib.count_in_collection(&album, &FetchOptions::still_images()).unwrap();
        assert_eq!(count, 0);
        let all = lib.count_in_collection(&album, &FetchOptions::default()).unwrap();
        assert_eq!(all, 1);
    }

    #[test]
    fn test_unauthorized_queries_fail() {
        let lib = MemoryLibrary::new();
        lib.set_authorization(AuthorizationStatus::Denied);
        assert!(matches!(
            lib.fetch_all(&FetchOptions::still_images()),
            Err(LibraryError::NotAuthorized(AuthorizationStatus::Denied))
        ));
    }

    #[test]
    fn test_trait_mutations_notify_observers() {
        let lib = MemoryLibrary::new();
        lib.insert_photo(PhotoRef::new("a", day(1)));
        let (tx, rx) = std::sync::mpsc::channel();
        lib.register_change_observer(tx);

        lib.set_favorite(&PhotoId::from("a"), true).unwrap();
        assert!(rx.try_recv().is_ok());
        assert!(lib.photo(&PhotoId::from("a")).unwrap().is_favorite);

        assert_eq!(lib.delete_photos(&[PhotoId::from("a")]).unwrap(), vec![PhotoId::from("a")]);
        assert!(rx.try_recv().is_ok());
        assert_eq!(lib.deleted(), vec![PhotoId::from("a")]);
    }

    #[test]
    fn test_refused_deletion_keeps_photo() {
        let lib = MemoryLibrary::new();
        lib.insert_photo(PhotoRef::new("a", day(1)));
        lib.insert_photo(PhotoRef::new("b", day(2)));
        lib.refuse_deletion(&PhotoId::from("a"));

        let removed = lib.delete_photos(&[PhotoId::from("a"), PhotoId::from("b")]).unwrap();
        assert_eq!(removed, vec![PhotoId::from("b")]);
        assert!(lib.photo(&PhotoId::from("a")).is_some());
    }
}
