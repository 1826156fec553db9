//! Review progress figures for albums and the whole library.

use serde::Serialize;

use crate::decisions::DecisionStore;
use crate::index::LibraryIndex;
use crate::library::resource::{decode_file_size, format_bytes};
use crate::library::{PhotoLibrary, ResourceKey};
use crate::model::{Decision, PhotoId, PhotoRef};

/// Decisions made within one album.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlbumProgress {
    pub total: usize,
    pub archived: usize,
    pub trashed: usize,
}

impl AlbumProgress {
    pub fn from_photos<'a>(
        photos: impl IntoIterator<Item = &'a PhotoRef>,
        decisions: &DecisionStore,
    ) -> Self {
        let mut progress = AlbumProgress::default();
        for photo in photos {
            progress.total += 1;
            match decisions.decision(&photo.id) {
                Some(Decision::Archived) => progress.archived += 1,
                Some(Decision::Trashed) => progress.trashed += 1,
                None => {}
            }
        }
        progress
    }

    pub fn reviewed(&self) -> usize {
        self.archived + self.trashed
    }

    pub fn unreviewed(&self) -> usize {
        self.total - self.reviewed()
    }

    /// An album with nothing in it is never "done".
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.unreviewed() == 0
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.reviewed() as f64 * 100.0 / self.total as f64
        }
    }
}

/// Disk space held by a set of photos, as far as the library can tell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpaceEstimate {
    pub bytes: u64,
    /// Photos whose size could not be determined.
    pub unknown: usize,
}

impl SpaceEstimate {
    pub fn for_photos<'a>(
        library: &dyn PhotoLibrary,
        ids: impl IntoIterator<Item = &'a PhotoId>,
    ) -> Self {
        let mut estimate = SpaceEstimate::default();
        for id in ids {
            let value = library.resource_value(id, ResourceKey::FileSize);
            match decode_file_size(value.as_ref()) {
                Some(bytes) => estimate.bytes += bytes,
                None => estimate.unknown += 1,
            }
        }
        estimate
    }

    pub fn display(&self) -> String {
        if self.unknown > 0 {
            format!("{} (+{} of unknown size)", format_bytes(self.bytes), self.unknown)
        } else {
            format_bytes(self.bytes)
        }
    }
}

impl std::ops::Add for SpaceEstimate {
    type Output = SpaceEstimate;

    fn add(self, other: SpaceEstimate) -> SpaceEstimate {
        SpaceEstimate {
            bytes: self.bytes + other.bytes,
            unknown: self.unknown + other.unknown,
        }
    }
}

/// Dashboard figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LibraryStats {
    pub photos: usize,
    pub months: usize,
    pub system_albums: usize,
    pub user_albums: usize,
    pub archived: usize,
    pub trashed: usize,
    /// Library photos with no decision yet.
    pub unreviewed: usize,
    pub trash_space: SpaceEstimate,
}

impl LibraryStats {
    pub fn collect(index: &LibraryIndex, decisions: &DecisionStore, library: &dyn PhotoLibrary) -> Self {
        let counts = decisions.counts();
        let unreviewed = index
            .all_photos()
            .filter(|p| !decisions.is_reviewed(&p.id))
            .count();
        let trashed_ids = decisions.ids_with(Decision::Trashed);

        Self {
            photos: index.photo_count(),
            months: index.months.len(),
            system_albums: index.system.len(),
            user_albums: index.user.len(),
            archived: counts.archived,
            trashed: counts.trashed,
            unreviewed,
            trash_space: SpaceEstimate::for_photos(library, trashed_ids.iter()),
        }
    }

    pub fn reviewed_percent(&self) -> f64 {
        if self.photos == 0 {
            0.0
        } else {
            (self.photos - self.unreviewed) as f64 * 100.0 / self.photos as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DecisionBackend;
    use crate::index::rebuild_index;
    use crate::library::{MemoryLibrary, ResourceValue};
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn photo(id: &str, day: u32) -> PhotoRef {
        PhotoRef::new(id, NaiveDate::from_ymd_opt(2024, 6, day).and_then(|d| d.and_hms_opt(7, 0, 0)))
    }

    #[test]
    fn test_album_progress() {
        let dir = tempdir().unwrap();
        let mut decisions =
            DecisionStore::load(DecisionBackend::json(&dir.path().join("d.json"))).unwrap();
        decisions.decide(&PhotoId::from("a"), Decision::Archived).unwrap();
        decisions.decide(&PhotoId::from("b"), Decision::Trashed).unwrap();

        let photos = vec![photo("a", 1), photo("b", 2), photo("c", 3)];
        let progress = AlbumProgress::from_photos(&photos, &decisions);

        assert_eq!(progress.total, 3);
        assert_eq!(progress.reviewed(), 2);
        assert_eq!(progress.unreviewed(), 1);
        assert!(!progress.is_complete());
        assert!(!AlbumProgress::default().is_complete());
    }

    #[test]
    fn test_space_estimate_tolerates_odd_values() {
        let lib = MemoryLibrary::new();
        let ids: Vec<PhotoId> = ["a", "b", "c", "d"].into_iter().map(PhotoId::from).collect();
        lib.set_resource(&ids[0], ResourceKey::FileSize, ResourceValue::Signed(1000));
        lib.set_resource(&ids[1], ResourceKey::FileSize, ResourceValue::Text("24".to_string()));
        lib.set_resource(&ids[2], ResourceKey::FileSize, ResourceValue::Text("big".to_string()));

        let estimate = SpaceEstimate::for_photos(&lib, ids.iter());

        assert_eq!(estimate.bytes, 1024);
        assert_eq!(estimate.unknown, 2);
    }

    #[test]
    fn test_library_stats() {
        let dir = tempdir().unwrap();
        let lib = MemoryLibrary::new();
        lib.insert_photo(photo("a", 1));
        lib.insert_photo(photo("b", 2));
        lib.insert_photo(photo("c", 3));
        lib.set_resource(&PhotoId::from("b"), ResourceKey::FileSize, ResourceValue::Unsigned(2048));

        let mut decisions =
            DecisionStore::load(DecisionBackend::json(&dir.path().join("d.json"))).unwrap();
        decisions.decide(&PhotoId::from("a"), Decision::Archived).unwrap();
        decisions.decide(&PhotoId::from("b"), Decision::Trashed).unwrap();

        let index = rebuild_index(&lib).unwrap();
        let stats = LibraryStats::collect(&index, &decisions, &lib);

        assert_eq!(stats.photos, 3);
        assert_eq!(stats.months, 1);
        assert_eq!(stats.unreviewed, 1);
        assert_eq!(stats.trashed, 1);
        assert_eq!(stats.trash_space.bytes, 2048);
        assert_eq!(stats.trash_space.unknown, 0);
    }
}
