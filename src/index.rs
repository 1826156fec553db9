//! Library index: month buckets plus the system and user collections that
//! contain at least one still image.

use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;
use tracing::debug;

use crate::library::{Collection, CollectionKind, FetchOptions, LibraryError, PhotoLibrary};
use crate::model::{AlbumId, AlbumKind, AlbumRef, MonthAlbum, PhotoRef};

/// One point-in-time view of the library.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryIndex {
    /// Newest month first.
    pub months: Vec<MonthAlbum>,
    pub system: Vec<AlbumRef>,
    pub user: Vec<AlbumRef>,
}

impl LibraryIndex {
    pub fn is_empty(&self) -> bool {
        self.months.is_empty() && self.system.is_empty() && self.user.is_empty()
    }

    pub fn month(&self, id: &AlbumId) -> Option<&MonthAlbum> {
        self.months.iter().find(|m| m.id() == id)
    }

    /// Any album by id, whatever its kind.
    pub fn find(&self, id: &AlbumId) -> Option<&AlbumRef> {
        self.month(id)
            .map(|m| &m.album)
            .or_else(|| self.system.iter().find(|a| &a.id == id))
            .or_else(|| self.user.iter().find(|a| &a.id == id))
    }

    /// Every dated still image, newest first.
    pub fn all_photos(&self) -> impl Iterator<Item = &PhotoRef> {
        self.months.iter().flat_map(|m| m.photos.iter())
    }

    pub fn photo_count(&self) -> usize {
        self.months.iter().map(|m| m.photos.len()).sum()
    }
}

/// "January 2024".
pub fn month_title(month_start: NaiveDate) -> String {
    month_start.format("%B %Y").to_string()
}

/// Group photos into calendar-month buckets, newest month first.
///
/// Photos without a creation time are dropped. Within a bucket the input
/// order is kept, so callers pass photos newest first.
pub fn group_by_month(photos: Vec<PhotoRef>) -> Vec<MonthAlbum> {
    let mut buckets: HashMap<(i32, u32), Vec<PhotoRef>> = HashMap::new();
    let mut undated = 0usize;

    for photo in photos {
        let Some(created) = photo.created else {
            undated += 1;
            continue;
        };
        buckets
            .entry((created.year(), created.month()))
            .or_default()
            .push(photo);
    }

    if undated > 0 {
        debug!("{} photos without a creation date left out of month grouping", undated);
    }

    let mut months: Vec<MonthAlbum> = buckets
        .into_iter()
        .filter_map(|((year, month), photos)| {
            let month_start = NaiveDate::from_ymd_opt(year, month, 1)?;
            Some(MonthAlbum {
                album: AlbumRef {
                    id: AlbumId::month(year, month),
                    title: month_title(month_start),
                    kind: AlbumKind::TimeBucket,
                    photo_count: photos.len(),
                },
                month_start,
                photos,
            })
        })
        .collect();

    months.sort_by(|a, b| b.month_start.cmp(&a.month_start));
    months
}

/// Collections with at least one still image, as album references.
fn non_empty_albums(
    library: &dyn PhotoLibrary,
    collections: Vec<Collection>,
    kind: AlbumKind,
) -> Result<Vec<AlbumRef>, LibraryError> {
    let still_images = FetchOptions::still_images();
    let mut albums = Vec::new();

    for collection in collections {
        if kind == AlbumKind::UserAlbum && collection.cloud_shared {
            continue;
        }
        let count = library.count_in_collection(&collection.id, &still_images)?;
        if count == 0 {
            continue;
        }
        albums.push(AlbumRef {
            id: collection.id,
            title: collection.title.unwrap_or_else(|| "Untitled".to_string()),
            kind,
            photo_count: count,
        });
    }

    Ok(albums)
}

/// Query the library once and build a fresh index.
///
/// Without library access the index is empty; prompting for access is the
/// caller's business.
pub fn rebuild_index(library: &dyn PhotoLibrary) -> Result<LibraryIndex, LibraryError> {
    let status = library.authorization_status();
    if !status.allows_access() {
        debug!("Skipping index rebuild, library access is {}", status.display_name());
        return Ok(LibraryIndex::default());
    }

    let photos = library.fetch_all(&FetchOptions::still_images())?;
    let months = group_by_month(photos);

    let system = non_empty_albums(
        library,
        library.fetch_collections(CollectionKind::System)?,
        AlbumKind::SystemCollection,
    )?;
    let user = non_empty_albums(
        library,
        library.fetch_collections(CollectionKind::User)?,
        AlbumKind::UserAlbum,
    )?;

    Ok(LibraryIndex { months, system, user })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{AuthorizationStatus, MemoryLibrary};
    use crate::model::{MediaKind, PhotoId};
    use chrono::NaiveDateTime;

    fn at(y: i32, m: u32, d: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(y, m, d).and_then(|d| d.and_hms_opt(10, 30, 0))
    }

    #[test]
    fn test_month_bucketing() {
        let lib = MemoryLibrary::new();
        lib.insert_photo(PhotoRef::new("jan5", at(2024, 1, 5)));
        lib.insert_photo(PhotoRef::new("jan31", at(2024, 1, 31)));
        lib.insert_photo(PhotoRef::new("feb1", at(2024, 2, 1)));

        let index = rebuild_index(&lib).unwrap();

        assert_eq!(index.months.len(), 2);
        assert_eq!(index.months[0].id().as_str(), "2024-02");
        assert_eq!(index.months[0].photo_count(), 1);
        assert_eq!(index.months[1].id().as_str(), "2024-01");
        assert_eq!(index.months[1].photo_count(), 2);
        assert_eq!(index.months[1].title(), "January 2024");
        assert_eq!(index.months[1].photos[0].id.as_str(), "jan31");
        assert_eq!(index.months[1].month_start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }

    #[test]
    fn test_undated_and_non_image_assets_are_left_out() {
        let lib = MemoryLibrary::new();
        lib.insert_photo(PhotoRef::new("dated", at(2023, 12, 24)));
        lib.insert_photo(PhotoRef::new("undated", None));
        lib.insert_photo(PhotoRef::new("movie", at(2023, 11, 2)).with_kind(MediaKind::Video));

        let index = rebuild_index(&lib).unwrap();

        assert_eq!(index.months.len(), 1);
        assert_eq!(index.photo_count(), 1);
        assert_eq!(index.months[0].id().as_str(), "2023-12");
    }

    #[test]
    fn test_bucket_order_does_not_depend_on_enumeration_order() {
        let photos = vec![
            PhotoRef::new("old", at(2020, 6, 1)),
            PhotoRef::new("new", at(2024, 6, 1)),
            PhotoRef::new("mid", at(2022, 6, 1)),
        ];
        let months = group_by_month(photos);
        let ids: Vec<&str> = months.iter().map(|m| m.id().as_str()).collect();
        assert_eq!(ids, vec!["2024-06", "2022-06", "2020-06"]);
    }

    #[test]
    fn test_collections_without_still_images_are_excluded() {
        let lib = MemoryLibrary::new();
        lib.insert_photo(PhotoRef::new("p", at(2024, 3, 3)));
        lib.insert_photo(PhotoRef::new("v", at(2024, 3, 4)).with_kind(MediaKind::Video));

        let favorites = lib.add_collection("favorites", Some("Favorites"), CollectionKind::System, false);
        lib.add_to_collection(&favorites, &PhotoId::from("p"));
        let videos = lib.add_collection("videos", Some("Videos"), CollectionKind::System, false);
        lib.add_to_collection(&videos, &PhotoId::from("v"));
        lib.add_collection("empty", Some("Empty"), CollectionKind::User, false);
        let trip = lib.add_collection("trip", None, CollectionKind::User, false);
        lib.add_to_collection(&trip, &PhotoId::from("p"));

        let index = rebuild_index(&lib).unwrap();

        assert_eq!(index.system.len(), 1);
        assert_eq!(index.system[0].title, "Favorites");
        assert_eq!(index.user.len(), 1);
        assert_eq!(index.user[0].title, "Untitled");
        assert_eq!(index.user[0].photo_count, 1);
        assert!(index.find(&AlbumId::from("videos")).is_none());
    }

    #[test]
    fn test_cloud_shared_user_albums_are_excluded() {
        let lib = MemoryLibrary::new();
        lib.insert_photo(PhotoRef::new("p", at(2024, 3, 3)));
        let shared = lib.add_collection("shared", Some("Shared"), CollectionKind::User, true);
        lib.add_to_collection(&shared, &PhotoId::from("p"));

        let index = rebuild_index(&lib).unwrap();
        assert!(index.user.is_empty());
    }

    #[test]
    fn test_unauthorized_library_yields_empty_index() {
        let lib = MemoryLibrary::new();
        lib.insert_photo(PhotoRef::new("p", at(2024, 3, 3)));
        lib.set_authorization(AuthorizationStatus::Denied);

        let index = rebuild_index(&lib).unwrap();
        assert!(index.is_empty());
        assert_eq!(lib.queries().fetch_all, 0);
    }

    #[test]
    fn test_limited_access_still_indexes() {
        let lib = MemoryLibrary::new();
        lib.insert_photo(PhotoRef::new("p", at(2024, 3, 3)));
        lib.set_authorization(AuthorizationStatus::Limited);

        let index = rebuild_index(&lib).unwrap();
        assert_eq!(index.photo_count(), 1);
    }
}
