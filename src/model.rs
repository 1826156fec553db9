//! Identifiers and metadata for photos, albums and review decisions.
//!
//! Everything here is plain data. `PhotoRef` and `AlbumRef` are query results
//! recreated on every index rebuild; only their ids are stable.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Stable, opaque identifier of a photo in the external library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoId(String);

impl PhotoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhotoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for PhotoId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PhotoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PhotoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of an album. Time buckets use a synthesized `YYYY-MM` key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlbumId(String);

impl AlbumId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Key of the time bucket for a given calendar month.
    pub fn month(year: i32, month: u32) -> Self {
        Self(format!("{}-{:02}", year, month))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlbumId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for AlbumId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AlbumId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Unknown,
}

/// A photo in the external library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRef {
    pub id: PhotoId,
    /// Creation time on the library's local wall clock.
    pub created: Option<NaiveDateTime>,
    pub media_kind: MediaKind,
    pub is_favorite: bool,
}

impl PhotoRef {
    pub fn new(id: impl Into<PhotoId>, created: Option<NaiveDateTime>) -> Self {
        Self {
            id: id.into(),
            created,
            media_kind: MediaKind::Image,
            is_favorite: false,
        }
    }

    pub fn with_kind(mut self, kind: MediaKind) -> Self {
        self.media_kind = kind;
        self
    }

    pub fn favorite(mut self, is_favorite: bool) -> Self {
        self.is_favorite = is_favorite;
        self
    }

    pub fn is_still_image(&self) -> bool {
        self.media_kind == MediaKind::Image
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumKind {
    TimeBucket,
    SystemCollection,
    UserAlbum,
}

impl AlbumKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            AlbumKind::TimeBucket => "Month",
            AlbumKind::SystemCollection => "Media",
            AlbumKind::UserAlbum => "Album",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumRef {
    pub id: AlbumId,
    pub title: String,
    pub kind: AlbumKind,
    /// Still-image count at the time the index was built.
    pub photo_count: usize,
}

/// A synthesized time bucket: every still image created in one calendar month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthAlbum {
    pub album: AlbumRef,
    /// First day of the month; the bucket's sort key.
    pub month_start: NaiveDate,
    /// Newest first.
    pub photos: Vec<PhotoRef>,
}

impl MonthAlbum {
    pub fn id(&self) -> &AlbumId {
        &self.album.id
    }

    pub fn title(&self) -> &str {
        &self.album.title
    }

    pub fn cover_photo(&self) -> Option<&PhotoRef> {
        self.photos.first()
    }

    pub fn photo_count(&self) -> usize {
        self.photos.len()
    }
}

/// A review decision. The absence of a decision means the photo is unreviewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Kept: the photo sits in the Archive.
    Archived,
    /// Marked for deletion: the photo sits in the Trash.
    Trashed,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Archived => "archived",
            Decision::Trashed => "trashed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "archived" | "archive" | "keep" | "kept" => Some(Decision::Archived),
            "trashed" | "trash" | "delete" | "deleted" => Some(Decision::Trashed),
            _ => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReviewState {
    Unreviewed,
    Archived,
    Trashed,
}

impl From<Option<Decision>> for ReviewState {
    fn from(decision: Option<Decision>) -> Self {
        match decision {
            None => ReviewState::Unreviewed,
            Some(Decision::Archived) => ReviewState::Archived,
            Some(Decision::Trashed) => ReviewState::Trashed,
        }
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReviewState::Unreviewed => "unreviewed",
            ReviewState::Archived => "archived",
            ReviewState::Trashed => "trashed",
        };
        f.write_str(s)
    }
}

/// One persisted review decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionRecord {
    pub photo_id: PhotoId,
    pub decision: Decision,
    /// `None` for records imported from files that predate timestamps.
    pub decided_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_album_id_is_zero_padded() {
        assert_eq!(AlbumId::month(2024, 1).as_str(), "2024-01");
        assert_eq!(AlbumId::month(1999, 12).as_str(), "1999-12");
    }

    #[test]
    fn test_decision_parse_accepts_user_words() {
        assert_eq!(Decision::parse("keep"), Some(Decision::Archived));
        assert_eq!(Decision::parse("Trash"), Some(Decision::Trashed));
        assert_eq!(Decision::parse("maybe"), None);
    }

    #[test]
    fn test_review_state_from_decision() {
        assert_eq!(ReviewState::from(None), ReviewState::Unreviewed);
        assert_eq!(ReviewState::from(Some(Decision::Trashed)), ReviewState::Trashed);
    }
}
