use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Creation time of a media file on the local wall clock.
///
/// Prefers EXIF `DateTimeOriginal`, then EXIF `DateTime`, then the file's
/// modification time. `None` when nothing usable is found.
pub fn creation_time(path: &Path) -> Option<NaiveDateTime> {
    exif_creation_time(path).or_else(|| modified_time(path))
}

fn exif_creation_time(path: &Path) -> Option<NaiveDateTime> {
    let file = File::open(path).ok()?;
    let mut bufreader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut bufreader).ok()?;

    [exif::Tag::DateTimeOriginal, exif::Tag::DateTime]
        .into_iter()
        .filter_map(|tag| exif.get_field(tag, exif::In::PRIMARY))
        .find_map(|field| match field.value {
            exif::Value::Ascii(ref v) => v.first().and_then(|raw| parse_exif_datetime(raw)),
            _ => None,
        })
}

fn parse_exif_datetime(raw: &[u8]) -> Option<NaiveDateTime> {
    let dt = exif::DateTime::from_ascii(raw).ok()?;
    NaiveDate::from_ymd_opt(dt.year as i32, dt.month as u32, dt.day as u32)?.and_hms_opt(
        dt.hour as u32,
        dt.minute as u32,
        dt.second as u32,
    )
}

fn modified_time(path: &Path) -> Option<NaiveDateTime> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let local: DateTime<Local> = modified.into();
    Some(local.naive_local())
}
