//! JSON decision file.
//!
//! Current format:
//!
//! ```json
//! {"version":1,"decisions":{"<photo id>":{"state":"archived","decided_at":"2024-05-01T09:00:00Z"}}}
//! ```
//!
//! Files written before decisions carried timestamps hold two id lists,
//! `{"archived":[...],"trashed":[...]}`. They load with no `decided_at` and
//! are rewritten in the current format on the next save.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::StoreError;
use crate::model::{Decision, DecisionRecord, PhotoId};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoredDecision {
    state: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DecisionFile {
    version: u32,
    decisions: BTreeMap<PhotoId, StoredDecision>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LegacyDecisionFile {
    #[serde(default)]
    archived: Vec<PhotoId>,
    #[serde(default)]
    trashed: Vec<PhotoId>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AnyDecisionFile {
    Current(DecisionFile),
    Legacy(LegacyDecisionFile),
}

pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn location(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<DecisionRecord>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        if content.trim().is_empty() {
            warn!("Decision file {} is empty, starting fresh", self.path.display());
            return Ok(Vec::new());
        }

        let parsed: AnyDecisionFile =
            serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        match parsed {
            AnyDecisionFile::Current(file) => {
                if file.version > FORMAT_VERSION {
                    return Err(StoreError::UnsupportedVersion {
                        path: self.path.clone(),
                        version: file.version,
                    });
                }
                Ok(file
                    .decisions
                    .into_iter()
                    .map(|(photo_id, stored)| DecisionRecord {
                        photo_id,
                        decision: stored.state,
                        decided_at: stored.decided_at,
                    })
                    .collect())
            }
            AnyDecisionFile::Legacy(file) => {
                // Trashed wins if an id somehow sits in both lists.
                let mut merged: BTreeMap<PhotoId, Decision> = BTreeMap::new();
                for id in file.archived {
                    merged.insert(id, Decision::Archived);
                }
                for id in file.trashed {
                    merged.insert(id, Decision::Trashed);
                }
                Ok(merged
                    .into_iter()
                    .map(|(photo_id, decision)| DecisionRecord {
                        photo_id,
                        decision,
                        decided_at: None,
                    })
                    .collect())
            }
        }
    }

    /// Write the snapshot to a temp file next to the target, then rename over it.
    pub fn save(&self, records: &[DecisionRecord]) -> Result<(), StoreError> {
        let file = DecisionFile {
            version: FORMAT_VERSION,
            decisions: records
                .iter()
                .map(|r| {
                    (
                        r.photo_id.clone(),
                        StoredDecision {
                            state: r.decision,
                            decided_at: r.decided_at,
                        },
                    )
                })
                .collect(),
        };
        let content = serde_json::to_vec_pretty(&file)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let write_tmp = || -> std::io::Result<()> {
            let mut tmp = fs::File::create(&tmp_path)?;
            tmp.write_all(&content)?;
            tmp.sync_all()
        };
        if let Err(e) = write_tmp() {
            let _ = fs::remove_file(&tmp_path);
            return Err(StoreError::io(&tmp_path, e));
        }

        fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn record(id: &str, decision: Decision) -> DecisionRecord {
        DecisionRecord {
            photo_id: PhotoId::from(id),
            decision,
            decided_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).single(),
        }
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(&dir.path().join("decisions.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/decisions.json");
        let store = JsonStore::new(&path);

        let records = vec![record("a", Decision::Archived), record("b", Decision::Trashed)];
        store.save(&records).unwrap();

        let mut loaded = store.load().unwrap();
        loaded.sort_by(|x, y| x.photo_id.cmp(&y.photo_id));
        assert_eq!(loaded, records);
        assert!(!path.with_extension("json.tmp").exists());

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["decisions"]["b"]["state"], "trashed");
    }

    #[test]
    fn test_legacy_lists_load_without_timestamps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("decisions.json");
        fs::write(&path, r#"{"archived":["a","c"],"trashed":["b"]}"#).unwrap();

        let loaded = JsonStore::new(&path).load().unwrap();

        assert_eq!(loaded.len(), 3);
        let b = loaded.iter().find(|r| r.photo_id.as_str() == "b").unwrap();
        assert_eq!(b.decision, Decision::Trashed);
        assert!(loaded.iter().all(|r| r.decided_at.is_none()));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("decisions.json");
        fs::write(&path, "{not json").unwrap();

        let err = JsonStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_unknown_shape_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("decisions.json");
        fs::write(&path, r#"{"photos":{"a":"keep"}}"#).unwrap();

        assert!(matches!(
            JsonStore::new(&path).load(),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("decisions.json");
        fs::write(&path, r#"{"version":7,"decisions":{}}"#).unwrap();

        assert!(matches!(
            JsonStore::new(&path).load(),
            Err(StoreError::UnsupportedVersion { version: 7, .. })
        ));
    }

    #[test]
    fn test_save_into_unwritable_location_fails() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"file, not a directory").unwrap();

        let store = JsonStore::new(&blocker.join("decisions.json"));
        assert!(matches!(
            store.save(&[record("a", Decision::Archived)]),
            Err(StoreError::Io { .. })
        ));
    }
}
