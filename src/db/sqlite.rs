//! SQLite decision store.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

use super::schema::{MIGRATIONS, SCHEMA};
use super::StoreError;
use crate::model::{Decision, DecisionRecord, PhotoId};

pub struct SqliteStore {
    pub(crate) conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let conn = Connection::open(path)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA)?;
        self.run_migrations();
        Ok(())
    }

    fn run_migrations(&self) {
        for migration in MIGRATIONS {
            let _ = self.conn.execute(migration, []);
        }
    }

    pub fn location(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<DecisionRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT photo_id, state, decided_at FROM decisions ORDER BY photo_id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(photo_id, state, decided_at)| {
                let decision = Decision::parse(&state).ok_or_else(|| StoreError::Corrupt {
                    path: self.path.clone(),
                    reason: format!("unknown state '{}' for {}", state, photo_id),
                })?;
                let decided_at = match decided_at {
                    Some(raw) => Some(
                        DateTime::parse_from_rfc3339(&raw)
                            .map_err(|e| StoreError::Corrupt {
                                path: self.path.clone(),
                                reason: format!("bad decided_at '{}' for {}: {}", raw, photo_id, e),
                            })?
                            .with_timezone(&Utc),
                    ),
                    None => None,
                };
                Ok(DecisionRecord {
                    photo_id: PhotoId::new(photo_id),
                    decision,
                    decided_at,
                })
            })
            .collect()
    }

    /// Replace every row in one transaction.
    pub fn save(&self, records: &[DecisionRecord]) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM decisions", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO decisions (photo_id, state, decided_at) VALUES (?, ?, ?)",
            )?;
            for record in records {
                stmt.execute(rusqlite::params![
                    record.photo_id.as_str(),
                    record.decision.as_str(),
                    record.decided_at.map(|dt| dt.to_rfc3339()),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn open(dir: &Path) -> SqliteStore {
        let store = SqliteStore::open(&dir.join("decisions.db")).unwrap();
        store.initialize().unwrap();
        store
    }

    #[test]
    fn test_save_replaces_snapshot() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());

        let first = vec![
            DecisionRecord {
                photo_id: PhotoId::from("a"),
                decision: Decision::Archived,
                decided_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).single(),
            },
            DecisionRecord {
                photo_id: PhotoId::from("b"),
                decision: Decision::Trashed,
                decided_at: None,
            },
        ];
        store.save(&first).unwrap();
        assert_eq!(store.load().unwrap(), first);

        store.save(&first[1..]).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].photo_id.as_str(), "b");
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let dir = tempdir().unwrap();
        {
            let store = open(dir.path());
            store
                .save(&[DecisionRecord {
                    photo_id: PhotoId::from("x"),
                    decision: Decision::Archived,
                    decided_at: None,
                }])
                .unwrap();
        }
        let store = open(dir.path());
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_state_is_corrupt() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        store
            .conn
            .execute(
                "INSERT INTO decisions (photo_id, state) VALUES ('a', 'maybe')",
                [],
            )
            .unwrap();

        assert!(matches!(store.load(), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_bad_timestamp_is_corrupt() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        store
            .conn
            .execute(
                "INSERT INTO decisions (photo_id, state, decided_at) VALUES ('a', 'archived', 'yesterday')",
                [],
            )
            .unwrap();

        assert!(matches!(store.load(), Err(StoreError::Corrupt { .. })));
    }
}
