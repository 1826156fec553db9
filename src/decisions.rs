//! Review decisions keyed by photo id.
//!
//! The in-memory map is the authority. Every mutation writes the full
//! snapshot to the backend. When a write fails the error is returned, the
//! change stays applied in memory and the store is marked dirty; the next
//! successful write (any later mutation, or [`DecisionStore::flush`]) brings
//! the durable copy back in line.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::db::DecisionBackend;
pub use crate::db::StoreError;
use crate::model::{Decision, DecisionRecord, PhotoId, ReviewState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    decision: Decision,
    decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecisionCounts {
    pub archived: usize,
    pub trashed: usize,
}

impl DecisionCounts {
    pub fn total(&self) -> usize {
        self.archived + self.trashed
    }
}

pub struct DecisionStore {
    entries: HashMap<PhotoId, Entry>,
    backend: DecisionBackend,
    dirty: bool,
}

impl DecisionStore {
    /// Load every persisted decision. A file that exists but cannot be read
    /// is an error; callers must not continue with an empty store.
    pub fn load(backend: DecisionBackend) -> Result<Self, StoreError> {
        let records = backend.load()?;
        let entries = records
            .into_iter()
            .map(|r| {
                (
                    r.photo_id,
                    Entry {
                        decision: r.decision,
                        decided_at: r.decided_at,
                    },
                )
            })
            .collect::<HashMap<_, _>>();

        info!(
            "Loaded {} decisions from {}",
            entries.len(),
            backend.location().display()
        );

        Ok(Self {
            entries,
            backend,
            dirty: false,
        })
    }

    pub fn backend(&self) -> &DecisionBackend {
        &self.backend
    }

    /// Record a decision, overwriting any earlier one. Returns whether the
    /// state changed; re-deciding the current state touches nothing.
    pub fn decide(&mut self, photo_id: &PhotoId, decision: Decision) -> Result<bool, StoreError> {
        if self.decision(photo_id) == Some(decision) {
            return Ok(false);
        }
        self.entries.insert(
            photo_id.clone(),
            Entry {
                decision,
                decided_at: Some(Utc::now()),
            },
        );
        debug!("{} -> {}", photo_id, decision);
        self.persist()?;
        Ok(true)
    }

    /// Forget the decision for a photo. Returns whether one existed.
    pub fn clear(&mut self, photo_id: &PhotoId) -> Result<bool, StoreError> {
        if self.entries.remove(photo_id).is_none() {
            return Ok(false);
        }
        debug!("{} -> unreviewed", photo_id);
        self.persist()?;
        Ok(true)
    }

    pub fn decision(&self, photo_id: &PhotoId) -> Option<Decision> {
        self.entries.get(photo_id).map(|e| e.decision)
    }

    pub fn is_reviewed(&self, photo_id: &PhotoId) -> bool {
        self.entries.contains_key(photo_id)
    }

    pub fn state_of(&self, photo_id: &PhotoId) -> ReviewState {
        ReviewState::from(self.decision(photo_id))
    }

    /// Clear every record in the given state.
    pub fn restore_all(&mut self, decision: Decision) -> Result<usize, StoreError> {
        self.remove_where(|_, entry| entry.decision == decision)
    }

    /// Clear records in the given state among `ids`.
    pub fn restore_ids<'a>(
        &mut self,
        ids: impl IntoIterator<Item = &'a PhotoId>,
        decision: Decision,
    ) -> Result<usize, StoreError> {
        let ids: HashSet<&PhotoId> = ids.into_iter().collect();
        self.remove_where(|id, entry| entry.decision == decision && ids.contains(id))
    }

    /// Drop every record whose photo is not in `resolved`.
    pub fn prune_orphans(&mut self, resolved: &HashSet<PhotoId>) -> Result<usize, StoreError> {
        let removed = self.remove_where(|id, _| !resolved.contains(id))?;
        if removed > 0 {
            info!("Pruned {} orphaned decisions", removed);
        }
        Ok(removed)
    }

    fn remove_where(
        &mut self,
        mut doomed: impl FnMut(&PhotoId, &Entry) -> bool,
    ) -> Result<usize, StoreError> {
        let before = self.entries.len();
        self.entries.retain(|id, entry| !doomed(id, &*entry));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Ids in the given state, sorted.
    pub fn ids_with(&self, decision: Decision) -> Vec<PhotoId> {
        let mut ids: Vec<PhotoId> = self
            .entries
            .iter()
            .filter(|(_, e)| e.decision == decision)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn ids(&self) -> HashSet<PhotoId> {
        self.entries.keys().cloned().collect()
    }

    /// Snapshot of every record, sorted by photo id.
    pub fn records(&self) -> Vec<DecisionRecord> {
        let mut records: Vec<DecisionRecord> = self
            .entries
            .iter()
            .map(|(id, e)| DecisionRecord {
                photo_id: id.clone(),
                decision: e.decision,
                decided_at: e.decided_at,
            })
            .collect();
        records.sort_by(|a, b| a.photo_id.cmp(&b.photo_id));
        records
    }

    pub fn counts(&self) -> DecisionCounts {
        let mut counts = DecisionCounts::default();
        for entry in self.entries.values() {
            match entry.decision {
                Decision::Archived => counts.archived += 1,
                Decision::Trashed => counts.trashed += 1,
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The durable copy lags behind memory.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write the snapshot if an earlier write failed.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if self.dirty {
            self.persist()?;
        }
        Ok(())
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        self.dirty = true;
        match self.backend.save(&self.records()) {
            Ok(()) => {
                self.dirty = false;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to save decisions: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn json_store(dir: &std::path::Path) -> DecisionStore {
        DecisionStore::load(DecisionBackend::json(&dir.join("decisions.json"))).unwrap()
    }

    fn id(s: &str) -> PhotoId {
        PhotoId::from(s)
    }

    #[test]
    fn test_decide_then_state_of() {
        let dir = tempdir().unwrap();
        let mut store = json_store(dir.path());

        assert_eq!(store.state_of(&id("a")), ReviewState::Unreviewed);
        assert!(store.decide(&id("a"), Decision::Archived).unwrap());
        assert_eq!(store.state_of(&id("a")), ReviewState::Archived);
        assert!(store.is_reviewed(&id("a")));

        assert!(store.decide(&id("a"), Decision::Trashed).unwrap());
        assert_eq!(store.state_of(&id("a")), ReviewState::Trashed);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_deciding_twice_equals_once() {
        let dir = tempdir().unwrap();
        let mut store = json_store(dir.path());

        store.decide(&id("a"), Decision::Archived).unwrap();
        let first = store.records();
        assert!(!store.decide(&id("a"), Decision::Archived).unwrap());
        assert_eq!(store.records(), first);
    }

    #[test]
    fn test_clear_unknown_is_noop() {
        let dir = tempdir().unwrap();
        let mut store = json_store(dir.path());

        assert!(!store.clear(&id("nobody")).unwrap());
        assert!(store.is_empty());
        assert!(!dir.path().join("decisions.json").exists());
    }

    #[test]
    fn test_reload_reproduces_mapping() {
        let dir = tempdir().unwrap();
        {
            let mut store = json_store(dir.path());
            store.decide(&id("a"), Decision::Archived).unwrap();
            store.decide(&id("b"), Decision::Trashed).unwrap();
            store.decide(&id("c"), Decision::Archived).unwrap();
            store.clear(&id("c")).unwrap();
        }
        let store = json_store(dir.path());
        assert_eq!(store.state_of(&id("a")), ReviewState::Archived);
        assert_eq!(store.state_of(&id("b")), ReviewState::Trashed);
        assert_eq!(store.state_of(&id("c")), ReviewState::Unreviewed);
        assert!(store.records().iter().all(|r| r.decided_at.is_some()));
    }

    #[test]
    fn test_reload_sqlite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("decisions.db");
        {
            let mut store = DecisionStore::load(DecisionBackend::sqlite(&path).unwrap()).unwrap();
            store.decide(&id("a"), Decision::Trashed).unwrap();
        }
        let store = DecisionStore::load(DecisionBackend::sqlite(&path).unwrap()).unwrap();
        assert_eq!(store.state_of(&id("a")), ReviewState::Trashed);
    }

    #[test]
    fn test_restore_all_trashed_keeps_archived() {
        let dir = tempdir().unwrap();
        let mut store = json_store(dir.path());
        store.decide(&id("a"), Decision::Archived).unwrap();
        store.decide(&id("b"), Decision::Trashed).unwrap();
        store.decide(&id("c"), Decision::Trashed).unwrap();

        assert_eq!(store.restore_all(Decision::Trashed).unwrap(), 2);
        assert_eq!(store.ids_with(Decision::Archived), vec![id("a")]);
        assert!(store.ids_with(Decision::Trashed).is_empty());
    }

    #[test]
    fn test_restore_ids_only_touches_matching_state() {
        let dir = tempdir().unwrap();
        let mut store = json_store(dir.path());
        store.decide(&id("a"), Decision::Archived).unwrap();
        store.decide(&id("b"), Decision::Trashed).unwrap();
        store.decide(&id("c"), Decision::Archived).unwrap();

        let album = [id("a"), id("b")];
        assert_eq!(store.restore_ids(album.iter(), Decision::Archived).unwrap(), 1);
        assert_eq!(store.state_of(&id("a")), ReviewState::Unreviewed);
        assert_eq!(store.state_of(&id("b")), ReviewState::Trashed);
        assert_eq!(store.state_of(&id("c")), ReviewState::Archived);
    }

    #[test]
    fn test_prune_orphans_keeps_intersection() {
        let dir = tempdir().unwrap();
        let mut store = json_store(dir.path());
        for name in ["a", "b", "c", "d"] {
            store.decide(&id(name), Decision::Archived).unwrap();
        }

        // Library holds b, d and an undecided e.
        let live: HashSet<PhotoId> = ["b", "d", "e"].into_iter().map(id).collect();
        let decided = store.ids();
        let resolved: HashSet<PhotoId> = decided.intersection(&live).cloned().collect();

        assert_eq!(store.prune_orphans(&resolved).unwrap(), 2);
        let expected: HashSet<PhotoId> = ["b", "d"].into_iter().map(id).collect();
        assert_eq!(store.ids(), expected);
    }

    #[test]
    fn test_counts() {
        let dir = tempdir().unwrap();
        let mut store = json_store(dir.path());
        store.decide(&id("a"), Decision::Archived).unwrap();
        store.decide(&id("b"), Decision::Trashed).unwrap();
        store.decide(&id("c"), Decision::Trashed).unwrap();

        let counts = store.counts();
        assert_eq!(counts.archived, 1);
        assert_eq!(counts.trashed, 2);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_failed_write_keeps_memory_and_recovers() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("state");
        let mut store =
            DecisionStore::load(DecisionBackend::json(&nested.join("decisions.json"))).unwrap();

        // A regular file where the directory should be makes every write fail.
        fs::write(&nested, b"in the way").unwrap();

        assert!(store.decide(&id("a"), Decision::Trashed).is_err());
        assert_eq!(store.state_of(&id("a")), ReviewState::Trashed);
        assert!(store.is_dirty());

        fs::remove_file(&nested).unwrap();
        store.flush().unwrap();
        assert!(!store.is_dirty());

        let reloaded =
            DecisionStore::load(DecisionBackend::json(&nested.join("decisions.json"))).unwrap();
        assert_eq!(reloaded.state_of(&id("a")), ReviewState::Trashed);
    }

    #[test]
    fn test_corrupt_file_refuses_to_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("decisions.json");
        fs::write(&path, "][").unwrap();

        assert!(DecisionStore::load(DecisionBackend::json(&path)).is_err());
    }
}
