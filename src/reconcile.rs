//! Keeps the index in step with a library that changes underneath it.
//!
//! Change notifications arrive on a channel registered with the library.
//! The first one starts a rebuild on a background thread; the ones that
//! arrive while it runs collapse into a single follow-up rebuild. Results
//! travel back over a channel and are handed to the owner from [`poll`],
//! which is the only place an index swap can happen.
//!
//! [`poll`]: ReconciliationController::poll

use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::index::{rebuild_index, LibraryIndex};
use crate::library::{LibraryChange, LibraryError, ObserverId, PhotoLibrary};
use crate::model::PhotoId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Idle,
    Rebuilding,
}

/// A finished rebuild, ready to be applied.
#[derive(Debug)]
pub struct Rebuilt {
    pub generation: u64,
    pub result: Result<LibraryIndex, LibraryError>,
    pub elapsed: Duration,
}

struct InFlight {
    generation: u64,
    rx: Receiver<Rebuilt>,
}

pub struct ReconciliationController {
    library: Arc<dyn PhotoLibrary>,
    changes_tx: Sender<LibraryChange>,
    changes_rx: Receiver<LibraryChange>,
    observer: Option<ObserverId>,
    in_flight: Option<InFlight>,
    /// A change arrived after the in-flight rebuild started.
    pending: bool,
    generation: u64,
}

impl ReconciliationController {
    pub fn new(library: Arc<dyn PhotoLibrary>) -> Self {
        let (changes_tx, changes_rx) = mpsc::channel();
        Self {
            library,
            changes_tx,
            changes_rx,
            observer: None,
            in_flight: None,
            pending: false,
            generation: 0,
        }
    }

    /// Start receiving change notifications. Idempotent.
    pub fn subscribe(&mut self) {
        if self.observer.is_none() {
            let id = self.library.register_change_observer(self.changes_tx.clone());
            debug!("Subscribed to library changes as {:?}", id);
            self.observer = Some(id);
        }
    }

    pub fn unsubscribe(&mut self) {
        if let Some(id) = self.observer.take() {
            self.library.unregister_change_observer(id);
            debug!("Unsubscribed from library changes");
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.observer.is_some()
    }

    pub fn state(&self) -> ReconcileState {
        if self.in_flight.is_some() {
            ReconcileState::Rebuilding
        } else {
            ReconcileState::Idle
        }
    }

    /// Number of rebuilds started so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_pending(&self) -> bool {
        self.pending
    }

    /// Ask for a rebuild as if the library had announced a change.
    pub fn request_rebuild(&mut self) {
        if self.in_flight.is_some() {
            self.pending = true;
        } else {
            self.start_rebuild();
        }
    }

    fn start_rebuild(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        let library = Arc::clone(&self.library);
        let (tx, rx) = mpsc::channel();

        debug!("Starting index rebuild #{}", generation);
        thread::spawn(move || {
            let started = Instant::now();
            let result = rebuild_index(library.as_ref());
            let _ = tx.send(Rebuilt {
                generation,
                result,
                elapsed: started.elapsed(),
            });
        });

        self.in_flight = Some(InFlight { generation, rx });
        self.pending = false;
    }

    fn drain_changes(&mut self) {
        let mut changed = false;
        while let Ok(change) = self.changes_rx.try_recv() {
            debug!("Library change detected at {}", change.detected_at);
            changed = true;
        }
        if changed {
            self.request_rebuild();
        }
    }

    /// Turn a finished rebuild into a result for the owner and start the
    /// follow-up rebuild if changes queued up meanwhile.
    fn finish(&mut self, rebuilt: Rebuilt) -> Option<Rebuilt> {
        let current = self.in_flight.take().map(|f| f.generation);
        if current != Some(rebuilt.generation) {
            debug!("Discarding stale rebuild #{}", rebuilt.generation);
            return None;
        }
        match &rebuilt.result {
            Ok(index) => info!(
                "Rebuild #{} finished in {:?}: {} months, {} system, {} user albums",
                rebuilt.generation,
                rebuilt.elapsed,
                index.months.len(),
                index.system.len(),
                index.user.len()
            ),
            Err(e) => error!("Rebuild #{} failed: {}", rebuilt.generation, e),
        }
        if self.pending {
            self.start_rebuild();
        }
        Some(rebuilt)
    }

    fn lost(&mut self) -> Option<Rebuilt> {
        let flight = self.in_flight.take()?;
        error!("Rebuild #{} ended without a result", flight.generation);
        if self.pending {
            self.start_rebuild();
        }
        Some(Rebuilt {
            generation: flight.generation,
            result: Err(LibraryError::Unavailable("index rebuild aborted".to_string())),
            elapsed: Duration::ZERO,
        })
    }

    /// Drain notifications and collect a finished rebuild without blocking.
    pub fn poll(&mut self) -> Option<Rebuilt> {
        self.drain_changes();

        let received = match &self.in_flight {
            Some(flight) => flight.rx.try_recv(),
            None => return None,
        };
        match received {
            Ok(rebuilt) => self.finish(rebuilt),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => self.lost(),
        }
    }

    /// Like [`poll`](Self::poll), but wait up to `timeout` for the in-flight
    /// rebuild. Returns immediately when nothing is running.
    pub fn poll_timeout(&mut self, timeout: Duration) -> Option<Rebuilt> {
        self.drain_changes();

        let received = match &self.in_flight {
            Some(flight) => flight.rx.recv_timeout(timeout),
            None => return None,
        };
        match received {
            Ok(rebuilt) => self.finish(rebuilt),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => self.lost(),
        }
    }
}

impl Drop for ReconciliationController {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Split candidate ids into the ones the library still knows and the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub found: HashSet<PhotoId>,
    pub orphaned: HashSet<PhotoId>,
}

/// Look up `candidates` in the library. An empty candidate set issues no query.
pub fn resolve(
    library: &dyn PhotoLibrary,
    candidates: &HashSet<PhotoId>,
) -> Result<Resolution, LibraryError> {
    if candidates.is_empty() {
        return Ok(Resolution::default());
    }

    let found: HashSet<PhotoId> = library
        .fetch_by_ids(candidates)?
        .into_iter()
        .map(|p| p.id)
        .filter(|id| candidates.contains(id))
        .collect();
    let orphaned = candidates.difference(&found).cloned().collect();

    Ok(Resolution { found, orphaned })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::MemoryLibrary;
    use crate::model::PhotoRef;
    use chrono::NaiveDate;

    const WAIT: Duration = Duration::from_secs(5);

    fn library() -> Arc<MemoryLibrary> {
        let lib = Arc::new(MemoryLibrary::new());
        let created = NaiveDate::from_ymd_opt(2024, 4, 2).and_then(|d| d.and_hms_opt(8, 0, 0));
        lib.insert_photo(PhotoRef::new("a", created));
        lib
    }

    fn controller(lib: &Arc<MemoryLibrary>) -> ReconciliationController {
        let library: Arc<dyn PhotoLibrary> = lib.clone();
        ReconciliationController::new(library)
    }

    #[test]
    fn test_notification_triggers_rebuild() {
        let lib = library();
        let mut ctl = controller(&lib);
        ctl.subscribe();
        assert_eq!(ctl.state(), ReconcileState::Idle);

        lib.notify_change();
        let rebuilt = ctl.poll_timeout(WAIT).expect("rebuild result");

        assert_eq!(rebuilt.generation, 1);
        assert_eq!(rebuilt.result.unwrap().photo_count(), 1);
        assert_eq!(ctl.state(), ReconcileState::Idle);
    }

    #[test]
    fn test_burst_of_notifications_starts_one_rebuild() {
        let lib = library();
        let mut ctl = controller(&lib);
        ctl.subscribe();

        lib.notify_change();
        lib.notify_change();
        lib.notify_change();
        assert!(ctl.poll_timeout(WAIT).is_some());
        assert!(ctl.poll_timeout(WAIT).is_none());

        assert_eq!(ctl.generation(), 1);
        assert_eq!(lib.queries().fetch_all, 1);
    }

    #[test]
    fn test_change_during_rebuild_gets_one_follow_up() {
        let lib = library();
        let mut ctl = controller(&lib);
        ctl.subscribe();

        ctl.request_rebuild();
        assert_eq!(ctl.state(), ReconcileState::Rebuilding);

        // Arrives while rebuild #1 is in flight.
        lib.notify_change();
        lib.notify_change();

        let first = ctl.poll_timeout(WAIT).expect("first rebuild");
        assert_eq!(first.generation, 1);
        assert_eq!(ctl.state(), ReconcileState::Rebuilding);

        let second = ctl.poll_timeout(WAIT).expect("follow-up rebuild");
        assert_eq!(second.generation, 2);
        assert!(ctl.poll_timeout(Duration::from_millis(50)).is_none());
        assert_eq!(lib.queries().fetch_all, 2);
    }

    #[test]
    fn test_unsubscribe_on_drop() {
        let lib = library();
        {
            let mut ctl = controller(&lib);
            ctl.subscribe();
            ctl.subscribe();
            assert_eq!(lib.observer_count(), 1);
        }
        assert_eq!(lib.observer_count(), 0);
    }

    #[test]
    fn test_unsubscribed_controller_ignores_changes() {
        let lib = library();
        let mut ctl = controller(&lib);
        ctl.subscribe();
        ctl.unsubscribe();

        lib.notify_change();
        assert!(ctl.poll().is_none());
        assert_eq!(ctl.generation(), 0);
    }

    #[test]
    fn test_resolve_splits_found_and_orphaned() {
        let lib = library();
        let candidates: HashSet<PhotoId> = ["a", "gone"].into_iter().map(PhotoId::from).collect();

        let resolution = resolve(lib.as_ref(), &candidates).unwrap();

        assert!(resolution.found.contains(&PhotoId::from("a")));
        assert_eq!(resolution.orphaned.len(), 1);
        assert!(resolution.orphaned.contains(&PhotoId::from("gone")));
    }

    #[test]
    fn test_resolve_empty_input_makes_no_query() {
        let lib = library();
        let resolution = resolve(lib.as_ref(), &HashSet::new()).unwrap();

        assert_eq!(resolution, Resolution::default());
        assert_eq!(lib.queries().fetch_by_ids, 0);
    }
}
