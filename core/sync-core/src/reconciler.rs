//! Single writer for the local bookmark collection.
//!
//! Every mutation carries the [`Generation`] it was produced under. A reset
//! (logout or a new activation) clears the store and advances the generation
//! under the same lock, so anything still in flight from the previous
//! subscription or bulk load is discarded instead of applied.
//!
//! Between a reset and the seed (or [`Reconciler::close_load_window`]) feed
//! events are applied and also kept in a load window. The seed replaces the
//! collection and then replays the window in arrival order, so a change the
//! feed delivered after the remote snapshot was taken survives the seed.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::debug;

use crate::config::DeletePolicy;
use crate::store::{LocalStore, SkipReason, StoreUpdate};
use crate::types::{ChangeEvent, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(pub u64);

struct Inner {
    store: LocalStore,
    generation: Generation,
    revision: u64,
    load_window: Option<Vec<ChangeEvent>>,
}

#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<Mutex<Inner>>,
    revisions: Arc<watch::Sender<u64>>,
}

impl Reconciler {
    pub fn new(policy: DeletePolicy) -> Self {
        let (revisions, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                store: LocalStore::new(policy),
                generation: Generation::default(),
                revision: 0,
                load_window: None,
            })),
            revisions: Arc::new(revisions),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn generation(&self) -> Generation {
        self.lock().generation
    }

    /// Clears the collection, starts a new generation and opens its load
    /// window.
    pub fn reset(&self, reason: &str) -> Generation {
        let mut inner = self.lock();
        let had_records = !inner.store.is_empty();
        inner.store.clear();
        inner.generation = Generation(inner.generation.0 + 1);
        inner.load_window = Some(Vec::new());
        let generation = inner.generation;
        debug!(generation = generation.0, reason, "Reconciler reset");
        if had_records {
            self.publish(&mut inner);
        }
        generation
    }

    /// Replaces the collection with a bulk-load result, then replays the
    /// feed events that arrived since the reset.
    pub fn seed(&self, generation: Generation, records: Vec<Record>) -> StoreUpdate {
        let mut inner = self.lock();
        if !Self::is_current(&inner, generation, "seed") {
            return StoreUpdate::Skip(SkipReason::StaleGeneration);
        }

        let dropped = match inner.store.seed(records) {
            StoreUpdate::Seeded { dropped, .. } => dropped,
            _ => 0,
        };
        let window = inner.load_window.take().unwrap_or_default();
        let replayed = window.len();
        for event in window {
            debug!(id = event.id(), "Replaying change from load window");
            inner.store.apply(event);
        }

        let count = inner.store.len();
        debug!(count, dropped, replayed, "Store seeded");
        self.publish(&mut inner);
        StoreUpdate::Seeded { count, dropped }
    }

    /// Stops recording the load window without seeding, after a failed bulk
    /// load. Events already applied stay in the collection.
    pub fn close_load_window(&self, generation: Generation) {
        let mut inner = self.lock();
        if inner.generation == generation {
            inner.load_window = None;
        }
    }

    pub fn apply_created(&self, generation: Generation, record: Record) -> StoreUpdate {
        self.apply(generation, ChangeEvent::Created(record))
    }

    pub fn apply_deleted(&self, generation: Generation, id: &str) -> StoreUpdate {
        self.apply(
            generation,
            ChangeEvent::Deleted {
                id: id.to_string(),
            },
        )
    }

    pub fn apply(&self, generation: Generation, event: ChangeEvent) -> StoreUpdate {
        let mut inner = self.lock();
        if !Self::is_current(&inner, generation, "change") {
            return StoreUpdate::Skip(SkipReason::StaleGeneration);
        }

        if let Some(window) = inner.load_window.as_mut() {
            window.push(event.clone());
        }
        let update = inner.store.apply(event);
        match &update {
            StoreUpdate::Skip(reason) => {
                debug!(reason = ?reason, "Store update skipped");
            }
            StoreUpdate::Inserted { id } | StoreUpdate::Removed { id } => {
                debug!(id = %id, records = inner.store.len(), "Store updated");
                self.publish(&mut inner);
            }
            StoreUpdate::Seeded { .. } => self.publish(&mut inner),
        }
        update
    }

    fn is_current(inner: &Inner, generation: Generation, op: &'static str) -> bool {
        if inner.generation == generation {
            return true;
        }
        debug!(
            op,
            event_generation = generation.0,
            current_generation = inner.generation.0,
            "Discarding update from stale generation"
        );
        false
    }

    fn publish(&self, inner: &mut Inner) {
        inner.revision += 1;
        self.revisions.send_replace(inner.revision);
    }

    pub fn read_all(&self) -> Vec<Record> {
        self.lock().store.read_all()
    }

    pub fn len(&self) -> usize {
        self.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().store.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().store.contains(id)
    }

    /// Revision counter, bumped after every change to the collection.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.revisions.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> Record {
        Record::new(id, "title", "https://example.test", "u-1")
    }

    #[test]
    fn stale_generation_is_discarded() {
        let reconciler = Reconciler::new(DeletePolicy::Tombstone);
        let old = reconciler.reset("activate");
        reconciler.apply_created(old, record("1"));

        let current = reconciler.reset("logout");
        assert_ne!(old, current);
        assert!(reconciler.is_empty());

        assert_eq!(
            reconciler.apply_created(old, record("2")),
            StoreUpdate::Skip(SkipReason::StaleGeneration)
        );
        assert_eq!(
            reconciler.seed(old, vec![record("3")]),
            StoreUpdate::Skip(SkipReason::StaleGeneration)
        );
        assert!(reconciler.is_empty());
    }

    #[test]
    fn revision_advances_only_on_change() {
        let reconciler = Reconciler::new(DeletePolicy::Tombstone);
        let rx = reconciler.watch();
        let generation = reconciler.reset("activate");
        assert_eq!(*rx.borrow(), 0);

        reconciler.apply_created(generation, record("1"));
        assert_eq!(*rx.borrow(), 1);

        reconciler.apply_created(generation, record("1"));
        reconciler.apply_deleted(generation, "missing");
        assert_eq!(*rx.borrow(), 1);

        reconciler.apply_deleted(generation, "1");
        assert_eq!(*rx.borrow(), 2);
    }

    #[test]
    fn reset_clears_tombstones_for_next_session() {
        let reconciler = Reconciler::new(DeletePolicy::Tombstone);
        let first = reconciler.reset("activate");
        reconciler.apply_deleted(first, "1");
        assert!(!reconciler.apply_created(first, record("1")).changed());

        let second = reconciler.reset("activate");
        assert!(reconciler.apply_created(second, record("1")).changed());
        assert!(reconciler.contains("1"));
    }

    #[test]
    fn seed_replays_changes_from_load_window() {
        let reconciler = Reconciler::new(DeletePolicy::LastEventWins);
        let generation = reconciler.reset("activate");

        // Arrived after the remote snapshot was taken.
        reconciler.apply_created(generation, record("2"));
        reconciler.apply_deleted(generation, "1");

        let update = reconciler.seed(generation, vec![record("1")]);
        assert_eq!(
            update,
            StoreUpdate::Seeded {
                count: 1,
                dropped: 0
            }
        );
        assert_eq!(
            reconciler
                .read_all()
                .into_iter()
                .map(|r| r.id)
                .collect::<Vec<_>>(),
            vec!["2"]
        );
    }

    #[test]
    fn window_closes_after_seed() {
        let reconciler = Reconciler::new(DeletePolicy::LastEventWins);
        let generation = reconciler.reset("activate");
        reconciler.seed(generation, vec![]);
        reconciler.apply_created(generation, record("1"));

        // A later seed of the same generation does not replay post-seed events.
        reconciler.seed(generation, vec![record("2")]);
        assert!(!reconciler.contains("1"));
        assert!(reconciler.contains("2"));
    }

    #[test]
    fn closed_window_keeps_applied_events() {
        let reconciler = Reconciler::new(DeletePolicy::Tombstone);
        let generation = reconciler.reset("activate");
        reconciler.apply_created(generation, record("1"));
        reconciler.close_load_window(generation);
        assert!(reconciler.contains("1"));

        reconciler.seed(generation, vec![]);
        assert!(reconciler.is_empty());
    }

    #[test]
    fn concurrent_appliers_never_duplicate() {
        let reconciler = Reconciler::new(DeletePolicy::Tombstone);
        let generation = reconciler.reset("activate");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reconciler = reconciler.clone();
                std::thread::spawn(move || {
                    for n in 0..50 {
                        reconciler.apply_created(generation, record(&format!("{}", n % 10)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker");
        }

        assert_eq!(reconciler.len(), 10);
    }
}
