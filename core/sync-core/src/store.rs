//! In-memory bookmark collection.
//!
//! The store is a plain, synchronous data structure. The [`crate::Reconciler`]
//! wraps it in a lock so each operation is observed as a whole.
//!
//! # Invariants
//!
//! - No two entries share an `id`.
//! - Creations append, so iteration order is arrival order.
//! - Under [`DeletePolicy::Tombstone`] a deleted id never reappears until the
//!   store is cleared, whatever order its create/delete events arrive in.

use std::collections::HashSet;

use serde::Serialize;

use crate::config::DeletePolicy;
use crate::types::{ChangeEvent, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A record with this id is already present.
    Duplicate,
    /// Deletion of an id that is not present.
    Absent,
    /// Creation of an id deleted earlier in this session.
    Tombstoned,
    /// The event belongs to a subscription that has since been torn down.
    StaleGeneration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreUpdate {
    Inserted { id: String },
    Removed { id: String },
    Seeded { count: usize, dropped: usize },
    Skip(SkipReason),
}

impl StoreUpdate {
    pub fn changed(&self) -> bool {
        !matches!(self, StoreUpdate::Skip(_))
    }
}

#[derive(Debug, Default)]
pub struct LocalStore {
    records: Vec<Record>,
    ids: HashSet<String>,
    tombstones: HashSet<String>,
    policy: DeletePolicy,
}

impl LocalStore {
    pub fn new(policy: DeletePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Replaces the whole collection. Duplicate ids keep their first
    /// occurrence and tombstoned ids are dropped.
    pub fn seed(&mut self, records: Vec<Record>) -> StoreUpdate {
        let offered = records.len();
        let mut ids = HashSet::with_capacity(offered);
        let mut kept = Vec::with_capacity(offered);

        for record in records {
            if self.is_tombstoned(&record.id) {
                continue;
            }
            if ids.insert(record.id.clone()) {
                kept.push(record);
            }
        }

        let count = kept.len();
        self.records = kept;
        self.ids = ids;
        StoreUpdate::Seeded {
            count,
            dropped: offered - count,
        }
    }

    pub fn apply_created(&mut self, record: Record) -> StoreUpdate {
        if self.is_tombstoned(&record.id) {
            return StoreUpdate::Skip(SkipReason::Tombstoned);
        }
        if self.ids.contains(&record.id) {
            return StoreUpdate::Skip(SkipReason::Duplicate);
        }

        let id = record.id.clone();
        self.ids.insert(id.clone());
        self.records.push(record);
        StoreUpdate::Inserted { id }
    }

    pub fn apply_deleted(&mut self, id: &str) -> StoreUpdate {
        if self.policy == DeletePolicy::Tombstone {
            self.tombstones.insert(id.to_string());
        }

        if !self.ids.remove(id) {
            return StoreUpdate::Skip(SkipReason::Absent);
        }

        self.records.retain(|record| record.id != id);
        StoreUpdate::Removed { id: id.to_string() }
    }

    pub fn apply(&mut self, event: ChangeEvent) -> StoreUpdate {
        match event {
            ChangeEvent::Created(record) => self.apply_created(record),
            ChangeEvent::Deleted { id } => self.apply_deleted(&id),
        }
    }

    pub fn read_all(&self) -> Vec<Record> {
        self.records.clone()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn is_tombstoned(&self, id: &str) -> bool {
        self.tombstones.contains(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drops all records and tombstones.
    pub fn clear(&mut self) {
        self.records.clear();
        self.ids.clear();
        self.tombstones.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> Record {
        Record::new(id, format!("title-{}", id), format!("https://{}.test", id), "u-1")
    }

    fn ids(store: &LocalStore) -> Vec<String> {
        store.read_all().into_iter().map(|r| r.id).collect()
    }

    #[test]
    fn created_twice_yields_one_entry() {
        let mut store = LocalStore::new(DeletePolicy::Tombstone);
        assert!(store.apply_created(record("1")).changed());
        assert_eq!(
            store.apply_created(record("1")),
            StoreUpdate::Skip(SkipReason::Duplicate)
        );
        assert_eq!(ids(&store), vec!["1"]);
    }

    #[test]
    fn deleting_absent_id_is_noop() {
        let mut store = LocalStore::new(DeletePolicy::Tombstone);
        store.apply_created(record("1"));
        assert_eq!(
            store.apply_deleted("9"),
            StoreUpdate::Skip(SkipReason::Absent)
        );
        assert_eq!(ids(&store), vec!["1"]);
    }

    #[test]
    fn deleting_twice_matches_deleting_once() {
        let mut store = LocalStore::new(DeletePolicy::Tombstone);
        store.apply_created(record("1"));
        store.apply_created(record("2"));
        store.apply_deleted("1");
        let once = ids(&store);
        store.apply_deleted("1");
        assert_eq!(ids(&store), once);
        assert_eq!(once, vec!["2"]);
    }

    #[test]
    fn creations_keep_arrival_order() {
        let mut store = LocalStore::new(DeletePolicy::Tombstone);
        for id in ["3", "1", "2"] {
            store.apply_created(record(id));
        }
        assert_eq!(ids(&store), vec!["3", "1", "2"]);
    }

    #[test]
    fn delete_before_create_stays_deleted_with_tombstones() {
        let mut store = LocalStore::new(DeletePolicy::Tombstone);
        store.apply_deleted("1");
        assert_eq!(
            store.apply_created(record("1")),
            StoreUpdate::Skip(SkipReason::Tombstoned)
        );
        assert!(store.is_empty());

        let mut forward = LocalStore::new(DeletePolicy::Tombstone);
        forward.apply_created(record("1"));
        forward.apply_deleted("1");
        assert_eq!(ids(&forward), ids(&store));
    }

    #[test]
    fn late_duplicate_create_does_not_resurrect() {
        let mut store = LocalStore::new(DeletePolicy::Tombstone);
        store.apply_created(record("1"));
        store.apply_deleted("1");
        store.apply_created(record("1"));
        assert!(!store.contains("1"));
        assert!(store.is_tombstoned("1"));
    }

    #[test]
    fn last_event_wins_allows_recreation() {
        let mut store = LocalStore::new(DeletePolicy::LastEventWins);
        store.apply_created(record("1"));
        store.apply_deleted("1");
        assert!(store.apply_created(record("1")).changed());
        assert_eq!(ids(&store), vec!["1"]);
        assert!(!store.is_tombstoned("1"));
    }

    #[test]
    fn seed_replaces_collection() {
        let mut store = LocalStore::new(DeletePolicy::Tombstone);
        store.apply_created(record("9"));
        let update = store.seed(vec![record("1"), record("2")]);
        assert_eq!(
            update,
            StoreUpdate::Seeded {
                count: 2,
                dropped: 0
            }
        );
        assert_eq!(ids(&store), vec!["1", "2"]);
        assert!(!store.contains("9"));
    }

    #[test]
    fn seed_dedupes_and_honors_tombstones() {
        let mut store = LocalStore::new(DeletePolicy::Tombstone);
        store.apply_deleted("2");
        let update = store.seed(vec![record("1"), record("2"), record("1"), record("3")]);
        assert_eq!(
            update,
            StoreUpdate::Seeded {
                count: 2,
                dropped: 2
            }
        );
        assert_eq!(ids(&store), vec!["1", "3"]);
    }

    #[test]
    fn clear_drops_tombstones() {
        let mut store = LocalStore::new(DeletePolicy::Tombstone);
        store.apply_created(record("1"));
        store.apply_deleted("1");
        store.clear();
        assert!(store.is_empty());
        assert!(!store.is_tombstoned("1"));
        assert!(store.apply_created(record("1")).changed());
    }

    #[test]
    fn get_returns_present_record() {
        let mut store = LocalStore::new(DeletePolicy::Tombstone);
        store.apply_created(record("1"));
        assert_eq!(store.get("1").map(|r| r.title.as_str()), Some("title-1"));
        assert!(store.get("2").is_none());
    }

    #[test]
    fn no_duplicates_across_mixed_sequences() {
        let mut store = LocalStore::new(DeletePolicy::LastEventWins);
        let script: Vec<ChangeEvent> = vec![
            ChangeEvent::Created(record("1")),
            ChangeEvent::Created(record("2")),
            ChangeEvent::Created(record("1")),
            ChangeEvent::Deleted { id: "2".to_string() },
            ChangeEvent::Created(record("2")),
            ChangeEvent::Created(record("2")),
            ChangeEvent::Deleted { id: "3".to_string() },
        ];
        for event in script {
            store.apply(event);
            let mut seen = HashSet::new();
            for id in ids(&store) {
                assert!(seen.insert(id), "duplicate id observed");
            }
        }
        store.seed(vec![record("4"), record("4")]);
        assert_eq!(ids(&store), vec!["4"]);
    }
}
