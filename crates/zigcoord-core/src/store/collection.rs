// ── Generic reactive collection ──
//
// DashMap storage with per-entry atomic read-modify-write and a sorted
// snapshot pushed to subscribers after every change.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

pub(crate) type Snapshot<T> = Arc<Vec<Arc<T>>>;

pub(crate) struct EntityCollection<K, T>
where
    K: Eq + Hash + Ord + Clone,
{
    by_key: DashMap<K, Arc<T>>,
    snapshot: watch::Sender<Snapshot<T>>,
}

impl<K, T> EntityCollection<K, T>
where
    K: Eq + Hash + Ord + Clone,
{
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_key: DashMap::new(),
            snapshot,
        }
    }

    /// Atomically derive the next value for `key` from the current one.
    ///
    /// `f` runs under the entry's shard lock and returns the replacement plus
    /// a caller-defined outcome, or `None` to leave the entry untouched. Must
    /// not touch this collection.
    pub(crate) fn update<R>(
        &self,
        key: K,
        f: impl FnOnce(Option<&Arc<T>>) -> Option<(T, R)>,
    ) -> Option<(Arc<T>, R)> {
        let outcome = match self.by_key.entry(key) {
            Entry::Occupied(mut entry) => {
                let (next, outcome) = f(Some(entry.get()))?;
                let next = Arc::new(next);
                entry.insert(Arc::clone(&next));
                (next, outcome)
            }
            Entry::Vacant(entry) => {
                let (next, outcome) = f(None)?;
                let next = Arc::new(next);
                entry.insert(Arc::clone(&next));
                (next, outcome)
            }
        };
        self.rebuild_snapshot();
        Some(outcome)
    }

    pub(crate) fn get(&self, key: &K) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Current snapshot, ordered by key (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Snapshot<T> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    fn rebuild_snapshot(&self) {
        let mut entries: Vec<(K, Arc<T>)> = self
            .by_key
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let values: Vec<Arc<T>> = entries.into_iter().map(|(_, v)| v).collect();
        // `send_modify` updates even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn put(col: &EntityCollection<String, u32>, key: &str, value: u32) -> bool {
        col.update(key.to_owned(), |existing| Some((value, existing.is_none())))
            .unwrap()
            .1
    }

    #[test]
    fn update_reports_whether_key_was_new() {
        let col = EntityCollection::new();
        assert!(put(&col, "a", 1));
        assert!(!put(&col, "a", 2));
        assert_eq!(*col.get(&"a".to_owned()).unwrap(), 2);
        assert_eq!(col.len(), 1);
    }

    #[test]
    fn declined_update_leaves_entry() {
        let col = EntityCollection::new();
        put(&col, "a", 1);
        let rx = col.subscribe();
        assert!(col.update("a".to_owned(), |_| None::<(u32, ())>).is_none());
        assert!(!rx.has_changed().unwrap());
        assert_eq!(*col.get(&"a".to_owned()).unwrap(), 1);
    }

    #[test]
    fn snapshot_sorted_by_key() {
        let col = EntityCollection::new();
        put(&col, "c", 3);
        put(&col, "a", 1);
        put(&col, "b", 2);
        let values: Vec<u32> = col.snapshot().iter().map(|v| **v).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let col = EntityCollection::new();
        let mut rx = col.subscribe();
        put(&col, "a", 1);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 1);
    }
}
