//! Metric Snapshot Store
//!
//! Holds the latest snapshot of one provider. Reconciliation publishes a
//! whole new snapshot; scrapes load the current one. Both sides go through
//! an atomically swapped `Arc`, so a scrape never waits on a pass and never
//! sees two passes mixed.

use arc_swap::ArcSwap;
use std::sync::Arc;

use crate::snapshot::MetricSnapshot;

pub struct SnapshotStore {
    current: ArcSwap<MetricSnapshot>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    /// Store holding an empty snapshot until the first publish
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(MetricSnapshot::empty()),
        }
    }

    /// Replace the current snapshot. Last writer wins.
    pub fn publish(&self, snapshot: MetricSnapshot) {
        self.current.store(Arc::new(snapshot));
    }

    /// The latest published snapshot
    pub fn current(&self) -> Arc<MetricSnapshot> {
        self.current.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::MetricFamily;
    use std::thread;

    fn snapshot_with(value: f64, samples: usize) -> MetricSnapshot {
        let mut family = MetricFamily::gauge("test_peers", "Test peers", &["n"]);
        for i in 0..samples {
            family.push([i.to_string()], value);
        }
        MetricSnapshot::new(vec![family])
    }

    #[test]
    fn test_starts_empty() {
        let store = SnapshotStore::new();
        assert!(store.current().is_empty());
    }

    #[test]
    fn test_publish_replaces() {
        let store = SnapshotStore::new();
        store.publish(snapshot_with(1.0, 2));
        store.publish(snapshot_with(2.0, 3));

        let current = store.current();
        assert_eq!(current.sample_count(), 3);
        assert!(current.families[0].samples.iter().all(|s| s.value == 2.0));
    }

    #[test]
    fn test_reader_keeps_old_snapshot() {
        let store = SnapshotStore::new();
        store.publish(snapshot_with(1.0, 1));

        let held = store.current();
        store.publish(snapshot_with(2.0, 1));

        assert_eq!(held.families[0].samples[0].value, 1.0);
        assert_eq!(store.current().families[0].samples[0].value, 2.0);
    }

    #[test]
    fn test_concurrent_readers_see_whole_snapshots() {
        let store = Arc::new(SnapshotStore::new());

        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for pass in 1..=200 {
                    store.publish(snapshot_with(pass as f64, 16));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let snapshot = store.current();
                        if let Some(family) = snapshot.families.first() {
                            let first = family.samples[0].value;
                            assert_eq!(family.samples.len(), 16);
                            assert!(family.samples.iter().all(|s| s.value == first));
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.current().families[0].samples[0].value, 200.0);
    }
}
