//! Hot-reloadable access to the current placement registry
//!
//! Readers load the current [`PlacementSnapshot`] without taking a lock.
//! Reloads build a complete new registry off to the side and publish it with
//! a single atomic store, so a reader sees either the old registry or the
//! new one and never anything in between.

use crate::metrics;
use crate::registry::PlacementRegistry;
use crate::rules::{NodeAttributes, NodeFilter};
use arc_swap::{ArcSwap, Guard};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use placement_core::PlacementId;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// An immutable, versioned registry
#[derive(Debug, Clone)]
pub struct PlacementSnapshot {
    /// The registry readers consult
    pub registry: PlacementRegistry,
    /// Incremented on every publish
    pub version: u64,
    /// When this snapshot was published
    pub loaded_at: DateTime<Utc>,
}

impl PlacementSnapshot {
    fn new(registry: PlacementRegistry, version: u64) -> Self {
        Self {
            registry,
            version,
            loaded_at: Utc::now(),
        }
    }
}

/// Shared handle to the current registry
///
/// ```
/// use placement_filter::handle::PlacementHandle;
/// use placement_filter::registry::PlacementRegistry;
/// use placement_core::PlacementId;
///
/// let handle = PlacementHandle::new(PlacementRegistry::new());
/// assert_eq!(handle.version(), 0);
///
/// handle.update(|registry| registry.load_definitions(r#"10:country("us")"#)).unwrap();
/// assert_eq!(handle.version(), 1);
/// assert!(handle.snapshot().registry.contains(PlacementId::new(10)));
/// ```
pub struct PlacementHandle {
    current: ArcSwap<PlacementSnapshot>,
    /// Serializes writers so an update never overwrites a concurrent one
    writer: Mutex<()>,
}

impl PlacementHandle {
    /// Publish `registry` as version 0
    pub fn new(registry: PlacementRegistry) -> Self {
        metrics::record_rules_registered(registry.len());
        Self {
            current: ArcSwap::from_pointee(PlacementSnapshot::new(registry, 0)),
            writer: Mutex::new(()),
        }
    }

    /// Current snapshot, without locking
    pub fn snapshot(&self) -> Guard<Arc<PlacementSnapshot>> {
        self.current.load()
    }

    /// Current snapshot as an owned `Arc`, for holding across long work
    pub fn snapshot_arc(&self) -> Arc<PlacementSnapshot> {
        self.current.load_full()
    }

    /// Version of the current snapshot
    pub fn version(&self) -> u64 {
        self.current.load().version
    }

    /// Filter registered for `id` in the current snapshot
    pub fn lookup(&self, id: PlacementId) -> NodeFilter {
        self.current.load().registry.lookup(id).clone()
    }

    /// Check a node against the current filter for `id`
    pub fn matches(&self, id: PlacementId, node: &NodeAttributes) -> bool {
        self.current.load().registry.matches(id, node)
    }

    /// Publish a freshly built registry, returning the new version.
    pub fn replace(&self, registry: PlacementRegistry) -> u64 {
        let _writer = self.writer.lock();
        self.publish(registry)
    }

    /// Apply `f` to a copy of the current registry and publish the copy if
    /// `f` succeeds. On error nothing is published.
    pub fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut PlacementRegistry) -> Result<T, E>,
    {
        let _writer = self.writer.lock();
        let mut registry = self.current.load().registry.clone();
        let value = f(&mut registry)?;
        self.publish(registry);
        Ok(value)
    }

    // callers hold the writer lock
    fn publish(&self, registry: PlacementRegistry) -> u64 {
        let version = self.current.load().version + 1;
        let rules = registry.len();
        self.current
            .store(Arc::new(PlacementSnapshot::new(registry, version)));

        metrics::record_rules_registered(rules);
        info!(version, rules, "Placement registry published");
        version
    }
}

impl Default for PlacementHandle {
    fn default() -> Self {
        Self::new(PlacementRegistry::new())
    }
}

impl fmt::Debug for PlacementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.current.load();
        f.debug_struct("PlacementHandle")
            .field("version", &snapshot.version)
            .field("loaded_at", &snapshot.loaded_at)
            .field("rules", &snapshot.registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::country::CountryCode;
    use placement_core::NodeId;
    use std::thread;

    fn node(country: CountryCode) -> NodeAttributes {
        NodeAttributes::new(NodeId::from_bytes([3; 32]), country)
    }

    #[test]
    fn test_replace_swaps_registry() {
        let handle = PlacementHandle::new(PlacementRegistry::new());
        let id = PlacementId::new(10);
        assert!(!handle.matches(id, &node(CountryCode::US)));

        let registry: PlacementRegistry = r#"10:country("us")"#.parse().unwrap();
        assert_eq!(handle.replace(registry), 1);
        assert!(handle.matches(id, &node(CountryCode::US)));
    }

    #[test]
    fn test_old_snapshot_is_unchanged() {
        let handle = PlacementHandle::new(r#"10:country("us")"#.parse().unwrap());
        let before = handle.snapshot_arc();

        handle.replace(r#"10:country("de")"#.parse().unwrap());

        let id = PlacementId::new(10);
        assert!(before.registry.matches(id, &node(CountryCode::US)));
        assert!(handle.matches(id, &node(CountryCode::DE)));
        assert!(!handle.matches(id, &node(CountryCode::US)));
    }

    #[test]
    fn test_failed_update_publishes_nothing() {
        let handle = PlacementHandle::new(PlacementRegistry::new());
        let result = handle.update(|registry| {
            registry.load_definitions(r#"10:country("us");11:bogus()"#)
        });

        assert!(result.is_err());
        assert_eq!(handle.version(), 0);
        assert!(!handle.snapshot().registry.contains(PlacementId::new(10)));
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let handle = Arc::new(PlacementHandle::default());

        let workers: Vec<_> = (0..8u16)
            .map(|i| {
                let handle = Arc::clone(&handle);
                thread::spawn(move || {
                    handle
                        .update(|registry| {
                            registry.register(PlacementId::new(100 + i), NodeFilter::AcceptAll);
                            Ok::<_, ()>(())
                        })
                        .unwrap();
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(handle.version(), 8);
        assert_eq!(handle.snapshot().registry.len(), 8);
    }
}
