//! Stream subscription set.
//!
//! Maps each stream name to the observers interested in it, with set
//! semantics per name. A name is present if and only if it has at least one
//! observer or was pinned by an explicit "observe all" registration.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::domain::id::StreamName;

struct Entry<T: ?Sized> {
    observers: Vec<Arc<T>>,
    pinned: bool,
}

impl<T: ?Sized> Entry<T> {
    fn new() -> Self {
        Self {
            observers: Vec::new(),
            pinned: false,
        }
    }

    fn is_vacant(&self) -> bool {
        self.observers.is_empty() && !self.pinned
    }
}

/// Registry of observers keyed by stream name.
///
/// Observer identity is the `Arc` allocation, so the same observer can be
/// registered under many names but only once per name.
pub struct ObserverRegistry<T: ?Sized> {
    entries: BTreeMap<StreamName, Entry<T>>,
}

impl<T: ?Sized> ObserverRegistry<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Register `observer` under each name. Returns the names that were not
    /// in the set before.
    pub fn add(&mut self, observer: &Arc<T>, names: &[StreamName]) -> Vec<StreamName> {
        let mut added = Vec::new();
        for name in names {
            let entry = self.entries.entry(name.clone()).or_insert_with(|| {
                added.push(name.clone());
                Entry::new()
            });
            if !entry.observers.iter().any(|o| same(o, observer)) {
                entry.observers.push(Arc::clone(observer));
            }
        }
        added
    }

    /// Unregister `observer` from each name. Returns the names that left the
    /// set. Names the observer was never registered under are ignored.
    pub fn remove(&mut self, observer: &Arc<T>, names: &[StreamName]) -> Vec<StreamName> {
        let mut removed = Vec::new();
        for name in names {
            let Some(entry) = self.entries.get_mut(name) else {
                continue;
            };
            entry.observers.retain(|o| !same(o, observer));
            if entry.is_vacant() {
                self.entries.remove(name);
                removed.push(name.clone());
            }
        }
        removed
    }

    /// Unregister `observer` from every name it is registered under.
    pub fn remove_everywhere(&mut self, observer: &Arc<T>) -> Vec<StreamName> {
        let names: Vec<StreamName> = self
            .entries
            .iter()
            .filter(|(_, e)| e.observers.iter().any(|o| same(o, observer)))
            .map(|(n, _)| n.clone())
            .collect();
        self.remove(observer, &names)
    }

    /// Keep each name in the set without an observer. Returns newly added names.
    pub fn pin(&mut self, names: &[StreamName]) -> Vec<StreamName> {
        let mut added = Vec::new();
        for name in names {
            let entry = self.entries.entry(name.clone()).or_insert_with(|| {
                added.push(name.clone());
                Entry::new()
            });
            entry.pinned = true;
        }
        added
    }

    /// Drop the pin on each name. Returns the names that left the set.
    pub fn unpin(&mut self, names: &[StreamName]) -> Vec<StreamName> {
        let mut removed = Vec::new();
        for name in names {
            let Some(entry) = self.entries.get_mut(name) else {
                continue;
            };
            entry.pinned = false;
            if entry.is_vacant() {
                self.entries.remove(name);
                removed.push(name.clone());
            }
        }
        removed
    }

    /// Snapshot of the observers registered under `name`.
    #[must_use]
    pub fn observers(&self, name: &StreamName) -> Vec<Arc<T>> {
        self.entries
            .get(name)
            .map(|e| e.observers.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_registered(&self, observer: &Arc<T>, name: &StreamName) -> bool {
        self.entries
            .get(name)
            .is_some_and(|e| e.observers.iter().any(|o| same(o, observer)))
    }

    #[must_use]
    pub fn contains(&self, name: &StreamName) -> bool {
        self.entries.contains_key(name)
    }

    #[must_use]
    pub fn names(&self) -> BTreeSet<StreamName> {
        self.entries.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: ?Sized> Default for ObserverRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn same<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

#[cfg(test)]
mod tests {
    use super::*;

    type Observer = dyn Fn() + Send + Sync;

    fn observer() -> Arc<Observer> {
        Arc::new(|| {})
    }

    fn names(list: &[&str]) -> Vec<StreamName> {
        list.iter().map(|n| StreamName::from(*n)).collect()
    }

    #[test]
    fn add_reports_only_new_names() {
        let mut registry = ObserverRegistry::<Observer>::new();
        let (a, b) = (observer(), observer());

        assert_eq!(registry.add(&a, &names(&["x"])), names(&["x"]));
        assert_eq!(registry.add(&b, &names(&["x", "y"])), names(&["y"]));
        assert_eq!(registry.observers(&StreamName::from("x")).len(), 2);
    }

    #[test]
    fn duplicate_registration_is_ignored() {
        let mut registry = ObserverRegistry::<Observer>::new();
        let a = observer();
        registry.add(&a, &names(&["x"]));
        registry.add(&a, &names(&["x"]));
        assert_eq!(registry.observers(&StreamName::from("x")).len(), 1);
    }

    #[test]
    fn last_observer_removal_drops_name() {
        let mut registry = ObserverRegistry::<Observer>::new();
        let (a, b) = (observer(), observer());
        registry.add(&a, &names(&["x"]));
        registry.add(&b, &names(&["x"]));

        assert!(registry.remove(&a, &names(&["x"])).is_empty());
        assert_eq!(registry.remove(&b, &names(&["x"])), names(&["x"]));
        assert!(registry.is_empty());
    }

    #[test]
    fn removing_unregistered_observer_is_noop() {
        let mut registry = ObserverRegistry::<Observer>::new();
        let (a, b) = (observer(), observer());
        registry.add(&a, &names(&["x"]));

        assert!(registry.remove(&b, &names(&["x", "unknown"])).is_empty());
        assert!(registry.is_registered(&a, &StreamName::from("x")));
    }

    #[test]
    fn pinned_name_survives_observer_removal() {
        let mut registry = ObserverRegistry::<Observer>::new();
        let a = observer();
        registry.add(&a, &names(&["x"]));
        assert!(registry.pin(&names(&["x"])).is_empty());

        assert!(registry.remove(&a, &names(&["x"])).is_empty());
        assert!(registry.contains(&StreamName::from("x")));
        assert_eq!(registry.unpin(&names(&["x"])), names(&["x"]));
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_everywhere_clears_all_registrations() {
        let mut registry = ObserverRegistry::<Observer>::new();
        let (a, b) = (observer(), observer());
        registry.add(&a, &names(&["x", "y", "z"]));
        registry.add(&b, &names(&["y"]));

        let removed = registry.remove_everywhere(&a);
        assert_eq!(removed, names(&["x", "z"]));
        assert_eq!(registry.names().len(), 1);
    }
}
