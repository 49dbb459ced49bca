use std::{
    collections::{BTreeMap, BTreeSet},
    mem,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use super::TrackerId;
use crate::merkleize::ChunkTree;

/// Identifies one consumer of change notifications.
///
/// Each [`HashRoot`](crate::hash_root::HashRoot) allocates its own id, so
/// several hashers can observe the same value without sharing state.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Allocates a process-wide unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// The state one observer keeps for one composite: which children changed
/// since it last looked, and the tree it built the last time.
#[derive(Clone, Debug, Default)]
pub struct Listener {
    dirty: BTreeSet<usize>,
    tree: Option<Arc<ChunkTree>>,
}

impl Listener {
    /// Marks child `index` as changed.
    pub fn mark(&mut self, index: usize) {
        self.dirty.insert(index);
    }

    /// The changed children.
    pub fn dirty(&self) -> &BTreeSet<usize> {
        &self.dirty
    }

    /// Removes and returns the changed children.
    pub fn take_dirty(&mut self) -> BTreeSet<usize> {
        mem::take(&mut self.dirty)
    }

    /// The retained tree, if one was stored.
    pub fn tree(&self) -> Option<&Arc<ChunkTree>> {
        self.tree.as_ref()
    }

    /// Removes and returns the retained tree.
    pub fn take_tree(&mut self) -> Option<Arc<ChunkTree>> {
        self.tree.take()
    }

    /// Stores the tree to reuse on the next pass.
    pub fn store_tree(&mut self, tree: Arc<ChunkTree>) {
        self.tree = Some(tree);
    }
}

/// Where a composite sits inside its parent.
///
/// The link does not own the parent; it is only an index into the same
/// [`TrackerArena`](super::TrackerArena).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ParentLink {
    /// The parent's record.
    pub tracker: TrackerId,

    /// The child index of this composite within the parent.
    pub slot: usize,
}

/// The change-tracking record of one composite.
#[derive(Debug, Default)]
pub struct UpdateTracker {
    listeners: BTreeMap<ObserverId, Listener>,
    parent: Option<ParentLink>,
}

impl UpdateTracker {
    /// A record with no listeners and no parent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the listener of `observer`, creating it with `factory` on the
    /// first call.
    pub fn get_or_create_listener<F>(&mut self, observer: ObserverId, factory: F) -> &mut Listener
    where
        F: FnOnce() -> Listener,
    {
        self.listeners.entry(observer).or_insert_with(factory)
    }

    /// The listener of `observer`, if it exists.
    pub fn listener(&self, observer: ObserverId) -> Option<&Listener> {
        self.listeners.get(&observer)
    }

    /// Mutable access to the listener of `observer`, if it exists.
    pub fn listener_mut(&mut self, observer: ObserverId) -> Option<&mut Listener> {
        self.listeners.get_mut(&observer)
    }

    /// Drops the listener of `observer` with its retained tree.
    pub fn remove_listener(&mut self, observer: ObserverId) -> Option<Listener> {
        self.listeners.remove(&observer)
    }

    /// Number of observers with a listener.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Marks child `index` as changed for every listener.
    pub fn mark(&mut self, index: usize) {
        for listener in self.listeners.values_mut() {
            listener.mark(index);
        }
    }

    /// The parent of this composite.
    pub fn parent(&self) -> Option<ParentLink> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: ParentLink) {
        self.parent = Some(parent);
    }

    /// Copies the listeners for a forked composite. The copy has no parent:
    /// the caller links it into the forked tree.
    pub fn fork(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
            parent: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_creation_is_idempotent() {
        let observer = ObserverId::next();
        let mut tracker = UpdateTracker::new();

        tracker.get_or_create_listener(observer, Listener::default).mark(1);
        tracker
            .get_or_create_listener(observer, || panic!("listener recreated"))
            .mark(2);

        assert_eq!(tracker.listener_count(), 1);
        assert_eq!(
            tracker.listener(observer).unwrap().dirty(),
            &BTreeSet::from([1, 2])
        );
    }

    #[test]
    fn marks_reach_every_listener() {
        let (a, b) = (ObserverId::next(), ObserverId::next());
        let mut tracker = UpdateTracker::new();
        tracker.get_or_create_listener(a, Listener::default);
        tracker.get_or_create_listener(b, Listener::default);

        tracker.mark(4);
        assert!(tracker.listener(a).unwrap().dirty().contains(&4));
        assert!(tracker.listener_mut(b).unwrap().take_dirty().contains(&4));
        assert!(tracker.listener(b).unwrap().dirty().is_empty());
    }

    #[test]
    fn fork_copies_listeners_but_not_the_parent() {
        let observer = ObserverId::next();
        let mut tracker = UpdateTracker::new();
        tracker.set_parent(ParentLink {
            tracker: TrackerId::from_raw(0),
            slot: 3,
        });
        tracker
            .get_or_create_listener(observer, Listener::default)
            .mark(7);

        let mut copy = tracker.fork();
        assert!(copy.parent().is_none());
        assert!(copy.listener(observer).unwrap().dirty().contains(&7));

        copy.mark(8);
        assert!(!tracker.listener(observer).unwrap().dirty().contains(&8));
    }
}
