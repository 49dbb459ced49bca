use log::trace;

use super::{ObserverId, ParentLink, UpdateTracker};

/// Index of a record in a [`TrackerArena`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TrackerId(usize);

impl TrackerId {
    pub(crate) const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// The slot of the record in its arena.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Owns the [`UpdateTracker`] records of one tracked value.
///
/// Records refer to their parents by [`TrackerId`], never by pointer, so the
/// whole graph is owned in one place. Released slots are reused.
#[derive(Debug, Default)]
pub struct TrackerArena {
    records: Vec<Option<UpdateTracker>>,
    free: Vec<usize>,
}

impl TrackerArena {
    /// An empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record and returns its id.
    pub fn insert(&mut self, tracker: UpdateTracker) -> TrackerId {
        match self.free.pop() {
            Some(slot) => {
                self.records[slot] = Some(tracker);
                TrackerId(slot)
            }
            None => {
                self.records.push(Some(tracker));
                TrackerId(self.records.len() - 1)
            }
        }
    }

    /// Removes a record, freeing its slot.
    pub fn release(&mut self, id: TrackerId) -> Option<UpdateTracker> {
        let tracker = self.records.get_mut(id.0)?.take()?;
        self.free.push(id.0);
        Some(tracker)
    }

    /// The record at `id`.
    pub fn get(&self, id: TrackerId) -> Option<&UpdateTracker> {
        self.records.get(id.0)?.as_ref()
    }

    /// Mutable access to the record at `id`.
    pub fn get_mut(&mut self, id: TrackerId) -> Option<&mut UpdateTracker> {
        self.records.get_mut(id.0)?.as_mut()
    }

    /// Links `child` into its parent.
    pub fn set_parent(&mut self, child: TrackerId, link: ParentLink) {
        if let Some(tracker) = self.get_mut(child) {
            tracker.set_parent(link);
        }
    }

    /// Marks child `index` of `id` as changed, then marks the slot of each
    /// ancestor on the way to the root.
    pub fn child_updated(&mut self, id: TrackerId, index: usize) {
        let mut next = Some(ParentLink {
            tracker: id,
            slot: index,
        });
        let mut depth = 0;
        while let Some(link) = next {
            let Some(tracker) = self.get_mut(link.tracker) else {
                break;
            };
            tracker.mark(link.slot);
            next = tracker.parent();
            depth += 1;
        }
        trace!("propagated change of child {} through {} records", index, depth);
    }

    /// Drops the listeners of `observer` from every record and returns how
    /// many there were.
    pub fn remove_listeners(&mut self, observer: ObserverId) -> usize {
        let removed = self
            .records
            .iter_mut()
            .flatten()
            .filter_map(|tracker| tracker.remove_listener(observer))
            .count();
        trace!("dropped {} listeners of {:?}", removed, observer);
        removed
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.records.len() - self.free.len()
    }

    /// Returns `true` if the arena holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
