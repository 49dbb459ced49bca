//! Change tracking for large mutable values.
//!
//! Every composite inside a [`TrackedValue`] owns an [`UpdateTracker`]
//! record in the value's [`TrackerArena`]. A record holds one [`Listener`]
//! per observer: the set of children that changed since that observer last
//! hashed the composite, plus the [`ChunkTree`](crate::merkleize::ChunkTree)
//! it built then. Mutations mark the changed child on the composite and on
//! the matching slot of every ancestor, so a hasher only has to revisit the
//! paths that lead to changed leaves.

mod arena;
mod tracked;
mod tracker;

pub use self::{
    arena::{TrackerArena, TrackerId},
    tracked::{TrackedValue, ValueId},
    tracker::{Listener, ObserverId, ParentLink, UpdateTracker},
};
