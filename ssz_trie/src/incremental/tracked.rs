use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use log::trace;
use parking_lot::Mutex;

use super::{ObserverId, ParentLink, TrackerArena, UpdateTracker};
use crate::{
    codec::{Codec, CodecError, CodecKind, CodecResult},
    value::{Composite, Uint, Value},
};

/// Identity of a [`TrackedValue`], used to key cached roots.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ValueId(u64);

impl ValueId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A value whose composites report their changes, so that hashing it again
/// after a mutation only revisits the changed paths.
///
/// All mutation goes through `&mut self`. Every mutation bumps the
/// [`generation`](Self::generation), which invalidates roots cached for the
/// previous one.
#[derive(Debug)]
pub struct TrackedValue {
    id: ValueId,
    generation: u64,
    codec: Arc<Codec>,
    value: Value,
    arena: Mutex<TrackerArena>,
}

impl TrackedValue {
    /// Validates `value` against `codec` and starts tracking it.
    pub fn new(codec: Arc<Codec>, mut value: Value) -> CodecResult<Self> {
        codec.validate(&value)?;

        let mut arena = TrackerArena::new();
        attach(&codec, &mut value, &mut arena, None);
        trace!(
            "tracking {} with {} records",
            codec.description(),
            arena.len()
        );

        Ok(Self {
            id: ValueId::next(),
            generation: 0,
            codec,
            value,
            arena: Mutex::new(arena),
        })
    }

    /// The identity of this value. Forks get a new one.
    pub fn id(&self) -> ValueId {
        self.id
    }

    /// Number of mutations applied so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The codec of the root shape.
    pub fn codec(&self) -> &Arc<Codec> {
        &self.codec
    }

    /// The current value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The value at `path`, where each step is a child index.
    pub fn get(&self, path: &[usize]) -> Option<&Value> {
        path.iter()
            .try_fold(&self.value, |value, &i| value.as_composite()?.get(i))
    }

    /// Number of change-tracking records.
    pub fn tracker_count(&self) -> usize {
        self.arena.lock().len()
    }

    /// Drops every listener `observer` holds on this value, along with the
    /// trees it retained. A later hash by the same observer starts over.
    pub fn forget(&self, observer: ObserverId) -> usize {
        self.arena.lock().remove_listeners(observer)
    }

    pub(crate) fn arena(&self) -> &Mutex<TrackerArena> {
        &self.arena
    }

    /// Stops tracking and returns the plain value.
    pub fn into_value(mut self) -> Value {
        detach(&mut self.value, self.arena.get_mut());
        self.value
    }

    /// Replaces the value at `path`. An empty path replaces the whole value.
    pub fn set(&mut self, path: &[usize], value: Value) -> CodecResult<()> {
        let Some((&index, parent_path)) = path.split_last() else {
            return self.replace_root(value);
        };

        let arena = self.arena.get_mut();
        let (codec, parent) = composite_at(&self.codec, &mut self.value, parent_path)?;
        let invalid = || CodecError::InvalidPath(path.to_vec());
        let tracker = parent.tracker.ok_or_else(invalid)?;
        if index >= parent.len() {
            return Err(invalid());
        }
        codec.validate_child(index, &value)?;

        let mut value = value;
        if let Some(child_codec) = codec.child(index) {
            attach(
                child_codec,
                &mut value,
                arena,
                Some(ParentLink {
                    tracker,
                    slot: index,
                }),
            );
        }
        let mut old = std::mem::replace(&mut parent.children_mut()[index], value);
        detach(&mut old, arena);

        arena.child_updated(tracker, index);
        self.generation += 1;
        Ok(())
    }

    /// Applies `f` to the integer at `path`.
    pub fn update_uint<F>(&mut self, path: &[usize], f: F) -> CodecResult<()>
    where
        F: FnOnce(&Uint) -> Uint,
    {
        let current = self
            .get(path)
            .ok_or_else(|| CodecError::InvalidPath(path.to_vec()))?;
        let updated = match current {
            Value::Uint(u) => f(u),
            other => return Err(CodecError::shape_mismatch("uint", other)),
        };
        self.set(path, Value::Uint(updated))
    }

    /// Appends an element to the list at `path`.
    pub fn push(&mut self, path: &[usize], element: Value) -> CodecResult<()> {
        let arena = self.arena.get_mut();
        let (codec, target, link) = locate(&self.codec, &mut self.value, path)?;
        let not_a_list = || CodecError::NotAList(codec.description().to_string());
        let bound = codec.bound().filter(|b| b.variable).ok_or_else(not_a_list)?;

        match (codec.kind(), target) {
            (CodecKind::Bytes(_), Value::Bytes(bytes)) => {
                bound.check(bytes.len() + 1)?;
                match element {
                    Value::Uint(Uint::U8(byte)) => bytes.push(byte),
                    other => return Err(CodecError::shape_mismatch("uint8", &other)),
                }
                mark_link(arena, link);
            }
            (CodecKind::Bits(_), Value::Bits(bits)) => {
                bound.check(bits.len() + 1)?;
                match element {
                    Value::Bool(bit) => bits.push(bit),
                    other => return Err(CodecError::shape_mismatch("bit", &other)),
                }
                mark_link(arena, link);
            }
            (CodecKind::Packed { .. } | CodecKind::Composite { .. }, Value::Composite(list)) => {
                let index = list.len();
                bound.check(index + 1)?;
                codec.validate_child(index, &element)?;
                let tracker = list
                    .tracker
                    .ok_or_else(|| CodecError::InvalidPath(path.to_vec()))?;

                let mut element = element;
                if let Some(child_codec) = codec.child(index) {
                    attach(
                        child_codec,
                        &mut element,
                        arena,
                        Some(ParentLink {
                            tracker,
                            slot: index,
                        }),
                    );
                }
                list.children_mut().push(element);
                arena.child_updated(tracker, index);
            }
            _ => return Err(not_a_list()),
        }

        self.generation += 1;
        Ok(())
    }

    /// Removes and returns the last element of the list at `path`.
    pub fn pop(&mut self, path: &[usize]) -> CodecResult<Value> {
        let arena = self.arena.get_mut();
        let (codec, target, link) = locate(&self.codec, &mut self.value, path)?;
        let not_a_list = || CodecError::NotAList(codec.description().to_string());
        let empty = || CodecError::InvalidPath(path.to_vec());
        if !codec.bound().is_some_and(|b| b.variable) {
            return Err(not_a_list());
        }

        let popped = match target {
            Value::Bytes(bytes) => {
                let byte = bytes.pop().ok_or_else(empty)?;
                mark_link(arena, link);
                Value::from(byte)
            }
            Value::Bits(bits) => {
                let bit = bits.pop().ok_or_else(empty)?;
                mark_link(arena, link);
                Value::Bool(bit)
            }
            Value::Composite(list) => {
                let tracker = list.tracker.ok_or_else(empty)?;
                let mut element = list.children_mut().pop().ok_or_else(empty)?;
                detach(&mut element, arena);
                arena.child_updated(tracker, list.len());
                element
            }
            _ => return Err(not_a_list()),
        };

        self.generation += 1;
        Ok(popped)
    }

    /// Copies the value. The copy keeps every listener's state, so hashing
    /// it reuses the work already done for this value, but it has its own
    /// identity and changes to one never reach the other.
    pub fn fork(&self) -> Self {
        let arena = self.arena.lock();
        let mut forked_arena = TrackerArena::new();
        let mut value = self.value.clone();
        fork_trackers(&self.value, &mut value, &arena, &mut forked_arena, None);

        Self {
            id: ValueId::next(),
            generation: self.generation,
            codec: self.codec.clone(),
            value,
            arena: Mutex::new(forked_arena),
        }
    }

    fn replace_root(&mut self, mut value: Value) -> CodecResult<()> {
        self.codec.validate(&value)?;

        let arena = self.arena.get_mut();
        detach(&mut self.value, arena);
        attach(&self.codec, &mut value, arena, None);
        self.value = value;
        self.generation += 1;
        Ok(())
    }
}

/// Walks `path` from the root, returning the codec and value found there and
/// the link to their parent.
fn locate<'a>(
    mut codec: &'a Arc<Codec>,
    mut value: &'a mut Value,
    path: &[usize],
) -> CodecResult<(&'a Arc<Codec>, &'a mut Value, Option<ParentLink>)> {
    let mut link = None;
    for (depth, &index) in path.iter().enumerate() {
        let invalid = || CodecError::InvalidPath(path[..=depth].to_vec());
        let Value::Composite(composite) = value else {
            return Err(invalid());
        };
        let tracker = composite.tracker.ok_or_else(invalid)?;
        codec = codec.child(index).ok_or_else(invalid)?;
        value = composite.children_mut().get_mut(index).ok_or_else(invalid)?;
        link = Some(ParentLink {
            tracker,
            slot: index,
        });
    }

    Ok((codec, value, link))
}

fn composite_at<'a>(
    codec: &'a Arc<Codec>,
    value: &'a mut Value,
    path: &[usize],
) -> CodecResult<(&'a Arc<Codec>, &'a mut Composite)> {
    let (codec, value, _) = locate(codec, value, path)?;
    match value.as_composite_mut() {
        Some(composite) => Ok((codec, composite)),
        None => Err(CodecError::InvalidPath(path.to_vec())),
    }
}

fn mark_link(arena: &mut TrackerArena, link: Option<ParentLink>) {
    if let Some(link) = link {
        arena.child_updated(link.tracker, link.slot);
    }
}

/// Gives every composite in `value` a fresh record.
fn attach(codec: &Codec, value: &mut Value, arena: &mut TrackerArena, parent: Option<ParentLink>) {
    let Value::Composite(composite) = value else {
        return;
    };
    if !codec.is_composite() {
        return;
    }

    let id = arena.insert(UpdateTracker::new());
    if let Some(link) = parent {
        arena.set_parent(id, link);
    }
    composite.tracker = Some(id);

    for (slot, child) in composite.children_mut().iter_mut().enumerate() {
        if let Some(child_codec) = codec.child(slot) {
            attach(
                child_codec,
                child,
                arena,
                Some(ParentLink { tracker: id, slot }),
            );
        }
    }
}

/// Releases the records of every composite in `value`.
fn detach(value: &mut Value, arena: &mut TrackerArena) {
    let Value::Composite(composite) = value else {
        return;
    };
    if let Some(id) = composite.tracker.take() {
        arena.release(id);
    }
    for child in composite.children_mut() {
        detach(child, arena);
    }
}

fn fork_trackers(
    source: &Value,
    copy: &mut Value,
    arena: &TrackerArena,
    forked: &mut TrackerArena,
    parent: Option<ParentLink>,
) {
    let (Value::Composite(source), Value::Composite(copy)) = (source, copy) else {
        return;
    };
    let Some(source_id) = source.tracker else {
        return;
    };

    let record = arena
        .get(source_id)
        .map(UpdateTracker::fork)
        .unwrap_or_default();
    let id = forked.insert(record);
    if let Some(link) = parent {
        forked.set_parent(id, link);
    }
    copy.tracker = Some(id);

    for (slot, (s, c)) in source
        .children()
        .iter()
        .zip(copy.children_mut())
        .enumerate()
    {
        fork_trackers(s, c, arena, forked, Some(ParentLink { tracker: id, slot }));
    }
}
