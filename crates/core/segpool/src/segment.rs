//! The node heap: segment descriptors linked in address order.
//!
//! Descriptors live in a flat [`GrowableArray`] and refer to each other by
//! index, so growing the array never invalidates a [`SegmentId`] or an
//! [`AllocHandle`](crate::AllocHandle). Slots that drop out of the chain on
//! coalescing are *retired* and kept on a free list for reuse.

use core::ops::Index;

use bitflags::bitflags;

use crate::config::GrowthPolicy;
use crate::error::{Resource, Result};
use crate::growable::GrowableArray;

bitflags! {
    /// State bits of a descriptor slot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct SegmentFlags: u8 {
        /// The slot is part of the current partition (not retired).
        const IN_SERVICE = 1 << 0;
        /// The segment is handed out to a caller.
        const ALLOCATED = 1 << 1;
    }
}

/// Index of a descriptor slot in the node heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct SegmentId(pub(crate) usize);

/// A contiguous byte range of the pool.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Segment {
    /// Byte offset of the range within the pool buffer.
    pub(crate) offset: usize,
    pub(crate) size: usize,
    pub(crate) flags: SegmentFlags,
    /// Bumped every time the segment is handed out.
    pub(crate) generation: u32,
    pub(crate) prev: Option<SegmentId>,
    pub(crate) next: Option<SegmentId>,
}

impl Segment {
    const RETIRED: Self = Self {
        offset: 0,
        size: 0,
        flags: SegmentFlags::empty(),
        generation: 0,
        prev: None,
        next: None,
    };

    pub(crate) fn is_in_service(&self) -> bool {
        self.flags.contains(SegmentFlags::IN_SERVICE)
    }

    pub(crate) fn is_allocated(&self) -> bool {
        self.flags.contains(SegmentFlags::ALLOCATED)
    }

    /// An in-service, unallocated segment.
    pub(crate) fn is_gap(&self) -> bool {
        self.flags == SegmentFlags::IN_SERVICE
    }

    pub(crate) fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Doubly-linked chain of segments over an index arena.
#[derive(Debug)]
pub(crate) struct SegmentList {
    slots: GrowableArray<Segment>,
    /// Retired slot indices available for reuse.
    retired: Vec<SegmentId>,
    /// Number of in-service slots.
    used: usize,
}

impl SegmentList {
    /// Creates a chain holding one free segment of `total` bytes.
    pub(crate) fn new(total: usize, policy: GrowthPolicy) -> Result<Self> {
        let mut slots = GrowableArray::new(policy, Resource::NodeHeap)?;
        slots.push(Segment {
            offset: 0,
            size: total,
            flags: SegmentFlags::IN_SERVICE,
            ..Segment::RETIRED
        })?;
        Ok(Self {
            slots,
            retired: Vec::new(),
            used: 1,
        })
    }

    /// Number of in-service segments.
    pub(crate) fn used(&self) -> usize {
        self.used
    }

    /// Logical capacity of the descriptor array.
    pub(crate) fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Number of descriptor slots ever materialized (in service or retired).
    #[cfg(test)]
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn get(&self, id: SegmentId) -> Option<&Segment> {
        self.slots.get(id.0)
    }

    fn slot_mut(&mut self, id: SegmentId) -> &mut Segment {
        &mut self.slots[id.0]
    }

    /// Grows the descriptor array if the in-service count reached the fill
    /// threshold. Returns `true` if it grew.
    pub(crate) fn grow_if_filled(&mut self) -> Result<bool> {
        self.slots.grow_if_filled(self.used)
    }

    /// Guarantees that the next [`insert_after`](Self::insert_after) has a
    /// slot to claim.
    pub(crate) fn reserve_slot(&mut self) -> Result<()> {
        if self.retired.is_empty() {
            self.slots.reserve_one()?;
        }
        Ok(())
    }

    /// Any in-service slot, found by scanning the array.
    pub(crate) fn any_in_service(&self) -> Option<SegmentId> {
        self.slots
            .iter()
            .position(Segment::is_in_service)
            .map(SegmentId)
    }

    /// The lowest-addressed segment, reached by walking predecessor links.
    pub(crate) fn head(&self) -> SegmentId {
        let mut id = self
            .any_in_service()
            .unwrap_or_else(|| panic!("segment chain has no in-service slot"));
        while let Some(prev) = self[id].prev {
            id = prev;
        }
        id
    }

    /// Walks the chain in address order.
    pub(crate) fn iter(&self) -> Chain<'_> {
        Chain {
            list: self,
            cursor: Some(self.head()),
        }
    }

    /// Marks `id` as handed out and returns its new generation.
    pub(crate) fn mark_allocated(&mut self, id: SegmentId) -> u32 {
        let seg = self.slot_mut(id);
        debug_assert!(seg.is_gap(), "allocating a segment that is not a gap");
        seg.flags.insert(SegmentFlags::ALLOCATED);
        seg.generation = seg.generation.wrapping_add(1);
        seg.generation
    }

    pub(crate) fn mark_free(&mut self, id: SegmentId) {
        self.slot_mut(id).flags.remove(SegmentFlags::ALLOCATED);
    }

    pub(crate) fn set_extent(&mut self, id: SegmentId, offset: usize, size: usize) {
        let seg = self.slot_mut(id);
        seg.offset = offset;
        seg.size = size;
    }

    /// Materializes a free segment directly after `id`.
    ///
    /// The caller must have called [`reserve_slot`](Self::reserve_slot).
    pub(crate) fn insert_after(&mut self, id: SegmentId, offset: usize, size: usize) -> SegmentId {
        let next = self[id].next;
        let segment = Segment {
            offset,
            size,
            flags: SegmentFlags::IN_SERVICE,
            prev: Some(id),
            next,
            ..Segment::RETIRED
        };
        let new_id = if let Some(slot) = self.retired.pop() {
            // Keep the generation counter so stale handles never match.
            let generation = self[slot].generation;
            *self.slot_mut(slot) = Segment {
                generation,
                ..segment
            };
            slot
        } else {
            SegmentId(self.slots.push_reserved(segment))
        };
        if let Some(next) = next {
            self.slot_mut(next).prev = Some(new_id);
        }
        self.slot_mut(id).next = Some(new_id);
        self.used += 1;
        new_id
    }

    /// Splices `id` out of the chain and retires its slot.
    pub(crate) fn retire(&mut self, id: SegmentId) {
        let Segment { prev, next, .. } = self[id];
        if let Some(prev) = prev {
            self.slot_mut(prev).next = next;
        }
        if let Some(next) = next {
            self.slot_mut(next).prev = prev;
        }
        let generation = self[id].generation;
        *self.slot_mut(id) = Segment {
            generation,
            ..Segment::RETIRED
        };
        self.retired.push(id);
        self.used -= 1;
    }
}

impl Index<SegmentId> for SegmentList {
    type Output = Segment;

    fn index(&self, id: SegmentId) -> &Segment {
        &self.slots[id.0]
    }
}

/// Address-ordered iterator over in-service segments.
pub(crate) struct Chain<'a> {
    list: &'a SegmentList,
    cursor: Option<SegmentId>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = (SegmentId, &'a Segment);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let seg = &self.list[id];
        self.cursor = seg.next;
        Some((id, seg))
    }
}
