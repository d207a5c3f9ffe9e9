//! A single pool: its buffer, policy, counters, node heap and gap index.
//!
//! # Allocation
//!
//! 1. Pick a gap with the pool's [`AllocPolicy`].
//! 2. If the gap must be split, grow the node heap once its fill factor is
//!    reached and rebuild the gap index from the chain.
//! 3. Shrink the gap to the requested size and mark it allocated. Any
//!    remainder becomes a new gap linked directly after it, taking the
//!    index entry the chosen gap gave up.
//!
//! # Deallocation
//!
//! The freed segment absorbs a free successor, then a free predecessor,
//! and the result is re-indexed. Adjacent gaps can only arise next to the
//! segment being freed, so one merge per direction is enough.
//!
//! Every storage reservation happens before the first mutation, so a
//! failed call leaves the pool exactly as it was.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::PoolConfig;
use crate::error::{PoolError, Resource, Result};
use crate::gap_index::{GapEntry, GapIndex};
use crate::policy::AllocPolicy;
use crate::segment::{SegmentId, SegmentList};
use crate::source::BufferSource;

/// Source of [`Pool`] identities; never reused within a process.
static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Names one live allocation inside a pool.
///
/// Handles are stable across node-heap growth and remember which pool
/// issued them. Once the allocation is freed the handle goes stale and is
/// rejected with [`PoolError::NotFound`], even if its descriptor slot is
/// reused. Any other pool rejects it the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocHandle {
    pool: u64,
    index: usize,
    generation: u32,
}

impl AllocHandle {
    /// Descriptor slot the allocation occupies.
    pub const fn index(self) -> usize {
        self.index
    }

    /// Generation of the slot when the allocation was made.
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

/// Point-in-time pool metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Gap selection policy.
    pub policy: AllocPolicy,
    /// Size of the backing buffer in bytes.
    pub total_size: usize,
    /// Bytes currently handed out.
    pub alloc_size: usize,
    /// Live allocations.
    pub num_allocs: usize,
    /// Free segments.
    pub num_gaps: usize,
    /// In-service segment descriptors.
    pub node_count: usize,
    /// Capacity of the descriptor array.
    pub node_capacity: usize,
    /// Capacity of the gap index.
    pub gap_capacity: usize,
}

/// One independently managed buffer.
///
/// Pools are created and destroyed through a
/// [`PoolRegistry`](crate::PoolRegistry).
#[derive(Debug)]
pub struct Pool {
    id: u64,
    buffer: Box<[u8]>,
    policy: AllocPolicy,
    num_allocs: usize,
    alloc_size: usize,
    pub(crate) segments: SegmentList,
    gaps: GapIndex,
}

impl Pool {
    /// Acquires a buffer of `size` bytes and sets up one gap spanning it.
    ///
    /// If the bookkeeping arrays cannot be allocated the buffer is handed
    /// back to `source` before the error is returned.
    pub(crate) fn new<S: BufferSource>(
        size: usize,
        policy: AllocPolicy,
        config: &PoolConfig,
        source: &mut S,
    ) -> Result<Self> {
        if size == 0 {
            return Err(PoolError::InvalidSize);
        }
        let buffer = source
            .acquire(size)
            .ok_or(PoolError::Exhausted(Resource::Buffer))?;
        debug_assert_eq!(buffer.len(), size, "buffer source returned wrong size");

        let bookkeeping = SegmentList::new(size, config.node_heap).and_then(|segments| {
            let mut gaps = GapIndex::new(config.gap_index)?;
            gaps.reserve()?;
            let head = segments.head();
            gaps.insert(GapEntry {
                size,
                offset: 0,
                segment: head,
            });
            Ok((segments, gaps))
        });

        match bookkeeping {
            Ok((segments, gaps)) => Ok(Self {
                id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
                buffer,
                policy,
                num_allocs: 0,
                alloc_size: 0,
                segments,
                gaps,
            }),
            Err(err) => {
                source.release(buffer);
                Err(err)
            }
        }
    }

    /// Tears the pool down, returning its buffer.
    pub(crate) fn into_buffer(self) -> Box<[u8]> {
        self.buffer
    }

    /// Gap selection policy fixed at open time.
    pub fn policy(&self) -> AllocPolicy {
        self.policy
    }

    /// Size of the backing buffer in bytes.
    pub fn total_size(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes currently handed out.
    pub fn alloc_size(&self) -> usize {
        self.alloc_size
    }

    /// Live allocations.
    pub fn num_allocs(&self) -> usize {
        self.num_allocs
    }

    /// Free segments.
    pub fn num_gaps(&self) -> usize {
        self.gaps.len()
    }

    /// Snapshot of every counter and capacity.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            policy: self.policy,
            total_size: self.total_size(),
            alloc_size: self.alloc_size,
            num_allocs: self.num_allocs,
            num_gaps: self.gaps.len(),
            node_count: self.segments.used(),
            node_capacity: self.segments.capacity(),
            gap_capacity: self.gaps.capacity(),
        }
    }

    /// Carves `size` bytes out of a free segment.
    ///
    /// # Errors
    ///
    /// - [`PoolError::InvalidSize`] for a zero-byte request.
    /// - [`PoolError::NoFit`] if no gap is large enough. The pool is left
    ///   unchanged.
    /// - [`PoolError::Exhausted`] if the node heap cannot make room for the
    ///   remainder of a split gap. The pool is left unchanged.
    pub fn allocate(&mut self, size: usize) -> Result<AllocHandle> {
        if size == 0 {
            return Err(PoolError::InvalidSize);
        }
        if self.gaps.is_empty() {
            return Err(self.no_fit(size));
        }

        let id = self
            .policy
            .select(&self.segments, &self.gaps, size)
            .ok_or_else(|| self.no_fit(size))?;

        let gap = self.segments[id];
        let remainder = gap.size - size;
        // A split adds one segment but keeps the gap count, so only the
        // node heap needs room.
        if remainder > 0 {
            if self.segments.grow_if_filled()? {
                self.gaps.rebuild(&self.segments);
            }
            self.segments.reserve_slot()?;
        }

        self.gaps.remove(id);
        self.segments.set_extent(id, gap.offset, size);
        let generation = self.segments.mark_allocated(id);

        if remainder > 0 {
            let offset = gap.offset + size;
            let rest = self.segments.insert_after(id, offset, remainder);
            self.gaps.insert(GapEntry {
                size: remainder,
                offset,
                segment: rest,
            });
        }

        self.num_allocs += 1;
        self.alloc_size += size;

        tracing::trace!(
            policy = %self.policy,
            size,
            offset = gap.offset,
            remainder,
            "allocated segment"
        );
        #[cfg(debug_assertions)]
        self.check_invariants();

        Ok(AllocHandle {
            pool: self.id,
            index: id.0,
            generation,
        })
    }

    /// Returns an allocation to the pool, merging it with free neighbors.
    ///
    /// # Errors
    ///
    /// - [`PoolError::NotFound`] if `handle` does not name a live
    ///   allocation of this pool.
    /// - [`PoolError::Exhausted`] if the gap index cannot grow to hold the
    ///   new gap. The pool is left unchanged.
    pub fn deallocate(&mut self, handle: AllocHandle) -> Result<()> {
        let id = self.locate(handle)?;
        let seg = self.segments[id];

        let next_gap = seg.next.filter(|&n| self.segments[n].is_gap());
        let prev_gap = seg.prev.filter(|&p| self.segments[p].is_gap());
        if next_gap.is_none() && prev_gap.is_none() {
            self.gaps.reserve()?;
        }

        self.segments.mark_free(id);
        self.num_allocs -= 1;
        self.alloc_size -= seg.size;

        let mut offset = seg.offset;
        let mut size = seg.size;

        if let Some(next) = next_gap {
            self.gaps.remove(next);
            size += self.segments[next].size;
            self.segments.retire(next);
            tracing::trace!(offset, size, "merged successor gap");
        }
        if let Some(prev) = prev_gap {
            self.gaps.remove(prev);
            offset = self.segments[prev].offset;
            size += self.segments[prev].size;
            self.segments.retire(prev);
            tracing::trace!(offset, size, "merged predecessor gap");
        }

        self.segments.set_extent(id, offset, size);
        self.gaps.insert(GapEntry {
            size,
            offset,
            segment: id,
        });

        tracing::trace!(freed = seg.size, offset, size, "released segment");
        #[cfg(debug_assertions)]
        self.check_invariants();

        Ok(())
    }

    /// Offset and size of a live allocation.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::NotFound`] for a stale or foreign handle.
    pub fn extent(&self, handle: AllocHandle) -> Result<(usize, usize)> {
        let seg = &self.segments[self.locate(handle)?];
        Ok((seg.offset, seg.size))
    }

    /// Bytes of a live allocation.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::NotFound`] for a stale or foreign handle.
    pub fn region(&self, handle: AllocHandle) -> Result<&[u8]> {
        let (offset, size) = self.extent(handle)?;
        Ok(&self.buffer[offset..offset + size])
    }

    /// Mutable bytes of a live allocation.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::NotFound`] for a stale or foreign handle.
    pub fn region_mut(&mut self, handle: AllocHandle) -> Result<&mut [u8]> {
        let (offset, size) = self.extent(handle)?;
        Ok(&mut self.buffer[offset..offset + size])
    }

    /// Verifies the segment chain, counters and gap index agree.
    ///
    /// # Panics
    ///
    /// Panics describing the first violated invariant.
    pub fn check_invariants(&self) {
        let mut expected_offset = 0;
        let mut prev = None;
        let mut prev_was_gap = false;
        let mut used = 0;
        let mut allocs = 0;
        let mut allocated_bytes = 0;
        let mut gap_count = 0;

        for (id, seg) in self.segments.iter() {
            assert!(seg.is_in_service(), "retired slot {id:?} linked into chain");
            assert_eq!(seg.prev, prev, "broken back link at {id:?}");
            assert_eq!(seg.offset, expected_offset, "segment {id:?} not contiguous");
            assert!(seg.size > 0, "empty segment {id:?}");
            if seg.is_allocated() {
                allocs += 1;
                allocated_bytes += seg.size;
                prev_was_gap = false;
            } else {
                assert!(!prev_was_gap, "uncoalesced gaps at offset {}", seg.offset);
                gap_count += 1;
                prev_was_gap = true;
            }
            expected_offset = seg.end();
            prev = Some(id);
            used += 1;
        }

        assert_eq!(expected_offset, self.total_size(), "chain does not cover pool");
        assert_eq!(used, self.segments.used(), "in-service count mismatch");
        assert_eq!(allocs, self.num_allocs, "allocation count mismatch");
        assert_eq!(allocated_bytes, self.alloc_size, "allocated byte mismatch");
        assert_eq!(gap_count, self.gaps.len(), "gap count mismatch");

        let entries = self.gaps.entries();
        for pair in entries.windows(2) {
            assert!(
                (pair[0].size, pair[0].offset) < (pair[1].size, pair[1].offset),
                "gap index out of order"
            );
        }
        for entry in entries {
            let seg = self
                .segments
                .get(entry.segment)
                .unwrap_or_else(|| panic!("gap entry points past node heap"));
            assert!(seg.is_gap(), "gap entry {:?} is not a gap", entry.segment);
            assert_eq!(
                (seg.size, seg.offset),
                (entry.size, entry.offset),
                "stale gap entry"
            );
        }
    }

    fn locate(&self, handle: AllocHandle) -> Result<SegmentId> {
        if handle.pool != self.id {
            return Err(PoolError::NotFound);
        }
        let id = SegmentId(handle.index);
        match self.segments.get(id) {
            Some(seg) if seg.is_allocated() && seg.generation == handle.generation => Ok(id),
            _ => Err(PoolError::NotFound),
        }
    }

    fn no_fit(&self, requested: usize) -> PoolError {
        PoolError::NoFit {
            requested,
            largest_gap: self.gaps.largest(),
        }
    }
}
