//! Free segments sorted by size, then by address.

use crate::config::GrowthPolicy;
use crate::error::{Resource, Result};
use crate::growable::GrowableArray;
use crate::segment::{SegmentId, SegmentList};

/// One free segment, keyed by `(size, offset)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GapEntry {
    pub(crate) size: usize,
    pub(crate) offset: usize,
    pub(crate) segment: SegmentId,
}

impl GapEntry {
    fn sorts_before(&self, other: &Self) -> bool {
        (self.size, self.offset) < (other.size, other.offset)
    }
}

/// Sorted index over every gap of a pool.
///
/// Each mutation adds or removes exactly one entry, so a single insertion
/// pass keeps the array sorted.
#[derive(Debug)]
pub(crate) struct GapIndex {
    entries: GrowableArray<GapEntry>,
}

impl GapIndex {
    pub(crate) fn new(policy: GrowthPolicy) -> Result<Self> {
        Ok(Self {
            entries: GrowableArray::new(policy, Resource::GapIndex)?,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    pub(crate) fn entries(&self) -> &[GapEntry] {
        &self.entries
    }

    /// Size of the largest gap, or 0.
    pub(crate) fn largest(&self) -> usize {
        self.entries.last().map_or(0, |e| e.size)
    }

    /// Grows per the fill factor and makes room for one more entry.
    pub(crate) fn reserve(&mut self) -> Result<()> {
        self.entries.grow_if_filled(self.entries.len())?;
        self.entries.reserve_one()
    }

    /// Appends an entry and moves it left into sorted position.
    ///
    /// The caller must have secured room with [`reserve`](Self::reserve)
    /// or by a preceding [`remove`](Self::remove).
    pub(crate) fn insert(&mut self, entry: GapEntry) {
        let mut i = self.entries.push_reserved(entry);
        while i > 0 && entry.sorts_before(&self.entries[i - 1]) {
            self.entries.swap(i, i - 1);
            i -= 1;
        }
    }

    /// Removes the entry referring to `segment`.
    ///
    /// # Panics
    ///
    /// Panics if the index is empty or has no entry for `segment`; both
    /// mean the index and the segment chain disagree.
    pub(crate) fn remove(&mut self, segment: SegmentId) {
        assert!(!self.entries.is_empty(), "remove from empty gap index");
        let pos = self
            .entries
            .iter()
            .position(|e| e.segment == segment)
            .unwrap_or_else(|| panic!("gap index has no entry for {segment:?}"));
        self.entries.remove(pos);
    }

    /// Smallest gap of at least `size` bytes; lowest address among ties.
    pub(crate) fn best_fit(&self, size: usize) -> Option<SegmentId> {
        self.entries
            .iter()
            .find(|e| e.size >= size)
            .map(|e| e.segment)
    }

    /// Discards every entry and re-indexes each gap found on the chain.
    pub(crate) fn rebuild(&mut self, segments: &SegmentList) {
        let before = self.entries.len();
        self.entries.clear();
        for (id, seg) in segments.iter().filter(|(_, s)| s.is_gap()) {
            self.insert(GapEntry {
                size: seg.size,
                offset: seg.offset,
                segment: id,
            });
        }
        debug_assert_eq!(before, self.entries.len(), "gap count changed on rebuild");
        tracing::debug!(gaps = self.entries.len(), "rebuilt gap index");
    }
}
