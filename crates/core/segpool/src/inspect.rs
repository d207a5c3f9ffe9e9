//! Read-only layout snapshots.

use core::fmt;

use crate::pool::Pool;

/// One segment as seen by [`Pool::inspect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Byte offset within the pool buffer.
    pub offset: usize,
    /// Size in bytes.
    pub size: usize,
    /// `true` if handed out, `false` for a gap.
    pub allocated: bool,
}

/// Every segment of a pool in address order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    segments: Vec<SegmentInfo>,
}

impl Snapshot {
    /// Segments in ascending address order.
    pub fn segments(&self) -> &[SegmentInfo] {
        &self.segments
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// `true` if the snapshot holds no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// `(size, allocated)` pairs, the compact form used by tests and tools.
    pub fn layout(&self) -> Vec<(usize, bool)> {
        self.segments.iter().map(|s| (s.size, s.allocated)).collect()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for seg in &self.segments {
            writeln!(
                f,
                "{:>10} {:>10}  {}",
                seg.offset,
                seg.size,
                if seg.allocated { "alloc" } else { "gap" }
            )?;
        }
        Ok(())
    }
}

impl Pool {
    /// Walks the segment chain and records every segment.
    ///
    /// Starts from any in-service descriptor, follows predecessor links to
    /// the head, then successor links to the tail.
    pub fn inspect(&self) -> Snapshot {
        let list = &self.segments;
        let mut cursor = list.any_in_service();
        while let Some(prev) = cursor.and_then(|id| list[id].prev) {
            cursor = Some(prev);
        }

        let mut segments = Vec::with_capacity(list.used());
        while let Some(id) = cursor {
            let seg = &list[id];
            segments.push(SegmentInfo {
                offset: seg.offset,
                size: seg.size,
                allocated: seg.is_allocated(),
            });
            cursor = seg.next;
        }
        debug_assert_eq!(segments.len(), list.used());
        Snapshot { segments }
    }
}

#[cfg(test)]
mod tests {
    use crate::{AllocPolicy, PoolRegistry};

    #[test]
    fn snapshot_follows_address_order() {
        let mut registry = PoolRegistry::default();
        registry.init().unwrap();
        let pool = registry.open(100, AllocPolicy::FirstFit).unwrap();
        let a = registry.allocate(pool, 10).unwrap();
        let _b = registry.allocate(pool, 20).unwrap();
        registry.deallocate(pool, a).unwrap();

        let snap = registry.inspect(pool).unwrap();
        assert_eq!(snap.layout(), vec![(10, false), (20, true), (70, false)]);
        assert_eq!(snap.segments()[2].offset, 30);
        assert_eq!(snap.len(), registry.pool(pool).unwrap().stats().node_count);
    }

    #[test]
    fn display_lists_each_segment() {
        let mut registry = PoolRegistry::default();
        registry.init().unwrap();
        let pool = registry.open(64, AllocPolicy::BestFit).unwrap();
        registry.allocate(pool, 16).unwrap();
        let text = registry.inspect(pool).unwrap().to_string();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("alloc"));
        assert!(lines[1].trim_start().starts_with("16"));
        assert!(lines[1].ends_with("gap"));
    }
}
