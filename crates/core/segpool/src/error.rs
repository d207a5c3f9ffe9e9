//! Error types for registry and pool operations.

use core::fmt;

/// A backing array or buffer that can fail to grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// The byte buffer backing a pool.
    Buffer,
    /// The segment descriptor array of a pool.
    NodeHeap,
    /// The sorted free-segment index of a pool.
    GapIndex,
    /// The registry's slot array.
    Registry,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffer => write!(f, "pool buffer"),
            Self::NodeHeap => write!(f, "node heap"),
            Self::GapIndex => write!(f, "gap index"),
            Self::Registry => write!(f, "pool registry"),
        }
    }
}

/// Errors reported by [`PoolRegistry`](crate::PoolRegistry) and
/// [`Pool`](crate::Pool).
///
/// Internal bookkeeping inconsistencies are not represented here; they
/// panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// `init` was called on a registry that is already initialized.
    #[error("pool registry already initialized")]
    AlreadyInitialized,
    /// The registry has not been initialized (or was torn down).
    #[error("pool registry not initialized")]
    NotInitialized,
    /// `teardown` was called while pools are still open.
    #[error("{open} pool(s) still open")]
    PoolsStillOpen {
        /// Number of pools still registered.
        open: usize,
    },
    /// `close` was called on a pool with live allocations or fragmented
    /// free space.
    #[error("pool not empty ({allocs} allocation(s), {gaps} gap(s))")]
    NotEmpty {
        /// Live allocations at the time of the call.
        allocs: usize,
        /// Free segments at the time of the call.
        gaps: usize,
    },
    /// The allocation handle does not name a live allocation in this pool.
    #[error("allocation not found")]
    NotFound,
    /// The pool handle does not name an open pool.
    #[error("invalid pool handle")]
    InvalidHandle,
    /// Zero-byte pools and zero-byte allocations are rejected.
    #[error("size must be non-zero")]
    InvalidSize,
    /// No free segment is large enough for the request.
    #[error("no gap fits {requested} bytes (largest gap: {largest_gap} bytes)")]
    NoFit {
        /// Requested size in bytes.
        requested: usize,
        /// Size of the largest free segment, or 0 if there is none.
        largest_gap: usize,
    },
    /// Storage for a backing array or buffer could not be acquired.
    #[error("{0} exhausted")]
    Exhausted(Resource),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            PoolError::NotEmpty { allocs: 1, gaps: 2 }.to_string(),
            "pool not empty (1 allocation(s), 2 gap(s))"
        );
        assert_eq!(
            PoolError::Exhausted(Resource::GapIndex).to_string(),
            "gap index exhausted"
        );
        assert_eq!(
            PoolError::NoFit { requested: 1000, largest_gap: 900 }.to_string(),
            "no gap fits 1000 bytes (largest gap: 900 bytes)"
        );
    }
}
