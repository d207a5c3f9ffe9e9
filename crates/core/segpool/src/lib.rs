//! Policy-selectable sub-allocation inside bounded memory pools.
//!
//! A [`PoolRegistry`] owns any number of [`Pool`]s. Each pool carves one
//! backing buffer into variable-sized segments using either first-fit or
//! best-fit selection ([`AllocPolicy`]), splits gaps on allocation and
//! coalesces neighbors on deallocation.
//!
//! # Structure
//!
//! - **Node heap** (`segment`): segment descriptors in a flat arena, linked
//!   into a doubly-linked chain ordered by offset. The chain always
//!   partitions the buffer exactly.
//! - **Gap index** (`gap_index`): every free segment, sorted by size and
//!   then by offset, for best-fit lookup.
//! - **Growable arrays** (`growable`): the registry, node heap and gap
//!   index each grow by a fixed factor once a fill threshold is reached
//!   (see [`GrowthPolicy`]).
//!
//! Handles are indices plus generations, never addresses, so growing any
//! array leaves outstanding [`PoolHandle`]s and [`AllocHandle`]s valid.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = PoolRegistry::default();
//! registry.init()?;
//! let pool = registry.open(1000, AllocPolicy::FirstFit)?;
//! let a = registry.allocate(pool, 100)?;
//! registry.deallocate(pool, a)?;
//! registry.close(pool)?;
//! registry.teardown()?;
//! ```
//!
//! Nothing here is thread-safe; callers serialize access to a registry.

pub mod config;
pub mod error;
mod gap_index;
mod growable;
pub mod inspect;
pub mod policy;
pub mod pool;
pub mod registry;
mod segment;
pub mod source;

pub use config::{ConfigError, GrowthPolicy, PoolConfig};
pub use error::{PoolError, Resource, Result};
pub use inspect::{SegmentInfo, Snapshot};
pub use policy::AllocPolicy;
pub use pool::{AllocHandle, Pool, PoolStats};
pub use registry::{PoolHandle, PoolRegistry};
pub use source::{BufferSource, HeapSource};
