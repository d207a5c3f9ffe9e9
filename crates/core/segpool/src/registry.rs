//! The set of open pools.
//!
//! A [`PoolRegistry`] has an explicit lifecycle: [`init`](PoolRegistry::init)
//! makes it usable, [`teardown`](PoolRegistry::teardown) releases its slot
//! array once every pool is closed. Slots are reused after
//! [`close`](PoolRegistry::close) and the slot array never shrinks while the
//! registry is initialized.

use crate::config::PoolConfig;
use crate::error::{PoolError, Resource, Result};
use crate::growable::GrowableArray;
use crate::inspect::Snapshot;
use crate::policy::AllocPolicy;
use crate::pool::{AllocHandle, Pool};
use crate::source::{BufferSource, HeapSource};

/// Names one open pool.
///
/// Each registry slot carries a generation that is bumped on close, and the
/// registry an epoch that is bumped on init, so a handle to a closed pool
/// never reaches a later pool in the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    epoch: u32,
    slot: usize,
    generation: u32,
}

impl PoolHandle {
    /// Registry slot the pool occupies.
    pub const fn slot(self) -> usize {
        self.slot
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    pool: Option<Pool>,
}

/// Owner of every open pool.
#[derive(Debug)]
pub struct PoolRegistry<S: BufferSource = HeapSource> {
    config: PoolConfig,
    source: S,
    epoch: u32,
    slots: Option<GrowableArray<Slot>>,
}

impl Default for PoolRegistry<HeapSource> {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl PoolRegistry<HeapSource> {
    /// Creates an uninitialized registry drawing buffers from the heap.
    pub fn new(config: PoolConfig) -> Self {
        Self::with_source(config, HeapSource)
    }
}

impl<S: BufferSource> PoolRegistry<S> {
    /// Creates an uninitialized registry drawing buffers from `source`.
    pub fn with_source(config: PoolConfig, source: S) -> Self {
        Self {
            config,
            source,
            epoch: 0,
            slots: None,
        }
    }

    /// Growth policies applied to the registry and to new pools.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// The buffer source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// `true` between a successful [`init`](Self::init) and
    /// [`teardown`](Self::teardown).
    pub fn is_initialized(&self) -> bool {
        self.slots.is_some()
    }

    /// Number of currently open pools.
    pub fn open_pools(&self) -> usize {
        self.slots
            .as_ref()
            .map_or(0, |slots| slots.iter().filter(|s| s.pool.is_some()).count())
    }

    /// Allocates the slot array with its initial capacity.
    ///
    /// # Errors
    ///
    /// - [`PoolError::AlreadyInitialized`] if called twice without a
    ///   teardown in between.
    /// - [`PoolError::Exhausted`] if the slot array cannot be allocated.
    pub fn init(&mut self) -> Result<()> {
        if self.slots.is_some() {
            tracing::warn!("pool registry initialized twice");
            return Err(PoolError::AlreadyInitialized);
        }
        let slots = GrowableArray::new(self.config.registry, Resource::Registry)?;
        self.epoch = self.epoch.wrapping_add(1);
        tracing::debug!(
            epoch = self.epoch,
            capacity = slots.capacity(),
            "pool registry initialized"
        );
        self.slots = Some(slots);
        Ok(())
    }

    /// Releases the slot array.
    ///
    /// # Errors
    ///
    /// - [`PoolError::NotInitialized`] if the registry is not initialized.
    /// - [`PoolError::PoolsStillOpen`] if any pool has not been closed.
    pub fn teardown(&mut self) -> Result<()> {
        if self.slots.is_none() {
            tracing::warn!("teardown of uninitialized pool registry");
            return Err(PoolError::NotInitialized);
        }
        let open = self.open_pools();
        if open > 0 {
            tracing::warn!(open, "teardown with pools still open");
            return Err(PoolError::PoolsStillOpen { open });
        }
        self.slots = None;
        tracing::debug!("pool registry torn down");
        Ok(())
    }

    /// Opens a pool of `size` bytes in the first empty slot.
    ///
    /// # Errors
    ///
    /// - [`PoolError::NotInitialized`] if the registry is not initialized.
    /// - [`PoolError::InvalidSize`] if `size` is zero.
    /// - [`PoolError::Exhausted`] if the slot array, the buffer or the
    ///   pool's bookkeeping cannot be allocated. Nothing acquired along the
    ///   way is kept.
    pub fn open(&mut self, size: usize, policy: AllocPolicy) -> Result<PoolHandle> {
        let open = self.open_pools();
        let slots = self.slots.as_mut().ok_or(PoolError::NotInitialized)?;
        if size == 0 {
            return Err(PoolError::InvalidSize);
        }

        slots.grow_if_filled(open)?;
        let vacant = slots.iter().position(|s| s.pool.is_none());
        if vacant.is_none() {
            slots.reserve_one()?;
        }

        let pool = Pool::new(size, policy, &self.config, &mut self.source)?;
        let slot = match vacant {
            Some(slot) => {
                slots[slot].pool = Some(pool);
                slot
            }
            None => slots.push_reserved(Slot {
                generation: 0,
                pool: Some(pool),
            }),
        };

        tracing::debug!(slot, size, %policy, "opened pool");
        Ok(PoolHandle {
            epoch: self.epoch,
            slot,
            generation: slots[slot].generation,
        })
    }

    /// Closes an empty pool and releases its buffer.
    ///
    /// # Errors
    ///
    /// - [`PoolError::InvalidHandle`] if `handle` does not name an open pool.
    /// - [`PoolError::NotEmpty`] if the pool has live allocations or more
    ///   than one gap.
    pub fn close(&mut self, handle: PoolHandle) -> Result<()> {
        let pool = self.pool(handle)?;
        let (allocs, gaps) = (pool.num_allocs(), pool.num_gaps());
        if allocs > 0 || gaps != 1 {
            tracing::warn!(slot = handle.slot, allocs, gaps, "refusing to close busy pool");
            return Err(PoolError::NotEmpty { allocs, gaps });
        }

        let slots = self.slots.as_mut().ok_or(PoolError::NotInitialized)?;
        let slot = &mut slots[handle.slot];
        let pool = slot.pool.take().ok_or(PoolError::InvalidHandle)?;
        slot.generation = slot.generation.wrapping_add(1);
        self.source.release(pool.into_buffer());
        tracing::debug!(slot = handle.slot, "closed pool");
        Ok(())
    }

    /// The open pool named by `handle`.
    ///
    /// # Errors
    ///
    /// - [`PoolError::NotInitialized`] if the registry is not initialized.
    /// - [`PoolError::InvalidHandle`] if `handle` is stale or foreign.
    pub fn pool(&self, handle: PoolHandle) -> Result<&Pool> {
        let slots = self.slots.as_ref().ok_or(PoolError::NotInitialized)?;
        if handle.epoch != self.epoch {
            return Err(PoolError::InvalidHandle);
        }
        match slots.get(handle.slot) {
            Some(Slot {
                generation,
                pool: Some(pool),
            }) if *generation == handle.generation => Ok(pool),
            _ => Err(PoolError::InvalidHandle),
        }
    }

    /// Mutable access to the open pool named by `handle`.
    ///
    /// # Errors
    ///
    /// Same as [`pool`](Self::pool).
    pub fn pool_mut(&mut self, handle: PoolHandle) -> Result<&mut Pool> {
        let slots = self.slots.as_mut().ok_or(PoolError::NotInitialized)?;
        if handle.epoch != self.epoch {
            return Err(PoolError::InvalidHandle);
        }
        match slots.get_mut(handle.slot) {
            Some(Slot {
                generation,
                pool: Some(pool),
            }) if *generation == handle.generation => Ok(pool),
            _ => Err(PoolError::InvalidHandle),
        }
    }

    /// Allocates `size` bytes from the pool named by `pool`.
    ///
    /// # Errors
    ///
    /// See [`pool`](Self::pool) and [`Pool::allocate`].
    pub fn allocate(&mut self, pool: PoolHandle, size: usize) -> Result<AllocHandle> {
        self.pool_mut(pool)?.allocate(size)
    }

    /// Frees an allocation of the pool named by `pool`.
    ///
    /// # Errors
    ///
    /// See [`pool`](Self::pool) and [`Pool::deallocate`].
    pub fn deallocate(&mut self, pool: PoolHandle, alloc: AllocHandle) -> Result<()> {
        self.pool_mut(pool)?.deallocate(alloc)
    }

    /// Layout snapshot of the pool named by `pool`.
    ///
    /// # Errors
    ///
    /// See [`pool`](Self::pool).
    pub fn inspect(&self, pool: PoolHandle) -> Result<Snapshot> {
        Ok(self.pool(pool)?.inspect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GrowthPolicy;

    /// Buffer source that refuses requests once its budget is spent.
    #[derive(Debug, Default)]
    struct CountingSource {
        budget: Option<usize>,
        acquired: usize,
        released: usize,
    }

    impl BufferSource for CountingSource {
        fn acquire(&mut self, size: usize) -> Option<Box<[u8]>> {
            if self.budget.is_some_and(|b| self.acquired >= b) {
                return None;
            }
            self.acquired += 1;
            Some(vec![0; size].into_boxed_slice())
        }

        fn release(&mut self, _buffer: Box<[u8]>) {
            self.released += 1;
        }
    }

    fn registry() -> PoolRegistry {
        let mut registry = PoolRegistry::default();
        registry.init().unwrap();
        registry
    }

    #[test]
    fn lifecycle_misuse() {
        let mut registry = PoolRegistry::default();
        assert_eq!(registry.teardown(), Err(PoolError::NotInitialized));
        assert_eq!(
            registry.open(10, AllocPolicy::FirstFit),
            Err(PoolError::NotInitialized)
        );
        registry.init().unwrap();
        assert_eq!(registry.init(), Err(PoolError::AlreadyInitialized));
        registry.teardown().unwrap();
        assert!(!registry.is_initialized());
        assert_eq!(
            registry.open(10, AllocPolicy::FirstFit),
            Err(PoolError::NotInitialized)
        );
        registry.init().unwrap();
        assert!(registry.open(10, AllocPolicy::FirstFit).is_ok());
    }

    #[test]
    fn teardown_refuses_open_pools() {
        let mut registry = registry();
        let pool = registry.open(10, AllocPolicy::FirstFit).unwrap();
        assert_eq!(
            registry.teardown(),
            Err(PoolError::PoolsStillOpen { open: 1 })
        );
        registry.close(pool).unwrap();
        assert!(registry.teardown().is_ok());
    }

    #[test]
    fn close_requires_empty_pool() {
        let mut registry = registry();
        let pool = registry.open(100, AllocPolicy::FirstFit).unwrap();
        let a = registry.allocate(pool, 10).unwrap();
        assert_eq!(
            registry.close(pool),
            Err(PoolError::NotEmpty { allocs: 1, gaps: 1 })
        );
        registry.deallocate(pool, a).unwrap();
        registry.close(pool).unwrap();
        assert_eq!(registry.close(pool), Err(PoolError::InvalidHandle));
        assert_eq!(registry.allocate(pool, 1), Err(PoolError::InvalidHandle));
    }

    #[test]
    fn handles_do_not_survive_reinit() {
        let mut registry = registry();
        let old = registry.open(10, AllocPolicy::FirstFit).unwrap();
        registry.close(old).unwrap();
        registry.teardown().unwrap();
        registry.init().unwrap();
        let new = registry.open(10, AllocPolicy::FirstFit).unwrap();
        assert_eq!(new.slot(), old.slot());
        assert_eq!(registry.pool(old).unwrap_err(), PoolError::InvalidHandle);
        assert!(registry.pool(new).is_ok());
    }

    #[test]
    fn closed_slot_is_reused_with_new_generation() {
        let mut registry = registry();
        let first = registry.open(10, AllocPolicy::FirstFit).unwrap();
        let second = registry.open(10, AllocPolicy::BestFit).unwrap();
        registry.close(first).unwrap();
        let third = registry.open(20, AllocPolicy::FirstFit).unwrap();
        assert_eq!(third.slot(), first.slot());
        assert_ne!(third, first);
        assert_eq!(registry.pool(first).unwrap_err(), PoolError::InvalidHandle);
        assert_eq!(registry.pool(third).unwrap().total_size(), 20);
        assert_eq!(registry.pool(second).unwrap().policy(), AllocPolicy::BestFit);
        assert_eq!(registry.open_pools(), 2);
    }

    #[test]
    fn registry_grows_past_initial_capacity() {
        let config = PoolConfig {
            registry: GrowthPolicy::new(2),
            ..PoolConfig::default()
        };
        let mut registry = PoolRegistry::new(config);
        registry.init().unwrap();
        let handles: Vec<_> = (0..10)
            .map(|_| registry.open(8, AllocPolicy::FirstFit).unwrap())
            .collect();
        assert_eq!(registry.open_pools(), 10);
        for h in handles {
            registry.close(h).unwrap();
        }
        registry.teardown().unwrap();
    }

    #[test]
    fn capped_registry_reports_exhaustion() {
        let config = PoolConfig {
            registry: GrowthPolicy::new(2).with_max_capacity(2),
            ..PoolConfig::default()
        };
        let mut registry = PoolRegistry::new(config);
        registry.init().unwrap();
        registry.open(8, AllocPolicy::FirstFit).unwrap();
        registry.open(8, AllocPolicy::FirstFit).unwrap();
        assert_eq!(
            registry.open(8, AllocPolicy::FirstFit),
            Err(PoolError::Exhausted(Resource::Registry))
        );
        assert_eq!(registry.open_pools(), 2);
    }

    #[test]
    fn failed_bookkeeping_releases_buffer() {
        let config = PoolConfig {
            node_heap: GrowthPolicy::new(0).with_max_capacity(0),
            ..PoolConfig::default()
        };
        let mut registry = PoolRegistry::with_source(config, CountingSource::default());
        registry.init().unwrap();
        assert_eq!(
            registry.open(16, AllocPolicy::FirstFit),
            Err(PoolError::Exhausted(Resource::NodeHeap))
        );
        assert_eq!(registry.source().acquired, 1);
        assert_eq!(registry.source().released, 1);
        assert_eq!(registry.open_pools(), 0);
    }

    #[test]
    fn buffer_shortage_fails_open() {
        let source = CountingSource {
            budget: Some(1),
            ..CountingSource::default()
        };
        let mut registry = PoolRegistry::with_source(PoolConfig::default(), source);
        registry.init().unwrap();
        let pool = registry.open(16, AllocPolicy::FirstFit).unwrap();
        assert_eq!(
            registry.open(16, AllocPolicy::FirstFit),
            Err(PoolError::Exhausted(Resource::Buffer))
        );
        registry.close(pool).unwrap();
        assert_eq!(registry.source().released, 1);
    }
}
