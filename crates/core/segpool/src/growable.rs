//! Capacity-tracked array with fill-factor driven growth.

use core::ops::{Deref, DerefMut};

use crate::config::GrowthPolicy;
use crate::error::{PoolError, Resource, Result};

/// A `Vec` whose capacity is managed explicitly by a [`GrowthPolicy`].
///
/// The logical capacity is tracked separately from `Vec::capacity` so that
/// growth happens exactly when the policy says so, and so that a failed
/// reservation surfaces as [`PoolError::Exhausted`] instead of aborting.
#[derive(Debug)]
pub(crate) struct GrowableArray<T> {
    items: Vec<T>,
    capacity: usize,
    policy: GrowthPolicy,
    resource: Resource,
}

impl<T> GrowableArray<T> {
    /// Creates an empty array with the policy's initial capacity reserved.
    pub(crate) fn new(policy: GrowthPolicy, resource: Resource) -> Result<Self> {
        let capacity = match policy.max_capacity {
            Some(max) => policy.initial_capacity.min(max),
            None => policy.initial_capacity,
        };
        let mut items = Vec::new();
        items
            .try_reserve_exact(capacity)
            .map_err(|_| PoolError::Exhausted(resource))?;
        Ok(Self {
            items,
            capacity,
            policy,
            resource,
        })
    }

    /// Logical capacity.
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Grows if `fill` live entries reach the policy's fill threshold.
    ///
    /// `fill` is supplied by the caller because not every slot of the
    /// array is necessarily live (retired node-heap slots, empty registry
    /// slots). Returns `true` if the array grew. Failing to grow is only an
    /// error once no reserved room is left.
    pub(crate) fn grow_if_filled(&mut self, fill: usize) -> Result<bool> {
        if !self.policy.should_grow(fill, self.capacity) {
            return Ok(false);
        }
        match self.grow() {
            Ok(()) => Ok(true),
            Err(err) if self.items.len() >= self.capacity => Err(err),
            Err(_) => Ok(false),
        }
    }

    /// Ensures there is room to push one more item.
    pub(crate) fn reserve_one(&mut self) -> Result<()> {
        if self.items.len() < self.capacity {
            return Ok(());
        }
        self.grow()
    }

    /// Appends an item, growing first if the array is full.
    pub(crate) fn push(&mut self, item: T) -> Result<usize> {
        self.reserve_one()?;
        let index = self.items.len();
        self.items.push(item);
        Ok(index)
    }

    /// Appends an item into room secured by an earlier
    /// [`reserve_one`](Self::reserve_one).
    ///
    /// # Panics
    ///
    /// Panics if the array is at capacity.
    pub(crate) fn push_reserved(&mut self, item: T) -> usize {
        assert!(
            self.items.len() < self.capacity,
            "push_reserved without reserved room"
        );
        let index = self.items.len();
        self.items.push(item);
        index
    }

    /// Removes the item at `index`, shifting later items left.
    pub(crate) fn remove(&mut self, index: usize) -> T {
        self.items.remove(index)
    }

    /// Drops every item, keeping the capacity.
    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }

    fn grow(&mut self) -> Result<()> {
        let next = self
            .policy
            .next_capacity(self.capacity)
            .ok_or(PoolError::Exhausted(self.resource))?;
        self.items
            .try_reserve_exact(next - self.items.len())
            .map_err(|_| PoolError::Exhausted(self.resource))?;
        tracing::debug!(
            resource = %self.resource,
            from = self.capacity,
            to = next,
            "growing array"
        );
        self.capacity = next;
        Ok(())
    }
}

impl<T> Deref for GrowableArray<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T> DerefMut for GrowableArray<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.items
    }
}
