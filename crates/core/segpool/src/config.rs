//! Growth parameters for the registry and per-pool backing arrays.
//!
//! Every resizable array in the crate (the registry's slot array, a pool's
//! node heap and its gap index) carries its own [`GrowthPolicy`]. The three
//! are bundled in a [`PoolConfig`], which can be deserialized from TOML:
//!
//! ```toml
//! [node-heap]
//! initial-capacity = 64
//! fill-factor = 0.5
//!
//! [gap-index]
//! max-capacity = 1024
//! ```

use serde::{Deserialize, Serialize};

/// Default fill factor shared by every array.
pub const DEFAULT_FILL_FACTOR: f32 = 0.75;

/// Default expansion factor shared by every array.
pub const DEFAULT_EXPAND_FACTOR: usize = 2;

/// Initial slot count of the pool registry.
pub const REGISTRY_INIT_CAPACITY: usize = 20;

/// Initial descriptor count of a pool's node heap.
pub const NODE_HEAP_INIT_CAPACITY: usize = 40;

/// Initial entry count of a pool's gap index.
pub const GAP_INDEX_INIT_CAPACITY: usize = 40;

/// When and how far a growable array expands.
///
/// An array grows by `expand_factor` whenever `len / capacity >= fill_factor`.
/// If `max_capacity` is set, growth is clamped to it and fails once the
/// array is already at the cap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct GrowthPolicy {
    /// Capacity reserved when the array is created.
    pub initial_capacity: usize,
    /// Occupancy ratio in `(0, 1]` that triggers growth.
    pub fill_factor: f32,
    /// Capacity multiplier applied on growth (at least 2).
    pub expand_factor: usize,
    /// Hard upper bound on capacity, if any.
    pub max_capacity: Option<usize>,
}

impl GrowthPolicy {
    /// Creates a policy with the default fill and expansion factors.
    pub const fn new(initial_capacity: usize) -> Self {
        Self {
            initial_capacity,
            fill_factor: DEFAULT_FILL_FACTOR,
            expand_factor: DEFAULT_EXPAND_FACTOR,
            max_capacity: None,
        }
    }

    /// Returns a copy of this policy capped at `max` entries.
    #[must_use]
    pub const fn with_max_capacity(mut self, max: usize) -> Self {
        self.max_capacity = Some(max);
        self
    }

    /// Returns `true` if an array holding `len` live entries in `capacity`
    /// slots has reached the fill threshold.
    #[allow(clippy::cast_precision_loss)]
    pub fn should_grow(&self, len: usize, capacity: usize) -> bool {
        capacity == 0 || (len as f64 / capacity as f64) >= f64::from(self.fill_factor)
    }

    /// Returns the capacity to grow to from `capacity`, or `None` if the
    /// array may not grow any further.
    ///
    /// A policy whose expansion would not raise the capacity (an
    /// `expand_factor` below 2 that slipped past validation) never grows.
    pub fn next_capacity(&self, capacity: usize) -> Option<usize> {
        let grown = capacity.checked_mul(self.expand_factor)?.max(1);
        let next = match self.max_capacity {
            Some(max) => grown.min(max),
            None => grown,
        };
        (next > capacity).then_some(next)
    }

    fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        if self.initial_capacity == 0 {
            return Err(ConfigError::new(name, "initial-capacity must be non-zero"));
        }
        if !(self.fill_factor > 0.0 && self.fill_factor <= 1.0) {
            return Err(ConfigError::new(name, "fill-factor must be in (0, 1]"));
        }
        if self.expand_factor < 2 {
            return Err(ConfigError::new(name, "expand-factor must be at least 2"));
        }
        if self
            .max_capacity
            .is_some_and(|max| max < self.initial_capacity)
        {
            return Err(ConfigError::new(
                name,
                "max-capacity must not be below initial-capacity",
            ));
        }
        Ok(())
    }
}

impl Default for GrowthPolicy {
    fn default() -> Self {
        Self::new(NODE_HEAP_INIT_CAPACITY)
    }
}

/// Growth policies for the registry and for every pool it opens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct PoolConfig {
    /// Policy for the registry's slot array.
    pub registry: GrowthPolicy,
    /// Policy for each pool's segment descriptor array.
    pub node_heap: GrowthPolicy,
    /// Policy for each pool's gap index.
    pub gap_index: GrowthPolicy,
}

impl PoolConfig {
    /// Checks every policy for values that would stall or break growth.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first offending section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.registry.validate("registry")?;
        self.node_heap.validate("node-heap")?;
        self.gap_index.validate("gap-index")
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            registry: GrowthPolicy::new(REGISTRY_INIT_CAPACITY),
            node_heap: GrowthPolicy::new(NODE_HEAP_INIT_CAPACITY),
            gap_index: GrowthPolicy::new(GAP_INDEX_INIT_CAPACITY),
        }
    }
}

/// A rejected [`PoolConfig`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[{section}] {reason}")]
pub struct ConfigError {
    section: &'static str,
    reason: &'static str,
}

impl ConfigError {
    const fn new(section: &'static str, reason: &'static str) -> Self {
        Self { section, reason }
    }

    /// The config section that failed validation.
    pub const fn section(&self) -> &'static str {
        self.section
    }
}
