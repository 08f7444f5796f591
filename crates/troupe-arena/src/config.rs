//! Arena configuration parameters.

use crate::error::ArenaError;

/// Configuration for the node arena.
///
/// The arena starts with `initial_capacity` slots and doubles whenever a
/// claim finds no free slot, up to `max_capacity`. Capacity never shrinks,
/// so an index that was once valid stays valid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Number of slots allocated at construction.
    ///
    /// Default: 64. Must be at least 1.
    pub initial_capacity: usize,

    /// Upper bound on the slot count.
    ///
    /// Default: 1_048_576. Must be at least `initial_capacity` and fit in
    /// a `u32` slot index.
    pub max_capacity: usize,
}

impl ArenaConfig {
    /// Default initial slot count.
    pub const DEFAULT_INITIAL_CAPACITY: usize = 64;

    /// Default slot ceiling.
    pub const DEFAULT_MAX_CAPACITY: usize = 1 << 20;

    /// Create a growable config starting at `initial_capacity` slots.
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            initial_capacity,
            max_capacity: Self::DEFAULT_MAX_CAPACITY.max(initial_capacity),
        }
    }

    /// Create a fixed-size config that never grows.
    pub fn fixed(capacity: usize) -> Self {
        Self {
            initial_capacity: capacity,
            max_capacity: capacity,
        }
    }

    /// Whether the arena may grow past its initial capacity.
    pub fn is_growable(&self) -> bool {
        self.max_capacity > self.initial_capacity
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ArenaError> {
        if self.initial_capacity == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: "initial_capacity must be at least 1".into(),
            });
        }
        if self.max_capacity < self.initial_capacity {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "max_capacity ({}) is below initial_capacity ({})",
                    self.max_capacity, self.initial_capacity
                ),
            });
        }
        if u32::try_from(self.max_capacity).is_err() {
            return Err(ArenaError::InvalidConfig {
                reason: format!("max_capacity {} exceeds u32::MAX", self.max_capacity),
            });
        }
        Ok(())
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INITIAL_CAPACITY)
    }
}
