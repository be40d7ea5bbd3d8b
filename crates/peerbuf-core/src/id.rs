//! Strongly-typed identifiers used across the allocator.
//!
//! Diagnostics key handed-out buffers by region id rather than by address, so
//! a region keeps its id for as long as it is recycled through the pool.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! new_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(v: u64) -> Self {
                Self(v)
            }
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

new_id!(RegionId);

impl RegionId {
    /// Id carried by buffers that never came from a pool (wrapped external memory).
    pub const DETACHED: RegionId = RegionId::new(0);

    pub const fn is_detached(self) -> bool {
        self.0 == 0
    }
}
