//! Prelude module for common tile-core types and traits
//!
//! Re-exports the most commonly used types for easy importing with
//! `use cog_tiles::prelude::*;`

pub use crate::cache::{CacheStats, TileCache};
pub use crate::config::{CacheConfig, TileCoreConfig, TileCoreConfigBuilder, TileLoaderConfig};
pub use crate::error::{Result, TileCoreError};
pub use crate::geo::{create_converter, TileCoord, ViewportBounds};
pub use crate::loader::{LoadingStats, TileLoader, TileRecord, TileSource, TileState};
pub use crate::orchestrator::TileOrchestrator;
pub use crate::scheduler::{Scheduler, TimerHandle};

// Common standard library re-exports.
pub use std::{
    sync::Arc,
    time::{Duration, Instant},
};

// FxHashMap/FxHashSet for perf-sensitive lookups, matching the rest of
// this crate's lineage.
pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet, FxHasher};
