//! Layered configuration: defaults, named presets, and a builder for
//! fine overrides, the way configuration is assembled elsewhere in this
//! crate's lineage.

use std::time::Duration;

/// Tunables for cache admission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheConfig {
    pub max_size_mb: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_size_mb: 50 }
    }
}

/// Tunables for viewport-driven loading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileLoaderConfig {
    pub max_concurrent_loads: usize,
    pub max_starts_per_frame: usize,
    pub pan_debounce: Duration,
    pub zoom_debounce: Duration,
    pub fade_duration: Duration,
}

impl Default for TileLoaderConfig {
    fn default() -> Self {
        Self {
            max_concurrent_loads: 4,
            max_starts_per_frame: 2,
            pan_debounce: Duration::from_millis(50),
            zoom_debounce: Duration::from_millis(150),
            fade_duration: Duration::from_millis(250),
        }
    }
}

impl TileLoaderConfig {
    /// Fewer concurrent loads and a gentler per-frame pace, for
    /// constrained hosts (mobile, low-bandwidth).
    pub fn low_resource() -> Self {
        Self {
            max_concurrent_loads: 2,
            max_starts_per_frame: 1,
            pan_debounce: Duration::from_millis(100),
            zoom_debounce: Duration::from_millis(250),
            fade_duration: Duration::from_millis(250),
        }
    }

    /// More aggressive concurrency for hosts with bandwidth and CPU to
    /// spare.
    pub fn high_performance() -> Self {
        Self {
            max_concurrent_loads: 8,
            max_starts_per_frame: 4,
            pan_debounce: Duration::from_millis(30),
            zoom_debounce: Duration::from_millis(100),
            fade_duration: Duration::from_millis(150),
        }
    }

    /// Zero debounce so deterministic tests don't need to wait on a clock.
    pub fn for_testing() -> Self {
        Self {
            max_concurrent_loads: 4,
            max_starts_per_frame: 2,
            pan_debounce: Duration::from_millis(0),
            zoom_debounce: Duration::from_millis(0),
            fade_duration: Duration::from_millis(250),
        }
    }
}

/// Top-level configuration assembled from the per-component configs.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TileCoreConfig {
    pub cache: CacheConfig,
    pub loader: TileLoaderConfig,
}

/// Builder for [`TileCoreConfig`], starting from a preset and allowing
/// targeted overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct TileCoreConfigBuilder {
    config: TileCoreConfig,
}

impl TileCoreConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: TileCoreConfig) -> Self {
        Self { config }
    }

    pub fn cache_size_mb(mut self, mb: usize) -> Self {
        self.config.cache.max_size_mb = mb;
        self
    }

    pub fn max_concurrent_loads(mut self, n: usize) -> Self {
        self.config.loader.max_concurrent_loads = n;
        self
    }

    pub fn max_starts_per_frame(mut self, n: usize) -> Self {
        self.config.loader.max_starts_per_frame = n;
        self
    }

    pub fn pan_debounce(mut self, d: Duration) -> Self {
        self.config.loader.pan_debounce = d;
        self
    }

    pub fn zoom_debounce(mut self, d: Duration) -> Self {
        self.config.loader.zoom_debounce = d;
        self
    }

    pub fn fade_duration(mut self, d: Duration) -> Self {
        self.config.loader.fade_duration = d;
        self
    }

    pub fn build(self) -> TileCoreConfig {
        self.config
    }
}
