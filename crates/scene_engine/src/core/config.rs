//! Settings records, one per subsystem, nested under [`EngineConfig`]
//!
//! Missing fields in a settings file fall back to the defaults below.

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};

/// Default render priority of a freshly created scene node
pub const DEFAULT_RENDER_PRIORITY: u32 = 0x8000_0000;

/// Render queue ordering and defaults for new nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Sort the transparent pass back-to-front when a camera position is set
    pub sort_transparent_by_distance: bool,
    /// Render priority given to new scene nodes
    pub default_render_priority: u32,
}

impl SceneConfig {
    /// Create a new scene configuration
    pub const fn new() -> Self {
        Self {
            sort_transparent_by_distance: true,
            default_render_priority: DEFAULT_RENDER_PRIORITY,
        }
    }

    /// Enable or disable distance sorting of transparent nodes
    pub const fn with_transparent_sorting(mut self, enabled: bool) -> Self {
        self.sort_transparent_by_distance = enabled;
        self
    }

    /// Set the render priority given to new scene nodes
    pub const fn with_default_render_priority(mut self, priority: u32) -> Self {
        self.default_render_priority = priority;
        self
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// How many stale entries a cache sweep may evict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SweepPolicy {
    /// Stop after the first eviction; amortizes sweeping across frames
    #[default]
    ExitOnFirstDelete,
    /// Evict every stale entry in one pass
    Full,
}

/// Ceilings and staleness thresholds for the per-context GPU object caches.
/// Staleness is measured in reallocation-clock ticks for vertex arrays and in
/// cache lookups for samplers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Vertex array cache size above which sweeping starts
    pub vao_cache_ceiling: usize,
    /// Ticks an entry may go unvalidated before it is stale
    pub vao_staleness_threshold: u64,
    /// Eviction policy used by the automatic sweep after each bind
    pub sweep_policy: SweepPolicy,
    /// Sampler cache size above which sweeping starts
    pub sampler_cache_ceiling: usize,
    /// Lookups a sampler may go unused before it is stale
    pub sampler_staleness_threshold: u64,
}

impl CacheConfig {
    /// Create a new cache configuration
    pub const fn new() -> Self {
        Self {
            vao_cache_ceiling: 1 << 14,
            vao_staleness_threshold: 1000,
            sweep_policy: SweepPolicy::ExitOnFirstDelete,
            sampler_cache_ceiling: 1024,
            sampler_staleness_threshold: 4096,
        }
    }

    /// Set the vertex array cache ceiling and staleness threshold
    pub const fn with_vao_limits(mut self, ceiling: usize, staleness: u64) -> Self {
        self.vao_cache_ceiling = ceiling;
        self.vao_staleness_threshold = staleness;
        self
    }

    /// Set the sampler cache ceiling and staleness threshold
    pub const fn with_sampler_limits(mut self, ceiling: usize, staleness: u64) -> Self {
        self.sampler_cache_ceiling = ceiling;
        self.sampler_staleness_threshold = staleness;
        self
    }

    /// Set the sweep policy
    pub const fn with_sweep_policy(mut self, policy: SweepPolicy) -> Self {
        self.sweep_policy = policy;
        self
    }

    /// Reject zero limits
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vao_cache_ceiling == 0 {
            return Err(ConfigError::Invalid(
                "vao_cache_ceiling must be at least 1".to_string(),
            ));
        }
        if self.sampler_cache_ceiling == 0 {
            return Err(ConfigError::Invalid(
                "sampler_cache_ceiling must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Limits for [`crate::render::VideoDriver`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Maximum number of threads that may hold an auxiliary context
    pub max_aux_contexts: usize,
    /// Size of the default framebuffer in pixels
    pub screen_size: (u32, u32),
}

impl DriverConfig {
    /// Create a new driver configuration
    pub const fn new() -> Self {
        Self {
            max_aux_contexts: 8,
            screen_size: (1280, 720),
        }
    }

    /// Set the maximum number of auxiliary contexts
    pub const fn with_max_aux_contexts(mut self, max: usize) -> Self {
        self.max_aux_contexts = max;
        self
    }

    /// Set the default framebuffer size
    pub const fn with_screen_size(mut self, width: u32, height: u32) -> Self {
        self.screen_size = (width, height);
        self
    }

    /// Reject zero limits
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_aux_contexts == 0 {
            return Err(ConfigError::Invalid(
                "max_aux_contexts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything [`crate::Engine::new`] needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `env_logger` filter passed to [`crate::foundation::logging::init_with_level`]
    pub log_level: String,
    /// Scene graph configuration
    pub scene: SceneConfig,
    /// GPU object cache configuration
    pub cache: CacheConfig,
    /// Video driver configuration
    pub driver: DriverConfig,
}

impl EngineConfig {
    /// Defaults for every subsystem, logging at `info`
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            scene: SceneConfig::default(),
            cache: CacheConfig::default(),
            driver: DriverConfig::default(),
        }
    }

    /// Replace the log filter
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set the scene configuration
    pub const fn with_scene(mut self, scene: SceneConfig) -> Self {
        self.scene = scene;
        self
    }

    /// Set the cache configuration
    pub const fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Set the driver configuration
    pub const fn with_driver(mut self, driver: DriverConfig) -> Self {
        self.driver = driver;
        self
    }

    /// Check every nested record
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::Invalid("log_level must name a filter".to_string()));
        }
        self.cache.validate()?;
        self.driver.validate()?;
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for EngineConfig {}
