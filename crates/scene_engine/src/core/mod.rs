//! Settings shared by the scene graph, the render layer and the engine tick

pub mod config;

pub use config::{CacheConfig, Config, ConfigError, DriverConfig, EngineConfig, SceneConfig, SweepPolicy};
