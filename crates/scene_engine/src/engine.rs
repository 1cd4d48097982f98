//! Engine tick
//!
//! Couples the scene graph, the video driver and the frame timer.

use std::sync::Arc;

use thiserror::Error;

use crate::config::ConfigError;
use crate::core::config::EngineConfig;
use crate::foundation::collections::ManagerId;
use crate::foundation::time::Timer;
use crate::render::backend::GraphicsBackend;
use crate::render::driver::{DriverError, VideoDriver};
use crate::scene::{FrameReport, SceneError, SceneGraph};

/// Main engine struct
///
/// Owns the scene graph and drives one frame of a scene manager per tick.
#[derive(Debug)]
pub struct Engine {
    /// Scene graph with every manager and node
    pub graph: SceneGraph,

    /// Video driver shared with worker threads
    driver: Arc<VideoDriver>,

    /// Frame timing
    timer: Timer,

    /// Engine configuration
    config: EngineConfig,
}

impl Engine {
    /// Validate `config` and start a driver on `backend`
    pub fn new(config: EngineConfig, backend: Arc<dyn GraphicsBackend>) -> Result<Self, EngineError> {
        config.validate()?;
        let driver = VideoDriver::new(backend, &config.driver, &config.cache)?;
        Self::with_driver(config, Arc::new(driver))
    }

    /// Build an engine around an existing driver
    pub fn with_driver(config: EngineConfig, driver: Arc<VideoDriver>) -> Result<Self, EngineError> {
        config.validate()?;
        log::info!("Initializing engine on {}", driver.name());
        Ok(Self {
            graph: SceneGraph::new(config.scene.clone()),
            driver,
            timer: Timer::new(),
            config,
        })
    }

    /// Advance the timer and draw one frame of `manager`
    pub fn tick(&mut self, manager: ManagerId) -> Result<FrameReport, EngineError> {
        self.timer.update();
        let time_ms = self.timer.time_ms();
        self.tick_at(manager, time_ms)
    }

    /// Draw one frame of `manager` at an explicit engine time
    pub fn tick_at(&mut self, manager: ManagerId, time_ms: u32) -> Result<FrameReport, EngineError> {
        let report = self.graph.draw_all(manager, time_ms, &self.driver)?;
        if !report.failed.is_empty() {
            log::warn!(
                "Frame at {time_ms} ms: {} of {} nodes failed to render",
                report.failed.len(),
                report.registered
            );
        }
        Ok(report)
    }

    /// Video driver
    pub const fn driver(&self) -> &Arc<VideoDriver> {
        &self.driver
    }

    /// Frame timer
    pub const fn timer(&self) -> &Timer {
        &self.timer
    }

    /// Engine configuration
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        log::info!("Engine shutdown after {} frames", self.timer.frame_count());
    }
}

/// Engine-level errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Driver failure
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Scene graph failure
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
