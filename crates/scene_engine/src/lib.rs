//! # Scene Engine
//!
//! A scene-graph renderer core: hierarchical transforms, per-frame
//! animation and render registration, and a per-thread GPU object cache
//! sitting between scene nodes and a graphics backend.
//!
//! Nodes live in [`scene::SceneGraph`], an arena split into managers. Each
//! frame runs three phases per manager: animate, register into the
//! [`scene::RenderQueue`], then render pass by pass through the
//! [`render::VideoDriver`]. The driver keeps one [`render::AuxContext`] per
//! rendering thread holding cached vertex arrays and samplers.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use scene_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::default();
//!     scene_engine::foundation::logging::init_with_level(&config.log_level);
//!
//!     let backend: Arc<dyn GraphicsBackend> = Arc::new(RecordingBackend::new());
//!     let mut engine = Engine::new(config, backend)?;
//!     let manager = engine.graph.create_manager("main");
//!
//!     let ship = engine
//!         .graph
//!         .add_scene_node(manager, None, EmptyNode::new(), NodeDesc::new().with_name("ship"))?;
//!     engine
//!         .graph
//!         .add_animator(ship, AnimatorHandle::new(RotationAnimator::new(Vec3::new(0.0, 90.0, 0.0))));
//!
//!     let report = engine.tick(manager)?;
//!     println!("rendered {} nodes", report.rendered);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;
pub mod scene;

mod engine;

#[cfg(test)]
mod tests;

pub use engine::{Engine, EngineError};

/// Types most callers need
pub mod prelude {
    pub use crate::{
        core::config::{CacheConfig, DriverConfig, EngineConfig, SceneConfig, SweepPolicy},
        foundation::{
            collections::{ManagerId, NodeId},
            math::{Mat4, Transform, Vec3, AABB},
            time::Timer,
        },
        render::{
            GraphicsBackend, Material, MaterialFlags, MaterialType, MeshBuffer, RecordingBackend, VertexArraySpec,
            VideoDriver,
        },
        scene::{
            AnimatorHandle, EmptyNode, FrameReport, MeshNode, NodeDesc, RotationAnimator, SceneGraph,
            SceneNodeAnimator, SceneNodeKind,
        },
        Engine, EngineError,
    };
}
