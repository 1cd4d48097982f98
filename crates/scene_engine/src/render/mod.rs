//! Render layer
//!
//! GPU objects are owned through `Arc` and cached per thread:
//!
//! - [`backend`]: the command interface a concrete graphics API implements
//! - [`recording`]: an in-memory backend for tests and headless runs
//! - [`resources`]: reference-counted buffers, textures and friends, plus the
//!   reallocation clock
//! - [`vertex_format`] and [`vao_cache`]: vertex array objects keyed by format
//! - [`sampler`]: sampling state and the sampler cache
//! - [`context`] and [`registry`]: per-thread auxiliary contexts
//! - [`driver`]: the facade used by scene nodes

pub mod backend;
pub mod context;
pub mod driver;
pub mod material;
pub mod recording;
pub mod registry;
pub mod resources;
pub mod sampler;
pub mod vao_cache;
pub mod vertex_format;

pub use backend::{BackendError, BackendHandle, DriverFeature, GraphicsBackend, ObjectKind, PrimitiveType, TextureDescriptor};
pub use context::{AuxContext, TextureStageCache, TransformFeedbackStatus};
pub use driver::{DriverError, DriverStats, MeshBuffer, VideoDriver};
pub use material::{Material, MaterialFlags, MaterialType, TextureLayer, MATERIAL_MAX_TEXTURES};
pub use recording::{BackendCall, RecordingBackend};
pub use registry::{ContextRegistry, SharedContext};
pub use resources::{Framebuffer, GpuBuffer, OcclusionQuery, ReallocationClock, Texture, TransformFeedback};
pub use sampler::{SamplerCache, SamplerKey, SamplingParams};
pub use vao_cache::{CachedVertexArray, VaoCache, VaoCacheStats};
pub use vertex_format::{AttributeBinding, ComponentCount, ComponentType, InputRate, VertexArraySpec, VertexFormatKey, MAX_VERTEX_ATTRIBS};
