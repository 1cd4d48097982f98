//! Video driver facade
//!
//! [`VideoDriver`] owns the backend, the reallocation clock and the context
//! registry. Every GPU entry point resolves the calling thread's
//! [`AuxContext`] first and fails with [`DriverError::NoThreadContext`] on
//! threads that never initialized one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

use crate::core::config::{CacheConfig, DriverConfig};
use crate::foundation::math::{Mat4, AABB};
use crate::foundation::sync::lock;

use super::backend::{BackendError, DriverFeature, GraphicsBackend, PrimitiveType, TextureDescriptor};
use super::context::AuxContext;
use super::material::Material;
use super::registry::ContextRegistry;
use super::resources::{Framebuffer, GpuBuffer, OcclusionQuery, ReallocationClock, Texture, TransformFeedback};
use super::vao_cache::VaoCacheStats;
use super::vertex_format::VertexArraySpec;

/// Driver errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The backend failed
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// The calling thread has no auxiliary context
    #[error("Thread {0:?} has no auxiliary context")]
    NoThreadContext(ThreadId),

    /// The calling thread already has an auxiliary context
    #[error("Thread {0:?} already has an auxiliary context")]
    ContextAlreadyInitialized(ThreadId),

    /// Every auxiliary context slot is taken
    #[error("Auxiliary context limit of {0} reached")]
    ContextLimitReached(usize),

    /// Texture unit index out of range
    #[error("Texture unit {0} out of range")]
    InvalidTextureUnit(usize),

    /// Transform feedback cannot be rebound during a capture
    #[error("Transform feedback capture is active")]
    TransformFeedbackActive,
}

/// Geometry for one draw call
#[derive(Debug, Clone)]
pub struct MeshBuffer {
    /// Vertex and index buffers with their formats
    pub spec: VertexArraySpec,
    /// Primitive topology
    pub primitive: PrimitiveType,
    /// Vertices, or indices when an index buffer is attached
    pub element_count: u32,
    /// Instances to draw
    pub instance_count: u32,
    /// Object-space bounds
    pub bounding_box: AABB,
}

impl MeshBuffer {
    /// Single-instance triangle list
    pub fn new(spec: VertexArraySpec, element_count: u32) -> Self {
        Self {
            spec,
            primitive: PrimitiveType::Triangles,
            element_count,
            instance_count: 1,
            bounding_box: AABB::default(),
        }
    }

    /// Set the primitive topology
    #[must_use]
    pub const fn with_primitive(mut self, primitive: PrimitiveType) -> Self {
        self.primitive = primitive;
        self
    }

    /// Set the instance count
    #[must_use]
    pub const fn with_instances(mut self, instance_count: u32) -> Self {
        self.instance_count = instance_count;
        self
    }

    /// Set the object-space bounds
    #[must_use]
    pub const fn with_bounding_box(mut self, bounding_box: AABB) -> Self {
        self.bounding_box = bounding_box;
        self
    }
}

/// Point-in-time driver counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Draw calls issued
    pub draw_calls: u64,
    /// Vertex array cache counters summed over every live context
    pub vao: VaoCacheStats,
    /// Live auxiliary contexts
    pub contexts: usize,
}

/// Video driver
#[derive(Debug)]
pub struct VideoDriver {
    backend: Arc<dyn GraphicsBackend>,
    clock: Arc<ReallocationClock>,
    contexts: ContextRegistry,
    config: DriverConfig,
    draw_calls: AtomicU64,
}

impl VideoDriver {
    /// Create a driver on the process-wide reallocation clock
    ///
    /// The calling thread gets the first auxiliary context.
    pub fn new(
        backend: Arc<dyn GraphicsBackend>,
        config: &DriverConfig,
        cache: &CacheConfig,
    ) -> Result<Self, DriverError> {
        Self::with_clock(backend, config, cache, ReallocationClock::global())
    }

    /// Create a driver on an explicit reallocation clock
    pub fn with_clock(
        backend: Arc<dyn GraphicsBackend>,
        config: &DriverConfig,
        cache: &CacheConfig,
        clock: Arc<ReallocationClock>,
    ) -> Result<Self, DriverError> {
        let contexts = ContextRegistry::new(
            Arc::clone(&backend),
            Arc::clone(&clock),
            cache.clone(),
            config.max_aux_contexts,
            config.screen_size,
        );
        contexts.init_current()?;
        log::info!(
            "Video driver started on {} ({} auxiliary contexts max)",
            backend.name(),
            config.max_aux_contexts
        );

        Ok(Self {
            backend,
            clock,
            contexts,
            config: config.clone(),
            draw_calls: AtomicU64::new(0),
        })
    }

    /// Backend name
    pub fn name(&self) -> &str {
        self.backend.name()
    }

    /// Backend in use
    pub const fn backend(&self) -> &Arc<dyn GraphicsBackend> {
        &self.backend
    }

    /// Reallocation clock shared by this driver's buffers
    pub const fn clock(&self) -> &Arc<ReallocationClock> {
        &self.clock
    }

    /// Context registry
    pub const fn contexts(&self) -> &ContextRegistry {
        &self.contexts
    }

    /// Driver configuration
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Whether the backend supports `feature`
    pub fn query_feature(&self, feature: DriverFeature) -> bool {
        self.backend.query_feature(feature)
    }

    /// Create an auxiliary context for the calling thread
    pub fn init_aux_context(&self) -> Result<(), DriverError> {
        self.contexts.init_current().map(|_| ())
    }

    /// Release and remove the calling thread's auxiliary context
    pub fn deinit_aux_context(&self) -> bool {
        self.contexts.deinit_current()
    }

    /// Run `f` against the calling thread's context
    pub fn with_context<R>(&self, f: impl FnOnce(&mut AuxContext) -> R) -> Result<R, DriverError> {
        self.contexts.with_current(f)
    }

    /// Allocate a GPU buffer of `size` bytes
    pub fn create_buffer(&self, size: usize) -> Result<Arc<GpuBuffer>, DriverError> {
        Ok(GpuBuffer::new(Arc::clone(&self.backend), Arc::clone(&self.clock), size)?)
    }

    /// Create a texture
    pub fn create_texture(&self, descriptor: TextureDescriptor) -> Result<Arc<Texture>, DriverError> {
        Ok(Texture::new(Arc::clone(&self.backend), descriptor)?)
    }

    /// Create an occlusion query
    pub fn create_occlusion_query(&self) -> Result<Arc<OcclusionQuery>, DriverError> {
        Ok(OcclusionQuery::new(Arc::clone(&self.backend))?)
    }

    /// Create a transform feedback object
    pub fn create_transform_feedback(&self) -> Result<Arc<TransformFeedback>, DriverError> {
        Ok(TransformFeedback::new(Arc::clone(&self.backend))?)
    }

    /// Create a framebuffer and register it with the calling thread's context
    pub fn add_framebuffer(&self, width: u32, height: u32) -> Result<Arc<Framebuffer>, DriverError> {
        let context = self.contexts.current()?;
        let framebuffer = Framebuffer::new(Arc::clone(&self.backend), (width, height))?;
        lock(&context).add_framebuffer(Arc::clone(&framebuffer));
        Ok(framebuffer)
    }

    /// Unregister a framebuffer from the calling thread's context
    pub fn remove_framebuffer(&self, framebuffer: &Arc<Framebuffer>) -> Result<bool, DriverError> {
        self.with_context(|ctx| ctx.remove_framebuffer(framebuffer))
    }

    /// Unregister every framebuffer of the calling thread's context
    pub fn remove_all_framebuffers(&self) -> Result<(), DriverError> {
        self.with_context(AuxContext::remove_all_framebuffers)
    }

    /// Select the render target of the calling thread
    pub fn set_render_target(&self, framebuffer: Option<&Arc<Framebuffer>>) -> Result<bool, DriverError> {
        self.with_context(|ctx| ctx.set_render_target(framebuffer))
    }

    /// Size of the calling thread's render target
    pub fn current_render_target_size(&self) -> Result<(u32, u32), DriverError> {
        self.with_context(|ctx| ctx.render_target_size())
    }

    /// Bind or unbind transform feedback on the calling thread
    pub fn bind_transform_feedback(&self, feedback: Option<&Arc<TransformFeedback>>) -> Result<(), DriverError> {
        self.with_context(|ctx| ctx.bind_transform_feedback(feedback))?
    }

    /// Start capturing on the calling thread
    pub fn begin_transform_feedback(
        &self,
        feedback: &Arc<TransformFeedback>,
        primitive: PrimitiveType,
    ) -> Result<(), DriverError> {
        self.with_context(|ctx| ctx.begin_transform_feedback(feedback, primitive))?
    }

    /// Pause the calling thread's capture
    pub fn pause_transform_feedback(&self) -> Result<bool, DriverError> {
        self.with_context(AuxContext::pause_transform_feedback)
    }

    /// Resume the calling thread's capture
    pub fn resume_transform_feedback(&self) -> Result<bool, DriverError> {
        self.with_context(AuxContext::resume_transform_feedback)
    }

    /// End the calling thread's capture
    pub fn end_transform_feedback(&self) -> Result<bool, DriverError> {
        self.with_context(AuxContext::end_transform_feedback)
    }

    /// Set the world matrix used by the calling thread's next draws
    pub fn set_world_transform(&self, matrix: &Mat4) -> Result<(), DriverError> {
        self.with_context(|ctx| ctx.set_world_transform(matrix))
    }

    /// Draw a mesh buffer with `material`
    ///
    /// Resolves the vertex array through the calling thread's cache, binds
    /// every texture layer and issues one draw.
    pub fn draw_mesh_buffer(&self, mesh: &MeshBuffer, material: &Material) -> Result<(), DriverError> {
        self.with_context(|ctx| -> Result<(), DriverError> {
            ctx.set_active_vao(&mesh.spec)?;
            for (unit, layer) in material.textures.iter().enumerate() {
                ctx.set_active_texture(unit, layer.as_ref())?;
            }
            Ok(())
        })??;

        self.backend.draw(
            mesh.primitive,
            mesh.element_count,
            mesh.spec.index_buffer().is_some(),
            mesh.instance_count,
        );
        self.draw_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Snapshot of the driver counters
    pub fn stats(&self) -> DriverStats {
        let mut stats = DriverStats {
            draw_calls: self.draw_calls.load(Ordering::Relaxed),
            ..DriverStats::default()
        };
        for context in self.contexts.all() {
            let vao = lock(&context).vao_stats();
            stats.vao.hits += vao.hits;
            stats.vao.misses += vao.misses;
            stats.vao.evictions += vao.evictions;
            stats.contexts += 1;
        }
        stats
    }
}

impl Drop for VideoDriver {
    fn drop(&mut self) {
        log::info!("Video driver on {} shut down", self.backend.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::ObjectKind;
    use crate::render::material::TextureLayer;
    use crate::render::recording::{BackendCall, RecordingBackend};
    use crate::render::vertex_format::{AttributeBinding, ComponentCount, ComponentType};

    fn driver() -> (Arc<RecordingBackend>, VideoDriver) {
        let recording = Arc::new(RecordingBackend::new());
        let driver = VideoDriver::with_clock(
            recording.clone(),
            &DriverConfig::default(),
            &CacheConfig::default(),
            Arc::new(ReallocationClock::new()),
        )
        .unwrap();
        (recording, driver)
    }

    fn triangle(driver: &VideoDriver) -> MeshBuffer {
        let positions = driver.create_buffer(36).unwrap();
        let spec = VertexArraySpec::new()
            .with_attribute(0, AttributeBinding::new(positions, ComponentType::Float, ComponentCount::Three));
        MeshBuffer::new(spec, 3)
    }

    #[test]
    fn test_driver_creates_context_for_constructing_thread() {
        let (_, driver) = driver();
        assert_eq!(driver.contexts().len(), 1);
        assert!(driver.contexts().current().is_ok());
        assert!(matches!(
            driver.init_aux_context(),
            Err(DriverError::ContextAlreadyInitialized(_))
        ));
    }

    #[test]
    fn test_draw_mesh_buffer_binds_and_draws() {
        let (recording, driver) = driver();
        let mesh = triangle(&driver);
        let mut material = Material::new();
        material.textures[0] = Some(TextureLayer::new(
            driver.create_texture(TextureDescriptor::new("diffuse", 8, 8)).unwrap(),
        ));

        driver.draw_mesh_buffer(&mesh, &material).unwrap();
        driver.draw_mesh_buffer(&mesh, &material).unwrap();

        let stats = driver.stats();
        assert_eq!(stats.draw_calls, 2);
        assert_eq!(stats.vao.misses, 1);
        assert_eq!(stats.vao.hits, 1);
        assert_eq!(
            recording.count_calls(|call| matches!(call, BackendCall::BindTextureUnit { .. })),
            1
        );
        assert_eq!(
            recording.calls().last(),
            Some(&BackendCall::Draw {
                primitive: PrimitiveType::Triangles,
                count: 3,
                indexed: false,
                instances: 1,
            })
        );
    }

    #[test]
    fn test_draw_reports_exhaustion() {
        let (recording, driver) = driver();
        recording.set_object_budget(ObjectKind::VertexArray, 0);
        let result = driver.draw_mesh_buffer(&triangle(&driver), &Material::new());
        assert_eq!(
            result,
            Err(DriverError::Backend(BackendError::OutOfResources(ObjectKind::VertexArray)))
        );
        assert_eq!(driver.stats().draw_calls, 0);
    }

    #[test]
    fn test_draw_without_context_fails() {
        let (_, driver) = driver();
        let driver = Arc::new(driver);
        let mesh = triangle(&driver);
        let worker = Arc::clone(&driver);
        let result = std::thread::spawn(move || worker.draw_mesh_buffer(&mesh, &Material::new()))
            .join()
            .unwrap();
        assert!(matches!(result, Err(DriverError::NoThreadContext(_))));
    }

    #[test]
    fn test_worker_thread_gets_independent_context() {
        let (_, driver) = driver();
        let driver = Arc::new(driver);
        let mesh = triangle(&driver);
        let worker = Arc::clone(&driver);
        std::thread::spawn(move || {
            worker.init_aux_context().unwrap();
            worker.draw_mesh_buffer(&mesh, &Material::new()).unwrap();
            assert!(worker.deinit_aux_context());
        })
        .join()
        .unwrap();

        assert_eq!(driver.contexts().len(), 1);
        let own_cache = driver.with_context(|ctx| ctx.vao_cache().len()).unwrap();
        assert_eq!(own_cache, 0);
    }

    #[test]
    fn test_framebuffers_through_driver() {
        let (_, driver) = driver();
        let framebuffer = driver.add_framebuffer(64, 32).unwrap();
        assert!(driver.set_render_target(Some(&framebuffer)).unwrap());
        assert_eq!(driver.current_render_target_size().unwrap(), (64, 32));

        driver.remove_all_framebuffers().unwrap();
        assert_eq!(driver.current_render_target_size().unwrap(), (1280, 720));
        assert_eq!(Arc::strong_count(&framebuffer), 1);
    }

    #[test]
    fn test_query_feature_forwards_to_backend() {
        let (recording, driver) = driver();
        recording.disable_feature(DriverFeature::MultiDrawIndirectCount);
        assert!(!driver.query_feature(DriverFeature::MultiDrawIndirectCount));
        assert!(driver.query_feature(DriverFeature::AlphaToCoverage));
    }
}
