//! Per-thread auxiliary render context
//!
//! Each thread that issues GPU work owns one [`AuxContext`]: its current
//! vertex array, vertex array and sampler caches, texture unit bindings,
//! framebuffers and transform feedback state. A context is only ever used by
//! its owning thread; the registry hands it out behind a mutex so teardown
//! from another thread stays sound.

use std::fmt;
use std::sync::Arc;
use std::thread::ThreadId;

use crate::core::config::{CacheConfig, SweepPolicy};
use crate::foundation::math::Mat4;

use super::backend::{BackendError, BackendHandle, GraphicsBackend, PrimitiveType};
use super::driver::DriverError;
use super::material::{TextureLayer, MATERIAL_MAX_TEXTURES};
use super::resources::{Framebuffer, ReallocationClock, Texture, TransformFeedback};
use super::sampler::{SamplerCache, SamplerKey};
use super::vao_cache::{VaoCache, VaoCacheStats};
use super::vertex_format::{VertexArraySpec, VertexFormatKey};

/// Textures currently bound to each unit
#[derive(Debug, Default)]
pub struct TextureStageCache {
    units: [Option<Arc<Texture>>; MATERIAL_MAX_TEXTURES],
}

impl TextureStageCache {
    /// Texture bound to `unit`
    pub fn get(&self, unit: usize) -> Option<&Arc<Texture>> {
        self.units.get(unit).and_then(Option::as_ref)
    }

    /// Bind `texture` to `unit`, acquiring it before the previous one is released
    ///
    /// Returns `false` if `unit` is out of range.
    pub fn set(&mut self, unit: usize, texture: Option<&Arc<Texture>>) -> bool {
        let Some(slot) = self.units.get_mut(unit) else {
            return false;
        };
        let incoming = texture.map(Arc::clone);
        let outgoing = std::mem::replace(slot, incoming);
        drop(outgoing);
        true
    }

    /// Unbind `texture` from every unit; returns the number of units cleared
    pub fn remove(&mut self, texture: &Arc<Texture>) -> usize {
        let mut cleared = 0;
        for slot in &mut self.units {
            if slot.as_ref().is_some_and(|bound| Arc::ptr_eq(bound, texture)) {
                *slot = None;
                cleared += 1;
            }
        }
        cleared
    }

    /// Release every bound texture
    pub fn clear(&mut self) {
        self.units = Default::default();
    }
}

/// Transform feedback capture state of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformFeedbackStatus {
    /// No capture in progress
    #[default]
    Idle,
    /// Capturing
    Running,
    /// Capture started and paused
    Paused,
}

/// GPU state owned by one thread
pub struct AuxContext {
    thread_id: ThreadId,
    backend: Arc<dyn GraphicsBackend>,
    clock: Arc<ReallocationClock>,
    sweep_policy: SweepPolicy,
    current_vao: Option<(VertexFormatKey, BackendHandle)>,
    vao_cache: VaoCache,
    textures: TextureStageCache,
    current_samplers: [Option<SamplerKey>; MATERIAL_MAX_TEXTURES],
    samplers: SamplerCache,
    framebuffers: Vec<Arc<Framebuffer>>,
    current_framebuffer: Option<Arc<Framebuffer>>,
    screen_size: (u32, u32),
    render_target_size: (u32, u32),
    transform_feedback: Option<Arc<TransformFeedback>>,
    transform_feedback_status: TransformFeedbackStatus,
    world_transform: Option<Mat4>,
}

impl AuxContext {
    /// Create an empty context for `thread_id`
    pub fn new(
        thread_id: ThreadId,
        backend: Arc<dyn GraphicsBackend>,
        clock: Arc<ReallocationClock>,
        cache: &CacheConfig,
        screen_size: (u32, u32),
    ) -> Self {
        Self {
            thread_id,
            backend,
            clock,
            sweep_policy: cache.sweep_policy,
            current_vao: None,
            vao_cache: VaoCache::new(cache.vao_cache_ceiling, cache.vao_staleness_threshold),
            textures: TextureStageCache::default(),
            current_samplers: [None; MATERIAL_MAX_TEXTURES],
            samplers: SamplerCache::new(cache.sampler_cache_ceiling, cache.sampler_staleness_threshold),
            framebuffers: Vec::new(),
            current_framebuffer: None,
            screen_size,
            render_target_size: screen_size,
            transform_feedback: None,
            transform_feedback_status: TransformFeedbackStatus::Idle,
            world_transform: None,
        }
    }

    /// Thread owning this context
    pub const fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Make the vertex array for `spec` current, creating it if needed
    ///
    /// Attached buffers are revalidated on every call. After binding, one
    /// sweep of the vertex array cache runs; the new current entry is
    /// protected from it.
    pub fn set_active_vao(&mut self, spec: &VertexArraySpec) -> Result<BackendHandle, BackendError> {
        let key = spec.key();
        let entry = self.vao_cache.get_or_create(&self.backend, key)?;
        entry.bind_buffers(spec, &self.clock);
        let handle = entry.handle();

        if self.current_vao != Some((key, handle)) {
            self.backend.bind_vertex_array(handle);
            self.current_vao = Some((key, handle));
        }

        self.vao_cache.sweep(self.clock.current(), Some(key), self.sweep_policy);
        Ok(handle)
    }

    /// Run one sweep of the vertex array cache, sparing the current entry
    pub fn free_up_vao_cache(&mut self, policy: SweepPolicy) -> usize {
        let current = self.current_vao.map(|(key, _)| key);
        self.vao_cache.sweep(self.clock.current(), current, policy)
    }

    /// Set the world matrix for subsequent draws; unchanged matrices are not resent
    pub fn set_world_transform(&mut self, matrix: &Mat4) {
        if self.world_transform.as_ref() != Some(matrix) {
            self.backend.set_world_transform(matrix);
            self.world_transform = Some(*matrix);
        }
    }

    /// World matrix last sent to the backend
    pub const fn world_transform(&self) -> Option<&Mat4> {
        self.world_transform.as_ref()
    }

    /// Key of the current vertex array
    pub fn current_vao_key(&self) -> Option<VertexFormatKey> {
        self.current_vao.map(|(key, _)| key)
    }

    /// Vertex array cache of this context
    pub const fn vao_cache(&self) -> &VaoCache {
        &self.vao_cache
    }

    /// Vertex array cache counters
    pub const fn vao_stats(&self) -> VaoCacheStats {
        self.vao_cache.stats()
    }

    /// Bind a texture layer to `unit`, or unbind the unit with `None`
    ///
    /// The sampler is resolved through the sampler cache. No backend call is
    /// made when both the texture and the sampler are already bound.
    pub fn set_active_texture(&mut self, unit: usize, layer: Option<&TextureLayer>) -> Result<(), DriverError> {
        if unit >= MATERIAL_MAX_TEXTURES {
            return Err(DriverError::InvalidTextureUnit(unit));
        }
        // unit < 8
        #[allow(clippy::cast_possible_truncation)]
        let backend_unit = unit as u32;

        let Some(layer) = layer else {
            if self.textures.get(unit).is_some() {
                self.backend.bind_texture_unit(backend_unit, None, None);
                self.textures.set(unit, None);
                self.current_samplers[unit] = None;
            }
            return Ok(());
        };

        let (key, sampler) = self.samplers.get_or_create(&self.backend, &layer.sampling)?;
        let same_texture = self
            .textures
            .get(unit)
            .is_some_and(|bound| Arc::ptr_eq(bound, &layer.texture));
        if !same_texture || self.current_samplers[unit] != Some(key) {
            self.backend
                .bind_texture_unit(backend_unit, Some(layer.texture.handle()), Some(sampler));
            self.textures.set(unit, Some(&layer.texture));
            self.current_samplers[unit] = Some(key);
        }

        self.samplers.sweep(&self.current_samplers);
        Ok(())
    }

    /// Texture bound to `unit`
    pub fn bound_texture(&self, unit: usize) -> Option<&Arc<Texture>> {
        self.textures.get(unit)
    }

    /// Number of cached samplers
    pub fn sampler_count(&self) -> usize {
        self.samplers.len()
    }

    /// Register a framebuffer with this context
    pub fn add_framebuffer(&mut self, framebuffer: Arc<Framebuffer>) {
        if !self.owns_framebuffer(&framebuffer) {
            self.framebuffers.push(framebuffer);
        }
    }

    /// Unregister a framebuffer, leaving it first if it is the render target
    pub fn remove_framebuffer(&mut self, framebuffer: &Arc<Framebuffer>) -> bool {
        let Some(index) = self
            .framebuffers
            .iter()
            .position(|owned| Arc::ptr_eq(owned, framebuffer))
        else {
            return false;
        };
        if self
            .current_framebuffer
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, framebuffer))
        {
            self.set_render_target(None);
        }
        self.framebuffers.swap_remove(index);
        true
    }

    /// Unregister every framebuffer and return to the default target
    pub fn remove_all_framebuffers(&mut self) {
        if self.current_framebuffer.is_some() {
            self.set_render_target(None);
        }
        self.framebuffers.clear();
    }

    /// Number of registered framebuffers
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    fn owns_framebuffer(&self, framebuffer: &Arc<Framebuffer>) -> bool {
        self.framebuffers.iter().any(|owned| Arc::ptr_eq(owned, framebuffer))
    }

    /// Render into `framebuffer`, or into the default framebuffer with `None`
    ///
    /// Returns `false` for framebuffers not registered with this context.
    pub fn set_render_target(&mut self, framebuffer: Option<&Arc<Framebuffer>>) -> bool {
        match framebuffer {
            Some(framebuffer) => {
                if !self.owns_framebuffer(framebuffer) {
                    log::warn!(
                        "Framebuffer {} is not registered with this context",
                        framebuffer.handle()
                    );
                    return false;
                }
                let already_bound = self
                    .current_framebuffer
                    .as_ref()
                    .is_some_and(|current| Arc::ptr_eq(current, framebuffer));
                if !already_bound {
                    self.backend.bind_framebuffer(Some(framebuffer.handle()));
                    self.current_framebuffer = Some(Arc::clone(framebuffer));
                }
                self.render_target_size = framebuffer.size();
            }
            None => {
                if self.current_framebuffer.take().is_some() {
                    self.backend.bind_framebuffer(None);
                }
                self.render_target_size = self.screen_size;
            }
        }
        true
    }

    /// Framebuffer currently rendered into, `None` for the default target
    pub const fn current_framebuffer(&self) -> Option<&Arc<Framebuffer>> {
        self.current_framebuffer.as_ref()
    }

    /// Size of the current render target in pixels
    pub const fn render_target_size(&self) -> (u32, u32) {
        self.render_target_size
    }

    /// Bind a transform feedback object, or unbind with `None`
    ///
    /// Fails while a capture is running or paused.
    pub fn bind_transform_feedback(&mut self, feedback: Option<&Arc<TransformFeedback>>) -> Result<(), DriverError> {
        if self.transform_feedback_status != TransformFeedbackStatus::Idle {
            return Err(DriverError::TransformFeedbackActive);
        }
        let unchanged = match (&self.transform_feedback, feedback) {
            (Some(current), Some(next)) => Arc::ptr_eq(current, next),
            (None, None) => true,
            _ => false,
        };
        if !unchanged {
            self.backend
                .bind_transform_feedback(feedback.map(|feedback| feedback.handle()));
            let outgoing = std::mem::replace(&mut self.transform_feedback, feedback.map(Arc::clone));
            drop(outgoing);
        }
        Ok(())
    }

    /// Bind `feedback` and start capturing `primitive`
    pub fn begin_transform_feedback(
        &mut self,
        feedback: &Arc<TransformFeedback>,
        primitive: PrimitiveType,
    ) -> Result<(), DriverError> {
        self.bind_transform_feedback(Some(feedback))?;
        self.backend.begin_transform_feedback(primitive.capture_class());
        self.transform_feedback_status = TransformFeedbackStatus::Running;
        Ok(())
    }

    /// Pause a running capture; returns `false` if none is running
    pub fn pause_transform_feedback(&mut self) -> bool {
        if self.transform_feedback_status != TransformFeedbackStatus::Running {
            return false;
        }
        self.backend.pause_transform_feedback();
        self.transform_feedback_status = TransformFeedbackStatus::Paused;
        true
    }

    /// Resume a paused capture; returns `false` if none is paused
    pub fn resume_transform_feedback(&mut self) -> bool {
        if self.transform_feedback_status != TransformFeedbackStatus::Paused {
            return false;
        }
        self.backend.resume_transform_feedback();
        self.transform_feedback_status = TransformFeedbackStatus::Running;
        true
    }

    /// End the active capture; returns `false` if none is active
    pub fn end_transform_feedback(&mut self) -> bool {
        if self.transform_feedback_status == TransformFeedbackStatus::Idle {
            return false;
        }
        self.backend.end_transform_feedback();
        self.transform_feedback_status = TransformFeedbackStatus::Idle;
        true
    }

    /// Transform feedback capture state
    pub const fn transform_feedback_status(&self) -> TransformFeedbackStatus {
        self.transform_feedback_status
    }

    /// Bound transform feedback object
    pub const fn transform_feedback(&self) -> Option<&Arc<TransformFeedback>> {
        self.transform_feedback.as_ref()
    }

    /// Release every resource this context holds a reference to
    pub fn release_all(&mut self) {
        self.end_transform_feedback();
        self.transform_feedback = None;
        self.textures.clear();
        self.current_samplers = [None; MATERIAL_MAX_TEXTURES];
        self.samplers.clear();
        self.current_framebuffer = None;
        self.render_target_size = self.screen_size;
        self.framebuffers.clear();
        self.current_vao = None;
        self.vao_cache.clear();
        log::debug!("Released auxiliary context of {:?}", self.thread_id);
    }
}

impl Drop for AuxContext {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl fmt::Debug for AuxContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuxContext")
            .field("thread_id", &self.thread_id)
            .field("current_vao", &self.current_vao)
            .field("cached_vaos", &self.vao_cache.len())
            .field("cached_samplers", &self.samplers.len())
            .field("framebuffers", &self.framebuffers.len())
            .field("transform_feedback_status", &self.transform_feedback_status)
            .finish_non_exhaustive()
    }
}
