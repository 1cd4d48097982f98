//! In-memory backend for tests and headless runs
//!
//! [`RecordingBackend`] performs no GPU work. It hands out handles, records
//! every call in order, counts live objects per kind and can be given a
//! per-kind object budget to simulate resource exhaustion. A call hook lets
//! tests interleave work with a specific backend call.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::foundation::math::Mat4;
use crate::foundation::sync::lock;

use super::backend::{
    BackendError, BackendHandle, DriverFeature, GraphicsBackend, ObjectKind, PrimitiveType,
    TextureDescriptor,
};
use super::sampler::SamplingParams;
use super::vertex_format::{ComponentCount, ComponentType, InputRate};

/// One recorded backend call
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CreateObject { kind: ObjectKind, handle: BackendHandle },
    DeleteObject { kind: ObjectKind, handle: BackendHandle },
    ReallocateBuffer { buffer: BackendHandle, size: usize },
    EnableVertexAttrib {
        vao: BackendHandle,
        attribute: u32,
        components: ComponentCount,
        component_type: ComponentType,
        input_rate: InputRate,
    },
    VertexBuffer {
        vao: BackendHandle,
        attribute: u32,
        buffer: BackendHandle,
        offset: usize,
        stride: usize,
    },
    ElementBuffer { vao: BackendHandle, buffer: Option<BackendHandle> },
    BindVertexArray(BackendHandle),
    WorldTransform(Mat4),
    BindTextureUnit {
        unit: u32,
        texture: Option<BackendHandle>,
        sampler: Option<BackendHandle>,
    },
    BindFramebuffer(Option<BackendHandle>),
    BindTransformFeedback(Option<BackendHandle>),
    BeginTransformFeedback(PrimitiveType),
    PauseTransformFeedback,
    ResumeTransformFeedback,
    EndTransformFeedback,
    Draw {
        primitive: PrimitiveType,
        count: u32,
        indexed: bool,
        instances: u32,
    },
}

/// Callback run after a call has been recorded
#[derive(Clone)]
struct CallHook(Arc<dyn Fn(&BackendCall) + Send + Sync>);

impl fmt::Debug for CallHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CallHook")
    }
}

/// Recording backend
#[derive(Debug)]
pub struct RecordingBackend {
    next_handle: AtomicU32,
    calls: Mutex<Vec<BackendCall>>,
    live: Mutex<HashMap<ObjectKind, usize>>,
    budgets: Mutex<HashMap<ObjectKind, usize>>,
    unsupported: Mutex<HashSet<DriverFeature>>,
    hook: Mutex<Option<CallHook>>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    /// Create a backend supporting every feature with no object budget
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU32::new(1),
            calls: Mutex::new(Vec::new()),
            live: Mutex::new(HashMap::new()),
            budgets: Mutex::new(HashMap::new()),
            unsupported: Mutex::new(HashSet::new()),
            hook: Mutex::new(None),
        }
    }

    /// Limit the number of simultaneously live objects of one kind
    pub fn set_object_budget(&self, kind: ObjectKind, max_live: usize) {
        lock(&self.budgets).insert(kind, max_live);
    }

    /// Mark a feature as unsupported
    pub fn disable_feature(&self, feature: DriverFeature) {
        lock(&self.unsupported).insert(feature);
    }

    /// Number of live objects of one kind
    pub fn live_objects(&self, kind: ObjectKind) -> usize {
        lock(&self.live).get(&kind).copied().unwrap_or(0)
    }

    /// Snapshot of every recorded call, oldest first
    pub fn calls(&self) -> Vec<BackendCall> {
        lock(&self.calls).clone()
    }

    /// Number of recorded calls matching a predicate
    pub fn count_calls(&self, predicate: impl Fn(&BackendCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|call| predicate(call)).count()
    }

    /// Forget recorded calls; live object counts are kept
    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Run `hook` after every recorded call, replacing any previous hook
    ///
    /// The hook runs with no internal lock held and may call back into the
    /// backend.
    pub fn set_call_hook(&self, hook: impl Fn(&BackendCall) + Send + Sync + 'static) {
        *lock(&self.hook) = Some(CallHook(Arc::new(hook)));
    }

    /// Remove the call hook
    pub fn clear_call_hook(&self) {
        lock(&self.hook).take();
    }

    fn record(&self, call: BackendCall) {
        log::trace!("RecordingBackend: {call:?}");
        let hook = lock(&self.hook).clone();
        match hook {
            Some(hook) => {
                lock(&self.calls).push(call.clone());
                (hook.0)(&call);
            }
            None => lock(&self.calls).push(call),
        }
    }

    fn create(&self, kind: ObjectKind) -> Result<BackendHandle, BackendError> {
        {
            let mut live = lock(&self.live);
            let count = live.entry(kind).or_insert(0);
            if let Some(&budget) = lock(&self.budgets).get(&kind) {
                if *count >= budget {
                    return Err(BackendError::OutOfResources(kind));
                }
            }
            *count += 1;
        }
        let handle = BackendHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.record(BackendCall::CreateObject { kind, handle });
        Ok(handle)
    }

    fn delete(&self, kind: ObjectKind, handle: BackendHandle) {
        if let Some(count) = lock(&self.live).get_mut(&kind) {
            *count = count.saturating_sub(1);
        }
        self.record(BackendCall::DeleteObject { kind, handle });
    }
}

impl GraphicsBackend for RecordingBackend {
    fn name(&self) -> &str {
        "Recording Backend"
    }

    fn query_feature(&self, feature: DriverFeature) -> bool {
        !lock(&self.unsupported).contains(&feature)
    }

    fn create_buffer(&self, _size: usize) -> Result<BackendHandle, BackendError> {
        self.create(ObjectKind::Buffer)
    }

    fn reallocate_buffer(&self, buffer: BackendHandle, size: usize) -> Result<(), BackendError> {
        self.record(BackendCall::ReallocateBuffer { buffer, size });
        Ok(())
    }

    fn delete_buffer(&self, buffer: BackendHandle) {
        self.delete(ObjectKind::Buffer, buffer);
    }

    fn create_texture(&self, _descriptor: &TextureDescriptor) -> Result<BackendHandle, BackendError> {
        self.create(ObjectKind::Texture)
    }

    fn delete_texture(&self, texture: BackendHandle) {
        self.delete(ObjectKind::Texture, texture);
    }

    fn create_vertex_array(&self) -> Result<BackendHandle, BackendError> {
        self.create(ObjectKind::VertexArray)
    }

    fn enable_vertex_attrib(
        &self,
        vao: BackendHandle,
        attribute: u32,
        components: ComponentCount,
        component_type: ComponentType,
        input_rate: InputRate,
    ) {
        self.record(BackendCall::EnableVertexAttrib {
            vao,
            attribute,
            components,
            component_type,
            input_rate,
        });
    }

    fn vertex_array_vertex_buffer(
        &self,
        vao: BackendHandle,
        attribute: u32,
        buffer: BackendHandle,
        offset: usize,
        stride: usize,
    ) {
        self.record(BackendCall::VertexBuffer {
            vao,
            attribute,
            buffer,
            offset,
            stride,
        });
    }

    fn vertex_array_element_buffer(&self, vao: BackendHandle, buffer: Option<BackendHandle>) {
        self.record(BackendCall::ElementBuffer { vao, buffer });
    }

    fn delete_vertex_array(&self, vao: BackendHandle) {
        self.delete(ObjectKind::VertexArray, vao);
    }

    fn bind_vertex_array(&self, vao: BackendHandle) {
        self.record(BackendCall::BindVertexArray(vao));
    }

    fn create_sampler(&self, _params: &SamplingParams) -> Result<BackendHandle, BackendError> {
        self.create(ObjectKind::Sampler)
    }

    fn delete_sampler(&self, sampler: BackendHandle) {
        self.delete(ObjectKind::Sampler, sampler);
    }

    fn bind_texture_unit(
        &self,
        unit: u32,
        texture: Option<BackendHandle>,
        sampler: Option<BackendHandle>,
    ) {
        self.record(BackendCall::BindTextureUnit {
            unit,
            texture,
            sampler,
        });
    }

    fn create_framebuffer(&self, _width: u32, _height: u32) -> Result<BackendHandle, BackendError> {
        self.create(ObjectKind::Framebuffer)
    }

    fn delete_framebuffer(&self, framebuffer: BackendHandle) {
        self.delete(ObjectKind::Framebuffer, framebuffer);
    }

    fn bind_framebuffer(&self, framebuffer: Option<BackendHandle>) {
        self.record(BackendCall::BindFramebuffer(framebuffer));
    }

    fn create_transform_feedback(&self) -> Result<BackendHandle, BackendError> {
        self.create(ObjectKind::TransformFeedback)
    }

    fn delete_transform_feedback(&self, feedback: BackendHandle) {
        self.delete(ObjectKind::TransformFeedback, feedback);
    }

    fn bind_transform_feedback(&self, feedback: Option<BackendHandle>) {
        self.record(BackendCall::BindTransformFeedback(feedback));
    }

    fn begin_transform_feedback(&self, primitive: PrimitiveType) {
        self.record(BackendCall::BeginTransformFeedback(primitive));
    }

    fn pause_transform_feedback(&self) {
        self.record(BackendCall::PauseTransformFeedback);
    }

    fn resume_transform_feedback(&self) {
        self.record(BackendCall::ResumeTransformFeedback);
    }

    fn end_transform_feedback(&self) {
        self.record(BackendCall::EndTransformFeedback);
    }

    fn create_query(&self) -> Result<BackendHandle, BackendError> {
        self.create(ObjectKind::Query)
    }

    fn delete_query(&self, query: BackendHandle) {
        self.delete(ObjectKind::Query, query);
    }

    fn set_world_transform(&self, matrix: &Mat4) {
        self.record(BackendCall::WorldTransform(*matrix));
    }

    fn draw(&self, primitive: PrimitiveType, count: u32, indexed: bool, instances: u32) {
        self.record(BackendCall::Draw {
            primitive,
            count,
            indexed,
            instances,
        });
    }
}
