//! Reference-counted GPU resources
//!
//! Every resource owns one backend object and deletes it when the last
//! `Arc` is dropped. Identity comparisons use [`Arc::ptr_eq`].

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use super::backend::{BackendError, BackendHandle, GraphicsBackend, TextureDescriptor};

/// Monotonic counter advanced whenever any buffer's storage is reallocated
///
/// Cached vertex arrays record the clock value at their last validation; a
/// buffer reallocated after that point must be rebound even when its identity
/// is unchanged.
#[derive(Debug, Default)]
pub struct ReallocationClock {
    counter: AtomicU64,
}

impl ReallocationClock {
    /// Create a clock starting at zero
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// The process-wide clock shared by drivers that do not inject their own
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<ReallocationClock>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
    }

    /// Current tick
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    /// Advance the clock and return the new tick
    pub(crate) fn advance(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Vertex or index buffer
pub struct GpuBuffer {
    backend: Arc<dyn GraphicsBackend>,
    clock: Arc<ReallocationClock>,
    handle: BackendHandle,
    size: AtomicUsize,
    last_reallocated: AtomicU64,
}

impl GpuBuffer {
    pub(crate) fn new(
        backend: Arc<dyn GraphicsBackend>,
        clock: Arc<ReallocationClock>,
        size: usize,
    ) -> Result<Arc<Self>, BackendError> {
        let handle = backend.create_buffer(size)?;
        let stamp = clock.advance();
        log::debug!("Created buffer {handle} ({size} bytes)");
        Ok(Arc::new(Self {
            backend,
            clock,
            handle,
            size: AtomicUsize::new(size),
            last_reallocated: AtomicU64::new(stamp),
        }))
    }

    /// Backend name of the buffer
    pub const fn handle(&self) -> BackendHandle {
        self.handle
    }

    /// Size of the current storage in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Clock tick of the most recent storage (re)allocation
    pub fn last_time_reallocated(&self) -> u64 {
        self.last_reallocated.load(Ordering::Acquire)
    }

    /// Replace the buffer's storage and advance the reallocation clock
    pub fn reallocate(&self, size: usize) -> Result<(), BackendError> {
        self.backend.reallocate_buffer(self.handle, size)?;
        self.size.store(size, Ordering::Release);
        self.last_reallocated.store(self.clock.advance(), Ordering::Release);
        log::trace!("Reallocated buffer {} ({size} bytes)", self.handle);
        Ok(())
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        self.backend.delete_buffer(self.handle);
        log::debug!("Deleted buffer {}", self.handle);
    }
}

impl fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuBuffer")
            .field("handle", &self.handle)
            .field("size", &self.size())
            .field("last_reallocated", &self.last_time_reallocated())
            .finish_non_exhaustive()
    }
}

/// Texture image
pub struct Texture {
    backend: Arc<dyn GraphicsBackend>,
    handle: BackendHandle,
    descriptor: TextureDescriptor,
}

impl Texture {
    pub(crate) fn new(
        backend: Arc<dyn GraphicsBackend>,
        descriptor: TextureDescriptor,
    ) -> Result<Arc<Self>, BackendError> {
        let handle = backend.create_texture(&descriptor)?;
        log::debug!(
            "Created texture {handle} {:?} ({}x{})",
            descriptor.label,
            descriptor.width,
            descriptor.height
        );
        Ok(Arc::new(Self {
            backend,
            handle,
            descriptor,
        }))
    }

    /// Backend name of the texture
    pub const fn handle(&self) -> BackendHandle {
        self.handle
    }

    /// Creation parameters
    pub const fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.backend.delete_texture(self.handle);
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("handle", &self.handle)
            .field("label", &self.descriptor.label)
            .finish_non_exhaustive()
    }
}

/// Off-screen render target
pub struct Framebuffer {
    backend: Arc<dyn GraphicsBackend>,
    handle: BackendHandle,
    size: (u32, u32),
}

impl Framebuffer {
    pub(crate) fn new(backend: Arc<dyn GraphicsBackend>, size: (u32, u32)) -> Result<Arc<Self>, BackendError> {
        let handle = backend.create_framebuffer(size.0, size.1)?;
        log::debug!("Created framebuffer {handle} ({}x{})", size.0, size.1);
        Ok(Arc::new(Self { backend, handle, size }))
    }

    /// Backend name of the framebuffer
    pub const fn handle(&self) -> BackendHandle {
        self.handle
    }

    /// Size in pixels
    pub const fn size(&self) -> (u32, u32) {
        self.size
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.backend.delete_framebuffer(self.handle);
    }
}

impl fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Framebuffer")
            .field("handle", &self.handle)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Hardware occlusion query attached to a scene node
pub struct OcclusionQuery {
    backend: Arc<dyn GraphicsBackend>,
    handle: BackendHandle,
}

impl OcclusionQuery {
    pub(crate) fn new(backend: Arc<dyn GraphicsBackend>) -> Result<Arc<Self>, BackendError> {
        let handle = backend.create_query()?;
        Ok(Arc::new(Self { backend, handle }))
    }

    /// Backend name of the query
    pub const fn handle(&self) -> BackendHandle {
        self.handle
    }
}

impl Drop for OcclusionQuery {
    fn drop(&mut self) {
        self.backend.delete_query(self.handle);
        log::debug!("Deleted occlusion query {}", self.handle);
    }
}

impl fmt::Debug for OcclusionQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcclusionQuery")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Transform feedback object capturing vertex output
pub struct TransformFeedback {
    backend: Arc<dyn GraphicsBackend>,
    handle: BackendHandle,
}

impl TransformFeedback {
    pub(crate) fn new(backend: Arc<dyn GraphicsBackend>) -> Result<Arc<Self>, BackendError> {
        let handle = backend.create_transform_feedback()?;
        Ok(Arc::new(Self { backend, handle }))
    }

    /// Backend name of the transform feedback object
    pub const fn handle(&self) -> BackendHandle {
        self.handle
    }
}

impl Drop for TransformFeedback {
    fn drop(&mut self) {
        self.backend.delete_transform_feedback(self.handle);
    }
}

impl fmt::Debug for TransformFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformFeedback")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::ObjectKind;
    use crate::render::recording::RecordingBackend;

    fn backend() -> (Arc<RecordingBackend>, Arc<dyn GraphicsBackend>) {
        let recording = Arc::new(RecordingBackend::new());
        let backend: Arc<dyn GraphicsBackend> = recording.clone();
        (recording, backend)
    }

    #[test]
    fn test_clock_advances_monotonically() {
        let clock = ReallocationClock::new();
        assert_eq!(clock.current(), 0);
        assert_eq!(clock.advance(), 1);
        assert_eq!(clock.advance(), 2);
        assert_eq!(clock.current(), 2);
    }

    #[test]
    fn test_global_clock_is_shared() {
        assert!(Arc::ptr_eq(&ReallocationClock::global(), &ReallocationClock::global()));
    }

    #[test]
    fn test_buffer_reallocation_stamps_from_clock() {
        let (_, backend) = backend();
        let clock = Arc::new(ReallocationClock::new());
        let buffer = GpuBuffer::new(backend, Arc::clone(&clock), 64).unwrap();
        assert_eq!(buffer.last_time_reallocated(), 1);

        buffer.reallocate(128).unwrap();
        assert_eq!(buffer.size(), 128);
        assert_eq!(buffer.last_time_reallocated(), 2);
        assert_eq!(clock.current(), 2);
    }

    #[test]
    fn test_last_reference_deletes_backend_object() {
        let (recording, backend) = backend();
        let clock = Arc::new(ReallocationClock::new());
        let buffer = GpuBuffer::new(backend.clone(), clock, 16).unwrap();
        let query = OcclusionQuery::new(backend).unwrap();
        let second = Arc::clone(&buffer);
        assert_eq!(recording.live_objects(ObjectKind::Buffer), 1);

        drop(buffer);
        assert_eq!(recording.live_objects(ObjectKind::Buffer), 1);
        drop(second);
        assert_eq!(recording.live_objects(ObjectKind::Buffer), 0);

        assert_eq!(recording.live_objects(ObjectKind::Query), 1);
        drop(query);
        assert_eq!(recording.live_objects(ObjectKind::Query), 0);
    }
}
