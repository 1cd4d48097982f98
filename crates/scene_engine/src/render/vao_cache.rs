//! Vertex array object cache
//!
//! One [`VaoCache`] lives in each auxiliary context. Entries are keyed by
//! [`VertexFormatKey`] and hold strong references to the buffers currently
//! attached, so a buffer cannot be deleted while a cached vertex array still
//! points at it.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::core::config::SweepPolicy;

use super::backend::{BackendError, BackendHandle, GraphicsBackend};
use super::resources::{GpuBuffer, ReallocationClock};
use super::vertex_format::{VertexArraySpec, VertexFormatKey, MAX_VERTEX_ATTRIBS};

/// Buffer attached to one attribute slot, with the layout it was bound with
#[derive(Debug, Clone)]
struct MappedBuffer {
    buffer: Arc<GpuBuffer>,
    offset: usize,
    stride: usize,
}

/// A backend vertex array configured for one [`VertexFormatKey`]
pub struct CachedVertexArray {
    backend: Arc<dyn GraphicsBackend>,
    handle: BackendHandle,
    key: VertexFormatKey,
    mapped_attributes: [Option<MappedBuffer>; MAX_VERTEX_ATTRIBS],
    mapped_index: Option<Arc<GpuBuffer>>,
    last_validated: u64,
}

impl CachedVertexArray {
    /// Create the backend object and fix the format of every enabled attribute
    fn create(backend: &Arc<dyn GraphicsBackend>, key: VertexFormatKey) -> Result<Self, BackendError> {
        let handle = backend.create_vertex_array()?;
        for attribute in key.enabled_attributes() {
            if let (Some(components), Some(component_type), Some(input_rate)) = (
                key.components(attribute),
                key.component_type(attribute),
                key.input_rate(attribute),
            ) {
                // attribute < 16
                #[allow(clippy::cast_possible_truncation)]
                backend.enable_vertex_attrib(handle, attribute as u32, components, component_type, input_rate);
            }
        }
        log::debug!("Created vertex array {handle} for {key:?}");

        Ok(Self {
            backend: Arc::clone(backend),
            handle,
            key,
            mapped_attributes: Default::default(),
            mapped_index: None,
            last_validated: 0,
        })
    }

    /// Backend name of the vertex array
    pub const fn handle(&self) -> BackendHandle {
        self.handle
    }

    /// Key this vertex array was created for
    pub const fn key(&self) -> VertexFormatKey {
        self.key
    }

    /// Clock tick of the last [`Self::bind_buffers`] call
    pub const fn last_bound_stamp(&self) -> u64 {
        self.last_validated
    }

    /// Buffer currently attached to an attribute slot
    pub fn mapped_buffer(&self, attribute: usize) -> Option<&Arc<GpuBuffer>> {
        self.mapped_attributes
            .get(attribute)
            .and_then(Option::as_ref)
            .map(|mapped| &mapped.buffer)
    }

    /// Index buffer currently attached
    pub const fn mapped_index_buffer(&self) -> Option<&Arc<GpuBuffer>> {
        self.mapped_index.as_ref()
    }

    /// Bring attached buffers in line with `spec`
    ///
    /// A slot is rebound when its buffer changed identity, when the buffer
    /// was reallocated since the last validation, or when its offset or
    /// stride changed. Only an identity change transfers ownership; the new
    /// buffer is acquired before the old one is released. Returns the number
    /// of backend rebinds issued.
    ///
    /// The clock is sampled before any slot is checked, so a reallocation
    /// racing with this call is still seen by the next one.
    pub fn bind_buffers(&mut self, spec: &VertexArraySpec, clock: &ReallocationClock) -> usize {
        debug_assert_eq!(spec.key(), self.key, "spec does not match vertex array format");
        let validated = self.last_validated;
        let now = clock.current();
        let mut rebinds = 0;

        for (attribute, slot) in self.mapped_attributes.iter_mut().enumerate() {
            let Some(binding) = spec.attribute(attribute) else {
                continue;
            };
            let stamp = binding.buffer.last_time_reallocated();
            let same_buffer = slot
                .as_ref()
                .is_some_and(|mapped| Arc::ptr_eq(&mapped.buffer, &binding.buffer));
            let same_layout = slot
                .as_ref()
                .is_some_and(|mapped| mapped.offset == binding.offset && mapped.stride == binding.stride);

            if same_buffer && same_layout && stamp <= validated {
                continue;
            }

            #[allow(clippy::cast_possible_truncation)]
            self.backend.vertex_array_vertex_buffer(
                self.handle,
                attribute as u32,
                binding.buffer.handle(),
                binding.offset,
                binding.stride,
            );
            rebinds += 1;

            if same_buffer {
                if let Some(mapped) = slot.as_mut() {
                    mapped.offset = binding.offset;
                    mapped.stride = binding.stride;
                }
            } else {
                let incoming = MappedBuffer {
                    buffer: Arc::clone(&binding.buffer),
                    offset: binding.offset,
                    stride: binding.stride,
                };
                let outgoing = slot.replace(incoming);
                drop(outgoing);
            }
        }

        match spec.index_buffer() {
            Some(index) => {
                let same_buffer = self
                    .mapped_index
                    .as_ref()
                    .is_some_and(|mapped| Arc::ptr_eq(mapped, index));
                if !same_buffer {
                    self.backend
                        .vertex_array_element_buffer(self.handle, Some(index.handle()));
                    let outgoing = self.mapped_index.replace(Arc::clone(index));
                    drop(outgoing);
                    rebinds += 1;
                } else if index.last_time_reallocated() > validated {
                    self.backend
                        .vertex_array_element_buffer(self.handle, Some(index.handle()));
                    rebinds += 1;
                }
            }
            None => {
                if self.mapped_index.take().is_some() {
                    self.backend.vertex_array_element_buffer(self.handle, None);
                    rebinds += 1;
                }
            }
        }

        self.last_validated = now;
        if rebinds > 0 {
            log::trace!("Vertex array {}: {rebinds} rebinds", self.handle);
        }
        rebinds
    }
}

impl Drop for CachedVertexArray {
    fn drop(&mut self) {
        self.backend.delete_vertex_array(self.handle);
        log::debug!("Deleted vertex array {}", self.handle);
    }
}

impl fmt::Debug for CachedVertexArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedVertexArray")
            .field("handle", &self.handle)
            .field("key", &self.key)
            .field("last_validated", &self.last_validated)
            .finish_non_exhaustive()
    }
}

/// Lookup counters of a [`VaoCache`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VaoCacheStats {
    /// Lookups served by an existing entry
    pub hits: u64,
    /// Lookups that created a new entry
    pub misses: u64,
    /// Entries removed by sweeping
    pub evictions: u64,
}

/// Per-context cache of vertex arrays keyed by vertex format
#[derive(Debug)]
pub struct VaoCache {
    entries: BTreeMap<VertexFormatKey, CachedVertexArray>,
    ceiling: usize,
    staleness: u64,
    stats: VaoCacheStats,
}

impl VaoCache {
    /// Create an empty cache
    pub const fn new(ceiling: usize, staleness: u64) -> Self {
        Self {
            entries: BTreeMap::new(),
            ceiling,
            staleness,
            stats: VaoCacheStats {
                hits: 0,
                misses: 0,
                evictions: 0,
            },
        }
    }

    /// Entry for `key`, creating and configuring it on a miss
    pub fn get_or_create(
        &mut self,
        backend: &Arc<dyn GraphicsBackend>,
        key: VertexFormatKey,
    ) -> Result<&mut CachedVertexArray, BackendError> {
        match self.entries.entry(key) {
            Entry::Occupied(entry) => {
                self.stats.hits += 1;
                Ok(entry.into_mut())
            }
            Entry::Vacant(entry) => {
                let created = CachedVertexArray::create(backend, key)?;
                self.stats.misses += 1;
                Ok(entry.insert(created))
            }
        }
    }

    /// Evict entries not validated within the staleness threshold
    ///
    /// Does nothing until the cache holds more than its ceiling. The entry
    /// for `current` is never evicted. Returns the number of evictions.
    pub fn sweep(&mut self, now: u64, current: Option<VertexFormatKey>, policy: SweepPolicy) -> usize {
        if self.entries.len() <= self.ceiling {
            return 0;
        }

        let stale = self
            .entries
            .iter()
            .filter(|(key, entry)| {
                Some(**key) != current && now.saturating_sub(entry.last_validated) > self.staleness
            })
            .map(|(key, _)| *key);
        let victims: Vec<VertexFormatKey> = match policy {
            SweepPolicy::ExitOnFirstDelete => stale.take(1).collect(),
            SweepPolicy::Full => stale.collect(),
        };

        for key in &victims {
            self.entries.remove(key);
        }
        self.stats.evictions += victims.len() as u64;
        victims.len()
    }

    /// Entry for `key`, if cached
    pub fn get(&self, key: &VertexFormatKey) -> Option<&CachedVertexArray> {
        self.entries.get(key)
    }

    /// Whether `key` is cached
    pub fn contains(&self, key: &VertexFormatKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of cached vertex arrays
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookup counters
    pub const fn stats(&self) -> VaoCacheStats {
        self.stats
    }

    /// Delete every cached vertex array and release its buffers
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::render::backend::ObjectKind;
    use crate::render::recording::{BackendCall, RecordingBackend};
    use crate::render::vertex_format::{AttributeBinding, ComponentCount, ComponentType};

    struct Fixture {
        recording: Arc<RecordingBackend>,
        backend: Arc<dyn GraphicsBackend>,
        clock: Arc<ReallocationClock>,
    }

    impl Fixture {
        fn new() -> Self {
            let recording = Arc::new(RecordingBackend::new());
            let backend: Arc<dyn GraphicsBackend> = recording.clone();
            Self {
                recording,
                backend,
                clock: Arc::new(ReallocationClock::new()),
            }
        }

        fn buffer(&self) -> Arc<GpuBuffer> {
            GpuBuffer::new(Arc::clone(&self.backend), Arc::clone(&self.clock), 256).unwrap()
        }

        fn vertex_buffer_binds(&self) -> usize {
            self.recording
                .count_calls(|call| matches!(call, BackendCall::VertexBuffer { .. }))
        }
    }

    fn position_spec(buffer: &Arc<GpuBuffer>) -> VertexArraySpec {
        VertexArraySpec::new().with_attribute(
            0,
            AttributeBinding::new(Arc::clone(buffer), ComponentType::Float, ComponentCount::Three),
        )
    }

    #[test]
    fn test_same_key_reuses_entry() {
        let fx = Fixture::new();
        let mut cache = VaoCache::new(16, 1000);
        let key = position_spec(&fx.buffer()).key();

        let first = cache.get_or_create(&fx.backend, key).unwrap().handle();
        let second = cache.get_or_create(&fx.backend, key).unwrap().handle();
        assert_eq!(first, second);
        assert_eq!(cache.stats(), VaoCacheStats { hits: 1, misses: 1, evictions: 0 });
        assert_eq!(fx.recording.live_objects(ObjectKind::VertexArray), 1);
    }

    #[test]
    fn test_create_configures_enabled_attributes() {
        let fx = Fixture::new();
        let buffer = fx.buffer();
        let spec = position_spec(&buffer).with_attribute(
            5,
            AttributeBinding::new(Arc::clone(&buffer), ComponentType::NormalizedUnsignedByte, ComponentCount::Bgra),
        );
        let mut cache = VaoCache::new(16, 1000);
        cache.get_or_create(&fx.backend, spec.key()).unwrap();

        let enabled: Vec<u32> = fx
            .recording
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::EnableVertexAttrib { attribute, .. } => Some(attribute),
                _ => None,
            })
            .collect();
        assert_eq!(enabled, vec![0, 5]);
    }

    #[test]
    fn test_rebinding_identical_buffers_is_idempotent() {
        let fx = Fixture::new();
        let buffer = fx.buffer();
        let spec = position_spec(&buffer);
        let mut cache = VaoCache::new(16, 1000);
        let entry = cache.get_or_create(&fx.backend, spec.key()).unwrap();

        assert_eq!(entry.bind_buffers(&spec, &fx.clock), 1);
        let refs = Arc::strong_count(&buffer);
        assert_eq!(entry.bind_buffers(&spec, &fx.clock), 0);
        assert_eq!(Arc::strong_count(&buffer), refs);
        assert_eq!(fx.vertex_buffer_binds(), 1);
    }

    #[test]
    fn test_reallocated_buffer_is_rebound_without_ownership_change() {
        let fx = Fixture::new();
        let buffer = fx.buffer();
        let spec = position_spec(&buffer);
        let mut cache = VaoCache::new(16, 1000);
        let entry = cache.get_or_create(&fx.backend, spec.key()).unwrap();
        entry.bind_buffers(&spec, &fx.clock);
        let refs = Arc::strong_count(&buffer);

        buffer.reallocate(512).unwrap();
        assert_eq!(entry.bind_buffers(&spec, &fx.clock), 1);
        assert_eq!(Arc::strong_count(&buffer), refs);
        assert_eq!(fx.vertex_buffer_binds(), 2);
        assert_eq!(entry.last_bound_stamp(), fx.clock.current());
    }

    #[test]
    fn test_reallocation_during_bind_is_seen_next_time() {
        let fx = Fixture::new();
        let (positions, normals) = (fx.buffer(), fx.buffer());
        let spec = position_spec(&positions).with_attribute(
            1,
            AttributeBinding::new(Arc::clone(&normals), ComponentType::Float, ComponentCount::Three),
        );
        let mut cache = VaoCache::new(16, 1000);
        let entry = cache.get_or_create(&fx.backend, spec.key()).unwrap();
        entry.bind_buffers(&spec, &fx.clock);

        // Another thread reallocates slot 0 while slot 1 is being rebound
        let pending = Mutex::new(Some(Arc::clone(&positions)));
        fx.recording.set_call_hook(move |call| {
            if matches!(call, BackendCall::VertexBuffer { attribute: 1, .. }) {
                let buffer = pending.lock().unwrap().take();
                if let Some(buffer) = buffer {
                    buffer.reallocate(1024).unwrap();
                }
            }
        });
        let moved = position_spec(&positions).with_attribute(
            1,
            AttributeBinding::new(Arc::clone(&normals), ComponentType::Float, ComponentCount::Three)
                .with_layout(0, 12),
        );
        assert_eq!(entry.bind_buffers(&moved, &fx.clock), 1);
        fx.recording.clear_call_hook();
        assert_eq!(positions.size(), 1024);

        assert_eq!(entry.bind_buffers(&moved, &fx.clock), 1);
        assert!(matches!(
            fx.recording.calls().last(),
            Some(BackendCall::VertexBuffer { attribute: 0, .. })
        ));
        assert_eq!(entry.bind_buffers(&moved, &fx.clock), 0);
    }

    #[test]
    fn test_swapped_buffer_transfers_ownership() {
        let fx = Fixture::new();
        let (old, new) = (fx.buffer(), fx.buffer());
        let mut cache = VaoCache::new(16, 1000);
        let key = position_spec(&old).key();
        let entry = cache.get_or_create(&fx.backend, key).unwrap();

        entry.bind_buffers(&position_spec(&old), &fx.clock);
        assert_eq!(Arc::strong_count(&old), 2);
        entry.bind_buffers(&position_spec(&new), &fx.clock);
        assert_eq!(Arc::strong_count(&old), 1);
        assert_eq!(Arc::strong_count(&new), 2);
        assert!(Arc::ptr_eq(entry.mapped_buffer(0).unwrap(), &new));
    }

    #[test]
    fn test_layout_change_rebinds_same_buffer() {
        let fx = Fixture::new();
        let buffer = fx.buffer();
        let mut cache = VaoCache::new(16, 1000);
        let spec = position_spec(&buffer);
        let entry = cache.get_or_create(&fx.backend, spec.key()).unwrap();
        entry.bind_buffers(&spec, &fx.clock);

        let moved = VertexArraySpec::new().with_attribute(
            0,
            AttributeBinding::new(Arc::clone(&buffer), ComponentType::Float, ComponentCount::Three)
                .with_layout(12, 24),
        );
        assert_eq!(moved.key(), spec.key());
        assert_eq!(entry.bind_buffers(&moved, &fx.clock), 1);
        assert_eq!(Arc::strong_count(&buffer), 2);
    }

    #[test]
    fn test_dropping_index_buffer_unbinds_and_releases() {
        let fx = Fixture::new();
        let (vertices, indices) = (fx.buffer(), fx.buffer());
        let mut cache = VaoCache::new(16, 1000);
        let indexed = position_spec(&vertices).with_index_buffer(Arc::clone(&indices));
        let entry = cache.get_or_create(&fx.backend, indexed.key()).unwrap();

        entry.bind_buffers(&indexed, &fx.clock);
        assert_eq!(Arc::strong_count(&indices), 2);

        entry.bind_buffers(&position_spec(&vertices), &fx.clock);
        assert!(entry.mapped_index_buffer().is_none());
        assert_eq!(Arc::strong_count(&indices), 1);
        assert_eq!(
            fx.recording.calls().last(),
            Some(&BackendCall::ElementBuffer { vao: entry.handle(), buffer: None })
        );
    }

    #[test]
    fn test_eviction_releases_buffers_and_deletes_vao() {
        let fx = Fixture::new();
        let buffer = fx.buffer();
        let mut cache = VaoCache::new(0, 10);
        let spec = position_spec(&buffer);
        cache.get_or_create(&fx.backend, spec.key()).unwrap().bind_buffers(&spec, &fx.clock);
        assert_eq!(Arc::strong_count(&buffer), 2);

        for _ in 0..11 {
            fx.clock.advance();
        }
        assert_eq!(cache.sweep(fx.clock.current(), None, SweepPolicy::Full), 1);
        assert_eq!(Arc::strong_count(&buffer), 1);
        assert_eq!(fx.recording.live_objects(ObjectKind::VertexArray), 0);
    }

    #[test]
    fn test_sweep_respects_ceiling_threshold_and_current() {
        let fx = Fixture::new();
        let mut cache = VaoCache::new(1, 10);
        let buffer = fx.buffer();
        let keys: Vec<VertexFormatKey> = [ComponentCount::One, ComponentCount::Two, ComponentCount::Three]
            .into_iter()
            .map(|count| {
                VertexArraySpec::new()
                    .with_attribute(0, AttributeBinding::new(Arc::clone(&buffer), ComponentType::Float, count))
                    .key()
            })
            .collect();
        for key in &keys {
            cache.get_or_create(&fx.backend, *key).unwrap();
        }

        // Nothing is stale yet
        assert_eq!(cache.sweep(5, None, SweepPolicy::Full), 0);

        assert_eq!(cache.sweep(100, Some(keys[0]), SweepPolicy::ExitOnFirstDelete), 1);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&keys[0]));

        assert_eq!(cache.sweep(100, Some(keys[0]), SweepPolicy::Full), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&keys[0]));
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_creation_failure_leaves_cache_unchanged() {
        let fx = Fixture::new();
        fx.recording.set_object_budget(ObjectKind::VertexArray, 0);
        let mut cache = VaoCache::new(16, 1000);
        let key = position_spec(&fx.buffer()).key();

        let result = cache.get_or_create(&fx.backend, key);
        assert!(matches!(result, Err(BackendError::OutOfResources(ObjectKind::VertexArray))));
        assert!(cache.is_empty());
    }
}
