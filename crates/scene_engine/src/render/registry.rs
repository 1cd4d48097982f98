//! Thread-to-context registry
//!
//! Lookups take the read lock; creation and removal take the write lock and
//! re-check, so each thread gets at most one context even under contention.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::thread::ThreadId;

use crate::core::config::CacheConfig;
use crate::foundation::sync::{lock, read, write};

use super::backend::GraphicsBackend;
use super::context::AuxContext;
use super::driver::DriverError;
use super::resources::ReallocationClock;

/// A context shared between the registry and its owning thread
pub type SharedContext = Arc<Mutex<AuxContext>>;

/// Registry of auxiliary contexts keyed by thread
#[derive(Debug)]
pub struct ContextRegistry {
    contexts: RwLock<HashMap<ThreadId, SharedContext>>,
    max_contexts: usize,
    backend: Arc<dyn GraphicsBackend>,
    clock: Arc<ReallocationClock>,
    cache: CacheConfig,
    screen_size: (u32, u32),
}

impl ContextRegistry {
    /// Create an empty registry
    pub fn new(
        backend: Arc<dyn GraphicsBackend>,
        clock: Arc<ReallocationClock>,
        cache: CacheConfig,
        max_contexts: usize,
        screen_size: (u32, u32),
    ) -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
            max_contexts,
            backend,
            clock,
            cache,
            screen_size,
        }
    }

    /// Create the calling thread's context
    pub fn init_current(&self) -> Result<SharedContext, DriverError> {
        let thread_id = std::thread::current().id();
        if read(&self.contexts).contains_key(&thread_id) {
            return Err(DriverError::ContextAlreadyInitialized(thread_id));
        }

        let mut contexts = write(&self.contexts);
        // Another caller may have raced us between the two locks
        if contexts.contains_key(&thread_id) {
            return Err(DriverError::ContextAlreadyInitialized(thread_id));
        }
        if contexts.len() >= self.max_contexts {
            return Err(DriverError::ContextLimitReached(self.max_contexts));
        }

        let context = Arc::new(Mutex::new(AuxContext::new(
            thread_id,
            Arc::clone(&self.backend),
            Arc::clone(&self.clock),
            &self.cache,
            self.screen_size,
        )));
        contexts.insert(thread_id, Arc::clone(&context));
        log::debug!(
            "Initialized auxiliary context for {thread_id:?} ({} of {})",
            contexts.len(),
            self.max_contexts
        );
        Ok(context)
    }

    /// Release and remove the calling thread's context
    ///
    /// Resources are released before the context leaves the registry.
    /// Returns `false` if the thread had no context.
    pub fn deinit_current(&self) -> bool {
        let thread_id = std::thread::current().id();
        let Some(context) = self.get(thread_id) else {
            return false;
        };
        lock(&context).release_all();
        write(&self.contexts).remove(&thread_id);
        log::debug!("Deinitialized auxiliary context for {thread_id:?}");
        true
    }

    /// Context of `thread_id`
    pub fn get(&self, thread_id: ThreadId) -> Option<SharedContext> {
        read(&self.contexts).get(&thread_id).cloned()
    }

    /// Context of the calling thread
    pub fn current(&self) -> Result<SharedContext, DriverError> {
        let thread_id = std::thread::current().id();
        self.get(thread_id)
            .ok_or(DriverError::NoThreadContext(thread_id))
    }

    /// Run `f` against the calling thread's context
    pub fn with_current<R>(&self, f: impl FnOnce(&mut AuxContext) -> R) -> Result<R, DriverError> {
        let context = self.current()?;
        let mut guard = lock(&context);
        Ok(f(&mut *guard))
    }

    /// Snapshot of every live context
    pub fn all(&self) -> Vec<SharedContext> {
        read(&self.contexts).values().cloned().collect()
    }

    /// Number of live contexts
    pub fn len(&self) -> usize {
        read(&self.contexts).len()
    }

    /// Whether no context is live
    pub fn is_empty(&self) -> bool {
        read(&self.contexts).is_empty()
    }

    /// Maximum number of contexts
    pub const fn max_contexts(&self) -> usize {
        self.max_contexts
    }
}
