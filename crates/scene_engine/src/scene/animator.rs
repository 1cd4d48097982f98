//! Scene-node animators
//!
//! Animators are shared objects: one [`AnimatorHandle`] may be attached to
//! several nodes, and the animate phase holds its own clone of every handle
//! while it runs, so an animator can detach itself, other animators, or
//! even its node from inside [`SceneNodeAnimator::animate_node`].

use std::fmt;
use std::sync::{Arc, Mutex, TryLockError};

use crate::foundation::collections::NodeId;
use crate::foundation::math::Vec3;
use crate::foundation::sync::lock;

use super::scene_graph::SceneGraph;

/// What an animator can reach while it runs
pub struct AnimationScope<'a> {
    /// The whole scene graph
    pub graph: &'a mut SceneGraph,
    /// Node being animated
    pub node: NodeId,
    /// Engine clock in milliseconds
    pub time_ms: u32,
    handle: &'a AnimatorHandle,
}

impl<'a> AnimationScope<'a> {
    pub(crate) fn new(graph: &'a mut SceneGraph, node: NodeId, time_ms: u32, handle: &'a AnimatorHandle) -> Self {
        Self {
            graph,
            node,
            time_ms,
            handle,
        }
    }

    /// Handle of the running animator
    pub const fn handle(&self) -> &AnimatorHandle {
        self.handle
    }

    /// Detach the running animator from the node
    pub fn remove_self(&mut self) -> bool {
        self.graph.remove_animator(self.node, self.handle)
    }
}

/// Behaviour attached to a scene node and run once per frame
pub trait SceneNodeAnimator: Send {
    /// Update the node for `scope.time_ms`
    fn animate_node(&mut self, scope: &mut AnimationScope<'_>);

    /// Independent copy for a cloned node; `None` if unsupported
    fn create_clone(&self) -> Option<AnimatorHandle> {
        None
    }
}

/// Shared reference to an animator; equality is identity
#[derive(Clone)]
pub struct AnimatorHandle(Arc<Mutex<dyn SceneNodeAnimator>>);

impl AnimatorHandle {
    /// Wrap an animator
    pub fn new<A: SceneNodeAnimator + 'static>(animator: A) -> Self {
        Self(Arc::new(Mutex::new(animator)))
    }

    /// Whether both handles refer to the same animator
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn animate(&self, scope: &mut AnimationScope<'_>) {
        lock(&self.0).animate_node(scope);
    }

    /// `None` while the animator is locked, as it is for the whole of its
    /// own [`SceneNodeAnimator::animate_node`] call
    pub(crate) fn create_clone(&self) -> Option<Self> {
        match self.0.try_lock() {
            Ok(animator) => animator.create_clone(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().create_clone(),
            Err(TryLockError::WouldBlock) => {
                log::warn!("Skipping clone of running animator {self:?}");
                None
            }
        }
    }
}

impl PartialEq for AnimatorHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for AnimatorHandle {}

impl fmt::Debug for AnimatorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnimatorHandle({:p})", Arc::as_ptr(&self.0).cast::<()>())
    }
}

/// Spins a node at a constant rate
#[derive(Debug, Clone)]
pub struct RotationAnimator {
    degrees_per_second: Vec3,
    last_time: Option<u32>,
}

impl RotationAnimator {
    /// Rotate by `degrees_per_second` around each axis
    pub const fn new(degrees_per_second: Vec3) -> Self {
        Self {
            degrees_per_second,
            last_time: None,
        }
    }
}

impl SceneNodeAnimator for RotationAnimator {
    fn animate_node(&mut self, scope: &mut AnimationScope<'_>) {
        let Some(last) = self.last_time.replace(scope.time_ms) else {
            return;
        };
        let elapsed = scope.time_ms.saturating_sub(last);
        if elapsed == 0 {
            return;
        }
        if let Some(local) = scope.graph.local_transform(scope.node) {
            #[allow(clippy::cast_precision_loss)]
            let delta = self.degrees_per_second * (elapsed as f32 / 1000.0);
            scope.graph.set_rotation(scope.node, local.rotation + delta);
        }
    }

    fn create_clone(&self) -> Option<AnimatorHandle> {
        Some(AnimatorHandle::new(Self::new(self.degrees_per_second)))
    }
}

/// Moves a node along a straight line, detaching itself when done
#[derive(Debug, Clone)]
pub struct FlyStraightAnimator {
    start: Vec3,
    end: Vec3,
    duration_ms: u32,
    looping: bool,
    start_time: Option<u32>,
}

impl FlyStraightAnimator {
    /// Travel from `start` to `end` over `duration_ms`
    pub const fn new(start: Vec3, end: Vec3, duration_ms: u32) -> Self {
        Self {
            start,
            end,
            duration_ms,
            looping: false,
            start_time: None,
        }
    }

    /// Restart from `start` after reaching `end` instead of finishing
    #[must_use]
    pub const fn looping(mut self) -> Self {
        self.looping = true;
        self
    }
}

impl SceneNodeAnimator for FlyStraightAnimator {
    fn animate_node(&mut self, scope: &mut AnimationScope<'_>) {
        let start_time = *self.start_time.get_or_insert(scope.time_ms);
        let elapsed = scope.time_ms.saturating_sub(start_time);

        if self.duration_ms == 0 || (!self.looping && elapsed >= self.duration_ms) {
            scope.graph.set_position(scope.node, self.end);
            scope.remove_self();
            return;
        }

        #[allow(clippy::cast_precision_loss)]
        let t = (elapsed % self.duration_ms) as f32 / self.duration_ms as f32;
        scope.graph.set_position(scope.node, self.start.lerp(&self.end, t));
    }

    fn create_clone(&self) -> Option<AnimatorHandle> {
        Some(AnimatorHandle::new(Self {
            start_time: None,
            ..self.clone()
        }))
    }
}

/// Destroys its node and the node's subtree after a delay
#[derive(Debug, Clone)]
pub struct DeletionAnimator {
    delay_ms: u32,
    start_time: Option<u32>,
}

impl DeletionAnimator {
    /// Destroy the node `delay_ms` after the first frame it is animated
    pub const fn new(delay_ms: u32) -> Self {
        Self {
            delay_ms,
            start_time: None,
        }
    }
}

impl SceneNodeAnimator for DeletionAnimator {
    fn animate_node(&mut self, scope: &mut AnimationScope<'_>) {
        let start_time = *self.start_time.get_or_insert(scope.time_ms);
        if scope.time_ms.saturating_sub(start_time) >= self.delay_ms {
            log::debug!("Deletion animator destroying node {:?}", scope.node);
            scope.graph.destroy_subtree(scope.node);
        }
    }
}
