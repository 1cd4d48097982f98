//! Scene graph
//!
//! Hierarchical transforms, per-node attributes and animators, and the
//! animate/register/render frame driven by each [`SceneManager`].
//!
//! ## Organization
//!
//! - [`transform`]: lazily composed local and absolute matrices
//! - [`node`]: attributes and capabilities of scene nodes
//! - [`kinds`]: the per-type behaviour of scene nodes
//! - [`animator`]: per-frame behaviours attached to nodes
//! - [`render_queue`]: nodes registered for the current frame
//! - [`scene_graph`]: the node arena, managers and frame phases

pub mod animator;
pub mod kinds;
pub mod node;
pub mod render_queue;
pub mod scene_graph;
pub mod transform;

pub use animator::{
    AnimationScope, AnimatorHandle, DeletionAnimator, FlyStraightAnimator, RotationAnimator, SceneNodeAnimator,
};
pub use kinds::{EmptyNode, MeshNode, NodeType, RenderView, SceneNodeKind};
pub use node::{CullingMode, DebugFlags, NodeDesc, SceneNodeAttributes};
pub use render_queue::{QueueEntry, RenderPass, RenderQueue};
pub use scene_graph::{FrameReport, SceneError, SceneGraph, SceneManager};
pub use transform::TransformState;
