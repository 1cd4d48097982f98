//! Scene-node attributes and the per-node capability record

use std::sync::Arc;

use bitflags::bitflags;

use crate::core::config::DEFAULT_RENDER_PRIORITY;
use crate::foundation::math::{Transform, Vec3};
use crate::render::resources::OcclusionQuery;

use super::animator::AnimatorHandle;
use super::kinds::SceneNodeKind;

bitflags! {
    /// Automatic culling tests applied to a node
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CullingMode: u32 {
        /// No culling
        const OFF = 0;
        /// Box against box
        const BOX = 1;
        /// Bounding box against the view frustum
        const FRUSTUM_BOX = 2;
        /// Bounding sphere against the view frustum
        const FRUSTUM_SPHERE = 4;
        /// Hardware occlusion query
        const OCC_QUERY = 8;
    }
}

impl Default for CullingMode {
    fn default() -> Self {
        Self::FRUSTUM_BOX
    }
}

bitflags! {
    /// Debug overlays drawn for a node
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DebugFlags: u32 {
        /// No debug data
        const OFF = 0;
        /// Bounding box
        const BBOX = 1;
        /// Vertex normals
        const NORMALS = 2;
        /// Skeleton of animated meshes
        const SKELETON = 4;
        /// Wireframe on top of the mesh
        const MESH_WIRE_OVERLAY = 8;
        /// Draw the mesh half transparent
        const HALF_TRANSPARENCY = 16;
        /// Bounding boxes of every mesh buffer
        const BBOX_BUFFERS = 32;
        /// Every overlay
        const FULL = 0xffff_ffff;
    }
}

impl Default for DebugFlags {
    fn default() -> Self {
        Self::OFF
    }
}

/// Identity, visibility and rendering attributes of a scene node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneNodeAttributes {
    /// User id; not required to be unique, -1 means unset
    pub id: i32,
    /// User name
    pub name: String,
    /// Own visibility flag; ancestors may still hide the node
    pub visible: bool,
    /// Culling tests
    pub culling: CullingMode,
    /// Debug overlays
    pub debug_data: DebugFlags,
    /// Editor helpers and gizmos set this
    pub is_debug_object: bool,
    /// Lower renders first within a pass
    pub render_priority: u32,
}

impl Default for SceneNodeAttributes {
    fn default() -> Self {
        Self {
            id: -1,
            name: String::new(),
            visible: true,
            culling: CullingMode::default(),
            debug_data: DebugFlags::default(),
            is_debug_object: false,
            render_priority: DEFAULT_RENDER_PRIORITY,
        }
    }
}

/// Construction parameters of a scene node
#[derive(Debug, Clone)]
pub struct NodeDesc {
    /// Initial attributes
    pub attributes: SceneNodeAttributes,
    /// Initial local transform
    pub transform: Transform,
}

impl Default for NodeDesc {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeDesc {
    /// Default attributes at the origin
    pub fn new() -> Self {
        Self {
            attributes: SceneNodeAttributes::default(),
            transform: Transform::default(),
        }
    }

    /// Set the user id
    #[must_use]
    pub const fn with_id(mut self, id: i32) -> Self {
        self.attributes.id = id;
        self
    }

    /// Set the name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.attributes.name = name.into();
        self
    }

    /// Set the local position
    #[must_use]
    pub const fn with_position(mut self, position: Vec3) -> Self {
        self.transform.position = position;
        self
    }

    /// Set the local rotation in degrees
    #[must_use]
    pub const fn with_rotation(mut self, rotation: Vec3) -> Self {
        self.transform.rotation = rotation;
        self
    }

    /// Set the local scale
    #[must_use]
    pub const fn with_scale(mut self, scale: Vec3) -> Self {
        self.transform.scale = scale;
        self
    }

    /// Set the render priority
    #[must_use]
    pub const fn with_render_priority(mut self, priority: u32) -> Self {
        self.attributes.render_priority = priority;
        self
    }

    /// Set initial visibility
    #[must_use]
    pub const fn with_visible(mut self, visible: bool) -> Self {
        self.attributes.visible = visible;
        self
    }
}

/// Capabilities a node gains beyond the transform facility
#[derive(Debug)]
pub struct SceneNode {
    pub(crate) attributes: SceneNodeAttributes,
    pub(crate) animators: Vec<AnimatorHandle>,
    pub(crate) query: Option<Arc<OcclusionQuery>>,
    pub(crate) kind: Box<dyn SceneNodeKind>,
}

impl SceneNode {
    pub(crate) fn new(kind: Box<dyn SceneNodeKind>, attributes: SceneNodeAttributes) -> Self {
        Self {
            attributes,
            animators: Vec::new(),
            query: None,
            kind,
        }
    }

    /// Attach or detach the occlusion query
    ///
    /// The incoming query is stored before the previous one is released, so
    /// re-attaching the current query never drops its last reference.
    pub(crate) fn set_occlusion_query(&mut self, query: Option<Arc<OcclusionQuery>>) {
        let outgoing = std::mem::replace(&mut self.query, query);
        drop(outgoing);
    }
}
