//! Scene-node kinds
//!
//! A kind supplies everything that differs between node types: bounds,
//! materials, which pass the node registers for, and how it renders. The
//! scene graph owns the shared attributes, transform and hierarchy.

use std::fmt;
use std::sync::Arc;

use crate::foundation::collections::NodeId;
use crate::foundation::math::{Mat4, AABB};
use crate::render::driver::{DriverError, MeshBuffer, VideoDriver};
use crate::render::material::Material;
use crate::render::resources::OcclusionQuery;

use super::node::SceneNodeAttributes;
use super::render_queue::RenderPass;

/// Reported type of a scene node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// Grouping node with no geometry
    Empty,
    /// Static mesh
    Mesh,
    /// Application-defined kind
    Unknown,
}

/// Node state handed to [`SceneNodeKind::render`]
#[derive(Debug)]
pub struct RenderView<'a> {
    /// Node being rendered
    pub node: NodeId,
    /// World matrix
    pub absolute_transform: Mat4,
    /// Node attributes
    pub attributes: &'a SceneNodeAttributes,
    /// Attached occlusion query
    pub occlusion_query: Option<&'a Arc<OcclusionQuery>>,
}

/// Type-specific behaviour of a scene node
pub trait SceneNodeKind: Send + fmt::Debug {
    /// Reported node type
    fn node_type(&self) -> NodeType {
        NodeType::Unknown
    }

    /// Object-space bounds
    fn bounding_box(&self) -> AABB;

    /// Number of materials
    fn material_count(&self) -> usize {
        0
    }

    /// Material by index
    fn material(&self, _index: usize) -> Option<&Material> {
        None
    }

    /// Mutable material by index
    fn material_mut(&mut self, _index: usize) -> Option<&mut Material> {
        None
    }

    /// Pass to register for this frame; `None` skips registration
    ///
    /// Nodes with materials register as transparent when any material is
    /// transparent and as solid otherwise.
    fn register_pass(&mut self) -> Option<RenderPass> {
        let count = self.material_count();
        if count == 0 {
            return None;
        }
        let transparent = (0..count)
            .filter_map(|index| self.material(index))
            .any(Material::is_transparent);
        Some(if transparent {
            RenderPass::Transparent
        } else {
            RenderPass::Solid
        })
    }

    /// Issue draw calls for the node
    fn render(&self, view: &RenderView<'_>, driver: &VideoDriver) -> Result<(), DriverError>;

    /// Copy of this kind for a cloned node; `None` if unsupported
    fn clone_kind(&self) -> Option<Box<dyn SceneNodeKind>> {
        None
    }
}

/// Grouping node that renders nothing
#[derive(Debug, Clone, Default)]
pub struct EmptyNode {
    bounding_box: AABB,
}

impl EmptyNode {
    /// Create an empty node
    pub fn new() -> Self {
        Self::default()
    }
}

impl SceneNodeKind for EmptyNode {
    fn node_type(&self) -> NodeType {
        NodeType::Empty
    }

    fn bounding_box(&self) -> AABB {
        self.bounding_box
    }

    fn render(&self, _view: &RenderView<'_>, _driver: &VideoDriver) -> Result<(), DriverError> {
        Ok(())
    }

    fn clone_kind(&self) -> Option<Box<dyn SceneNodeKind>> {
        Some(Box::new(self.clone()))
    }
}

/// Static mesh: one material per mesh buffer
#[derive(Debug, Clone, Default)]
pub struct MeshNode {
    buffers: Vec<MeshBuffer>,
    materials: Vec<Material>,
    bounding_box: AABB,
}

impl MeshNode {
    /// Mesh node drawing `buffers` with default materials
    pub fn new(buffers: Vec<MeshBuffer>) -> Self {
        let materials = vec![Material::default(); buffers.len()];
        let bounding_box = buffers
            .iter()
            .map(|buffer| buffer.bounding_box)
            .reduce(|mut total, next| {
                total.add_point(next.min);
                total.add_point(next.max);
                total
            })
            .unwrap_or_default();
        Self {
            buffers,
            materials,
            bounding_box,
        }
    }

    /// Replace the material of one buffer
    #[must_use]
    pub fn with_material(mut self, index: usize, material: Material) -> Self {
        if let Some(slot) = self.materials.get_mut(index) {
            *slot = material;
        }
        self
    }

    /// Mesh buffers
    pub fn buffers(&self) -> &[MeshBuffer] {
        &self.buffers
    }
}

impl SceneNodeKind for MeshNode {
    fn node_type(&self) -> NodeType {
        NodeType::Mesh
    }

    fn bounding_box(&self) -> AABB {
        self.bounding_box
    }

    fn material_count(&self) -> usize {
        self.materials.len()
    }

    fn material(&self, index: usize) -> Option<&Material> {
        self.materials.get(index)
    }

    fn material_mut(&mut self, index: usize) -> Option<&mut Material> {
        self.materials.get_mut(index)
    }

    fn render(&self, view: &RenderView<'_>, driver: &VideoDriver) -> Result<(), DriverError> {
        driver.set_world_transform(&view.absolute_transform)?;
        for (buffer, material) in self.buffers.iter().zip(&self.materials) {
            driver.draw_mesh_buffer(buffer, material)?;
        }
        Ok(())
    }

    fn clone_kind(&self) -> Option<Box<dyn SceneNodeKind>> {
        Some(Box::new(self.clone()))
    }
}
