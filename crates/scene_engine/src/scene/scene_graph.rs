//! Scene graph and scene managers
//!
//! Every node of every manager lives in one arena owned by [`SceneGraph`].
//! Parent and child links are arena handles; a node's manager is a plain
//! [`ManagerId`] that never keeps the manager alive. Each manager owns a
//! transform-only root node and a render queue rebuilt every frame.
//!
//! A frame runs three phases against a manager's root, each completing for
//! the whole tree before the next begins:
//!
//! 1. animate: animators run, then absolute transforms are refreshed
//! 2. register: visible nodes queue themselves for a render pass
//! 3. render: queued nodes issue their draw calls, pass by pass

use std::sync::Arc;

use crate::core::config::SceneConfig;
use crate::foundation::collections::{ManagerId, NodeId, SlotMap};
use crate::foundation::math::{utils, Mat4, Transform, Vec3, AABB};
use crate::render::driver::{DriverError, VideoDriver};
use crate::render::material::{Material, MaterialFlags, MaterialType};
use crate::render::resources::{OcclusionQuery, Texture};

use super::animator::{AnimationScope, AnimatorHandle};
use super::kinds::{NodeType, RenderView, SceneNodeKind};
use super::node::{NodeDesc, SceneNode, SceneNodeAttributes};
use super::render_queue::{QueueEntry, RenderPass, RenderQueue};
use super::transform::TransformState;

/// Scene graph errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// Node handle does not refer to a live node
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// Manager handle does not refer to a live manager
    #[error("Scene manager not found: {0:?}")]
    ManagerNotFound(ManagerId),

    /// Requested hierarchy change would corrupt the tree
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),
}

/// Outcome of one rendered frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Nodes registered for rendering
    pub registered: usize,
    /// Nodes whose render call succeeded
    pub rendered: usize,
    /// Nodes whose render call failed; they are retried next frame
    pub failed: Vec<(NodeId, DriverError)>,
}

/// A scene manager: a root node and its per-frame render queue
#[derive(Debug)]
pub struct SceneManager {
    name: String,
    root: NodeId,
    queue: RenderQueue,
    camera_position: Option<Vec3>,
}

impl SceneManager {
    /// Manager name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Transform-only root node
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Nodes registered during the last frame
    pub const fn render_queue(&self) -> &RenderQueue {
        &self.queue
    }

    /// Camera position used to order transparent nodes
    pub const fn camera_position(&self) -> Option<Vec3> {
        self.camera_position
    }
}

#[derive(Debug)]
struct Node {
    transform: TransformState,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    manager: ManagerId,
    scene: Option<SceneNode>,
}

impl Node {
    fn new(manager: ManagerId, transform: Transform, scene: Option<SceneNode>) -> Self {
        Self {
            transform: TransformState::new(transform),
            parent: None,
            children: Vec::new(),
            manager,
            scene,
        }
    }

    fn visible(&self) -> bool {
        self.scene.as_ref().map_or(true, |scene| scene.attributes.visible)
    }
}

/// Arena of nodes shared by all scene managers
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: SlotMap<NodeId, Node>,
    managers: SlotMap<ManagerId, SceneManager>,
    config: SceneConfig,
}

impl SceneGraph {
    /// Create an empty graph
    pub fn new(config: SceneConfig) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            managers: SlotMap::with_key(),
            config,
        }
    }

    /// Scene configuration
    pub const fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Node description carrying this graph's default render priority
    pub fn node_desc(&self) -> NodeDesc {
        NodeDesc::new().with_render_priority(self.config.default_render_priority)
    }

    /// Number of live nodes across all managers, roots included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ------------------------------------------------------------------
    // Managers
    // ------------------------------------------------------------------

    /// Create a manager with an empty root
    pub fn create_manager(&mut self, name: impl Into<String>) -> ManagerId {
        let name = name.into();
        let manager = self.managers.insert(SceneManager {
            name: name.clone(),
            root: NodeId::default(),
            queue: RenderQueue::new(),
            camera_position: None,
        });
        let root = self.nodes.insert(Node::new(manager, Transform::default(), None));
        self.managers[manager].root = root;
        log::debug!("Created scene manager '{name}' with root {root:?}");
        manager
    }

    /// Remove a manager together with every node it owns
    pub fn remove_manager(&mut self, manager: ManagerId) -> bool {
        let Some(removed) = self.managers.remove(manager) else {
            return false;
        };
        let before = self.nodes.len();
        self.nodes.retain(|_, node| node.manager != manager);
        log::debug!(
            "Removed scene manager '{}' and {} nodes",
            removed.name,
            before - self.nodes.len()
        );
        true
    }

    /// Manager by handle
    pub fn manager(&self, manager: ManagerId) -> Option<&SceneManager> {
        self.managers.get(manager)
    }

    /// Root node of a manager
    pub fn root(&self, manager: ManagerId) -> Option<NodeId> {
        self.managers.get(manager).map(SceneManager::root)
    }

    /// Set or clear the camera position used to order transparent nodes
    pub fn set_camera_position(&mut self, manager: ManagerId, position: Option<Vec3>) -> bool {
        self.managers.get_mut(manager).map_or(false, |entry| {
            entry.camera_position = position;
            true
        })
    }

    // ------------------------------------------------------------------
    // Node creation
    // ------------------------------------------------------------------

    /// Add a transform-only node under `parent`, or under the manager root
    pub fn add_transform_node(
        &mut self,
        manager: ManagerId,
        parent: Option<NodeId>,
        transform: Transform,
    ) -> Result<NodeId, SceneError> {
        self.insert_node(manager, parent, transform, None)
    }

    /// Add a scene node of the given kind under `parent`, or under the
    /// manager root
    ///
    /// A node joins the manager of its parent.
    pub fn add_scene_node(
        &mut self,
        manager: ManagerId,
        parent: Option<NodeId>,
        kind: impl SceneNodeKind + 'static,
        desc: NodeDesc,
    ) -> Result<NodeId, SceneError> {
        let scene = SceneNode::new(Box::new(kind), desc.attributes);
        self.insert_node(manager, parent, desc.transform, Some(scene))
    }

    fn insert_node(
        &mut self,
        manager: ManagerId,
        parent: Option<NodeId>,
        transform: Transform,
        scene: Option<SceneNode>,
    ) -> Result<NodeId, SceneError> {
        let root = self.root(manager).ok_or(SceneError::ManagerNotFound(manager))?;
        let parent = parent.unwrap_or(root);
        let owner = self
            .nodes
            .get(parent)
            .map(|entry| entry.manager)
            .ok_or(SceneError::NodeNotFound(parent))?;

        let mut node = Node::new(owner, transform, scene);
        node.parent = Some(parent);
        let id = self.nodes.insert(node);
        if let Some(entry) = self.nodes.get_mut(parent) {
            entry.children.push(id);
        }
        log::trace!("Added node {id:?} under {parent:?}");
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Topology
    // ------------------------------------------------------------------

    /// Whether the handle refers to a live node
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(node)
    }

    /// Parent of a node; `None` for roots, orphans and unknown handles
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node).and_then(|entry| entry.parent)
    }

    /// Children of a node in render order
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes.get(node).map(|entry| entry.children.as_slice()).unwrap_or_default()
    }

    /// Manager that owns a node
    pub fn manager_of(&self, node: NodeId) -> Option<ManagerId> {
        self.nodes.get(node).map(|entry| entry.manager)
    }

    /// Whether `ancestor` is on the parent chain of `node`
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = self.parent(node);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.parent(id);
        }
        false
    }

    /// Make `child` the last child of `parent`
    ///
    /// The child is first detached from its current parent. Moving a subtree
    /// into another manager reassigns every node of the subtree to that
    /// manager immediately.
    pub fn try_add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        if !self.contains(parent) {
            return Err(SceneError::NodeNotFound(parent));
        }
        if !self.contains(child) {
            return Err(SceneError::NodeNotFound(child));
        }
        if parent == child {
            return Err(SceneError::InvalidTopology(format!("node {child:?} cannot parent itself")));
        }
        if self.is_ancestor(child, parent) {
            return Err(SceneError::InvalidTopology(format!(
                "node {child:?} is an ancestor of {parent:?}"
            )));
        }
        if self.is_manager_root(child) {
            return Err(SceneError::InvalidTopology(format!("root {child:?} cannot be reparented")));
        }

        self.unlink(child);
        let target_manager = self.nodes[parent].manager;
        self.nodes[parent].children.push(child);
        self.nodes[child].parent = Some(parent);

        if self.nodes[child].manager != target_manager {
            self.set_manager_recursive(child, target_manager);
        }
        self.mark_subtree_dirty(child);
        Ok(())
    }

    /// Make `child` the last child of `parent`; invalid requests are ignored
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        match self.try_add_child(parent, child) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("Ignoring add_child: {err}");
                false
            }
        }
    }

    /// Detach `child` from `parent`; the child and its subtree stay alive
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if self.parent(child) != Some(parent) {
            return false;
        }
        self.unlink(child);
        self.mark_subtree_dirty(child);
        true
    }

    /// Detach a node from its parent, leaving it an orphan
    pub fn detach(&mut self, node: NodeId) -> bool {
        match self.parent(node) {
            Some(parent) => self.remove_child(parent, node),
            None => false,
        }
    }

    /// Destroy a single node; its children become orphans
    ///
    /// Manager roots are only destroyed with their manager.
    pub fn destroy_node(&mut self, node: NodeId) -> bool {
        if !self.contains(node) || self.is_manager_root(node) {
            return false;
        }
        self.unlink(node);
        let Some(removed) = self.nodes.remove(node) else {
            return false;
        };
        for child in removed.children {
            if let Some(entry) = self.nodes.get_mut(child) {
                entry.parent = None;
            }
            self.mark_subtree_dirty(child);
        }
        log::trace!("Destroyed node {node:?}");
        true
    }

    /// Destroy a node and every descendant, returning how many were removed
    pub fn destroy_subtree(&mut self, node: NodeId) -> usize {
        if !self.contains(node) || self.is_manager_root(node) {
            return 0;
        }
        self.unlink(node);
        let doomed = self.collect_subtree(node);
        for id in &doomed {
            self.nodes.remove(*id);
        }
        log::trace!("Destroyed subtree of {node:?} ({} nodes)", doomed.len());
        doomed.len()
    }

    fn is_manager_root(&self, node: NodeId) -> bool {
        self.nodes
            .get(node)
            .and_then(|entry| self.managers.get(entry.manager))
            .is_some_and(|manager| manager.root == node)
    }

    fn unlink(&mut self, node: NodeId) {
        let Some(parent) = self.nodes.get_mut(node).and_then(|entry| entry.parent.take()) else {
            return;
        };
        if let Some(entry) = self.nodes.get_mut(parent) {
            entry.children.retain(|&child| child != node);
        }
    }

    fn collect_subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(entry) = self.nodes.get(id) {
                out.push(id);
                stack.extend(entry.children.iter().rev());
            }
        }
        out
    }

    fn set_manager_recursive(&mut self, node: NodeId, manager: ManagerId) {
        for id in self.collect_subtree(node) {
            if let Some(entry) = self.nodes.get_mut(id) {
                entry.manager = manager;
            }
        }
        log::debug!("Moved subtree of {node:?} to manager {manager:?}");
    }

    fn mark_subtree_dirty(&self, node: NodeId) {
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(entry) = self.nodes.get(id) {
                entry.transform.mark_dirty();
                stack.extend(entry.children.iter().copied());
            }
        }
    }

    // ------------------------------------------------------------------
    // Transforms
    // ------------------------------------------------------------------

    fn update_local(&mut self, node: NodeId, update: impl FnOnce(&mut TransformState)) -> bool {
        let Some(entry) = self.nodes.get_mut(node) else {
            return false;
        };
        update(&mut entry.transform);
        self.mark_subtree_dirty(node);
        true
    }

    /// Replace the local transform
    pub fn set_local_transform(&mut self, node: NodeId, transform: Transform) -> bool {
        self.update_local(node, |state| state.set_local(transform))
    }

    /// Set the local position
    pub fn set_position(&mut self, node: NodeId, position: Vec3) -> bool {
        self.update_local(node, |state| state.set_position(position))
    }

    /// Set the local rotation in degrees
    pub fn set_rotation(&mut self, node: NodeId, rotation: Vec3) -> bool {
        self.update_local(node, |state| state.set_rotation(rotation))
    }

    /// Set the local scale
    pub fn set_scale(&mut self, node: NodeId, scale: Vec3) -> bool {
        self.update_local(node, |state| state.set_scale(scale))
    }

    /// Local position, rotation and scale
    pub fn local_transform(&self, node: NodeId) -> Option<Transform> {
        self.nodes.get(node).map(|entry| *entry.transform.local())
    }

    /// World matrix of a node, recomputed along the parent chain if dirty
    pub fn absolute_transform(&self, node: NodeId) -> Option<Mat4> {
        let mut pending = Vec::new();
        let mut base = Mat4::identity();
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            let entry = self.nodes.get(id)?;
            if !entry.transform.is_dirty() {
                base = entry.transform.cached_absolute();
                break;
            }
            pending.push(&entry.transform);
            cursor = entry.parent;
        }
        for state in pending.into_iter().rev() {
            base *= state.relative_matrix();
            state.store_absolute(base);
        }
        Some(base)
    }

    /// World position of a node
    pub fn absolute_position(&self, node: NodeId) -> Option<Vec3> {
        self.absolute_transform(node).map(|matrix| utils::translation_of(&matrix))
    }

    // ------------------------------------------------------------------
    // Visibility and attributes
    // ------------------------------------------------------------------

    /// Own visibility flag; transform-only nodes are always visible
    pub fn is_visible(&self, node: NodeId) -> bool {
        self.nodes.get(node).is_some_and(Node::visible)
    }

    /// Set the own visibility flag of a scene node
    pub fn set_visible(&mut self, node: NodeId, visible: bool) -> bool {
        self.attributes_mut(node).map_or(false, |attributes| {
            attributes.visible = visible;
            true
        })
    }

    /// Whether the node and every ancestor are visible
    ///
    /// Computed from the current flags on every call.
    pub fn is_truly_visible(&self, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            let Some(entry) = self.nodes.get(id) else {
                return false;
            };
            if !entry.visible() {
                return false;
            }
            cursor = entry.parent;
        }
        true
    }

    /// Attributes of a scene node
    pub fn attributes(&self, node: NodeId) -> Option<&SceneNodeAttributes> {
        self.scene(node).map(|scene| &scene.attributes)
    }

    /// Mutable attributes of a scene node
    pub fn attributes_mut(&mut self, node: NodeId) -> Option<&mut SceneNodeAttributes> {
        self.scene_mut(node).map(|scene| &mut scene.attributes)
    }

    /// Kind of a scene node
    pub fn kind(&self, node: NodeId) -> Option<&dyn SceneNodeKind> {
        self.scene(node).map(|scene| scene.kind.as_ref())
    }

    /// Mutable kind of a scene node
    pub fn kind_mut(&mut self, node: NodeId) -> Option<&mut (dyn SceneNodeKind + 'static)> {
        self.scene_mut(node).map(|scene| scene.kind.as_mut())
    }

    /// Reported type of a scene node
    pub fn node_type(&self, node: NodeId) -> Option<NodeType> {
        self.kind(node).map(|kind| kind.node_type())
    }

    /// Object-space bounds of a scene node
    pub fn bounding_box(&self, node: NodeId) -> Option<AABB> {
        self.kind(node).map(|kind| kind.bounding_box())
    }

    /// Bounds of a scene node transformed into world space
    pub fn transformed_bounding_box(&self, node: NodeId) -> Option<AABB> {
        let local = self.bounding_box(node)?;
        let absolute = self.absolute_transform(node)?;
        Some(local.transformed(&absolute))
    }

    /// Attach, replace or clear the occlusion query of a scene node
    pub fn set_occlusion_query(&mut self, node: NodeId, query: Option<Arc<OcclusionQuery>>) -> bool {
        self.scene_mut(node).map_or(false, |scene| {
            scene.set_occlusion_query(query);
            true
        })
    }

    /// Occlusion query attached to a scene node
    pub fn occlusion_query(&self, node: NodeId) -> Option<&Arc<OcclusionQuery>> {
        self.scene(node).and_then(|scene| scene.query.as_ref())
    }

    fn scene(&self, node: NodeId) -> Option<&SceneNode> {
        self.nodes.get(node).and_then(|entry| entry.scene.as_ref())
    }

    fn scene_mut(&mut self, node: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(node).and_then(|entry| entry.scene.as_mut())
    }

    // ------------------------------------------------------------------
    // Materials
    // ------------------------------------------------------------------

    /// Number of material slots of a node
    pub fn material_count(&self, node: NodeId) -> usize {
        self.kind(node).map_or(0, |kind| kind.material_count())
    }

    /// Material slot of a node
    pub fn material(&self, node: NodeId, index: usize) -> Option<&Material> {
        self.kind(node).and_then(|kind| kind.material(index))
    }

    /// Mutable material slot of a node
    pub fn material_mut(&mut self, node: NodeId, index: usize) -> Option<&mut Material> {
        self.kind_mut(node).and_then(|kind| kind.material_mut(index))
    }

    fn for_each_material(&mut self, node: NodeId, mut apply: impl FnMut(&mut Material)) -> usize {
        let Some(kind) = self.kind_mut(node) else {
            return 0;
        };
        let mut touched = 0;
        for index in 0..kind.material_count() {
            if let Some(material) = kind.material_mut(index) {
                apply(material);
                touched += 1;
            }
        }
        touched
    }

    /// Set a flag on every material of a node
    pub fn set_material_flag(&mut self, node: NodeId, flag: MaterialFlags, value: bool) -> usize {
        self.for_each_material(node, |material| material.set_flag(flag, value))
    }

    /// Set one texture layer on every material of a node
    ///
    /// Out-of-range layers leave the materials untouched.
    pub fn set_material_texture(&mut self, node: NodeId, layer: usize, texture: Option<&Arc<Texture>>) -> usize {
        let mut applied = 0;
        self.for_each_material(node, |material| {
            if material.set_texture(layer, texture.cloned()) {
                applied += 1;
            }
        });
        applied
    }

    /// Set the type of every material of a node
    pub fn set_material_type(&mut self, node: NodeId, material_type: MaterialType) -> usize {
        self.for_each_material(node, |material| material.material_type = material_type)
    }

    // ------------------------------------------------------------------
    // Animators
    // ------------------------------------------------------------------

    /// Append an animator to a scene node
    pub fn add_animator(&mut self, node: NodeId, animator: AnimatorHandle) -> bool {
        self.scene_mut(node).map_or(false, |scene| {
            scene.animators.push(animator);
            true
        })
    }

    /// Detach the first attachment of `animator` from a node
    pub fn remove_animator(&mut self, node: NodeId, animator: &AnimatorHandle) -> bool {
        let Some(scene) = self.scene_mut(node) else {
            return false;
        };
        match scene.animators.iter().position(|handle| handle.same_as(animator)) {
            Some(index) => {
                scene.animators.remove(index);
                true
            }
            None => false,
        }
    }

    /// Detach every animator from a node, returning how many were attached
    pub fn remove_animators(&mut self, node: NodeId) -> usize {
        self.scene_mut(node)
            .map_or(0, |scene| std::mem::take(&mut scene.animators).len())
    }

    /// Animators attached to a node, in run order
    pub fn animators(&self, node: NodeId) -> &[AnimatorHandle] {
        self.scene(node).map(|scene| scene.animators.as_slice()).unwrap_or_default()
    }

    fn has_animator(&self, node: NodeId, animator: &AnimatorHandle) -> bool {
        self.animators(node).iter().any(|handle| handle.same_as(animator))
    }

    // ------------------------------------------------------------------
    // Lookup and cloning
    // ------------------------------------------------------------------

    /// First node with the given id, depth-first from `start`
    pub fn find_by_id(&self, start: NodeId, id: i32) -> Option<NodeId> {
        self.find(start, |attributes| attributes.id == id)
    }

    /// First node with the given name, depth-first from `start`
    pub fn find_by_name(&self, start: NodeId, name: &str) -> Option<NodeId> {
        self.find(start, |attributes| attributes.name == name)
    }

    fn find(&self, start: NodeId, matches: impl Fn(&SceneNodeAttributes) -> bool) -> Option<NodeId> {
        self.collect_subtree(start)
            .into_iter()
            .find(|&id| self.attributes(id).is_some_and(&matches))
    }

    /// Deep copy of a node and its cloneable descendants
    ///
    /// The copy is attached to `new_parent` if given, otherwise to the root
    /// of `new_manager` if that differs from the node's manager, otherwise
    /// next to the original. Attributes are copied, animators are cloned
    /// where they support it, and the occlusion query is not shared.
    /// Returns `None` when the node's kind cannot be cloned or when
    /// `new_parent` is a descendant of `node`; descendants that cannot be
    /// cloned are left out.
    pub fn clone_node(
        &mut self,
        node: NodeId,
        new_parent: Option<NodeId>,
        new_manager: Option<ManagerId>,
    ) -> Option<NodeId> {
        let source = self.nodes.get(node)?;
        let manager = new_manager.unwrap_or(source.manager);
        if !self.managers.contains_key(manager) {
            log::warn!("Cannot clone {node:?} into missing manager {manager:?}");
            return None;
        }
        let parent = match new_parent {
            Some(parent) => {
                if !self.contains(parent) {
                    return None;
                }
                if self.is_ancestor(node, parent) {
                    log::warn!("Cannot clone {node:?} under its own descendant {parent:?}");
                    return None;
                }
                parent
            }
            None if manager != source.manager => self.managers[manager].root,
            None => source.parent.unwrap_or(self.managers[manager].root),
        };
        self.clone_into(node, parent)
    }

    fn clone_into(&mut self, source: NodeId, parent: NodeId) -> Option<NodeId> {
        let entry = self.nodes.get(source)?;
        let scene = match &entry.scene {
            Some(scene) => {
                let kind = scene.kind.clone_kind()?;
                let mut copy = SceneNode::new(kind, scene.attributes.clone());
                copy.animators = scene.animators.iter().filter_map(AnimatorHandle::create_clone).collect();
                Some(copy)
            }
            None => None,
        };
        let local = *entry.transform.local();
        let children = entry.children.clone();
        let manager = self.nodes.get(parent)?.manager;

        let mut node = Node::new(manager, local, scene);
        node.parent = Some(parent);
        let id = self.nodes.insert(node);
        self.nodes[parent].children.push(id);

        for child in children {
            self.clone_into(child, id);
        }
        Some(id)
    }

    // ------------------------------------------------------------------
    // Frame phases
    // ------------------------------------------------------------------

    /// Run animators on a subtree and refresh absolute transforms
    ///
    /// Subtrees that are not truly visible are skipped entirely. An animator
    /// may detach itself, other animators or its node while it runs;
    /// animators detached earlier in the same pass do not run.
    pub fn animate(&mut self, node: NodeId, time_ms: u32) {
        if self.is_truly_visible(node) {
            self.animate_recursive(node, time_ms);
        }
    }

    fn animate_recursive(&mut self, node: NodeId, time_ms: u32) {
        let Some(entry) = self.nodes.get(node) else {
            return;
        };
        if !entry.visible() {
            return;
        }

        let animators = self.animators(node).to_vec();
        for handle in &animators {
            if !self.has_animator(node, handle) {
                continue;
            }
            let mut scope = AnimationScope::new(self, node, time_ms, handle);
            handle.animate(&mut scope);
            if !self.contains(node) {
                return;
            }
        }

        self.absolute_transform(node);

        for child in self.children(node).to_vec() {
            if self.parent(child) == Some(node) {
                self.animate_recursive(child, time_ms);
            }
        }
    }

    /// Queue the visible nodes of a manager for rendering
    ///
    /// The queue is cleared first; registration never carries over between
    /// frames. Returns the number of queued nodes.
    pub fn register(&mut self, manager: ManagerId) -> Result<usize, SceneError> {
        let root = self.root(manager).ok_or(SceneError::ManagerNotFound(manager))?;
        self.managers[manager].queue.clear();
        let mut queued = Vec::new();
        self.register_recursive(root, &mut queued);

        let entry = &mut self.managers[manager];
        for item in &queued {
            entry.queue.push(*item);
        }
        Ok(queued.len())
    }

    fn register_recursive(&mut self, node: NodeId, queued: &mut Vec<QueueEntry>) {
        let Some(entry) = self.nodes.get_mut(node) else {
            return;
        };
        if let Some(scene) = entry.scene.as_mut() {
            if !scene.attributes.visible {
                return;
            }
            if let Some(pass) = scene.kind.register_pass() {
                let priority = scene.attributes.render_priority;
                let position = self.absolute_position(node).unwrap_or_else(Vec3::zeros);
                queued.push(QueueEntry {
                    node,
                    pass,
                    priority,
                    position,
                });
            }
        }
        for child in self.children(node).to_vec() {
            self.register_recursive(child, queued);
        }
    }

    /// Render the nodes registered for a manager, pass by pass
    ///
    /// A failing node is reported and skipped; the rest of the frame still
    /// renders.
    pub fn render_registered(&mut self, manager: ManagerId, driver: &VideoDriver) -> Result<FrameReport, SceneError> {
        let sort_by_distance = self.config.sort_transparent_by_distance;
        let entry = self
            .managers
            .get_mut(manager)
            .ok_or(SceneError::ManagerNotFound(manager))?;
        entry.queue.sort(entry.camera_position, sort_by_distance);

        let entry = &self.managers[manager];
        let mut report = FrameReport {
            registered: entry.queue.len(),
            ..FrameReport::default()
        };
        for pass in RenderPass::ORDER {
            for queued in entry.queue.pass(pass) {
                let Some(scene) = self.scene(queued.node) else {
                    continue;
                };
                let view = RenderView {
                    node: queued.node,
                    absolute_transform: self.absolute_transform(queued.node).unwrap_or_else(Mat4::identity),
                    attributes: &scene.attributes,
                    occlusion_query: scene.query.as_ref(),
                };
                match scene.kind.render(&view, driver) {
                    Ok(()) => report.rendered += 1,
                    Err(err) => {
                        log::warn!("Node {:?} failed to render: {err}", queued.node);
                        report.failed.push((queued.node, err));
                    }
                }
            }
        }
        Ok(report)
    }

    /// Animate, register and render one frame of a manager
    pub fn draw_all(&mut self, manager: ManagerId, time_ms: u32, driver: &VideoDriver) -> Result<FrameReport, SceneError> {
        let root = self.root(manager).ok_or(SceneError::ManagerNotFound(manager))?;
        self.animate(root, time_ms);
        self.register(manager)?;
        self.render_registered(manager, driver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::kinds::EmptyNode;
    use approx::assert_relative_eq;

    fn graph_with_manager() -> (SceneGraph, ManagerId) {
        let mut graph = SceneGraph::new(SceneConfig::default());
        let manager = graph.create_manager("main");
        (graph, manager)
    }

    fn empty(graph: &mut SceneGraph, manager: ManagerId, parent: Option<NodeId>, name: &str) -> NodeId {
        graph
            .add_scene_node(manager, parent, EmptyNode::new(), NodeDesc::new().with_name(name))
            .unwrap()
    }

    #[test]
    fn test_new_nodes_hang_off_the_root() {
        let (mut graph, manager) = graph_with_manager();
        let root = graph.root(manager).unwrap();
        let a = empty(&mut graph, manager, None, "a");
        assert_eq!(graph.parent(a), Some(root));
        assert_eq!(graph.children(root), &[a]);
        assert_eq!(graph.manager_of(a), Some(manager));
    }

    #[test]
    fn test_missing_manager_or_parent() {
        let (mut graph, manager) = graph_with_manager();
        let a = empty(&mut graph, manager, None, "a");
        graph.destroy_node(a);

        let err = graph
            .add_transform_node(manager, Some(a), Transform::default())
            .unwrap_err();
        assert_eq!(err, SceneError::NodeNotFound(a));

        graph.remove_manager(manager);
        let err = graph.add_transform_node(manager, None, Transform::default()).unwrap_err();
        assert_eq!(err, SceneError::ManagerNotFound(manager));
    }

    #[test]
    fn test_self_parenting_is_a_no_op() {
        let (mut graph, manager) = graph_with_manager();
        let a = empty(&mut graph, manager, None, "a");
        let root = graph.root(manager).unwrap();

        assert!(!graph.add_child(a, a));
        assert_eq!(graph.parent(a), Some(root));
        assert!(matches!(graph.try_add_child(a, a), Err(SceneError::InvalidTopology(_))));
    }

    #[test]
    fn test_cycles_are_rejected() {
        let (mut graph, manager) = graph_with_manager();
        let a = empty(&mut graph, manager, None, "a");
        let b = empty(&mut graph, manager, Some(a), "b");

        assert!(!graph.add_child(b, a));
        assert_eq!(graph.parent(b), Some(a));
        assert!(graph.children(b).is_empty());
    }

    #[test]
    fn test_reparent_detaches_from_previous_parent() {
        let (mut graph, manager) = graph_with_manager();
        let a = empty(&mut graph, manager, None, "a");
        let b = empty(&mut graph, manager, None, "b");
        let c = empty(&mut graph, manager, Some(a), "c");

        assert!(graph.add_child(b, c));
        assert!(graph.children(a).is_empty());
        assert_eq!(graph.children(b), &[c]);
        assert_eq!(graph.parent(c), Some(b));
    }

    #[test]
    fn test_destroy_node_orphans_children() {
        let (mut graph, manager) = graph_with_manager();
        let a = empty(&mut graph, manager, None, "a");
        let b = empty(&mut graph, manager, Some(a), "b");

        assert!(graph.destroy_node(a));
        assert!(!graph.contains(a));
        assert!(graph.contains(b));
        assert_eq!(graph.parent(b), None);
    }

    #[test]
    fn test_destroy_subtree() {
        let (mut graph, manager) = graph_with_manager();
        let root = graph.root(manager).unwrap();
        let a = empty(&mut graph, manager, None, "a");
        let b = empty(&mut graph, manager, Some(a), "b");
        empty(&mut graph, manager, Some(b), "c");

        assert_eq!(graph.destroy_subtree(a), 3);
        assert_eq!(graph.node_count(), 1);
        assert!(graph.children(root).is_empty());
        assert_eq!(graph.destroy_subtree(root), 0);
    }

    #[test]
    fn test_absolute_transform_composes_parent_chain() {
        let (mut graph, manager) = graph_with_manager();
        let a = graph
            .add_transform_node(manager, None, Transform::from_position(Vec3::new(1.0, 0.0, 0.0)))
            .unwrap();
        let b = graph
            .add_transform_node(manager, Some(a), Transform::from_position(Vec3::new(0.0, 2.0, 0.0)))
            .unwrap();

        let position = graph.absolute_position(b).unwrap();
        assert_relative_eq!(position, Vec3::new(1.0, 2.0, 0.0), epsilon = 1e-6);

        graph.set_scale(a, Vec3::new(2.0, 2.0, 2.0));
        let expected = graph.absolute_transform(a).unwrap() * graph.local_transform(b).unwrap().to_matrix();
        assert_relative_eq!(graph.absolute_transform(b).unwrap(), expected, epsilon = 1e-6);
        assert_relative_eq!(graph.absolute_position(b).unwrap(), Vec3::new(1.0, 4.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_reparent_refreshes_absolute_transform() {
        let (mut graph, manager) = graph_with_manager();
        let a = graph
            .add_transform_node(manager, None, Transform::from_position(Vec3::new(5.0, 0.0, 0.0)))
            .unwrap();
        let b = empty(&mut graph, manager, None, "b");
        assert_relative_eq!(graph.absolute_position(b).unwrap(), Vec3::zeros());

        graph.add_child(a, b);
        assert_relative_eq!(graph.absolute_position(b).unwrap(), Vec3::new(5.0, 0.0, 0.0));

        graph.detach(b);
        assert_relative_eq!(graph.absolute_position(b).unwrap(), Vec3::zeros());
    }

    #[test]
    fn test_truly_visible_follows_ancestors() {
        let (mut graph, manager) = graph_with_manager();
        let a = empty(&mut graph, manager, None, "a");
        let b = empty(&mut graph, manager, Some(a), "b");

        assert!(graph.is_truly_visible(b));
        graph.set_visible(a, false);
        assert!(graph.is_visible(b));
        assert!(!graph.is_truly_visible(b));
        graph.set_visible(a, true);
        assert!(graph.is_truly_visible(b));
    }

    #[test]
    fn test_find_by_id_and_name() {
        let (mut graph, manager) = graph_with_manager();
        let root = graph.root(manager).unwrap();
        let a = empty(&mut graph, manager, None, "a");
        let b = graph
            .add_scene_node(manager, Some(a), EmptyNode::new(), NodeDesc::new().with_id(42).with_name("b"))
            .unwrap();

        assert_eq!(graph.find_by_id(root, 42), Some(b));
        assert_eq!(graph.find_by_name(root, "a"), Some(a));
        assert_eq!(graph.find_by_name(b, "a"), None);
        assert_eq!(graph.find_by_id(root, 7), None);
    }

    #[test]
    fn test_remove_manager_drops_its_nodes() {
        let mut graph = SceneGraph::default();
        let first = graph.create_manager("first");
        let second = graph.create_manager("second");
        empty(&mut graph, first, None, "a");
        let kept = empty(&mut graph, second, None, "b");

        assert!(graph.remove_manager(first));
        assert!(!graph.remove_manager(first));
        assert_eq!(graph.node_count(), 2);
        assert!(graph.contains(kept));
    }

    #[test]
    fn test_register_clears_previous_frame() {
        let (mut graph, manager) = graph_with_manager();
        empty(&mut graph, manager, None, "a");
        assert_eq!(graph.register(manager).unwrap(), 0);
        assert!(graph.manager(manager).unwrap().render_queue().is_empty());
    }
}
