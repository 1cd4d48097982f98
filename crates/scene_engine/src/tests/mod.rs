//! Scenario tests spanning the scene graph and the render layer
//!
//! Everything runs against [`RecordingBackend`]; a shared journal records
//! the order in which animators run and nodes register and render.

mod frame;

use std::sync::{Arc, Mutex};

use crate::core::config::{CacheConfig, DriverConfig, SceneConfig};
use crate::foundation::collections::{ManagerId, NodeId};
use crate::foundation::math::AABB;
use crate::foundation::sync::lock;
use crate::render::driver::{DriverError, MeshBuffer, VideoDriver};
use crate::render::material::Material;
use crate::render::recording::RecordingBackend;
use crate::render::resources::ReallocationClock;
use crate::render::vertex_format::{AttributeBinding, ComponentCount, ComponentType, VertexArraySpec};
use crate::scene::{
    AnimationScope, AnimatorHandle, NodeDesc, RenderPass, RenderView, SceneGraph, SceneNodeAnimator, SceneNodeKind,
};

pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

pub(crate) fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) fn entries(journal: &Journal) -> Vec<String> {
    lock(journal).clone()
}

pub(crate) fn entries_with_prefix(journal: &Journal, prefix: &str) -> Vec<String> {
    entries(journal)
        .into_iter()
        .filter_map(|entry| entry.strip_prefix(prefix).map(str::to_string))
        .collect()
}

/// Kind that journals registration and rendering, optionally drawing a mesh
#[derive(Debug, Clone)]
pub(crate) struct ProbeNode {
    label: String,
    pass: Option<RenderPass>,
    journal: Journal,
    mesh: Option<(MeshBuffer, Material)>,
}

impl ProbeNode {
    pub(crate) fn new(label: &str, journal: &Journal) -> Self {
        Self {
            label: label.to_string(),
            pass: Some(RenderPass::Solid),
            journal: Arc::clone(journal),
            mesh: None,
        }
    }

    pub(crate) const fn in_pass(mut self, pass: RenderPass) -> Self {
        self.pass = Some(pass);
        self
    }

    pub(crate) fn drawing(mut self, mesh: MeshBuffer) -> Self {
        self.mesh = Some((mesh, Material::new()));
        self
    }
}

impl SceneNodeKind for ProbeNode {
    fn bounding_box(&self) -> AABB {
        AABB::default()
    }

    fn register_pass(&mut self) -> Option<RenderPass> {
        lock(&self.journal).push(format!("register:{}", self.label));
        self.pass
    }

    fn render(&self, _view: &RenderView<'_>, driver: &VideoDriver) -> Result<(), DriverError> {
        lock(&self.journal).push(format!("render:{}", self.label));
        match &self.mesh {
            Some((mesh, material)) => driver.draw_mesh_buffer(mesh, material),
            None => Ok(()),
        }
    }

    fn clone_kind(&self) -> Option<Box<dyn SceneNodeKind>> {
        Some(Box::new(self.clone()))
    }
}

/// Kind that cannot be cloned
#[derive(Debug)]
pub(crate) struct PinnedNode;

impl SceneNodeKind for PinnedNode {
    fn bounding_box(&self) -> AABB {
        AABB::default()
    }

    fn render(&self, _view: &RenderView<'_>, _driver: &VideoDriver) -> Result<(), DriverError> {
        Ok(())
    }
}

/// What a [`JournalAnimator`] does after journaling its label
pub(crate) enum Action {
    Record,
    RemoveSelf,
    DetachNode,
    RemoveOther(AnimatorHandle),
    CloneNode,
}

/// Animator that journals every run
pub(crate) struct JournalAnimator {
    label: &'static str,
    journal: Journal,
    action: Action,
}

impl JournalAnimator {
    pub(crate) fn handle(label: &'static str, journal: &Journal, action: Action) -> AnimatorHandle {
        AnimatorHandle::new(Self {
            label,
            journal: Arc::clone(journal),
            action,
        })
    }
}

impl SceneNodeAnimator for JournalAnimator {
    fn animate_node(&mut self, scope: &mut AnimationScope<'_>) {
        lock(&self.journal).push(format!("animate:{}", self.label));
        match &self.action {
            Action::Record => {}
            Action::RemoveSelf => {
                scope.remove_self();
            }
            Action::DetachNode => {
                scope.graph.detach(scope.node);
            }
            Action::RemoveOther(other) => {
                scope.graph.remove_animator(scope.node, other);
            }
            Action::CloneNode => {
                if let Some(copy) = scope.graph.clone_node(scope.node, None, None) {
                    lock(&self.journal).push(format!("cloned:{copy:?}"));
                }
            }
        }
    }
}

/// Scene graph, driver and journal wired to a recording backend
pub(crate) struct Harness {
    pub backend: Arc<RecordingBackend>,
    pub driver: VideoDriver,
    pub graph: SceneGraph,
    pub manager: ManagerId,
    pub journal: Journal,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_cache(CacheConfig::default())
    }

    pub(crate) fn with_cache(cache: CacheConfig) -> Self {
        crate::foundation::logging::init_for_tests();
        let backend = Arc::new(RecordingBackend::new());
        let driver = VideoDriver::with_clock(
            backend.clone(),
            &DriverConfig::default(),
            &cache,
            Arc::new(ReallocationClock::new()),
        )
        .unwrap();
        let mut graph = SceneGraph::new(SceneConfig::default());
        let manager = graph.create_manager("main");
        Self {
            backend,
            driver,
            graph,
            manager,
            journal: journal(),
        }
    }

    pub(crate) fn probe(&mut self, parent: Option<NodeId>, label: &str) -> NodeId {
        let kind = ProbeNode::new(label, &self.journal);
        self.add(parent, kind, NodeDesc::new().with_name(label))
    }

    pub(crate) fn add(&mut self, parent: Option<NodeId>, kind: impl SceneNodeKind + 'static, desc: NodeDesc) -> NodeId {
        self.graph.add_scene_node(self.manager, parent, kind, desc).unwrap()
    }

    pub(crate) fn frame(&mut self, time_ms: u32) -> crate::scene::FrameReport {
        self.graph.draw_all(self.manager, time_ms, &self.driver).unwrap()
    }

    /// Triangle list reading three floats per vertex from a fresh buffer
    pub(crate) fn triangle(&self) -> MeshBuffer {
        let positions = self.driver.create_buffer(36).unwrap();
        let spec = VertexArraySpec::new()
            .with_attribute(0, AttributeBinding::new(positions, ComponentType::Float, ComponentCount::Three));
        MeshBuffer::new(spec, 3)
    }

    /// Like [`Harness::triangle`] with a second, per-vertex color attribute
    pub(crate) fn colored_triangle(&self) -> MeshBuffer {
        let mut mesh = self.triangle();
        let colors = self.driver.create_buffer(12).unwrap();
        mesh.spec.set_attribute(
            1,
            AttributeBinding::new(colors, ComponentType::NormalizedUnsignedByte, ComponentCount::Bgra),
        );
        mesh
    }
}
