//! Render queue filled during the register phase
//!
//! Nodes register into a pass; the render phase drains the passes in
//! [`RenderPass::ORDER`]. The queue is cleared at the start of every frame,
//! so only nodes registered this frame are rendered.

use crate::foundation::collections::NodeId;
use crate::foundation::math::Vec3;

/// Pass a node is rendered in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderPass {
    /// Cameras set up view state before anything draws
    Camera,
    /// Lights
    Light,
    /// Sky boxes, drawn behind the scene
    SkyBox,
    /// Opaque geometry
    Solid,
    /// Blended geometry
    Transparent,
}

impl RenderPass {
    /// Execution order of the render phase
    pub const ORDER: [Self; 5] = [
        Self::Camera,
        Self::Light,
        Self::SkyBox,
        Self::Solid,
        Self::Transparent,
    ];

    const fn index(self) -> usize {
        match self {
            Self::Camera => 0,
            Self::Light => 1,
            Self::SkyBox => 2,
            Self::Solid => 3,
            Self::Transparent => 4,
        }
    }
}

/// A registered node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueEntry {
    /// Registered node
    pub node: NodeId,
    /// Pass it registered for
    pub pass: RenderPass,
    /// Render priority; lower renders first within a pass
    pub priority: u32,
    /// World position at registration time
    pub position: Vec3,
}

/// Per-frame render queue of one scene manager
#[derive(Debug, Default)]
pub struct RenderQueue {
    passes: [Vec<QueueEntry>; 5],
}

impl RenderQueue {
    /// Create an empty render queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a registered node
    pub fn push(&mut self, entry: QueueEntry) {
        self.passes[entry.pass.index()].push(entry);
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        for pass in &mut self.passes {
            pass.clear();
        }
    }

    /// Order entries within each pass
    ///
    /// Every pass is ordered by ascending priority, stable for ties. With a
    /// camera position and `sort_by_distance`, the transparent pass is
    /// instead ordered back-to-front.
    pub fn sort(&mut self, camera: Option<Vec3>, sort_by_distance: bool) {
        for pass in &mut self.passes {
            pass.sort_by_key(|entry| entry.priority);
        }
        if let (Some(camera), true) = (camera, sort_by_distance) {
            let transparent = &mut self.passes[RenderPass::Transparent.index()];
            transparent.sort_by(|a, b| {
                let da = (a.position - camera).norm_squared();
                let db = (b.position - camera).norm_squared();
                db.total_cmp(&da)
            });
        }
    }

    /// Entries of one pass in their current order
    pub fn pass(&self, pass: RenderPass) -> &[QueueEntry] {
        &self.passes[pass.index()]
    }

    /// Every entry, passes in execution order
    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        RenderPass::ORDER
            .into_iter()
            .flat_map(move |pass| self.pass(pass).iter())
    }

    /// Total number of registered nodes
    pub fn len(&self) -> usize {
        self.passes.iter().map(Vec::len).sum()
    }

    /// Whether nothing registered
    pub fn is_empty(&self) -> bool {
        self.passes.iter().all(Vec::is_empty)
    }
}
