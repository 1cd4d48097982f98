//! Cached local and absolute transforms of a node
//!
//! The absolute matrix is recomputed lazily from the parent chain. Setters
//! only mark state dirty; the graph propagates the dirty flag to descendants
//! because their absolute matrices depend on this one.

use std::cell::Cell;

use crate::foundation::math::{Mat4, Transform, Vec3};

/// Transform facility shared by every node flavour
#[derive(Debug, Clone)]
pub struct TransformState {
    local: Transform,
    relative: Mat4,
    absolute: Cell<Mat4>,
    dirty: Cell<bool>,
}

impl Default for TransformState {
    fn default() -> Self {
        Self::new(Transform::default())
    }
}

impl TransformState {
    /// State for `local`, with the absolute matrix pending
    pub fn new(local: Transform) -> Self {
        Self {
            local,
            relative: local.to_matrix(),
            absolute: Cell::new(Mat4::identity()),
            dirty: Cell::new(true),
        }
    }

    /// Local position, rotation and scale
    pub const fn local(&self) -> &Transform {
        &self.local
    }

    /// Replace the local transform
    pub fn set_local(&mut self, local: Transform) {
        self.local = local;
        self.relative = local.to_matrix();
        self.dirty.set(true);
    }

    /// Set the local position
    pub fn set_position(&mut self, position: Vec3) {
        self.set_local(Transform { position, ..self.local });
    }

    /// Set the local rotation in degrees
    pub fn set_rotation(&mut self, rotation: Vec3) {
        self.set_local(Transform { rotation, ..self.local });
    }

    /// Set the local scale
    pub fn set_scale(&mut self, scale: Vec3) {
        self.set_local(Transform { scale, ..self.local });
    }

    /// Matrix of the local transform
    pub const fn relative_matrix(&self) -> &Mat4 {
        &self.relative
    }

    /// Whether the cached absolute matrix is out of date
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Mark the cached absolute matrix out of date
    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }

    /// Cached absolute matrix, valid when not dirty
    pub fn cached_absolute(&self) -> Mat4 {
        self.absolute.get()
    }

    /// Store a freshly computed absolute matrix
    pub fn store_absolute(&self, absolute: Mat4) {
        self.absolute.set(absolute);
        self.dirty.set(false);
    }
}
