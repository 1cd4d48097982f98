//! nalgebra aliases plus the transform and bounding box types nodes carry

pub use nalgebra::{Matrix4, Rotation3, Vector3};

/// Single precision 3-component vector
pub type Vec3 = Vector3<f32>;

/// Single precision homogeneous matrix
pub type Mat4 = Matrix4<f32>;

/// Single precision point
pub type Point3 = nalgebra::Point3<f32>;

/// Position, Euler rotation in degrees and scale of a node relative to its parent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Offset from the parent origin
    pub position: Vec3,

    /// Degrees around X, Y and Z
    pub rotation: Vec3,

    /// Per-axis scale
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::new(Vec3::zeros(), Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0))
    }
}

impl Transform {
    /// Build from all three components
    pub const fn new(position: Vec3, rotation: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Pure translation
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Composed matrix; scale applies first and translation last
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * utils::rotation_from_degrees(&self.rotation)
            * Mat4::new_nonuniform_scaling(&self.scale)
    }
}

/// Axis-aligned box given by its two extreme corners
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    /// Smallest coordinate on every axis
    pub min: Vec3,
    /// Largest coordinate on every axis
    pub max: Vec3,
}

impl Default for AABB {
    fn default() -> Self {
        Self::new(Vec3::zeros(), Vec3::zeros())
    }
}

impl AABB {
    /// Box spanning `min..=max`
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Grow the box so it contains `point`
    pub fn add_point(&mut self, point: Vec3) {
        self.min = self.min.inf(&point);
        self.max = self.max.sup(&point);
    }

    /// The eight corners of the box
    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }

    /// Box enclosing this box after transformation by `matrix`
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let mut points = self
            .corners()
            .into_iter()
            .map(|corner| matrix.transform_point(&Point3::from(corner)).coords);
        let Some(first) = points.next() else {
            return *self;
        };
        points.fold(Self::new(first, first), |mut acc, point| {
            acc.add_point(point);
            acc
        })
    }
}

/// Matrix helpers shared by the scene graph
pub mod utils {
    use super::{Mat4, Rotation3, Vec3};

    /// Homogeneous rotation from Euler angles in degrees
    pub fn rotation_from_degrees(degrees: &Vec3) -> Mat4 {
        Rotation3::from_euler_angles(
            degrees.x.to_radians(),
            degrees.y.to_radians(),
            degrees.z.to_radians(),
        )
        .to_homogeneous()
    }

    /// Translation column of an affine matrix
    pub fn translation_of(matrix: &Mat4) -> Vec3 {
        Vec3::new(matrix.m14, matrix.m24, matrix.m34)
    }
}
