//! Graphics backend abstraction
//!
//! The driver talks to the GPU only through [`GraphicsBackend`]. Objects are
//! identified by opaque [`BackendHandle`]s; ownership of those handles lives
//! in the reference-counted resource types of [`super::resources`].

use std::fmt;

use crate::foundation::math::Mat4;

use super::sampler::SamplingParams;
use super::vertex_format::{ComponentCount, ComponentType, InputRate};

/// Opaque name of a backend object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendHandle(pub u32);

impl fmt::Display for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kinds of objects a backend can allocate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Vertex or index storage
    Buffer,
    /// Texture image
    Texture,
    /// Vertex array object
    VertexArray,
    /// Sampler state object
    Sampler,
    /// Framebuffer object
    Framebuffer,
    /// Transform feedback object
    TransformFeedback,
    /// Occlusion or timer query
    Query,
}

/// Primitive topology of a draw call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    /// Independent points
    Points,
    /// Connected line segments
    LineStrip,
    /// Connected line segments closed back to the first vertex
    LineLoop,
    /// Independent line segments
    Lines,
    /// Connected triangles sharing an edge
    TriangleStrip,
    /// Triangles sharing the first vertex
    TriangleFan,
    /// Independent triangles
    Triangles,
}

impl PrimitiveType {
    /// Base primitive recorded when capturing this topology with transform feedback
    pub const fn capture_class(self) -> Self {
        match self {
            Self::Points => Self::Points,
            Self::Lines | Self::LineStrip | Self::LineLoop => Self::Lines,
            Self::Triangles | Self::TriangleStrip | Self::TriangleFan => Self::Triangles,
        }
    }
}

/// Optional GPU capabilities the driver can query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverFeature {
    /// Alpha-to-coverage multisampling
    AlphaToCoverage,
    /// Geometry shader stage
    GeometryShader,
    /// Tessellation control and evaluation stages
    TessellationShader,
    /// Texture barrier for read-after-write within a pass
    TextureBarrier,
    /// Sampling the stencil aspect of a depth-stencil texture
    StencilOnlyTexture,
    /// Base vertex, base instance and draw id in shaders
    ShaderDrawParams,
    /// Indirect multi-draw with a GPU-sourced draw count
    MultiDrawIndirectCount,
}

impl DriverFeature {
    /// Every feature, in declaration order
    pub const ALL: [Self; 7] = [
        Self::AlphaToCoverage,
        Self::GeometryShader,
        Self::TessellationShader,
        Self::TextureBarrier,
        Self::StencilOnlyTexture,
        Self::ShaderDrawParams,
        Self::MultiDrawIndirectCount,
    ];
}

/// Parameters for creating a texture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescriptor {
    /// Debug label
    pub label: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Number of mip levels
    pub mip_levels: u32,
}

impl TextureDescriptor {
    /// Create a descriptor for a single-level texture
    pub fn new(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            mip_levels: 1,
        }
    }

    /// Set the number of mip levels
    pub const fn with_mip_levels(mut self, levels: u32) -> Self {
        self.mip_levels = levels;
        self
    }
}

/// Errors reported by a graphics backend
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend could not allocate another object
    #[error("out of resources allocating {0:?}")]
    OutOfResources(ObjectKind),

    /// The handle does not name a live object of that kind
    #[error("invalid {kind:?} handle {handle}")]
    InvalidHandle {
        /// Expected object kind
        kind: ObjectKind,
        /// Offending handle
        handle: BackendHandle,
    },
}

/// GPU command interface used by the driver
///
/// Deletion calls may arrive from any thread because the last reference to a
/// resource can be dropped anywhere.
pub trait GraphicsBackend: Send + Sync + fmt::Debug {
    /// Human readable backend name
    fn name(&self) -> &str;

    /// Whether the backend supports an optional feature
    fn query_feature(&self, feature: DriverFeature) -> bool;

    /// Allocate buffer storage of `size` bytes
    fn create_buffer(&self, size: usize) -> Result<BackendHandle, BackendError>;

    /// Replace the storage of an existing buffer
    fn reallocate_buffer(&self, buffer: BackendHandle, size: usize) -> Result<(), BackendError>;

    /// Delete a buffer
    fn delete_buffer(&self, buffer: BackendHandle);

    /// Create a texture
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<BackendHandle, BackendError>;

    /// Delete a texture
    fn delete_texture(&self, texture: BackendHandle);

    /// Create an empty vertex array object
    fn create_vertex_array(&self) -> Result<BackendHandle, BackendError>;

    /// Enable an attribute and fix its format and step rate
    fn enable_vertex_attrib(
        &self,
        vao: BackendHandle,
        attribute: u32,
        components: ComponentCount,
        component_type: ComponentType,
        input_rate: InputRate,
    );

    /// Attach a vertex buffer to an attribute
    fn vertex_array_vertex_buffer(
        &self,
        vao: BackendHandle,
        attribute: u32,
        buffer: BackendHandle,
        offset: usize,
        stride: usize,
    );

    /// Attach or detach the element buffer
    fn vertex_array_element_buffer(&self, vao: BackendHandle, buffer: Option<BackendHandle>);

    /// Delete a vertex array object
    fn delete_vertex_array(&self, vao: BackendHandle);

    /// Make a vertex array current
    fn bind_vertex_array(&self, vao: BackendHandle);

    /// Create a sampler object
    fn create_sampler(&self, params: &SamplingParams) -> Result<BackendHandle, BackendError>;

    /// Delete a sampler object
    fn delete_sampler(&self, sampler: BackendHandle);

    /// Bind a texture and sampler to a texture unit; `None` unbinds
    fn bind_texture_unit(
        &self,
        unit: u32,
        texture: Option<BackendHandle>,
        sampler: Option<BackendHandle>,
    );

    /// Create a framebuffer object
    fn create_framebuffer(&self, width: u32, height: u32) -> Result<BackendHandle, BackendError>;

    /// Delete a framebuffer object
    fn delete_framebuffer(&self, framebuffer: BackendHandle);

    /// Bind a framebuffer; `None` selects the default framebuffer
    fn bind_framebuffer(&self, framebuffer: Option<BackendHandle>);

    /// Create a transform feedback object
    fn create_transform_feedback(&self) -> Result<BackendHandle, BackendError>;

    /// Delete a transform feedback object
    fn delete_transform_feedback(&self, feedback: BackendHandle);

    /// Bind a transform feedback object; `None` unbinds
    fn bind_transform_feedback(&self, feedback: Option<BackendHandle>);

    /// Start capturing primitives into the bound transform feedback
    fn begin_transform_feedback(&self, primitive: PrimitiveType);

    /// Pause an active capture
    fn pause_transform_feedback(&self);

    /// Resume a paused capture
    fn resume_transform_feedback(&self);

    /// Finish the active capture
    fn end_transform_feedback(&self);

    /// Create an occlusion query object
    fn create_query(&self) -> Result<BackendHandle, BackendError>;

    /// Delete an occlusion query object
    fn delete_query(&self, query: BackendHandle);

    /// Model-to-world matrix applied by subsequent draws
    fn set_world_transform(&self, matrix: &Mat4);

    /// Issue a draw with the current vertex array
    fn draw(&self, primitive: PrimitiveType, count: u32, indexed: bool, instances: u32);
}
