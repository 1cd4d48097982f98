//! Materials applied by the driver when drawing a mesh buffer

use std::sync::Arc;

use bitflags::bitflags;

use super::resources::Texture;
use super::sampler::SamplingParams;

/// Number of texture layers per material
pub const MATERIAL_MAX_TEXTURES: usize = 8;

bitflags! {
    /// Fixed-function state toggles of a material
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MaterialFlags: u32 {
        /// Draw edges only
        const WIREFRAME = 1 << 0;
        /// Draw vertices only
        const POINTCLOUD = 1 << 1;
        /// Smooth shading across faces
        const GOURAUD_SHADING = 1 << 2;
        /// Apply dynamic lighting
        const LIGHTING = 1 << 3;
        /// Depth test
        const ZBUFFER = 1 << 4;
        /// Depth writes
        const ZWRITE_ENABLE = 1 << 5;
        /// Cull back faces
        const BACK_FACE_CULLING = 1 << 6;
        /// Cull front faces
        const FRONT_FACE_CULLING = 1 << 7;
        /// Fog blending
        const FOG_ENABLE = 1 << 8;
        /// Renormalize normals after scaling
        const NORMALIZE_NORMALS = 1 << 9;
    }
}

impl Default for MaterialFlags {
    fn default() -> Self {
        Self::GOURAUD_SHADING
            | Self::LIGHTING
            | Self::ZBUFFER
            | Self::ZWRITE_ENABLE
            | Self::BACK_FACE_CULLING
    }
}

/// Shading model of a material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MaterialType {
    /// Opaque
    #[default]
    Solid,
    /// Additive blending
    TransparentAddColor,
    /// Blend by texture alpha
    TransparentAlphaChannel,
    /// Blend by vertex alpha
    TransparentVertexAlpha,
    /// Application-defined shader; `u32` is its id
    Custom(u32),
}

impl MaterialType {
    /// Whether nodes using this type belong in the transparent pass
    pub const fn is_transparent(self) -> bool {
        matches!(
            self,
            Self::TransparentAddColor | Self::TransparentAlphaChannel | Self::TransparentVertexAlpha
        )
    }
}

/// A texture with the sampling state it is read with
#[derive(Debug, Clone)]
pub struct TextureLayer {
    /// Bound texture
    pub texture: Arc<Texture>,
    /// Sampler state
    pub sampling: SamplingParams,
}

impl TextureLayer {
    /// Layer with default sampling
    pub fn new(texture: Arc<Texture>) -> Self {
        Self {
            texture,
            sampling: SamplingParams::default(),
        }
    }
}

/// Render state of one mesh buffer
#[derive(Debug, Clone, Default)]
pub struct Material {
    /// Shading model
    pub material_type: MaterialType,
    /// State toggles
    pub flags: MaterialFlags,
    /// Texture layers, one per texture unit
    pub textures: [Option<TextureLayer>; MATERIAL_MAX_TEXTURES],
}

impl Material {
    /// Opaque material with default flags
    pub fn new() -> Self {
        Self::default()
    }

    /// Material of the given type
    pub fn with_type(material_type: MaterialType) -> Self {
        Self {
            material_type,
            ..Self::default()
        }
    }

    /// Set or clear a flag
    pub fn set_flag(&mut self, flag: MaterialFlags, value: bool) {
        self.flags.set(flag, value);
    }

    /// Whether every bit of `flag` is set
    pub const fn flag(&self, flag: MaterialFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Replace the texture of a layer, keeping its sampling state
    ///
    /// Returns `false` if `layer` is out of range.
    pub fn set_texture(&mut self, layer: usize, texture: Option<Arc<Texture>>) -> bool {
        let Some(slot) = self.textures.get_mut(layer) else {
            return false;
        };
        *slot = match (slot.take(), texture) {
            (Some(previous), Some(texture)) => Some(TextureLayer {
                texture,
                sampling: previous.sampling,
            }),
            (None, Some(texture)) => Some(TextureLayer::new(texture)),
            (_, None) => None,
        };
        true
    }

    /// Texture of a layer
    pub fn texture(&self, layer: usize) -> Option<&Arc<Texture>> {
        self.textures
            .get(layer)
            .and_then(Option::as_ref)
            .map(|layer| &layer.texture)
    }

    /// Whether this material renders in the transparent pass
    pub const fn is_transparent(&self) -> bool {
        self.material_type.is_transparent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::{GraphicsBackend, TextureDescriptor};
    use crate::render::recording::RecordingBackend;
    use crate::render::sampler::TextureWrap;

    fn texture() -> Arc<Texture> {
        let backend: Arc<dyn GraphicsBackend> = Arc::new(RecordingBackend::new());
        Texture::new(backend, TextureDescriptor::new("test", 4, 4)).unwrap()
    }

    #[test]
    fn test_default_material() {
        let material = Material::default();
        assert_eq!(material.material_type, MaterialType::Solid);
        assert!(material.flag(MaterialFlags::ZBUFFER));
        assert!(!material.flag(MaterialFlags::WIREFRAME));
        assert!(!material.is_transparent());
    }

    #[test]
    fn test_set_texture_keeps_sampling() {
        let mut material = Material::new();
        assert!(material.set_texture(2, Some(texture())));
        if let Some(layer) = material.textures[2].as_mut() {
            layer.sampling = layer.sampling.with_wrap(TextureWrap::ClampToEdge);
        }

        let replacement = texture();
        assert!(material.set_texture(2, Some(Arc::clone(&replacement))));
        let layer = material.textures[2].as_ref().unwrap();
        assert!(Arc::ptr_eq(&layer.texture, &replacement));
        assert_eq!(layer.sampling.wrap, [TextureWrap::ClampToEdge; 3]);

        assert!(material.set_texture(2, None));
        assert!(material.texture(2).is_none());
    }

    #[test]
    fn test_set_texture_out_of_range_is_noop() {
        let mut material = Material::new();
        assert!(!material.set_texture(MATERIAL_MAX_TEXTURES, Some(texture())));
    }

    #[test]
    fn test_transparent_types() {
        assert!(MaterialType::TransparentAlphaChannel.is_transparent());
        assert!(!MaterialType::Custom(3).is_transparent());
    }
}
