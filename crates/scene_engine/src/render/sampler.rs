//! Sampling parameters and the per-context sampler cache
//!
//! Samplers are looked up by a structural [`SamplerKey`], so two parameter
//! sets share a backend sampler exactly when they are equal. Float fields
//! compare by bit pattern with negative zero folded into zero.

use std::collections::HashMap;
use std::sync::Arc;

use super::backend::{BackendError, BackendHandle, GraphicsBackend};

/// Texel filter for magnification and minification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFilter {
    /// Nearest texel
    Nearest,
    /// Linear blend of neighbouring texels
    #[default]
    Linear,
}

/// Filter between mip levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MipmapFilter {
    /// Sample the base level only
    None,
    /// Nearest mip level
    #[default]
    Nearest,
    /// Blend the two nearest mip levels
    Linear,
}

/// Texture coordinate wrap mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureWrap {
    /// Tile the texture
    #[default]
    Repeat,
    /// Clamp to the edge texel
    ClampToEdge,
    /// Clamp to the border color
    ClampToBorder,
    /// Tile, mirroring every other repetition
    MirroredRepeat,
    /// Mirror once, then clamp to edge
    MirrorClampToEdge,
}

/// Border color used by [`TextureWrap::ClampToBorder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BorderColor {
    /// (0, 0, 0, 0)
    #[default]
    TransparentBlack,
    /// (0, 0, 0, 1)
    OpaqueBlack,
    /// (1, 1, 1, 1)
    OpaqueWhite,
}

/// Depth comparison function for shadow samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    /// Never passes
    Never,
    /// Passes if reference < texel
    Less,
    /// Passes if reference == texel
    Equal,
    /// Passes if reference <= texel
    LessEqual,
    /// Passes if reference > texel
    Greater,
    /// Passes if reference != texel
    NotEqual,
    /// Passes if reference >= texel
    GreaterEqual,
    /// Always passes
    Always,
}

/// Sampling state applied to a texture unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    /// Minification filter
    pub min_filter: TextureFilter,
    /// Magnification filter
    pub mag_filter: TextureFilter,
    /// Mip filter
    pub mipmap_filter: MipmapFilter,
    /// Wrap mode for U, V and W
    pub wrap: [TextureWrap; 3],
    /// Border color for clamp-to-border
    pub border_color: BorderColor,
    /// Minimum LOD clamp
    pub min_lod: f32,
    /// Maximum LOD clamp
    pub max_lod: f32,
    /// LOD bias
    pub lod_bias: f32,
    /// Maximum anisotropy; 1 disables anisotropic filtering
    pub anisotropy: u8,
    /// Depth comparison, if this is a shadow sampler
    pub compare: Option<CompareFunction>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            min_filter: TextureFilter::Linear,
            mag_filter: TextureFilter::Linear,
            mipmap_filter: MipmapFilter::Nearest,
            wrap: [TextureWrap::Repeat; 3],
            border_color: BorderColor::TransparentBlack,
            min_lod: -1000.0,
            max_lod: 1000.0,
            lod_bias: 0.0,
            anisotropy: 1,
            compare: None,
        }
    }
}

impl SamplingParams {
    /// Nearest-neighbour sampling without mipmaps
    pub fn nearest() -> Self {
        Self {
            min_filter: TextureFilter::Nearest,
            mag_filter: TextureFilter::Nearest,
            mipmap_filter: MipmapFilter::None,
            ..Self::default()
        }
    }

    /// Set all three wrap modes
    #[must_use]
    pub const fn with_wrap(mut self, wrap: TextureWrap) -> Self {
        self.wrap = [wrap; 3];
        self
    }

    /// Set the anisotropy level
    #[must_use]
    pub const fn with_anisotropy(mut self, anisotropy: u8) -> Self {
        self.anisotropy = anisotropy;
        self
    }

    /// Structural cache key
    pub fn cache_key(&self) -> SamplerKey {
        fn bits(value: f32) -> u32 {
            // -0.0 and 0.0 sample identically
            if value == 0.0 {
                0
            } else {
                value.to_bits()
            }
        }

        SamplerKey {
            min_filter: self.min_filter,
            mag_filter: self.mag_filter,
            mipmap_filter: self.mipmap_filter,
            wrap: self.wrap,
            border_color: self.border_color,
            lod_bits: [bits(self.min_lod), bits(self.max_lod), bits(self.lod_bias)],
            anisotropy: self.anisotropy.max(1),
            compare: self.compare,
        }
    }
}

/// Hashable identity of a [`SamplingParams`] value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerKey {
    min_filter: TextureFilter,
    mag_filter: TextureFilter,
    mipmap_filter: MipmapFilter,
    wrap: [TextureWrap; 3],
    border_color: BorderColor,
    lod_bits: [u32; 3],
    anisotropy: u8,
    compare: Option<CompareFunction>,
}

/// A backend sampler owned by the cache
struct CachedSampler {
    backend: Arc<dyn GraphicsBackend>,
    handle: BackendHandle,
    last_used: u64,
}

impl Drop for CachedSampler {
    fn drop(&mut self) {
        self.backend.delete_sampler(self.handle);
    }
}

/// Per-context sampler cache
///
/// Staleness is counted in lookups: every [`SamplerCache::get_or_create`]
/// call advances the cache's own tick.
pub struct SamplerCache {
    entries: HashMap<SamplerKey, CachedSampler>,
    tick: u64,
    ceiling: usize,
    staleness: u64,
}

impl SamplerCache {
    /// Create an empty cache
    pub fn new(ceiling: usize, staleness: u64) -> Self {
        Self {
            entries: HashMap::new(),
            tick: 0,
            ceiling,
            staleness,
        }
    }

    /// Find or create the sampler for `params`
    pub fn get_or_create(
        &mut self,
        backend: &Arc<dyn GraphicsBackend>,
        params: &SamplingParams,
    ) -> Result<(SamplerKey, BackendHandle), BackendError> {
        self.tick += 1;
        let key = params.cache_key();
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.last_used = self.tick;
            return Ok((key, entry.handle));
        }

        let handle = backend.create_sampler(params)?;
        log::debug!("Created sampler {handle} ({} cached)", self.entries.len() + 1);
        self.entries.insert(
            key,
            CachedSampler {
                backend: Arc::clone(backend),
                handle,
                last_used: self.tick,
            },
        );
        Ok((key, handle))
    }

    /// Evict stale samplers once the cache exceeds its ceiling
    ///
    /// Samplers whose keys appear in `in_use` are never evicted.
    pub fn sweep(&mut self, in_use: &[Option<SamplerKey>]) -> usize {
        if self.entries.len() <= self.ceiling {
            return 0;
        }
        let (tick, staleness) = (self.tick, self.staleness);
        let before = self.entries.len();
        self.entries.retain(|key, entry| {
            tick.saturating_sub(entry.last_used) <= staleness || in_use.contains(&Some(*key))
        });
        let evicted = before - self.entries.len();
        if evicted > 0 {
            log::debug!("Evicted {evicted} stale samplers");
        }
        evicted
    }

    /// Whether a sampler for `key` is cached
    pub fn contains(&self, key: &SamplerKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of cached samplers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Delete every cached sampler
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
