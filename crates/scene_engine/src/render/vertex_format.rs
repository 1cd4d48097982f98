//! Vertex attribute formats and the vertex array cache key
//!
//! A [`VertexArraySpec`] describes the buffers feeding up to
//! [`MAX_VERTEX_ATTRIBS`] attributes. Its [`VertexFormatKey`] captures only
//! the state a vertex array object bakes in: which attributes are enabled,
//! their component type, component count and step rate. Buffers, offsets and
//! strides are rebound on use and never part of the key.

use std::sync::Arc;

use super::resources::GpuBuffer;

/// Number of vertex attribute slots tracked per vertex array
pub const MAX_VERTEX_ATTRIBS: usize = 16;

/// Component type of a vertex attribute and how the shader reads it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ComponentType {
    /// 32-bit float
    Float,
    /// 16-bit float
    HalfFloat,
    /// 64-bit float converted to single precision
    DoubleInFloatOut,
    /// Packed unsigned 10/11/11-bit floats
    UnsignedInt10F11F11FRev,
    /// Packed signed 2/10/10/10, normalized
    NormalizedInt2_10_10_10Rev,
    /// Packed unsigned 2/10/10/10, normalized
    NormalizedUnsignedInt2_10_10_10Rev,
    /// Signed byte, normalized to [-1, 1]
    NormalizedByte,
    /// Unsigned byte, normalized to [0, 1]
    NormalizedUnsignedByte,
    /// Signed short, normalized
    NormalizedShort,
    /// Unsigned short, normalized
    NormalizedUnsignedShort,
    /// Signed int, normalized
    NormalizedInt,
    /// Unsigned int, normalized
    NormalizedUnsignedInt,
    /// Packed signed 2/10/10/10, converted to float
    Int2_10_10_10Rev,
    /// Packed unsigned 2/10/10/10, converted to float
    UnsignedInt2_10_10_10Rev,
    /// Signed byte, converted to float
    Byte,
    /// Unsigned byte, converted to float
    UnsignedByte,
    /// Signed short, converted to float
    Short,
    /// Unsigned short, converted to float
    UnsignedShort,
    /// Signed int, converted to float
    Int,
    /// Unsigned int, converted to float
    UnsignedInt,
    /// Packed signed 2/10/10/10, read as integers
    IntegerInt2_10_10_10Rev,
    /// Packed unsigned 2/10/10/10, read as integers
    IntegerUnsignedInt2_10_10_10Rev,
    /// Signed byte, read as integer
    IntegerByte,
    /// Unsigned byte, read as integer
    IntegerUnsignedByte,
    /// Signed short, read as integer
    IntegerShort,
    /// Unsigned short, read as integer
    IntegerUnsignedShort,
    /// Signed int, read as integer
    IntegerInt,
    /// Unsigned int, read as integer
    IntegerUnsignedInt,
    /// 64-bit float read as double
    DoubleInDoubleOut,
}

/// How the shader consumes an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatClass {
    /// Float input, optionally normalized from an integer source
    Float {
        /// Integer sources are mapped into the unit range
        normalized: bool,
    },
    /// Integer input
    Integer,
    /// Double precision input
    Double,
}

impl ComponentType {
    /// Every component type, indexed by discriminant
    pub const ALL: [Self; 29] = [
        Self::Float,
        Self::HalfFloat,
        Self::DoubleInFloatOut,
        Self::UnsignedInt10F11F11FRev,
        Self::NormalizedInt2_10_10_10Rev,
        Self::NormalizedUnsignedInt2_10_10_10Rev,
        Self::NormalizedByte,
        Self::NormalizedUnsignedByte,
        Self::NormalizedShort,
        Self::NormalizedUnsignedShort,
        Self::NormalizedInt,
        Self::NormalizedUnsignedInt,
        Self::Int2_10_10_10Rev,
        Self::UnsignedInt2_10_10_10Rev,
        Self::Byte,
        Self::UnsignedByte,
        Self::Short,
        Self::UnsignedShort,
        Self::Int,
        Self::UnsignedInt,
        Self::IntegerInt2_10_10_10Rev,
        Self::IntegerUnsignedInt2_10_10_10Rev,
        Self::IntegerByte,
        Self::IntegerUnsignedByte,
        Self::IntegerShort,
        Self::IntegerUnsignedShort,
        Self::IntegerInt,
        Self::IntegerUnsignedInt,
        Self::DoubleInDoubleOut,
    ];

    fn from_bits(bits: u8) -> Option<Self> {
        Self::ALL.get(usize::from(bits)).copied()
    }

    /// How the shader reads this type
    pub const fn format_class(self) -> FormatClass {
        match self {
            Self::NormalizedInt2_10_10_10Rev
            | Self::NormalizedUnsignedInt2_10_10_10Rev
            | Self::NormalizedByte
            | Self::NormalizedUnsignedByte
            | Self::NormalizedShort
            | Self::NormalizedUnsignedShort
            | Self::NormalizedInt
            | Self::NormalizedUnsignedInt => FormatClass::Float { normalized: true },
            Self::IntegerInt2_10_10_10Rev
            | Self::IntegerUnsignedInt2_10_10_10Rev
            | Self::IntegerByte
            | Self::IntegerUnsignedByte
            | Self::IntegerShort
            | Self::IntegerUnsignedShort
            | Self::IntegerInt
            | Self::IntegerUnsignedInt => FormatClass::Integer,
            Self::DoubleInDoubleOut => FormatClass::Double,
            _ => FormatClass::Float { normalized: false },
        }
    }
}

/// Components per attribute; `Bgra` is four components in BGRA order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ComponentCount {
    /// One component
    One,
    /// Two components
    Two,
    /// Three components
    Three,
    /// Four components
    Four,
    /// Four components, swizzled from BGRA
    Bgra,
}

impl ComponentCount {
    const ALL: [Self; 5] = [Self::One, Self::Two, Self::Three, Self::Four, Self::Bgra];

    fn from_bits(bits: u8) -> Option<Self> {
        Self::ALL.get(usize::from(bits)).copied()
    }

    /// Number of components read by the shader
    pub const fn count(self) -> u32 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
            Self::Four | Self::Bgra => 4,
        }
    }
}

/// Whether an attribute advances per vertex or per instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InputRate {
    /// Divisor 0
    #[default]
    PerVertex,
    /// Divisor 1
    PerInstance,
}

impl InputRate {
    /// Attribute divisor passed to the backend
    pub const fn divisor(self) -> u32 {
        match self {
            Self::PerVertex => 0,
            Self::PerInstance => 1,
        }
    }
}

/// Bit-packed vertex array state, compared by value
///
/// Each attribute takes 8 bits of `formats`: the component type in the high
/// five bits and the component count in the low three. Two keys are equal
/// exactly when their baked vertex array state is equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct VertexFormatKey {
    enabled: u16,
    per_instance: u16,
    formats: u128,
}

impl VertexFormatKey {
    const SLOT_BITS: usize = 8;

    /// Enable `attribute` with the given format; out-of-range slots are ignored
    #[must_use]
    pub fn with_attribute(
        mut self,
        attribute: usize,
        component_type: ComponentType,
        components: ComponentCount,
        input_rate: InputRate,
    ) -> Self {
        if attribute >= MAX_VERTEX_ATTRIBS {
            return self;
        }
        let bit = 1u16 << attribute;
        let shift = attribute * Self::SLOT_BITS;
        self.enabled |= bit;
        match input_rate {
            InputRate::PerInstance => self.per_instance |= bit,
            InputRate::PerVertex => self.per_instance &= !bit,
        }
        let slot = (u128::from(component_type as u8) << 3) | u128::from(components as u8);
        self.formats = (self.formats & !(0xff_u128 << shift)) | (slot << shift);
        self
    }

    /// Whether `attribute` is enabled
    pub const fn is_enabled(&self, attribute: usize) -> bool {
        attribute < MAX_VERTEX_ATTRIBS && self.enabled & (1 << attribute) != 0
    }

    /// Indices of enabled attributes, ascending
    pub fn enabled_attributes(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_VERTEX_ATTRIBS).filter(|&attribute| self.is_enabled(attribute))
    }

    fn slot(&self, attribute: usize) -> Option<u8> {
        if !self.is_enabled(attribute) {
            return None;
        }
        u8::try_from((self.formats >> (attribute * Self::SLOT_BITS)) & 0xff).ok()
    }

    /// Component type of an enabled attribute
    pub fn component_type(&self, attribute: usize) -> Option<ComponentType> {
        self.slot(attribute).and_then(|slot| ComponentType::from_bits(slot >> 3))
    }

    /// Component count of an enabled attribute
    pub fn components(&self, attribute: usize) -> Option<ComponentCount> {
        self.slot(attribute).and_then(|slot| ComponentCount::from_bits(slot & 0b111))
    }

    /// Step rate of an enabled attribute
    pub const fn input_rate(&self, attribute: usize) -> Option<InputRate> {
        if !self.is_enabled(attribute) {
            None
        } else if self.per_instance & (1 << attribute) != 0 {
            Some(InputRate::PerInstance)
        } else {
            Some(InputRate::PerVertex)
        }
    }
}

/// A vertex buffer feeding one attribute
#[derive(Debug, Clone)]
pub struct AttributeBinding {
    /// Source buffer
    pub buffer: Arc<GpuBuffer>,
    /// Component type
    pub component_type: ComponentType,
    /// Components per vertex
    pub components: ComponentCount,
    /// Per-vertex or per-instance stepping
    pub input_rate: InputRate,
    /// Byte offset of the first element
    pub offset: usize,
    /// Byte distance between consecutive elements
    pub stride: usize,
}

impl AttributeBinding {
    /// Bind `buffer` as a tightly packed per-vertex attribute
    pub fn new(buffer: Arc<GpuBuffer>, component_type: ComponentType, components: ComponentCount) -> Self {
        Self {
            buffer,
            component_type,
            components,
            input_rate: InputRate::PerVertex,
            offset: 0,
            stride: 0,
        }
    }

    /// Set the byte offset and stride
    #[must_use]
    pub const fn with_layout(mut self, offset: usize, stride: usize) -> Self {
        self.offset = offset;
        self.stride = stride;
        self
    }

    /// Set the step rate
    #[must_use]
    pub const fn with_input_rate(mut self, input_rate: InputRate) -> Self {
        self.input_rate = input_rate;
        self
    }
}

/// Buffers and formats for one draw
#[derive(Debug, Clone, Default)]
pub struct VertexArraySpec {
    attributes: [Option<AttributeBinding>; MAX_VERTEX_ATTRIBS],
    index_buffer: Option<Arc<GpuBuffer>>,
}

impl VertexArraySpec {
    /// Vertex array with no attributes
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute; returns `false` if the slot is out of range
    pub fn set_attribute(&mut self, attribute: usize, binding: AttributeBinding) -> bool {
        match self.attributes.get_mut(attribute) {
            Some(slot) => {
                *slot = Some(binding);
                true
            }
            None => false,
        }
    }

    /// Builder form of [`Self::set_attribute`]; out-of-range slots are ignored
    #[must_use]
    pub fn with_attribute(mut self, attribute: usize, binding: AttributeBinding) -> Self {
        self.set_attribute(attribute, binding);
        self
    }

    /// Disable an attribute
    pub fn clear_attribute(&mut self, attribute: usize) {
        if let Some(slot) = self.attributes.get_mut(attribute) {
            *slot = None;
        }
    }

    /// Set or clear the index buffer
    pub fn set_index_buffer(&mut self, buffer: Option<Arc<GpuBuffer>>) {
        self.index_buffer = buffer;
    }

    /// Builder form of [`Self::set_index_buffer`]
    #[must_use]
    pub fn with_index_buffer(mut self, buffer: Arc<GpuBuffer>) -> Self {
        self.index_buffer = Some(buffer);
        self
    }

    /// Binding of an attribute slot
    pub fn attribute(&self, attribute: usize) -> Option<&AttributeBinding> {
        self.attributes.get(attribute).and_then(Option::as_ref)
    }

    /// Index buffer, if the draw is indexed
    pub const fn index_buffer(&self) -> Option<&Arc<GpuBuffer>> {
        self.index_buffer.as_ref()
    }

    /// Cache key of the vertex array state this layout needs
    pub fn key(&self) -> VertexFormatKey {
        self.attributes
            .iter()
            .enumerate()
            .filter_map(|(index, binding)| binding.as_ref().map(|binding| (index, binding)))
            .fold(VertexFormatKey::default(), |key, (index, binding)| {
                key.with_attribute(index, binding.component_type, binding.components, binding.input_rate)
            })
    }
}
