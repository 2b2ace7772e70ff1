//! Typed accessor decoding.
//!
//! An accessor describes how to reinterpret a window of the binary
//! payload as `count` elements of a fixed shape, each element a run
//! of little-endian fixed-width components. Decoding validates the
//! declared bounds against the payload before reading a single byte,
//! so a malformed accessor never produces partial output.

use crate::document::{ComponentKind, Document, ElementShape};
use crate::error::{MicaError, Result};

/// Decoded accessor contents.
///
/// Components are held as `f64`, which represents every supported
/// component kind exactly (the widest is u32). Typed views convert
/// back to the width the caller needs and check the element shape.
#[derive(Debug, Clone)]
pub struct DecodedAccessor {
    shape: ElementShape,
    kind: ComponentKind,
    count: usize,
    /// Flattened component values, `count * shape.components()` long.
    components: Vec<f64>,
}

/// Decode one accessor out of the binary payload.
///
/// Only buffer index 0 is supported; multi-buffer documents are a
/// design non-goal of this pipeline.
///
/// # Errors
/// `MalformedAccessor` when the accessor or view indices are out of
/// range, the view references an unsupported buffer, or the declared
/// span does not fit the view or the payload.
pub fn decode_accessor(
    document: &Document,
    buffer: &[u8],
    accessor_index: usize,
) -> Result<DecodedAccessor> {
    let malformed = |reason: String| MicaError::MalformedAccessor {
        index: accessor_index,
        reason,
    };

    let accessor = document
        .accessors
        .get(accessor_index)
        .ok_or_else(|| malformed("no such accessor".into()))?;
    let view = document
        .buffer_views
        .get(accessor.buffer_view)
        .ok_or_else(|| malformed(format!("no such buffer view {}", accessor.buffer_view)))?;

    if view.buffer != 0 {
        return Err(malformed(format!(
            "references buffer {}, only buffer 0 is supported",
            view.buffer
        )));
    }
    if accessor.count == 0 {
        return Err(malformed("element count is zero".into()));
    }

    let shape = accessor.element_shape;
    let kind = accessor.component_kind;
    let component_width = kind.width();
    let element_size = shape.components() * component_width;
    let element_stride = element_size.max(view.byte_stride);

    // The whole declared span must fit the view, and the view must
    // fit the payload. Checked arithmetic: a hostile count must fail
    // the bounds check, not wrap it.
    let required = element_stride
        .checked_mul(accessor.count - 1)
        .and_then(|strided| strided.checked_add(element_size))
        .ok_or_else(|| malformed(format!("element count {} overflows", accessor.count)))?;
    if accessor
        .byte_offset
        .checked_add(required)
        .is_none_or(|end| end > view.byte_length)
    {
        return Err(malformed(format!(
            "requires {} bytes past accessor offset {}, view length is {}",
            required, accessor.byte_offset, view.byte_length
        )));
    }
    if view.byte_offset + view.byte_length > buffer.len() {
        return Err(malformed(format!(
            "buffer view ends at {}, payload is {} bytes",
            view.byte_offset + view.byte_length,
            buffer.len()
        )));
    }

    let buffer_offset = view.byte_offset + accessor.byte_offset;
    let mut components = Vec::with_capacity(accessor.count * shape.components());
    for i in 0..accessor.count {
        let element_begin = buffer_offset + i * element_stride;
        for c in 0..shape.components() {
            let begin = element_begin + c * component_width;
            components.push(read_component(kind, &buffer[begin..begin + component_width]));
        }
    }

    Ok(DecodedAccessor {
        shape,
        kind,
        count: accessor.count,
        components,
    })
}

/// Read one little-endian component. `bytes` is exactly the
/// component's width.
fn read_component(kind: ComponentKind, bytes: &[u8]) -> f64 {
    match kind {
        ComponentKind::I8 => i8::from_le_bytes([bytes[0]]) as f64,
        ComponentKind::U8 => bytes[0] as f64,
        ComponentKind::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f64,
        ComponentKind::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f64,
        ComponentKind::U32 => {
            u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
        }
        ComponentKind::F32 => {
            f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
        }
    }
}

impl DecodedAccessor {
    pub fn shape(&self) -> ElementShape {
        self.shape
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn expect_shape(&self, expected: ElementShape) -> Result<()> {
        if self.shape == expected {
            Ok(())
        } else {
            Err(MicaError::ShapeMismatch {
                expected,
                found: self.shape,
            })
        }
    }

    fn fixed<const N: usize>(&self, expected: ElementShape) -> Result<Vec<[f32; N]>> {
        self.expect_shape(expected)?;
        Ok(self
            .components
            .chunks_exact(N)
            .map(|chunk| std::array::from_fn(|i| chunk[i] as f32))
            .collect())
    }

    /// Scalar elements as u32, the widest integer index type.
    pub fn scalars_u32(&self) -> Result<Vec<u32>> {
        self.expect_shape(ElementShape::Scalar)?;
        Ok(self.components.iter().map(|&v| v as u32).collect())
    }

    /// Scalar elements as f32 (animation time inputs).
    pub fn scalars_f32(&self) -> Result<Vec<f32>> {
        self.expect_shape(ElementShape::Scalar)?;
        Ok(self.components.iter().map(|&v| v as f32).collect())
    }

    pub fn vec2_f32(&self) -> Result<Vec<[f32; 2]>> {
        self.fixed(ElementShape::Vec2)
    }

    pub fn vec3_f32(&self) -> Result<Vec<[f32; 3]>> {
        self.fixed(ElementShape::Vec3)
    }

    pub fn vec4_f32(&self) -> Result<Vec<[f32; 4]>> {
        self.fixed(ElementShape::Vec4)
    }

    /// Vec4 elements as u16, used for per-vertex joint indices.
    pub fn vec4_u16(&self) -> Result<Vec<[u16; 4]>> {
        self.expect_shape(ElementShape::Vec4)?;
        Ok(self
            .components
            .chunks_exact(4)
            .map(|chunk| std::array::from_fn(|i| chunk[i] as u16))
            .collect())
    }

    /// Mat4 elements as 16 column-major floats.
    pub fn mat4_f32(&self) -> Result<Vec<[f32; 16]>> {
        self.fixed(ElementShape::Mat4)
    }
}
