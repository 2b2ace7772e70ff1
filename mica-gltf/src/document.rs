//! Scene-description records.
//!
//! These structs mirror the glTF JSON document structure closely
//! enough to be deserialized straight from it with serde. The core
//! never touches the filesystem: callers hand over a `Document` plus
//! one contiguous binary payload, however those were obtained.

use serde::Deserialize;

/// Element shape of an accessor: how many components make up one
/// logical element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ElementShape {
    #[serde(rename = "SCALAR")]
    Scalar,
    #[serde(rename = "VEC2")]
    Vec2,
    #[serde(rename = "VEC3")]
    Vec3,
    #[serde(rename = "VEC4")]
    Vec4,
    #[serde(rename = "MAT2")]
    Mat2,
    #[serde(rename = "MAT3")]
    Mat3,
    #[serde(rename = "MAT4")]
    Mat4,
}

impl ElementShape {
    /// Number of numeric components in one element.
    pub fn components(self) -> usize {
        match self {
            ElementShape::Scalar => 1,
            ElementShape::Vec2 => 2,
            ElementShape::Vec3 => 3,
            ElementShape::Vec4 => 4,
            ElementShape::Mat2 => 4,
            ElementShape::Mat3 => 9,
            ElementShape::Mat4 => 16,
        }
    }
}

/// Component storage kind, deserialized from the glTF numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u32")]
pub enum ComponentKind {
    I8,
    U8,
    I16,
    U16,
    U32,
    F32,
}

impl ComponentKind {
    /// Width of one component in bytes.
    pub fn width(self) -> usize {
        match self {
            ComponentKind::I8 | ComponentKind::U8 => 1,
            ComponentKind::I16 | ComponentKind::U16 => 2,
            ComponentKind::U32 | ComponentKind::F32 => 4,
        }
    }
}

impl TryFrom<u32> for ComponentKind {
    type Error = String;

    fn try_from(code: u32) -> std::result::Result<Self, Self::Error> {
        match code {
            5120 => Ok(ComponentKind::I8),
            5121 => Ok(ComponentKind::U8),
            5122 => Ok(ComponentKind::I16),
            5123 => Ok(ComponentKind::U16),
            5125 => Ok(ComponentKind::U32),
            5126 => Ok(ComponentKind::F32),
            other => Err(format!("unknown component type code {other}")),
        }
    }
}

/// Declarative description of how to reinterpret a byte range as a
/// typed numeric array.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accessor {
    pub buffer_view: usize,
    #[serde(default)]
    pub byte_offset: usize,
    #[serde(rename = "type")]
    pub element_shape: ElementShape,
    #[serde(rename = "componentType")]
    pub component_kind: ComponentKind,
    pub count: usize,
}

/// A contiguous window into the binary payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferView {
    pub buffer: usize,
    #[serde(default)]
    pub byte_offset: usize,
    pub byte_length: usize,
    #[serde(default)]
    pub byte_stride: usize,
}

/// One renderable primitive: attribute name -> accessor index, plus
/// the triangle index accessor.
#[derive(Debug, Clone, Deserialize)]
pub struct Primitive {
    pub attributes: hashbrown::HashMap<String, usize>,
    pub indices: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Mesh {
    pub primitives: Vec<Primitive>,
}

/// A scene-graph node. `matrix` and the TRS fields are mutually
/// exclusive; both present is a malformed document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Node {
    pub mesh: Option<usize>,
    #[serde(default)]
    pub children: Vec<usize>,
    pub matrix: Option<[f32; 16]>,
    pub translation: Option<[f32; 3]>,
    pub rotation: Option<[f32; 4]>,
    pub scale: Option<[f32; 3]>,
}

/// A skin: joint node indices plus inverse-bind matrices.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skin {
    pub joints: Vec<usize>,
    pub skeleton: Option<usize>,
    pub inverse_bind_matrices: Option<usize>,
}

/// Animation target path. Morph-target weights are carried so the
/// document parses, but extraction ignores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetPath {
    Translation,
    Rotation,
    Scale,
    Weights,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelTarget {
    pub node: Option<usize>,
    pub path: TargetPath,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub sampler: usize,
    pub target: ChannelTarget,
}

/// Input (time) and output (value) accessor pair for one channel.
#[derive(Debug, Clone, Deserialize)]
pub struct AnimationSampler {
    pub input: usize,
    pub output: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Animation {
    pub channels: Vec<Channel>,
    pub samplers: Vec<AnimationSampler>,
}

/// The parsed scene description consumed by every extractor in this
/// crate. Field names match the glTF JSON layout so a document can be
/// deserialized directly.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub accessors: Vec<Accessor>,
    #[serde(default)]
    pub buffer_views: Vec<BufferView>,
    #[serde(default)]
    pub meshes: Vec<Mesh>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub skins: Vec<Skin>,
    #[serde(default)]
    pub animations: Vec<Animation>,
}
