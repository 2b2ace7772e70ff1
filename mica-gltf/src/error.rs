//! Error types for scene-description decoding and extraction.
//!
//! Every error is terminal for the asset being converted: nothing is
//! retried and no partial output is returned. A batch driver decides
//! whether to keep going with other assets.

use crate::document::ElementShape;

/// Errors raised while decoding accessors or extracting mesh,
/// transform, or animation data from a scene description.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MicaError {
    /// Accessor or buffer view bounds are inconsistent with the
    /// supplied binary payload, or the accessor references a buffer
    /// other than the single supported one.
    #[error("malformed accessor {index}: {reason}")]
    MalformedAccessor { index: usize, reason: String },

    /// A typed view was requested with a different element shape than
    /// the accessor declares.
    #[error("accessor has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        expected: ElementShape,
        found: ElementShape,
    },

    /// A mandatory or explicitly requested vertex attribute is absent.
    #[error("mesh {mesh} is missing attribute {attribute}")]
    MissingAttribute {
        mesh: usize,
        attribute: &'static str,
    },

    /// An optional-but-present attribute array does not match the
    /// position count.
    #[error("mesh {mesh} attribute {attribute} has {found} elements, expected {expected}")]
    AttributeLengthMismatch {
        mesh: usize,
        attribute: &'static str,
        found: usize,
        expected: usize,
    },

    /// Meshes must contain exactly one primitive.
    #[error("mesh {mesh} has {count} primitives, expected exactly 1")]
    UnsupportedPrimitiveCount { mesh: usize, count: usize },

    /// The index list does not describe a whole number of triangles.
    #[error("mesh {mesh} has {count} indices, not a multiple of 3")]
    IndicesNotTriangles { mesh: usize, count: usize },

    /// A node supplies both an explicit matrix and TRS fields.
    #[error("node {node} supplies both a matrix and TRS fields")]
    ConflictingTransform { node: usize },

    /// A node's rotation quaternion has ~zero norm.
    #[error("node {node} has a degenerate rotation quaternion")]
    DegenerateRotation { node: usize },

    /// A node is listed as the child of more than one parent.
    #[error("node {node} is claimed by two parents")]
    DuplicateParent { node: usize },

    /// A node, mesh, accessor, or sampler index points outside its
    /// document table.
    #[error("{kind} index {index} is out of range")]
    IndexOutOfRange { kind: &'static str, index: usize },

    /// The skin's joint list is not in parent-before-child order, or
    /// a joint's parent node is not part of the skin.
    #[error("skin joint {joint} is not preceded by its parent")]
    UnorderedSkin { joint: usize },

    /// The document node list is not topologically ordered: a node
    /// other than node 0 has no parent, or precedes its parent.
    #[error("node {node} is not preceded by its parent")]
    UnorderedNodes { node: usize },

    /// A skin used for animation extraction carries no inverse-bind
    /// matrix accessor.
    #[error("skin {skin} has no inverse-bind matrices")]
    MissingInverseBind { skin: usize },

    /// A document mesh is attached to no node, so joint compaction
    /// cannot assign it an owner.
    #[error("mesh {mesh} is not attached to any node")]
    MeshWithoutJoint { mesh: usize },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MicaError>;
