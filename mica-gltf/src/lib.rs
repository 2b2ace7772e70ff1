//! mica-gltf: scene-description decoding for the mica asset pipeline.
//!
//! The core consumes a parsed scene description (a [`Document`],
//! deserializable straight from glTF-shaped JSON) plus one contiguous
//! binary payload, and produces numeric arrays and text dump formats.
//! How the bytes arrive and where the dumps go is the caller's
//! concern; everything here is a pure, synchronous transformation
//! with no I/O.
//!
//! Modules, leaves first:
//! - [`accessor`] reinterprets payload bytes as typed arrays per a
//!   declarative schema.
//! - [`mesh`] builds a validated per-vertex attribute set and
//!   serializes it as an OBJ-subset dump with `# ext.*` extensions.
//! - [`nodes`] composes local TRS/matrix transforms into world
//!   transforms over a flat index arena and deduplicates them.
//! - [`animation`] samples per-node channels, compacts keyframes,
//!   builds skin- or node-driven joint hierarchies, and prunes inert
//!   joints.
//!
//! Every failure is terminal for the asset being converted; there is
//! no partial output and no retry.

pub mod accessor;
pub mod animation;
pub mod document;
pub mod error;
pub mod mesh;
pub mod nodes;

pub use accessor::{decode_accessor, DecodedAccessor};
pub use animation::{
    compact_keyframes, dump_joints, dump_node_animation, dump_skin_animation, Joint, Keyframe,
};
pub use document::{ComponentKind, Document, ElementShape};
pub use error::{MicaError, Result};
pub use mesh::{dump_obj_data, extract_mesh, Attribute, ExtractOptions, MeshAttributes};
pub use nodes::{build_nodes, dedupe_transforms, SceneNode};
