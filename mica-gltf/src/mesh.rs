//! Mesh attribute extraction and text serialization.
//!
//! Produces a validated per-vertex attribute set from a single-
//! primitive mesh, then serializes it as an OBJ-subset text dump.
//! Tangent/joint/weight data rides along as `# ext.*` comment lines,
//! so a standard OBJ parser sees plain geometry while a capable
//! consumer recovers the full vertex layout.

use crate::accessor::decode_accessor;
use crate::document::Document;
use crate::error::{MicaError, Result};

/// Which optional vertex data the caller needs.
///
/// Requested data that is absent in the document is an error; this
/// pipeline never synthesizes tangents or skinning.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    pub with_tangents: bool,
    pub with_skin: bool,
}

/// A per-vertex attribute that is either present in the document or
/// replaced by a constant filler, so topology stays well-formed
/// without nullable collections.
#[derive(Debug, Clone)]
pub enum Attribute<T> {
    Provided(Vec<T>),
    Defaulted(T),
}

impl<T: Copy> Attribute<T> {
    /// Value for vertex `index`.
    pub fn get(&self, index: usize) -> T {
        match self {
            Attribute::Provided(values) => values[index],
            Attribute::Defaulted(value) => *value,
        }
    }
}

/// Immutable per-vertex attribute set for one mesh.
///
/// Every present array has the same length as `positions`;
/// `indices.len()` is a multiple of 3.
#[derive(Debug, Clone)]
pub struct MeshAttributes {
    pub positions: Vec<[f32; 3]>,
    pub texcoords: Attribute<[f32; 2]>,
    pub normals: Attribute<[f32; 3]>,
    pub tangents: Option<Vec<[f32; 4]>>,
    pub joints: Option<Vec<[u16; 4]>>,
    pub weights: Option<Vec<[f32; 4]>>,
    pub indices: Vec<u32>,
}

/// Default texcoord for meshes without `TEXCOORD_0`.
const DEFAULT_TEXCOORD: [f32; 2] = [0.0, 0.0];
/// Default normal (+Z) for meshes without `NORMAL`.
const DEFAULT_NORMAL: [f32; 3] = [0.0, 0.0, 1.0];

/// Extract the attribute set of mesh `mesh_index`.
///
/// # Errors
/// `UnsupportedPrimitiveCount` unless the mesh has exactly one
/// primitive; `MissingAttribute` for absent positions, indices, or
/// requested tangent/skin data; `AttributeLengthMismatch` when a
/// present array disagrees with the position count.
pub fn extract_mesh(
    document: &Document,
    buffer: &[u8],
    mesh_index: usize,
    options: ExtractOptions,
) -> Result<MeshAttributes> {
    let mesh = document
        .meshes
        .get(mesh_index)
        .ok_or(MicaError::IndexOutOfRange {
            kind: "mesh",
            index: mesh_index,
        })?;
    if mesh.primitives.len() != 1 {
        return Err(MicaError::UnsupportedPrimitiveCount {
            mesh: mesh_index,
            count: mesh.primitives.len(),
        });
    }
    let primitive = &mesh.primitives[0];

    let attribute = |name: &'static str| primitive.attributes.get(name).copied();
    let required = |name: &'static str| -> Result<usize> {
        attribute(name).ok_or(MicaError::MissingAttribute {
            mesh: mesh_index,
            attribute: name,
        })
    };

    let positions = decode_accessor(document, buffer, required("POSITION")?)?.vec3_f32()?;
    let vertex_count = positions.len();

    let check_len = |name: &'static str, len: usize| -> Result<()> {
        if len == vertex_count {
            Ok(())
        } else {
            Err(MicaError::AttributeLengthMismatch {
                mesh: mesh_index,
                attribute: name,
                found: len,
                expected: vertex_count,
            })
        }
    };

    let indices_accessor = primitive.indices.ok_or(MicaError::MissingAttribute {
        mesh: mesh_index,
        attribute: "indices",
    })?;
    let indices = decode_accessor(document, buffer, indices_accessor)?.scalars_u32()?;
    if !indices.len().is_multiple_of(3) {
        return Err(MicaError::IndicesNotTriangles {
            mesh: mesh_index,
            count: indices.len(),
        });
    }

    let texcoords = match attribute("TEXCOORD_0") {
        Some(accessor) => {
            let values = decode_accessor(document, buffer, accessor)?.vec2_f32()?;
            check_len("TEXCOORD_0", values.len())?;
            Attribute::Provided(values)
        }
        None => Attribute::Defaulted(DEFAULT_TEXCOORD),
    };

    let normals = match attribute("NORMAL") {
        Some(accessor) => {
            let values = decode_accessor(document, buffer, accessor)?.vec3_f32()?;
            check_len("NORMAL", values.len())?;
            Attribute::Provided(values)
        }
        None => Attribute::Defaulted(DEFAULT_NORMAL),
    };

    let tangents = if options.with_tangents {
        let values = decode_accessor(document, buffer, required("TANGENT")?)?.vec4_f32()?;
        check_len("TANGENT", values.len())?;
        Some(values)
    } else {
        None
    };

    let (joints, weights) = if options.with_skin {
        let joints = decode_accessor(document, buffer, required("JOINTS_0")?)?.vec4_u16()?;
        check_len("JOINTS_0", joints.len())?;
        let weights = decode_accessor(document, buffer, required("WEIGHTS_0")?)?.vec4_f32()?;
        check_len("WEIGHTS_0", weights.len())?;
        (Some(joints), Some(weights))
    } else {
        (None, None)
    };

    tracing::debug!(
        mesh = mesh_index,
        vertices = vertex_count,
        triangles = indices.len() / 3,
        "extracted mesh attributes"
    );

    Ok(MeshAttributes {
        positions,
        texcoords,
        normals,
        tangents,
        joints,
        weights,
        indices,
    })
}

/// Extract mesh `mesh_index` and serialize it as OBJ-subset text.
///
/// One `v`/`vt`/`vn` line per vertex (6 decimals), one `f` line per
/// triangle with 1-based indices shared across position/texcoord/
/// normal (the lists are parallel by construction), then requested
/// `# ext.tangent`/`# ext.joint`/`# ext.weight` lines per vertex.
pub fn dump_obj_data(
    document: &Document,
    buffer: &[u8],
    mesh_index: usize,
    options: ExtractOptions,
) -> Result<String> {
    let mesh = extract_mesh(document, buffer, mesh_index, options)?;
    let vertex_count = mesh.positions.len();

    let mut lines: Vec<String> = Vec::new();

    for &[x, y, z] in &mesh.positions {
        lines.push(format!("v {x:.6} {y:.6} {z:.6}"));
    }
    for i in 0..vertex_count {
        let [u, v] = mesh.texcoords.get(i);
        lines.push(format!("vt {u:.6} {v:.6}"));
    }
    for i in 0..vertex_count {
        let [x, y, z] = mesh.normals.get(i);
        lines.push(format!("vn {x:.6} {y:.6} {z:.6}"));
    }
    for triangle in mesh.indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0] + 1, triangle[1] + 1, triangle[2] + 1];
        lines.push(format!("f {a}/{a}/{a} {b}/{b}/{b} {c}/{c}/{c}"));
    }

    if let Some(tangents) = &mesh.tangents {
        for &[x, y, z, w] in tangents {
            lines.push(format!("# ext.tangent {x:.6} {y:.6} {z:.6} {w:.6}"));
        }
    }
    if let Some(joints) = &mesh.joints {
        for &[a, b, c, d] in joints {
            lines.push(format!("# ext.joint {a} {b} {c} {d}"));
        }
    }
    if let Some(weights) = &mesh.weights {
        for &[a, b, c, d] in weights {
            lines.push(format!("# ext.weight {a:.6} {b:.6} {c:.6} {d:.6}"));
        }
    }

    Ok(lines.join("\n") + "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Accessor, BufferView, ComponentKind, ElementShape, Mesh, Primitive};

    /// One right triangle with texcoords and normals, tightly packed:
    /// positions (vec3 f32), texcoords (vec2 f32), normals (vec3 f32),
    /// indices (u16).
    fn triangle_document() -> (Document, Vec<u8>) {
        let positions: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let texcoords: [[f32; 2]; 3] = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let normals: [[f32; 3]; 3] = [[0.0, 0.0, 1.0]; 3];
        let indices: [u16; 3] = [0, 1, 2];

        let mut buffer: Vec<u8> = Vec::new();
        let mut views = Vec::new();
        let mut accessors = Vec::new();
        let mut push_view = |buffer: &mut Vec<u8>, bytes: Vec<u8>| -> usize {
            let view = BufferView {
                buffer: 0,
                byte_offset: buffer.len(),
                byte_length: bytes.len(),
                byte_stride: 0,
            };
            buffer.extend(bytes);
            views.push(view);
            views.len() - 1
        };

        let pos_view = push_view(
            &mut buffer,
            positions.iter().flatten().flat_map(|f| f.to_le_bytes()).collect(),
        );
        accessors.push(Accessor {
            buffer_view: pos_view,
            byte_offset: 0,
            element_shape: ElementShape::Vec3,
            component_kind: ComponentKind::F32,
            count: 3,
        });
        let uv_view = push_view(
            &mut buffer,
            texcoords.iter().flatten().flat_map(|f| f.to_le_bytes()).collect(),
        );
        accessors.push(Accessor {
            buffer_view: uv_view,
            byte_offset: 0,
            element_shape: ElementShape::Vec2,
            component_kind: ComponentKind::F32,
            count: 3,
        });
        let normal_view = push_view(
            &mut buffer,
            normals.iter().flatten().flat_map(|f| f.to_le_bytes()).collect(),
        );
        accessors.push(Accessor {
            buffer_view: normal_view,
            byte_offset: 0,
            element_shape: ElementShape::Vec3,
            component_kind: ComponentKind::F32,
            count: 3,
        });
        let index_view = push_view(
            &mut buffer,
            indices.iter().flat_map(|i| i.to_le_bytes()).collect(),
        );
        accessors.push(Accessor {
            buffer_view: index_view,
            byte_offset: 0,
            element_shape: ElementShape::Scalar,
            component_kind: ComponentKind::U16,
            count: 3,
        });

        let mut attributes = hashbrown::HashMap::new();
        attributes.insert("POSITION".to_string(), 0);
        attributes.insert("TEXCOORD_0".to_string(), 1);
        attributes.insert("NORMAL".to_string(), 2);
        let document = Document {
            accessors,
            buffer_views: views,
            meshes: vec![Mesh {
                primitives: vec![Primitive {
                    attributes,
                    indices: Some(3),
                }],
            }],
            ..Default::default()
        };
        (document, buffer)
    }

    #[test]
    fn dumps_triangle_as_obj_subset() {
        let (document, buffer) = triangle_document();
        let dump = dump_obj_data(&document, &buffer, 0, ExtractOptions::default()).unwrap();
        let expected = "\
v 0.000000 0.000000 0.000000
v 1.000000 0.000000 0.000000
v 0.000000 1.000000 0.000000
vt 0.000000 0.000000
vt 1.000000 0.000000
vt 0.000000 1.000000
vn 0.000000 0.000000 1.000000
vn 0.000000 0.000000 1.000000
vn 0.000000 0.000000 1.000000
f 1/1/1 2/2/2 3/3/3
";
        assert_eq!(dump, expected);
    }

    #[test]
    fn defaults_absent_texcoords_and_normals() {
        let (mut document, buffer) = triangle_document();
        let primitive = &mut document.meshes[0].primitives[0];
        primitive.attributes.remove("TEXCOORD_0");
        primitive.attributes.remove("NORMAL");

        let mesh = extract_mesh(&document, &buffer, 0, ExtractOptions::default()).unwrap();
        assert!(matches!(mesh.texcoords, Attribute::Defaulted([0.0, 0.0])));
        assert!(matches!(mesh.normals, Attribute::Defaulted([0.0, 0.0, 1.0])));

        let dump = dump_obj_data(&document, &buffer, 0, ExtractOptions::default()).unwrap();
        assert!(dump.contains("vt 0.000000 0.000000\nvt 0.000000 0.000000\n"));
        assert!(dump.contains("vn 0.000000 0.000000 1.000000"));
    }

    #[test]
    fn requested_tangents_must_exist() {
        let (document, buffer) = triangle_document();
        let result = extract_mesh(
            &document,
            &buffer,
            0,
            ExtractOptions {
                with_tangents: true,
                with_skin: false,
            },
        );
        assert!(matches!(
            result,
            Err(MicaError::MissingAttribute {
                attribute: "TANGENT",
                ..
            })
        ));
    }

    #[test]
    fn rejects_multi_primitive_meshes() {
        let (mut document, buffer) = triangle_document();
        let extra = document.meshes[0].primitives[0].clone();
        document.meshes[0].primitives.push(extra);
        assert!(matches!(
            extract_mesh(&document, &buffer, 0, ExtractOptions::default()),
            Err(MicaError::UnsupportedPrimitiveCount { mesh: 0, count: 2 })
        ));
    }

    #[test]
    fn rejects_non_triangle_index_count() {
        let (mut document, buffer) = triangle_document();
        document.accessors[3].count = 2; // 2 indices cannot triangulate
        assert!(matches!(
            extract_mesh(&document, &buffer, 0, ExtractOptions::default()),
            Err(MicaError::IndicesNotTriangles { mesh: 0, count: 2 })
        ));
    }

    #[test]
    fn rejects_attribute_length_mismatch() {
        let (mut document, buffer) = triangle_document();
        document.accessors[1].count = 2; // fewer texcoords than positions
        assert!(matches!(
            extract_mesh(&document, &buffer, 0, ExtractOptions::default()),
            Err(MicaError::AttributeLengthMismatch {
                attribute: "TEXCOORD_0",
                found: 2,
                expected: 3,
                ..
            })
        ));
    }
}
