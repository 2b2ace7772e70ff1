//! Scene-graph construction and transform composition.
//!
//! Nodes are kept in a flat arena indexed by position in the document
//! node list; parent/child links are plain indices, so the tree is
//! acyclic by construction and has no ownership cycles.

use glam::{Mat4, Quat, Vec3};

use crate::document::{Document, Node};
use crate::error::{MicaError, Result};

/// A resolved scene node with composed transforms.
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub mesh: Option<usize>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub local_transform: Mat4,
    pub world_transform: Mat4,
}

/// A node transform is authored either as an explicit column-major
/// matrix or as separate TRS fields, never both.
enum LocalTransform {
    Matrix(Mat4),
    Trs {
        scale: Vec3,
        rotation: Quat,
        translation: Vec3,
    },
}

fn resolve_local(node: &Node, node_index: usize) -> Result<LocalTransform> {
    let has_trs =
        node.translation.is_some() || node.rotation.is_some() || node.scale.is_some();
    if let Some(matrix) = node.matrix {
        if has_trs {
            return Err(MicaError::ConflictingTransform { node: node_index });
        }
        return Ok(LocalTransform::Matrix(Mat4::from_cols_array(&matrix)));
    }

    let rotation = match node.rotation {
        Some([x, y, z, w]) => {
            let q = Quat::from_xyzw(x, y, z, w);
            if q.length() < 1e-12 {
                return Err(MicaError::DegenerateRotation { node: node_index });
            }
            q.normalize()
        }
        None => Quat::IDENTITY,
    };
    Ok(LocalTransform::Trs {
        scale: node.scale.map_or(Vec3::ONE, Vec3::from_array),
        rotation,
        translation: node.translation.map_or(Vec3::ZERO, Vec3::from_array),
    })
}

impl LocalTransform {
    fn matrix(&self) -> Mat4 {
        match *self {
            LocalTransform::Matrix(m) => m,
            // Translation applied last: T * R * S.
            LocalTransform::Trs {
                scale,
                rotation,
                translation,
            } => Mat4::from_scale_rotation_translation(scale, rotation, translation),
        }
    }
}

/// Build the node arena and compose world transforms.
///
/// Two passes: the first resolves local transforms and parent/child
/// links (rejecting a node claimed by two parents), the second
/// multiplies ancestor locals root-to-leaf once the whole tree exists.
pub fn build_nodes(document: &Document) -> Result<Vec<SceneNode>> {
    let mut nodes: Vec<SceneNode> = Vec::with_capacity(document.nodes.len());

    for (index, node) in document.nodes.iter().enumerate() {
        let local = resolve_local(node, index)?.matrix();
        nodes.push(SceneNode {
            mesh: node.mesh,
            parent: None,
            children: Vec::new(),
            local_transform: local,
            world_transform: Mat4::IDENTITY,
        });
    }

    for (index, node) in document.nodes.iter().enumerate() {
        for &child in &node.children {
            if child >= nodes.len() {
                return Err(MicaError::IndexOutOfRange {
                    kind: "node",
                    index: child,
                });
            }
            if nodes[child].parent.is_some() {
                return Err(MicaError::DuplicateParent { node: child });
            }
            nodes[child].parent = Some(index);
            nodes[index].children.push(child);
        }
    }

    for index in 0..nodes.len() {
        let mut world = nodes[index].local_transform;
        let mut ancestor = nodes[index].parent;
        while let Some(parent) = ancestor {
            world = nodes[parent].local_transform * world;
            ancestor = nodes[parent].parent;
        }
        nodes[index].world_transform = world;
    }

    Ok(nodes)
}

/// Deduplicate transforms into a compact table.
///
/// Returns the structurally distinct transforms in first-seen order,
/// plus the table index assigned to each input. Equality is exact
/// per matrix entry: transforms that represent the same authored
/// value are expected to be bit-identical, so no epsilon is applied.
pub fn dedupe_transforms(transforms: &[Mat4]) -> (Vec<Mat4>, Vec<usize>) {
    let mut table: Vec<Mat4> = Vec::new();
    let mut indices = Vec::with_capacity(transforms.len());
    for transform in transforms {
        let index = match table.iter().position(|t| t == transform) {
            Some(index) => index,
            None => {
                table.push(*transform);
                table.len() - 1
            }
        };
        indices.push(index);
    }
    (table, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Node;

    fn trs_node(
        translation: Option<[f32; 3]>,
        rotation: Option<[f32; 4]>,
        scale: Option<[f32; 3]>,
    ) -> Node {
        Node {
            translation,
            rotation,
            scale,
            ..Default::default()
        }
    }

    #[test]
    fn composes_trs_in_translation_last_order() {
        let doc = Document {
            nodes: vec![trs_node(
                Some([1.0, 2.0, 3.0]),
                None,
                Some([2.0, 2.0, 2.0]),
            )],
            ..Default::default()
        };
        let nodes = build_nodes(&doc).unwrap();
        // T * S applied to origin-offset point: scale happens first.
        let p = nodes[0].local_transform.transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(p, Vec3::new(3.0, 2.0, 3.0));
    }

    #[test]
    fn world_transform_multiplies_ancestors() {
        let root = Node {
            children: vec![1],
            ..trs_node(Some([0.0, 1.0, 0.0]), None, None)
        };
        let child = trs_node(Some([2.0, 0.0, 0.0]), None, None);
        let doc = Document {
            nodes: vec![root, child],
            ..Default::default()
        };
        let nodes = build_nodes(&doc).unwrap();
        assert_eq!(nodes[1].parent, Some(0));
        let p = nodes[1].world_transform.transform_point3(Vec3::ZERO);
        assert_eq!(p, Vec3::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn rejects_matrix_combined_with_trs() {
        let node = Node {
            matrix: Some(Mat4::IDENTITY.to_cols_array()),
            ..trs_node(Some([1.0, 0.0, 0.0]), None, None)
        };
        let doc = Document {
            nodes: vec![node],
            ..Default::default()
        };
        assert!(matches!(
            build_nodes(&doc),
            Err(MicaError::ConflictingTransform { node: 0 })
        ));
    }

    #[test]
    fn rejects_zero_norm_quaternion() {
        let doc = Document {
            nodes: vec![trs_node(None, Some([0.0, 0.0, 0.0, 0.0]), None)],
            ..Default::default()
        };
        assert!(matches!(
            build_nodes(&doc),
            Err(MicaError::DegenerateRotation { node: 0 })
        ));
    }

    #[test]
    fn rejects_child_with_two_parents() {
        let a = Node {
            children: vec![2],
            ..Default::default()
        };
        let b = Node {
            children: vec![2],
            ..Default::default()
        };
        let doc = Document {
            nodes: vec![a, b, Node::default()],
            ..Default::default()
        };
        assert!(matches!(
            build_nodes(&doc),
            Err(MicaError::DuplicateParent { node: 2 })
        ));
    }

    #[test]
    fn dedupe_assigns_equal_indices_to_identical_transforms() {
        let a = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let b = Mat4::from_translation(Vec3::new(4.0, 5.0, 6.0));
        let (table, indices) = dedupe_transforms(&[a, b, a, b, a]);
        assert_eq!(table, vec![a, b]);
        assert_eq!(indices, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn dedupe_is_exact_not_approximate() {
        let a = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let b = Mat4::from_translation(Vec3::new(1.0 + f32::EPSILON, 0.0, 0.0));
        let (table, _) = dedupe_transforms(&[a, b]);
        assert_eq!(table.len(), 2);
    }
}
