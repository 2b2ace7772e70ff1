//! Animation extraction, keyframe compaction, and joint hierarchies.
//!
//! Sampled channel data is noisy and redundant: authoring tools emit
//! duplicate times and long runs of identical values. Compaction
//! collapses those losslessly (at 6-decimal precision) so downstream
//! consumers store a minimal keyframe set.
//!
//! Two hierarchy variants are supported: skin-driven (the skin's
//! joint list, parent-before-child) and node-driven (every scene node
//! is a candidate joint, then inert leaf branches are pruned).

use glam::Mat4;
use hashbrown::HashMap;

use crate::accessor::decode_accessor;
use crate::document::{Animation, Document, Node, TargetPath};
use crate::error::{MicaError, Result};

/// A `(time, value)` sample of an animated property.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe<const N: usize> {
    pub time: f32,
    pub value: [f32; N],
}

/// One joint of an animation hierarchy.
///
/// `parent_index` is −1 for the root and otherwise strictly less than
/// the joint's own index, so consumers can evaluate joints in order.
#[derive(Debug, Clone)]
pub struct Joint {
    pub joint_index: usize,
    pub parent_index: i32,
    pub inverse_bind: Mat4,
    pub translations: Vec<Keyframe<3>>,
    pub rotations: Vec<Keyframe<4>>,
    pub scales: Vec<Keyframe<3>>,
}

/// Round to 6 decimal digits, the precision of the text dump.
fn round6(x: f32) -> f32 {
    ((x as f64 * 1e6).round() / 1e6) as f32
}

fn round6_array<const N: usize>(v: [f32; N]) -> [f32; N] {
    std::array::from_fn(|i| round6(v[i]))
}

/// Compact a sampled `(time, value)` sequence into a minimal keyframe
/// set.
///
/// 1. Times and values are rounded to 6 decimals.
/// 2. Duplicate times keep the later sample; the result is sorted
///    ascending by time.
/// 3. Interior keyframes whose value equals both neighbours are
///    dropped.
/// 4. Exactly two keyframes with equal values collapse to one.
///
/// Compacting an already-compacted sequence is a no-op.
pub fn compact_keyframes<const N: usize>(times: &[f32], values: &[[f32; N]]) -> Vec<Keyframe<N>> {
    // Unique times, later sample wins.
    let mut ordered: Vec<Keyframe<N>> = Vec::new();
    let mut seen: HashMap<u32, usize> = HashMap::new();
    for (&time, &value) in times.iter().zip(values.iter()) {
        let time = round6(time);
        let value = round6_array(value);
        match seen.get(&time.to_bits()) {
            Some(&slot) => ordered[slot].value = value,
            None => {
                seen.insert(time.to_bits(), ordered.len());
                ordered.push(Keyframe { time, value });
            }
        }
    }
    ordered.sort_by(|a, b| a.time.total_cmp(&b.time));

    // Drop interior keyframes equal to both neighbours.
    let last = ordered.len().saturating_sub(1);
    let mut compacted: Vec<Keyframe<N>> = ordered
        .iter()
        .enumerate()
        .filter(|&(i, keyframe)| {
            i == 0
                || i == last
                || keyframe.value != ordered[i - 1].value
                || keyframe.value != ordered[i + 1].value
        })
        .map(|(_, &keyframe)| keyframe)
        .collect();

    if compacted.len() == 2 && compacted[0].value == compacted[1].value {
        compacted.truncate(1);
    }
    compacted
}

/// Translation, rotation, and scale keyframes gathered for one node.
#[derive(Default)]
struct NodeChannels {
    translations: Vec<Keyframe<3>>,
    rotations: Vec<Keyframe<4>>,
    scales: Vec<Keyframe<3>>,
}

/// Gather and compact every channel of `animation` targeting
/// `node_index`. The morph-target `weights` path is ignored. A TRS
/// path with no channel falls back to the node's static field as a
/// single keyframe at time 0, so every joint has a definite pose.
fn load_node_channels(
    document: &Document,
    buffer: &[u8],
    animation: &Animation,
    node_index: usize,
    node: &Node,
) -> Result<NodeChannels> {
    let mut translations = Vec::new();
    let mut rotations = Vec::new();
    let mut scales = Vec::new();

    for channel in &animation.channels {
        if channel.target.node != Some(node_index) || channel.target.path == TargetPath::Weights {
            continue;
        }
        let sampler =
            animation
                .samplers
                .get(channel.sampler)
                .ok_or(MicaError::IndexOutOfRange {
                    kind: "animation sampler",
                    index: channel.sampler,
                })?;
        let input = decode_accessor(document, buffer, sampler.input)?.scalars_f32()?;
        let output = decode_accessor(document, buffer, sampler.output)?;
        if output.len() != input.len() {
            return Err(MicaError::MalformedAccessor {
                index: sampler.output,
                reason: format!(
                    "sampler output has {} elements, input has {}",
                    output.len(),
                    input.len()
                ),
            });
        }
        match channel.target.path {
            TargetPath::Translation => {
                translations = compact_keyframes(&input, &output.vec3_f32()?);
            }
            TargetPath::Rotation => {
                rotations = compact_keyframes(&input, &output.vec4_f32()?);
            }
            TargetPath::Scale => {
                scales = compact_keyframes(&input, &output.vec3_f32()?);
            }
            TargetPath::Weights => unreachable!(),
        }
    }

    if translations.is_empty() {
        if let Some(value) = node.translation {
            translations.push(Keyframe { time: 0.0, value });
        }
    }
    if rotations.is_empty() {
        if let Some(value) = node.rotation {
            rotations.push(Keyframe { time: 0.0, value });
        }
    }
    if scales.is_empty() {
        if let Some(value) = node.scale {
            scales.push(Keyframe { time: 0.0, value });
        }
    }

    Ok(NodeChannels {
        translations,
        rotations,
        scales,
    })
}

/// Map every child node to its single parent, rejecting child
/// indices outside the node list.
fn child_to_parent(document: &Document) -> Result<HashMap<usize, usize>> {
    let mut parents = HashMap::new();
    for (node_index, node) in document.nodes.iter().enumerate() {
        for &child in &node.children {
            if child >= document.nodes.len() {
                return Err(MicaError::IndexOutOfRange {
                    kind: "node",
                    index: child,
                });
            }
            if parents.insert(child, node_index).is_some() {
                return Err(MicaError::DuplicateParent { node: child });
            }
        }
    }
    Ok(parents)
}

// ============================================================================
// Skin-driven hierarchy
// ============================================================================

/// Extract the skin's joint hierarchy plus one animation and dump it
/// as text.
///
/// The parent of each joint must appear earlier in the skin's joint
/// list; this ordering lets consumers stream-evaluate joints in index
/// order, and a skin violating it is rejected with `UnorderedSkin`.
pub fn dump_skin_animation(
    document: &Document,
    buffer: &[u8],
    animation_index: usize,
    skin_index: usize,
) -> Result<String> {
    let animation =
        document
            .animations
            .get(animation_index)
            .ok_or(MicaError::IndexOutOfRange {
                kind: "animation",
                index: animation_index,
            })?;
    let skin = document.skins.get(skin_index).ok_or(MicaError::IndexOutOfRange {
        kind: "skin",
        index: skin_index,
    })?;

    let ibm_accessor = skin
        .inverse_bind_matrices
        .ok_or(MicaError::MissingInverseBind { skin: skin_index })?;
    let inverse_binds = decode_accessor(document, buffer, ibm_accessor)?.mat4_f32()?;
    if inverse_binds.len() != skin.joints.len() {
        return Err(MicaError::MalformedAccessor {
            index: ibm_accessor,
            reason: format!(
                "has {} inverse binds for {} joints",
                inverse_binds.len(),
                skin.joints.len()
            ),
        });
    }

    let parents = child_to_parent(document)?;

    let mut joints = Vec::with_capacity(skin.joints.len());
    for (joint_index, &node_index) in skin.joints.iter().enumerate() {
        let node = document
            .nodes
            .get(node_index)
            .ok_or(MicaError::IndexOutOfRange {
                kind: "node",
                index: node_index,
            })?;

        let parent_index = if skin.skeleton == Some(node_index) {
            -1
        } else {
            match parents.get(&node_index) {
                None => -1,
                Some(parent_node) => {
                    let parent = skin
                        .joints
                        .iter()
                        .position(|&j| j == *parent_node)
                        .ok_or(MicaError::UnorderedSkin { joint: joint_index })?;
                    if parent >= joint_index {
                        return Err(MicaError::UnorderedSkin { joint: joint_index });
                    }
                    parent as i32
                }
            }
        };

        let channels = load_node_channels(document, buffer, animation, node_index, node)?;
        joints.push(Joint {
            joint_index,
            parent_index,
            inverse_bind: Mat4::from_cols_array(&inverse_binds[joint_index]),
            translations: channels.translations,
            rotations: channels.rotations,
            scales: channels.scales,
        });
    }

    tracing::debug!(
        skin = skin_index,
        joints = joints.len(),
        "extracted skin animation"
    );
    Ok(dump_joints(&joints))
}

// ============================================================================
// Node-driven hierarchy
// ============================================================================

/// A scene node promoted to candidate joint, before pruning.
struct CandidateJoint {
    parent: i32,
    inverse_bind: Mat4,
    channels: NodeChannels,
    meshes: Vec<usize>,
    children: Vec<usize>,
    discarded: bool,
}

impl CandidateJoint {
    /// A joint is animation-inert when it carries no keyframes (not
    /// even a static fallback pose) and an identity inverse bind.
    fn has_transform(&self) -> bool {
        !self.channels.translations.is_empty()
            || !self.channels.rotations.is_empty()
            || !self.channels.scales.is_empty()
            || self.inverse_bind != Mat4::IDENTITY
    }
}

/// Does any node in `index`'s subtree (itself included) carry a mesh?
fn subtree_has_mesh(candidates: &[CandidateJoint], index: usize) -> bool {
    !candidates[index].meshes.is_empty()
        || candidates[index]
            .children
            .iter()
            .any(|&child| subtree_has_mesh(candidates, child))
}

/// Extract a node-driven animation hierarchy and dump it as text.
///
/// Every scene node becomes a candidate joint; a single bottom-up
/// pass then discards joints that are animation-inert and have no
/// mesh-bearing descendant, reassigning a discarded joint's meshes to
/// its nearest surviving ancestor. The node list must be
/// topologically ordered (parents before children), which makes one
/// pass a fixed point.
///
/// Returns the text dump plus the mesh→joint table: for every mesh
/// index in document order, the compacted joint index that owns it.
pub fn dump_node_animation(
    document: &Document,
    buffer: &[u8],
    animation_index: usize,
) -> Result<(String, Vec<usize>)> {
    let animation =
        document
            .animations
            .get(animation_index)
            .ok_or(MicaError::IndexOutOfRange {
                kind: "animation",
                index: animation_index,
            })?;

    let parents = child_to_parent(document)?;

    let mut candidates = Vec::with_capacity(document.nodes.len());
    for (node_index, node) in document.nodes.iter().enumerate() {
        let parent = if node_index == 0 {
            -1
        } else {
            match parents.get(&node_index) {
                Some(&parent) if parent < node_index => parent as i32,
                _ => return Err(MicaError::UnorderedNodes { node: node_index }),
            }
        };

        let inverse_bind = node
            .matrix
            .map_or(Mat4::IDENTITY, |m| Mat4::from_cols_array(&m));
        let channels = load_node_channels(document, buffer, animation, node_index, node)?;

        candidates.push(CandidateJoint {
            parent,
            inverse_bind,
            channels,
            meshes: node.mesh.into_iter().collect(),
            children: node.children.clone(),
            discarded: false,
        });
    }

    let (joints, mesh_to_joint) = compact_joints(&mut candidates, document.meshes.len())?;
    tracing::debug!(
        candidates = document.nodes.len(),
        joints = joints.len(),
        "compacted node animation hierarchy"
    );
    Ok((dump_joints(&joints), mesh_to_joint))
}

/// Prune inert joints and renumber the survivors.
fn compact_joints(
    candidates: &mut [CandidateJoint],
    mesh_count: usize,
) -> Result<(Vec<Joint>, Vec<usize>)> {
    let mut retained: Vec<usize> = vec![0];

    for index in 1..candidates.len() {
        // Re-point through a discarded parent. One hop suffices: a
        // discarded joint's own parent link was already re-pointed to
        // a survivor when it was processed.
        let mut parent = candidates[index].parent as usize;
        if candidates[parent].discarded {
            parent = candidates[parent].parent as usize;
            debug_assert!(!candidates[parent].discarded);
        }
        candidates[index].parent = parent as i32;

        let keep = candidates[index].has_transform()
            || candidates[index]
                .children
                .clone()
                .iter()
                .any(|&child| subtree_has_mesh(candidates, child));
        if keep {
            retained.push(index);
        } else {
            candidates[index].discarded = true;
            let meshes = std::mem::take(&mut candidates[index].meshes);
            candidates[parent].meshes.extend(meshes);
        }
    }

    // Renumber survivors and build the mesh ownership table.
    let mut new_index: HashMap<usize, usize> = HashMap::new();
    for (index, &original) in retained.iter().enumerate() {
        new_index.insert(original, index);
    }

    let mut mesh_to_joint: Vec<Option<usize>> = vec![None; mesh_count];
    let mut joints = Vec::with_capacity(retained.len());
    for (index, &original) in retained.iter().enumerate() {
        let candidate = &mut candidates[original];
        let parent_index = if index == 0 {
            candidate.parent
        } else {
            new_index[&(candidate.parent as usize)] as i32
        };
        for &mesh in &candidate.meshes {
            if mesh >= mesh_count {
                return Err(MicaError::IndexOutOfRange {
                    kind: "mesh",
                    index: mesh,
                });
            }
            mesh_to_joint[mesh] = Some(index);
        }
        let channels = std::mem::take(&mut candidate.channels);
        joints.push(Joint {
            joint_index: index,
            parent_index,
            inverse_bind: candidate.inverse_bind,
            translations: channels.translations,
            rotations: channels.rotations,
            scales: channels.scales,
        });
    }

    let mesh_to_joint = mesh_to_joint
        .into_iter()
        .enumerate()
        .map(|(mesh, joint)| joint.ok_or(MicaError::MeshWithoutJoint { mesh }))
        .collect::<Result<Vec<usize>>>()?;

    Ok((joints, mesh_to_joint))
}

// ============================================================================
// Text serialization
// ============================================================================

fn format_value<const N: usize>(value: [f32; N]) -> String {
    let parts: Vec<String> = value.iter().map(|v| format!("{v:.6}")).collect();
    format!("[{}]", parts.join(", "))
}

fn push_keyframe_block<const N: usize>(
    lines: &mut Vec<String>,
    label: &str,
    keyframes: &[Keyframe<N>],
) {
    lines.push(format!("    {label} {}:", keyframes.len()));
    for keyframe in keyframes {
        lines.push(format!(
            "        time: {:.6}, value: {}",
            keyframe.time,
            format_value(keyframe.value)
        ));
    }
}

/// Serialize a joint hierarchy to the animation text format.
pub fn dump_joints(joints: &[Joint]) -> String {
    let mut min_time = f32::INFINITY;
    let mut max_time = f32::NEG_INFINITY;
    for joint in joints {
        let times = joint
            .translations
            .iter()
            .map(|k| k.time)
            .chain(joint.rotations.iter().map(|k| k.time))
            .chain(joint.scales.iter().map(|k| k.time));
        for time in times {
            min_time = min_time.min(time);
            max_time = max_time.max(time);
        }
    }

    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("joint-size: {}", joints.len()));
    lines.push(format!("time-range: [{min_time:.6}, {max_time:.6}]"));

    for joint in joints {
        lines.push(String::new());
        lines.push(format!("joint {}:", joint.joint_index));
        lines.push(format!("    parent-index: {}", joint.parent_index));
        lines.push("    inverse-bind:".to_string());
        for row in 0..4 {
            let r = joint.inverse_bind.row(row);
            lines.push(format!(
                "        {:.6} {:.6} {:.6} {:.6}",
                r.x, r.y, r.z, r.w
            ));
        }
        push_keyframe_block(&mut lines, "translations", &joint.translations);
        push_keyframe_block(&mut lines, "rotations", &joint.rotations);
        push_keyframe_block(&mut lines, "scales", &joint.scales);
    }

    lines.join("\n") + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: [f32; 3] = [1.0, 2.0, 3.0];
    const B: [f32; 3] = [4.0, 5.0, 6.0];

    #[test]
    fn drops_interior_runs_after_time_dedup() {
        let times = [0.0, 0.0, 1.0, 2.0, 3.0];
        let values = [A, A, A, A, B];
        let compacted = compact_keyframes(&times, &values);
        assert_eq!(
            compacted,
            vec![
                Keyframe { time: 0.0, value: A },
                Keyframe { time: 2.0, value: A },
                Keyframe { time: 3.0, value: B },
            ]
        );
    }

    #[test]
    fn collapses_two_equal_keyframes_to_one() {
        let compacted = compact_keyframes(&[0.0, 5.0], &[A, A]);
        assert_eq!(compacted, vec![Keyframe { time: 0.0, value: A }]);
    }

    #[test]
    fn later_sample_wins_on_duplicate_time() {
        let compacted = compact_keyframes(&[0.0, 1.0, 1.0], &[A, A, B]);
        assert_eq!(
            compacted,
            vec![
                Keyframe { time: 0.0, value: A },
                Keyframe { time: 1.0, value: B },
            ]
        );
    }

    #[test]
    fn compaction_is_idempotent() {
        let times = [0.0, 0.5, 1.0, 1.5, 2.0, 2.5];
        let values = [A, A, B, B, A, A];
        let once = compact_keyframes(&times, &values);
        let (times2, values2): (Vec<f32>, Vec<[f32; 3]>) =
            once.iter().map(|k| (k.time, k.value)).unzip();
        let twice = compact_keyframes(&times2, &values2);
        assert_eq!(once, twice);
    }

    #[test]
    fn rounds_times_and_values_to_six_decimals() {
        let compacted = compact_keyframes(&[0.123_456_78], &[[1.000_000_4, 0.0, 0.0]]);
        assert_eq!(compacted[0].time, 0.123_457);
        assert_eq!(compacted[0].value[0], 1.0);
    }

    #[test]
    fn sorts_unordered_input_times() {
        let compacted = compact_keyframes(&[2.0, 0.0, 1.0], &[B, A, B]);
        assert_eq!(
            compacted.iter().map(|k| k.time).collect::<Vec<_>>(),
            vec![0.0, 1.0, 2.0]
        );
    }

    #[test]
    fn dump_prints_inverse_bind_rows_from_columns() {
        // Column-major storage, row-major printing: the translation
        // column must appear as the last element of the first three
        // printed rows.
        let joint = Joint {
            joint_index: 0,
            parent_index: -1,
            inverse_bind: Mat4::from_translation(glam::Vec3::new(7.0, 8.0, 9.0)),
            translations: vec![],
            rotations: vec![],
            scales: vec![],
        };
        let dump = dump_joints(&[joint]);
        assert!(dump.contains("        1.000000 0.000000 0.000000 7.000000"));
        assert!(dump.contains("        0.000000 1.000000 0.000000 8.000000"));
        assert!(dump.contains("        0.000000 0.000000 1.000000 9.000000"));
        assert!(dump.contains("        0.000000 0.000000 0.000000 1.000000"));
    }
}
