//! Skinning matrices and vertex skin weights.
//!
//! The skinning matrix for a joint transforms a vertex in model space
//! to its animated position in model space.
//! This is the joint's animated model space transform times its inverse bind transform,
//! so a skeleton in its bind pose produces identity matrices.
use glam::{Mat4, Vec3, Vec4};
use log::warn;

use crate::error::SkinWeightsError;
use crate::skeleton::SkeletonHierarchy;

/// Compute the skinning matrix for each joint in `skeleton`.
///
/// The local transform of each joint is the first available of
/// the entry in `overrides`, the entry in `local_transforms`, or the joint's rest transform.
pub fn evaluate(
    skeleton: &SkeletonHierarchy,
    local_transforms: &[Mat4],
    overrides: Option<&[Option<Mat4>]>,
) -> Vec<Mat4> {
    let local_transforms = resolve_local_transforms(skeleton, local_transforms, overrides);
    let world_transforms = skeleton.model_space_transforms(&local_transforms);

    world_transforms
        .iter()
        .zip(skeleton.inverse_bind_transforms())
        .map(|(world, inverse_bind)| *world * *inverse_bind)
        .collect()
}

fn resolve_local_transforms(
    skeleton: &SkeletonHierarchy,
    local_transforms: &[Mat4],
    overrides: Option<&[Option<Mat4>]>,
) -> Vec<Mat4> {
    skeleton
        .joints()
        .iter()
        .map(|joint| {
            overrides
                .and_then(|o| o.get(joint.id).copied().flatten())
                .or_else(|| local_transforms.get(joint.id).copied())
                .unwrap_or(joint.rest_transform)
        })
        .collect()
}

/// The flat array of skinning matrices uploaded to the renderer each frame.
///
/// The length is the renderer's maximum joint count.
/// Slots past the skeleton's joint count always contain identity matrices.
#[derive(Debug, PartialEq, Clone)]
pub struct SkinningBuffer {
    matrices: Vec<Mat4>,
}

impl SkinningBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            matrices: vec![Mat4::IDENTITY; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.matrices.len()
    }

    pub fn as_slice(&self) -> &[Mat4] {
        &self.matrices
    }

    /// The matrices as bytes for uploading to a uniform or storage buffer.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.matrices)
    }

    /// Overwrite the buffer with the skinning matrices for the current pose.
    /// See [evaluate].
    pub fn evaluate_into(
        &mut self,
        skeleton: &SkeletonHierarchy,
        local_transforms: &[Mat4],
        overrides: Option<&[Option<Mat4>]>,
    ) {
        let matrices = evaluate(skeleton, local_transforms, overrides);
        self.write(&matrices);
    }

    /// Copy `matrices` into the buffer and reset all remaining slots to identity.
    pub fn write(&mut self, matrices: &[Mat4]) {
        if matrices.len() > self.matrices.len() {
            warn!(
                "Skipping {} joints beyond the buffer capacity of {}.",
                matrices.len() - self.matrices.len(),
                self.matrices.len()
            );
        }

        let count = matrices.len().min(self.matrices.len());
        self.matrices[..count].copy_from_slice(&matrices[..count]);
        self.matrices[count..].fill(Mat4::IDENTITY);
    }

    pub fn reset(&mut self) {
        self.matrices.fill(Mat4::IDENTITY);
    }
}

/// Up to 4 joint influences for each vertex.
/// Joint indices refer to joints in the model's [SkeletonHierarchy].
#[derive(Debug, PartialEq, Clone)]
pub struct SkinWeights {
    pub joint_indices: Vec<[u32; 4]>,
    pub weights: Vec<Vec4>,
}

impl SkinWeights {
    /// Check that every joint index is in range and scale the weights for each vertex to sum to 1.
    ///
    /// Vertices whose weights sum to 0 are fully bound to joint 0.
    pub fn normalize(&mut self, joint_count: usize) -> Result<(), SkinWeightsError> {
        if self.joint_indices.len() != self.weights.len() {
            return Err(SkinWeightsError::WeightCount {
                expected: self.joint_indices.len(),
                actual: self.weights.len(),
            });
        }

        // Validate every vertex before modifying anything.
        for (vertex_index, (indices, weights)) in
            self.joint_indices.iter().zip(&self.weights).enumerate()
        {
            for (index, weight) in indices.iter().zip(weights.to_array()) {
                // Unused influences often store an arbitrary index with zero weight.
                if weight != 0.0 && *index as usize >= joint_count {
                    return Err(SkinWeightsError::JointIndexOutOfRange {
                        vertex_index,
                        joint_index: *index,
                        joint_count,
                    });
                }
            }
        }

        for (indices, weights) in self.joint_indices.iter_mut().zip(&mut self.weights) {
            let sum = weights.element_sum();
            if sum.abs() <= f32::EPSILON || !sum.is_finite() {
                *indices = [0; 4];
                *weights = Vec4::X;
            } else {
                *weights /= sum;
            }
        }

        Ok(())
    }
}

/// Apply linear blend skinning to a single vertex `position`.
///
/// Out of range joint indices use the identity matrix.
pub fn skin_position(position: Vec3, indices: [u32; 4], weights: Vec4, matrices: &[Mat4]) -> Vec3 {
    indices
        .iter()
        .zip(weights.to_array())
        .filter(|(_, w)| *w != 0.0)
        .map(|(i, w)| {
            let matrix = matrices.get(*i as usize).copied().unwrap_or(Mat4::IDENTITY);
            matrix.transform_point3(position) * w
        })
        .sum()
}
