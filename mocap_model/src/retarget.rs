//! Mapping capture rig joints onto model rig joints.
//!
//! The capture rig uses a fixed joint order defined by the body tracking sensor.
//! Model skeletons use their own order, naming and coordinate conventions.
//! A [Retargeter] is a hand authored lookup table plus a single basis correction.
use std::collections::BTreeMap;

use glam::{Mat4, vec4};
use log::{debug, warn};

use crate::animation::CaptureJoint;
use crate::skeleton::SkeletonHierarchy;

/// A fixed correspondence from capture joint indices to model joint indices.
///
/// The table does not need to be total or injective.
/// Capture joints without an entry are skipped.
#[derive(Debug, PartialEq, Clone)]
pub struct Retargeter {
    capture_to_model: BTreeMap<usize, usize>,
    correction: Mat4,
}

impl Retargeter {
    /// Create a table from `(capture_index, model_index)` pairs.
    /// Later pairs replace earlier pairs for the same capture index.
    pub fn new<I>(pairs: I, correction: Mat4) -> Self
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        let mut capture_to_model = BTreeMap::new();
        for (capture_index, model_index) in pairs {
            if let Some(previous) = capture_to_model.insert(capture_index, model_index) {
                warn!(
                    "Capture joint {capture_index} mapped to {model_index} replaces mapping to {previous}."
                );
            }
        }

        Self {
            capture_to_model,
            correction,
        }
    }

    /// Create a table by matching capture joint names to model joint names.
    pub fn from_names(
        capture_joints: &[CaptureJoint],
        skeleton: &SkeletonHierarchy,
        correction: Mat4,
    ) -> Self {
        let pairs = capture_joints
            .iter()
            .enumerate()
            .filter_map(|(capture_index, joint)| {
                let model_index = skeleton.joint_id_by_name(&joint.name);
                if model_index.is_none() {
                    debug!("No model joint named {:?}.", joint.name);
                }
                Some((capture_index, model_index?))
            });
        Self::new(pairs, correction)
    }

    /// Flip the z-axis to convert between left and right handed winding.
    pub fn z_flip() -> Mat4 {
        Mat4::from_diagonal(vec4(1.0, 1.0, -1.0, 1.0))
    }

    pub fn correction(&self) -> Mat4 {
        self.correction
    }

    /// The model joint driven by `capture_index` if any.
    pub fn model_index(&self, capture_index: usize) -> Option<usize> {
        self.capture_to_model.get(&capture_index).copied()
    }

    pub fn len(&self) -> usize {
        self.capture_to_model.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capture_to_model.is_empty()
    }

    /// Convert a captured local transform to the model joint index and model space.
    /// Returns `None` if the capture joint does not drive any model joint.
    pub fn retarget(&self, captured_local: Mat4, capture_index: usize) -> Option<(usize, Mat4)> {
        let model_index = self.model_index(capture_index)?;
        Some((model_index, self.correction * captured_local))
    }

    /// Retarget every joint in `captured` to a list of overrides for each model joint.
    /// Model joints without a mapped capture joint are `None`.
    pub fn retarget_pose(&self, captured: &[Mat4], model_joint_count: usize) -> Vec<Option<Mat4>> {
        let mut overrides = vec![None; model_joint_count];
        for (capture_index, transform) in captured.iter().enumerate() {
            if let Some((model_index, transform)) = self.retarget(*transform, capture_index) {
                match overrides.get_mut(model_index) {
                    Some(o) => *o = Some(transform),
                    None => warn!(
                        "Model joint {model_index} out of range for length {model_joint_count}."
                    ),
                }
            }
        }
        overrides
    }
}
