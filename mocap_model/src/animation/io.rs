//! The self describing JSON record for saving and loading clips.
//!
//! Each frame repeats the full joint table so that every frame can be read on its own.
//! Matrices are stored as column major arrays.
use std::path::Path;
use std::time::SystemTime;

use glam::Mat4;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use super::{AnimationClip, CaptureJoint, Frame};
use crate::error::{LoadClipError, SaveClipError};

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ClipRecord {
    pub name: String,
    pub duration: f32,
    pub frames_per_second: f32,
    pub created_at: SystemTime,
    pub frames: Vec<FrameRecord>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct FrameRecord {
    pub timestamp: f32,
    pub joints: Vec<JointRecord>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct JointRecord {
    pub name: SmolStr,
    pub path: SmolStr,
    /// The local transform at this frame or `None` if the joint was not tracked.
    pub transform: Option<[[f32; 4]; 4]>,
    pub bind_transform: [[f32; 4]; 4],
    pub rest_transform: [[f32; 4]; 4],
    pub parent_index: Option<usize>,
}

impl AnimationClip {
    pub fn to_record(&self) -> ClipRecord {
        ClipRecord {
            name: self.name.clone(),
            duration: self.duration,
            frames_per_second: self.frames_per_second,
            created_at: self.created_at,
            frames: self
                .frames
                .iter()
                .map(|frame| FrameRecord {
                    timestamp: frame.timestamp,
                    joints: self
                        .joints
                        .iter()
                        .enumerate()
                        .map(|(i, joint)| JointRecord {
                            name: joint.name.clone(),
                            path: joint.path.clone(),
                            transform: frame
                                .transforms
                                .get(i)
                                .copied()
                                .flatten()
                                .map(|t| t.to_cols_array_2d()),
                            bind_transform: joint.bind_transform.to_cols_array_2d(),
                            rest_transform: joint.rest_transform.to_cols_array_2d(),
                            parent_index: joint.parent_index,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    /// Validate and convert a deserialized record.
    ///
    /// The joint table is taken from the first frame.
    /// Every other frame must list the same joint paths in the same order.
    pub fn from_record(record: ClipRecord) -> Result<Self, LoadClipError> {
        let first = record.frames.first().ok_or(LoadClipError::EmptyFrames)?;

        let joints: Vec<_> = first
            .joints
            .iter()
            .map(|j| CaptureJoint {
                name: j.name.clone(),
                path: j.path.clone(),
                parent_index: j.parent_index,
                bind_transform: Mat4::from_cols_array_2d(&j.bind_transform),
                rest_transform: Mat4::from_cols_array_2d(&j.rest_transform),
            })
            .collect();
        validate_parents(&joints)?;

        let mut previous_timestamp = f32::NEG_INFINITY;
        for (i, frame) in record.frames.iter().enumerate() {
            if frame.joints.len() != joints.len() {
                return Err(LoadClipError::InconsistentJointCount {
                    frame: i,
                    expected: joints.len(),
                    actual: frame.joints.len(),
                });
            }

            if let Some((joint, (expected, actual))) = joints
                .iter()
                .zip(&frame.joints)
                .enumerate()
                .find(|(_, (expected, actual))| expected.path != actual.path)
            {
                return Err(LoadClipError::InconsistentJointPath {
                    frame: i,
                    joint,
                    expected: expected.path.to_string(),
                    actual: actual.path.to_string(),
                });
            }

            if !(frame.timestamp >= previous_timestamp) {
                return Err(LoadClipError::UnorderedFrames {
                    frame: i,
                    timestamp: frame.timestamp,
                });
            }
            previous_timestamp = frame.timestamp;
        }

        if !(record.duration >= previous_timestamp) {
            return Err(LoadClipError::InvalidDuration {
                duration: record.duration,
                last_timestamp: previous_timestamp,
            });
        }

        let frames = record
            .frames
            .into_iter()
            .map(|frame| Frame {
                timestamp: frame.timestamp,
                transforms: frame
                    .joints
                    .iter()
                    .map(|j| j.transform.as_ref().map(Mat4::from_cols_array_2d))
                    .collect(),
            })
            .collect();

        Ok(Self {
            name: record.name,
            frames_per_second: record.frames_per_second,
            duration: record.duration,
            created_at: record.created_at,
            joints,
            frames,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, LoadClipError> {
        let record: ClipRecord = serde_json::from_str(json)?;
        Self::from_record(record)
    }

    pub fn to_json(&self) -> Result<String, SaveClipError> {
        Ok(serde_json::to_string_pretty(&self.to_record())?)
    }

    /// Load a clip saved with [save](AnimationClip::save).
    #[tracing::instrument(skip_all)]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LoadClipError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SaveClipError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

fn validate_parents(joints: &[CaptureJoint]) -> Result<(), LoadClipError> {
    for (joint, capture_joint) in joints.iter().enumerate() {
        if let Some(parent_index) = capture_joint.parent_index
            && parent_index >= joints.len()
        {
            return Err(LoadClipError::ParentIndexOutOfRange {
                joint,
                parent_index,
                joint_count: joints.len(),
            });
        }
    }

    // Any chain longer than the joint count must revisit a joint.
    for joint in 0..joints.len() {
        let mut parent = joints[joint].parent_index;
        let mut depth = 0;
        while let Some(index) = parent {
            depth += 1;
            if index == joint || depth > joints.len() {
                return Err(LoadClipError::CyclicParent { joint });
            }
            parent = joints[index].parent_index;
        }
    }

    Ok(())
}
