//! Recorded or authored joint animation and time based sampling.
//!
//! An [AnimationClip] stores a local transform for each capture joint at each [Frame].
//! Sampling is a pure function of the clip and the time,
//! so the same time always produces the same pose.
//! The time cursor that advances during playback is a separate [PlaybackCursor].
use std::time::SystemTime;

use glam::Mat4;
use log::warn;
use smol_str::SmolStr;

use crate::transform::Transform;

mod cursor;
pub mod io;
mod recorder;

pub use cursor::{Direction, MIN_PLAYBACK_SPEED, PlaybackCursor, PlaybackEvent, PlaybackSettings};
pub use recorder::ClipRecorder;

/// How sampling handles times outside the clip's duration.
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, strum::Display)]
pub enum PlayMode {
    /// Wrap the time back into the clip.
    Loop,
    /// Hold the first or final frame.
    #[default]
    Once,
}

impl PlayMode {
    pub fn from_looping(looping: bool) -> Self {
        if looping { Self::Loop } else { Self::Once }
    }
}

/// A joint of the capture rig in the sensor defined order.
#[derive(Debug, PartialEq, Clone)]
pub struct CaptureJoint {
    pub name: SmolStr,
    pub path: SmolStr,
    /// The index of the parent [CaptureJoint] or `None` for the root.
    pub parent_index: Option<usize>,
    /// Used for frames where this joint was not tracked.
    pub bind_transform: Mat4,
    /// Used for clips without any frames.
    pub rest_transform: Mat4,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Frame {
    /// Seconds since the start of the clip.
    pub timestamp: f32,
    /// The local transform for each joint in [joints](AnimationClip::joints)
    /// or `None` if the joint is absent from this frame.
    pub transforms: Vec<Option<Mat4>>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct AnimationClip {
    pub name: String,
    pub frames_per_second: f32,
    /// The length of the clip in seconds.
    /// This is at least the timestamp of the final frame.
    pub duration: f32,
    pub created_at: SystemTime,
    pub joints: Vec<CaptureJoint>,
    /// Frames in ascending order by timestamp.
    pub frames: Vec<Frame>,
}

impl AnimationClip {
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The rest transform of each capture joint.
    pub fn rest_pose(&self) -> Vec<Mat4> {
        self.joints.iter().map(|j| j.rest_transform).collect()
    }

    /// Convert `time` in seconds to a time within the clip based on `play_mode`.
    pub fn clip_time(&self, time: f32, play_mode: PlayMode) -> f32 {
        if self.duration <= 0.0 {
            return 0.0;
        }

        match play_mode {
            PlayMode::Loop => {
                let time = time.rem_euclid(self.duration);
                // Rounding can produce the duration itself for tiny negative values.
                if time >= self.duration { 0.0 } else { time }
            }
            PlayMode::Once => time.clamp(0.0, self.duration),
        }
    }

    /// Convert `time` in seconds to a fractional frame index based on `play_mode`.
    ///
    /// Frames are treated as evenly spaced over the clip's duration.
    pub fn current_frame(&self, time: f32, play_mode: PlayMode) -> f32 {
        let final_frame = self.frames.len().saturating_sub(1) as f32;
        if self.duration <= 0.0 {
            return 0.0;
        }
        let progress = self.clip_time(time, play_mode) / self.duration;
        (progress * final_frame).clamp(0.0, final_frame)
    }

    /// Compute the local transform for each capture joint at `time` in seconds.
    ///
    /// The result has one transform for each of [joints](#structfield.joints).
    /// Translation and scale are interpolated linearly and rotation uses slerp.
    /// Joints absent from a frame use their bind transform.
    /// Empty clips return the rest pose.
    pub fn sample(&self, time: f32, play_mode: PlayMode) -> Vec<Mat4> {
        let Some(final_frame) = self.frames.len().checked_sub(1) else {
            return self.rest_pose();
        };

        // The interpolation factor is undefined for a single frame.
        if final_frame == 0 || self.duration <= 0.0 {
            return self.frame_transforms(&self.frames[0]);
        }

        let frame = self.current_frame(time, play_mode);
        let (current, next, factor) = frame_next_frame_factor(frame, final_frame);
        if factor == 0.0 || current == next {
            return self.frame_transforms(&self.frames[current]);
        }

        let current = &self.frames[current];
        let next = &self.frames[next];
        self.joints
            .iter()
            .enumerate()
            .map(|(i, joint)| {
                let a = joint_transform(current, i, joint);
                let b = joint_transform(next, i, joint);
                decompose_or_identity(a, joint)
                    .lerp(decompose_or_identity(b, joint), factor)
                    .to_matrix()
            })
            .collect()
    }

    fn frame_transforms(&self, frame: &Frame) -> Vec<Mat4> {
        self.joints
            .iter()
            .enumerate()
            .map(|(i, joint)| joint_transform(frame, i, joint))
            .collect()
    }
}

fn joint_transform(frame: &Frame, index: usize, joint: &CaptureJoint) -> Mat4 {
    frame
        .transforms
        .get(index)
        .copied()
        .flatten()
        .unwrap_or(joint.bind_transform)
}

fn decompose_or_identity(transform: Mat4, joint: &CaptureJoint) -> Transform {
    Transform::decompose(transform).unwrap_or_else(|e| {
        warn!("Using identity for joint {:?}: {e}", joint.path);
        Transform::IDENTITY
    })
}

fn frame_next_frame_factor(frame: f32, final_frame: usize) -> (usize, usize, f32) {
    let frame_index = (frame.floor() as usize).min(final_frame);
    let next_frame_index = (frame_index + 1).min(final_frame);
    let factor = if frame_index == final_frame {
        0.0
    } else {
        frame - frame_index as f32
    };
    (frame_index, next_frame_index, factor)
}
