use std::time::SystemTime;

use glam::Mat4;

use super::{AnimationClip, CaptureJoint, Frame};
use crate::error::AppendFrameError;

/// Builds an [AnimationClip] from frames delivered by the capture session.
///
/// Frames can only be appended.
/// Calling [finish](ClipRecorder::finish) consumes the recorder,
/// so a clip is never read while frames are still being added.
#[derive(Debug)]
pub struct ClipRecorder {
    name: String,
    frames_per_second: f32,
    created_at: SystemTime,
    joints: Vec<CaptureJoint>,
    frames: Vec<Frame>,
    start_timestamp: Option<f64>,
    previous_timestamp: Option<f64>,
}

impl ClipRecorder {
    pub fn new(name: impl Into<String>, frames_per_second: f32, joints: Vec<CaptureJoint>) -> Self {
        Self {
            name: name.into(),
            frames_per_second,
            created_at: SystemTime::now(),
            joints,
            frames: Vec::new(),
            start_timestamp: None,
            previous_timestamp: None,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Add the transforms for every capture joint at the sensor `timestamp` in seconds.
    ///
    /// Timestamps are stored relative to the first appended frame.
    /// They must be finite and increase.
    pub fn append(
        &mut self,
        timestamp: f64,
        transforms: Vec<Option<Mat4>>,
    ) -> Result<(), AppendFrameError> {
        if transforms.len() != self.joints.len() {
            return Err(AppendFrameError::JointCount {
                expected: self.joints.len(),
                actual: transforms.len(),
            });
        }

        if !timestamp.is_finite() {
            return Err(AppendFrameError::NonFiniteTimestamp { timestamp });
        }

        if let Some(previous) = self.previous_timestamp
            && !(timestamp > previous)
        {
            return Err(AppendFrameError::Timestamp {
                timestamp,
                previous,
            });
        }

        let start = *self.start_timestamp.get_or_insert(timestamp);
        self.previous_timestamp = Some(timestamp);

        self.frames.push(Frame {
            timestamp: (timestamp - start) as f32,
            transforms,
        });
        Ok(())
    }

    /// Stop recording and return the finished clip.
    pub fn finish(self) -> AnimationClip {
        let duration = self.frames.last().map(|f| f.timestamp).unwrap_or_default();

        AnimationClip {
            name: self.name,
            frames_per_second: self.frames_per_second,
            duration,
            created_at: self.created_at,
            joints: self.joints,
            frames: self.frames,
        }
    }
}
