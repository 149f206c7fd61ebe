use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum InvalidSkeletonError {
    #[error("skeleton contains no joints")]
    Empty,

    #[error("expected {expected} bind transforms but found {actual}")]
    BindTransformCount { expected: usize, actual: usize },

    #[error("expected {expected} rest transforms but found {actual}")]
    RestTransformCount { expected: usize, actual: usize },

    #[error("joint {index} has an empty path")]
    EmptyPath { index: usize },

    #[error("joint path {path:?} appears more than once")]
    DuplicatePath { path: String },

    #[error("coordinate correction is not invertible")]
    Correction(#[source] DegenerateTransformError),
}

#[derive(Debug, Error, PartialEq, Clone, Copy)]
pub enum DegenerateTransformError {
    #[error("basis vector {axis} has near zero length")]
    ZeroScale { axis: usize },

    #[error("matrix with determinant {determinant} is not invertible")]
    NonInvertible { determinant: f32 },
}

#[derive(Debug, Error)]
pub enum LoadClipError {
    #[error("error reading clip file")]
    Io(#[from] std::io::Error),

    #[error("error deserializing clip JSON")]
    Json(#[from] serde_json::Error),

    #[error("clip contains no frames")]
    EmptyFrames,

    #[error("frame {frame} has {actual} joints but the first frame has {expected}")]
    InconsistentJointCount {
        frame: usize,
        expected: usize,
        actual: usize,
    },

    #[error("frame {frame} joint {joint} has path {actual:?} but the first frame has {expected:?}")]
    InconsistentJointPath {
        frame: usize,
        joint: usize,
        expected: String,
        actual: String,
    },

    #[error("frame {frame} has timestamp {timestamp} before the previous frame")]
    UnorderedFrames { frame: usize, timestamp: f32 },

    #[error("duration {duration} is shorter than the last frame timestamp {last_timestamp}")]
    InvalidDuration { duration: f32, last_timestamp: f32 },

    #[error("joint {joint} has parent {parent_index} but the clip has {joint_count} joints")]
    ParentIndexOutOfRange {
        joint: usize,
        parent_index: usize,
        joint_count: usize,
    },

    #[error("joint {joint} is its own ancestor")]
    CyclicParent { joint: usize },
}

#[derive(Debug, Error)]
pub enum SaveClipError {
    #[error("error writing clip file")]
    Io(#[from] std::io::Error),

    #[error("error serializing clip JSON")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq)]
pub enum AppendFrameError {
    #[error("expected {expected} joint transforms but found {actual}")]
    JointCount { expected: usize, actual: usize },

    #[error("timestamp {timestamp} does not follow the previous timestamp {previous}")]
    Timestamp { timestamp: f64, previous: f64 },

    #[error("timestamp {timestamp} is not finite")]
    NonFiniteTimestamp { timestamp: f64 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SkinWeightsError {
    #[error("expected {expected} weights but found {actual}")]
    WeightCount { expected: usize, actual: usize },

    #[error("vertex {vertex_index} references joint {joint_index} but the skeleton has {joint_count} joints")]
    JointIndexOutOfRange {
        vertex_index: usize,
        joint_index: u32,
        joint_count: usize,
    },
}
