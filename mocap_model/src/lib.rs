//! # mocap_model
//! mocap_model replays motion captured joint animation on a model skeleton.
//!
//! Captured frames are sampled from an [AnimationClip],
//! converted to model joints with a [Retargeter],
//! and evaluated to skinning matrices for a [SkeletonHierarchy].
//! The [PlaybackController] runs these steps once per rendered frame.

pub use animation::{AnimationClip, CaptureJoint, ClipRecorder, Frame, PlayMode};
pub use playback::{PlaybackController, PlaybackState, PlaybackStatus};
pub use retarget::Retargeter;
pub use skeleton::{Joint, SkeletonHierarchy};
pub use skinning::{SkinWeights, SkinningBuffer};
pub use transform::Transform;

pub mod animation;
pub mod error;
pub mod playback;
pub mod retarget;
pub mod skeleton;
pub mod skinning;
pub mod transform;
