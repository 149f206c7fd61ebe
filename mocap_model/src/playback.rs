//! Playback controls for replaying a clip on a model skeleton.
//!
//! Each tick runs the full pipeline on the calling thread:
//! sample the clip, retarget the captured joints, and evaluate the skinning matrices.
//! Controls are safe to call in any state. Invalid transitions do nothing.
use std::collections::VecDeque;
use std::sync::Arc;

use glam::Mat4;
use log::{debug, error, warn};

use crate::animation::{
    AnimationClip, Direction, MIN_PLAYBACK_SPEED, PlayMode, PlaybackCursor, PlaybackEvent,
    PlaybackSettings,
};
use crate::error::InvalidSkeletonError;
use crate::retarget::Retargeter;
use crate::skeleton::SkeletonHierarchy;
use crate::skinning::SkinningBuffer;

/// Older events are discarded if the queue is never drained.
const MAX_QUEUED_EVENTS: usize = 256;

/// An active clip and its time cursor.
#[derive(Debug, PartialEq, Clone)]
pub struct Playback {
    pub clip: Arc<AnimationClip>,
    pub cursor: PlaybackCursor,
}

#[derive(Debug, PartialEq, Clone, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing(Playback),
    Paused(Playback),
}

/// [PlaybackState] without the associated data.
#[derive(Debug, PartialEq, Eq, Clone, Copy, strum::Display)]
pub enum PlaybackStatus {
    Stopped,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn status(&self) -> PlaybackStatus {
        match self {
            PlaybackState::Stopped => PlaybackStatus::Stopped,
            PlaybackState::Playing(_) => PlaybackStatus::Playing,
            PlaybackState::Paused(_) => PlaybackStatus::Paused,
        }
    }

    pub fn playback(&self) -> Option<&Playback> {
        match self {
            PlaybackState::Stopped => None,
            PlaybackState::Playing(p) | PlaybackState::Paused(p) => Some(p),
        }
    }

    fn playback_mut(&mut self) -> Option<&mut Playback> {
        match self {
            PlaybackState::Stopped => None,
            PlaybackState::Playing(p) | PlaybackState::Paused(p) => Some(p),
        }
    }
}

/// Drives a [SkinningBuffer] from an [AnimationClip] once per rendered frame.
#[derive(Debug)]
pub struct PlaybackController {
    skeleton: Arc<SkeletonHierarchy>,
    retargeter: Arc<Retargeter>,
    state: PlaybackState,
    settings: PlaybackSettings,
    buffer: SkinningBuffer,
    events: VecDeque<PlaybackEvent>,
    tick_events: Vec<PlaybackEvent>,
}

impl PlaybackController {
    /// Create a stopped controller for `skeleton`.
    /// The skinning buffer has `capacity` matrices to match the renderer.
    pub fn new(
        skeleton: Arc<SkeletonHierarchy>,
        retargeter: Arc<Retargeter>,
        capacity: usize,
    ) -> Self {
        if skeleton.len() > capacity {
            warn!(
                "Skeleton with {} joints exceeds the skinning buffer capacity of {capacity}.",
                skeleton.len()
            );
        }

        Self {
            skeleton,
            retargeter,
            state: PlaybackState::Stopped,
            settings: PlaybackSettings::default(),
            buffer: SkinningBuffer::new(capacity),
            events: VecDeque::new(),
            tick_events: Vec::new(),
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn status(&self) -> PlaybackStatus {
        self.state.status()
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.settings
    }

    pub fn skeleton(&self) -> &Arc<SkeletonHierarchy> {
        &self.skeleton
    }

    /// The time cursor of the active clip in seconds.
    pub fn current_time(&self) -> Option<f32> {
        self.state.playback().map(|p| p.cursor.time())
    }

    /// The most recently evaluated skinning matrices.
    pub fn pose(&self) -> &[Mat4] {
        self.buffer.as_slice()
    }

    pub fn buffer(&self) -> &SkinningBuffer {
        &self.buffer
    }

    /// Start playing `clip` from the beginning.
    pub fn play(&mut self, clip: Arc<AnimationClip>) {
        self.play_from(clip, 0.0);
    }

    /// Start playing `clip` from `offset` in seconds.
    pub fn play_from(&mut self, clip: Arc<AnimationClip>, offset: f32) {
        debug!("Playing {:?} from {offset}.", clip.name);
        self.state = PlaybackState::Playing(Playback {
            clip,
            cursor: PlaybackCursor::new(offset),
        });
        self.push_event(PlaybackEvent::Started);
    }

    pub fn pause(&mut self) {
        self.state = match std::mem::take(&mut self.state) {
            PlaybackState::Playing(playback) => PlaybackState::Paused(playback),
            state => state,
        };
    }

    pub fn resume(&mut self) {
        self.state = match std::mem::take(&mut self.state) {
            PlaybackState::Paused(playback) => PlaybackState::Playing(playback),
            state => state,
        };
    }

    /// Clear the active clip and reset all playback settings.
    /// The last evaluated pose is kept.
    pub fn stop(&mut self) {
        let previous = std::mem::take(&mut self.state);
        self.settings = PlaybackSettings::default();
        if previous != PlaybackState::Stopped {
            self.push_event(PlaybackEvent::Stopped);
        }
    }

    /// Move the cursor of the active clip to `time` in seconds.
    pub fn seek(&mut self, time: f32) {
        if let Some(playback) = self.state.playback_mut() {
            playback.cursor.seek(time);
        }
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.settings.speed = speed.max(MIN_PLAYBACK_SPEED);
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.settings.direction = direction;
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.settings.looping = looping;
    }

    /// Use a newly loaded skeleton if it built successfully.
    /// The previous skeleton stays active on error.
    pub fn replace_skeleton(
        &mut self,
        skeleton: Result<SkeletonHierarchy, InvalidSkeletonError>,
    ) -> Result<(), InvalidSkeletonError> {
        match skeleton {
            Ok(skeleton) => {
                self.skeleton = Arc::new(skeleton);
                self.buffer.reset();
                Ok(())
            }
            Err(e) => {
                error!("Keeping the previous skeleton: {e}");
                Err(e)
            }
        }
    }

    pub fn set_retargeter(&mut self, retargeter: Arc<Retargeter>) {
        self.retargeter = retargeter;
    }

    /// Advance playback by `delta_time` seconds and return the skinning matrices.
    ///
    /// This does nothing and returns the previous pose unless a clip is playing.
    pub fn update(&mut self, delta_time: f32) -> &[Mat4] {
        self.tick_events.clear();

        let PlaybackState::Playing(playback) = &mut self.state else {
            return self.buffer.as_slice();
        };

        let event = playback
            .cursor
            .advance(delta_time, &self.settings, playback.clip.duration);

        let play_mode = PlayMode::from_looping(self.settings.looping);
        let captured = playback.clip.sample(playback.cursor.time(), play_mode);
        let overrides = self.retargeter.retarget_pose(&captured, self.skeleton.len());
        let matrices = crate::skinning::evaluate(&self.skeleton, &[], Some(&overrides));

        if matrices.iter().all(|m| m.is_finite()) {
            self.buffer.write(&matrices);
        } else {
            error!(
                "Holding the previous pose for non finite skinning matrices at {} seconds.",
                playback.cursor.time()
            );
        }

        if let Some(event) = event {
            self.push_event(event);
        }

        self.buffer.as_slice()
    }

    /// Remove and return all events since the previous call.
    pub fn drain_events(&mut self) -> Vec<PlaybackEvent> {
        self.events.drain(..).collect()
    }

    /// `true` if the most recent [update](Self::update) wrapped a looping clip.
    pub fn did_loop_since_last_tick(&self) -> bool {
        self.tick_events.contains(&PlaybackEvent::Looped)
    }

    /// `true` if the most recent [update](Self::update) reached the end of the clip.
    pub fn did_complete_since_last_tick(&self) -> bool {
        self.tick_events.contains(&PlaybackEvent::Completed)
    }

    fn push_event(&mut self, event: PlaybackEvent) {
        if self.events.len() >= MAX_QUEUED_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(event);
        self.tick_events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::SystemTime;

    use glam::{Vec3, vec3};
    use pretty_assertions::assert_eq;

    use crate::animation::{CaptureJoint, Frame};
    use crate::transform::rotation_degrees;

    fn skeleton() -> Arc<SkeletonHierarchy> {
        Arc::new(
            SkeletonHierarchy::build(
                &["root", "root/child"],
                &[Mat4::IDENTITY; 2],
                &[Mat4::IDENTITY; 2],
                Mat4::IDENTITY,
            )
            .unwrap(),
        )
    }

    fn controller() -> PlaybackController {
        PlaybackController::new(
            skeleton(),
            Arc::new(Retargeter::new([(0, 0), (1, 1)], Mat4::IDENTITY)),
            4,
        )
    }

    fn clip(duration: f32, frames: Vec<Vec<Option<Mat4>>>) -> Arc<AnimationClip> {
        let count = frames.len().max(2) - 1;
        Arc::new(AnimationClip {
            name: "clip".to_string(),
            frames_per_second: 30.0,
            duration,
            created_at: SystemTime::UNIX_EPOCH,
            joints: ["root", "root/child"]
                .into_iter()
                .map(|path| CaptureJoint {
                    name: path.rsplit('/').next().unwrap_or(path).into(),
                    path: path.into(),
                    parent_index: None,
                    bind_transform: Mat4::IDENTITY,
                    rest_transform: Mat4::IDENTITY,
                })
                .collect(),
            frames: frames
                .into_iter()
                .enumerate()
                .map(|(i, transforms)| Frame {
                    timestamp: duration * i as f32 / count as f32,
                    transforms,
                })
                .collect(),
        })
    }

    fn translation_clip() -> Arc<AnimationClip> {
        clip(
            1.0,
            vec![
                vec![Some(Mat4::IDENTITY), Some(Mat4::IDENTITY)],
                vec![
                    Some(Mat4::from_translation(vec3(2.0, 0.0, 0.0))),
                    Some(Mat4::IDENTITY),
                ],
            ],
        )
    }

    #[test]
    fn new_controller_stopped() {
        let controller = controller();
        assert_eq!(PlaybackStatus::Stopped, controller.status());
        assert_eq!(None, controller.current_time());
        assert_eq!(&[Mat4::IDENTITY; 4], controller.pose());
    }

    #[test]
    fn pause_resume_transitions() {
        let mut controller = controller();

        controller.pause();
        controller.resume();
        assert_eq!(PlaybackStatus::Stopped, controller.status());

        controller.play(translation_clip());
        assert_eq!(PlaybackStatus::Playing, controller.status());

        controller.resume();
        assert_eq!(PlaybackStatus::Playing, controller.status());

        controller.pause();
        controller.pause();
        assert_eq!(PlaybackStatus::Paused, controller.status());
        assert_eq!(Some(0.0), controller.current_time());

        controller.resume();
        assert_eq!(PlaybackStatus::Playing, controller.status());

        controller.pause();
        controller.play_from(translation_clip(), 0.5);
        assert_eq!(PlaybackStatus::Playing, controller.status());
        assert_eq!(Some(0.5), controller.current_time());
    }

    #[test]
    fn stop_resets_settings() {
        let mut controller = controller();
        controller.set_speed(2.0);
        controller.set_direction(Direction::Reverse);
        controller.set_looping(true);
        controller.play(translation_clip());
        controller.update(0.25);

        controller.stop();
        controller.stop();
        assert_eq!(PlaybackStatus::Stopped, controller.status());
        assert_eq!(None, controller.current_time());
        assert_eq!(&PlaybackSettings::default(), controller.settings());
        assert_eq!(
            vec![
                PlaybackEvent::Started,
                PlaybackEvent::Looped,
                PlaybackEvent::Stopped
            ],
            controller.drain_events()
        );
        assert!(controller.drain_events().is_empty());
    }

    #[test]
    fn stop_keeps_last_pose() {
        let mut controller = controller();
        controller.play(translation_clip());
        let pose = controller.update(0.5).to_vec();
        controller.stop();
        assert_eq!(pose, controller.update(0.5));
    }

    #[test]
    fn update_interpolates_frames() {
        let mut controller = controller();
        controller.play(translation_clip());
        let pose = controller.update(0.5);
        assert!(pose[0].abs_diff_eq(Mat4::from_translation(vec3(1.0, 0.0, 0.0)), 0.0001));
        assert!(pose[1].abs_diff_eq(Mat4::from_translation(vec3(1.0, 0.0, 0.0)), 0.0001));
        assert_eq!(Mat4::IDENTITY, pose[2]);
    }

    #[test]
    fn update_paused_holds_pose() {
        let mut controller = controller();
        controller.play(translation_clip());
        let pose = controller.update(0.25).to_vec();

        controller.pause();
        assert_eq!(pose, controller.update(0.5));
        assert_eq!(Some(0.25), controller.current_time());

        controller.resume();
        controller.update(0.25);
        assert_eq!(Some(0.5), controller.current_time());
    }

    #[test]
    fn update_child_inherits_root_rotation() {
        let rotation = rotation_degrees(Vec3::Y, 90.0);
        let mut controller = controller();
        controller.play(clip(0.0, vec![vec![Some(rotation), Some(Mat4::IDENTITY)]]));

        let pose = controller.update(1.0 / 60.0);
        assert!(pose[0].abs_diff_eq(rotation, 0.0001));
        assert!(pose[1].abs_diff_eq(rotation, 0.0001));
    }

    #[test]
    fn update_looping_events() {
        let mut controller = controller();
        controller.set_looping(true);
        controller.play(translation_clip());

        controller.update(0.75);
        assert!(!controller.did_loop_since_last_tick());

        controller.update(0.5);
        assert!(controller.did_loop_since_last_tick());
        assert_eq!(Some(0.25), controller.current_time());

        controller.update(0.25);
        assert!(!controller.did_loop_since_last_tick());
        assert_eq!(
            vec![PlaybackEvent::Started, PlaybackEvent::Looped],
            controller.drain_events()
        );
    }

    #[test]
    fn update_once_completes_once() {
        let mut controller = controller();
        controller.play(translation_clip());

        controller.update(2.0);
        assert!(controller.did_complete_since_last_tick());
        assert_eq!(PlaybackStatus::Playing, controller.status());
        assert_eq!(Some(1.0), controller.current_time());
        assert!(
            controller.pose()[0].abs_diff_eq(Mat4::from_translation(vec3(2.0, 0.0, 0.0)), 0.0001)
        );

        controller.update(2.0);
        assert!(!controller.did_complete_since_last_tick());
        assert_eq!(
            vec![PlaybackEvent::Started, PlaybackEvent::Completed],
            controller.drain_events()
        );
    }

    #[test]
    fn update_reverse_from_offset() {
        let mut controller = controller();
        controller.set_direction(Direction::Reverse);
        controller.play_from(translation_clip(), 1.0);

        controller.update(0.25);
        assert_eq!(Some(0.75), controller.current_time());
        assert!(
            controller.pose()[0].abs_diff_eq(Mat4::from_translation(vec3(1.5, 0.0, 0.0)), 0.0001)
        );
    }

    #[test]
    fn update_non_finite_holds_pose() {
        let mut controller = controller();
        controller.play(translation_clip());
        let pose = controller.update(0.5).to_vec();

        let invalid = Mat4::from_translation(vec3(f32::NAN, 0.0, 0.0));
        controller.play(clip(0.0, vec![vec![Some(invalid), None]]));
        assert_eq!(pose, controller.update(0.5));
    }

    #[test]
    fn update_recovers_from_non_finite_time() {
        let mut controller = controller();
        controller.play_from(translation_clip(), f32::NAN);
        for _ in 0..5 {
            controller.update(0.1);
        }
        assert!(controller.current_time().is_some_and(f32::is_finite));

        controller.set_looping(true);
        controller.set_speed(f32::INFINITY);
        controller.seek(0.25);
        controller.update(0.1);
        assert_eq!(Some(0.25), controller.current_time());

        controller.set_speed(1.0);
        controller.update(0.25);
        assert_eq!(Some(0.5), controller.current_time());
        assert!(
            controller.pose()[0].abs_diff_eq(Mat4::from_translation(vec3(1.0, 0.0, 0.0)), 0.0001)
        );
    }

    #[test]
    fn seek_requires_clip() {
        let mut controller = controller();
        controller.seek(0.5);
        assert_eq!(None, controller.current_time());

        controller.play(translation_clip());
        controller.pause();
        controller.seek(0.5);
        assert_eq!(Some(0.5), controller.current_time());
    }

    #[test]
    fn set_speed_clamped() {
        let mut controller = controller();
        controller.set_speed(-1.0);
        assert_eq!(MIN_PLAYBACK_SPEED, controller.settings().speed);
    }

    #[test]
    fn replace_skeleton_invalid_keeps_previous() {
        let mut controller = controller();
        assert_eq!(
            Err(InvalidSkeletonError::Empty),
            controller.replace_skeleton(Err(InvalidSkeletonError::Empty))
        );
        assert_eq!(2, controller.skeleton().len());
    }

    #[test]
    fn replace_skeleton_resets_pose() {
        let mut controller = controller();
        controller.play(translation_clip());
        controller.update(0.5);

        let skeleton = SkeletonHierarchy::build(
            &["root"],
            &[Mat4::IDENTITY],
            &[Mat4::IDENTITY],
            Mat4::IDENTITY,
        );
        assert_eq!(Ok(()), controller.replace_skeleton(skeleton));
        assert_eq!(1, controller.skeleton().len());
        assert_eq!(&[Mat4::IDENTITY; 4], controller.pose());
    }
}
