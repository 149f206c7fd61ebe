/// Speeds are clamped to at least this value so the cursor never stalls.
pub const MIN_PLAYBACK_SPEED: f32 = 0.01;

#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, strum::Display)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

impl Direction {
    pub fn sign(self) -> f32 {
        match self {
            Direction::Forward => 1.0,
            Direction::Reverse => -1.0,
        }
    }
}

/// Notifications produced while playing a clip.
/// These are queued and polled instead of invoking callbacks.
#[derive(Debug, PartialEq, Eq, Clone, Copy, strum::Display)]
pub enum PlaybackEvent {
    Started,
    /// The cursor wrapped past either end of a looping clip.
    Looped,
    /// The cursor reached the end of a clip that does not loop.
    Completed,
    Stopped,
}

#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct PlaybackSettings {
    /// Multiplier for the elapsed time of each step.
    pub speed: f32,
    pub direction: Direction,
    pub looping: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            speed: 1.0,
            direction: Direction::Forward,
            looping: false,
        }
    }
}

impl PlaybackSettings {
    /// The speed clamped to [MIN_PLAYBACK_SPEED].
    pub fn effective_speed(&self) -> f32 {
        // This also replaces NaN.
        self.speed.max(MIN_PLAYBACK_SPEED)
    }
}

/// The current time within a clip during playback.
/// The time is always finite.
#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub struct PlaybackCursor {
    time: f32,
    completed: bool,
}

impl PlaybackCursor {
    /// Non finite times start at 0.
    pub fn new(time: f32) -> Self {
        Self {
            time: if time.is_finite() { time } else { 0.0 },
            completed: false,
        }
    }

    /// The time in seconds since the start of the clip.
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Move the cursor to `time` in seconds.
    /// Non finite times are ignored.
    pub fn seek(&mut self, time: f32) {
        if time.is_finite() {
            self.time = time;
            self.completed = false;
        }
    }

    /// Move the cursor by `delta_time` seconds of elapsed time
    /// for a clip lasting `duration` seconds.
    ///
    /// Non looping playback stops at the end in the direction of playback
    /// and reports [PlaybackEvent::Completed] once until the cursor leaves the end again.
    pub fn advance(
        &mut self,
        delta_time: f32,
        settings: &PlaybackSettings,
        duration: f32,
    ) -> Option<PlaybackEvent> {
        if duration <= 0.0 || !duration.is_finite() {
            self.time = 0.0;
            return if settings.looping {
                None
            } else {
                self.complete()
            };
        }

        // Negative or invalid deltas from the frame clock are ignored.
        let delta_time = if delta_time.is_finite() {
            delta_time.max(0.0)
        } else {
            0.0
        };
        let target =
            self.time + delta_time * settings.effective_speed() * settings.direction.sign();
        if !target.is_finite() {
            // Keep the previous time so later steps can still advance.
            return None;
        }

        if settings.looping {
            self.completed = false;
            if !(0.0..duration).contains(&target) {
                let time = target.rem_euclid(duration);
                self.time = if time >= duration { 0.0 } else { time };
                Some(PlaybackEvent::Looped)
            } else {
                self.time = target;
                None
            }
        } else {
            self.time = target.clamp(0.0, duration);
            let at_end = match settings.direction {
                Direction::Forward => self.time >= duration,
                Direction::Reverse => self.time <= 0.0,
            };
            if at_end {
                self.complete()
            } else {
                self.completed = false;
                None
            }
        }
    }

    fn complete(&mut self) -> Option<PlaybackEvent> {
        if self.completed {
            None
        } else {
            self.completed = true;
            Some(PlaybackEvent::Completed)
        }
    }
}
