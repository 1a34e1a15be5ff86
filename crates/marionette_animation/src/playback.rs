use std::sync::Arc;

use marionette_core::{BlendAccumulator, BoneTransform};

use crate::clip::{AnimationClip, ChannelCursors, wrap_time};
use crate::pose::Pose;

/// Notable moments reported while advancing a playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// A looping state wrapped around its clip.
    Looped,
    /// A non-looping state reached the end of its clip.
    Finished,
}

/// Clamps a frame delta to a finite, non-negative value.
#[inline]
#[must_use]
pub fn sanitize_dt(dt: f32) -> f32 {
    if dt.is_finite() { dt.max(0.0) } else { 0.0 }
}

/// Time cursor and blend parameters of one clip being played.
///
/// Pure value type: advancing and sampling touch nothing but the state
/// itself and the output buffers passed in.
#[derive(Debug, Clone)]
pub struct PlaybackState {
    clip: Arc<AnimationClip>,

    time: f32,
    finished: bool,

    /// Multiplier applied to `dt`. Negative values play backwards.
    pub speed: f32,
    /// Blend weight, expected in `[0, 1]`.
    pub weight: f32,
    pub looping: bool,
    pub playing: bool,

    /// Part of the last advance's `dt` left unplayed because the cursor
    /// stopped at the clip's end.
    leftover: f32,
    /// Times a looping cursor went around during the last advance.
    wraps: u32,

    cursors: Vec<ChannelCursors>,
}

impl PlaybackState {
    /// A playing state at time 0 with the clip's own loop flag.
    #[must_use]
    pub fn new(clip: Arc<AnimationClip>) -> Self {
        let channel_count = clip.channels.len();
        let looping = clip.looping;
        Self {
            clip,
            time: 0.0,
            finished: false,
            speed: 1.0,
            weight: 1.0,
            looping,
            playing: true,
            leftover: 0.0,
            wraps: 0,
            cursors: vec![ChannelCursors::default(); channel_count],
        }
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self.rewind();
        self
    }

    #[must_use]
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    #[inline]
    #[must_use]
    pub fn clip(&self) -> &Arc<AnimationClip> {
        &self.clip
    }

    #[inline]
    #[must_use]
    pub fn duration(&self) -> f32 {
        self.clip.duration
    }

    #[inline]
    #[must_use]
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Whether a non-looping state has reached its end. Stays set until
    /// [`rewind`](Self::rewind) or a [`set_time`](Self::set_time) that moves
    /// the cursor back. Looping states never report finished.
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished && !self.looping
    }

    /// Seconds of the last [`advance`](Self::advance) that were not played
    /// because a non-looping cursor reached its end.
    #[inline]
    #[must_use]
    pub fn leftover(&self) -> f32 {
        self.leftover
    }

    /// How many times a looping cursor wrapped during the last
    /// [`advance`](Self::advance).
    #[inline]
    #[must_use]
    pub fn wraps(&self) -> u32 {
        self.wraps
    }

    /// Playback time normalized by duration, in `[0, 1]`.
    #[must_use]
    pub fn phase(&self) -> f32 {
        if self.clip.duration > 0.0 {
            self.time / self.clip.duration
        } else {
            0.0
        }
    }

    /// Moves the cursor to `phase * duration`.
    pub fn set_phase(&mut self, phase: f32) {
        self.set_time(phase * self.clip.duration);
    }

    /// Moves the cursor; wraps for looping states, clamps otherwise.
    pub fn set_time(&mut self, time: f32) {
        self.time = self.clip.normalize_time(time, self.looping);
        self.finished = self.finished && self.at_end();
    }

    /// Puts the cursor back at the start of the playback direction and
    /// clears the finished latch.
    pub fn rewind(&mut self) {
        self.time = if self.speed >= 0.0 {
            0.0
        } else {
            self.clip.duration
        };
        self.finished = false;
        self.leftover = 0.0;
        self.wraps = 0;
        for cursor in &mut self.cursors {
            *cursor = ChannelCursors::default();
        }
    }

    /// Pauses and rewinds.
    pub fn stop(&mut self) {
        self.playing = false;
        self.rewind();
    }

    fn at_end(&self) -> bool {
        if self.speed >= 0.0 {
            self.time >= self.clip.duration
        } else {
            self.time <= 0.0
        }
    }

    /// Advances the cursor by `dt * speed`. Negative or non-finite `dt`
    /// counts as zero.
    pub fn advance(&mut self, dt: f32) -> Option<PlaybackEvent> {
        self.leftover = 0.0;
        self.wraps = 0;
        if !self.playing {
            return None;
        }

        let dt = sanitize_dt(dt);
        let duration = self.clip.duration;
        if duration <= 0.0 {
            self.time = 0.0;
            self.leftover = dt;
            return self.latch_finished();
        }

        let step = dt * self.speed;
        if step == 0.0 || !step.is_finite() {
            return None;
        }
        let time = self.time + step;

        if self.looping {
            self.time = wrap_time(time, duration);
            self.wraps = time.div_euclid(duration).abs() as u32;
            (self.wraps > 0).then_some(PlaybackEvent::Looped)
        } else if self.speed > 0.0 && time >= duration {
            self.leftover = (time - duration) / self.speed;
            self.time = duration;
            self.latch_finished()
        } else if self.speed < 0.0 && time <= 0.0 {
            self.leftover = time / self.speed;
            self.time = 0.0;
            self.latch_finished()
        } else {
            self.time = time.clamp(0.0, duration);
            None
        }
    }

    fn latch_finished(&mut self) -> Option<PlaybackEvent> {
        if self.looping || self.finished {
            return None;
        }
        self.finished = true;
        Some(PlaybackEvent::Finished)
    }

    /// Samples the clip at the current time into `out`. Bones the clip does
    /// not animate get their transform from `bind`.
    pub fn sample_into(&mut self, bind: &Pose, out: &mut Pose) {
        out.copy_from(bind);
        let bone_count = bind.len();
        let transforms = out.transforms_mut();

        for (channel, cursors) in self.clip.channels.iter().zip(&mut self.cursors) {
            if channel.bone >= bone_count {
                continue;
            }
            let bind_local = bind.transforms()[channel.bone];
            transforms[channel.bone] = channel.sample(self.time, &bind_local, cursors);
        }
    }

    /// Samples the clip and adds every animated bone to its accumulator with
    /// this state's weight. Returns `false` without sampling when the weight
    /// is not positive or is NaN.
    pub fn accumulate(&mut self, bind: &Pose, accumulators: &mut [BlendAccumulator]) -> bool {
        if self.weight.is_nan() || self.weight <= 0.0 {
            return false;
        }

        for (channel, cursors) in self.clip.channels.iter().zip(&mut self.cursors) {
            let Some(acc) = accumulators.get_mut(channel.bone) else {
                continue;
            };
            let bind_local = bind
                .get(channel.bone)
                .copied()
                .unwrap_or(BoneTransform::IDENTITY);
            acc.add(&channel.sample(self.time, &bind_local, cursors), self.weight);
        }
        true
    }
}
