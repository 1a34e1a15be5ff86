use glam::{Quat, Vec3};
use rustc_hash::FxHashMap;

use marionette_core::BoneTransform;

use crate::tracks::{KeyframeCursor, KeyframeTrack};

/// Keyframe tracks driving a single bone. Missing tracks leave that
/// component at the bone's bind value.
#[derive(Debug, Clone)]
pub struct BoneChannel {
    pub bone: usize,
    pub translation: Option<KeyframeTrack<Vec3>>,
    pub rotation: Option<KeyframeTrack<Quat>>,
    pub scale: Option<KeyframeTrack<Vec3>>,
}

impl BoneChannel {
    #[must_use]
    pub fn new(bone: usize) -> Self {
        Self {
            bone,
            translation: None,
            rotation: None,
            scale: None,
        }
    }

    #[must_use]
    pub fn with_translation(mut self, track: KeyframeTrack<Vec3>) -> Self {
        self.translation = Some(track);
        self
    }

    #[must_use]
    pub fn with_rotation(mut self, track: KeyframeTrack<Quat>) -> Self {
        self.rotation = Some(track);
        self
    }

    #[must_use]
    pub fn with_scale(mut self, track: KeyframeTrack<Vec3>) -> Self {
        self.scale = Some(track);
        self
    }

    fn end_time(&self) -> f32 {
        let t = self.translation.as_ref().map_or(0.0, KeyframeTrack::end_time);
        let r = self.rotation.as_ref().map_or(0.0, KeyframeTrack::end_time);
        let s = self.scale.as_ref().map_or(0.0, KeyframeTrack::end_time);
        t.max(r).max(s)
    }

    /// Samples the channel at `time`, filling untracked components from `bind`.
    pub fn sample(
        &self,
        time: f32,
        bind: &BoneTransform,
        cursors: &mut ChannelCursors,
    ) -> BoneTransform {
        BoneTransform {
            translation: self
                .translation
                .as_ref()
                .and_then(|track| track.sample_with_cursor(time, &mut cursors.translation))
                .unwrap_or(bind.translation),
            rotation: self
                .rotation
                .as_ref()
                .and_then(|track| track.sample_with_cursor(time, &mut cursors.rotation))
                .unwrap_or(bind.rotation),
            scale: self
                .scale
                .as_ref()
                .and_then(|track| track.sample_with_cursor(time, &mut cursors.scale))
                .unwrap_or(bind.scale),
        }
    }
}

/// Sampling cursors for the three tracks of one channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelCursors {
    pub translation: KeyframeCursor,
    pub rotation: KeyframeCursor,
    pub scale: KeyframeCursor,
}

/// A named, immutable set of per-bone keyframe channels.
#[derive(Debug, Clone)]
pub struct AnimationClip {
    pub name: String,
    /// Length in seconds.
    pub duration: f32,
    /// Whether the clip is authored to loop seamlessly. Used as the default
    /// loop flag of playback states created for it.
    pub looping: bool,
    pub channels: Vec<BoneChannel>,
    bone_lookup: FxHashMap<usize, usize>,
}

impl AnimationClip {
    /// Creates a clip whose duration is the time of its last keyframe.
    #[must_use]
    pub fn new(name: impl Into<String>, channels: Vec<BoneChannel>) -> Self {
        let duration = channels
            .iter()
            .map(BoneChannel::end_time)
            .fold(0.0_f32, f32::max);
        Self::with_duration(name, duration, channels)
    }

    /// Creates a clip with an explicit duration (which may extend past the
    /// last keyframe, holding the final values).
    #[must_use]
    pub fn with_duration(name: impl Into<String>, duration: f32, channels: Vec<BoneChannel>) -> Self {
        let name = name.into();
        let mut bone_lookup = FxHashMap::default();
        for (index, channel) in channels.iter().enumerate() {
            if bone_lookup.insert(channel.bone, index).is_some() {
                log::warn!(
                    "Clip '{name}': bone {} has more than one channel, last one wins",
                    channel.bone
                );
            }
        }

        let duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
        if duration == 0.0 {
            log::warn!("Clip '{name}' has zero duration");
        }

        Self {
            name,
            duration,
            looping: false,
            channels,
            bone_lookup,
        }
    }

    #[must_use]
    pub fn looped(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Index into [`channels`](Self::channels) of the channel driving `bone`.
    #[inline]
    #[must_use]
    pub fn channel_index(&self, bone: usize) -> Option<usize> {
        self.bone_lookup.get(&bone).copied()
    }

    #[inline]
    #[must_use]
    pub fn channel_for_bone(&self, bone: usize) -> Option<&BoneChannel> {
        self.channel_index(bone).map(|index| &self.channels[index])
    }

    /// Highest bone index referenced by any channel.
    #[must_use]
    pub fn max_bone(&self) -> Option<usize> {
        self.channels.iter().map(|c| c.bone).max()
    }

    /// Maps an arbitrary time into the clip's range: wraps into
    /// `[0, duration)` when `looping`, clamps into `[0, duration]` otherwise.
    #[must_use]
    pub fn normalize_time(&self, time: f32, looping: bool) -> f32 {
        if self.duration <= 0.0 {
            return 0.0;
        }
        if looping {
            wrap_time(time, self.duration)
        } else if time.is_nan() {
            0.0
        } else {
            time.clamp(0.0, self.duration)
        }
    }
}

/// Wraps `time` into `[0, duration)`. `duration` must be positive.
#[inline]
#[must_use]
pub(crate) fn wrap_time(time: f32, duration: f32) -> f32 {
    if !time.is_finite() {
        return 0.0;
    }
    let wrapped = time.rem_euclid(duration);
    // rem_euclid can round up to `duration` for tiny negative inputs.
    if wrapped >= duration { 0.0 } else { wrapped }
}
