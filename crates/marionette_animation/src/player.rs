use std::sync::Arc;

use slotmap::SlotMap;

use marionette_core::{AnimationError, BlendAccumulator, Result};

use crate::clip::AnimationClip;
use crate::playback::{PlaybackEvent, PlaybackState, sanitize_dt};
use crate::pose::Pose;
use crate::settings::PlayerSettings;
use crate::skeleton::Skeleton;

slotmap::new_key_type! {
    /// Handle to a playback state owned by an [`AnimationPlayer`].
    pub struct StateHandle;
}

/// Plays any number of clips (up to a fixed capacity) on one skeleton and
/// blends them by weight into a single pose.
///
/// Per bone, the states whose clips animate that bone contribute in
/// proportion to their weights; a bone no weighted state touches keeps its
/// bind-pose transform.
pub struct AnimationPlayer {
    skeleton: Arc<Skeleton>,
    states: SlotMap<StateHandle, PlaybackState>,
    max_states: usize,

    pose: Pose,
    accumulators: Vec<BlendAccumulator>,
    events: Vec<(StateHandle, PlaybackEvent)>,
}

impl AnimationPlayer {
    #[must_use]
    pub fn new(skeleton: Arc<Skeleton>) -> Self {
        Self::with_settings(skeleton, PlayerSettings::default())
    }

    #[must_use]
    pub fn with_settings(skeleton: Arc<Skeleton>, settings: PlayerSettings) -> Self {
        let bone_count = skeleton.bone_count();
        Self {
            pose: skeleton.bind_pose().clone(),
            accumulators: vec![BlendAccumulator::default(); bone_count],
            states: SlotMap::with_capacity_and_key(settings.max_states),
            max_states: settings.max_states,
            events: Vec::with_capacity(settings.max_states),
            skeleton,
        }
    }

    #[inline]
    #[must_use]
    pub fn skeleton(&self) -> &Arc<Skeleton> {
        &self.skeleton
    }

    /// The pose computed by the last [`update`](Self::update) or
    /// [`compute_pose`](Self::compute_pose); bind pose before the first one.
    #[inline]
    #[must_use]
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.max_states
    }

    /// Starts playing `clip` with the given parameters.
    pub fn add_state(
        &mut self,
        clip: Arc<AnimationClip>,
        weight: f32,
        looping: bool,
        speed: f32,
    ) -> Result<StateHandle> {
        let state = PlaybackState::new(clip)
            .with_looping(looping)
            .with_speed(speed)
            .with_weight(weight);
        self.add_playback(state)
    }

    /// Adds a fully configured playback state.
    pub fn add_playback(&mut self, state: PlaybackState) -> Result<StateHandle> {
        if self.states.len() >= self.max_states {
            return Err(AnimationError::capacity("player states", self.max_states));
        }
        check_clip_fits(&self.skeleton, state.clip())?;

        let handle = self.states.insert(state);
        log::debug!("AnimationPlayer: added state {handle:?}");
        Ok(handle)
    }

    pub fn remove_state(&mut self, handle: StateHandle) -> Result<PlaybackState> {
        self.states.remove(handle).ok_or_else(|| invalid_handle(handle))
    }

    pub fn state(&self, handle: StateHandle) -> Result<&PlaybackState> {
        self.states.get(handle).ok_or_else(|| invalid_handle(handle))
    }

    pub fn state_mut(&mut self, handle: StateHandle) -> Result<&mut PlaybackState> {
        self.states.get_mut(handle).ok_or_else(|| invalid_handle(handle))
    }

    pub fn states(&self) -> impl Iterator<Item = (StateHandle, &PlaybackState)> {
        self.states.iter()
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, handle: StateHandle) -> bool {
        self.states.contains_key(handle)
    }

    // ========================================================================
    // Mutators (take effect on the next update)
    // ========================================================================

    pub fn set_weight(&mut self, handle: StateHandle, weight: f32) -> Result<()> {
        self.state_mut(handle)?.weight = weight;
        Ok(())
    }

    pub fn set_speed(&mut self, handle: StateHandle, speed: f32) -> Result<()> {
        self.state_mut(handle)?.speed = speed;
        Ok(())
    }

    pub fn set_loop(&mut self, handle: StateHandle, looping: bool) -> Result<()> {
        self.state_mut(handle)?.looping = looping;
        Ok(())
    }

    pub fn set_time(&mut self, handle: StateHandle, time: f32) -> Result<()> {
        self.state_mut(handle)?.set_time(time);
        Ok(())
    }

    pub fn play(&mut self, handle: StateHandle) -> Result<()> {
        self.state_mut(handle)?.playing = true;
        Ok(())
    }

    pub fn pause(&mut self, handle: StateHandle) -> Result<()> {
        self.state_mut(handle)?.playing = false;
        Ok(())
    }

    /// Pauses and rewinds.
    pub fn stop(&mut self, handle: StateHandle) -> Result<()> {
        self.state_mut(handle)?.stop();
        Ok(())
    }

    /// Rewinds without changing the play flag; clears the finished latch.
    pub fn rewind(&mut self, handle: StateHandle) -> Result<()> {
        self.state_mut(handle)?.rewind();
        Ok(())
    }

    // ========================================================================
    // Per-frame
    // ========================================================================

    /// Advances every playing state, then recomputes the blended pose.
    pub fn update(&mut self, dt: f32) {
        self.advance(dt);
        self.compute_pose();
    }

    /// Advances every playing state's time cursor by `dt`. Negative or
    /// non-finite deltas leave every cursor where it is.
    pub fn advance(&mut self, dt: f32) {
        let dt = sanitize_dt(dt);
        self.events.clear();
        for (handle, state) in &mut self.states {
            if let Some(event) = state.advance(dt) {
                log::trace!("AnimationPlayer: {handle:?} {event:?}");
                self.events.push((handle, event));
            }
        }
    }

    /// Samples every state with positive weight at its current time and
    /// blends the results. Paused states still contribute their held pose.
    pub fn compute_pose(&mut self) {
        for acc in &mut self.accumulators {
            acc.clear();
        }

        let bind = self.skeleton.bind_pose();
        for state in self.states.values_mut() {
            state.accumulate(bind, &mut self.accumulators);
        }

        let out = self.pose.transforms_mut();
        for (bone, acc) in self.accumulators.iter().enumerate() {
            out[bone] = acc.resolve().unwrap_or(bind.transforms()[bone]);
        }
    }

    /// Events raised by the most recent [`advance`](Self::advance).
    #[inline]
    #[must_use]
    pub fn events(&self) -> &[(StateHandle, PlaybackEvent)] {
        &self.events
    }

    /// Hands the pending events to the caller, leaving the queue empty.
    pub fn drain_events(&mut self) -> std::vec::Drain<'_, (StateHandle, PlaybackEvent)> {
        self.events.drain(..)
    }
}

fn invalid_handle(handle: StateHandle) -> AnimationError {
    use slotmap::Key;
    // The slot index is the low half of the packed key.
    AnimationError::invalid("player state", (handle.data().as_ffi() & 0xffff_ffff) as usize)
}

/// Rejects clips that animate bones the skeleton does not have.
pub(crate) fn check_clip_fits(skeleton: &Skeleton, clip: &AnimationClip) -> Result<()> {
    match clip.max_bone() {
        Some(max) if max >= skeleton.bone_count() => Err(AnimationError::SkeletonMismatch {
            expected: skeleton.bone_count(),
            found: max + 1,
        }),
        _ => Ok(()),
    }
}
