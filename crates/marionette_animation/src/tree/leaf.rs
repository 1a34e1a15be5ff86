use std::fmt;
use std::sync::Arc;

use marionette_core::BoneTransform;

use crate::clip::{AnimationClip, ChannelCursors};
use crate::playback::{PlaybackEvent, PlaybackState};
use crate::player::StateHandle;
use crate::pose::Pose;
use crate::root_motion::{RootMotion, RootTrack};
use crate::tree::node::NodeStatus;
use crate::tree::{PlayerId, PlayerSlot};

/// Called for every bone a clip-backed leaf outputs, right after sampling,
/// with the leaf's playback state. May rewrite the transform.
pub type LeafCallback = Box<dyn FnMut(&PlaybackState, usize, &mut BoneTransform) + Send>;

/// Playback parameters of a clip-backed leaf.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeafParams {
    pub speed: f32,
    /// `None` keeps the clip's own loop flag.
    pub looping: Option<bool>,
    /// A looping leaf normally never finishes. With `looper` set it reports
    /// finished once it reaches the point where the fade of the edge about
    /// to leave it must start: `duration - cross_fade`.
    pub looper: bool,
}

impl Default for LeafParams {
    #[inline]
    fn default() -> Self {
        Self {
            speed: 1.0,
            looping: None,
            looper: false,
        }
    }
}

/// Where a leaf gets its pose from.
#[derive(Debug)]
pub enum LeafSource {
    /// A clip played by a state private to this leaf.
    Clip(PlaybackState),
    /// A player registered with the tree. The leaf outputs the player's
    /// blended pose and reports `state`'s completion.
    Player { player: PlayerId, state: StateHandle },
}

/// Terminal node of the tree.
pub struct LeafNode {
    pub(crate) source: LeafSource,
    pub(crate) looper: bool,
    pub(crate) callback: Option<LeafCallback>,
    root: Option<RootTrack>,
}

impl fmt::Debug for LeafNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafNode")
            .field("source", &self.source)
            .field("looper", &self.looper)
            .field("callback", &self.callback.is_some())
            .finish_non_exhaustive()
    }
}

impl LeafNode {
    pub(crate) fn from_clip(clip: Arc<AnimationClip>, params: LeafParams) -> Self {
        let looping = params.looping.unwrap_or(clip.looping);
        let state = PlaybackState::new(clip)
            .with_looping(looping)
            .with_speed(params.speed);
        Self {
            source: LeafSource::Clip(state),
            looper: params.looper,
            callback: None,
            root: None,
        }
    }

    pub(crate) fn from_player(player: PlayerId, state: StateHandle) -> Self {
        Self {
            source: LeafSource::Player { player, state },
            looper: false,
            callback: None,
            root: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_looper(&self) -> bool {
        self.looper
    }

    /// Prepares root motion measurement for `bone`, or turns it off.
    /// Player-backed leaves never measure root motion.
    pub(crate) fn track_root(&mut self, bone: Option<usize>, bind: &Pose) {
        let LeafSource::Clip(state) = &self.source else {
            return;
        };
        self.root = bone.map(|bone| {
            let bind_local = bind.get(bone).copied().unwrap_or(BoneTransform::IDENTITY);
            let clip = state.clip();
            let sample = |time: f32| {
                clip.channel_for_bone(bone).map_or(bind_local, |channel| {
                    channel.sample(time, &bind_local, &mut ChannelCursors::default())
                })
            };
            let mut track = RootTrack::new(sample(0.0), sample(clip.duration));
            track.restart(state.speed >= 0.0);
            track
        });
    }

    /// Advances the private playback state by `dt` and samples it into
    /// `pose`. `lead` is the cross-fade of the edge that would leave this
    /// leaf next; a looper leaf finishes that long before its loop point.
    pub(crate) fn evaluate_clip(
        &mut self,
        dt: f32,
        lead: f32,
        bind: &Pose,
        root_bone: Option<usize>,
        pose: &mut Pose,
    ) -> (NodeStatus, RootMotion) {
        let Self {
            source,
            looper,
            callback,
            root,
        } = self;
        let LeafSource::Clip(state) = source else {
            pose.copy_from(bind);
            return (NodeStatus::default(), RootMotion::IDENTITY);
        };

        let event = state.advance(dt);
        state.sample_into(bind, pose);
        if let Some(callback) = callback {
            for (bone, transform) in pose.transforms_mut().iter_mut().enumerate() {
                callback(state, bone, transform);
            }
        }

        let motion = match (root_bone, root.as_mut()) {
            (Some(bone), Some(track)) => pose.get(bone).map_or(RootMotion::IDENTITY, |current| {
                track.measure(current, state.wraps(), state.speed >= 0.0)
            }),
            _ => RootMotion::IDENTITY,
        };

        let loop_point = *looper && state.looping && dt > 0.0 && reached_loop_point(state, event, lead);
        let status = NodeStatus {
            finished: state.is_finished() || loop_point,
            leftover: state.leftover(),
        };
        (status, motion)
    }

    #[inline]
    #[must_use]
    pub fn source(&self) -> &LeafSource {
        &self.source
    }

    /// The private playback state of a clip-backed leaf.
    #[must_use]
    pub fn playback(&self) -> Option<&PlaybackState> {
        match &self.source {
            LeafSource::Clip(state) => Some(state),
            LeafSource::Player { .. } => None,
        }
    }

    #[must_use]
    pub fn playback_mut(&mut self) -> Option<&mut PlaybackState> {
        match &mut self.source {
            LeafSource::Clip(state) => Some(state),
            LeafSource::Player { .. } => None,
        }
    }

    pub(crate) fn phase(&self, players: &[PlayerSlot]) -> Option<f32> {
        match &self.source {
            LeafSource::Clip(state) => Some(state.phase()),
            LeafSource::Player { player, state } => players
                .get(player.index())
                .and_then(|slot| slot.player.state(*state).ok())
                .map(PlaybackState::phase),
        }
    }

    pub(crate) fn set_phase(&mut self, phase: f32, players: &mut [PlayerSlot]) {
        match &mut self.source {
            LeafSource::Clip(state) => state.set_phase(phase),
            LeafSource::Player { player, state } => {
                if let Some(slot) = players.get_mut(player.index())
                    && let Ok(state) = slot.player.state_mut(*state)
                {
                    state.set_phase(phase);
                }
            }
        }
    }

    pub(crate) fn rewind(&mut self, players: &mut [PlayerSlot]) {
        match &mut self.source {
            LeafSource::Clip(state) => {
                state.rewind();
                if let Some(track) = &mut self.root {
                    track.restart(state.speed >= 0.0);
                }
            }
            LeafSource::Player { player, state } => {
                if let Some(slot) = players.get_mut(player.index())
                    && slot.player.rewind(*state).is_ok()
                {
                    // Recompute the player's pose on its next evaluation.
                    slot.last_tick = 0;
                }
            }
        }
    }
}

/// Whether a looping state has wrapped, or is within `lead` seconds of
/// wrapping in its playback direction.
fn reached_loop_point(state: &PlaybackState, event: Option<PlaybackEvent>, lead: f32) -> bool {
    if event == Some(PlaybackEvent::Looped) {
        return true;
    }
    let duration = state.duration();
    let lead = lead.clamp(0.0, duration);
    if state.speed >= 0.0 {
        lead > 0.0 && state.time() >= duration - lead
    } else {
        lead > 0.0 && state.time() <= lead
    }
}
