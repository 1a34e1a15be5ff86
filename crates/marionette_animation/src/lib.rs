//! Marionette Animation
//!
//! Skeletal animation playback and blending:
//!
//! - [`tracks`] / [`clip`] / [`library`]: keyframe data, immutable at runtime
//! - [`skeleton`] / [`pose`]: the rig and per-bone local transform buffers
//! - [`playback`] / [`player`]: time cursors and the weighted clip blender
//! - [`tree`]: the fixed-capacity animation tree (leaf, state machine,
//!   switch, blend2, add2 and exit nodes)
//! - [`root_motion`]: root bone movement measured by the tree

mod values;
pub mod tracks;
pub mod clip;
pub mod library;
pub mod skeleton;
pub mod pose;
pub mod playback;
pub mod player;
pub mod settings;
pub mod root_motion;
pub mod tree;

pub use clip::{AnimationClip, BoneChannel};
pub use library::{ClipId, ClipLibrary};
pub use playback::{PlaybackEvent, PlaybackState, sanitize_dt};
pub use player::{AnimationPlayer, StateHandle};
pub use pose::Pose;
pub use root_motion::{RootDelta, RootMotion};
pub use settings::{PlayerSettings, TreeSettings};
pub use skeleton::{Bone, BoneMask, Skeleton};
pub use tracks::{InterpolationMode, KeyframeTrack};
pub use values::Interpolatable;
pub use tree::{
    Add2Params, AnimationTree, Blend2Params, EdgeHandle, EdgeParams, EdgeStatus, LeafCallback,
    LeafParams, NodeHandle, NodeType, PlayerId, StateIndex, StateMachineParams, SwitchParams,
    TransitionMode, TransitionOutcome, TreeCallback,
};
