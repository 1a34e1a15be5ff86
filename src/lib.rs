//! Marionette
//!
//! Skeletal animation blending for real-time rigs: weighted clip players and
//! a fixed-capacity animation tree of leaf, state-machine, switch, blend2,
//! add2 and exit nodes, with optional root motion.
//!
//! This crate re-exports the member crates:
//!
//! - [`core`]: errors and the bone transform value type
//! - [`animation`]: clips, skeletons, players and the animation tree
//!
//! ```rust,ignore
//! use marionette::prelude::*;
//!
//! let mut player = AnimationPlayer::new(skeleton.clone());
//! player.add_state(walk, 0.7, true, 1.0)?;
//! player.add_state(run, 0.3, true, 1.0)?;
//! player.update(1.0 / 60.0);
//! let pose = player.pose();
//! ```

pub use marionette_animation as animation;
pub use marionette_core as core;

pub use marionette_animation::{
    AnimationClip, AnimationPlayer, AnimationTree, BoneChannel, BoneMask, ClipLibrary,
    KeyframeTrack, Pose, Skeleton,
};
pub use marionette_core::{AnimationError, BoneTransform, Result};

/// The types most programs need, in one import.
pub mod prelude {
    pub use marionette_animation::{
        Add2Params, AnimationClip, AnimationPlayer, AnimationTree, Blend2Params, BoneChannel,
        BoneMask, ClipLibrary, EdgeParams, EdgeStatus, InterpolationMode, KeyframeTrack,
        LeafParams, NodeHandle, PlayerSettings, Pose, RootMotion, Skeleton, StateHandle,
        StateMachineParams, SwitchParams, TransitionMode, TransitionOutcome, TreeSettings,
    };
    pub use marionette_core::{AnimationError, BoneTransform, Result};
}
