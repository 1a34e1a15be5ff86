//! Marionette Core
//!
//! Foundational types shared by the animation crates:
//!
//! - [`errors`]: [`AnimationError`] and the crate-wide [`Result`] alias
//! - [`transform`]: [`BoneTransform`] and the weighted blend rule

pub mod errors;
pub mod transform;

pub use errors::{AnimationError, Result};
pub use transform::{BlendAccumulator, BoneTransform};
