//! Error Types
//!
//! This module defines the error type shared by every layer of the runtime.
//!
//! # Overview
//!
//! [`AnimationError`] covers the failure modes of graph and player
//! construction:
//! - Fixed-capacity storage that is already full
//! - Stale or out-of-range handles and indices
//! - Node attachments that would close a cycle
//! - Skeleton / clip data that does not fit the target rig
//! - Malformed keyframe tracks
//!
//! Per-frame updates never fail. Every error is reported by the construction
//! call that caused it, before any state has been mutated.
//!
//! ```rust,ignore
//! use marionette_core::errors::{AnimationError, Result};
//!
//! fn build() -> Result<()> {
//!     let handle = tree.create_leaf_node(clip, LeafParams::default())?;
//!     tree.add_root(handle)?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The error type for animation construction calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnimationError {
    // ========================================================================
    // Storage
    // ========================================================================
    /// A preallocated list or arena has no free slot left.
    #[error("Capacity exceeded: {what} (capacity: {capacity})")]
    CapacityExceeded {
        /// Which storage overflowed
        what: &'static str,
        /// The fixed capacity of that storage
        capacity: usize,
    },

    // ========================================================================
    // References
    // ========================================================================
    /// A handle or index does not name a live object of the expected kind.
    #[error("Invalid reference: {what} (index: {index})")]
    InvalidReference {
        /// What was being referenced
        what: &'static str,
        /// The offending index
        index: usize,
    },

    /// Attaching `child` below `parent` would make a node its own descendant.
    #[error("Cyclic graph: node {child} already contains node {parent}")]
    CyclicGraph {
        /// The node that would receive the new child
        parent: usize,
        /// The node being attached
        child: usize,
    },

    /// A named clip does not exist in the library.
    #[error("Clip not found: {0}")]
    ClipNotFound(String),

    // ========================================================================
    // Rig Data
    // ========================================================================
    /// Pose or player data was built for a skeleton with a different bone count.
    #[error("Skeleton mismatch: expected {expected} bones, found {found}")]
    SkeletonMismatch {
        /// Bone count of the receiving skeleton
        expected: usize,
        /// Bone count of the offered data
        found: usize,
    },

    /// Skeleton data violates the bone ordering or array-length invariants.
    #[error("Invalid skeleton: {0}")]
    InvalidSkeleton(String),

    /// Keyframe data is empty, mismatched in length, or out of time order.
    #[error("Invalid keyframe track: {0}")]
    InvalidTrack(String),
}

impl AnimationError {
    #[inline]
    #[must_use]
    pub fn capacity(what: &'static str, capacity: usize) -> Self {
        Self::CapacityExceeded { what, capacity }
    }

    #[inline]
    #[must_use]
    pub fn invalid(what: &'static str, index: usize) -> Self {
        Self::InvalidReference { what, index }
    }
}

/// Alias for `Result<T, AnimationError>`.
pub type Result<T> = std::result::Result<T, AnimationError>;
