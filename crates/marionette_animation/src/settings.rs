//! Capacity Settings
//!
//! All storage in players and trees is sized once, at creation, from these
//! settings. Nothing grows afterwards: a full list reports
//! [`CapacityExceeded`](marionette_core::AnimationError::CapacityExceeded)
//! instead of reallocating, which keeps handles stable and per-frame cost
//! bounded.
//!
//! ```rust,ignore
//! use marionette::animation::{AnimationTree, TreeSettings};
//!
//! let tree = AnimationTree::with_settings(
//!     skeleton,
//!     TreeSettings {
//!         max_nodes: 128,
//!         ..Default::default()
//!     },
//! );
//! ```

/// Capacity of an [`AnimationPlayer`](crate::player::AnimationPlayer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerSettings {
    /// Maximum number of concurrent playback states.
    pub max_states: usize,
}

impl Default for PlayerSettings {
    #[inline]
    fn default() -> Self {
        Self { max_states: 16 }
    }
}

/// Capacities of an [`AnimationTree`](crate::tree::AnimationTree).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeSettings {
    /// Node arena size.
    pub max_nodes: usize,
    /// Edge arena size, shared by every state machine in the tree.
    pub max_edges: usize,
    /// Number of players that can be registered to back leaf nodes.
    pub max_players: usize,
    /// Number of evaluation roots.
    pub max_roots: usize,
}

impl Default for TreeSettings {
    #[inline]
    fn default() -> Self {
        Self {
            max_nodes: 32,
            max_edges: 64,
            max_players: 4,
            max_roots: 4,
        }
    }
}

impl TreeSettings {
    /// Settings with the given arena sizes and default player/root limits.
    #[must_use]
    pub fn with_capacity(max_nodes: usize, max_edges: usize) -> Self {
        Self {
            max_nodes,
            max_edges,
            ..Default::default()
        }
    }
}
