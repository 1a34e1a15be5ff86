use std::sync::Arc;

use rustc_hash::FxHashMap;

use marionette_core::{AnimationError, Result};

use crate::clip::AnimationClip;

/// Index of a clip inside a [`ClipLibrary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClipId(pub u32);

impl ClipId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Read-only store of named clips shared by players and trees.
///
/// Clips are handed out as `Arc`s, so a library can be dropped while the
/// playback states built from it keep running.
#[derive(Debug, Default, Clone)]
pub struct ClipLibrary {
    clips: Vec<Arc<AnimationClip>>,
    by_name: FxHashMap<String, ClipId>,
}

impl ClipLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a clip. A clip with the same name shadows the earlier one for
    /// name lookups; both stay reachable by id.
    pub fn add(&mut self, clip: AnimationClip) -> ClipId {
        let id = ClipId(self.clips.len() as u32);
        if self.by_name.insert(clip.name.clone(), id).is_some() {
            log::warn!("ClipLibrary: clip '{}' shadows an earlier clip", clip.name);
        }
        self.clips.push(Arc::new(clip));
        id
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.clips.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn get(&self, id: ClipId) -> Result<&Arc<AnimationClip>> {
        self.clips
            .get(id.index())
            .ok_or(AnimationError::invalid("clip", id.index()))
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<ClipId> {
        self.by_name.get(name).copied()
    }

    pub fn find(&self, name: &str) -> Result<&Arc<AnimationClip>> {
        self.index_of(name)
            .map(|id| &self.clips[id.index()])
            .ok_or_else(|| AnimationError::ClipNotFound(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClipId, &Arc<AnimationClip>)> {
        self.clips
            .iter()
            .enumerate()
            .map(|(index, clip)| (ClipId(index as u32), clip))
    }
}
