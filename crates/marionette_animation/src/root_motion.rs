//! Root Motion
//!
//! When a tree has a root bone, every clip-backed leaf measures how far that
//! bone moved during the update and how far it is from where the clip
//! started. Composite nodes blend these measurements with the same weights
//! they blend poses with, and the tree reports the result for the caller to
//! move the character by. The root bone of the output pose is pinned back to
//! the clip's start so the motion is not applied twice.

use glam::{Quat, Vec3};

use marionette_core::BoneTransform;

/// A rigid displacement of the root bone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootDelta {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Default for RootDelta {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl RootDelta {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    /// Displacement taking `from` to `to`.
    #[must_use]
    pub fn between(from: &BoneTransform, to: &BoneTransform) -> Self {
        Self {
            translation: to.translation - from.translation,
            rotation: (to.rotation * from.rotation.inverse()).normalize(),
        }
    }

    /// `self` followed by `next`.
    #[must_use]
    pub fn then(self, next: Self) -> Self {
        Self {
            translation: self.translation + next.translation,
            rotation: (next.rotation * self.rotation).normalize(),
        }
    }

    /// The displacement applied `count` times in a row.
    #[must_use]
    pub fn repeated(self, count: u32) -> Self {
        let (axis, angle) = self.rotation.to_axis_angle();
        Self {
            translation: self.translation * count as f32,
            rotation: Quat::from_axis_angle(axis, angle * count as f32),
        }
    }

    #[must_use]
    pub fn lerp(self, other: Self, weight: f32) -> Self {
        Self {
            translation: self.translation.lerp(other.translation, weight),
            rotation: self.rotation.slerp(other.rotation, weight),
        }
    }

    /// Undoes this displacement on `transform`.
    #[must_use]
    pub fn remove_from(&self, transform: &BoneTransform) -> BoneTransform {
        BoneTransform {
            translation: transform.translation - self.translation,
            rotation: (self.rotation.inverse() * transform.rotation).normalize(),
            scale: transform.scale,
        }
    }
}

/// Root bone movement produced by one update.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RootMotion {
    /// Movement since the previous update. Divide the translation by `dt`
    /// to get the root's velocity.
    pub delta: RootDelta,
    /// Offset from the clip's start, removed from the output pose.
    pub distance: RootDelta,
}

impl RootMotion {
    pub const IDENTITY: Self = Self {
        delta: RootDelta::IDENTITY,
        distance: RootDelta::IDENTITY,
    };

    #[must_use]
    pub fn lerp(self, other: Self, weight: f32) -> Self {
        if weight <= 0.0 {
            return self;
        }
        if weight >= 1.0 {
            return other;
        }
        Self {
            delta: self.delta.lerp(other.delta, weight),
            distance: self.distance.lerp(other.distance, weight),
        }
    }
}

/// Per-leaf bookkeeping for measuring root motion across updates.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RootTrack {
    /// Root transform at the clip's first and last frame.
    pub(crate) start: BoneTransform,
    pub(crate) end: BoneTransform,
    /// Root transform output by the previous update.
    pub(crate) last: BoneTransform,
}

impl RootTrack {
    pub(crate) fn new(start: BoneTransform, end: BoneTransform) -> Self {
        Self {
            start,
            end,
            last: start,
        }
    }

    /// Measures the move to `current`. `wraps` is how many times a looping
    /// clip went around during the update, in the direction given by
    /// `forward`.
    pub(crate) fn measure(&mut self, current: &BoneTransform, wraps: u32, forward: bool) -> RootMotion {
        let (first, last_frame) = if forward {
            (&self.start, &self.end)
        } else {
            (&self.end, &self.start)
        };

        let delta = if wraps == 0 {
            RootDelta::between(&self.last, current)
        } else {
            let cycle = RootDelta::between(first, last_frame);
            RootDelta::between(&self.last, last_frame)
                .then(cycle.repeated(wraps - 1))
                .then(RootDelta::between(first, current))
        };
        self.last = *current;

        RootMotion {
            delta,
            distance: RootDelta::between(first, current),
        }
    }

    /// Forgets the previous position, e.g. after the clip restarts.
    pub(crate) fn restart(&mut self, forward: bool) {
        self.last = if forward { self.start } else { self.end };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: f32) -> BoneTransform {
        BoneTransform::from_translation(Vec3::new(x, 0.0, 0.0))
    }

    #[test]
    fn delta_without_wrap_is_plain_difference() {
        let mut track = RootTrack::new(at(0.0), at(4.0));
        let motion = track.measure(&at(1.5), 0, true);
        assert!(motion.delta.translation.abs_diff_eq(Vec3::new(1.5, 0.0, 0.0), 1e-6));
        assert!(motion.distance.translation.abs_diff_eq(Vec3::new(1.5, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn wrapping_keeps_accumulating_forward() {
        let mut track = RootTrack::new(at(0.0), at(4.0));
        track.measure(&at(3.0), 0, true);

        // 3 -> 4, one full cycle, then 0 -> 1.
        let motion = track.measure(&at(1.0), 2, true);
        assert!(motion.delta.translation.abs_diff_eq(Vec3::new(6.0, 0.0, 0.0), 1e-5));
        assert!(motion.distance.translation.abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn rotation_delta_round_trips() {
        let from = BoneTransform::from_rotation(Quat::from_rotation_y(0.2));
        let to = BoneTransform::from_rotation(Quat::from_rotation_y(0.5));
        let delta = RootDelta::between(&from, &to);
        let back = delta.remove_from(&to);
        assert!(back.abs_diff_eq(&from, 1e-5));
        assert!(delta.repeated(2).rotation.abs_diff_eq(Quat::from_rotation_y(0.6), 1e-5));
    }
}
