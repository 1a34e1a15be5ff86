use glam::{Quat, Vec3};

/// Keyframe value types that can be interpolated between two neighbours.
pub trait Interpolatable: Copy + Sized {
    fn interpolate_linear(start: &Self, end: &Self, t: f32) -> Self;
}

impl Interpolatable for f32 {
    #[inline]
    fn interpolate_linear(start: &Self, end: &Self, t: f32) -> Self {
        start + (end - start) * t
    }
}

impl Interpolatable for Vec3 {
    #[inline]
    fn interpolate_linear(start: &Self, end: &Self, t: f32) -> Self {
        start.lerp(*end, t)
    }
}

impl Interpolatable for Quat {
    /// Shortest-arc spherical interpolation.
    #[inline]
    fn interpolate_linear(start: &Self, end: &Self, t: f32) -> Self {
        // glam's slerp already negates `end` when the dot product is negative.
        start.slerp(*end, t)
    }
}
