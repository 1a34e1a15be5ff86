//! Bone Transform
//!
//! A decomposed local transform (translation, rotation, scale) and the
//! weighted-average blend rule used everywhere poses are combined.
//!
//! Rotations are blended by normalized weighted quaternion averaging: every
//! contributor is first flipped into the hemisphere of the first one so that
//! `q` and `-q` (the same orientation) never cancel out.

use glam::{Affine3A, Mat4, Quat, Vec3, Vec4};

/// Local TRS transform of a single bone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for BoneTransform {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl BoneTransform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    #[inline]
    #[must_use]
    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    #[inline]
    #[must_use]
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    #[inline]
    #[must_use]
    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Self::IDENTITY
        }
    }

    /// Decomposes an affine matrix. Shear is lost.
    #[must_use]
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }

    #[inline]
    #[must_use]
    pub fn to_affine(&self) -> Affine3A {
        Affine3A::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    #[inline]
    #[must_use]
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Two-way weighted average: `weight` goes to `to`, `1 - weight` to `from`.
    ///
    /// Exact at the end points, so a fully faded-in transform is returned
    /// bit-for-bit.
    #[must_use]
    pub fn blend(from: &Self, to: &Self, weight: f32) -> Self {
        if weight <= 0.0 {
            return *from;
        }
        if weight >= 1.0 {
            return *to;
        }

        let mut acc = BlendAccumulator::default();
        acc.add(from, 1.0 - weight);
        acc.add(to, weight);
        acc.resolve().unwrap_or(*from)
    }

    /// Layers the difference between `additive` and `reference` on top of
    /// `base`, scaled by `weight`.
    ///
    /// Translation adds the offset, rotation applies the relative rotation
    /// (slerped from identity), scale multiplies by the ratio. A `weight` of
    /// zero returns `base` unchanged.
    #[must_use]
    pub fn add_relative(base: &Self, additive: &Self, reference: &Self, weight: f32) -> Self {
        if weight.is_nan() || weight <= 0.0 {
            return *base;
        }

        let offset = additive.translation - reference.translation;
        let mut relative = reference.rotation.inverse() * additive.rotation;
        if relative.w < 0.0 {
            relative = -relative;
        }
        let ratio = additive.scale / reference.scale.max(Vec3::splat(f32::EPSILON));

        Self {
            translation: base.translation + offset * weight,
            rotation: (base.rotation * Quat::IDENTITY.slerp(relative, weight)).normalize(),
            scale: base.scale * Vec3::ONE.lerp(ratio, weight),
        }
    }

    /// Returns `true` when all components are within `epsilon` of `other`.
    ///
    /// Rotations are compared up to sign.
    #[must_use]
    pub fn abs_diff_eq(&self, other: &Self, epsilon: f32) -> bool {
        let rotation_close = self.rotation.abs_diff_eq(other.rotation, epsilon)
            || self.rotation.abs_diff_eq(-other.rotation, epsilon);
        rotation_close
            && self.translation.abs_diff_eq(other.translation, epsilon)
            && self.scale.abs_diff_eq(other.scale, epsilon)
    }
}

/// Running N-way weighted average of bone transforms.
///
/// Weights are normalized by their sum in [`resolve`](Self::resolve), so
/// callers can feed raw, unnormalized weights.
#[derive(Debug, Clone, Copy)]
pub struct BlendAccumulator {
    translation: Vec3,
    rotation: Vec4,
    scale: Vec3,
    reference: Option<Quat>,
    total_weight: f32,
}

impl Default for BlendAccumulator {
    #[inline]
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Vec4::ZERO,
            scale: Vec3::ZERO,
            reference: None,
            total_weight: 0.0,
        }
    }
}

impl BlendAccumulator {
    #[inline]
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Adds one contributor. Non-positive and NaN weights are ignored.
    #[inline]
    pub fn add(&mut self, transform: &BoneTransform, weight: f32) {
        if weight.is_nan() || weight <= 0.0 {
            return;
        }

        let reference = *self.reference.get_or_insert(transform.rotation);
        let rotation = if reference.dot(transform.rotation) < 0.0 {
            -transform.rotation
        } else {
            transform.rotation
        };

        self.translation += transform.translation * weight;
        self.rotation += Vec4::from(rotation) * weight;
        self.scale += transform.scale * weight;
        self.total_weight += weight;
    }

    #[inline]
    #[must_use]
    pub fn total_weight(&self) -> f32 {
        self.total_weight
    }

    /// Returns the normalized average, or `None` if nothing with a positive
    /// weight was added.
    #[must_use]
    pub fn resolve(&self) -> Option<BoneTransform> {
        if self.total_weight <= 0.0 {
            return None;
        }

        let inv = 1.0 / self.total_weight;
        let rotation = Quat::from_vec4(self.rotation * inv);
        // Opposite-hemisphere inputs were flipped, so the sum cannot collapse
        // to zero unless the weights are degenerate.
        let rotation = if rotation.length_squared() > f32::EPSILON {
            rotation.normalize()
        } else {
            self.reference.unwrap_or(Quat::IDENTITY)
        };

        Some(BoneTransform {
            translation: self.translation * inv,
            rotation,
            scale: self.scale * inv,
        })
    }
}
