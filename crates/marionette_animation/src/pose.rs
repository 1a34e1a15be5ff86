use glam::{Affine3A, Mat4};

use marionette_core::BoneTransform;

use crate::skeleton::{BoneMask, Skeleton};

/// Dense per-bone local transforms, indexed like the skeleton's bones.
///
/// Poses are scratch buffers: their owner overwrites them in place every
/// update, so a borrowed pose is only meaningful until the next update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pose {
    transforms: Vec<BoneTransform>,
}

impl Pose {
    #[must_use]
    pub fn from_transforms(transforms: Vec<BoneTransform>) -> Self {
        Self { transforms }
    }

    /// A pose of `bone_count` identity transforms.
    #[must_use]
    pub fn identity(bone_count: usize) -> Self {
        Self {
            transforms: vec![BoneTransform::IDENTITY; bone_count],
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn transforms(&self) -> &[BoneTransform] {
        &self.transforms
    }

    #[inline]
    pub fn transforms_mut(&mut self) -> &mut [BoneTransform] {
        &mut self.transforms
    }

    #[inline]
    #[must_use]
    pub fn get(&self, bone: usize) -> Option<&BoneTransform> {
        self.transforms.get(bone)
    }

    /// Overwrites this pose with `other`, reusing the allocation.
    #[inline]
    pub fn copy_from(&mut self, other: &Pose) {
        self.transforms.clone_from(&other.transforms);
    }

    /// Writes the cross-fade of `from` and `to` into `self`; `weight` is the
    /// share of `to`.
    pub fn blend_from(&mut self, from: &Pose, to: &Pose, weight: f32) {
        debug_assert_eq!(from.len(), to.len());
        if weight >= 1.0 {
            self.copy_from(to);
            return;
        }
        if weight <= 0.0 {
            self.copy_from(from);
            return;
        }

        self.transforms.clear();
        self.transforms.extend(
            from.transforms
                .iter()
                .zip(&to.transforms)
                .map(|(a, b)| BoneTransform::blend(a, b, weight)),
        );
    }

    /// Like [`blend_from`](Self::blend_from), but bones outside `mask` keep
    /// the `from` transform.
    pub fn blend_masked_from(&mut self, from: &Pose, to: &Pose, weight: f32, mask: &BoneMask) {
        debug_assert_eq!(from.len(), to.len());
        self.transforms.clear();
        self.transforms.extend(
            from.transforms
                .iter()
                .zip(&to.transforms)
                .enumerate()
                .map(|(bone, (a, b))| {
                    if mask.contains(bone) {
                        BoneTransform::blend(a, b, weight)
                    } else {
                        *a
                    }
                }),
        );
    }

    /// Moves this pose toward `to` in place; `weight` is the share of `to`.
    ///
    /// Feeding inputs one by one with `weight = w / (sum of weights so far)`
    /// yields their normalized weighted average.
    pub fn blend_toward(&mut self, to: &Pose, weight: f32) {
        debug_assert_eq!(self.len(), to.len());
        if weight <= 0.0 || weight.is_nan() {
            return;
        }
        if weight >= 1.0 {
            self.copy_from(to);
            return;
        }
        for (current, target) in self.transforms.iter_mut().zip(&to.transforms) {
            *current = BoneTransform::blend(current, target, weight);
        }
    }

    /// Writes `base` plus `weight` times the difference between `additive`
    /// and `reference` into `self`. With a mask, bones outside it keep the
    /// `base` transform.
    pub fn add_masked_from(
        &mut self,
        base: &Pose,
        additive: &Pose,
        reference: &Pose,
        weight: f32,
        mask: Option<&BoneMask>,
    ) {
        debug_assert_eq!(base.len(), additive.len());
        self.transforms.clear();
        self.transforms.extend(
            base.transforms
                .iter()
                .zip(&additive.transforms)
                .zip(&reference.transforms)
                .enumerate()
                .map(|(bone, ((b, a), r))| {
                    if mask.is_none_or(|mask| mask.contains(bone)) {
                        BoneTransform::add_relative(b, a, r, weight)
                    } else {
                        *b
                    }
                }),
        );
    }

    /// Composes local transforms down the hierarchy into model space.
    ///
    /// Relies on the skeleton's topological order: one forward pass, every
    /// parent already resolved when its child is visited.
    pub fn compute_model_matrices(&self, skeleton: &Skeleton, out: &mut [Affine3A]) {
        debug_assert_eq!(self.len(), skeleton.bone_count());
        debug_assert!(out.len() >= self.len());

        for (index, bone) in skeleton.bones().iter().enumerate() {
            let local = self.transforms[index].to_affine();
            out[index] = match bone.parent {
                Some(parent) => out[parent] * local,
                None => local,
            };
        }
    }

    /// Model-space matrices multiplied by the inverse bind matrices, ready
    /// for upload as skinning joints.
    pub fn compute_skinning_matrices(
        &self,
        skeleton: &Skeleton,
        model_scratch: &mut [Affine3A],
        out: &mut [Mat4],
    ) {
        self.compute_model_matrices(skeleton, model_scratch);
        for (index, bone) in skeleton.bones().iter().enumerate() {
            out[index] = (model_scratch[index] * bone.inverse_bind).into();
        }
    }
}
