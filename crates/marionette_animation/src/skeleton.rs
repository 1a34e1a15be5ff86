use glam::Affine3A;
use rustc_hash::FxHashMap;

use marionette_core::{AnimationError, BoneTransform, Result};

use crate::pose::Pose;

/// One joint of a skeleton.
#[derive(Debug, Clone)]
pub struct Bone {
    pub name: String,
    /// Parent bone index; always smaller than this bone's own index.
    pub parent: Option<usize>,
    /// Local transform in the bind (rest) pose.
    pub bind_local: BoneTransform,
    /// Transforms mesh space into this bone's space at bind time.
    pub inverse_bind: Affine3A,
}

/// Bone hierarchy plus bind pose, stored in topological order.
///
/// Immutable once built; players and trees share it through an `Arc`.
#[derive(Debug, Clone)]
pub struct Skeleton {
    pub name: String,
    bones: Vec<Bone>,
    bind_pose: Pose,
    by_name: FxHashMap<String, usize>,
}

impl Skeleton {
    /// Builds a skeleton, checking that every parent precedes its child.
    pub fn new(name: impl Into<String>, bones: Vec<Bone>) -> Result<Self> {
        let name = name.into();
        for (index, bone) in bones.iter().enumerate() {
            if let Some(parent) = bone.parent
                && parent >= index
            {
                return Err(AnimationError::InvalidSkeleton(format!(
                    "bone {index} ('{}') has parent {parent}, parents must precede children",
                    bone.name
                )));
            }
        }

        let bind_pose = Pose::from_transforms(bones.iter().map(|b| b.bind_local).collect());
        let by_name = bones
            .iter()
            .enumerate()
            .map(|(index, bone)| (bone.name.clone(), index))
            .collect();

        Ok(Self {
            name,
            bones,
            bind_pose,
            by_name,
        })
    }

    /// Builds a skeleton from parallel arrays, the layout importers produce.
    /// A negative parent index marks a root.
    pub fn from_parts(
        name: impl Into<String>,
        bone_names: Vec<String>,
        parent_indices: &[i16],
        bind_local: &[BoneTransform],
        inverse_bind_matrices: &[Affine3A],
    ) -> Result<Self> {
        let count = bone_names.len();
        if parent_indices.len() != count
            || bind_local.len() != count
            || inverse_bind_matrices.len() != count
        {
            return Err(AnimationError::InvalidSkeleton(format!(
                "per-bone arrays disagree: {count} names, {} parents, {} bind transforms, {} inverse binds",
                parent_indices.len(),
                bind_local.len(),
                inverse_bind_matrices.len()
            )));
        }

        let bones = bone_names
            .into_iter()
            .enumerate()
            .map(|(i, bone_name)| Bone {
                name: bone_name,
                parent: usize::try_from(parent_indices[i]).ok(),
                bind_local: bind_local[i],
                inverse_bind: inverse_bind_matrices[i],
            })
            .collect();

        Self::new(name, bones)
    }

    /// Like [`from_parts`](Self::from_parts), deriving the inverse bind
    /// matrices from the bind pose itself.
    pub fn from_bind_pose(
        name: impl Into<String>,
        bone_names: Vec<String>,
        parent_indices: &[i16],
        bind_local: &[BoneTransform],
    ) -> Result<Self> {
        let count = bone_names.len();
        if parent_indices.len() != count || bind_local.len() != count {
            return Err(AnimationError::InvalidSkeleton(format!(
                "per-bone arrays disagree: {count} names, {} parents, {} bind transforms",
                parent_indices.len(),
                bind_local.len()
            )));
        }

        let mut model = Vec::with_capacity(count);
        for (i, local) in bind_local.iter().enumerate() {
            let local = local.to_affine();
            let world = match usize::try_from(parent_indices[i]) {
                Ok(parent) if parent < i => model[parent] * local,
                Ok(parent) => {
                    return Err(AnimationError::InvalidSkeleton(format!(
                        "bone {i} has parent {parent}, parents must precede children"
                    )));
                }
                Err(_) => local,
            };
            model.push(world);
        }
        let inverse_binds: Vec<Affine3A> = model.iter().map(Affine3A::inverse).collect();

        Self::from_parts(name, bone_names, parent_indices, bind_local, &inverse_binds)
    }

    #[inline]
    #[must_use]
    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    #[inline]
    #[must_use]
    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    #[inline]
    #[must_use]
    pub fn parent(&self, bone: usize) -> Option<usize> {
        self.bones.get(bone).and_then(|b| b.parent)
    }

    #[inline]
    #[must_use]
    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Bind-pose local transforms, one per bone.
    #[inline]
    #[must_use]
    pub fn bind_pose(&self) -> &Pose {
        &self.bind_pose
    }

    /// Builds a mask containing exactly the named bones.
    pub fn bone_mask<S: AsRef<str>>(&self, bone_names: &[S]) -> Result<BoneMask> {
        let mut mask = BoneMask::empty(self.bone_count());
        for (position, name) in bone_names.iter().enumerate() {
            let name = name.as_ref();
            let Some(index) = self.bone_index(name) else {
                log::warn!("Skeleton '{}': bone '{name}' not found", self.name);
                return Err(AnimationError::invalid("bone name", position));
            };
            mask.insert(index);
        }
        Ok(mask)
    }

    /// Mask of `root` and all its descendants.
    pub fn subtree_mask(&self, root: usize) -> Result<BoneMask> {
        if root >= self.bone_count() {
            return Err(AnimationError::invalid("bone", root));
        }
        let mut mask = BoneMask::empty(self.bone_count());
        mask.insert(root);
        // Topological order: a parent is always decided before its children.
        for (index, bone) in self.bones.iter().enumerate().skip(root + 1) {
            if bone.parent.is_some_and(|p| mask.contains(p)) {
                mask.insert(index);
            }
        }
        Ok(mask)
    }
}

/// Bit set selecting a subset of a skeleton's bones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoneMask {
    bits: Vec<u64>,
    bone_count: usize,
}

impl BoneMask {
    #[must_use]
    pub fn empty(bone_count: usize) -> Self {
        Self {
            bits: vec![0; bone_count.div_ceil(64)],
            bone_count,
        }
    }

    #[must_use]
    pub fn full(bone_count: usize) -> Self {
        let mut mask = Self::empty(bone_count);
        for bone in 0..bone_count {
            mask.insert(bone);
        }
        mask
    }

    #[inline]
    #[must_use]
    pub fn bone_count(&self) -> usize {
        self.bone_count
    }

    #[inline]
    pub fn insert(&mut self, bone: usize) {
        debug_assert!(bone < self.bone_count);
        self.bits[bone / 64] |= 1 << (bone % 64);
    }

    #[inline]
    pub fn remove(&mut self, bone: usize) {
        debug_assert!(bone < self.bone_count);
        self.bits[bone / 64] &= !(1 << (bone % 64));
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, bone: usize) -> bool {
        bone < self.bone_count && self.bits[bone / 64] & (1 << (bone % 64)) != 0
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }
}
