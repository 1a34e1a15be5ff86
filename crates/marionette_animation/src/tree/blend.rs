use crate::skeleton::BoneMask;
use crate::tree::NodeHandle;

/// A running cross-fade from a state machine's outgoing state to its
/// active one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossFade {
    /// Index of the state fading out.
    pub from: usize,
    pub elapsed: f32,
    pub duration: f32,
}

impl CrossFade {
    /// Starts a fade, or returns `None` when `duration` calls for an
    /// instant switch.
    #[must_use]
    pub fn start(from: usize, duration: f32) -> Option<Self> {
        (duration > 0.0).then_some(Self {
            from,
            elapsed: 0.0,
            duration,
        })
    }

    /// Share of the incoming input, `elapsed / duration` clamped to 1.
    #[inline]
    #[must_use]
    pub fn weight(&self) -> f32 {
        (self.elapsed / self.duration).min(1.0)
    }

    /// Adds `dt` to the elapsed time. Returns `false` once the fade is over.
    pub fn advance(&mut self, dt: f32) -> bool {
        self.elapsed += dt;
        self.elapsed < self.duration
    }
}

/// Parameters of a [`Blend2Node`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blend2Params {
    /// Share of the second input, in `[0, 1]`.
    pub blend: f32,
    /// Restricts the second input to these bones; the rest keep the first
    /// input's transforms.
    pub mask: Option<BoneMask>,
}

/// Blends two inputs with a fixed weight, optionally per bone mask.
#[derive(Debug)]
pub struct Blend2Node {
    pub(crate) inputs: [Option<NodeHandle>; 2],
    pub(crate) params: Blend2Params,
}

impl Blend2Node {
    pub(crate) fn new(params: Blend2Params) -> Self {
        Self {
            inputs: [None; 2],
            params,
        }
    }

    #[inline]
    #[must_use]
    pub fn inputs(&self) -> &[Option<NodeHandle>; 2] {
        &self.inputs
    }

    #[inline]
    #[must_use]
    pub fn blend(&self) -> f32 {
        self.params.blend
    }

    #[inline]
    #[must_use]
    pub fn mask(&self) -> Option<&BoneMask> {
        self.params.mask.as_ref()
    }
}

/// Parameters of an [`Add2Node`].
#[derive(Debug, Clone, PartialEq)]
pub struct Add2Params {
    /// Strength of the additive input, in `[0, 1]`.
    pub weight: f32,
    /// Restricts the additive layer to these bones.
    pub mask: Option<BoneMask>,
}

impl Default for Add2Params {
    #[inline]
    fn default() -> Self {
        Self {
            weight: 1.0,
            mask: None,
        }
    }
}

/// Layers the second input on top of the first.
///
/// The second input is read relative to the skeleton's bind pose: what it
/// adds is its difference from the bind pose, scaled by the weight.
#[derive(Debug)]
pub struct Add2Node {
    pub(crate) inputs: [Option<NodeHandle>; 2],
    pub(crate) params: Add2Params,
}

impl Add2Node {
    pub(crate) fn new(params: Add2Params) -> Self {
        Self {
            inputs: [None; 2],
            params,
        }
    }

    #[inline]
    #[must_use]
    pub fn inputs(&self) -> &[Option<NodeHandle>; 2] {
        &self.inputs
    }

    #[inline]
    #[must_use]
    pub fn weight(&self) -> f32 {
        self.params.weight
    }

    #[inline]
    #[must_use]
    pub fn mask(&self) -> Option<&BoneMask> {
        self.params.mask.as_ref()
    }
}
