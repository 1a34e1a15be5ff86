use crate::tree::NodeHandle;

/// Parameters of a switch node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwitchParams {
    /// Input selected at creation.
    pub active_input: usize,
    /// Time for an input's weight to go from 0 to 1 (or back) after the
    /// selection changes.
    pub cross_fade: f32,
    /// Carry the outgoing input's phase over to the incoming one instead of
    /// restarting it.
    pub synced: bool,
    /// Keep advancing inputs that currently have no weight.
    pub advance_all_inputs: bool,
}

impl Default for SwitchParams {
    #[inline]
    fn default() -> Self {
        Self {
            active_input: 0,
            cross_fade: 0.0,
            synced: false,
            advance_all_inputs: false,
        }
    }
}

/// Selects one of a fixed number of inputs, cross-fading on change.
///
/// Every input carries its own weight. Each update moves the active input's
/// weight toward 1 and every other weight toward 0 at a rate of
/// `dt / cross_fade`; the output is the weighted average of the inputs that
/// still have weight. Changing the selection in the middle of a fade picks up
/// from the current weights, so the output never jumps.
#[derive(Debug)]
pub struct SwitchNode {
    pub(crate) params: SwitchParams,
    pub(crate) inputs: Vec<Option<NodeHandle>>,
    pub(crate) active: usize,
    pub(crate) weights: Vec<f32>,
    warned_unconnected: bool,
}

impl SwitchNode {
    pub(crate) fn new(input_count: usize, params: SwitchParams) -> Self {
        let mut weights = vec![0.0; input_count];
        weights[params.active_input] = 1.0;
        Self {
            inputs: vec![None; input_count],
            active: params.active_input,
            weights,
            warned_unconnected: false,
            params,
        }
    }

    #[inline]
    #[must_use]
    pub fn params(&self) -> &SwitchParams {
        &self.params
    }

    #[inline]
    #[must_use]
    pub fn inputs(&self) -> &[Option<NodeHandle>] {
        &self.inputs
    }

    #[inline]
    #[must_use]
    pub fn active_input(&self) -> usize {
        self.active
    }

    /// Raw per-input weights, each in `[0, 1]`.
    #[inline]
    #[must_use]
    pub fn input_weights(&self) -> &[f32] {
        &self.weights
    }

    /// Share of input `index` in the output: its weight over the sum of all
    /// weights.
    #[must_use]
    pub fn input_weight(&self, index: usize) -> f32 {
        let total: f32 = self.weights.iter().sum();
        match self.weights.get(index) {
            Some(&weight) if total > 0.0 => weight / total,
            _ => 0.0,
        }
    }

    /// Share of the active input in the output.
    #[must_use]
    pub fn blend_weight(&self) -> f32 {
        self.input_weight(self.active)
    }

    /// Whether any input other than the active one still contributes.
    #[must_use]
    pub fn is_fading(&self) -> bool {
        self.weights
            .iter()
            .enumerate()
            .any(|(index, &weight)| if index == self.active { weight < 1.0 } else { weight > 0.0 })
    }

    pub(crate) fn input(&self, index: usize) -> Option<NodeHandle> {
        self.inputs.get(index).copied().flatten()
    }

    pub(crate) fn active_node(&self) -> Option<NodeHandle> {
        self.input(self.active)
    }

    /// Moves every weight toward its target by `dt / cross_fade`. A fade no
    /// longer than `dt` completes at once.
    pub(crate) fn step_weights(&mut self, dt: f32) {
        let cross_fade = self.params.cross_fade;
        if cross_fade.is_nan() || cross_fade <= dt {
            self.snap_weights();
            return;
        }

        let step = dt / cross_fade;
        for (index, weight) in self.weights.iter_mut().enumerate() {
            let direction = if index == self.active { 1.0 } else { -1.0 };
            *weight = (*weight + direction * step).clamp(0.0, 1.0);
        }
    }

    fn snap_weights(&mut self) {
        self.weights.fill(0.0);
        self.weights[self.active] = 1.0;
    }

    pub(crate) fn reset(&mut self) {
        self.snap_weights();
    }

    /// Logs once per stretch of ticks spent without a connected active input.
    pub(crate) fn note_unconnected(&mut self, owner: NodeHandle) {
        if !self.warned_unconnected {
            log::warn!(
                "Switch node {owner:?}: active input {} is not connected, outputting bind pose",
                self.active
            );
            self.warned_unconnected = true;
        }
    }

    pub(crate) fn clear_unconnected(&mut self) {
        self.warned_unconnected = false;
    }
}
