use smallvec::{SmallVec, smallvec};

use marionette_core::{AnimationError, Result};

use crate::tree::state_machine::{EdgeStatus, StateIndex, StateMachineNode, TransitionOutcome};
use crate::tree::{AnimationTree, Edge, EdgeHandle, NodeHandle, NodeKind};

impl AnimationTree {
    // ========================================================================
    // State Machines
    // ========================================================================

    /// Asks state machine `sm` to move to `target`.
    ///
    /// Uses the earliest registered open edge from the active state to
    /// `target`. Without one, and with travel enabled, the shortest chain of
    /// open edges is walked hop by hop; failing that the target becomes
    /// active immediately. A hop fires at once when no cross-fade is running
    /// and its mode allows it, otherwise during a later update.
    pub fn request_transition(
        &mut self,
        sm: NodeHandle,
        target: StateIndex,
    ) -> Result<TransitionOutcome> {
        let state_count = self.state_machine(sm)?.states.len();
        if target >= state_count {
            return Err(AnimationError::invalid("state", target));
        }
        self.with_state_machine(sm, |tree, machine| tree.begin_transition(sm, machine, target))
    }

    /// Makes `state` active right away, without a cross-fade, and restarts it.
    pub fn set_active_state(&mut self, sm: NodeHandle, state: StateIndex) -> Result<()> {
        let state_count = self.state_machine(sm)?.states.len();
        if state >= state_count {
            return Err(AnimationError::invalid("state", state));
        }
        self.with_state_machine(sm, |tree, machine| tree.activate_state(machine, state))?;
        log::debug!("AnimationTree: {sm:?} jumped to state {state}");
        Ok(())
    }

    /// Closes an edge, or reopens a closed one as [`EdgeStatus::Auto`].
    /// Closed edges never fire and are skipped by travel searches.
    pub fn set_edge_enabled(&mut self, edge: EdgeHandle, enabled: bool) -> Result<()> {
        let slot = self.edge_mut(edge)?;
        if !enabled {
            slot.status = EdgeStatus::Off;
        } else if slot.status == EdgeStatus::Off {
            slot.status = EdgeStatus::Auto;
        }
        Ok(())
    }

    /// Sets how an edge may be taken from now on.
    pub fn set_edge_status(&mut self, edge: EdgeHandle, status: EdgeStatus) -> Result<()> {
        self.edge_mut(edge)?.status = status;
        log::debug!("AnimationTree: edge {edge:?} now {status:?}");
        Ok(())
    }

    fn edge_mut(&mut self, edge: EdgeHandle) -> Result<&mut Edge> {
        self.edges
            .get_mut(edge.index())
            .ok_or(AnimationError::invalid("edge", edge.index()))
    }

    fn begin_transition(
        &mut self,
        owner: NodeHandle,
        sm: &mut StateMachineNode,
        target: StateIndex,
    ) -> TransitionOutcome {
        sm.clear_path();
        let Some(active) = sm.active else {
            self.activate_state(sm, target);
            return TransitionOutcome::Teleported;
        };
        if active == target {
            return TransitionOutcome::AlreadyActive;
        }

        let direct = sm.find_edge(&self.edges, active, |edge| edge.to == target);
        let path = match direct {
            Some(edge) => Some(smallvec![edge]),
            None if sm.params.enable_travel => sm.find_path(&self.edges, active, target),
            None => None,
        };
        let Some(path) = path else {
            log::warn!(
                "AnimationTree: {owner:?} has no open path from state {active} to {target}, switching instantly"
            );
            self.activate_state(sm, target);
            return TransitionOutcome::Teleported;
        };

        let hops = path.len();
        sm.path = path;
        sm.path_pos = 0;
        log::debug!("AnimationTree: {owner:?} transition {active} -> {target} in {hops} hop(s)");

        if sm.fade.is_none() {
            let finished = self.nodes[sm.states[active].node.index()].status.finished;
            if let Some(edge) = self.next_edge(owner, sm, active, finished) {
                self.fire_edge(owner, sm, edge);
            }
        }

        if hops == 1 {
            TransitionOutcome::Started
        } else {
            TransitionOutcome::Travelling { hops }
        }
    }

    fn activate_state(&mut self, sm: &mut StateMachineNode, state: StateIndex) {
        sm.clear_path();
        sm.active = Some(state);
        sm.fade = None;
        self.reset_node(sm.states[state].node);
    }

    /// Runs `f` with the state machine's payload checked out of the arena,
    /// so that it can touch other nodes through the tree.
    fn with_state_machine<R>(
        &mut self,
        handle: NodeHandle,
        f: impl FnOnce(&mut Self, &mut StateMachineNode) -> R,
    ) -> Result<R> {
        self.node(handle)?;
        let mut kind = std::mem::replace(&mut self.nodes[handle.index()].kind, NodeKind::Vacant);
        let result = match &mut kind {
            NodeKind::StateMachine(sm) => Ok(f(self, sm)),
            _ => Err(AnimationError::invalid("state machine node", handle.index())),
        };
        self.nodes[handle.index()].kind = kind;
        result
    }

    // ========================================================================
    // Switches & Blends
    // ========================================================================

    /// Selects the switch's active input, cross-fading from the current mix.
    ///
    /// Every input's weight moves toward the new selection at the switch's
    /// fade rate, so a change mid-fade continues from where the previous one
    /// left off. With `synced`, the incoming input takes over the outgoing
    /// input's phase; otherwise it restarts. An out-of-range or unconnected
    /// `input` leaves the switch unchanged.
    pub fn set_active_input(&mut self, switch: NodeHandle, input: usize) -> Result<()> {
        let node = self.switch(switch)?;
        if input >= node.inputs.len() {
            return Err(AnimationError::invalid("switch input", input));
        }
        let Some(incoming) = node.input(input) else {
            return Err(AnimationError::invalid("switch input", input));
        };
        if input == node.active {
            return Ok(());
        }

        let outgoing = node.active_node();
        let params = node.params;
        let phase = outgoing
            .filter(|_| params.synced)
            .and_then(|from| self.resolve_phase(from));
        match phase {
            Some(phase) => self.apply_phase(incoming, phase),
            None => self.reset_node(incoming),
        }

        let node = self.switch_mut(switch)?;
        let previous = std::mem::replace(&mut node.active, input);
        log::debug!("AnimationTree: {switch:?} input {previous} -> {input}");
        Ok(())
    }

    /// Sets the share of a blend2 node's second input, clamped to `[0, 1]`.
    pub fn set_blend(&mut self, blend: NodeHandle, value: f32) -> Result<()> {
        let node = self.blend2_mut(blend)?;
        node.params.blend = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        Ok(())
    }

    /// Sets the strength of an add2 node's additive input, clamped to
    /// `[0, 1]`.
    pub fn set_add_weight(&mut self, add: NodeHandle, value: f32) -> Result<()> {
        let node = self.add2_mut(add)?;
        node.params.weight = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        Ok(())
    }

    // ========================================================================
    // Phase & Reset
    // ========================================================================

    /// Normalized playback time of the leaf that drives `node`: the leaf
    /// itself, a state machine's active state, a switch's active input, the
    /// first input of a blend2 or add2 node, or an exit node's nested node,
    /// followed recursively. `None` when that
    /// chain ends at an empty composite.
    pub fn phase(&self, node: NodeHandle) -> Result<Option<f32>> {
        self.node(node)?;
        Ok(self.resolve_phase(node))
    }

    /// Moves the leaves driving `node` to `phase`. Blend2 and add2 nodes
    /// forward it to both inputs.
    pub fn set_phase(&mut self, node: NodeHandle, phase: f32) -> Result<()> {
        self.node(node)?;
        self.apply_phase(node, phase);
        Ok(())
    }

    /// Restarts `node` and the children it currently plays: leaves rewind,
    /// state machines return to their entry state, fades are dropped.
    pub fn reset(&mut self, node: NodeHandle) -> Result<()> {
        self.node(node)?;
        self.reset_node(node);
        Ok(())
    }

    pub(crate) fn resolve_phase(&self, handle: NodeHandle) -> Option<f32> {
        match &self.nodes[handle.index()].kind {
            NodeKind::Leaf(leaf) => leaf.phase(&self.players),
            NodeKind::StateMachine(sm) => sm.active_node().and_then(|c| self.resolve_phase(c)),
            NodeKind::Switch(switch) => switch.active_node().and_then(|c| self.resolve_phase(c)),
            NodeKind::Blend2(blend) => blend.inputs[0].and_then(|c| self.resolve_phase(c)),
            NodeKind::Add2(add) => add.inputs[0].and_then(|c| self.resolve_phase(c)),
            NodeKind::Exit(exit) => exit.nested.and_then(|c| self.resolve_phase(c)),
            NodeKind::Vacant => None,
        }
    }

    pub(crate) fn apply_phase(&mut self, handle: NodeHandle, phase: f32) {
        let children: SmallVec<[NodeHandle; 2]> = match &mut self.nodes[handle.index()].kind {
            NodeKind::Leaf(leaf) => {
                leaf.set_phase(phase, &mut self.players);
                SmallVec::new()
            }
            NodeKind::StateMachine(sm) => sm.active_node().into_iter().collect(),
            NodeKind::Switch(switch) => switch.active_node().into_iter().collect(),
            NodeKind::Blend2(blend) => blend.inputs.iter().flatten().copied().collect(),
            NodeKind::Add2(add) => add.inputs.iter().flatten().copied().collect(),
            NodeKind::Exit(exit) => exit.nested.into_iter().collect(),
            NodeKind::Vacant => SmallVec::new(),
        };
        for child in children {
            self.apply_phase(child, phase);
        }
    }

    pub(crate) fn reset_node(&mut self, handle: NodeHandle) {
        let node = &mut self.nodes[handle.index()];
        // Allow re-evaluation within the current tick.
        node.last_tick = 0;

        let children: SmallVec<[NodeHandle; 2]> = match &mut node.kind {
            NodeKind::Leaf(leaf) => {
                leaf.rewind(&mut self.players);
                SmallVec::new()
            }
            NodeKind::StateMachine(sm) => {
                sm.reset();
                sm.active_node().into_iter().collect()
            }
            NodeKind::Switch(switch) => {
                switch.reset();
                switch.active_node().into_iter().collect()
            }
            NodeKind::Blend2(blend) => blend.inputs.iter().flatten().copied().collect(),
            NodeKind::Add2(add) => add.inputs.iter().flatten().copied().collect(),
            NodeKind::Exit(exit) => exit.nested.into_iter().collect(),
            NodeKind::Vacant => SmallVec::new(),
        };
        for child in children {
            self.reset_node(child);
        }
    }
}
