use smallvec::{SmallVec, smallvec};

use crate::playback::{PlaybackState, sanitize_dt};
use crate::pose::Pose;
use crate::root_motion::RootMotion;
use crate::skeleton::BoneMask;
use crate::tree::blend::{Add2Node, Blend2Node};
use crate::tree::leaf::{LeafNode, LeafSource};
use crate::tree::state_machine::{Edge, ExitNode, StateIndex, StateMachineNode};
use crate::tree::switch::SwitchNode;
use crate::tree::{AnimationTree, CrossFade, EdgeHandle, NodeHandle, NodeKind, NodeStatus};

type Evaluated = (NodeStatus, RootMotion);

impl AnimationTree {
    /// Advances the graph by `dt` seconds and refreshes every root's pose.
    ///
    /// Roots are evaluated one after another, each depth-first to its
    /// leaves. Nodes shared between parents or roots are evaluated once per
    /// call. Negative or non-finite `dt` is treated as zero.
    pub fn update(&mut self, dt: f32) {
        let dt = sanitize_dt(dt);
        self.tick += 1;

        for index in 0..self.roots.len() {
            let root = self.roots[index];
            self.evaluate(root, dt, 0.0);
        }

        self.distribute_weights();
        self.refresh_outputs();
    }

    /// Evaluates `handle` unless it already was this tick, and returns its
    /// status.
    ///
    /// `lead` is the cross-fade of the edge that would leave the state this
    /// node plays, passed down to the leaf driving it.
    ///
    /// The node's payload and pose buffer are moved out of the arena while
    /// it runs so that its children can be evaluated through `&mut self`.
    pub(crate) fn evaluate(&mut self, handle: NodeHandle, dt: f32, lead: f32) -> NodeStatus {
        let node = &mut self.nodes[handle.index()];
        if node.last_tick == self.tick {
            return node.status;
        }
        debug_assert!(
            !matches!(node.kind, NodeKind::Vacant),
            "node {handle:?} re-entered during evaluation"
        );

        let mut kind = std::mem::replace(&mut node.kind, NodeKind::Vacant);
        let mut pose = std::mem::take(&mut node.pose);

        let (status, motion) = match &mut kind {
            NodeKind::Leaf(leaf) => self.evaluate_leaf(leaf, dt, lead, &mut pose),
            NodeKind::StateMachine(sm) => self.evaluate_state_machine(handle, sm, dt, &mut pose),
            NodeKind::Switch(switch) => self.evaluate_switch(handle, switch, dt, lead, &mut pose),
            NodeKind::Blend2(blend) => self.evaluate_blend2(blend, dt, lead, &mut pose),
            NodeKind::Add2(add) => self.evaluate_add2(add, dt, lead, &mut pose),
            NodeKind::Exit(exit) => self.evaluate_exit(exit, dt, lead, &mut pose),
            NodeKind::Vacant => (NodeStatus::default(), RootMotion::IDENTITY),
        };

        let node = &mut self.nodes[handle.index()];
        node.kind = kind;
        node.pose = pose;
        node.status = status;
        node.motion = motion;
        node.last_tick = self.tick;
        status
    }

    fn evaluate_leaf(
        &mut self,
        leaf: &mut LeafNode,
        dt: f32,
        lead: f32,
        pose: &mut Pose,
    ) -> Evaluated {
        let LeafSource::Player { player, state } = leaf.source else {
            return leaf.evaluate_clip(dt, lead, self.skeleton.bind_pose(), self.root_bone, pose);
        };

        debug_assert!(
            player.index() < self.players.len(),
            "leaf bound to unknown player {player:?}"
        );
        let Some(slot) = self.players.get_mut(player.index()) else {
            pose.copy_from(self.skeleton.bind_pose());
            return (NodeStatus::default(), RootMotion::IDENTITY);
        };
        // A player shared by several leaves advances once per tick.
        if slot.last_tick != self.tick {
            slot.player.update(dt);
            slot.last_tick = self.tick;
        }
        pose.copy_from(slot.player.pose());
        let status = NodeStatus {
            finished: slot
                .player
                .state(state)
                .is_ok_and(PlaybackState::is_finished),
            leftover: 0.0,
        };
        (status, RootMotion::IDENTITY)
    }

    fn evaluate_state_machine(
        &mut self,
        owner: NodeHandle,
        sm: &mut StateMachineNode,
        dt: f32,
        pose: &mut Pose,
    ) -> Evaluated {
        let Some(mut active) = sm.active else {
            pose.copy_from(self.skeleton.bind_pose());
            return (NodeStatus::default(), RootMotion::IDENTITY);
        };

        advance_fade(owner, sm, active, dt);

        // Only the active and fading-out children run; the rest stay frozen.
        let lead = self.upcoming_fade(sm, active);
        let mut status = self.evaluate(sm.states[active].node, dt, lead);
        if let Some(from) = sm.fading_state() {
            self.evaluate(sm.states[from].node, dt, 0.0);
        }

        // Chain edges while the time left over by a finished state allows.
        // Every hop restarts its target, so the number of states bounds the
        // chain even when edges form a cycle.
        let mut hops = 0;
        while sm.fade.is_none() && hops < sm.states.len() && !self.is_exit(sm.states[active].node) {
            let Some(edge) = self.next_edge(owner, sm, active, status.finished) else {
                break;
            };
            let carry = if status.finished { status.leftover } else { 0.0 };
            self.fire_edge(owner, sm, edge);
            active = self.edges[edge.index()].to;
            hops += 1;

            advance_fade(owner, sm, active, carry);
            let lead = self.upcoming_fade(sm, active);
            status = self.evaluate(sm.states[active].node, carry, lead);
        }

        let active_node = &self.nodes[sm.states[active].node.index()];
        let motion = match sm.fade {
            Some(fade) => {
                let from_node = &self.nodes[sm.states[fade.from].node.index()];
                pose.blend_from(&from_node.pose, &active_node.pose, fade.weight());
                from_node.motion.lerp(active_node.motion, fade.weight())
            }
            None => {
                pose.copy_from(&active_node.pose);
                active_node.motion
            }
        };

        let finished = sm.fade.is_none()
            && (self.is_exit(sm.states[active].node)
                || (status.finished && sm.is_terminal(&self.edges, active)));
        let status = NodeStatus {
            finished,
            leftover: if finished { status.leftover } else { 0.0 },
        };
        (status, motion)
    }

    fn is_exit(&self, handle: NodeHandle) -> bool {
        matches!(self.nodes[handle.index()].kind, NodeKind::Exit(_))
    }

    /// Cross-fade of the edge most likely to leave `active` next: the
    /// pending travel hop, else the earliest automatic edge.
    fn upcoming_fade(&self, sm: &StateMachineNode, active: StateIndex) -> f32 {
        let next = if sm.is_travelling() {
            Some(sm.path[sm.path_pos])
        } else {
            sm.find_edge(&self.edges, active, Edge::is_automatic)
        };
        next.map_or(0.0, |handle| self.edges[handle.index()].cross_fade)
    }

    /// The edge that should fire now from `active`, if any.
    ///
    /// A pending travel hop takes precedence; a hop that no longer starts at
    /// the active state or was closed abandons the travel. Without travel,
    /// the earliest registered automatic edge whose mode is satisfied fires.
    pub(crate) fn next_edge(
        &self,
        owner: NodeHandle,
        sm: &mut StateMachineNode,
        active: StateIndex,
        finished: bool,
    ) -> Option<EdgeHandle> {
        if sm.is_travelling() {
            let handle = sm.path[sm.path_pos];
            let edge = &self.edges[handle.index()];
            if edge.is_open() && edge.from == active {
                return edge.is_ready(finished).then_some(handle);
            }
            log::debug!("AnimationTree: {owner:?} travel interrupted at state {active}");
            sm.clear_path();
        }

        sm.find_edge(&self.edges, active, |edge| {
            edge.is_automatic() && edge.is_ready(finished)
        })
    }

    /// Makes the edge's target the active state, restarting it, and starts
    /// the edge's cross-fade from the previously active state.
    pub(crate) fn fire_edge(
        &mut self,
        owner: NodeHandle,
        sm: &mut StateMachineNode,
        handle: EdgeHandle,
    ) {
        let edge = self.edges[handle.index()];
        self.edges[handle.index()].taken();

        if sm.path.get(sm.path_pos) == Some(&handle) {
            sm.path_pos += 1;
            if !sm.is_travelling() {
                sm.clear_path();
            }
        }

        let previous = sm.active;
        sm.active = Some(edge.to);
        sm.fade = match previous {
            Some(from) if from != edge.to => CrossFade::start(from, edge.cross_fade),
            _ => None,
        };
        self.reset_node(sm.states[edge.to].node);

        log::debug!(
            "AnimationTree: {owner:?} edge {handle:?} fired, state {} -> {} (fade {}s)",
            edge.from,
            edge.to,
            edge.cross_fade
        );
    }

    fn evaluate_switch(
        &mut self,
        owner: NodeHandle,
        switch: &mut SwitchNode,
        dt: f32,
        lead: f32,
        pose: &mut Pose,
    ) -> Evaluated {
        switch.step_weights(dt);

        let Some(active) = switch.active_node() else {
            switch.note_unconnected(owner);
            pose.copy_from(self.skeleton.bind_pose());
            return (NodeStatus::default(), RootMotion::IDENTITY);
        };
        switch.clear_unconnected();

        let status = self.evaluate(active, dt, lead);
        for (index, input) in switch.inputs.iter().enumerate() {
            let Some(input) = *input else {
                continue;
            };
            if switch.params.advance_all_inputs || switch.weights[index] > 0.0 {
                self.evaluate(input, dt, 0.0);
            }
        }

        // Inputs still fading out keep their share, so reselecting mid-fade
        // carries on from the current mix.
        let mut total = 0.0;
        let mut blended = false;
        let mut motion = RootMotion::IDENTITY;
        for (index, input) in switch.inputs.iter().enumerate() {
            let weight = switch.weights[index];
            let Some(input) = *input else {
                continue;
            };
            if weight.is_nan() || weight <= 0.0 {
                continue;
            }
            let node = &self.nodes[input.index()];
            if blended {
                let share = weight / (total + weight);
                pose.blend_toward(&node.pose, share);
                motion = motion.lerp(node.motion, share);
            } else {
                pose.copy_from(&node.pose);
                motion = node.motion;
                blended = true;
            }
            total += weight;
        }
        if !blended {
            let node = &self.nodes[active.index()];
            pose.copy_from(&node.pose);
            motion = node.motion;
        }

        let status = NodeStatus {
            finished: !switch.is_fading() && status.finished,
            leftover: status.leftover,
        };
        (status, motion)
    }

    fn evaluate_blend2(
        &mut self,
        blend: &Blend2Node,
        dt: f32,
        lead: f32,
        pose: &mut Pose,
    ) -> Evaluated {
        let [first, second] = blend.inputs;
        let status = first
            .map(|input| self.evaluate(input, dt, lead))
            .unwrap_or_default();
        if let Some(input) = second {
            self.evaluate(input, dt, 0.0);
        }

        // A missing input contributes the bind pose.
        let bind = self.skeleton.bind_pose();
        let from = first.map_or(bind, |input| &self.nodes[input.index()].pose);
        let to = second.map_or(bind, |input| &self.nodes[input.index()].pose);
        match &blend.params.mask {
            Some(mask) => pose.blend_masked_from(from, to, blend.params.blend, mask),
            None => pose.blend_from(from, to, blend.params.blend),
        }

        let from_motion = self.input_motion(first);
        let motion = if self.root_masked_out(blend.params.mask.as_ref()) {
            from_motion
        } else {
            from_motion.lerp(self.input_motion(second), blend.params.blend)
        };
        (status, motion)
    }

    fn evaluate_add2(&mut self, add: &Add2Node, dt: f32, lead: f32, pose: &mut Pose) -> Evaluated {
        let [base, layer] = add.inputs;
        let status = base
            .map(|input| self.evaluate(input, dt, lead))
            .unwrap_or_default();
        if let Some(input) = layer {
            self.evaluate(input, dt, 0.0);
        }

        let bind = self.skeleton.bind_pose();
        let base_pose = base.map_or(bind, |input| &self.nodes[input.index()].pose);
        let layer_pose = layer.map_or(bind, |input| &self.nodes[input.index()].pose);
        pose.add_masked_from(
            base_pose,
            layer_pose,
            bind,
            add.params.weight,
            add.params.mask.as_ref(),
        );

        let base_motion = self.input_motion(base);
        let motion = if self.root_masked_out(add.params.mask.as_ref()) {
            base_motion
        } else {
            base_motion.lerp(self.input_motion(layer), add.params.weight)
        };
        (status, motion)
    }

    fn evaluate_exit(&mut self, exit: &ExitNode, dt: f32, lead: f32, pose: &mut Pose) -> Evaluated {
        let Some(nested) = exit.nested else {
            pose.copy_from(self.skeleton.bind_pose());
            return (NodeStatus::default(), RootMotion::IDENTITY);
        };
        let status = self.evaluate(nested, dt, lead);
        let node = &self.nodes[nested.index()];
        pose.copy_from(&node.pose);
        (status, node.motion)
    }

    fn input_motion(&self, input: Option<NodeHandle>) -> RootMotion {
        input.map_or(RootMotion::IDENTITY, |input| self.nodes[input.index()].motion)
    }

    fn root_masked_out(&self, mask: Option<&BoneMask>) -> bool {
        match (self.root_bone, mask) {
            (Some(bone), Some(mask)) => !mask.contains(bone),
            _ => false,
        }
    }

    // ========================================================================
    // Outputs
    // ========================================================================

    /// Copies each root's pose into its output, pins the root bone and runs
    /// the update callback.
    fn refresh_outputs(&mut self) {
        for (root, output) in self.roots.iter().zip(&mut self.outputs) {
            let node = &self.nodes[root.index()];
            output.pose.copy_from(&node.pose);
            output.motion = node.motion;

            if let Some(bone) = self.root_bone
                && let Some(transform) = output.pose.transforms_mut().get_mut(bone)
            {
                *transform = node.motion.distance.remove_from(transform);
            }
            if let Some(callback) = &mut self.callback {
                for (bone, transform) in output.pose.transforms_mut().iter_mut().enumerate() {
                    callback(bone, transform);
                }
            }
        }
    }

    // ========================================================================
    // Output weights
    // ========================================================================

    fn distribute_weights(&mut self) {
        for node in &mut self.nodes {
            node.weight = 0.0;
        }
        for index in 0..self.roots.len() {
            let root = self.roots[index];
            self.add_weight(root, 1.0);
        }
    }

    /// Credits `weight` to `handle` and passes it on to the children in
    /// proportion to their share of the node's output.
    fn add_weight(&mut self, handle: NodeHandle, weight: f32) {
        if weight <= 0.0 {
            return;
        }
        let node = &mut self.nodes[handle.index()];
        node.weight += weight;

        let shares: SmallVec<[(NodeHandle, f32); 2]> = match &node.kind {
            NodeKind::Leaf(_) | NodeKind::Vacant => return,
            NodeKind::StateMachine(sm) => {
                let Some(active) = sm.active_node() else {
                    return;
                };
                match sm.fade {
                    Some(fade) => smallvec![
                        (active, fade.weight()),
                        (sm.states[fade.from].node, 1.0 - fade.weight()),
                    ],
                    None => smallvec![(active, 1.0)],
                }
            }
            NodeKind::Switch(switch) => {
                let Some(active) = switch.active_node() else {
                    return;
                };
                let shares: SmallVec<[(NodeHandle, f32); 2]> = switch
                    .inputs
                    .iter()
                    .enumerate()
                    .filter_map(|(index, input)| input.map(|input| (input, switch.input_weight(index))))
                    .filter(|&(_, share)| share > 0.0)
                    .collect();
                if shares.is_empty() {
                    smallvec![(active, 1.0)]
                } else {
                    shares
                }
            }
            NodeKind::Blend2(blend) => {
                let share = blend.params.blend;
                let mut shares = SmallVec::new();
                if let Some(first) = blend.inputs[0] {
                    shares.push((first, 1.0 - share));
                }
                if let Some(second) = blend.inputs[1] {
                    shares.push((second, share));
                }
                shares
            }
            NodeKind::Add2(add) => {
                let mut shares = SmallVec::new();
                if let Some(base) = add.inputs[0] {
                    shares.push((base, 1.0));
                }
                if let Some(layer) = add.inputs[1] {
                    shares.push((layer, add.params.weight));
                }
                shares
            }
            NodeKind::Exit(exit) => exit.nested.into_iter().map(|nested| (nested, 1.0)).collect(),
        };

        for (child, share) in shares {
            self.add_weight(child, weight * share);
        }
    }
}

/// Moves a running cross-fade on by `dt`, dropping it once complete.
fn advance_fade(owner: NodeHandle, sm: &mut StateMachineNode, active: StateIndex, dt: f32) {
    if sm.fade.as_mut().is_some_and(|fade| !fade.advance(dt)) {
        log::trace!("AnimationTree: {owner:?} cross-fade into state {active} complete");
        sm.fade = None;
    }
}
