//! Animation Tree
//!
//! A fixed-capacity arena of composable nodes evaluated once per frame from
//! one or more roots down to the leaves.
//!
//! # Node kinds
//!
//! - [`LeafNode`]: plays one clip (privately) or mirrors a player registered
//!   with the tree
//! - [`StateMachineNode`]: one active state at a time, edges fire on
//!   completion or on request, with cross-fades
//! - [`SwitchNode`]: one of N inputs chosen by the caller, with cross-fades
//!   and optional phase sync
//! - [`Blend2Node`]: fixed-weight blend of two inputs, optionally masked
//! - [`Add2Node`]: layers the second input's offset from the bind pose on
//!   top of the first, optionally masked
//! - [`ExitNode`]: wraps a state; a state machine that enters it stops
//!   chaining for the update and reports finished
//!
//! # Root motion
//!
//! With [`AnimationTree::set_root_bone`], leaves measure the root bone's
//! movement, composites blend it, and each root reports a
//! [`RootMotion`](crate::root_motion::RootMotion). The root bone in
//! [`AnimationTree::root_pose`] is pinned to where its clip started.
//!
//! # Ownership
//!
//! The tree owns every node, edge and pose buffer. Handles are indices into
//! arenas sized once in [`AnimationTree::with_settings`]; they are never
//! reused while the tree lives, and a full arena reports
//! [`CapacityExceeded`](AnimationError::CapacityExceeded) instead of growing.
//!
//! Every construction call validates all of its inputs before touching the
//! graph, so a failed call leaves the tree exactly as it was. Attachments
//! that would make a node its own descendant are rejected with
//! [`CyclicGraph`](AnimationError::CyclicGraph), which is what lets
//! [`AnimationTree::update`] walk the graph without ever failing.
//!
//! ```rust,ignore
//! let mut tree = AnimationTree::new(skeleton, 16, 32);
//! let idle = tree.create_leaf_node(idle_clip, LeafParams::default())?;
//! let jump = tree.create_leaf_node(jump_clip, LeafParams { looping: Some(false), ..Default::default() })?;
//!
//! let sm = tree.create_state_machine_node(StateMachineParams::default())?;
//! let s_idle = tree.add_state(sm, idle)?;
//! let s_jump = tree.add_state(sm, jump)?;
//! tree.create_edge(sm, s_idle, s_jump, EdgeParams { mode: TransitionMode::Manual, cross_fade: 0.2, ..Default::default() })?;
//! tree.create_edge(sm, s_jump, s_idle, EdgeParams { cross_fade: 0.3, ..Default::default() })?;
//! tree.add_root(sm)?;
//!
//! tree.request_transition(sm, s_jump)?;
//! tree.update(dt);
//! let pose = tree.root_pose(0);
//! ```

mod blend;
mod control;
mod eval;
mod graph;
mod leaf;
mod node;
mod state_machine;
mod switch;

use std::sync::Arc;

use marionette_core::{AnimationError, BoneTransform, Result};

use crate::clip::AnimationClip;
use crate::library::ClipLibrary;
use crate::player::{AnimationPlayer, StateHandle, check_clip_fits};
use crate::pose::Pose;
use crate::root_motion::RootMotion;
use crate::settings::TreeSettings;
use crate::skeleton::{BoneMask, Skeleton};

pub use blend::{Add2Node, Add2Params, Blend2Node, Blend2Params, CrossFade};
pub use leaf::{LeafCallback, LeafNode, LeafParams, LeafSource};
pub use node::{NodeKind, NodeStatus, NodeType, TreeNode};
pub use state_machine::{
    Edge, EdgeParams, EdgeStatus, ExitNode, MachineState, StateIndex, StateMachineNode,
    StateMachineParams, TransitionMode, TransitionOutcome,
};
pub use switch::{SwitchNode, SwitchParams};

/// Index of a node in its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(pub u32);

impl NodeHandle {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of an edge in its tree's edge arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeHandle(pub u32);

impl EdgeHandle {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a player registered with a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub u32);

impl PlayerId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Called for every bone of every root's output pose at the end of an
/// update, after root motion is removed. May rewrite the transform.
pub type TreeCallback = Box<dyn FnMut(usize, &mut BoneTransform) + Send>;

pub(crate) struct PlayerSlot {
    pub(crate) player: AnimationPlayer,
    pub(crate) last_tick: u64,
}

pub(crate) struct RootOutput {
    pub(crate) pose: Pose,
    pub(crate) motion: RootMotion,
}

/// Owner of a node graph and everything it evaluates into.
pub struct AnimationTree {
    skeleton: Arc<Skeleton>,
    settings: TreeSettings,

    pub(crate) nodes: Vec<TreeNode>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) players: Vec<PlayerSlot>,
    pub(crate) roots: Vec<NodeHandle>,
    /// Per-root output, in root registration order.
    pub(crate) outputs: Vec<RootOutput>,

    pub(crate) root_bone: Option<usize>,
    pub(crate) callback: Option<TreeCallback>,

    /// Incremented at the start of every update; nodes and players stamped
    /// with the current tick are not evaluated again.
    pub(crate) tick: u64,
}

impl AnimationTree {
    /// Creates a tree with room for `max_nodes` nodes and `max_edges` edges.
    #[must_use]
    pub fn new(skeleton: Arc<Skeleton>, max_nodes: usize, max_edges: usize) -> Self {
        Self::with_settings(skeleton, TreeSettings::with_capacity(max_nodes, max_edges))
    }

    #[must_use]
    pub fn with_settings(skeleton: Arc<Skeleton>, settings: TreeSettings) -> Self {
        log::debug!(
            "AnimationTree: created for '{}' ({} nodes, {} edges)",
            skeleton.name,
            settings.max_nodes,
            settings.max_edges
        );
        Self {
            skeleton,
            nodes: Vec::with_capacity(settings.max_nodes),
            edges: Vec::with_capacity(settings.max_edges),
            players: Vec::with_capacity(settings.max_players),
            roots: Vec::with_capacity(settings.max_roots),
            outputs: Vec::with_capacity(settings.max_roots),
            root_bone: None,
            callback: None,
            settings,
            tick: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn skeleton(&self) -> &Arc<Skeleton> {
        &self.skeleton
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &TreeSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    #[inline]
    #[must_use]
    pub fn roots(&self) -> &[NodeHandle] {
        &self.roots
    }

    // ========================================================================
    // Node Creation
    // ========================================================================

    fn push_node(&mut self, mut kind: NodeKind) -> Result<NodeHandle> {
        if self.nodes.len() >= self.settings.max_nodes {
            return Err(AnimationError::capacity("tree nodes", self.settings.max_nodes));
        }
        let handle = NodeHandle(self.nodes.len() as u32);
        log::debug!("AnimationTree: created {:?} node {handle:?}", kind.node_type());
        if let NodeKind::Leaf(leaf) = &mut kind {
            leaf.track_root(self.root_bone, self.skeleton.bind_pose());
        }
        self.nodes
            .push(TreeNode::new(handle, kind, self.skeleton.bind_pose()));
        Ok(handle)
    }

    fn ensure_node_slot(&self) -> Result<()> {
        if self.nodes.len() >= self.settings.max_nodes {
            return Err(AnimationError::capacity("tree nodes", self.settings.max_nodes));
        }
        Ok(())
    }

    fn check_mask(&self, mask: Option<&BoneMask>) -> Result<()> {
        if let Some(mask) = mask
            && mask.bone_count() != self.skeleton.bone_count()
        {
            return Err(AnimationError::SkeletonMismatch {
                expected: self.skeleton.bone_count(),
                found: mask.bone_count(),
            });
        }
        Ok(())
    }

    /// Creates a leaf playing `clip` on a state private to the node.
    pub fn create_leaf_node(
        &mut self,
        clip: Arc<AnimationClip>,
        params: LeafParams,
    ) -> Result<NodeHandle> {
        self.ensure_node_slot()?;
        check_clip_fits(&self.skeleton, &clip)?;
        self.push_node(NodeKind::Leaf(LeafNode::from_clip(clip, params)))
    }

    /// Creates a leaf playing the clip named `name` from `library`.
    pub fn create_leaf_from_library(
        &mut self,
        library: &ClipLibrary,
        name: &str,
        params: LeafParams,
    ) -> Result<NodeHandle> {
        let clip = Arc::clone(library.find(name)?);
        self.create_leaf_node(clip, params)
    }

    /// Creates a leaf that outputs a registered player's pose and reports
    /// `state`'s completion.
    pub fn create_player_leaf(&mut self, player: PlayerId, state: StateHandle) -> Result<NodeHandle> {
        self.ensure_node_slot()?;
        if !self.player(player)?.contains(state) {
            return Err(AnimationError::invalid("player state", player.index()));
        }
        self.push_node(NodeKind::Leaf(LeafNode::from_player(player, state)))
    }

    pub fn create_state_machine_node(&mut self, params: StateMachineParams) -> Result<NodeHandle> {
        self.push_node(NodeKind::StateMachine(StateMachineNode::new(params)))
    }

    /// Creates a switch with `input_count` unconnected input slots.
    pub fn create_switch_node(
        &mut self,
        input_count: usize,
        params: SwitchParams,
    ) -> Result<NodeHandle> {
        self.ensure_node_slot()?;
        if params.active_input >= input_count {
            return Err(AnimationError::invalid("switch input", params.active_input));
        }
        self.push_node(NodeKind::Switch(SwitchNode::new(input_count, params)))
    }

    pub fn create_blend2_node(&mut self, params: Blend2Params) -> Result<NodeHandle> {
        self.ensure_node_slot()?;
        self.check_mask(params.mask.as_ref())?;
        self.push_node(NodeKind::Blend2(Blend2Node::new(params)))
    }

    /// Creates an additive node: input 0 is the base, input 1 the layer.
    pub fn create_add2_node(&mut self, params: Add2Params) -> Result<NodeHandle> {
        self.ensure_node_slot()?;
        self.check_mask(params.mask.as_ref())?;
        self.push_node(NodeKind::Add2(Add2Node::new(params)))
    }

    /// Creates an exit node wrapping `nested`, to be added as a state.
    pub fn create_exit_node(&mut self, nested: NodeHandle) -> Result<NodeHandle> {
        self.ensure_node_slot()?;
        self.node(nested)?;
        // A fresh node has no parents, so wrapping cannot close a cycle.
        self.push_node(NodeKind::Exit(ExitNode::new(Some(nested))))
    }

    // ========================================================================
    // Graph Building
    // ========================================================================

    /// Appends a state playing `child`. The first state added becomes the
    /// entry state and is active immediately.
    pub fn add_state(&mut self, sm: NodeHandle, child: NodeHandle) -> Result<StateIndex> {
        self.node(child)?;
        let machine = self.state_machine(sm)?;
        let index = machine.states.len();
        let capacity = machine.params.max_states;

        self.check_acyclic(sm, child)?;
        if index >= capacity {
            return Err(AnimationError::capacity("state machine states", capacity));
        }

        let machine = self.state_machine_mut(sm)?;
        machine.states.push(MachineState { node: child });
        if machine.active.is_none() {
            machine.active = Some(0);
        }
        log::debug!("AnimationTree: {sm:?} state {index} -> {child:?}");
        Ok(index)
    }

    /// Registers a transition between two states of `sm`. Registration order
    /// breaks ties between edges eligible in the same tick.
    pub fn create_edge(
        &mut self,
        sm: NodeHandle,
        from: StateIndex,
        to: StateIndex,
        params: EdgeParams,
    ) -> Result<EdgeHandle> {
        let machine = self.state_machine(sm)?;
        let state_count = machine.states.len();
        if from >= state_count {
            return Err(AnimationError::invalid("state", from));
        }
        if to >= state_count {
            return Err(AnimationError::invalid("state", to));
        }
        if machine.edges.len() >= machine.params.max_edges {
            return Err(AnimationError::capacity(
                "state machine edges",
                machine.params.max_edges,
            ));
        }
        if self.edges.len() >= self.settings.max_edges {
            return Err(AnimationError::capacity("tree edges", self.settings.max_edges));
        }

        let handle = EdgeHandle(self.edges.len() as u32);
        self.edges.push(Edge {
            owner: sm,
            from,
            to,
            mode: params.mode,
            cross_fade: params.cross_fade.max(0.0),
            status: params.status,
            next_status: params.next_status,
        });
        self.state_machine_mut(sm)?.edges.push(handle);
        log::debug!("AnimationTree: {sm:?} edge {handle:?} {from} -> {to} ({:?})", params.mode);
        Ok(handle)
    }

    /// Connects `child` to input `slot` of a switch, blend2, add2 or exit
    /// node, replacing whatever was connected there.
    pub fn set_input(&mut self, parent: NodeHandle, slot: usize, child: NodeHandle) -> Result<()> {
        self.node(child)?;
        match &self.node(parent)?.kind {
            NodeKind::Switch(switch) if slot >= switch.inputs.len() => {
                return Err(AnimationError::invalid("switch input", slot));
            }
            NodeKind::Blend2(_) | NodeKind::Add2(_) if slot >= 2 => {
                return Err(AnimationError::invalid("blend input", slot));
            }
            NodeKind::Exit(_) if slot >= 1 => {
                return Err(AnimationError::invalid("exit input", slot));
            }
            NodeKind::Switch(_) | NodeKind::Blend2(_) | NodeKind::Add2(_) | NodeKind::Exit(_) => {}
            _ => return Err(AnimationError::invalid("composite node", parent.index())),
        }
        self.check_acyclic(parent, child)?;

        match &mut self.nodes[parent.index()].kind {
            NodeKind::Switch(switch) => switch.inputs[slot] = Some(child),
            NodeKind::Blend2(blend) => blend.inputs[slot] = Some(child),
            NodeKind::Add2(add) => add.inputs[slot] = Some(child),
            NodeKind::Exit(exit) => exit.nested = Some(child),
            _ => {}
        }
        log::debug!("AnimationTree: {parent:?} input {slot} -> {child:?}");
        Ok(())
    }

    /// Registers an evaluation root. Adding the same node twice is a no-op.
    pub fn add_root(&mut self, node: NodeHandle) -> Result<()> {
        self.node(node)?;
        if self.roots.contains(&node) {
            return Ok(());
        }
        if self.roots.len() >= self.settings.max_roots {
            return Err(AnimationError::capacity("tree roots", self.settings.max_roots));
        }
        self.roots.push(node);
        self.outputs.push(RootOutput {
            pose: self.skeleton.bind_pose().clone(),
            motion: RootMotion::IDENTITY,
        });
        log::debug!("AnimationTree: root {node:?}");
        Ok(())
    }

    /// Enables root motion on `bone`, or disables it with `None`.
    pub fn set_root_bone(&mut self, bone: Option<usize>) -> Result<()> {
        if let Some(bone) = bone
            && bone >= self.skeleton.bone_count()
        {
            return Err(AnimationError::invalid("bone", bone));
        }
        self.root_bone = bone;
        let bind = self.skeleton.bind_pose();
        for node in &mut self.nodes {
            if let NodeKind::Leaf(leaf) = &mut node.kind {
                leaf.track_root(bone, bind);
            }
            node.motion = RootMotion::IDENTITY;
        }
        for output in &mut self.outputs {
            output.motion = RootMotion::IDENTITY;
        }
        log::debug!("AnimationTree: root bone {bone:?}");
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn root_bone(&self) -> Option<usize> {
        self.root_bone
    }

    /// Installs a callback run on every root's output pose after each
    /// update, replacing any previous one.
    pub fn set_update_callback(&mut self, callback: Option<TreeCallback>) {
        self.callback = callback;
    }

    /// Installs a callback run on a clip-backed leaf's pose right after it
    /// is sampled, replacing any previous one.
    pub fn set_leaf_callback(&mut self, leaf: NodeHandle, callback: Option<LeafCallback>) -> Result<()> {
        self.leaf_mut(leaf)?.callback = callback;
        Ok(())
    }

    /// Hands a player to the tree so that leaves can be bound to its states.
    pub fn add_player(&mut self, player: AnimationPlayer) -> Result<PlayerId> {
        if self.players.len() >= self.settings.max_players {
            return Err(AnimationError::capacity("tree players", self.settings.max_players));
        }
        let found = player.skeleton().bone_count();
        if found != self.skeleton.bone_count() {
            return Err(AnimationError::SkeletonMismatch {
                expected: self.skeleton.bone_count(),
                found,
            });
        }

        let id = PlayerId(self.players.len() as u32);
        self.players.push(PlayerSlot {
            player,
            last_tick: 0,
        });
        Ok(id)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn node(&self, handle: NodeHandle) -> Result<&TreeNode> {
        self.nodes
            .get(handle.index())
            .ok_or(AnimationError::invalid("node", handle.index()))
    }

    #[must_use]
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn edge(&self, handle: EdgeHandle) -> Result<&Edge> {
        self.edges
            .get(handle.index())
            .ok_or(AnimationError::invalid("edge", handle.index()))
    }

    pub fn player(&self, id: PlayerId) -> Result<&AnimationPlayer> {
        self.players
            .get(id.index())
            .map(|slot| &slot.player)
            .ok_or(AnimationError::invalid("player", id.index()))
    }

    /// Mutable access to a registered player, e.g. to retune weights.
    pub fn player_mut(&mut self, id: PlayerId) -> Result<&mut AnimationPlayer> {
        self.players
            .get_mut(id.index())
            .map(|slot| &mut slot.player)
            .ok_or(AnimationError::invalid("player", id.index()))
    }

    /// Output pose of `node` as of the last update.
    pub fn pose(&self, node: NodeHandle) -> Result<&Pose> {
        Ok(&self.node(node)?.pose)
    }

    /// Output pose of the `index`-th root, in registration order.
    ///
    /// Equals the root node's pose unless a root bone or an update callback
    /// is set.
    #[must_use]
    pub fn root_pose(&self, index: usize) -> Option<&Pose> {
        self.outputs.get(index).map(|output| &output.pose)
    }

    /// Root motion of the `index`-th root during the last update. Identity
    /// while no root bone is set.
    #[must_use]
    pub fn root_motion(&self, index: usize) -> Option<&RootMotion> {
        self.outputs.get(index).map(|output| &output.motion)
    }

    /// Share of the roots' output `node` contributed during the last update.
    pub fn node_weight(&self, node: NodeHandle) -> Result<f32> {
        Ok(self.node(node)?.weight)
    }

    pub fn node_status(&self, node: NodeHandle) -> Result<NodeStatus> {
        Ok(self.node(node)?.status)
    }

    pub fn leaf(&self, handle: NodeHandle) -> Result<&LeafNode> {
        match &self.node(handle)?.kind {
            NodeKind::Leaf(leaf) => Ok(leaf),
            _ => Err(AnimationError::invalid("leaf node", handle.index())),
        }
    }

    pub fn leaf_mut(&mut self, handle: NodeHandle) -> Result<&mut LeafNode> {
        match &mut self.node_mut(handle)?.kind {
            NodeKind::Leaf(leaf) => Ok(leaf),
            _ => Err(AnimationError::invalid("leaf node", handle.index())),
        }
    }

    pub fn state_machine(&self, handle: NodeHandle) -> Result<&StateMachineNode> {
        match &self.node(handle)?.kind {
            NodeKind::StateMachine(sm) => Ok(sm),
            _ => Err(AnimationError::invalid("state machine node", handle.index())),
        }
    }

    pub fn switch(&self, handle: NodeHandle) -> Result<&SwitchNode> {
        match &self.node(handle)?.kind {
            NodeKind::Switch(switch) => Ok(switch),
            _ => Err(AnimationError::invalid("switch node", handle.index())),
        }
    }

    pub fn blend2(&self, handle: NodeHandle) -> Result<&Blend2Node> {
        match &self.node(handle)?.kind {
            NodeKind::Blend2(blend) => Ok(blend),
            _ => Err(AnimationError::invalid("blend2 node", handle.index())),
        }
    }

    pub fn add2(&self, handle: NodeHandle) -> Result<&Add2Node> {
        match &self.node(handle)?.kind {
            NodeKind::Add2(add) => Ok(add),
            _ => Err(AnimationError::invalid("add2 node", handle.index())),
        }
    }

    pub fn exit(&self, handle: NodeHandle) -> Result<&ExitNode> {
        match &self.node(handle)?.kind {
            NodeKind::Exit(exit) => Ok(exit),
            _ => Err(AnimationError::invalid("exit node", handle.index())),
        }
    }

    fn node_mut(&mut self, handle: NodeHandle) -> Result<&mut TreeNode> {
        self.nodes
            .get_mut(handle.index())
            .ok_or(AnimationError::invalid("node", handle.index()))
    }

    pub(crate) fn state_machine_mut(&mut self, handle: NodeHandle) -> Result<&mut StateMachineNode> {
        match &mut self.node_mut(handle)?.kind {
            NodeKind::StateMachine(sm) => Ok(sm),
            _ => Err(AnimationError::invalid("state machine node", handle.index())),
        }
    }

    pub(crate) fn switch_mut(&mut self, handle: NodeHandle) -> Result<&mut SwitchNode> {
        match &mut self.node_mut(handle)?.kind {
            NodeKind::Switch(switch) => Ok(switch),
            _ => Err(AnimationError::invalid("switch node", handle.index())),
        }
    }

    pub(crate) fn blend2_mut(&mut self, handle: NodeHandle) -> Result<&mut Blend2Node> {
        match &mut self.node_mut(handle)?.kind {
            NodeKind::Blend2(blend) => Ok(blend),
            _ => Err(AnimationError::invalid("blend2 node", handle.index())),
        }
    }

    pub(crate) fn add2_mut(&mut self, handle: NodeHandle) -> Result<&mut Add2Node> {
        match &mut self.node_mut(handle)?.kind {
            NodeKind::Add2(add) => Ok(add),
            _ => Err(AnimationError::invalid("add2 node", handle.index())),
        }
    }
}
