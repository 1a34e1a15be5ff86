use smallvec::SmallVec;

use crate::pose::Pose;
use crate::root_motion::RootMotion;
use crate::tree::NodeHandle;
use crate::tree::blend::{Add2Node, Blend2Node};
use crate::tree::leaf::LeafNode;
use crate::tree::state_machine::{ExitNode, StateMachineNode};
use crate::tree::switch::SwitchNode;

/// Outcome of evaluating a node for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NodeStatus {
    /// The node has played to its end (or, for a looper leaf, reached its
    /// loop point) and is ready to hand over.
    pub finished: bool,
    /// Seconds of the tick's `dt` the node could not use because it stopped
    /// at its end. A state machine passes them on to the next state.
    pub leftover: f32,
}

/// Discriminant of [`NodeKind`], for queries that do not need the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Leaf,
    StateMachine,
    Switch,
    Blend2,
    Add2,
    Exit,
}

/// Variant payload of a tree node.
#[derive(Debug)]
pub enum NodeKind {
    Leaf(LeafNode),
    StateMachine(StateMachineNode),
    Switch(SwitchNode),
    Blend2(Blend2Node),
    Add2(Add2Node),
    Exit(ExitNode),
    /// Placeholder left in the arena while the node's payload is checked out
    /// for evaluation.
    Vacant,
}

impl NodeKind {
    #[must_use]
    pub fn node_type(&self) -> Option<NodeType> {
        match self {
            Self::Leaf(_) => Some(NodeType::Leaf),
            Self::StateMachine(_) => Some(NodeType::StateMachine),
            Self::Switch(_) => Some(NodeType::Switch),
            Self::Blend2(_) => Some(NodeType::Blend2),
            Self::Add2(_) => Some(NodeType::Add2),
            Self::Exit(_) => Some(NodeType::Exit),
            Self::Vacant => None,
        }
    }

    /// Every node directly referenced by this one.
    pub(crate) fn children(&self) -> SmallVec<[NodeHandle; 8]> {
        match self {
            Self::Leaf(_) | Self::Vacant => SmallVec::new(),
            Self::StateMachine(sm) => sm.states().iter().map(|s| s.node).collect(),
            Self::Switch(switch) => switch.inputs().iter().flatten().copied().collect(),
            Self::Blend2(blend) => blend.inputs().iter().flatten().copied().collect(),
            Self::Add2(add) => add.inputs().iter().flatten().copied().collect(),
            Self::Exit(exit) => exit.nested().into_iter().collect(),
        }
    }
}

/// One slot of the tree's node arena.
#[derive(Debug)]
pub struct TreeNode {
    pub(crate) handle: NodeHandle,
    /// Share of the roots' output this node contributed during the last update.
    pub(crate) weight: f32,
    pub(crate) pose: Pose,
    /// Root bone movement blended into this node's output during the last
    /// update; identity when the tree has no root bone.
    pub(crate) motion: RootMotion,
    pub(crate) status: NodeStatus,
    pub(crate) last_tick: u64,
    pub(crate) kind: NodeKind,
}

impl TreeNode {
    pub(crate) fn new(handle: NodeHandle, kind: NodeKind, bind_pose: &Pose) -> Self {
        Self {
            handle,
            weight: 0.0,
            pose: bind_pose.clone(),
            motion: RootMotion::IDENTITY,
            status: NodeStatus::default(),
            last_tick: 0,
            kind,
        }
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> NodeHandle {
        self.handle
    }

    #[inline]
    #[must_use]
    pub fn weight(&self) -> f32 {
        self.weight
    }

    #[inline]
    #[must_use]
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    #[inline]
    #[must_use]
    pub fn motion(&self) -> &RootMotion {
        &self.motion
    }

    #[inline]
    #[must_use]
    pub fn status(&self) -> NodeStatus {
        self.status
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }
}
