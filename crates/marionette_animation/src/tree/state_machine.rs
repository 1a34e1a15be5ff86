use std::collections::VecDeque;

use smallvec::SmallVec;

use crate::tree::blend::CrossFade;
use crate::tree::{EdgeHandle, NodeHandle};

/// Index of a state inside its state machine, in registration order.
/// State 0 is the entry state.
pub type StateIndex = usize;

/// When an edge fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransitionMode {
    /// Fires once the source state's child reports finished.
    #[default]
    OnDone,
    /// Fires as soon as the source state is active with no cross-fade
    /// running into it.
    Immediate,
    /// Fires only when a transition to its target is requested.
    Manual,
}

/// Whether an edge may be taken, and by whom.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EdgeStatus {
    /// Taken by requested transitions and travel only.
    On,
    /// Taken automatically when its mode allows, and by travel.
    #[default]
    Auto,
    /// Like `Auto`, but switches to the edge's `next_status` after being
    /// taken once.
    Once,
    /// Never taken.
    Off,
}

/// Parameters of a new edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeParams {
    pub mode: TransitionMode,
    /// Cross-fade length in seconds; zero switches instantly.
    pub cross_fade: f32,
    pub status: EdgeStatus,
    /// Status a `Once` edge takes after firing.
    pub next_status: EdgeStatus,
}

impl Default for EdgeParams {
    #[inline]
    fn default() -> Self {
        Self {
            mode: TransitionMode::OnDone,
            cross_fade: 0.0,
            status: EdgeStatus::Auto,
            next_status: EdgeStatus::Off,
        }
    }
}

/// A directed transition between two states of one state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub owner: NodeHandle,
    pub from: StateIndex,
    pub to: StateIndex,
    pub mode: TransitionMode,
    pub cross_fade: f32,
    pub status: EdgeStatus,
    pub next_status: EdgeStatus,
}

impl Edge {
    /// Whether requests and travel may use this edge.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status != EdgeStatus::Off
    }

    /// Whether the edge fires without being requested.
    #[inline]
    #[must_use]
    pub fn is_automatic(&self) -> bool {
        matches!(self.status, EdgeStatus::Auto | EdgeStatus::Once)
            && self.mode != TransitionMode::Manual
    }

    /// Whether the edge may fire now, given whether its source finished.
    #[inline]
    #[must_use]
    pub fn is_ready(&self, source_finished: bool) -> bool {
        match self.mode {
            TransitionMode::OnDone => source_finished,
            TransitionMode::Immediate | TransitionMode::Manual => true,
        }
    }

    /// Applies the status change of taking this edge.
    pub(crate) fn taken(&mut self) {
        if self.status == EdgeStatus::Once {
            self.status = self.next_status;
        }
    }
}

/// Parameters of a new state-machine node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateMachineParams {
    pub max_states: usize,
    pub max_edges: usize,
    /// When a requested target has no direct edge, walk the shortest chain
    /// of open edges instead of jumping straight to it.
    pub enable_travel: bool,
}

impl Default for StateMachineParams {
    #[inline]
    fn default() -> Self {
        Self {
            max_states: 8,
            max_edges: 16,
            enable_travel: true,
        }
    }
}

/// A state of the machine: the child node played while it is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineState {
    pub node: NodeHandle,
}

/// Result of [`AnimationTree::request_transition`](crate::tree::AnimationTree::request_transition).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The target is already the active state; nothing changed.
    AlreadyActive,
    /// A direct edge to the target was found.
    Started,
    /// The target is reached through a chain of `hops` edges.
    Travelling { hops: usize },
    /// No open path exists; the target became active without a fade.
    Teleported,
}

/// Runtime data of a state-machine node.
///
/// Exactly one state is active at a time. While a cross-fade is running the
/// node's output blends the outgoing state's pose into the active one.
#[derive(Debug)]
pub struct StateMachineNode {
    pub(crate) params: StateMachineParams,
    pub(crate) states: Vec<MachineState>,
    /// Edges owned by this machine, in registration order.
    pub(crate) edges: Vec<EdgeHandle>,

    pub(crate) active: Option<StateIndex>,
    pub(crate) fade: Option<CrossFade>,

    /// Remaining hops of a requested multi-edge travel.
    pub(crate) path: SmallVec<[EdgeHandle; 8]>,
    pub(crate) path_pos: usize,

    // Travel search scratch, sized at creation.
    visited: Vec<bool>,
    came_from: Vec<Option<EdgeHandle>>,
    queue: VecDeque<StateIndex>,
}

impl StateMachineNode {
    pub(crate) fn new(params: StateMachineParams) -> Self {
        let scratch = if params.enable_travel {
            params.max_states
        } else {
            0
        };
        Self {
            params,
            states: Vec::with_capacity(params.max_states),
            edges: Vec::with_capacity(params.max_edges),
            active: None,
            fade: None,
            path: SmallVec::new(),
            path_pos: 0,
            visited: Vec::with_capacity(scratch),
            came_from: Vec::with_capacity(scratch),
            queue: VecDeque::with_capacity(scratch),
        }
    }

    #[inline]
    #[must_use]
    pub fn params(&self) -> &StateMachineParams {
        &self.params
    }

    #[inline]
    #[must_use]
    pub fn states(&self) -> &[MachineState] {
        &self.states
    }

    #[inline]
    #[must_use]
    pub fn edges(&self) -> &[EdgeHandle] {
        &self.edges
    }

    #[inline]
    #[must_use]
    pub fn active_state(&self) -> Option<StateIndex> {
        self.active
    }

    #[inline]
    #[must_use]
    pub fn fade(&self) -> Option<&CrossFade> {
        self.fade.as_ref()
    }

    /// State being faded out, if a cross-fade is running.
    #[must_use]
    pub fn fading_state(&self) -> Option<StateIndex> {
        self.fade.map(|f| f.from)
    }

    /// Share of the active state in the output: the fade weight while a
    /// cross-fade runs, 1 otherwise.
    #[must_use]
    pub fn blend_weight(&self) -> f32 {
        self.fade.map_or(1.0, |f| f.weight())
    }

    /// Hops of a requested travel not yet taken.
    #[must_use]
    pub fn pending_hops(&self) -> &[EdgeHandle] {
        &self.path[self.path_pos..]
    }

    #[must_use]
    pub fn is_travelling(&self) -> bool {
        self.path_pos < self.path.len()
    }

    pub(crate) fn active_node(&self) -> Option<NodeHandle> {
        self.active.map(|s| self.states[s].node)
    }

    pub(crate) fn clear_path(&mut self) {
        self.path.clear();
        self.path_pos = 0;
    }

    /// Back to the entry state with no fade or travel pending.
    pub(crate) fn reset(&mut self) {
        self.active = if self.states.is_empty() { None } else { Some(0) };
        self.fade = None;
        self.clear_path();
    }

    /// Earliest registered open edge leaving `from` that satisfies
    /// `accept`.
    pub(crate) fn find_edge(
        &self,
        edges: &[Edge],
        from: StateIndex,
        mut accept: impl FnMut(&Edge) -> bool,
    ) -> Option<EdgeHandle> {
        self.edges.iter().copied().find(|handle| {
            let edge = &edges[handle.index()];
            edge.is_open() && edge.from == from && accept(edge)
        })
    }

    /// Whether `state` has no open outgoing edge.
    pub(crate) fn is_terminal(&self, edges: &[Edge], state: StateIndex) -> bool {
        self.find_edge(edges, state, |_| true).is_none()
    }

    /// Breadth-first search over open edges for the shortest chain from
    /// `from` to `to`. Ties go to the earliest registered edges.
    pub(crate) fn find_path(
        &mut self,
        edges: &[Edge],
        from: StateIndex,
        to: StateIndex,
    ) -> Option<SmallVec<[EdgeHandle; 8]>> {
        let count = self.states.len();
        self.visited.clear();
        self.visited.resize(count, false);
        self.came_from.clear();
        self.came_from.resize(count, None);
        self.queue.clear();

        self.visited[from] = true;
        self.queue.push_back(from);

        while let Some(state) = self.queue.pop_front() {
            if state == to {
                break;
            }
            for &handle in &self.edges {
                let edge = &edges[handle.index()];
                if !edge.is_open() || edge.from != state || self.visited[edge.to] {
                    continue;
                }
                self.visited[edge.to] = true;
                self.came_from[edge.to] = Some(handle);
                self.queue.push_back(edge.to);
            }
        }

        if !self.visited[to] || from == to {
            return None;
        }

        let mut path: SmallVec<[EdgeHandle; 8]> = SmallVec::new();
        let mut state = to;
        while let Some(handle) = self.came_from[state] {
            path.push(handle);
            state = edges[handle.index()].from;
        }
        path.reverse();
        Some(path)
    }
}

/// Wraps the node a state plays. A state machine whose active state is an
/// exit node stops following edges for the rest of the update and reports
/// finished once no cross-fade is running into it.
#[derive(Debug, Clone, Copy)]
pub struct ExitNode {
    pub(crate) nested: Option<NodeHandle>,
}

impl ExitNode {
    pub(crate) fn new(nested: Option<NodeHandle>) -> Self {
        Self { nested }
    }

    #[inline]
    #[must_use]
    pub fn nested(&self) -> Option<NodeHandle> {
        self.nested
    }
}
