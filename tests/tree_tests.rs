//! Animation Tree Tests
//!
//! Tests for:
//! - Arena capacity and reference validation
//! - Cycle rejection at attach time
//! - State machine transitions (OnDone, requested, travel, teleport)
//! - Cross-fade weights and instant switches
//! - Switch nodes (selection errors, synced phase, fades)
//! - Blend2 masks, shared subtrees and player-backed leaves
//! - Add2 layers, edge status, looper leaves and exit states
//! - Root motion and update callbacks

use std::sync::Arc;

use glam::Vec3;

use marionette::animation::tree::{EdgeHandle, NodeHandle, PlayerId, TransitionOutcome};
use marionette::animation::{
    Add2Params, AnimationClip, AnimationPlayer, AnimationTree, Blend2Params, BoneChannel,
    ClipLibrary, EdgeParams, EdgeStatus, InterpolationMode, KeyframeTrack, LeafParams,
    PlaybackState, Skeleton, StateMachineParams, SwitchParams, TransitionMode, TreeSettings,
};
use marionette::core::{AnimationError, BoneTransform};

const EPSILON: f32 = 1e-5;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn vec3_approx(a: Vec3, b: Vec3) -> bool {
    a.abs_diff_eq(b, EPSILON)
}

fn skeleton() -> Arc<Skeleton> {
    let names = vec!["hips".to_string(), "spine".to_string(), "head".to_string()];
    let binds = [BoneTransform::from_translation(Vec3::Y); 3];
    Arc::new(Skeleton::from_bind_pose("rig", names, &[-1, 0, 1], &binds).unwrap())
}

/// Clip whose bone 0 translation.x equals the playback time.
fn ramp_clip(name: &str, duration: f32, looping: bool) -> Arc<AnimationClip> {
    Arc::new(
        AnimationClip::new(
            name,
            vec![BoneChannel::new(0).with_translation(KeyframeTrack::new(
                vec![0.0, duration],
                vec![Vec3::ZERO, Vec3::new(duration, 0.0, 0.0)],
                InterpolationMode::Linear,
            ).unwrap())],
        )
        .looped(looping),
    )
}

/// One-second looping clip holding `bone` at `translation`.
fn hold_clip(bones: &[(usize, Vec3)]) -> Arc<AnimationClip> {
    let channels = bones
        .iter()
        .map(|&(bone, t)| BoneChannel::new(bone).with_translation(KeyframeTrack::constant(t)))
        .collect();
    Arc::new(AnimationClip::with_duration("hold", 1.0, channels).looped(true))
}

fn root_x(tree: &AnimationTree) -> f32 {
    tree.root_pose(0).unwrap().transforms()[0].translation.x
}

fn leaf_time(tree: &AnimationTree, leaf: NodeHandle) -> f32 {
    tree.leaf(leaf).unwrap().playback().unwrap().time()
}

fn edge(mode: TransitionMode, cross_fade: f32) -> EdgeParams {
    EdgeParams {
        mode,
        cross_fade,
        ..Default::default()
    }
}

/// State machine with leaves A (2s) and B (3s) and one A -> B edge.
struct Machine {
    tree: AnimationTree,
    sm: NodeHandle,
    a: NodeHandle,
    b: NodeHandle,
}

fn two_state_machine(a_loops: bool, params: EdgeParams) -> Machine {
    let mut tree = AnimationTree::new(skeleton(), 8, 8);
    let a = tree
        .create_leaf_node(ramp_clip("a", 2.0, a_loops), LeafParams::default())
        .unwrap();
    let b = tree
        .create_leaf_node(ramp_clip("b", 3.0, true), LeafParams::default())
        .unwrap();
    let sm = tree
        .create_state_machine_node(StateMachineParams::default())
        .unwrap();
    tree.add_state(sm, a).unwrap();
    tree.add_state(sm, b).unwrap();
    tree.create_edge(sm, 0, 1, params).unwrap();
    tree.add_root(sm).unwrap();
    Machine { tree, sm, a, b }
}

// ============================================================================
// Construction & Validation
// ============================================================================

#[test]
fn node_arena_capacity_is_fixed() {
    let mut tree = AnimationTree::new(skeleton(), 2, 4);
    let clip = ramp_clip("a", 1.0, true);
    tree.create_leaf_node(clip.clone(), LeafParams::default())
        .unwrap();
    tree.create_switch_node(2, SwitchParams::default()).unwrap();

    let err = tree
        .create_leaf_node(clip, LeafParams::default())
        .unwrap_err();
    assert_eq!(
        err,
        AnimationError::CapacityExceeded {
            what: "tree nodes",
            capacity: 2
        }
    );
    assert_eq!(tree.node_count(), 2);
}

#[test]
fn create_edge_with_unknown_state_leaves_edges_unchanged() {
    let Machine { mut tree, sm, .. } = two_state_machine(false, edge(TransitionMode::OnDone, 0.3));
    assert_eq!(tree.edge_count(), 1);

    let err = tree
        .create_edge(sm, 0, 2, edge(TransitionMode::Manual, 0.0))
        .unwrap_err();
    assert_eq!(err, AnimationError::InvalidReference { what: "state", index: 2 });
    assert_eq!(tree.edge_count(), 1);
    assert_eq!(tree.state_machine(sm).unwrap().edges().len(), 1);
}

#[test]
fn edge_capacity_per_machine_and_per_tree() {
    let mut tree = AnimationTree::with_settings(
        skeleton(),
        TreeSettings {
            max_edges: 2,
            ..Default::default()
        },
    );
    let leaf = tree
        .create_leaf_node(ramp_clip("a", 1.0, true), LeafParams::default())
        .unwrap();
    let small = tree
        .create_state_machine_node(StateMachineParams {
            max_edges: 1,
            ..Default::default()
        })
        .unwrap();
    tree.add_state(small, leaf).unwrap();
    tree.create_edge(small, 0, 0, EdgeParams::default()).unwrap();
    assert!(matches!(
        tree.create_edge(small, 0, 0, EdgeParams::default()),
        Err(AnimationError::CapacityExceeded {
            what: "state machine edges",
            ..
        })
    ));

    let big = tree
        .create_state_machine_node(StateMachineParams::default())
        .unwrap();
    tree.add_state(big, leaf).unwrap();
    tree.create_edge(big, 0, 0, EdgeParams::default()).unwrap();
    assert_eq!(
        tree.create_edge(big, 0, 0, EdgeParams::default()),
        Err(AnimationError::CapacityExceeded {
            what: "tree edges",
            capacity: 2
        })
    );
    assert_eq!(tree.edge_count(), 2);
}

#[test]
fn state_capacity_is_enforced() {
    let mut tree = AnimationTree::new(skeleton(), 8, 8);
    let leaf = tree
        .create_leaf_node(ramp_clip("a", 1.0, true), LeafParams::default())
        .unwrap();
    let sm = tree
        .create_state_machine_node(StateMachineParams {
            max_states: 1,
            ..Default::default()
        })
        .unwrap();

    assert_eq!(tree.add_state(sm, leaf), Ok(0));
    assert!(matches!(
        tree.add_state(sm, leaf),
        Err(AnimationError::CapacityExceeded { .. })
    ));
    assert_eq!(tree.state_machine(sm).unwrap().states().len(), 1);
}

#[test]
fn stale_handles_and_wrong_kinds_are_rejected() {
    let Machine { mut tree, sm, a, .. } = two_state_machine(true, EdgeParams::default());

    assert!(matches!(
        tree.add_root(NodeHandle(42)),
        Err(AnimationError::InvalidReference { index: 42, .. })
    ));
    assert!(matches!(
        tree.set_input(a, 0, sm),
        Err(AnimationError::InvalidReference { .. })
    ));
    assert!(matches!(
        tree.request_transition(a, 0),
        Err(AnimationError::InvalidReference { .. })
    ));
    assert!(matches!(
        tree.set_edge_enabled(EdgeHandle(9), false),
        Err(AnimationError::InvalidReference { .. })
    ));
    assert!(matches!(
        tree.player(PlayerId(0)),
        Err(AnimationError::InvalidReference { .. })
    ));
}

#[test]
fn leaf_from_library_reports_missing_clip() {
    let mut library = ClipLibrary::new();
    library.add(AnimationClip::clone(&ramp_clip("walk", 1.0, true)));
    let mut tree = AnimationTree::new(skeleton(), 4, 4);

    assert!(tree
        .create_leaf_from_library(&library, "walk", LeafParams::default())
        .is_ok());
    assert_eq!(
        tree.create_leaf_from_library(&library, "swim", LeafParams::default()),
        Err(AnimationError::ClipNotFound("swim".to_string()))
    );
    assert_eq!(tree.node_count(), 1);
}

// ============================================================================
// Cycle Rejection
// ============================================================================

#[test]
fn attaching_node_to_itself_is_cyclic() {
    let mut tree = AnimationTree::new(skeleton(), 4, 4);
    let sm = tree
        .create_state_machine_node(StateMachineParams::default())
        .unwrap();

    assert_eq!(
        tree.add_state(sm, sm),
        Err(AnimationError::CyclicGraph {
            parent: sm.index(),
            child: sm.index()
        })
    );
    assert!(tree.state_machine(sm).unwrap().states().is_empty());
}

#[test]
fn attaching_ancestor_below_descendant_is_cyclic() {
    let mut tree = AnimationTree::new(skeleton(), 8, 8);
    let leaf = tree
        .create_leaf_node(ramp_clip("a", 1.0, true), LeafParams::default())
        .unwrap();
    let switch = tree.create_switch_node(2, SwitchParams::default()).unwrap();
    let sm = tree
        .create_state_machine_node(StateMachineParams::default())
        .unwrap();
    let blend = tree.create_blend2_node(Blend2Params::default()).unwrap();

    // sm -> blend -> switch -> leaf
    tree.set_input(switch, 0, leaf).unwrap();
    tree.set_input(blend, 0, switch).unwrap();
    tree.add_state(sm, blend).unwrap();

    let err = tree.set_input(switch, 1, sm).unwrap_err();
    assert_eq!(
        err,
        AnimationError::CyclicGraph {
            parent: switch.index(),
            child: sm.index()
        }
    );
    assert_eq!(tree.switch(switch).unwrap().inputs(), &[Some(leaf), None]);
    assert_eq!(tree.state_machine(sm).unwrap().states().len(), 1);

    // Sharing without a cycle is fine.
    tree.set_input(blend, 1, leaf).unwrap();
}

// ============================================================================
// State Machine: Automatic Transitions
// ============================================================================

#[test]
fn on_done_edge_fires_when_non_looping_state_finishes() {
    let Machine { mut tree, sm, a, b } = two_state_machine(false, edge(TransitionMode::OnDone, 0.3));

    for _ in 0..7 {
        tree.update(0.25);
    }
    assert_eq!(tree.state_machine(sm).unwrap().active_state(), Some(0));

    // A reaches 2.0s: the edge fires, fade weight is still 0.
    tree.update(0.25);
    let machine = tree.state_machine(sm).unwrap();
    assert_eq!(machine.active_state(), Some(1));
    assert_eq!(machine.fading_state(), Some(0));
    assert_eq!(machine.blend_weight(), 0.0);
    assert!(approx(root_x(&tree), 2.0));
    assert!(approx(leaf_time(&tree, b), 0.0));

    // Halfway through the 0.3s fade.
    tree.update(0.15);
    let machine = tree.state_machine(sm).unwrap();
    assert!(approx(machine.blend_weight(), 0.5));
    assert!(approx(root_x(&tree), 0.5 * 2.0 + 0.5 * 0.15));
    assert!(approx(tree.node_weight(a).unwrap(), 0.5));
    assert!(approx(tree.node_weight(b).unwrap(), 0.5));

    // Fade complete: pure B.
    tree.update(0.2);
    let machine = tree.state_machine(sm).unwrap();
    assert!(machine.fade().is_none());
    assert_eq!(machine.blend_weight(), 1.0);
    assert!(approx(root_x(&tree), 0.35));
    assert!(approx(tree.node_weight(a).unwrap(), 0.0));
    assert!(approx(tree.node_weight(b).unwrap(), 1.0));
}

#[test]
fn on_done_edge_never_fires_from_looping_state() {
    let Machine { mut tree, sm, .. } = two_state_machine(true, edge(TransitionMode::OnDone, 0.3));

    for _ in 0..40 {
        tree.update(0.25);
    }
    let machine = tree.state_machine(sm).unwrap();
    assert_eq!(machine.active_state(), Some(0));
    assert!(machine.fade().is_none());
}

#[test]
fn zero_cross_fade_switches_without_blend_frame() {
    let Machine { mut tree, sm, b, .. } = two_state_machine(false, edge(TransitionMode::OnDone, 0.0));

    for _ in 0..8 {
        tree.update(0.25);
    }
    let machine = tree.state_machine(sm).unwrap();
    assert_eq!(machine.active_state(), Some(1));
    assert!(machine.fade().is_none());
    // Target pose at its restart time, unblended.
    assert_eq!(tree.root_pose(0), Some(tree.pose(b).unwrap()));
    assert!(approx(root_x(&tree), 0.0));

    tree.update(0.25);
    assert!(approx(root_x(&tree), 0.25));
}

#[test]
fn finished_state_hands_leftover_time_to_next_state() {
    let Machine { mut tree, sm, b, .. } = two_state_machine(false, edge(TransitionMode::OnDone, 0.0));

    tree.update(1.75);
    // A needs 0.25s of this step to reach its end; B plays the other 0.25s.
    tree.update(0.5);
    assert_eq!(tree.state_machine(sm).unwrap().active_state(), Some(1));
    assert!(approx(leaf_time(&tree, b), 0.25));
    assert!(approx(root_x(&tree), 0.25));
}

#[test]
fn leftover_time_also_advances_the_cross_fade() {
    let Machine { mut tree, sm, b, .. } = two_state_machine(false, edge(TransitionMode::OnDone, 0.5));

    tree.update(1.75);
    tree.update(0.5);
    let machine = tree.state_machine(sm).unwrap();
    assert_eq!(machine.active_state(), Some(1));
    assert!(approx(machine.blend_weight(), 0.5));
    assert!(approx(leaf_time(&tree, b), 0.25));
    assert!(approx(root_x(&tree), 0.5 * 2.0 + 0.5 * 0.25));
}

#[test]
fn short_states_chain_within_one_update() {
    let mut tree = AnimationTree::new(skeleton(), 8, 8);
    let sm = tree
        .create_state_machine_node(StateMachineParams::default())
        .unwrap();
    for (name, duration, looping) in [("a", 0.5, false), ("b", 0.25, false), ("c", 2.0, true)] {
        let leaf = tree
            .create_leaf_node(ramp_clip(name, duration, looping), LeafParams::default())
            .unwrap();
        tree.add_state(sm, leaf).unwrap();
    }
    tree.create_edge(sm, 0, 1, edge(TransitionMode::OnDone, 0.0))
        .unwrap();
    tree.create_edge(sm, 1, 2, edge(TransitionMode::OnDone, 0.0))
        .unwrap();
    tree.add_root(sm).unwrap();

    // 0.5s for A, 0.25s for B, the rest goes to C.
    tree.update(1.0);
    assert_eq!(tree.state_machine(sm).unwrap().active_state(), Some(2));
    assert!(approx(root_x(&tree), 0.25));
}

#[test]
fn inactive_states_are_frozen() {
    let Machine { mut tree, a, b, .. } = two_state_machine(true, edge(TransitionMode::Manual, 0.0));

    tree.update(0.5);
    tree.update(0.5);
    assert!(approx(leaf_time(&tree, a), 1.0));
    assert!(approx(leaf_time(&tree, b), 0.0));
}

#[test]
fn earliest_registered_edge_wins() {
    let mut tree = AnimationTree::new(skeleton(), 8, 8);
    let a = tree
        .create_leaf_node(ramp_clip("a", 1.0, false), LeafParams::default())
        .unwrap();
    let b = tree
        .create_leaf_node(ramp_clip("b", 1.0, true), LeafParams::default())
        .unwrap();
    let c = tree
        .create_leaf_node(ramp_clip("c", 1.0, true), LeafParams::default())
        .unwrap();
    let sm = tree
        .create_state_machine_node(StateMachineParams::default())
        .unwrap();
    for leaf in [a, b, c] {
        tree.add_state(sm, leaf).unwrap();
    }
    let to_c = tree
        .create_edge(sm, 0, 2, edge(TransitionMode::OnDone, 0.0))
        .unwrap();
    tree.create_edge(sm, 0, 1, edge(TransitionMode::OnDone, 0.0))
        .unwrap();
    tree.add_root(sm).unwrap();

    tree.update(1.0);
    assert_eq!(tree.state_machine(sm).unwrap().active_state(), Some(2));

    // With the first edge disabled, the second one is used.
    tree.set_active_state(sm, 0).unwrap();
    tree.set_edge_enabled(to_c, false).unwrap();
    tree.update(1.0);
    assert_eq!(tree.state_machine(sm).unwrap().active_state(), Some(1));
}

#[test]
fn nested_machine_finishing_drives_parent_edge() {
    let mut tree = AnimationTree::new(skeleton(), 8, 8);
    let once = tree
        .create_leaf_node(ramp_clip("once", 1.0, false), LeafParams::default())
        .unwrap();
    let idle = tree
        .create_leaf_node(ramp_clip("idle", 1.0, true), LeafParams::default())
        .unwrap();

    let inner = tree
        .create_state_machine_node(StateMachineParams::default())
        .unwrap();
    tree.add_state(inner, once).unwrap();

    let outer = tree
        .create_state_machine_node(StateMachineParams::default())
        .unwrap();
    tree.add_state(outer, inner).unwrap();
    tree.add_state(outer, idle).unwrap();
    tree.create_edge(outer, 0, 1, edge(TransitionMode::OnDone, 0.0))
        .unwrap();
    tree.add_root(outer).unwrap();

    tree.update(0.5);
    assert!(!tree.node_status(inner).unwrap().finished);
    tree.update(0.5);
    assert_eq!(tree.state_machine(outer).unwrap().active_state(), Some(1));
}

#[test]
fn once_edge_fires_then_takes_next_status() {
    let params = EdgeParams {
        mode: TransitionMode::OnDone,
        cross_fade: 0.0,
        status: EdgeStatus::Once,
        next_status: EdgeStatus::Off,
    };
    let Machine { mut tree, sm, .. } = two_state_machine(false, params);

    tree.update(2.0);
    assert_eq!(tree.state_machine(sm).unwrap().active_state(), Some(1));
    assert_eq!(tree.edge(EdgeHandle(0)).unwrap().status, EdgeStatus::Off);

    // Closed now: A finishing again goes nowhere.
    tree.set_active_state(sm, 0).unwrap();
    tree.update(2.0);
    assert_eq!(tree.state_machine(sm).unwrap().active_state(), Some(0));
    assert!(tree.node_status(sm).unwrap().finished);
}

#[test]
fn on_edge_is_only_taken_on_request() {
    let params = EdgeParams {
        status: EdgeStatus::On,
        ..Default::default()
    };
    let Machine { mut tree, sm, .. } = two_state_machine(false, params);

    tree.update(2.0);
    tree.update(2.0);
    assert_eq!(tree.state_machine(sm).unwrap().active_state(), Some(0));
    // The edge still counts as a way out of A.
    assert!(!tree.node_status(sm).unwrap().finished);

    assert_eq!(tree.request_transition(sm, 1), Ok(TransitionOutcome::Started));
    assert_eq!(tree.state_machine(sm).unwrap().active_state(), Some(1));
}

#[test]
fn immediate_edge_fires_without_waiting() {
    let Machine { mut tree, sm, b, .. } = two_state_machine(true, edge(TransitionMode::Immediate, 0.0));

    tree.update(0.5);
    assert_eq!(tree.state_machine(sm).unwrap().active_state(), Some(1));
    assert!(approx(leaf_time(&tree, b), 0.0));

    tree.set_edge_status(EdgeHandle(0), EdgeStatus::Off).unwrap();
    tree.set_active_state(sm, 0).unwrap();
    tree.update(0.5);
    assert_eq!(tree.state_machine(sm).unwrap().active_state(), Some(0));
}

#[test]
fn looper_leaf_finishes_one_fade_before_its_loop_point() {
    let mut tree = AnimationTree::new(skeleton(), 8, 8);
    let a = tree
        .create_leaf_node(
            ramp_clip("a", 2.0, true),
            LeafParams {
                looper: true,
                ..Default::default()
            },
        )
        .unwrap();
    let b = tree
        .create_leaf_node(ramp_clip("b", 3.0, true), LeafParams::default())
        .unwrap();
    let sm = tree
        .create_state_machine_node(StateMachineParams::default())
        .unwrap();
    tree.add_state(sm, a).unwrap();
    tree.add_state(sm, b).unwrap();
    tree.create_edge(sm, 0, 1, edge(TransitionMode::OnDone, 0.5))
        .unwrap();
    tree.add_root(sm).unwrap();

    tree.update(1.0);
    assert_eq!(tree.state_machine(sm).unwrap().active_state(), Some(0));

    // At 1.5s the remaining 0.5s of A exactly covers the fade.
    tree.update(0.5);
    let machine = tree.state_machine(sm).unwrap();
    assert_eq!(machine.active_state(), Some(1));
    assert_eq!(machine.fading_state(), Some(0));

    tree.update(0.25);
    assert!(approx(leaf_time(&tree, a), 1.75));
    assert!(approx(tree.state_machine(sm).unwrap().blend_weight(), 0.5));
}

#[test]
fn exit_state_stops_chaining_and_finishes_machine() {
    let mut tree = AnimationTree::new(skeleton(), 12, 8);
    let intro = tree
        .create_leaf_node(ramp_clip("intro", 1.0, false), LeafParams::default())
        .unwrap();
    let hold = tree
        .create_leaf_node(hold_clip(&[(0, Vec3::Z)]), LeafParams::default())
        .unwrap();
    let exit = tree.create_exit_node(hold).unwrap();
    assert_eq!(tree.exit(exit).unwrap().nested(), Some(hold));

    let inner = tree
        .create_state_machine_node(StateMachineParams::default())
        .unwrap();
    tree.add_state(inner, intro).unwrap();
    tree.add_state(inner, exit).unwrap();
    tree.create_edge(inner, 0, 1, edge(TransitionMode::OnDone, 0.0))
        .unwrap();
    // Would bounce straight back if chaining went on past the exit.
    tree.create_edge(inner, 1, 0, edge(TransitionMode::Immediate, 0.0))
        .unwrap();

    let idle = tree
        .create_leaf_node(ramp_clip("idle", 1.0, true), LeafParams::default())
        .unwrap();
    let outer = tree
        .create_state_machine_node(StateMachineParams::default())
        .unwrap();
    tree.add_state(outer, inner).unwrap();
    tree.add_state(outer, idle).unwrap();
    tree.create_edge(outer, 0, 1, edge(TransitionMode::OnDone, 0.5))
        .unwrap();
    tree.add_root(outer).unwrap();

    tree.update(1.0);
    assert_eq!(tree.state_machine(inner).unwrap().active_state(), Some(1));
    assert!(tree.node_status(inner).unwrap().finished);
    assert!(vec3_approx(tree.pose(inner).unwrap().transforms()[0].translation, Vec3::Z));
    assert_eq!(tree.state_machine(outer).unwrap().active_state(), Some(1));
}

// ============================================================================
// State Machine: Requested Transitions
// ============================================================================

#[test]
fn manual_request_starts_fade_immediately() {
    let Machine { mut tree, sm, .. } = two_state_machine(true, edge(TransitionMode::Manual, 0.2));
    tree.update(0.5);

    assert_eq!(tree.request_transition(sm, 1), Ok(TransitionOutcome::Started));
    let machine = tree.state_machine(sm).unwrap();
    assert_eq!(machine.active_state(), Some(1));
    assert_eq!(machine.blend_weight(), 0.0);

    tree.update(0.1);
    assert!(approx(tree.state_machine(sm).unwrap().blend_weight(), 0.5));

    assert_eq!(
        tree.request_transition(sm, 1),
        Ok(TransitionOutcome::AlreadyActive)
    );
    assert!(matches!(
        tree.request_transition(sm, 5),
        Err(AnimationError::InvalidReference { index: 5, .. })
    ));
}

#[test]
fn manual_edges_do_not_fire_by_themselves() {
    let Machine { mut tree, sm, .. } = two_state_machine(false, edge(TransitionMode::Manual, 0.0));
    for _ in 0..20 {
        tree.update(0.25);
    }
    assert_eq!(tree.state_machine(sm).unwrap().active_state(), Some(0));
    assert!(!tree.node_status(sm).unwrap().finished);
}

#[test]
fn requested_on_done_edge_waits_for_completion() {
    let Machine { mut tree, sm, a, .. } = two_state_machine(true, edge(TransitionMode::OnDone, 0.0));
    // Looping A would never finish; switch its leaf to play once.
    tree.leaf_mut(a).unwrap().playback_mut().unwrap().looping = false;

    assert_eq!(tree.request_transition(sm, 1), Ok(TransitionOutcome::Started));
    assert_eq!(tree.state_machine(sm).unwrap().active_state(), Some(0));
    assert!(tree.state_machine(sm).unwrap().is_travelling());

    tree.update(1.0);
    assert_eq!(tree.state_machine(sm).unwrap().active_state(), Some(0));
    tree.update(1.0);
    assert_eq!(tree.state_machine(sm).unwrap().active_state(), Some(1));
}

#[test]
fn travel_walks_shortest_enabled_chain() {
    let mut tree = AnimationTree::new(skeleton(), 8, 8);
    let sm = tree
        .create_state_machine_node(StateMachineParams::default())
        .unwrap();
    for name in ["idle", "walk", "run"] {
        let leaf = tree
            .create_leaf_node(ramp_clip(name, 1.0, true), LeafParams::default())
            .unwrap();
        tree.add_state(sm, leaf).unwrap();
    }
    tree.create_edge(sm, 0, 1, edge(TransitionMode::Manual, 0.0))
        .unwrap();
    tree.create_edge(sm, 1, 2, edge(TransitionMode::Manual, 0.2))
        .unwrap();
    tree.add_root(sm).unwrap();

    assert_eq!(
        tree.request_transition(sm, 2),
        Ok(TransitionOutcome::Travelling { hops: 2 })
    );
    // The first hop has no fade and fires right away.
    assert_eq!(tree.state_machine(sm).unwrap().active_state(), Some(1));

    tree.update(0.1);
    let machine = tree.state_machine(sm).unwrap();
    assert_eq!(machine.active_state(), Some(2));
    assert_eq!(machine.fading_state(), Some(1));
    assert!(!machine.is_travelling());
}

#[test]
fn unreachable_target_is_teleported_to() {
    let Machine { mut tree, sm, b, .. } = two_state_machine(true, edge(TransitionMode::Manual, 0.3));
    tree.update(0.5);

    assert_eq!(tree.request_transition(sm, 0), Ok(TransitionOutcome::AlreadyActive));
    tree.set_active_state(sm, 1).unwrap();
    // No edge leads back from B.
    assert_eq!(tree.request_transition(sm, 0), Ok(TransitionOutcome::Teleported));
    let machine = tree.state_machine(sm).unwrap();
    assert_eq!(machine.active_state(), Some(0));
    assert!(machine.fade().is_none());
    assert!(approx(leaf_time(&tree, b), 0.0));
}

#[test]
fn travel_can_be_disabled() {
    let mut tree = AnimationTree::new(skeleton(), 8, 8);
    let sm = tree
        .create_state_machine_node(StateMachineParams {
            enable_travel: false,
            ..Default::default()
        })
        .unwrap();
    for name in ["a", "b", "c"] {
        let leaf = tree
            .create_leaf_node(ramp_clip(name, 1.0, true), LeafParams::default())
            .unwrap();
        tree.add_state(sm, leaf).unwrap();
    }
    tree.create_edge(sm, 0, 1, edge(TransitionMode::Manual, 0.0))
        .unwrap();
    tree.create_edge(sm, 1, 2, edge(TransitionMode::Manual, 0.0))
        .unwrap();

    assert_eq!(tree.request_transition(sm, 2), Ok(TransitionOutcome::Teleported));
    assert_eq!(tree.state_machine(sm).unwrap().active_state(), Some(2));
}

// ============================================================================
// Switch
// ============================================================================

fn switch_tree(params: SwitchParams) -> (AnimationTree, NodeHandle, NodeHandle, NodeHandle) {
    let mut tree = AnimationTree::new(skeleton(), 8, 8);
    let a = tree
        .create_leaf_node(ramp_clip("a", 2.0, true), LeafParams::default())
        .unwrap();
    let b = tree
        .create_leaf_node(ramp_clip("b", 4.0, true), LeafParams::default())
        .unwrap();
    let switch = tree.create_switch_node(3, params).unwrap();
    tree.set_input(switch, 0, a).unwrap();
    tree.set_input(switch, 1, b).unwrap();
    tree.add_root(switch).unwrap();
    (tree, switch, a, b)
}

#[test]
fn switch_rejects_bad_inputs_and_keeps_selection() {
    let (mut tree, switch, ..) = switch_tree(SwitchParams::default());

    assert_eq!(
        tree.set_active_input(switch, 7),
        Err(AnimationError::InvalidReference {
            what: "switch input",
            index: 7
        })
    );
    // Slot 2 exists but is not connected.
    assert!(tree.set_active_input(switch, 2).is_err());
    assert_eq!(tree.switch(switch).unwrap().active_input(), 0);
}

#[test]
fn synced_switch_carries_phase_over() {
    let (mut tree, switch, a, b) = switch_tree(SwitchParams {
        synced: true,
        cross_fade: 0.2,
        ..Default::default()
    });

    tree.update(0.5);
    let outgoing = tree.phase(a).unwrap().unwrap();
    assert!(approx(outgoing, 0.25));

    tree.set_active_input(switch, 1).unwrap();
    assert!(approx(tree.phase(b).unwrap().unwrap(), outgoing));
    assert!(approx(leaf_time(&tree, b), 1.0));
    assert!(approx(tree.phase(switch).unwrap().unwrap(), outgoing));
}

#[test]
fn unsynced_switch_restarts_incoming_input() {
    let (mut tree, switch, _, b) = switch_tree(SwitchParams {
        advance_all_inputs: true,
        ..Default::default()
    });

    tree.update(0.5);
    assert!(approx(leaf_time(&tree, b), 0.5));

    tree.set_active_input(switch, 1).unwrap();
    assert!(approx(leaf_time(&tree, b), 0.0));

    tree.update(0.25);
    assert!(approx(root_x(&tree), 0.25));
}

#[test]
fn switch_cross_fades_between_inputs() {
    let (mut tree, switch, a, b) = switch_tree(SwitchParams {
        cross_fade: 0.5,
        ..Default::default()
    });
    tree.update(1.0);
    tree.set_active_input(switch, 1).unwrap();

    tree.update(0.25);
    assert!(approx(tree.switch(switch).unwrap().blend_weight(), 0.5));
    // A at 1.25s, B at 0.25s, half each.
    assert!(approx(root_x(&tree), 0.5 * 1.25 + 0.5 * 0.25));
    assert!(approx(tree.node_weight(a).unwrap(), 0.5));
    assert!(approx(tree.node_weight(b).unwrap(), 0.5));

    tree.update(0.25);
    assert!(!tree.switch(switch).unwrap().is_fading());
    assert!(approx(root_x(&tree), 0.5));
}

#[test]
fn switch_reselect_mid_fade_continues_from_current_mix() {
    let mut tree = AnimationTree::new(skeleton(), 8, 8);
    let switch = tree
        .create_switch_node(
            3,
            SwitchParams {
                cross_fade: 1.0,
                ..Default::default()
            },
        )
        .unwrap();
    for (slot, x) in [0.0, 10.0, 10.0].into_iter().enumerate() {
        let leaf = tree
            .create_leaf_node(hold_clip(&[(0, Vec3::new(x, 0.0, 0.0))]), LeafParams::default())
            .unwrap();
        tree.set_input(switch, slot, leaf).unwrap();
    }
    tree.add_root(switch).unwrap();

    tree.set_active_input(switch, 1).unwrap();
    tree.update(0.1);
    assert!((root_x(&tree) - 1.0).abs() < 1e-4);

    // Input 1 still holds a tenth of the mix and fades out from there.
    tree.set_active_input(switch, 2).unwrap();
    tree.update(0.0);
    assert!((root_x(&tree) - 1.0).abs() < 1e-4);

    tree.update(0.45);
    let weights = tree.switch(switch).unwrap().input_weights().to_vec();
    assert!((weights[0] - 0.45).abs() < 1e-4);
    assert_eq!(weights[1], 0.0);
    assert!((weights[2] - 0.45).abs() < 1e-4);
    assert!((root_x(&tree) - 5.0).abs() < 1e-3);
}

#[test]
fn fade_weights_sweep_monotonically_over_uneven_steps() {
    let steps = [0.013, 0.07, 0.001, 0.2, 0.05, 0.3, 0.0, 0.11, 0.4, 0.9];

    for cross_fade in [0.1, 0.5, 1.3] {
        let Machine { mut tree, sm, .. } =
            two_state_machine(true, edge(TransitionMode::Manual, cross_fade));
        tree.request_transition(sm, 1).unwrap();
        let mut weights = vec![tree.state_machine(sm).unwrap().blend_weight()];
        for dt in steps {
            tree.update(dt);
            weights.push(tree.state_machine(sm).unwrap().blend_weight());
        }
        assert_sweep(&weights, cross_fade);

        let (mut tree, switch, ..) = switch_tree(SwitchParams {
            cross_fade,
            ..Default::default()
        });
        tree.set_active_input(switch, 1).unwrap();
        let mut weights = vec![tree.switch(switch).unwrap().blend_weight()];
        for dt in steps {
            tree.update(dt);
            weights.push(tree.switch(switch).unwrap().blend_weight());
        }
        assert_sweep(&weights, cross_fade);
    }
}

fn assert_sweep(weights: &[f32], cross_fade: f32) {
    assert_eq!(weights[0], 0.0, "fade {cross_fade} did not start at 0");
    assert_eq!(*weights.last().unwrap(), 1.0, "fade {cross_fade} did not end at 1");
    for pair in weights.windows(2) {
        assert!(pair[1] >= pair[0], "fade {cross_fade} went back: {weights:?}");
    }
}

#[test]
fn switch_with_unconnected_active_input_outputs_bind_pose() {
    let mut tree = AnimationTree::new(skeleton(), 4, 4);
    let switch = tree.create_switch_node(2, SwitchParams::default()).unwrap();
    tree.add_root(switch).unwrap();

    tree.update(0.1);
    assert_eq!(tree.root_pose(0), Some(tree.skeleton().bind_pose()));
}

// ============================================================================
// Blend2, Sharing & Players
// ============================================================================

#[test]
fn masked_blend_only_touches_masked_bones() {
    let mut tree = AnimationTree::new(skeleton(), 4, 4);
    let lower = tree
        .create_leaf_node(hold_clip(&[(0, Vec3::X), (1, Vec3::X)]), LeafParams::default())
        .unwrap();
    let upper = tree
        .create_leaf_node(hold_clip(&[(0, Vec3::Z), (1, Vec3::Z)]), LeafParams::default())
        .unwrap();
    let mask = tree.skeleton().bone_mask(&["spine"]).unwrap();
    let blend = tree
        .create_blend2_node(Blend2Params {
            blend: 1.0,
            mask: Some(mask),
        })
        .unwrap();
    tree.set_input(blend, 0, lower).unwrap();
    tree.set_input(blend, 1, upper).unwrap();
    tree.add_root(blend).unwrap();

    tree.update(0.1);
    let pose = tree.root_pose(0).unwrap();
    assert!(vec3_approx(pose.transforms()[0].translation, Vec3::X));
    assert!(vec3_approx(pose.transforms()[1].translation, Vec3::Z));
    assert!(vec3_approx(pose.transforms()[2].translation, Vec3::Y));

    tree.set_blend(blend, 4.0).unwrap();
    assert_eq!(tree.blend2(blend).unwrap().blend(), 1.0);
}

#[test]
fn shared_leaf_is_evaluated_once_per_update() {
    let mut tree = AnimationTree::new(skeleton(), 8, 8);
    let leaf = tree
        .create_leaf_node(ramp_clip("a", 2.0, true), LeafParams::default())
        .unwrap();
    let left = tree.create_switch_node(1, SwitchParams::default()).unwrap();
    let right = tree.create_switch_node(1, SwitchParams::default()).unwrap();
    tree.set_input(left, 0, leaf).unwrap();
    tree.set_input(right, 0, leaf).unwrap();
    tree.add_root(left).unwrap();
    tree.add_root(right).unwrap();

    tree.update(0.5);
    assert!(approx(leaf_time(&tree, leaf), 0.5));
    assert!(approx(tree.node_weight(leaf).unwrap(), 2.0));
    assert_eq!(tree.root_pose(0), tree.root_pose(1));
}

#[test]
fn player_backed_leaves_share_one_advance() {
    let skeleton = skeleton();
    let mut player = AnimationPlayer::new(skeleton.clone());
    let state = player
        .add_state(ramp_clip("a", 2.0, true), 1.0, true, 1.0)
        .unwrap();

    let mut tree = AnimationTree::new(skeleton, 8, 8);
    let id = tree.add_player(player).unwrap();
    let first = tree.create_player_leaf(id, state).unwrap();
    let second = tree.create_player_leaf(id, state).unwrap();
    let blend = tree
        .create_blend2_node(Blend2Params {
            blend: 0.5,
            mask: None,
        })
        .unwrap();
    tree.set_input(blend, 0, first).unwrap();
    tree.set_input(blend, 1, second).unwrap();
    tree.add_root(blend).unwrap();

    tree.update(0.25);
    assert!(approx(tree.player(id).unwrap().state(state).unwrap().time(), 0.25));
    assert!(approx(root_x(&tree), 0.25));
    assert!(approx(tree.phase(first).unwrap().unwrap(), 0.125));
}

#[test]
fn player_for_other_rig_is_rejected() {
    let names = vec!["only".to_string()];
    let small = Arc::new(
        Skeleton::from_bind_pose("small", names, &[-1], &[BoneTransform::IDENTITY]).unwrap(),
    );
    let mut tree = AnimationTree::new(skeleton(), 4, 4);

    assert_eq!(
        tree.add_player(AnimationPlayer::new(small)).err(),
        Some(AnimationError::SkeletonMismatch {
            expected: 3,
            found: 1
        })
    );
}

#[test]
fn root_capacity_and_duplicate_roots() {
    let mut tree = AnimationTree::with_settings(
        skeleton(),
        TreeSettings {
            max_roots: 1,
            ..Default::default()
        },
    );
    let a = tree
        .create_leaf_node(ramp_clip("a", 1.0, true), LeafParams::default())
        .unwrap();
    let b = tree
        .create_leaf_node(ramp_clip("b", 1.0, true), LeafParams::default())
        .unwrap();

    tree.add_root(a).unwrap();
    tree.add_root(a).unwrap();
    assert_eq!(tree.roots(), &[a]);
    assert!(matches!(
        tree.add_root(b),
        Err(AnimationError::CapacityExceeded { .. })
    ));
}

#[test]
fn negative_dt_does_not_rewind() {
    let Machine { mut tree, a, .. } = two_state_machine(true, EdgeParams::default());
    tree.update(0.5);
    tree.update(-1.0);
    tree.update(f32::NAN);
    assert!(approx(leaf_time(&tree, a), 0.5));
}

// ============================================================================
// Add2
// ============================================================================

#[test]
fn add2_layers_offset_from_bind_on_masked_bones() {
    let mut tree = AnimationTree::new(skeleton(), 8, 8);
    let base = tree
        .create_leaf_node(hold_clip(&[(0, Vec3::X), (1, Vec3::X)]), LeafParams::default())
        .unwrap();
    // Bind translation is +Y, so this layer adds +2 on Z.
    let layer_t = Vec3::new(0.0, 1.0, 2.0);
    let layer = tree
        .create_leaf_node(hold_clip(&[(0, layer_t), (1, layer_t)]), LeafParams::default())
        .unwrap();
    let mask = tree.skeleton().bone_mask(&["spine"]).unwrap();
    let add = tree
        .create_add2_node(Add2Params {
            weight: 0.5,
            mask: Some(mask),
        })
        .unwrap();
    tree.set_input(add, 0, base).unwrap();
    tree.set_input(add, 1, layer).unwrap();
    tree.add_root(add).unwrap();

    tree.update(0.1);
    let pose = tree.root_pose(0).unwrap();
    assert!(vec3_approx(pose.transforms()[0].translation, Vec3::X));
    assert!(vec3_approx(pose.transforms()[1].translation, Vec3::new(1.0, 0.0, 1.0)));
    assert!(vec3_approx(pose.transforms()[2].translation, Vec3::Y));
    assert!(approx(tree.node_weight(base).unwrap(), 1.0));
    assert!(approx(tree.node_weight(layer).unwrap(), 0.5));

    tree.set_add_weight(add, 3.0).unwrap();
    assert_eq!(tree.add2(add).unwrap().weight(), 1.0);
    tree.set_add_weight(add, f32::NAN).unwrap();
    assert_eq!(tree.add2(add).unwrap().weight(), 0.0);
    tree.update(0.1);
    assert!(vec3_approx(tree.root_pose(0).unwrap().transforms()[1].translation, Vec3::X));
}

#[test]
fn add2_rejects_mask_for_other_rig() {
    let other = Skeleton::from_bind_pose(
        "other",
        vec!["a".to_string(), "b".to_string()],
        &[-1, 0],
        &[BoneTransform::IDENTITY; 2],
    )
    .unwrap();
    let mask = other.bone_mask(&["b"]).unwrap();
    let mut tree = AnimationTree::new(skeleton(), 4, 4);

    assert_eq!(
        tree.create_add2_node(Add2Params {
            weight: 1.0,
            mask: Some(mask),
        })
        .err(),
        Some(AnimationError::SkeletonMismatch {
            expected: 3,
            found: 2
        })
    );
    assert_eq!(tree.node_count(), 0);
}

// ============================================================================
// Root Motion & Callbacks
// ============================================================================

#[test]
fn root_motion_reports_delta_and_pins_root_bone() {
    let mut tree = AnimationTree::new(skeleton(), 4, 4);
    let walk = tree
        .create_leaf_node(ramp_clip("walk", 2.0, true), LeafParams::default())
        .unwrap();
    tree.add_root(walk).unwrap();
    assert!(tree.set_root_bone(Some(9)).is_err());
    tree.set_root_bone(Some(0)).unwrap();

    tree.update(0.5);
    let motion = *tree.root_motion(0).unwrap();
    assert!(approx(motion.delta.translation.x, 0.5));
    assert!(approx(motion.distance.translation.x, 0.5));
    // The node keeps the animated root; the output has it pinned at the start.
    assert!(approx(tree.pose(walk).unwrap().transforms()[0].translation.x, 0.5));
    assert!(approx(root_x(&tree), 0.0));

    tree.update(0.5);
    assert!(approx(tree.root_motion(0).unwrap().delta.translation.x, 0.5));

    // Wraps from 1.0s past the 2.0s end to 0.25s: 1.0 + 0.25 travelled.
    tree.update(1.25);
    let motion = *tree.root_motion(0).unwrap();
    assert!(approx(motion.delta.translation.x, 1.25));
    assert!(approx(motion.distance.translation.x, 0.25));
    assert!(approx(root_x(&tree), 0.0));

    tree.set_root_bone(None).unwrap();
    tree.update(0.25);
    assert_eq!(tree.root_motion(0).unwrap().delta.translation, Vec3::ZERO);
    assert!(approx(root_x(&tree), 0.5));
}

#[test]
fn cross_fade_blends_root_motion() {
    let Machine { mut tree, sm, .. } = two_state_machine(true, edge(TransitionMode::Manual, 0.5));
    tree.set_root_bone(Some(0)).unwrap();
    tree.update(0.5);

    tree.request_transition(sm, 1).unwrap();
    tree.update(0.25);
    // Both ramps move 0.25 along X; half of each.
    let motion = tree.root_motion(0).unwrap();
    assert!(approx(motion.delta.translation.x, 0.25));
    assert!(approx(motion.distance.translation.x, 0.5 * 0.75 + 0.5 * 0.25));
}

#[test]
fn leaf_and_tree_callbacks_rewrite_bones() {
    let mut tree = AnimationTree::new(skeleton(), 4, 4);
    let leaf = tree
        .create_leaf_node(ramp_clip("a", 2.0, true), LeafParams::default())
        .unwrap();
    tree.add_root(leaf).unwrap();

    tree.set_leaf_callback(
        leaf,
        Some(Box::new(
            |state: &PlaybackState, bone: usize, transform: &mut BoneTransform| {
                if bone == 2 {
                    transform.translation.z = state.time();
                }
            },
        )),
    )
    .unwrap();
    tree.set_update_callback(Some(Box::new(|bone: usize, transform: &mut BoneTransform| {
        if bone == 1 {
            transform.scale = Vec3::splat(2.0);
        }
    })));

    tree.update(0.5);
    let output = tree.root_pose(0).unwrap();
    assert!(approx(output.transforms()[2].translation.z, 0.5));
    assert!(vec3_approx(output.transforms()[1].scale, Vec3::splat(2.0)));
    // The tree callback only touches the output, not the node.
    let node = tree.pose(leaf).unwrap();
    assert!(approx(node.transforms()[2].translation.z, 0.5));
    assert!(vec3_approx(node.transforms()[1].scale, Vec3::ONE));

    tree.set_update_callback(None);
    tree.update(0.5);
    assert!(vec3_approx(tree.root_pose(0).unwrap().transforms()[1].scale, Vec3::ONE));
}
