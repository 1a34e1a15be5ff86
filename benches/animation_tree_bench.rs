//! Animation blending benchmarks
//!
//! Player blending and tree evaluation over a synthetic 64-bone rig.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use glam::{Quat, Vec3};

use marionette::animation::{
    AnimationClip, AnimationPlayer, AnimationTree, BoneChannel, EdgeParams, InterpolationMode,
    KeyframeTrack, LeafParams, Skeleton, StateMachineParams, SwitchParams, TransitionMode,
    TreeSettings,
};
use marionette::core::BoneTransform;

const BONES: usize = 64;

fn rig() -> Arc<Skeleton> {
    let names = (0..BONES).map(|i| format!("bone_{i}")).collect();
    let parents: Vec<i16> = (0..BONES as i16).map(|i| i - 1).collect();
    let binds = vec![BoneTransform::from_translation(Vec3::Y * 0.1); BONES];
    Arc::new(Skeleton::from_bind_pose("bench", names, &parents, &binds).expect("valid rig"))
}

/// A looping clip animating every bone with 30 keys per second.
fn clip(name: &str, duration: f32, phase: f32) -> Arc<AnimationClip> {
    let keys = (duration * 30.0) as usize + 1;
    let times: Vec<f32> = (0..keys).map(|k| k as f32 / 30.0).collect();
    let channels = (0..BONES)
        .map(|bone| {
            let rotations = times
                .iter()
                .map(|t| Quat::from_rotation_z((t + phase + bone as f32 * 0.01).sin() * 0.3))
                .collect();
            let translations = times
                .iter()
                .map(|t| Vec3::new(0.0, 0.1, (t + phase).cos() * 0.01))
                .collect();
            BoneChannel::new(bone)
                .with_rotation(KeyframeTrack::new(
                    times.clone(),
                    rotations,
                    InterpolationMode::Linear,
                ).expect("track"))
                .with_translation(KeyframeTrack::new(
                    times.clone(),
                    translations,
                    InterpolationMode::Linear,
                ).expect("track"))
        })
        .collect();
    Arc::new(AnimationClip::new(name, channels).looped(true))
}

fn bench_player(c: &mut Criterion) {
    let mut group = c.benchmark_group("player_update");
    let skeleton = rig();

    for states in [1_usize, 4, 8] {
        let mut player = AnimationPlayer::new(skeleton.clone());
        for i in 0..states {
            player
                .add_state(clip("c", 1.0, i as f32), 1.0 / states as f32, true, 1.0)
                .expect("capacity");
        }
        group.bench_with_input(BenchmarkId::from_parameter(states), &states, |b, _| {
            b.iter(|| {
                player.update(black_box(1.0 / 60.0));
                black_box(player.pose());
            });
        });
    }

    group.finish();
}

fn bench_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_update");
    let skeleton = rig();

    let mut tree = AnimationTree::with_settings(
        skeleton,
        TreeSettings {
            max_nodes: 16,
            ..Default::default()
        },
    );
    let idle = tree
        .create_leaf_node(clip("idle", 2.0, 0.0), LeafParams::default())
        .expect("node");
    let walk = tree
        .create_leaf_node(clip("walk", 1.0, 0.5), LeafParams::default())
        .expect("node");
    let run = tree
        .create_leaf_node(clip("run", 0.6, 1.0), LeafParams::default())
        .expect("node");

    let gait = tree
        .create_switch_node(
            2,
            SwitchParams {
                cross_fade: 0.25,
                synced: true,
                ..Default::default()
            },
        )
        .expect("node");
    tree.set_input(gait, 0, walk).expect("input");
    tree.set_input(gait, 1, run).expect("input");

    let sm = tree
        .create_state_machine_node(StateMachineParams::default())
        .expect("node");
    tree.add_state(sm, idle).expect("state");
    tree.add_state(sm, gait).expect("state");
    let manual = EdgeParams {
        mode: TransitionMode::Manual,
        cross_fade: 0.3,
        ..Default::default()
    };
    tree.create_edge(sm, 0, 1, manual).expect("edge");
    tree.create_edge(sm, 1, 0, manual).expect("edge");
    tree.add_root(sm).expect("root");

    group.bench_function("steady", |b| {
        b.iter(|| {
            tree.update(black_box(1.0 / 60.0));
            black_box(tree.root_pose(0));
        });
    });

    let mut frame = 0_u32;
    group.bench_function("transitions", |b| {
        b.iter(|| {
            frame = frame.wrapping_add(1);
            if frame % 20 == 0 {
                let active = tree.state_machine(sm).ok().and_then(|m| m.active_state());
                let target = if active == Some(0) { 1 } else { 0 };
                let _ = tree.request_transition(sm, target);
                let _ = tree.set_active_input(gait, (frame / 20 % 2) as usize);
            }
            tree.update(black_box(1.0 / 60.0));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_player, bench_tree);
criterion_main!(benches);
