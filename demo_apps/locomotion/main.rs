use std::sync::Arc;

use glam::{Affine3A, Quat, Vec3};
use marionette::prelude::*;

const FRAME: f32 = 1.0 / 30.0;

/// Hips, spine, head, two legs.
fn build_rig() -> anyhow::Result<Arc<Skeleton>> {
    let names = ["hips", "spine", "head", "leg_l", "leg_r"]
        .map(String::from)
        .to_vec();
    let binds = [
        BoneTransform::from_translation(Vec3::new(0.0, 1.0, 0.0)),
        BoneTransform::from_translation(Vec3::new(0.0, 0.3, 0.0)),
        BoneTransform::from_translation(Vec3::new(0.0, 0.4, 0.0)),
        BoneTransform::from_translation(Vec3::new(0.1, -0.1, 0.0)),
        BoneTransform::from_translation(Vec3::new(-0.1, -0.1, 0.0)),
    ];
    let skeleton = Skeleton::from_bind_pose("biped", names, &[-1, 0, 1, 0, 0], &binds)?;
    Ok(Arc::new(skeleton))
}

/// Legs swinging in opposition with the given stride angle.
fn gait_clip(name: &str, period: f32, stride: f32) -> anyhow::Result<AnimationClip> {
    let times = vec![0.0, period * 0.5, period];
    let swing = |sign: f32| {
        KeyframeTrack::new(
            times.clone(),
            vec![
                Quat::from_rotation_x(sign * stride),
                Quat::from_rotation_x(-sign * stride),
                Quat::from_rotation_x(sign * stride),
            ],
            InterpolationMode::Linear,
        )
    };
    Ok(AnimationClip::new(
        name,
        vec![
            BoneChannel::new(3).with_rotation(swing(1.0)?),
            BoneChannel::new(4).with_rotation(swing(-1.0)?),
        ],
    )
    .looped(true))
}

fn jump_clip() -> anyhow::Result<AnimationClip> {
    Ok(AnimationClip::new(
        "jump",
        vec![BoneChannel::new(0).with_translation(KeyframeTrack::new(
            vec![0.0, 0.4, 0.8],
            vec![Vec3::Y, Vec3::new(0.0, 1.6, 0.0), Vec3::Y],
            InterpolationMode::Linear,
        )?)],
    ))
}

fn idle_clip() -> anyhow::Result<AnimationClip> {
    Ok(AnimationClip::new(
        "idle",
        vec![BoneChannel::new(1).with_rotation(KeyframeTrack::new(
            vec![0.0, 1.5, 3.0],
            vec![
                Quat::IDENTITY,
                Quat::from_rotation_x(0.05),
                Quat::IDENTITY,
            ],
            InterpolationMode::Linear,
        )?)],
    )
    .looped(true))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let skeleton = build_rig()?;
    let mut library = ClipLibrary::new();
    library.add(idle_clip()?);
    library.add(gait_clip("walk", 1.0, 0.4)?);
    library.add(gait_clip("run", 0.6, 0.8)?);
    library.add(jump_clip()?);

    let mut tree = AnimationTree::with_settings(
        skeleton.clone(),
        TreeSettings {
            max_nodes: 8,
            max_edges: 8,
            ..Default::default()
        },
    );

    let idle = tree.create_leaf_from_library(&library, "idle", LeafParams::default())?;
    let walk = tree.create_leaf_from_library(&library, "walk", LeafParams::default())?;
    let run = tree.create_leaf_from_library(&library, "run", LeafParams::default())?;
    let jump = tree.create_leaf_from_library(&library, "jump", LeafParams::default())?;

    let gait = tree.create_switch_node(
        2,
        SwitchParams {
            cross_fade: 0.25,
            synced: true,
            ..Default::default()
        },
    )?;
    tree.set_input(gait, 0, walk)?;
    tree.set_input(gait, 1, run)?;

    let sm = tree.create_state_machine_node(StateMachineParams::default())?;
    let s_idle = tree.add_state(sm, idle)?;
    let s_gait = tree.add_state(sm, gait)?;
    let s_jump = tree.add_state(sm, jump)?;

    let manual = |cross_fade| EdgeParams {
        mode: TransitionMode::Manual,
        cross_fade,
        ..Default::default()
    };
    tree.create_edge(sm, s_idle, s_gait, manual(0.3))?;
    tree.create_edge(sm, s_gait, s_jump, manual(0.1))?;
    tree.create_edge(
        sm,
        s_jump,
        s_idle,
        EdgeParams {
            mode: TransitionMode::OnDone,
            cross_fade: 0.2,
            ..Default::default()
        },
    )?;
    tree.add_root(sm)?;

    let mut model = vec![Affine3A::IDENTITY; skeleton.bone_count()];
    for frame in 0..150_u32 {
        match frame {
            20 => log::info!("walk: {:?}", tree.request_transition(sm, s_gait)?),
            50 => tree.set_active_input(gait, 1)?,
            80 => log::info!("jump: {:?}", tree.request_transition(sm, s_jump)?),
            130 => log::info!("idle -> jump: {:?}", tree.request_transition(sm, s_jump)?),
            _ => {}
        }

        tree.update(FRAME);

        if frame % 10 == 0 {
            let machine = tree.state_machine(sm)?;
            let Some(pose) = tree.root_pose(0) else {
                continue;
            };
            pose.compute_model_matrices(&skeleton, &mut model);
            log::info!(
                "frame {frame:3}: state {:?} blend {:.2} hips y {:.3} left foot {:?}",
                machine.active_state(),
                machine.blend_weight(),
                model[0].translation.y,
                model[3].translation,
            );
        }
    }

    Ok(())
}
