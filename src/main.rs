//! Headless rig simulation: builds a flat-ground world, steps the rig at a
//! fixed rate and prints its state. Useful for tuning calibration files.

use std::collections::HashMap;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use nalgebra::{UnitQuaternion, Vector3};

use hexabody::config::RigConfig;
use hexabody::rig::physics::RigBody;
use hexabody::rig::skeleton::{Bone, Skeleton};
use hexabody::rig::tracking::{Pose, TrackedInput};
use hexabody::rig::HexabodyRig;

#[derive(Parser)]
#[command(name = "hexabody-sim")]
#[command(about = "Headless hexabody rig simulation", long_about = None)]
struct Cli {
    /// Number of fixed ticks to simulate
    #[arg(long, default_value = "900")]
    ticks: u64,

    /// Fixed tick rate in Hz
    #[arg(long, default_value = "90")]
    hz: u64,

    /// Path to a rig.toml calibration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tick at which to wind up and release a jump
    #[arg(long)]
    jump_at: Option<u64>,

    /// Run in real time instead of as fast as possible
    #[arg(long)]
    realtime: bool,
}

fn default_skeleton() -> Skeleton {
    let mut bones = HashMap::new();
    let pose = |x: f32, y: f32, z: f32| Pose::new(Vector3::new(x, y, z), UnitQuaternion::identity());

    bones.insert(Bone::Hips, pose(0.0, 1.0, 0.0));
    bones.insert(Bone::LeftUpperArm, pose(-0.2, 1.4, 0.0));
    bones.insert(Bone::LeftLowerArm, pose(-0.2, 1.15, 0.0));
    bones.insert(Bone::LeftHand, pose(-0.2, 0.9, 0.0));
    bones.insert(Bone::RightUpperArm, pose(0.2, 1.4, 0.0));
    bones.insert(Bone::RightLowerArm, pose(0.2, 1.15, 0.0));
    bones.insert(Bone::RightHand, pose(0.2, 0.9, 0.0));
    bones.insert(Bone::LeftFoot, pose(-0.1, 0.0, 0.0));
    bones.insert(Bone::RightFoot, pose(0.1, 0.0, 0.0));

    Skeleton::new(bones, Pose::identity())
}

fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match RigConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        },
        None => RigConfig::default(),
    };

    let mut rig = match HexabodyRig::new(config, default_skeleton(), Vector3::new(0.0, 0.3, 0.0)) {
        Ok(rig) => rig,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    let head_pose = Pose::new(Vector3::new(0.0, 1.6, 0.0), UnitQuaternion::identity());
    rig.recenter(&head_pose);
    rig.physics.add_static_box(
        Vector3::new(0.0, -0.5, 0.0),
        Vector3::new(100.0, 0.5, 100.0),
        0.9,
    );

    let dt = 1.0 / cli.hz as f32;
    let tick_duration = Duration::from_nanos(1_000_000_000 / cli.hz);
    // Crouch wind-up length before the jump release, in ticks
    let windup_ticks = (0.3 * cli.hz as f64) as u64;

    println!("Simulating {} ticks at {} Hz", cli.ticks, cli.hz);

    for tick in 0..cli.ticks {
        let start = Instant::now();

        let mut input = TrackedInput::default();
        input.head = head_pose;
        if let Some(jump_at) = cli.jump_at {
            if tick >= jump_at && tick < jump_at + windup_ticks {
                input.crouch_axis = -1.0;
            }
        }

        rig.fixed_tick(dt, &input);
        rig.frame_update(dt, &input);

        if tick % cli.hz == 0 {
            let pelvis_y = rig
                .physics
                .body_position(RigBody::Pelvis)
                .map(|p| p.y)
                .unwrap_or(f32::NAN);
            println!(
                "tick {:>6}  gait={:?}  leg_height={:.3}  grounded={}  pelvis_y={:.3}",
                tick,
                rig.gait_state(),
                rig.target_leg_height(),
                rig.is_grounded(),
                pelvis_y,
            );
        }

        if cli.realtime {
            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                thread::sleep(tick_duration - elapsed);
            }
        }
    }

    let events: usize = rig.step_events().try_iter().count();
    println!("Done. {} foot steps taken.", events);
}
