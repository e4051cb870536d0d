//! Physics-driven full-body avatar rig.
//!
//! `HexabodyRig` owns every component and threads context through explicitly:
//! the fixed tick runs ground detection, the gait state machine, crouch
//! integration, roomscale sync, arm joint targeting and locomotion before
//! stepping the physics world; the frame update runs the per-frame visual
//! layers (elbow hints, foot stepping).

pub mod arms;
pub mod constants;
pub mod crouching;
pub mod elbow;
pub mod feet;
pub mod grounding;
pub mod jumping;
pub mod locomotion;
pub mod physics;
pub mod skeleton;
pub mod tracking;

use crossbeam_channel::Receiver;
use nalgebra::Vector3;

use crate::config::{RigConfig, RigConfigError};

use arms::{roomscale_shift, BodyPoseSync};
use crouching::LegHeightController;
use elbow::ElbowPredictor;
use feet::{FeetFrame, FootSide, FootStepper, StepEvent};
use grounding::{GroundContact, GroundContactDetector};
use jumping::{GaitInputs, GaitStateId, GaitStateMachine};
use locomotion::SmoothLocomotion;
use physics::{PhysicsWorld, RigBody};
use skeleton::{Bone, IkTarget, Skeleton};
use tracking::{Handedness, Pose, TrackedInput};

/// Errors raised while assembling a rig
#[derive(Debug)]
pub enum RigBuildError {
    InvalidConfig(RigConfigError),
}

impl std::fmt::Display for RigBuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RigBuildError::InvalidConfig(e) => write!(f, "Invalid rig calibration: {}", e),
        }
    }
}

impl std::error::Error for RigBuildError {}

impl From<RigConfigError> for RigBuildError {
    fn from(e: RigConfigError) -> Self {
        RigBuildError::InvalidConfig(e)
    }
}

/// The full rig: physics bodies, gait control, arm/feet/elbow layers
pub struct HexabodyRig {
    pub config: RigConfig,
    pub physics: PhysicsWorld,
    pub skeleton: Skeleton,
    grounding: GroundContactDetector,
    legs: LegHeightController,
    gait: GaitStateMachine,
    body_sync: BodyPoseSync,
    locomotion: SmoothLocomotion,
    left_elbow: ElbowPredictor,
    right_elbow: ElbowPredictor,
    feet: FootStepper,
    /// Playspace anchor the per-tick roomscale delta is measured from
    playspace_origin: Pose,
}

impl HexabodyRig {
    /// Assemble a rig from validated calibration and the host skeleton.
    /// The physics bodies spawn with the locomotion sphere at `origin`.
    pub fn new(
        config: RigConfig,
        skeleton: Skeleton,
        origin: Vector3<f32>,
    ) -> Result<Self, RigBuildError> {
        config.validate()?;

        let mut physics = PhysicsWorld::new();
        physics.build_rig(origin, config.legs.standing_leg_height);

        let body_sync = BodyPoseSync::new(&skeleton);

        Ok(Self {
            grounding: GroundContactDetector::new(config.movement.max_slope_angle_deg),
            legs: LegHeightController::new(&config.legs),
            gait: GaitStateMachine::new(&config.jump),
            body_sync,
            locomotion: SmoothLocomotion::new(
                config.movement.walk_speed,
                config.movement.run_speed_multiplier,
            ),
            left_elbow: ElbowPredictor::new(Handedness::Left),
            right_elbow: ElbowPredictor::new(Handedness::Right),
            feet: FootStepper::new(config.movement.step_length),
            playspace_origin: Pose::identity(),
            config,
            physics,
            skeleton,
        })
    }

    pub fn gait_state(&self) -> GaitStateId {
        self.gait.state()
    }

    pub fn target_leg_height(&self) -> f32 {
        self.legs.target_leg_height
    }

    pub fn ground_contact(&self) -> GroundContact {
        self.grounding.contact()
    }

    pub fn is_grounded(&self) -> bool {
        self.grounding.is_grounded()
    }

    /// Re-anchor the playspace so the current head pose produces no
    /// roomscale delta. Call once tracking is live, and after recentering.
    pub fn recenter(&mut self, head: &Pose) {
        self.playspace_origin = *head;
    }

    /// Step-completed events, for footstep audio/haptics consumers
    pub fn step_events(&self) -> Receiver<StepEvent> {
        self.feet.step_events()
    }

    pub fn body_sync_mut(&mut self) -> &mut BodyPoseSync {
        &mut self.body_sync
    }

    /// One fixed physics tick
    pub fn fixed_tick(&mut self, dt: f32, input: &TrackedInput) {
        // Ground support from last step's contacts
        self.grounding.begin_tick();
        let pairs = self.physics.ground_contact_pairs();
        let gravity = self.physics.gravity_vector();
        if let Some(counter) = self.grounding.evaluate(gravity, &pairs) {
            self.physics.apply_counter_impulse(&counter);
        }

        // Gait state machine drives leg dynamics and pelvis weighting
        self.legs.set_crouch_input(input.crouch_axis);
        let vertical_velocity = self
            .physics
            .body_velocity(RigBody::LocomotionSphere)
            .map(|v| v.y)
            .unwrap_or(0.0);
        self.gait.fixed_tick(
            GaitInputs {
                dt,
                grounded: self.grounding.is_grounded(),
                vertical_velocity,
            },
            &mut self.legs,
        );
        if let Some(impulse) = self.gait.take_jump_impulse() {
            self.physics.apply_jump_impulse(impulse);
        }

        // Crouch integration inside the state's clamp window
        self.legs.fixed_tick(dt, self.gait.compressed_shift());
        if !self.grounding.is_grounded() {
            self.legs.clamp_airborne();
        }

        // Roomscale headset motion; vertical delta becomes leg height
        let shift = roomscale_shift(&self.playspace_origin, &input.head);
        self.physics.apply_roomscale_shift(&shift);
        self.legs.apply_roomscale_delta(shift.full.y);
        self.playspace_origin.position = input.head.position;

        self.physics.set_pelvis_mass_scale(self.gait.pelvis_mass_scale());
        self.physics.set_leg_height(self.legs.target_leg_height);

        // Arm joint targeting toward the tracked controllers
        if let Some(pelvis) = self.physics.body_pose(RigBody::Pelvis) {
            let commands = self.body_sync.joint_commands(
                &self.skeleton,
                &pelvis,
                &input.left_hand,
                &input.right_hand,
            );
            self.physics.apply_arm_commands(&commands, dt);
        }

        // Locomotion sphere roll
        let roll = self
            .locomotion
            .target_velocity(input.move_axis, input.run, &input.head);
        self.physics.set_roll_velocity(roll);

        self.physics.step(dt);
    }

    /// Once per render frame: elbow hints and foot stepping
    pub fn frame_update(&mut self, dt: f32, input: &TrackedInput) {
        self.update_elbow_hints(dt, input);
        self.update_feet(dt);
    }

    fn update_elbow_hints(&mut self, dt: f32, input: &TrackedInput) {
        let pelvis_forward = self.skeleton.character_forward();

        let hint = self.left_elbow.predict(
            self.skeleton.bone(Bone::LeftUpperArm).position,
            self.skeleton.bone(Bone::LeftLowerArm).position,
            self.skeleton.bone(Bone::LeftHand).position,
            pelvis_forward,
            &input.left_hand,
            dt,
        );
        self.skeleton.set_ik_target(
            IkTarget::LeftElbowHint,
            Pose::new(hint, self.skeleton.bone(Bone::LeftLowerArm).rotation),
        );

        let hint = self.right_elbow.predict(
            self.skeleton.bone(Bone::RightUpperArm).position,
            self.skeleton.bone(Bone::RightLowerArm).position,
            self.skeleton.bone(Bone::RightHand).position,
            pelvis_forward,
            &input.right_hand,
            dt,
        );
        self.skeleton.set_ik_target(
            IkTarget::RightElbowHint,
            Pose::new(hint, self.skeleton.bone(Bone::RightLowerArm).rotation),
        );
    }

    fn feet_frame(&self, dt: f32) -> FeetFrame {
        let hips = self
            .physics
            .body_position(RigBody::Pelvis)
            .unwrap_or_else(|| self.skeleton.bone(Bone::Hips).position);
        let pelvis_velocity = self
            .physics
            .body_velocity(RigBody::Pelvis)
            .unwrap_or_else(Vector3::zeros);
        let locomotion_sphere_y = self
            .physics
            .body_position(RigBody::LocomotionSphere)
            .map(|p| p.y)
            .unwrap_or(0.0);

        FeetFrame {
            dt,
            hips,
            character_forward: self.skeleton.character_forward(),
            character_right: self.skeleton.character_right(),
            pelvis_velocity,
            ground_velocity: Vector3::zeros(),
            is_grounded: self.grounding.is_grounded(),
            locomotion_sphere_y,
        }
    }

    fn update_feet(&mut self, dt: f32) {
        let frame = self.feet_frame(dt);
        self.feet.update(&frame, &self.physics);
        self.write_feet_to_skeleton();
    }

    fn write_feet_to_skeleton(&mut self) {
        for side in [FootSide::Left, FootSide::Right] {
            let foot = self.feet.foot(side);
            let (bone, target) = match side {
                FootSide::Left => (Bone::LeftFoot, IkTarget::LeftFootTarget),
                FootSide::Right => (Bone::RightFoot, IkTarget::RightFootTarget),
            };
            let transform = foot.transform;
            let foot_target = foot.target;
            self.skeleton.set_bone(bone, transform);
            self.skeleton.set_ik_target(target, foot_target);
        }
    }

    /// Snap both feet to freshly recomputed targets, used after teleports
    pub fn teleport_feet(&mut self) {
        let frame = self.feet_frame(0.0);
        self.feet.teleport_feet(&frame, &self.physics);
        self.write_feet_to_skeleton();
    }

    /// Move the whole rig, preserving body offsets, then snap the feet
    pub fn teleport_rig(&mut self, destination: &Pose) {
        self.physics.teleport_rig(destination);
        self.teleport_feet();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::UnitQuaternion;
    use std::collections::HashMap;

    fn test_skeleton() -> Skeleton {
        let mut bones = HashMap::new();
        bones.insert(
            Bone::Hips,
            Pose::new(Vector3::new(0.0, 1.0, 0.0), UnitQuaternion::identity()),
        );
        for (bone, x, y, z) in [
            (Bone::LeftUpperArm, -0.2, 1.4, 0.0),
            (Bone::LeftLowerArm, -0.2, 1.2, 0.2),
            (Bone::LeftHand, -0.2, 1.4, 0.4),
            (Bone::RightUpperArm, 0.2, 1.4, 0.0),
            (Bone::RightLowerArm, 0.2, 1.2, 0.2),
            (Bone::RightHand, 0.2, 1.4, 0.4),
            (Bone::LeftFoot, -0.1, 0.0, 0.0),
            (Bone::RightFoot, 0.1, 0.0, 0.0),
        ] {
            bones.insert(
                bone,
                Pose::new(Vector3::new(x, y, z), UnitQuaternion::identity()),
            );
        }
        Skeleton::new(bones, Pose::identity())
    }

    fn test_rig() -> HexabodyRig {
        HexabodyRig::new(
            RigConfig::default(),
            test_skeleton(),
            Vector3::new(0.0, 0.3, 0.0),
        )
        .unwrap()
    }

    #[test]
    fn test_rig_builds_from_default_config() {
        let rig = test_rig();
        assert_eq!(rig.gait_state(), GaitStateId::Stand);
        assert_eq!(rig.target_leg_height(), 0.95);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = RigConfig::default();
        config.legs.standing_leg_height = 0.1;
        let result = HexabodyRig::new(config, test_skeleton(), Vector3::zeros());
        assert!(matches!(result, Err(RigBuildError::InvalidConfig(_))));
    }

    #[test]
    fn test_fixed_tick_runs_on_flat_ground() {
        let mut rig = test_rig();
        rig.physics.add_static_box(
            Vector3::new(0.0, -0.5, 0.0),
            Vector3::new(50.0, 0.5, 50.0),
            0.9,
        );

        let input = TrackedInput::default();
        for _ in 0..90 {
            rig.fixed_tick(1.0 / 90.0, &input);
        }

        // Sphere must have settled onto the floor, not fallen through
        let sphere = rig.physics.body_position(RigBody::LocomotionSphere).unwrap();
        assert!(sphere.y > 0.0);
        assert!(sphere.y < 1.0);
    }

    #[test]
    fn test_roomscale_rise_keeps_leg_height_in_window() {
        let mut rig = test_rig();
        rig.physics.add_static_box(
            Vector3::new(0.0, -0.5, 0.0),
            Vector3::new(50.0, 0.5, 50.0),
            0.9,
        );

        let mut input = TrackedInput::default();
        input.head = Pose::new(Vector3::new(0.0, 1.6, 0.0), UnitQuaternion::identity());
        rig.recenter(&input.head);
        rig.fixed_tick(1.0 / 90.0, &input);

        // A large headset rise must not push the target past tiptoes height
        input.head.position.y = 4.0;
        rig.fixed_tick(1.0 / 90.0, &input);
        let max = rig.config.legs.standing_leg_height + rig.config.legs.tiptoes_leg_height_gain;
        assert!(rig.target_leg_height() <= max + 1e-5);

        // Nor may a drop through the floor pull it below crawling height
        input.head.position.y = -3.0;
        rig.fixed_tick(1.0 / 90.0, &input);
        assert!(rig.target_leg_height() >= rig.config.legs.crawling_leg_height - 1e-5);
    }

    #[test]
    fn test_frame_update_writes_ik_targets() {
        let mut rig = test_rig();
        let input = TrackedInput::default();
        rig.frame_update(1.0 / 90.0, &input);

        let hint = rig.skeleton.ik_target(IkTarget::RightElbowHint);
        assert!(hint.position.norm() > 0.0);
    }

    #[test]
    fn test_teleport_rig_moves_pelvis() {
        let mut rig = test_rig();
        let destination = Pose::new(Vector3::new(5.0, 2.0, 5.0), UnitQuaternion::identity());
        rig.teleport_rig(&destination);

        let pelvis = rig.physics.body_position(RigBody::Pelvis).unwrap();
        assert!((pelvis - destination.position).norm() < 1e-4);
    }
}
