//! Couples the simulated body to the tracked pose: arm joint targeting with
//! hard length clamps, and roomscale propagation of headset movement.
//!
//! Every fixed tick each arm segment's drivable joint is retargeted at its
//! animated reference bone (hands at the tracked controller instead), with the
//! drive target clamped so it can never be driven farther from the segment's
//! anchor bone than the real arm allows. Headset motion is decomposed into a
//! flattened part for the ground-contact bodies and a full 3-D part for the
//! upper body, so the feet stay ground-anchored while the torso tracks exactly.

use nalgebra::{UnitQuaternion, Vector3};

use super::constants::arms as consts;
use super::skeleton::{Bone, Skeleton};
use super::tracking::{Handedness, Pose};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmSegmentId {
    UpperArm,
    LowerArm,
    Hand,
}

/// One drivable arm segment
#[derive(Debug, Clone)]
pub struct ArmSegment {
    pub id: ArmSegmentId,
    /// Animated bone this segment's joint drives toward
    pub bone: Bone,
    /// Bone the length clamp is anchored at
    pub anchor_bone: Bone,
    /// Hard cap on the drive distance from the anchor bone (m)
    pub max_length: f32,
    /// Local grab re-targeting offset, hands only
    pub position_offset: Vector3<f32>,
    pub rotation_offset: UnitQuaternion<f32>,
}

/// Joint drive values for one segment, in the parent body's local frame
#[derive(Debug, Clone, Copy)]
pub struct ArmJointCommand {
    pub side: Handedness,
    pub segment: ArmSegmentId,
    /// Connected anchor: parent-local vector to the animated bone
    pub connected_anchor: Vector3<f32>,
    pub target_position: Vector3<f32>,
    pub target_rotation: UnitQuaternion<f32>,
}

#[derive(Debug, Clone)]
struct ArmChain {
    side: Handedness,
    upper: ArmSegment,
    lower: ArmSegment,
    hand: ArmSegment,
}

fn bones_for(side: Handedness) -> (Bone, Bone, Bone) {
    match side {
        Handedness::Left => (Bone::LeftUpperArm, Bone::LeftLowerArm, Bone::LeftHand),
        Handedness::Right => (Bone::RightUpperArm, Bone::RightLowerArm, Bone::RightHand),
    }
}

impl ArmChain {
    fn new(side: Handedness, skeleton: &Skeleton) -> Self {
        let (upper, lower, hand) = bones_for(side);

        let upper_to_lower = skeleton.rest_distance(upper, lower);
        let lower_to_hand = skeleton.rest_distance(lower, hand);
        let pelvis_to_upper = skeleton.rest_distance(Bone::Hips, upper);

        Self {
            side,
            upper: ArmSegment {
                id: ArmSegmentId::UpperArm,
                bone: upper,
                anchor_bone: Bone::Hips,
                max_length: (pelvis_to_upper - consts::SEGMENT_LENGTH_MARGIN).max(0.0),
                position_offset: Vector3::zeros(),
                rotation_offset: UnitQuaternion::identity(),
            },
            lower: ArmSegment {
                id: ArmSegmentId::LowerArm,
                bone: lower,
                anchor_bone: upper,
                max_length: (upper_to_lower - consts::SEGMENT_LENGTH_MARGIN).max(0.0),
                position_offset: Vector3::zeros(),
                rotation_offset: UnitQuaternion::identity(),
            },
            hand: ArmSegment {
                id: ArmSegmentId::Hand,
                bone: hand,
                anchor_bone: upper,
                max_length: (upper_to_lower + lower_to_hand - consts::SEGMENT_LENGTH_MARGIN)
                    .max(0.0),
                position_offset: Vector3::zeros(),
                rotation_offset: UnitQuaternion::identity(),
            },
        }
    }

    fn segment_command(
        &self,
        segment: &ArmSegment,
        world_target: &Pose,
        parent: &Pose,
        skeleton: &Skeleton,
    ) -> ArmJointCommand {
        let parent_inv = parent.rotation.inverse();
        let bone_position = skeleton.bone(segment.bone).position;
        let anchor_position = skeleton.bone(segment.anchor_bone).position;

        // Clamp the drive target against the anchor bone so the joint can
        // never stretch the segment past the real arm's length
        let reach = world_target.position - anchor_position;
        let clamped_world = if reach.norm() > segment.max_length {
            anchor_position + reach.normalize() * segment.max_length
        } else {
            world_target.position
        };

        ArmJointCommand {
            side: self.side,
            segment: segment.id,
            connected_anchor: parent_inv * (bone_position - parent.position),
            target_position: parent_inv * (clamped_world - parent.position),
            target_rotation: parent_inv * world_target.rotation,
        }
    }

    fn commands(
        &self,
        skeleton: &Skeleton,
        parent: &Pose,
        tracked_hand: &Pose,
        out: &mut Vec<ArmJointCommand>,
    ) {
        let upper_target = skeleton.bone(self.upper.bone);
        let lower_target = skeleton.bone(self.lower.bone);
        out.push(self.segment_command(&self.upper, &upper_target, parent, skeleton));
        out.push(self.segment_command(&self.lower, &lower_target, parent, skeleton));

        // Hands chase the controller, composed with the transient grab offset
        let hand_target = Pose::new(
            tracked_hand.position + tracked_hand.rotation * self.hand.position_offset,
            tracked_hand.rotation * self.hand.rotation_offset,
        );
        out.push(self.segment_command(&self.hand, &hand_target, parent, skeleton));
    }
}

/// Per-tick joint targeting for both arms
#[derive(Debug, Clone)]
pub struct BodyPoseSync {
    left: ArmChain,
    right: ArmChain,
}

impl BodyPoseSync {
    /// Measures segment lengths from the skeleton's rest pose
    pub fn new(skeleton: &Skeleton) -> Self {
        Self {
            left: ArmChain::new(Handedness::Left, skeleton),
            right: ArmChain::new(Handedness::Right, skeleton),
        }
    }

    /// Off-hand grab re-targeting hook: offsets composed onto the tracked hand
    /// pose before the clamp-and-drive step. Identity when nothing is held.
    pub fn set_hand_offset(
        &mut self,
        side: Handedness,
        position: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
    ) {
        let chain = match side {
            Handedness::Left => &mut self.left,
            Handedness::Right => &mut self.right,
        };
        chain.hand.position_offset = position;
        chain.hand.rotation_offset = rotation;
    }

    pub fn clear_hand_offset(&mut self, side: Handedness) {
        self.set_hand_offset(side, Vector3::zeros(), UnitQuaternion::identity());
    }

    /// Compute this tick's joint drive targets for all six arm segments
    pub fn joint_commands(
        &self,
        skeleton: &Skeleton,
        pelvis: &Pose,
        left_hand: &Pose,
        right_hand: &Pose,
    ) -> Vec<ArmJointCommand> {
        let mut out = Vec::with_capacity(6);
        self.left.commands(skeleton, pelvis, left_hand, &mut out);
        self.right.commands(skeleton, pelvis, right_hand, &mut out);
        out
    }
}

/// Rigid shift to apply to the physics bodies for one tick of headset motion
#[derive(Debug, Clone, Copy)]
pub struct RoomscaleShift {
    /// Applied to upper-body bodies (pelvis, head)
    pub full: Vector3<f32>,
    /// Y-flattened, applied to ground-contact bodies (locomotion sphere, knee)
    pub flattened: Vector3<f32>,
    /// Absolute yaw the pelvis rotation target takes this tick
    pub pelvis_rotation: UnitQuaternion<f32>,
}

/// Decompose headset movement relative to the playspace origin.
/// The vertical part of the delta is absorbed by the leg height instead of
/// translating the ground-contact bodies.
pub fn roomscale_shift(playspace_origin: &Pose, head: &Pose) -> RoomscaleShift {
    let delta = head.position - playspace_origin.position;
    let flattened = Vector3::new(delta.x, 0.0, delta.z);

    RoomscaleShift {
        full: delta,
        flattened,
        pelvis_rotation: yaw_rotation(&head.rotation),
    }
}

/// Rotation about +Y that matches the pose's horizontal facing
pub fn yaw_rotation(rotation: &UnitQuaternion<f32>) -> UnitQuaternion<f32> {
    let forward = rotation * Vector3::z();
    let flat = Vector3::new(forward.x, 0.0, forward.z);
    if flat.norm_squared() < 1.0e-9 {
        // Looking straight up or down: keep the identity heading
        return UnitQuaternion::identity();
    }
    let yaw = flat.x.atan2(flat.z);
    UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_skeleton() -> Skeleton {
        let mut bones = HashMap::new();
        bones.insert(Bone::Hips, Pose::new(Vector3::new(0.0, 1.0, 0.0), UnitQuaternion::identity()));
        for (bone, x) in [
            (Bone::LeftUpperArm, -0.2),
            (Bone::LeftLowerArm, -0.45),
            (Bone::LeftHand, -0.7),
            (Bone::RightUpperArm, 0.2),
            (Bone::RightLowerArm, 0.45),
            (Bone::RightHand, 0.7),
        ] {
            bones.insert(
                bone,
                Pose::new(Vector3::new(x, 1.4, 0.0), UnitQuaternion::identity()),
            );
        }
        Skeleton::new(bones, Pose::identity())
    }

    #[test]
    fn test_hand_target_clamped_to_arm_length() {
        let skeleton = test_skeleton();
        let sync = BodyPoseSync::new(&skeleton);
        let pelvis = Pose::new(Vector3::new(0.0, 1.0, 0.0), UnitQuaternion::identity());

        // Controller two meters out: far beyond the 0.5 m arm
        let far_hand = Pose::new(Vector3::new(2.2, 1.4, 0.0), UnitQuaternion::identity());
        let commands = sync.joint_commands(&skeleton, &pelvis, &Pose::identity(), &far_hand);

        let hand = commands
            .iter()
            .find(|c| c.side == Handedness::Right && c.segment == ArmSegmentId::Hand)
            .unwrap();

        // Target in world space, re-derived from the parent-local command
        let world = pelvis.position + pelvis.rotation * hand.target_position;
        let anchor = skeleton.bone(Bone::RightUpperArm).position;
        let max_length = 0.5 - consts::SEGMENT_LENGTH_MARGIN;
        assert!(((world - anchor).norm() - max_length).abs() < 1e-5);
    }

    #[test]
    fn test_in_reach_hand_target_not_clamped() {
        let skeleton = test_skeleton();
        let sync = BodyPoseSync::new(&skeleton);
        let pelvis = Pose::new(Vector3::new(0.0, 1.0, 0.0), UnitQuaternion::identity());

        let near_hand = Pose::new(Vector3::new(0.5, 1.4, 0.0), UnitQuaternion::identity());
        let commands = sync.joint_commands(&skeleton, &pelvis, &Pose::identity(), &near_hand);

        let hand = commands
            .iter()
            .find(|c| c.side == Handedness::Right && c.segment == ArmSegmentId::Hand)
            .unwrap();

        let world = pelvis.position + pelvis.rotation * hand.target_position;
        assert!((world - near_hand.position).norm() < 1e-5);
    }

    #[test]
    fn test_hand_offset_composes_before_clamp() {
        let skeleton = test_skeleton();
        let mut sync = BodyPoseSync::new(&skeleton);
        let pelvis = Pose::new(Vector3::new(0.0, 1.0, 0.0), UnitQuaternion::identity());

        sync.set_hand_offset(
            Handedness::Right,
            Vector3::new(0.0, 0.0, 0.1),
            UnitQuaternion::identity(),
        );
        let tracked = Pose::new(Vector3::new(0.5, 1.4, 0.0), UnitQuaternion::identity());
        let commands = sync.joint_commands(&skeleton, &pelvis, &Pose::identity(), &tracked);
        let hand = commands
            .iter()
            .find(|c| c.side == Handedness::Right && c.segment == ArmSegmentId::Hand)
            .unwrap();

        let world = pelvis.position + pelvis.rotation * hand.target_position;
        assert!((world - Vector3::new(0.5, 1.4, 0.1)).norm() < 1e-5);

        sync.clear_hand_offset(Handedness::Right);
        let commands = sync.joint_commands(&skeleton, &pelvis, &Pose::identity(), &tracked);
        let hand = commands
            .iter()
            .find(|c| c.side == Handedness::Right && c.segment == ArmSegmentId::Hand)
            .unwrap();
        let world = pelvis.position + pelvis.rotation * hand.target_position;
        assert!((world - tracked.position).norm() < 1e-5);
    }

    #[test]
    fn test_roomscale_split() {
        let origin = Pose::identity();
        let head = Pose::new(
            Vector3::new(0.3, 1.7, -0.2),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.5),
        );

        let shift = roomscale_shift(&origin, &head);
        assert_eq!(shift.full, Vector3::new(0.3, 1.7, -0.2));
        assert_eq!(shift.flattened, Vector3::new(0.3, 0.0, -0.2));

        // Pelvis heading follows the head's horizontal facing
        let forward = shift.pelvis_rotation * Vector3::z();
        assert!(forward.y.abs() < 1e-6);
        assert!((forward.x.atan2(forward.z) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_yaw_rotation_degenerate_looks_up() {
        let straight_up = UnitQuaternion::from_axis_angle(
            &Vector3::x_axis(),
            -std::f32::consts::FRAC_PI_2,
        );
        assert_eq!(yaw_rotation(&straight_up), UnitQuaternion::identity());
    }
}
