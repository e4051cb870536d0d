//! Read/write view of the animated skeleton the physics rig is coupled to.
//!
//! The host animation system owns the real skeleton; the rig addresses bones by
//! name, reads current poses, and writes IK-driven transforms (foot bones, elbow
//! hints) back. Rest-pose distances are captured once at startup for the arm
//! segment length clamps.

use std::collections::HashMap;

use nalgebra::Vector3;

use super::tracking::Pose;

/// Named bones of the humanoid skeleton the rig touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bone {
    Hips,
    LeftUpperArm,
    LeftLowerArm,
    LeftHand,
    RightUpperArm,
    RightLowerArm,
    RightHand,
    LeftFoot,
    RightFoot,
}

/// Auxiliary IK transforms the rig drives (not real bones)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IkTarget {
    LeftFootTarget,
    RightFootTarget,
    LeftElbowHint,
    RightElbowHint,
}

/// Bone-pose store standing in for the excluded animation system's lookup surface
#[derive(Debug, Clone)]
pub struct Skeleton {
    bones: HashMap<Bone, Pose>,
    ik_targets: HashMap<IkTarget, Pose>,
    rest_pose: HashMap<Bone, Pose>,
    /// Character root facing, kept separate from any single bone
    pub character: Pose,
}

impl Skeleton {
    /// Capture the current bone set as both the live pose and the rest pose
    pub fn new(bones: HashMap<Bone, Pose>, character: Pose) -> Self {
        let rest_pose = bones.clone();
        Self {
            bones,
            ik_targets: HashMap::new(),
            rest_pose,
            character,
        }
    }

    pub fn bone(&self, bone: Bone) -> Pose {
        self.bones.get(&bone).copied().unwrap_or_default()
    }

    pub fn set_bone(&mut self, bone: Bone, pose: Pose) {
        self.bones.insert(bone, pose);
    }

    pub fn rest_bone(&self, bone: Bone) -> Pose {
        self.rest_pose.get(&bone).copied().unwrap_or_default()
    }

    pub fn ik_target(&self, target: IkTarget) -> Pose {
        self.ik_targets.get(&target).copied().unwrap_or_default()
    }

    pub fn set_ik_target(&mut self, target: IkTarget, pose: Pose) {
        self.ik_targets.insert(target, pose);
    }

    /// Rest-pose distance between two bones (m)
    pub fn rest_distance(&self, a: Bone, b: Bone) -> f32 {
        (self.rest_bone(a).position - self.rest_bone(b).position).norm()
    }

    /// Character root forward axis in world space
    pub fn character_forward(&self) -> Vector3<f32> {
        self.character.forward()
    }

    /// Character root right axis in world space
    pub fn character_right(&self) -> Vector3<f32> {
        self.character.right()
    }
}

impl Default for Skeleton {
    fn default() -> Self {
        Self::new(HashMap::new(), Pose::identity())
    }
}
