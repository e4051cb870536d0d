//! Tracked headset/controller poses and the per-tick input sample the rig consumes.
//! The host input system fills these in; the rig never reads devices directly.

use nalgebra::{UnitQuaternion, Vector2, Vector3};

/// A tracked point in world space
#[derive(Debug, Clone, Copy)]
pub struct Pose {
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

impl Pose {
    pub fn new(position: Vector3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Local +Z of this pose in world space
    pub fn forward(&self) -> Vector3<f32> {
        self.rotation * Vector3::z()
    }

    /// Local +Y of this pose in world space
    pub fn up(&self) -> Vector3<f32> {
        self.rotation * Vector3::y()
    }

    /// Local +X of this pose in world space
    pub fn right(&self) -> Vector3<f32> {
        self.rotation * Vector3::x()
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Everything the rig samples from tracking and input for one tick
#[derive(Debug, Clone, Copy)]
pub struct TrackedInput {
    /// Headset pose in playspace coordinates
    pub head: Pose,
    /// Left controller pose in playspace coordinates
    pub left_hand: Pose,
    /// Right controller pose in playspace coordinates
    pub right_hand: Pose,
    /// Crouch axis, -1 (full crouch pull) to +1 (full extend)
    pub crouch_axis: f32,
    /// Smooth locomotion thumbstick
    pub move_axis: Vector2<f32>,
    /// Run toggle, edge-latched by the input layer
    pub run: bool,
}

impl Default for TrackedInput {
    fn default() -> Self {
        Self {
            head: Pose::identity(),
            left_hand: Pose::identity(),
            right_hand: Pose::identity(),
            crouch_axis: 0.0,
            move_axis: Vector2::zeros(),
            run: false,
        }
    }
}

/// Which side of the body a hand/arm belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    /// +1 for the right hand, -1 for the left; used to mirror heuristics
    pub fn sign(&self) -> f32 {
        match self {
            Handedness::Left => -1.0,
            Handedness::Right => 1.0,
        }
    }
}
