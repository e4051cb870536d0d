//! Elbow IK hint prediction.
//!
//! A two-bone arm chain leaves the elbow under-constrained, so the swing
//! direction is estimated from wrist orientation with a fixed table of
//! directional influence samples. The table is hand-tuned calibration data
//! (after a heuristic shared by TundraFightSchool); it is reproduced exactly,
//! not derived.

use nalgebra::{Unit, UnitQuaternion, Vector3};

use super::constants::elbow as consts;
use super::tracking::{Handedness, Pose};

/// Six canonical half-axes of the wrist's local frame
#[derive(Debug, Clone, Copy)]
enum WristAxis {
    X,
    Xp,
    Y,
    Yp,
    Z,
    Zp,
}

/// One directional influence sample: when the wrist's `right_axis`/`up_axis`
/// pair lines up with the reference frame, pull the elbow toward the angle
struct Influencer {
    right_axis: WristAxis,
    up_axis: WristAxis,
    inner_angle: f32,
    outer_angle: f32,
}

const fn inf(right_axis: WristAxis, up_axis: WristAxis, inner: f32, outer: f32) -> Influencer {
    Influencer {
        right_axis,
        up_axis,
        inner_angle: inner,
        outer_angle: outer,
    }
}

/// Hand-tuned calibration table; angles in degrees
#[rustfmt::skip]
const INFLUENCERS: [Influencer; 24] = [
    inf(WristAxis::X,  WristAxis::Y,  30.0,  30.0),
    inf(WristAxis::X,  WristAxis::Yp, 20.0, 140.0),
    inf(WristAxis::X,  WristAxis::Z,  20.0, 150.0),
    inf(WristAxis::X,  WristAxis::Zp, 30.0,  30.0),

    inf(WristAxis::Xp, WristAxis::Y,   0.0,   0.0),
    inf(WristAxis::Xp, WristAxis::Yp,  0.0, 170.0),
    inf(WristAxis::Xp, WristAxis::Z,   0.0, 160.0),
    inf(WristAxis::Xp, WristAxis::Zp,  0.0, 150.0),

    inf(WristAxis::Y,  WristAxis::X,  -60.0, 140.0),
    inf(WristAxis::Y,  WristAxis::Xp, -30.0, -30.0),
    inf(WristAxis::Y,  WristAxis::Z,  -20.0, 170.0),
    inf(WristAxis::Y,  WristAxis::Zp, -40.0, -40.0),

    inf(WristAxis::Yp, WristAxis::X,  90.0,  90.0),
    inf(WristAxis::Yp, WristAxis::Xp, 50.0,  50.0),
    inf(WristAxis::Yp, WristAxis::Z,  50.0, 140.0),
    inf(WristAxis::Yp, WristAxis::Zp, 50.0,  50.0),

    inf(WristAxis::Z,  WristAxis::X,  -20.0, 140.0),
    inf(WristAxis::Z,  WristAxis::Xp,  70.0,  70.0),
    inf(WristAxis::Z,  WristAxis::Y,    0.0,  90.0),
    inf(WristAxis::Z,  WristAxis::Yp,  90.0,  90.0),

    inf(WristAxis::Zp, WristAxis::X,  -20.0,  70.0),
    inf(WristAxis::Zp, WristAxis::Xp,  20.0,  20.0),
    inf(WristAxis::Zp, WristAxis::Y,   10.0,  10.0),
    inf(WristAxis::Zp, WristAxis::Yp,  30.0, 150.0),
];

/// Inward/outward elbow pose with hysteresis: the two columns of the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElbowState {
    Outward,
    Inward,
}

/// Per-arm elbow hint predictor, updated once per render frame
#[derive(Debug, Clone)]
pub struct ElbowPredictor {
    handedness: Handedness,
    smooth_elbow_direction: Vector3<f32>,
    elbow_state: ElbowState,
}

impl ElbowPredictor {
    pub fn new(handedness: Handedness) -> Self {
        Self {
            handedness,
            smooth_elbow_direction: -Vector3::y(),
            elbow_state: ElbowState::Inward,
        }
    }

    fn is_right_hand(&self) -> bool {
        self.handedness == Handedness::Right
    }

    fn wrist_axis(&self, wrist: &Pose, axis: WristAxis) -> Vector3<f32> {
        let mut x = wrist.right();
        let y = wrist.up();
        let z = wrist.forward();

        if !self.is_right_hand() {
            x = -x;
        }

        match axis {
            WristAxis::X => x,
            WristAxis::Xp => -x,
            WristAxis::Y => y,
            WristAxis::Yp => -y,
            WristAxis::Z => z,
            WristAxis::Zp => -z,
        }
    }

    /// Weighted-average elbow angle over the influence table; 0 when no sample
    /// matches the reference frame (degenerate orientation defaults neutral).
    fn influencer_average(
        &mut self,
        wrist: &Pose,
        ref_right: Vector3<f32>,
        ref_up: Vector3<f32>,
    ) -> f32 {
        let mut angle_sum = 0.0;
        let mut weight_sum = 0.0;

        for influencer in &INFLUENCERS {
            let influencer_right = self.wrist_axis(wrist, influencer.right_axis);
            let influencer_up = self.wrist_axis(wrist, influencer.up_axis);

            let weight_right = influencer_right.dot(&ref_right).max(0.0);
            let weight_up = influencer_up.dot(&ref_up).max(0.0);
            let weight = weight_right * weight_up;

            let angle = match self.elbow_state {
                ElbowState::Inward => influencer.inner_angle,
                ElbowState::Outward => influencer.outer_angle,
            };

            angle_sum += weight * angle;
            weight_sum += weight;
        }

        let predicted = if weight_sum > 0.0 {
            angle_sum / weight_sum
        } else {
            0.0
        };

        self.elbow_state = if predicted > consts::OUTWARD_THRESHOLD {
            ElbowState::Outward
        } else {
            ElbowState::Inward
        };

        predicted
    }

    /// Compute the elbow IK hint position for this frame.
    ///
    /// `upper_arm`/`lower_arm`/`hand` are the animated bone positions,
    /// `pelvis_forward` the body's forward axis, `wrist` the tracked controller
    /// pose. Degenerate geometry falls back to the previous frame's direction.
    pub fn predict(
        &mut self,
        upper_arm: Vector3<f32>,
        lower_arm: Vector3<f32>,
        hand: Vector3<f32>,
        pelvis_forward: Vector3<f32>,
        wrist: &Pose,
        dt: f32,
    ) -> Vector3<f32> {
        let Some(shoulder_to_hand) = Unit::try_new(hand - upper_arm, 1.0e-6) else {
            // Hand collapsed onto the shoulder: keep the elbow where it was
            return lower_arm;
        };
        let dir = shoulder_to_hand.into_inner();

        // Elbow circle: project the elbow bone onto the shoulder-hand axis
        let elbow_origin = upper_arm + dir * (lower_arm - upper_arm).dot(&dir);
        let elbow_radius = (elbow_origin - lower_arm).norm();

        // Reference "elbow down" frame from the shortest body-forward rotation
        let elbow_down_rotation = UnitQuaternion::rotation_between(&pelvis_forward, &dir)
            .unwrap_or_else(UnitQuaternion::identity);

        let ref_up = elbow_down_rotation * Vector3::y();
        let mut ref_right = ref_up.cross(&dir);
        if !self.is_right_hand() {
            ref_right = -ref_right;
        }

        let mut predicted_angle = self.influencer_average(wrist, ref_right, ref_up);
        if !self.is_right_hand() {
            predicted_angle = -predicted_angle;
        }

        let swing = UnitQuaternion::from_axis_angle(&shoulder_to_hand, predicted_angle.to_radians());
        let elbow_direction = elbow_down_rotation * (swing * -Vector3::y());

        self.smooth_elbow_direction =
            slerp_direction(self.smooth_elbow_direction, elbow_direction, dt * consts::SMOOTHING);

        // Project the smoothed direction onto the elbow circle's plane
        let in_plane = self.smooth_elbow_direction - dir * self.smooth_elbow_direction.dot(&dir);
        let hint_direction = Unit::try_new(in_plane, 1.0e-6)
            .map(Unit::into_inner)
            .unwrap_or(elbow_direction);

        elbow_origin + hint_direction * elbow_radius
    }
}

/// Spherical interpolation between two directions, tolerant of degenerate input
fn slerp_direction(from: Vector3<f32>, to: Vector3<f32>, t: f32) -> Vector3<f32> {
    let t = t.clamp(0.0, 1.0);
    let (Some(from), Some(to)) = (Unit::try_new(from, 1.0e-6), Unit::try_new(to, 1.0e-6)) else {
        return to;
    };
    from.try_slerp(&to, t, 1.0e-6)
        .map(Unit::into_inner)
        .unwrap_or_else(|| to.into_inner())
}
