//! Smooth locomotion input: thumbstick deflection plus a run toggle, turned
//! into a target linear velocity for the locomotion sphere in the head-forward
//! frame.

use nalgebra::{UnitQuaternion, Vector2, Vector3};

use super::tracking::Pose;

const RUN_CANCEL_DEADZONE: f32 = 0.1;

#[derive(Debug, Clone)]
pub struct SmoothLocomotion {
    default_walk_speed: f32,
    /// Current walk speed (m/s), resettable to the configured default
    pub walk_speed: f32,
    /// Walk speed times this is the run speed
    pub run_speed_multiplier: f32,
    is_running: bool,
}

impl SmoothLocomotion {
    pub fn new(walk_speed: f32, run_speed_multiplier: f32) -> Self {
        Self {
            default_walk_speed: walk_speed,
            walk_speed,
            run_speed_multiplier,
            is_running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn reset_walk_speed(&mut self) {
        self.walk_speed = self.default_walk_speed;
    }

    /// Target linear velocity for the locomotion sphere this tick.
    /// `run_toggled` is the edge-latched run button press; running also cancels
    /// itself when the stick returns to the deadzone.
    pub fn target_velocity(
        &mut self,
        move_axis: Vector2<f32>,
        run_toggled: bool,
        head: &Pose,
    ) -> Vector3<f32> {
        if run_toggled {
            self.is_running = !self.is_running;
        }
        if move_axis.norm() < RUN_CANCEL_DEADZONE {
            self.is_running = false;
        }

        let mut speed = self.walk_speed;
        if self.is_running {
            speed *= self.run_speed_multiplier;
        }

        head_forward_rotation(head) * Vector3::new(move_axis.x, 0.0, move_axis.y) * speed
    }
}

/// Yaw-only head facing, built from the camera right axis so it stays stable
/// when the player looks straight up or down
pub fn head_forward_rotation(head: &Pose) -> UnitQuaternion<f32> {
    let forward = head.right().cross(&Vector3::y());
    if forward.norm_squared() < 1.0e-9 {
        return UnitQuaternion::identity();
    }
    UnitQuaternion::face_towards(&forward, &Vector3::y())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_velocity_in_head_frame() {
        let mut loco = SmoothLocomotion::new(1.5, 2.0);
        let head = Pose::new(
            Vector3::new(0.0, 1.7, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), std::f32::consts::FRAC_PI_2),
        );

        // Full forward stick moves along the head's flattened forward (+X here)
        let v = loco.target_velocity(Vector2::new(0.0, 1.0), false, &head);
        assert!((v - Vector3::new(1.5, 0.0, 0.0)).norm() < 1e-5);
    }

    #[test]
    fn test_run_toggle_doubles_speed_and_cancels_on_idle() {
        let mut loco = SmoothLocomotion::new(1.5, 2.0);
        let head = Pose::identity();

        let v = loco.target_velocity(Vector2::new(0.0, 1.0), true, &head);
        assert!(loco.is_running());
        assert!((v.norm() - 3.0).abs() < 1e-5);

        // Stick back in the deadzone drops out of run
        let v = loco.target_velocity(Vector2::new(0.0, 0.05), false, &head);
        assert!(!loco.is_running());
        assert!(v.norm() < 0.2);

        let v = loco.target_velocity(Vector2::new(0.0, 1.0), false, &head);
        assert!((v.norm() - 1.5).abs() < 1e-5);
    }

    #[test]
    fn test_pitched_head_keeps_velocity_flat() {
        let mut loco = SmoothLocomotion::new(1.5, 2.0);
        let head = Pose::new(
            Vector3::new(0.0, 1.7, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -1.2),
        );

        let v = loco.target_velocity(Vector2::new(0.0, 1.0), false, &head);
        assert!(v.y.abs() < 1e-5);
        assert!((v.norm() - 1.5).abs() < 1e-4);
    }
}
