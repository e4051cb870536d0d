//! Rig physics and control-loop constants.
//! Centralizing these prevents bugs from duplicated hardcoded values.

/// Simulation cadence
pub mod sim {
    /// Fixed timestep for the physics phase (90 Hz, headset-native rate)
    pub const TIMESTEP: f32 = 1.0 / 90.0;

    /// Small epsilon for float comparisons
    pub const EPSILON: f32 = 0.001;
}

/// Ground contact detection
pub mod grounding {
    /// Static friction below this marks the surface as slipping
    pub const MIN_FRICTION: f32 = 0.1;

    /// Default maximum walkable slope angle in degrees
    pub const DEFAULT_MAX_SLOPE_ANGLE: f32 = 50.0;

    /// Hard cap on the configurable slope angle
    pub const MAX_SLOPE_ANGLE_LIMIT: f32 = 89.0;
}

/// Gait state machine tuning
pub mod gait {
    /// Seconds airborne before ground-contact flicker is trusted
    pub const MIN_AIR_TIME: f32 = 0.05;

    /// Downward velocity (m/s) that counts as falling
    pub const FALL_VELOCITY_THRESHOLD: f32 = -0.1;

    /// Leg retraction rate multiplier during the rise phase (1/s)
    pub const LEG_RISE_SPEED: f32 = 8.0;

    /// Leg extension rate multiplier while falling (1/s)
    pub const LEG_FALL_SPEED: f32 = 4.0;

    /// Pelvis joint stiffening factor while airborne or compressed
    pub const AIRBORNE_MASS_SCALE: f32 = 2.0;

    /// Crouch axis magnitude that counts as a deliberate height change
    pub const CROUCH_CHANGING_THRESHOLD: f32 = 0.75;

    /// Downward crouch axis deflection that commits to a jump wind-up
    pub const JUMP_COMMIT_THRESHOLD: f32 = 0.95;
}

/// Procedural foot stepping
pub mod feet {
    /// Rendered-foot divergence from target that triggers a step (m)
    pub const DEFAULT_STEP_LENGTH: f32 = 0.1;

    /// Pelvis-plane speed below which the rig counts as stopped (m/s)
    pub const IDLE_SPEED: f32 = 0.1;

    /// Step half-duration bounds (s); full arc runs for twice this
    pub const MIN_STEP_TIME: f32 = 0.1;
    pub const MAX_STEP_TIME: f32 = 0.2;

    /// Arc height cap (m)
    pub const MAX_STEP_HEIGHT: f32 = 0.5;

    /// Downward ray length when searching for a foot plant (m)
    pub const GROUND_RAY_LENGTH: f32 = 1.25;

    /// Lateral stance offset of each foot from the hip line (m)
    pub const STANCE_OFFSET: f32 = 0.08;

    /// Airborne foot targets hang this far below the locomotion sphere center (m)
    pub const AIRBORNE_FOOT_DROP: f32 = 0.2;
}

/// Elbow IK hint prediction
pub mod elbow {
    /// Exponential smoothing rate for the elbow direction (1/s)
    pub const SMOOTHING: f32 = 10.0;

    /// Predicted angle above which the elbow flips to the outward pose (deg)
    pub const OUTWARD_THRESHOLD: f32 = 60.0;
}

/// Rig body dimensions and joint drive tuning
pub mod body {
    /// Default downward gravity magnitude (m/s^2)
    pub const DEFAULT_GRAVITY: f32 = 9.81;

    /// Locomotion sphere radius (m)
    pub const SPHERE_RADIUS: f32 = 0.25;

    /// Knee body collider radius (m)
    pub const KNEE_RADIUS: f32 = 0.1;

    /// Pelvis capsule half height (m)
    pub const PELVIS_HALF_HEIGHT: f32 = 0.15;
    pub const PELVIS_RADIUS: f32 = 0.15;

    /// Head collider radius (m)
    pub const HEAD_RADIUS: f32 = 0.12;

    /// Vertical offset of the head body above the pelvis (m)
    pub const NECK_OFFSET: f32 = 0.35;

    /// Arm segment collider radius (m)
    pub const ARM_RADIUS: f32 = 0.04;

    /// Body masses (kg)
    pub const SPHERE_MASS: f32 = 15.0;
    pub const KNEE_MASS: f32 = 5.0;
    pub const PELVIS_MASS: f32 = 30.0;
    pub const HEAD_MASS: f32 = 5.0;
    pub const ARM_SEGMENT_MASS: f32 = 2.0;

    /// Lateral shoulder offset of each arm chain from the pelvis (m)
    pub const SHOULDER_OFFSET: f32 = 0.2;

    /// Leg prismatic motor spring
    pub const LEG_MOTOR_STIFFNESS: f32 = 4000.0;
    pub const LEG_MOTOR_DAMPING: f32 = 400.0;

    /// Arm linear drive spring
    pub const ARM_MOTOR_STIFFNESS: f32 = 1500.0;
    pub const ARM_MOTOR_DAMPING: f32 = 150.0;

    /// Angular tracking gain for arm segment rotation (1/s)
    pub const ARM_ANGULAR_GAIN: f32 = 20.0;
}

/// Arm joint targeting
pub mod arms {
    /// Margin subtracted from the rest-pose bone distance when measuring
    /// a segment's maximum drive length (m)
    pub const SEGMENT_LENGTH_MARGIN: f32 = 0.01;
}
