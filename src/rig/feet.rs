//! Procedural two-phase foot placement and stepping.
//!
//! Every render frame the desired ground-contact pose of each foot is
//! recomputed from the hip position, the pelvis-plane velocity and a downward
//! ray. Airborne, both feet snap straight to their targets. Grounded, the
//! active foot launches a step once it diverges far enough from its target; a
//! step is an explicit task advanced once per frame (quadratic double-lerp arc,
//! faster movement giving higher and quicker arcs) instead of a coroutine.
//! Completed steps alternate the active foot and notify consumers over a
//! channel (footstep audio, haptics).

use crossbeam_channel::{Receiver, Sender};
use nalgebra::{Unit, UnitQuaternion, Vector3};

use super::constants::feet as consts;
use super::tracking::Pose;

/// Downward ray answer from the host physics scene
#[derive(Debug, Clone, Copy)]
pub struct GroundHit {
    pub point: Vector3<f32>,
    pub normal: Vector3<f32>,
}

/// Raycast seam the stepper uses to find foot plants
pub trait GroundProbe {
    fn cast_down(&self, origin: Vector3<f32>, max_distance: f32) -> Option<GroundHit>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FootSide {
    Left,
    Right,
}

impl FootSide {
    fn other(self) -> FootSide {
        match self {
            FootSide::Left => FootSide::Right,
            FootSide::Right => FootSide::Left,
        }
    }
}

/// Fired when a non-mandatory step finishes planting
#[derive(Debug, Clone, Copy)]
pub struct StepEvent {
    pub foot: FootSide,
}

/// One rendered foot and its desired ground pose
#[derive(Debug, Clone)]
pub struct Foot {
    pub transform: Pose,
    pub target: Pose,
    /// Lateral stance offset from the hip line (m)
    pub offset: f32,
    pub is_grounded: bool,
}

impl Foot {
    fn new(offset: f32) -> Self {
        Self {
            transform: Pose::identity(),
            target: Pose::identity(),
            offset,
            is_grounded: false,
        }
    }
}

/// In-flight stepping animation for one foot
#[derive(Debug, Clone)]
struct StepTask {
    foot: FootSide,
    mandatory: bool,
    start: Pose,
    elapsed: f32,
    step_time: f32,
    step_height: f32,
}

/// Everything the stepper reads from the rest of the rig each frame
#[derive(Debug, Clone, Copy)]
pub struct FeetFrame {
    pub dt: f32,
    /// Animated hip bone position
    pub hips: Vector3<f32>,
    pub character_forward: Vector3<f32>,
    pub character_right: Vector3<f32>,
    /// World velocity of the pelvis body
    pub pelvis_velocity: Vector3<f32>,
    /// Velocity of whatever surface the rig stands on
    pub ground_velocity: Vector3<f32>,
    /// Locomotion sphere support state
    pub is_grounded: bool,
    /// Locomotion sphere center height, for the airborne pose
    pub locomotion_sphere_y: f32,
}

/// Procedural foot stepper for one rig
pub struct FootStepper {
    left: Foot,
    right: Foot,
    current: FootSide,
    tasks: Vec<StepTask>,
    is_moving: bool,
    step_length: f32,
    step_time: f32,
    plane_velocity: Vector3<f32>,
    event_tx: Sender<StepEvent>,
    event_rx: Receiver<StepEvent>,
}

impl FootStepper {
    pub fn new(step_length: f32) -> Self {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        Self {
            left: Foot::new(-consts::STANCE_OFFSET),
            right: Foot::new(consts::STANCE_OFFSET),
            current: FootSide::Right,
            tasks: Vec::new(),
            is_moving: false,
            step_length,
            step_time: consts::MIN_STEP_TIME,
            plane_velocity: Vector3::zeros(),
            event_tx,
            event_rx,
        }
    }

    /// Channel delivering one event per completed non-mandatory step
    pub fn step_events(&self) -> Receiver<StepEvent> {
        self.event_rx.clone()
    }

    pub fn foot(&self, side: FootSide) -> &Foot {
        match side {
            FootSide::Left => &self.left,
            FootSide::Right => &self.right,
        }
    }

    /// Whether any step animation is in flight
    pub fn is_stepping(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Per-render-frame update: retarget, snap or step, advance tasks
    pub fn update(&mut self, frame: &FeetFrame, probe: &dyn GroundProbe) {
        self.plane_velocity =
            project_on_plane(frame.pelvis_velocity - frame.ground_velocity, Vector3::y());

        self.update_target(FootSide::Left, frame, probe);
        self.update_target(FootSide::Right, frame, probe);

        if !frame.is_grounded {
            // Air pose: no stepping animation, feet track their targets directly
            self.tasks.clear();
            self.snap_foot(FootSide::Left);
            self.snap_foot(FootSide::Right);
        } else {
            let current = self.foot(self.current);
            if (current.transform.position - current.target.position).norm() > self.step_length {
                self.try_step(self.current, false);
            }

            if self.plane_velocity.norm() < consts::IDLE_SPEED {
                if self.is_moving {
                    // Just stopped: resettle both feet under the body
                    self.try_step(FootSide::Left, true);
                    self.try_step(FootSide::Right, true);
                }
                self.is_moving = false;
            } else {
                self.is_moving = true;
            }
        }

        self.advance_tasks(frame);
    }

    /// Force both feet onto freshly recomputed targets, used after a teleport
    /// or respawn so the feet do not visibly slide into place.
    pub fn teleport_feet(&mut self, frame: &FeetFrame, probe: &dyn GroundProbe) {
        self.plane_velocity =
            project_on_plane(frame.pelvis_velocity - frame.ground_velocity, Vector3::y());
        self.tasks.clear();
        self.update_target(FootSide::Left, frame, probe);
        self.update_target(FootSide::Right, frame, probe);
        self.snap_foot(FootSide::Left);
        self.snap_foot(FootSide::Right);
    }

    fn foot_mut(&mut self, side: FootSide) -> &mut Foot {
        match side {
            FootSide::Left => &mut self.left,
            FootSide::Right => &mut self.right,
        }
    }

    fn update_target(&mut self, side: FootSide, frame: &FeetFrame, probe: &dyn GroundProbe) {
        let step_ahead = self.plane_velocity * self.step_time;
        let foot = self.foot(side);
        let lateral = frame.character_right * foot.offset;
        let candidate = frame.hips + step_ahead + lateral;

        let hit = if frame.is_grounded {
            probe.cast_down(candidate, consts::GROUND_RAY_LENGTH)
        } else {
            None
        };

        let foot = self.foot_mut(side);
        match hit {
            Some(hit) => {
                foot.is_grounded = true;
                foot.target.position = hit.point;
                foot.target.rotation = look_rotation(
                    project_on_plane(frame.character_forward, hit.normal),
                    hit.normal,
                    frame.character_forward,
                );
            }
            None => {
                // Synthetic airborne target hanging below the locomotion sphere
                foot.is_grounded = false;
                let mut target = project_on_plane(frame.hips, Vector3::y());
                target += Vector3::y() * (frame.locomotion_sphere_y - consts::AIRBORNE_FOOT_DROP);
                target += step_ahead + lateral;
                foot.target.position = target;
                foot.target.rotation =
                    look_rotation(frame.character_forward, Vector3::y(), frame.character_forward);
            }
        }
    }

    fn snap_foot(&mut self, side: FootSide) {
        let foot = self.foot_mut(side);
        foot.transform = foot.target;
    }

    /// Launch a step task. Non-mandatory steps respect the step mutex (one at a
    /// time); mandatory resettle steps bypass it by replacing their foot's task.
    fn try_step(&mut self, side: FootSide, mandatory: bool) {
        if !mandatory && self.is_stepping() {
            return;
        }
        if !self.foot(side).is_grounded {
            return;
        }
        if mandatory {
            self.tasks.retain(|task| task.foot != side);
        }

        let start = self.foot(side).transform;
        self.tasks.push(StepTask {
            foot: side,
            mandatory,
            start,
            elapsed: 0.0,
            step_time: if mandatory {
                consts::MIN_STEP_TIME
            } else {
                self.step_time
            },
            step_height: 0.0,
        });
    }

    fn advance_tasks(&mut self, frame: &FeetFrame) {
        let speed = self.plane_velocity.norm();
        let mut completed = Vec::new();

        let mut tasks = std::mem::take(&mut self.tasks);
        for task in &mut tasks {
            if task.mandatory {
                task.step_time = consts::MIN_STEP_TIME;
                task.step_height = 0.0;
            } else {
                // Faster movement: quicker, higher arcs
                task.step_time = (-2.0 / 30.0 * speed + 0.3)
                    .clamp(consts::MIN_STEP_TIME, consts::MAX_STEP_TIME);
                task.step_height = (speed / 6.0).clamp(0.0, consts::MAX_STEP_HEIGHT);
                self.step_time = task.step_time;
            }

            // The launch point rides along with a moving floor
            task.start.position += frame.ground_velocity * frame.dt;
            task.elapsed += frame.dt;

            let duration = task.step_time * 2.0;
            let t = (task.elapsed / duration).clamp(0.0, 1.0);

            let foot = match task.foot {
                FootSide::Left => &mut self.left,
                FootSide::Right => &mut self.right,
            };

            let end = foot.target;
            let start = task.start;
            let center = (start.position + end.position) / 2.0 + Vector3::y() * task.step_height;

            foot.transform.position = start
                .position
                .lerp(&center, t)
                .lerp(&center.lerp(&end.position, t), t);
            foot.transform.rotation = start
                .rotation
                .try_slerp(&end.rotation, t, 1.0e-6)
                .unwrap_or(end.rotation);

            if task.elapsed >= duration {
                completed.push((task.foot, task.mandatory));
            }
        }
        tasks.retain(|task| task.elapsed < task.step_time * 2.0);
        self.tasks = tasks;

        for (foot, mandatory) in completed {
            self.current = self.current.other();
            if !mandatory {
                let _ = self.event_tx.send(StepEvent { foot });
            }
        }
    }
}

/// Component of `v` perpendicular to the unit normal `n`
fn project_on_plane(v: Vector3<f32>, n: Vector3<f32>) -> Vector3<f32> {
    v - n * v.dot(&n)
}

/// Look rotation: local +Z toward `forward`, +Y toward `up`.
/// Degenerate forward falls back to `fallback_forward`, then to identity.
fn look_rotation(
    forward: Vector3<f32>,
    up: Vector3<f32>,
    fallback_forward: Vector3<f32>,
) -> UnitQuaternion<f32> {
    let forward = Unit::try_new(forward, 1.0e-6)
        .or_else(|| Unit::try_new(fallback_forward, 1.0e-6))
        .map(Unit::into_inner);
    match forward {
        Some(forward) => UnitQuaternion::face_towards(&forward, &up),
        None => UnitQuaternion::identity(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat ground at y = 0
    struct FlatGround;

    impl GroundProbe for FlatGround {
        fn cast_down(&self, origin: Vector3<f32>, max_distance: f32) -> Option<GroundHit> {
            if origin.y >= 0.0 && origin.y <= max_distance {
                Some(GroundHit {
                    point: Vector3::new(origin.x, 0.0, origin.z),
                    normal: Vector3::y(),
                })
            } else {
                None
            }
        }
    }

    /// No surface within reach
    struct NoGround;

    impl GroundProbe for NoGround {
        fn cast_down(&self, _origin: Vector3<f32>, _max_distance: f32) -> Option<GroundHit> {
            None
        }
    }

    fn frame(velocity: Vector3<f32>, grounded: bool) -> FeetFrame {
        FeetFrame {
            dt: 1.0 / 90.0,
            hips: Vector3::new(0.0, 0.9, 0.0),
            character_forward: Vector3::z(),
            character_right: Vector3::x(),
            pelvis_velocity: velocity,
            ground_velocity: Vector3::zeros(),
            is_grounded: grounded,
            locomotion_sphere_y: 0.15,
        }
    }

    #[test]
    fn test_at_rest_within_step_length_no_step() {
        let mut stepper = FootStepper::new(0.1);
        let frame = frame(Vector3::zeros(), true);

        // Plant both feet, then hold still
        stepper.teleport_feet(&frame, &FlatGround);
        for _ in 0..30 {
            stepper.update(&frame, &FlatGround);
            assert!(!stepper.is_stepping());
        }
    }

    #[test]
    fn test_step_triggers_beyond_step_length() {
        let mut stepper = FootStepper::new(0.1);
        let still = frame(Vector3::zeros(), true);
        stepper.teleport_feet(&still, &FlatGround);

        // Move the body forward; foot targets run ahead until the active foot
        // diverges past step length and a step launches
        let mut moving = frame(Vector3::new(0.0, 0.0, 1.5), true);
        moving.hips.z += 0.3;
        stepper.update(&moving, &FlatGround);
        assert!(stepper.is_stepping());
    }

    #[test]
    fn test_idle_resettle_converges_and_clears_stepping() {
        let mut stepper = FootStepper::new(0.1);
        let still = frame(Vector3::zeros(), true);
        stepper.teleport_feet(&still, &FlatGround);

        // Walk, then stop: mandatory steps bring both feet home
        let mut moving = frame(Vector3::new(0.0, 0.0, 1.2), true);
        for i in 0..30 {
            moving.hips.z = 0.02 * i as f32;
            stepper.update(&moving, &FlatGround);
        }
        let mut stopped = frame(Vector3::zeros(), true);
        stopped.hips.z = moving.hips.z;
        for _ in 0..60 {
            stepper.update(&stopped, &FlatGround);
        }

        assert!(!stepper.is_stepping());
        for side in [FootSide::Left, FootSide::Right] {
            let foot = stepper.foot(side);
            assert!((foot.transform.position - foot.target.position).norm() < 1e-3);
        }
    }

    #[test]
    fn test_airborne_feet_snap_to_synthetic_targets() {
        let mut stepper = FootStepper::new(0.1);
        let airborne = frame(Vector3::zeros(), false);

        stepper.update(&airborne, &NoGround);

        assert!(!stepper.is_stepping());
        for side in [FootSide::Left, FootSide::Right] {
            let foot = stepper.foot(side);
            assert!(!foot.is_grounded);
            assert_eq!(foot.transform.position, foot.target.position);
            // Synthetic target hangs below the locomotion sphere center
            assert!(
                (foot.transform.position.y - (0.15 - consts::AIRBORNE_FOOT_DROP)).abs() < 1e-6
            );
        }
    }

    #[test]
    fn test_teleport_round_trip_has_no_drift() {
        let mut stepper = FootStepper::new(0.1);
        let mut frame = frame(Vector3::zeros(), true);
        frame.hips = Vector3::new(4.0, 0.9, -2.0);

        stepper.teleport_feet(&frame, &FlatGround);
        stepper.update_target(FootSide::Left, &frame, &FlatGround);
        stepper.update_target(FootSide::Right, &frame, &FlatGround);

        for side in [FootSide::Left, FootSide::Right] {
            let foot = stepper.foot(side);
            assert_eq!(foot.transform.position, foot.target.position);
        }
    }

    #[test]
    fn test_completed_step_fires_event_and_alternates_foot() {
        let mut stepper = FootStepper::new(0.05);
        let events = stepper.step_events();
        let still = frame(Vector3::zeros(), true);
        stepper.teleport_feet(&still, &FlatGround);
        assert_eq!(stepper.current, FootSide::Right);

        let mut moving = frame(Vector3::new(0.0, 0.0, 1.5), true);
        moving.hips.z += 0.3;
        for _ in 0..60 {
            stepper.update(&moving, &FlatGround);
        }

        let event = events.try_recv().expect("step should have completed");
        assert_eq!(event.foot, FootSide::Right);
        assert_eq!(stepper.current, FootSide::Left);
    }
}
