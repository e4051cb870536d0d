//! Ground contact detection for a rig body.
//!
//! Each fixed tick the support flags are reset, then the tick's persisting
//! contacts are evaluated in order: low-friction surfaces mark the body as
//! slipping, contacts steeper than the walkable slope limit do the same, and the
//! first walkable contact grounds the body and yields a counter-impulse that
//! cancels the sliding component of the contact impulse. The physics adapter
//! enumerates contacts and applies the impulse; the decision layer here is pure.

use nalgebra::Vector3;

use super::constants::grounding as consts;

/// Per-body support state, recomputed every fixed tick
#[derive(Debug, Clone, Copy)]
pub struct GroundContact {
    pub is_grounded: bool,
    pub ground_normal: Vector3<f32>,
    pub is_slipping: bool,
}

impl Default for GroundContact {
    fn default() -> Self {
        Self {
            is_grounded: false,
            ground_normal: Vector3::y(),
            is_slipping: false,
        }
    }
}

/// One contact point of a persisting contact pair
#[derive(Debug, Clone, Copy)]
pub struct ContactPoint {
    /// Contact normal pointing away from the surface, world space
    pub normal: Vector3<f32>,
    /// Impulse the solver applied at this point over the tick
    pub impulse: Vector3<f32>,
    /// World-space contact location
    pub point: Vector3<f32>,
}

/// One persisting contact pair between the body and another surface this tick
#[derive(Debug, Clone)]
pub struct ContactPair {
    /// Static friction of the contacted surface's material
    pub static_friction: f32,
    pub points: Vec<ContactPoint>,
    /// Index the physics adapter uses to find the other body
    pub pair_index: usize,
}

/// Corrective impulse cancelling the sliding component of a walkable contact.
/// Applied positively to the rig body and negated onto the other body at `point`.
#[derive(Debug, Clone, Copy)]
pub struct CounterImpulse {
    pub impulse: Vector3<f32>,
    pub point: Vector3<f32>,
    pub pair_index: usize,
}

/// Walkable-support detector for a single rigid body
#[derive(Debug, Clone)]
pub struct GroundContactDetector {
    max_slope_angle: f32,
    min_slope_dot: f32,
    contact: GroundContact,
}

impl GroundContactDetector {
    pub fn new(max_slope_angle_deg: f32) -> Self {
        let mut detector = Self {
            max_slope_angle: 0.0,
            min_slope_dot: 1.0,
            contact: GroundContact::default(),
        };
        detector.set_max_slope_angle(max_slope_angle_deg);
        detector
    }

    pub fn max_slope_angle(&self) -> f32 {
        self.max_slope_angle
    }

    pub fn set_max_slope_angle(&mut self, degrees: f32) {
        self.max_slope_angle = degrees.clamp(0.0, consts::MAX_SLOPE_ANGLE_LIMIT);
        self.min_slope_dot = (self.max_slope_angle + 0.001).to_radians().cos();
    }

    pub fn contact(&self) -> GroundContact {
        self.contact
    }

    pub fn is_grounded(&self) -> bool {
        self.contact.is_grounded
    }

    /// Reset support flags at the start of a fixed tick
    pub fn begin_tick(&mut self) {
        self.contact.is_grounded = false;
        self.contact.is_slipping = false;
    }

    /// Evaluate this tick's contact pairs. The first walkable contact point wins
    /// and produces the counter-impulse; later pairs are ignored once grounded.
    pub fn evaluate(
        &mut self,
        gravity: Vector3<f32>,
        pairs: &[ContactPair],
    ) -> Option<CounterImpulse> {
        for pair in pairs {
            if self.contact.is_grounded {
                break;
            }

            // Friction failure takes priority over slope angle
            self.contact.is_slipping = pair.static_friction < consts::MIN_FRICTION;
            if self.contact.is_slipping {
                continue;
            }

            // No gravity, no meaningful slope
            if gravity.norm_squared() == 0.0 {
                return None;
            }
            let up_direction = -gravity.normalize();

            for contact in &pair.points {
                let ground_normal = contact.normal;
                let slope_dot = ground_normal.dot(&up_direction);

                self.contact.is_slipping = slope_dot < self.min_slope_dot;
                if self.contact.is_slipping {
                    continue;
                }

                self.contact.is_grounded = true;
                self.contact.ground_normal = ground_normal;

                let along_plane = ground_normal.cross(&up_direction);
                let up_plane = along_plane.cross(&ground_normal);

                let impulse = contact.impulse.norm() / slope_dot * up_plane;

                return Some(CounterImpulse {
                    impulse,
                    point: contact.point,
                    pair_index: pair.pair_index,
                });
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(friction: f32, normal: Vector3<f32>, impulse: Vector3<f32>) -> ContactPair {
        ContactPair {
            static_friction: friction,
            points: vec![ContactPoint {
                normal,
                impulse,
                point: Vector3::zeros(),
            }],
            pair_index: 0,
        }
    }

    const GRAVITY: Vector3<f32> = Vector3::new(0.0, -9.81, 0.0);

    #[test]
    fn test_flat_ground_grounds_without_sliding_correction() {
        let mut detector = GroundContactDetector::new(50.0);
        detector.begin_tick();

        let counter = detector.evaluate(GRAVITY, &[pair(0.6, Vector3::y(), Vector3::y() * 5.0)]);

        assert!(detector.is_grounded());
        assert!(!detector.contact().is_slipping);
        // Normal parallel to up: the up-plane vector degenerates to zero
        let counter = counter.unwrap();
        assert!(counter.impulse.norm() < 1e-6);
    }

    #[test]
    fn test_walkable_slope_counter_impulse_magnitude() {
        let mut detector = GroundContactDetector::new(50.0);
        detector.begin_tick();

        let angle = 30.0f32.to_radians();
        let normal = Vector3::new(angle.sin(), angle.cos(), 0.0);
        let impulse = normal * 8.0;

        let counter = detector
            .evaluate(GRAVITY, &[pair(0.6, normal, impulse)])
            .unwrap();

        assert!(detector.is_grounded());
        assert_eq!(detector.contact().ground_normal, normal);
        // |counter| = |impulse| * tan(slope), and it lies in the contact plane
        let expected = 8.0 * angle.tan();
        assert!((counter.impulse.norm() - expected).abs() < 1e-4);
        assert!(counter.impulse.dot(&normal).abs() < 1e-4);
    }

    #[test]
    fn test_steep_slope_slips() {
        let mut detector = GroundContactDetector::new(50.0);
        detector.begin_tick();

        let angle = 70.0f32.to_radians();
        let normal = Vector3::new(angle.sin(), angle.cos(), 0.0);

        let counter = detector.evaluate(GRAVITY, &[pair(0.6, normal, normal * 3.0)]);

        assert!(counter.is_none());
        assert!(!detector.is_grounded());
        assert!(detector.contact().is_slipping);
    }

    #[test]
    fn test_low_friction_slips_regardless_of_slope() {
        let mut detector = GroundContactDetector::new(50.0);
        detector.begin_tick();

        let counter = detector.evaluate(GRAVITY, &[pair(0.05, Vector3::y(), Vector3::y())]);

        assert!(counter.is_none());
        assert!(!detector.is_grounded());
        assert!(detector.contact().is_slipping);
    }

    #[test]
    fn test_first_walkable_contact_wins() {
        let mut detector = GroundContactDetector::new(50.0);
        detector.begin_tick();

        let mut second = pair(0.6, Vector3::new(0.5, 0.866, 0.0).normalize(), Vector3::y());
        second.pair_index = 1;
        let pairs = vec![pair(0.6, Vector3::y(), Vector3::y()), second];

        let counter = detector.evaluate(GRAVITY, &pairs).unwrap();
        assert_eq!(counter.pair_index, 0);
        assert_eq!(detector.contact().ground_normal, Vector3::y());
    }

    #[test]
    fn test_zero_gravity_is_inert() {
        let mut detector = GroundContactDetector::new(50.0);
        detector.begin_tick();

        let counter = detector.evaluate(Vector3::zeros(), &[pair(0.6, Vector3::y(), Vector3::y())]);

        assert!(counter.is_none());
        assert!(!detector.is_grounded());
    }

    #[test]
    fn test_no_contacts_means_ungrounded() {
        let mut detector = GroundContactDetector::new(50.0);
        detector.begin_tick();
        detector.evaluate(GRAVITY, &[pair(0.6, Vector3::y(), Vector3::y())]);
        assert!(detector.is_grounded());

        detector.begin_tick();
        let counter = detector.evaluate(GRAVITY, &[]);
        assert!(counter.is_none());
        assert!(!detector.is_grounded());
    }
}
