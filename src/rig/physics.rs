use nalgebra::Vector3;
use rapier3d::prelude::*;
use std::collections::HashMap;

use super::arms::{ArmJointCommand, ArmSegmentId, RoomscaleShift};
use super::constants::body as consts;
use super::feet::{GroundHit, GroundProbe};
use super::grounding::{ContactPair as GroundContactPair, ContactPoint as GroundContactPoint};
use super::grounding::CounterImpulse;
use super::tracking::{Handedness, Pose};

// The rig never collides with itself, only with the static world
const GROUP_STATIC: Group = Group::GROUP_1;
const GROUP_RIG: Group = Group::GROUP_2;

/// Named bodies of the physics rig
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RigBody {
    LocomotionSphere,
    Knee,
    Pelvis,
    Head,
    UpperArm(Handedness),
    LowerArm(Handedness),
    Hand(Handedness),
}

fn arm_body(side: Handedness, segment: ArmSegmentId) -> RigBody {
    match segment {
        ArmSegmentId::UpperArm => RigBody::UpperArm(side),
        ArmSegmentId::LowerArm => RigBody::LowerArm(side),
        ArmSegmentId::Hand => RigBody::Hand(side),
    }
}

/// Wrapper around the Rapier3D physics world the rig couples to.
/// Owns the body/collider/joint sets plus the named handles of the rig bodies.
pub struct PhysicsWorld {
    pub gravity: Vector<Real>,
    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub integration_parameters: IntegrationParameters,
    pub physics_pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub impulse_joint_set: ImpulseJointSet,
    pub multibody_joint_set: MultibodyJointSet,
    pub ccd_solver: CCDSolver,
    pub query_pipeline: QueryPipeline,

    /// Named rig body handles, populated by `build_rig`
    pub rig_bodies: HashMap<RigBody, RigidBodyHandle>,
    /// Drivable joint per non-root rig body (joint connects it to its parent)
    pub rig_joints: HashMap<RigBody, ImpulseJointHandle>,

    /// Other-body handle per contact pair index from the last ground enumeration
    contact_partners: Vec<Option<RigidBodyHandle>>,
    leg_height_target: f32,
    pelvis_motor_scale: f32,
}

impl PhysicsWorld {
    pub fn new() -> Self {
        Self {
            gravity: vector![0.0, -consts::DEFAULT_GRAVITY, 0.0],
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            rig_bodies: HashMap::new(),
            rig_joints: HashMap::new(),
            contact_partners: Vec::new(),
            leg_height_target: 0.0,
            pelvis_motor_scale: 1.0,
        }
    }

    pub fn set_gravity(&mut self, gravity_y: f32) {
        self.gravity = vector![0.0, -gravity_y, 0.0];
    }

    pub fn gravity_vector(&self) -> Vector3<f32> {
        Vector3::new(self.gravity.x, self.gravity.y, self.gravity.z)
    }

    /// Steps the physics simulation forward by dt seconds
    pub fn step(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );
    }

    /// Adds a fixed box to the static world, returns its collider handle
    pub fn add_static_box(
        &mut self,
        position: Vector3<f32>,
        half_extents: Vector3<f32>,
        friction: f32,
    ) -> ColliderHandle {
        let body = RigidBodyBuilder::fixed()
            .translation(vector![position.x, position.y, position.z])
            .build();
        let handle = self.rigid_body_set.insert(body);
        let collider = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            .friction(friction)
            .collision_groups(InteractionGroups::new(GROUP_STATIC, Group::ALL))
            .build();
        self.collider_set
            .insert_with_parent(collider, handle, &mut self.rigid_body_set)
    }

    fn insert_rig_body(&mut self, id: RigBody, body: RigidBody, collider: Collider) {
        let handle = self.rigid_body_set.insert(body);
        self.collider_set
            .insert_with_parent(collider, handle, &mut self.rigid_body_set);
        self.rig_bodies.insert(id, handle);
    }

    fn rig_collider(shape: SharedShape, friction: f32, mass: f32) -> Collider {
        ColliderBuilder::new(shape)
            .friction(friction)
            .mass(mass)
            .collision_groups(InteractionGroups::new(GROUP_RIG, GROUP_STATIC))
            .build()
    }

    /// Builds the six-body rig (sphere, knee, pelvis, head, two arm chains) at
    /// `origin` (locomotion sphere center) with the given initial leg height.
    pub fn build_rig(&mut self, origin: Vector3<f32>, leg_height: f32) {
        self.leg_height_target = leg_height;

        let sphere_pos = origin;
        let knee_pos = origin + Vector3::new(0.0, leg_height * 0.5, 0.0);
        let pelvis_pos = origin + Vector3::new(0.0, leg_height, 0.0);
        let head_pos = pelvis_pos + Vector3::new(0.0, consts::NECK_OFFSET, 0.0);

        self.insert_rig_body(
            RigBody::LocomotionSphere,
            RigidBodyBuilder::dynamic()
                .translation(vector![sphere_pos.x, sphere_pos.y, sphere_pos.z])
                .build(),
            Self::rig_collider(
                SharedShape::ball(consts::SPHERE_RADIUS),
                1.0,
                consts::SPHERE_MASS,
            ),
        );
        self.insert_rig_body(
            RigBody::Knee,
            RigidBodyBuilder::dynamic()
                .translation(vector![knee_pos.x, knee_pos.y, knee_pos.z])
                .lock_rotations()
                .build(),
            Self::rig_collider(
                SharedShape::ball(consts::KNEE_RADIUS),
                0.0,
                consts::KNEE_MASS,
            ),
        );
        self.insert_rig_body(
            RigBody::Pelvis,
            RigidBodyBuilder::dynamic()
                .translation(vector![pelvis_pos.x, pelvis_pos.y, pelvis_pos.z])
                .lock_rotations()
                .build(),
            Self::rig_collider(
                SharedShape::capsule_y(consts::PELVIS_HALF_HEIGHT, consts::PELVIS_RADIUS),
                0.0,
                consts::PELVIS_MASS,
            ),
        );
        self.insert_rig_body(
            RigBody::Head,
            RigidBodyBuilder::dynamic()
                .translation(vector![head_pos.x, head_pos.y, head_pos.z])
                .lock_rotations()
                .build(),
            Self::rig_collider(
                SharedShape::ball(consts::HEAD_RADIUS),
                0.0,
                consts::HEAD_MASS,
            ),
        );

        for side in [Handedness::Left, Handedness::Right] {
            let x = consts::SHOULDER_OFFSET * side.sign();
            for (segment, offset) in [
                (ArmSegmentId::UpperArm, Vector3::new(x, 0.25, 0.0)),
                (ArmSegmentId::LowerArm, Vector3::new(x, 0.25, 0.2)),
                (ArmSegmentId::Hand, Vector3::new(x, 0.25, 0.4)),
            ] {
                let pos = pelvis_pos + offset;
                self.insert_rig_body(
                    arm_body(side, segment),
                    RigidBodyBuilder::dynamic()
                        .translation(vector![pos.x, pos.y, pos.z])
                        .build(),
                    Self::rig_collider(
                        SharedShape::ball(consts::ARM_RADIUS),
                        0.5,
                        consts::ARM_SEGMENT_MASS,
                    ),
                );
            }
        }

        self.build_rig_joints(leg_height);
    }

    fn leg_joint(half_height: f32) -> GenericJoint {
        GenericJointBuilder::new(
            JointAxesMask::LIN_X | JointAxesMask::LIN_Z,
        )
        .motor_position(
            JointAxis::LinY,
            half_height,
            consts::LEG_MOTOR_STIFFNESS,
            consts::LEG_MOTOR_DAMPING,
        )
        .build()
    }

    fn arm_joint() -> GenericJoint {
        let mut builder = GenericJointBuilder::new(JointAxesMask::empty());
        for axis in [JointAxis::LinX, JointAxis::LinY, JointAxis::LinZ] {
            builder = builder.motor_position(
                axis,
                0.0,
                consts::ARM_MOTOR_STIFFNESS,
                consts::ARM_MOTOR_DAMPING,
            );
        }
        builder.build()
    }

    fn build_rig_joints(&mut self, leg_height: f32) {
        let sphere = self.rig_bodies[&RigBody::LocomotionSphere];
        let knee = self.rig_bodies[&RigBody::Knee];
        let pelvis = self.rig_bodies[&RigBody::Pelvis];
        let head = self.rig_bodies[&RigBody::Head];

        let half = leg_height * 0.5;
        let knee_joint =
            self.impulse_joint_set
                .insert(sphere, knee, Self::leg_joint(half), true);
        self.rig_joints.insert(RigBody::Knee, knee_joint);

        let pelvis_joint =
            self.impulse_joint_set
                .insert(knee, pelvis, Self::leg_joint(half), true);
        self.rig_joints.insert(RigBody::Pelvis, pelvis_joint);

        let neck = GenericJointBuilder::new(
            JointAxesMask::LIN_X | JointAxesMask::LIN_Y | JointAxesMask::LIN_Z,
        )
        .local_anchor1(point![0.0, consts::NECK_OFFSET, 0.0])
        .build();
        let neck_joint = self.impulse_joint_set.insert(pelvis, head, neck, true);
        self.rig_joints.insert(RigBody::Head, neck_joint);

        for side in [Handedness::Left, Handedness::Right] {
            for segment in [
                ArmSegmentId::UpperArm,
                ArmSegmentId::LowerArm,
                ArmSegmentId::Hand,
            ] {
                let id = arm_body(side, segment);
                let handle = self.rig_bodies[&id];
                let joint = self
                    .impulse_joint_set
                    .insert(pelvis, handle, Self::arm_joint(), true);
                self.rig_joints.insert(id, joint);
            }
        }
    }

    pub fn body_position(&self, id: RigBody) -> Option<Vector3<f32>> {
        let handle = self.rig_bodies.get(&id)?;
        let body = self.rigid_body_set.get(*handle)?;
        let t = body.translation();
        Some(Vector3::new(t.x, t.y, t.z))
    }

    pub fn body_pose(&self, id: RigBody) -> Option<Pose> {
        let handle = self.rig_bodies.get(&id)?;
        let body = self.rigid_body_set.get(*handle)?;
        let t = body.translation();
        Some(Pose::new(Vector3::new(t.x, t.y, t.z), *body.rotation()))
    }

    pub fn body_velocity(&self, id: RigBody) -> Option<Vector3<f32>> {
        let handle = self.rig_bodies.get(&id)?;
        let body = self.rigid_body_set.get(*handle)?;
        let v = body.linvel();
        Some(Vector3::new(v.x, v.y, v.z))
    }

    /// Drives the leg prismatic motors toward the given total leg height
    pub fn set_leg_height(&mut self, target: f32) {
        self.leg_height_target = target;
        let half = target * 0.5;
        let knee_scale = 1.0;
        let pelvis_scale = self.pelvis_motor_scale;
        for (id, scale) in [(RigBody::Knee, knee_scale), (RigBody::Pelvis, pelvis_scale)] {
            if let Some(&handle) = self.rig_joints.get(&id) {
                if let Some(joint) = self.impulse_joint_set.get_mut(handle, true) {
                    joint.data.set_motor_position(
                        JointAxis::LinY,
                        half,
                        consts::LEG_MOTOR_STIFFNESS * scale,
                        consts::LEG_MOTOR_DAMPING * scale,
                    );
                }
            }
        }
    }

    /// Maps the gait mass scale onto the pelvis leg motor spring: a heavier
    /// pelvis phase means a stiffer drive holding it to the leg column
    pub fn set_pelvis_mass_scale(&mut self, scale: f32) {
        if (scale - self.pelvis_motor_scale).abs() < f32::EPSILON {
            return;
        }
        self.pelvis_motor_scale = scale;
        self.set_leg_height(self.leg_height_target);
    }

    /// Spins the locomotion sphere so it rolls at the target linear velocity
    pub fn set_roll_velocity(&mut self, velocity: Vector3<f32>) {
        if let Some(&handle) = self.rig_bodies.get(&RigBody::LocomotionSphere) {
            if let Some(body) = self.rigid_body_set.get_mut(handle) {
                let angvel = Vector3::y().cross(&velocity) / consts::SPHERE_RADIUS;
                body.set_angvel(vector![angvel.x, angvel.y, angvel.z], true);
            }
        }
    }

    /// Upward launch impulse on the locomotion sphere for the jump push phase
    pub fn apply_jump_impulse(&mut self, magnitude: f32) {
        if let Some(&handle) = self.rig_bodies.get(&RigBody::LocomotionSphere) {
            if let Some(body) = self.rigid_body_set.get_mut(handle) {
                body.apply_impulse(vector![0.0, magnitude, 0.0], true);
            }
        }
    }

    /// Enumerates this tick's contact pairs touching the locomotion sphere,
    /// in the shape the ground contact detector consumes. Pair indices map
    /// back to the other body for counter-impulse application.
    pub fn ground_contact_pairs(&mut self) -> Vec<GroundContactPair> {
        self.contact_partners.clear();
        let mut pairs = Vec::new();

        let Some(&sphere_handle) = self.rig_bodies.get(&RigBody::LocomotionSphere) else {
            return pairs;
        };
        let Some(sphere_body) = self.rigid_body_set.get(sphere_handle) else {
            return pairs;
        };
        let Some(&sphere_collider) = sphere_body.colliders().first() else {
            return pairs;
        };

        for contact_pair in self.narrow_phase.contact_pairs_with(sphere_collider) {
            let sphere_is_first = contact_pair.collider1 == sphere_collider;
            let other_collider = if sphere_is_first {
                contact_pair.collider2
            } else {
                contact_pair.collider1
            };
            let Some(other) = self.collider_set.get(other_collider) else {
                continue;
            };
            let friction = other.friction();
            let partner = other.parent();

            let mut points = Vec::new();
            for manifold in &contact_pair.manifolds {
                // Manifold normal points out of the first shape; flip it so it
                // always points toward the sphere (the supported body)
                let n = manifold.data.normal;
                let normal = if sphere_is_first {
                    -Vector3::new(n.x, n.y, n.z)
                } else {
                    Vector3::new(n.x, n.y, n.z)
                };

                let first_position = self
                    .collider_set
                    .get(contact_pair.collider1)
                    .map(|c| *c.position());
                for contact in &manifold.points {
                    let Some(first_position) = first_position else {
                        continue;
                    };
                    let world_point = first_position * contact.local_p1;
                    points.push(GroundContactPoint {
                        normal,
                        impulse: normal * contact.data.impulse,
                        point: Vector3::new(world_point.x, world_point.y, world_point.z),
                    });
                }
            }

            if !points.is_empty() {
                let pair_index = self.contact_partners.len();
                self.contact_partners.push(partner);
                pairs.push(GroundContactPair {
                    static_friction: friction,
                    points,
                    pair_index,
                });
            }
        }

        pairs
    }

    /// Applies the detector's counter-impulse to the sphere and its negation
    /// to the other body of the originating contact pair
    pub fn apply_counter_impulse(&mut self, counter: &CounterImpulse) {
        let impulse = vector![counter.impulse.x, counter.impulse.y, counter.impulse.z];
        let at = point![counter.point.x, counter.point.y, counter.point.z];

        if let Some(&handle) = self.rig_bodies.get(&RigBody::LocomotionSphere) {
            if let Some(body) = self.rigid_body_set.get_mut(handle) {
                body.apply_impulse_at_point(impulse, at, true);
            }
        }
        let partner = self
            .contact_partners
            .get(counter.pair_index)
            .copied()
            .flatten();
        if let Some(partner) = partner {
            if let Some(body) = self.rigid_body_set.get_mut(partner) {
                if body.is_dynamic() {
                    body.apply_impulse_at_point(-impulse, at, true);
                }
            }
        }
    }

    /// Applies one tick of arm joint drive targets
    pub fn apply_arm_commands(&mut self, commands: &[ArmJointCommand], dt: f32) {
        let pelvis_rotation = match self.body_pose(RigBody::Pelvis) {
            Some(pose) => pose.rotation,
            None => return,
        };

        for command in commands {
            let id = arm_body(command.side, command.segment);
            if let Some(&joint_handle) = self.rig_joints.get(&id) {
                if let Some(joint) = self.impulse_joint_set.get_mut(joint_handle, true) {
                    joint.data.set_local_anchor1(point![
                        command.connected_anchor.x,
                        command.connected_anchor.y,
                        command.connected_anchor.z
                    ]);
                    let t = command.target_position;
                    for (axis, value) in [
                        (JointAxis::LinX, t.x),
                        (JointAxis::LinY, t.y),
                        (JointAxis::LinZ, t.z),
                    ] {
                        joint.data.set_motor_position(
                            axis,
                            value,
                            consts::ARM_MOTOR_STIFFNESS,
                            consts::ARM_MOTOR_DAMPING,
                        );
                    }
                }
            }

            // Rotation is tracked at the velocity level
            if dt > 0.0 {
                if let Some(&handle) = self.rig_bodies.get(&id) {
                    if let Some(body) = self.rigid_body_set.get_mut(handle) {
                        let world_target = pelvis_rotation * command.target_rotation;
                        let delta = world_target * body.rotation().inverse();
                        let angvel =
                            delta.scaled_axis() * consts::ARM_ANGULAR_GAIN.min(1.0 / dt);
                        body.set_angvel(vector![angvel.x, angvel.y, angvel.z], true);
                    }
                }
            }
        }
    }

    /// Roomscale headset motion: flattened delta on ground-contact bodies,
    /// full delta on upper-body bodies, absolute yaw on the pelvis
    pub fn apply_roomscale_shift(&mut self, shift: &RoomscaleShift) {
        for (id, delta) in [
            (RigBody::LocomotionSphere, shift.flattened),
            (RigBody::Knee, shift.flattened),
            (RigBody::Pelvis, shift.full),
            (RigBody::Head, shift.full),
        ] {
            if let Some(&handle) = self.rig_bodies.get(&id) {
                if let Some(body) = self.rigid_body_set.get_mut(handle) {
                    let t = *body.translation();
                    body.set_translation(
                        vector![t.x + delta.x, t.y + delta.y, t.z + delta.z],
                        true,
                    );
                }
            }
        }
        if let Some(&handle) = self.rig_bodies.get(&RigBody::Pelvis) {
            if let Some(body) = self.rigid_body_set.get_mut(handle) {
                body.set_rotation(shift.pelvis_rotation, true);
            }
        }
    }

    /// Moves the whole rig so the pelvis lands on `destination`, preserving
    /// every body's relative offset and clearing velocities
    pub fn teleport_rig(&mut self, destination: &Pose) {
        let Some(pelvis_position) = self.body_position(RigBody::Pelvis) else {
            return;
        };
        let delta = destination.position - pelvis_position;

        let handles: Vec<RigidBodyHandle> = self.rig_bodies.values().copied().collect();
        for handle in handles {
            if let Some(body) = self.rigid_body_set.get_mut(handle) {
                let t = *body.translation();
                body.set_translation(vector![t.x + delta.x, t.y + delta.y, t.z + delta.z], true);
                body.set_linvel(vector![0.0, 0.0, 0.0], true);
                body.set_angvel(vector![0.0, 0.0, 0.0], true);
            }
        }
        if let Some(&handle) = self.rig_bodies.get(&RigBody::Pelvis) {
            if let Some(body) = self.rigid_body_set.get_mut(handle) {
                body.set_rotation(destination.rotation, true);
            }
        }
    }
}

impl GroundProbe for PhysicsWorld {
    /// Downward raycast against the static world only
    fn cast_down(&self, origin: Vector3<f32>, max_distance: f32) -> Option<GroundHit> {
        let ray = Ray::new(point![origin.x, origin.y, origin.z], vector![0.0, -1.0, 0.0]);
        let filter =
            QueryFilter::default().groups(InteractionGroups::new(GROUP_RIG, GROUP_STATIC));

        let (_, intersection) = self.query_pipeline.cast_ray_and_get_normal(
            &self.rigid_body_set,
            &self.collider_set,
            &ray,
            max_distance,
            true,
            filter,
        )?;

        let hit_point = ray.point_at(intersection.time_of_impact);
        Some(GroundHit {
            point: Vector3::new(hit_point.x, hit_point.y, hit_point.z),
            normal: Vector3::new(
                intersection.normal.x,
                intersection.normal.y,
                intersection.normal.z,
            ),
        })
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::UnitQuaternion;

    #[test]
    fn test_physics_world_creation() {
        let world = PhysicsWorld::new();
        assert_eq!(world.gravity.y, -consts::DEFAULT_GRAVITY);
    }

    #[test]
    fn test_rig_construction_places_bodies() {
        let mut world = PhysicsWorld::new();
        world.build_rig(Vector3::new(0.0, 0.3, 0.0), 0.95);

        let sphere = world.body_position(RigBody::LocomotionSphere).unwrap();
        let pelvis = world.body_position(RigBody::Pelvis).unwrap();
        assert!((pelvis.y - sphere.y - 0.95).abs() < 1e-5);
        assert!(world
            .body_position(RigBody::Hand(Handedness::Left))
            .is_some());
        assert_eq!(world.rig_joints.len(), 9);
    }

    #[test]
    fn test_teleport_preserves_offsets() {
        let mut world = PhysicsWorld::new();
        world.build_rig(Vector3::new(0.0, 0.3, 0.0), 0.95);

        let sphere_before = world.body_position(RigBody::LocomotionSphere).unwrap();
        let pelvis_before = world.body_position(RigBody::Pelvis).unwrap();

        let destination = Pose::new(Vector3::new(10.0, 5.0, -3.0), UnitQuaternion::identity());
        world.teleport_rig(&destination);

        let sphere_after = world.body_position(RigBody::LocomotionSphere).unwrap();
        let pelvis_after = world.body_position(RigBody::Pelvis).unwrap();
        assert!((pelvis_after - destination.position).norm() < 1e-4);
        let offset_before = pelvis_before - sphere_before;
        let offset_after = pelvis_after - sphere_after;
        assert!((offset_after - offset_before).norm() < 1e-4);
    }

    #[test]
    fn test_ground_probe_hits_static_floor() {
        let mut world = PhysicsWorld::new();
        world.add_static_box(
            Vector3::new(0.0, -0.5, 0.0),
            Vector3::new(50.0, 0.5, 50.0),
            0.9,
        );
        world.step(1.0 / 90.0);
        world.query_pipeline.update(&world.collider_set);

        let hit = world.cast_down(Vector3::new(0.0, 1.0, 0.0), 2.0).unwrap();
        assert!(hit.point.y.abs() < 1e-3);
        assert!(hit.normal.y > 0.99);
    }

    #[test]
    fn test_roll_velocity_spins_sphere() {
        let mut world = PhysicsWorld::new();
        world.build_rig(Vector3::new(0.0, 0.3, 0.0), 0.95);

        world.set_roll_velocity(Vector3::new(1.0, 0.0, 0.0));
        let handle = world.rig_bodies[&RigBody::LocomotionSphere];
        let body = world.rigid_body_set.get(handle).unwrap();
        // Rolling +X about +Y ground normal spins about -Z
        assert!(body.angvel().z < 0.0);
    }
}
