//! Replication glue: body state snapshots serialized as opaque payloads.
//! Transport, ownership and interest management belong to the host netcode.

use serde::{Deserialize, Serialize};

use crate::rig::physics::{PhysicsWorld, RigBody};

/// One replicated body's state for an unreliable snapshot channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodySnapshot {
    pub position: [f32; 3],
    /// Quaternion as [x, y, z, w]
    pub rotation: [f32; 4],
    pub velocity: [f32; 3],
    pub angular_velocity: [f32; 3],
    pub use_gravity: bool,
    pub immovable: bool,
}

impl BodySnapshot {
    /// Capture a rig body's current state, if it exists
    pub fn capture(physics: &PhysicsWorld, id: RigBody) -> Option<Self> {
        let handle = physics.rig_bodies.get(&id)?;
        let body = physics.rigid_body_set.get(*handle)?;
        let t = body.translation();
        let r = body.rotation();
        let v = body.linvel();
        let w = body.angvel();
        Some(Self {
            position: [t.x, t.y, t.z],
            rotation: [r.i, r.j, r.k, r.w],
            velocity: [v.x, v.y, v.z],
            angular_velocity: [w.x, w.y, w.z],
            use_gravity: body.gravity_scale() > 0.0,
            immovable: !body.is_dynamic(),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}
