//! Hexabody: a physics-driven full-body VR avatar rig.
//!
//! The rig couples a six-body physics avatar (locomotion sphere, knee, pelvis,
//! head, two arm chains) to tracked headset/controller poses: ground contact
//! detection, a jump/crouch gait state machine, heuristic elbow IK hints,
//! procedural foot stepping and roomscale/arm pose synchronization.

pub mod config;
pub mod net;
pub mod rig;
