//! Virtual crouching: owns the target leg height other systems read and write.
//!
//! The crouch axis integrates into `target_leg_height` every fixed tick and the
//! result is clamped to a window that depends on what the rig is doing: the full
//! crawl-to-tiptoes range while the stick is held, the plain crouch-to-stand
//! range once it is released, and a window shifted down by the anticipation
//! height while a jump is winding up.

use super::constants::gait;
use crate::config::{CrouchMode, LegConfig};

/// Leg-height state plus per-character calibration
#[derive(Debug, Clone)]
pub struct LegHeightController {
    pub standing_leg_height: f32,
    pub crouching_leg_height: f32,
    pub crawling_leg_height: f32,
    pub tiptoes_leg_height_gain: f32,
    /// Extension/retraction speed in fractions of full height per second
    pub crouch_speed: f32,
    /// The scalar the pelvis joint drives toward
    pub target_leg_height: f32,
    crouch_mode: CrouchMode,
    crouch_input: f32,
    was_crouch_changing: bool,
}

impl LegHeightController {
    pub fn new(config: &LegConfig) -> Self {
        Self {
            standing_leg_height: config.standing_leg_height,
            crouching_leg_height: config.crouching_leg_height,
            crawling_leg_height: config.crawling_leg_height,
            tiptoes_leg_height_gain: config.tiptoes_leg_height_gain,
            crouch_speed: config.crouch_speed,
            target_leg_height: config.standing_leg_height,
            crouch_mode: config.crouch_mode,
            crouch_input: 0.0,
            was_crouch_changing: false,
        }
    }

    /// Crouch axis sample for this tick, -1 (pull legs) to +1 (extend).
    /// Discrete mode snaps the axis to full deflection past the commitment
    /// threshold and ignores it below.
    pub fn set_crouch_input(&mut self, magnitude: f32) {
        let magnitude = magnitude.clamp(-1.0, 1.0);
        self.crouch_input = match self.crouch_mode {
            CrouchMode::Continuous => magnitude,
            CrouchMode::Discrete => {
                if magnitude.abs() >= gait::CROUCH_CHANGING_THRESHOLD {
                    magnitude.signum()
                } else {
                    0.0
                }
            }
        };
    }

    pub fn crouch_input(&self) -> f32 {
        self.crouch_input
    }

    /// Whether the player is deliberately changing leg height this tick
    pub fn is_crouch_changing(&self) -> bool {
        self.crouch_input.abs() >= gait::CROUCH_CHANGING_THRESHOLD
    }

    /// Standing minus crouching; the span crouch speed is expressed against
    pub fn full_height(&self) -> f32 {
        self.standing_leg_height - self.crouching_leg_height
    }

    /// Airborne clamp floor: a third of the crawl range above crawling height
    pub fn airborne_min_height(&self) -> f32 {
        (self.standing_leg_height - self.crawling_leg_height) / 3.0
    }

    /// Integrate the crouch axis and clamp the target to the valid window.
    /// `compressed_shift` is the jump anticipation offset while winding up.
    pub fn fixed_tick(&mut self, dt: f32, compressed_shift: Option<f32>) {
        self.target_leg_height += self.crouch_input * self.crouch_speed * self.full_height() * dt;

        let mut min_leg_height = self.crawling_leg_height;
        let mut max_leg_height = self.standing_leg_height + self.tiptoes_leg_height_gain;

        if let Some(shift) = compressed_shift {
            min_leg_height -= shift;
            max_leg_height -= shift;
        } else if !self.is_crouch_changing() && self.was_crouch_changing {
            // Stick released: settle back into the plain crouch-to-stand range
            min_leg_height = self.crouching_leg_height;
            max_leg_height = self.standing_leg_height;
        }

        self.target_leg_height = self.target_leg_height.clamp(min_leg_height, max_leg_height);
        self.was_crouch_changing = self.is_crouch_changing();
    }

    /// Absorb vertical roomscale head motion into the target, keeping it
    /// inside the global crawl-to-tiptoes window
    pub fn apply_roomscale_delta(&mut self, delta_y: f32) {
        self.target_leg_height = (self.target_leg_height + delta_y).clamp(
            self.crawling_leg_height,
            self.standing_leg_height + self.tiptoes_leg_height_gain,
        );
    }

    /// Clamp used by every airborne gait state after it adjusts the target
    pub fn clamp_airborne(&mut self) {
        self.target_leg_height = self
            .target_leg_height
            .clamp(self.airborne_min_height(), self.standing_leg_height);
    }
}
