//! Rig calibration parsing from rig.toml files

use serde::Deserialize;
use std::path::Path;

/// How the crouch axis maps onto leg height changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrouchMode {
    /// Analog deflection scales the crouch rate
    #[default]
    Continuous,
    /// Axis snaps to full deflection once it commits, zero otherwise
    Discrete,
}

/// Leg height calibration section.
/// Heights are measured from the locomotion sphere center to the pelvis.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LegConfig {
    /// Leg height when standing upright (m)
    #[serde(default = "default_standing_leg_height")]
    pub standing_leg_height: f32,
    /// Leg height when fully crouched (m)
    #[serde(default = "default_crouching_leg_height")]
    pub crouching_leg_height: f32,
    /// Leg height when crawling (m)
    #[serde(default = "default_crawling_leg_height")]
    pub crawling_leg_height: f32,
    /// Extra height gained on tiptoes (m)
    #[serde(default = "default_tiptoes_gain")]
    pub tiptoes_leg_height_gain: f32,
    /// Leg extension/retraction speed in fractions of full height per second
    #[serde(default = "default_crouch_speed")]
    pub crouch_speed: f32,
    /// Crouch axis interpretation
    #[serde(default)]
    pub crouch_mode: CrouchMode,
}

impl Default for LegConfig {
    fn default() -> Self {
        Self {
            standing_leg_height: default_standing_leg_height(),
            crouching_leg_height: default_crouching_leg_height(),
            crawling_leg_height: default_crawling_leg_height(),
            tiptoes_leg_height_gain: default_tiptoes_gain(),
            crouch_speed: default_crouch_speed(),
            crouch_mode: CrouchMode::default(),
        }
    }
}

/// Jump tuning section
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct JumpConfig {
    /// How far the legs compress while winding up a jump (m)
    #[serde(default = "default_anticipation_height")]
    pub anticipation_height: f32,
    /// Launch impulse per meter of compression (N·s/m)
    #[serde(default = "default_jump_impulse")]
    pub jump_impulse: f32,
}

impl Default for JumpConfig {
    fn default() -> Self {
        Self {
            anticipation_height: default_anticipation_height(),
            jump_impulse: default_jump_impulse(),
        }
    }
}

/// Locomotion tuning section
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MovementConfig {
    /// Walk speed (m/s)
    #[serde(default = "default_walk_speed")]
    pub walk_speed: f32,
    /// The product of this and the walk speed is the run speed
    #[serde(default = "default_run_multiplier")]
    pub run_speed_multiplier: f32,
    /// Foot divergence that triggers a step (m)
    #[serde(default = "default_step_length")]
    pub step_length: f32,
    /// Maximum walkable slope angle (degrees)
    #[serde(default = "default_max_slope_angle")]
    pub max_slope_angle_deg: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            walk_speed: default_walk_speed(),
            run_speed_multiplier: default_run_multiplier(),
            step_length: default_step_length(),
            max_slope_angle_deg: default_max_slope_angle(),
        }
    }
}

/// Rig calibration from rig.toml
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RigConfig {
    #[serde(default)]
    pub legs: LegConfig,
    #[serde(default)]
    pub jump: JumpConfig,
    #[serde(default)]
    pub movement: MovementConfig,
}

fn default_standing_leg_height() -> f32 {
    0.95
}

fn default_crouching_leg_height() -> f32 {
    0.45
}

fn default_crawling_leg_height() -> f32 {
    0.2
}

fn default_tiptoes_gain() -> f32 {
    0.1
}

fn default_crouch_speed() -> f32 {
    2.5
}

fn default_anticipation_height() -> f32 {
    0.25
}

fn default_jump_impulse() -> f32 {
    220.0
}

fn default_walk_speed() -> f32 {
    1.5
}

fn default_run_multiplier() -> f32 {
    2.0
}

fn default_step_length() -> f32 {
    0.1
}

fn default_max_slope_angle() -> f32 {
    50.0
}

impl RigConfig {
    /// Load rig calibration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, RigConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RigConfigError::IoError(path.to_path_buf(), e))?;

        let config: Self =
            toml::from_str(&content).map_err(|e| RigConfigError::ParseError(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject calibrations the rig cannot be built from
    pub fn validate(&self) -> Result<(), RigConfigError> {
        let legs = &self.legs;
        let ordered = legs.crawling_leg_height <= legs.crouching_leg_height
            && legs.crouching_leg_height <= legs.standing_leg_height;
        if !ordered || legs.crawling_leg_height < 0.0 {
            return Err(RigConfigError::InvalidLegHeights {
                crawling: legs.crawling_leg_height,
                crouching: legs.crouching_leg_height,
                standing: legs.standing_leg_height,
            });
        }
        Ok(())
    }
}

/// Errors that can occur when loading rig calibration
#[derive(Debug)]
pub enum RigConfigError {
    IoError(std::path::PathBuf, std::io::Error),
    ParseError(std::path::PathBuf, toml::de::Error),
    InvalidLegHeights {
        crawling: f32,
        crouching: f32,
        standing: f32,
    },
}

impl std::fmt::Display for RigConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RigConfigError::IoError(path, e) => {
                write!(f, "Failed to read {}: {}", path.display(), e)
            }
            RigConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse {}: {}", path.display(), e)
            }
            RigConfigError::InvalidLegHeights {
                crawling,
                crouching,
                standing,
            } => write!(
                f,
                "Leg heights must satisfy crawling <= crouching <= standing (got {} / {} / {})",
                crawling, crouching, standing
            ),
        }
    }
}

impl std::error::Error for RigConfigError {}
