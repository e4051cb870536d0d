//! Gait state machine driving leg-height dynamics and pelvis stiffening.
//!
//! States: Stand, Compress (jump wind-up), Push (launch), Rise, Fly (generic
//! airborne), Fall, Recover. Per-state timers live inside the enum variants and
//! every transition goes through `change_state`, whose exit path always restores
//! the pelvis mass scale to 1 so no stiffening can leak across transitions.
//! External systems influence the machine only through ground contact and the
//! crouch axis; nothing can force a transition directly.

use super::constants::gait as consts;
use super::crouching::LegHeightController;
use crate::config::JumpConfig;

/// Discriminant-only view of the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GaitStateId {
    Stand,
    Compress,
    Push,
    Rise,
    Fly,
    Fall,
    Recover,
}

/// Current state with its private timers
#[derive(Debug, Clone, Copy)]
enum GaitState {
    Stand,
    Compress,
    Push,
    Rise {
        air_time: f32,
        leg_rise_time: f32,
        has_overridden_lift: bool,
    },
    Fly {
        air_time: f32,
        is_falling: bool,
        has_overridden_lift: bool,
    },
    Fall,
    Recover,
}

impl GaitState {
    fn id(&self) -> GaitStateId {
        match self {
            GaitState::Stand => GaitStateId::Stand,
            GaitState::Compress => GaitStateId::Compress,
            GaitState::Push => GaitStateId::Push,
            GaitState::Rise { .. } => GaitStateId::Rise,
            GaitState::Fly { .. } => GaitStateId::Fly,
            GaitState::Fall => GaitStateId::Fall,
            GaitState::Recover => GaitStateId::Recover,
        }
    }
}

/// Per-tick readings the machine consumes
#[derive(Debug, Clone, Copy)]
pub struct GaitInputs {
    pub dt: f32,
    /// Walkable support under the locomotion sphere this tick
    pub grounded: bool,
    /// Vertical velocity of the locomotion sphere (m/s)
    pub vertical_velocity: f32,
}

/// Jump/crouch finite-state controller for one rig
#[derive(Debug, Clone)]
pub struct GaitStateMachine {
    state: GaitState,
    pelvis_mass_scale: f32,
    anticipation_height: f32,
    jump_impulse_per_meter: f32,
    pending_jump_impulse: Option<f32>,
}

impl GaitStateMachine {
    pub fn new(config: &JumpConfig) -> Self {
        Self {
            state: GaitState::Stand,
            pelvis_mass_scale: 1.0,
            anticipation_height: config.anticipation_height,
            jump_impulse_per_meter: config.jump_impulse,
            pending_jump_impulse: None,
        }
    }

    pub fn state(&self) -> GaitStateId {
        self.state.id()
    }

    /// Stiffening factor the physics adapter maps onto the pelvis joint drive
    pub fn pelvis_mass_scale(&self) -> f32 {
        self.pelvis_mass_scale
    }

    /// Offset to shift the crouch clamp window down by while winding up a jump
    pub fn compressed_shift(&self) -> Option<f32> {
        match self.state {
            GaitState::Compress => Some(self.anticipation_height),
            _ => None,
        }
    }

    /// Upward launch impulse requested by the Push state, consumed once
    pub fn take_jump_impulse(&mut self) -> Option<f32> {
        self.pending_jump_impulse.take()
    }

    /// Advance one fixed tick
    pub fn fixed_tick(&mut self, inputs: GaitInputs, legs: &mut LegHeightController) {
        let next = self.update_state(inputs, legs);
        if let Some(next) = next {
            self.change_state(next, legs);
        }
    }

    fn update_state(
        &mut self,
        inputs: GaitInputs,
        legs: &mut LegHeightController,
    ) -> Option<GaitState> {
        let dt = inputs.dt;

        match &mut self.state {
            GaitState::Stand => {
                if !inputs.grounded {
                    return Some(GaitState::Fly {
                        air_time: 0.0,
                        is_falling: false,
                        has_overridden_lift: false,
                    });
                }
                if legs.crouch_input() <= -consts::JUMP_COMMIT_THRESHOLD {
                    return Some(GaitState::Compress);
                }
                None
            }

            GaitState::Compress => {
                if !inputs.grounded {
                    return Some(GaitState::Fly {
                        air_time: 0.0,
                        is_falling: false,
                        has_overridden_lift: false,
                    });
                }
                // Releasing the committed crouch launches the jump
                if legs.crouch_input() > -consts::CROUCH_CHANGING_THRESHOLD {
                    return Some(GaitState::Push);
                }
                None
            }

            GaitState::Push => {
                // Single-tick launch phase; the impulse was queued on entry
                Some(GaitState::Rise {
                    air_time: 0.0,
                    leg_rise_time: 3.0 / consts::LEG_RISE_SPEED,
                    has_overridden_lift: false,
                })
            }

            GaitState::Rise {
                air_time,
                leg_rise_time,
                has_overridden_lift,
            } => {
                *air_time += dt;

                let falling = inputs.vertical_velocity < consts::FALL_VELOCITY_THRESHOLD
                    && *air_time > consts::MIN_AIR_TIME;
                if falling || *air_time > *leg_rise_time {
                    return Some(GaitState::Fall);
                }

                if *air_time > *leg_rise_time / 2.0 && *has_overridden_lift {
                    return Some(GaitState::Stand);
                }

                let crouch_rate = legs.standing_leg_height * consts::LEG_RISE_SPEED;
                let mut new_leg_height = legs.target_leg_height - crouch_rate * dt;

                let crouch_input = legs.crouch_input();
                if crouch_input < 0.0 && legs.is_crouch_changing() {
                    new_leg_height -= crouch_input * legs.crouch_speed * dt;
                    *has_overridden_lift = true;
                }

                legs.target_leg_height = new_leg_height;
                legs.clamp_airborne();
                None
            }

            GaitState::Fly {
                air_time,
                is_falling,
                has_overridden_lift,
            } => {
                *air_time += dt;

                if legs.is_crouch_changing() {
                    *has_overridden_lift = true;
                    self.pelvis_mass_scale = 1.0;
                }

                if inputs.vertical_velocity < consts::FALL_VELOCITY_THRESHOLD
                    && !*is_falling
                    && *air_time > consts::MIN_AIR_TIME
                {
                    *is_falling = true;
                }

                if *air_time > consts::MIN_AIR_TIME && inputs.grounded {
                    return Some(GaitState::Recover);
                }

                if !*has_overridden_lift {
                    let sign = if *is_falling { -1.0 } else { 1.0 };
                    let mut crouch_rate = legs.standing_leg_height * sign * consts::LEG_RISE_SPEED;
                    if *is_falling {
                        crouch_rate *= 0.5;
                    }
                    legs.target_leg_height -= crouch_rate * dt;
                    legs.clamp_airborne();
                }
                None
            }

            GaitState::Fall => {
                if legs.is_crouch_changing() {
                    // Hand height control back to the player
                    return Some(GaitState::Stand);
                }
                if inputs.grounded {
                    return Some(GaitState::Recover);
                }

                let crouch_rate = legs.standing_leg_height * consts::LEG_FALL_SPEED;
                legs.target_leg_height += crouch_rate * dt;
                legs.clamp_airborne();
                None
            }

            GaitState::Recover => {
                if !inputs.grounded {
                    return Some(GaitState::Fly {
                        air_time: 0.0,
                        is_falling: false,
                        has_overridden_lift: false,
                    });
                }

                legs.target_leg_height += legs.crouch_speed * legs.full_height() * dt;

                if legs.target_leg_height > legs.standing_leg_height || legs.is_crouch_changing() {
                    return Some(GaitState::Stand);
                }
                None
            }
        }
    }

    fn change_state(&mut self, next: GaitState, legs: &mut LegHeightController) {
        // Exit: no transition path may leak pelvis stiffening
        self.pelvis_mass_scale = 1.0;

        // Enter
        match next {
            GaitState::Stand | GaitState::Recover => {}
            GaitState::Push => {
                let depth = (legs.standing_leg_height - legs.target_leg_height).max(0.0);
                self.pending_jump_impulse = Some(self.jump_impulse_per_meter * depth);
                // The launch tick still runs stiffened; only leaving Push relaxes it
                self.pelvis_mass_scale = consts::AIRBORNE_MASS_SCALE;
            }
            GaitState::Compress
            | GaitState::Rise { .. }
            | GaitState::Fly { .. }
            | GaitState::Fall => {
                self.pelvis_mass_scale = consts::AIRBORNE_MASS_SCALE;
            }
        }

        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LegConfig;

    const DT: f32 = 1.0 / 90.0;

    fn machine() -> (GaitStateMachine, LegHeightController) {
        (
            GaitStateMachine::new(&JumpConfig::default()),
            LegHeightController::new(&LegConfig::default()),
        )
    }

    fn inputs(grounded: bool, vy: f32) -> GaitInputs {
        GaitInputs {
            dt: DT,
            grounded,
            vertical_velocity: vy,
        }
    }

    fn tick_n(
        machine: &mut GaitStateMachine,
        legs: &mut LegHeightController,
        n: usize,
        grounded: bool,
        vy: f32,
    ) {
        for _ in 0..n {
            machine.fixed_tick(inputs(grounded, vy), legs);
        }
    }

    #[test]
    fn test_jump_sequence_compress_push_rise() {
        let (mut machine, mut legs) = machine();

        legs.set_crouch_input(-1.0);
        machine.fixed_tick(inputs(true, 0.0), &mut legs);
        assert_eq!(machine.state(), GaitStateId::Compress);
        assert!(machine.compressed_shift().is_some());
        assert_eq!(machine.pelvis_mass_scale(), consts::AIRBORNE_MASS_SCALE);

        // Wind up a little so the launch has depth
        legs.target_leg_height = legs.crouching_leg_height;

        legs.set_crouch_input(0.0);
        machine.fixed_tick(inputs(true, 0.0), &mut legs);
        assert_eq!(machine.state(), GaitStateId::Push);
        // The launch tick itself must still run with the stiffened pelvis
        assert_eq!(machine.pelvis_mass_scale(), consts::AIRBORNE_MASS_SCALE);
        let impulse = machine.take_jump_impulse().unwrap();
        assert!(impulse > 0.0);
        assert!(machine.take_jump_impulse().is_none());

        machine.fixed_tick(inputs(true, 2.0), &mut legs);
        assert_eq!(machine.state(), GaitStateId::Rise);
    }

    #[test]
    fn test_rise_transitions_to_fall_on_downward_velocity() {
        let (mut machine, mut legs) = machine();

        legs.set_crouch_input(-1.0);
        machine.fixed_tick(inputs(true, 0.0), &mut legs);
        legs.set_crouch_input(0.0);
        machine.fixed_tick(inputs(true, 0.0), &mut legs);
        machine.fixed_tick(inputs(true, 2.0), &mut legs);
        assert_eq!(machine.state(), GaitStateId::Rise);

        // Still ascending before min air time
        machine.fixed_tick(inputs(false, 2.0), &mut legs);
        assert_eq!(machine.state(), GaitStateId::Rise);

        // Past min air time with downward velocity
        tick_n(&mut machine, &mut legs, 6, false, -0.5);
        assert_eq!(machine.state(), GaitStateId::Fall);
    }

    #[test]
    fn test_rise_times_out_into_fall() {
        let (mut machine, mut legs) = machine();

        legs.set_crouch_input(-1.0);
        machine.fixed_tick(inputs(true, 0.0), &mut legs);
        legs.set_crouch_input(0.0);
        machine.fixed_tick(inputs(true, 0.0), &mut legs);
        machine.fixed_tick(inputs(true, 2.0), &mut legs);

        // leg_rise_time = 3/8 s; hold upward velocity well past it
        tick_n(&mut machine, &mut legs, 60, false, 1.0);
        assert_eq!(machine.state(), GaitStateId::Fall);
    }

    #[test]
    fn test_fall_recovers_on_ground_contact() {
        let (mut machine, mut legs) = machine();

        machine.fixed_tick(inputs(false, 0.0), &mut legs);
        assert_eq!(machine.state(), GaitStateId::Fly);
        tick_n(&mut machine, &mut legs, 30, false, -2.0);

        machine.fixed_tick(inputs(true, 0.0), &mut legs);
        assert_eq!(machine.state(), GaitStateId::Recover);

        // Recover extends the legs back to standing and settles into Stand
        tick_n(&mut machine, &mut legs, 200, true, 0.0);
        assert_eq!(machine.state(), GaitStateId::Stand);
        assert!(
            legs.target_leg_height <= legs.standing_leg_height + legs.tiptoes_leg_height_gain
        );
    }

    #[test]
    fn test_mass_scale_never_leaks_into_stand() {
        let (mut machine, mut legs) = machine();

        // Walk the machine through every airborne path back to Stand
        machine.fixed_tick(inputs(false, 0.0), &mut legs); // Stand -> Fly
        assert_eq!(machine.pelvis_mass_scale(), consts::AIRBORNE_MASS_SCALE);
        tick_n(&mut machine, &mut legs, 30, false, -2.0); // falling
        tick_n(&mut machine, &mut legs, 300, true, 0.0); // Recover -> Stand
        assert_eq!(machine.state(), GaitStateId::Stand);
        assert_eq!(machine.pelvis_mass_scale(), 1.0);

        // Fall -> Stand via crouch input
        machine.fixed_tick(inputs(false, 0.0), &mut legs);
        tick_n(&mut machine, &mut legs, 30, false, -2.0);
        legs.set_crouch_input(-1.0);
        machine.fixed_tick(inputs(false, -2.0), &mut legs);
        if machine.state() == GaitStateId::Stand {
            assert_eq!(machine.pelvis_mass_scale(), 1.0);
        }
    }

    #[test]
    fn test_leg_height_bounded_through_flight() {
        let (mut machine, mut legs) = machine();
        let lower = legs.airborne_min_height().min(legs.crawling_leg_height);
        let upper = legs.standing_leg_height + legs.tiptoes_leg_height_gain;

        machine.fixed_tick(inputs(false, 0.0), &mut legs);
        for i in 0..400 {
            let vy = if i < 100 { 1.0 } else { -3.0 };
            machine.fixed_tick(inputs(false, vy), &mut legs);
            assert!(legs.target_leg_height >= lower - 1e-4);
            assert!(legs.target_leg_height <= upper + 1e-4);
        }
    }

    #[test]
    fn test_fly_crouch_input_cancels_auto_lift() {
        let (mut machine, mut legs) = machine();

        machine.fixed_tick(inputs(false, 1.0), &mut legs);
        assert_eq!(machine.state(), GaitStateId::Fly);

        legs.set_crouch_input(1.0);
        machine.fixed_tick(inputs(false, 1.0), &mut legs);
        assert_eq!(machine.pelvis_mass_scale(), 1.0);

        let height_before = legs.target_leg_height;
        machine.fixed_tick(inputs(false, 1.0), &mut legs);
        // Auto retraction is cancelled; the machine leaves the target alone
        assert_eq!(legs.target_leg_height, height_before);
    }
}
