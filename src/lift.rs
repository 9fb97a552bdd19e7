// Single-axis lift with limit-switch interlock
//
// Direction commands run the motor at a fixed duty cycle and record the
// travel direction in the same call. `check_limits` must be polled once per
// control tick; it is the only over-travel protection in duty-cycle mode,
// so the carriage may overrun a switch by at most one tick of travel.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::LiftConstants;
use crate::error::Result;
use crate::motor::{ControlMode, LimitSwitch, Motor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelDirection {
    #[default]
    Idle,
    Extending,
    Retracting,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LiftTelemetry {
    pub direction: TravelDirection,
    pub top_limit: bool,
    pub bottom_limit: bool,
    pub position: f64,
}

pub struct LinearLift<M, L> {
    motor: M,
    top_limit: L,
    bottom_limit: L,
    direction: TravelDirection,
    duty_cycle: f64,
    pulley_ratio: f64,
}

impl<M: Motor, L: LimitSwitch> LinearLift<M, L> {
    pub fn new(mut motor: M, top_limit: L, bottom_limit: L, constants: &LiftConstants) -> Result<Self> {
        motor.configure(&constants.motor)?;
        motor.set_encoder_position(0.0);
        info!(
            "Lift ready: duty {:.2}, pulley ratio {:.3}",
            constants.duty_cycle, constants.pulley_ratio
        );

        Ok(Self {
            motor,
            top_limit,
            bottom_limit,
            direction: TravelDirection::Idle,
            duty_cycle: constants.duty_cycle,
            pulley_ratio: constants.pulley_ratio,
        })
    }

    pub fn direction(&self) -> TravelDirection {
        self.direction
    }

    pub fn extend(&mut self) {
        debug!("Lift extending");
        self.motor.set_duty_cycle(self.duty_cycle);
        self.direction = TravelDirection::Extending;
    }

    pub fn retract(&mut self) {
        debug!("Lift retracting");
        self.motor.set_duty_cycle(-self.duty_cycle);
        self.direction = TravelDirection::Retracting;
    }

    pub fn stop(&mut self) {
        debug!("Lift stopped");
        self.motor.set_duty_cycle(0.0);
        self.direction = TravelDirection::Idle;
    }

    /// Closed-loop move to an absolute carriage position
    ///
    /// Leaves the travel direction untouched, so the interlock does not
    /// watch position-mode motion.
    pub fn go_to_position(&mut self, target: f64) {
        debug!("Lift to position {:.3}", target);
        self.motor
            .set_reference(ControlMode::Position, target / self.pulley_ratio, 0.0);
    }

    /// Stop if the switch ahead of the current travel is closed
    pub fn check_limits(&mut self) {
        let hit = match self.direction {
            TravelDirection::Extending => self.top_limit.is_triggered(),
            TravelDirection::Retracting => self.bottom_limit.is_triggered(),
            TravelDirection::Idle => false,
        };
        if hit {
            info!("Lift limit reached while {:?}, stopping", self.direction);
            self.stop();
        }
    }

    /// Motor encoder position
    pub fn position(&self) -> f64 {
        self.motor.encoder().position
    }

    pub fn telemetry(&self) -> LiftTelemetry {
        LiftTelemetry {
            direction: self.direction,
            top_limit: self.top_limit.is_triggered(),
            bottom_limit: self.bottom_limit.is_triggered(),
            position: self.position(),
        }
    }
}
