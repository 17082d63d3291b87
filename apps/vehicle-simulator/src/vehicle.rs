//! Simulated actuators
//!
//! Mirrors what the embedded controller drives: PWM duty cycles for the
//! throttle, steering and brake channels, and digital outputs for gear,
//! lights, auto mode and horn.

use control_protocol::{ControlMessage, Decoded, Gear, SettingsBundle};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VehicleState {
    pub gear: Gear,
    pub lights: bool,
    pub auto_mode: bool,
    pub honk: bool,
    pub throttle_forward_duty: f64,
    pub throttle_backward_duty: f64,
    pub steering_right_duty: f64,
    pub steering_left_duty: f64,
    pub brake_duty: f64,
}

impl VehicleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one decoded record. Settings carried on an axis record take
    /// effect before the axis value.
    pub fn apply(&mut self, decoded: &Decoded) {
        if let Some(settings) = decoded.settings {
            self.apply_settings(settings);
        }

        match &decoded.message {
            ControlMessage::ThrottleForward(pct) => {
                self.throttle_forward_duty = self.throttle_duty(*pct);
                info!("Throttle forward {}% (gear {})", pct, self.gear);
            }
            ControlMessage::ThrottleBackward(pct) => {
                self.throttle_backward_duty = self.throttle_duty(*pct);
                info!("Throttle backward {}% (gear {})", pct, self.gear);
            }
            ControlMessage::SteeringRight(pct) => {
                self.steering_right_duty = f64::from(*pct);
                info!("Steering right {}%", pct);
            }
            ControlMessage::SteeringLeft(pct) => {
                self.steering_left_duty = f64::from(*pct);
                info!("Steering left {}%", pct);
            }
            ControlMessage::Brake(pct) => {
                self.brake_duty = f64::from(*pct);
                info!("Brake {}%", pct);
            }
            ControlMessage::Honk(on) => {
                self.honk = *on;
                info!("Honk {}", if *on { "on" } else { "off" });
            }
            ControlMessage::Settings(settings) => self.apply_settings(*settings),
            ControlMessage::Unrecognized { .. } => {}
        }
    }

    /// Everything that moves the vehicle goes to zero
    pub fn safe_state(&mut self) {
        self.throttle_forward_duty = 0.0;
        self.throttle_backward_duty = 0.0;
        self.steering_right_duty = 0.0;
        self.steering_left_duty = 0.0;
        self.brake_duty = 0.0;
        self.honk = false;
    }

    fn apply_settings(&mut self, settings: SettingsBundle) {
        if settings.gear != self.gear {
            info!("Gear {}", settings.gear);
        }
        self.gear = settings.gear;
        self.lights = settings.lights;
        self.auto_mode = settings.auto;
    }

    // Lower gears cap the motor duty
    fn throttle_duty(&self, pct: u8) -> f64 {
        f64::from(pct) * f64::from(self.gear.number()) / 3.0
    }
}
