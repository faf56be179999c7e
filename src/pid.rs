use tokio::time::Instant;
use tracing::info;

use crate::fan_curve::FanCurve;

// Proportional, integral and derivative gains
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

// Temperature and fan speed limits the controller works within
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub desired_temp: i32,
    pub max_temp: i32,
    pub hysteresis: i32,
    pub min_fan_percent: u8,
    pub max_fan_percent: u8,
}

impl Thresholds {
    // Temperature at or below which direct control is taken back
    pub fn hysteresis_temp(&self) -> i32 {
        self.max_temp - self.hysteresis
    }
}

// Memory carried from one step to the next
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PidState {
    // Accumulated error multiplied by the elapsed seconds
    pub integral_error: f64,
    pub previous_error: f64,

    // None until the first step has run
    pub last_run_time: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,
    state: PidState,
}

impl PidController {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            state: PidState::default(),
        }
    }

    pub fn state(&self) -> &PidState {
        &self.state
    }

    // Forget the accumulated error and the time of the last step
    pub fn reset(&mut self) {
        self.state = PidState::default();
    }

    // Run one control step and return the fan speed percentage
    // to command. The correction is applied on top of the current
    // fan speed, read back through the calibration curve
    pub fn step(
        &mut self,
        now: Instant,
        current_temp: i32,
        current_fan_rpm: u32,
        curve: &impl FanCurve,
        thresholds: &Thresholds,
    ) -> u8 {
        // The first step has no history to integrate or differentiate
        let dt = match self.state.last_run_time {
            Some(last) => now.saturating_duration_since(last).as_secs_f64(),
            None => 0.,
        };
        self.state.last_run_time = Some(now);

        let current_percent = curve.rpm_to_percent(current_fan_rpm);

        let error = (current_temp - thresholds.desired_temp) as f64;
        let mut integral_error = self.state.integral_error + error * dt;
        let derivative_error = if dt > 0. {
            (error - self.state.previous_error) / dt
        } else {
            0.
        };

        let output = current_percent
            + self.gains.kp * error
            + self.gains.ki * integral_error
            + self.gains.kd * derivative_error;

        let min = thresholds.min_fan_percent as f64;
        let max = thresholds.max_fan_percent as f64;

        // Anti-windup, a saturated output drops the accumulated terms
        let output = if output < min || output > max {
            integral_error = 0.;
            self.state.previous_error = 0.;

            output.clamp(min, max)
        } else {
            self.state.previous_error = error;

            output
        };
        self.state.integral_error = integral_error;

        info!(
            "temp is {current_temp}, dt is {dt:.1}, error is {error}, \
             derror is {derivative_error:.3} and ierror is {integral_error:.3}"
        );

        let output_percent = output.round() as u8;

        info!("new output fan speed is {output_percent}%");

        output_percent
    }
}
