//! Stepped fan curve with hysteresis
//!
//! Steps are scanned in table order and the first one whose CPU or disk
//! threshold is exceeded wins, so the order of the table is its priority.
//! A step the fan is already running at (or above) gets its thresholds
//! lowered by [`HYSTERESIS_C`] so the fan does not stop and go around a
//! threshold.

use crate::config::FanStep;

/// Threshold offset in °C while the fan runs at or above a step's duty
pub const HYSTERESIS_C: i32 = 2;

/// Duty in nanoseconds for each step: `period * percent / 100`
pub fn duty_table(steps: &[FanStep], period_ns: u32) -> Vec<u32> {
    steps
        .iter()
        .map(|step| (u64::from(period_ns) * u64::from(step.duty_percent) / 100) as u32)
        .collect()
}

/// Target duty in nanoseconds for the current temperatures.
///
/// A fan that is fully stopped and has to spin up is first given the duty
/// of step 0 so it receives a real start pulse. Nothing matching means 0.
pub fn decide(
    cpu_temp: i32,
    disk_temp: i32,
    previous_duty_ns: u32,
    steps: &[FanStep],
    duty_table: &[u32],
) -> u32 {
    for (step, &duty) in steps.iter().zip(duty_table) {
        let hysteresis = if previous_duty_ns >= duty { HYSTERESIS_C } else { 0 };

        if cpu_temp > step.cpu_threshold.saturating_sub(hysteresis)
            || disk_temp > step.disk_threshold.saturating_sub(hysteresis)
        {
            if previous_duty_ns == 0 && duty != 0 {
                return duty_table[0];
            }
            return duty;
        }
    }
    0
}

/// A step table bound to a PWM period
#[derive(Debug, Clone)]
pub struct FanCurve {
    steps: Vec<FanStep>,
    duty_table: Vec<u32>,
    period_ns: u32,
}

impl FanCurve {
    pub fn new(steps: Vec<FanStep>, period_ns: u32) -> Self {
        let duty_table = duty_table(&steps, period_ns);
        Self {
            steps,
            duty_table,
            period_ns,
        }
    }

    pub fn steps(&self) -> &[FanStep] {
        &self.steps
    }

    pub fn duty_table(&self) -> &[u32] {
        &self.duty_table
    }

    pub fn period_ns(&self) -> u32 {
        self.period_ns
    }

    /// Duty the channel is brought up with: step 0, or off for an empty table
    pub fn initial_duty(&self) -> u32 {
        self.duty_table.first().copied().unwrap_or(0)
    }

    pub fn decide(&self, cpu_temp: i32, disk_temp: i32, previous_duty_ns: u32) -> u32 {
        decide(
            cpu_temp,
            disk_temp,
            previous_duty_ns,
            &self.steps,
            &self.duty_table,
        )
    }

    /// Duty expressed as a percentage of the period
    pub fn duty_percent(&self, duty_ns: u32) -> f64 {
        if self.period_ns == 0 {
            return 0.0;
        }
        f64::from(duty_ns) * 100.0 / f64::from(self.period_ns)
    }
}
