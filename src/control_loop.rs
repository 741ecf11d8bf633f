//! The fan control loop
//!
//! Each iteration reads the duty the kernel currently holds, samples both
//! temperature providers, asks the [`FanCurve`] for a target and writes it
//! when it differs. Between iterations the loop sleeps for the configured
//! interval. This is the only place controller state changes.

use crate::config::Config;
use crate::errors::Result;
use crate::fan_curve::FanCurve;
use crate::pwm::{frequency_khz, Polarity, PwmChannel};
use crate::sensors::TemperatureProvider;
use log::{debug, info};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// What one iteration observed and did
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub cpu_temp: i32,
    pub disk_temp: i32,
    pub duty_ns: u32,
    pub duty_percent: f64,
    pub frequency_khz: f64,
    pub polarity: Polarity,
    /// Whether this iteration wrote a new duty
    pub changed: bool,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CPU: {} °C, Disk: {} °C, Fan Speed: {:.0} %, {:.0} kHz, Polarity: {}",
            self.cpu_temp, self.disk_temp, self.duty_percent, self.frequency_khz, self.polarity
        )
    }
}

/// Receives one record per control iteration
pub trait DiagnosticSink {
    fn emit(&mut self, record: &Diagnostic);
}

/// Sends records to the `log` facade: changes at info, steady state at debug
#[derive(Debug, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn emit(&mut self, record: &Diagnostic) {
        if record.changed {
            info!("{}", record);
        } else {
            debug!("{}", record);
        }
    }
}

pub struct ControlLoop<S> {
    pwm: PwmChannel,
    curve: FanCurve,
    cpu: Box<dyn TemperatureProvider>,
    disk: Box<dyn TemperatureProvider>,
    sink: S,
    interval: Duration,
    current_duty_ns: u32,
}

impl<S: DiagnosticSink> ControlLoop<S> {
    pub fn new(
        config: &Config,
        pwm: PwmChannel,
        cpu: Box<dyn TemperatureProvider>,
        disk: Box<dyn TemperatureProvider>,
        sink: S,
    ) -> Self {
        Self {
            pwm,
            curve: FanCurve::new(config.steps.clone(), config.pwm_period_ns),
            cpu,
            disk,
            sink,
            interval: config.check_interval,
            current_duty_ns: 0,
        }
    }

    /// Export and configure the PWM channel, starting at step 0
    pub fn start(&mut self) -> Result<()> {
        let initial = self.curve.initial_duty();
        self.pwm.initialize(self.curve.period_ns(), initial)?;
        self.current_duty_ns = initial;
        info!(
            "Fan control started: {} steps, {} ns period, CPU via {}, disk via {}, every {:?}",
            self.curve.steps().len(),
            self.curve.period_ns(),
            self.cpu.name(),
            self.disk.name(),
            self.interval
        );
        Ok(())
    }

    /// Run one sampling iteration
    pub fn tick(&mut self) -> Result<Diagnostic> {
        // The kernel value is authoritative, not the last one written
        self.current_duty_ns = self.pwm.get_duty_cycle()?;

        let cpu_temp = self.cpu.read_max()?;
        let disk_temp = self.disk.read_max()?;
        let target = self.curve.decide(cpu_temp, disk_temp, self.current_duty_ns);

        let changed = target != self.current_duty_ns;
        if changed {
            self.pwm.set_duty_cycle(target)?;
            self.current_duty_ns = target;
        }

        let record = Diagnostic {
            cpu_temp,
            disk_temp,
            duty_ns: target,
            duty_percent: self.curve.duty_percent(target),
            frequency_khz: frequency_khz(self.pwm.get_period()?),
            polarity: self.pwm.get_polarity()?,
            changed,
        };
        self.sink.emit(&record);
        Ok(record)
    }

    /// Iterate until `shutdown` resolves or an iteration fails. The fan is
    /// left at its last duty either way.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            self.tick()?;
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Stopping fan control, duty stays at {} ns", self.current_duty_ns);
                    return Ok(());
                }
                _ = sleep(self.interval) => {}
            }
        }
    }

    pub fn current_duty_ns(&self) -> u32 {
        self.current_duty_ns
    }

    pub fn curve(&self) -> &FanCurve {
        &self.curve
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FanStep;
    use crate::errors::PwmFanError;
    use crate::pwm::tests::fake_chip;
    use std::cell::Cell;
    use std::fs;
    use std::rc::Rc;

    /// Provider whose reading the test can change between iterations
    struct Fixed {
        value: Rc<Cell<i32>>,
    }

    impl TemperatureProvider for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn read_max(&self) -> Result<i32> {
            Ok(self.value.get())
        }
    }

    struct Broken;

    impl TemperatureProvider for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn read_max(&self) -> Result<i32> {
            Err(PwmFanError::SensorUnavailable("/dev/sdz".to_string()))
        }
    }

    #[derive(Default)]
    struct Recorder(Vec<Diagnostic>);

    impl DiagnosticSink for Recorder {
        fn emit(&mut self, record: &Diagnostic) {
            self.0.push(record.clone());
        }
    }

    fn config() -> Config {
        Config {
            steps: vec![
                FanStep::new(70, 55, 100),
                FanStep::new(55, 45, 50),
                FanStep::new(40, 35, 25),
            ],
            ..Config::default()
        }
    }

    struct Rig {
        chip: tempfile::TempDir,
        cpu: Rc<Cell<i32>>,
        disk: Rc<Cell<i32>>,
        control: ControlLoop<Recorder>,
    }

    fn rig() -> Rig {
        let chip = fake_chip();
        let cpu = Rc::new(Cell::new(30));
        let disk = Rc::new(Cell::new(30));
        let mut control = ControlLoop::new(
            &config(),
            PwmChannel::new(chip.path(), 0),
            Box::new(Fixed { value: cpu.clone() }),
            Box::new(Fixed { value: disk.clone() }),
            Recorder::default(),
        );
        control.start().unwrap();
        Rig {
            chip,
            cpu,
            disk,
            control,
        }
    }

    fn kernel_duty(rig: &Rig) -> u32 {
        fs::read_to_string(rig.chip.path().join("pwm0/duty_cycle"))
            .unwrap()
            .trim()
            .parse()
            .unwrap()
    }

    #[test]
    fn test_start_uses_step_zero() {
        let rig = rig();
        assert_eq!(kernel_duty(&rig), 40_000);
        assert_eq!(rig.control.current_duty_ns(), 40_000);
    }

    #[test]
    fn test_cool_down_then_heat_up() {
        let mut rig = rig();

        // 30 °C everywhere: nothing matches, fan stops
        let record = rig.control.tick().unwrap();
        assert_eq!(record.duty_ns, 0);
        assert!(record.changed);
        assert_eq!(kernel_duty(&rig), 0);

        // Stopped fan at 60 °C gets a full speed start pulse
        rig.cpu.set(60);
        let record = rig.control.tick().unwrap();
        assert_eq!(record.duty_ns, 40_000);
        assert_eq!(record.duty_percent, 100.0);

        // Then settles on the matching tier
        let record = rig.control.tick().unwrap();
        assert_eq!(record.duty_ns, 20_000);
        assert_eq!(kernel_duty(&rig), 20_000);

        // Unchanged input, unchanged output
        let record = rig.control.tick().unwrap();
        assert_eq!(record.duty_ns, 20_000);
        assert!(!record.changed);

        // Disk heat alone raises the fan to full speed
        rig.disk.set(56);
        assert_eq!(rig.control.tick().unwrap().duty_ns, 40_000);

        assert_eq!(rig.control.sink().0.len(), 5);
    }

    #[test]
    fn test_reads_duty_from_kernel() {
        let mut rig = rig();
        rig.cpu.set(54);
        // Someone else moved the channel to the 50% tier; hysteresis keeps it
        fs::write(rig.chip.path().join("pwm0/duty_cycle"), "20000\n").unwrap();
        let record = rig.control.tick().unwrap();
        assert_eq!(record.duty_ns, 20_000);
        assert!(!record.changed);
    }

    #[test]
    fn test_diagnostic_contents() {
        let mut rig = rig();
        rig.cpu.set(45);
        let record = rig.control.tick().unwrap();
        assert_eq!(record.cpu_temp, 45);
        assert_eq!(record.disk_temp, 30);
        assert_eq!(record.duty_ns, 10_000);
        assert_eq!(record.duty_percent, 25.0);
        assert!((record.frequency_khz - 25.0).abs() < 1e-9);
        assert_eq!(record.polarity, Polarity::Normal);
        assert_eq!(
            record.to_string(),
            "CPU: 45 °C, Disk: 30 °C, Fan Speed: 25 %, 25 kHz, Polarity: normal"
        );
    }

    #[test]
    fn test_sensor_failure_stops_iteration() {
        let chip = fake_chip();
        let mut control = ControlLoop::new(
            &config(),
            PwmChannel::new(chip.path(), 0),
            Box::new(Fixed {
                value: Rc::new(Cell::new(80)),
            }),
            Box::new(Broken),
            Recorder::default(),
        );
        control.start().unwrap();
        assert!(matches!(
            control.tick(),
            Err(PwmFanError::SensorUnavailable(_))
        ));
        // Duty untouched and nothing reported
        assert_eq!(control.current_duty_ns(), 40_000);
        assert!(control.sink().0.is_empty());
    }

    #[test]
    fn test_malformed_duty_is_fatal() {
        let mut rig = rig();
        fs::write(rig.chip.path().join("pwm0/duty_cycle"), "???\n").unwrap();
        assert!(matches!(rig.control.tick(), Err(PwmFanError::Parse { .. })));
    }

    #[test]
    fn test_empty_curve_keeps_fan_off() {
        let chip = fake_chip();
        let hot = Rc::new(Cell::new(95));
        let mut control = ControlLoop::new(
            &Config::default(),
            PwmChannel::new(chip.path(), 0),
            Box::new(Fixed { value: hot.clone() }),
            Box::new(Fixed { value: hot }),
            Recorder::default(),
        );
        control.start().unwrap();
        assert_eq!(control.tick().unwrap().duty_ns, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let mut rig = rig();
        rig.control.run(std::future::ready(())).await.unwrap();
        // One iteration ran before the shutdown was seen
        assert_eq!(rig.control.sink().0.len(), 1);
        assert_eq!(kernel_duty(&rig), 0);
    }

    #[tokio::test]
    async fn test_run_propagates_failure() {
        let mut rig = rig();
        fs::write(rig.chip.path().join("pwm0/period"), "bogus\n").unwrap();
        let result = rig.control.run(std::future::pending::<()>()).await;
        assert!(matches!(result, Err(PwmFanError::Parse { .. })));
    }
}
