//! CPU temperature providers

use super::{max_or_zero, CommandRunner, TemperatureProvider};
use crate::errors::{PwmFanError, Result};
use log::{debug, trace};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Reads every `thermal_zone*/temp` file under a thermal class directory
#[derive(Debug, Clone)]
pub struct ThermalZoneSensor {
    root: PathBuf,
}

impl ThermalZoneSensor {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn zone_files(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Thermal root {} not present", self.root.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(PwmFanError::io(&self.root, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PwmFanError::io(&self.root, e))?;
            let is_zone = entry
                .file_name()
                .to_str()
                .map_or(false, |name| name.starts_with("thermal_zone"));
            let temp = entry.path().join("temp");
            if is_zone && temp.is_file() {
                files.push(temp);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl TemperatureProvider for ThermalZoneSensor {
    fn name(&self) -> &str {
        "thermal-zones"
    }

    fn read_max(&self) -> Result<i32> {
        let mut readings = Vec::new();
        for path in self.zone_files()? {
            let content = fs::read_to_string(&path).map_err(|e| PwmFanError::io(&path, e))?;
            let millidegrees: i64 = content
                .trim()
                .parse()
                .map_err(|_| PwmFanError::parse(path.display(), &content))?;
            trace!("{}: {} m°C", path.display(), millidegrees);
            readings.push((millidegrees / 1000) as i32);
        }
        Ok(max_or_zero(&readings))
    }
}

/// Queries lm-sensors (`sensors -j -u <chip>`) for each configured chip
#[derive(Debug, Clone)]
pub struct LmSensorsSensor<R> {
    chips: Vec<String>,
    runner: R,
}

impl<R: CommandRunner> LmSensorsSensor<R> {
    pub fn new(chips: Vec<String>, runner: R) -> Self {
        Self { chips, runner }
    }

    fn read_chip(&self, chip: &str, readings: &mut Vec<i32>) -> Result<()> {
        let output = self.runner.run("sensors", &["-j", "-u", chip])?;
        let document: Value = serde_json::from_str(&output)?;
        let features = document
            .get(chip)
            .and_then(Value::as_object)
            .ok_or_else(|| PwmFanError::SensorUnavailable(chip.to_string()))?;

        for (key, value) in features {
            let Some(index) = temp_feature_index(key) else {
                continue;
            };
            let input = value
                .get(format!("temp{}_input", index))
                .and_then(Value::as_f64);
            // An input of exactly 0.0 means the channel reports nothing
            if let Some(celsius) = input.filter(|&c| c != 0.0) {
                trace!("{} {}: {} °C", chip, key, celsius);
                readings.push(celsius.round_ties_even() as i32);
            }
        }
        Ok(())
    }
}

impl<R: CommandRunner> TemperatureProvider for LmSensorsSensor<R> {
    fn name(&self) -> &str {
        "lm-sensors"
    }

    fn read_max(&self) -> Result<i32> {
        let mut readings = Vec::new();
        for chip in &self.chips {
            self.read_chip(chip, &mut readings)?;
        }
        Ok(max_or_zero(&readings))
    }
}

/// `temp3` -> `Some("3")`; anything else -> `None`
fn temp_feature_index(key: &str) -> Option<&str> {
    let index = key.strip_prefix("temp")?;
    (!index.is_empty() && index.bytes().all(|b| b.is_ascii_digit())).then_some(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::tests::FakeRunner;

    fn write_zone(root: &Path, zone: &str, value: &str) {
        let dir = root.join(zone);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("temp"), value).unwrap();
    }

    #[test]
    fn test_thermal_zones_max() {
        let root = tempfile::tempdir().unwrap();
        write_zone(root.path(), "thermal_zone0", "45999\n");
        write_zone(root.path(), "thermal_zone1", "52100\n");
        // Not a thermal zone
        write_zone(root.path(), "cooling_device0", "99000\n");

        let sensor = ThermalZoneSensor::new(root.path());
        assert_eq!(sensor.read_max().unwrap(), 52);
    }

    #[test]
    fn test_thermal_zones_truncate() {
        let root = tempfile::tempdir().unwrap();
        write_zone(root.path(), "thermal_zone0", "47999\n");
        assert_eq!(ThermalZoneSensor::new(root.path()).read_max().unwrap(), 47);
    }

    #[test]
    fn test_thermal_zones_absent() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(ThermalZoneSensor::new(root.path()).read_max().unwrap(), 0);
        let missing = root.path().join("nothing");
        assert_eq!(ThermalZoneSensor::new(&missing).read_max().unwrap(), 0);
    }

    #[test]
    fn test_thermal_zone_garbage_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        write_zone(root.path(), "thermal_zone0", "hot\n");
        let result = ThermalZoneSensor::new(root.path()).read_max();
        assert!(matches!(result, Err(PwmFanError::Parse { .. })));
    }

    const CPU_JSON: &str = r#"{
        "cpu_thermal-virtual-0": {
            "Adapter": "Virtual device",
            "temp1": {"temp1_input": 48.312, "temp1_crit": 115.0}
        }
    }"#;

    const GPU_JSON: &str = r#"{
        "gpu_thermal-virtual-0": {
            "Adapter": "Virtual device",
            "temp1": {"temp1_input": 50.5},
            "temp2": {"temp2_crit": 100.0}
        }
    }"#;

    #[test]
    fn test_lm_sensors_max_across_chips() {
        let runner = FakeRunner::default()
            .with("sensors -j -u cpu_thermal-virtual-0", CPU_JSON)
            .with("sensors -j -u gpu_thermal-virtual-0", GPU_JSON);
        let sensor = LmSensorsSensor::new(
            vec![
                "cpu_thermal-virtual-0".to_string(),
                "gpu_thermal-virtual-0".to_string(),
            ],
            runner,
        );
        assert_eq!(sensor.read_max().unwrap(), 50);
        assert_eq!(sensor.runner.calls.borrow().len(), 2);
    }

    #[test]
    fn test_lm_sensors_rounds_half_to_even() {
        let chip = "soc_thermal";
        for (input, expected) in [(54.5, 54), (55.5, 56), (54.6, 55), (2.5, 2)] {
            let json = format!(r#"{{"{}": {{"temp1": {{"temp1_input": {}}}}}}}"#, chip, input);
            let runner = FakeRunner::default().with("sensors -j -u soc_thermal", &json);
            let sensor = LmSensorsSensor::new(vec![chip.to_string()], runner);
            assert_eq!(sensor.read_max().unwrap(), expected, "input {}", input);
        }
    }

    #[test]
    fn test_lm_sensors_skips_zero_input() {
        let runner = FakeRunner::default().with(
            "sensors -j -u soc_thermal",
            r#"{"soc_thermal": {"temp1": {"temp1_input": 0.0}, "temp2": {"temp2_input": -5.0}}}"#,
        );
        let sensor = LmSensorsSensor::new(vec!["soc_thermal".to_string()], runner);
        // Only the -5 °C channel counts
        assert_eq!(sensor.read_max().unwrap(), -5);
    }

    #[test]
    fn test_lm_sensors_no_chips() {
        let sensor = LmSensorsSensor::new(Vec::new(), FakeRunner::default());
        assert_eq!(sensor.read_max().unwrap(), 0);
    }

    #[test]
    fn test_lm_sensors_missing_chip_is_fatal() {
        let runner = FakeRunner::default().with("sensors -j -u soc_thermal", CPU_JSON);
        let sensor = LmSensorsSensor::new(vec!["soc_thermal".to_string()], runner);
        assert!(matches!(
            sensor.read_max(),
            Err(PwmFanError::SensorUnavailable(chip)) if chip == "soc_thermal"
        ));
    }

    #[test]
    fn test_lm_sensors_tool_missing() {
        let sensor = LmSensorsSensor::new(vec!["cpu".to_string()], FakeRunner::default());
        assert!(matches!(
            sensor.read_max(),
            Err(PwmFanError::CommandNotFound { .. })
        ));
    }

    #[test]
    fn test_temp_feature_index() {
        assert_eq!(temp_feature_index("temp1"), Some("1"));
        assert_eq!(temp_feature_index("temp12"), Some("12"));
        assert_eq!(temp_feature_index("temp"), None);
        assert_eq!(temp_feature_index("temp1_input"), None);
        assert_eq!(temp_feature_index("fan1"), None);
    }
}
