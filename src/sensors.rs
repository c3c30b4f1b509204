use std::fmt;

use thiserror::Error;

/// The metrics this daemon knows how to sample. The wire key doubles as the
/// InfluxDB measurement name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Illuminance,
    Humidity,
    Temperature,
    Pressure,
}

impl Metric {
    /// Sampling order within a tick. Pressure goes last: on the combined
    /// climate device it shares the physical reading with humidity and
    /// temperature.
    pub const CYCLE_ORDER: [Metric; 4] = [
        Metric::Illuminance,
        Metric::Humidity,
        Metric::Temperature,
        Metric::Pressure,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Metric::Illuminance => "light",
            Metric::Humidity => "humidity",
            Metric::Temperature => "temperature",
            Metric::Pressure => "pressure",
        }
    }

    /// Whether the metric is served by the combined climate device, the
    /// primary sensor group under the fatal failure policy.
    pub fn is_climate(self) -> bool {
        !matches!(self, Metric::Illuminance)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One raw reading, in the sensor's native unit: lux, percent relative
/// humidity, degrees Celsius or pascal. Lives for a single tick.
#[derive(Debug, Clone, Copy)]
pub struct Measurement {
    pub metric: Metric,
    pub raw: f64,
}

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("i2c transfer failed: {0}")]
    Bus(String),
    #[error("device fault: {0}")]
    Device(String),
}

/// Luminosity sensor capability. Implementations return the computed lux
/// value for the current light level.
pub trait LightSensor {
    fn read_lux(&mut self) -> Result<f64, SensorError>;
}

/// Combined humidity/temperature/pressure device. Each metric is an
/// independent read so a fault on one does not mask the others.
pub trait ClimateSensor {
    /// Percent relative humidity, 0-100 scale.
    fn read_humidity(&mut self) -> Result<f64, SensorError>;
    /// Degrees Celsius.
    fn read_temperature(&mut self) -> Result<f64, SensorError>;
    /// Pascal.
    fn read_pressure(&mut self) -> Result<f64, SensorError>;
}

/// The configured sensor capabilities for this process. A capability that is
/// not configured is absent from the set: it is never read and never errors.
pub struct SensorSet {
    light: Option<Box<dyn LightSensor + Send>>,
    climate: Option<Box<dyn ClimateSensor + Send>>,
}

impl SensorSet {
    pub fn new(
        light: Option<Box<dyn LightSensor + Send>>,
        climate: Option<Box<dyn ClimateSensor + Send>>,
    ) -> Self {
        Self { light, climate }
    }

    /// Enabled metrics in sampling order.
    pub fn enabled(&self) -> Vec<Metric> {
        Metric::CYCLE_ORDER
            .into_iter()
            .filter(|metric| self.is_enabled(*metric))
            .collect()
    }

    pub fn is_enabled(&self, metric: Metric) -> bool {
        match metric {
            Metric::Illuminance => self.light.is_some(),
            _ => self.climate.is_some(),
        }
    }

    /// Acquire one metric. Returns `None` when the backing capability is not
    /// configured, so callers never see an error for a disabled sensor.
    pub fn read(&mut self, metric: Metric) -> Option<Result<Measurement, SensorError>> {
        let raw = match metric {
            Metric::Illuminance => self.light.as_mut()?.read_lux(),
            Metric::Humidity => self.climate.as_mut()?.read_humidity(),
            Metric::Temperature => self.climate.as_mut()?.read_temperature(),
            Metric::Pressure => self.climate.as_mut()?.read_pressure(),
        };
        Some(raw.map(|raw| Measurement { metric, raw }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLight(f64);

    impl LightSensor for FixedLight {
        fn read_lux(&mut self) -> Result<f64, SensorError> {
            Ok(self.0)
        }
    }

    #[test]
    fn absent_capability_reads_as_none() {
        let mut sensors = SensorSet::new(Some(Box::new(FixedLight(120.0))), None);
        assert!(sensors.read(Metric::Humidity).is_none());
        assert!(sensors.read(Metric::Pressure).is_none());

        let reading = sensors
            .read(Metric::Illuminance)
            .expect("light is configured")
            .expect("light read succeeds");
        assert_eq!(reading.metric, Metric::Illuminance);
        assert_eq!(reading.raw, 120.0);
    }

    #[test]
    fn enabled_set_follows_cycle_order() {
        let sensors = SensorSet::new(Some(Box::new(FixedLight(1.0))), None);
        assert_eq!(sensors.enabled(), vec![Metric::Illuminance]);

        let empty = SensorSet::new(None, None);
        assert!(empty.enabled().is_empty());
        assert!(!empty.is_enabled(Metric::Temperature));
    }
}
