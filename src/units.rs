//! Conversions from native sensor units to the publish units. All functions
//! are pure; a non-finite input is a value-level error, never a silent
//! default.

use crate::sensors::{Measurement, Metric};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("non-finite {metric} reading: {raw}")]
pub struct UnitError {
    metric: Metric,
    raw: f64,
}

/// Convert a raw measurement into its publish unit: lux stays lux, humidity
/// stays a 0-100 percent scalar, temperature stays Celsius, pressure goes
/// from pascal to hectopascal.
pub fn convert(measurement: &Measurement) -> Result<f64, UnitError> {
    let Measurement { metric, raw } = *measurement;
    if !raw.is_finite() {
        return Err(UnitError { metric, raw });
    }
    Ok(match metric {
        Metric::Illuminance | Metric::Humidity | Metric::Temperature => raw,
        Metric::Pressure => raw / 100.0,
    })
}
