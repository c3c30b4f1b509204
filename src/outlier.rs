//! Plausibility screen for raw readings. A reading outside the plausible
//! range is suppressed for the tick, logged as a warning by the caller; it
//! is not an error.

use crate::sensors::Metric;

/// Illuminance readings above this value (in lux, the sensor's native unit)
/// are treated as glitches and never published.
pub const LUX_CEILING: f64 = 10_000.0;

/// True when the raw reading is outside the plausible range for its metric.
/// Only illuminance has a defined range; every other metric passes.
pub fn exceeds_plausible_range(metric: Metric, raw: f64) -> bool {
    matches!(metric, Metric::Illuminance) && raw > LUX_CEILING
}
