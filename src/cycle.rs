//! One sampling-and-publish cycle: acquire each configured metric in fixed
//! order, screen and convert the readings, assemble the tick's batch and
//! hand it to the sink in a single write.
//!
//! Recoverable failures are logged and consumed here; only failures the
//! configured policy classifies as fatal escape as a [`TickError`], and the
//! decision to exit belongs to the top-level handler.

use thiserror::Error;

use crate::config::FailurePolicy;
use crate::outlier;
use crate::point::{Batch, PointBuilder};
use crate::sensors::{Metric, SensorError, SensorSet};
use crate::sink::{MetricsSink, SinkError};
use crate::units;

#[derive(Debug, Error)]
pub enum TickError {
    #[error("{metric} read failed: {source}")]
    FatalRead {
        metric: Metric,
        #[source]
        source: SensorError,
    },
    #[error("publish failed: {source}")]
    FatalPublish {
        #[source]
        source: SinkError,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct TickReport {
    pub published: usize,
}

pub struct SampleCycle<S> {
    sensors: SensorSet,
    builder: PointBuilder,
    sink: S,
    policy: FailurePolicy,
}

impl<S: MetricsSink> SampleCycle<S> {
    pub fn new(sensors: SensorSet, builder: PointBuilder, sink: S, policy: FailurePolicy) -> Self {
        Self {
            sensors,
            builder,
            sink,
            policy,
        }
    }

    /// Execute one tick. Returns how many points were published, or the
    /// first failure the policy promoted to fatal.
    pub async fn run_tick(&mut self) -> Result<TickReport, TickError> {
        let mut batch = Batch::new();

        for metric in Metric::CYCLE_ORDER {
            let Some(reading) = self.sensors.read(metric) else {
                continue;
            };

            let measurement = match reading {
                Ok(measurement) => measurement,
                Err(err) => {
                    tracing::error!(metric = %metric, error = %err, "sensor read failed");
                    if self.policy.is_fatal_for(metric) {
                        return Err(TickError::FatalRead {
                            metric,
                            source: err,
                        });
                    }
                    continue;
                }
            };

            if outlier::exceeds_plausible_range(metric, measurement.raw) {
                tracing::warn!(
                    metric = %metric,
                    raw = measurement.raw,
                    "ignoring implausible reading"
                );
                continue;
            }

            let value = match units::convert(&measurement) {
                Ok(value) => value,
                Err(err) => {
                    // The device handed back garbage; same treatment as a
                    // failed read.
                    tracing::error!(metric = %metric, error = %err, "unusable reading");
                    if self.policy.is_fatal_for(metric) {
                        return Err(TickError::FatalRead {
                            metric,
                            source: SensorError::Device(err.to_string()),
                        });
                    }
                    continue;
                }
            };

            match self.builder.build(metric.key(), value) {
                Ok(point) => {
                    tracing::info!(metric = %metric, value, "sampled");
                    batch.push(point);
                }
                Err(err) => {
                    tracing::error!(metric = %metric, error = %err, "dropping malformed point");
                }
            }
        }

        if batch.is_empty() {
            tracing::debug!("nothing to publish this tick");
            return Ok(TickReport { published: 0 });
        }

        let count = batch.len();
        if let Err(err) = self.sink.write(&batch).await {
            tracing::error!(error = %err, points = count, "publish failed");
            if self.policy.is_fatal_on_publish() {
                return Err(TickError::FatalPublish { source: err });
            }
            return Ok(TickReport { published: 0 });
        }

        Ok(TickReport { published: count })
    }
}
