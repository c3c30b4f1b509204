//! Fixed-interval drive loop for the sampling cycle. Single-threaded, no
//! overlapping ticks; a tick that runs long delays the next one instead of
//! being caught up.

use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::cycle::{SampleCycle, TickError};
use crate::sink::MetricsSink;

/// Run the cycle once immediately and then on every interval boundary,
/// forever. Returns only when a tick reports a fatal error.
pub async fn run<S: MetricsSink>(interval: Duration, mut cycle: SampleCycle<S>) -> TickError {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match cycle.run_tick().await {
            Ok(report) => {
                tracing::debug!(published = report.published, "tick complete");
            }
            Err(err) => return err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FailurePolicy;
    use crate::point::{Batch, PointBuilder};
    use crate::sensors::{ClimateSensor, SensorError, SensorSet};
    use crate::sink::SinkError;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct SteadyClimate;

    impl ClimateSensor for SteadyClimate {
        fn read_humidity(&mut self) -> Result<f64, SensorError> {
            Ok(40.0)
        }

        fn read_temperature(&mut self) -> Result<f64, SensorError> {
            Ok(20.0)
        }

        fn read_pressure(&mut self) -> Result<f64, SensorError> {
            Ok(100_000.0)
        }
    }

    struct DeadClimate;

    impl ClimateSensor for DeadClimate {
        fn read_humidity(&mut self) -> Result<f64, SensorError> {
            Err(SensorError::Bus("bus gone".to_string()))
        }

        fn read_temperature(&mut self) -> Result<f64, SensorError> {
            Err(SensorError::Bus("bus gone".to_string()))
        }

        fn read_pressure(&mut self) -> Result<f64, SensorError> {
            Err(SensorError::Bus("bus gone".to_string()))
        }
    }

    #[derive(Clone, Default)]
    struct CountingSink {
        writes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MetricsSink for CountingSink {
        async fn write(&self, _batch: &Batch) -> Result<(), SinkError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn cycle_with(
        climate: Box<dyn ClimateSensor + Send>,
        sink: CountingSink,
        policy: FailurePolicy,
    ) -> SampleCycle<CountingSink> {
        let sensors = SensorSet::new(None, Some(climate));
        let builder = PointBuilder::new("testhost".to_string(), BTreeMap::new()).expect("builder");
        SampleCycle::new(sensors, builder, sink, policy)
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_fires_immediately_then_every_interval() {
        let sink = CountingSink::default();
        let writes = sink.writes.clone();
        let cycle = cycle_with(Box::new(SteadyClimate), sink, FailurePolicy::Tolerant);

        let handle = tokio::spawn(run(Duration::from_secs(10), cycle));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(writes.load(Ordering::SeqCst), 1, "immediate first tick");

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(writes.load(Ordering::SeqCst), 4, "one tick per boundary");

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn interval_boundaries_are_not_batched_up() {
        let sink = CountingSink::default();
        let writes = sink.writes.clone();
        let cycle = cycle_with(Box::new(SteadyClimate), sink, FailurePolicy::Tolerant);

        let handle = tokio::spawn(run(Duration::from_secs(60), cycle));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(writes.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(writes.load(Ordering::SeqCst), 2);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_tick_stops_the_loop() {
        let cycle = cycle_with(
            Box::new(DeadClimate),
            CountingSink::default(),
            FailurePolicy::FatalClimate,
        );

        let err = run(Duration::from_secs(10), cycle).await;
        assert!(matches!(err, TickError::FatalRead { .. }));
    }
}
