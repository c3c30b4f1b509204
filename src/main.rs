mod config;
mod cycle;
#[cfg(feature = "hardware")]
mod hardware;
mod outlier;
mod point;
mod scheduler;
mod sensors;
mod sink;
mod units;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::cycle::SampleCycle;
use crate::point::PointBuilder;
use crate::sensors::SensorSet;
use crate::sink::InfluxSink;

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,ambient_sampler=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

/// Host identity attached to every point: the configured override, or the
/// machine hostname resolved once at startup.
fn resolve_host_tag(config: &Config) -> Result<String> {
    if let Some(host) = &config.host_tag {
        return Ok(host.clone());
    }
    sysinfo::System::host_name()
        .context("failed to resolve machine hostname; set AMBIENT_HOST_TAG")
}

#[cfg(feature = "hardware")]
fn build_sensors(config: &Config) -> Result<SensorSet> {
    use crate::sensors::{ClimateSensor, LightSensor};

    let light: Option<Box<dyn LightSensor + Send>> = if config.enable_light {
        Some(Box::new(hardware::Tsl2561::open(
            &config.i2c_bus,
            config.light_addr,
        )?))
    } else {
        None
    };

    let climate: Option<Box<dyn ClimateSensor + Send>> = if config.enable_climate {
        Some(Box::new(hardware::Bme280Sensor::open(
            &config.i2c_bus,
            config.climate_addr as u8,
        )?))
    } else {
        None
    };

    Ok(SensorSet::new(light, climate))
}

#[cfg(not(feature = "hardware"))]
fn build_sensors(config: &Config) -> Result<SensorSet> {
    if config.enable_light || config.enable_climate {
        anyhow::bail!(
            "built without the \"hardware\" feature; disable the sensors or rebuild with it"
        );
    }
    Ok(SensorSet::new(None, None))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing()?;

    let host = resolve_host_tag(&config)?;
    let builder = PointBuilder::new(host.clone(), config.extra_tags.clone())
        .context("invalid tag configuration")?;

    let sensors = build_sensors(&config)?;
    let sink = InfluxSink::new(
        &config.influx_url,
        &config.influx_database,
        config.influx_username.clone(),
        config.influx_password.clone(),
    )?;
    sink.ping()
        .await
        .with_context(|| format!("InfluxDB at {} is unreachable", config.influx_url))?;

    tracing::info!(
        host = %host,
        url = %config.influx_url,
        database = %config.influx_database,
        metrics = ?sensors.enabled(),
        interval_seconds = config.interval.as_secs(),
        policy = ?config.failure_policy,
        "ambient-sampler starting"
    );

    let cycle = SampleCycle::new(sensors, builder, sink, config.failure_policy);

    tokio::select! {
        err = scheduler::run(config.interval, cycle) => {
            Err(anyhow::Error::new(err).context("sampling aborted by fatal failure"))
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            Ok(())
        }
    }
}
