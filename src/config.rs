use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use url::Url;

use crate::sensors::Metric;

/// What a sensor read or publish failure does to the process.
///
/// `Tolerant` logs and skips; `FatalClimate` treats any failure of the
/// combined climate device (and any publish failure) as grounds to exit,
/// while illuminance failures stay recoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Tolerant,
    FatalClimate,
}

impl FailurePolicy {
    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "tolerant" => Ok(FailurePolicy::Tolerant),
            "fatal-climate" => Ok(FailurePolicy::FatalClimate),
            other => bail!(
                "unsupported AMBIENT_FAILURE_POLICY {other:?} (expected \"tolerant\" or \"fatal-climate\")"
            ),
        }
    }

    pub fn is_fatal_for(self, metric: Metric) -> bool {
        matches!(self, FailurePolicy::FatalClimate) && metric.is_climate()
    }

    pub fn is_fatal_on_publish(self) -> bool {
        matches!(self, FailurePolicy::FatalClimate)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub influx_url: Url,
    pub influx_database: String,
    pub influx_username: Option<String>,
    pub influx_password: Option<String>,

    pub i2c_bus: PathBuf,
    pub light_addr: u16,
    pub climate_addr: u16,
    pub enable_light: bool,
    pub enable_climate: bool,

    pub interval: Duration,
    pub failure_policy: FailurePolicy,
    pub host_tag: Option<String>,
    pub extra_tags: BTreeMap<String, String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let influx_url = Url::parse(&env_string(
            "AMBIENT_INFLUXDB_URL",
            Some("http://localhost:8086".to_string()),
        )?)
        .context("invalid AMBIENT_INFLUXDB_URL")?;

        let influx_database = env_optional("AMBIENT_INFLUXDB_DATABASE")
            .context("AMBIENT_INFLUXDB_DATABASE is required")?;
        let influx_username = env_optional("AMBIENT_INFLUXDB_USER");
        // Password comes from the environment only, never a flag.
        let influx_password = env_optional("INFLUXDB_PASSWORD");

        let i2c_bus = PathBuf::from(env_string(
            "AMBIENT_I2C_BUS",
            Some("/dev/i2c-1".to_string()),
        )?);
        let light_addr = parse_addr(&env_string("AMBIENT_LIGHT_ADDR", Some("0x39".to_string()))?)
            .context("invalid AMBIENT_LIGHT_ADDR")?;
        let climate_addr =
            parse_addr(&env_string("AMBIENT_CLIMATE_ADDR", Some("0x77".to_string()))?)
                .context("invalid AMBIENT_CLIMATE_ADDR")?;
        let enable_light = env_bool("AMBIENT_ENABLE_LIGHT", true);
        let enable_climate = env_bool("AMBIENT_ENABLE_CLIMATE", true);

        let interval_seconds = env_u64("AMBIENT_INTERVAL_SECONDS", Some(10))?;
        if interval_seconds == 0 {
            bail!("AMBIENT_INTERVAL_SECONDS must be at least 1");
        }

        let failure_policy = FailurePolicy::parse(&env_string(
            "AMBIENT_FAILURE_POLICY",
            Some("tolerant".to_string()),
        )?)?;

        let host_tag = env_optional("AMBIENT_HOST_TAG");
        let extra_tags =
            parse_tags(env_optional("AMBIENT_TAGS").as_deref()).context("invalid AMBIENT_TAGS")?;

        Ok(Self {
            influx_url,
            influx_database,
            influx_username,
            influx_password,
            i2c_bus,
            light_addr,
            climate_addr,
            enable_light,
            enable_climate,
            interval: Duration::from_secs(interval_seconds),
            failure_policy,
            host_tag,
            extra_tags,
        })
    }
}

fn env_string(key: &str, default: Option<String>) -> Result<String> {
    match env::var(key) {
        Ok(value) => Ok(value.trim().to_string()),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_u64(key: &str, default: Option<u64>) -> Result<u64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid {key}")),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 7-bit I2C device address, hex (`0x39`) or decimal.
fn parse_addr(raw: &str) -> Result<u16> {
    let addr = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => raw.parse::<u16>(),
    }
    .with_context(|| format!("not a device address: {raw:?}"))?;

    if !(0x03..=0x77).contains(&addr) {
        bail!("device address {addr:#04x} outside the 7-bit range 0x03..=0x77");
    }
    Ok(addr)
}

/// `key=value,key=value` list of extra static tags. The `host` key is
/// reserved for the resolved host identity.
fn parse_tags(raw: Option<&str>) -> Result<BTreeMap<String, String>> {
    let mut tags = BTreeMap::new();
    let Some(raw) = raw else {
        return Ok(tags);
    };

    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("tag entry {entry:?} is not key=value"))?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            bail!("tag entry {entry:?} has an empty key or value");
        }
        if key == "host" {
            bail!("the host tag is reserved; set AMBIENT_HOST_TAG instead");
        }
        tags.insert(key.to_string(), value.to_string());
    }
    Ok(tags)
}
