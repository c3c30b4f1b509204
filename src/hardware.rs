//! Concrete I2C devices behind the sensor capability traits: a TSL2561
//! luminosity sensor driven over the raw bus and a BME280 climate sensor via
//! its vendor driver. Compiled only with the `hardware` feature; the rest of
//! the daemon only sees [`LightSensor`] and [`ClimateSensor`].

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use bme280::i2c::BME280;
use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;
use linux_embedded_hal::{Delay, I2cdev};

use crate::sensors::{ClimateSensor, LightSensor, SensorError};

// TSL2561 register map. Every access sets the command bit; word reads also
// set the word-protocol bit.
const TSL2561_CMD: u8 = 0x80;
const TSL2561_WORD: u8 = 0x20;
const TSL2561_REG_CONTROL: u8 = 0x00;
const TSL2561_REG_TIMING: u8 = 0x01;
const TSL2561_REG_DATA0: u8 = 0x0c;
const TSL2561_REG_DATA1: u8 = 0x0e;
const TSL2561_POWER_ON: u8 = 0x03;
// 16x gain, 402 ms integration. The lux formula below assumes exactly this
// configuration; changing it requires rescaling the channels.
const TSL2561_TIMING_16X_402MS: u8 = 0x12;

pub struct Tsl2561 {
    device: LinuxI2CDevice,
}

impl Tsl2561 {
    pub fn open(bus: &Path, addr: u16) -> Result<Self> {
        let mut device = LinuxI2CDevice::new(bus, addr)
            .with_context(|| format!("opening light sensor at {} addr {addr:#04x}", bus.display()))?;
        device
            .smbus_write_byte_data(TSL2561_CMD | TSL2561_REG_CONTROL, TSL2561_POWER_ON)
            .context("powering on light sensor")?;
        device
            .smbus_write_byte_data(TSL2561_CMD | TSL2561_REG_TIMING, TSL2561_TIMING_16X_402MS)
            .context("configuring light sensor gain")?;
        Ok(Self { device })
    }
}

impl LightSensor for Tsl2561 {
    fn read_lux(&mut self) -> Result<f64, SensorError> {
        let broadband = self
            .device
            .smbus_read_word_data(TSL2561_CMD | TSL2561_WORD | TSL2561_REG_DATA0)
            .map_err(|err| SensorError::Bus(err.to_string()))?;
        let ir = self
            .device
            .smbus_read_word_data(TSL2561_CMD | TSL2561_WORD | TSL2561_REG_DATA1)
            .map_err(|err| SensorError::Bus(err.to_string()))?;
        Ok(compute_lux(broadband, ir))
    }
}

/// Datasheet lux approximation for the T/FN/CL package at 16x gain and
/// 402 ms integration. The broadband channel counts visible plus infrared
/// light; the second channel counts infrared only.
pub fn compute_lux(broadband: u16, ir: u16) -> f64 {
    if broadband == 0 {
        return 0.0;
    }
    let ch0 = f64::from(broadband);
    let ch1 = f64::from(ir);
    let ratio = ch1 / ch0;

    if ratio <= 0.50 {
        0.0304 * ch0 - 0.062 * ch0 * ratio.powf(1.4)
    } else if ratio <= 0.61 {
        0.0224 * ch0 - 0.031 * ch1
    } else if ratio <= 0.80 {
        0.0128 * ch0 - 0.0153 * ch1
    } else if ratio <= 1.30 {
        0.001_46 * ch0 - 0.001_12 * ch1
    } else {
        0.0
    }
}

pub struct Bme280Sensor {
    device: BME280<I2cdev>,
    delay: Delay,
}

impl Bme280Sensor {
    pub fn open(bus: &Path, addr: u8) -> Result<Self> {
        let i2c = I2cdev::new(bus)
            .with_context(|| format!("opening climate sensor bus {}", bus.display()))?;
        let mut device = BME280::new(i2c, addr);
        let mut delay = Delay;
        device
            .init(&mut delay)
            .map_err(|err| anyhow!("initializing climate sensor at {addr:#04x}: {err:?}"))?;
        Ok(Self { device, delay })
    }
}

// Each metric performs its own measurement, matching the independent reads
// the cycle expects: a fault surfaces on the metric being sampled without
// poisoning the others.
impl ClimateSensor for Bme280Sensor {
    fn read_humidity(&mut self) -> Result<f64, SensorError> {
        let measurements = self
            .device
            .measure(&mut self.delay)
            .map_err(|err| SensorError::Device(format!("{err:?}")))?;
        Ok(f64::from(measurements.humidity))
    }

    fn read_temperature(&mut self) -> Result<f64, SensorError> {
        let measurements = self
            .device
            .measure(&mut self.delay)
            .map_err(|err| SensorError::Device(format!("{err:?}")))?;
        Ok(f64::from(measurements.temperature))
    }

    fn read_pressure(&mut self) -> Result<f64, SensorError> {
        let measurements = self
            .device
            .measure(&mut self.delay)
            .map_err(|err| SensorError::Device(format!("{err:?}")))?;
        Ok(f64::from(measurements.pressure))
    }
}
