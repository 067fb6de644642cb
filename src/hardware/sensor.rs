//! Environmental and motion sensor sampling.

use chrono::Local;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Hardware;

/// One immutable snapshot of every sensor, produced per sampling tick.
/// The field layout is the wire schema of the sensor status topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub time: String,
    pub pressure: f64,
    pub temperature: Temperature,
    pub humidity: f64,
    pub gyroscope: Gyroscope,
    pub compass: Compass,
    pub acceleration: Acceleration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub from_humidity: f64,
    pub from_pressure: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gyroscope {
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compass {
    pub north: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acceleration {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone)]
pub struct SensorSettings {
    /// Decimal digits every value is rounded to.
    pub rounding: u32,
    /// Unit multiplier for raw accelerometer values (g to m/s² by default).
    pub acceleration_multiplier: f64,
    pub gyroscope_multiplier: f64,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            rounding: 4,
            acceleration_multiplier: 9.80665,
            gyroscope_multiplier: 1.0,
        }
    }
}

/// Emulated sensor array: plausible indoor baselines with a little
/// jitter per tick, pushed through the same rounding and unit
/// multipliers a physical HAT reading would get.
pub struct SensorArray {
    settings: SensorSettings,
    rng: StdRng,
    enabled: bool,
    samples_taken: u64,
}

impl SensorArray {
    pub fn new(settings: SensorSettings) -> Self {
        Self {
            settings,
            rng: StdRng::from_entropy(),
            enabled: true,
            samples_taken: 0,
        }
    }

    /// Number of snapshots produced since construction.
    pub fn samples_taken(&self) -> u64 {
        self.samples_taken
    }

    /// Reads every sensor once and returns the snapshot.
    pub fn sample(&mut self) -> Reading {
        self.samples_taken += 1;
        let digits = self.settings.rounding;
        let gyro = self.settings.gyroscope_multiplier;
        let accel = self.settings.acceleration_multiplier;
        let time = Local::now().format("%a %b %e %H:%M:%S %Y").to_string();
        let reading = Reading {
            time,
            pressure: round_to(1013.25 + self.jitter(0.8), digits),
            temperature: Temperature {
                from_humidity: round_to(24.0 + self.jitter(0.3), digits),
                from_pressure: round_to(23.6 + self.jitter(0.3), digits),
            },
            humidity: round_to(45.0 + self.jitter(2.0), digits),
            gyroscope: Gyroscope {
                pitch: round_to(self.jitter(0.05) * gyro, digits),
                roll: round_to(self.jitter(0.05) * gyro, digits),
                yaw: round_to(self.jitter(0.05) * gyro, digits),
            },
            compass: Compass {
                north: round_to(180.0 + self.jitter(1.5), digits),
            },
            acceleration: Acceleration {
                x: round_to(self.jitter(0.02) * accel, digits),
                y: round_to(self.jitter(0.02) * accel, digits),
                z: round_to((1.0 + self.jitter(0.02)) * accel, digits),
            },
        };
        debug!(?reading, "sampled sensors");
        reading
    }

    fn jitter(&mut self, scale: f64) -> f64 {
        self.rng.gen_range(-scale..=scale)
    }
}

fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

impl Hardware for SensorArray {
    fn enabled(&self) -> bool {
        self.enabled
    }

    // Sampling never changes hardware state, so there is nothing to
    // undo beyond marking the wrapper inactive.
    fn disable(&mut self) {
        self.enabled = false;
    }
}
