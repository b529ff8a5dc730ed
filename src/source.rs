//! Reading sources
//!
//! The node pulls exactly one reading per tick from a [`ReadingSource`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::Range;
use telemetry_shared::Reading;

/// Produces one reading per tick
pub trait ReadingSource: Send {
    fn next_reading(&mut self) -> Reading;
}

/// Value ranges of the simulated sensor
pub mod ranges {
    use std::ops::Range;

    /// Degrees Celsius
    pub const TEMPERATURE: Range<f32> = 20.0..100.0;
    /// hPa
    pub const PRESSURE: Range<f32> = 950.0..1050.0;
    /// Relative humidity, percent
    pub const HUMIDITY: Range<f32> = 30.0..100.0;
}

/// Uniformly random readings within [`ranges`]
pub struct SimulatedSensor {
    id: i16,
    rng: StdRng,
}

impl SimulatedSensor {
    pub fn new(id: i16) -> Self {
        Self {
            id,
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible sequence, for tests and replays
    pub fn with_seed(id: i16, seed: u64) -> Self {
        Self {
            id,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn sample(&mut self, range: Range<f32>) -> f32 {
        self.rng.gen_range(range)
    }
}

impl ReadingSource for SimulatedSensor {
    fn next_reading(&mut self) -> Reading {
        let temperature = self.sample(ranges::TEMPERATURE);
        let pressure = self.sample(ranges::PRESSURE);
        let humidity = self.sample(ranges::HUMIDITY);
        Reading::now(self.id, temperature, pressure, humidity)
    }
}
