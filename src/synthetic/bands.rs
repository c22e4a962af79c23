use rand::{Rng, RngCore};

use super::Category;

/// Display rounding applied after every step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precision {
    Whole,
    Tenths,
}

impl Precision {
    pub fn round(&self, value: f64) -> f64 {
        match self {
            Precision::Whole => value.round(),
            Precision::Tenths => (value * 10.0).round() / 10.0,
        }
    }
}

/// Target range and per-step variance for one numeric field.
///
/// `min`, `max` and `variance` are expressed in whole units (or tenths for
/// `Precision::Tenths`), so rounding a step never widens it past `variance`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Band {
    pub min: f64,
    pub max: f64,
    pub variance: f64,
    pub precision: Precision,
}

impl Band {
    pub const fn whole(min: f64, max: f64, variance: f64) -> Self {
        Self {
            min,
            max,
            variance,
            precision: Precision::Whole,
        }
    }

    pub const fn tenths(min: f64, max: f64, variance: f64) -> Self {
        Self {
            min,
            max,
            variance,
            precision: Precision::Tenths,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Bounded random walk: `clamp(previous + U(-variance, variance), min, max)`.
    /// Without a previous value the sample is drawn uniformly from the band.
    pub fn step(&self, previous: Option<f64>, rng: &mut dyn RngCore) -> f64 {
        let delta = rng.gen_range(-self.variance..=self.variance);
        self.step_by(previous, delta, rng)
    }

    /// Same as [`Band::step`] with a caller-chosen delta. The delta is
    /// clamped to `±variance`.
    pub fn step_by(&self, previous: Option<f64>, delta: f64, rng: &mut dyn RngCore) -> f64 {
        let raw = match previous {
            Some(prev) => prev + delta.clamp(-self.variance, self.variance),
            None => rng.gen_range(self.min..=self.max),
        };
        self.precision.round(raw).clamp(self.min, self.max)
    }
}

/// Clinical bands for one severity category.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VitalBands {
    pub heart_rate: Band,
    pub systolic: Band,
    pub diastolic: Band,
    pub temperature: Band,
    pub oxygen_saturation: Band,
}

const STABLE: VitalBands = VitalBands {
    heart_rate: Band::whole(60.0, 100.0, 3.0),
    systolic: Band::whole(110.0, 130.0, 3.0),
    diastolic: Band::whole(70.0, 85.0, 2.0),
    temperature: Band::tenths(36.5, 37.2, 0.1),
    oxygen_saturation: Band::whole(95.0, 100.0, 1.0),
};

const MODERATE: VitalBands = VitalBands {
    heart_rate: Band::whole(85.0, 110.0, 4.0),
    systolic: Band::whole(125.0, 145.0, 4.0),
    diastolic: Band::whole(80.0, 95.0, 3.0),
    temperature: Band::tenths(37.0, 38.2, 0.2),
    oxygen_saturation: Band::whole(91.0, 96.0, 1.0),
};

const CRITICAL: VitalBands = VitalBands {
    heart_rate: Band::whole(100.0, 130.0, 5.0),
    systolic: Band::whole(140.0, 180.0, 5.0),
    diastolic: Band::whole(90.0, 110.0, 4.0),
    temperature: Band::tenths(37.8, 39.8, 0.2),
    oxygen_saturation: Band::whole(85.0, 92.0, 1.0),
};

pub fn vital_bands(category: Category) -> &'static VitalBands {
    match category {
        Category::Stable => &STABLE,
        Category::Moderate => &MODERATE,
        Category::Critical => &CRITICAL,
    }
}

/// Room environment bands. Light is not listed: its band follows the
/// diurnal curve and is built per sample.
pub mod environment {
    use super::Band;

    pub const TEMPERATURE: Band = Band::tenths(20.0, 24.0, 0.2);
    pub const HUMIDITY: Band = Band::tenths(40.0, 60.0, 1.0);
    pub const DISTANCE_IN_BED: Band = Band::whole(30.0, 80.0, 5.0);
    pub const DISTANCE_OUT_OF_BED: Band = Band::whole(80.0, 250.0, 15.0);
    pub const BATTERY: Band = Band::tenths(5.0, 100.0, 0.2);

    /// Half-width of the light band around the diurnal target, lux
    pub const LIGHT_SPREAD: f64 = 40.0;
    pub const LIGHT_VARIANCE: f64 = 25.0;
    pub const LIGHT_NIGHT: f64 = 10.0;
    pub const LIGHT_PEAK: f64 = 500.0;
}
