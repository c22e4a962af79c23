use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use rand::{Rng, RngCore};
use std::f64::consts::PI;

use super::bands::{environment as env, Band};
use super::{Category, GeneratorState, Metric, SyntheticGenerator, TriggerSpec};
use crate::reading::{Reading, ReadingFields};

pub const MOTION: TriggerSpec = TriggerSpec {
    dwell_secs: (20, 90),
    probability: 0.35,
    active_secs: 15,
};

pub const IN_BED: TriggerSpec = TriggerSpec {
    dwell_secs: (60, 300),
    probability: 0.5,
    active_secs: 600,
};

/// Room sensors: temperature, humidity, motion, occupancy, proximity
/// distance, light and battery.
///
/// Severity categories do not apply to rooms and are ignored.
#[derive(Clone, Copy, Debug)]
pub struct EnvironmentGenerator {
    /// Offset used to place `now` on the ward's local diurnal light curve
    pub utc_offset: FixedOffset,
}

impl Default for EnvironmentGenerator {
    fn default() -> Self {
        Self {
            utc_offset: Utc.fix(),
        }
    }
}

impl EnvironmentGenerator {
    pub fn with_offset_hours(hours: i32) -> Self {
        let utc_offset = FixedOffset::east_opt(hours.clamp(-23, 23) * 3600)
            .unwrap_or_else(|| Utc.fix());
        Self { utc_offset }
    }

    /// Light band for the local hour of `now`.
    pub fn light_band(&self, now: DateTime<Utc>) -> Band {
        let local = now.with_timezone(&self.utc_offset);
        let hour = local.hour() as f64 + local.minute() as f64 / 60.0;
        let target = diurnal_light(hour);
        Band::whole(
            (target - env::LIGHT_SPREAD).max(0.0).round(),
            (target + env::LIGHT_SPREAD).round(),
            env::LIGHT_VARIANCE,
        )
    }
}

/// Daylight between 06:00 and 22:00 following a half sine that peaks early
/// afternoon; a dim night level otherwise.
pub fn diurnal_light(hour: f64) -> f64 {
    if (6.0..22.0).contains(&hour) {
        env::LIGHT_NIGHT + (env::LIGHT_PEAK - env::LIGHT_NIGHT) * (PI * (hour - 6.0) / 16.0).sin()
    } else {
        env::LIGHT_NIGHT
    }
}

impl SyntheticGenerator for EnvironmentGenerator {
    fn next_sample(
        &self,
        entity_id: &str,
        _category: Category,
        previous: &GeneratorState,
        now: DateTime<Utc>,
        rng: &mut dyn RngCore,
    ) -> (Reading, GeneratorState) {
        let mut state = previous.clone();

        let (motion, motion_trigger) = previous.motion.advance(&MOTION, now, rng);
        let (in_bed, in_bed_trigger) = previous.in_bed.advance(&IN_BED, now, rng);
        state.motion = motion_trigger;
        state.in_bed = in_bed_trigger;

        // Motion biases the temperature walk upward for its window.
        let temp_band = env::TEMPERATURE;
        let temp_delta = if motion {
            rng.gen_range(-temp_band.variance / 2.0..=temp_band.variance)
        } else {
            rng.gen_range(-temp_band.variance..=temp_band.variance)
        };
        let temperature = temp_band.step_by(previous.previous(Metric::RoomTemperature), temp_delta, rng);

        let humidity = env::HUMIDITY.step(previous.previous(Metric::Humidity), rng);

        let distance_band = if in_bed {
            env::DISTANCE_IN_BED
        } else {
            env::DISTANCE_OUT_OF_BED
        };
        let distance = distance_band.step(previous.previous(Metric::Distance), rng);

        let light = self.light_band(now).step(previous.previous(Metric::Light), rng);

        let drain = rng.gen_range(0.0..=env::BATTERY.variance);
        let battery = env::BATTERY.step_by(previous.previous(Metric::Battery), -drain, rng);

        state.seed(Metric::RoomTemperature, temperature);
        state.seed(Metric::Humidity, humidity);
        state.seed(Metric::Distance, distance);
        state.seed(Metric::Light, light);
        state.seed(Metric::Battery, battery);
        state.samples += 1;

        let fields = ReadingFields {
            temperature: Some(temperature),
            humidity: Some(humidity),
            motion: Some(motion),
            distance: Some(distance),
            light_level: Some(light),
            battery: Some(battery),
            in_bed: Some(in_bed),
            ..Default::default()
        };

        (Reading::synthetic(entity_id, fields, now), state)
    }
}
