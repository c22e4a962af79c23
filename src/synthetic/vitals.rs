use chrono::{DateTime, Utc};
use rand::{Rng, RngCore};

use super::bands::vital_bands;
use super::{Category, GeneratorState, Metric, SyntheticGenerator};
use crate::reading::{BloodPressure, Reading, ReadingFields};

/// Share of the blood pressure step that both components have in common.
const BP_CORRELATION: f64 = 0.6;

/// Patient vitals: heart rate, blood pressure, body temperature, SpO2.
#[derive(Clone, Copy, Debug, Default)]
pub struct VitalsGenerator;

impl SyntheticGenerator for VitalsGenerator {
    fn next_sample(
        &self,
        entity_id: &str,
        category: Category,
        previous: &GeneratorState,
        now: DateTime<Utc>,
        rng: &mut dyn RngCore,
    ) -> (Reading, GeneratorState) {
        let bands = vital_bands(category);
        let mut state = previous.clone();

        let heart_rate = bands.heart_rate.step(previous.previous(Metric::HeartRate), rng);

        // Systolic and diastolic share one shock so they drift together.
        let shared: f64 = rng.gen_range(-1.0..=1.0);
        let own_sys: f64 = rng.gen_range(-1.0..=1.0);
        let own_dia: f64 = rng.gen_range(-1.0..=1.0);
        let systolic = bands.systolic.step_by(
            previous.previous(Metric::Systolic),
            bands.systolic.variance * (BP_CORRELATION * shared + (1.0 - BP_CORRELATION) * own_sys),
            rng,
        );
        let diastolic = bands.diastolic.step_by(
            previous.previous(Metric::Diastolic),
            bands.diastolic.variance * (BP_CORRELATION * shared + (1.0 - BP_CORRELATION) * own_dia),
            rng,
        );

        let temperature = bands
            .temperature
            .step(previous.previous(Metric::BodyTemperature), rng);
        let oxygen = bands
            .oxygen_saturation
            .step(previous.previous(Metric::OxygenSaturation), rng);

        state.seed(Metric::HeartRate, heart_rate);
        state.seed(Metric::Systolic, systolic);
        state.seed(Metric::Diastolic, diastolic);
        state.seed(Metric::BodyTemperature, temperature);
        state.seed(Metric::OxygenSaturation, oxygen);
        state.samples += 1;

        let fields = ReadingFields {
            heart_rate: Some(heart_rate),
            blood_pressure: Some(BloodPressure::new(systolic as u32, diastolic as u32)),
            temperature: Some(temperature),
            oxygen_saturation: Some(oxygen),
            ..Default::default()
        };

        (Reading::synthetic(entity_id, fields, now), state)
    }
}
