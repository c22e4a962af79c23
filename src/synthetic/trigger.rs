use chrono::{DateTime, Duration, Utc};
use rand::{Rng, RngCore};

/// Timing parameters for a discrete trigger.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriggerSpec {
    /// Dwell between checks is drawn uniformly from this range, seconds
    pub dwell_secs: (i64, i64),

    /// Chance the trigger fires when a check comes due
    pub probability: f64,

    /// How long the trigger stays active once fired, seconds
    pub active_secs: i64,
}

/// Slow-changing latent state behind a boolean field.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Trigger {
    pub active_until: Option<DateTime<Utc>>,
    pub next_check: Option<DateTime<Utc>>,
    pub last_triggered: Option<DateTime<Utc>>,
}

impl Trigger {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.active_until.is_some_and(|until| now < until)
    }

    /// Advance the trigger to `now`, returning whether it is active and the
    /// updated trigger.
    pub fn advance(
        &self,
        spec: &TriggerSpec,
        now: DateTime<Utc>,
        rng: &mut dyn RngCore,
    ) -> (bool, Trigger) {
        let mut next = self.clone();

        if next.is_active(now) {
            return (true, next);
        }
        next.active_until = None;

        let due = match next.next_check {
            Some(check) => now >= check,
            None => {
                next.next_check = Some(now + dwell(spec, rng));
                false
            }
        };

        if due {
            if rng.gen_bool(spec.probability.clamp(0.0, 1.0)) {
                let until = now + Duration::seconds(spec.active_secs);
                next.active_until = Some(until);
                next.last_triggered = Some(now);
                next.next_check = Some(until + dwell(spec, rng));
                return (true, next);
            }
            next.next_check = Some(now + dwell(spec, rng));
        }

        (false, next)
    }
}

fn dwell(spec: &TriggerSpec, rng: &mut dyn RngCore) -> Duration {
    let (lo, hi) = spec.dwell_secs;
    Duration::seconds(rng.gen_range(lo.min(hi)..=hi.max(lo)))
}
