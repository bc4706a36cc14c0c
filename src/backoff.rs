use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::retry::RetryOptions;

/// How the base delay grows with the attempt index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// `min * 2^attempt`
    #[default]
    Exponential,
    /// `min * (attempt + 1)`
    Linear,
}

/// Source of uniform samples in `[0, 1)` used for jitter.
pub trait RandomSource {
    fn sample(&self) -> f64;
}

/// Thread-local RNG from `rand`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn sample(&self) -> f64 {
        rand::random::<f64>()
    }
}

/// Reproducible RNG seeded from a `u64`.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<rand::rngs::StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        use rand::SeedableRng;
        Self {
            rng: Mutex::new(rand::rngs::StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn sample(&self) -> f64 {
        use rand::Rng;
        // A poisoned lock still holds a usable RNG state
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rng.random::<f64>()
    }
}

/// Always yields the same sample.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub f64);

impl RandomSource for FixedRandom {
    fn sample(&self) -> f64 {
        self.0
    }
}

impl<T: RandomSource + ?Sized> RandomSource for &T {
    fn sample(&self) -> f64 {
        (**self).sample()
    }
}

/// Largest jitter sample; samples live in `[0, 1)`.
const MAX_SAMPLE: f64 = 1.0 - f64::EPSILON;

/// Ceiling-capped growth term for `attempt`, before jitter.
pub fn base_delay(
    attempt: u32,
    min: Duration,
    max: Duration,
    strategy: BackoffStrategy,
) -> Duration {
    if min >= max {
        return max;
    }

    match strategy {
        BackoffStrategy::Exponential => {
            let mut delay = min;
            for _ in 0..attempt {
                if delay >= max {
                    break;
                }
                delay = delay.saturating_mul(2);
            }
            delay.min(max)
        }
        BackoffStrategy::Linear => min.saturating_mul(attempt.saturating_add(1)).min(max),
    }
}

/// `min(max, min * 2^attempt)`
pub fn exponential_delay(attempt: u32, min: Duration, max: Duration) -> Duration {
    base_delay(attempt, min, max, BackoffStrategy::Exponential)
}

/// Delay to wait after the failed attempt `attempt` (zero-based).
///
/// Without jitter this is the capped growth term `exp`. With jitter it is
/// `min(max, min + r * exp)` where `r` is drawn from `random`, so the result
/// stays within `[min, max]`.
pub fn compute_delay<R: RandomSource + ?Sized>(
    attempt: u32,
    min: Duration,
    max: Duration,
    jitter: bool,
    strategy: BackoffStrategy,
    random: &R,
) -> Duration {
    let exp = base_delay(attempt, min, max, strategy);
    if !jitter || min >= max {
        return exp;
    }

    let r = random.sample();
    let r = if r.is_finite() {
        r.clamp(0.0, MAX_SAMPLE)
    } else {
        0.0
    };
    let exp_nanos = u64::try_from(exp.as_nanos()).unwrap_or(u64::MAX);
    let spread = Duration::from_nanos((exp_nanos as f64 * r).round() as u64);
    let delay = min.saturating_add(spread).min(max);

    debug!(
        "Backoff for attempt {}: {:?} (base {:?}, sample {:.3})",
        attempt, delay, exp, r
    );
    delay
}

/// Delays an always-failing operation would wait through under `options`.
pub fn schedule<P, R: RandomSource + ?Sized>(
    options: &RetryOptions<P>,
    random: &R,
) -> Vec<Duration> {
    (0..options.get_retries())
        .map(|attempt| options.delay_for(attempt, random))
        .collect()
}
