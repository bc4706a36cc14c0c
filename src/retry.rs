use anyhow::Result;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::backoff::{compute_delay, BackoffStrategy, RandomSource, ThreadRandom};

pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(300);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(2000);

/// Decides whether a failed attempt should be retried.
///
/// `attempt` is the zero-based index of the attempt that just failed.
pub trait RetryPredicate<E> {
    fn should_retry(&self, error: &E, attempt: u32) -> bool;
}

/// Retry every failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl<E> RetryPredicate<E> for AlwaysRetry {
    fn should_retry(&self, _error: &E, _attempt: u32) -> bool {
        true
    }
}

/// Never retry; the first failure is returned.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl<E> RetryPredicate<E> for NeverRetry {
    fn should_retry(&self, _error: &E, _attempt: u32) -> bool {
        false
    }
}

/// Retry when the closure says so.
#[derive(Debug, Clone, Copy)]
pub struct RetryIf<F>(pub F);

impl<E, F: Fn(&E, u32) -> bool> RetryPredicate<E> for RetryIf<F> {
    fn should_retry(&self, error: &E, attempt: u32) -> bool {
        (self.0)(error, attempt)
    }
}

/// `None` retries every failure.
impl<E, P: RetryPredicate<E>> RetryPredicate<E> for Option<P> {
    fn should_retry(&self, error: &E, attempt: u32) -> bool {
        self.as_ref()
            .map_or(true, |predicate| predicate.should_retry(error, attempt))
    }
}

/// Errors that carry an HTTP-like status code.
pub trait StatusCode {
    fn status_code(&self) -> Option<u16>;
}

/// Retry only failures whose status code is in the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOnStatus {
    codes: Vec<u16>,
}

impl RetryOnStatus {
    pub fn new(codes: impl Into<Vec<u16>>) -> Self {
        Self {
            codes: codes.into(),
        }
    }

    /// Timeouts, throttling and upstream 5xx.
    pub fn transient() -> Self {
        Self::new([408, 425, 429, 500, 502, 503, 504])
    }

    pub fn codes(&self) -> &[u16] {
        &self.codes
    }
}

impl<E: StatusCode> RetryPredicate<E> for RetryOnStatus {
    fn should_retry(&self, error: &E, _attempt: u32) -> bool {
        error
            .status_code()
            .is_some_and(|code| self.codes.contains(&code))
    }
}

/// Per-call retry configuration.
///
/// The delay bounds can only be set together through [`RetryOptions::delays`],
/// so every value satisfies `0 < min_delay <= max_delay`.
#[derive(Debug, Clone)]
pub struct RetryOptions<P = AlwaysRetry> {
    retries: u32,
    min_delay: Duration,
    max_delay: Duration,
    jitter: bool,
    strategy: BackoffStrategy,
    predicate: P,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: true,
            strategy: BackoffStrategy::Exponential,
            predicate: AlwaysRetry,
        }
    }
}

impl RetryOptions {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<P> RetryOptions<P> {
    /// Additional attempts after the first.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the delay floor and ceiling. Rejects a zero floor or `min > max`.
    pub fn delays(mut self, min: Duration, max: Duration) -> Result<Self> {
        if min.is_zero() {
            return Err(anyhow::anyhow!("min delay must be positive"));
        }
        if min > max {
            return Err(anyhow::anyhow!(
                "min delay {:?} exceeds max delay {:?}",
                min,
                max
            ));
        }
        self.min_delay = min;
        self.max_delay = max;
        Ok(self)
    }

    /// Replace the predicate with a closure over `(error, attempt)`.
    pub fn should_retry<F>(self, f: F) -> RetryOptions<RetryIf<F>> {
        self.predicate(RetryIf(f))
    }

    pub fn predicate<Q>(self, predicate: Q) -> RetryOptions<Q> {
        RetryOptions {
            retries: self.retries,
            min_delay: self.min_delay,
            max_delay: self.max_delay,
            jitter: self.jitter,
            strategy: self.strategy,
            predicate,
        }
    }

    pub fn get_retries(&self) -> u32 {
        self.retries
    }

    pub fn get_min_delay(&self) -> Duration {
        self.min_delay
    }

    pub fn get_max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn get_jitter(&self) -> bool {
        self.jitter
    }

    pub fn get_strategy(&self) -> BackoffStrategy {
        self.strategy
    }

    pub fn get_predicate(&self) -> &P {
        &self.predicate
    }

    /// Backoff to wait after the failed attempt `attempt`.
    pub fn delay_for<R: RandomSource + ?Sized>(&self, attempt: u32, random: &R) -> Duration {
        compute_delay(
            attempt,
            self.min_delay,
            self.max_delay,
            self.jitter,
            self.strategy,
            random,
        )
    }
}

/// Timer used between attempts.
pub trait Sleeper {
    fn sleep(&self, delay: Duration) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, delay: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(delay)
    }
}

/// Retry executor with injectable jitter source and timer.
#[derive(Debug, Clone, Default)]
pub struct Retrier<R = ThreadRandom, S = TokioSleeper> {
    random: R,
    sleeper: S,
}

impl Retrier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R, S> Retrier<R, S>
where
    R: RandomSource,
    S: Sleeper,
{
    pub fn with_random<R2: RandomSource>(self, random: R2) -> Retrier<R2, S> {
        Retrier {
            random,
            sleeper: self.sleeper,
        }
    }

    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> Retrier<R, S2> {
        Retrier {
            random: self.random,
            sleeper,
        }
    }

    /// Run `operation` until it succeeds, the predicate declines, or the
    /// retry budget is spent. The last error is returned unchanged.
    pub async fn retry<F, Fut, T, E, P>(
        &self,
        options: &RetryOptions<P>,
        mut operation: F,
    ) -> std::result::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Debug,
        P: RetryPredicate<E>,
    {
        let mut attempt: u32 = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!("Operation succeeded after {} attempts", attempt + 1);
                    }
                    return Ok(result);
                }
                Err(err) if attempt >= options.retries => {
                    if options.retries > 0 {
                        warn!("Operation failed after {} attempts: {:?}", attempt + 1, err);
                    }
                    return Err(err);
                }
                Err(err) if !options.predicate.should_retry(&err, attempt) => {
                    warn!(
                        "Attempt {} failed with non-retryable error: {:?}",
                        attempt + 1,
                        err
                    );
                    return Err(err);
                }
                Err(err) => {
                    let delay = options.delay_for(attempt, &self.random);
                    warn!(
                        "Attempt {} failed: {:?}. Retrying in {:?}...",
                        attempt + 1,
                        err,
                        delay
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Run `operation` with `options` using the thread RNG and tokio's timer.
pub async fn with_retry<F, Fut, T, E, P>(
    operation: F,
    options: RetryOptions<P>,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Debug,
    P: RetryPredicate<E>,
{
    Retrier::new().retry(&options, operation).await
}
