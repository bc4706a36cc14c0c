//! # carrier-retry
//!
//! Async retry with exponential backoff and jitter for the network and
//! database calls made by carrier platform services.
//!
//! ## Quick Start
//!
//! ```no_run
//! use carrier_retry::{with_retry, RetryOptions};
//! use std::time::Duration;
//!
//! # async fn fetch_parcel() -> anyhow::Result<String> { Ok(String::new()) }
//! # async fn example() -> anyhow::Result<()> {
//! let options = RetryOptions::new()
//!     .retries(5)
//!     .delays(Duration::from_millis(200), Duration::from_secs(5))?;
//!
//! let parcel = with_retry(|| fetch_parcel(), options).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Behaviour
//!
//! - **Attempts**: one initial attempt plus up to `retries` more, run strictly in sequence
//! - **Backoff**: `min(max, min * 2^attempt)`, or linear growth when configured
//! - **Jitter**: `min(max, min + r * backoff)` with `r` uniform in `[0, 1)`
//! - **Predicates**: stop early when the error is not worth retrying
//! - **Errors**: the final attempt's error is returned as-is
//!
//! There is no overall deadline. Wrap the call in `tokio::time::timeout` if
//! one is needed.
//!
//! ## Configuration
//!
//! Profiles can be loaded from a `retry.toml` file:
//!
//! ```toml
//! [retry]
//! retries = 3
//! min_delay_ms = 300
//! max_delay_ms = 2000
//! jitter = true
//!
//! [profiles.webhooks]
//! retries = 5
//! min_delay_ms = 1000
//! max_delay_ms = 60000
//! retry_on_status_codes = [429, 502, 503]
//! ```

pub mod backoff;
pub mod config;
pub mod retry;

pub use backoff::{BackoffStrategy, FixedRandom, RandomSource, SeededRandom, ThreadRandom};
pub use config::{Config, RetrySettings};
pub use retry::{
    with_retry, AlwaysRetry, NeverRetry, Retrier, RetryIf, RetryOnStatus, RetryOptions,
    RetryPredicate, Sleeper, StatusCode, TokioSleeper,
};
