use carrier_retry::config::{Config, RetrySettings};
use carrier_retry::{with_retry, BackoffStrategy, RetryOnStatus, StatusCode};
use pretty_assertions::assert_eq;
use std::fs;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tempfile::tempdir;

#[derive(Debug, PartialEq)]
struct Rejected(u16);

impl StatusCode for Rejected {
    fn status_code(&self) -> Option<u16> {
        Some(self.0)
    }
}

#[test]
fn test_config_from_path_with_valid_file() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("retry.toml");

    let config_content = r#"
[retry]
retries = 4
min_delay_ms = 250
max_delay_ms = 4000
jitter = false
strategy = "linear"

[profiles.webhooks]
retries = 5
min_delay_ms = 1000
max_delay_ms = 60000
retry_on_status_codes = [429, 502, 503]

[profiles.jobs]
min_delay_ms = 60000
max_delay_ms = 3600000
"#;

    fs::write(&config_path, config_content).unwrap();

    let config = Config::from_path(&config_path).unwrap();
    assert_eq!(config.retry.retries, 4);
    assert_eq!(config.retry.min_delay_ms, 250);
    assert_eq!(config.retry.max_delay_ms, 4000);
    assert!(!config.retry.jitter);
    assert_eq!(config.retry.strategy, BackoffStrategy::Linear);
    assert_eq!(config.profiles.len(), 2);

    let webhooks = config.profile("webhooks").unwrap();
    assert_eq!(webhooks.retries, 5);
    assert!(webhooks.jitter);
    assert_eq!(webhooks.strategy, BackoffStrategy::Exponential);
    assert_eq!(
        webhooks.predicate(),
        Some(RetryOnStatus::new(vec![429, 502, 503]))
    );

    let jobs = config.settings(Some("jobs")).unwrap();
    assert_eq!(jobs.retries, 3);
    assert_eq!(jobs.predicate(), None);
}

#[test]
fn test_config_from_path_with_missing_file() {
    let dir = tempdir().unwrap();
    let result = Config::from_path(dir.path().join("retry.toml"));
    assert!(result.is_err());
}

#[test]
fn test_config_with_invalid_toml() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("retry.toml");

    let invalid_content = r#"
[retry
retries = 3
"#;

    fs::write(&config_path, invalid_content).unwrap();

    assert!(Config::from_path(&config_path).is_err());
}

#[test]
fn test_config_with_wrong_types() {
    let result = Config::from_toml(
        r#"
[retry]
retries = "three"
"#,
    );
    assert!(result.is_err());

    let result = Config::from_toml(
        r#"
[retry]
strategy = "fibonacci"
"#,
    );
    assert!(result.is_err());
}

#[test]
fn test_invalid_profile_names_profile_in_error() {
    let result = Config::from_toml(
        r#"
[profiles.broken]
min_delay_ms = 0
"#,
    );
    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("profiles.broken"));
}

#[test]
fn test_settings_to_options() {
    let settings = RetrySettings {
        retries: 2,
        min_delay_ms: 10,
        max_delay_ms: 40,
        jitter: false,
        strategy: BackoffStrategy::Exponential,
        retry_on_status_codes: None,
    };

    let options = settings.to_options().unwrap();
    assert_eq!(options.get_retries(), 2);
    assert_eq!(options.get_min_delay(), Duration::from_millis(10));
    assert_eq!(options.get_max_delay(), Duration::from_millis(40));
    assert!(!options.get_jitter());
}

#[test]
fn test_settings_to_options_rejects_inverted_bounds() {
    let settings = RetrySettings {
        min_delay_ms: 500,
        max_delay_ms: 100,
        ..RetrySettings::default()
    };
    assert!(settings.to_options().is_err());
}

#[test]
fn test_settings_clone() {
    let settings = RetrySettings {
        retry_on_status_codes: Some(vec![503]),
        ..RetrySettings::default()
    };
    let cloned = settings.clone();
    assert_eq!(settings, cloned);
}

#[test]
fn test_config_without_retry_table_uses_defaults() {
    let config = Config::from_toml(
        r#"
[profiles.fast]
retries = 1
"#,
    )
    .unwrap();
    assert_eq!(config.retry, RetrySettings::default());
    assert_eq!(config.profile("fast").unwrap().retries, 1);
    assert_eq!(config.profile("fast").unwrap().min_delay_ms, 300);
}

#[tokio::test(start_paused = true)]
async fn test_status_codes_from_config_filter_retries() {
    let config = Config::from_toml(
        r#"
[retry]
retries = 3
min_delay_ms = 10
max_delay_ms = 40
jitter = false
retry_on_status_codes = [503]
"#,
    )
    .unwrap();
    let options = config.retry.to_options().unwrap();
    assert_eq!(options.get_predicate(), &Some(RetryOnStatus::new(vec![503])));

    let calls = AtomicU32::new(0);
    let result: Result<(), Rejected> = with_retry(
        || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Rejected(404)) }
        },
        options.clone(),
    )
    .await;
    assert_eq!(result.unwrap_err(), Rejected(404));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let calls = AtomicU32::new(0);
    let result: Result<(), Rejected> = with_retry(
        || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Rejected(503)) }
        },
        options,
    )
    .await;
    assert_eq!(result.unwrap_err(), Rejected(503));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_profile_without_status_codes_retries_everything() {
    let options = RetrySettings {
        retries: 2,
        min_delay_ms: 1,
        max_delay_ms: 4,
        ..RetrySettings::default()
    }
    .to_options()
    .unwrap();

    let calls = AtomicU32::new(0);
    let result: Result<(), Rejected> = with_retry(
        || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Rejected(404)) }
        },
        options,
    )
    .await;
    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
