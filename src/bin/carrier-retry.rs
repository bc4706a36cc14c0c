use anyhow::Result;
use carrier_retry::backoff::{schedule, RandomSource};
use carrier_retry::{
    BackoffStrategy, Config, Retrier, RetryOnStatus, RetryOptions, RetryPredicate, SeededRandom,
    ThreadRandom,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "carrier-retry")]
#[command(about = "Retry commands with exponential backoff", long_about = None)]
struct Cli {
    /// Path to the retry config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Profile from the config file (default: [retry])
    #[arg(short, long, global = true)]
    profile: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the backoff delays for a profile
    Schedule {
        #[command(flatten)]
        overrides: Overrides,
        /// Seed the jitter RNG for a reproducible schedule
        #[arg(long)]
        seed: Option<u64>,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Run a command, retrying until it exits successfully
    Exec {
        #[command(flatten)]
        overrides: Overrides,
        /// Only retry these exit codes (default: any failure)
        #[arg(long, value_delimiter = ',')]
        retry_on_exit_codes: Vec<i32>,
        /// Program and arguments
        #[arg(required = true, last = true)]
        command: Vec<String>,
    },
}

#[derive(Args)]
struct Overrides {
    /// Retries after the first attempt
    #[arg(short, long)]
    retries: Option<u32>,
    #[arg(long)]
    min_delay_ms: Option<u64>,
    #[arg(long)]
    max_delay_ms: Option<u64>,
    /// Disable jitter
    #[arg(long)]
    no_jitter: bool,
    /// exponential or linear
    #[arg(long, value_parser = parse_strategy)]
    strategy: Option<BackoffStrategy>,
}

#[derive(Serialize)]
struct PlannedDelay {
    attempt: u32,
    delay_ms: u128,
}

#[derive(Debug)]
enum ExecFailure {
    Spawn(std::io::Error),
    Exit(Option<i32>),
}

impl fmt::Display for ExecFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecFailure::Spawn(err) => write!(f, "failed to spawn: {}", err),
            ExecFailure::Exit(Some(code)) => write!(f, "exited with code {}", code),
            ExecFailure::Exit(None) => write!(f, "terminated by signal"),
        }
    }
}

impl std::error::Error for ExecFailure {}

struct ExitCodes(Vec<i32>);

impl RetryPredicate<ExecFailure> for ExitCodes {
    fn should_retry(&self, error: &ExecFailure, _attempt: u32) -> bool {
        match error {
            ExecFailure::Spawn(_) => false,
            ExecFailure::Exit(code) => {
                self.0.is_empty() || code.is_some_and(|code| self.0.contains(&code))
            }
        }
    }
}

fn parse_strategy(value: &str) -> Result<BackoffStrategy, String> {
    match value.to_ascii_lowercase().as_str() {
        "exponential" => Ok(BackoffStrategy::Exponential),
        "linear" => Ok(BackoffStrategy::Linear),
        other => Err(format!("unknown strategy '{}'", other)),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_path(path),
        None if std::path::Path::new(carrier_retry::config::DEFAULT_CONFIG_PATH).exists() => {
            Config::new()
        }
        None => Ok(Config::default()),
    }
}

fn build_options(
    config: &Config,
    profile: Option<&str>,
    overrides: &Overrides,
) -> Result<RetryOptions<Option<RetryOnStatus>>> {
    let mut settings = config.settings(profile)?.clone();
    if let Some(retries) = overrides.retries {
        settings.retries = retries;
    }
    if let Some(min) = overrides.min_delay_ms {
        settings.min_delay_ms = min;
    }
    if let Some(max) = overrides.max_delay_ms {
        settings.max_delay_ms = max;
    }
    if overrides.no_jitter {
        settings.jitter = false;
    }
    if let Some(strategy) = overrides.strategy {
        settings.strategy = strategy;
    }
    settings.to_options()
}

fn print_schedule<P, R: RandomSource>(
    options: &RetryOptions<P>,
    random: &R,
    json: bool,
) -> Result<()> {
    let planned: Vec<PlannedDelay> = schedule(options, random)
        .into_iter()
        .zip(0..)
        .map(|(delay, attempt)| PlannedDelay {
            attempt,
            delay_ms: delay.as_millis(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&planned)?);
    } else {
        let total: u128 = planned.iter().map(|p| p.delay_ms).sum();
        for p in &planned {
            println!("after attempt {:>3}: {:>8} ms", p.attempt, p.delay_ms);
        }
        println!("total wait: {} ms", total);
    }
    Ok(())
}

/// Exit code of the last run: 0 once the command succeeds.
async fn exec(
    options: RetryOptions<Option<RetryOnStatus>>,
    retry_on: Vec<i32>,
    command: Vec<String>,
) -> Result<i32> {
    if let Some(statuses) = options.get_predicate() {
        warn!(
            "retry_on_status_codes {:?} does not apply to exec; use --retry-on-exit-codes",
            statuses.codes()
        );
    }
    let options = options.predicate(ExitCodes(retry_on));
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("no command given"))?;

    info!("Running {} with up to {} retries", program, options.get_retries());

    let outcome = Retrier::new()
        .retry(&options, || async move {
            match tokio::process::Command::new(program).args(args).status().await {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => Err(ExecFailure::Exit(status.code())),
                Err(err) => Err(ExecFailure::Spawn(err)),
            }
        })
        .await;

    match outcome {
        Ok(()) => Ok(0),
        Err(ExecFailure::Exit(Some(code))) => Ok(code),
        Err(err) => Err(err.into()),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv::dotenv().ok();
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let profile = cli.profile.as_deref();

    match cli.command {
        Commands::Schedule {
            overrides,
            seed,
            json,
        } => {
            let options = build_options(&config, profile, &overrides)?;
            match seed {
                Some(seed) => print_schedule(&options, &SeededRandom::new(seed), json)?,
                None => print_schedule(&options, &ThreadRandom, json)?,
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Exec {
            overrides,
            retry_on_exit_codes,
            command,
        } => {
            let options = build_options(&config, profile, &overrides)?;
            let code = exec(options, retry_on_exit_codes, command).await?;
            // Codes outside 0..=255 are reported as a generic failure
            Ok(u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from))
        }
    }
}
