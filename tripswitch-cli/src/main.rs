//! Tripswitch CLI

mod simulate;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tripswitch_config::{build_registry, load_config, LogFormat};
use tripswitch_core::{BreakerConfig, CircuitBreaker, RecoveryMode};

#[derive(Parser)]
#[command(name = "tripswitch")]
#[command(about = "Tripswitch circuit breaker", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a flaky operation through a breaker and print the final stats
    Simulate(SimulateArgs),

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "tripswitch.yaml")]
        config: PathBuf,
    },

    /// Show version information
    Version,
}

#[derive(Args)]
struct SimulateArgs {
    /// Number of guarded calls
    #[arg(long, default_value_t = 20)]
    calls: u32,

    /// The operation fails this many times before succeeding
    #[arg(long, default_value_t = 3)]
    fail_first: u32,

    /// Time each invocation of the operation takes
    #[arg(long, default_value_t = 10)]
    latency_ms: u64,

    /// Per-call deadline; a call exceeding it counts as a failure
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Pause between calls
    #[arg(long, default_value_t = 100)]
    interval_ms: u64,

    /// Failures before the breaker opens (overrides the configuration file)
    #[arg(long)]
    max_failures: Option<u32>,

    /// Delay before an open breaker half-opens; zero or negative disables it
    #[arg(long, allow_negative_numbers = true)]
    reset_delay_ms: Option<i64>,

    /// Call try_reset after this many consecutive blocked calls
    #[arg(long)]
    manual_reset_after: Option<u32>,

    /// Optional configuration file supplying the breaker and logging settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Breaker to use from the configuration file
    #[arg(short, long, default_value = "simulation")]
    breaker: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormatArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate(args) => run_simulation(args).await,

        Commands::Validate { config } => {
            tracing_subscriber::fmt().with_target(false).init();

            tracing::info!("Validating configuration: {}", config.display());

            match load_config(&config) {
                Ok(cfg) => {
                    tracing::info!("✓ Configuration is valid");
                    tracing::info!("  Log level: {}", cfg.logging.level);
                    tracing::info!(
                        "  Defaults: max_failures={}, {}",
                        cfg.defaults.max_failures,
                        describe_recovery(&cfg.defaults)
                    );
                    tracing::info!("  Breakers: {}", cfg.breakers.len());
                    for breaker in &cfg.breakers {
                        tracing::info!(
                            "    {}: max_failures={}, {}",
                            breaker.name,
                            breaker.max_failures,
                            describe_recovery(breaker)
                        );
                    }
                    Ok(())
                }
                Err(e) => {
                    tracing::error!("✗ Configuration validation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Version => {
            println!("Tripswitch circuit breaker");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
            Ok(())
        }
    }
}

async fn run_simulation(args: SimulateArgs) -> Result<()> {
    let config = args.config.as_ref().map(load_config).transpose()?;

    let level = args
        .log_level
        .clone()
        .or_else(|| config.as_ref().map(|c| c.logging.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let format = args
        .log_format
        .map(LogFormat::from)
        .or_else(|| config.as_ref().map(|c| c.logging.format))
        .unwrap_or_default();
    init_tracing(&level, format)?;

    let mut breaker_config = match &config {
        Some(config) => build_registry(config)?
            .get_or_create(&args.breaker)?
            .config()
            .clone(),
        None => BreakerConfig::new().with_name(args.breaker.clone()),
    };
    if let Some(max_failures) = args.max_failures {
        breaker_config = breaker_config.with_max_failures(max_failures);
    }
    if let Some(reset_delay_ms) = args.reset_delay_ms {
        breaker_config = breaker_config.with_reset_delay_ms(reset_delay_ms);
    }

    let breaker = CircuitBreaker::new(breaker_config)?;
    simulate::trace_events(&breaker);

    tracing::info!(
        breaker = %breaker.name(),
        max_failures = breaker.max_failures(),
        recovery = %describe_recovery(breaker.config()),
        calls = args.calls,
        "Starting simulation"
    );

    let operation =
        simulate::FlakyOperation::new(args.fail_first, Duration::from_millis(args.latency_ms));
    let plan = simulate::Plan {
        calls: args.calls,
        timeout: args.timeout_ms.map(Duration::from_millis),
        interval: Duration::from_millis(args.interval_ms),
        manual_reset_after: args.manual_reset_after,
    };

    let report = simulate::run(&breaker, &operation, &plan).await;

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

fn describe_recovery(config: &BreakerConfig) -> String {
    match config.recovery_mode() {
        RecoveryMode::Automatic(delay) => format!("reset_delay={}ms", delay.as_millis()),
        RecoveryMode::Manual => "manual recovery".to_string(),
    }
}

fn init_tracing(level: &str, format: LogFormat) -> Result<()> {
    let filter = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    let env_filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(filter.into());

    // Logs go to stderr so the JSON report on stdout stays parseable
    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_level(true),
            )
            .with(env_filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .with(env_filter)
            .init(),
    }

    Ok(())
}
