use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use slidegate::config::{LoggingConfig, SlidegateConfig, SweeperConfig};
use slidegate::ratelimit::{RateLimiter, Sweeper};

/// Sliding-window rate limiter for named actions.
#[derive(Debug, Parser)]
#[command(name = "slidegate", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the effective policy table
    Policies,
    /// Run admission checks for one subject and print each decision
    Check {
        /// Action name, e.g. NOTE_WRITE or login-attempt
        action: String,
        /// Who is being throttled (user id, IP address, ...)
        subject: String,
        /// Number of consecutive attempts
        #[arg(short = 'n', long, default_value_t = 1)]
        times: u32,
    },
    /// Read `<action> <subject>` lines from stdin and print a decision per line
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SlidegateConfig::from_file(path)?,
        None => SlidegateConfig::from_env()?,
    };
    init_tracing(&config.logging);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Slidegate");

    let policies = config.policy_table()?;
    for (action, policy) in policies.iter() {
        info!(action = %action, policy = %policy, "Policy registered");
    }

    let limiter = Arc::new(RateLimiter::with_policies(policies, None));

    match cli.command {
        Command::Policies => print_policies(&limiter)?,
        Command::Check {
            action,
            subject,
            times,
        } => {
            for _ in 0..times {
                let decision = limiter.check_named(&action, &subject)?;
                println!("{}", serde_json::to_string(&decision)?);
            }
        }
        Command::Run => run(limiter, config.sweeper.clone()).await?,
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    // Decisions go to stdout, so logs stay on stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_policies(limiter: &RateLimiter) -> anyhow::Result<()> {
    let table: Vec<_> = limiter
        .policies()
        .iter()
        .map(|(action, policy)| {
            json!({
                "action": action.name(),
                "limit": policy.limit,
                "window_ms": policy.window_ms,
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&table)?);
    Ok(())
}

async fn run(limiter: Arc<RateLimiter>, sweeper_config: SweeperConfig) -> anyhow::Result<()> {
    let sweeper = Sweeper::new(limiter.clone(), sweeper_config)?.spawn();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line() => match line? {
                Some(line) => handle_line(&limiter, &line)?,
                None => {
                    info!("Input closed");
                    break;
                }
            },
        }
    }

    sweeper.shutdown().await?;
    info!(tracked_keys = limiter.tracked_keys(), "Slidegate stopped");
    Ok(())
}

fn handle_line(limiter: &RateLimiter, line: &str) -> anyhow::Result<()> {
    if let Some(output) = decide_line(limiter, line)? {
        println!("{}", output);
    }
    Ok(())
}

/// Decide one `<action> <subject>` input line.
///
/// Blank lines and `#` comments yield `None`. Bad input yields an error object
/// rather than failing, so one malformed line never stops the stream.
fn decide_line(limiter: &RateLimiter, line: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let output = match line.split_once(char::is_whitespace) {
        Some((action, subject)) => match limiter.check_named(action, subject.trim()) {
            Ok(decision) => serde_json::to_value(&decision)?,
            Err(e) => json!({ "input": line, "error": e.to_string() }),
        },
        None => json!({ "input": line, "error": "expected `<action> <subject>`" }),
    };

    Ok(Some(output))
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
