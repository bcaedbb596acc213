use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::{LoggingConfig, TurnstileConfig};
use turnstile::ratelimit::{Decision, RateLimiter, Sweeper};

/// Admission checks over stdin: one key per line in, one JSON decision per line out.
///
/// `!reset` clears every key, `!reset <key>` clears one.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the default admissions per window
    #[arg(long)]
    limit: Option<f64>,

    /// Override the default window length in milliseconds
    #[arg(long)]
    window_ms: Option<f64>,
}

#[derive(Serialize)]
struct Output<'a> {
    key: &'a str,
    #[serde(flatten)]
    decision: Decision,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = TurnstileConfig::load(args.config.as_deref())?;
    if let Some(limit) = args.limit {
        config.limiter.default_limit = limit;
    }
    if let Some(window_ms) = args.window_ms {
        config.limiter.default_window_ms = window_ms;
    }

    init_tracing(&config.logging);

    info!("Starting Turnstile");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let limiter = Arc::new(RateLimiter::from_config(&config.limiter)?);
    let policy = limiter.default_policy();
    info!(
        limit = policy.limit(),
        window_ms = policy.window_ms(),
        "Rate limiter initialized"
    );

    let sweeper = if config.eviction.enabled {
        Some(Sweeper::spawn(limiter.clone(), config.eviction.sweeper_config()?))
    } else {
        None
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Input closed");
                    break;
                };
                if let Some(out) = handle_line(&limiter, line.trim())? {
                    stdout.write_all(out.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                    stdout.flush().await?;
                }
            }
        }
    }

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    info!("Turnstile stopped");
    Ok(())
}

/// Apply one input line; returns the JSON line to print, if any.
fn handle_line(limiter: &RateLimiter, line: &str) -> anyhow::Result<Option<String>> {
    if line.is_empty() {
        return Ok(None);
    }

    if line == "!reset" {
        limiter.reset(None);
        return Ok(None);
    }
    if let Some(key) = line.strip_prefix("!reset ") {
        limiter.reset(Some(key.trim()));
        return Ok(None);
    }

    let decision = limiter.check(line, None);
    Ok(Some(serde_json::to_string(&Output { key: line, decision })?))
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    // stdout carries decisions; logs go to stderr.
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
