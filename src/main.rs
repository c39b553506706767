use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use floodgate::config::{FloodgateConfig, LoggingConfig, StrategyKind};
use floodgate::ratelimit::{Decision, RateLimiter, SlidingLog, Strategy, TokenBucket};
use floodgate::store::{MemoryStore, Store};

/// Read identities from stdin, one per line, and print a JSON decision for each.
#[derive(Parser, Debug)]
#[command(name = "floodgate", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Limiting strategy (sliding_log or token_bucket)
    #[arg(long)]
    strategy: Option<StrategyKind>,

    /// Admissions allowed per window
    #[arg(long, allow_negative_numbers = true)]
    limit: Option<i64>,

    /// Window length in milliseconds
    #[arg(long)]
    window_ms: Option<u64>,
}

/// One line of output.
#[derive(Serialize)]
struct DecisionLine<'a> {
    identity: &'a str,
    #[serde(flatten)]
    decision: Decision,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = FloodgateConfig::load(args.config.as_deref())?;
    if let Some(strategy) = args.strategy {
        config.limiter.strategy = strategy;
    }
    if let Some(limit) = args.limit {
        config.limiter.limit = limit;
    }
    if let Some(window_ms) = args.window_ms {
        config.limiter.window_ms = Some(window_ms);
    }

    init_tracing(&config.logging);

    info!("Starting Floodgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let quota = config.limiter.quota()?;
    info!(
        strategy = ?config.limiter.strategy,
        limit = quota.limit(),
        window_ms = quota.window_millis(),
        "Configuration loaded"
    );

    let store = MemoryStore::new();
    match config.limiter.strategy {
        StrategyKind::SlidingLog => serve(RateLimiter::new(store, SlidingLog::new(), quota)?).await?,
        StrategyKind::TokenBucket => {
            serve(RateLimiter::new(store, TokenBucket::new(), quota)?).await?
        }
    }

    info!("Floodgate stopped");
    Ok(())
}

/// Initialize tracing. Logs go to stderr so stdout carries only decisions.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Decide for each identity read from stdin until EOF or a shutdown signal.
async fn serve<S: Store, T: Strategy>(limiter: RateLimiter<S, T>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            info!("End of input");
            break;
        };

        let identity = line.trim();
        if identity.is_empty() {
            continue;
        }

        match limiter.decide(identity).await {
            Ok(decision) => {
                let mut out = serde_json::to_vec(&DecisionLine { identity, decision })?;
                out.push(b'\n');
                stdout.write_all(&out).await?;
                stdout.flush().await?;
            }
            Err(e) => {
                warn!(identity = %identity, error = %e, "Rate limit decision failed");
            }
        }
    }

    Ok(())
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
