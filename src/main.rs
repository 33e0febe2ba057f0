use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use futures::future::{join_all, FutureExt};
use reqwest::{Method, Url};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use outbound_throttle::{SendError, ThrottleConfig, ThrottlingTransport};

/// Send a burst of requests to a URL through a throttled HTTP client.
#[derive(Parser, Debug)]
#[command(name = "outbound-throttle", version, about)]
struct Args {
    /// URL to request
    url: Url,

    /// YAML throttling configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Requests admitted per time unit
    #[arg(long)]
    rate: Option<u32>,

    /// Time unit for --rate, e.g. "1s", "500ms", "1m"
    #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
    per: Option<Duration>,

    /// Only throttle this HTTP method (repeatable)
    #[arg(long = "method")]
    throttle_methods: Vec<String>,

    /// Only throttle paths with this prefix, `*` matching one segment (repeatable)
    #[arg(long)]
    include: Vec<String>,

    /// Never throttle paths with this prefix (repeatable)
    #[arg(long)]
    exclude: Vec<String>,

    /// Reject requests instead of waiting when no slot is free
    #[arg(long)]
    no_overqueue: bool,

    /// Number of requests to send
    #[arg(short = 'n', long, default_value_t = 10)]
    requests: usize,

    /// HTTP method of the requests sent
    #[arg(short = 'X', long, default_value = "GET")]
    request_method: Method,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// How a single request ended.
#[derive(Debug)]
enum Outcome {
    Sent,
    Rejected,
    Cancelled,
    Failed,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting outbound-throttle");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = build_config(&args)?;
    info!(
        requests_per_unit = config.requests_per_unit,
        unit_of_time = ?config.unit_of_time,
        allow_overqueue = config.allow_overqueue,
        "Configuration loaded"
    );

    let transport = Arc::new(ThrottlingTransport::from_config(reqwest::Client::new(), &config)?);
    info!(
        events_per_second = transport.policy().events_per_second(),
        "Throttler initialized"
    );

    let shutdown = shutdown_signal().shared();
    let started = Instant::now();

    let tasks: Vec<_> = (0..args.requests)
        .map(|index| {
            let transport = Arc::clone(&transport);
            let shutdown = shutdown.clone();
            let method = args.request_method.clone();
            let url = args.url.clone();
            tokio::spawn(async move {
                let request = transport.delegate().request(method, url).build();
                let request = match request {
                    Ok(request) => request,
                    Err(e) => {
                        error!(index, error = %e, "Failed to build request");
                        return Outcome::Failed;
                    }
                };

                match transport.send_until(request, shutdown).await {
                    Ok(response) => {
                        info!(index, status = %response.status(), "Request completed");
                        Outcome::Sent
                    }
                    Err(SendError::OverqueueRejected) => {
                        warn!(index, "Request rejected, over-queueing disallowed");
                        Outcome::Rejected
                    }
                    Err(SendError::Cancelled) => {
                        warn!(index, "Request cancelled");
                        Outcome::Cancelled
                    }
                    Err(SendError::Delegate(e)) => {
                        error!(index, error = %e, "Request failed");
                        Outcome::Failed
                    }
                }
            })
        })
        .collect();

    let (mut sent, mut rejected, mut cancelled, mut failed) = (0, 0, 0, 0);
    for outcome in join_all(tasks).await {
        match outcome? {
            Outcome::Sent => sent += 1,
            Outcome::Rejected => rejected += 1,
            Outcome::Cancelled => cancelled += 1,
            Outcome::Failed => failed += 1,
        }
    }

    info!(
        sent,
        rejected,
        cancelled,
        failed,
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "All requests finished"
    );
    Ok(())
}

/// Initialize tracing, honouring `RUST_LOG` when set.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

/// Start from the config file, if any, and apply command line overrides.
fn build_config(args: &Args) -> anyhow::Result<ThrottleConfig> {
    let mut config = match &args.config {
        Some(path) => ThrottleConfig::from_file(path)?,
        None => ThrottleConfig::default(),
    };

    if let Some(rate) = args.rate {
        config.requests_per_unit = rate;
    }
    if let Some(per) = args.per {
        config.unit_of_time = per;
    }
    if !args.throttle_methods.is_empty() {
        config.http_methods = args.throttle_methods.clone();
    }
    if !args.include.is_empty() {
        config.include_prefixes = args.include.clone();
    }
    if !args.exclude.is_empty() {
        config.exclude_prefixes = args.exclude.clone();
    }
    if args.no_overqueue {
        config.allow_overqueue = false;
    }

    config.validate()?;
    Ok(config)
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling waiting requests");
        }
        _ = terminate => {
            info!("Received SIGTERM, cancelling waiting requests");
        }
    }
}
