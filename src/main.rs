use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use daq_log::{RetryPolicy, SyncPolicy, TelemetryLogger, DEFAULT_PORT};

mod args;

use args::Args;

fn split_source(source: &str) -> Result<(String, u16), String> {
    match source.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| format!("invalid port: {}", port))?;
            Ok((host.to_owned(), port))
        }
        None => Ok((source.to_owned(), DEFAULT_PORT)),
    }
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let (host, port) = match split_source(&args.source) {
        Ok(pair) => pair,
        Err(message) => {
            eprintln!("{}", message);
            std::process::exit(2);
        }
    };
    let mut logger = TelemetryLogger::new(host, port, &args.output);
    if let Some(secs) = args.timeout {
        let timeout = Duration::from_secs(secs);
        logger = logger
            .with_connect_timeout(timeout)
            .with_read_timeout(timeout);
    }
    if args.keep_open {
        logger = logger.with_sync_policy(SyncPolicy::KeepOpen);
    }
    let retry = RetryPolicy {
        max_retries: args.max_retries,
        ..RetryPolicy::default()
    };
    match logger.run_supervised(args.samples, &retry) {
        Ok(stats) => info!(
            received = stats.received,
            logged = stats.logged,
            dropped = stats.dropped,
            "acquisition finished"
        ),
        Err(error) => {
            error!(?error, "acquisition failed");
            std::process::exit(1);
        }
    }
}
