//! cacheflow server
//!
//! Serves a tiered cache of JSON values over RESP. Cache settings come from
//! the environment (see [`cacheflow::config`]); the listen address from the
//! command line.

use anyhow::Context;
use cacheflow::config::CacheConfig;
use cacheflow::connection::{serve, ConnectionStats};
use cacheflow::TieredCache;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Server configuration
struct Config {
    host: String,
    port: u16,
}

impl Default for Config {
    fn default() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(cacheflow::DEFAULT_PORT);

        Self {
            host: cacheflow::DEFAULT_HOST.to_string(),
            port,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let mut args = std::env::args().skip(1);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--host" | "-h" => match args.next() {
                    Some(host) => config.host = host,
                    None => exit_with("--host requires a value"),
                },
                "--port" | "-p" => match args.next().map(|p| p.parse()) {
                    Some(Ok(port)) => config.port = port,
                    Some(Err(_)) => exit_with("invalid port number"),
                    None => exit_with("--port requires a value"),
                },
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("cacheflow version {}", cacheflow::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {}", other);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn exit_with(message: &str) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn print_help() {
    println!(
        r#"
cacheflow - A two-tier cache with a shared remote tier and a local fallback

USAGE:
    cacheflow [OPTIONS]

OPTIONS:
    -h, --host <HOST>    Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>    Port to listen on (default: 6380, or $PORT)
    -v, --version        Print version information
        --help           Print this help message

ENVIRONMENT:
    REMOTE_ENABLED       "true" to use a remote tier (default: off)
    REMOTE_URL           redis://[user:pass@]host[:port][/db]
    DEFAULT_TTL          TTL in seconds when none is given (default: 3600)
    SWEEPER_ENABLED      "false" to disable local expiry sweeps
    SWEEPER_SCHEDULE     cron expression or "@every 30s" (default: */1 * * * *)
    RUST_LOG / LOG_LEVEL log filter (default: info)

EXAMPLES:
    cacheflow --port 7000
    REMOTE_ENABLED=true REMOTE_URL=redis://cache:6379 cacheflow
    $ redis-cli -p 6380 SET user:1 '{{"name":"Ada"}}' EX 60
"#
    );
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            EnvFilter::try_new(std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()))
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();
    init_logging();

    let cache_config = CacheConfig::from_env().context("reading cache configuration")?;
    cache_config.log_summary();

    let cache = Arc::new(
        TieredCache::new(cache_config)
            .await
            .context("initializing cache")?,
    );
    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("binding {}", config.bind_address()))?;
    info!(
        version = cacheflow::VERSION,
        address = %config.bind_address(),
        mode = %cache.mode(),
        "cacheflow ready"
    );

    tokio::select! {
        _ = serve(listener, Arc::clone(&cache), stats) => {}
        result = signal::ctrl_c() => {
            result.context("installing Ctrl+C handler")?;
            info!("Shutdown signal received");
        }
    }

    cache.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}
