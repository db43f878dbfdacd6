//! kvcache CLI
//!
//! Runs one cache operation against a persistent store file.
//!
//! ```text
//! kvcache --db cache.db set greeting hello --ttl-secs 3600
//! kvcache --db cache.db get greeting
//! kvcache --db cache.db purge
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{debug, error, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kvcache::{Cache, CacheValue, Codec, Error, JsonSerializer, Result, SqliteCache, SqliteCacheConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// kvcache - inspect and edit a persistent TTL cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Cache database file
    #[arg(long, env = "KVCACHE_DB", default_value = "kvcache.db")]
    db: PathBuf,

    /// Treat stored values as JSON documents
    #[arg(long, env = "KVCACHE_JSON")]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the value stored under a key
    Get { key: String },

    /// Store a value
    Set {
        key: String,
        value: String,
        /// Time to live in seconds, 0 for never
        #[arg(long, default_value = "0")]
        ttl_secs: u64,
    },

    /// Remove a key
    Del { key: String },

    /// Exit with success if the key holds a live value
    Has { key: String },

    /// Remove every expired entry now
    Purge,

    /// Print the number of stored rows
    Stats,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(&args);

    match run(args).await {
        Ok(code) => code,
        Err(Error::NotFound { key }) => {
            eprintln!("key not found: {}", key);
            ExitCode::from(1)
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    if let Some(parent) = args.db.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let codec = if args.json {
        Codec::with_serializer(JsonSerializer)
    } else {
        Codec::Raw
    };

    let config = SqliteCacheConfig {
        name: "cli".to_string(),
        ..SqliteCacheConfig::new(&args.db)
    };
    debug!(path = %args.db.display(), json = args.json, "Opening cache");
    let cache = SqliteCache::open_with(config, codec).await?;

    let result = execute(&cache, args.command, args.json).await;
    cache.close().await;

    Ok(if result? {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

/// Run `command`; `false` means the key was absent
async fn execute(cache: &SqliteCache, command: Command, json: bool) -> Result<bool> {
    match command {
        Command::Get { key } => {
            let value = cache.get(&key).await?;
            println!("{}", render(&value));
        }
        Command::Set {
            key,
            value,
            ttl_secs,
        } => {
            let value = if json {
                serde_json::from_str(&value)
                    .map(CacheValue::Json)
                    .map_err(|e| Error::serialization(&key, e))?
            } else {
                CacheValue::Text(value)
            };
            cache.set(&key, value, Duration::from_secs(ttl_secs)).await?;
        }
        Command::Del { key } => cache.del(&key).await?,
        Command::Has { key } => {
            let live = cache.has(&key).await?;
            println!("{}", live);
            return Ok(live);
        }
        Command::Purge => {
            let removed = cache.purge_expired().await?;
            println!("removed {} expired entries", removed);
        }
        Command::Stats => {
            println!("path: {}", cache.path().display());
            println!("rows: {}", cache.len().await?);
        }
    }

    Ok(true)
}

fn render(value: &CacheValue) -> String {
    match value {
        CacheValue::Text(s) => s.clone(),
        CacheValue::Json(v) => v.to_string(),
        CacheValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    if let Ok(directive) = "sqlx=warn".parse() {
        filter = filter.add_directive(directive);
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

// =============================================================================
// Tests
// =============================================================================
