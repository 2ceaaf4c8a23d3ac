//! Common test utilities: tracing setup and dense-key helpers.
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//!
//! #[test]
//! fn my_test() {
//!     common::init_tracing();
//!     // ... test code
//! }
//! ```
//!
//! # Configuration
//!
//! Environment variables:
//! - `RUST_LOG`: Filter directives (e.g., `blinktree=debug,blinktree::tree=trace`)
//! - `BLINKTREE_LOG_DIR`: Log directory (default: `logs/`)
//! - `BLINKTREE_LOG_CONSOLE`: Set to "0" to disable console output
//!
//! The library only emits events when built with `--features tracing`.
//!
//! # Log Files
//!
//! Logs are written to `logs/blinktree.jsonl` as newline-delimited JSON.
//!
//! ```bash
//! # Root growth events only
//! cat logs/blinktree.jsonl | jq 'select(.fields.message == "root grown")'
//! ```

#![allow(dead_code)]

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Once;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Ensures tracing is only initialized once per test binary.
static INIT: Once = Once::new();

/// Initialize the tracing subscriber with file and console logging.
///
/// Safe to call multiple times; only the first call takes effect.
pub fn init_tracing() {
    INIT.call_once(setup_tracing);
}

/// Configuration for tracing setup.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Directory for log files.
    pub log_dir: PathBuf,
    /// Log file name.
    pub log_file: String,
    /// Enable console output.
    pub console_enabled: bool,
    /// Default log level if `RUST_LOG` is not set.
    pub default_level: Level,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            log_file: "blinktree.jsonl".to_string(),
            console_enabled: true,
            default_level: Level::WARN,
        }
    }
}

impl TracingConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = env::var("BLINKTREE_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        if env::var("BLINKTREE_LOG_CONSOLE").is_ok_and(|v| v == "0") {
            config.console_enabled = false;
        }

        config
    }
}

fn make_filter(default_level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("{default_level}")))
}

#[expect(clippy::expect_used)]
fn setup_tracing() {
    let config = TracingConfig::from_env();

    std::fs::create_dir_all(&config.log_dir).expect("Failed to create log directory");

    // Append: each test binary is its own process.
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_dir.join(&config.log_file))
        .expect("Failed to open log file");

    let console_layer = config.console_enabled.then(|| {
        tracing_subscriber::fmt::layer()
            .with_thread_ids(true)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .compact()
            .with_filter(make_filter(config.default_level))
    });

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::sync::Mutex::new(file))
        .with_thread_ids(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .json()
        .with_filter(make_filter(config.default_level));

    let _ = Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

// ============================================================================
//  Key helpers
// ============================================================================

/// Split `0..count` round-robin across `threads` partitions and shuffle each.
pub fn shuffled_partitions(threads: usize, count: u64, seed: u64) -> Vec<Vec<u64>> {
    let mut partitions: Vec<Vec<u64>> = vec![Vec::new(); threads];
    for (key, slot) in (0..count).zip((0..threads).cycle()) {
        partitions[slot].push(key);
    }

    let mut rng = SmallRng::seed_from_u64(seed);
    for partition in &mut partitions {
        partition.shuffle(&mut rng);
    }

    partitions
}
