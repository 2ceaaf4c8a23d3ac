//! Concurrent insert benchmark for `BLinkTree`.
//!
//! Partitions the dense key range `0..count` round-robin into one shuffled
//! sequence per thread, inserts all sequences concurrently, verifies the
//! result with `check(1)`, and reports the average wall time over `rounds`.
//!
//! Run with:
//! ```bash
//! cargo run --release -- <threads> <count> [rounds]
//!
//! # Different shuffle seed
//! BLINKTREE_SEED=7 cargo run --release -- 8 1000000
//!
//! # With protocol logging
//! RUST_LOG=blinktree=debug cargo run --release --features tracing -- 4 100000 1
//! ```

use std::env;
use std::fmt as StdFmt;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use blinktree::{BLinkTree, StatsSnapshot};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;

const DEFAULT_ROUNDS: u32 = 100;
const SEED_VAR: &str = "BLINKTREE_SEED";

// =============================================================================
// Arguments
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum ArgsError {
    /// Wrong number of positional arguments.
    Usage,

    /// An argument is not a positive integer.
    Invalid { name: &'static str, value: String },

    /// More threads than the machine can run in parallel.
    TooManyThreads { requested: usize, limit: usize },
}

impl StdFmt::Display for ArgsError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::Usage => write!(f, "usage: blinktree <threads> <count> [rounds]"),

            Self::Invalid { name, value } => {
                write!(f, "{name} must be a positive integer, got {value:?}")
            }

            Self::TooManyThreads { requested, limit } => {
                write!(f, "too many threads: {requested} (limit: {limit})")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

#[derive(Debug, Clone, Copy)]
struct BenchConfig {
    threads: usize,
    count: u64,
    rounds: u32,
    seed: u64,
}

fn parse_positive<T: std::str::FromStr + PartialOrd + Default>(
    name: &'static str,
    value: &str,
) -> Result<T, ArgsError> {
    value
        .parse::<T>()
        .ok()
        .filter(|parsed| *parsed > T::default())
        .ok_or_else(|| ArgsError::Invalid {
            name,
            value: value.to_string(),
        })
}

impl BenchConfig {
    fn from_args(args: &[String]) -> Result<Self, ArgsError> {
        let (threads, count, rounds) = match args {
            [threads, count] => (threads, count, None),
            [threads, count, rounds] => (threads, count, Some(rounds)),
            _ => return Err(ArgsError::Usage),
        };

        let threads: usize = parse_positive("threads", threads)?;
        let count: u64 = parse_positive("count", count)?;
        let rounds: u32 = rounds.map_or(Ok(DEFAULT_ROUNDS), |r| parse_positive("rounds", r))?;

        let limit: usize = thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        if threads > limit {
            return Err(ArgsError::TooManyThreads {
                requested: threads,
                limit,
            });
        }

        let seed: u64 = env::var(SEED_VAR)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        Ok(Self {
            threads,
            count,
            rounds,
            seed,
        })
    }
}

// =============================================================================
// Benchmark
// =============================================================================

/// Key `i` goes to partition `i % threads`; each partition is then shuffled.
fn partition_keys(threads: usize, count: u64, seed: u64) -> Vec<Vec<u64>> {
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

struct RoundResult {
    elapsed: Duration,
    valid: bool,
    stats: StatsSnapshot,
}

fn run_round(partitions: &[Vec<u64>]) -> RoundResult {
    let tree: BLinkTree<u64> = BLinkTree::new();

    let start = Instant::now();
    thread::scope(|s| {
        for partition in partitions {
            let tree = &tree;
            s.spawn(move || {
                for &key in partition {
                    tree.insert(key, key);
                }
            });
        }
    });
    let elapsed = start.elapsed();

    RoundResult {
        elapsed,
        valid: tree.check(1),
        stats: tree.stats().snapshot(),
    }
}

#[cfg(feature = "tracing")]
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(not(feature = "tracing"))]
const fn init_tracing() {}

fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = match BenchConfig::from_args(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let partitions = partition_keys(config.threads, config.count, config.seed);
    let mut total = Duration::ZERO;
    let mut last_stats = StatsSnapshot::default();

    for round in 0..config.rounds {
        let result = run_round(&partitions);
        if !result.valid {
            eprintln!("round {round}: invariant check failed");
            return ExitCode::FAILURE;
        }

        total += result.elapsed;
        last_stats = result.stats;
    }

    let average = total / config.rounds;
    println!(
        "threads: {}, keys: {}, rounds: {}, average: {:.3} ms",
        config.threads,
        config.count,
        config.rounds,
        average.as_secs_f64() * 1_000.0
    );
    println!("last round: {last_stats}");

    ExitCode::SUCCESS
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Fail fast in tests")]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_parse_two_and_three_args() {
        let config = BenchConfig::from_args(&args(&["1", "1000"])).unwrap();
        assert_eq!(config.threads, 1);
        assert_eq!(config.count, 1000);
        assert_eq!(config.rounds, DEFAULT_ROUNDS);

        let config = BenchConfig::from_args(&args(&["1", "10", "3"])).unwrap();
        assert_eq!(config.rounds, 3);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(BenchConfig::from_args(&args(&["1"])).unwrap_err(), ArgsError::Usage);
        assert!(matches!(
            BenchConfig::from_args(&args(&["0", "10"])),
            Err(ArgsError::Invalid { name: "threads", .. })
        ));
        assert!(matches!(
            BenchConfig::from_args(&args(&["1", "ten"])),
            Err(ArgsError::Invalid { name: "count", .. })
        ));
        assert!(matches!(
            BenchConfig::from_args(&args(&["100000", "10"])),
            Err(ArgsError::TooManyThreads { .. })
        ));
    }

    #[test]
    fn test_partitions_cover_range_once() {
        let partitions = partition_keys(3, 100, 0);
        assert_eq!(partitions.iter().map(Vec::len).collect::<Vec<_>>(), vec![34, 33, 33]);

        let mut all: Vec<u64> = partitions.concat();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<u64>>());
        assert!(partitions[1].iter().all(|k| k % 3 == 1));
    }

    #[test]
    fn test_round_is_valid() {
        let partitions = partition_keys(2, 5_000, 1);
        let result = run_round(&partitions);
        assert!(result.valid);
        assert!(result.stats.total_splits() > 0);
    }
}
