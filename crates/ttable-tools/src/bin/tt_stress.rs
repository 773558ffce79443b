use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::info;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::Deserialize;
use ttable::search_signal::SearchSignal;
use ttable::{Bound, Move, TranspositionTable, TtOptions, Value};

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-threaded stress run for the shared transposition table")]
struct Cli {
    /// 設定ファイル（TOML、[tt] セクションに hash_mb / threads / large_pages）
    #[arg(long)]
    config: Option<PathBuf>,

    /// Hash (MiB)。設定ファイルより優先
    #[arg(long)]
    hash_mb: Option<usize>,

    /// Threads。設定ファイルより優先
    #[arg(long)]
    threads: Option<usize>,

    /// Large Pages を試すか。設定ファイルより優先
    #[arg(long, action = clap::ArgAction::Set)]
    large_pages: Option<bool>,

    /// 探索回数（1回ごとに世代を進める）
    #[arg(long, default_value_t = 8)]
    searches: u32,

    /// 1探索・1スレッドあたりの probe 回数
    #[arg(long, default_value_t = 200_000)]
    probes: u64,

    /// 局面の種類数（小さいほどヒット率が上がる）
    #[arg(long, default_value_t = 1 << 20)]
    positions: u64,

    /// 乱数シード
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// 全探索の後にこのサイズへ resize して再度実行する
    #[arg(long)]
    resize_mb: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    tt: TtOptions,
}

fn load_options(cli: &Cli) -> Result<TtOptions> {
    let mut opts = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<FileConfig>(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?
                .tt
        }
        None => TtOptions::default(),
    };

    if let Some(hash_mb) = cli.hash_mb {
        opts.hash_mb = hash_mb;
    }
    if let Some(threads) = cli.threads {
        opts.threads = threads;
    }
    if let Some(large_pages) = cli.large_pages {
        opts.large_pages = large_pages;
    }
    opts.validate().context("invalid transposition table options")?;
    Ok(opts)
}

/// 局面番号から 64bit キーを作る（splitmix64）
fn fingerprint(position: u64) -> u64 {
    let mut z = position.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[derive(Default)]
struct Counters {
    probes: AtomicU64,
    hits: AtomicU64,
}

/// 1回の探索を模して、全スレッドで probe / write を繰り返す
fn run_search(
    tt: &TranspositionTable,
    signal: &SearchSignal,
    cli: &Cli,
    threads: usize,
    search: u32,
) {
    tt.new_search();
    let counters = Counters::default();
    let start = Instant::now();

    std::thread::scope(|s| {
        for t in 0..threads {
            let counters = &counters;
            s.spawn(move || {
                let _guard = signal.begin();
                let stream = (search as u64) * threads as u64 + t as u64;
                let mut rng = Xoshiro256PlusPlus::seed_from_u64(cli.seed ^ fingerprint(stream));
                let mut hits = 0;

                for _ in 0..cli.probes {
                    let position = rng.random_range(0..cli.positions);
                    let key = fingerprint(position);
                    tt.prefetch(key);

                    let probe = tt.probe(key);
                    if probe.found {
                        hits += 1;
                    }

                    let depth = rng.random_range(0..32);
                    let bound = match rng.random_range(0..8) {
                        0 => Bound::Exact,
                        1..=3 => Bound::Lower,
                        _ => Bound::Upper,
                    };
                    let mv = if rng.random_bool(0.7) {
                        Move::from_u16(rng.random_range(1..u16::MAX))
                    } else {
                        Move::NONE
                    };
                    probe.write(
                        key,
                        Value::new(rng.random_range(-2000..2000)),
                        bound == Bound::Exact,
                        bound,
                        depth,
                        mv,
                        Value::new(rng.random_range(-2000..2000)),
                    );
                }

                counters.probes.fetch_add(cli.probes, Ordering::Relaxed);
                counters.hits.fetch_add(hits, Ordering::Relaxed);
            });
        }
    });

    let probes = counters.probes.load(Ordering::Relaxed);
    let hits = counters.hits.load(Ordering::Relaxed);
    let elapsed = start.elapsed();
    info!(
        "search {search}: generation={} probes={probes} hit_rate={:.1}% hashfull={} elapsed={:.3}s ({:.1} Mprobe/s)",
        tt.generation(),
        100.0 * hits as f64 / probes.max(1) as f64,
        tt.hashfull(),
        elapsed.as_secs_f64(),
        probes as f64 / elapsed.as_secs_f64().max(1e-9) / 1e6,
    );
}

fn run_all(tt: &TranspositionTable, signal: &SearchSignal, cli: &Cli, threads: usize) {
    for search in 0..cli.searches {
        run_search(tt, signal, cli, threads, search);
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    if cli.positions == 0 {
        bail!("--positions must be >= 1");
    }
    let opts = load_options(&cli)?;
    info!(
        "options: hash={} MiB threads={} large_pages={}",
        opts.hash_mb, opts.threads, opts.large_pages
    );

    let signal = Arc::new(SearchSignal::new());
    let mut tt = TranspositionTable::new(opts).with_search_barrier(signal.clone());
    info!(
        "allocated {} clusters, large pages in use: {}",
        tt.cluster_count(),
        tt.uses_large_pages()
    );

    run_all(&tt, &signal, &cli, opts.threads);

    if let Some(resize_mb) = cli.resize_mb {
        tt.resize(resize_mb);
        info!(
            "resized to {} MiB ({} clusters), hashfull={}",
            tt.hash_mb(),
            tt.cluster_count(),
            tt.hashfull()
        );
        run_all(&tt, &signal, &cli, opts.threads);
    }

    tt.clear();
    info!("cleared, hashfull={}", tt.hashfull());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_spreads_tags() {
        let tags: std::collections::HashSet<u16> =
            (0..1000).map(|p| (fingerprint(p) >> 48) as u16).collect();
        assert!(tags.len() > 950);
    }

    #[test]
    fn test_file_config_parses_partial_tt_section() {
        let cfg: FileConfig = toml::from_str("[tt]\nhash_mb = 64\n").unwrap();
        assert_eq!(cfg.tt.hash_mb, 64);
        assert_eq!(cfg.tt.threads, 1);
        assert!(!cfg.tt.large_pages);
    }

    #[test]
    fn test_cli_overrides_options() {
        let cli = Cli::parse_from([
            "tt-stress",
            "--hash-mb",
            "32",
            "--threads",
            "3",
            "--large-pages",
            "true",
        ]);
        let opts = load_options(&cli).unwrap();
        assert_eq!(
            opts,
            TtOptions {
                hash_mb: 32,
                threads: 3,
                large_pages: true,
            }
        );
    }

    #[test]
    fn test_invalid_threads_rejected() {
        let cli = Cli::parse_from(["tt-stress", "--threads", "0"]);
        assert!(load_options(&cli).is_err());
    }
}
