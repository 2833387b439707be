//! Replay CLI: reconstruct the aggregated order book from a DBN file.
//!
//! Resolves the input per [`EngineConfig`] precedence (`DBN_FILE` env var,
//! positional argument, `*.dbn` autodiscovery), replays the full file into
//! an [`AggregatedBook`], persists `aggregated_orderbook.json` with
//! unbounded levels, and prints run metrics.
//!
//! # Usage
//!
//! ```bash
//! cargo run --release --bin replay -- data/xnas-itch.mbo.dbn.zst
//!
//! # Or via environment:
//! DBN_FILE=data/xnas-itch.mbo.dbn.zst cargo run --release --bin replay
//! QUIET_METRICS=1 cargo run --release --bin replay
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use mbo_book_engine::{AggregatedBook, DbnFileSource, EngineConfig, Metrics, Replayer};

const OUTPUT_PATH: &str = "aggregated_orderbook.json";

fn main() -> ExitCode {
    env_logger::init();

    let config = EngineConfig::from_env(std::env::args().skip(1));
    let Some(dbn_file) = config.dbn_file.clone() else {
        eprintln!("No .dbn file provided or found in the working directory.");
        eprintln!("Usage: replay <file.dbn[.zst]>   (or set DBN_FILE)");
        return ExitCode::FAILURE;
    };

    match run(&config, &dbn_file) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Replay failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &EngineConfig, dbn_file: &std::path::Path) -> mbo_book_engine::Result<()> {
    log::info!("replaying {}", dbn_file.display());

    let mut source = DbnFileSource::new(dbn_file)?.skip_invalid(true);
    let mut book = AggregatedBook::new();
    let replayer = Replayer::new(Arc::new(Metrics::new()));

    let summary = replayer.replay(&mut source, &mut book, None)?;
    log::info!(
        "replay finished: {} records, {} skipped",
        summary.processed,
        source.skipped()
    );

    book.save_json(OUTPUT_PATH, 0)?;
    println!("Aggregated order book written to {OUTPUT_PATH}");

    if !config.quiet_metrics {
        print_metrics(&replayer, config.p99_warn_ns);
    }

    Ok(())
}

fn print_metrics(replayer: &Replayer, warn_threshold_ns: u64) {
    let m = replayer.metrics();
    println!("\n=== Performance Metrics ===");
    println!(
        "total_messages: {}",
        m.total_messages.load(std::sync::atomic::Ordering::Relaxed)
    );
    println!(
        "throughput: {:.2} K msg/sec",
        m.throughput_msg_per_sec() / 1000.0
    );
    println!("p50 latency: {:.3} µs", m.p50() / 1000.0);
    println!("p95 latency: {:.3} µs", m.p95() / 1000.0);
    println!("p99 latency: {:.3} µs", m.p99() / 1000.0);

    if m.p99_exceeds(warn_threshold_ns) {
        eprintln!(
            "[WARN] p99 latency {} ns exceeded threshold {} ns",
            m.p99(),
            warn_threshold_ns
        );
    }
}
