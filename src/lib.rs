//! # MBO Book Engine
//!
//! Order-book reconstruction from Market-By-Order (MBO) event streams.
//!
//! A single-pass replay converts an ordered stream of MBO events into two
//! book models and exposes the state and run metrics as JSON:
//!
//! - **Single-venue book**: price-ordered levels with per-level FIFO order
//!   queues backed by a fixed node pool, O(1) order lookup, and
//!   best-bid/offer snapshots after every event.
//! - **Aggregated book**: per-publisher books per instrument with partial
//!   cancels, priority-aware modifies, side clears, and cross-publisher
//!   BBO synthesis.
//!
//! ## Quick Start
//!
//! ```rust
//! use mbo_book_engine::{Action, MboRecord, Side, VenueBook};
//!
//! let mut book = VenueBook::new();
//!
//! let rec = MboRecord::new(
//!     1001,                 // order_id
//!     Action::Add,          // action
//!     Side::Bid,            // side
//!     100_000_000_000,      // price ($100.00 fixed-point, 1e9 scale)
//!     100,                  // size
//! );
//!
//! let snapshot = book.apply(&rec).unwrap();
//! assert_eq!(snapshot.best_bid, 100_000_000_000);
//! assert_eq!(snapshot.bid_size, 100);
//! ```
//!
//! ## Replaying a DBN file
//!
//! ```ignore
//! use std::sync::Arc;
//! use mbo_book_engine::{AggregatedBook, DbnFileSource, Metrics, Replayer};
//!
//! let mut source = DbnFileSource::new("data/xnas-itch.mbo.dbn.zst")?.skip_invalid(true);
//! let mut book = AggregatedBook::new();
//!
//! let replayer = Replayer::new(Arc::new(Metrics::new()));
//! let summary = replayer.replay(&mut source, &mut book, None)?;
//!
//! book.save_json("aggregated_orderbook.json", 0)?;
//! println!("replayed {} records", summary.processed);
//! println!("p99 latency: {} ns", replayer.metrics().p99());
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Record model: `MboRecord`, `Action`, `Side`, `RecordFlags` |
//! | [`pool`] | Fixed-capacity order-node pool |
//! | [`book`] | Book models: `VenueBook`, `AggregatedBook` |
//! | [`metrics`] | Latency percentiles, counters, throughput |
//! | [`replay`] | Replay driver and stop token |
//! | [`source`] | Record sources (requires `databento` for DBN files) |
//! | [`config`] | Environment configuration |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `databento` | ✅ | DBN file decoding via the `dbn` crate |

pub mod book;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod replay;
pub mod source;
pub mod types;

#[cfg(feature = "databento")]
pub mod dbn_bridge;

// Re-exports - Core types
pub use error::{BookError, Result};
pub use types::{Action, MboRecord, RecordFlags, Side, UNDEF_PRICE};

// Re-exports - Book models
pub use book::{AggregateStats, AggregatedBook, BboLevel, BboSnapshot, PublisherBook, VenueBook, VenueStats};

// Re-exports - Pool
pub use pool::{NodeIdx, NodePool};

// Re-exports - Replay
pub use replay::{ApplyMbo, Replayer, ReplaySummary, StopToken};

// Re-exports - Metrics
pub use metrics::{Metrics, MetricsSnapshot};

// Re-exports - Sources and configuration
pub use config::EngineConfig;
pub use source::{RecordSource, VecSource};

#[cfg(feature = "databento")]
pub use source::DbnFileSource;
