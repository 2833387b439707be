//! Single-pass replay driver.
//!
//! Pulls records lazily from a [`RecordSource`], dispatches each into a
//! book model, and accounts per-message latency to the metrics sink. The
//! driver runs synchronously on one worker; a stop token is polled between
//! events, so an in-flight event always completes and the next one is not
//! started.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::book::{AggregatedBook, VenueBook};
use crate::error::{BookError, Result};
use crate::metrics::Metrics;
use crate::source::RecordSource;
use crate::types::MboRecord;

/// Process-wide cooperative stop flag.
///
/// The driver owns one; a signal observer may hold a clone and set it. The
/// signal path never touches book state.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    /// Create an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Idempotent.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Seam between the replay driver and the two book models.
pub trait ApplyMbo {
    /// Apply one record, surfacing only structural faults.
    fn apply_record(&mut self, rec: &MboRecord) -> Result<()>;
}

impl ApplyMbo for VenueBook {
    fn apply_record(&mut self, rec: &MboRecord) -> Result<()> {
        self.apply(rec).map(|_| ())
    }
}

impl ApplyMbo for AggregatedBook {
    fn apply_record(&mut self, rec: &MboRecord) -> Result<()> {
        self.apply(rec);
        Ok(())
    }
}

/// Outcome of a completed (or cooperatively stopped) replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Records dispatched to the book
    pub processed: u64,
    /// Whether the stop token ended the run
    pub stopped: bool,
}

/// Replay driver: one worker, one source, one book model.
pub struct Replayer {
    metrics: Arc<Metrics>,
    stop: StopToken,
}

impl Replayer {
    /// Create a driver writing to the given metrics sink.
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics,
            stop: StopToken::new(),
        }
    }

    /// A clone of the driver's stop token, for the signal observer.
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    /// The metrics sink this driver writes to.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Replay `source` into `book`, halting at `max_events` when given.
    ///
    /// Every exit path stamps `replay_duration_ns`. A source-reported
    /// structural failure or a book fault updates the error counters and
    /// `last_error` before returning, so observers always see the cause.
    pub fn replay<S, B>(
        &self,
        source: &mut S,
        book: &mut B,
        max_events: Option<u64>,
    ) -> Result<ReplaySummary>
    where
        S: RecordSource,
        B: ApplyMbo,
    {
        let run_start = Instant::now();
        let mut processed = 0u64;
        let mut stopped = false;

        let outcome = loop {
            if self.stop.is_stopped() {
                stopped = true;
                break Ok(());
            }

            let rec = match source.next_record() {
                None => break Ok(()),
                Some(Ok(rec)) => rec,
                Some(Err(e)) => break Err(e),
            };

            let t0 = Instant::now();
            if let Err(e) = book.apply_record(&rec) {
                break Err(e);
            }
            let latency_ns = t0.elapsed().as_nanos() as u64;

            self.metrics.record_latency(latency_ns);
            self.metrics.total_messages.fetch_add(1, Ordering::Relaxed);
            processed += 1;

            if max_events.is_some_and(|max| processed >= max) {
                break Ok(());
            }
        };

        self.metrics
            .set_replay_duration_ns(run_start.elapsed().as_nanos() as u64);

        match outcome {
            Ok(()) => Ok(ReplaySummary { processed, stopped }),
            Err(e) => {
                if matches!(e, BookError::Decode(_)) {
                    self.metrics.decode_errors.fetch_add(1, Ordering::Relaxed);
                }
                self.metrics.replay_errors.fetch_add(1, Ordering::Relaxed);
                self.metrics.set_last_error(e.to_string());
                log::error!("replay halted after {processed} records: {e}");
                Err(e)
            }
        }
    }
}
