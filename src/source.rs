//! Record source abstraction for replay ingestion.
//!
//! The engine never parses wire formats itself; it pulls normalized
//! [`MboRecord`]s from a [`RecordSource`]. This keeps the book models
//! testable against in-memory data and fences the Databento decoder behind
//! the `databento` feature.

use crate::error::Result;
use crate::types::MboRecord;

#[cfg(feature = "databento")]
use crate::dbn_bridge;
#[cfg(feature = "databento")]
use crate::error::BookError;
#[cfg(feature = "databento")]
use dbn::decode::DecodeRecordRef;
#[cfg(feature = "databento")]
use std::fs::File;
#[cfg(feature = "databento")]
use std::io::BufReader;
#[cfg(feature = "databento")]
use std::path::{Path, PathBuf};

/// A pull-based stream of normalized MBO records.
///
/// `None` signals end of stream. `Some(Err(_))` signals a structural
/// failure; the replay driver accounts for it and halts.
pub trait RecordSource {
    /// Pull the next record.
    fn next_record(&mut self) -> Option<Result<MboRecord>>;
}

/// In-memory source for tests and benchmarks.
pub struct VecSource {
    records: std::vec::IntoIter<MboRecord>,
    trailing_error: Option<crate::error::BookError>,
}

impl VecSource {
    /// Source yielding the given records in order.
    pub fn new(records: Vec<MboRecord>) -> Self {
        Self {
            records: records.into_iter(),
            trailing_error: None,
        }
    }

    /// Yield the records, then surface `err` instead of end-of-stream.
    pub fn with_error(mut self, err: crate::error::BookError) -> Self {
        self.trailing_error = Some(err);
        self
    }
}

impl RecordSource for VecSource {
    fn next_record(&mut self) -> Option<Result<MboRecord>> {
        match self.records.next() {
            Some(rec) => Some(Ok(rec)),
            None => self.trailing_error.take().map(Err),
        }
    }
}

// ============================================================================
// Databento DBN file source (feature-gated)
// ============================================================================

/// I/O buffer size for file reading.
///
/// Default `BufReader` uses 8KB; a larger buffer reduces syscall overhead
/// when streaming large MBO files.
#[cfg(feature = "databento")]
pub const IO_BUFFER_SIZE: usize = 1024 * 1024; // 1 MB

#[cfg(feature = "databento")]
type DbnFileDecoder =
    dbn::decode::dbn::Decoder<zstd::stream::read::Decoder<'static, BufReader<File>>>;

/// Streaming source over a DBN file (`.dbn` or `.dbn.zst`).
///
/// Non-MBO records in the stream are skipped. With `skip_invalid`, records
/// that fail conversion are logged and skipped instead of halting the
/// replay; decoder-level failures always halt.
#[cfg(feature = "databento")]
pub struct DbnFileSource {
    decoder: DbnFileDecoder,
    path: PathBuf,
    skip_invalid: bool,
    /// Records skipped due to conversion failures
    skipped: u64,
}

#[cfg(feature = "databento")]
impl DbnFileSource {
    /// Open a DBN file. The zstd decoder handles both compressed and
    /// uncompressed input.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .map_err(|e| BookError::Decode(format!("failed to open {}: {e}", path.display())))?;
        let reader = BufReader::with_capacity(IO_BUFFER_SIZE, file);
        let decoder = dbn::decode::dbn::Decoder::with_zstd_buffer(reader)
            .map_err(|e| BookError::Decode(format!("failed to create decoder: {e}")))?;

        Ok(Self {
            decoder,
            path,
            skip_invalid: false,
            skipped: 0,
        })
    }

    /// Skip records that fail conversion instead of halting.
    pub fn skip_invalid(mut self, skip: bool) -> Self {
        self.skip_invalid = skip;
        self
    }

    /// The file being read.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records skipped due to conversion failures so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

#[cfg(feature = "databento")]
impl RecordSource for DbnFileSource {
    fn next_record(&mut self) -> Option<Result<MboRecord>> {
        loop {
            let rec_ref = match self.decoder.decode_record_ref() {
                Ok(Some(rec_ref)) => rec_ref,
                Ok(None) => return None,
                Err(e) => {
                    return Some(Err(BookError::Decode(format!(
                        "DBN decode failed in {}: {e}",
                        self.path.display()
                    ))));
                }
            };

            // Only MBO records feed the books; heartbeats, status and other
            // rtypes are passed over.
            let Some(mbo) = rec_ref.get::<dbn::MboMsg>() else {
                continue;
            };

            match dbn_bridge::to_record(mbo) {
                Ok(rec) => return Some(Ok(rec)),
                Err(e) if self.skip_invalid => {
                    self.skipped += 1;
                    log::warn!("skipping invalid MBO record (order_id={}): {e}", mbo.order_id);
                    continue;
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
