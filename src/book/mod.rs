//! Order-book models.
//!
//! Two reconstructions of the same MBO stream: a single-venue book with
//! pool-backed FIFO levels, and a per-publisher aggregated book used for
//! the replay-level JSON document.

mod aggregate;
mod venue;

pub use aggregate::{AggregateStats, AggregatedBook, BboLevel, PublisherBook};
pub use venue::{BboSnapshot, VenueBook, VenueStats};
