//! Multi-publisher aggregated order book.
//!
//! For each instrument this model keeps one book per publisher, in
//! first-seen order. Level contents are the raw records rather than pool
//! nodes, which keeps the representation cheap to serialize and lets a
//! partial Cancel carry its own size. Trades and fills do not amend resting
//! liquidity here; the model trusts explicit Cancel-with-size events.
//!
//! Priority rules differ from the single-venue book: a same-price Modify
//! that does not increase size updates in place and keeps its queue
//! position.

use ahash::AHashMap;
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::types::{price_to_json, Action, MboRecord, Side, UNDEF_PRICE};

/// One side of a publisher BBO: price (or [`UNDEF_PRICE`]), aggregate size,
/// and the count of orders not flagged as top-of-book echoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BboLevel {
    pub price: i64,
    pub size: u32,
    pub count: u32,
}

impl BboLevel {
    fn undefined() -> Self {
        Self {
            price: UNDEF_PRICE,
            size: 0,
            count: 0,
        }
    }

    /// Whether the price side carries a defined value.
    pub fn is_defined(&self) -> bool {
        self.price != UNDEF_PRICE
    }
}

/// Reference into a publisher book: where an order currently rests.
#[derive(Debug, Clone, Copy)]
struct OrderRef {
    price: i64,
    side: Side,
}

/// All orders at one price, in arrival order.
#[derive(Debug, Clone, Default)]
struct Level {
    orders: Vec<MboRecord>,
}

impl Level {
    /// `(aggregate size, non-TOB order count)` for this level.
    fn summarize(&self) -> (u32, u32) {
        let mut size = 0u32;
        let mut count = 0u32;
        for order in &self.orders {
            size = size.saturating_add(order.size);
            if !order.flags.is_tob() {
                count += 1;
            }
        }
        (size, count)
    }
}

/// Counters for tolerated anomalies.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateStats {
    /// Adds carrying an already-resident order id (ignored)
    pub duplicate_adds: u64,
    /// Cancels whose size exceeded the resting size (clamped to removal)
    pub over_cancels: u64,
    /// Cancels targeting ids with no residency (ignored)
    pub unknown_cancels: u64,
}

/// One publisher's view of one instrument.
pub struct PublisherBook {
    publisher_id: u16,
    bids: BTreeMap<i64, Level>,
    asks: BTreeMap<i64, Level>,
    /// order_id -> current residency; mirrors the level vectors exactly
    by_id: AHashMap<u64, OrderRef>,
}

impl PublisherBook {
    fn new(publisher_id: u16) -> Self {
        Self {
            publisher_id,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            by_id: AHashMap::new(),
        }
    }

    /// The publisher this book belongs to.
    pub fn publisher_id(&self) -> u16 {
        self.publisher_id
    }

    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<i64, Level> {
        if side.is_bid() {
            &mut self.bids
        } else {
            &mut self.asks
        }
    }

    fn add(&mut self, rec: &MboRecord, stats: &mut AggregateStats) {
        if rec.side == Side::None {
            return;
        }
        if self.by_id.contains_key(&rec.order_id) {
            // First add wins; a re-pointed by_id entry would strand the
            // original residency in its level forever.
            stats.duplicate_adds += 1;
            log::debug!("duplicate add ignored: order_id={}", rec.order_id);
            return;
        }
        self.side_mut(rec.side)
            .entry(rec.price)
            .or_default()
            .orders
            .push(*rec);
        self.by_id.insert(
            rec.order_id,
            OrderRef {
                price: rec.price,
                side: rec.side,
            },
        );
    }

    fn cancel(&mut self, rec: &MboRecord, stats: &mut AggregateStats) {
        let order_ref = match self.by_id.get(&rec.order_id) {
            Some(r) => *r,
            None => {
                stats.unknown_cancels += 1;
                log::debug!("cancel for unknown order ignored: order_id={}", rec.order_id);
                return;
            }
        };

        let map = self.side_mut(order_ref.side);
        let Some(level) = map.get_mut(&order_ref.price) else {
            return;
        };
        let Some(pos) = level.orders.iter().position(|o| o.order_id == rec.order_id) else {
            return;
        };

        let resting = &mut level.orders[pos];
        if resting.size > rec.size {
            resting.size -= rec.size;
            return;
        }
        if rec.size > resting.size {
            stats.over_cancels += 1;
        }

        // Cancelled down to zero: drop the order, then the level if drained.
        level.orders.remove(pos);
        let drained = level.orders.is_empty();
        if drained {
            map.remove(&order_ref.price);
        }
        self.by_id.remove(&rec.order_id);
    }

    fn modify(&mut self, rec: &MboRecord, stats: &mut AggregateStats) {
        let order_ref = match self.by_id.get(&rec.order_id) {
            Some(r) => *r,
            None => {
                // Modify-before-Add: treat as a fresh add.
                self.add(rec, stats);
                return;
            }
        };

        if order_ref.price == rec.price {
            let map = self.side_mut(order_ref.side);
            let Some(level) = map.get_mut(&order_ref.price) else {
                return;
            };
            let Some(pos) = level.orders.iter().position(|o| o.order_id == rec.order_id)
            else {
                return;
            };

            if rec.size > level.orders[pos].size {
                // Size up: lose queue position.
                let mut moved = level.orders.remove(pos);
                moved.size = rec.size;
                level.orders.push(moved);
            } else {
                level.orders[pos].size = rec.size;
            }
            return;
        }

        // Price change: pull the resting record out of its old level.
        let old_map = self.side_mut(order_ref.side);
        let Some(level) = old_map.get_mut(&order_ref.price) else {
            return;
        };
        let Some(pos) = level.orders.iter().position(|o| o.order_id == rec.order_id) else {
            return;
        };
        let mut moved = level.orders.remove(pos);
        let drained = level.orders.is_empty();
        if drained {
            old_map.remove(&order_ref.price);
        }

        moved.price = rec.price;
        moved.size = rec.size;
        self.side_mut(rec.side)
            .entry(rec.price)
            .or_default()
            .orders
            .push(moved);
        self.by_id.insert(
            rec.order_id,
            OrderRef {
                price: rec.price,
                side: rec.side,
            },
        );
    }

    fn clear(&mut self, rec: &MboRecord) {
        if rec.side == Side::None {
            return;
        }

        let side = rec.side;
        self.side_mut(side).clear();
        self.by_id.retain(|_, r| r.side != side);

        // A clear record carrying a price re-seeds the side.
        if rec.has_price() {
            self.side_mut(side)
                .entry(rec.price)
                .or_default()
                .orders
                .push(*rec);
            if rec.order_id != 0 {
                self.by_id.insert(
                    rec.order_id,
                    OrderRef {
                        price: rec.price,
                        side,
                    },
                );
            }
        }
    }

    /// Best bid: the highest-keyed bid level.
    pub fn best_bid(&self) -> BboLevel {
        match self.bids.iter().next_back() {
            Some((&price, level)) => {
                let (size, count) = level.summarize();
                BboLevel { price, size, count }
            }
            None => BboLevel::undefined(),
        }
    }

    /// Best ask: the lowest-keyed ask level.
    pub fn best_ask(&self) -> BboLevel {
        match self.asks.iter().next() {
            Some((&price, level)) => {
                let (size, count) = level.summarize();
                BboLevel { price, size, count }
            }
            None => BboLevel::undefined(),
        }
    }

    /// Whether the order id currently rests in this book.
    pub fn contains_order(&self, order_id: u64) -> bool {
        self.by_id.contains_key(&order_id)
    }

    /// Number of tracked orders.
    pub fn order_count(&self) -> usize {
        self.by_id.len()
    }

    /// `(order_id, size)` entries at a price in arrival order.
    pub fn level_orders(&self, side: Side, price: i64) -> Vec<(u64, u32)> {
        let map = if side.is_bid() { &self.bids } else { &self.asks };
        map.get(&price)
            .map(|level| level.orders.iter().map(|o| (o.order_id, o.size)).collect())
            .unwrap_or_default()
    }

    fn to_json(&self, levels: usize) -> Value {
        let bid = self.best_bid();
        let ask = self.best_ask();

        let bids: Vec<Value> = self
            .bids
            .iter()
            .rev()
            .take(if levels == 0 { usize::MAX } else { levels })
            .map(|(&price, level)| level_json(price, level))
            .collect();
        let asks: Vec<Value> = self
            .asks
            .iter()
            .take(if levels == 0 { usize::MAX } else { levels })
            .map(|(&price, level)| level_json(price, level))
            .collect();

        json!({
            "publisher_id": self.publisher_id,
            "bbo": {
                "bid": bbo_json(bid),
                "ask": bbo_json(ask),
            },
            "levels": {
                "bids": bids,
                "asks": asks,
            },
        })
    }
}

fn level_json(price: i64, level: &Level) -> Value {
    let (size, count) = level.summarize();
    json!({
        "price": price_to_json(price),
        "size": size,
        "count": count,
    })
}

fn bbo_json(bbo: BboLevel) -> Value {
    json!({
        "price": price_to_json(bbo.price),
        "size": bbo.size,
        "count": bbo.count,
    })
}

/// Per-instrument state: publisher books in first-seen order.
struct Instrument {
    instrument_id: u32,
    publishers: Vec<PublisherBook>,
}

impl Instrument {
    /// Cross-publisher BBO: best bid is the max over defined publisher best
    /// bids, with size/count summed over the publishers quoting that price;
    /// symmetric (min) for asks.
    fn aggregated_bbo(&self) -> (BboLevel, BboLevel) {
        let mut agg_bid = BboLevel::undefined();
        let mut agg_ask = BboLevel::undefined();

        for pb in &self.publishers {
            let bid = pb.best_bid();
            if bid.is_defined() {
                if !agg_bid.is_defined() || bid.price > agg_bid.price {
                    agg_bid = bid;
                } else if bid.price == agg_bid.price {
                    agg_bid.size += bid.size;
                    agg_bid.count += bid.count;
                }
            }

            let ask = pb.best_ask();
            if ask.is_defined() {
                if !agg_ask.is_defined() || ask.price < agg_ask.price {
                    agg_ask = ask;
                } else if ask.price == agg_ask.price {
                    agg_ask.size += ask.size;
                    agg_ask.count += ask.count;
                }
            }
        }

        (agg_bid, agg_ask)
    }
}

/// Multi-publisher, multi-instrument aggregated book.
pub struct AggregatedBook {
    /// instrument_id -> state; iteration order is first-seen
    instruments: IndexMap<u32, Instrument>,
    last_ts_recv: i64,
    mbo_count: u64,
    stats: AggregateStats,
}

impl AggregatedBook {
    /// Create an empty aggregated book.
    pub fn new() -> Self {
        Self {
            instruments: IndexMap::new(),
            last_ts_recv: 0,
            mbo_count: 0,
            stats: AggregateStats::default(),
        }
    }

    /// Apply one MBO record.
    ///
    /// Trade, Fill and None records advance the MBO count and timestamp but
    /// do not amend resting liquidity.
    pub fn apply(&mut self, rec: &MboRecord) {
        self.last_ts_recv = rec.ts_recv;
        self.mbo_count += 1;

        let mut stats = self.stats;
        let pb = self.publisher_book_mut(rec.instrument_id, rec.publisher_id);
        match rec.action {
            Action::Add => pb.add(rec, &mut stats),
            Action::Cancel => pb.cancel(rec, &mut stats),
            Action::Modify => pb.modify(rec, &mut stats),
            Action::Clear => pb.clear(rec),
            Action::Trade | Action::Fill | Action::None => {}
        }
        self.stats = stats;
    }

    fn publisher_book_mut(&mut self, instrument_id: u32, publisher_id: u16) -> &mut PublisherBook {
        let inst = self
            .instruments
            .entry(instrument_id)
            .or_insert_with(|| Instrument {
                instrument_id,
                publishers: Vec::with_capacity(4),
            });

        match inst
            .publishers
            .iter()
            .position(|pb| pb.publisher_id == publisher_id)
        {
            Some(pos) => &mut inst.publishers[pos],
            None => {
                inst.publishers.push(PublisherBook::new(publisher_id));
                inst.publishers.last_mut().expect("just pushed")
            }
        }
    }

    /// Look up a publisher book for inspection.
    pub fn publisher_book(&self, instrument_id: u32, publisher_id: u16) -> Option<&PublisherBook> {
        self.instruments
            .get(&instrument_id)
            .and_then(|inst| {
                inst.publishers
                    .iter()
                    .find(|pb| pb.publisher_id == publisher_id)
            })
    }

    /// Cross-publisher BBO for an instrument as `(bid, ask)`.
    pub fn aggregated_bbo(&self, instrument_id: u32) -> Option<(BboLevel, BboLevel)> {
        self.instruments
            .get(&instrument_id)
            .map(Instrument::aggregated_bbo)
    }

    /// Total MBO records applied.
    pub fn mbo_count(&self) -> u64 {
        self.mbo_count
    }

    /// Receive timestamp of the most recent record.
    pub fn last_ts_recv(&self) -> i64 {
        self.last_ts_recv
    }

    /// Anomaly counters.
    pub fn stats(&self) -> &AggregateStats {
        &self.stats
    }

    /// Build the aggregated JSON document. `levels` caps per-side output
    /// per publisher; `0` means unbounded.
    pub fn to_json_value(&self, levels: usize) -> Value {
        let instruments: Vec<Value> = self
            .instruments
            .values()
            .map(|inst| {
                let (bid, ask) = inst.aggregated_bbo();
                json!({
                    "instrument_id": inst.instrument_id,
                    "publishers": inst
                        .publishers
                        .iter()
                        .map(|pb| pb.to_json(levels))
                        .collect::<Vec<_>>(),
                    "aggregated_bbo": {
                        "bid": bbo_json(bid),
                        "ask": bbo_json(ask),
                    },
                })
            })
            .collect();

        json!({
            "instruments": instruments,
            "last_ts_recv_iso": iso8601(self.last_ts_recv),
            "mbo_count": self.mbo_count,
        })
    }

    /// Pretty-printed form of [`Self::to_json_value`].
    pub fn to_json_string(&self, levels: usize) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_json_value(levels))?)
    }

    /// Persist the aggregated document.
    pub fn save_json<P: AsRef<Path>>(&self, path: P, levels: usize) -> Result<()> {
        std::fs::write(path, self.to_json_string(levels)?)?;
        Ok(())
    }
}

impl Default for AggregatedBook {
    fn default() -> Self {
        Self::new()
    }
}

fn iso8601(ts_ns: i64) -> String {
    DateTime::<Utc>::from_timestamp_nanos(ts_ns).to_rfc3339_opts(SecondsFormat::Nanos, true)
}
