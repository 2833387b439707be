//! Single-venue order book.
//!
//! High-performance implementation using:
//! - `BTreeMap` for sorted price levels (bids read in reverse)
//! - Intrusive per-level FIFO whose nodes live in the fixed node pool
//! - `ahash` map for O(1) order-id lookup
//!
//! Time priority is preserved by always appending at the level tail; a
//! Modify re-queues the order at the tail of its target level, so priority
//! is lost unconditionally in this model.

use ahash::AHashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::pool::{NodeIdx, NodePool, DEFAULT_CAPACITY};
use crate::types::{Action, MboRecord, Side};

/// One price level: cached aggregate size plus the FIFO of resting orders.
///
/// Invariant: `total_size` equals the sum of the linked nodes' sizes, and
/// `head`/`tail` are null exactly when the level is about to be erased.
#[derive(Debug, Clone, Copy)]
struct PriceLevel {
    total_size: u32,
    head: NodeIdx,
    tail: NodeIdx,
}

impl PriceLevel {
    fn new() -> Self {
        Self {
            total_size: 0,
            head: crate::pool::NULL_IDX,
            tail: crate::pool::NULL_IDX,
        }
    }
}

/// Top-of-book snapshot taken after applying a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BboSnapshot {
    /// The action just applied
    pub action: Action,
    /// Best bid price, `-1` when the bid side is empty
    pub best_bid: i64,
    /// Aggregate size at the best bid
    pub bid_size: u32,
    /// Best ask price, `-1` when the ask side is empty
    pub best_ask: i64,
    /// Aggregate size at the best ask
    pub ask_size: u32,
}

/// Statistics for monitoring book health.
#[derive(Debug, Clone, Copy, Default)]
pub struct VenueStats {
    /// Total records applied
    pub messages_applied: u64,
    /// Adds carrying an already-resident order id (ignored)
    pub duplicate_adds: u64,
    /// Modify/Cancel/Fill for ids with no residency (ignored)
    pub unknown_orders: u64,
}

/// Single-venue order book with O(1) order lookup.
pub struct VenueBook {
    /// Bid levels; best bid is the highest key (iterate in reverse)
    bids: BTreeMap<i64, PriceLevel>,
    /// Ask levels; best ask is the lowest key
    asks: BTreeMap<i64, PriceLevel>,
    /// order_id -> pool handle; non-owning, mirrors residency exactly
    orders: AHashMap<u64, NodeIdx>,
    pool: NodePool,
    stats: VenueStats,
}

impl VenueBook {
    /// Create a book with the default pool capacity (10,000 orders).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a book with a custom pool capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            orders: AHashMap::new(),
            pool: NodePool::new(capacity),
            stats: VenueStats::default(),
        }
    }

    /// Apply one MBO record and return the resulting top-of-book snapshot.
    ///
    /// Soft anomalies (unknown or duplicate order ids) leave the book
    /// unchanged and are counted in [`VenueStats`]. The only hard failure
    /// is pool exhaustion on Add, which propagates to the replay driver.
    ///
    /// Fill removes the order entirely in this model; Trade and Clear do
    /// not amend resting liquidity here (the aggregated book handles
    /// Clear).
    pub fn apply(&mut self, rec: &MboRecord) -> Result<BboSnapshot> {
        match rec.action {
            Action::Add => self.add_order(rec)?,
            Action::Modify => self.modify_order(rec),
            Action::Cancel | Action::Fill => self.remove_order(rec),
            Action::Trade | Action::Clear | Action::None => {}
        }

        self.stats.messages_applied += 1;
        Ok(self.snapshot(rec.action))
    }

    fn add_order(&mut self, rec: &MboRecord) -> Result<()> {
        if self.orders.contains_key(&rec.order_id) {
            // Some feeds reuse ids; keep replay moving and count it.
            self.stats.duplicate_adds += 1;
            log::debug!("duplicate add ignored: order_id={}", rec.order_id);
            return Ok(());
        }
        if rec.side == Side::None {
            return Ok(());
        }

        let idx = self.pool.alloc()?;
        let node = self.pool.get_mut(idx);
        node.order_id = rec.order_id;
        node.price = rec.price;
        node.size = rec.size;
        node.side = rec.side;

        let map = if rec.side.is_bid() {
            &mut self.bids
        } else {
            &mut self.asks
        };
        let level = map.entry(rec.price).or_insert_with(PriceLevel::new);
        link_tail(&mut self.pool, level, idx);

        self.orders.insert(rec.order_id, idx);
        Ok(())
    }

    fn modify_order(&mut self, rec: &MboRecord) {
        let idx = match self.orders.get(&rec.order_id) {
            Some(&idx) => idx,
            None => {
                self.stats.unknown_orders += 1;
                log::debug!("modify for unknown order ignored: order_id={}", rec.order_id);
                return;
            }
        };

        self.unlink(idx);

        // Overwrite and re-queue at the tail of the target level.
        let node = self.pool.get_mut(idx);
        node.price = rec.price;
        node.size = rec.size;
        let side = node.side;

        let map = if side.is_bid() {
            &mut self.bids
        } else {
            &mut self.asks
        };
        let level = map.entry(rec.price).or_insert_with(PriceLevel::new);
        link_tail(&mut self.pool, level, idx);
    }

    fn remove_order(&mut self, rec: &MboRecord) {
        let idx = match self.orders.remove(&rec.order_id) {
            Some(idx) => idx,
            None => {
                self.stats.unknown_orders += 1;
                log::debug!(
                    "{:?} for unknown order ignored: order_id={}",
                    rec.action,
                    rec.order_id
                );
                return;
            }
        };

        self.unlink(idx);
        self.pool.release(idx);
    }

    /// Detach a node from its level's FIFO, erasing the level if it drains.
    fn unlink(&mut self, idx: NodeIdx) {
        let node = *self.pool.get(idx);
        let map = if node.side.is_bid() {
            &mut self.bids
        } else {
            &mut self.asks
        };

        let drained = match map.get_mut(&node.price) {
            Some(level) => {
                unlink_node(&mut self.pool, level, idx);
                level.head.is_null()
            }
            None => false,
        };
        if drained {
            map.remove(&node.price);
        }
    }

    /// Best bid as `(price, aggregate_size)`, `(-1, 0)` when empty.
    #[inline]
    pub fn best_bid(&self) -> (i64, u32) {
        match self.bids.iter().next_back() {
            Some((&price, level)) => (price, level.total_size),
            None => (-1, 0),
        }
    }

    /// Best ask as `(price, aggregate_size)`, `(-1, 0)` when empty.
    #[inline]
    pub fn best_ask(&self) -> (i64, u32) {
        match self.asks.iter().next() {
            Some((&price, level)) => (price, level.total_size),
            None => (-1, 0),
        }
    }

    /// Snapshot the current BBO alongside the action that produced it.
    pub fn snapshot(&self, action: Action) -> BboSnapshot {
        let (best_bid, bid_size) = self.best_bid();
        let (best_ask, ask_size) = self.best_ask();
        BboSnapshot {
            action,
            best_bid,
            bid_size,
            best_ask,
            ask_size,
        }
    }

    /// Number of resident orders.
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Number of bid price levels.
    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    /// Number of ask price levels.
    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    /// Get current statistics.
    pub fn stats(&self) -> &VenueStats {
        &self.stats
    }

    /// FIFO-ordered `(order_id, size)` entries at a price, for inspection.
    pub fn level_orders(&self, side: Side, price: i64) -> Vec<(u64, u32)> {
        let map = if side.is_bid() { &self.bids } else { &self.asks };
        let mut out = Vec::new();
        if let Some(level) = map.get(&price) {
            let mut cur = level.head;
            while cur.is_some() {
                let node = self.pool.get(cur);
                out.push((node.order_id, node.size));
                cur = node.next;
            }
        }
        out
    }

    /// Serialize the book: BBO, then every bid level (highest first) and
    /// ask level (lowest first) with per-level totals and FIFO order lists.
    pub fn to_json(&self, pretty: bool) -> Result<String> {
        let doc = BookJson {
            best_bid: PriceSize::from(self.best_bid()),
            best_ask: PriceSize::from(self.best_ask()),
            bids: self
                .bids
                .iter()
                .rev()
                .map(|(&price, level)| self.level_json(price, level))
                .collect(),
            asks: self
                .asks
                .iter()
                .map(|(&price, level)| self.level_json(price, level))
                .collect(),
        };

        let json = if pretty {
            serde_json::to_string_pretty(&doc)?
        } else {
            serde_json::to_string(&doc)?
        };
        Ok(json)
    }

    /// Write the JSON document to a file.
    pub fn save_json<P: AsRef<Path>>(&self, path: P, pretty: bool) -> Result<()> {
        std::fs::write(path, self.to_json(pretty)?)?;
        Ok(())
    }

    fn level_json(&self, price: i64, level: &PriceLevel) -> LevelJson {
        let mut orders = Vec::new();
        let mut cur = level.head;
        while cur.is_some() {
            let node = self.pool.get(cur);
            orders.push(OrderJson {
                id: node.order_id,
                size: node.size,
            });
            cur = node.next;
        }
        LevelJson {
            price,
            total_size: level.total_size,
            orders,
        }
    }

    /// Assert the structural invariants: the order index is a bijection
    /// with resident nodes, level totals match their FIFO sums, and no
    /// empty level is present. Used by tests after every scenario.
    pub fn verify_invariants(&self) {
        let mut resident = 0usize;
        for (side, map) in [(Side::Bid, &self.bids), (Side::Ask, &self.asks)] {
            for (&price, level) in map {
                let mut sum = 0u64;
                let mut count = 0usize;
                let mut cur = level.head;
                while cur.is_some() {
                    let node = self.pool.get(cur);
                    assert_eq!(node.price, price, "node price mismatch at level {price}");
                    assert_eq!(node.side, side, "node side mismatch at level {price}");
                    assert_eq!(
                        self.orders.get(&node.order_id),
                        Some(&cur),
                        "index entry missing or stale for order {}",
                        node.order_id
                    );
                    sum += u64::from(node.size);
                    count += 1;
                    cur = node.next;
                }
                assert!(count > 0, "empty level present at {price}");
                assert_eq!(
                    sum,
                    u64::from(level.total_size),
                    "level total mismatch at {price}"
                );
                resident += count;
            }
        }
        assert_eq!(resident, self.orders.len(), "index/residency bijection broken");
        assert_eq!(resident, self.pool.in_use(), "pool accounting mismatch");
    }
}

impl Default for VenueBook {
    fn default() -> Self {
        Self::new()
    }
}

/// Append a node at the tail of a level's FIFO.
fn link_tail(pool: &mut NodePool, level: &mut PriceLevel, idx: NodeIdx) {
    let size = pool.get(idx).size;
    if level.tail.is_null() {
        level.head = idx;
        level.tail = idx;
        let node = pool.get_mut(idx);
        node.prev = crate::pool::NULL_IDX;
        node.next = crate::pool::NULL_IDX;
    } else {
        let tail = level.tail;
        pool.get_mut(tail).next = idx;
        let node = pool.get_mut(idx);
        node.prev = tail;
        node.next = crate::pool::NULL_IDX;
        level.tail = idx;
    }
    level.total_size = level.total_size.saturating_add(size);
}

/// Detach a node from a level's FIFO.
fn unlink_node(pool: &mut NodePool, level: &mut PriceLevel, idx: NodeIdx) {
    let (prev, next, size) = {
        let node = pool.get(idx);
        (node.prev, node.next, node.size)
    };

    if prev.is_some() {
        pool.get_mut(prev).next = next;
    } else {
        level.head = next;
    }
    if next.is_some() {
        pool.get_mut(next).prev = prev;
    } else {
        level.tail = prev;
    }

    level.total_size = level.total_size.saturating_sub(size);
}

#[derive(Serialize)]
struct PriceSize {
    price: i64,
    size: u32,
}

impl From<(i64, u32)> for PriceSize {
    fn from((price, size): (i64, u32)) -> Self {
        Self { price, size }
    }
}

#[derive(Serialize)]
struct OrderJson {
    id: u64,
    size: u32,
}

#[derive(Serialize)]
struct LevelJson {
    price: i64,
    total_size: u32,
    orders: Vec<OrderJson>,
}

#[derive(Serialize)]
struct BookJson {
    best_bid: PriceSize,
    best_ask: PriceSize,
    bids: Vec<LevelJson>,
    asks: Vec<LevelJson>,
}
