//! End-to-end scenarios for the replay engine.
//!
//! Each scenario drives a full replay through the driver with an in-memory
//! source, then checks book state, BBO synthesis, and metrics accounting.
//!
//! Run with:
//! ```bash
//! cargo test --test engine_test
//! ```

use std::sync::atomic::Ordering;
use std::sync::Arc;

use mbo_book_engine::{
    Action, AggregatedBook, MboRecord, Metrics, RecordFlags, Replayer, Side, VecSource, VenueBook,
};

fn rec(order_id: u64, action: Action, side: Side, price_dollars: f64, size: u32) -> MboRecord {
    MboRecord::new(order_id, action, side, (price_dollars * 1e9) as i64, size)
        .with_instrument(1)
        .with_publisher(1)
}

fn replay_venue(records: Vec<MboRecord>) -> (VenueBook, Replayer) {
    let replayer = Replayer::new(Arc::new(Metrics::new()));
    let mut book = VenueBook::new();
    let mut source = VecSource::new(records);
    replayer
        .replay(&mut source, &mut book, None)
        .expect("replay failed");
    book.verify_invariants();
    (book, replayer)
}

fn replay_aggregated(records: Vec<MboRecord>) -> (AggregatedBook, Replayer) {
    let replayer = Replayer::new(Arc::new(Metrics::new()));
    let mut book = AggregatedBook::new();
    let mut source = VecSource::new(records);
    replayer
        .replay(&mut source, &mut book, None)
        .expect("replay failed");
    (book, replayer)
}

// ============================================================================
// Scenario 1: Add then Cancel (single-venue)
// ============================================================================

#[test]
fn scenario_add_then_cancel() {
    let (book, _) = replay_venue(vec![
        rec(1, Action::Add, Side::Bid, 100.0, 5),
        rec(1, Action::Cancel, Side::Bid, 100.0, 5),
    ]);

    assert_eq!(book.bid_levels(), 0);
    assert_eq!(book.order_count(), 0);
    assert_eq!(book.best_bid(), (-1, 0));
}

// ============================================================================
// Scenario 2: Two Adds, Modify up in price (single-venue)
// ============================================================================

#[test]
fn scenario_modify_up_in_price() {
    let (book, _) = replay_venue(vec![
        rec(1, Action::Add, Side::Bid, 100.0, 5),
        rec(2, Action::Add, Side::Bid, 100.0, 7),
        rec(1, Action::Modify, Side::Bid, 101.0, 5),
    ]);

    assert_eq!(book.order_count(), 2);
    assert_eq!(book.best_bid(), (101_000_000_000, 5));
    assert_eq!(book.level_orders(Side::Bid, 101_000_000_000), vec![(1, 5)]);
    assert_eq!(book.level_orders(Side::Bid, 100_000_000_000), vec![(2, 7)]);
}

// ============================================================================
// Scenario 3: Modify size up at same price (aggregated)
// ============================================================================

#[test]
fn scenario_aggregated_modify_size_up_loses_priority() {
    let (book, _) = replay_aggregated(vec![
        rec(1, Action::Add, Side::Ask, 200.0, 3),
        rec(2, Action::Add, Side::Ask, 200.0, 4),
        rec(1, Action::Modify, Side::Ask, 200.0, 9),
    ]);

    let pb = book.publisher_book(1, 1).unwrap();
    assert_eq!(
        pb.level_orders(Side::Ask, 200_000_000_000),
        vec![(2, 4), (1, 9)]
    );
    assert_eq!(pb.best_ask().size, 13);
}

// ============================================================================
// Scenario 4: Partial cancel (aggregated)
// ============================================================================

#[test]
fn scenario_aggregated_partial_cancel() {
    let (book, _) = replay_aggregated(vec![
        rec(1, Action::Add, Side::Bid, 50.0, 10),
        rec(1, Action::Cancel, Side::Bid, 50.0, 4),
    ]);

    let pb = book.publisher_book(1, 1).unwrap();
    assert_eq!(pb.level_orders(Side::Bid, 50_000_000_000), vec![(1, 6)]);
    assert!(pb.contains_order(1));
}

// ============================================================================
// Scenario 5: Clear with reseed (aggregated)
// ============================================================================

#[test]
fn scenario_aggregated_clear_with_reseed() {
    let (book, _) = replay_aggregated(vec![
        rec(1, Action::Add, Side::Bid, 10.0, 1),
        rec(2, Action::Add, Side::Bid, 11.0, 1),
        rec(3, Action::Clear, Side::Bid, 12.0, 2),
    ]);

    let pb = book.publisher_book(1, 1).unwrap();
    assert_eq!(pb.best_bid().price, 12_000_000_000);
    assert_eq!(pb.level_orders(Side::Bid, 12_000_000_000), vec![(3, 2)]);
    assert!(pb.level_orders(Side::Bid, 10_000_000_000).is_empty());
    assert!(pb.level_orders(Side::Bid, 11_000_000_000).is_empty());
    assert_eq!(pb.order_count(), 1);
    assert!(pb.contains_order(3));
}

// ============================================================================
// Scenario 6: Cross-publisher aggregate
// ============================================================================

#[test]
fn scenario_cross_publisher_aggregate() {
    let (book, _) = replay_aggregated(vec![
        rec(1, Action::Add, Side::Bid, 100.0, 3).with_publisher(1),
        rec(2, Action::Add, Side::Bid, 100.0, 5).with_publisher(2),
        rec(3, Action::Add, Side::Bid, 99.0, 100).with_publisher(3),
    ]);

    let (bid, _) = book.aggregated_bbo(1).unwrap();
    assert_eq!(bid.price, 100_000_000_000);
    assert_eq!(bid.size, 8);
    // Only the publishers quoting the aggregated price contribute counts.
    assert_eq!(bid.count, 2);
}

// ============================================================================
// Universal properties
// ============================================================================

#[test]
fn invariants_hold_through_mixed_replay() {
    let mut records = Vec::new();
    // Build 50 orders over 10 price levels, then churn them.
    for i in 1..=50u64 {
        let side = if i % 2 == 0 { Side::Bid } else { Side::Ask };
        let px = if side == Side::Bid {
            100.0 - (i % 10) as f64 * 0.01
        } else {
            100.01 + (i % 10) as f64 * 0.01
        };
        records.push(rec(i, Action::Add, side, px, (i % 7 + 1) as u32));
    }
    for i in (1..=50u64).step_by(3) {
        records.push(rec(i, Action::Modify, if i % 2 == 0 { Side::Bid } else { Side::Ask },
            if i % 2 == 0 { 99.5 } else { 100.5 }, 4));
    }
    for i in (2..=50u64).step_by(5) {
        records.push(rec(i, Action::Cancel, Side::Bid, 0.0, 0));
    }
    for i in (3..=50u64).step_by(7) {
        records.push(rec(i, Action::Fill, Side::Ask, 0.0, 0));
    }

    // verify_invariants checks the residency bijection, level-size
    // conservation and absence of empty levels after the full replay.
    let (book, replayer) = replay_venue(records);
    assert!(book.order_count() > 0);

    let m = replayer.metrics();
    assert_eq!(m.replay_errors.load(Ordering::Relaxed), 0);
    assert!(m.sample_count() > 0);
}

#[test]
fn bbo_ordering_on_clean_input() {
    let (book, _) = replay_venue(vec![
        rec(1, Action::Add, Side::Bid, 99.97, 10),
        rec(2, Action::Add, Side::Bid, 99.99, 20),
        rec(3, Action::Add, Side::Bid, 99.98, 30),
        rec(4, Action::Add, Side::Ask, 100.03, 15),
        rec(5, Action::Add, Side::Ask, 100.01, 25),
        rec(6, Action::Add, Side::Ask, 100.02, 35),
    ]);

    let (bid, bid_size) = book.best_bid();
    let (ask, ask_size) = book.best_ask();
    assert!(bid < ask);
    assert_eq!((bid, bid_size), (99_990_000_000, 20));
    assert_eq!((ask, ask_size), (100_010_000_000, 25));
}

#[test]
fn tob_flag_excluded_from_counts_but_not_size() {
    let (book, _) = replay_aggregated(vec![
        rec(1, Action::Add, Side::Bid, 100.0, 5),
        rec(2, Action::Add, Side::Bid, 100.0, 7).with_flags(RecordFlags::tob()),
        rec(3, Action::Add, Side::Bid, 100.0, 2),
    ]);

    let bid = book.publisher_book(1, 1).unwrap().best_bid();
    assert_eq!(bid.size, 14);
    assert_eq!(bid.count, 2);
}

#[test]
fn aggregated_bbo_matches_publisher_maximum() {
    let (book, _) = replay_aggregated(vec![
        rec(1, Action::Add, Side::Ask, 101.0, 5).with_publisher(1),
        rec(2, Action::Add, Side::Ask, 100.5, 3).with_publisher(2),
        rec(3, Action::Add, Side::Ask, 100.5, 4).with_publisher(3),
        rec(4, Action::Add, Side::Bid, 100.0, 9).with_publisher(2),
    ]);

    let (bid, ask) = book.aggregated_bbo(1).unwrap();
    // Min ask across publishers, contributions summed from the two at 100.5.
    assert_eq!(ask.price, 100_500_000_000);
    assert_eq!(ask.size, 7);
    assert_eq!(ask.count, 2);
    assert_eq!(bid.price, 100_000_000_000);
    assert_eq!(bid.size, 9);
}

#[test]
fn metrics_account_full_replay() {
    let records: Vec<MboRecord> = (1..=200u64)
        .map(|i| rec(i, Action::Add, Side::Bid, 100.0 - (i % 20) as f64 * 0.01, 1))
        .collect();
    let (_, replayer) = replay_aggregated(records);

    let m = replayer.metrics();
    assert_eq!(m.total_messages.load(Ordering::Relaxed), 200);
    assert_eq!(m.sample_count(), 200);
    assert!(m.replay_duration_ns() > 0);
    assert!(m.throughput_msg_per_sec() > 0.0);
    assert_eq!(m.last_error(), "");
    // Nearest-rank percentiles are monotone in rank.
    assert!(m.p50() <= m.p95());
    assert!(m.p95() <= m.p99());
}

#[test]
fn both_models_agree_on_best_prices_for_add_only_flow() {
    let records: Vec<MboRecord> = vec![
        rec(1, Action::Add, Side::Bid, 99.99, 10),
        rec(2, Action::Add, Side::Bid, 99.98, 20),
        rec(3, Action::Add, Side::Ask, 100.01, 30),
        rec(4, Action::Add, Side::Ask, 100.02, 40),
    ];

    let (venue, _) = replay_venue(records.clone());
    let (agg, _) = replay_aggregated(records);

    let (vb, _) = venue.best_bid();
    let (va, _) = venue.best_ask();
    let (ab, aa) = agg.aggregated_bbo(1).unwrap();
    assert_eq!(vb, ab.price);
    assert_eq!(va, aa.price);
}

#[test]
fn aggregated_json_document_end_to_end() {
    let (book, _) = replay_aggregated(vec![
        rec(1, Action::Add, Side::Bid, 100.0, 3)
            .with_ts_recv(1_700_000_000_000_000_000)
            .with_publisher(1),
        rec(2, Action::Add, Side::Bid, 100.0, 5)
            .with_ts_recv(1_700_000_000_000_000_500)
            .with_publisher(2),
        rec(3, Action::Add, Side::Ask, 100.05, 4)
            .with_ts_recv(1_700_000_000_000_001_000)
            .with_publisher(1),
    ]);

    let doc = book.to_json_value(0);
    assert_eq!(doc["mbo_count"], 3);

    let inst = &doc["instruments"][0];
    let publishers = inst["publishers"].as_array().unwrap();
    assert_eq!(publishers.len(), 2);
    // First-seen publisher order.
    assert_eq!(publishers[0]["publisher_id"], 1);
    assert_eq!(publishers[1]["publisher_id"], 2);

    assert_eq!(inst["aggregated_bbo"]["bid"]["price"], 100.0);
    assert_eq!(inst["aggregated_bbo"]["bid"]["size"], 8);
    assert_eq!(inst["aggregated_bbo"]["ask"]["price"], 100.05);

    // The document parses back and the ISO timestamp reflects the last record.
    let text = book.to_json_string(0).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert!(parsed["last_ts_recv_iso"]
        .as_str()
        .unwrap()
        .ends_with('Z'));
}

#[test]
fn venue_json_survives_save_and_reload() {
    let (book, _) = replay_venue(vec![
        rec(1, Action::Add, Side::Bid, 100.0, 5),
        rec(2, Action::Add, Side::Ask, 100.02, 7),
    ]);

    let dir = std::env::temp_dir().join(format!("engine_test_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("book.json");

    book.save_json(&path, true).unwrap();
    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(parsed["best_bid"]["price"], 100_000_000_000i64);
    assert_eq!(parsed["best_ask"]["size"], 7);

    std::fs::remove_dir_all(&dir).ok();
}
