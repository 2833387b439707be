//! Benchmarks for book reconstruction throughput.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use mbo_book_engine::{Action, AggregatedBook, MboRecord, Side, VenueBook};

fn synthetic_records(count: usize) -> Vec<MboRecord> {
    let mut records = Vec::with_capacity(count);
    let base_price: i64 = 100_000_000_000; // $100.00

    for i in 0..count {
        let order_id = (i + 1) as u64;
        let is_bid = i % 2 == 0;
        let price_offset = ((i % 10) as i64) * 10_000_000; // $0.01 increments

        let price = if is_bid {
            base_price - price_offset
        } else {
            base_price + 10_000_000 + price_offset
        };

        records.push(
            MboRecord::new(
                order_id,
                Action::Add,
                if is_bid { Side::Bid } else { Side::Ask },
                price,
                ((i % 100) + 1) as u32,
            )
            .with_instrument(1)
            .with_publisher((i % 3) as u16 + 1),
        );
    }

    records
}

fn bench_venue_book(c: &mut Criterion) {
    let records = synthetic_records(10_000);

    let mut group = c.benchmark_group("venue_book");
    group.throughput(Throughput::Elements(records.len() as u64));

    group.bench_function("apply_records", |b| {
        b.iter(|| {
            let mut book = VenueBook::new();
            for rec in &records {
                let _ = black_box(book.apply(rec));
            }
        })
    });

    group.finish();
}

fn bench_aggregated_book(c: &mut Criterion) {
    let records = synthetic_records(10_000);

    let mut group = c.benchmark_group("aggregated_book");
    group.throughput(Throughput::Elements(records.len() as u64));

    group.bench_function("apply_records", |b| {
        b.iter(|| {
            let mut book = AggregatedBook::new();
            for rec in &records {
                book.apply(black_box(rec));
            }
        })
    });

    group.bench_function("to_json_unbounded", |b| {
        let mut book = AggregatedBook::new();
        for rec in &records {
            book.apply(rec);
        }
        b.iter(|| black_box(book.to_json_value(0)))
    });

    group.finish();
}

criterion_group!(benches, bench_venue_book, bench_aggregated_book);
criterion_main!(benches);
