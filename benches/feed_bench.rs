//! Benchmarks for the live data path
//!
//! Run with: cargo bench

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tempfile::tempdir;
use wattboard::feed::{ChartView, MeasurementStore, SseDecoder};
use wattboard::model::{LiveData, Measurement};
use wattboard::storage::EnergyStore;

fn create_records(count: usize) -> Vec<LiveData> {
    let start = Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap();
    (0..count)
        .map(|i| LiveData {
            timestamp: start + Duration::seconds(i as i64),
            power: 1000.0 + i as f64,
            power_production: 0.0,
            accumulated_consumption: i as f64 / 1000.0,
            accumulated_production: 0.0,
        })
        .collect()
}

/// The records as a server would frame them, with keep-alives in between
fn sse_body(records: &[LiveData]) -> Vec<u8> {
    let mut body = String::from("event: ready\ndata: {\"connectionId\":\"bench\"}\n\n");
    for (i, record) in records.iter().enumerate() {
        if i % 10 == 0 {
            body.push_str(": keep-alive\n\n");
        }
        body.push_str("data: ");
        body.push_str(&serde_json::to_string(record).unwrap());
        body.push_str("\n\n");
    }
    body.into_bytes()
}

fn bench_sse_decoder(c: &mut Criterion) {
    let mut group = c.benchmark_group("sse_decoder");

    for size in [100, 1000] {
        let body = sse_body(&create_records(size));
        group.throughput(Throughput::Bytes(body.len() as u64));

        group.bench_function(format!("whole_body_{}", size), |b| {
            b.iter(|| SseDecoder::new().feed(black_box(&body)))
        });

        // Network-sized chunks split events at arbitrary points
        group.bench_function(format!("chunked_{}", size), |b| {
            b.iter(|| {
                let mut decoder = SseDecoder::new();
                let mut events = 0;
                for chunk in body.chunks(1460) {
                    events += decoder.feed(black_box(chunk)).len();
                }
                events
            })
        });
    }

    group.finish();
}

fn bench_measurement_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("measurement_store");
    let rt = tokio::runtime::Runtime::new().unwrap();
    let records = create_records(1000);

    group.throughput(Throughput::Elements(records.len() as u64));
    group.bench_function("append_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = MeasurementStore::with_capacity(500);
                for record in &records {
                    store.append("home-1", record.clone()).await;
                }
                store.len("home-1").await
            })
        })
    });

    group.bench_function("chart_view_1000", |b| {
        b.iter(|| ChartView::from_measurements(black_box(&records)))
    });

    group.finish();
}

fn bench_energy_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("energy_store");

    group.bench_function("store_measurement", |b| {
        let dir = tempdir().unwrap();
        let store = EnergyStore::open(dir.path().join("bench.db")).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap();
        let mut i = 0i64;

        b.iter(|| {
            i += 1;
            let m = Measurement {
                timestamp: Some(start + Duration::seconds(i)),
                power: 1200.0,
                ..Default::default()
            };
            store.store_measurement("home-1", black_box(&m)).unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_sse_decoder, bench_measurement_store, bench_energy_store);
criterion_main!(benches);
