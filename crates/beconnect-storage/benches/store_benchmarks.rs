//! Benchmarks for the hot storage paths.
//!
//! Measures the synchronous SQL layer the async store wraps: a single
//! upsert, a snapshot read, and a prune that trims a full window of
//! overflow back to the retention count.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use beconnect_core::config::DEFAULT_RETENTION_COUNT;
use beconnect_core::types::AlertRecord;
use beconnect_storage::queries::{recent_alerts, upsert_alert};
use beconnect_storage::retention::prune_alerts;
use beconnect_storage::Database;

fn alert(index: i64) -> AlertRecord {
    AlertRecord {
        alert_id: format!("bench_{:05}", index),
        severity: "Severe".to_string(),
        headline: "Flash Flood Warning issued for the river valley until midnight".to_string(),
        expires: 1_700_000_000_000 + index * 1000 + 3_600_000,
        instructions: "Turn around, don't drown. Move to higher ground immediately.".to_string(),
        source_url: "https://api.weather.gov/alerts/bench".to_string(),
        verified: index % 2 == 0,
        fetched_at: 1_700_000_000_000 + index * 1000,
    }
}

fn seeded_db(count: i64) -> Database {
    let db = Database::in_memory().expect("in-memory database");
    db.with_conn(|conn| {
        for i in 0..count {
            upsert_alert(conn, &alert(i))?;
        }
        Ok(())
    })
    .expect("seed alerts");
    db
}

fn bench_upsert(c: &mut Criterion) {
    let db = seeded_db(DEFAULT_RETENTION_COUNT as i64);
    let mut next = 0_i64;

    c.bench_function("upsert_alert", |b| {
        b.iter(|| {
            // Cycle ids so the table stays small and most calls replace.
            next = (next + 1) % 64;
            db.with_conn(|conn| upsert_alert(conn, &alert(next)))
                .expect("upsert");
        })
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let db = seeded_db(200);

    c.bench_function("recent_alerts_snapshot", |b| {
        b.iter(|| {
            db.with_conn(|conn| recent_alerts(conn, DEFAULT_RETENTION_COUNT))
                .expect("snapshot")
        })
    });
}

fn bench_prune(c: &mut Criterion) {
    c.bench_function("prune_overflow", |b| {
        b.iter_batched(
            || seeded_db(2 * DEFAULT_RETENTION_COUNT as i64),
            |db| {
                db.with_conn(|conn| prune_alerts(conn, DEFAULT_RETENTION_COUNT))
                    .expect("prune")
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_upsert, bench_snapshot, bench_prune);
criterion_main!(benches);
