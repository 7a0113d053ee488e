use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tracepulse_engine::analysis::{
    analysis_set, analyze, error_rate, percentile, response_time, response_time_distribution,
    DEFAULT_DISTRIBUTION_BUCKETS,
};
use tracepulse_types::{SpanStatus, TraceSpan};

const SERVICES: [&str; 4] = ["API-Gateway", "Auth-Service", "Order-Service", "User-Service"];
const ENDPOINTS: [&str; 5] = ["/users/{id}", "/orders", "/products", "/login", "/checkout"];

/// An hour of spans spread evenly, with a 5% error rate.
fn batch(size: usize) -> Vec<TraceSpan> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
    let step = 3_600_000 / size.max(1) as i64;

    (0..size)
        .map(|i| TraceSpan {
            timestamp: start + Duration::milliseconds(step * i as i64),
            trace_id: format!("{:032x}", i),
            span_id: format!("{:016x}", i),
            span_name: ENDPOINTS[i % ENDPOINTS.len()].to_string(),
            service_name: SERVICES[i % SERVICES.len()].to_string(),
            duration_ms: 5.0 + ((i * 7919) % 500) as f64,
            status: if i % 20 == 0 {
                SpanStatus::Error
            } else {
                SpanStatus::Ok
            },
            status_message: String::new(),
        })
        .collect()
}

/// Benchmark the full core and extended sets across batch sizes
fn bench_analyze(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze");
    let computed_at = Utc::now();

    for size in [100usize, 1_000, 10_000, 100_000].iter() {
        let spans = batch(*size);
        group.bench_with_input(BenchmarkId::new("core", size), &spans, |b, spans| {
            let names = analysis_set(false);
            b.iter(|| analyze(black_box(spans), &names, computed_at));
        });
        group.bench_with_input(BenchmarkId::new("extended", size), &spans, |b, spans| {
            let names = analysis_set(true);
            b.iter(|| analyze(black_box(spans), &names, computed_at));
        });
    }
    group.finish();
}

/// Benchmark individual analyses on a mid-sized batch
fn bench_single_analyses(c: &mut Criterion) {
    let spans = batch(10_000);

    c.bench_function("response_time_10k", |b| {
        b.iter(|| response_time(black_box(&spans)));
    });

    c.bench_function("error_rate_10k", |b| {
        b.iter(|| error_rate(black_box(&spans)));
    });

    c.bench_function("distribution_10k", |b| {
        b.iter(|| response_time_distribution(black_box(&spans), DEFAULT_DISTRIBUTION_BUCKETS));
    });
}

/// Benchmark percentile lookup on sorted input
fn bench_percentile(c: &mut Criterion) {
    let mut sorted: Vec<f64> = batch(100_000).iter().map(|s| s.duration_ms).collect();
    sorted.sort_by(f64::total_cmp);

    c.bench_function("percentile_p99", |b| {
        b.iter(|| percentile(black_box(&sorted), black_box(0.99)));
    });
}

criterion_group!(benches, bench_analyze, bench_single_analyses, bench_percentile);
criterion_main!(benches);
