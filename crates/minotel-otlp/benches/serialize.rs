//! Serialization throughput: sealed records → OTLP-JSON body.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use minotel::attribute::KeyValue;
use minotel::resource::Resource;
use minotel::span::{
    InstrumentationScope, SpanContext, SpanEvent, SpanId, SpanKind, SpanRecord, SpanStatus,
    Timestamp, TraceId,
};
use minotel_otlp::serialize::{encode_trace_request, to_json};
use std::sync::Arc;

fn build_batch(size: usize) -> Vec<SpanRecord> {
    let resource = Arc::new(
        Resource::builder()
            .with_service_name("bench")
            .with_environment("bench")
            .build(),
    );
    let scope = InstrumentationScope::new("bench-lib").with_version("1.0");

    (0..size)
        .map(|i| {
            let start = Timestamp::from_unix_nanos(1_700_000_000_000_000_000 + i as u64);
            SpanRecord {
                context: SpanContext::new(TraceId::random(), SpanId::random(), true),
                parent_span_id: (i % 4 != 0).then(SpanId::random),
                name: format!("operation-{}", i % 16),
                kind: SpanKind::Client,
                start_time: start,
                end_time: Timestamp::from_unix_nanos(start.unix_nanos() + 1_500_000),
                attributes: vec![
                    KeyValue::new("http.method", "GET"),
                    KeyValue::new("http.status_code", 200i64),
                    KeyValue::new("retry", false),
                ],
                events: vec![SpanEvent::new("ttfb", vec![])],
                links: Vec::new(),
                status: SpanStatus::ok(),
                dropped_attributes_count: 0,
                dropped_events_count: 0,
                dropped_links_count: 0,
                resource: Arc::clone(&resource),
                scope: scope.clone(),
            }
        })
        .collect()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_trace_request");
    for size in [16, 256, 2048] {
        let batch = build_batch(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("{size}_spans"), |b| {
            b.iter_batched(
                || batch.clone(),
                |batch| to_json(&encode_trace_request(&batch)).unwrap(),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode);
criterion_main!(benches);
