//! # OTLP Export Pipeline Demo
//!
//! End-to-end demonstration against a local stub collector:
//!
//! 1. Starts a minimal HTTP listener standing in for an OTLP collector
//! 2. Initializes the SDK pointed at it (traces + metrics)
//! 3. Produces nested spans (parenting via the active-context stack),
//!    counter increments, and histogram observations
//! 4. Force-flushes, prints what the "collector" received, and shuts down
//!    gracefully
//!
//! ## Running
//!
//! ```bash
//! cargo run -p minotel-otlp --bin demo
//! ```

use anyhow::Result;
use minotel::attribute::KeyValue;
use minotel::batch::BatchConfig;
use minotel::span::SpanKind;
use minotel_otlp::TelemetryConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Accepts OTLP posts and answers 200, counting requests per signal.
async fn run_stub_collector(listener: TcpListener, traces: Arc<AtomicUsize>, metrics: Arc<AtomicUsize>) {
    loop {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let traces = Arc::clone(&traces);
        let metrics = Arc::clone(&metrics);

        tokio::spawn(async move {
            let mut buf = vec![0u8; 64 * 1024];
            let Ok(n) = socket.read(&mut buf).await else {
                return;
            };
            let request = String::from_utf8_lossy(&buf[..n]);
            if request.starts_with("POST /v1/traces") {
                traces.fetch_add(1, Ordering::Relaxed);
            } else if request.starts_with("POST /v1/metrics") {
                metrics.fetch_add(1, Ordering::Relaxed);
            }
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await;
        });
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Stub collector on an ephemeral port
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let trace_posts = Arc::new(AtomicUsize::new(0));
    let metric_posts = Arc::new(AtomicUsize::new(0));
    tokio::spawn(run_stub_collector(
        listener,
        Arc::clone(&trace_posts),
        Arc::clone(&metric_posts),
    ));

    let telemetry = minotel_otlp::init(
        TelemetryConfig::new("demo-app")
            .with_environment("local")
            .with_release("0.1.0")
            .with_traces_url(format!("http://{addr}/v1/traces"))
            .with_metrics_url(format!("http://{addr}/v1/metrics"))
            .with_header("x-api-key", "demo")
            .with_batch(BatchConfig::default().with_max_export_batch_size(16))
            .with_metric_interval(Duration::from_secs(1)),
    )?;

    let tracer = telemetry.tracer("demo.worker");
    let meter = telemetry.meter("demo.worker");
    let requests = meter.u64_counter("demo.requests").build();
    let latency = meter
        .f64_histogram("demo.latency")
        .with_unit("ms")
        .build();

    for i in 0..8 {
        let result: Result<(), anyhow::Error> = tracer.in_span("handle-request", |span| {
            span.set_attribute("request.index", i as i64);

            let inner: Result<(), anyhow::Error> = tracer.in_span("backend-call", |inner_span| {
                inner_span.set_attribute("peer.service", "billing");
                // The traceparent an instrumented client would attach
                println!("  outgoing traceparent: {}", inner_span.traceparent());
                Ok(())
            });
            inner?;

            requests.add(1, &[KeyValue::new("route", "/demo")]);
            latency.record(12.5 + f64::from(i), &[]);

            if i == 5 {
                span.set_attribute("demo.flagged", true);
            }
            Ok(())
        });
        if let Err(e) = result {
            eprintln!("request {i} failed: {e}");
        }
    }

    // One span kind of each flavor, for variety on the wire
    let mut client_span = tracer
        .span_builder("outbound-probe")
        .with_kind(SpanKind::Client)
        .with_attribute("http.method", "GET")
        .start();
    client_span.end();

    telemetry.force_flush().await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!(
        "collector received {} trace post(s), {} metric post(s)",
        trace_posts.load(Ordering::Relaxed),
        metric_posts.load(Ordering::Relaxed)
    );

    telemetry.flush_and_shutdown().await;
    println!("shut down cleanly");
    Ok(())
}
