//! Pure serialization: sealed records in, wire envelopes out. No I/O here.
//!
//! Spans group first by resource *content* (the canonical attribute key, not
//! pointer identity: resources built through different paths but carrying
//! the same attributes land in one group), then by instrumentation scope
//! (name, version, schema url). Each leaf group becomes one `scopeSpans`
//! entry; within a group, records keep the order in which they were sealed.
//! Metrics snapshots arrive already grouped by the meter provider and are
//! flattened directly.

use crate::wire::{
    AnyValue, ArrayValue, KvlistValue, MetricsExportRequest, ResourceMetricsEnvelope,
    ResourceSpans, ScopeMetricsEnvelope, ScopeSpans, TraceExportRequest, WireEvent, WireGauge,
    WireHistogram, WireHistogramDataPoint, WireKeyValue, WireLink, WireMetric,
    WireNumberDataPoint, WireNumberValue, WireResource, WireScope, WireSpan, WireStatus, WireSum,
    TEMPORALITY_CUMULATIVE, TEMPORALITY_DELTA,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use minotel::attribute::{AttributeValue, KeyValue};
use minotel::exporter::ExportError;
use minotel::metrics::{
    HistogramDataPoint, Metric, MetricData, NumberDataPoint, NumberValue, ResourceMetrics,
    Temporality,
};
use minotel::resource::Resource;
use minotel::span::{InstrumentationScope, SpanEvent, SpanLink, SpanRecord, Timestamp};

/// Encodes one attribute value into the wire union. Total: every model value
/// maps to exactly one tag.
pub fn encode_any_value(value: &AttributeValue) -> AnyValue {
    match value {
        AttributeValue::Str(s) => AnyValue::StringValue(s.clone()),
        AttributeValue::Bool(b) => AnyValue::BoolValue(*b),
        AttributeValue::Int(i) => AnyValue::IntValue(*i),
        AttributeValue::Double(d) => AnyValue::DoubleValue(*d),
        AttributeValue::Bytes(bytes) => AnyValue::BytesValue(BASE64.encode(bytes)),
        AttributeValue::Array(items) => AnyValue::ArrayValue(ArrayValue {
            values: items.iter().map(encode_any_value).collect(),
        }),
        AttributeValue::KvList(entries) => AnyValue::KvlistValue(KvlistValue {
            values: encode_attributes(entries),
        }),
    }
}

/// Encodes an ordered attribute list.
pub fn encode_attributes(attributes: &[KeyValue]) -> Vec<WireKeyValue> {
    attributes
        .iter()
        .map(|kv| WireKeyValue {
            key: kv.key.clone(),
            value: encode_any_value(&kv.value),
        })
        .collect()
}

/// `seconds * 1_000_000_000 + remainder`, as the decimal string the JSON
/// mapping uses for 64-bit integers.
fn nanos_string(ts: Timestamp) -> String {
    ts.unix_nanos().to_string()
}

fn encode_resource(resource: &Resource) -> WireResource {
    WireResource {
        attributes: encode_attributes(resource.attributes()),
        dropped_attributes_count: 0,
    }
}

fn encode_scope(scope: &InstrumentationScope) -> WireScope {
    WireScope {
        name: scope.name.clone(),
        version: scope.version.clone(),
    }
}

fn encode_event(event: &SpanEvent) -> WireEvent {
    WireEvent {
        time_unix_nano: nanos_string(event.time),
        name: event.name.clone(),
        attributes: encode_attributes(&event.attributes),
        dropped_attributes_count: event.dropped_attributes_count,
    }
}

fn encode_link(link: &SpanLink) -> WireLink {
    WireLink {
        trace_id: link.trace_id.to_string(),
        span_id: link.span_id.to_string(),
        attributes: encode_attributes(&link.attributes),
        dropped_attributes_count: link.dropped_attributes_count,
    }
}

/// Flattens one sealed record field-by-field into the wire schema. Ids pass
/// through as their fixed-width hex encodings.
pub fn encode_span(record: &SpanRecord) -> WireSpan {
    WireSpan {
        trace_id: record.context.trace_id.to_string(),
        span_id: record.context.span_id.to_string(),
        parent_span_id: record.parent_span_id.map(|id| id.to_string()),
        name: record.name.clone(),
        kind: record.kind.otlp_code(),
        start_time_unix_nano: nanos_string(record.start_time),
        end_time_unix_nano: nanos_string(record.end_time),
        attributes: encode_attributes(&record.attributes),
        dropped_attributes_count: record.dropped_attributes_count,
        events: record.events.iter().map(encode_event).collect(),
        dropped_events_count: record.dropped_events_count,
        links: record.links.iter().map(encode_link).collect(),
        dropped_links_count: record.dropped_links_count,
        status: WireStatus {
            code: record.status.code.otlp_code(),
            message: record.status.message.clone(),
        },
    }
}

/// Groups records by resource content, then by scope identity.
///
/// Group order is first-seen; within each leaf group the records keep their
/// input (seal) order. Every record lands in exactly one group.
pub fn group_spans(records: &[SpanRecord]) -> Vec<ResourceSpans> {
    let mut by_resource: Vec<(String, &SpanRecord, Vec<&SpanRecord>)> = Vec::new();

    for record in records {
        let key = record.resource.canonical_key();
        match by_resource.iter_mut().find(|(k, _, _)| *k == key) {
            Some((_, _, members)) => members.push(record),
            None => by_resource.push((key, record, vec![record])),
        }
    }

    by_resource
        .into_iter()
        .map(|(_, first, members)| {
            let mut by_scope: Vec<(String, &InstrumentationScope, Vec<&SpanRecord>)> = Vec::new();
            for record in members {
                let key = record.scope.identity_key();
                match by_scope.iter_mut().find(|(k, _, _)| *k == key) {
                    Some((_, _, scoped)) => scoped.push(record),
                    None => by_scope.push((key, &record.scope, vec![record])),
                }
            }

            ResourceSpans {
                resource: encode_resource(&first.resource),
                scope_spans: by_scope
                    .into_iter()
                    .map(|(_, scope, scoped)| ScopeSpans {
                        scope: encode_scope(scope),
                        spans: scoped.iter().map(|r| encode_span(r)).collect(),
                        schema_url: scope.schema_url.clone(),
                    })
                    .collect(),
                schema_url: None,
            }
        })
        .collect()
}

/// Builds the full trace export envelope.
pub fn encode_trace_request(records: &[SpanRecord]) -> TraceExportRequest {
    TraceExportRequest {
        resource_spans: group_spans(records),
    }
}

fn temporality_code(temporality: Temporality) -> i32 {
    match temporality {
        Temporality::Delta => TEMPORALITY_DELTA,
        Temporality::Cumulative => TEMPORALITY_CUMULATIVE,
    }
}

fn encode_number_point(point: &NumberDataPoint) -> WireNumberDataPoint {
    WireNumberDataPoint {
        attributes: encode_attributes(&point.attributes),
        start_time_unix_nano: nanos_string(point.start_time),
        time_unix_nano: nanos_string(point.time),
        value: match point.value {
            NumberValue::Int(v) => WireNumberValue::AsInt(v),
            NumberValue::Double(v) => WireNumberValue::AsDouble(v),
        },
    }
}

fn encode_histogram_point(point: &HistogramDataPoint) -> WireHistogramDataPoint {
    WireHistogramDataPoint {
        attributes: encode_attributes(&point.attributes),
        start_time_unix_nano: nanos_string(point.start_time),
        time_unix_nano: nanos_string(point.time),
        bucket_counts: point.counts.iter().map(ToString::to_string).collect(),
        explicit_bounds: point.bounds.clone(),
        sum: point.sum,
        count: point.count.to_string(),
        min: point.min,
        max: point.max,
    }
}

fn encode_metric(metric: &Metric) -> WireMetric {
    let mut wire = WireMetric {
        name: metric.name.clone(),
        description: metric.description.clone(),
        unit: metric.unit.clone(),
        sum: None,
        gauge: None,
        histogram: None,
    };

    match &metric.data {
        MetricData::Sum {
            temporality,
            is_monotonic,
            points,
        } => {
            wire.sum = Some(WireSum {
                aggregation_temporality: temporality_code(*temporality),
                is_monotonic: *is_monotonic,
                data_points: points.iter().map(encode_number_point).collect(),
            });
        }
        MetricData::Gauge { points } => {
            wire.gauge = Some(WireGauge {
                data_points: points.iter().map(encode_number_point).collect(),
            });
        }
        MetricData::Histogram {
            temporality,
            points,
        } => {
            wire.histogram = Some(WireHistogram {
                aggregation_temporality: temporality_code(*temporality),
                data_points: points.iter().map(encode_histogram_point).collect(),
            });
        }
    }

    wire
}

/// Builds the metrics export envelope for one single-interval snapshot.
pub fn encode_metrics_request(snapshot: &ResourceMetrics) -> MetricsExportRequest {
    MetricsExportRequest {
        resource_metrics: vec![ResourceMetricsEnvelope {
            resource: encode_resource(&snapshot.resource),
            scope_metrics: snapshot
                .scope_metrics
                .iter()
                .map(|sm| ScopeMetricsEnvelope {
                    scope: encode_scope(&sm.scope),
                    metrics: sm.metrics.iter().map(encode_metric).collect(),
                    schema_url: sm.scope.schema_url.clone(),
                })
                .collect(),
            schema_url: None,
        }],
    }
}

/// Renders an envelope to its wire text form.
///
/// The encoder is total over the model, so a failure here is a defect; it
/// surfaces as [`ExportError::Encoding`] and fails the export rather than
/// guessing at a payload.
pub fn to_json<T: serde::Serialize>(envelope: &T) -> Result<String, ExportError> {
    serde_json::to_string(envelope).map_err(|e| ExportError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use minotel::span::{SpanContext, SpanId, SpanKind, SpanStatus, TraceId};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn record_with(resource: &Arc<Resource>, scope: &InstrumentationScope, name: &str) -> SpanRecord {
        let start = Timestamp {
            seconds: 1_700_000_000,
            nanos: 250,
        };
        SpanRecord {
            context: SpanContext::new(TraceId::random(), SpanId::random(), true),
            parent_span_id: None,
            name: name.to_string(),
            kind: SpanKind::Internal,
            start_time: start,
            end_time: Timestamp {
                seconds: 1_700_000_001,
                nanos: 0,
            },
            attributes: vec![KeyValue::new("k", "v")],
            events: Vec::new(),
            links: Vec::new(),
            status: SpanStatus::unset(),
            dropped_attributes_count: 0,
            dropped_events_count: 0,
            dropped_links_count: 0,
            resource: Arc::clone(resource),
            scope: scope.clone(),
        }
    }

    fn resource(name: &str) -> Arc<Resource> {
        Arc::new(Resource::builder().with_service_name(name).build())
    }

    #[test]
    fn test_grouping_by_resource_then_scope() {
        let res_a = resource("a");
        let res_b = resource("b");
        let scope_x = InstrumentationScope::new("x");
        let scope_y = InstrumentationScope::new("y");

        let records = vec![
            record_with(&res_a, &scope_x, "a-x-1"),
            record_with(&res_b, &scope_x, "b-x-1"),
            record_with(&res_a, &scope_y, "a-y-1"),
            record_with(&res_a, &scope_x, "a-x-2"),
            record_with(&res_b, &scope_y, "b-y-1"),
        ];

        let groups = group_spans(&records);

        // Exactly R resource groups, each with exactly its scopes
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].scope_spans.len(), 2);
        assert_eq!(groups[1].scope_spans.len(), 2);

        // No record duplicated or omitted
        let names: Vec<&str> = groups
            .iter()
            .flat_map(|g| &g.scope_spans)
            .flat_map(|s| &s.spans)
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names.len(), 5);
        let unique: HashSet<&&str> = names.iter().collect();
        assert_eq!(unique.len(), 5);

        // Within a leaf group, seal order is preserved
        let a_x = &groups[0].scope_spans[0];
        assert_eq!(a_x.spans[0].name, "a-x-1");
        assert_eq!(a_x.spans[1].name, "a-x-2");
    }

    #[test]
    fn test_grouping_merges_structurally_equal_resources() {
        // Same content, different construction path and different Arc
        let res_1 = Arc::new(
            Resource::builder()
                .with_service_name("svc")
                .with_environment("prod")
                .build(),
        );
        let res_2 = Arc::new(
            Resource::builder()
                .with_environment("prod")
                .with_service_name("svc")
                .build(),
        );
        let scope = InstrumentationScope::new("lib");

        let records = vec![
            record_with(&res_1, &scope, "one"),
            record_with(&res_2, &scope, "two"),
        ];

        let groups = group_spans(&records);
        assert_eq!(groups.len(), 1, "content-equal resources must merge");
        assert_eq!(groups[0].scope_spans[0].spans.len(), 2);
    }

    #[test]
    fn test_scope_versions_group_separately() {
        let res = resource("svc");
        let v1 = InstrumentationScope::new("lib").with_version("1");
        let v2 = InstrumentationScope::new("lib").with_version("2");

        let records = vec![
            record_with(&res, &v1, "one"),
            record_with(&res, &v2, "two"),
        ];

        let groups = group_spans(&records);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].scope_spans.len(), 2);
        assert_eq!(groups[0].scope_spans[0].scope.version.as_deref(), Some("1"));
    }

    #[test]
    fn test_span_flattening() {
        let res = resource("svc");
        let scope = InstrumentationScope::new("lib");
        let mut record = record_with(&res, &scope, "op");
        record.parent_span_id = Some(SpanId::random());
        record.status = SpanStatus::error("boom");
        record.events.push(SpanEvent::new("evt", vec![]));
        record.dropped_events_count = 3;

        let span = encode_span(&record);
        assert_eq!(span.trace_id.len(), 32);
        assert_eq!(span.span_id.len(), 16);
        assert!(span.parent_span_id.is_some());
        assert_eq!(span.kind, 1);
        assert_eq!(span.start_time_unix_nano, "1700000000000000250");
        assert_eq!(span.end_time_unix_nano, "1700000001000000000");
        assert_eq!(span.status.code, 2);
        assert_eq!(span.status.message.as_deref(), Some("boom"));
        assert_eq!(span.events.len(), 1);
        assert_eq!(span.dropped_events_count, 3);
    }

    #[test]
    fn test_bytes_encode_as_base64() {
        let encoded = encode_any_value(&AttributeValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(encoded, AnyValue::BytesValue("3q2+7w==".to_string()));
    }

    #[test]
    fn test_nested_values_encode_recursively() {
        let value = AttributeValue::KvList(vec![
            KeyValue::new("inner", AttributeValue::Array(vec![
                AttributeValue::Int(1),
                AttributeValue::Str("two".into()),
            ])),
        ]);

        let AnyValue::KvlistValue(kvlist) = encode_any_value(&value) else {
            panic!("expected kvlist");
        };
        let AnyValue::ArrayValue(array) = &kvlist.values[0].value else {
            panic!("expected array");
        };
        assert_eq!(array.values[0], AnyValue::IntValue(1));
        assert_eq!(array.values[1], AnyValue::StringValue("two".into()));
    }

    #[test]
    fn test_timestamp_string_round_trip() {
        for nanos in [0u32, 1, 999_999_999] {
            let ts = Timestamp {
                seconds: 1_234_567,
                nanos,
            };
            let rendered = nanos_string(ts);
            let parsed = Timestamp::from_unix_nanos(rendered.parse().unwrap());
            assert_eq!(parsed, ts);
        }
    }

    #[test]
    fn test_metrics_envelope_carries_temporality_and_value_types() {
        use minotel::metrics::ScopeMetrics;

        let snapshot = ResourceMetrics {
            resource: resource("svc"),
            scope_metrics: vec![ScopeMetrics {
                scope: InstrumentationScope::new("app"),
                metrics: vec![
                    Metric {
                        name: "requests".into(),
                        description: String::new(),
                        unit: String::new(),
                        data: MetricData::Sum {
                            temporality: Temporality::Delta,
                            is_monotonic: true,
                            points: vec![NumberDataPoint {
                                attributes: vec![],
                                start_time: Timestamp::from_unix_nanos(1),
                                time: Timestamp::from_unix_nanos(2),
                                value: NumberValue::Int(10),
                            }],
                        },
                    },
                    Metric {
                        name: "latency".into(),
                        description: "request latency".into(),
                        unit: "ms".into(),
                        data: MetricData::Histogram {
                            temporality: Temporality::Cumulative,
                            points: vec![HistogramDataPoint {
                                attributes: vec![],
                                start_time: Timestamp::from_unix_nanos(1),
                                time: Timestamp::from_unix_nanos(2),
                                bounds: vec![10.0],
                                counts: vec![3, 1],
                                sum: 45.0,
                                count: 4,
                                min: Some(2.0),
                                max: Some(30.0),
                            }],
                        },
                    },
                ],
            }],
        };

        let envelope = encode_metrics_request(&snapshot);
        let metrics = &envelope.resource_metrics[0].scope_metrics[0].metrics;

        let sum = metrics[0].sum.as_ref().unwrap();
        assert_eq!(sum.aggregation_temporality, TEMPORALITY_DELTA);
        assert!(sum.is_monotonic);
        assert_eq!(sum.data_points[0].value, WireNumberValue::AsInt(10));

        let histogram = metrics[1].histogram.as_ref().unwrap();
        assert_eq!(histogram.aggregation_temporality, TEMPORALITY_CUMULATIVE);
        let point = &histogram.data_points[0];
        assert_eq!(point.bucket_counts, vec!["3", "1"]);
        assert_eq!(point.count, "4");
        assert_eq!(point.explicit_bounds, vec![10.0]);
    }

    #[test]
    fn test_to_json_renders_envelope() {
        let res = resource("svc");
        let scope = InstrumentationScope::new("lib");
        let request = encode_trace_request(&[record_with(&res, &scope, "op")]);

        let body = to_json(&request).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(parsed["resourceSpans"][0]["scopeSpans"][0]["spans"][0]["traceId"].is_string());
    }
}
