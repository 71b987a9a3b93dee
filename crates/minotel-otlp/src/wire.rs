//! OTLP-JSON wire structures.
//!
//! Field names follow the OTLP JSON mapping: `camelCase`, with 64-bit
//! integers (timestamps, histogram bucket counts) carried as decimal strings.
//! [`AnyValue`] relies on serde's external tagging to render exactly one of
//! the seven value tags per entry.

use serde::{Deserialize, Serialize};

/// One OTLP attribute value; exactly one tag is ever present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnyValue {
    #[serde(rename = "stringValue")]
    StringValue(String),
    #[serde(rename = "boolValue")]
    BoolValue(bool),
    #[serde(rename = "intValue")]
    IntValue(i64),
    #[serde(rename = "doubleValue")]
    DoubleValue(f64),
    /// Base64-encoded bytes.
    #[serde(rename = "bytesValue")]
    BytesValue(String),
    #[serde(rename = "arrayValue")]
    ArrayValue(ArrayValue),
    #[serde(rename = "kvlistValue")]
    KvlistValue(KvlistValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    pub values: Vec<AnyValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KvlistValue {
    pub values: Vec<WireKeyValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireKeyValue {
    pub key: String,
    pub value: AnyValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireResource {
    pub attributes: Vec<WireKeyValue>,
    pub dropped_attributes_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireScope {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

// ---------------------------------------------------------------------------
// Traces
// ---------------------------------------------------------------------------

/// Body of a `POST <tracesUrl>` export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceExportRequest {
    pub resource_spans: Vec<ResourceSpans>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpans {
    pub resource: WireResource,
    pub scope_spans: Vec<ScopeSpans>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeSpans {
    pub scope: WireScope,
    pub spans: Vec<WireSpan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSpan {
    /// 32 lowercase hex chars.
    pub trace_id: String,
    /// 16 lowercase hex chars.
    pub span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub name: String,
    pub kind: i32,
    pub start_time_unix_nano: String,
    pub end_time_unix_nano: String,
    pub attributes: Vec<WireKeyValue>,
    pub dropped_attributes_count: u32,
    pub events: Vec<WireEvent>,
    pub dropped_events_count: u32,
    pub links: Vec<WireLink>,
    pub dropped_links_count: u32,
    pub status: WireStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEvent {
    pub time_unix_nano: String,
    pub name: String,
    pub attributes: Vec<WireKeyValue>,
    pub dropped_attributes_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireLink {
    pub trace_id: String,
    pub span_id: String,
    pub attributes: Vec<WireKeyValue>,
    pub dropped_attributes_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireStatus {
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Body of a `POST <metricsUrl>` export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsExportRequest {
    pub resource_metrics: Vec<ResourceMetricsEnvelope>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetricsEnvelope {
    pub resource: WireResource,
    pub scope_metrics: Vec<ScopeMetricsEnvelope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeMetricsEnvelope {
    pub scope: WireScope,
    pub metrics: Vec<WireMetric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_url: Option<String>,
}

/// One metric; exactly one of `sum`/`gauge`/`histogram` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMetric {
    pub name: String,
    pub description: String,
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sum: Option<WireSum>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gauge: Option<WireGauge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub histogram: Option<WireHistogram>,
}

/// Aggregation temporality wire codes.
pub const TEMPORALITY_DELTA: i32 = 1;
pub const TEMPORALITY_CUMULATIVE: i32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSum {
    pub aggregation_temporality: i32,
    pub is_monotonic: bool,
    pub data_points: Vec<WireNumberDataPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireGauge {
    pub data_points: Vec<WireNumberDataPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireHistogram {
    pub aggregation_temporality: i32,
    pub data_points: Vec<WireHistogramDataPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireNumberDataPoint {
    pub attributes: Vec<WireKeyValue>,
    pub start_time_unix_nano: String,
    pub time_unix_nano: String,
    pub value: WireNumberValue,
}

/// The declared value type survives encoding: integer points render as
/// `asInt`, floating-point as `asDouble`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireNumberValue {
    #[serde(rename = "asInt")]
    AsInt(i64),
    #[serde(rename = "asDouble")]
    AsDouble(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireHistogramDataPoint {
    pub attributes: Vec<WireKeyValue>,
    pub start_time_unix_nano: String,
    pub time_unix_nano: String,
    /// One count per bucket, `explicit_bounds.len() + 1` entries, each a
    /// decimal string.
    pub bucket_counts: Vec<String>,
    pub explicit_bounds: Vec<f64>,
    pub sum: f64,
    pub count: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}
