//! Span data model: ids, timestamps, and the sealed span record.
//!
//! A [`SpanRecord`] is produced once, when a span ends, and never mutated
//! afterwards. Everything the wire encoding needs (ids, timing, attributes,
//! events, links, status, the owning resource and instrumentation scope) is
//! captured on the record so the export pipeline can run without reaching
//! back into live tracer state.

use crate::attribute::KeyValue;
use crate::resource::Resource;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// 128-bit trace identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId([u8; 16]);

/// 64-bit span identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpanId([u8; 8]);

impl TraceId {
    /// The all-zero (invalid) trace id.
    pub const INVALID: Self = Self([0; 16]);

    /// Generates a random non-zero trace id.
    pub fn random() -> Self {
        loop {
            let id = Self(rand::random());
            if id.is_valid() {
                return id;
            }
        }
    }

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn to_bytes(self) -> [u8; 16] {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 != [0; 16]
    }

    /// The low 8 bytes interpreted as a big-endian integer.
    ///
    /// This is the sampler's deterministic input: the same trace id always
    /// maps to the same point in the id space.
    pub fn low_u64(&self) -> u64 {
        let mut low = [0u8; 8];
        low.copy_from_slice(&self.0[8..]);
        u64::from_be_bytes(low)
    }

    /// Parses a 32-char lowercase-hex id, as carried in `traceparent`.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex_to_bytes::<16>(s)?;
        let id = Self(bytes);
        id.is_valid().then_some(id)
    }
}

impl SpanId {
    /// The all-zero (invalid) span id.
    pub const INVALID: Self = Self([0; 8]);

    /// Generates a random non-zero span id.
    pub fn random() -> Self {
        loop {
            let id = Self(rand::random());
            if id.is_valid() {
                return id;
            }
        }
    }

    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub const fn to_bytes(self) -> [u8; 8] {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 != [0; 8]
    }

    /// Parses a 16-char lowercase-hex id.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex_to_bytes::<8>(s)?;
        let id = Self(bytes);
        id.is_valid().then_some(id)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

fn hex_to_bytes<const N: usize>(s: &str) -> Option<[u8; N]> {
    if s.len() != N * 2 || !s.is_ascii() {
        return None;
    }
    let mut out = [0u8; N];
    for (i, chunk) in s.as_bytes().chunks_exact(2).enumerate() {
        let hi = (chunk[0] as char).to_digit(16)?;
        let lo = (chunk[1] as char).to_digit(16)?;
        out[i] = (hi * 16 + lo) as u8;
    }
    Some(out)
}

/// Wall-clock instant with nanosecond resolution, stored as a
/// (seconds, nanosecond-remainder) pair since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: u64,
    /// Remainder in `[0, 1_000_000_000)`.
    pub nanos: u32,
}

impl Timestamp {
    /// Captures the current wall-clock time.
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            seconds: since_epoch.as_secs(),
            nanos: since_epoch.subsec_nanos(),
        }
    }

    /// Flattens to a single 64-bit nanosecond count:
    /// `seconds * 1_000_000_000 + nanos`.
    pub fn unix_nanos(&self) -> u64 {
        self.seconds * 1_000_000_000 + u64::from(self.nanos)
    }

    /// Reconstructs the (seconds, remainder) pair from a nanosecond count.
    pub fn from_unix_nanos(nanos: u64) -> Self {
        Self {
            seconds: nanos / 1_000_000_000,
            nanos: (nanos % 1_000_000_000) as u32,
        }
    }
}

/// Span kind according to the OpenTelemetry data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpanKind {
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

impl SpanKind {
    /// OTLP wire code for this kind.
    pub fn otlp_code(self) -> i32 {
        match self {
            Self::Internal => 1,
            Self::Server => 2,
            Self::Client => 3,
            Self::Producer => 4,
            Self::Consumer => 5,
        }
    }
}

/// Status code of a finished span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    Unset,
    Ok,
    Error,
}

impl StatusCode {
    /// OTLP wire code for this status.
    pub fn otlp_code(self) -> i32 {
        match self {
            Self::Unset => 0,
            Self::Ok => 1,
            Self::Error => 2,
        }
    }
}

/// Span status: a code plus an optional message (errors only, by convention).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanStatus {
    pub code: StatusCode,
    pub message: Option<String>,
}

impl SpanStatus {
    pub fn unset() -> Self {
        Self {
            code: StatusCode::Unset,
            message: None,
        }
    }

    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Error,
            message: Some(message.into()),
        }
    }
}

impl Default for SpanStatus {
    fn default() -> Self {
        Self::unset()
    }
}

/// The propagatable identity of a span: trace id, span id, sampled flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub sampled: bool,
}

impl SpanContext {
    pub fn new(trace_id: TraceId, span_id: SpanId, sampled: bool) -> Self {
        Self {
            trace_id,
            span_id,
            sampled,
        }
    }

    /// W3C trace flags byte: bit 0 = sampled.
    pub fn trace_flags(&self) -> u8 {
        u8::from(self.sampled)
    }

    pub fn is_valid(&self) -> bool {
        self.trace_id.is_valid() && self.span_id.is_valid()
    }
}

/// A timestamped event recorded on a span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    pub time: Timestamp,
    pub attributes: Vec<KeyValue>,
    pub dropped_attributes_count: u32,
}

impl SpanEvent {
    pub fn new(name: impl Into<String>, attributes: Vec<KeyValue>) -> Self {
        Self {
            name: name.into(),
            time: Timestamp::now(),
            attributes,
            dropped_attributes_count: 0,
        }
    }
}

/// A link from a span to another (possibly remote) span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanLink {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub attributes: Vec<KeyValue>,
    pub dropped_attributes_count: u32,
}

impl SpanLink {
    pub fn new(trace_id: TraceId, span_id: SpanId, attributes: Vec<KeyValue>) -> Self {
        Self {
            trace_id,
            span_id,
            attributes,
            dropped_attributes_count: 0,
        }
    }
}

/// The logical producer (library/module) a span or metric came from.
///
/// Identity is the full (name, version, schema url) tuple; two scopes that
/// differ in any component group separately on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentationScope {
    pub name: String,
    pub version: Option<String>,
    pub schema_url: Option<String>,
}

impl InstrumentationScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            schema_url: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_schema_url(mut self, schema_url: impl Into<String>) -> Self {
        self.schema_url = Some(schema_url.into());
        self
    }

    /// Identity key used when grouping records by scope.
    pub fn identity_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.name,
            self.version.as_deref().unwrap_or(""),
            self.schema_url.as_deref().unwrap_or("")
        )
    }
}

/// A sealed span, immutable once built.
#[derive(Debug, Clone)]
pub struct SpanRecord {
    pub context: SpanContext,
    pub parent_span_id: Option<SpanId>,
    pub name: String,
    pub kind: SpanKind,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    /// Ordered attribute set; keys are unique (last write wins).
    pub attributes: Vec<KeyValue>,
    pub events: Vec<SpanEvent>,
    pub links: Vec<SpanLink>,
    pub status: SpanStatus,
    /// Integrity counters carried through the wire; limit enforcement is the
    /// recorder's concern, not the exporter's.
    pub dropped_attributes_count: u32,
    pub dropped_events_count: u32,
    pub dropped_links_count: u32,
    pub resource: Arc<Resource>,
    pub scope: InstrumentationScope,
}

impl SpanRecord {
    /// Duration of the span in nanoseconds.
    pub fn duration_nanos(&self) -> u64 {
        self.end_time.unix_nanos().saturating_sub(self.start_time.unix_nanos())
    }
}

/// Builds a minimal sealed record for tests in this crate.
#[cfg(test)]
pub(crate) fn test_record(name: &str) -> SpanRecord {
    let now = Timestamp::now();
    SpanRecord {
        context: SpanContext::new(TraceId::random(), SpanId::random(), true),
        parent_span_id: None,
        name: name.to_string(),
        kind: SpanKind::Internal,
        start_time: now,
        end_time: now,
        attributes: vec![KeyValue::new("k", "v")],
        events: Vec::new(),
        links: Vec::new(),
        status: SpanStatus::unset(),
        dropped_attributes_count: 0,
        dropped_events_count: 0,
        dropped_links_count: 0,
        resource: Arc::new(Resource::builder().with_service_name("test").build()),
        scope: InstrumentationScope::new("test-lib"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_ids_are_valid_and_distinct() {
        let a = TraceId::random();
        let b = TraceId::random();
        assert!(a.is_valid());
        assert!(b.is_valid());
        assert_ne!(a, b);

        let s = SpanId::random();
        assert!(s.is_valid());
    }

    #[test]
    fn test_id_hex_display_round_trip() {
        let trace_id = TraceId::random();
        let parsed = TraceId::from_hex(&trace_id.to_string()).unwrap();
        assert_eq!(trace_id, parsed);

        let span_id = SpanId::random();
        let parsed = SpanId::from_hex(&span_id.to_string()).unwrap();
        assert_eq!(span_id, parsed);
    }

    #[test]
    fn test_id_hex_rejects_bad_input() {
        assert!(TraceId::from_hex("short").is_none());
        assert!(TraceId::from_hex(&"0".repeat(32)).is_none()); // all-zero is invalid
        assert!(SpanId::from_hex("zzzzzzzzzzzzzzzz").is_none());
    }

    #[test]
    fn test_timestamp_round_trip() {
        // Remainders across [0, 1e9)
        for nanos in [0u32, 1, 999, 1_000_000, 999_999_999] {
            let ts = Timestamp {
                seconds: 1_700_000_123,
                nanos,
            };
            assert_eq!(Timestamp::from_unix_nanos(ts.unix_nanos()), ts);
        }
    }

    #[test]
    fn test_timestamp_flattening() {
        let ts = Timestamp {
            seconds: 2,
            nanos: 5,
        };
        assert_eq!(ts.unix_nanos(), 2_000_000_005);
    }

    #[test]
    fn test_trace_flags() {
        let sampled = SpanContext::new(TraceId::random(), SpanId::random(), true);
        let unsampled = SpanContext::new(TraceId::random(), SpanId::random(), false);
        assert_eq!(sampled.trace_flags(), 1);
        assert_eq!(unsampled.trace_flags(), 0);
    }

    #[test]
    fn test_scope_identity_key_distinguishes_versions() {
        let a = InstrumentationScope::new("lib").with_version("1.0");
        let b = InstrumentationScope::new("lib").with_version("2.0");
        let c = InstrumentationScope::new("lib").with_version("1.0");
        assert_ne!(a.identity_key(), b.identity_key());
        assert_eq!(a.identity_key(), c.identity_key());
    }
}
