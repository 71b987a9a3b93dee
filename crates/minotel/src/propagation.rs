//! W3C `traceparent` header formatting and parsing.

use crate::span::{SpanContext, SpanId, TraceId};

/// Header name carrying trace context on outgoing calls.
pub const TRACEPARENT_HEADER: &str = "traceparent";

const SUPPORTED_VERSION: &str = "00";

/// Renders a span context as a `traceparent` value:
/// `00-<trace id hex>-<span id hex>-<flags hex>`.
pub fn format_traceparent(span_context: &SpanContext) -> String {
    format!(
        "{SUPPORTED_VERSION}-{}-{}-{:02x}",
        span_context.trace_id,
        span_context.span_id,
        span_context.trace_flags()
    )
}

/// Parses a `traceparent` value back into a span context.
///
/// Returns `None` for malformed input, unknown versions, or all-zero ids.
pub fn parse_traceparent(header: &str) -> Option<SpanContext> {
    let mut parts = header.trim().split('-');

    let version = parts.next()?;
    if version != SUPPORTED_VERSION {
        return None;
    }

    let trace_id = TraceId::from_hex(parts.next()?)?;
    let span_id = SpanId::from_hex(parts.next()?)?;
    let flags = u8::from_str_radix(parts.next()?, 16).ok()?;

    if parts.next().is_some() {
        return None;
    }

    Some(SpanContext::new(trace_id, span_id, flags & 0x01 != 0))
}
