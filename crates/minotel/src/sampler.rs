//! Sampling: the keep/drop decision made before a span is built.
//!
//! The ratio sampler is a pure function of the trace id (no randomness at
//! decision time), so the same trace id with the same ratio always yields the
//! same decision, and a retried root call can never produce a
//! partially-sampled trace. The parent-based wrapper propagates a parent's
//! decision down the trace unconditionally; only trace roots consult the
//! ratio.

use crate::context::Context;
use crate::span::TraceId;

/// Outcome of a sampling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingDecision {
    /// Build, record, and export the span.
    RecordAndSample,
    /// Skip the span entirely; only its context propagates.
    Drop,
}

impl SamplingDecision {
    pub fn is_recording(self) -> bool {
        matches!(self, Self::RecordAndSample)
    }
}

/// Decides whether a span about to start should be recorded.
pub trait Sampler: Send + Sync {
    /// Decides for a span with `trace_id` starting under `parent`.
    fn should_sample(&self, parent: &Context, trace_id: TraceId) -> SamplingDecision;

    /// Human-readable description for diagnostics.
    fn description(&self) -> String;
}

/// Records every span.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnSampler;

impl Sampler for AlwaysOnSampler {
    fn should_sample(&self, _parent: &Context, _trace_id: TraceId) -> SamplingDecision {
        SamplingDecision::RecordAndSample
    }

    fn description(&self) -> String {
        "AlwaysOn".to_string()
    }
}

/// Drops every span.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOffSampler;

impl Sampler for AlwaysOffSampler {
    fn should_sample(&self, _parent: &Context, _trace_id: TraceId) -> SamplingDecision {
        SamplingDecision::Drop
    }

    fn description(&self) -> String {
        "AlwaysOff".to_string()
    }
}

/// Records a deterministic fraction of traces.
///
/// The low 8 bytes of the trace id, read as a big-endian integer, are
/// compared against `ratio * u64::MAX`; ids below the threshold record.
#[derive(Debug, Clone, Copy)]
pub struct TraceIdRatioSampler {
    ratio: f64,
    threshold: u64,
}

impl TraceIdRatioSampler {
    /// Creates a ratio sampler. The ratio is clamped to `[0.0, 1.0]`.
    pub fn new(ratio: f64) -> Self {
        let ratio = if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) };
        Self {
            ratio,
            threshold: (ratio * u64::MAX as f64) as u64,
        }
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }
}

impl Sampler for TraceIdRatioSampler {
    fn should_sample(&self, _parent: &Context, trace_id: TraceId) -> SamplingDecision {
        if self.ratio >= 1.0 {
            return SamplingDecision::RecordAndSample;
        }
        if trace_id.low_u64() < self.threshold {
            SamplingDecision::RecordAndSample
        } else {
            SamplingDecision::Drop
        }
    }

    fn description(&self) -> String {
        format!("TraceIdRatio({})", self.ratio)
    }
}

/// Inherits the parent's sampling decision; delegates to an inner root
/// sampler only at trace roots.
#[derive(Debug, Clone)]
pub struct ParentBasedSampler<S: Sampler> {
    root: S,
}

impl<S: Sampler> ParentBasedSampler<S> {
    pub fn new(root: S) -> Self {
        Self { root }
    }
}

impl<S: Sampler> Sampler for ParentBasedSampler<S> {
    fn should_sample(&self, parent: &Context, trace_id: TraceId) -> SamplingDecision {
        match parent.span_context() {
            Some(parent_sc) if parent_sc.is_valid() => {
                if parent_sc.sampled {
                    SamplingDecision::RecordAndSample
                } else {
                    SamplingDecision::Drop
                }
            }
            _ => self.root.should_sample(parent, trace_id),
        }
    }

    fn description(&self) -> String {
        format!("ParentBased({})", self.root.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{SpanContext, SpanId};

    #[test]
    fn test_ratio_is_deterministic() {
        let sampler = TraceIdRatioSampler::new(0.5);
        let parent = Context::root();
        for _ in 0..32 {
            let trace_id = TraceId::random();
            let first = sampler.should_sample(&parent, trace_id);
            let second = sampler.should_sample(&parent, trace_id);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_ratio_one_always_records() {
        let sampler = TraceIdRatioSampler::new(1.0);
        let parent = Context::root();
        for _ in 0..32 {
            assert!(sampler
                .should_sample(&parent, TraceId::random())
                .is_recording());
        }
        // The boundary id as well
        let max = TraceId::from_bytes([0xff; 16]);
        assert!(sampler.should_sample(&parent, max).is_recording());
    }

    #[test]
    fn test_ratio_zero_always_drops() {
        let sampler = TraceIdRatioSampler::new(0.0);
        let parent = Context::root();
        for _ in 0..32 {
            assert!(!sampler
                .should_sample(&parent, TraceId::random())
                .is_recording());
        }
    }

    #[test]
    fn test_ratio_is_clamped() {
        assert_eq!(TraceIdRatioSampler::new(7.0).ratio(), 1.0);
        assert_eq!(TraceIdRatioSampler::new(-3.0).ratio(), 0.0);
        assert_eq!(TraceIdRatioSampler::new(f64::NAN).ratio(), 0.0);
    }

    #[test]
    fn test_parent_decision_wins_over_ratio() {
        let sampler = ParentBasedSampler::new(TraceIdRatioSampler::new(0.0));

        let sampled_parent = Context::root().with_span_context(SpanContext::new(
            TraceId::random(),
            SpanId::random(),
            true,
        ));
        let trace_id = TraceId::random();
        // Ratio 0.0 would drop, but the sampled parent wins
        assert!(sampler.should_sample(&sampled_parent, trace_id).is_recording());

        let sampler = ParentBasedSampler::new(TraceIdRatioSampler::new(1.0));
        let unsampled_parent = Context::root().with_span_context(SpanContext::new(
            TraceId::random(),
            SpanId::random(),
            false,
        ));
        // Ratio 1.0 would record, but the unsampled parent wins
        assert!(!sampler
            .should_sample(&unsampled_parent, trace_id)
            .is_recording());
    }

    #[test]
    fn test_root_consults_inner_sampler() {
        let on = ParentBasedSampler::new(AlwaysOnSampler);
        let off = ParentBasedSampler::new(AlwaysOffSampler);
        let root = Context::root();
        let trace_id = TraceId::random();
        assert!(on.should_sample(&root, trace_id).is_recording());
        assert!(!off.should_sample(&root, trace_id).is_recording());
    }
}
