//! Tracer provider and the span-producing surface.
//!
//! The sampler runs before any span state is allocated: a dropped span gets
//! a non-recording handle that still carries a real [`SpanContext`]
//! (trace id inherited from the parent, sampled flag cleared), so context
//! propagation and parent-based sampling keep working downstream while
//! nothing enters the export pipeline.

use crate::attribute::{set_attribute, AttributeValue, KeyValue};
use crate::context::{Context, StackContextManager};
use crate::processor::BatchSpanProcessor;
use crate::propagation::format_traceparent;
use crate::resource::Resource;
use crate::sampler::Sampler;
use crate::span::{
    InstrumentationScope, SpanContext, SpanEvent, SpanId, SpanKind, SpanLink, SpanRecord,
    SpanStatus, Timestamp, TraceId,
};
use std::fmt;
use std::sync::Arc;

struct TracerProviderInner {
    resource: Arc<Resource>,
    sampler: Box<dyn Sampler>,
    processor: Arc<BatchSpanProcessor>,
    context_manager: StackContextManager,
}

/// Creates tracers and owns the trace export pipeline wiring.
#[derive(Clone)]
pub struct TracerProvider {
    inner: Arc<TracerProviderInner>,
}

impl TracerProvider {
    pub fn new(
        resource: Arc<Resource>,
        sampler: Box<dyn Sampler>,
        processor: Arc<BatchSpanProcessor>,
        context_manager: StackContextManager,
    ) -> Self {
        Self {
            inner: Arc::new(TracerProviderInner {
                resource,
                sampler,
                processor,
                context_manager,
            }),
        }
    }

    /// Returns a tracer bound to the named instrumentation scope.
    pub fn tracer(&self, name: impl Into<String>) -> Tracer {
        self.tracer_with_scope(InstrumentationScope::new(name))
    }

    pub fn tracer_with_version(
        &self,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Tracer {
        self.tracer_with_scope(InstrumentationScope::new(name).with_version(version))
    }

    pub fn tracer_with_scope(&self, scope: InstrumentationScope) -> Tracer {
        Tracer {
            provider: Arc::clone(&self.inner),
            scope,
        }
    }

    pub fn context_manager(&self) -> &StackContextManager {
        &self.inner.context_manager
    }

    /// Exports everything currently buffered.
    pub async fn force_flush(&self) -> Result<(), crate::exporter::ExportError> {
        self.inner.processor.force_flush().await
    }

    /// Drains buffered spans and shuts the export pipeline down.
    pub async fn shutdown(&self) -> Result<(), crate::exporter::ExportError> {
        self.inner.processor.shutdown().await
    }
}

/// Produces spans for one instrumentation scope.
#[derive(Clone)]
pub struct Tracer {
    provider: Arc<TracerProviderInner>,
    scope: InstrumentationScope,
}

impl Tracer {
    /// Starts a span with defaults; the parent is taken from the active
    /// context.
    pub fn start_span(&self, name: impl Into<String>) -> SpanHandle {
        self.span_builder(name).start()
    }

    /// Starts building a span with explicit options.
    pub fn span_builder(&self, name: impl Into<String>) -> SpanBuilder<'_> {
        SpanBuilder {
            tracer: self,
            name: name.into(),
            kind: SpanKind::Internal,
            attributes: Vec::new(),
            links: Vec::new(),
            parent: None,
        }
    }

    /// Runs `f` inside a span that is active for the duration of the call.
    ///
    /// The span's status is set from the closure's result (`Ok` → OK,
    /// `Err` → ERROR with the error recorded as an exception event) and the
    /// span always ends, on both paths.
    pub fn in_span<F, T, E>(&self, name: impl Into<String>, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut SpanHandle) -> Result<T, E>,
        E: fmt::Display,
    {
        let mut span = self.start_span(name);
        let manager = &self.provider.context_manager;
        let active_cx = manager.active().with_span_context(span.span_context());

        let result = manager.run_with(active_cx, || f(&mut span));

        match &result {
            Ok(_) => span.set_status(SpanStatus::ok()),
            Err(e) => {
                span.record_exception(e);
                span.set_status(SpanStatus::error(e.to_string()));
            }
        }
        span.end();
        result
    }

    fn start(&self, builder: SpanBuilder<'_>) -> SpanHandle {
        let parent_cx = builder
            .parent
            .unwrap_or_else(|| self.provider.context_manager.active());
        let parent_sc = parent_cx.span_context().copied().filter(SpanContext::is_valid);

        let trace_id = parent_sc
            .map(|p| p.trace_id)
            .unwrap_or_else(TraceId::random);

        // Keep/drop decided before any span state is built
        let decision = self.provider.sampler.should_sample(&parent_cx, trace_id);
        let context = SpanContext::new(trace_id, SpanId::random(), decision.is_recording());

        if !decision.is_recording() {
            return SpanHandle {
                context,
                recording: None,
            };
        }

        SpanHandle {
            context,
            recording: Some(Box::new(RecordingSpan {
                name: builder.name,
                kind: builder.kind,
                parent_span_id: parent_sc.map(|p| p.span_id),
                start_time: Timestamp::now(),
                attributes: builder.attributes,
                events: Vec::new(),
                links: builder.links,
                status: SpanStatus::unset(),
                scope: self.scope.clone(),
                resource: Arc::clone(&self.provider.resource),
                processor: Arc::clone(&self.provider.processor),
            })),
        }
    }
}

/// Configures a span before it starts.
pub struct SpanBuilder<'t> {
    tracer: &'t Tracer,
    name: String,
    kind: SpanKind,
    attributes: Vec<KeyValue>,
    links: Vec<SpanLink>,
    parent: Option<Context>,
}

impl SpanBuilder<'_> {
    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        set_attribute(&mut self.attributes, key, value.into());
        self
    }

    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = KeyValue>) -> Self {
        for kv in attributes {
            set_attribute(&mut self.attributes, kv.key, kv.value);
        }
        self
    }

    pub fn with_link(mut self, link: SpanLink) -> Self {
        self.links.push(link);
        self
    }

    /// Overrides the parent context instead of consulting the active one.
    pub fn with_parent_context(mut self, parent: Context) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn start(self) -> SpanHandle {
        let tracer = self.tracer;
        tracer.start(self)
    }
}

struct RecordingSpan {
    name: String,
    kind: SpanKind,
    parent_span_id: Option<SpanId>,
    start_time: Timestamp,
    attributes: Vec<KeyValue>,
    events: Vec<SpanEvent>,
    links: Vec<SpanLink>,
    status: SpanStatus,
    scope: InstrumentationScope,
    resource: Arc<Resource>,
    processor: Arc<BatchSpanProcessor>,
}

/// A live span. Mutable only through this handle until [`SpanHandle::end`]
/// seals it; afterwards every mutator is a no-op.
pub struct SpanHandle {
    context: SpanContext,
    /// `None` for sampled-out spans and after `end`.
    recording: Option<Box<RecordingSpan>>,
}

impl SpanHandle {
    /// The propagatable identity of this span.
    pub fn span_context(&self) -> SpanContext {
        self.context
    }

    /// Returns `true` while the span is recording (sampled and not ended).
    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Sets an attribute; a repeated key takes the new value.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        if let Some(span) = self.recording.as_deref_mut() {
            set_attribute(&mut span.attributes, key, value.into());
        }
    }

    /// Records a timestamped event.
    pub fn add_event(&mut self, name: impl Into<String>, attributes: Vec<KeyValue>) {
        if let Some(span) = self.recording.as_deref_mut() {
            span.events.push(SpanEvent::new(name, attributes));
        }
    }

    /// Records an error as an `exception` event.
    pub fn record_exception(&mut self, error: &dyn fmt::Display) {
        self.add_event(
            "exception",
            vec![KeyValue::new("exception.message", error.to_string())],
        );
    }

    /// Sets the span status.
    pub fn set_status(&mut self, status: SpanStatus) {
        if let Some(span) = self.recording.as_deref_mut() {
            span.status = status;
        }
    }

    /// A context carrying this span, for activation or manual propagation.
    pub fn context(&self) -> Context {
        Context::root().with_span_context(self.context)
    }

    /// The `traceparent` header value for outgoing calls made under this
    /// span.
    pub fn traceparent(&self) -> String {
        format_traceparent(&self.context)
    }

    /// Ends the span: seals the record and hands it to the processor.
    /// Exactly once; a second call is a no-op.
    pub fn end(&mut self) {
        let Some(span) = self.recording.take() else {
            return;
        };

        let processor = Arc::clone(&span.processor);
        let record = SpanRecord {
            context: self.context,
            parent_span_id: span.parent_span_id,
            name: span.name,
            kind: span.kind,
            start_time: span.start_time,
            end_time: Timestamp::now(),
            attributes: span.attributes,
            events: span.events,
            links: span.links,
            status: span.status,
            dropped_attributes_count: 0,
            dropped_events_count: 0,
            dropped_links_count: 0,
            resource: span.resource,
            scope: span.scope,
        };
        processor.on_end(record);
    }
}
