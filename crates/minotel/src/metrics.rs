//! Metric instruments, aggregation, and the collected snapshot model.
//!
//! Instruments are cheap cloneable handles onto shared aggregation state,
//! keyed per attribute set. A metric's value type is declared by the
//! instrument that created it (`u64_counter` vs `f64_counter`) and is
//! preserved all the way through encoding: integer-valued points stay
//! integers on the wire.
//!
//! Collection is pull-based: [`MeterProvider::collect`] produces a
//! single-interval [`ResourceMetrics`] snapshot. Under [`Temporality::Delta`]
//! the accumulated sums and histograms are drained (each export carries only
//! the increment since the prior collection); under
//! [`Temporality::Cumulative`] state is retained and exports carry the
//! running total since start. Gauges always report their last value and are
//! never drained.

use crate::attribute::{canonical_attributes, KeyValue};
use crate::resource::Resource;
use crate::span::{InstrumentationScope, Timestamp};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Default explicit bucket boundaries for histograms.
pub const DEFAULT_HISTOGRAM_BOUNDS: &[f64] = &[
    0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 2500.0, 5000.0, 7500.0,
    10000.0,
];

/// How reported values relate to previous reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Temporality {
    /// Each export carries the increment since the prior collection.
    Delta,
    /// Each export carries the running total since start.
    #[default]
    Cumulative,
}

/// A numeric point value; the Int/Double split mirrors the declared
/// instrument value type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberValue {
    Int(i64),
    Double(f64),
}

/// One sum/gauge data point.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberDataPoint {
    pub attributes: Vec<KeyValue>,
    pub start_time: Timestamp,
    pub time: Timestamp,
    pub value: NumberValue,
}

/// One histogram data point with explicit bucket boundaries.
///
/// `counts` has one more entry than `bounds`: the final bucket counts values
/// above the last boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramDataPoint {
    pub attributes: Vec<KeyValue>,
    pub start_time: Timestamp,
    pub time: Timestamp,
    pub bounds: Vec<f64>,
    pub counts: Vec<u64>,
    pub sum: f64,
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// The aggregated data of one metric.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricData {
    Sum {
        temporality: Temporality,
        is_monotonic: bool,
        points: Vec<NumberDataPoint>,
    },
    Gauge {
        points: Vec<NumberDataPoint>,
    },
    Histogram {
        temporality: Temporality,
        points: Vec<HistogramDataPoint>,
    },
}

/// One named metric in a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub description: String,
    pub unit: String,
    pub data: MetricData,
}

/// Metrics of one instrumentation scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeMetrics {
    pub scope: InstrumentationScope,
    pub metrics: Vec<Metric>,
}

/// A single-interval snapshot handed to the metrics exporter.
#[derive(Debug, Clone)]
pub struct ResourceMetrics {
    pub resource: Arc<Resource>,
    pub scope_metrics: Vec<ScopeMetrics>,
}

impl ResourceMetrics {
    /// Returns `true` if the snapshot carries no data points at all.
    pub fn is_empty(&self) -> bool {
        self.scope_metrics.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstrumentKind {
    CounterU64,
    CounterF64,
    Gauge,
    Histogram,
}

#[derive(Debug, Clone)]
struct HistogramAgg {
    counts: Vec<u64>,
    sum: f64,
    count: u64,
    min: f64,
    max: f64,
}

#[derive(Debug, Clone)]
enum Aggregation {
    SumInt(i64),
    SumDouble(f64),
    LastValue(f64),
    Histogram(HistogramAgg),
}

#[derive(Debug, Clone)]
struct PointState {
    key: String,
    attributes: Vec<KeyValue>,
    start: Timestamp,
    agg: Aggregation,
}

#[derive(Debug)]
struct Instrument {
    name: String,
    description: String,
    unit: String,
    kind: InstrumentKind,
    bounds: Vec<f64>,
    // Vec keeps first-seen attribute-set order; sets per instrument are few
    points: Mutex<Vec<PointState>>,
}

impl Instrument {
    fn update(&self, attributes: &[KeyValue], apply: impl FnOnce(&mut Aggregation)) {
        let key = canonical_attributes(attributes);
        let mut points = self.points.lock().unwrap();

        if let Some(state) = points.iter_mut().find(|p| p.key == key) {
            apply(&mut state.agg);
            return;
        }

        let mut agg = self.zero_aggregation();
        apply(&mut agg);
        points.push(PointState {
            key,
            attributes: attributes.to_vec(),
            start: Timestamp::now(),
            agg,
        });
    }

    fn zero_aggregation(&self) -> Aggregation {
        match self.kind {
            InstrumentKind::CounterU64 => Aggregation::SumInt(0),
            InstrumentKind::CounterF64 => Aggregation::SumDouble(0.0),
            InstrumentKind::Gauge => Aggregation::LastValue(0.0),
            InstrumentKind::Histogram => Aggregation::Histogram(HistogramAgg {
                counts: vec![0; self.bounds.len() + 1],
                sum: 0.0,
                count: 0,
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
            }),
        }
    }

    /// Builds this instrument's contribution to a snapshot, or `None` when
    /// no points have accumulated.
    fn collect(&self, temporality: Temporality, now: Timestamp) -> Option<Metric> {
        let mut points = self.points.lock().unwrap();
        if points.is_empty() {
            return None;
        }

        // Gauges are never drained; sums and histograms drain under Delta
        let drains = matches!(temporality, Temporality::Delta)
            && !matches!(self.kind, InstrumentKind::Gauge);
        let snapshot: Vec<PointState> = if drains {
            std::mem::take(&mut *points)
        } else {
            points.clone()
        };
        drop(points);

        let data = match self.kind {
            InstrumentKind::CounterU64 | InstrumentKind::CounterF64 => MetricData::Sum {
                temporality,
                is_monotonic: true,
                points: snapshot
                    .into_iter()
                    .map(|p| NumberDataPoint {
                        attributes: p.attributes,
                        start_time: p.start,
                        time: now,
                        value: match p.agg {
                            Aggregation::SumInt(v) => NumberValue::Int(v),
                            Aggregation::SumDouble(v) => NumberValue::Double(v),
                            _ => NumberValue::Int(0),
                        },
                    })
                    .collect(),
            },
            InstrumentKind::Gauge => MetricData::Gauge {
                points: snapshot
                    .into_iter()
                    .map(|p| NumberDataPoint {
                        attributes: p.attributes,
                        start_time: p.start,
                        time: now,
                        value: match p.agg {
                            Aggregation::LastValue(v) => NumberValue::Double(v),
                            _ => NumberValue::Double(0.0),
                        },
                    })
                    .collect(),
            },
            InstrumentKind::Histogram => MetricData::Histogram {
                temporality,
                points: snapshot
                    .into_iter()
                    .map(|p| {
                        let Aggregation::Histogram(h) = p.agg else {
                            unreachable!("histogram instrument holds histogram state");
                        };
                        HistogramDataPoint {
                            attributes: p.attributes,
                            start_time: p.start,
                            time: now,
                            bounds: self.bounds.clone(),
                            counts: h.counts,
                            sum: h.sum,
                            count: h.count,
                            min: (h.count > 0).then_some(h.min),
                            max: (h.count > 0).then_some(h.max),
                        }
                    })
                    .collect(),
            },
        };

        Some(Metric {
            name: self.name.clone(),
            description: self.description.clone(),
            unit: self.unit.clone(),
            data,
        })
    }
}

/// Monotonic counter with an integer value type.
#[derive(Clone)]
pub struct U64Counter {
    instrument: Arc<Instrument>,
}

impl U64Counter {
    /// Adds `delta` under the given attribute set.
    pub fn add(&self, delta: u64, attributes: &[KeyValue]) {
        let delta = i64::try_from(delta).unwrap_or(i64::MAX);
        self.instrument.update(attributes, |agg| {
            if let Aggregation::SumInt(v) = agg {
                *v = v.saturating_add(delta);
            }
        });
    }
}

/// Monotonic counter with a floating-point value type.
#[derive(Clone)]
pub struct F64Counter {
    instrument: Arc<Instrument>,
}

impl F64Counter {
    /// Adds `delta` under the given attribute set. Negative deltas are
    /// ignored: the sum is monotonic.
    pub fn add(&self, delta: f64, attributes: &[KeyValue]) {
        if delta < 0.0 || !delta.is_finite() {
            warn!(instrument = %self.instrument.name, delta, "ignored non-monotonic counter delta");
            return;
        }
        self.instrument.update(attributes, |agg| {
            if let Aggregation::SumDouble(v) = agg {
                *v += delta;
            }
        });
    }
}

/// Last-value gauge.
#[derive(Clone)]
pub struct F64Gauge {
    instrument: Arc<Instrument>,
}

impl F64Gauge {
    /// Records the current value under the given attribute set.
    pub fn record(&self, value: f64, attributes: &[KeyValue]) {
        self.instrument.update(attributes, |agg| {
            if let Aggregation::LastValue(v) = agg {
                *v = value;
            }
        });
    }
}

/// Explicit-bounds histogram.
#[derive(Clone)]
pub struct F64Histogram {
    instrument: Arc<Instrument>,
}

impl F64Histogram {
    /// Records one observation under the given attribute set.
    pub fn record(&self, value: f64, attributes: &[KeyValue]) {
        if !value.is_finite() {
            warn!(instrument = %self.instrument.name, value, "ignored non-finite histogram value");
            return;
        }
        let bucket = self
            .instrument
            .bounds
            .iter()
            .position(|bound| value <= *bound)
            .unwrap_or(self.instrument.bounds.len());

        self.instrument.update(attributes, |agg| {
            if let Aggregation::Histogram(h) = agg {
                h.counts[bucket] += 1;
                h.sum += value;
                h.count += 1;
                h.min = h.min.min(value);
                h.max = h.max.max(value);
            }
        });
    }
}

struct MeterInner {
    scope: InstrumentationScope,
    instruments: Mutex<Vec<Arc<Instrument>>>,
}

impl MeterInner {
    /// Registers an instrument, returning the existing one when the same
    /// (name, kind) was registered before; repeated lookups share state.
    fn register(
        &self,
        name: String,
        description: String,
        unit: String,
        kind: InstrumentKind,
        bounds: Vec<f64>,
    ) -> Arc<Instrument> {
        let mut instruments = self.instruments.lock().unwrap();
        if let Some(existing) = instruments
            .iter()
            .find(|i| i.name == name && i.kind == kind)
        {
            return Arc::clone(existing);
        }

        let instrument = Arc::new(Instrument {
            name,
            description,
            unit,
            kind,
            bounds,
            points: Mutex::new(Vec::new()),
        });
        instruments.push(Arc::clone(&instrument));
        instrument
    }
}

/// Per-scope instrument factory.
#[derive(Clone)]
pub struct Meter {
    inner: Arc<MeterInner>,
}

impl Meter {
    /// Starts building a monotonic integer counter.
    pub fn u64_counter(&self, name: impl Into<String>) -> InstrumentBuilder<'_, U64Counter> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Starts building a monotonic floating-point counter.
    pub fn f64_counter(&self, name: impl Into<String>) -> InstrumentBuilder<'_, F64Counter> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Starts building a last-value gauge.
    pub fn f64_gauge(&self, name: impl Into<String>) -> InstrumentBuilder<'_, F64Gauge> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Starts building an explicit-bounds histogram.
    pub fn f64_histogram(&self, name: impl Into<String>) -> InstrumentBuilder<'_, F64Histogram> {
        InstrumentBuilder::new(self, name.into())
    }
}

/// Builder for an instrument handle.
pub struct InstrumentBuilder<'m, T> {
    meter: &'m Meter,
    name: String,
    description: String,
    unit: String,
    boundaries: Option<Vec<f64>>,
    _handle: std::marker::PhantomData<T>,
}

impl<'m, T> InstrumentBuilder<'m, T> {
    fn new(meter: &'m Meter, name: String) -> Self {
        Self {
            meter,
            name,
            description: String::new(),
            unit: String::new(),
            boundaries: None,
            _handle: std::marker::PhantomData,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    fn register(self, kind: InstrumentKind, bounds: Vec<f64>) -> Arc<Instrument> {
        self.meter
            .inner
            .register(self.name, self.description, self.unit, kind, bounds)
    }
}

impl InstrumentBuilder<'_, U64Counter> {
    pub fn build(self) -> U64Counter {
        U64Counter {
            instrument: self.register(InstrumentKind::CounterU64, Vec::new()),
        }
    }
}

impl InstrumentBuilder<'_, F64Counter> {
    pub fn build(self) -> F64Counter {
        F64Counter {
            instrument: self.register(InstrumentKind::CounterF64, Vec::new()),
        }
    }
}

impl InstrumentBuilder<'_, F64Gauge> {
    pub fn build(self) -> F64Gauge {
        F64Gauge {
            instrument: self.register(InstrumentKind::Gauge, Vec::new()),
        }
    }
}

impl InstrumentBuilder<'_, F64Histogram> {
    /// Overrides the default explicit bucket boundaries.
    pub fn with_boundaries(mut self, boundaries: Vec<f64>) -> Self {
        self.boundaries = Some(boundaries);
        self
    }

    pub fn build(self) -> F64Histogram {
        let bounds = self
            .boundaries
            .clone()
            .unwrap_or_else(|| DEFAULT_HISTOGRAM_BOUNDS.to_vec());
        F64Histogram {
            instrument: self.register(InstrumentKind::Histogram, bounds),
        }
    }
}

struct MeterProviderInner {
    resource: Arc<Resource>,
    temporality: Temporality,
    meters: Mutex<Vec<Arc<MeterInner>>>,
}

/// Owns all meters and produces collected snapshots.
#[derive(Clone)]
pub struct MeterProvider {
    inner: Arc<MeterProviderInner>,
}

impl MeterProvider {
    pub fn new(resource: Arc<Resource>, temporality: Temporality) -> Self {
        Self {
            inner: Arc::new(MeterProviderInner {
                resource,
                temporality,
                meters: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns the meter for `name`, creating it on first use. Repeated
    /// calls with the same scope share one meter, so a scope never groups
    /// twice on the wire.
    pub fn meter(&self, name: impl Into<String>) -> Meter {
        self.meter_with_scope(InstrumentationScope::new(name))
    }

    pub fn meter_with_scope(&self, scope: InstrumentationScope) -> Meter {
        let mut meters = self.inner.meters.lock().unwrap();
        if let Some(existing) = meters
            .iter()
            .find(|m| m.scope.identity_key() == scope.identity_key())
        {
            return Meter {
                inner: Arc::clone(existing),
            };
        }

        let inner = Arc::new(MeterInner {
            scope,
            instruments: Mutex::new(Vec::new()),
        });
        meters.push(Arc::clone(&inner));
        Meter { inner }
    }

    pub fn temporality(&self) -> Temporality {
        self.inner.temporality
    }

    /// Collects the current aggregated state into a single-interval
    /// snapshot. Scopes and instruments without data are omitted.
    pub fn collect(&self) -> ResourceMetrics {
        let now = Timestamp::now();
        let meters: Vec<Arc<MeterInner>> = self.inner.meters.lock().unwrap().clone();

        let mut scope_metrics = Vec::new();
        for meter in meters {
            let instruments: Vec<Arc<Instrument>> = meter.instruments.lock().unwrap().clone();
            let metrics: Vec<Metric> = instruments
                .iter()
                .filter_map(|i| i.collect(self.inner.temporality, now))
                .collect();
            if !metrics.is_empty() {
                scope_metrics.push(ScopeMetrics {
                    scope: meter.scope.clone(),
                    metrics,
                });
            }
        }

        ResourceMetrics {
            resource: Arc::clone(&self.inner.resource),
            scope_metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::KeyValue;

    fn provider(temporality: Temporality) -> MeterProvider {
        MeterProvider::new(
            Arc::new(Resource::builder().with_service_name("test").build()),
            temporality,
        )
    }

    fn sum_points(metric: &Metric) -> &[NumberDataPoint] {
        match &metric.data {
            MetricData::Sum { points, .. } => points,
            other => panic!("expected sum, got {other:?}"),
        }
    }

    #[test]
    fn test_counter_aggregates_per_attribute_set() {
        let provider = provider(Temporality::Cumulative);
        let meter = provider.meter("app");
        let counter = meter.u64_counter("requests").build();

        let route_a = [KeyValue::new("route", "/a")];
        let route_b = [KeyValue::new("route", "/b")];
        counter.add(1, &route_a);
        counter.add(2, &route_a);
        counter.add(5, &route_b);

        let snapshot = provider.collect();
        assert_eq!(snapshot.scope_metrics.len(), 1);
        let metric = &snapshot.scope_metrics[0].metrics[0];
        assert_eq!(metric.name, "requests");

        let points = sum_points(metric);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].value, NumberValue::Int(3));
        assert_eq!(points[1].value, NumberValue::Int(5));
    }

    #[test]
    fn test_value_type_follows_instrument_declaration() {
        let provider = provider(Temporality::Cumulative);
        let meter = provider.meter("app");
        meter.u64_counter("ints").build().add(7, &[]);
        meter.f64_counter("doubles").build().add(0.5, &[]);

        let snapshot = provider.collect();
        let metrics = &snapshot.scope_metrics[0].metrics;
        assert!(matches!(
            sum_points(&metrics[0])[0].value,
            NumberValue::Int(7)
        ));
        assert!(matches!(
            sum_points(&metrics[1])[0].value,
            NumberValue::Double(v) if v == 0.5
        ));
    }

    #[test]
    fn test_cumulative_keeps_running_total() {
        let provider = provider(Temporality::Cumulative);
        let counter = provider.meter("app").u64_counter("events").build();

        counter.add(2, &[]);
        let first = provider.collect();
        counter.add(3, &[]);
        let second = provider.collect();

        assert_eq!(
            sum_points(&first.scope_metrics[0].metrics[0])[0].value,
            NumberValue::Int(2)
        );
        assert_eq!(
            sum_points(&second.scope_metrics[0].metrics[0])[0].value,
            NumberValue::Int(5)
        );
    }

    #[test]
    fn test_delta_drains_between_collections() {
        let provider = provider(Temporality::Delta);
        let counter = provider.meter("app").u64_counter("events").build();

        counter.add(2, &[]);
        let first = provider.collect();
        assert_eq!(
            sum_points(&first.scope_metrics[0].metrics[0])[0].value,
            NumberValue::Int(2)
        );

        // Nothing accumulated since: instrument contributes nothing
        let empty = provider.collect();
        assert!(empty.is_empty());

        counter.add(3, &[]);
        let second = provider.collect();
        assert_eq!(
            sum_points(&second.scope_metrics[0].metrics[0])[0].value,
            NumberValue::Int(3)
        );
    }

    #[test]
    fn test_gauge_keeps_last_value_even_under_delta() {
        let provider = provider(Temporality::Delta);
        let gauge = provider.meter("app").f64_gauge("temperature").build();

        gauge.record(20.0, &[]);
        gauge.record(22.5, &[]);
        let first = provider.collect();
        let second = provider.collect();

        for snapshot in [first, second] {
            let MetricData::Gauge { points } = &snapshot.scope_metrics[0].metrics[0].data else {
                panic!("expected gauge");
            };
            assert_eq!(points[0].value, NumberValue::Double(22.5));
        }
    }

    #[test]
    fn test_histogram_buckets_sum_count_min_max() {
        let provider = provider(Temporality::Cumulative);
        let histogram = provider
            .meter("app")
            .f64_histogram("latency")
            .with_boundaries(vec![10.0, 100.0])
            .build();

        histogram.record(5.0, &[]);
        histogram.record(50.0, &[]);
        histogram.record(500.0, &[]);
        histogram.record(10.0, &[]); // boundary is inclusive

        let snapshot = provider.collect();
        let MetricData::Histogram { temporality, points } =
            &snapshot.scope_metrics[0].metrics[0].data
        else {
            panic!("expected histogram");
        };
        assert_eq!(*temporality, Temporality::Cumulative);

        let point = &points[0];
        assert_eq!(point.bounds, vec![10.0, 100.0]);
        assert_eq!(point.counts, vec![2, 1, 1]);
        assert_eq!(point.count, 4);
        assert_eq!(point.sum, 565.0);
        assert_eq!(point.min, Some(5.0));
        assert_eq!(point.max, Some(500.0));
    }

    #[test]
    fn test_repeated_instrument_lookup_shares_state() {
        let provider = provider(Temporality::Cumulative);
        let meter = provider.meter("app");
        meter.u64_counter("hits").build().add(1, &[]);
        meter.u64_counter("hits").build().add(1, &[]);

        let snapshot = provider.collect();
        let metrics = &snapshot.scope_metrics[0].metrics;
        assert_eq!(metrics.len(), 1);
        assert_eq!(sum_points(&metrics[0])[0].value, NumberValue::Int(2));
    }

    #[test]
    fn test_meters_dedupe_by_scope() {
        let provider = provider(Temporality::Cumulative);
        provider.meter("app").u64_counter("a").build().add(1, &[]);
        provider.meter("app").u64_counter("b").build().add(1, &[]);

        let snapshot = provider.collect();
        assert_eq!(snapshot.scope_metrics.len(), 1);
        assert_eq!(snapshot.scope_metrics[0].metrics.len(), 2);
    }

    #[test]
    fn test_monotonic_counter_ignores_negative_delta() {
        let provider = provider(Temporality::Cumulative);
        let counter = provider.meter("app").f64_counter("work").build();
        counter.add(1.5, &[]);
        counter.add(-4.0, &[]);

        let snapshot = provider.collect();
        assert_eq!(
            sum_points(&snapshot.scope_metrics[0].metrics[0])[0].value,
            NumberValue::Double(1.5)
        );
    }

    #[test]
    fn test_empty_provider_collects_empty_snapshot() {
        let provider = provider(Temporality::Cumulative);
        provider.meter("app").u64_counter("unused").build();
        assert!(provider.collect().is_empty());
    }
}
