//! In-process metrics sink.
//!
//! Counter and histogram families with dynamic labels backed by `DashMap`.
//! Labels are flattened into sorted key vectors to keep deterministic
//! ordering. Histogram buckets come from the metric definition (seconds);
//! bucket counts are cumulative like Prometheus `le` buckets.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use reqmetrics_core::labels::LabelSet;
use reqmetrics_core::metric::{MetricDefinition, MetricKind};
use reqmetrics_core::{ReqMetricsError, Result};

use super::{Counter, Histogram, MetricsSink};

type SeriesKey = Vec<(String, String)>;

fn sorted_key<'a, 'b>(pairs: impl Iterator<Item = (&'a str, &'b str)>) -> SeriesKey {
    let mut key: SeriesKey = pairs.map(|(k, v)| (k.to_string(), v.to_string())).collect();
    key.sort();
    key
}

/// Build the storage key, rejecting tags the metric never declared.
fn checked_key(def: &MetricDefinition, labels: &LabelSet) -> Result<SeriesKey> {
    if let Some((k, _)) = labels.iter().find(|(k, _)| !def.has_tag(k)) {
        return Err(ReqMetricsError::UnknownLabel {
            metric: def.full_name(),
            key: k.to_string(),
        });
    }
    Ok(sorted_key(labels.iter()))
}

pub struct CounterVec {
    def: MetricDefinition,
    map: DashMap<SeriesKey, AtomicU64>,
}

impl CounterVec {
    fn new(def: MetricDefinition) -> Self {
        Self { def, map: DashMap::new() }
    }

    fn get(&self, key: &SeriesKey) -> Option<u64> {
        self.map.get(key).map(|c| c.load(Ordering::Relaxed))
    }

    fn total(&self) -> u64 {
        self.map.iter().map(|r| r.value().load(Ordering::Relaxed)).sum()
    }
}

impl Counter for CounterVec {
    fn increment(&self, labels: &LabelSet) -> Result<()> {
        let key = checked_key(&self.def, labels)?;
        let counter = self.map.entry(key).or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

struct AtomicHistogram {
    count: AtomicU64,
    // f64 bits, updated with a CAS loop.
    sum: AtomicU64,
    buckets: Vec<AtomicU64>,
}

impl AtomicHistogram {
    fn new(n: usize) -> Self {
        Self {
            count: AtomicU64::new(0),
            sum: AtomicU64::new(0f64.to_bits()),
            buckets: (0..n).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    fn add_sum(&self, v: f64) {
        let mut cur = self.sum.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(cur) + v).to_bits();
            match self.sum.compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return,
                Err(actual) => cur = actual,
            }
        }
    }
}

/// Read-only copy of one histogram series.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: f64,
    /// `(le, cumulative count)` per declared bucket.
    pub buckets: Vec<(f64, u64)>,
}

pub struct HistogramVec {
    def: MetricDefinition,
    bounds: &'static [f64],
    map: DashMap<SeriesKey, AtomicHistogram>,
}

impl HistogramVec {
    fn new(def: MetricDefinition) -> Self {
        let bounds = def.buckets.unwrap_or(&[]);
        Self { def, bounds, map: DashMap::new() }
    }

    fn snapshot(&self, key: &SeriesKey) -> Option<HistogramSnapshot> {
        self.map.get(key).map(|h| HistogramSnapshot {
            count: h.count.load(Ordering::Relaxed),
            sum: f64::from_bits(h.sum.load(Ordering::Relaxed)),
            buckets: self
                .bounds
                .iter()
                .zip(h.buckets.iter())
                .map(|(&le, c)| (le, c.load(Ordering::Relaxed)))
                .collect(),
        })
    }
}

impl Histogram for HistogramVec {
    fn measure(&self, labels: &LabelSet, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(ReqMetricsError::InvalidValue {
                metric: self.def.full_name(),
                value,
            });
        }
        let key = checked_key(&self.def, labels)?;
        let hist = self
            .map
            .entry(key)
            .or_insert_with(|| AtomicHistogram::new(self.bounds.len()));

        hist.count.fetch_add(1, Ordering::Relaxed);
        hist.add_sum(value);

        // Cumulative buckets: increment every bucket whose bound covers the value
        for (i, &le) in self.bounds.iter().enumerate() {
            if value <= le {
                hist.buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
enum Family {
    Counter(Arc<CounterVec>),
    Histogram(Arc<HistogramVec>),
}

impl Family {
    fn def(&self) -> &MetricDefinition {
        match self {
            Family::Counter(c) => &c.def,
            Family::Histogram(h) => &h.def,
        }
    }
}

/// `MetricsSink` that keeps every series in memory.
#[derive(Default)]
pub struct MemorySink {
    families: DashMap<String, Family>,
    declared: Mutex<Vec<MetricDefinition>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `def`, or hand back the family already declared with an
    /// identical definition. A conflicting definition under the same name
    /// is `DuplicateMetric`.
    fn declare(&self, def: &MetricDefinition, make: impl FnOnce() -> Family) -> Result<Family> {
        let name = def.full_name();
        match self.families.entry(name.clone()) {
            Entry::Occupied(slot) => {
                let existing = slot.get();
                if existing.def() != def {
                    return Err(ReqMetricsError::DuplicateMetric(name));
                }
                tracing::debug!(metric = %name, "metric already declared, reusing");
                Ok(existing.clone())
            }
            Entry::Vacant(slot) => {
                let family = make();
                slot.insert(family.clone());
                self.declared
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .push(def.clone());
                tracing::debug!(metric = %name, kind = def.kind.as_str(), "metric declared");
                Ok(family)
            }
        }
    }

    /// Declared definitions, in declaration order.
    pub fn definitions(&self) -> Vec<MetricDefinition> {
        self.declared.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Current value of one counter series.
    pub fn counter_value(&self, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
        match self.families.get(name)?.value() {
            Family::Counter(c) => c.get(&sorted_key(labels.iter().copied())),
            Family::Histogram(_) => None,
        }
    }

    /// Sum across every series of a counter.
    pub fn counter_total(&self, name: &str) -> u64 {
        match self.families.get(name).as_deref() {
            Some(Family::Counter(c)) => c.total(),
            _ => 0,
        }
    }

    /// Number of distinct label combinations seen by a metric.
    pub fn series_count(&self, name: &str) -> usize {
        match self.families.get(name).as_deref() {
            Some(Family::Counter(c)) => c.map.len(),
            Some(Family::Histogram(h)) => h.map.len(),
            None => 0,
        }
    }

    pub fn histogram_snapshot(
        &self,
        name: &str,
        labels: &[(&str, &str)],
    ) -> Option<HistogramSnapshot> {
        match self.families.get(name)?.value() {
            Family::Histogram(h) => h.snapshot(&sorted_key(labels.iter().copied())),
            Family::Counter(_) => None,
        }
    }
}

impl MetricsSink for MemorySink {
    fn counter(&self, def: &MetricDefinition) -> Result<Arc<dyn Counter>> {
        if def.kind != MetricKind::Counter {
            return Err(ReqMetricsError::Internal(format!(
                "{} is not a counter",
                def.full_name()
            )));
        }
        match self.declare(def, || Family::Counter(Arc::new(CounterVec::new(def.clone()))))? {
            Family::Counter(c) => Ok(c),
            Family::Histogram(_) => Err(ReqMetricsError::DuplicateMetric(def.full_name())),
        }
    }

    fn histogram(&self, def: &MetricDefinition) -> Result<Arc<dyn Histogram>> {
        if def.kind != MetricKind::Histogram {
            return Err(ReqMetricsError::Internal(format!(
                "{} is not a histogram",
                def.full_name()
            )));
        }
        match self.declare(def, || Family::Histogram(Arc::new(HistogramVec::new(def.clone()))))? {
            Family::Histogram(h) => Ok(h),
            Family::Counter(_) => Err(ReqMetricsError::DuplicateMetric(def.full_name())),
        }
    }
}
