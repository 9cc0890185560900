//! Installation idempotence and sink declaration rules.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use serde_json::json;

use reqmetrics_core::config::MapConfig;
use reqmetrics_core::event::{Payload, RequestEvent, PROCESS_ACTION_EVENT};
use reqmetrics_core::labels::{LabelKey, LabelSet};
use reqmetrics_core::metric::{MetricDefinition, MetricKind};
use reqmetrics_core::{ReqMetricsError, Result};
use reqmetrics_instrument::bus::{EventBus, Notifications, Subscriber};
use reqmetrics_instrument::config::InstrumentConfig;
use reqmetrics_instrument::registry::MetricRegistry;
use reqmetrics_instrument::sink::{Counter, Histogram, MemorySink, MetricsSink};
use reqmetrics_instrument::Instrumentation;

struct RefusingBus;

/// Refuses the first subscription, then delegates.
struct RefuseOnceBus {
    refused: AtomicBool,
    inner: Notifications,
}

impl EventBus for RefuseOnceBus {
    fn subscribe(&self, event_name: &str, callback: Subscriber) -> Result<()> {
        if !self.refused.swap(true, Ordering::SeqCst) {
            return Err(ReqMetricsError::Subscription("not ready".into()));
        }
        self.inner.subscribe(event_name, callback)
    }
}

/// Fails the `view_runtime` declaration once, then delegates.
struct FlakySink {
    failed: AtomicBool,
    inner: MemorySink,
}

impl MetricsSink for FlakySink {
    fn counter(&self, def: &MetricDefinition) -> Result<Arc<dyn Counter>> {
        self.inner.counter(def)
    }

    fn histogram(&self, def: &MetricDefinition) -> Result<Arc<dyn Histogram>> {
        if def.name == "view_runtime" && !self.failed.swap(true, Ordering::SeqCst) {
            return Err(ReqMetricsError::Internal("sink unavailable".into()));
        }
        self.inner.histogram(def)
    }
}

impl EventBus for RefusingBus {
    fn subscribe(&self, event_name: &str, _callback: Subscriber) -> Result<()> {
        Err(ReqMetricsError::Subscription(format!("{event_name} is closed")))
    }
}

fn app_config() -> Arc<MapConfig> {
    Arc::new(MapConfig::new().with("APPLICATION_NAME", "myapp"))
}

fn event() -> RequestEvent {
    let payload = Payload::new()
        .with("params", json!({ "action": "show", "controller": "posts" }))
        .with("method", "GET")
        .with("status", 200);
    RequestEvent::new(payload, 10.0)
}

#[test]
fn install_twice_declares_and_subscribes_once() {
    let sink = Arc::new(MemorySink::new());
    let bus = Notifications::new();
    let inst = Instrumentation::new(InstrumentConfig::default(), sink.clone(), app_config());

    inst.install(&bus).unwrap();
    inst.install(&bus).unwrap();

    assert!(inst.is_installed());
    assert_eq!(sink.definitions().len(), 4);
    assert_eq!(bus.subscriber_count(PROCESS_ACTION_EVENT), 1);

    bus.publish(PROCESS_ACTION_EVENT, &event()).unwrap();
    assert_eq!(sink.counter_total("rails_requests_total"), 1);
}

#[test]
fn concurrent_installs_produce_one_subscription() {
    let sink = Arc::new(MemorySink::new());
    let bus = Notifications::new();
    let inst = Instrumentation::new(InstrumentConfig::default(), sink.clone(), app_config());

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| inst.install(&bus).unwrap());
        }
    });

    assert_eq!(sink.definitions().len(), 4);
    assert_eq!(bus.subscriber_count(PROCESS_ACTION_EVENT), 1);
}

#[test]
fn registry_returns_same_handles() {
    let sink = Arc::new(MemorySink::new());
    let registry = MetricRegistry::new(sink.clone(), "rails");
    assert!(!registry.is_installed());

    let first = registry.install().unwrap();
    let second = registry.install().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(registry.is_installed());

    let names: Vec<String> = sink.definitions().iter().map(|d| d.full_name()).collect();
    assert_eq!(
        names,
        [
            "rails_requests_total",
            "rails_request_duration",
            "rails_view_runtime",
            "rails_db_runtime"
        ]
    );
}

#[test]
fn custom_group_prefixes_metric_names() {
    let sink = Arc::new(MemorySink::new());
    let cfg = InstrumentConfig {
        group: "shop".into(),
        ..InstrumentConfig::default()
    };
    let bus = Notifications::new();
    let inst = Instrumentation::new(cfg, sink.clone(), app_config());
    inst.install(&bus).unwrap();
    bus.publish(PROCESS_ACTION_EVENT, &event()).unwrap();

    assert_eq!(sink.counter_total("shop_requests_total"), 1);
    assert_eq!(sink.counter_total("rails_requests_total"), 0);
}

#[test]
fn sink_reuses_identical_declaration_and_rejects_conflicts() {
    let sink = MemorySink::new();
    let [total, duration, ..] = MetricDefinition::request_set("rails");
    let first = sink.counter(&total).unwrap();
    let second = sink.counter(&total).unwrap();

    let mut labels = LabelSet::new();
    labels.insert(LabelKey::Application, Some("myapp".into()));
    first.increment(&labels).unwrap();
    second.increment(&labels).unwrap();
    assert_eq!(
        sink.counter_value("rails_requests_total", &[("application", "myapp")]),
        Some(2)
    );
    assert_eq!(sink.definitions().len(), 1);

    let conflicting = MetricDefinition {
        comment: "a different help text",
        ..total.clone()
    };
    let err = sink.counter(&conflicting).err().unwrap();
    assert_eq!(err.code(), "DUPLICATE_METRIC");

    let as_histogram = MetricDefinition {
        name: total.name,
        ..duration
    };
    let err = sink.histogram(&as_histogram).err().unwrap();
    assert_eq!(err.code(), "DUPLICATE_METRIC");
}

#[test]
fn sink_rejects_undeclared_label_and_non_finite_value() {
    let sink = MemorySink::new();
    let narrow = MetricDefinition {
        group: "test".into(),
        name: "narrow",
        kind: MetricKind::Histogram,
        comment: "only tagged by application",
        tag_keys: &[LabelKey::Application],
        unit: Some("seconds"),
        buckets: Some(&[0.1, 1.0]),
    };
    let hist = sink.histogram(&narrow).unwrap();

    let mut ok = LabelSet::new();
    ok.insert(LabelKey::Application, Some("myapp".into()));
    hist.measure(&ok, 0.5).unwrap();

    let mut wide = ok.clone();
    wide.insert(LabelKey::Status, Some("200".into()));
    assert_eq!(hist.measure(&wide, 0.5).unwrap_err().code(), "UNKNOWN_LABEL");
    assert_eq!(hist.measure(&ok, f64::NAN).unwrap_err().code(), "INVALID_VALUE");

    let snap = sink
        .histogram_snapshot("test_narrow", &[("application", "myapp")])
        .unwrap();
    assert_eq!(snap.count, 1);
    assert_eq!(snap.buckets, vec![(0.1, 0), (1.0, 1)]);
}

#[test]
fn eager_validation_fails_install_without_application() {
    let sink = Arc::new(MemorySink::new());
    let bus = Notifications::new();
    let config = Arc::new(MapConfig::new());
    let cfg = InstrumentConfig {
        validate_on_install: true,
        ..InstrumentConfig::default()
    };
    let inst = Instrumentation::new(cfg, sink.clone(), config.clone());

    let err = inst.install(&bus).unwrap_err();
    assert_eq!(err.code(), "MISSING_CONFIG");
    assert!(!inst.is_installed());
    assert!(sink.definitions().is_empty());

    config.set("APPLICATION_NAME", "myapp");
    inst.install(&bus).unwrap();
    assert!(inst.is_installed());
}

#[test]
fn refused_subscription_can_be_retried() {
    let sink = Arc::new(MemorySink::new());
    let inst = Instrumentation::new(InstrumentConfig::default(), sink.clone(), app_config());

    let err = inst.install(&RefusingBus).unwrap_err();
    assert_eq!(err.code(), "SUBSCRIPTION");
    assert!(!inst.is_installed());

    let bus = Notifications::new();
    inst.install(&bus).unwrap();
    assert_eq!(sink.definitions().len(), 4);
    assert_eq!(bus.subscriber_count(PROCESS_ACTION_EVENT), 1);
}

#[test]
fn reinstall_after_config_removed_is_a_no_op() {
    let sink = Arc::new(MemorySink::new());
    let bus = Notifications::new();
    let config = app_config();
    let cfg = InstrumentConfig {
        validate_on_install: true,
        ..InstrumentConfig::default()
    };
    let inst = Instrumentation::new(cfg, sink.clone(), config.clone());
    inst.install(&bus).unwrap();

    config.remove("APPLICATION_NAME");
    inst.install(&bus).unwrap();

    assert!(inst.is_installed());
    assert_eq!(sink.definitions().len(), 4);
    assert_eq!(bus.subscriber_count(PROCESS_ACTION_EVENT), 1);
}

#[test]
fn failed_declaration_can_be_retried() {
    let sink = Arc::new(FlakySink {
        failed: AtomicBool::new(false),
        inner: MemorySink::new(),
    });
    let registry = MetricRegistry::new(sink.clone(), "rails");

    let err = registry.install().err().unwrap();
    assert_eq!(err.code(), "INTERNAL");
    assert!(!registry.is_installed());

    registry.install().unwrap();
    assert!(registry.is_installed());
    assert_eq!(sink.inner.definitions().len(), 4);
}

#[test]
fn concurrent_install_reports_ok_only_once_subscribed() {
    let sink = Arc::new(MemorySink::new());
    let bus = RefuseOnceBus {
        refused: AtomicBool::new(false),
        inner: Notifications::new(),
    };
    let inst = Instrumentation::new(InstrumentConfig::default(), sink, app_config());

    let results: Vec<bool> = thread::scope(|s| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| match inst.install(&bus) {
                    Ok(()) => {
                        assert_eq!(bus.inner.subscriber_count(PROCESS_ACTION_EVENT), 1);
                        true
                    }
                    Err(e) => {
                        assert_eq!(e.code(), "SUBSCRIPTION");
                        false
                    }
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|ok| !**ok).count(), 1);
    assert_eq!(results.iter().filter(|ok| **ok).count(), 7);
    assert!(inst.is_installed());
    assert_eq!(bus.inner.subscriber_count(PROCESS_ACTION_EVENT), 1);
}
