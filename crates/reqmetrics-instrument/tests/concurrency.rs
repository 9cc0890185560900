//! Concurrent event delivery and handler registration.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use serde_json::json;

use reqmetrics_core::config::MapConfig;
use reqmetrics_core::event::{Payload, RequestEvent, PROCESS_ACTION_EVENT};
use reqmetrics_instrument::bus::Notifications;
use reqmetrics_instrument::config::InstrumentConfig;
use reqmetrics_instrument::sink::MemorySink;
use reqmetrics_instrument::Instrumentation;

const THREADS: usize = 8;
const EVENTS_PER_THREAD: usize = 250;

fn event_for(controller: &str) -> RequestEvent {
    let payload = Payload::new()
        .with("params", json!({ "action": "index", "controller": controller }))
        .with("method", "GET")
        .with("status", 200);
    RequestEvent::new(payload, 20.0).with_db_runtime(4.0)
}

fn labels_for(controller: &str) -> [(&str, &str); 7] {
    [
        ("action", "index"),
        ("application", "myapp"),
        ("controller", controller),
        ("environment", "development"),
        ("format", "html"),
        ("method", "get"),
        ("status", "200"),
    ]
}

#[test]
fn no_lost_updates_across_threads() {
    let sink = Arc::new(MemorySink::new());
    let bus = Notifications::new();
    let config = Arc::new(MapConfig::new().with("APPLICATION_NAME", "myapp"));
    let inst = Instrumentation::new(InstrumentConfig::default(), sink.clone(), config);

    let handled = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&handled);
    inst.on_controller_action(move |_, _| {
        h.fetch_add(1, Ordering::Relaxed);
        Ok(())
    });
    inst.install(&bus).unwrap();

    thread::scope(|s| {
        for t in 0..THREADS {
            let bus = &bus;
            s.spawn(move || {
                let controller = format!("c{t}");
                for _ in 0..EVENTS_PER_THREAD {
                    bus.publish(PROCESS_ACTION_EVENT, &event_for(&controller)).unwrap();
                }
            });
        }
    });

    let total = THREADS * EVENTS_PER_THREAD;
    assert_eq!(sink.counter_total("rails_requests_total"), total as u64);
    assert_eq!(sink.series_count("rails_requests_total"), THREADS);
    assert_eq!(handled.load(Ordering::Relaxed), total);

    for t in 0..THREADS {
        let controller = format!("c{t}");
        let labels = labels_for(&controller);
        assert_eq!(
            sink.counter_value("rails_requests_total", &labels),
            Some(EVENTS_PER_THREAD as u64)
        );
        let db = sink.histogram_snapshot("rails_db_runtime", &labels).unwrap();
        assert_eq!(db.count, EVENTS_PER_THREAD as u64);
        // 0.004 lands in the first bucket only
        assert_eq!(db.buckets[0], (0.005, EVENTS_PER_THREAD as u64));
    }
}

#[test]
fn registration_during_delivery_loses_no_handlers() {
    let sink = Arc::new(MemorySink::new());
    let bus = Notifications::new();
    let config = Arc::new(MapConfig::new().with("APPLICATION_NAME", "myapp"));
    let inst = Instrumentation::new(InstrumentConfig::default(), sink, config);
    inst.install(&bus).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));

    thread::scope(|s| {
        for _ in 0..4 {
            let calls = Arc::clone(&calls);
            let inst = &inst;
            s.spawn(move || {
                for _ in 0..25 {
                    let calls = Arc::clone(&calls);
                    inst.on_controller_action(move |_, _| {
                        calls.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    });
                }
            });
        }
        for _ in 0..4 {
            let bus = &bus;
            s.spawn(move || {
                for _ in 0..50 {
                    bus.publish(PROCESS_ACTION_EVENT, &event_for("posts")).unwrap();
                }
            });
        }
    });

    calls.store(0, Ordering::Relaxed);
    bus.publish(PROCESS_ACTION_EVENT, &event_for("posts")).unwrap();
    assert_eq!(calls.load(Ordering::Relaxed), 100);
}
