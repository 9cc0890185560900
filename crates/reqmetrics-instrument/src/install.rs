//! Process-level instrumentation service.
//!
//! Construct one `Instrumentation` per process and share it by reference
//! (or `Arc`). It owns the metric registry and the handler registry, and
//! subscribes the event pipeline to a bus at most once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use reqmetrics_core::config::ConfigSource;
use reqmetrics_core::event::RequestEvent;
use reqmetrics_core::labels::{LabelExtractor, LabelSet};
use reqmetrics_core::Result;

use crate::bus::EventBus;
use crate::config::InstrumentConfig;
use crate::handlers::{ControllerHandler, HandlerRegistry};
use crate::registry::MetricRegistry;
use crate::sink::MetricsSink;
use crate::subscriber::EventSubscriber;

pub struct Instrumentation {
    cfg: InstrumentConfig,
    config: Arc<dyn ConfigSource>,
    registry: MetricRegistry,
    handlers: Arc<HandlerRegistry>,
    subscribed: AtomicBool,
    // Held for the whole install sequence.
    install_lock: Mutex<()>,
    subscriber: OnceLock<Arc<EventSubscriber>>,
}

impl Instrumentation {
    pub fn new(
        cfg: InstrumentConfig,
        sink: Arc<dyn MetricsSink>,
        config: Arc<dyn ConfigSource>,
    ) -> Self {
        let registry = MetricRegistry::new(sink, cfg.group.clone());
        Self {
            cfg,
            config,
            registry,
            handlers: Arc::new(HandlerRegistry::new()),
            subscribed: AtomicBool::new(false),
            install_lock: Mutex::new(()),
            subscriber: OnceLock::new(),
        }
    }

    pub fn cfg(&self) -> &InstrumentConfig {
        &self.cfg
    }

    fn extractor(&self) -> LabelExtractor {
        LabelExtractor::new(Arc::clone(&self.config))
            .with_keys(&self.cfg.application_key, &self.cfg.environment_key)
            .with_default_environment(&self.cfg.default_environment)
    }

    /// Register a callback run after every metric update. Allowed before or
    /// after `install`; there is no way to remove one.
    pub fn on_controller_action<F>(&self, handler: F)
    where
        F: Fn(&RequestEvent, &LabelSet) -> Result<()> + Send + Sync + 'static,
    {
        self.register_handler(Arc::new(handler));
    }

    pub fn register_handler(&self, handler: Arc<dyn ControllerHandler>) {
        self.handlers.register(handler);
        tracing::debug!(handlers = self.handlers.len(), "controller handler registered");
    }

    /// Declare the request metrics and subscribe to the bus.
    ///
    /// Repeated calls are silent no-ops: one definition set, one
    /// subscription. Concurrent callers are serialized, so a call returns
    /// `Ok` only once the subscription exists. A failure leaves the service
    /// uninstalled so a later call can retry.
    pub fn install(&self, bus: &dyn EventBus) -> Result<()> {
        if self.subscribed.load(Ordering::Acquire) {
            tracing::debug!(event = %self.cfg.event_name, "instrumentation already installed");
            return Ok(());
        }

        let _guard = self.install_lock.lock().unwrap_or_else(|p| p.into_inner());
        if self.subscribed.load(Ordering::Acquire) {
            tracing::debug!(event = %self.cfg.event_name, "instrumentation already installed");
            return Ok(());
        }

        let extractor = self.extractor();
        if self.cfg.validate_on_install {
            extractor.application()?;
        }

        let metrics = self.registry.install()?;

        let subscriber = Arc::new(EventSubscriber::new(
            metrics,
            Arc::clone(&self.handlers),
            extractor,
        ));
        let pipeline = Arc::clone(&subscriber);
        bus.subscribe(
            &self.cfg.event_name,
            Arc::new(move |event: &RequestEvent| pipeline.on_event(event).map(|_| ())),
        )?;

        let _ = self.subscriber.set(subscriber);
        self.subscribed.store(true, Ordering::Release);
        tracing::info!(
            event = %self.cfg.event_name,
            group = %self.cfg.group,
            "request instrumentation installed"
        );
        Ok(())
    }

    pub fn is_installed(&self) -> bool {
        self.subscribed.load(Ordering::Acquire) && self.registry.is_installed()
    }

    /// The installed pipeline, for hosts that deliver events without a bus.
    pub fn subscriber(&self) -> Option<Arc<EventSubscriber>> {
        self.subscriber.get().cloned()
    }

    pub fn handler_failures(&self) -> u64 {
        self.subscriber
            .get()
            .map(|s| s.handler_failures())
            .unwrap_or(0)
    }
}
