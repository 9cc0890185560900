//! Notification bus seam and an in-process implementation.

use std::sync::Arc;

use dashmap::DashMap;

use reqmetrics_core::event::RequestEvent;
use reqmetrics_core::Result;

/// Callback registered with a bus for one event name.
pub type Subscriber = Arc<dyn Fn(&RequestEvent) -> Result<()> + Send + Sync>;

/// The only coupling the pipeline has to the framework: one subscribe call.
pub trait EventBus: Send + Sync {
    fn subscribe(&self, event_name: &str, callback: Subscriber) -> Result<()>;
}

/// Synchronous in-process pub/sub keyed by event name.
///
/// Subscriber lists are copy-on-write so `publish` never holds a map lock
/// while callbacks run.
#[derive(Default)]
pub struct Notifications {
    subs: DashMap<String, Arc<[Subscriber]>>,
}

impl Notifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self, event_name: &str) -> usize {
        self.subs.get(event_name).map(|r| r.len()).unwrap_or(0)
    }

    /// Deliver `event` to every subscriber of `event_name` on this thread.
    ///
    /// Fatal subscriber errors abort delivery and are returned to the
    /// publisher; other errors are logged and delivery continues.
    pub fn publish(&self, event_name: &str, event: &RequestEvent) -> Result<()> {
        let subs = match self.subs.get(event_name) {
            Some(r) => Arc::clone(r.value()),
            None => return Ok(()),
        };

        for sub in subs.iter() {
            if let Err(e) = sub(event) {
                if e.is_fatal() {
                    tracing::error!(event = %event_name, error = %e, "subscriber failed fatally");
                    return Err(e);
                }
                tracing::warn!(event = %event_name, error = %e, "subscriber failed");
            }
        }
        Ok(())
    }
}

impl EventBus for Notifications {
    fn subscribe(&self, event_name: &str, callback: Subscriber) -> Result<()> {
        let mut entry = self
            .subs
            .entry(event_name.to_string())
            .or_insert_with(|| Arc::from(Vec::new()));
        let mut next: Vec<Subscriber> = entry.iter().cloned().collect();
        next.push(callback);
        *entry = Arc::from(next);
        tracing::debug!(event = %event_name, "subscribed");
        Ok(())
    }
}
