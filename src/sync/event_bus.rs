//! In-process publish/subscribe keyed by event-type label.

use crate::task::types::panic_message;
use dashmap::DashMap;
use serde_json::Value;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

/// Subscriber callback, invoked with the event type and its payload
pub type Subscriber = Arc<dyn Fn(&str, &Value) -> anyhow::Result<()> + Send + Sync + 'static>;

/// Wrap a closure as a [`Subscriber`]
pub fn subscriber<F>(callback: F) -> Subscriber
where
    F: Fn(&str, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(callback)
}

/// Publish/subscribe registry.
///
/// Subscribers are called in subscription order on the publishing thread,
/// from a snapshot taken before any of them runs. Subscribing the same
/// callback twice means it is invoked twice.
#[derive(Default)]
pub struct EventBus {
    subscribers: DashMap<String, Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, event_type: &str, subscriber: Subscriber) {
        self.subscribers
            .entry(event_type.to_string())
            .or_default()
            .push(subscriber);
        debug!(event_type, "Subscriber added");
    }

    /// Remove the first registration of `subscriber`; unknown callbacks are ignored
    pub fn unsubscribe(&self, event_type: &str, subscriber: &Subscriber) {
        if let Some(mut entry) = self.subscribers.get_mut(event_type) {
            if let Some(index) = entry.iter().position(|s| Arc::ptr_eq(s, subscriber)) {
                entry.remove(index);
            }
        }
    }

    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.subscribers
            .get(event_type)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }

    /// Deliver `data` to every subscriber of `event_type`; returns how many were invoked
    pub fn publish(&self, event_type: &str, data: &Value) -> usize {
        // Clone the list so no shard lock is held while subscribers run.
        let snapshot: Vec<Subscriber> = match self.subscribers.get(event_type) {
            Some(entry) => entry.value().clone(),
            None => return 0,
        };

        for subscriber in &snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| subscriber(event_type, data))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(event_type, "Error in event subscriber: {:#}", e),
                Err(payload) => error!(
                    event_type,
                    "Event subscriber panicked: {}",
                    panic_message(payload.as_ref())
                ),
            }
        }
        snapshot.len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("event_types", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, label: &'static str) -> Subscriber {
        let log = Arc::clone(log);
        subscriber(move |event_type, data| {
            log.lock().unwrap().push(format!("{}:{}:{}", label, event_type, data));
            Ok(())
        })
    }

    #[test]
    fn test_publish_in_subscription_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("task.created", recorder(&log, "a"));
        bus.subscribe("task.created", recorder(&log, "b"));
        bus.subscribe("other", recorder(&log, "c"));

        assert_eq!(bus.publish("task.created", &json!(1)), 2);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:task.created:1".to_string(), "b:task.created:1".to_string()]
        );
        assert_eq!(bus.publish("nobody", &json!(null)), 0);
    }

    #[test]
    fn test_duplicate_subscription_invoked_twice() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let dup = recorder(&log, "dup");
        bus.subscribe("tick", Arc::clone(&dup));
        bus.subscribe("tick", Arc::clone(&dup));

        bus.publish("tick", &json!(null));
        assert_eq!(log.lock().unwrap().len(), 2);

        bus.unsubscribe("tick", &dup);
        assert_eq!(bus.subscriber_count("tick"), 1);
    }

    #[test]
    fn test_unsubscribe_unknown_is_noop() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let stranger = recorder(&log, "x");
        bus.unsubscribe("missing", &stranger);

        bus.subscribe("present", recorder(&log, "y"));
        bus.unsubscribe("present", &stranger);
        assert_eq!(bus.subscriber_count("present"), 1);
    }

    #[test]
    fn test_failing_subscriber_does_not_stop_delivery() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("evt", subscriber(|_, _| Err(anyhow::anyhow!("subscriber failed"))));
        bus.subscribe("evt", subscriber(|_, _| panic!("subscriber panicked")));
        bus.subscribe("evt", recorder(&log, "last"));

        assert_eq!(bus.publish("evt", &json!("x")), 3);
        assert_eq!(*log.lock().unwrap(), vec!["last:evt:\"x\"".to_string()]);
    }

    #[test]
    fn test_subscriber_may_subscribe_during_publish() {
        let bus = Arc::new(EventBus::new());
        let inner_bus = Arc::clone(&bus);
        bus.subscribe(
            "grow",
            subscriber(move |_, _| {
                inner_bus.subscribe("grow", subscriber(|_, _| Ok(())));
                Ok(())
            }),
        );

        assert_eq!(bus.publish("grow", &json!(null)), 1);
        assert_eq!(bus.subscriber_count("grow"), 2);
    }
}
