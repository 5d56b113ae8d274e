//! Flow notifications
//!
//! Listeners are called synchronously, in subscription order. A listener that
//! panics is logged and skipped; the remaining listeners still receive the event.

use log::warn;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

/// Events emitted by [`SectionFlow`](super::SectionFlow)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FlowEvent {
    /// The current section changed
    #[serde(rename_all = "camelCase")]
    SectionChanged { from: Option<String>, to: String },

    /// `navigate_next` refused to leave an incomplete section
    #[serde(rename_all = "camelCase")]
    ValidationFailed { section_id: String },

    /// `navigate_next` ran past the last visible section
    #[serde(rename_all = "camelCase")]
    FormCompleted { completed_section_ids: Vec<String> },

    /// Visibility was re-derived after a data change
    #[serde(rename_all = "camelCase")]
    FlowRecalculated {
        current_section_id: Option<String>,
        visible_section_ids: Vec<String>,
    },
}

impl FlowEvent {
    /// Short event name, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            FlowEvent::SectionChanged { .. } => "sectionChanged",
            FlowEvent::ValidationFailed { .. } => "validationFailed",
            FlowEvent::FormCompleted { .. } => "formCompleted",
            FlowEvent::FlowRecalculated { .. } => "flowRecalculated",
        }
    }
}

/// Callback type for receiving flow events
pub type EventCallback = Box<dyn FnMut(FlowEvent) + Send>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Ordered listener list
#[derive(Default)]
pub(crate) struct EventBus {
    listeners: Vec<(SubscriptionId, EventCallback)>,
    next_id: u64,
}

impl EventBus {
    pub(crate) fn subscribe(&mut self, callback: EventCallback) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.listeners.push((id, callback));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }

    pub(crate) fn emit(&mut self, event: FlowEvent) {
        for (id, listener) in self.listeners.iter_mut() {
            let delivery = event.clone();
            if panic::catch_unwind(AssertUnwindSafe(|| listener(delivery))).is_err() {
                warn!("listener {:?} panicked handling {}", id, event.name());
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Records every event it is handed. Clones share the same log.
///
/// ```rust
/// use formflow::section::{EventCollector, SectionFlow};
///
/// let collector = EventCollector::new();
/// let mut flow = SectionFlow::new();
/// flow.subscribe(collector.callback());
/// assert!(collector.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct EventCollector {
    events: Arc<Mutex<Vec<FlowEvent>>>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A callback that pushes into this collector
    pub fn callback(&self) -> EventCallback {
        let events = Arc::clone(&self.events);
        Box::new(move |event| {
            events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event)
        })
    }

    /// Snapshot of the recorded events
    pub fn events(&self) -> Vec<FlowEvent> {
        self.lock().clone()
    }

    /// Names of the recorded events, in order
    pub fn names(&self) -> Vec<&'static str> {
        self.lock().iter().map(FlowEvent::name).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<FlowEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn changed(to: &str) -> FlowEvent {
        FlowEvent::SectionChanged {
            from: None,
            to: to.into(),
        }
    }

    #[test]
    fn test_delivery_in_subscription_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::default();
        for n in 1..=3 {
            let log = Arc::clone(&log);
            bus.subscribe(Box::new(move |_| log.lock().unwrap().push(n)));
        }

        bus.emit(changed("a"));
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let collector = EventCollector::new();
        let mut bus = EventBus::default();
        bus.subscribe(Box::new(|_| panic!("listener bug")));
        bus.subscribe(collector.callback());

        bus.emit(changed("a"));
        bus.emit(changed("b"));
        assert_eq!(collector.events(), vec![changed("a"), changed("b")]);
    }

    #[test]
    fn test_unsubscribe() {
        let collector = EventCollector::new();
        let mut bus = EventBus::default();
        let id = bus.subscribe(collector.callback());
        assert_eq!(bus.len(), 1);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(changed("a"));
        assert!(collector.is_empty());
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(FlowEvent::ValidationFailed {
            section_id: "contact".into(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "validationFailed", "sectionId": "contact" })
        );
    }
}
