//! A small publish / subscribe bus for propagating auth state changes.
//!
//! Listeners are registered per channel and invoked synchronously, in registration order,
//! whenever an event is dispatched on that channel. Registries are guarded by a mutex which is
//! never held while listeners run, so a listener may freely register or remove listeners itself.
//! A panicking listener is logged and skipped without affecting the remaining listeners.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The channel on which authentication events are published.
pub const AUTH_CHANNEL: &str = "auth";

/// The payload of a hub event as provided by the publisher.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HubPayload {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl HubPayload {
    pub fn new(event: impl Into<String>) -> Self {
        HubPayload {
            event: event.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// An event as received by listeners.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HubEvent {
    pub channel: String,
    pub payload: HubPayload,
}

pub type HubListener = Arc<dyn Fn(&HubEvent) + Send + Sync>;

/// Identifies a listener within a [`ListenerRegistry`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// An ordered list of listeners for events of type `E`.
pub struct ListenerRegistry<E> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn Fn(&E) + Send + Sync>)>>,
}

impl<E> Default for ListenerRegistry<E> {
    fn default() -> Self {
        ListenerRegistry {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }
}

impl<E> ListenerRegistry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the listener and returns the id used to remove it again.
    pub fn add(&self, listener: Arc<dyn Fn(&E) + Send + Sync>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, listener));

        id
    }

    /// Removes the listener with the given id. Returns `false` if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let count_before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);

        listeners.len() != count_before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Invokes all listeners with the given event and returns how many of them completed.
    pub fn notify(&self, event: &E) -> usize {
        let snapshot: Vec<_> = self
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        snapshot
            .into_iter()
            .filter(|listener| {
                let result = catch_unwind(AssertUnwindSafe(|| listener(event)));
                if let Err(panic) = &result {
                    tracing::error!("Error in event listener: {}", panic_message(panic.as_ref()));
                }

                result.is_ok()
            })
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(ListenerId, Arc<dyn Fn(&E) + Send + Sync>)>> {
        // Listeners never run under the lock, so a poisoned lock still holds a consistent list.
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

/// Handle returned by [`EventBus::listen`].
///
/// Dropping the handle keeps the listener registered; call
/// [`unsubscribe`](HubSubscription::unsubscribe) to remove it.
#[must_use = "dropping the subscription keeps the listener registered forever"]
pub struct HubSubscription {
    unsubscribe: Box<dyn FnOnce() + Send + Sync>,
}

impl HubSubscription {
    pub fn new(unsubscribe: impl FnOnce() + Send + Sync + 'static) -> Self {
        HubSubscription {
            unsubscribe: Box::new(unsubscribe),
        }
    }

    /// Combines two subscriptions so that both are removed at once.
    pub fn and(self, other: HubSubscription) -> Self {
        HubSubscription::new(move || {
            self.unsubscribe();
            other.unsubscribe();
        })
    }

    pub fn unsubscribe(self) {
        (self.unsubscribe)()
    }
}

/// The Amplify style `Hub.listen` / `Hub.dispatch` surface.
pub trait EventBus: Send + Sync {
    /// Delivers the payload to every listener of the channel.
    fn dispatch(&self, channel: &str, payload: HubPayload);

    fn listen(&self, channel: &str, listener: HubListener) -> HubSubscription;
}

/// A channel keyed collection of listener registries.
#[derive(Default)]
pub struct Hub {
    channels: Mutex<HashMap<String, Arc<ListenerRegistry<HubEvent>>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of listeners currently registered for the channel.
    pub fn listener_count(&self, channel: &str) -> usize {
        self.registry(channel).map_or(0, |registry| registry.len())
    }

    fn registry(&self, channel: &str) -> Option<Arc<ListenerRegistry<HubEvent>>> {
        self.lock().get(channel).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<ListenerRegistry<HubEvent>>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventBus for Hub {
    fn dispatch(&self, channel: &str, payload: HubPayload) {
        let Some(registry) = self.registry(channel) else {
            return;
        };

        registry.notify(&HubEvent {
            channel: channel.to_string(),
            payload,
        });
    }

    fn listen(&self, channel: &str, listener: HubListener) -> HubSubscription {
        let registry = self
            .lock()
            .entry(channel.to_string())
            .or_default()
            .clone();
        let id = registry.add(listener);

        HubSubscription::new(move || {
            registry.remove(id);
        })
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// Records all events received by a listener.
    #[derive(Clone, Default)]
    pub(crate) struct Recorder {
        events: Arc<Mutex<Vec<HubEvent>>>,
    }

    impl Recorder {
        pub(crate) fn listener(&self) -> HubListener {
            let events = self.events.clone();
            Arc::new(move |event: &HubEvent| events.lock().unwrap().push(event.clone()))
        }

        pub(crate) fn events(&self) -> Vec<HubEvent> {
            self.events.lock().unwrap().clone()
        }

        pub(crate) fn event_names(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .map(|event| event.payload.event)
                .collect()
        }
    }

    #[test]
    fn dispatch_reaches_listeners_in_order() {
        let hub = Hub::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let (first, second) = (order.clone(), order.clone());

        let _a = hub.listen(
            AUTH_CHANNEL,
            Arc::new(move |_: &HubEvent| first.lock().unwrap().push("first")),
        );
        let _b = hub.listen(
            AUTH_CHANNEL,
            Arc::new(move |_: &HubEvent| second.lock().unwrap().push("second")),
        );

        hub.dispatch(AUTH_CHANNEL, HubPayload::new("signedIn"));

        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn channels_are_isolated() {
        let hub = Hub::new();
        let auth = Recorder::default();
        let storage = Recorder::default();
        let _auth = hub.listen(AUTH_CHANNEL, auth.listener());
        let _storage = hub.listen("storage", storage.listener());

        hub.dispatch("storage", HubPayload::new("uploaded").with_data(serde_json::json!({"key": "a"})));

        assert!(auth.events().is_empty());
        assert_eq!(
            storage.events(),
            vec![HubEvent {
                channel: "storage".to_string(),
                payload: HubPayload {
                    event: "uploaded".to_string(),
                    data: Some(serde_json::json!({"key": "a"}))
                }
            }]
        );
    }

    #[test]
    fn unsubscribed_listeners_are_not_invoked() {
        let hub = Hub::new();
        let first = Recorder::default();
        let second = Recorder::default();
        let first_subscription = hub.listen(AUTH_CHANNEL, first.listener());
        let _second = hub.listen(AUTH_CHANNEL, second.listener());

        first_subscription.unsubscribe();
        hub.dispatch(AUTH_CHANNEL, HubPayload::new("signedOut"));

        assert!(first.events().is_empty());
        assert_eq!(second.event_names(), vec!["signedOut"]);
        assert_eq!(hub.listener_count(AUTH_CHANNEL), 1);
    }

    #[test]
    fn panicking_listener_does_not_stop_fan_out() {
        let hub = Hub::new();
        let recorder = Recorder::default();
        let _panics = hub.listen(
            AUTH_CHANNEL,
            Arc::new(|_: &HubEvent| panic!("listener failure")),
        );
        let _records = hub.listen(AUTH_CHANNEL, recorder.listener());

        hub.dispatch(AUTH_CHANNEL, HubPayload::new("signedIn"));

        assert_eq!(recorder.event_names(), vec!["signedIn"]);
    }

    #[test]
    fn listeners_may_unsubscribe_themselves() {
        let hub = Arc::new(Hub::new());
        let slot: Arc<Mutex<Option<HubSubscription>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicU64::new(0));

        let inner_slot = slot.clone();
        let inner_calls = calls.clone();
        let subscription = hub.listen(
            AUTH_CHANNEL,
            Arc::new(move |_: &HubEvent| {
                inner_calls.fetch_add(1, Ordering::SeqCst);
                if let Some(subscription) = inner_slot.lock().unwrap().take() {
                    subscription.unsubscribe();
                }
            }),
        );
        *slot.lock().unwrap() = Some(subscription);

        hub.dispatch(AUTH_CHANNEL, HubPayload::new("signedIn"));
        hub.dispatch(AUTH_CHANNEL, HubPayload::new("signedIn"));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn registry_reports_completed_listeners() {
        let registry = ListenerRegistry::<u32>::new();
        let id = registry.add(Arc::new(|_: &u32| {}));
        registry.add(Arc::new(|value: &u32| assert_eq!(*value, 0)));

        assert_eq!(registry.notify(&1), 1);
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert_eq!(registry.len(), 1);
    }
}
