//! Observer registry
//!
//! Handlers subscribe to one concrete message type and are notified
//! synchronously, in subscription order, whenever that type is decoded.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::descriptor::{MessageDescriptor, OcppMessage};
use crate::error::OcppError;

/// Context handed to observers alongside the typed message
#[derive(Debug, Clone, PartialEq)]
pub struct MessageObserved {
    pub descriptor: MessageDescriptor,
    /// Id of the frame the message arrived in
    pub correlation_id: String,
    pub received_at: DateTime<Utc>,
}

impl MessageObserved {
    pub fn new(descriptor: MessageDescriptor, correlation_id: impl Into<String>) -> Self {
        Self {
            descriptor,
            correlation_id: correlation_id.into(),
            received_at: Utc::now(),
        }
    }
}

/// Receives decoded messages of type `M`.
///
/// Any `Fn(&M, &MessageObserved)` closure is an observer.
pub trait Observer<M>: Send + Sync + 'static {
    fn on_message(&self, message: &M, observed: &MessageObserved);

    /// Called after [`on_message`](Self::on_message) for every event
    fn on_observed(&self, _observed: &MessageObserved) {}
}

impl<M, F> Observer<M> for F
where
    F: Fn(&M, &MessageObserved) + Send + Sync + 'static,
{
    fn on_message(&self, message: &M, observed: &MessageObserved) {
        self(message, observed)
    }
}

/// Handle returned by [`ObserverRegistry::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&dyn Any, &MessageObserved) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    handler: Handler,
}

/// Per message type handler lists
#[derive(Default)]
pub struct ObserverRegistry {
    handlers: RwLock<HashMap<MessageDescriptor, Vec<Subscription>>>,
    next_id: AtomicU64,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `observer` to the list for `M`. The same observer may be
    /// subscribed more than once.
    pub fn subscribe<M, O>(&self, observer: O) -> SubscriptionId
    where
        M: OcppMessage,
        O: Observer<M>,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handler: Handler = Arc::new(move |message: &dyn Any, observed: &MessageObserved| {
            if let Some(message) = message.downcast_ref::<M>() {
                observer.on_message(message, observed);
                observer.on_observed(observed);
            }
        });

        self.handlers
            .write()
            .entry(M::DESCRIPTOR)
            .or_default()
            .push(Subscription { id, handler });
        id
    }

    /// Remove one subscription
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        for subscriptions in handlers.values_mut() {
            if let Some(pos) = subscriptions.iter().position(|s| s.id == id) {
                subscriptions.remove(pos);
                return true;
            }
        }
        false
    }

    /// Remove every observer of `M`, returning how many were removed
    pub fn clear<M: OcppMessage>(&self) -> usize {
        self.handlers
            .write()
            .remove(&M::DESCRIPTOR)
            .map_or(0, |subscriptions| subscriptions.len())
    }

    pub fn count<M: OcppMessage>(&self) -> usize {
        self.count_for(&M::DESCRIPTOR)
    }

    pub fn count_for(&self, descriptor: &MessageDescriptor) -> usize {
        self.handlers.read().get(descriptor).map_or(0, Vec::len)
    }

    /// Notify every observer of `M`.
    ///
    /// An absent message is rejected before any handler runs. Handlers are
    /// called outside the registry lock and may subscribe or unsubscribe;
    /// such changes apply from the next publish on.
    pub fn publish<M: OcppMessage>(
        &self,
        message: Option<&M>,
        observed: &MessageObserved,
    ) -> Result<usize, OcppError> {
        let Some(message) = message else {
            return Err(OcppError::InvalidResponsePayload {
                descriptor: M::DESCRIPTOR,
                reason: "message is absent".into(),
            });
        };

        let handlers: Vec<Handler> = self
            .handlers
            .read()
            .get(&M::DESCRIPTOR)
            .map(|subscriptions| subscriptions.iter().map(|s| s.handler.clone()).collect())
            .unwrap_or_default();

        for handler in &handlers {
            handler(message as &dyn Any, observed);
        }
        Ok(handlers.len())
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        let mut map = f.debug_map();
        for (descriptor, subscriptions) in handlers.iter() {
            map.entry(&descriptor.to_string(), &subscriptions.len());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocpp::catalog::{Authorize, AuthorizeResponse, HeartbeatResponse};
    use crate::ocpp::types::{AuthorizationStatus, IdTagInfo};
    use parking_lot::Mutex;

    fn accepted() -> AuthorizeResponse {
        AuthorizeResponse {
            id_tag_info: IdTagInfo::new(AuthorizationStatus::Accepted),
        }
    }

    fn observed() -> MessageObserved {
        MessageObserved::new(AuthorizeResponse::DESCRIPTOR, "abc-1")
    }

    #[test]
    fn test_handlers_fire_in_order() {
        let registry = ObserverRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let log = log.clone();
            registry.subscribe(move |_: &AuthorizeResponse, _: &MessageObserved| log.lock().push(n));
        }

        let notified = registry.publish(Some(&accepted()), &observed()).unwrap();
        assert_eq!(notified, 3);
        assert_eq!(*log.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_absent_message_notifies_nobody() {
        let registry = ObserverRegistry::new();
        let hits = Arc::new(Mutex::new(0));
        let h = hits.clone();
        registry.subscribe(move |_: &AuthorizeResponse, _: &MessageObserved| *h.lock() += 1);

        let err = registry
            .publish::<AuthorizeResponse>(None, &observed())
            .unwrap_err();
        assert!(matches!(err, OcppError::InvalidResponsePayload { .. }));
        assert_eq!(*hits.lock(), 0);
    }

    #[test]
    fn test_typed_then_generic_callback() {
        struct Recorder(Arc<Mutex<Vec<&'static str>>>);

        impl Observer<AuthorizeResponse> for Recorder {
            fn on_message(&self, _: &AuthorizeResponse, _: &MessageObserved) {
                self.0.lock().push("typed");
            }

            fn on_observed(&self, _: &MessageObserved) {
                self.0.lock().push("observed");
            }
        }

        let registry = ObserverRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.subscribe(Recorder(log.clone()));
        registry.subscribe(Recorder(log.clone()));

        registry.publish(Some(&accepted()), &observed()).unwrap();
        assert_eq!(*log.lock(), vec!["typed", "observed", "typed", "observed"]);
    }

    #[test]
    fn test_no_wildcard() {
        let registry = ObserverRegistry::new();
        registry.subscribe(|_: &Authorize, _: &MessageObserved| panic!("request observer hit"));

        assert_eq!(registry.publish(Some(&accepted()), &observed()).unwrap(), 0);
        assert_eq!(registry.count::<HeartbeatResponse>(), 0);
    }

    #[test]
    fn test_unsubscribe_and_clear() {
        let registry = ObserverRegistry::new();
        let first = registry.subscribe(|_: &AuthorizeResponse, _: &MessageObserved| {});
        registry.subscribe(|_: &AuthorizeResponse, _: &MessageObserved| {});
        assert_eq!(registry.count::<AuthorizeResponse>(), 2);

        assert!(registry.unsubscribe(first));
        assert!(!registry.unsubscribe(first));
        assert_eq!(registry.count::<AuthorizeResponse>(), 1);

        assert_eq!(registry.clear::<AuthorizeResponse>(), 1);
        assert_eq!(registry.count::<AuthorizeResponse>(), 0);
    }

    #[test]
    fn test_handler_may_subscribe_during_publish() {
        let registry = Arc::new(ObserverRegistry::new());
        let inner = registry.clone();
        registry.subscribe(move |_: &AuthorizeResponse, _: &MessageObserved| {
            inner.subscribe(|_: &AuthorizeResponse, _: &MessageObserved| {});
        });

        assert_eq!(registry.publish(Some(&accepted()), &observed()).unwrap(), 1);
        assert_eq!(registry.count::<AuthorizeResponse>(), 2);
    }
}
