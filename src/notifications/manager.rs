//! Per-collection registrar that orders and dispatches change notifications.

use crate::changes::CollectionChangeSet;
use crate::collection::{CollectionSnapshot, LiveCollection};
use crate::error::{BridgeError, Result};
use crate::realm::Realm;
use crate::types::CollectionId;
use crossbeam_channel::{bounded, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::context::{ExecutionContext, Immediate};
use super::types::{
    Admission, CollectionNotification, NotificationCallback, NotificationHandle,
    NotificationToken, SubscriptionId, SubscriptionOwner, TokenShared,
};

/// Internal subscription state.
struct Subscription<T> {
    id: SubscriptionId,
    shared: Arc<TokenShared>,
    callback: NotificationCallback<T>,
    context: Arc<dyn ExecutionContext>,
    /// Highest version covered by a delivery (or by the initial snapshot).
    seen: AtomicU64,
}

/// An event waiting to be dispatched, in engine commit order.
enum Pending<T> {
    Initial {
        id: SubscriptionId,
        snapshot: CollectionSnapshot<T>,
    },
    Change {
        snapshot: CollectionSnapshot<T>,
        changes: Arc<CollectionChangeSet>,
    },
    Error(Arc<BridgeError>),
}

struct Shared<T> {
    realm: Realm,
    collection: CollectionId,
    /// Active subscriptions by ID.
    subscriptions: RwLock<BTreeMap<SubscriptionId, Arc<Subscription<T>>>>,
    /// Events not yet dispatched.
    pending: Mutex<VecDeque<Pending<T>>>,
    /// Held by whichever thread is draining `pending`.
    delivery: Mutex<()>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl<T: Send + Sync + 'static> SubscriptionOwner for Shared<T> {
    fn remove(&self, id: SubscriptionId) {
        self.subscriptions.write().remove(&id);
    }
}

/// Delivers a live collection's change notifications to its subscribers.
///
/// The engine enqueues events while holding the collection's write lock so
/// the queue is in commit order, then calls [`deliver_pending`] after
/// releasing it. Callbacks never run while a registrar or collection lock
/// is held, so a callback may write to the collection it observes; the
/// resulting notification is delivered after the callback returns.
///
/// [`deliver_pending`]: NotificationRegistrar::deliver_pending
pub struct NotificationRegistrar<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + Sync + 'static> NotificationRegistrar<T> {
    /// Create a registrar for one collection.
    pub fn new(realm: Realm, collection: CollectionId) -> Self {
        Self {
            shared: Arc::new(Shared {
                realm,
                collection,
                subscriptions: RwLock::new(BTreeMap::new()),
                pending: Mutex::new(VecDeque::new()),
                delivery: Mutex::new(()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn realm(&self) -> &Realm {
        &self.shared.realm
    }

    pub fn collection_id(&self) -> CollectionId {
        self.shared.collection
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.shared.subscriptions.read().len()
    }

    pub fn has_subscribers(&self) -> bool {
        !self.shared.subscriptions.read().is_empty()
    }

    /// Register a callback whose first delivery is `snapshot`.
    ///
    /// Must be called while the collection cannot commit, so that the
    /// initial delivery is ordered exactly before the next version.
    pub fn register(
        &self,
        snapshot: CollectionSnapshot<T>,
        callback: NotificationCallback<T>,
        context: Arc<dyn ExecutionContext>,
    ) -> NotificationToken {
        let id = SubscriptionId(self.shared.next_id.fetch_add(1, Ordering::SeqCst));
        let shared = Arc::new(TokenShared::default());

        let subscription = Subscription {
            id,
            shared: Arc::clone(&shared),
            callback,
            context,
            seen: AtomicU64::new(snapshot.version().0),
        };

        tracing::debug!(
            collection = self.shared.collection.0,
            subscription = id.0,
            version = snapshot.version().0,
            "subscription registered"
        );

        self.shared
            .subscriptions
            .write()
            .insert(id, Arc::new(subscription));
        self.shared
            .pending
            .lock()
            .push_back(Pending::Initial { id, snapshot });

        let owner: Weak<Shared<T>> = Arc::downgrade(&self.shared);
        let owner: Weak<dyn SubscriptionOwner> = owner;
        NotificationToken::new(id, shared, self.shared.realm.clone(), owner)
    }

    /// Queue a committed version for delivery.
    pub fn enqueue_change(&self, snapshot: CollectionSnapshot<T>, changes: CollectionChangeSet) {
        self.shared.pending.lock().push_back(Pending::Change {
            snapshot,
            changes: Arc::new(changes),
        });
    }

    /// Queue an engine failure. Every subscriber receives it once and is
    /// cancelled.
    pub fn enqueue_error(&self, error: impl Into<Arc<BridgeError>>) {
        self.shared
            .pending
            .lock()
            .push_back(Pending::Error(error.into()));
    }

    /// Dispatch everything queued so far.
    ///
    /// If another thread (or an outer frame of this thread) is already
    /// draining, returns immediately and leaves the queue to it.
    pub fn deliver_pending(&self) {
        loop {
            let Some(guard) = self.shared.delivery.try_lock() else {
                return;
            };

            loop {
                let next = self.shared.pending.lock().pop_front();
                match next {
                    Some(event) => self.dispatch(event),
                    None => break,
                }
            }

            drop(guard);

            // An event may have been queued after the last pop but before the
            // guard was released; its producer's try_lock failed.
            if self.shared.pending.lock().is_empty() {
                return;
            }
        }
    }

    fn active(&self) -> Vec<Arc<Subscription<T>>> {
        self.shared.subscriptions.read().values().cloned().collect()
    }

    fn dispatch(&self, event: Pending<T>) {
        match event {
            Pending::Initial { id, snapshot } => {
                let subscription = self.shared.subscriptions.read().get(&id).cloned();
                if let Some(subscription) = subscription {
                    self.deliver(&subscription, CollectionNotification::Initial(snapshot));
                }
            }
            Pending::Change { snapshot, changes } => {
                let version = snapshot.version().0;
                for subscription in self.active() {
                    if subscription.seen.load(Ordering::Acquire) >= version {
                        continue;
                    }
                    subscription.seen.store(version, Ordering::Release);
                    self.deliver(
                        &subscription,
                        CollectionNotification::Update {
                            snapshot: snapshot.clone(),
                            changes: Arc::clone(&changes),
                        },
                    );
                }
            }
            Pending::Error(error) => {
                let subscriptions: Vec<_> = {
                    let mut subs = self.shared.subscriptions.write();
                    std::mem::take(&mut *subs).into_values().collect()
                };

                tracing::warn!(
                    collection = self.shared.collection.0,
                    subscribers = subscriptions.len(),
                    error = %error,
                    "delivering engine error"
                );

                for subscription in subscriptions {
                    if !subscription.shared.cancel() {
                        continue;
                    }
                    let callback = Arc::clone(&subscription.callback);
                    let error = Arc::clone(&error);
                    subscription
                        .context
                        .execute(Box::new(move || callback(CollectionNotification::Error(error))));
                }
            }
        }
    }

    fn deliver(&self, subscription: &Subscription<T>, notification: CollectionNotification<T>) {
        match subscription.shared.admit() {
            Admission::Cancelled => {
                self.shared.subscriptions.write().remove(&subscription.id);
            }
            Admission::Suppressed => {
                tracing::debug!(
                    subscription = subscription.id.0,
                    version = ?notification.version(),
                    "notification suppressed"
                );
            }
            Admission::Deliver => {
                let callback = Arc::clone(&subscription.callback);
                let shared = Arc::clone(&subscription.shared);
                subscription.context.execute(Box::new(move || {
                    if !shared.is_cancelled() {
                        callback(notification);
                    }
                }));
            }
        }
    }
}

/// Register `callback` for changes to `collection`, run on `context`.
///
/// The first delivery is [`CollectionNotification::Initial`] with the
/// contents at subscription time. Deliveries continue until the returned
/// token is cancelled or dropped, or the engine reports an error.
pub fn subscribe<C, F>(
    collection: &C,
    callback: F,
    context: Arc<dyn ExecutionContext>,
) -> Result<NotificationToken>
where
    C: LiveCollection,
    F: Fn(CollectionNotification<C::Element>) + Send + Sync + 'static,
{
    let registrar = collection.registrar();
    if registrar.realm() != collection.realm() {
        return Err(BridgeError::PreconditionViolation(format!(
            "registrar for {:?} belongs to a different session",
            collection.id()
        )));
    }

    let callback: NotificationCallback<C::Element> = Arc::new(callback);
    let token =
        collection.with_snapshot(|snapshot| registrar.register(snapshot, callback, context))?;
    registrar.deliver_pending();
    Ok(token)
}

/// Subscribe with a bounded channel instead of a callback.
///
/// A subscriber that lets `buffer_size` notifications pile up is dropped:
/// its channel disconnects once the buffered notifications are drained.
pub fn subscribe_channel<C: LiveCollection>(
    collection: &C,
    buffer_size: usize,
) -> Result<NotificationHandle<C::Element>> {
    if buffer_size == 0 {
        return Err(BridgeError::PreconditionViolation(
            "notification buffer must hold at least one notification".into(),
        ));
    }

    let (sender, receiver) = bounded(buffer_size);
    let sender = Mutex::new(Some(sender));
    let collection_id = collection.id();

    let token = subscribe(
        collection,
        move |notification| {
            let mut slot = sender.lock();
            let Some(tx) = slot.as_ref() else {
                return;
            };
            match tx.try_send(notification) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        collection = collection_id.0,
                        "notification buffer overflowed; dropping subscriber"
                    );
                    *slot = None;
                }
                Err(TrySendError::Disconnected(_)) => {
                    *slot = None;
                }
            }
        },
        Arc::new(Immediate),
    )?;

    Ok(NotificationHandle { token, receiver })
}

/// [`subscribe_channel`] with the session's configured
/// `notification_buffer_size`.
pub fn subscribe_channel_default<C: LiveCollection>(
    collection: &C,
) -> Result<NotificationHandle<C::Element>> {
    let buffer_size = collection.realm().config().notification_buffer_size;
    subscribe_channel(collection, buffer_size)
}
