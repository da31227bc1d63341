//! Notification types for live collections.

use crate::changes::CollectionChangeSet;
use crate::collection::CollectionSnapshot;
use crate::error::BridgeError;
use crate::realm::Realm;
use crate::types::Version;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

/// Unique identifier for a subscription within one registrar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

/// One delivery to a subscription callback.
pub enum CollectionNotification<T> {
    /// First delivery after subscribing: the contents at subscription time.
    Initial(CollectionSnapshot<T>),

    /// The collection changed.
    Update {
        snapshot: CollectionSnapshot<T>,
        changes: Arc<CollectionChangeSet>,
    },

    /// The engine failed; the subscription has been cancelled.
    Error(Arc<BridgeError>),
}

impl<T> CollectionNotification<T> {
    /// The collection contents, absent for errors.
    pub fn snapshot(&self) -> Option<&CollectionSnapshot<T>> {
        match self {
            CollectionNotification::Initial(snapshot)
            | CollectionNotification::Update { snapshot, .. } => Some(snapshot),
            CollectionNotification::Error(_) => None,
        }
    }

    /// The change-set, absent for the initial delivery and for errors.
    pub fn changes(&self) -> Option<&CollectionChangeSet> {
        match self {
            CollectionNotification::Update { changes, .. } => Some(changes),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&BridgeError> {
        match self {
            CollectionNotification::Error(error) => Some(error),
            _ => None,
        }
    }

    pub fn version(&self) -> Option<Version> {
        self.snapshot().map(CollectionSnapshot::version)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CollectionNotification::Error(_))
    }
}

impl<T> Clone for CollectionNotification<T> {
    fn clone(&self) -> Self {
        match self {
            CollectionNotification::Initial(snapshot) => {
                CollectionNotification::Initial(snapshot.clone())
            }
            CollectionNotification::Update { snapshot, changes } => CollectionNotification::Update {
                snapshot: snapshot.clone(),
                changes: Arc::clone(changes),
            },
            CollectionNotification::Error(error) => CollectionNotification::Error(Arc::clone(error)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for CollectionNotification<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionNotification::Initial(snapshot) => {
                f.debug_tuple("Initial").field(snapshot).finish()
            }
            CollectionNotification::Update { snapshot, changes } => f
                .debug_struct("Update")
                .field("snapshot", snapshot)
                .field("changes", changes)
                .finish(),
            CollectionNotification::Error(error) => f.debug_tuple("Error").field(error).finish(),
        }
    }
}

/// Callback invoked for each delivery.
pub type NotificationCallback<T> = Arc<dyn Fn(CollectionNotification<T>) + Send + Sync>;

/// Lifecycle of a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenState {
    Subscribed,
    /// The next delivery will be dropped.
    Suppressed,
    /// Terminal.
    Cancelled,
}

const SUBSCRIBED: u8 = 0;
const SUPPRESSED: u8 = 1;
const CANCELLED: u8 = 2;

/// Outcome of asking a subscription whether a delivery may proceed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Admission {
    Deliver,
    Suppressed,
    Cancelled,
}

/// State shared between a token and its registrar entry.
#[derive(Debug, Default)]
pub(crate) struct TokenShared {
    state: AtomicU8,
}

impl TokenShared {
    pub(crate) fn state(&self) -> TokenState {
        match self.state.load(Ordering::Acquire) {
            SUBSCRIBED => TokenState::Subscribed,
            SUPPRESSED => TokenState::Suppressed,
            _ => TokenState::Cancelled,
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    pub(crate) fn suppress_next(&self) {
        let _ = self.state.compare_exchange(
            SUBSCRIBED,
            SUPPRESSED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Returns true if this call performed the transition.
    pub(crate) fn cancel(&self) -> bool {
        self.state.swap(CANCELLED, Ordering::AcqRel) != CANCELLED
    }

    /// Consume the suppression flag if set.
    pub(crate) fn admit(&self) -> Admission {
        match self.state.compare_exchange(
            SUPPRESSED,
            SUBSCRIBED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Admission::Suppressed,
            Err(CANCELLED) => Admission::Cancelled,
            Err(_) => Admission::Deliver,
        }
    }
}

/// Removes a subscription from whatever registrar owns it.
pub(crate) trait SubscriptionOwner: Send + Sync {
    fn remove(&self, id: SubscriptionId);
}

/// Handle to one active subscription.
///
/// Dropping the token cancels the subscription.
pub struct NotificationToken {
    id: SubscriptionId,
    shared: Arc<TokenShared>,
    realm: Realm,
    owner: Weak<dyn SubscriptionOwner>,
}

impl NotificationToken {
    pub(crate) fn new(
        id: SubscriptionId,
        shared: Arc<TokenShared>,
        realm: Realm,
        owner: Weak<dyn SubscriptionOwner>,
    ) -> Self {
        Self {
            id,
            shared,
            realm,
            owner,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The engine session this subscription is scoped to.
    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    pub fn state(&self) -> TokenState {
        self.shared.state()
    }

    /// Drop the next delivery for this subscription. Errors are never
    /// dropped. No-op once cancelled.
    pub fn suppress_next_notification(&self) {
        self.shared.suppress_next();
    }

    /// Stop deliveries. Idempotent.
    ///
    /// A delivery already handed to the execution context may still run if
    /// its job started before this call.
    pub fn cancel(&self) {
        if self.shared.cancel() {
            tracing::debug!(subscription = self.id.0, "subscription cancelled");
        }
        if let Some(owner) = self.owner.upgrade() {
            owner.remove(self.id);
        }
    }
}

impl Drop for NotificationToken {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for NotificationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationToken")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("realm", &self.realm.id())
            .finish()
    }
}

/// Channel form of a subscription.
pub struct NotificationHandle<T> {
    pub token: NotificationToken,
    /// Channel to receive notifications.
    pub receiver: crossbeam_channel::Receiver<CollectionNotification<T>>,
}

impl<T> NotificationHandle<T> {
    /// Receive the next notification (blocking).
    pub fn recv(&self) -> Result<CollectionNotification<T>, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a notification (non-blocking).
    pub fn try_recv(&self) -> Result<CollectionNotification<T>, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<CollectionNotification<T>, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
