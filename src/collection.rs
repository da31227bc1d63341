//! The capability set a storage engine exposes for a live collection.

use crate::enumeration::FastEnumerator;
use crate::error::Result;
use crate::notifications::NotificationRegistrar;
use crate::realm::Realm;
use crate::types::{ClassInfo, CollectionId, Object, Version};
use std::fmt;
use std::sync::Arc;

/// Immutable contents of a collection at one version.
pub struct CollectionSnapshot<T> {
    version: Version,
    items: Arc<[T]>,
}

impl<T> CollectionSnapshot<T> {
    pub fn new(version: Version, items: impl Into<Arc<[T]>>) -> Self {
        Self {
            version,
            items: items.into(),
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T> Clone for CollectionSnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            items: Arc::clone(&self.items),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for CollectionSnapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionSnapshot")
            .field("version", &self.version)
            .field("items", &&*self.items)
            .finish()
    }
}

/// An engine-tracked collection whose contents the engine keeps current.
///
/// Implementations are cheap handles; cloning one yields another handle to
/// the same collection. The bridge never mutates a collection through this
/// trait.
pub trait LiveCollection: Clone + Send + Sync + 'static {
    type Element: Object;

    /// Identifier of this collection within its session.
    fn id(&self) -> CollectionId;

    /// The engine session this collection belongs to.
    fn realm(&self) -> &Realm;

    /// Element-type metadata.
    fn object_info(&self) -> &ClassInfo;

    /// Current number of elements.
    fn count(&self) -> Result<usize>;

    /// Materialize the element at `index`.
    fn get(&self, index: usize) -> Result<Self::Element>;

    /// Change token: differs whenever the contents may have changed.
    fn version(&self) -> Result<Version>;

    /// Run `f` on a snapshot while no write can commit to this collection.
    ///
    /// Anything `f` enqueues on the collection's registrar is ordered
    /// exactly between the surrounding versions.
    fn with_snapshot<R>(&self, f: impl FnOnce(CollectionSnapshot<Self::Element>) -> R)
        -> Result<R>;

    /// Registrar delivering this collection's change notifications.
    fn registrar(&self) -> &NotificationRegistrar<Self::Element>;

    /// Current contents.
    fn snapshot(&self) -> Result<CollectionSnapshot<Self::Element>> {
        self.with_snapshot(|snapshot| snapshot)
    }

    /// Start a batched enumeration of this collection.
    fn fast_enumerator(&self) -> Result<FastEnumerator<Self>> {
        FastEnumerator::begin(self.clone(), self.object_info().clone())
    }
}
