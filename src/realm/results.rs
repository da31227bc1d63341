//! Live query results derived from a list.

use super::{List, Realm};
use crate::changes::diff_by_key;
use crate::collection::{CollectionSnapshot, LiveCollection};
use crate::error::{BridgeError, Result};
use crate::notifications::{
    subscribe, CollectionNotification, Immediate, NotificationRegistrar, NotificationToken,
};
use crate::sort::{
    compare_objects, sort_descriptors_to_keypaths, validate_sort_keypaths, SortDescriptor,
};
use crate::types::{ClassInfo, CollectionId, Object, ObjectKey, Version};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

struct ResultsInner<T: Object> {
    id: CollectionId,
    list: List<T>,
    predicate: Option<Predicate<T>>,
    keypaths: Vec<(String, bool)>,
    registrar: NotificationRegistrar<T>,
    /// Output at the last version observed from the list.
    previous: Mutex<Option<CollectionSnapshot<T>>>,
    /// Output at the list's current version, for reads.
    cached: Mutex<Option<CollectionSnapshot<T>>>,
    /// Subscription to the source list.
    source: Mutex<Option<NotificationToken>>,
}

impl<T: Object> ResultsInner<T> {
    fn evaluate(&self, source: &CollectionSnapshot<T>) -> CollectionSnapshot<T> {
        let mut items: Vec<T> = source
            .iter()
            .filter(|object| match &self.predicate {
                Some(predicate) => predicate(*object),
                None => true,
            })
            .cloned()
            .collect();
        if !self.keypaths.is_empty() {
            items.sort_by(|a, b| compare_objects(a, b, &self.keypaths));
        }
        CollectionSnapshot::new(source.version(), items)
    }

    fn current(&self) -> Result<CollectionSnapshot<T>> {
        let version = self.list.version()?;
        if let Some(cached) = self.cached.lock().as_ref() {
            if cached.version() == version {
                return Ok(cached.clone());
            }
        }
        let snapshot = self.list.with_snapshot(|source| self.evaluate(&source))?;
        *self.cached.lock() = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Called on every delivery from the source list, in version order.
    fn source_changed(&self, notification: CollectionNotification<T>) {
        match notification {
            CollectionNotification::Initial(source) => {
                *self.previous.lock() = Some(self.evaluate(&source));
            }
            CollectionNotification::Update { snapshot, changes } => {
                let current = self.evaluate(&snapshot);
                let modified: HashSet<ObjectKey> = changes
                    .modifications_new
                    .iter()
                    .filter_map(|index| snapshot.get(index))
                    .map(Object::object_key)
                    .collect();

                let previous = self.previous.lock().replace(current.clone());
                if let Some(previous) = previous {
                    let diff = diff_by_key(&keys(&previous), &keys(&current), &modified);
                    if !diff.is_empty() {
                        self.registrar.enqueue_change(current, diff);
                    }
                }
                self.registrar.deliver_pending();
            }
            CollectionNotification::Error(error) => {
                self.registrar.enqueue_error(error);
                self.registrar.deliver_pending();
            }
        }
    }
}

fn keys<T: Object>(snapshot: &CollectionSnapshot<T>) -> Vec<ObjectKey> {
    snapshot.iter().map(Object::object_key).collect()
}

/// A filtered and sorted live view over a [`List`].
///
/// Versions follow the source list. Subscribers are only notified for
/// list versions that change the view's output.
pub struct Results<T: Object> {
    inner: Arc<ResultsInner<T>>,
}

impl<T: Object> Clone for Results<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Object> Results<T> {
    pub(crate) fn new(
        list: List<T>,
        predicate: Option<Predicate<T>>,
        keypaths: Vec<(String, bool)>,
    ) -> Result<Self> {
        let realm = list.realm().clone();
        let id = realm.next_collection_id();

        let inner = Arc::new(ResultsInner {
            id,
            list: list.clone(),
            predicate,
            keypaths,
            registrar: NotificationRegistrar::new(realm, id),
            previous: Mutex::new(None),
            cached: Mutex::new(None),
            source: Mutex::new(None),
        });

        let weak: Weak<ResultsInner<T>> = Arc::downgrade(&inner);
        let token = subscribe(
            &list,
            move |notification| {
                if let Some(inner) = weak.upgrade() {
                    inner.source_changed(notification);
                }
            },
            Arc::new(Immediate),
        )?;
        *inner.source.lock() = Some(token);

        Ok(Self { inner })
    }

    /// The list this view is derived from.
    pub fn source(&self) -> &List<T> {
        &self.inner.list
    }

    /// Narrow this view further.
    pub fn filter<F>(&self, predicate: F) -> Result<Results<T>>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let combined: Predicate<T> = match &self.inner.predicate {
            Some(existing) => {
                let existing = Arc::clone(existing);
                Arc::new(move |object: &T| existing(object) && predicate(object))
            }
            None => Arc::new(predicate),
        };
        Results::new(
            self.inner.list.clone(),
            Some(combined),
            self.inner.keypaths.clone(),
        )
    }

    /// Same elements ordered by `descriptors`, replacing any previous order.
    pub fn sorted(&self, descriptors: &[SortDescriptor]) -> Result<Results<T>> {
        let keypaths = sort_descriptors_to_keypaths(descriptors)?;
        validate_sort_keypaths(self.object_info(), &keypaths)?;
        Results::new(
            self.inner.list.clone(),
            self.inner.predicate.clone(),
            keypaths,
        )
    }

    /// Sort key paths currently applied.
    pub fn sort_keypaths(&self) -> &[(String, bool)] {
        &self.inner.keypaths
    }
}

impl<T: Object> LiveCollection for Results<T> {
    type Element = T;

    fn id(&self) -> CollectionId {
        self.inner.id
    }

    fn realm(&self) -> &Realm {
        self.inner.list.realm()
    }

    fn object_info(&self) -> &ClassInfo {
        self.inner.list.object_info()
    }

    fn count(&self) -> Result<usize> {
        Ok(self.inner.current()?.len())
    }

    fn get(&self, index: usize) -> Result<T> {
        let current = self.inner.current()?;
        current
            .get(index)
            .cloned()
            .ok_or(BridgeError::IndexOutOfBounds {
                index,
                count: current.len(),
            })
    }

    fn version(&self) -> Result<Version> {
        self.inner.list.version()
    }

    fn with_snapshot<R>(&self, f: impl FnOnce(CollectionSnapshot<T>) -> R) -> Result<R> {
        self.inner
            .list
            .with_snapshot(|source| f(self.inner.evaluate(&source)))
    }

    fn registrar(&self) -> &NotificationRegistrar<T> {
        &self.inner.registrar
    }
}

impl<T: Object> fmt::Debug for Results<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Results")
            .field("id", &self.inner.id)
            .field("source", &self.inner.list.id())
            .field("filtered", &self.inner.predicate.is_some())
            .field("sort", &self.inner.keypaths)
            .finish()
    }
}
