//! Versioned list collection.

use super::{Realm, Results, SessionMember};
use crate::changes::ChangeSetBuilder;
use crate::collection::{CollectionSnapshot, LiveCollection};
use crate::error::{BridgeError, Result};
use crate::notifications::NotificationRegistrar;
use crate::sort::{sort_descriptors_to_keypaths, validate_sort_keypaths, SortDescriptor};
use crate::types::{ClassInfo, CollectionId, Object, Version};
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};

struct ListState<T> {
    items: Vec<T>,
    version: Version,
    invalidated: Option<String>,
}

impl<T> ListState<T> {
    fn check_valid(&self) -> Result<()> {
        match &self.invalidated {
            Some(reason) => Err(BridgeError::Invalidated(reason.clone())),
            None => Ok(()),
        }
    }
}

struct ListInner<T> {
    id: CollectionId,
    realm: Realm,
    class_info: ClassInfo,
    state: RwLock<ListState<T>>,
    registrar: NotificationRegistrar<T>,
}

impl<T: Object> SessionMember for ListInner<T> {
    fn invalidate(&self, reason: &str) {
        {
            let mut state = self.state.write();
            if state.invalidated.is_some() {
                return;
            }
            state.invalidated = Some(reason.to_string());
            state.items.clear();
            self.registrar
                .enqueue_error(BridgeError::Invalidated(reason.to_string()));
        }
        self.registrar.deliver_pending();
    }
}

/// An ordered live collection.
///
/// All mutation goes through [`write`](Self::write); each successful write
/// that changes the contents commits one new version and notifies
/// subscribers with the coalesced change-set.
pub struct List<T: Object> {
    inner: Arc<ListInner<T>>,
}

impl<T: Object> Clone for List<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Object> List<T> {
    pub(crate) fn new(realm: Realm, id: CollectionId, class_info: ClassInfo) -> Self {
        let registrar = NotificationRegistrar::new(realm.clone(), id);
        Self {
            inner: Arc::new(ListInner {
                id,
                realm,
                class_info,
                state: RwLock::new(ListState {
                    items: Vec::new(),
                    version: Version(0),
                    invalidated: None,
                }),
                registrar,
            }),
        }
    }

    pub(crate) fn as_member(&self) -> Weak<dyn SessionMember> {
        let weak: Weak<ListInner<T>> = Arc::downgrade(&self.inner);
        weak
    }

    pub fn is_valid(&self) -> bool {
        self.inner.state.read().invalidated.is_none()
    }

    /// Apply a batch of mutations atomically.
    ///
    /// If `f` fails the list is restored and nothing is committed.
    pub fn write<R>(&self, f: impl FnOnce(&mut ListWriter<'_, T>) -> Result<R>) -> Result<R> {
        let result = {
            let mut state = self.inner.state.write();
            state.check_valid()?;

            let original = state.items.clone();
            let old_count = original.len();

            let (outcome, builder) = {
                let mut writer = ListWriter {
                    items: &mut state.items,
                    builder: ChangeSetBuilder::new(old_count),
                };
                let outcome = f(&mut writer);
                (outcome, writer.builder)
            };

            let value = match outcome {
                Ok(value) => value,
                Err(e) => {
                    state.items = original;
                    tracing::debug!(collection = self.inner.id.0, error = %e, "write rolled back");
                    return Err(e);
                }
            };

            let changes = builder.finish();
            if !changes.is_empty() {
                state.version = state.version.next();
                tracing::debug!(
                    collection = self.inner.id.0,
                    version = state.version.0,
                    deletions = changes.deletions.len(),
                    insertions = changes.insertions.len(),
                    modifications = changes.modifications.len(),
                    "write committed"
                );
                if self.inner.registrar.has_subscribers() {
                    let snapshot = CollectionSnapshot::new(state.version, state.items.clone());
                    self.inner.registrar.enqueue_change(snapshot, changes);
                }
            }
            value
        };

        self.inner.registrar.deliver_pending();
        Ok(result)
    }

    /// Live view of the elements matching `predicate`.
    pub fn filter<F>(&self, predicate: F) -> Result<Results<T>>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Results::new(self.clone(), Some(Arc::new(predicate)), Vec::new())
    }

    /// Live view of all elements ordered by `descriptors`.
    pub fn sorted(&self, descriptors: &[SortDescriptor]) -> Result<Results<T>> {
        let keypaths = sort_descriptors_to_keypaths(descriptors)?;
        validate_sort_keypaths(&self.inner.class_info, &keypaths)?;
        Results::new(self.clone(), None, keypaths)
    }
}

impl<T: Object> LiveCollection for List<T> {
    type Element = T;

    fn id(&self) -> CollectionId {
        self.inner.id
    }

    fn realm(&self) -> &Realm {
        &self.inner.realm
    }

    fn object_info(&self) -> &ClassInfo {
        &self.inner.class_info
    }

    fn count(&self) -> Result<usize> {
        let state = self.inner.state.read();
        state.check_valid()?;
        Ok(state.items.len())
    }

    fn get(&self, index: usize) -> Result<T> {
        let state = self.inner.state.read();
        state.check_valid()?;
        state
            .items
            .get(index)
            .cloned()
            .ok_or(BridgeError::IndexOutOfBounds {
                index,
                count: state.items.len(),
            })
    }

    fn version(&self) -> Result<Version> {
        let state = self.inner.state.read();
        state.check_valid()?;
        Ok(state.version)
    }

    fn with_snapshot<R>(&self, f: impl FnOnce(CollectionSnapshot<T>) -> R) -> Result<R> {
        let state = self.inner.state.read();
        state.check_valid()?;
        Ok(f(CollectionSnapshot::new(state.version, state.items.clone())))
    }

    fn registrar(&self) -> &NotificationRegistrar<T> {
        &self.inner.registrar
    }
}

impl<T: Object> fmt::Debug for List<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("List")
            .field("id", &self.inner.id)
            .field("class", &self.inner.class_info.name)
            .field("version", &state.version)
            .field("len", &state.items.len())
            .finish()
    }
}

/// Mutable access to a list inside [`List::write`].
pub struct ListWriter<'a, T> {
    items: &'a mut Vec<T>,
    builder: ChangeSetBuilder,
}

impl<'a, T> ListWriter<'a, T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn push(&mut self, item: T) {
        let index = self.items.len();
        self.items.push(item);
        // index == len is always a valid insertion point
        let _ = self.builder.insert(index);
    }

    pub fn insert(&mut self, index: usize, item: T) -> Result<()> {
        self.builder.insert(index)?;
        self.items.insert(index, item);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<T> {
        self.builder.erase(index)?;
        Ok(self.items.remove(index))
    }

    /// Replace the element at `index`, returning the old one.
    pub fn set(&mut self, index: usize, item: T) -> Result<T> {
        self.builder.modify(index)?;
        Ok(std::mem::replace(&mut self.items[index], item))
    }

    pub fn move_element(&mut self, from: usize, to: usize) -> Result<()> {
        self.builder.move_element(from, to)?;
        let item = self.items.remove(from);
        self.items.insert(to, item);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.builder.clear();
    }
}
