//! In-memory reference engine.
//!
//! A `Realm` is an engine session owning versioned live collections:
//! - [`List`]: an ordered collection written through [`List::write`]
//! - [`Results`]: a filtered and sorted live view over a list
//!
//! There is no persistence and no MVCC; every committed version is a
//! copy-on-write snapshot of the list contents.

mod list;
mod results;

pub use list::{List, ListWriter};
pub use results::Results;

use crate::error::{BridgeError, Result};
use crate::types::{ClassInfo, CollectionId, Object, RealmId};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Realm configuration.
#[derive(Clone, Debug)]
pub struct RealmConfig {
    /// Session name, used in logs.
    pub name: String,

    /// Largest batch a fast enumerator hands out per call.
    /// Default: 16
    pub enumeration_batch_size: usize,

    /// Default channel capacity for channel subscriptions.
    /// Default: 1000
    pub notification_buffer_size: usize,
}

impl Default for RealmConfig {
    fn default() -> Self {
        Self {
            name: "default.realm".to_string(),
            enumeration_batch_size: 16,
            notification_buffer_size: 1000,
        }
    }
}

impl RealmConfig {
    fn validate(&self) -> Result<()> {
        if self.enumeration_batch_size == 0 {
            return Err(BridgeError::InvalidConfig(
                "enumeration_batch_size must be at least 1".into(),
            ));
        }
        if self.notification_buffer_size == 0 {
            return Err(BridgeError::InvalidConfig(
                "notification_buffer_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// A collection that must be told when its session goes away.
pub(crate) trait SessionMember: Send + Sync {
    fn invalidate(&self, reason: &str);
}

static NEXT_REALM_ID: AtomicU64 = AtomicU64::new(1);

struct RealmInner {
    id: RealmId,
    config: RealmConfig,
    invalidated: Mutex<Option<String>>,
    members: Mutex<Vec<Weak<dyn SessionMember>>>,
    next_collection: AtomicU64,
}

/// Handle to an engine session. Clones refer to the same session.
#[derive(Clone)]
pub struct Realm {
    inner: Arc<RealmInner>,
}

impl Realm {
    /// Open a new session.
    pub fn open(config: RealmConfig) -> Result<Self> {
        config.validate()?;
        let id = RealmId(NEXT_REALM_ID.fetch_add(1, Ordering::SeqCst));
        tracing::info!(realm = id.0, name = %config.name, "realm opened");

        Ok(Self {
            inner: Arc::new(RealmInner {
                id,
                config,
                invalidated: Mutex::new(None),
                members: Mutex::new(Vec::new()),
                next_collection: AtomicU64::new(1),
            }),
        })
    }

    pub fn id(&self) -> RealmId {
        self.inner.id
    }

    pub fn config(&self) -> &RealmConfig {
        &self.inner.config
    }

    pub fn is_invalidated(&self) -> bool {
        self.inner.invalidated.lock().is_some()
    }

    /// Create an empty list of `class_info` objects.
    pub fn create_list<T: Object>(&self, class_info: ClassInfo) -> Result<List<T>> {
        let invalidated = self.inner.invalidated.lock();
        if let Some(reason) = invalidated.as_ref() {
            return Err(BridgeError::Invalidated(reason.clone()));
        }
        let list = List::new(self.clone(), self.next_collection_id(), class_info);
        let mut members = self.inner.members.lock();
        members.retain(|member| member.strong_count() > 0);
        members.push(list.as_member());
        drop(members);
        drop(invalidated);
        Ok(list)
    }

    /// Invalidate the session. Every collection becomes unreadable and its
    /// subscribers receive an error. Idempotent.
    pub fn invalidate(&self, reason: impl Into<String>) {
        let reason = reason.into();
        {
            let mut invalidated = self.inner.invalidated.lock();
            if invalidated.is_some() {
                return;
            }
            *invalidated = Some(reason.clone());
        }

        let members = std::mem::take(&mut *self.inner.members.lock());
        tracing::info!(
            realm = self.inner.id.0,
            collections = members.len(),
            reason = %reason,
            "realm invalidated"
        );
        for member in members.iter().filter_map(Weak::upgrade) {
            member.invalidate(&reason);
        }
    }

    pub(crate) fn next_collection_id(&self) -> CollectionId {
        CollectionId(self.inner.next_collection.fetch_add(1, Ordering::SeqCst))
    }
}

impl PartialEq for Realm {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Realm {}

impl fmt::Debug for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Realm")
            .field("id", &self.inner.id)
            .field("name", &self.inner.config.name)
            .finish()
    }
}
