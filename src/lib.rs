//! # Collection Bridge
//!
//! Batched enumeration and ordered change notifications for live,
//! database-backed collections.
//!
//! ## Core Concepts
//!
//! - **Live collections**: engine-tracked lists and query results exposed
//!   through the [`LiveCollection`] capability trait
//! - **Fast enumeration**: bounded batches of strong references with a
//!   checked detach state
//! - **Notifications**: per-collection registrars delivering coalesced
//!   change-sets in version order on a chosen execution context
//! - **Reference engine**: an in-memory [`Realm`] with versioned [`List`]s
//!   and derived [`Results`]
//!
//! ## Example
//!
//! ```ignore
//! use collection_bridge::{subscribe, ClassInfo, DynamicObject, Immediate, Realm, RealmConfig};
//!
//! let realm = Realm::open(RealmConfig::default())?;
//! let list = realm.create_list::<DynamicObject>(ClassInfo::new("Item"))?;
//!
//! let token = subscribe(
//!     &list,
//!     |n| println!("{:?}", n.changes()),
//!     Arc::new(Immediate),
//! )?;
//!
//! list.write(|w| {
//!     w.push(DynamicObject::new(1));
//!     Ok(())
//! })?;
//!
//! let mut enumerator = list.fast_enumerator()?;
//! while !enumerator.next(16)?.is_empty() {}
//! ```

pub mod changes;
pub mod collection;
pub mod enumeration;
pub mod error;
pub mod notifications;
pub mod realm;
pub mod sort;
pub mod types;
pub mod values;

// Re-exports
pub use changes::{diff_by_key, ChangeSetBuilder, CollectionChangeSet, IndexSet};
pub use collection::{CollectionSnapshot, LiveCollection};
pub use enumeration::{fast_enumerate, Elements, EnumerationState, FastEnumerator};
pub use error::{BridgeError, Result};
pub use notifications::{
    subscribe, subscribe_channel, subscribe_channel_default, CollectionNotification,
    ExecutionContext, Immediate, Job, NotificationCallback, NotificationHandle,
    NotificationRegistrar, NotificationToken, SerialQueue, SubscriptionId, TokenState,
};
pub use realm::{List, ListWriter, Realm, RealmConfig, Results};
pub use sort::{sort_descriptors_to_keypaths, validate_sort_keypaths, SortDescriptor};
pub use types::*;
pub use values::{
    collection_value_for_key, collection_value_for_key_path, compare_values, lookup_key_path,
};
