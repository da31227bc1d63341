//! Change notifications for live collections.
//!
//! Each live collection owns a [`NotificationRegistrar`]. Subscribers get:
//! - an initial delivery with the contents at subscription time
//! - one delivery per committed version, in version order, with the
//!   coalesced change-set
//! - at most one error delivery, after which they are cancelled
//!
//! Tokens support one-shot suppression (to swallow the echo of a write the
//! caller is about to make) and cancellation.
//!
//! # Example
//!
//! ```ignore
//! let token = subscribe(
//!     &list,
//!     |notification| match notification {
//!         CollectionNotification::Initial(items) => println!("{} items", items.len()),
//!         CollectionNotification::Update { changes, .. } => println!("{:?}", changes.insertions),
//!         CollectionNotification::Error(e) => eprintln!("{e}"),
//!     },
//!     Arc::new(Immediate),
//! )?;
//!
//! token.suppress_next_notification();
//! list.write(|w| {
//!     w.push(item);
//!     Ok(())
//! })?; // not delivered
//! ```

mod context;
mod manager;
mod types;

pub use context::{ExecutionContext, Immediate, Job, SerialQueue};
pub use manager::{
    subscribe, subscribe_channel, subscribe_channel_default, NotificationRegistrar,
};
pub use types::{
    CollectionNotification, NotificationCallback, NotificationHandle, NotificationToken,
    SubscriptionId, TokenState,
};
