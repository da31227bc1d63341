//! Change-set computation.
//!
//! A change-set describes one committed version of a live collection
//! relative to the previous one. Writes record primitive operations in a
//! [`ChangeSetBuilder`]; derived views diff keyed orderings with
//! [`diff_by_key`]. Both coalesce to the same shape:
//! - deletions and modifications index the old contents
//! - insertions and `modifications_new` index the new contents
//! - elements that moved relative to the others are a deletion plus an
//!   insertion

mod builder;
mod changeset;
mod diff;

pub use builder::ChangeSetBuilder;
pub use changeset::{CollectionChangeSet, IndexSet};
pub use diff::diff_by_key;
