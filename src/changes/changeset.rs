//! Change-set value types.

use serde::{Deserialize, Serialize};

/// A sorted set of distinct collection indices.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSet(Vec<usize>);

impl IndexSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Wrap an already sorted, duplicate-free vector.
    pub(crate) fn from_sorted(indices: Vec<usize>) -> Self {
        debug_assert!(indices.windows(2).all(|w| w[0] < w[1]));
        Self(indices)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.0.binary_search(&index).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }
}

impl FromIterator<usize> for IndexSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut indices: Vec<usize> = iter.into_iter().collect();
        indices.sort_unstable();
        indices.dedup();
        Self(indices)
    }
}

impl<'a> IntoIterator for &'a IndexSet {
    type Item = usize;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, usize>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter().copied()
    }
}

/// The difference between two consecutive versions of a live collection.
///
/// `deletions` and `modifications` index into the old contents,
/// `insertions` and `modifications_new` into the new contents. An element
/// whose position changed relative to the other surviving elements is
/// reported as a deletion plus an insertion.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionChangeSet {
    pub deletions: IndexSet,
    pub insertions: IndexSet,
    pub modifications: IndexSet,
    pub modifications_new: IndexSet,
}

impl CollectionChangeSet {
    /// True if the two versions have identical contents.
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty() && self.insertions.is_empty() && self.modifications.is_empty()
    }

    /// Total number of index entries (modifications counted once).
    pub fn change_count(&self) -> usize {
        self.deletions.len() + self.insertions.len() + self.modifications.len()
    }
}
