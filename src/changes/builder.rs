//! Coalescing primitive operations of one write into a change-set.

use super::changeset::CollectionChangeSet;
use super::diff::{reconcile, Survivor};
use crate::error::{BridgeError, Result};

#[derive(Clone, Copy, Debug)]
enum Slot {
    /// An element that existed before the write, at `old` in the old contents.
    Existing { old: usize, modified: bool },
    /// An element inserted during the write.
    Inserted,
}

/// Records the structural operations applied to a collection during one
/// write and coalesces them into a single [`CollectionChangeSet`].
///
/// The builder mirrors the collection's current contents slot by slot, so
/// it costs one word per element for the duration of the write.
#[derive(Clone, Debug)]
pub struct ChangeSetBuilder {
    old_count: usize,
    slots: Vec<Slot>,
}

impl ChangeSetBuilder {
    /// Start tracking a collection that currently holds `old_count` elements.
    pub fn new(old_count: usize) -> Self {
        Self {
            old_count,
            slots: (0..old_count)
                .map(|old| Slot::Existing {
                    old,
                    modified: false,
                })
                .collect(),
        }
    }

    /// Current number of elements.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn check(&self, index: usize, count: usize) -> Result<()> {
        if index >= count {
            return Err(BridgeError::IndexOutOfBounds { index, count });
        }
        Ok(())
    }

    /// An element was inserted at `index` (may equal `len()`).
    pub fn insert(&mut self, index: usize) -> Result<()> {
        self.check(index, self.slots.len() + 1)?;
        self.slots.insert(index, Slot::Inserted);
        Ok(())
    }

    /// The element at `index` was removed.
    pub fn erase(&mut self, index: usize) -> Result<()> {
        self.check(index, self.slots.len())?;
        self.slots.remove(index);
        Ok(())
    }

    /// The element at `index` was changed in place.
    pub fn modify(&mut self, index: usize) -> Result<()> {
        self.check(index, self.slots.len())?;
        if let Slot::Existing { modified, .. } = &mut self.slots[index] {
            *modified = true;
        }
        Ok(())
    }

    /// The element at `from` was moved to `to`.
    pub fn move_element(&mut self, from: usize, to: usize) -> Result<()> {
        self.check(from, self.slots.len())?;
        self.check(to, self.slots.len())?;
        let slot = self.slots.remove(from);
        self.slots.insert(to, slot);
        Ok(())
    }

    /// All elements were removed.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Coalesce everything recorded so far.
    pub fn finish(&self) -> CollectionChangeSet {
        let survivors: Vec<Survivor> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(new, slot)| match *slot {
                Slot::Existing { old, modified } => Some(Survivor { old, new, modified }),
                Slot::Inserted => None,
            })
            .collect();

        reconcile(self.old_count, self.slots.len(), &survivors)
    }
}
