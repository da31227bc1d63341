//! Reconciling surviving elements into a change-set.

use super::changeset::{CollectionChangeSet, IndexSet};
use crate::types::ObjectKey;
use std::collections::{HashMap, HashSet, VecDeque};

/// An element present in both the old and the new contents.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Survivor {
    pub old: usize,
    pub new: usize,
    pub modified: bool,
}

/// Build a change-set from the survivors of a change.
///
/// `survivors` must be ordered by `new`. Survivors that are not part of a
/// longest increasing run of old indices moved relative to the rest and
/// are reported as deletion plus insertion.
pub(crate) fn reconcile(
    old_count: usize,
    new_count: usize,
    survivors: &[Survivor],
) -> CollectionChangeSet {
    let old_order: Vec<usize> = survivors.iter().map(|s| s.old).collect();
    let in_place = longest_increasing_run(&old_order);

    let mut kept_old = vec![false; old_count];
    let mut kept_new = vec![false; new_count];
    let mut modifications = Vec::new();
    let mut modifications_new = Vec::new();

    for (survivor, &stays) in survivors.iter().zip(&in_place) {
        if !stays {
            continue;
        }
        kept_old[survivor.old] = true;
        kept_new[survivor.new] = true;
        if survivor.modified {
            modifications.push(survivor.old);
            modifications_new.push(survivor.new);
        }
    }

    let deletions = (0..old_count).filter(|&i| !kept_old[i]).collect();
    let insertions = (0..new_count).filter(|&i| !kept_new[i]).collect();

    CollectionChangeSet {
        deletions: IndexSet::from_sorted(deletions),
        insertions: IndexSet::from_sorted(insertions),
        modifications: IndexSet::from_sorted(modifications),
        modifications_new: IndexSet::from_sorted(modifications_new),
    }
}

/// Marks one longest strictly increasing subsequence of `values`.
fn longest_increasing_run(values: &[usize]) -> Vec<bool> {
    // tails[k] = position of the smallest tail of an increasing run of length k + 1
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; values.len()];

    for (i, &value) in values.iter().enumerate() {
        let slot = tails.partition_point(|&t| values[t] < value);
        if slot > 0 {
            prev[i] = Some(tails[slot - 1]);
        }
        if slot == tails.len() {
            tails.push(i);
        } else {
            tails[slot] = i;
        }
    }

    let mut keep = vec![false; values.len()];
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        keep[i] = true;
        cursor = prev[i];
    }
    keep
}

/// Compute the change-set between two keyed orderings.
///
/// A key may appear more than once on either side; its occurrences are
/// paired in order. `modified` names objects whose contents changed
/// between the two orderings.
pub fn diff_by_key(
    old: &[ObjectKey],
    new: &[ObjectKey],
    modified: &HashSet<ObjectKey>,
) -> CollectionChangeSet {
    let mut positions: HashMap<ObjectKey, VecDeque<usize>> = HashMap::new();
    for (i, key) in old.iter().enumerate() {
        positions.entry(*key).or_default().push_back(i);
    }

    let survivors: Vec<Survivor> = new
        .iter()
        .enumerate()
        .filter_map(|(new_index, key)| {
            let old_index = positions.get_mut(key)?.pop_front()?;
            Some(Survivor {
                old: old_index,
                new: new_index,
                modified: modified.contains(key),
            })
        })
        .collect();

    reconcile(old.len(), new.len(), &survivors)
}
