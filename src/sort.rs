//! Sort descriptors and their conversion into key path pairs.

use crate::error::{BridgeError, Result};
use crate::types::{ClassInfo, Object, PropertyKind};
use crate::values::{compare_values, lookup_key_path};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Sort on one key path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortDescriptor {
    pub key_path: String,
    pub ascending: bool,
}

impl SortDescriptor {
    pub fn new(key_path: impl Into<String>, ascending: bool) -> Self {
        Self {
            key_path: key_path.into(),
            ascending,
        }
    }

    pub fn ascending(key_path: impl Into<String>) -> Self {
        Self::new(key_path, true)
    }

    pub fn descending(key_path: impl Into<String>) -> Self {
        Self::new(key_path, false)
    }

    /// Same key path, opposite direction.
    pub fn reversed(&self) -> Self {
        Self::new(self.key_path.clone(), !self.ascending)
    }
}

/// Convert descriptors into `(key path, ascending)` pairs.
///
/// Collection operators (`@count`, `@sum`, ...) cannot be sorted on.
pub fn sort_descriptors_to_keypaths(descriptors: &[SortDescriptor]) -> Result<Vec<(String, bool)>> {
    descriptors
        .iter()
        .map(|descriptor| {
            let path = &descriptor.key_path;
            if path.contains('@') {
                return Err(BridgeError::InvalidSortKeyPath(format!(
                    "'{path}': KVC collection operators are not supported"
                )));
            }
            if path.is_empty() || path.split('.').any(str::is_empty) {
                return Err(BridgeError::InvalidSortKeyPath(format!(
                    "'{path}': empty key path component"
                )));
            }
            Ok((path.clone(), descriptor.ascending))
        })
        .collect()
}

/// Check that every key path starts at a sortable property of `info`.
///
/// Only the first component is checked against the schema; the rest
/// navigates into the value of an object-typed property.
pub fn validate_sort_keypaths(info: &ClassInfo, keypaths: &[(String, bool)]) -> Result<()> {
    for (path, _) in keypaths {
        let mut components = path.split('.');
        let first = components.next().unwrap_or_default();
        let nested = components.next().is_some();

        let property = info.property(first).ok_or_else(|| {
            BridgeError::InvalidSortKeyPath(format!(
                "'{path}': property '{first}' does not exist on '{}'",
                info.name
            ))
        })?;

        match (property.kind, nested) {
            (PropertyKind::Object, true) => {}
            (PropertyKind::Object, false) => {
                return Err(BridgeError::InvalidSortKeyPath(format!(
                    "'{path}': cannot sort on object property '{first}'"
                )))
            }
            (kind, true) => {
                return Err(BridgeError::InvalidSortKeyPath(format!(
                    "'{path}': property '{first}' of type {kind:?} has no nested properties"
                )))
            }
            (kind, false) if !kind.is_sortable() => {
                return Err(BridgeError::InvalidSortKeyPath(format!(
                    "'{path}': properties of type {kind:?} cannot be sorted"
                )))
            }
            _ => {}
        }
    }
    Ok(())
}

/// Order two objects by a list of key paths.
pub(crate) fn compare_objects<O: Object>(a: &O, b: &O, keypaths: &[(String, bool)]) -> Ordering {
    for (path, ascending) in keypaths {
        let ordering = compare_values(&lookup_key_path(a, path), &lookup_key_path(b, path));
        let ordering = if *ascending {
            ordering
        } else {
            ordering.reverse()
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
